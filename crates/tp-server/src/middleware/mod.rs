//! Response middleware.

pub(crate) mod security;
