//! HTTP request handlers.

pub(crate) mod admin;
pub(crate) mod navigation;
pub(crate) mod pages;
pub(crate) mod sitemap;
