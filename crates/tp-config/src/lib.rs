//! Configuration management for TreePages.
//!
//! Parses `treepages.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `server.host`
//! - `server.base_url`
//! - `database.path`
//! - `auth.login_url`

mod expand;

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tp_store::PageStatus;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override public base URL.
    pub base_url: Option<String>,
    /// Override database file.
    pub database: Option<PathBuf>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "treepages.toml";

/// Database path that selects a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration (path is a relative string from TOML).
    database: DatabaseConfigRaw,
    /// Admin change list configuration.
    pub admin: AdminConfig,
    /// Page template configuration.
    pub templates: TemplatesConfig,
    /// Navigation configuration.
    pub navigation: NavigationConfig,
    /// Front-end authentication configuration.
    pub auth: AuthConfig,

    /// Resolved database configuration (set after loading).
    #[serde(skip)]
    pub database_resolved: DatabaseConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Public base URL used for absolute links (sitemap). Empty means
    /// `http://{host}:{port}`.
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 7979,
            base_url: String::new(),
        }
    }
}

impl ServerConfig {
    /// Base URL without a trailing slash.
    #[must_use]
    pub fn public_url(&self) -> String {
        if self.base_url.is_empty() {
            format!("http://{}:{}", self.host, self.port)
        } else {
            self.base_url.trim_end_matches('/').to_owned()
        }
    }
}

/// Raw database configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct DatabaseConfigRaw {
    path: Option<String>,
}

/// Resolved database configuration.
#[derive(Debug, Default)]
pub struct DatabaseConfig {
    /// `SQLite` database file, or [`IN_MEMORY`].
    pub path: PathBuf,
}

impl DatabaseConfig {
    /// True if the database lives only in memory.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY
    }
}

/// Initial state of the admin tree widget.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeInitialState {
    /// Only roots are visible.
    #[default]
    Collapsed,
    /// Every node is visible.
    Expanded,
}

/// Admin change list configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// URL prefix of the tree editor assets.
    pub media_path: String,
    /// Initial state of the tree widget.
    pub tree_initial_state: TreeInitialState,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            media_path: "/static/treepages/".to_owned(),
            tree_initial_state: TreeInitialState::default(),
        }
    }
}

/// Page template configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Templates a page may select.
    pub allowed: Vec<String>,
    /// Template used when a page selects none or an unknown one.
    pub default: String,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            allowed: vec!["pages/default.html".to_owned()],
            default: "pages/default.html".to_owned(),
        }
    }
}

/// Hand-written navigation link.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct NavLinkConfig {
    /// Display label.
    pub label: String,
    /// Link target.
    pub link: String,
    /// Nested links.
    #[serde(default)]
    pub children: Vec<NavLinkConfig>,
}

/// Navigation configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Lowest status shown in navigation.
    pub min_status: PageStatus,
    /// Links placed before the page tree.
    pub manual: Vec<NavLinkConfig>,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            min_status: PageStatus::NAVIGATION,
            manual: Vec::new(),
        }
    }
}

/// Front-end authentication configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Where anonymous visitors of protected pages are sent.
    pub login_url: String,
    /// Request header that carries the authenticated user.
    pub user_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_url: "/accounts/login/".to_owned(),
            user_header: "x-remote-user".to_owned(),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`database.path`").
        field: String,
        /// Error message (e.g., "${`TP_DB`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a URL field to use http:// or https:// scheme.
fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `treepages.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(config_path: Option<&Path>, cli_settings: Option<&CliSettings>) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(base_url) = &settings.base_url {
            self.server.base_url.clone_from(base_url);
        }
        if let Some(database) = &settings.database {
            self.database_resolved.path.clone_from(database);
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfigRaw::default(),
            admin: AdminConfig::default(),
            templates: TemplatesConfig::default(),
            navigation: NavigationConfig::default(),
            auth: AuthConfig::default(),
            database_resolved: DatabaseConfig {
                path: base.join("treepages.db"),
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_templates()?;
        self.validate_auth()?;
        require_non_empty(&self.admin.media_path, "admin.media_path")?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;

        // Port 0 is technically valid (OS assigns a random port), but it's
        // unlikely to be intentional in a config file
        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port cannot be 0".to_owned()));
        }

        if !self.server.base_url.is_empty() {
            require_http_url(&self.server.base_url, "server.base_url")?;
        }

        Ok(())
    }

    fn validate_templates(&self) -> Result<(), ConfigError> {
        let templates = &self.templates;
        require_non_empty(&templates.default, "templates.default")?;
        if !templates.allowed.is_empty() && !templates.allowed.contains(&templates.default) {
            return Err(ConfigError::Validation(format!(
                "templates.default {:?} is not listed in templates.allowed",
                templates.default
            )));
        }
        Ok(())
    }

    fn validate_auth(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.auth.login_url, "auth.login_url")?;
        require_non_empty(&self.auth.user_header, "auth.user_header")?;
        if !self
            .auth
            .user_header
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(ConfigError::Validation(
                "auth.user_header must be a valid HTTP header name".to_owned(),
            ));
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;
        self.server.base_url = expand::expand_env(&self.server.base_url, "server.base_url")?;

        if let Some(ref path) = self.database.path {
            self.database.path = Some(expand::expand_env(path, "database.path")?);
        }

        self.auth.login_url = expand::expand_env(&self.auth.login_url, "auth.login_url")?;

        Ok(())
    }

    /// Resolve relative paths against the config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let path = match self.database.path.as_deref() {
            Some(IN_MEMORY) => PathBuf::from(IN_MEMORY),
            Some(path) => config_dir.join(path),
            None => config_dir.join("treepages.db"),
        };
        self.database_resolved = DatabaseConfig { path };
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/test"));

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 7979);
        assert_eq!(config.database_resolved.path, PathBuf::from("/test/treepages.db"));
        assert_eq!(config.admin.tree_initial_state, TreeInitialState::Collapsed);
        assert_eq!(config.navigation.min_status, PageStatus::InNavigation);
        assert_eq!(config.auth.user_header, "x-remote-user");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.server.port, 7979);
        assert_eq!(config.templates.default, "pages/default.html");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[server]
host = "0.0.0.0"
port = 9000
base_url = "https://pages.example.com/"

[database]
path = "data/pages.db"

[admin]
media_path = "/media/tree/"
tree_initial_state = "expanded"

[templates]
allowed = ["pages/default.html", "pages/wide.html"]
default = "pages/default.html"

[navigation]
min_status = "published"

[[navigation.manual]]
label = "Shop"
link = "https://shop.example.com/"

[[navigation.manual.children]]
label = "Sale"
link = "/sale/"

[auth]
login_url = "/login/"
user_header = "x-forwarded-user"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/project"));

        assert_eq!(config.server.public_url(), "https://pages.example.com");
        assert_eq!(config.database_resolved.path, PathBuf::from("/project/data/pages.db"));
        assert_eq!(config.admin.media_path, "/media/tree/");
        assert_eq!(config.admin.tree_initial_state, TreeInitialState::Expanded);
        assert_eq!(config.navigation.min_status, PageStatus::Published);
        assert_eq!(config.navigation.manual[0].label, "Shop");
        assert_eq!(config.navigation.manual[0].children[0].link, "/sale/");
        assert_eq!(config.auth.login_url, "/login/");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_in_memory_database_is_not_resolved() {
        let mut config: Config = toml::from_str("[database]\npath = \":memory:\"").unwrap();
        config.resolve_paths(Path::new("/project"));

        assert!(config.database_resolved.is_in_memory());
    }

    #[test]
    fn test_public_url_defaults_to_listen_address() {
        let config = Config::default_with_base(Path::new("/test"));

        assert_eq!(config.server.public_url(), "http://127.0.0.1:7979");
    }

    #[test]
    fn test_apply_cli_settings() {
        let mut config = Config::default_with_base(Path::new("/test"));
        let overrides = CliSettings {
            host: Some("0.0.0.0".to_owned()),
            port: Some(9000),
            database: Some(PathBuf::from("/var/lib/pages.db")),
            ..Default::default()
        };

        config.apply_cli_settings(&overrides);

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database_resolved.path, PathBuf::from("/var/lib/pages.db"));
        assert!(config.server.base_url.is_empty());
    }

    #[test]
    fn test_apply_cli_settings_empty() {
        let before = Config::default_with_base(Path::new("/test"));
        let mut config = Config::default_with_base(Path::new("/test"));

        config.apply_cli_settings(&CliSettings::default());

        assert_eq!(config.server.host, before.server.host);
        assert_eq!(config.database_resolved.path, before.database_resolved.path);
    }

    #[test]
    fn test_expand_env_vars_database_path() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("TP_CONFIG_TEST_DATA", "/srv/data");
        }

        let toml = r#"
[database]
path = "${TP_CONFIG_TEST_DATA}/pages.db"

[auth]
login_url = "${TP_CONFIG_TEST_LOGIN:-/accounts/login/}"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.expand_env_vars().unwrap();
        config.resolve_paths(Path::new("/project"));

        assert_eq!(config.database_resolved.path, PathBuf::from("/srv/data/pages.db"));
        assert_eq!(config.auth.login_url, "/accounts/login/");

        unsafe {
            std::env::remove_var("TP_CONFIG_TEST_DATA");
        }
    }

    #[test]
    fn test_expand_env_vars_missing_required_var() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("TP_CONFIG_TEST_MISSING");
        }

        let mut config: Config = toml::from_str("[server]\nhost = \"${TP_CONFIG_TEST_MISSING}\"").unwrap();
        let err = config.expand_env_vars().unwrap_err();

        assert!(matches!(err, ConfigError::EnvVar { .. }));
        assert!(err.to_string().contains("server.host"));
    }

    /// Assert that validation fails with expected substrings in the error message.
    fn assert_validation_error(config: &Config, expected_substrings: &[&str]) {
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation(_)),
            "Expected ConfigError::Validation, got {err:?}"
        );
        let msg = err.to_string();
        for s in expected_substrings {
            assert!(msg.contains(s), "Expected error to contain '{s}', got: {msg}");
        }
    }

    #[test]
    fn test_validate_port_zero() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.server.port = 0;

        assert_validation_error(&config, &["server.port"]);
    }

    #[test]
    fn test_validate_base_url_scheme() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.server.base_url = "pages.example.com".to_owned();

        assert_validation_error(&config, &["server.base_url", "http://"]);
    }

    #[test]
    fn test_validate_default_template_must_be_allowed() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.templates.default = "missing.html".to_owned();

        assert_validation_error(&config, &["templates.default", "missing.html"]);
    }

    #[test]
    fn test_validate_user_header() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.auth.user_header = "x remote user".to_owned();

        assert_validation_error(&config, &["auth.user_header"]);
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/treepages.toml")), None).unwrap_err();

        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_from_file_resolves_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("treepages.toml");
        std::fs::write(&path, "[database]\npath = \"pages.db\"\n").unwrap();

        let config = Config::load(Some(&path), None).unwrap();

        assert_eq!(config.database_resolved.path, dir.path().join("pages.db"));
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("treepages.toml");
        std::fs::write(&path, "[server]\nport = 0\n").unwrap();

        let err = Config::load(Some(&path), None).unwrap_err();

        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
