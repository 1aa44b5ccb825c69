// Configuration loading and parsing (exporter.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CONFIG_FILE: &str = "exporter.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub ws_port: u16,
    pub interceptor: InterceptorConfig,
    pub relay: RelayConfig,
    pub clipboard: ClipboardConfig,
    pub context_menu: ContextMenuConfig,
}

// ---------------------------------------------------------------------------
// exporter.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire exporter.toml file.
#[derive(Debug, Clone, Deserialize)]
struct ExporterFile {
    websocket: WebsocketSection,
    interceptor: InterceptorConfig,
    #[serde(default)]
    relay: RelayConfig,
    #[serde(default)]
    clipboard: ClipboardConfig,
    context_menu: ContextMenuConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct WebsocketSection {
    port: u16,
}

/// Which responses the network interceptor reports.
#[derive(Debug, Clone, Deserialize)]
pub struct InterceptorConfig {
    /// Origin of the game's web client; requests are resolved against it and
    /// anything cross-origin is ignored.
    pub page_origin: String,
    pub club_path_suffix: String,
    pub squad_path_suffix: String,
    /// `code` value the web API returns when the session has expired.
    pub auth_failure_code: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    pub request_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 2000,
        }
    }
}

impl RelayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Clipboard command; the roster text is written to its stdin. An empty
/// command means no clipboard is available.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClipboardConfig {
    #[serde(default)]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContextMenuConfig {
    pub title: String,
    pub document_url_patterns: Vec<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/exporter.toml` relative to
/// `base_dir`. Does not copy defaults; see [`load_config`].
pub(crate) fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let file: ExporterFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    let config = Config {
        ws_port: file.websocket.port,
        interceptor: file.interceptor,
        relay: file.relay,
        clipboard: file.clipboard,
        context_menu: file.context_menu,
    };

    validate(&config)?;

    Ok(config)
}

/// Copy `defaults/exporter.toml` to `config/` unless it is already there.
/// Returns the path written, if any.
pub fn ensure_config_files(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let default_file = base_dir.join("defaults").join(CONFIG_FILE);
    let config_dir = base_dir.join("config");
    let target = config_dir.join(CONFIG_FILE);

    if target.exists() {
        return Ok(None);
    }
    if !default_file.is_file() {
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "no {CONFIG_FILE} in {}/config or {}/defaults; \
                 run from the crate root or ensure defaults/ is present",
                base_dir.display(),
                base_dir.display()
            ),
        });
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;
    std::fs::copy(&default_file, &target).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!(
            "failed to copy {} to {}: {e}",
            default_file.display(),
            target.display()
        ),
    })?;

    Ok(Some(target))
}

/// Loads config relative to the current working directory, copying defaults
/// first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.ws_port == 0 {
        return Err(ConfigError::ValidationError {
            field: "websocket.port".into(),
            message: "must be greater than 0".into(),
        });
    }

    let origin = &config.interceptor.page_origin;
    match reqwest::Url::parse(origin) {
        Ok(url) if url.has_host() => {}
        _ => {
            return Err(ConfigError::ValidationError {
                field: "interceptor.page_origin".into(),
                message: format!("must be an absolute http(s) origin, got {origin:?}"),
            });
        }
    }

    let suffixes = [
        ("interceptor.club_path_suffix", &config.interceptor.club_path_suffix),
        ("interceptor.squad_path_suffix", &config.interceptor.squad_path_suffix),
    ];
    for (name, suffix) in suffixes {
        if !suffix.starts_with('/') {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: format!("must start with '/', got {suffix:?}"),
            });
        }
    }

    if config.relay.request_timeout_ms == 0 {
        return Err(ConfigError::ValidationError {
            field: "relay.request_timeout_ms".into(),
            message: "must be > 0".into(),
        });
    }

    if config.context_menu.document_url_patterns.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "context_menu.document_url_patterns".into(),
            message: "must list at least one pattern".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
