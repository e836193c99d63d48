//! Engine configuration and mail-store capabilities.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILCONV_CONFIG` (environment variable)
//! 2. `~/.config/mailconv/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailconv\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::content_type::ContentType;

/// What the backing mail store can do for us.
///
/// Fillers and the attachment resolver only ever see this trait, so callers
/// can hand in a live account's capability set instead of a [`MailConfig`].
pub trait Capabilities {
    /// The store can search for attachments natively and exposes the result
    /// as `$HasAttachment` / `$HasNoAttachment` user flags.
    fn has_attachment_search(&self) -> bool;

    /// The store maintains attachment marker flags that may be trusted as a
    /// cheap override during field filling.
    fn has_attachment_marker(&self) -> bool;

    /// Whether a part of this type counts as an attachment even without a
    /// `Content-Disposition` header.
    fn always_attachment(&self, content_type: &ContentType) -> bool;
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Mail-store capabilities and attachment rules.
    pub mail: MailConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Mail-store capabilities and attachment rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// The store supports native attachment search.
    pub attachment_search: bool,
    /// The store maintains attachment marker user flags.
    pub attachment_marker: bool,
    /// `type/subtype` values treated as attachments without a disposition.
    pub always_attachment_types: Vec<String>,
    /// Upper bound on bytes scanned by the fallback header parser.
    pub max_header_bytes: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            attachment_search: false,
            attachment_marker: false,
            always_attachment_types: vec![
                "application/ms-tnef".to_string(),
                "message/rfc822".to_string(),
            ],
            max_header_bytes: crate::parser::header::DEFAULT_MAX_HEADER_BYTES,
        }
    }
}

impl Capabilities for MailConfig {
    fn has_attachment_search(&self) -> bool {
        self.attachment_search
    }

    fn has_attachment_marker(&self) -> bool {
        self.attachment_marker
    }

    fn always_attachment(&self, content_type: &ContentType) -> bool {
        let base = content_type.base_type();
        self.always_attachment_types
            .iter()
            .any(|t| t.trim().eq_ignore_ascii_case(&base))
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            return load_config_from(&path);
        }
    }
    Config::default()
}

/// Load configuration from an explicit path, falling back to defaults.
pub fn load_config_from(path: &std::path::Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(cfg) => {
                tracing::info!(path = %path.display(), "Loaded config");
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to parse config, using defaults"
                );
                Config::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to read config file, using defaults"
            );
            Config::default()
        }
    }
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILCONV_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailconv").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailconv")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert!(!cfg.mail.attachment_search);
        assert!(!cfg.mail.attachment_marker);
        assert_eq!(cfg.mail.max_header_bytes, 256 * 1024);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[mail]
attachment_marker = true
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert!(cfg.mail.attachment_marker);
        assert!(!cfg.mail.attachment_search);
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.mail.always_attachment_types.len(), 2);
    }

    #[test]
    fn test_always_attachment_is_case_insensitive() {
        let cfg = MailConfig::default();
        let ct = ContentType::parse("Application/MS-TNEF; name=winmail.dat");
        assert!(cfg.always_attachment(&ct));
        assert!(!cfg.always_attachment(&ContentType::parse("text/plain")));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            "[mail]\nattachment_search = true\nalways_attachment_types = [\"text/calendar\"]"
        )
        .expect("write");
        let cfg = load_config_from(file.path());
        assert!(cfg.mail.attachment_search);
        assert!(cfg
            .mail
            .always_attachment(&ContentType::parse("text/calendar; method=REQUEST")));
    }

    #[test]
    fn test_broken_config_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "[mail\nattachment_search = yes").expect("write");
        let cfg = load_config_from(file.path());
        assert!(!cfg.mail.attachment_search);
    }
}
