use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::token_store::write_file_atomic;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:16780";
pub const DEFAULT_USERNAME: &str = "admin";

const MAX_SERVER_URL_LEN: usize = 2048;
const MAX_USERNAME_LEN: usize = 128;
const CONFIG_FILE_NAME: &str = "config.json";
const SESSION_FILE_NAME: &str = "session.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavedAdminConfig {
    pub server_url: String,
    pub username: String,
}

impl Default for SavedAdminConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_owned(),
            username: DEFAULT_USERNAME.to_owned(),
        }
    }
}

/// `override_dir` wins (CLI flag or `RELAYADMIN_CONFIG_DIR`), then the
/// platform config directory.
pub fn config_dir(override_dir: Option<&Path>) -> PathBuf {
    let dir = match override_dir {
        Some(dir) => dir.to_path_buf(),
        None => dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("relayadmin"),
    };
    let _ = std::fs::create_dir_all(&dir);
    dir
}

pub fn config_path_in(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE_NAME)
}

pub fn session_path_in(dir: &Path) -> PathBuf {
    dir.join(SESSION_FILE_NAME)
}

pub fn validate_saved_config(cfg: &SavedAdminConfig) -> Result<(), String> {
    let mut errors: Vec<String> = Vec::new();

    let server_url = cfg.server_url.trim();
    if server_url.is_empty() {
        errors.push("Server URL is required.".to_string());
    } else if server_url.len() > MAX_SERVER_URL_LEN {
        errors.push(format!(
            "Server URL is too long ({} > {} chars).",
            server_url.len(),
            MAX_SERVER_URL_LEN
        ));
    } else {
        match Url::parse(server_url) {
            Ok(url) => {
                let scheme = url.scheme();
                if scheme != "http" && scheme != "https" {
                    errors.push("Server URL must start with http:// or https://.".to_string());
                }
            }
            Err(err) => {
                errors.push(format!("Server URL is invalid: {err}"));
            }
        }
    }

    let username = cfg.username.trim();
    if username.is_empty() {
        errors.push("Username is required.".to_string());
    } else if username.len() > MAX_USERNAME_LEN {
        errors.push(format!(
            "Username is too long ({} > {} chars).",
            username.len(),
            MAX_USERNAME_LEN
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "Please fix the following:\n\n- {}",
            errors.join("\n- ")
        ))
    }
}

pub fn load_saved_config_from(path: &Path) -> Result<Option<SavedAdminConfig>, String> {
    if !path.exists() {
        return Ok(None);
    }

    let data = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read config file {}: {err}", path.display()))?;

    let cfg: SavedAdminConfig = serde_json::from_str(&data)
        .map_err(|err| format!("failed to parse config file {}: {err}", path.display()))?;

    validate_saved_config(&cfg)?;
    Ok(Some(cfg))
}

pub fn save_saved_config_to(path: &Path, cfg: &SavedAdminConfig) -> Result<(), String> {
    validate_saved_config(cfg)?;

    let payload = serde_json::to_string_pretty(cfg).map_err(|err| err.to_string())?;
    write_file_atomic(path, payload.as_bytes())
        .map_err(|err| format!("failed to save config file {}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_saved_config(&SavedAdminConfig::default()).is_ok());
    }

    #[test]
    fn validation_collects_every_problem() {
        let cfg = SavedAdminConfig {
            server_url: "ws://127.0.0.1:16779".to_owned(),
            username: " ".to_owned(),
        };
        let err = validate_saved_config(&cfg).unwrap_err();
        assert!(err.contains("http:// or https://"), "unexpected: {err}");
        assert!(err.contains("Username is required"), "unexpected: {err}");
    }

    #[test]
    fn overlong_username_is_rejected() {
        let cfg = SavedAdminConfig {
            server_url: DEFAULT_SERVER_URL.to_owned(),
            username: "a".repeat(MAX_USERNAME_LEN + 1),
        };
        assert!(validate_saved_config(&cfg).unwrap_err().contains("too long"));
    }

    #[test]
    fn config_roundtrip_save_load() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let dir = config_dir(Some(dir.path()));
        let path = config_path_in(&dir);

        assert_eq!(load_saved_config_from(&path).unwrap(), None);

        let cfg = SavedAdminConfig {
            server_url: "https://relay.example.com".to_owned(),
            username: "operator".to_owned(),
        };
        save_saved_config_to(&path, &cfg).unwrap();
        assert_eq!(load_saved_config_from(&path).unwrap(), Some(cfg));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn save_overwrites_previous_config() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let path = config_path_in(&dir.path().join("fresh"));

        save_saved_config_to(&path, &SavedAdminConfig::default()).unwrap();
        let cfg = SavedAdminConfig {
            server_url: "http://10.0.0.9:16780".to_owned(),
            username: "operator".to_owned(),
        };
        save_saved_config_to(&path, &cfg).unwrap();
        assert_eq!(load_saved_config_from(&path).unwrap(), Some(cfg));
    }

    #[test]
    fn invalid_saved_config_is_reported() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let path = config_path_in(dir.path());
        std::fs::write(&path, r#"{"server_url":"","username":"admin"}"#).unwrap();
        let err = load_saved_config_from(&path).unwrap_err();
        assert!(err.contains("Server URL is required"), "unexpected: {err}");
    }

    #[test]
    fn session_file_sits_next_to_config() {
        let dir = Path::new("/tmp/relayadmin-test");
        assert_eq!(
            session_path_in(dir).parent(),
            config_path_in(dir).parent()
        );
    }
}
