//! Application configuration

pub mod prompts;

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
}

impl Config {
    /// Loads configuration from the environment, then applies overrides from
    /// the TOML file named by `MEDIMATE_CONFIG` if that variable is set.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            data_dir: env::var("MEDIMATE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            gemini_api_key: env::var("GEMINI_API_KEY").ok(),
            gemini_model: env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".into()),
            gemini_base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".into()),
        };

        if let Ok(path) = env::var("MEDIMATE_CONFIG") {
            config.apply_file(Path::new(&path))?;
        }

        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let content = std::fs::read_to_string(path)?;
        let overrides: FileOverrides = toml::from_str(&content)?;
        self.apply_overrides(overrides);
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: FileOverrides) {
        if let Some(server) = overrides.server {
            if let Some(host) = server.host {
                self.host = host;
            }
            if let Some(port) = server.port {
                self.port = port;
            }
            if let Some(data_dir) = server.data_dir {
                self.data_dir = data_dir;
            }
        }
        if let Some(ai) = overrides.ai {
            if let Some(key) = ai.api_key {
                self.gemini_api_key = Some(key);
            }
            if let Some(model) = ai.model {
                self.gemini_model = model;
            }
            if let Some(base_url) = ai.base_url {
                self.gemini_base_url = base_url;
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileOverrides {
    server: Option<ServerOverrides>,
    ai: Option<AiOverrides>,
}

#[derive(Debug, Deserialize)]
struct ServerOverrides {
    host: Option<String>,
    port: Option<u16>,
    data_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct AiOverrides {
    api_key: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            host: "127.0.0.1".into(),
            port: 3000,
            data_dir: PathBuf::from("./data"),
            gemini_api_key: None,
            gemini_model: "gemini-1.5-flash".into(),
            gemini_base_url: "https://generativelanguage.googleapis.com".into(),
        }
    }

    #[test]
    fn file_overrides_replace_only_named_fields() {
        let mut config = base_config();
        let overrides: FileOverrides = toml::from_str(
            r#"
            [server]
            port = 8080

            [ai]
            model = "gemini-1.5-pro"
            "#,
        )
        .unwrap();

        config.apply_overrides(overrides);

        assert_eq!(config.port, 8080);
        assert_eq!(config.gemini_model, "gemini-1.5-pro");
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.gemini_api_key, None);
    }

    #[test]
    fn empty_override_file_changes_nothing() {
        let mut config = base_config();
        let overrides: FileOverrides = toml::from_str("").unwrap();
        config.apply_overrides(overrides);
        assert_eq!(config.port, 3000);
    }
}
