use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::client::MAX_PAGE_SIZE;
use crate::error::{GmailError, Result};
use crate::models::LabelChange;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub labels: LabelChange,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

/// Where the authorization callback is received
///
/// `redirect_addr` must match the redirect URL registered for the OAuth2
/// client exactly (host and port).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_redirect_addr")]
    pub redirect_addr: String,
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
}

impl AuthConfig {
    /// Redirect URL sent to the provider, e.g. `http://localhost:8081`
    pub fn redirect_uri(&self) -> String {
        if self.callback_path == "/" {
            format!("http://{}", self.redirect_addr)
        } else {
            format!("http://{}{}", self.redirect_addr, self.callback_path)
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            redirect_addr: default_redirect_addr(),
            callback_path: default_callback_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub dry_run: bool,
    /// Collect per-message outcomes so failures appear in the run report
    #[serde(default = "default_collect_outcomes")]
    pub collect_outcomes: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            collect_outcomes: default_collect_outcomes(),
        }
    }
}

fn default_workers() -> usize {
    12
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_filter() -> String {
    "is:unread".to_string()
}

fn default_redirect_addr() -> String {
    "localhost:8081".to_string()
}

fn default_callback_path() -> String {
    "/".to_string()
}

fn default_collect_outcomes() -> bool {
    true
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| GmailError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                GmailError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| GmailError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.workers == 0 {
            return Err(GmailError::ConfigError(
                "pipeline.workers must be at least 1".to_string(),
            ));
        }
        if self.pipeline.workers > 256 {
            return Err(GmailError::ConfigError(
                "pipeline.workers cannot exceed 256".to_string(),
            ));
        }

        if self.pipeline.queue_capacity == 0 {
            return Err(GmailError::ConfigError(
                "pipeline.queue_capacity must be at least 1".to_string(),
            ));
        }

        if self.pipeline.page_size == 0 || self.pipeline.page_size > MAX_PAGE_SIZE {
            return Err(GmailError::ConfigError(format!(
                "pipeline.page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        if self.labels.is_empty() {
            return Err(GmailError::ConfigError(
                "labels must add or remove at least one label".to_string(),
            ));
        }
        if self
            .labels
            .add
            .iter()
            .chain(self.labels.remove.iter())
            .any(|label| label.trim().is_empty())
        {
            return Err(GmailError::ConfigError(
                "labels cannot contain empty label IDs".to_string(),
            ));
        }

        let (host, port) = self
            .auth
            .redirect_addr
            .rsplit_once(':')
            .ok_or_else(|| {
                GmailError::ConfigError(format!(
                    "auth.redirect_addr '{}' must be host:port",
                    self.auth.redirect_addr
                ))
            })?;
        if host.is_empty() || port.parse::<u16>().is_err() {
            return Err(GmailError::ConfigError(format!(
                "auth.redirect_addr '{}' must be host:port",
                self.auth.redirect_addr
            )));
        }

        if !self.auth.callback_path.starts_with('/') {
            return Err(GmailError::ConfigError(
                "auth.callback_path must start with '/'".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.pipeline.workers, 12);
        assert_eq!(config.pipeline.queue_capacity, 1024);
        assert_eq!(config.pipeline.page_size, 500);

        assert_eq!(config.query.filter, "is:unread");

        assert!(config.labels.add.is_empty());
        assert_eq!(config.labels.remove, vec!["UNREAD".to_string()]);

        assert_eq!(config.auth.redirect_addr, "localhost:8081");
        assert_eq!(config.auth.callback_path, "/");

        assert!(!config.execution.dry_run);
        assert!(config.execution.collect_outcomes);
    }

    #[test]
    fn test_config_validation_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_workers() {
        let mut config = Config::default();
        config.pipeline.workers = 0;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("at least 1"));

        config.pipeline.workers = 257;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("cannot exceed 256"));

        config.pipeline.workers = 1;
        assert!(config.validate().is_ok());
        config.pipeline.workers = 256;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_queue_capacity_zero() {
        let mut config = Config::default();
        config.pipeline.queue_capacity = 0;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("queue_capacity"));

        config.pipeline.queue_capacity = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_page_size() {
        let mut config = Config::default();
        config.pipeline.page_size = 0;
        assert!(config.validate().is_err());

        config.pipeline.page_size = 501;
        assert!(config.validate().is_err());

        config.pipeline.page_size = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_empty_label_change() {
        let mut config = Config::default();
        config.labels.remove.clear();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("at least one label"));

        config.labels.add.push(" ".to_string());
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("empty label IDs"));
    }

    #[test]
    fn test_config_validation_redirect_addr() {
        let mut config = Config::default();
        config.auth.redirect_addr = "localhost".to_string();
        assert!(config.validate().is_err());

        config.auth.redirect_addr = "localhost:http".to_string();
        assert!(config.validate().is_err());

        config.auth.redirect_addr = ":8081".to_string();
        assert!(config.validate().is_err());

        config.auth.redirect_addr = "127.0.0.1:9000".to_string();
        assert!(config.validate().is_ok());

        config.auth.callback_path = "oauth".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redirect_uri() {
        let mut auth = AuthConfig::default();
        assert_eq!(auth.redirect_uri(), "http://localhost:8081");

        auth.callback_path = "/oauth2/callback".to_string();
        assert_eq!(auth.redirect_uri(), "http://localhost:8081/oauth2/callback");
    }

    #[tokio::test]
    async fn test_config_load_save_roundtrip() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let mut config = Config::default();
        config.pipeline.workers = 4;
        config.labels.add.push("Label_42".to_string());
        config.save(path).await.unwrap();

        let loaded = Config::load(path).await.unwrap();

        assert_eq!(loaded.pipeline.workers, 4);
        assert_eq!(loaded.pipeline.queue_capacity, config.pipeline.queue_capacity);
        assert_eq!(loaded.labels, config.labels);
        assert_eq!(loaded.auth.redirect_addr, config.auth.redirect_addr);
    }

    #[tokio::test]
    async fn test_config_load_nonexistent_returns_default() {
        let path = Path::new("/tmp/nonexistent-sweep-config-12345.toml");

        let config = Config::load(path).await.unwrap();

        assert_eq!(config.pipeline.workers, 12);
        assert_eq!(config.query.filter, "is:unread");
    }

    #[tokio::test]
    async fn test_config_load_invalid_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        tokio::fs::write(path, "this is not valid toml {[}]")
            .await
            .unwrap();

        let result = Config::load(path).await;
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file"));
    }

    #[tokio::test]
    async fn test_config_partial_with_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let partial_config = r#"
[pipeline]
workers = 2

[query]
filter = "in:inbox older_than:1y"

[execution]
dry_run = true
"#;
        tokio::fs::write(path, partial_config).await.unwrap();

        let config = Config::load(path).await.unwrap();

        assert_eq!(config.pipeline.workers, 2);
        assert_eq!(config.query.filter, "in:inbox older_than:1y");
        assert!(config.execution.dry_run);

        assert_eq!(config.pipeline.queue_capacity, 1024);
        assert_eq!(config.labels.remove, vec!["UNREAD".to_string()]);
        assert!(config.execution.collect_outcomes);
    }

    #[tokio::test]
    async fn test_config_load_rejects_invalid_values() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        tokio::fs::write(path, "[pipeline]\nqueue_capacity = 0\n")
            .await
            .unwrap();

        let result = Config::load(path).await;
        assert!(matches!(result, Err(GmailError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_config_create_example() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        Config::create_example(path).await.unwrap();

        assert!(path.exists());

        let config = Config::load(path).await.unwrap();
        assert_eq!(config.pipeline.workers, 12);
    }
}
