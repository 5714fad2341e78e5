use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gitlab_work::catalog::DiscoveryOptions;
use gitlab_work::engine::DEFAULT_PAGE_SIZE;

pub const DEFAULT_URL: &str = "https://gitlab.com";

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub gitlab: GitLabConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitLabConfig {
    pub url: String,
    pub token: Option<String>,
    /// Project whose work item types are discovered. Defaults to the first
    /// project the token can see.
    pub discovery_project: Option<String>,
    /// `false` skips discovery and uses the built-in type ids.
    pub discovery: bool,
    pub timeout_secs: Option<u64>,
    pub page_size: u32,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            token: None,
            discovery_project: None,
            discovery: true,
            timeout_secs: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl GitLabConfig {
    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            enabled: self.discovery,
            project_path: self.discovery_project.clone(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }
}

pub fn config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".gitlab-work")
        .join("config.toml")
}

/// Load from `path` (or the default location) and apply environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    let mut config = load_config_from(&path)?;
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
}

/// A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

impl AppConfig {
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("GITLAB_API_URL").filter(|v| !v.trim().is_empty()) {
            self.gitlab.url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(token) = lookup("GITLAB_PERSONAL_ACCESS_TOKEN").filter(|v| !v.trim().is_empty()) {
            self.gitlab.token = Some(token.trim().to_string());
        }
    }
}
