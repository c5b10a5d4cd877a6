use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::gateway::GatewayEndpoint;
use crate::prompt::PromptContext;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_CONTEXT_WINDOW: usize = 10;
pub const DEFAULT_HEALTH_TIMEOUT_SECS: u64 = 3;

const GATEWAYS_ENV: &str = "CONCIERGE_GATEWAYS";
const MODEL_ENV: &str = "CONCIERGE_MODEL";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Gateway base URLs in priority order
    pub gateways: Vec<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Number of most recent messages sent with each request
    pub context_window: usize,
    pub health_timeout_secs: u64,
    /// Replaces the prompt built from `site` when set
    pub system_prompt: Option<String>,
    pub site: PromptContext,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            gateways: vec![
                "http://localhost:8787".to_string(),
                "http://localhost:8080".to_string(),
                "http://localhost:3001".to_string(),
            ],
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 500,
            context_window: DEFAULT_CONTEXT_WINDOW,
            health_timeout_secs: DEFAULT_HEALTH_TIMEOUT_SECS,
            system_prompt: None,
            site: PromptContext::default(),
        }
    }

    /// Load from the user config directory, falling back to defaults, then
    /// apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            Self::new()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_json::from_str(&config_content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(GATEWAYS_ENV).ok().as_deref(),
            std::env::var(MODEL_ENV).ok().as_deref(),
        );
    }

    fn apply_overrides(&mut self, gateways: Option<&str>, model: Option<&str>) {
        if let Some(list) = gateways {
            let parsed: Vec<String> = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !parsed.is_empty() {
                self.gateways = parsed;
            }
        }
        if let Some(model) = model.map(str::trim).filter(|m| !m.is_empty()) {
            self.model = model.to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.gateways.is_empty() {
            return Err(anyhow!("At least one gateway must be configured"));
        }
        if self.context_window == 0 {
            return Err(anyhow!("context_window must be at least 1"));
        }
        Ok(())
    }

    pub fn endpoints(&self) -> Vec<GatewayEndpoint> {
        self.gateways.iter().map(|url| GatewayEndpoint::new(url)).collect()
    }

    pub fn system_prompt(&self) -> String {
        self.system_prompt
            .clone()
            .unwrap_or_else(|| self.site.build())
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("concierge").join("config.json"))
    }
}
