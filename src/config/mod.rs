// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for Shadow Defective
//!
//! The API key is deliberately absent: it is supplied per call and never
//! persisted.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default analysis prompt. `{lat}` and `{lon}` are substituted verbatim.
pub const DEFAULT_PROMPT: &str = "Based on the length and direction of the shadows, \
     the architectural landmarks, and the known latitude/longitude \
     ({lat}, {lon}), calculate the approximate solar angle \
     and time of day. Walk me through your reasoning.";

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Inference provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Image preparation settings
    #[serde(default)]
    pub image: ImageConfig,

    /// Prompt template
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Report export settings
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ImageConfig {
    /// Longest side allowed before downsampling
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_prompt")]
    pub template: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReportConfig {
    /// Directory used when a report is saved without an explicit path
    #[serde(default = "default_report_dir")]
    pub directory: String,
}

// Default value functions
fn default_provider_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_model() -> String { "gpt-4o".to_string() }
fn default_max_tokens() -> u32 { 1000 }
fn default_max_dimension() -> u32 { 1920 }
fn default_prompt() -> String { DEFAULT_PROMPT.to_string() }
fn default_report_dir() -> String { ".".to_string() }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            image: ImageConfig::default(),
            prompt: PromptConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: default_provider_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            template: default_prompt(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            directory: default_report_dir(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::ShadowError::Config(format!("Failed to parse config: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.provider.url.trim().is_empty() {
            return Err(crate::ShadowError::Config("provider.url is empty".to_string()));
        }
        if self.provider.model.trim().is_empty() {
            return Err(crate::ShadowError::Config("provider.model is empty".to_string()));
        }
        if self.provider.max_tokens == 0 {
            return Err(crate::ShadowError::Config(
                "provider.max_tokens must be positive".to_string(),
            ));
        }
        if self.image.max_dimension == 0 {
            return Err(crate::ShadowError::Config(
                "image.max_dimension must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
