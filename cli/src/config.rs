use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use std::path::PathBuf;

pub const DEFAULT_VISION_BASE_URL: &str = "https://aip.baidubce.com";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "deepseek-chat";

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
    pub base_url: String,
}

impl VisionConfig {
    /// `(api_key, secret_key)`, or an error naming the missing variables.
    pub fn credentials(&self) -> Result<(&str, &str)> {
        match (self.api_key.as_deref(), self.secret_key.as_deref()) {
            (Some(key), Some(secret)) => Ok((key, secret)),
            _ => bail!(
                "Photo logging needs NUTRIFLOW_VISION_API_KEY and NUTRIFLOW_VISION_SECRET_KEY to be set"
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub vision: VisionConfig,
    pub llm: LlmConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!(
                "Failed to create data directory: {}",
                config.data_dir.display()
            )
        })?;
        Ok(config)
    }

    /// Build from a variable lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let data_dir = match var("NUTRIFLOW_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => ProjectDirs::from("", "", "nutriflow")
                .context("Could not determine home directory")?
                .data_dir()
                .to_path_buf(),
        };

        Ok(Config {
            data_dir,
            vision: VisionConfig {
                api_key: var("NUTRIFLOW_VISION_API_KEY"),
                secret_key: var("NUTRIFLOW_VISION_SECRET_KEY"),
                base_url: var("NUTRIFLOW_VISION_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_VISION_BASE_URL.to_string()),
            },
            llm: LlmConfig {
                api_key: var("NUTRIFLOW_LLM_API_KEY"),
                base_url: var("NUTRIFLOW_LLM_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
                model: var("NUTRIFLOW_LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            },
        })
    }
}
