use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8780;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024;
pub const DEFAULT_PIPELINE_DEADLINE_SECS: u64 = 20;
pub const DEFAULT_RETRIEVAL_TOP_K: usize = 3;

/// Top-level config (recipe.toml + RECIPE_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeConfig {
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl Default for RecipeConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig {
                port: DEFAULT_PORT,
                bind: DEFAULT_BIND.to_string(),
            },
            pipeline: PipelineConfig::default(),
            database: DatabaseConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

/// Pipeline-wide tunables: deadline, retrieval fan-out, reranking, web search provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    #[serde(default = "default_top_k")]
    pub retrieval_top_k: usize,
    #[serde(default)]
    pub rerank_enabled: bool,
    #[serde(default)]
    pub web_search_provider: WebSearchProvider,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            deadline_secs: DEFAULT_PIPELINE_DEADLINE_SECS,
            retrieval_top_k: DEFAULT_RETRIEVAL_TOP_K,
            rerank_enabled: false,
            web_search_provider: WebSearchProvider::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WebSearchProvider {
    #[default]
    None,
    Tavily,
    Bing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    pub llm: Option<LlmProviderConfig>,
    pub retrieval: Option<RetrievalProviderConfig>,
    pub web_search: Option<WebSearchProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_deadline_secs() -> u64 {
    DEFAULT_PIPELINE_DEADLINE_SECS
}
fn default_top_k() -> usize {
    DEFAULT_RETRIEVAL_TOP_K
}
fn default_model() -> String {
    "recipe-chat-default".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.recipe-assistant/recipe.db", home)
}

impl RecipeConfig {
    /// Load config from a TOML file with RECIPE_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.recipe-assistant/recipe.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: RecipeConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("RECIPE_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.recipe-assistant/recipe.toml", home)
}
