use config::{Config, ConfigError, Environment, File, FileFormat};
use domain::FieldKind;
use domain::binding::DEFAULT_PRIMARY_KEY;
use domain::tag::TagOptionsOverride;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}

/// A tag field declared on a model
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FieldConfig {
    pub name: String,
    pub kind: FieldKind,
    /// Share or rename the auxiliary tag table
    #[serde(default)]
    pub tag_table: Option<String>,
    #[serde(default)]
    pub options: TagOptionsOverride,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    pub app: String,
    pub name: String,
    pub table: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

fn default_primary_key() -> String {
    DEFAULT_PRIMARY_KEY.to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TagFieldConfig {
    pub database_url: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

impl TagFieldConfig {
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .set_default("database_url", "sqlite::memory:")?
            // config/default.toml is required so a missing deployment fails early
            .add_source(File::with_name(&format!("{}/default", config_dir)).required(true))
            .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
            // Environment variables (e.g. TAGFIELD__DATABASE_URL=postgres://...)
            .add_source(Environment::with_prefix("TAGFIELD").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("database_url", "sqlite::memory:")?
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
