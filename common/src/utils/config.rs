use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Local,
    Memory,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

#[derive(Clone, Deserialize, Debug, Default)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    pub http_port: u16,
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_rewrite_model")]
    pub rewrite_model: String,
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_asset_base_url")]
    pub asset_base_url: String,
    #[serde(default)]
    pub render_api_url: String,
    #[serde(default)]
    pub render_api_key: Option<String>,
    #[serde(default)]
    pub vision_api_url: Option<String>,
    #[serde(default)]
    pub vision_api_key: Option<String>,
    #[serde(default)]
    pub cutout_api_url: Option<String>,
    #[serde(default)]
    pub cutout_api_key: Option<String>,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    /// When set, job routes require this key in `X-API-Key` or a bearer token.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    #[serde(default = "default_stale_job_secs")]
    pub stale_job_secs: u64,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_rewrite_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_asset_base_url() -> String {
    "/assets".to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_stale_job_secs() -> u64 {
    15 * 60
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_fall_back_to_defaults() {
        let config = Config::builder()
            .set_override("surrealdb_address", "mem://")
            .expect("override")
            .set_override("surrealdb_username", "root")
            .expect("override")
            .set_override("surrealdb_password", "root")
            .expect("override")
            .set_override("surrealdb_namespace", "ns")
            .expect("override")
            .set_override("surrealdb_database", "db")
            .expect("override")
            .set_override("http_port", 3000)
            .expect("override")
            .build()
            .expect("config builds");

        let parsed: AppConfig = config.try_deserialize().expect("deserializes");

        assert_eq!(parsed.storage, StorageKind::Local);
        assert_eq!(parsed.rewrite_model, "gpt-4o-mini");
        assert_eq!(parsed.asset_base_url, "/assets");
        assert_eq!(parsed.worker_concurrency, 4);
        assert_eq!(parsed.stale_job_secs, 900);
        assert!(parsed.api_key.is_none());
        assert!(parsed.vision_api_url.is_none());
    }
}
