// pgmanager/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::database::{ConnectionParams, validate_identifier};

const DEFAULT_TEMPORARY_PATH: &str = "/tmp/";
const DEFAULT_LOCAL_STORAGE_PATH: &str = "./backups/";
const DEFAULT_MAINTENANCE_DB: &str = "postgres";
const DEFAULT_DUMP_COMMAND: &str = "pg_dump";
const DEFAULT_RESTORE_COMMAND: &str = "pg_restore";

// Structs for deserializing the config file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum StorageEngine {
    #[default]
    #[serde(rename = "LOCAL", alias = "local")]
    Local,
    #[serde(rename = "S3", alias = "s3")]
    S3,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonSetup {
    #[serde(default)]
    pub engine: StorageEngine,
    pub temporary_path: Option<PathBuf>,
    pub maintenance_db: Option<String>,
    pub command_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonLocalStorage {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonCommands {
    pub dump: Option<String>,
    pub restore: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct S3Config {
    pub bucket_name: String,
    #[serde(default)]
    pub bucket_backup_path: String,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket_name", &self.bucket_name)
            .field("bucket_backup_path", &self.bucket_backup_path)
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJsonConfig {
    pub src: ConnectionParams,
    pub dest: Option<ConnectionParams>,
    pub setup: Option<JsonSetup>,
    pub local_storage: Option<JsonLocalStorage>,
    #[serde(rename = "S3", alias = "s3")]
    pub s3: Option<S3Config>,
    pub command: Option<JsonCommands>,
}

// Application's internal configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Local { path: PathBuf },
    S3(S3Config),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server and database backups are taken from.
    pub source: ConnectionParams,
    /// Server and database restores go to. Same as `source` unless `dest` is set.
    pub destination: ConnectionParams,
    pub storage: StorageConfig,
    pub temporary_path: PathBuf,
    pub maintenance_db: String,
    pub dump_command: String,
    pub restore_command: String,
    pub command_timeout: Option<Duration>,
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        Self::from_json_str(&config_content).with_context(|| {
            format!("Invalid configuration in {}", config_path.display())
        })
    }

    pub fn from_json_str(config_content: &str) -> Result<Self> {
        let raw: RawJsonConfig =
            serde_json::from_str(config_content).context("Failed to parse JSON configuration")?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawJsonConfig) -> Result<Self> {
        let destination = raw.dest.unwrap_or_else(|| raw.src.clone());
        validate_identifier(&raw.src.database).context("src.db is not a usable database name")?;
        validate_identifier(&destination.database)
            .context("dest.db is not a usable database name")?;

        let setup = raw.setup.unwrap_or(JsonSetup {
            engine: StorageEngine::Local,
            temporary_path: None,
            maintenance_db: None,
            command_timeout_secs: None,
        });

        let storage = match setup.engine {
            StorageEngine::Local => StorageConfig::Local {
                path: raw
                    .local_storage
                    .and_then(|local| local.path)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCAL_STORAGE_PATH)),
            },
            StorageEngine::S3 => {
                let s3 = raw
                    .s3
                    .context("setup.engine is S3 but the S3 section is missing")?;
                if s3.bucket_name.trim().is_empty() {
                    anyhow::bail!("S3.bucket_name cannot be empty");
                }
                StorageConfig::S3(S3Config {
                    region: s3.region.filter(|s| !s.is_empty()),
                    endpoint_url: s3.endpoint_url.filter(|s| !s.is_empty()),
                    access_key_id: s3.access_key_id.filter(|s| !s.is_empty()),
                    secret_access_key: s3.secret_access_key.filter(|s| !s.is_empty()),
                    ..s3
                })
            }
        };

        let temporary_path = setup
            .temporary_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPORARY_PATH));
        if temporary_path.as_os_str().is_empty() {
            anyhow::bail!("setup.temporary_path cannot be empty");
        }

        let maintenance_db = setup
            .maintenance_db
            .unwrap_or_else(|| DEFAULT_MAINTENANCE_DB.to_string());
        validate_identifier(&maintenance_db)
            .context("setup.maintenance_db is not a usable database name")?;

        let commands = raw.command.unwrap_or(JsonCommands {
            dump: None,
            restore: None,
        });
        let dump_command = non_blank(commands.dump, DEFAULT_DUMP_COMMAND);
        let restore_command = non_blank(commands.restore, DEFAULT_RESTORE_COMMAND);

        Ok(AppConfig {
            source: raw.src,
            destination,
            storage,
            temporary_path,
            maintenance_db,
            dump_command,
            restore_command,
            command_timeout: setup
                .command_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        })
    }
}

fn non_blank(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
