//! Configuration module
//!
//! Server, database, external tool, task queue, workflow and Moab storage
//! settings, all read
//! from the environment (optionally seeded from a `.env` file).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const SERVER_PORT: u16 = 3000;
const MOAB_STORAGE_TRUNK: &str = "sdr2objects";

/// Server and database settings
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_host: String,
    pub server_port: u16,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub environment: String,
    pub log_format: String,
}

/// Executables for each characterization tool. Bare names are resolved on `PATH`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolPaths {
    pub siegfried: String,
    pub exiftool: String,
    pub pdfinfo: String,
    pub pdftotext: String,
    pub mediainfo: String,
    pub ffprobe: String,
    pub ffmpeg: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            siegfried: "sf".to_string(),
            exiftool: "exiftool".to_string(),
            pdfinfo: "pdfinfo".to_string(),
            pdftotext: "pdftotext".to_string(),
            mediainfo: "mediainfo".to_string(),
            ffprobe: "ffprobe".to_string(),
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

impl ToolPaths {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |name: &str, default: String| env::var(name).unwrap_or(default);
        Self {
            siegfried: var("SIEGFRIED_PATH", defaults.siegfried),
            exiftool: var("EXIFTOOL_PATH", defaults.exiftool),
            pdfinfo: var("PDFINFO_PATH", defaults.pdfinfo),
            pdftotext: var("PDFTOTEXT_PATH", defaults.pdftotext),
            mediainfo: var("MEDIAINFO_PATH", defaults.mediainfo),
            ffprobe: var("FFPROBE_PATH", defaults.ffprobe),
            ffmpeg: var("FFMPEG_PATH", defaults.ffmpeg),
        }
    }
}

/// Technical metadata service configuration
#[derive(Clone, Debug)]
pub struct TechMdConfig {
    pub base: BaseConfig,
    pub database_url: String,
    pub tools: ToolPaths,
    /// Upper bound on a single external tool invocation.
    pub tool_timeout_secs: u64,
    pub task_default_lane_workers: usize,
    pub task_low_lane_workers: usize,
    pub task_queue_capacity: usize,
    /// Upper bound on one generation task, covering every file of the druid.
    pub task_timeout_secs: u64,
    pub task_max_retries: u32,
    /// Workflow service base URL. Unset means workflow updates are only logged.
    pub workflow_url: Option<String>,
    pub workflow_timeout_secs: u64,
    /// Storage roots searched, in order, for a druid's Moab.
    pub moab_storage_roots: Vec<PathBuf>,
    /// Directory under each root that holds the druid trees.
    pub moab_storage_trunk: String,
}

impl TechMdConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        const TOOL_TIMEOUT_SECS: u64 = 1800;
        const TASK_DEFAULT_LANE_WORKERS: usize = 4;
        const TASK_LOW_LANE_WORKERS: usize = 1;
        const TASK_QUEUE_CAPACITY: usize = 1000;
        const TASK_TIMEOUT_SECS: u64 = 14400;
        const TASK_MAX_RETRIES: u32 = 3;
        const WORKFLOW_TIMEOUT_SECS: u64 = 30;

        let base = BaseConfig {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("PORT")
                .unwrap_or_else(|_| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
        };

        let config = TechMdConfig {
            base,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            tools: ToolPaths::from_env(),
            tool_timeout_secs: env::var("TOOL_TIMEOUT_SECS")
                .unwrap_or_else(|_| TOOL_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(TOOL_TIMEOUT_SECS),
            task_default_lane_workers: env::var("TASK_DEFAULT_LANE_WORKERS")
                .unwrap_or_else(|_| TASK_DEFAULT_LANE_WORKERS.to_string())
                .parse()
                .unwrap_or(TASK_DEFAULT_LANE_WORKERS),
            task_low_lane_workers: env::var("TASK_LOW_LANE_WORKERS")
                .unwrap_or_else(|_| TASK_LOW_LANE_WORKERS.to_string())
                .parse()
                .unwrap_or(TASK_LOW_LANE_WORKERS),
            task_queue_capacity: env::var("TASK_QUEUE_CAPACITY")
                .unwrap_or_else(|_| TASK_QUEUE_CAPACITY.to_string())
                .parse()
                .unwrap_or(TASK_QUEUE_CAPACITY),
            task_timeout_secs: env::var("TASK_TIMEOUT_SECS")
                .unwrap_or_else(|_| TASK_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(TASK_TIMEOUT_SECS),
            task_max_retries: env::var("TASK_MAX_RETRIES")
                .unwrap_or_else(|_| TASK_MAX_RETRIES.to_string())
                .parse()
                .unwrap_or(TASK_MAX_RETRIES),
            workflow_url: env::var("WORKFLOW_URL")
                .ok()
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            workflow_timeout_secs: env::var("WORKFLOW_TIMEOUT_SECS")
                .unwrap_or_else(|_| WORKFLOW_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(WORKFLOW_TIMEOUT_SECS),
            moab_storage_roots: env::var("MOAB_STORAGE_ROOTS")
                .map(|roots| parse_roots(&roots))
                .unwrap_or_default(),
            moab_storage_trunk: env::var("MOAB_STORAGE_TRUNK")
                .unwrap_or_else(|_| MOAB_STORAGE_TRUNK.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !(self.database_url.starts_with("postgres://")
            || self.database_url.starts_with("postgresql://"))
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.tool_timeout_secs == 0 {
            return Err(anyhow::anyhow!("TOOL_TIMEOUT_SECS must be greater than 0"));
        }

        if self.task_timeout_secs < self.tool_timeout_secs {
            return Err(anyhow::anyhow!(
                "TASK_TIMEOUT_SECS ({}) must not be shorter than TOOL_TIMEOUT_SECS ({})",
                self.task_timeout_secs,
                self.tool_timeout_secs
            ));
        }

        if self.task_default_lane_workers == 0 || self.task_low_lane_workers == 0 {
            return Err(anyhow::anyhow!(
                "TASK_DEFAULT_LANE_WORKERS and TASK_LOW_LANE_WORKERS must be at least 1"
            ));
        }

        if self.task_queue_capacity == 0 {
            return Err(anyhow::anyhow!("TASK_QUEUE_CAPACITY must be at least 1"));
        }

        if let Some(url) = &self.workflow_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(anyhow::anyhow!("WORKFLOW_URL must be an http(s) URL"));
            }
        }

        if self.moab_storage_trunk.trim().is_empty() {
            return Err(anyhow::anyhow!("MOAB_STORAGE_TRUNK must not be empty"));
        }

        Ok(())
    }
}

/// Comma separated paths, blanks skipped.
fn parse_roots(roots: &str) -> Vec<PathBuf> {
    roots
        .split(',')
        .map(str::trim)
        .filter(|root| !root.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<TechMdConfig>);

impl Config {
    fn inner(&self) -> &TechMdConfig {
        &self.0
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = TechMdConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    pub fn is_production(&self) -> bool {
        let environment = self.inner().base.environment.to_lowercase();
        environment == "production" || environment == "prod"
    }

    pub fn server_host(&self) -> &str {
        &self.inner().base.server_host
    }

    pub fn server_port(&self) -> u16 {
        self.inner().base.server_port
    }

    pub fn db_max_connections(&self) -> u32 {
        self.inner().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.inner().base.db_timeout_seconds
    }

    pub fn environment(&self) -> &str {
        &self.inner().base.environment
    }

    pub fn json_logs(&self) -> bool {
        self.inner().base.log_format.eq_ignore_ascii_case("json")
    }

    pub fn database_url(&self) -> &str {
        &self.inner().database_url
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.inner().tools
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.inner().tool_timeout_secs)
    }

    pub fn task_default_lane_workers(&self) -> usize {
        self.inner().task_default_lane_workers
    }

    pub fn task_low_lane_workers(&self) -> usize {
        self.inner().task_low_lane_workers
    }

    pub fn task_queue_capacity(&self) -> usize {
        self.inner().task_queue_capacity
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.inner().task_timeout_secs)
    }

    pub fn task_max_retries(&self) -> u32 {
        self.inner().task_max_retries
    }

    pub fn workflow_url(&self) -> Option<&str> {
        self.inner().workflow_url.as_deref()
    }

    pub fn workflow_timeout(&self) -> Duration {
        Duration::from_secs(self.inner().workflow_timeout_secs)
    }

    pub fn moab_storage_roots(&self) -> &[PathBuf] {
        &self.inner().moab_storage_roots
    }

    pub fn moab_storage_trunk(&self) -> &str {
        &self.inner().moab_storage_trunk
    }
}
