//! Configuration for the `planverse` command-line client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/planverse/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;

use planverse_proto::{CollectionPath, PathError, Priority};

use crate::sync::DEFAULT_FAILURE_BUFFER;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// No user id was given on the command line, in the environment or in
    /// the config file.
    #[error("no user id configured (use --user, PLANVERSE_USER or [sync] user_id)")]
    MissingUserId,

    /// The configured user id cannot address a collection.
    #[error(transparent)]
    Path(#[from] PathError),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    store: StoreFileConfig,
    sync: SyncFileConfig,
}

/// `[store]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StoreFileConfig {
    backend: Option<StoreBackend>,
    data_dir: Option<PathBuf>,
}

/// `[sync]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    user_id: Option<String>,
    failure_buffer: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Which task store the client talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// JSON files under the data directory.
    #[default]
    File,
    /// Process-local store; nothing survives exit.
    Memory,
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct PlanverseConfig {
    /// Store backend.
    pub backend: StoreBackend,
    /// Root directory of the file store.
    pub data_dir: PathBuf,
    /// Owner of the task collection.
    pub user_id: Option<String>,
    /// Capacity of the failure notification channel.
    pub failure_buffer: usize,
}

impl Default for PlanverseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            data_dir: default_data_dir(),
            user_id: None,
            failure_buffer: DEFAULT_FAILURE_BUFFER,
        }
    }
}

impl PlanverseConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// Otherwise the default path is tried and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `PlanverseConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            backend: cli
                .backend
                .or(file.store.backend)
                .unwrap_or(defaults.backend),
            data_dir: cli
                .data_dir
                .clone()
                .or_else(|| file.store.data_dir.clone())
                .unwrap_or(defaults.data_dir),
            user_id: cli.user.clone().or_else(|| file.sync.user_id.clone()),
            failure_buffer: file
                .sync
                .failure_buffer
                .unwrap_or(defaults.failure_buffer),
        }
    }

    /// Build the task collection path for the configured user.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingUserId`] if no user is configured, or
    /// [`ConfigError::Path`] if the id is not a valid path segment.
    pub fn to_collection_path(&self) -> Result<CollectionPath, ConfigError> {
        let uid = self.user_id.as_deref().ok_or(ConfigError::MissingUserId)?;
        Ok(CollectionPath::tasks_for(uid)?)
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Personal planner with optimistic task sync")]
pub struct CliArgs {
    /// Path to config file (default: `~/.config/planverse/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// User whose task collection to open.
    #[arg(long, env = "PLANVERSE_USER")]
    pub user: Option<String>,

    /// Task store backend.
    #[arg(long, value_enum)]
    pub backend: Option<StoreBackend>,

    /// Root directory of the file store.
    #[arg(long, env = "PLANVERSE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "PLANVERSE_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/planverse.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do; defaults to `list`.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Task commands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show every task, soonest first.
    List,
    /// Add a task.
    Add {
        /// Task title.
        #[arg(long)]
        title: String,
        /// Due date, `YYYY-MM-DD` or RFC 3339.
        #[arg(long)]
        due: String,
        /// Longer description.
        #[arg(long)]
        description: Option<String>,
        /// Priority (low, medium, high).
        #[arg(long, default_value_t = Priority::Medium)]
        priority: Priority,
    },
    /// Change fields of an existing task.
    Edit {
        /// Task id.
        id: String,
        /// New title.
        #[arg(long)]
        title: Option<String>,
        /// New due date.
        #[arg(long)]
        due: Option<String>,
        /// New description.
        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,
        /// Remove the description.
        #[arg(long)]
        clear_description: bool,
        /// New priority.
        #[arg(long)]
        priority: Option<Priority>,
    },
    /// Flip a task between open and done.
    Toggle {
        /// Task id.
        id: String,
    },
    /// Delete a task.
    Remove {
        /// Task id.
        id: String,
    },
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn default_data_dir() -> PathBuf {
    dirs::data_dir().map_or_else(|| PathBuf::from("planverse-data"), |d| d.join("planverse"))
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("planverse").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
