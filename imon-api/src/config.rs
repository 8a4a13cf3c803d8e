//! Configuration for imon-api
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments (each also readable from an `IMON_*` variable)
//! 2. TOML configuration file (`--config`, else the per-user config directory)
//! 3. Built-in defaults
//!
//! The root folder additionally honours `IMON_ROOT_FOLDER` ahead of the TOML
//! value, and falls back to an OS-dependent data directory.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use crate::services::{ConsensusPolicy, IntakeSettings, DEFAULT_ABUSE_THRESHOLD};
use crate::PipelineSettings;
use imon_common::config::{find_config_file, load_toml, resolve_root_folder, RootFolder, ROOT_FOLDER_ENV};
use imon_common::{Error, Result};

/// Config file name under `<config_dir>/imon/`
pub const MODULE_NAME: &str = "imon-api";

/// Wordlist file name under the root folder when none is configured
pub const DEFAULT_WORDLIST_FILE: &str = "wordlist.txt";

const DEFAULT_LOG_FILTER: &str = "imon_api=info,tower_http=info";
const RELEASE_LOG_FILTER: &str = "imon_api=warn,tower_http=warn";

/// Persistence backend for donation records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    /// Process-local; everything is lost on exit
    Memory,
}

/// Command-line arguments for imon-api
#[derive(Parser, Debug, Default)]
#[command(name = "imon-api")]
#[command(about = "Photo donation and consensus validation service")]
#[command(version)]
pub struct CliArgs {
    /// TOML configuration file
    #[arg(short, long, env = "IMON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root folder holding the database and media directories
    #[arg(short, long)]
    pub root_folder: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "IMON_HOST")]
    pub host: Option<IpAddr>,

    /// Port to listen on
    #[arg(short, long, env = "IMON_PORT")]
    pub port: Option<u16>,

    /// Wordlist file, one label per line
    #[arg(short, long, env = "IMON_WORDLIST")]
    pub wordlist: Option<PathBuf>,

    /// Persistence backend
    #[arg(long, value_enum, env = "IMON_STORE")]
    pub store: Option<StoreBackend>,

    /// Quieter default logging
    #[arg(long, env = "IMON_RELEASE")]
    pub release: bool,
}

/// Contents of the TOML configuration file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub host: IpAddr,
    pub port: u16,
    pub wordlist: Option<PathBuf>,
    pub store: StoreBackend,
    pub max_upload_bytes: usize,
    pub abuse_threshold: u64,
    pub consensus: ConsensusPolicy,
    pub intake: IntakeSettings,
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: default_port(),
            wordlist: None,
            store: StoreBackend::default(),
            max_upload_bytes: default_max_upload_bytes(),
            abuse_threshold: DEFAULT_ABUSE_THRESHOLD,
            consensus: ConsensusPolicy::default(),
            intake: IntakeSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// `[logging]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `debug` or `imon_api=debug,tower_http=warn`
    pub level: Option<String>,
}

fn default_port() -> u16 {
    8081
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub root: RootFolder,
    pub bind_addr: SocketAddr,
    pub wordlist_path: PathBuf,
    pub store: StoreBackend,
    pub pipeline: PipelineSettings,
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    pub log_filter: String,
    /// TOML file the settings were read from, if any
    pub source: Option<PathBuf>,
}

impl Config {
    /// Merge CLI arguments, environment, TOML file and defaults
    pub fn resolve(args: &CliArgs) -> Result<Self> {
        let source = match &args.config {
            Some(path) if !path.exists() => {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )))
            }
            Some(path) => Some(path.clone()),
            None => find_config_file(MODULE_NAME),
        };

        let toml_config: TomlConfig = match &source {
            Some(path) => load_toml(path)?,
            None => TomlConfig::default(),
        };

        Self::from_parts(args, toml_config, source)
    }

    /// Merge already-parsed sources; the TOML layer is given explicitly
    pub fn from_parts(args: &CliArgs, toml_config: TomlConfig, source: Option<PathBuf>) -> Result<Self> {
        let root = RootFolder::new(resolve_root_folder(
            args.root_folder.as_deref(),
            ROOT_FOLDER_ENV,
            toml_config.root_folder.as_deref(),
        ));

        let wordlist_path = args
            .wordlist
            .clone()
            .or(toml_config.wordlist)
            .unwrap_or_else(|| root.path().join(DEFAULT_WORDLIST_FILE));

        let host = args.host.unwrap_or(toml_config.host);
        let port = args.port.unwrap_or(toml_config.port);

        toml_config
            .consensus
            .validate()
            .map_err(|e| Error::Config(format!("[consensus] {}", e)))?;
        if toml_config.abuse_threshold == 0 {
            return Err(Error::Config("abuse_threshold must be at least 1".to_string()));
        }
        if toml_config.max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be at least 1".to_string()));
        }

        let log_filter = match toml_config.logging.level {
            Some(level) if !level.trim().is_empty() => level,
            _ if args.release => RELEASE_LOG_FILTER.to_string(),
            _ => DEFAULT_LOG_FILTER.to_string(),
        };

        Ok(Self {
            root,
            bind_addr: SocketAddr::new(host, port),
            wordlist_path,
            store: args.store.unwrap_or(toml_config.store),
            pipeline: PipelineSettings {
                consensus: toml_config.consensus,
                intake: toml_config.intake,
                abuse_threshold: toml_config.abuse_threshold,
                max_upload_bytes: toml_config.max_upload_bytes,
            },
            log_filter,
            source,
        })
    }
}
