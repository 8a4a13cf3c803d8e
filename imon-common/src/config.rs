//! Configuration file discovery and root folder resolution

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{Error, Result};

/// Environment variable consulted for the root folder
pub const ROOT_FOLDER_ENV: &str = "IMON_ROOT_FOLDER";

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file value
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_value: Option<&Path>,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        debug!("Root folder from command line: {}", path.display());
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            debug!("Root folder from {}: {}", env_var_name, path);
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = toml_value {
        debug!("Root folder from TOML config: {}", path.display());
        return path.to_path_buf();
    }

    // Priority 4: OS-dependent compiled default
    get_default_root_folder()
}

/// Locate the TOML config file for a module, if one exists
///
/// Linux checks `~/.config/imon/<module>.toml` then `/etc/imon/<module>.toml`;
/// other platforms only check the user config directory.
pub fn find_config_file(module_name: &str) -> Option<PathBuf> {
    let file_name = format!("{}.toml", module_name);

    let user_config = dirs::config_dir().map(|d| d.join("imon").join(&file_name));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/imon").join(&file_name);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Read and deserialize a TOML file
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML {} failed: {}", path.display(), e)))?;
    let parsed = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML {} failed: {}", path.display(), e)))?;
    info!("Loaded TOML configuration from {}", path.display());
    Ok(parsed)
}

/// Get OS-dependent default root folder path
pub fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/imon (or /var/lib/imon for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("imon"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/imon"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("imon"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/imon"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("imon"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\imon"))
    } else {
        PathBuf::from("./imon_data")
    }
}

/// Directory layout under the resolved root folder
#[derive(Debug, Clone)]
pub struct RootFolder {
    root: PathBuf,
}

impl RootFolder {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// SQLite database file
    pub fn database_path(&self) -> PathBuf {
        self.root.join("imon.db")
    }

    /// Published (verified) donation media
    pub fn donations_dir(&self) -> PathBuf {
        self.root.join("donations")
    }

    /// Staging area for donations awaiting a verdict
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join("unverified_donations")
    }

    /// Create the root folder and its media directories if missing
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [self.root.clone(), self.donations_dir(), self.staging_dir()] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)?;
                info!("Created directory: {}", dir.display());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_root_folder_not_empty() {
        assert!(!get_default_root_folder().as_os_str().is_empty());
    }

    #[test]
    fn test_cli_argument_wins() {
        let cli = PathBuf::from("/tmp/imon-cli");
        let toml = PathBuf::from("/tmp/imon-toml");
        let resolved = resolve_root_folder(Some(&cli), "IMON_TEST_UNSET_VAR", Some(&toml));
        assert_eq!(resolved, cli);
    }

    #[test]
    fn test_toml_used_when_no_cli_or_env() {
        let toml = PathBuf::from("/tmp/imon-toml");
        let resolved = resolve_root_folder(None, "IMON_TEST_UNSET_VAR", Some(&toml));
        assert_eq!(resolved, toml);
    }

    #[test]
    fn test_ensure_directories_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = RootFolder::new(dir.path().join("nested"));
        root.ensure_directories().unwrap();
        assert!(root.donations_dir().is_dir());
        assert!(root.staging_dir().is_dir());
        assert_eq!(root.database_path(), dir.path().join("nested").join("imon.db"));
    }

    #[test]
    fn test_load_toml_reports_parse_errors() {
        #[derive(serde::Deserialize)]
        #[allow(dead_code)]
        struct Sample {
            port: u16,
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();
        assert!(matches!(load_toml::<Sample>(&path), Err(Error::Config(_))));
    }
}
