//! Configuration file discovery and generation.
//!
//! # Configuration File Format
//!
//! ```toml
//! [api]
//! base_url = "https://api.jgrants-portal.go.jp/exp/v1/public"
//! timeout_seconds = 30
//! connect_timeout_seconds = 10
//!
//! [cache]
//! directory = "/var/lib/jgrants-mcp/files"
//! download_on_detail = true
//!
//! [extraction]
//! enabled_converters = ["pdf", "docx", "xlsx", "pptx"]
//!
//! [server]
//! host = "127.0.0.1"
//! port = 3000
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

use std::path::{Path, PathBuf};

use super::Config;

/// File name looked up in the working directory
pub const LOCAL_CONFIG_NAME: &str = "jgrants-mcp.toml";

/// Configuration file errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("config file already exists: {0}")]
    AlreadyExists(PathBuf),
}

/// Candidate locations, in lookup order
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_NAME)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("jgrants-mcp").join("config.toml"));
    }
    paths
}

/// Find the first existing configuration file
pub fn find_config_file() -> Option<PathBuf> {
    candidate_paths().into_iter().find(|p| p.is_file())
}

/// Write the default configuration as TOML.
///
/// Refuses to overwrite an existing file unless `force` is set.
pub fn write_default_config(path: &Path, force: bool) -> Result<(), ConfigFileError> {
    if path.exists() && !force {
        return Err(ConfigFileError::AlreadyExists(path.to_path_buf()));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let body = toml::to_string_pretty(&Config::default())?;
    let content = format!(
        "# jgrants-mcp configuration\n# Environment overrides: JGRANTS_<SECTION>__<KEY>\n\n{}",
        body
    );
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use tempfile::tempdir;

    #[test]
    fn test_write_default_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        write_default_config(&path, false).unwrap();
        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.api.timeout_seconds, 30);
        assert_eq!(loaded.server.host, "127.0.0.1");
    }

    #[test]
    fn test_write_default_refuses_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[api]\n").unwrap();

        assert!(matches!(
            write_default_config(&path, false),
            Err(ConfigFileError::AlreadyExists(_))
        ));
        assert!(write_default_config(&path, true).is_ok());
    }

    #[test]
    fn test_load_nonexistent_file_fails() {
        let path = PathBuf::from("/nonexistent/jgrants-mcp.toml");
        assert!(load_config(Some(&path)).is_err());
    }
}
