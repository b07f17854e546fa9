//! Configuration loading and management

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Path to the persisted keystroke counts
    pub analytics_path: PathBuf,

    /// Path to the capture helper binary
    pub helper_path: PathBuf,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::load_with(None, None)
    }

    /// Load configuration with explicit paths taking precedence.
    /// Overridden values never consult the environment.
    pub fn load_with(
        data_dir: Option<PathBuf>,
        helper_path: Option<PathBuf>,
    ) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => match std::env::var_os("KEYSCOPE_DATA_DIR") {
                Some(dir) => PathBuf::from(dir),
                None => {
                    let home = std::env::var("HOME").context("HOME is not set")?;
                    PathBuf::from(home)
                        .join(".local")
                        .join("share")
                        .join("keyscope")
                }
            },
        };

        let helper_path = match helper_path {
            Some(path) => path,
            None => match std::env::var_os("KEYSCOPE_CAPTURE_HELPER") {
                Some(path) => PathBuf::from(path),
                None => default_helper_path()?,
            },
        };

        Ok(Self::with_paths(data_dir, helper_path))
    }

    /// Build a configuration from explicit paths
    pub fn with_paths(data_dir: PathBuf, helper_path: PathBuf) -> Self {
        let socket_path = data_dir.join("keyscoped.sock");
        let analytics_path = data_dir.join("key_analytics.json");

        Self {
            data_dir,
            socket_path,
            analytics_path,
            helper_path,
        }
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

/// The helper ships next to the daemon binary by default
fn default_helper_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("cannot locate current executable")?;
    let dir = exe
        .parent()
        .context("executable has no parent directory")?;
    Ok(dir.join("keyscope-capture"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_paths_lays_out_data_dir() {
        let config = Config::with_paths(
            PathBuf::from("/tmp/keyscope-test"),
            PathBuf::from("/usr/libexec/keyscope-capture"),
        );
        assert_eq!(
            config.socket_path,
            PathBuf::from("/tmp/keyscope-test/keyscoped.sock")
        );
        assert_eq!(
            config.analytics_path,
            PathBuf::from("/tmp/keyscope-test/key_analytics.json")
        );
        assert_eq!(
            config.helper_path,
            PathBuf::from("/usr/libexec/keyscope-capture")
        );
    }

    #[test]
    fn test_data_dir_env_override() {
        std::env::set_var("KEYSCOPE_DATA_DIR", "/tmp/keyscope-env-test");
        let config = Config::load().unwrap();
        std::env::remove_var("KEYSCOPE_DATA_DIR");

        assert!(config.socket_path.to_string_lossy().contains("keyscope-env-test"));
    }

    #[test]
    fn test_explicit_paths_do_not_need_the_environment() {
        let home = std::env::var_os("HOME");
        std::env::remove_var("HOME");

        let config = Config::load_with(
            Some(PathBuf::from("/tmp/keyscope-flag-test")),
            Some(PathBuf::from("/opt/keyscope/keyscope-capture")),
        );

        if let Some(home) = home {
            std::env::set_var("HOME", home);
        }

        let config = config.unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/keyscope-flag-test"));
        assert_eq!(
            config.helper_path,
            PathBuf::from("/opt/keyscope/keyscope-capture")
        );
    }
}
