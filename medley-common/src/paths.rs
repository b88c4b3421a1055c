//! Home, user and configuration path resolution

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Application directory name used below the platform config/cache roots
pub const APP_DIR: &str = "medley";

/// Default configuration file name inside the config directory
pub const CONFIG_FILE_NAME: &str = "medley.toml";

/// Paths cached by an engine instance for its lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancePaths {
    /// The user's home directory
    pub home_dir: PathBuf,
    /// Directory user-relative paths (`~/...`) are expanded against
    pub user_dir: PathBuf,
    /// Configuration file used by load/save
    pub config_file: PathBuf,
}

/// Resolves [`InstancePaths`] from the platform directories
///
/// Priority for the configuration file:
/// 1. `config` option value (a leading `~/` is expanded against the user dir)
/// 2. OS-dependent compiled default (`<config_dir>/medley/medley.toml`)
#[derive(Debug, Clone)]
pub struct PathResolver {
    home_dir: Option<PathBuf>,
    user_dir: Option<PathBuf>,
    config_dir: Option<PathBuf>,
}

impl PathResolver {
    /// Resolver backed by the `dirs` crate for the current platform
    pub fn new() -> Self {
        let user_dir = if cfg!(target_os = "windows") {
            dirs::data_dir()
        } else {
            dirs::home_dir()
        };

        Self {
            home_dir: dirs::home_dir(),
            user_dir,
            config_dir: dirs::config_dir(),
        }
    }

    /// Resolver with explicit directories (embedding and tests)
    pub fn with_dirs(
        home_dir: Option<PathBuf>,
        user_dir: Option<PathBuf>,
        config_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            home_dir,
            user_dir,
            config_dir,
        }
    }

    /// Resolve home, user and configuration file paths
    ///
    /// The user directory falls back to the home directory, and the home
    /// directory falls back to the system temporary directory.
    pub fn resolve(&self, config_override: Option<&str>) -> InstancePaths {
        let home_dir = match &self.home_dir {
            Some(dir) => dir.clone(),
            None => {
                let fallback = std::env::temp_dir();
                warn!(
                    "Could not determine home directory, using {}",
                    fallback.display()
                );
                fallback
            }
        };

        let user_dir = self.user_dir.clone().unwrap_or_else(|| home_dir.clone());

        let config_file = match config_override.filter(|s| !s.is_empty()) {
            Some(raw) => expand_user_prefix(raw, &user_dir),
            None => self.default_config_file(&home_dir),
        };

        debug!(
            "Resolved paths: home={}, user={}, config={}",
            home_dir.display(),
            user_dir.display(),
            config_file.display()
        );

        InstancePaths {
            home_dir,
            user_dir,
            config_file,
        }
    }

    fn default_config_file(&self, home_dir: &Path) -> PathBuf {
        match &self.config_dir {
            Some(dir) => dir.join(APP_DIR).join(CONFIG_FILE_NAME),
            None => home_dir.join(format!(".{}", APP_DIR)).join(CONFIG_FILE_NAME),
        }
    }
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Expand a leading `~/` against `user_dir`
///
/// Only the current user's form is supported. `~name/` paths are returned
/// unchanged.
pub fn expand_user_prefix(raw: &str, user_dir: &Path) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => user_dir.join(rest),
        None => PathBuf::from(raw),
    }
}

/// Default directories scanned for plugin manifests
///
/// `MEDLEY_PLUGIN_PATH` (platform path-list syntax) takes precedence over
/// the per-user data directory.
pub fn default_plugin_dirs() -> Vec<PathBuf> {
    if let Some(raw) = std::env::var_os("MEDLEY_PLUGIN_PATH") {
        return std::env::split_paths(&raw).collect();
    }

    dirs::data_local_dir()
        .map(|d| vec![d.join(APP_DIR).join("plugins")])
        .unwrap_or_default()
}

/// Default plugin cache file location
pub fn default_plugin_cache() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join(APP_DIR).join("plugins.cache.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_user_prefix() {
        let user = PathBuf::from("/home/alice");
        assert_eq!(
            expand_user_prefix("~/conf/medley.toml", &user),
            PathBuf::from("/home/alice/conf/medley.toml")
        );
    }

    #[test]
    fn test_expand_leaves_other_user_form() {
        let user = PathBuf::from("/home/alice");
        assert_eq!(
            expand_user_prefix("~bob/medley.toml", &user),
            PathBuf::from("~bob/medley.toml")
        );
        assert_eq!(
            expand_user_prefix("/etc/medley.toml", &user),
            PathBuf::from("/etc/medley.toml")
        );
    }

    #[test]
    fn test_user_dir_falls_back_to_home() {
        let resolver = PathResolver::with_dirs(Some(PathBuf::from("/home/alice")), None, None);
        let paths = resolver.resolve(None);
        assert_eq!(paths.user_dir, PathBuf::from("/home/alice"));
        assert_eq!(
            paths.config_file,
            PathBuf::from("/home/alice/.medley/medley.toml")
        );
    }

    #[test]
    fn test_config_override_expanded() {
        let resolver = PathResolver::with_dirs(
            Some(PathBuf::from("/home/alice")),
            Some(PathBuf::from("/data/alice")),
            Some(PathBuf::from("/home/alice/.config")),
        );
        let paths = resolver.resolve(Some("~/custom.toml"));
        assert_eq!(paths.config_file, PathBuf::from("/data/alice/custom.toml"));
    }
}
