//! Centralized path utilities

use std::path::PathBuf;

const CONFIG_DIR_NAME: &str = ".waypoint";

/// Get the waypoint config directory (~/.waypoint)
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Get the default config file (~/.waypoint/config.toml)
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_nest_under_config_dir() {
        let root = config_dir();
        assert!(root.ends_with(CONFIG_DIR_NAME));
        assert_eq!(config_path().parent(), Some(root.as_path()));
    }
}
