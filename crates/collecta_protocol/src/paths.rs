use std::path::PathBuf;

/// Resolve the Collecta home directory.
///
/// Priority:
/// 1) COLLECTA_HOME
/// 2) the user's home directory
/// 3) ./.collecta
pub fn collecta_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("COLLECTA_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .map(|home| home.join(".collecta"))
        .unwrap_or_else(|| PathBuf::from(".").join(".collecta"))
}

/// Default logs directory: ~/.collecta/logs
pub fn default_logs_dir() -> PathBuf {
    collecta_home().join("logs")
}
