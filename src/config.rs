//! Daemon configuration — CLI/env layered over an optional `config.toml`,
//! following the teacher's `DaemonConfig` layering (CLI/env > TOML > default).

use std::path::PathBuf;

use serde::Deserialize;
use tracing::error;

const DEFAULT_PORT: u16 = 24880;

#[derive(Deserialize, Default)]
struct TomlConfig {
    port: Option<u16>,
    root: Option<PathBuf>,
    log: Option<String>,
}

fn load_toml(data_dir: &std::path::Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    /// Mesh data root (`MESHGATE_ROOT`) — discover resolves relative paths
    /// against this directory.
    pub root: PathBuf,
    pub log: String,
}

impl GatewayConfig {
    pub fn new(port: Option<u16>, root: Option<PathBuf>, log: Option<String>) -> Self {
        let data_dir = root.clone().unwrap_or_else(default_root);
        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port
            .or_else(|| std::env::var("MESHGATE_PORT").ok().and_then(|s| s.parse().ok()))
            .or(toml.port)
            .unwrap_or(DEFAULT_PORT);

        let root = root
            .or_else(|| std::env::var("MESHGATE_ROOT").ok().map(PathBuf::from))
            .or(toml.root)
            .unwrap_or_else(default_root);

        let log = log
            .or_else(|| std::env::var("MESHGATE_LOG").ok())
            .or(toml.log)
            .unwrap_or_else(|| "info".to_string());

        Self { port, root, log }
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self {
            port: 0,
            root: std::env::temp_dir().join("meshgate-test"),
            log: "error".to_string(),
        }
    }
}

fn default_root() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("meshgate");
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("meshgate");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local").join("share").join("meshgate");
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("meshgate");
        }
    }
    PathBuf::from(".meshgate")
}
