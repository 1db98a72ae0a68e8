//! Configuration loading for the telemetry server

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use model::{Geofence, LinkConfig, LinkKind};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    /// Viewer listen address (default: 0.0.0.0:3001)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Push period per viewer in milliseconds (default: 1000)
    #[serde(default = "default_broadcast_interval_ms")]
    pub broadcast_interval_ms: u64,

    /// Where to write the lap log on shutdown; `.ndjson` selects NDJSON, otherwise CSV
    #[serde(default)]
    pub lap_log_path: Option<PathBuf>,

    #[serde(default)]
    pub geofence: Geofence,

    #[serde(default = "default_links")]
    pub links: Vec<LinkConfig>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".into()
}

fn default_broadcast_interval_ms() -> u64 {
    1000
}

fn default_links() -> Vec<LinkConfig> {
    vec![
        LinkConfig::new("COM4", "COM4", 9600, LinkKind::Battery),
        LinkConfig::new("COM10", "COM10", 9600, LinkKind::Battery),
        LinkConfig::new("COM7", "COM7", 9600, LinkKind::Gps),
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            broadcast_interval_ms: default_broadcast_interval_ms(),
            lap_log_path: None,
            geofence: Geofence::default(),
            links: default_links(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        text.parse()
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.broadcast_interval_ms == 0 {
            return Err(ConfigError::Invalid("broadcast_interval_ms must be positive".into()));
        }
        let g = &self.geofence;
        if g.min_lat > g.max_lat || g.min_lng > g.max_lng {
            return Err(ConfigError::Invalid(format!("geofence bounds are inverted: {g:?}")));
        }
        let mut seen = HashSet::new();
        for l in &self.links {
            if !seen.insert(&l.link_id) {
                return Err(ConfigError::Invalid(format!("duplicate link id {}", l.link_id)));
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for ServerConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cfg: ServerConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg: ServerConfig = "".parse().unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:3001");
        assert_eq!(cfg.broadcast_interval(), Duration::from_secs(1));
        assert_eq!(cfg.geofence, Geofence::default());
        let ids: Vec<_> = cfg.links.iter().map(|l| l.link_id.as_str()).collect();
        assert_eq!(ids, ["COM4", "COM10", "COM7"]);
        assert!(cfg.lap_log_path.is_none());
    }

    #[test]
    fn full_file() {
        let cfg: ServerConfig = r#"
            bind_addr = "127.0.0.1:9000"
            broadcast_interval_ms = 250
            lap_log_path = "laps.ndjson"

            [geofence]
            min_lat = 1.0
            max_lat = 2.0
            min_lng = 3.0
            max_lng = 4.0

            [[links]]
            link_id = "pack"
            path = "/dev/ttyUSB0"
            baud_rate = 115200
            kind = "battery"

            [[links]]
            link_id = "gps"
            path = "/dev/ttyACM0"
            kind = "gps"
        "#
        .parse()
        .unwrap();
        assert_eq!(cfg.broadcast_interval(), Duration::from_millis(250));
        assert_eq!(cfg.lap_log_path.as_deref(), Some(Path::new("laps.ndjson")));
        assert!(cfg.geofence.contains(1.5, 3.5));
        assert_eq!(cfg.links.len(), 2);
        assert_eq!(cfg.links[0].baud_rate, 115200);
        assert_eq!(cfg.links[1].baud_rate, 9600);
        assert_eq!(cfg.links[1].kind, LinkKind::Gps);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            "broadcast_interval_ms = 0".parse::<ServerConfig>(),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            "[geofence]\nmin_lat = 2.0\nmax_lat = 1.0\nmin_lng = 0.0\nmax_lng = 1.0".parse::<ServerConfig>(),
            Err(ConfigError::Invalid(_))
        ));
        let dup = r#"
            [[links]]
            link_id = "a"
            path = "x"
            kind = "gps"
            [[links]]
            link_id = "a"
            path = "y"
            kind = "battery"
        "#;
        assert!(matches!(dup.parse::<ServerConfig>(), Err(ConfigError::Invalid(_))));
        assert!(matches!("links = 3".parse::<ServerConfig>(), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_file_names_path() {
        let err = ServerConfig::load(Path::new("/nonexistent/pitwall.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/pitwall.toml"));
    }
}
