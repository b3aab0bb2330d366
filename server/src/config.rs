use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use voxel_shared::WorldBounds;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub bounds: WorldBounds,
    /// JSON snapshot location, read at startup and written by autosave
    pub save_path: PathBuf,
    pub autosave_interval: Duration,
    /// Connections beyond this are refused before the upgrade
    pub max_players: usize,
    /// Directory served for unmatched routes (client build output)
    pub static_dir: Option<PathBuf>,
    /// Allowed CORS origins. Empty means permissive.
    pub cors_origins: Vec<String>,
    /// Per-session outbound queue length; a session that overflows it is disconnected
    pub outbound_queue: usize,
    /// Inbound frames larger than this close the connection
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            bounds: WorldBounds::default(),
            save_path: PathBuf::from("data/world.json"),
            autosave_interval: Duration::from_secs(300),
            max_players: 50,
            static_dir: None,
            cors_origins: Vec::new(),
            outbound_queue: 256,
            max_frame_bytes: 4096,
        }
    }
}

impl ServerConfig {
    /// Build from process environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys keep their defaults;
    /// set but unparseable keys are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let defaults = Self::default();

        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = parse_var(&lookup, "PORT", 8000)?;
        let world_size: i32 = parse_var(&lookup, "WORLD_SIZE", 100)?;
        let max_height: i32 = parse_var(&lookup, "MAX_HEIGHT", 50)?;
        let autosave_secs: u64 = parse_var(&lookup, "AUTOSAVE_INTERVAL", 300)?;

        Ok(Self {
            listen_addr: format!("{}:{}", host, port),
            bounds: WorldBounds::from_size(world_size, max_height),
            save_path: lookup("SAVE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.save_path),
            autosave_interval: Duration::from_secs(autosave_secs),
            max_players: parse_var(&lookup, "MAX_PLAYERS", defaults.max_players)?,
            static_dir: lookup("STATIC_DIR")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            cors_origins: lookup("CORS_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            outbound_queue: parse_var(&lookup, "OUTBOUND_QUEUE", defaults.outbound_queue)?,
            max_frame_bytes: parse_var(&lookup, "MAX_FRAME_BYTES", defaults.max_frame_bytes)?,
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.bounds.is_valid() {
            return Err(format!("world bounds are empty: {:?}", self.bounds));
        }
        if self.autosave_interval.is_zero() {
            return Err("autosave interval must be greater than zero".to_string());
        }
        if self.max_players == 0 {
            return Err("max_players must be greater than zero".to_string());
        }
        if self.outbound_queue == 0 {
            return Err("outbound_queue must be greater than zero".to_string());
        }
        if self.max_frame_bytes == 0 {
            return Err("max_frame_bytes must be greater than zero".to_string());
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, String> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("{} has invalid value {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = ServerConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:8000");
        assert_eq!(config.bounds, WorldBounds::default());
        assert_eq!(config.autosave_interval, Duration::from_secs(300));
        assert!(config.static_dir.is_none());
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn environment_overrides_are_applied() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "9100"),
            ("WORLD_SIZE", "40"),
            ("MAX_HEIGHT", "30"),
            ("AUTOSAVE_INTERVAL", "60"),
            ("CORS_ORIGINS", "http://localhost:3000, https://example.org,"),
            ("SAVE_PATH", "/tmp/voxels.json"),
        ]))
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9100");
        assert_eq!(config.bounds.max_x, 20);
        assert_eq!(config.bounds.min_z, -20);
        assert_eq!(config.bounds.max_y, 30);
        assert_eq!(config.autosave_interval, Duration::from_secs(60));
        assert_eq!(
            config.cors_origins,
            vec!["http://localhost:3000", "https://example.org"]
        );
        assert_eq!(config.save_path, PathBuf::from("/tmp/voxels.json"));
    }

    #[test]
    fn unparseable_value_is_an_error() {
        let err = ServerConfig::from_lookup(lookup_from(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.contains("PORT"));
    }

    #[test]
    fn validate_rejects_zero_limits() {
        let config = ServerConfig {
            outbound_queue: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            autosave_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_negative_height() {
        let config = ServerConfig {
            bounds: WorldBounds::from_size(100, -1),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
