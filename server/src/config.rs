use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Top-level server configuration, loaded from tutorboard.toml.
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub sessions: SessionsSection,
}

#[derive(Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub web_address: String,
    /// Origin allowed to call the API (CORS). Localhost values allow any origin.
    pub public_url: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            web_address: "0.0.0.0:5001".into(),
            public_url: "http://localhost:5001".into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct SessionsSection {
    /// Sessions idle longer than this many hours are evicted.
    pub retention_hours: i64,
    /// How often the housekeeping sweep runs, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for SessionsSection {
    fn default() -> Self {
        Self {
            retention_hours: 24,
            sweep_interval_secs: 3600,
        }
    }
}

impl ServerConfig {
    /// Load config from a TOML file. Falls back to defaults if the file doesn't exist.
    /// Environment variables override TOML values.
    pub fn load(path: &str) -> Self {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)
                .unwrap_or_else(|e| panic!("failed to read config file {}: {}", path, e));
            toml::from_str(&contents)
                .unwrap_or_else(|e| panic!("failed to parse config file {}: {}", path, e))
        } else {
            info!("No config file found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("WEB_ADDRESS") {
            self.server.web_address = v;
        }
        if let Ok(v) = std::env::var("PUBLIC_URL") {
            self.server.public_url = v;
        }
        if let Ok(v) = std::env::var("SESSION_RETENTION_HOURS")
            && let Ok(hours) = v.parse()
        {
            self.sessions.retention_hours = hours;
        }
        if let Ok(v) = std::env::var("SWEEP_INTERVAL_SECS")
            && let Ok(secs) = v.parse()
        {
            self.sessions.sweep_interval_secs = secs;
        }
    }
}
