//! Application settings loaded via OrthoConfig.
//!
//! Every field can be set from the command line, a `BEACON_*` environment
//! variable or a configuration file. Optional fields fall back to the
//! defaults exposed by the accessor methods.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::domain::{CONNECT_SWEEP_DAYS, DEFAULT_RETENTION_DAYS};
use crate::inbound::ws::Heartbeat;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SESSION_KEY_FILE: &str = "/var/run/secrets/session_key";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000";
const DEFAULT_AVATAR_DIR: &str = "uploads/avatars";

#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "BEACON")]
pub struct AppSettings {
    /// Interface to bind.
    pub host: Option<String>,
    pub port: Option<u16>,
    /// PostgreSQL URL. Users and conversations stay in memory when unset.
    pub database_url: Option<String>,
    /// Redis URL. Notifications stay in memory when unset.
    pub redis_url: Option<String>,
    pub session_key_file: Option<PathBuf>,
    /// Mark the session cookie `Secure`.
    #[ortho_config(default = true)]
    pub session_cookie_secure: bool,
    /// `Strict`, `Lax` or `None`. Defaults to `Lax`.
    pub session_same_site: Option<String>,
    /// Accept a generated session key when the key file is unreadable.
    #[ortho_config(default = false)]
    pub session_allow_ephemeral: bool,
    /// Comma-separated WebSocket origin rules, e.g.
    /// `https://beacon.example,https://*.beacon.example`.
    pub allowed_origins: Option<String>,
    /// Seconds between WebSocket pings.
    pub ws_heartbeat_secs: Option<u64>,
    /// Seconds of client silence before a WebSocket is closed.
    pub ws_idle_timeout_secs: Option<u64>,
    pub connect_sweep_days: Option<u32>,
    pub retention_days: Option<u32>,
    /// Directory holding uploaded avatar files.
    pub avatar_dir: Option<PathBuf>,
}

impl AppSettings {
    #[must_use]
    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Socket address built from [`Self::host`] and [`Self::port`].
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host(), self.port()).parse()
    }

    #[must_use]
    pub fn session_key_file(&self) -> PathBuf {
        self.session_key_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_KEY_FILE))
    }

    /// Origin rules with surrounding whitespace and empty entries removed.
    #[must_use]
    pub fn allowed_origins(&self) -> Vec<&str> {
        self.allowed_origins
            .as_deref()
            .unwrap_or(DEFAULT_ALLOWED_ORIGINS)
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .collect()
    }

    /// WebSocket heartbeat. Unset or zero parts fall back to
    /// [`Heartbeat::default`].
    #[must_use]
    pub fn heartbeat(&self) -> Heartbeat {
        let defaults = Heartbeat::default();
        let secs = |raw: Option<u64>, fallback| {
            raw.filter(|secs| *secs > 0)
                .map_or(fallback, Duration::from_secs)
        };
        Heartbeat {
            interval: secs(self.ws_heartbeat_secs, defaults.interval),
            idle_timeout: secs(self.ws_idle_timeout_secs, defaults.idle_timeout),
        }
    }

    #[must_use]
    pub fn connect_sweep_days(&self) -> u32 {
        self.connect_sweep_days.unwrap_or(CONNECT_SWEEP_DAYS)
    }

    #[must_use]
    pub fn retention_days(&self) -> u32 {
        self.retention_days.unwrap_or(DEFAULT_RETENTION_DAYS)
    }

    #[must_use]
    pub fn avatar_dir(&self) -> PathBuf {
        self.avatar_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_AVATAR_DIR))
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for settings parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const VARS: [&str; 15] = [
        "BEACON_HOST",
        "BEACON_PORT",
        "BEACON_DATABASE_URL",
        "BEACON_REDIS_URL",
        "BEACON_SESSION_KEY_FILE",
        "BEACON_SESSION_COOKIE_SECURE",
        "BEACON_SESSION_SAME_SITE",
        "BEACON_SESSION_ALLOW_EPHEMERAL",
        "BEACON_ALLOWED_ORIGINS",
        "BEACON_WS_HEARTBEAT_SECS",
        "BEACON_WS_IDLE_TIMEOUT_SECS",
        "BEACON_CONNECT_SWEEP_DAYS",
        "BEACON_RETENTION_DAYS",
        "BEACON_AVATAR_DIR",
        "BEACON_CONFIG_PATH",
    ];

    /// Every variable unset except the given overrides.
    fn env_with(overrides: &[(&str, &str)]) -> Vec<(&'static str, Option<String>)> {
        VARS.iter()
            .map(|name| {
                let value = overrides
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| (*value).to_owned());
                (*name, value)
            })
            .collect()
    }

    fn load_from_empty_args() -> AppSettings {
        AppSettings::load_from_iter([OsString::from("beacon")]).expect("config should load")
    }

    #[rstest]
    fn default_values_are_used_when_missing() {
        let _guard = lock_env(env_with(&[]));

        let settings = load_from_empty_args();
        assert_eq!(settings.host(), DEFAULT_HOST);
        assert_eq!(settings.port(), DEFAULT_PORT);
        assert!(settings.database_url.is_none());
        assert!(settings.redis_url.is_none());
        assert!(settings.session_cookie_secure);
        assert!(!settings.session_allow_ephemeral);
        assert_eq!(settings.allowed_origins(), vec![DEFAULT_ALLOWED_ORIGINS]);
        assert_eq!(settings.connect_sweep_days(), 15);
        assert_eq!(settings.heartbeat(), Heartbeat::default());
        assert_eq!(settings.retention_days(), 30);
        assert_eq!(
            settings.session_key_file(),
            PathBuf::from(DEFAULT_SESSION_KEY_FILE)
        );
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env(env_with(&[
            ("BEACON_HOST", "127.0.0.1"),
            ("BEACON_PORT", "9000"),
            ("BEACON_SESSION_COOKIE_SECURE", "false"),
            (
                "BEACON_ALLOWED_ORIGINS",
                "https://beacon.example, https://*.beacon.example,",
            ),
            ("BEACON_CONNECT_SWEEP_DAYS", "7"),
            ("BEACON_WS_HEARTBEAT_SECS", "0"),
            ("BEACON_WS_IDLE_TIMEOUT_SECS", "30"),
            ("BEACON_AVATAR_DIR", "/srv/avatars"),
        ]));

        let settings = load_from_empty_args();
        assert_eq!(
            settings.bind_addr().expect("valid address"),
            "127.0.0.1:9000".parse().expect("socket address")
        );
        assert!(!settings.session_cookie_secure);
        assert_eq!(
            settings.allowed_origins(),
            vec!["https://beacon.example", "https://*.beacon.example"]
        );
        assert_eq!(settings.connect_sweep_days(), 7);
        assert_eq!(
            settings.heartbeat(),
            Heartbeat {
                interval: Duration::from_secs(5),
                idle_timeout: Duration::from_secs(30),
            }
        );
        assert_eq!(settings.avatar_dir(), PathBuf::from("/srv/avatars"));
    }
}
