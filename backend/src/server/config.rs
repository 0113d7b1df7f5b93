//! HTTP server configuration object and helpers.

use std::net::SocketAddr;
use std::path::PathBuf;

use actix_web::cookie::{Key, SameSite};
use beacon::inbound::http::session_config::SessionSettings;
use beacon::inbound::ws::{Heartbeat, OriginPolicy};

#[cfg(feature = "metrics")]
use actix_web_prom::PrometheusMetrics;

/// Builder-style configuration for creating the HTTP server.
pub struct ServerConfig {
    pub(crate) key: Key,
    pub(crate) cookie_secure: bool,
    pub(crate) same_site: SameSite,
    pub(crate) bind_addr: SocketAddr,
    pub(crate) origins: OriginPolicy,
    pub(crate) heartbeat: Heartbeat,
    pub(crate) database_url: Option<String>,
    pub(crate) redis_url: Option<String>,
    pub(crate) avatar_dir: PathBuf,
    pub(crate) connect_sweep_days: u32,
    pub(crate) retention_days: u32,
    #[cfg(feature = "metrics")]
    pub(crate) prometheus: Option<PrometheusMetrics>,
}

impl ServerConfig {
    /// Configuration over in-memory stores with default housekeeping.
    #[must_use]
    pub fn new(
        session: SessionSettings,
        bind_addr: SocketAddr,
        origins: OriginPolicy,
        avatar_dir: PathBuf,
    ) -> Self {
        let SessionSettings {
            key,
            cookie_secure,
            same_site,
        } = session;
        Self {
            key,
            cookie_secure,
            same_site,
            bind_addr,
            origins,
            heartbeat: Heartbeat::default(),
            database_url: None,
            redis_url: None,
            avatar_dir,
            connect_sweep_days: beacon::domain::CONNECT_SWEEP_DAYS,
            retention_days: beacon::domain::DEFAULT_RETENTION_DAYS,
            #[cfg(feature = "metrics")]
            prometheus: None,
        }
    }

    /// Keep users and conversations in PostgreSQL.
    #[must_use]
    pub fn with_database_url(mut self, url: Option<String>) -> Self {
        self.database_url = url;
        self
    }

    /// Keep notification logs in Redis.
    #[must_use]
    pub fn with_redis_url(mut self, url: Option<String>) -> Self {
        self.redis_url = url;
        self
    }

    #[must_use]
    pub fn with_sweeps(mut self, connect_sweep_days: u32, retention_days: u32) -> Self {
        self.connect_sweep_days = connect_sweep_days;
        self.retention_days = retention_days;
        self
    }

    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    #[cfg(feature = "metrics")]
    /// Attach Prometheus middleware to the configuration.
    #[must_use]
    pub fn with_metrics(mut self, prometheus: Option<PrometheusMetrics>) -> Self {
        self.prometheus = prometheus;
        self
    }
}
