//! Beacon server entry-point: loads settings, wires adapters and serves the
//! REST API, the WebSocket endpoint and health probes.

mod server;

use actix_web::web;
use color_eyre::eyre::WrapErr;
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use beacon::inbound::http::health::HealthState;
use beacon::inbound::http::session_config::{BuildMode, session_settings};
use beacon::inbound::ws::OriginPolicy;
use beacon::settings::AppSettings;

use server::{ServerConfig, create_server};

#[actix_web::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = AppSettings::load().wrap_err("failed to load settings")?;
    let session = session_settings(&settings, BuildMode::from_debug_assertions())
        .wrap_err("invalid session configuration")?;
    let origins = OriginPolicy::parse(settings.allowed_origins())
        .wrap_err("invalid allowed origins")?;
    let bind_addr = settings.bind_addr().wrap_err("invalid bind address")?;

    let config = ServerConfig::new(session, bind_addr, origins, settings.avatar_dir())
        .with_database_url(settings.database_url.clone())
        .with_redis_url(settings.redis_url.clone())
        .with_sweeps(settings.connect_sweep_days(), settings.retention_days())
        .with_heartbeat(settings.heartbeat());
    #[cfg(feature = "metrics")]
    let config = config.with_metrics(server::initialize_metrics());

    let health_state = web::Data::new(HealthState::new());
    let server = create_server(health_state, config)
        .await
        .wrap_err("failed to start server")?;
    info!(%bind_addr, "beacon listening");
    server.await.wrap_err("server terminated")?;
    Ok(())
}
