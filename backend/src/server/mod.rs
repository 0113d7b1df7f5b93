//! Server construction and middleware wiring.

mod config;
#[cfg(feature = "metrics")]
mod metrics;
mod state_builders;

pub use config::ServerConfig;

#[cfg(feature = "metrics")]
use metrics::MetricsLayer;
#[cfg(feature = "metrics")]
pub(crate) use metrics::initialize_metrics;
use state_builders::{AdapterError, build_adapters};

use actix_session::{
    SessionMiddleware,
    config::{CookieContentSecurity, PersistentSession},
    storage::CookieSessionStore,
};
use actix_web::cookie::{Key, SameSite};
use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpServer, web};

use beacon::Trace;
#[cfg(debug_assertions)]
use beacon::doc::ApiDoc;
use beacon::inbound::http::health::{HealthState, live, ready};
use beacon::inbound::http::state::HttpState;
use beacon::inbound::http::{api_scope, json_config};
use beacon::inbound::ws::{self, WsState};
use beacon::wiring::Services;
#[cfg(debug_assertions)]
use utoipa::OpenApi;
#[cfg(debug_assertions)]
use utoipa_swagger_ui::SwaggerUi;

/// Failure to start the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Adapters(#[from] AdapterError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
struct AppDependencies {
    health_state: web::Data<HealthState>,
    http_state: web::Data<HttpState>,
    ws_state: web::Data<WsState>,
    key: Key,
    cookie_secure: bool,
    same_site: SameSite,
}

fn build_app(
    deps: AppDependencies,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let AppDependencies {
        health_state,
        http_state,
        ws_state,
        key,
        cookie_secure,
        same_site,
    } = deps;

    // The WebSocket upgrade reads the same cookie session as the REST API.
    let session = SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_name("session".into())
        .cookie_path("/".into())
        .cookie_secure(cookie_secure)
        .cookie_http_only(true)
        .cookie_content_security(CookieContentSecurity::Private)
        .cookie_same_site(same_site)
        .session_lifecycle(
            PersistentSession::default().session_ttl(actix_web::cookie::time::Duration::hours(2)),
        )
        .build();

    let app = App::new()
        .app_data(health_state)
        .app_data(http_state)
        .app_data(ws_state)
        .app_data(json_config())
        .wrap(session)
        .wrap(Trace)
        .service(api_scope())
        .service(ws::ws_entry)
        .service(ready)
        .service(live);

    #[cfg(debug_assertions)]
    let app = app.service(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));
    #[cfg(not(debug_assertions))]
    let app = app;

    app
}

/// Construct the HTTP server over the adapters named by `config`.
///
/// Readiness is flagged once the listener is bound.
///
/// # Errors
/// Fails when a configured store cannot be prepared or the socket cannot be
/// bound.
pub async fn create_server(
    health_state: web::Data<HealthState>,
    config: ServerConfig,
) -> Result<Server, ServerError> {
    let services = Services::new(build_adapters(&config).await?);
    let http_state = web::Data::new(
        services
            .http_state()
            .with_retention_days(config.retention_days),
    );
    let ws_state = web::Data::new(WsState::new(
        services.dispatcher(config.connect_sweep_days),
        services.auth.clone(),
        config.origins.clone(),
    )
    .with_heartbeat(config.heartbeat));
    let server_health_state = health_state.clone();
    let ServerConfig {
        key,
        cookie_secure,
        same_site,
        bind_addr,
        #[cfg(feature = "metrics")]
        prometheus,
        ..
    } = config;

    #[cfg(feature = "metrics")]
    let metrics_layer = MetricsLayer::from_option(prometheus);

    let server = HttpServer::new(move || {
        let app = build_app(AppDependencies {
            health_state: server_health_state.clone(),
            http_state: http_state.clone(),
            ws_state: ws_state.clone(),
            key: key.clone(),
            cookie_secure,
            same_site,
        });

        #[cfg(feature = "metrics")]
        let app = app.wrap(metrics_layer.clone());

        app
    })
    .bind(bind_addr)?
    .run();

    health_state.mark_ready();
    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use actix_web::http::{StatusCode, header};
    use actix_web::test as actix_test;
    use beacon::domain::ports::{FixtureAvatarStore, FixturePasswordHasher};
    use beacon::inbound::ws::OriginPolicy;
    use beacon::wiring::Adapters;
    use mockable::DefaultClock;
    use serde_json::json;

    fn deps() -> AppDependencies {
        let services = Services::new(Adapters::in_memory(
            Arc::new(FixturePasswordHasher),
            Arc::new(FixtureAvatarStore),
            Arc::new(DefaultClock),
        ));
        let health_state = HealthState::new();
        health_state.mark_ready();
        AppDependencies {
            health_state: web::Data::new(health_state),
            http_state: web::Data::new(services.http_state()),
            ws_state: web::Data::new(WsState::new(
                services.dispatcher(beacon::domain::CONNECT_SWEEP_DAYS),
                services.auth.clone(),
                OriginPolicy::parse(["http://localhost:3000"]).expect("origin rules"),
            )),
            key: Key::generate(),
            cookie_secure: false,
            same_site: SameSite::Lax,
        }
    }

    #[actix_web::test]
    async fn serves_probes_and_the_user_api() {
        let app = actix_test::init_service(build_app(deps())).await;

        let readiness = actix_test::TestRequest::get().uri("/health/ready").to_request();
        assert_eq!(
            actix_test::call_service(&app, readiness).await.status(),
            StatusCode::OK
        );

        let signup = actix_test::TestRequest::post()
            .uri("/api/user/signup")
            .set_json(json!({
                "full_name": "Ada Lovelace",
                "username": "ada",
                "email": "ada@example.com",
                "password": "pw"
            }))
            .to_request();
        let response = actix_test::call_service(&app, signup).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().contains_key("trace-id"));
    }

    #[actix_web::test]
    async fn refuses_websocket_upgrades_from_unknown_origins() {
        let app = actix_test::init_service(build_app(deps())).await;

        let request = actix_test::TestRequest::get()
            .uri("/ws")
            .insert_header((header::ORIGIN, "https://evil.example"))
            .to_request();
        let response = actix_test::call_service(&app, request).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
