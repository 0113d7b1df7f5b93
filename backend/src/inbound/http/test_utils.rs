//! Test helpers for inbound HTTP components.

use std::sync::Arc;

use actix_session::{SessionMiddleware, storage::CookieSessionStore};
use actix_web::cookie::{Cookie, Key};
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, web};
use mockable::DefaultClock;

use crate::domain::ports::{FixtureAvatarStore, FixturePasswordHasher};
use crate::domain::{GeoPoint, Registration, User};
use crate::inbound::http::{api_scope, json_config};
use crate::wiring::{Adapters, Services};

/// Build a session middleware configured for tests.
///
/// - Generates a fresh signing/encryption key per invocation.
/// - Sets the cookie name to `session` and disables the `Secure` flag for
///   local HTTP tests.
pub fn test_session_middleware() -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), Key::generate())
        .cookie_name("session".to_owned())
        .cookie_secure(false)
        .build()
}

/// Services over empty in-memory stores.
pub fn memory_services() -> Services {
    Services::new(Adapters::in_memory(
        Arc::new(FixturePasswordHasher),
        Arc::new(FixtureAvatarStore),
        Arc::new(DefaultClock),
    ))
}

/// The full `/api/user` scope over `services`.
pub fn api_app(
    services: &Services,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    > + use<>,
> {
    App::new()
        .app_data(web::Data::new(services.http_state()))
        .app_data(json_config())
        .wrap(test_session_middleware())
        .service(api_scope())
}

pub const PASSWORD: &str = "correct horse";

/// Register `name` with email `{name}@example.com` and [`PASSWORD`].
pub async fn register(services: &Services, name: &str) -> User {
    let registration = Registration::try_from_parts(
        &format!("{name} tester"),
        name,
        &format!("{name}@example.com"),
        PASSWORD,
    )
    .expect("valid registration");
    services
        .relationships
        .register(&registration)
        .await
        .expect("registration succeeds")
}

/// Register two users and make them friends.
pub async fn friends(services: &Services, a: &str, b: &str) -> (User, User) {
    let first = register(services, a).await;
    let second = register(services, b).await;
    services
        .relationships
        .add_friend(&first.id, &second.id)
        .await
        .expect("friendship");
    let first = services.relationships.load(&first.id).await.expect("first");
    let second = services.relationships.load(&second.id).await.expect("second");
    (first, second)
}

pub fn point(latitude: f64, longitude: f64) -> GeoPoint {
    GeoPoint::new(latitude, longitude).expect("valid point")
}

/// Log `name` in through the HTTP API and return the session cookie.
pub async fn login_cookie<S>(app: &S, name: &str) -> Cookie<'static>
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let request = actix_web::test::TestRequest::post()
        .uri("/api/user/login")
        .set_json(serde_json::json!({
            "email": format!("{name}@example.com"),
            "password": PASSWORD,
        }))
        .to_request();
    let response = actix_web::test::call_service(app, request).await;
    assert!(response.status().is_success(), "login failed: {}", response.status());
    response
        .response()
        .cookies()
        .find(|cookie| cookie.name() == "session")
        .map(Cookie::into_owned)
        .expect("session cookie")
}
