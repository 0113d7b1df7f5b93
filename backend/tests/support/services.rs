//! In-memory service graph shared by the integration test crates.

use std::sync::Arc;

use beacon::domain::ports::{FixtureAvatarStore, FixturePasswordHasher};
use beacon::domain::{LoginCredentials, Registration, SessionToken, User};
use beacon::wiring::{Adapters, Services};
use mockable::DefaultClock;

pub const PASSWORD: &str = "correct horse";

/// Services over empty in-memory stores and fixture adapters.
pub fn memory_services() -> Services {
    Services::new(Adapters::in_memory(
        Arc::new(FixturePasswordHasher),
        Arc::new(FixtureAvatarStore),
        Arc::new(DefaultClock),
    ))
}

/// Register `name` as `{name}@example.com` with [`PASSWORD`].
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

/// Log `name` in and return the issued session token.
pub async fn login(services: &Services, name: &str) -> SessionToken {
    let credentials = LoginCredentials::try_from_parts(&format!("{name}@example.com"), PASSWORD)
        .expect("valid credentials");
    let (token, _) = services
        .auth
        .login(&credentials)
        .await
        .expect("login succeeds");
    token
}
