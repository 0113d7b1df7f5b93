//! Beacon backend library modules.
//!
//! - [`domain`]: entities, ports and services
//! - [`inbound`]: HTTP and WebSocket adapters
//! - [`outbound`]: PostgreSQL, Redis, in-memory and filesystem adapters
//! - [`wiring`]: service composition shared by the server and tests

pub mod doc;
pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod outbound;
pub mod settings;
pub mod wiring;

/// Public OpenAPI surface used by Swagger UI and tooling.
pub use doc::ApiDoc;
pub use middleware::Trace;
