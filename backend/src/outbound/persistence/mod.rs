//! PostgreSQL persistence adapters using Diesel.
//!
//! Repositories translate between the row structs in `models.rs` and domain
//! types; neither the rows nor `schema.rs` leave this module. Connections
//! come from the `diesel-async` bb8 pool in [`DbPool`], and every Diesel
//! failure is mapped onto the port's error enum.
//!
//! # Example
//!
//! ```ignore
//! use beacon::outbound::persistence::{DbPool, DieselUserRepository, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/beacon")).await?;
//! let users = DieselUserRepository::new(pool.clone());
//! ```

mod diesel_conversation_repository;
mod diesel_error_mapping;
mod diesel_user_repository;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_conversation_repository::DieselConversationRepository;
pub use diesel_user_repository::DieselUserRepository;
pub use migrations::{MIGRATIONS, MigrationError, run_pending_migrations};
pub use pool::{DbPool, PoolConfig, PoolError};
