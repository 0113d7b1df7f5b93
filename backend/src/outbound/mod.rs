//! Outbound adapters implementing the domain ports.
//!
//! - **persistence**: PostgreSQL repositories for users and conversations
//! - **redis**: per-recipient notification logs
//! - **memory**: in-process stores for local runs and tests
//! - **password** / **avatars**: bcrypt hashing and avatar file cleanup
//!
//! Adapters only translate between domain types and the backing store; no
//! business rules live here.

pub mod avatars;
pub mod memory;
pub mod password;
pub mod persistence;
pub mod redis;
