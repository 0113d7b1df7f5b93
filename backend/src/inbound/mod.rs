//! Inbound adapters that translate external requests into domain service
//! calls while keeping framework details at the edge.
//!
//! - [`http`]: the `/api/user` REST surface and health probes
//! - [`ws`]: the `/ws` real-time endpoint

pub mod http;
pub mod ws;
