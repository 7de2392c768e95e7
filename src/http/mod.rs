//! HTTP transport layer for the Model Context Protocol
//!
//! Provides CORS enforcement, the JSON-RPC endpoint and the fallback that
//! serves custom routes.

pub mod cors;
pub mod handlers;
