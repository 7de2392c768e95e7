//! Model Context Protocol (MCP) JSON-RPC handling
//!
//! Provides the JSON-RPC envelope types and the dispatcher that routes
//! `initialize`, `tools/list`, `tools/call` and `ping` requests.

pub mod rpc;
pub mod server;
