//! Knowledge Graph Memory Server Library
//!
//! This crate serves the `kg-memory` operations to AI agents over the
//! Model Context Protocol.

pub mod mcp;

pub use mcp::McpServer;
