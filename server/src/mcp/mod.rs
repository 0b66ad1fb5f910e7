//! MCP (Model Context Protocol) Server Module
//!
//! Exposes the memory operations as MCP tools so AI clients such as
//! Claude Desktop, Cursor and Cline can remember and recall facts.
//!
//! ## Usage
//!
//! ```bash
//! kg-server --data-dir ~/.kg-memory/db
//! ```
//!
//! The MCP server communicates via stdio using JSON-RPC 2.0.

pub mod protocol;
pub mod server;
pub mod tools;
pub mod transport;

pub use protocol::*;
pub use server::McpServer;
