//! MCP Surface
//!
//! Tool registry, JSON-RPC dispatch, and the STDIO and Streamable HTTP
//! transports.

pub mod http;
pub mod protocol;
pub mod stdio;
pub mod tools;
