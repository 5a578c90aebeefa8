//! HTTP transport layer for the Model Context Protocol
//!
//! A hand-rolled, single-request-per-connection HTTP/1.x front end for the
//! `/mcp` endpoint.

pub mod framing;
pub mod listener;
