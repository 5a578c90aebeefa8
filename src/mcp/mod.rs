//! Model Context Protocol request handling
//!
//! Envelope types live in `rpc`; `server` decodes, dispatches and encodes.

pub mod rpc;
pub mod server;
