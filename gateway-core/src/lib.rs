//! Shared types, error model, configuration, and logging setup for the
//! managed MCP gateway. Analogous in spirit to `r2e-core` in the teacher
//! workspace, scoped down to exactly what this gateway's request path needs.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{ConfigError, GatewayConfig};
pub use error::{EdgeError, RpcError};
pub use logging::init_tracing;
