//! Observability: structured logging via `tracing-subscriber`.

mod tracing_init;

pub use tracing_init::*;
