//! Observability: structured logging and span macros
//!
//! Runtime counters live with the dispatch loop in [`crate::proactor::stats`].

pub mod logging;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};
