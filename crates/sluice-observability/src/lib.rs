//! Structured logging for the sluice streaming SSR coordination layer.
//!
//! This crate provides:
//! - `RenderLogger` - The logging seam every render component writes through
//! - `StructuredLogger` - Request-scoped structured logs emitted via `tracing`
//! - `MemoryLogger` - In-memory recorder for tests and diagnostics

mod logging;
mod memory;

pub use logging::*;
pub use memory::*;

pub use sluice_core::RequestId;
