//! Core vocabulary for the sluice streaming SSR coordination layer.
//!
//! This crate provides the fundamental types shared by every layer:
//! - `RenderError` - The error carried by a failed render
//! - `AbortController` / `AbortSignal` - External cancellation
//! - `RequestId` / `Meta` - Request identity and page metadata
//! - `LifecyclePhase` / `TimingContext` - Stream lifecycle tracking

mod context;
mod error;
mod lifecycle;
mod signal;

pub use context::*;
pub use error::*;
pub use lifecycle::*;
pub use signal::*;
