//! Prelude for convenient imports.
//!
//! ```rust,ignore
//! use sluice_render::prelude::*;
//! ```

pub use std::sync::Arc;

pub use sluice_core::{meta_from, AbortController, AbortSignal, Meta, RenderError, RequestId};
pub use sluice_data::{DataError, DataSource};
pub use sluice_streaming::{ChannelSink, DocumentShell, HeadContent, MemorySink, TransportSink};

pub use crate::{
    BlockingRender, HeadInput, RenderCallbacks, RenderRequest, Renderer, RendererConfig,
    StreamHandle, StreamOptions, ViewEngine,
};
