//! Renderer facade for shell-first SSR.
//!
//! A [`Renderer`] drives a [`RenderEngine`] in one of two ways:
//! - `render_blocking` / `render_request` - Render to completion, honouring
//!   an abort signal
//! - `render_streaming` - Stream into a transport sink, guarded by a shell
//!   timer, transport events and the abort signal, with a single settled
//!   outcome
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sluice_render::prelude::*;
//!
//! let renderer = Renderer::new(ViewEngine::new(|_, data: Option<&String>| {
//!     Ok(match data {
//!         Some(name) => format!("<h1>Hello {}</h1>", name),
//!         None => "<p>Loading</p>".to_string(),
//!     })
//! }));
//!
//! let (sink, body) = ChannelSink::new();
//! let handle = renderer.render_streaming(
//!     Arc::new(sink),
//!     RenderCallbacks::new(),
//!     RenderRequest::new("/", DataSource::future(load_name())),
//!     StreamOptions::default(),
//! );
//! handle.done().await?;
//! ```

pub mod prelude;

mod callbacks;
mod config;
mod engine;
mod renderer;
mod request;
mod stream;
mod view;

pub use callbacks::RenderCallbacks;
pub use config::*;
pub use engine::*;
pub use renderer::{BlockingRender, HeadFn, HeadInput, Renderer};
pub use request::*;
pub use stream::*;
pub use view::*;
