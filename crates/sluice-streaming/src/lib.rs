//! Stream lifecycle control for shell-first SSR.
//!
//! This crate owns the outcome of one streamed render:
//! - `Settlement` / `Done` - Single-assignment completion gate
//! - `BenignPattern` - Client-disconnect classification
//! - `TransportSink` - Writable, event-emitting response surface
//! - `TransportGuards` - Sink events routed into benign or fatal aborts
//! - `ShellTimer` - Shell-ready deadline
//! - `StreamController` - Idempotent abort, teardown and settlement
//! - `HeadContent` / `DocumentShell` - Head fragment and document frame

mod channel;
mod classify;
mod controller;
mod guards;
mod head;
mod memory;
mod settlement;
mod sink;
mod teardown;
mod timer;

pub use channel::*;
pub use classify::*;
pub use controller::*;
pub use guards::*;
pub use head::*;
pub use memory::*;
pub use settlement::*;
pub use sink::*;
pub use teardown::*;
pub use timer::*;
