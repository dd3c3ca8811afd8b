//! Single-window winit runtime.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig};
