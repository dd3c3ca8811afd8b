//! Application contract between the runtime and higher layers.

mod app;
mod ctx;

pub use app::{App, AppControl};
pub use ctx::FrameCtx;
