//! Nimbus engine crate.
//!
//! Owns the platform + GPU runtime pieces of the viewer: device/surface
//! management, the single-window winit loop, frame timing, logging setup,
//! and the splat renderer that consumes `nimbus-splat`'s draw orderings.

pub mod core;
pub mod device;
pub mod render;
pub mod time;
pub mod window;

pub mod logging;
