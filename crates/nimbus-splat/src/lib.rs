//! Splat dataset + depth-ordering pipeline.
//!
//! This crate owns everything the renderer needs *before* a draw call can be
//! issued: the GPU-layout splat records parsed out of a binary PLY file, the
//! two depth-sort algorithms that turn a camera matrix into a front-to-back
//! draw order, and the double-buffered worker that keeps re-sorting in the
//! background while the render thread consumes the freshest completed order.
//!
//! Nothing in here touches a GPU or a window; the crate is fully exercisable
//! from plain unit tests.

mod error;
mod ply;
mod splat;

pub mod scheduler;
pub mod sort;

pub use error::FormatError;
pub use splat::{from_ply, Splat, SplatDataset};
