//! GPU rendering subsystem.
//!
//! The splat renderer owns its own GPU resources (pipeline, buffers) and
//! consumes two inputs produced elsewhere: the immutable splat dataset
//! (uploaded once as a storage buffer) and the depth ordering published by
//! the `nimbus-splat` scheduler (uploaded to an instance buffer whenever a
//! fresh ordering appears).

mod ctx;
mod splats;

pub use ctx::{RenderCtx, RenderTarget};
pub use splats::{SplatCamera, SplatRenderer};
