//! Backend helpers
//!
//! Collection of the hardware facing parts of the planner:
//!
//! - [`allocator`]: buffer formats and the allocation of cursor shadow buffers
//! - [`drm`]: planes, framebuffers, output states and the plane assignment itself

pub mod allocator;
pub mod drm;
