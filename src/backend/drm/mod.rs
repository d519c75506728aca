//! Drm/Kms plane bookkeeping
//!
//! This module describes the hardware planes of a display controller and the
//! state that gets proposed for them on every repaint cycle.
//!
//! - [`PlaneRegistry`] is the catalog of planes created once at backend initialization.
//!   It tracks which output's committed state each plane is bound to and carries the
//!   global switches to disable overlay or cursor planes.
//! - [`FrameBuffer`] is a shared handle to a scan-out capable buffer. A framebuffer stays
//!   alive as long as any [`PlaneState`] references it and is released to its source
//!   once the last reference is dropped.
//! - [`OutputState`] holds one [`PlaneState`] per plane used for an output's next refresh.
//!
//! The [`compositor`] module contains the planner deciding which views end up on which plane.
//!
//! ## Kernel validation
//!
//! Proposed states are validated through a [`TestOracle`]. With the `backend_drm` feature
//! enabled, [`atomic::AtomicOracle`] validates states with a `TEST_ONLY` atomic commit
//! on a real device.

#[cfg(feature = "backend_drm")]
pub mod atomic;
pub mod compositor;
mod error;
mod framebuffer;
mod plane;
mod state;

pub use error::{CursorUploadError, ProposeError};
#[cfg(feature = "backend_drm")]
pub use error::AtomicError;
pub use framebuffer::{FrameBuffer, FramebufferHandle, FramebufferKind};
pub use plane::{DisabledPlanes, Plane, PlaneId, PlaneRegistry, PlaneType, ZposRange};
pub use state::{DuplicateMode, OutputState, PlaneConfig, PlaneState};

/// Validates a proposed [`OutputState`] without applying it
///
/// Implementations must not change any visible state, whether the test succeeds or not.
pub trait TestOracle {
    /// Error returned when the state is rejected
    type Error: std::error::Error + Send + Sync + 'static;

    /// Test if the given state would be accepted by the kernel
    fn test_state(&mut self, state: &OutputState) -> Result<(), Self::Error>;
}

impl<T: TestOracle + ?Sized> TestOracle for &mut T {
    type Error = T::Error;

    fn test_state(&mut self, state: &OutputState) -> Result<(), Self::Error> {
        (**self).test_state(state)
    }
}
