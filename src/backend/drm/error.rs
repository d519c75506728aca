#[cfg(feature = "backend_drm")]
use drm::control::RawResourceHandle;

use crate::backend::{allocator::Fourcc, drm::compositor::ViewId};

/// Errors rejecting a proposed output state
///
/// None of these reach the caller of [`OutputPlanner::assign_planes`](super::compositor::OutputPlanner::assign_planes),
/// a rejected proposal makes the planner retry with a more conservative mode.
#[derive(thiserror::Error, Debug)]
pub enum ProposeError<E: std::error::Error + Send + Sync + 'static> {
    /// Mixed mode needs the last renderer framebuffer on the primary plane
    #[error("No previous renderer framebuffer to seed the primary plane with")]
    NoRendererFramebuffer,
    /// The last renderer framebuffer can not be reused for the current mode
    #[error("The previous renderer framebuffer is not compatible with the current mode")]
    RendererFramebufferMismatch,
    /// A view could not be placed on a plane while the renderer may not be used
    #[error("View {view:?} could not be placed on a plane and the renderer is not allowed")]
    RendererNotAllowed {
        /// The view
        view: ViewId,
    },
    /// Two enabled planes ended up with the same zpos
    #[error("Duplicate zpos {zpos} in proposed state")]
    DuplicateZpos {
        /// The zpos used more than once
        zpos: u64,
    },
    /// The state was rejected by the kernel
    #[error("The proposed state failed the test commit")]
    TestFailed(#[source] E),
}

/// Errors updating a cursor shadow buffer
#[derive(thiserror::Error, Debug)]
pub enum CursorUploadError {
    /// The output has no cursor buffers
    #[error("No cursor buffers allocated")]
    Unavailable,
    /// The pixel data does not use the cursor format
    #[error("Unsupported cursor format {0:?}")]
    UnsupportedFormat(Fourcc),
    /// The cursor image is bigger than the cursor plane
    #[error("Cursor image of {width}x{height} does not fit the cursor plane")]
    TooLarge {
        /// Width of the image
        width: i32,
        /// Height of the image
        height: i32,
    },
    /// The pixel data is shorter than stride and height require
    #[error("Cursor image data is truncated")]
    Truncated,
    /// Writing to the shadow buffer failed
    #[error("Failed to update cursor")]
    Write(#[source] std::io::Error),
}

/// Errors of the atomic test oracle
#[cfg(feature = "backend_drm")]
#[derive(thiserror::Error, Debug)]
pub enum AtomicError {
    /// The device is missing a required property
    #[error("The DrmDevice is missing a required property '{name}' for handle ({handle:?})")]
    UnknownProperty {
        /// Property handle
        handle: RawResourceHandle,
        /// Property name
        name: &'static str,
    },
    /// A kernel object id does not form a valid handle
    #[error("Invalid kernel object id {0}")]
    InvalidHandle(u32),
    /// The device returned an error
    #[error("DRM access error: {errmsg} ({source})")]
    Access {
        /// Error message associated to the access error
        errmsg: &'static str,
        /// Underlying device error
        #[source]
        source: std::io::Error,
    },
}
