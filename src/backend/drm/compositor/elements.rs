use std::{os::unix::io::OwnedFd, sync::Arc};

use crate::{
    backend::{allocator::Fourcc, drm::FrameBuffer},
    output::{OutputSet, ProtectionLevel},
    utils::{Buffer, Physical, Rectangle, Region, Size, Transform},
};

crate::utils::ids::id_gen!(view_ids);

/// A unique id for a [`View`]
///
/// Note: The id will be re-used once all instances of this [`ViewId`]
/// are dropped.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct ViewId(Arc<InnerViewId>);

#[derive(Debug, PartialEq, Eq, Hash)]
struct InnerViewId(usize);

impl ViewId {
    /// Create a new unique id
    pub fn new() -> Self {
        ViewId(Arc::new(InnerViewId(view_ids::next())))
    }
}

impl Default for ViewId {
    fn default() -> Self {
        ViewId::new()
    }
}

impl Drop for InnerViewId {
    fn drop(&mut self) {
        view_ids::remove(self.0);
    }
}

/// Content protection requested by a view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentProtection {
    /// Protection level the content asks for
    pub desired: ProtectionLevel,
    /// Whether the content may only be shown if the level is met
    pub enforced: bool,
}

impl ContentProtection {
    /// Returns true if the content may not be scanned out with the given protection
    pub fn is_violated_by(&self, current: ProtectionLevel) -> bool {
        self.enforced && self.desired > current
    }
}

/// CPU accessible pixels of a view's buffer
#[derive(Debug, Clone, Copy)]
pub struct ShmBuffer<'a> {
    /// Pixel data, `stride * height` bytes
    pub data: &'a [u8],
    /// Bytes per row
    pub stride: usize,
    /// Size of the buffer in pixels
    pub size: Size<i32, Buffer>,
    /// Pixel format
    pub format: Fourcc,
}

/// A visible surface to be placed on a plane or composited by the renderer
///
/// Views are handed to the planner topmost first.
pub trait View {
    /// Get the unique id of this view
    fn id(&self) -> &ViewId;

    /// Bounding box of the view in output space
    fn geometry(&self) -> Rectangle<i32, Physical>;

    /// Source area of the attached buffer shown by the view
    fn src(&self) -> Rectangle<f64, Buffer>;

    /// Transform applied to the buffer
    fn transform(&self) -> Transform {
        Transform::Normal
    }

    /// Opaque regions of the view, relative to its geometry
    fn opaque_regions(&self) -> Vec<Rectangle<i32, Physical>> {
        Vec::new()
    }

    /// Outputs the view is visible on
    fn outputs(&self) -> OutputSet;

    /// Returns true if the view has a buffer attached that could be shown
    fn has_valid_buffer(&self) -> bool;

    /// Content protection requirement of the view
    fn protection(&self) -> ContentProtection {
        ContentProtection::default()
    }

    /// Fence signalled once the buffer's writer has finished
    fn acquire_fence(&self) -> Option<Arc<OwnedFd>> {
        None
    }

    /// Returns true if the view's contents changed since the last cycle
    fn has_damage(&self) -> bool {
        true
    }

    /// Pixels of a shared-memory buffer, used to upload cursor images
    fn shm_buffer(&self) -> Option<ShmBuffer<'_>> {
        None
    }
}

impl<V: View + ?Sized> View for &V {
    fn id(&self) -> &ViewId {
        (**self).id()
    }
    fn geometry(&self) -> Rectangle<i32, Physical> {
        (**self).geometry()
    }
    fn src(&self) -> Rectangle<f64, Buffer> {
        (**self).src()
    }
    fn transform(&self) -> Transform {
        (**self).transform()
    }
    fn opaque_regions(&self) -> Vec<Rectangle<i32, Physical>> {
        (**self).opaque_regions()
    }
    fn outputs(&self) -> OutputSet {
        (**self).outputs()
    }
    fn has_valid_buffer(&self) -> bool {
        (**self).has_valid_buffer()
    }
    fn protection(&self) -> ContentProtection {
        (**self).protection()
    }
    fn acquire_fence(&self) -> Option<Arc<OwnedFd>> {
        (**self).acquire_fence()
    }
    fn has_damage(&self) -> bool {
        (**self).has_damage()
    }
    fn shm_buffer(&self) -> Option<ShmBuffer<'_>> {
        (**self).shm_buffer()
    }
}

/// Returns the part of `clipped` that is covered by opaque content of the view
pub(super) fn visible_opaque_region<V: View + ?Sized>(view: &V, clipped: Rectangle<i32, Physical>) -> Region {
    let geometry = view.geometry();
    let mut opaque: Region = view.opaque_regions().into_iter().collect();
    opaque.translate(geometry.loc.x, geometry.loc.y);
    opaque.intersect_rect(clipped);
    opaque
}

/// Turns a view's buffer into a scan-out capable [`FrameBuffer`]
pub trait FramebufferImporter<V: ?Sized> {
    /// Import or look up a framebuffer for the view
    ///
    /// Returns `None` if the buffer can not be scanned out directly.
    fn import_framebuffer(&mut self, view: &V) -> Option<FrameBuffer>;
}

impl<V: ?Sized, F: FnMut(&V) -> Option<FrameBuffer>> FramebufferImporter<V> for F {
    fn import_framebuffer(&mut self, view: &V) -> Option<FrameBuffer> {
        self(view)
    }
}
