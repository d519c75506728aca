use std::{fmt, rc::Rc};

use tracing::trace;

use crate::{
    backend::allocator::{Format, Fourcc, Modifier},
    utils::{Buffer, Size},
};

/// Kernel object id of a framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub u32);

/// Origin of a framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramebufferKind {
    /// Imported from a client buffer
    Client,
    /// Output of the renderer
    Renderer,
    /// Cursor shadow buffer
    Cursor,
}

type ReleaseFn = Box<dyn FnOnce(FramebufferHandle)>;

struct FrameBufferInner {
    handle: FramebufferHandle,
    format: Format,
    size: Size<i32, Buffer>,
    kind: FramebufferKind,
    release: Option<ReleaseFn>,
}

impl Drop for FrameBufferInner {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            trace!(fb = self.handle.0, "releasing framebuffer");
            release(self.handle);
        }
    }
}

/// Shared handle to a scan-out capable buffer
///
/// Every clone holds a reference. Plane states own their framebuffer through
/// such a handle, so the reference count equals the number of live plane states
/// (plus any handles held by the caller). Once the last reference is dropped the
/// release callback returns the buffer to its source.
#[derive(Clone)]
pub struct FrameBuffer(Rc<FrameBufferInner>);

impl FrameBuffer {
    /// Wrap a framebuffer without a release callback
    pub fn new(
        handle: FramebufferHandle,
        format: Format,
        size: Size<i32, Buffer>,
        kind: FramebufferKind,
    ) -> Self {
        FrameBuffer(Rc::new(FrameBufferInner {
            handle,
            format,
            size,
            kind,
            release: None,
        }))
    }

    /// Wrap a framebuffer, calling `release` once the last reference is gone
    pub fn with_release(
        handle: FramebufferHandle,
        format: Format,
        size: Size<i32, Buffer>,
        kind: FramebufferKind,
        release: impl FnOnce(FramebufferHandle) + 'static,
    ) -> Self {
        FrameBuffer(Rc::new(FrameBufferInner {
            handle,
            format,
            size,
            kind,
            release: Some(Box::new(release)),
        }))
    }

    /// Kernel handle of the framebuffer
    pub fn handle(&self) -> FramebufferHandle {
        self.0.handle
    }

    /// Format and modifier of the framebuffer
    pub fn format(&self) -> Format {
        self.0.format
    }

    /// Fourcc code of the framebuffer
    pub fn fourcc(&self) -> Fourcc {
        self.0.format.code
    }

    /// Modifier of the framebuffer
    pub fn modifier(&self) -> Modifier {
        self.0.format.modifier
    }

    /// Size of the framebuffer in pixels
    pub fn size(&self) -> Size<i32, Buffer> {
        self.0.size
    }

    /// Origin of the framebuffer
    pub fn kind(&self) -> FramebufferKind {
        self.0.kind
    }

    /// Number of live references to this framebuffer
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Returns true if both handles refer to the same framebuffer
    pub fn ptr_eq(&self, other: &FrameBuffer) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for FrameBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("handle", &self.0.handle)
            .field("format", &self.0.format)
            .field("size", &self.0.size)
            .field("kind", &self.0.kind)
            .field("refs", &Rc::strong_count(&self.0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::*;

    fn format() -> Format {
        Format {
            code: Fourcc::Xrgb8888,
            modifier: Modifier::Linear,
        }
    }

    #[test]
    fn release_runs_after_last_reference() {
        let released = Rc::new(Cell::new(None));
        let released_clone = released.clone();

        let fb = FrameBuffer::with_release(
            FramebufferHandle(7),
            format(),
            (64, 64).into(),
            FramebufferKind::Client,
            move |handle| released_clone.set(Some(handle)),
        );
        let second = fb.clone();
        assert_eq!(fb.ref_count(), 2);

        drop(fb);
        assert_eq!(released.get(), None);
        assert_eq!(second.ref_count(), 1);

        drop(second);
        assert_eq!(released.get(), Some(FramebufferHandle(7)));
    }

    #[test]
    fn equality_is_identity() {
        let a = FrameBuffer::new(FramebufferHandle(1), format(), (1, 1).into(), FramebufferKind::Client);
        let b = FrameBuffer::new(FramebufferHandle(1), format(), (1, 1).into(), FramebufferKind::Client);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
