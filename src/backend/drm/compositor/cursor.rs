use std::fmt;

use tracing::{debug, trace, warn};

use crate::{
    backend::{
        allocator::{format::get_bpp, Allocator, Buffer as BufferTrait, Fourcc, Modifier},
        drm::{CursorUploadError, FrameBuffer},
    },
    utils::{Buffer, Size},
};

use super::{
    elements::{ShmBuffer, ViewId},
    View,
};

/// A CPU writable buffer backing the cursor plane
pub trait CursorBuffer: BufferTrait {
    /// Framebuffer to attach to the cursor plane
    fn framebuffer(&self) -> &FrameBuffer;

    /// Replace the contents of the buffer
    ///
    /// `data` contains `width * height` pixels without any row padding.
    fn write(&mut self, data: &[u8]) -> std::io::Result<()>;
}

/// Double-buffered cursor shadow buffers of an output
pub(super) struct CursorState<C> {
    buffers: Option<[C; 2]>,
    current: usize,
    view: Option<ViewId>,
    uploaded: Option<ViewId>,
    size: Size<i32, Buffer>,
    format: Fourcc,
}

impl<C> fmt::Debug for CursorState<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorState")
            .field("allocated", &self.buffers.is_some())
            .field("current", &self.current)
            .field("view", &self.view)
            .field("size", &self.size)
            .field("format", &self.format)
            .finish()
    }
}

impl<C: CursorBuffer> CursorState<C> {
    pub fn new(size: Size<i32, Buffer>, format: Fourcc) -> Self {
        CursorState {
            buffers: None,
            current: 0,
            view: None,
            uploaded: None,
            size,
            format,
        }
    }

    /// Allocate both shadow buffers, leaving the cursor plane unused on failure
    pub fn allocate<A: Allocator<C>>(&mut self, allocator: &mut A) {
        let mut create = || {
            allocator.create_buffer(
                self.size.w as u32,
                self.size.h as u32,
                self.format,
                &[Modifier::Linear],
            )
        };

        match (create(), create()) {
            (Ok(first), Ok(second)) => {
                debug!(size = ?self.size, format = ?self.format, "allocated cursor buffers");
                self.buffers = Some([first, second]);
            }
            (Err(err), _) | (_, Err(err)) => {
                warn!("failed to allocate cursor buffers, cursor plane disabled: {}", err);
                self.buffers = None;
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.buffers.is_some()
    }

    pub fn size(&self) -> Size<i32, Buffer> {
        self.size
    }

    /// Starts a new repaint cycle, all proposals of a cycle share one upload
    pub fn begin_cycle(&mut self) {
        self.uploaded = None;
    }

    /// Returns true if the view's pixels can be copied into a shadow buffer
    pub fn accepts<V: View + ?Sized>(&self, view: &V) -> bool {
        match view.shm_buffer() {
            Some(shm) => {
                shm.format == self.format && shm.size.w <= self.size.w && shm.size.h <= self.size.h
            }
            None => false,
        }
    }

    /// The view shown on the cursor plane in the last accepted state
    pub fn view(&self) -> Option<&ViewId> {
        self.view.as_ref()
    }

    pub fn forget_view(&mut self) {
        self.view = None;
    }

    /// Get the framebuffer showing the view's cursor image, uploading it if needed
    pub fn prepare<V: View + ?Sized>(&mut self, view: &V) -> Result<FrameBuffer, CursorUploadError> {
        let already_uploaded = self.uploaded.as_ref() == Some(view.id());
        let needs_update =
            !already_uploaded && (self.view.as_ref() != Some(view.id()) || view.has_damage());

        let Some(buffers) = self.buffers.as_mut() else {
            return Err(CursorUploadError::Unavailable);
        };

        if needs_update {
            self.current = (self.current + 1) % buffers.len();
            trace!(buffer = self.current, "copying new content to cursor buffer");

            let shm = view
                .shm_buffer()
                .ok_or(CursorUploadError::UnsupportedFormat(self.format))?;
            let upload = copy_cursor_image(&shm, self.size, self.format)
                .and_then(|data| buffers[self.current].write(&data).map_err(CursorUploadError::Write));
            if let Err(err) = upload {
                warn!("failed to update cursor: {}", err);
                self.view = None;
                return Err(err);
            }
        }

        self.view = Some(view.id().clone());
        self.uploaded = Some(view.id().clone());
        Ok(buffers[self.current].framebuffer().clone())
    }
}

/// Copies the image row by row into a zeroed buffer of the full cursor size
fn copy_cursor_image(
    shm: &ShmBuffer<'_>,
    cursor_size: Size<i32, Buffer>,
    format: Fourcc,
) -> Result<Vec<u8>, CursorUploadError> {
    if shm.format != format {
        return Err(CursorUploadError::UnsupportedFormat(shm.format));
    }
    if shm.size.w > cursor_size.w || shm.size.h > cursor_size.h {
        return Err(CursorUploadError::TooLarge {
            width: shm.size.w,
            height: shm.size.h,
        });
    }
    let bytes_per_pixel = get_bpp(format).ok_or(CursorUploadError::UnsupportedFormat(format))? / 8;

    let row_len = shm.size.w.max(0) as usize * bytes_per_pixel;
    let dst_stride = cursor_size.w as usize * bytes_per_pixel;
    let mut data = vec![0u8; dst_stride * cursor_size.h as usize];

    for row in 0..shm.size.h.max(0) as usize {
        let src = shm
            .data
            .get(row * shm.stride..row * shm.stride + row_len)
            .ok_or(CursorUploadError::Truncated)?;
        data[row * dst_stride..row * dst_stride + row_len].copy_from_slice(src);
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_cursor_width() {
        // 2x2 image with a stride of 12 bytes
        let pixels: Vec<u8> = (0u8..24).collect();
        let shm = ShmBuffer {
            data: &pixels,
            stride: 12,
            size: (2, 2).into(),
            format: Fourcc::Argb8888,
        };

        let data = copy_cursor_image(&shm, (4, 4).into(), Fourcc::Argb8888).unwrap();
        assert_eq!(data.len(), 4 * 4 * 4);
        assert_eq!(&data[0..8], &pixels[0..8]);
        assert!(data[8..16].iter().all(|b| *b == 0));
        assert_eq!(&data[16..24], &pixels[12..20]);
        assert!(data[32..].iter().all(|b| *b == 0));
    }

    #[test]
    fn oversized_image_is_rejected() {
        let pixels = vec![0u8; 8 * 8 * 4];
        let shm = ShmBuffer {
            data: &pixels,
            stride: 32,
            size: (8, 8).into(),
            format: Fourcc::Argb8888,
        };
        assert!(matches!(
            copy_cursor_image(&shm, (4, 4).into(), Fourcc::Argb8888),
            Err(CursorUploadError::TooLarge { width: 8, height: 8 })
        ));
    }

    #[test]
    fn truncated_image_is_rejected() {
        let pixels = vec![0u8; 10];
        let shm = ShmBuffer {
            data: &pixels,
            stride: 8,
            size: (2, 2).into(),
            format: Fourcc::Argb8888,
        };
        assert!(matches!(
            copy_cursor_image(&shm, (4, 4).into(), Fourcc::Argb8888),
            Err(CursorUploadError::Truncated)
        ));
    }
}
