use tracing::{instrument, trace};

use crate::{
    backend::drm::{FrameBuffer, Plane, PlaneConfig, PlaneId, PlaneType, TestOracle},
    output::Output,
    utils::{Buffer, Physical, Point, Rectangle, Transform},
};

use super::{
    cursor::CursorBuffer,
    propose::{Pass, Proposer},
    FramebufferImporter, ProposeMode, View,
};

/// Planes that may show a view, ordered by descending maximum zpos
///
/// Planes with the same maximum keep the order they were added in.
#[derive(Debug, Default)]
pub(super) struct ZposCandidates<'a> {
    planes: Vec<&'a Plane>,
}

impl<'a> ZposCandidates<'a> {
    pub fn add(&mut self, plane: &'a Plane) {
        let max = plane.zpos().max;
        let index = self
            .planes
            .iter()
            .position(|candidate| candidate.zpos().max < max)
            .unwrap_or(self.planes.len());
        trace!(plane = plane.id().0, zpos_max = max, "adding plane as candidate");
        self.planes.insert(index, plane);
    }

    /// The candidate with the highest maximum zpos
    pub fn head(&self) -> Option<&'a Plane> {
        self.planes.first().copied()
    }

    pub fn remove(&mut self, plane: PlaneId) {
        self.planes.retain(|candidate| candidate.id() != plane);
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }
}

/// Source and destination of a view on a plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct PlaneCoords {
    pub src: Rectangle<f64, Buffer>,
    pub dst: Rectangle<i32, Physical>,
    pub transform: Transform,
}

/// Compute the plane geometry showing `view` on `output`
///
/// The destination is clipped to the output and the buffer source cropped by
/// the same proportion. Returns `None` if the plane can not apply the view's
/// transform or nothing of the view is on the output.
pub(super) fn coords_for_view<V: View + ?Sized>(
    view: &V,
    output: Rectangle<i32, Physical>,
    plane: &Plane,
) -> Option<PlaneCoords> {
    let transform = view.transform();
    if !plane.supports_transform(transform) {
        return None;
    }

    let geometry = view.geometry();
    let dst = geometry.intersection(output)?;

    let src = view.src();
    let src_area = transform.transform_size(src.size);
    let scale_x = src_area.w / geometry.size.w as f64;
    let scale_y = src_area.h / geometry.size.h as f64;

    let crop = Rectangle::<f64, Buffer>::new(
        (
            (dst.loc.x - geometry.loc.x) as f64 * scale_x,
            (dst.loc.y - geometry.loc.y) as f64 * scale_y,
        )
            .into(),
        (dst.size.w as f64 * scale_x, dst.size.h as f64 * scale_y).into(),
    );
    let crop = transform.invert().transform_rect_in(crop, &src_area);

    Some(PlaneCoords {
        src: Rectangle::new(src.loc + crop.loc, crop.size),
        dst,
        transform,
    })
}

fn view_matches_output_entirely<V: View + ?Sized>(view: &V, output: &Output) -> bool {
    view.geometry() == output.geometry()
}

impl<'a, C, I, T> Proposer<'a, C, I, T>
where
    C: CursorBuffer,
    T: TestOracle,
{
    /// Try to place a view on one of the available planes
    ///
    /// Returns the plane the view was bound to. The watermark of the pass is
    /// lowered to the zpos the view got.
    #[instrument(level = "trace", skip_all, fields(view = ?view.id()))]
    #[profiling::function]
    pub(super) fn prepare_plane_view<V>(&mut self, pass: &mut Pass, view: &V) -> Option<&'a Plane>
    where
        V: View,
        I: FramebufferImporter<V>,
    {
        if !view.has_valid_buffer() {
            trace!("not assigning view to plane, no valid buffer");
            return None;
        }

        let registry = self.registry;
        let output = self.output;

        let mut candidates = ZposCandidates::default();
        for plane in registry.available_planes(output) {
            let zpos = plane.zpos();

            if pass.state.is_assigned(plane.id()) {
                trace!(plane = plane.id().0, "not adding plane as candidate, already assigned");
                continue;
            }

            if let Some(lowest) = pass.lowest_zpos {
                if zpos.min >= lowest {
                    trace!(
                        plane = plane.id().0,
                        zpos_min = zpos.min,
                        lowest,
                        "not adding plane as candidate, minimum zpos above current lowest"
                    );
                    continue;
                }
            }

            if let Some(primary) = self.mixed_primary_zpos(pass) {
                if primary >= zpos.max {
                    trace!(
                        plane = plane.id().0,
                        zpos_max = zpos.max,
                        primary,
                        "not adding plane as candidate, maximum zpos below primary plane"
                    );
                    continue;
                }
            }

            if plane.plane_type() == PlaneType::Cursor
                && !(self.cursor.is_available() && self.cursor.accepts(view))
            {
                trace!(plane = plane.id().0, "not adding plane as candidate, no usable cursor image");
                continue;
            }

            candidates.add(plane);
        }

        trace!(candidates = candidates.len(), "collected plane candidates");

        // imported on the first primary or overlay attempt
        let mut imported: Option<Option<FrameBuffer>> = None;

        while let Some(plane) = candidates.head() {
            candidates.remove(plane.id());

            let zpos = match pass.lowest_zpos {
                Some(lowest) => lowest.saturating_sub(1).min(plane.zpos().max),
                None => plane.zpos().max,
            };

            if let Some(primary) = self.mixed_primary_zpos(pass) {
                if zpos <= primary {
                    trace!(
                        plane = plane.id().0,
                        zpos,
                        primary,
                        "not trying plane, zpos would not be above primary plane"
                    );
                    continue;
                }
            }

            let fb = match plane.plane_type() {
                PlaneType::Cursor => None,
                PlaneType::Primary | PlaneType::Overlay => {
                    let importer = &mut *self.importer;
                    let fb = imported
                        .get_or_insert_with(|| importer.import_framebuffer(view))
                        .as_ref();
                    if !fb.is_some_and(|fb| plane.formats().supports(fb.fourcc(), fb.modifier())) {
                        trace!(plane = plane.id().0, "not trying plane, format not supported");
                        continue;
                    }
                    fb
                }
            };
            trace!(plane = plane.id().0, zpos, "trying plane");

            if self.try_view_on_plane(pass, plane, view, fb, zpos) {
                trace!(plane = plane.id().0, plane_type = ?plane.plane_type(), zpos, "placed view on plane");
                pass.lowest_zpos = Some(zpos);
                return Some(plane);
            }
        }

        debug_assert!(candidates.is_empty());
        trace!("no plane accepted the view");
        None
    }

    /// zpos of the seeded primary plane, views have to stay above it in mixed mode
    fn mixed_primary_zpos(&self, pass: &Pass) -> Option<u64> {
        match pass.mode {
            ProposeMode::Mixed => pass.primary_zpos,
            _ => None,
        }
    }

    fn try_view_on_plane<V: View + ?Sized>(
        &mut self,
        pass: &mut Pass,
        plane: &Plane,
        view: &V,
        fb: Option<&FrameBuffer>,
        zpos: u64,
    ) -> bool {
        match plane.plane_type() {
            PlaneType::Cursor => self.prepare_cursor_view(pass, plane, view, zpos),
            PlaneType::Overlay => {
                if view_matches_output_entirely(view, self.output) && !self.primary_assigned(pass) {
                    trace!(
                        plane = plane.id().0,
                        "not placing view on overlay, fullscreen view while primary plane is unused"
                    );
                    return false;
                }
                self.prepare_overlay_view(pass, plane, view, fb, zpos)
            }
            PlaneType::Primary => {
                if pass.mode != ProposeMode::PlanesOnly {
                    trace!(plane = plane.id().0, "not placing view on primary plane, renderer in use");
                    return false;
                }
                self.prepare_scanout_view(pass, plane, view, fb, zpos)
            }
        }
    }

    fn primary_assigned(&self, pass: &Pass) -> bool {
        self.registry
            .primary_plane_for(self.output)
            .map(|primary| pass.state.is_assigned(primary.id()))
            .unwrap_or(false)
    }

    fn prepare_overlay_view<V: View + ?Sized>(
        &mut self,
        pass: &mut Pass,
        plane: &Plane,
        view: &V,
        fb: Option<&FrameBuffer>,
        zpos: u64,
    ) -> bool {
        let Some(fb) = fb else {
            trace!(plane = plane.id().0, "not placing view on overlay, no framebuffer");
            return false;
        };

        let Some(coords) = coords_for_view(view, self.output.geometry(), plane) else {
            trace!(plane = plane.id().0, "not placing view on overlay, unsuitable transform");
            return false;
        };

        if !self.bind_framebuffer(pass, plane, view, fb, coords, zpos) {
            return false;
        }

        if pass.mode == ProposeMode::Mixed {
            if let Err(err) = self.oracle.test_state(&pass.state) {
                trace!(plane = plane.id().0, "not placing view on overlay, test failed: {}", err);
                pass.state.put_back(plane.id());
                return false;
            }
        }

        true
    }

    fn prepare_scanout_view<V: View + ?Sized>(
        &mut self,
        pass: &mut Pass,
        plane: &Plane,
        view: &V,
        fb: Option<&FrameBuffer>,
        zpos: u64,
    ) -> bool {
        let output = self.output.geometry();

        if !view_matches_output_entirely(view, self.output) {
            trace!(plane = plane.id().0, "not placing view on primary, does not cover the output");
            return false;
        }

        let Some(fb) = fb else {
            trace!(plane = plane.id().0, "not placing view on primary, no framebuffer");
            return false;
        };

        let Some(coords) = coords_for_view(view, output, plane) else {
            trace!(plane = plane.id().0, "not placing view on primary, unsuitable transform");
            return false;
        };

        if coords.dst != Rectangle::from_size(output.size) {
            trace!(plane = plane.id().0, dst = ?coords.dst, "not placing view on primary, invalid plane state");
            return false;
        }

        self.bind_framebuffer(pass, plane, view, fb, coords, zpos)
    }

    fn bind_framebuffer<V: View + ?Sized>(
        &mut self,
        pass: &mut Pass,
        plane: &Plane,
        view: &V,
        fb: &FrameBuffer,
        coords: PlaneCoords,
        zpos: u64,
    ) -> bool {
        let fence = view.acquire_fence();
        if fence.is_some() && !plane.supports_in_fence() {
            trace!(plane = plane.id().0, "not placing view on plane, no in-fence support");
            return false;
        }

        let state = pass.state.plane_state_mut(plane);
        state.view = Some(view.id().clone());
        state.config = Some(PlaneConfig {
            src: coords.src,
            dst: coords.dst,
            transform: coords.transform,
            zpos,
            fb: fb.clone(),
            fence,
        });
        true
    }

    fn prepare_cursor_view<V: View + ?Sized>(
        &mut self,
        pass: &mut Pass,
        plane: &Plane,
        view: &V,
        zpos: u64,
    ) -> bool {
        let cursor_size = self.cursor.size();

        let Some(coords) = coords_for_view(view, self.output.geometry(), plane) else {
            trace!(plane = plane.id().0, "not placing view on cursor, unsuitable transform");
            return false;
        };

        if coords.src.loc != Point::from((0.0, 0.0)) {
            trace!(plane = plane.id().0, src = ?coords.src, "not placing view on cursor, cropped buffer");
            return false;
        }

        if coords.src.size.w > cursor_size.w as f64 || coords.src.size.h > cursor_size.h as f64 {
            trace!(plane = plane.id().0, src = ?coords.src, "not placing view on cursor, buffer too large");
            return false;
        }

        if coords.src.size.w != coords.dst.size.w as f64 || coords.src.size.h != coords.dst.size.h as f64 {
            trace!(plane = plane.id().0, "not placing view on cursor, scaling required");
            return false;
        }

        let fb = match self.cursor.prepare(view) {
            Ok(fb) => fb,
            Err(_) => return false,
        };

        let state = pass.state.plane_state_mut(plane);
        state.view = Some(view.id().clone());
        state.config = Some(PlaneConfig {
            src: Rectangle::from_size(cursor_size.to_f64()),
            dst: Rectangle::new(coords.dst.loc, (cursor_size.w, cursor_size.h).into()),
            transform: Transform::Normal,
            zpos,
            fb,
            fence: None,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{allocator::format::FormatSet, drm::PlaneRegistry},
        output::{Mode, OutputId, OutputSet},
    };

    use crate::backend::drm::compositor::ViewId;

    struct Surface {
        id: ViewId,
        geometry: Rectangle<i32, Physical>,
        src: Rectangle<f64, Buffer>,
        transform: Transform,
    }

    impl View for Surface {
        fn id(&self) -> &ViewId {
            &self.id
        }
        fn geometry(&self) -> Rectangle<i32, Physical> {
            self.geometry
        }
        fn src(&self) -> Rectangle<f64, Buffer> {
            self.src
        }
        fn transform(&self) -> Transform {
            self.transform
        }
        fn outputs(&self) -> OutputSet {
            OutputSet::only(OutputId(0))
        }
        fn has_valid_buffer(&self) -> bool {
            true
        }
    }

    fn plane(id: u32, zpos_max: u64) -> Plane {
        Plane::new(PlaneId(id), PlaneType::Overlay, FormatSet::default()).with_zpos(0, zpos_max)
    }

    #[test]
    fn candidates_are_sorted_by_descending_zpos() {
        let registry = PlaneRegistry::new([plane(1, 2), plane(2, 5), plane(3, 2), plane(4, 7)]);
        let mut candidates = ZposCandidates::default();
        for plane in registry.planes() {
            candidates.add(plane);
        }

        let mut order = Vec::new();
        while let Some(plane) = candidates.head() {
            order.push(plane.id().0);
            candidates.remove(plane.id());
        }
        assert_eq!(order, vec![4, 2, 1, 3]);
    }

    #[test]
    fn coords_are_cropped_to_output() {
        let output = Output::new(
            OutputId(0),
            "test",
            0,
            Mode {
                size: (100, 100).into(),
                refresh: 60_000,
            },
        );
        let view = Surface {
            id: ViewId::new(),
            geometry: Rectangle::new((50, 0).into(), (100, 50).into()),
            src: Rectangle::from_size((200.0, 100.0).into()),
            transform: Transform::Normal,
        };

        let coords = coords_for_view(&view, output.geometry(), &plane(1, 1)).unwrap();
        assert_eq!(coords.dst, Rectangle::new((50, 0).into(), (50, 50).into()));
        assert_eq!(coords.src, Rectangle::from_size((100.0, 100.0).into()));
    }

    #[test]
    fn coords_reject_unsupported_transform() {
        let view = Surface {
            id: ViewId::new(),
            geometry: Rectangle::from_size((100, 100).into()),
            src: Rectangle::from_size((100.0, 100.0).into()),
            transform: Transform::_90,
        };
        let output = Rectangle::from_size((100, 100).into());

        assert!(coords_for_view(&view, output, &plane(1, 1)).is_none());

        let rotating = plane(1, 1).with_transforms([Transform::Normal, Transform::_90]);
        let coords = coords_for_view(&view, output, &rotating).unwrap();
        assert_eq!(coords.transform, Transform::_90);
        assert_eq!(coords.dst, output);
    }
}
