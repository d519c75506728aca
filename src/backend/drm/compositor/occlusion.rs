use tracing::trace;

use crate::{
    backend::drm::PlaneType,
    output::Output,
    utils::{Physical, Rectangle, Region},
};

use super::{elements::visible_opaque_region, RenderingReason, View};

/// Visibility of a view, as determined by [`OcclusionTracker::classify`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// The view is not visible on this output
    NotOnOutput,
    /// The view is completely hidden by content above it
    Occluded,
    /// The view is at least partially visible
    Visible {
        /// Bounding box of the view clipped to the output
        clipped: Rectangle<i32, Physical>,
        /// Set if the view can not be placed on a plane
        force_renderer: Option<RenderingReason>,
    },
}

/// Accumulates covered areas while views are visited front to back
///
/// Tracks the area composited by the renderer, the area shown by planes and
/// the opaque area hiding everything further back.
#[derive(Debug)]
pub struct OcclusionTracker {
    output: Rectangle<i32, Physical>,
    renderer: Region,
    planes: Region,
    occluded: Region,
}

impl OcclusionTracker {
    /// Start tracking for an output with the given geometry
    pub fn new(output: Rectangle<i32, Physical>) -> Self {
        OcclusionTracker {
            output,
            renderer: Region::new(),
            planes: Region::new(),
            occluded: Region::new(),
        }
    }

    /// Determine whether the next view is visible and whether it may go on a plane
    pub fn classify<V: View + ?Sized>(&self, view: &V, output: &Output) -> Visibility {
        let outputs = view.outputs();
        if !outputs.contains(output.id()) {
            trace!(view = ?view.id(), "ignoring view, not on our output");
            return Visibility::NotOnOutput;
        }

        let clipped = match view.geometry().intersection(self.output) {
            Some(clipped) if !self.occluded.contains_rect(clipped) => clipped,
            _ => {
                trace!(view = ?view.id(), "ignoring view, occluded on our output");
                return Visibility::Occluded;
            }
        };

        let force_renderer = if !outputs.is_exclusive_to(output.id()) {
            Some(RenderingReason::MultipleOutputs)
        } else if !view.has_valid_buffer() {
            Some(RenderingReason::NoValidBuffer)
        } else if self.renderer.overlaps(clipped) {
            Some(RenderingReason::OccludedByRenderer)
        } else if view.protection().is_violated_by(output.current_protection()) {
            Some(RenderingReason::ProtectionRequired)
        } else {
            None
        };

        if let Some(reason) = force_renderer {
            trace!(view = ?view.id(), ?reason, "not assigning view to plane");
        }

        Visibility::Visible {
            clipped,
            force_renderer,
        }
    }

    /// Record a view shown by a plane
    ///
    /// Cursor planes blend with the content below and do not hide anything.
    pub fn add_plane<V: View + ?Sized>(
        &mut self,
        view: &V,
        clipped: Rectangle<i32, Physical>,
        plane_type: PlaneType,
    ) {
        if plane_type == PlaneType::Cursor {
            return;
        }
        self.planes.union_rect(clipped);
        self.occluded.union(&visible_opaque_region(view, clipped));
    }

    /// Record a view composited by the renderer
    pub fn add_renderer<V: View + ?Sized>(&mut self, view: &V, clipped: Rectangle<i32, Physical>) {
        self.renderer.union_rect(clipped);
        self.occluded.union(&visible_opaque_region(view, clipped));
    }

    /// Area composited by the renderer so far
    pub fn renderer_region(&self) -> &Region {
        &self.renderer
    }

    /// Area shown by overlay or primary planes so far
    pub fn planes_region(&self) -> &Region {
        &self.planes
    }

    /// Area hidden behind opaque content so far
    pub fn occluded_region(&self) -> &Region {
        &self.occluded
    }
}
