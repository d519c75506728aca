use indexmap::IndexMap;

use crate::backend::drm::{OutputState, PlaneId, PlaneType};

use super::{ProposeMode, ViewId};

/// Defines the reason why a view was selected for rendering instead
/// of direct scan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderingReason {
    /// The view is visible on more than one output
    MultipleOutputs,
    /// The view has no buffer that could be scanned out
    NoValidBuffer,
    /// The view intersects content already composited by the renderer
    OccludedByRenderer,
    /// The view requires content protection the output does not provide
    ProtectionRequired,
    /// No plane accepted the view
    NoSuitablePlane,
    /// Planes were not considered for this output state
    RendererOnly,
}

/// Where a view ended up for the current cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPlacement {
    /// The view is shown by a hardware plane
    Plane {
        /// The plane carrying the view
        plane: PlaneId,
        /// Type of that plane
        plane_type: PlaneType,
    },
    /// The view is composited by the renderer
    Renderer {
        /// Why the view could not go on a plane
        reason: RenderingReason,
    },
    /// The view is hidden behind opaque content
    Occluded,
    /// The view is not visible on this output
    NotOnOutput,
}

/// How a view reaches the screen, used for presentation feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationKind {
    /// The client buffer is scanned out without any copy
    ZeroCopyScanout,
    /// The contents are copied, either by the renderer or into a cursor buffer
    RendererComposited,
}

impl ViewPlacement {
    /// Presentation classification of the placement
    ///
    /// Returns `None` for views that are not shown at all.
    pub fn presentation(&self) -> Option<PresentationKind> {
        match self {
            ViewPlacement::Plane {
                plane_type: PlaneType::Cursor,
                ..
            } => Some(PresentationKind::RendererComposited),
            ViewPlacement::Plane { .. } => Some(PresentationKind::ZeroCopyScanout),
            ViewPlacement::Renderer { .. } => Some(PresentationKind::RendererComposited),
            ViewPlacement::Occluded | ViewPlacement::NotOnOutput => None,
        }
    }

    /// Returns true if the renderer has to draw the view
    pub fn needs_rendering(&self) -> bool {
        matches!(self, ViewPlacement::Renderer { .. })
    }
}

/// Result of [`OutputPlanner::assign_planes`](super::OutputPlanner::assign_planes)
#[derive(Debug)]
pub struct Assignment {
    /// The accepted state for the output's next refresh
    pub state: OutputState,
    /// The mode that produced the state
    pub mode: ProposeMode,
    /// Placement of every view, in the order the views were given
    pub placements: IndexMap<ViewId, ViewPlacement>,
}

impl Assignment {
    /// The placement of a view
    pub fn placement(&self, view: &ViewId) -> Option<ViewPlacement> {
        self.placements.get(view).copied()
    }

    /// Presentation classification of a view
    pub fn presentation(&self, view: &ViewId) -> Option<PresentationKind> {
        self.placement(view).and_then(|placement| placement.presentation())
    }

    /// Views the renderer has to draw, topmost first
    pub fn rendered_views(&self) -> impl Iterator<Item = &ViewId> {
        self.placements
            .iter()
            .filter(|(_, placement)| placement.needs_rendering())
            .map(|(id, _)| id)
    }

    /// Returns true if no view needs the renderer
    pub fn is_renderer_free(&self) -> bool {
        self.rendered_views().next().is_none()
    }
}
