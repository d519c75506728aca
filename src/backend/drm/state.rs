use std::{collections::HashSet, os::unix::io::OwnedFd, sync::Arc};

use indexmap::IndexMap;

use crate::{
    backend::drm::compositor::{ProposeMode, ViewId},
    output::OutputId,
    utils::{Buffer, Physical, Rectangle, Transform},
};

use super::{FrameBuffer, Plane, PlaneId, PlaneType};

/// Configuration of an enabled plane
#[derive(Debug, Clone)]
pub struct PlaneConfig {
    /// Source [`Rectangle`] of the attached framebuffer
    pub src: Rectangle<f64, Buffer>,
    /// Destination [`Rectangle`] on the CRTC
    pub dst: Rectangle<i32, Physical>,
    /// Transform for the attached framebuffer
    pub transform: Transform,
    /// Composition order of the plane
    pub zpos: u64,
    /// Attached framebuffer
    pub fb: FrameBuffer,
    /// Fence to wait on before scanning out the framebuffer
    pub fence: Option<Arc<OwnedFd>>,
}

/// Proposed state of a single plane
///
/// A plane state without a config disables the plane.
#[derive(Debug, Clone)]
pub struct PlaneState {
    plane: PlaneId,
    plane_type: PlaneType,
    /// View shown on the plane, `None` for renderer output
    pub view: Option<ViewId>,
    /// Configuration of the plane, `None` if disabled
    pub config: Option<PlaneConfig>,
}

impl PlaneState {
    fn new(plane: &Plane) -> Self {
        PlaneState {
            plane: plane.id(),
            plane_type: plane.plane_type(),
            view: None,
            config: None,
        }
    }

    /// Plane this state belongs to
    pub fn plane(&self) -> PlaneId {
        self.plane
    }

    /// Type of the plane this state belongs to
    pub fn plane_type(&self) -> PlaneType {
        self.plane_type
    }

    /// Returns true if a framebuffer is attached
    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    /// Attached framebuffer, if any
    pub fn fb(&self) -> Option<&FrameBuffer> {
        self.config.as_ref().map(|config| &config.fb)
    }

    /// Composition order of the plane, if enabled
    pub fn zpos(&self) -> Option<u64> {
        self.config.as_ref().map(|config| config.zpos)
    }

    /// Detach the framebuffer and view, disabling the plane
    pub fn clear(&mut self) {
        self.view = None;
        self.config = None;
    }
}

/// How [`OutputState::duplicate`] treats the plane states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateMode {
    /// Copy every plane state, sharing their framebuffers
    Preserve,
    /// Start without any plane states
    ClearPlanes,
}

/// Plane states of an output for its next refresh
///
/// Holds at most one [`PlaneState`] per plane. Dropping the state releases the
/// references it holds on framebuffers.
#[derive(Debug)]
pub struct OutputState {
    output: OutputId,
    mode: Option<ProposeMode>,
    planes: IndexMap<PlaneId, PlaneState>,
}

impl OutputState {
    /// An empty state for the given output
    pub fn new(output: OutputId) -> Self {
        OutputState {
            output,
            mode: None,
            planes: IndexMap::new(),
        }
    }

    /// Output the state belongs to
    pub fn output(&self) -> OutputId {
        self.output
    }

    /// Mode of the proposal that produced this state
    pub fn mode(&self) -> Option<ProposeMode> {
        self.mode
    }

    pub(crate) fn set_mode(&mut self, mode: ProposeMode) {
        self.mode = Some(mode);
    }

    /// Create a working copy of this state
    pub fn duplicate(&self, mode: DuplicateMode) -> OutputState {
        OutputState {
            output: self.output,
            mode: None,
            planes: match mode {
                DuplicateMode::Preserve => self.planes.clone(),
                DuplicateMode::ClearPlanes => IndexMap::new(),
            },
        }
    }

    /// The state of a plane, if it is part of this output state
    pub fn plane_state(&self, plane: PlaneId) -> Option<&PlaneState> {
        self.planes.get(&plane)
    }

    /// The state of a plane, allocating a disabled one if it does not exist yet
    pub fn plane_state_mut(&mut self, plane: &Plane) -> &mut PlaneState {
        self.planes
            .entry(plane.id())
            .or_insert_with(|| PlaneState::new(plane))
    }

    /// Insert a plane state, replacing the previous state of that plane
    pub fn insert(&mut self, state: PlaneState) {
        self.planes.insert(state.plane, state);
    }

    /// Return a plane state to its disabled form, dropping its framebuffer reference
    pub fn put_back(&mut self, plane: PlaneId) {
        if let Some(state) = self.planes.get_mut(&plane) {
            state.clear();
        }
    }

    /// Returns true if the plane carries a framebuffer in this state
    pub fn is_assigned(&self, plane: PlaneId) -> bool {
        self.planes
            .get(&plane)
            .map(|state| state.is_enabled())
            .unwrap_or(false)
    }

    /// All plane states, in allocation order
    pub fn planes(&self) -> impl Iterator<Item = &PlaneState> {
        self.planes.values()
    }

    /// Plane states carrying a framebuffer
    pub fn enabled_planes(&self) -> impl Iterator<Item = &PlaneState> {
        self.planes.values().filter(|state| state.is_enabled())
    }

    /// The plane state showing the given view
    pub fn plane_for_view(&self, view: &ViewId) -> Option<&PlaneState> {
        self.planes
            .values()
            .find(|state| state.view.as_ref() == Some(view))
    }

    /// Returns true if a plane of the given type carries a framebuffer
    pub fn has_framebuffer_on(&self, plane_type: PlaneType) -> bool {
        self.enabled_planes()
            .any(|state| state.plane_type == plane_type)
    }

    /// Returns the first zpos used by more than one enabled plane
    pub fn duplicate_zpos(&self) -> Option<u64> {
        let mut seen = HashSet::new();
        self.enabled_planes()
            .filter_map(|state| state.zpos())
            .find(|zpos| !seen.insert(*zpos))
    }
}
