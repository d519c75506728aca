use indexmap::IndexMap;
use tracing::{debug, error, instrument, trace};

use crate::{
    backend::drm::{
        DuplicateMode, OutputState, PlaneConfig, PlaneId, PlaneRegistry, ProposeError, TestOracle,
    },
    output::Output,
};

use super::{
    cursor::{CursorBuffer, CursorState},
    FramebufferImporter, OcclusionTracker, PlannerConfig, ProposeMode, RenderingReason, View, ViewId,
    ViewPlacement, Visibility,
};

/// Working data of a single proposal
#[derive(Debug)]
pub(super) struct Pass {
    pub mode: ProposeMode,
    pub state: OutputState,
    /// zpos of the last view placed on a plane, views further back must go below it
    pub lowest_zpos: Option<u64>,
    /// zpos of the seeded primary plane in mixed mode
    pub primary_zpos: Option<u64>,
}

/// A state that passed the checks for its mode
#[derive(Debug)]
pub(super) struct Proposal {
    pub state: OutputState,
    pub placements: IndexMap<ViewId, ViewPlacement>,
}

/// Everything a proposal for one output reads from or calls into
pub(super) struct Proposer<'a, C, I, T> {
    pub(super) output: &'a Output,
    pub(super) registry: &'a PlaneRegistry,
    pub(super) config: &'a PlannerConfig,
    pub(super) current: &'a OutputState,
    pub(super) cursor: &'a mut CursorState<C>,
    pub(super) importer: &'a mut I,
    pub(super) oracle: &'a mut T,
}

impl<'a, C, I, T> Proposer<'a, C, I, T>
where
    C: CursorBuffer,
    T: TestOracle,
{
    /// Build a state for the output's next refresh using the given mode
    ///
    /// On error every plane state of the proposal is dropped, releasing the
    /// framebuffer references it took.
    #[instrument(level = "trace", skip_all, fields(output = %self.output.name(), ?mode))]
    #[profiling::function]
    pub(super) fn propose<V>(
        &mut self,
        views: &[V],
        mode: ProposeMode,
    ) -> Result<Proposal, ProposeError<T::Error>>
    where
        V: View,
        I: FramebufferImporter<V>,
    {
        if mode == ProposeMode::RendererOnly {
            return Ok(self.propose_renderer_only(views));
        }

        let mut pass = Pass {
            mode,
            state: self.current.duplicate(DuplicateMode::ClearPlanes),
            lowest_zpos: None,
            primary_zpos: None,
        };

        let seeded = if mode == ProposeMode::Mixed {
            Some(self.seed_primary(&mut pass)?)
        } else {
            None
        };

        let renderer_allowed = mode != ProposeMode::PlanesOnly;
        let mut tracker = OcclusionTracker::new(self.output.geometry());
        let mut placements = IndexMap::with_capacity(views.len());

        for view in views {
            let placement = match tracker.classify(view, self.output) {
                Visibility::NotOnOutput => ViewPlacement::NotOnOutput,
                Visibility::Occluded => ViewPlacement::Occluded,
                Visibility::Visible {
                    clipped,
                    force_renderer,
                } => {
                    let plane = match force_renderer {
                        Some(_) => None,
                        None => self.prepare_plane_view(&mut pass, view),
                    };

                    match plane {
                        Some(plane) => {
                            tracker.add_plane(view, clipped, plane.plane_type());
                            ViewPlacement::Plane {
                                plane: plane.id(),
                                plane_type: plane.plane_type(),
                            }
                        }
                        None if !renderer_allowed => {
                            trace!(view = ?view.id(), "view needs the renderer, failing planes-only state");
                            return Err(ProposeError::RendererNotAllowed {
                                view: view.id().clone(),
                            });
                        }
                        None => {
                            tracker.add_renderer(view, clipped);
                            ViewPlacement::Renderer {
                                reason: force_renderer.unwrap_or(RenderingReason::NoSuitablePlane),
                            }
                        }
                    }
                }
            };
            placements.insert(view.id().clone(), placement);
        }

        if let Some(zpos) = pass.state.duplicate_zpos() {
            error!(zpos, "proposed state uses a zpos more than once");
            return Err(ProposeError::DuplicateZpos { zpos });
        }

        self.oracle.test_state(&pass.state).map_err(|err| {
            debug!("test commit of {:?} state failed: {}", mode, err);
            ProposeError::TestFailed(err)
        })?;

        // the renderer will provide a new framebuffer for the primary plane
        if let Some(primary) = seeded {
            pass.state.put_back(primary);
        }

        pass.state.set_mode(mode);
        Ok(Proposal {
            state: pass.state,
            placements,
        })
    }

    /// Route every visible view to the renderer
    ///
    /// Planes are never considered, so every visible view is reported with
    /// [`RenderingReason::RendererOnly`]. No plane is bound and the oracle is
    /// not consulted, the resulting state is validated when the renderer
    /// output gets committed.
    #[instrument(level = "trace", skip_all, fields(output = %self.output.name()))]
    pub(super) fn propose_renderer_only<V: View>(&self, views: &[V]) -> Proposal {
        let mut state = self.current.duplicate(DuplicateMode::ClearPlanes);
        let mut tracker = OcclusionTracker::new(self.output.geometry());
        let mut placements = IndexMap::with_capacity(views.len());

        for view in views {
            let placement = match tracker.classify(view, self.output) {
                Visibility::NotOnOutput => ViewPlacement::NotOnOutput,
                Visibility::Occluded => ViewPlacement::Occluded,
                Visibility::Visible { clipped, .. } => {
                    tracker.add_renderer(view, clipped);
                    ViewPlacement::Renderer {
                        reason: RenderingReason::RendererOnly,
                    }
                }
            };
            placements.insert(view.id().clone(), placement);
        }

        state.set_mode(ProposeMode::RendererOnly);
        Proposal { state, placements }
    }

    /// Put the last renderer framebuffer on the primary plane at its lowest zpos
    fn seed_primary(&self, pass: &mut Pass) -> Result<PlaneId, ProposeError<T::Error>> {
        let Some(primary) = self.registry.primary_plane_for(self.output) else {
            trace!("no primary plane to seed");
            return Err(ProposeError::NoRendererFramebuffer);
        };

        let Some(current) = self
            .current
            .plane_state(primary.id())
            .and_then(|state| state.config.as_ref())
        else {
            trace!("no previous renderer framebuffer on the primary plane");
            return Err(ProposeError::NoRendererFramebuffer);
        };

        if !self
            .config
            .mixed_mode_seed()
            .accepts(&current.fb, self.output.current_mode().size)
        {
            trace!(fb = ?current.fb, "previous renderer framebuffer does not fit the current mode");
            return Err(ProposeError::RendererFramebufferMismatch);
        }

        let zpos = primary.zpos().min;
        let state = pass.state.plane_state_mut(primary);
        state.view = None;
        state.config = Some(PlaneConfig {
            zpos,
            ..current.clone()
        });
        pass.primary_zpos = Some(zpos);

        trace!(plane = primary.id().0, zpos, "seeded primary plane with renderer framebuffer");
        Ok(primary.id())
    }
}
