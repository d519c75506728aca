//! Plane assignment for [`View`]s
//!
//! When possible composition can be (partially) offloaded to the display controller by
//! assigning views to drm planes. This is especially important for latency intensive
//! fullscreen clients like video players or games.
//!
//! The [`OutputPlanner`] does so by walking the stack of provided [`View`]s from front to back
//! while trying to assign each view to a hardware plane. Every view that can not be placed on
//! a plane is left to the renderer, which composites it into the framebuffer of the primary plane.
//!
//! ## Composition modes
//!
//! A repaint cycle tries up to three modes, each more conservative than the one before:
//!
//! - [`ProposeMode::PlanesOnly`]: every visible view has to be placed on a plane, including the
//!   primary plane. The resulting state is tested once after all views were visited.
//! - [`ProposeMode::Mixed`]: the primary plane keeps showing the last renderer framebuffer at its
//!   lowest zpos and views that do not fit on an overlay or the cursor plane go to the renderer.
//!   Every overlay assignment is tested right away.
//! - [`ProposeMode::RendererOnly`]: all views go to the renderer. This mode always succeeds and
//!   is not tested, the resulting frame gets validated when it is committed.
//!
//! The first mode yielding a state the [`TestOracle`](super::TestOracle) accepts wins.
//!
//! ## What makes a [`View`] eligible for direct scan-out
//!
//! A view is never put on a plane if it is visible on more than one output, has no valid buffer,
//! intersects content already given to the renderer or requires content protection the output
//! does not currently provide. Views completely hidden behind opaque content of views above them
//! are skipped entirely.
//!
//! ### Overlay and primary planes
//!
//! The view's buffer has to be imported as a [`FrameBuffer`] through the provided
//! [`FramebufferImporter`] and the plane has to support its format and modifier. The primary plane
//! additionally requires the view to cover the whole output.
//!
//! ### Cursor plane
//!
//! Cursor planes do not scan out client buffers directly. The view's shared-memory pixels are
//! copied into one of two shadow buffers of the cursor size, which requires the view to be neither
//! scaled nor cropped.
//!
//! # How to use it
//!
//! ```no_run
//! use kms_planner::{
//!     backend::{
//!         allocator::{format::FormatSet, Format, Fourcc, Modifier},
//!         drm::{
//!             compositor::{OutputPlanner, PlannerConfig, View},
//!             FrameBuffer, Plane, PlaneId, PlaneRegistry, PlaneType,
//!         },
//!     },
//!     output::{Mode, Output, OutputId},
//! };
//! # use kms_planner::backend::{allocator::Buffer, drm::{compositor::CursorBuffer, OutputState, TestOracle}};
//! # struct Cursor(FrameBuffer);
//! # impl Buffer for Cursor {
//! #     fn width(&self) -> u32 { 64 }
//! #     fn height(&self) -> u32 { 64 }
//! #     fn format(&self) -> Format { self.0.format() }
//! # }
//! # impl CursorBuffer for Cursor {
//! #     fn framebuffer(&self) -> &FrameBuffer { &self.0 }
//! #     fn write(&mut self, _data: &[u8]) -> std::io::Result<()> { Ok(()) }
//! # }
//! # struct Device;
//! # impl TestOracle for Device {
//! #     type Error = std::io::Error;
//! #     fn test_state(&mut self, _state: &OutputState) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # let mut device = Device;
//! # let views: Vec<&dyn View> = Vec::new();
//!
//! let formats: FormatSet = [Format {
//!     code: Fourcc::Xrgb8888,
//!     modifier: Modifier::Linear,
//! }]
//! .into_iter()
//! .collect();
//!
//! // ...query the planes of the device once
//! let mut registry = PlaneRegistry::new([
//!     Plane::new(PlaneId(31), PlaneType::Primary, formats.clone()),
//!     Plane::new(PlaneId(40), PlaneType::Overlay, formats),
//! ]);
//!
//! let output = Output::new(
//!     OutputId(0),
//!     "DP-1",
//!     0,
//!     Mode {
//!         size: (1920, 1080).into(),
//!         refresh: 60_000,
//!     },
//! );
//! let mut planner: OutputPlanner<Cursor> = OutputPlanner::new(output, PlannerConfig::default());
//!
//! // ...on every repaint
//! let mut importer = |_view: &&dyn View| -> Option<FrameBuffer> { None };
//! let assignment = planner.assign_planes(&registry, &views, &mut importer, &mut device);
//!
//! for _view in assignment.rendered_views() {
//!     // ...render the view into the primary plane's buffer
//! }
//!
//! // ...commit the state together with the rendered framebuffer
//! # let renderer_fb: Option<FrameBuffer> = None;
//! planner.state_committed(&mut registry, assignment.state, renderer_fb);
//! ```

use std::{fmt, sync::Arc};

use tracing::{debug, info_span, instrument, trace, warn};

use crate::{
    backend::{
        allocator::{Allocator, Fourcc},
        drm::{FrameBuffer, FramebufferKind, OutputState, PlaneConfig, PlaneRegistry, PlaneType, TestOracle},
    },
    output::Output,
    utils::{Buffer, Physical, Rectangle, Size, Transform},
};

mod candidates;
mod cursor;
mod elements;
mod frame_result;
mod occlusion;
mod propose;

pub use cursor::CursorBuffer;
pub use elements::{ContentProtection, FramebufferImporter, ShmBuffer, View, ViewId};
pub use frame_result::{Assignment, PresentationKind, RenderingReason, ViewPlacement};
pub use occlusion::{OcclusionTracker, Visibility};

use cursor::CursorState;
use propose::{Proposal, Proposer};

/// Strategy used to build an [`OutputState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProposeMode {
    /// Every visible view is placed on a plane
    PlanesOnly,
    /// Views are placed on planes above the renderer output on the primary plane
    Mixed,
    /// Every visible view is composited by the renderer
    RendererOnly,
}

/// Decides whether the last renderer framebuffer may seed the primary plane in mixed mode
///
/// The predicate gets the framebuffer and the size of the output's current mode.
#[derive(Clone)]
pub struct MixedSeedPolicy(Arc<dyn Fn(&FrameBuffer, Size<i32, Physical>) -> bool + Send + Sync>);

impl MixedSeedPolicy {
    /// Create a policy from a predicate
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&FrameBuffer, Size<i32, Physical>) -> bool + Send + Sync + 'static,
    {
        MixedSeedPolicy(Arc::new(predicate))
    }

    /// Returns true if the framebuffer may be reused for an output with the given mode size
    pub fn accepts(&self, fb: &FrameBuffer, mode_size: Size<i32, Physical>) -> bool {
        (self.0)(fb, mode_size)
    }
}

impl Default for MixedSeedPolicy {
    /// Accepts renderer framebuffers matching the mode size
    fn default() -> Self {
        MixedSeedPolicy::new(|fb, mode_size| {
            let size = fb.size();
            fb.kind() == FramebufferKind::Renderer && size.w == mode_size.w && size.h == mode_size.h
        })
    }
}

impl fmt::Debug for MixedSeedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MixedSeedPolicy").finish_non_exhaustive()
    }
}

/// Configuration of an [`OutputPlanner`]
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    direct_scanout: bool,
    cursor_size: Size<u32, Buffer>,
    cursor_format: Fourcc,
    mixed_mode_seed: MixedSeedPolicy,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            direct_scanout: true,
            cursor_size: (64, 64).into(),
            cursor_format: Fourcc::Argb8888,
            mixed_mode_seed: MixedSeedPolicy::default(),
        }
    }
}

impl PlannerConfig {
    /// Enable or disable the use of planes, disabled planes leave everything to the renderer
    pub fn with_direct_scanout(mut self, enabled: bool) -> Self {
        self.direct_scanout = enabled;
        self
    }

    /// Set the size of the cursor shadow buffers
    pub fn with_cursor_size(mut self, size: impl Into<Size<u32, Buffer>>) -> Self {
        self.cursor_size = size.into();
        self
    }

    /// Set the pixel format of the cursor shadow buffers
    pub fn with_cursor_format(mut self, format: Fourcc) -> Self {
        self.cursor_format = format;
        self
    }

    /// Set the predicate deciding if mixed mode can reuse the last renderer framebuffer
    pub fn with_mixed_mode_seed(mut self, policy: MixedSeedPolicy) -> Self {
        self.mixed_mode_seed = policy;
        self
    }

    /// Whether planes are used at all
    pub fn direct_scanout(&self) -> bool {
        self.direct_scanout
    }

    /// Size of the cursor shadow buffers
    pub fn cursor_size(&self) -> Size<u32, Buffer> {
        self.cursor_size
    }

    /// Pixel format of the cursor shadow buffers
    pub fn cursor_format(&self) -> Fourcc {
        self.cursor_format
    }

    /// Predicate for reusing the last renderer framebuffer in mixed mode
    pub fn mixed_mode_seed(&self) -> &MixedSeedPolicy {
        &self.mixed_mode_seed
    }
}

/// Assigns the views of an output to hardware planes on every repaint
#[derive(Debug)]
pub struct OutputPlanner<C> {
    output: Output,
    config: PlannerConfig,
    current: OutputState,
    cursor: CursorState<C>,
}

impl<C: CursorBuffer> OutputPlanner<C> {
    /// Create a planner for an output
    ///
    /// The cursor plane stays unused until shadow buffers got allocated with
    /// [`OutputPlanner::with_cursor_allocator`].
    pub fn new(output: Output, config: PlannerConfig) -> Self {
        let cursor_size = config.cursor_size;
        let cursor = CursorState::new(
            (cursor_size.w as i32, cursor_size.h as i32).into(),
            config.cursor_format,
        );
        OutputPlanner {
            current: OutputState::new(output.id()),
            output,
            config,
            cursor,
        }
    }

    /// Allocate the cursor shadow buffers
    ///
    /// If the allocation fails the planner works without the cursor plane.
    pub fn with_cursor_allocator<A: Allocator<C>>(mut self, allocator: &mut A) -> Self {
        let _guard = info_span!("cursor", output = %self.output.name()).entered();
        self.cursor.allocate(allocator);
        self
    }

    /// The output this planner assigns planes for
    pub fn output(&self) -> &Output {
        &self.output
    }

    /// Mutable access to the output, e.g. to update its mode or protection
    pub fn output_mut(&mut self) -> &mut Output {
        &mut self.output
    }

    /// The configuration of the planner
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// The state last passed to [`OutputPlanner::state_committed`]
    pub fn current_state(&self) -> &OutputState {
        &self.current
    }

    /// The view shown on the cursor plane in the last accepted state
    pub fn cursor_view(&self) -> Option<&ViewId> {
        self.cursor.view()
    }

    /// Decide which views are scanned out by which plane for the next refresh
    ///
    /// `views` have to be ordered topmost first. Planes are tried in mixed and planes-only mode
    /// unless direct scan-out is disabled, overlay planes are disabled in the registry or the
    /// output is virtual. This never fails, if no plane configuration is accepted by the
    /// `oracle` all views are left to the renderer.
    #[instrument(level = "trace", skip_all, fields(output = %self.output.name()))]
    #[profiling::function]
    pub fn assign_planes<V, I, T>(
        &mut self,
        registry: &PlaneRegistry,
        views: &[V],
        importer: &mut I,
        oracle: &mut T,
    ) -> Assignment
    where
        V: View,
        I: FramebufferImporter<V>,
        T: TestOracle,
    {
        self.cursor.begin_cycle();

        let planes_usable =
            self.config.direct_scanout && !registry.overlays_disabled() && !self.output.is_virtual();
        if !planes_usable {
            trace!(
                direct_scanout = self.config.direct_scanout,
                virtual_output = self.output.is_virtual(),
                "not using planes"
            );
        }

        let mut proposer = Proposer {
            output: &self.output,
            registry,
            config: &self.config,
            current: &self.current,
            cursor: &mut self.cursor,
            importer,
            oracle,
        };

        let mut accepted = None;
        if planes_usable {
            for mode in [ProposeMode::PlanesOnly, ProposeMode::Mixed] {
                match proposer.propose(views, mode) {
                    Ok(proposal) => {
                        debug!("using {:?} state", mode);
                        accepted = Some((mode, proposal));
                        break;
                    }
                    Err(err) => debug!("failed to propose {:?} state: {}", mode, err),
                }
            }
        }

        let (mode, Proposal { state, placements }) = accepted.unwrap_or_else(|| {
            debug!("falling back to renderer-only state");
            (ProposeMode::RendererOnly, proposer.propose_renderer_only(views))
        });

        if !state.has_framebuffer_on(PlaneType::Cursor) {
            self.cursor.forget_view();
        }

        Assignment {
            state,
            mode,
            placements,
        }
    }

    /// Make an accepted state the current state of the output
    ///
    /// `renderer_fb` is the framebuffer the renderer composited the remaining views into. It is
    /// put on the primary plane and seeds the primary plane of the next mixed mode proposal.
    /// Planes used by the state get bound to this output in the registry, planes no longer used
    /// are released.
    #[instrument(level = "debug", skip_all, fields(output = %self.output.name()))]
    pub fn state_committed(
        &mut self,
        registry: &mut PlaneRegistry,
        mut state: OutputState,
        renderer_fb: Option<FrameBuffer>,
    ) {
        let output = self.output.id();

        if let Some(fb) = renderer_fb {
            match registry.primary_plane_for(&self.output) {
                Some(primary) => {
                    let plane_state = state.plane_state_mut(primary);
                    if plane_state.is_enabled() {
                        warn!(
                            plane = primary.id().0,
                            "primary plane already shows a view, dropping renderer framebuffer"
                        );
                    } else {
                        plane_state.view = None;
                        plane_state.config = Some(PlaneConfig {
                            src: Rectangle::from_size(fb.size().to_f64()),
                            dst: Rectangle::from_size(self.output.current_mode().size),
                            transform: Transform::Normal,
                            zpos: primary.zpos().min,
                            fb,
                            fence: None,
                        });
                    }
                }
                None => warn!("no primary plane for renderer framebuffer"),
            }
        }

        for plane in self.current.enabled_planes() {
            if !state.is_assigned(plane.plane()) {
                registry.release(plane.plane(), output);
            }
        }
        for plane in state.enabled_planes() {
            registry.bind(plane.plane(), output);
        }

        trace!(planes = state.enabled_planes().count(), "committed state");
        self.current = state;
    }
}
