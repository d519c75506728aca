use std::{cell::RefCell, rc::Rc};

use kms_planner::{
    backend::{
        allocator::{format::FormatSet, Allocator, Buffer as BufferTrait, Format, Fourcc, Modifier},
        drm::{
            compositor::{
                Assignment, CursorBuffer, OutputPlanner, PlannerConfig, ShmBuffer, View, ViewId,
            },
            DisabledPlanes, FrameBuffer, FramebufferHandle, FramebufferKind, OutputState, Plane, PlaneId,
            PlaneRegistry, PlaneType, TestOracle,
        },
    },
    output::{Mode, Output, OutputId, OutputSet},
    utils::{Buffer, Physical, Rectangle},
};
use tracing::{info, warn};

const OUTPUT: OutputId = OutputId(0);

/// How the simulated kernel answers test commits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Accept,
    RejectOverlays,
    RejectAll,
}

#[derive(Debug, thiserror::Error)]
#[error("simulated kernel rejected the state with {planes} enabled planes")]
struct Rejected {
    planes: usize,
}

struct SimOracle {
    verdict: Verdict,
    tests: usize,
}

impl TestOracle for SimOracle {
    type Error = Rejected;

    fn test_state(&mut self, state: &OutputState) -> Result<(), Rejected> {
        self.tests += 1;
        let planes = state.enabled_planes().count();
        let uses_overlay = state
            .enabled_planes()
            .any(|plane| plane.plane_type() == PlaneType::Overlay);

        match self.verdict {
            Verdict::Accept => Ok(()),
            Verdict::RejectOverlays if !uses_overlay => Ok(()),
            Verdict::RejectOverlays | Verdict::RejectAll => Err(Rejected { planes }),
        }
    }
}

struct SimCursor {
    fb: FrameBuffer,
    pixels: Vec<u8>,
}

impl BufferTrait for SimCursor {
    fn width(&self) -> u32 {
        self.fb.size().w as u32
    }

    fn height(&self) -> u32 {
        self.fb.size().h as u32
    }

    fn format(&self) -> Format {
        self.fb.format()
    }
}

impl CursorBuffer for SimCursor {
    fn framebuffer(&self) -> &FrameBuffer {
        &self.fb
    }

    fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.pixels.clear();
        self.pixels.extend_from_slice(data);
        Ok(())
    }
}

/// Hands out framebuffer handles and logs when they are released
#[derive(Clone, Default)]
struct FramebufferPool {
    next: Rc<RefCell<u32>>,
}

impl FramebufferPool {
    fn create(&self, code: Fourcc, size: (i32, i32), kind: FramebufferKind) -> FrameBuffer {
        let handle = {
            let mut next = self.next.borrow_mut();
            *next += 1;
            FramebufferHandle(*next)
        };
        FrameBuffer::with_release(
            handle,
            Format {
                code,
                modifier: Modifier::Linear,
            },
            size.into(),
            kind,
            |handle| info!(fb = handle.0, "framebuffer released"),
        )
    }
}

impl Allocator<SimCursor> for FramebufferPool {
    type Error = std::convert::Infallible;

    fn create_buffer(
        &mut self,
        width: u32,
        height: u32,
        fourcc: Fourcc,
        _modifiers: &[Modifier],
    ) -> Result<SimCursor, Self::Error> {
        Ok(SimCursor {
            fb: self.create(fourcc, (width as i32, height as i32), FramebufferKind::Cursor),
            pixels: Vec::new(),
        })
    }
}

struct SimView {
    id: ViewId,
    name: &'static str,
    geometry: Rectangle<i32, Physical>,
    opaque: bool,
    fb: Option<FrameBuffer>,
    pixels: Option<Vec<u8>>,
}

impl View for SimView {
    fn id(&self) -> &ViewId {
        &self.id
    }

    fn geometry(&self) -> Rectangle<i32, Physical> {
        self.geometry
    }

    fn src(&self) -> Rectangle<f64, Buffer> {
        Rectangle::from_size((self.geometry.size.w as f64, self.geometry.size.h as f64).into())
    }

    fn opaque_regions(&self) -> Vec<Rectangle<i32, Physical>> {
        if self.opaque {
            vec![Rectangle::from_size(self.geometry.size)]
        } else {
            Vec::new()
        }
    }

    fn outputs(&self) -> OutputSet {
        OutputSet::only(OUTPUT)
    }

    fn has_valid_buffer(&self) -> bool {
        self.fb.is_some() || self.pixels.is_some()
    }

    fn shm_buffer(&self) -> Option<ShmBuffer<'_>> {
        self.pixels.as_ref().map(|data| ShmBuffer {
            data: data.as_slice(),
            stride: self.geometry.size.w as usize * 4,
            size: (self.geometry.size.w, self.geometry.size.h).into(),
            format: Fourcc::Argb8888,
        })
    }
}

struct Options {
    verdict: Verdict,
    cursor: bool,
    overlays: bool,
    direct_scanout: bool,
    cycles: usize,
}

fn parse_args() -> Options {
    let mut options = Options {
        verdict: Verdict::Accept,
        cursor: true,
        overlays: true,
        direct_scanout: true,
        cycles: 2,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--reject-overlays" => options.verdict = Verdict::RejectOverlays,
            "--reject-all" => options.verdict = Verdict::RejectAll,
            "--no-cursor" => options.cursor = false,
            "--disable-overlays" => options.overlays = false,
            "--renderer-only" => options.direct_scanout = false,
            "-n" | "--cycles" => match args.next().and_then(|n| n.parse().ok()) {
                Some(cycles) => options.cycles = cycles,
                None => warn!("--cycles expects a number"),
            },
            other => warn!("ignoring unknown argument {}", other),
        }
    }

    options
}

fn registry() -> PlaneRegistry {
    let formats = |codes: &[Fourcc]| -> FormatSet {
        codes
            .iter()
            .map(|code| Format {
                code: *code,
                modifier: Modifier::Linear,
            })
            .collect()
    };
    let scanout = formats(&[Fourcc::Xrgb8888, Fourcc::Argb8888]);

    // no zpos properties, the registry invents them
    PlaneRegistry::new([
        Plane::new(PlaneId(31), PlaneType::Primary, scanout.clone()),
        Plane::new(PlaneId(40), PlaneType::Overlay, formats(&[Fourcc::Nv12, Fourcc::Argb8888])),
        Plane::new(PlaneId(41), PlaneType::Overlay, scanout),
        Plane::new(PlaneId(50), PlaneType::Cursor, formats(&[Fourcc::Argb8888])),
    ])
}

fn scene(pool: &FramebufferPool) -> Vec<SimView> {
    vec![
        SimView {
            id: ViewId::new(),
            name: "pointer",
            geometry: Rectangle::new((900, 500).into(), (64, 64).into()),
            opaque: false,
            fb: None,
            pixels: Some(vec![0xff; 64 * 64 * 4]),
        },
        SimView {
            id: ViewId::new(),
            name: "video",
            geometry: Rectangle::new((320, 180).into(), (1280, 720).into()),
            opaque: true,
            fb: Some(pool.create(Fourcc::Nv12, (1280, 720), FramebufferKind::Client)),
            pixels: None,
        },
        SimView {
            id: ViewId::new(),
            name: "panel",
            geometry: Rectangle::new((0, 0).into(), (1920, 32).into()),
            opaque: false,
            fb: Some(pool.create(Fourcc::Argb8888, (1920, 32), FramebufferKind::Client)),
            pixels: None,
        },
        SimView {
            id: ViewId::new(),
            name: "wallpaper",
            geometry: Rectangle::new((0, 0).into(), (1920, 1080).into()),
            opaque: true,
            fb: Some(pool.create(Fourcc::Xrgb8888, (1920, 1080), FramebufferKind::Client)),
            pixels: None,
        },
    ]
}

fn report(cycle: usize, views: &[SimView], assignment: &Assignment) {
    println!("cycle {}: {:?}", cycle, assignment.mode);
    for view in views {
        let placement = assignment.placement(view.id());
        let presentation = assignment.presentation(view.id());
        println!("  {:<10} {:?} ({:?})", view.name, placement, presentation);
    }
    for plane in assignment.state.enabled_planes() {
        println!(
            "  plane {} {:?} zpos {:?}",
            plane.plane().0,
            plane.plane_type(),
            plane.zpos()
        );
    }
}

fn main() {
    if let Ok(env_filter) = tracing_subscriber::EnvFilter::try_from_default_env() {
        tracing_subscriber::fmt().compact().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().compact().init();
    }

    let options = parse_args();
    let mut pool = FramebufferPool::default();

    let mut registry = registry();
    if !options.overlays {
        registry.set_disabled(DisabledPlanes::OVERLAY, true);
    }

    let output = Output::new(
        OUTPUT,
        "SIM-1",
        0,
        Mode {
            size: (1920, 1080).into(),
            refresh: 60_000,
        },
    );
    let config = PlannerConfig::default().with_direct_scanout(options.direct_scanout);
    let mut planner: OutputPlanner<SimCursor> = OutputPlanner::new(output, config);
    if options.cursor {
        planner = planner.with_cursor_allocator(&mut pool);
    }

    let views = scene(&pool);
    let mut importer = |view: &SimView| view.fb.clone();
    let mut oracle = SimOracle {
        verdict: options.verdict,
        tests: 0,
    };

    for cycle in 0..options.cycles {
        let assignment = planner.assign_planes(&registry, &views, &mut importer, &mut oracle);
        report(cycle, &views, &assignment);

        let renderer_fb = (!assignment.is_renderer_free())
            .then(|| pool.create(Fourcc::Xrgb8888, (1920, 1080), FramebufferKind::Renderer));
        planner.state_committed(&mut registry, assignment.state, renderer_fb);
    }

    println!("{} test commits", oracle.tests);
}
