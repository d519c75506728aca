use smallvec::{smallvec, SmallVec};
use tracing::{debug, info, instrument, trace};

use crate::{
    backend::allocator::format::FormatSet,
    output::{Output, OutputId},
    utils::Transform,
};

/// Kernel object id of a plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaneId(pub u32);

/// Type of a plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaneType {
    /// Primary plane, carries the composited renderer output
    Primary,
    /// Overlay plane
    Overlay,
    /// Cursor plane
    Cursor,
}

/// Inclusive range of composition-order values a plane accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZposRange {
    /// Lowest zpos the plane can be placed at
    pub min: u64,
    /// Highest zpos the plane can be placed at
    pub max: u64,
}

impl ZposRange {
    /// A range containing a single, immutable value
    pub const fn fixed(zpos: u64) -> Self {
        ZposRange { min: zpos, max: zpos }
    }

    /// Returns true if the plane's zpos can not be changed
    pub fn is_immutable(&self) -> bool {
        self.min == self.max
    }
}

/// Static description of a hardware plane
#[derive(Debug, Clone)]
pub struct Plane {
    id: PlaneId,
    plane_type: PlaneType,
    zpos: Option<ZposRange>,
    formats: FormatSet,
    transforms: SmallVec<[Transform; 8]>,
    in_fence: bool,
    possible_crtcs: u32,
}

impl Plane {
    /// Create a new plane scanning out the given formats
    ///
    /// The plane is usable with any CRTC, only supports [`Transform::Normal`]
    /// and does not accept in-fences until configured otherwise.
    pub fn new(id: PlaneId, plane_type: PlaneType, formats: FormatSet) -> Self {
        Plane {
            id,
            plane_type,
            zpos: None,
            formats,
            transforms: smallvec![Transform::Normal],
            in_fence: false,
            possible_crtcs: u32::MAX,
        }
    }

    /// Set the zpos range advertised by the plane
    pub fn with_zpos(mut self, min: u64, max: u64) -> Self {
        self.zpos = Some(ZposRange {
            min: min.min(max),
            max: max.max(min),
        });
        self
    }

    /// Set the transforms supported through the plane's rotation property
    pub fn with_transforms(mut self, transforms: impl IntoIterator<Item = Transform>) -> Self {
        self.transforms = transforms.into_iter().collect();
        if !self.transforms.contains(&Transform::Normal) {
            self.transforms.push(Transform::Normal);
        }
        self
    }

    /// Set whether the plane accepts an in-fence
    pub fn with_in_fence(mut self, in_fence: bool) -> Self {
        self.in_fence = in_fence;
        self
    }

    /// Set the bitmask of CRTC indices the plane can be used with
    pub fn with_possible_crtcs(mut self, possible_crtcs: u32) -> Self {
        self.possible_crtcs = possible_crtcs;
        self
    }

    /// Id of the plane
    pub fn id(&self) -> PlaneId {
        self.id
    }

    /// Type of the plane
    pub fn plane_type(&self) -> PlaneType {
        self.plane_type
    }

    /// The zpos range of the plane
    ///
    /// Planes registered in a [`PlaneRegistry`] always have a range, planes
    /// not advertising one report zero.
    pub fn zpos(&self) -> ZposRange {
        self.zpos.unwrap_or(ZposRange::fixed(0))
    }

    /// Format/modifier pairs the plane can scan out
    pub fn formats(&self) -> &FormatSet {
        &self.formats
    }

    /// Returns true if the plane can apply the given transform
    pub fn supports_transform(&self, transform: Transform) -> bool {
        self.transforms.contains(&transform)
    }

    /// Returns true if the plane accepts an in-fence
    pub fn supports_in_fence(&self) -> bool {
        self.in_fence
    }

    /// Returns true if the plane can be used with the CRTC at index `pipe`
    pub fn is_compatible_with_pipe(&self, pipe: u32) -> bool {
        1u32.checked_shl(pipe)
            .map(|bit| self.possible_crtcs & bit != 0)
            .unwrap_or(false)
    }
}

bitflags::bitflags! {
    /// Plane classes disabled for direct scan-out
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DisabledPlanes: u8 {
        /// Primary and overlay planes are not used for client buffers
        const OVERLAY = 0b01;
        /// Cursor planes are not used
        const CURSOR = 0b10;
    }
}

#[derive(Debug)]
struct PlaneEntry {
    plane: Plane,
    output: Option<OutputId>,
    complete: bool,
}

/// Catalog of the planes of a display controller
///
/// Created once at backend initialization. The registry remembers which output's
/// committed state every plane is bound to, so a plane is never offered to two
/// outputs at the same time.
#[derive(Debug)]
pub struct PlaneRegistry {
    planes: Vec<PlaneEntry>,
    disabled: DisabledPlanes,
}

impl PlaneRegistry {
    /// Create a registry from the planes of a device
    ///
    /// Planes without a zpos range get immutable values assigned: all primary
    /// planes share the lowest value, followed by the overlay and cursor planes.
    #[instrument(level = "debug", skip_all)]
    pub fn new(planes: impl IntoIterator<Item = Plane>) -> Self {
        let mut planes = planes.into_iter().collect::<Vec<_>>();

        if planes.iter().any(|plane| plane.zpos.is_none()) {
            let count = |ty: PlaneType| planes.iter().filter(|p| p.plane_type == ty).count() as u64;
            let primary = 0u64;
            let overlay = primary + count(PlaneType::Primary);
            let cursor = overlay + count(PlaneType::Overlay);

            debug!("zpos property not found, using invented immutable zpos values");
            for plane in planes.iter_mut().filter(|p| p.zpos.is_none()) {
                let zpos = match plane.plane_type {
                    PlaneType::Primary => primary,
                    PlaneType::Overlay => overlay,
                    PlaneType::Cursor => cursor,
                };
                trace!(plane = plane.id.0, ?plane.plane_type, zpos, "invented zpos");
                plane.zpos = Some(ZposRange::fixed(zpos));
            }
        }

        PlaneRegistry {
            planes: planes
                .into_iter()
                .map(|plane| PlaneEntry {
                    plane,
                    output: None,
                    complete: true,
                })
                .collect(),
            disabled: DisabledPlanes::empty(),
        }
    }

    /// All planes in registry order
    pub fn planes(&self) -> impl Iterator<Item = &Plane> {
        self.planes.iter().map(|entry| &entry.plane)
    }

    /// Look up a plane by id
    pub fn plane(&self, id: PlaneId) -> Option<&Plane> {
        self.entry(id).map(|entry| &entry.plane)
    }

    /// Planes that may be used for the given output's next state
    ///
    /// A plane is available if its class is not disabled, its last request
    /// completed, it is not bound to another output and it can be used with the
    /// output's CRTC. Virtual outputs never get any planes.
    pub fn available_planes<'a>(&'a self, output: &'a Output) -> impl Iterator<Item = &'a Plane> + 'a {
        self.planes
            .iter()
            .filter(move |entry| self.is_available(entry, output))
            .map(|entry| &entry.plane)
    }

    /// Returns true if the plane may be used for the given output's next state
    pub fn is_plane_available(&self, id: PlaneId, output: &Output) -> bool {
        self.entry(id)
            .map(|entry| self.is_available(entry, output))
            .unwrap_or(false)
    }

    /// The primary plane used to scan out the given output
    pub fn primary_plane_for(&self, output: &Output) -> Option<&Plane> {
        self.planes
            .iter()
            .filter(|entry| entry.plane.plane_type == PlaneType::Primary)
            .filter(|entry| entry.plane.is_compatible_with_pipe(output.pipe()))
            .find(|entry| entry.output.map(|id| id == output.id()).unwrap_or(true))
            .map(|entry| &entry.plane)
    }

    /// The output whose committed state currently uses the plane
    pub fn bound_output(&self, id: PlaneId) -> Option<OutputId> {
        self.entry(id).and_then(|entry| entry.output)
    }

    /// Record that the plane is used by the output's committed state
    pub fn bind(&mut self, id: PlaneId, output: OutputId) {
        if let Some(entry) = self.entry_mut(id) {
            entry.output = Some(output);
        }
    }

    /// Record that the plane is no longer used by the output's committed state
    ///
    /// Does nothing if the plane is bound to a different output.
    pub fn release(&mut self, id: PlaneId, output: OutputId) {
        if let Some(entry) = self.entry_mut(id) {
            if entry.output == Some(output) {
                entry.output = None;
            }
        }
    }

    /// Mark whether the last request involving the plane has completed
    pub fn set_complete(&mut self, id: PlaneId, complete: bool) {
        if let Some(entry) = self.entry_mut(id) {
            entry.complete = complete;
        }
    }

    /// Plane classes currently disabled
    pub fn disabled(&self) -> DisabledPlanes {
        self.disabled
    }

    /// Enable or disable plane classes
    pub fn set_disabled(&mut self, planes: DisabledPlanes, disabled: bool) {
        self.disabled.set(planes, disabled);
        info!(disabled = ?self.disabled, "plane classes changed");
    }

    /// Flip the disabled state of plane classes
    pub fn toggle_disabled(&mut self, planes: DisabledPlanes) {
        self.disabled.toggle(planes);
        info!(disabled = ?self.disabled, "plane classes changed");
    }

    /// Returns true if direct scan-out on primary and overlay planes is disabled
    pub fn overlays_disabled(&self) -> bool {
        self.disabled.contains(DisabledPlanes::OVERLAY)
    }

    /// Returns true if the cursor planes are disabled
    pub fn cursors_disabled(&self) -> bool {
        self.disabled.contains(DisabledPlanes::CURSOR)
    }

    fn is_available(&self, entry: &PlaneEntry, output: &Output) -> bool {
        let class_disabled = match entry.plane.plane_type {
            PlaneType::Cursor => self.cursors_disabled(),
            PlaneType::Primary | PlaneType::Overlay => self.overlays_disabled(),
        };

        !output.is_virtual()
            && !class_disabled
            && entry.complete
            && entry.output.map(|id| id == output.id()).unwrap_or(true)
            && entry.plane.is_compatible_with_pipe(output.pipe())
    }

    fn entry(&self, id: PlaneId) -> Option<&PlaneEntry> {
        self.planes.iter().find(|entry| entry.plane.id == id)
    }

    fn entry_mut(&mut self, id: PlaneId) -> Option<&mut PlaneEntry> {
        self.planes.iter_mut().find(|entry| entry.plane.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Mode;

    fn output(id: u8, pipe: u32) -> Output {
        Output::new(
            OutputId(id),
            format!("output-{}", id),
            pipe,
            Mode {
                size: (1920, 1080).into(),
                refresh: 60_000,
            },
        )
    }

    fn registry() -> PlaneRegistry {
        PlaneRegistry::new([
            Plane::new(PlaneId(31), PlaneType::Primary, FormatSet::default()).with_possible_crtcs(0b01),
            Plane::new(PlaneId(32), PlaneType::Primary, FormatSet::default()).with_possible_crtcs(0b10),
            Plane::new(PlaneId(40), PlaneType::Overlay, FormatSet::default()),
            Plane::new(PlaneId(41), PlaneType::Overlay, FormatSet::default()),
            Plane::new(PlaneId(50), PlaneType::Cursor, FormatSet::default()),
        ])
    }

    fn ids<'a>(planes: impl Iterator<Item = &'a Plane>) -> Vec<u32> {
        planes.map(|p| p.id().0).collect()
    }

    #[test]
    fn invented_zpos_orders_plane_classes() {
        let registry = registry();
        let zpos = |id| registry.plane(PlaneId(id)).unwrap().zpos();

        assert_eq!(zpos(31), ZposRange::fixed(0));
        assert_eq!(zpos(32), ZposRange::fixed(0));
        assert_eq!(zpos(40), ZposRange::fixed(2));
        assert_eq!(zpos(41), ZposRange::fixed(2));
        assert_eq!(zpos(50), ZposRange::fixed(4));
    }

    #[test]
    fn advertised_zpos_is_kept() {
        let registry = PlaneRegistry::new([
            Plane::new(PlaneId(1), PlaneType::Primary, FormatSet::default()).with_zpos(0, 0),
            Plane::new(PlaneId(2), PlaneType::Overlay, FormatSet::default()).with_zpos(1, 7),
        ]);
        assert_eq!(
            registry.plane(PlaneId(2)).unwrap().zpos(),
            ZposRange { min: 1, max: 7 }
        );
        assert!(!registry.plane(PlaneId(2)).unwrap().zpos().is_immutable());
    }

    #[test]
    fn availability_follows_pipe_and_binding() {
        let mut registry = registry();
        let first = output(0, 0);
        let second = output(1, 1);

        assert_eq!(ids(registry.available_planes(&first)), vec![31, 40, 41, 50]);
        assert_eq!(ids(registry.available_planes(&second)), vec![32, 40, 41, 50]);

        registry.bind(PlaneId(40), first.id());
        assert_eq!(ids(registry.available_planes(&first)), vec![31, 40, 41, 50]);
        assert_eq!(ids(registry.available_planes(&second)), vec![32, 41, 50]);

        registry.release(PlaneId(40), second.id());
        assert_eq!(registry.bound_output(PlaneId(40)), Some(first.id()));
        registry.release(PlaneId(40), first.id());
        assert_eq!(ids(registry.available_planes(&second)), vec![32, 40, 41, 50]);
    }

    #[test]
    fn pending_planes_are_unavailable() {
        let mut registry = registry();
        let output = output(0, 0);
        registry.set_complete(PlaneId(41), false);
        assert_eq!(ids(registry.available_planes(&output)), vec![31, 40, 50]);
    }

    #[test]
    fn disabled_classes() {
        let mut registry = registry();
        let output = output(0, 0);

        registry.set_disabled(DisabledPlanes::CURSOR, true);
        assert_eq!(ids(registry.available_planes(&output)), vec![31, 40, 41]);

        registry.toggle_disabled(DisabledPlanes::CURSOR | DisabledPlanes::OVERLAY);
        assert_eq!(ids(registry.available_planes(&output)), vec![50]);
        assert!(registry.overlays_disabled());
        assert!(!registry.cursors_disabled());
    }

    #[test]
    fn virtual_outputs_get_no_planes() {
        let registry = registry();
        let output = Output::new_virtual(
            OutputId(3),
            "virtual",
            Mode {
                size: (640, 480).into(),
                refresh: 60_000,
            },
        );
        assert_eq!(registry.available_planes(&output).count(), 0);
    }

    #[test]
    fn primary_plane_matches_pipe() {
        let registry = registry();
        assert_eq!(
            registry.primary_plane_for(&output(1, 1)).map(|p| p.id()),
            Some(PlaneId(32))
        );
    }
}
