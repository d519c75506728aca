//! Kernel test oracle using atomic modesetting
//!
//! [`AtomicOracle`] translates an [`OutputState`] into an atomic request for a single
//! CRTC and validates it with a `TEST_ONLY` commit, leaving the device untouched.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    os::unix::io::AsRawFd,
};

use drm::control::{
    atomic::AtomicModeReq, crtc, framebuffer, plane, property, AtomicCommitFlags,
    Device as ControlDevice,
};
use tracing::{instrument, trace};

use crate::utils::{Coordinate, Transform};

use super::{AtomicError, OutputState, PlaneId, TestOracle};

type PropMapping = HashMap<plane::Handle, HashMap<String, property::Handle>>;

/// [`TestOracle`] running `TEST_ONLY` atomic commits on a drm device
pub struct AtomicOracle<D: ControlDevice> {
    device: D,
    crtc: crtc::Handle,
    prop_mapping: PropMapping,
    mutable_zpos: HashSet<plane::Handle>,
}

impl<D: ControlDevice> fmt::Debug for AtomicOracle<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicOracle")
            .field("crtc", &self.crtc)
            .field("planes", &self.prop_mapping.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<D: ControlDevice> AtomicOracle<D> {
    /// Create an oracle for the given CRTC and the planes that may be used with it
    pub fn new(
        device: D,
        crtc: crtc::Handle,
        planes: impl IntoIterator<Item = PlaneId>,
    ) -> Result<Self, AtomicError> {
        let planes = planes
            .into_iter()
            .map(plane_handle)
            .collect::<Result<Vec<_>, _>>()?;

        let mut prop_mapping = HashMap::new();
        let mut mutable_zpos = HashSet::new();
        for handle in planes {
            let props = device.get_properties(handle).map_err(|source| AtomicError::Access {
                errmsg: "Error reading properties",
                source,
            })?;
            let (prop_handles, _) = props.as_props_and_values();

            let mut map = HashMap::new();
            for prop in prop_handles {
                if let Ok(info) = device.get_property(*prop) {
                    let name = info.name().to_string_lossy().into_owned();
                    if name == "zpos" && info.mutable() {
                        mutable_zpos.insert(handle);
                    }
                    map.insert(name, *prop);
                }
            }
            prop_mapping.insert(handle, map);
        }

        Ok(AtomicOracle {
            device,
            crtc,
            prop_mapping,
            mutable_zpos,
        })
    }

    /// The underlying device
    pub fn device(&self) -> &D {
        &self.device
    }

    fn build_request(&self, state: &OutputState) -> Result<AtomicModeReq, AtomicError> {
        let mut req = AtomicModeReq::new();

        for plane_state in state.planes() {
            let handle = plane_handle(plane_state.plane())?;

            let Some(config) = plane_state.config.as_ref() else {
                req.add_property(
                    handle,
                    self.plane_prop_handle(handle, "CRTC_ID")?,
                    property::Value::CRTC(None),
                );
                req.add_property(
                    handle,
                    self.plane_prop_handle(handle, "FB_ID")?,
                    property::Value::Framebuffer(None),
                );
                continue;
            };

            let fb = drm::control::from_u32::<framebuffer::Handle>(config.fb.handle().0)
                .ok_or(AtomicError::InvalidHandle(config.fb.handle().0))?;

            req.add_property(
                handle,
                self.plane_prop_handle(handle, "CRTC_ID")?,
                property::Value::CRTC(Some(self.crtc)),
            );
            req.add_property(
                handle,
                self.plane_prop_handle(handle, "FB_ID")?,
                property::Value::Framebuffer(Some(fb)),
            );
            req.add_property(
                handle,
                self.plane_prop_handle(handle, "SRC_X")?,
                property::Value::UnsignedRange(to_fixed(config.src.loc.x) as u64),
            );
            req.add_property(
                handle,
                self.plane_prop_handle(handle, "SRC_Y")?,
                property::Value::UnsignedRange(to_fixed(config.src.loc.y) as u64),
            );
            req.add_property(
                handle,
                self.plane_prop_handle(handle, "SRC_W")?,
                property::Value::UnsignedRange(to_fixed(config.src.size.w) as u64),
            );
            req.add_property(
                handle,
                self.plane_prop_handle(handle, "SRC_H")?,
                property::Value::UnsignedRange(to_fixed(config.src.size.h) as u64),
            );
            req.add_property(
                handle,
                self.plane_prop_handle(handle, "CRTC_X")?,
                property::Value::SignedRange(config.dst.loc.x as i64),
            );
            req.add_property(
                handle,
                self.plane_prop_handle(handle, "CRTC_Y")?,
                property::Value::SignedRange(config.dst.loc.y as i64),
            );
            req.add_property(
                handle,
                self.plane_prop_handle(handle, "CRTC_W")?,
                property::Value::UnsignedRange(config.dst.size.w as u64),
            );
            req.add_property(
                handle,
                self.plane_prop_handle(handle, "CRTC_H")?,
                property::Value::UnsignedRange(config.dst.size.h as u64),
            );
            if self.mutable_zpos.contains(&handle) {
                req.add_property(
                    handle,
                    self.plane_prop_handle(handle, "zpos")?,
                    property::Value::UnsignedRange(config.zpos),
                );
            }
            if config.transform != Transform::Normal {
                req.add_property(
                    handle,
                    self.plane_prop_handle(handle, "rotation")?,
                    property::Value::Bitmask(DrmRotation::from(config.transform).bits() as u64),
                );
            }
            if let Some(fence) = config.fence.as_ref() {
                req.add_property(
                    handle,
                    self.plane_prop_handle(handle, "IN_FENCE_FD")?,
                    property::Value::SignedRange(fence.as_raw_fd() as i64),
                );
            }
        }

        Ok(req)
    }

    fn plane_prop_handle(
        &self,
        handle: plane::Handle,
        name: &'static str,
    ) -> Result<property::Handle, AtomicError> {
        self.prop_mapping
            .get(&handle)
            .and_then(|props| props.get(name))
            .copied()
            .ok_or_else(|| AtomicError::UnknownProperty {
                handle: handle.into(),
                name,
            })
    }
}

impl<D: ControlDevice> TestOracle for AtomicOracle<D> {
    type Error = AtomicError;

    #[instrument(level = "trace", skip_all, fields(crtc = ?self.crtc))]
    #[profiling::function]
    fn test_state(&mut self, state: &OutputState) -> Result<(), AtomicError> {
        let req = self.build_request(state)?;
        let result = self
            .device
            .atomic_commit(AtomicCommitFlags::TEST_ONLY, req)
            .map_err(|source| AtomicError::Access {
                errmsg: "Error testing state",
                source,
            });
        trace!(ok = result.is_ok(), "atomic test commit");
        result
    }
}

fn plane_handle(id: PlaneId) -> Result<plane::Handle, AtomicError> {
    drm::control::from_u32::<plane::Handle>(id.0).ok_or(AtomicError::InvalidHandle(id.0))
}

#[inline]
fn to_fixed<N: Coordinate>(n: N) -> u32 {
    f64::round(n.to_f64() * (1 << 16) as f64) as u32
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    struct DrmRotation: u8 {
        const ROTATE_0      =   0b00000001;
        const ROTATE_90     =   0b00000010;
        const ROTATE_180    =   0b00000100;
        const ROTATE_270    =   0b00001000;
        const REFLECT_X     =   0b00010000;
        const REFLECT_Y     =   0b00100000;
    }
}

impl From<Transform> for DrmRotation {
    fn from(transform: Transform) -> Self {
        match transform {
            Transform::Normal => DrmRotation::ROTATE_0,
            Transform::_90 => DrmRotation::ROTATE_90,
            Transform::_180 => DrmRotation::ROTATE_180,
            Transform::_270 => DrmRotation::ROTATE_270,
            Transform::Flipped => DrmRotation::REFLECT_Y,
            Transform::Flipped90 => DrmRotation::REFLECT_Y | DrmRotation::ROTATE_90,
            Transform::Flipped180 => DrmRotation::REFLECT_Y | DrmRotation::ROTATE_180,
            Transform::Flipped270 => DrmRotation::REFLECT_Y | DrmRotation::ROTATE_270,
        }
    }
}
