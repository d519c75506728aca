//! Output
//!
//! An [`Output`] describes the part of a display pipeline the planner needs to know
//! about: its current mode, the CRTC pipe index used to match compatible planes and
//! the content protection level it currently provides.
//!
//! Views report the outputs they are visible on through an [`OutputSet`].
//!
//! ```
//! use kms_planner::output::{Mode, Output, OutputId, OutputSet};
//!
//! let output = Output::new(OutputId(0), "DP-1", 0, Mode { size: (1920, 1080).into(), refresh: 60_000 });
//!
//! let mut outputs = OutputSet::empty();
//! outputs.insert(output.id());
//! assert!(outputs.is_exclusive_to(output.id()));
//! ```

use tracing::{info, instrument};

#[cfg(feature = "backend_drm")]
use drm::control::{Mode as DrmMode, ModeFlags};

use crate::utils::{Physical, Rectangle, Size};

/// An output mode
///
/// A possible combination of dimensions and refresh rate for an output.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Mode {
    /// The size of the mode, in pixels
    pub size: Size<i32, Physical>,
    /// The refresh rate in millihertz
    ///
    /// `1000` is one fps (frame per second), `2000` is 2 fps, etc...
    pub refresh: i32,
}

#[cfg(feature = "backend_drm")]
impl From<DrmMode> for Mode {
    fn from(mode: DrmMode) -> Self {
        let clock = mode.clock() as u64;
        let htotal = mode.hsync().2 as u64;
        let vtotal = mode.vsync().2 as u64;

        let mut refresh = (clock * 1_000_000 / htotal + vtotal / 2) / vtotal;

        if mode.flags().contains(ModeFlags::INTERLACE) {
            refresh *= 2;
        }

        if mode.flags().contains(ModeFlags::DBLSCAN) {
            refresh /= 2;
        }

        if mode.vscan() > 1 {
            refresh /= mode.vscan() as u64;
        }

        let (w, h) = mode.size();

        Self {
            size: (w as i32, h as i32).into(),
            refresh: refresh as i32,
        }
    }
}

/// Identifier of an output, at most 32 outputs are supported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(pub u8);

/// A set of outputs, as reported by a view for the outputs it is visible on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct OutputSet(u32);

impl OutputSet {
    /// A set containing no output
    pub const fn empty() -> Self {
        OutputSet(0)
    }

    /// A set containing only the given output
    pub fn only(output: OutputId) -> Self {
        let mut set = OutputSet::empty();
        set.insert(output);
        set
    }

    /// Adds an output to the set
    pub fn insert(&mut self, output: OutputId) {
        self.0 |= Self::bit(output);
    }

    /// Removes an output from the set
    pub fn remove(&mut self, output: OutputId) {
        self.0 &= !Self::bit(output);
    }

    /// Returns true if the output is part of the set
    pub fn contains(&self, output: OutputId) -> bool {
        self.0 & Self::bit(output) != 0
    }

    /// Returns true if the given output is the only member of the set
    pub fn is_exclusive_to(&self, output: OutputId) -> bool {
        self.0 == Self::bit(output)
    }

    fn bit(output: OutputId) -> u32 {
        1u32.checked_shl(output.0 as u32).unwrap_or(0)
    }
}

impl FromIterator<OutputId> for OutputSet {
    fn from_iter<T: IntoIterator<Item = OutputId>>(iter: T) -> Self {
        let mut set = OutputSet::empty();
        for output in iter {
            set.insert(output);
        }
        set
    }
}

/// Content protection level of an output or requested by a view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtectionLevel {
    /// No protection
    #[default]
    None,
    /// HDCP type 0
    Type0,
    /// HDCP type 1
    Type1,
}

/// An output the planner assigns planes for
#[derive(Debug, Clone)]
pub struct Output {
    id: OutputId,
    name: String,
    pipe: u32,
    mode: Mode,
    protection: ProtectionLevel,
    is_virtual: bool,
}

impl Output {
    /// Create a new output driven by the CRTC at index `pipe`
    pub fn new(id: OutputId, name: impl Into<String>, pipe: u32, mode: Mode) -> Output {
        Output {
            id,
            name: name.into(),
            pipe,
            mode,
            protection: ProtectionLevel::None,
            is_virtual: false,
        }
    }

    /// Create a virtual output, which is never driven by hardware planes
    pub fn new_virtual(id: OutputId, name: impl Into<String>, mode: Mode) -> Output {
        Output {
            is_virtual: true,
            ..Output::new(id, name, 0, mode)
        }
    }

    /// Id of the output
    pub fn id(&self) -> OutputId {
        self.id
    }

    /// Name of the output
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index of the CRTC driving this output
    pub fn pipe(&self) -> u32 {
        self.pipe
    }

    /// Current mode of the output
    pub fn current_mode(&self) -> Mode {
        self.mode
    }

    /// The content protection level currently established on the output
    pub fn current_protection(&self) -> ProtectionLevel {
        self.protection
    }

    /// Returns true for outputs without a hardware pipe
    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    /// The area of the output in its own physical coordinate space
    pub fn geometry(&self) -> Rectangle<i32, Physical> {
        Rectangle::from_size(self.mode.size)
    }

    /// Change the current mode of the output
    #[instrument(level = "trace", skip(self), fields(output = %self.name))]
    pub fn set_mode(&mut self, mode: Mode) {
        info!(?mode, "output mode changed");
        self.mode = mode;
    }

    /// Change the protection level the output currently provides
    pub fn set_protection(&mut self, protection: ProtectionLevel) {
        self.protection = protection;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_set_exclusivity() {
        let mut set = OutputSet::only(OutputId(2));
        assert!(set.contains(OutputId(2)));
        assert!(set.is_exclusive_to(OutputId(2)));
        assert!(!set.is_exclusive_to(OutputId(1)));

        set.insert(OutputId(1));
        assert!(set.contains(OutputId(1)));
        assert!(!set.is_exclusive_to(OutputId(2)));

        set.remove(OutputId(1));
        assert!(set.is_exclusive_to(OutputId(2)));
    }

    #[test]
    fn protection_levels_are_ordered() {
        assert!(ProtectionLevel::Type1 > ProtectionLevel::Type0);
        assert!(ProtectionLevel::Type0 > ProtectionLevel::None);
    }

    #[test]
    fn geometry_follows_mode() {
        let mut output = Output::new(
            OutputId(0),
            "test",
            0,
            Mode {
                size: (800, 600).into(),
                refresh: 60_000,
            },
        );
        assert_eq!(output.geometry().size, (800, 600).into());
        output.set_mode(Mode {
            size: (1920, 1080).into(),
            refresh: 60_000,
        });
        assert_eq!(output.geometry().size, (1920, 1080).into());
    }
}
