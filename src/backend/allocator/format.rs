//! Format info tables and plane format sets.
//!
//! [`has_alpha`] returns true if the format has an alpha channel.
//!
//! ```
//! # use kms_planner::backend::allocator::Fourcc;
//! # use kms_planner::backend::allocator::format::has_alpha;
//! assert!(has_alpha(Fourcc::Argb8888));
//! assert!(!has_alpha(Fourcc::Xrgb8888));
//! ```
//!
//! [`get_bpp`] returns the number of bits per pixel of a format.
//!
//! ```
//! # use kms_planner::backend::allocator::Fourcc;
//! # use kms_planner::backend::allocator::format::get_bpp;
//! assert_eq!(get_bpp(Fourcc::Argb8888), Some(32));
//! ```
//!
//! A [`FormatSet`] describes the format/modifier pairs a plane can scan out.

use std::sync::Arc;

use indexmap::IndexSet;

use super::{Format, Fourcc, Modifier};

macro_rules! format_tables {
    (
        $($fourcc: ident {
            $(opaque: $opaque: ident,)?
            alpha: $alpha: expr,
            bpp: $bpp: expr $(,)?
        }),*
    ) => {
        /// Returns the opaque alternative of the specified format.
        ///
        /// Unknown formats will always return [`None`].
        pub const fn get_opaque(fourcc: Fourcc) -> Option<Fourcc> {
            match fourcc {
                $($(
                    Fourcc::$fourcc => Some(Fourcc::$opaque),
                )?)*
                _ => None,
            }
        }

        /// Returns true if the format has an alpha channel.
        ///
        /// Unknown formats will always return `false`.
        pub const fn has_alpha(fourcc: Fourcc) -> bool {
            match fourcc {
                $(
                    Fourcc::$fourcc => $alpha,
                )*
                _ => false,
            }
        }

        /// Returns the bits per pixel of the specified format.
        ///
        /// Unknown formats will always return [`None`].
        pub const fn get_bpp(fourcc: Fourcc) -> Option<usize> {
            match fourcc {
                $(Fourcc::$fourcc => Some($bpp),)*
                _ => None,
            }
        }
    };
}

format_tables! {
    Rgb565 { alpha: false, bpp: 16 },
    Bgr565 { alpha: false, bpp: 16 },

    Argb1555 { opaque: Xrgb1555, alpha: true, bpp: 16 },
    Xrgb1555 { alpha: false, bpp: 16 },

    Argb8888 { opaque: Xrgb8888, alpha: true, bpp: 32 },
    Xrgb8888 { alpha: false, bpp: 32 },
    Abgr8888 { opaque: Xbgr8888, alpha: true, bpp: 32 },
    Xbgr8888 { alpha: false, bpp: 32 },
    Rgba8888 { opaque: Rgbx8888, alpha: true, bpp: 32 },
    Rgbx8888 { alpha: false, bpp: 32 },
    Bgra8888 { opaque: Bgrx8888, alpha: true, bpp: 32 },
    Bgrx8888 { alpha: false, bpp: 32 },

    Argb2101010 { opaque: Xrgb2101010, alpha: true, bpp: 32 },
    Xrgb2101010 { alpha: false, bpp: 32 },
    Abgr2101010 { opaque: Xbgr2101010, alpha: true, bpp: 32 },
    Xbgr2101010 { alpha: false, bpp: 32 },

    Abgr16161616f { opaque: Xbgr16161616f, alpha: true, bpp: 64 },
    Xbgr16161616f { alpha: false, bpp: 64 }
}

/// An immutable set of format/modifier pairs supported by a plane
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatSet {
    formats: Arc<IndexSet<Format>>,
}

impl FormatSet {
    /// Return an iterator over the values of the set, in their order
    pub fn iter(&self) -> impl Iterator<Item = &Format> {
        self.formats.iter()
    }

    /// Return `true` if an equivalent to `value` exists in the set.
    pub fn contains(&self, format: &Format) -> bool {
        self.formats.contains(format)
    }

    /// Returns true if a buffer of the given fourcc and modifier can be used
    ///
    /// A buffer with [`Modifier::Invalid`] carries no explicit layout and is
    /// accepted as long as its fourcc is supported with any modifier.
    pub fn supports(&self, code: Fourcc, modifier: Modifier) -> bool {
        if modifier == Modifier::Invalid {
            self.formats.iter().any(|format| format.code == code)
        } else {
            self.formats.contains(&Format { code, modifier })
        }
    }

    /// Returns true if the set contains no formats
    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    /// Number of format/modifier pairs in the set
    pub fn len(&self) -> usize {
        self.formats.len()
    }
}

impl FromIterator<Format> for FormatSet {
    #[inline]
    fn from_iter<T: IntoIterator<Item = Format>>(iter: T) -> Self {
        Self {
            formats: Arc::new(IndexSet::from_iter(iter)),
        }
    }
}

impl<'a> IntoIterator for &'a FormatSet {
    type Item = &'a Format;
    type IntoIter = indexmap::set::Iter<'a, Format>;

    fn into_iter(self) -> Self::IntoIter {
        self.formats.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane_formats() -> FormatSet {
        [
            Format {
                code: Fourcc::Xrgb8888,
                modifier: Modifier::Linear,
            },
            Format {
                code: Fourcc::Argb8888,
                modifier: Modifier::I915_x_tiled,
            },
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn explicit_modifier_must_match() {
        let formats = plane_formats();
        assert!(formats.supports(Fourcc::Xrgb8888, Modifier::Linear));
        assert!(!formats.supports(Fourcc::Xrgb8888, Modifier::I915_x_tiled));
        assert!(!formats.supports(Fourcc::Nv12, Modifier::Linear));
    }

    #[test]
    fn invalid_modifier_matches_any_layout() {
        let formats = plane_formats();
        assert!(formats.supports(Fourcc::Argb8888, Modifier::Invalid));
        assert!(!formats.supports(Fourcc::Abgr8888, Modifier::Invalid));
    }

    #[test]
    fn tables() {
        assert_eq!(get_opaque(Fourcc::Argb8888), Some(Fourcc::Xrgb8888));
        assert_eq!(get_opaque(Fourcc::Xrgb8888), None);
        assert!(has_alpha(Fourcc::Abgr2101010));
        assert_eq!(get_bpp(Fourcc::Rgb565), Some(16));
        assert_eq!(get_bpp(Fourcc::Nv12), None);
    }
}
