use std::{
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    ops::{Add, Sub},
};

/// Type-level marker for the physical coordinate space of an output
///
/// This is the space view geometry, plane destination rectangles and
/// occlusion regions live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Physical;

/// Type-level marker for the buffer coordinate space
///
/// Plane source rectangles are expressed in this space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Buffer;

/// Numeric type usable as a coordinate of [`Point`], [`Size`] and [`Rectangle`]
pub trait Coordinate:
    Sized + Add<Output = Self> + Sub<Output = Self> + PartialOrd + Default + Copy + fmt::Debug
{
    /// The coordinate `0`
    const ZERO: Self;
    /// Convert the coordinate to a f64
    fn to_f64(self) -> f64;
    /// Test if the coordinate is not negative
    fn non_negative(self) -> bool;
    /// Saturating addition
    fn saturating_add(self, other: Self) -> Self;
    /// Saturating subtraction
    fn saturating_sub(self, other: Self) -> Self;
}

macro_rules! coordinate_impl {
    (int: $($ty:ty),*) => {
        $(
            impl Coordinate for $ty {
                const ZERO: $ty = 0;

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline]
                #[allow(unused_comparisons)]
                fn non_negative(self) -> bool {
                    self >= 0
                }

                #[inline]
                fn saturating_add(self, other: Self) -> Self {
                    <$ty>::saturating_add(self, other)
                }

                #[inline]
                fn saturating_sub(self, other: Self) -> Self {
                    <$ty>::saturating_sub(self, other)
                }
            }
        )*
    };
}

coordinate_impl!(int: i32, u32, i64, u64);

impl Coordinate for f64 {
    const ZERO: f64 = 0.0;

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn non_negative(self) -> bool {
        self >= 0.0
    }

    #[inline]
    fn saturating_add(self, other: Self) -> Self {
        self + other
    }

    #[inline]
    fn saturating_sub(self, other: Self) -> Self {
        self - other
    }
}

#[inline]
fn smaller<N: PartialOrd>(a: N, b: N) -> N {
    if b < a {
        b
    } else {
        a
    }
}

#[inline]
fn larger<N: PartialOrd>(a: N, b: N) -> N {
    if b > a {
        b
    } else {
        a
    }
}

fn kind_name<Kind>() -> &'static str {
    let name = std::any::type_name::<Kind>();
    name.rsplit("::").next().unwrap_or(name)
}

/// A point in the coordinate space `Kind`
pub struct Point<N, Kind> {
    /// horizontal coordinate
    pub x: N,
    /// vertical coordinate
    pub y: N,
    _kind: PhantomData<Kind>,
}

impl<N: Coordinate, Kind> Point<N, Kind> {
    /// Convert the coordinates to f64
    #[inline]
    pub fn to_f64(self) -> Point<f64, Kind> {
        (self.x.to_f64(), self.y.to_f64()).into()
    }
}

impl<N: fmt::Debug, Kind> fmt::Debug for Point<N, Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point<{}>({:?}, {:?})", kind_name::<Kind>(), self.x, self.y)
    }
}

impl<N, Kind> From<(N, N)> for Point<N, Kind> {
    #[inline]
    fn from((x, y): (N, N)) -> Self {
        Point {
            x,
            y,
            _kind: PhantomData,
        }
    }
}

impl<N: Coordinate, Kind> Add for Point<N, Kind> {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        (self.x.saturating_add(other.x), self.y.saturating_add(other.y)).into()
    }
}

impl<N: Coordinate, Kind> Sub for Point<N, Kind> {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        (self.x.saturating_sub(other.x), self.y.saturating_sub(other.y)).into()
    }
}

/// Width and height in the coordinate space `Kind`
pub struct Size<N, Kind> {
    /// width
    pub w: N,
    /// height
    pub h: N,
    _kind: PhantomData<Kind>,
}

impl<N: Coordinate, Kind> Size<N, Kind> {
    /// Convert the dimensions to f64
    #[inline]
    pub fn to_f64(self) -> Size<f64, Kind> {
        (self.w.to_f64(), self.h.to_f64()).into()
    }

    /// Returns true if the width or the height is zero
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.w <= N::ZERO || self.h <= N::ZERO
    }
}

impl<N: fmt::Debug, Kind> fmt::Debug for Size<N, Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Size<{}>({:?}x{:?})", kind_name::<Kind>(), self.w, self.h)
    }
}

impl<N: Coordinate, Kind> From<(N, N)> for Size<N, Kind> {
    #[inline]
    fn from((w, h): (N, N)) -> Self {
        debug_assert!(
            w.non_negative() && h.non_negative(),
            "negative size {:?}",
            (w, h)
        );
        Size {
            w,
            h,
            _kind: PhantomData,
        }
    }
}

/// An axis aligned rectangle given by its top-left corner and its size
///
/// Edge computations saturate instead of overflowing.
pub struct Rectangle<N, Kind> {
    /// Top-left corner
    pub loc: Point<N, Kind>,
    /// Width and height
    pub size: Size<N, Kind>,
}

impl<N: Coordinate, Kind> Rectangle<N, Kind> {
    /// Create a rectangle from its top-left corner and size
    #[inline]
    pub fn new(loc: Point<N, Kind>, size: Size<N, Kind>) -> Self {
        Rectangle { loc, size }
    }

    /// Create a rectangle of the given size located at the origin
    #[inline]
    pub fn from_size(size: Size<N, Kind>) -> Self {
        Rectangle::new((N::ZERO, N::ZERO).into(), size)
    }

    /// Convert the coordinates to f64
    #[inline]
    pub fn to_f64(self) -> Rectangle<f64, Kind> {
        Rectangle::new(self.loc.to_f64(), self.size.to_f64())
    }

    /// Returns true if the rectangle covers no area
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size.is_empty()
    }

    #[inline]
    fn right(&self) -> N {
        self.loc.x.saturating_add(self.size.w)
    }

    #[inline]
    fn bottom(&self) -> N {
        self.loc.y.saturating_add(self.size.h)
    }

    /// Returns true if `rect` lies entirely inside this rectangle, edges included
    #[inline]
    pub fn contains_rect(self, rect: impl Into<Self>) -> bool {
        let rect = rect.into();
        rect.loc.x >= self.loc.x
            && rect.loc.y >= self.loc.y
            && rect.right() <= self.right()
            && rect.bottom() <= self.bottom()
    }

    /// Returns true if both rectangles share some area
    ///
    /// Rectangles that only touch along an edge do not overlap.
    #[inline]
    pub fn overlaps(self, other: impl Into<Self>) -> bool {
        let other = other.into();
        self.loc.x < other.right()
            && other.loc.x < self.right()
            && self.loc.y < other.bottom()
            && other.loc.y < self.bottom()
    }

    /// The area shared by both rectangles, `None` if they do not overlap
    #[inline]
    pub fn intersection(self, other: impl Into<Self>) -> Option<Self> {
        let other = other.into();
        if !self.overlaps(other) {
            return None;
        }

        let x = larger(self.loc.x, other.loc.x);
        let y = larger(self.loc.y, other.loc.y);
        let right = smaller(self.right(), other.right());
        let bottom = smaller(self.bottom(), other.bottom());
        Some(Rectangle::new(
            (x, y).into(),
            (right.saturating_sub(x), bottom.saturating_sub(y)).into(),
        ))
    }

    /// Remove `others` from this rectangle, returning non-overlapping pieces of what is left
    pub fn subtract_rects(self, others: impl IntoIterator<Item = Self>) -> Vec<Self> {
        Self::subtract_rects_many(vec![self], others)
    }

    /// Remove `others` from a set of rectangles
    ///
    /// Every rectangle hit by one of `others` is replaced by up to four pieces
    /// (above, left, right and below the hole).
    pub fn subtract_rects_many(mut rects: Vec<Self>, others: impl IntoIterator<Item = Self>) -> Vec<Self> {
        for hole in others {
            if rects.is_empty() {
                break;
            }
            let mut pieces = Vec::with_capacity(rects.len() + 4);
            for rect in rects.drain(..) {
                rect.split_around(hole, &mut pieces);
            }
            rects = pieces;
        }
        rects
    }

    fn split_around(self, hole: Self, out: &mut Vec<Self>) {
        let Some(cut) = self.intersection(hole) else {
            out.push(self);
            return;
        };

        let pieces = [
            Rectangle::new(self.loc, (self.size.w, cut.loc.y.saturating_sub(self.loc.y)).into()),
            Rectangle::new(
                (self.loc.x, cut.loc.y).into(),
                (cut.loc.x.saturating_sub(self.loc.x), cut.size.h).into(),
            ),
            Rectangle::new(
                (cut.right(), cut.loc.y).into(),
                (self.right().saturating_sub(cut.right()), cut.size.h).into(),
            ),
            Rectangle::new(
                (self.loc.x, cut.bottom()).into(),
                (self.size.w, self.bottom().saturating_sub(cut.bottom())).into(),
            ),
        ];
        out.extend(pieces.into_iter().filter(|piece| !piece.is_empty()));
    }
}

impl<N: fmt::Debug, Kind> fmt::Debug for Rectangle<N, Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rectangle<{}>({:?}, {:?} {:?}x{:?})",
            kind_name::<Kind>(),
            self.loc.x,
            self.loc.y,
            self.size.w,
            self.size.h
        )
    }
}

// Derives would require `Kind` to implement the traits as well.
macro_rules! kind_agnostic_impls {
    ($ty:ident { $($field:ident),* } $(, $marker:ident)?) => {
        impl<N: Clone, Kind> Clone for $ty<N, Kind> {
            #[inline]
            fn clone(&self) -> Self {
                $ty {
                    $($field: self.$field.clone(),)*
                    $($marker: PhantomData,)?
                }
            }
        }

        impl<N: Copy, Kind> Copy for $ty<N, Kind> {}

        impl<N: PartialEq, Kind> PartialEq for $ty<N, Kind> {
            #[inline]
            fn eq(&self, other: &Self) -> bool {
                true $(&& self.$field == other.$field)*
            }
        }

        impl<N: Eq, Kind> Eq for $ty<N, Kind> {}

        impl<N: Hash, Kind> Hash for $ty<N, Kind> {
            fn hash<H: Hasher>(&self, state: &mut H) {
                $(self.$field.hash(state);)*
            }
        }

        impl<N: Default, Kind> Default for $ty<N, Kind> {
            #[inline]
            fn default() -> Self {
                $ty {
                    $($field: Default::default(),)*
                    $($marker: PhantomData,)?
                }
            }
        }
    };
}

kind_agnostic_impls!(Point { x, y }, _kind);
kind_agnostic_impls!(Size { w, h }, _kind);
kind_agnostic_impls!(Rectangle { loc, size });

/// Transformation of a buffer relative to the output it is shown on
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub enum Transform {
    /// Identity
    #[default]
    Normal,
    /// Rotated by 90 degrees
    _90,
    /// Rotated by 180 degrees
    _180,
    /// Rotated by 270 degrees
    _270,
    /// Flipped vertically
    Flipped,
    /// Flipped vertically and rotated by 90 degrees
    Flipped90,
    /// Flipped vertically and rotated by 180 degrees
    Flipped180,
    /// Flipped vertically and rotated by 270 degrees
    Flipped270,
}

impl Transform {
    /// The transformation undoing this one
    ///
    /// Flipped transformations are reflections and undo themselves.
    #[inline]
    pub fn invert(&self) -> Transform {
        match self {
            Transform::_90 => Transform::_270,
            Transform::_270 => Transform::_90,
            other => *other,
        }
    }

    /// Returns true if width and height trade places under this transformation
    #[inline]
    pub fn swaps_axes(&self) -> bool {
        matches!(
            self,
            Transform::_90 | Transform::_270 | Transform::Flipped90 | Transform::Flipped270
        )
    }

    /// The size of `size` after applying this transformation
    pub fn transform_size<N: Coordinate, Kind>(&self, size: Size<N, Kind>) -> Size<N, Kind> {
        if self.swaps_axes() {
            (size.h, size.w).into()
        } else {
            size
        }
    }

    /// Map `rect`, lying inside an area of size `area`, through this transformation
    pub fn transform_rect_in<N: Coordinate, Kind>(
        &self,
        rect: Rectangle<N, Kind>,
        area: &Size<N, Kind>,
    ) -> Rectangle<N, Kind> {
        let far_x = area.w.saturating_sub(rect.right());
        let far_y = area.h.saturating_sub(rect.bottom());
        let near_x = rect.loc.x;
        let near_y = rect.loc.y;

        let loc = match self {
            Transform::Normal => (near_x, near_y),
            Transform::_90 => (far_y, near_x),
            Transform::_180 => (far_x, far_y),
            Transform::_270 => (near_y, far_x),
            Transform::Flipped => (far_x, near_y),
            Transform::Flipped90 => (far_y, far_x),
            Transform::Flipped180 => (near_x, far_y),
            Transform::Flipped270 => (near_y, near_x),
        };

        Rectangle::new(loc.into(), self.transform_size(rect.size))
    }
}

#[cfg(test)]
mod tests {
    use super::{Buffer, Physical, Rectangle, Size, Transform};

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Rectangle<i32, Physical> {
        Rectangle::new((x, y).into(), (w, h).into())
    }

    #[test]
    fn rotated_rect_moves_to_the_far_edge() {
        let area = Size::from((70, 90));
        assert_eq!(
            Transform::_90.transform_rect_in(rect(10, 20, 30, 40), &area),
            rect(30, 10, 40, 30)
        );
        assert_eq!(
            Transform::Flipped270.transform_rect_in(rect(10, 20, 30, 40), &area),
            rect(20, 10, 40, 30)
        );
    }

    #[test]
    fn inverse_transform_restores_rect() {
        let area = Size::from((70, 90));
        let before = rect(10, 20, 30, 40);

        for transform in [
            Transform::_90,
            Transform::_180,
            Transform::_270,
            Transform::Flipped,
            Transform::Flipped90,
            Transform::Flipped180,
            Transform::Flipped270,
        ] {
            let moved = transform.transform_rect_in(before, &area);
            let back = transform
                .invert()
                .transform_rect_in(moved, &transform.transform_size(area));
            assert_eq!(back, before, "{:?}", transform);
        }
    }

    #[test]
    fn touching_rects_do_not_intersect() {
        assert_eq!(rect(0, 0, 10, 10).intersection(rect(10, 0, 10, 10)), None);
        assert_eq!(
            rect(0, 0, 10, 10).intersection(rect(5, 5, 10, 10)),
            Some(rect(5, 5, 5, 5))
        );
    }

    #[test]
    fn punching_a_hole_leaves_four_pieces() {
        let hole = rect(10, 10, 10, 10);
        let rest = rect(0, 0, 30, 30).subtract_rects([hole]);

        assert_eq!(rest.len(), 4);
        let area: i32 = rest.iter().map(|r| r.size.w * r.size.h).sum();
        assert_eq!(area, 30 * 30 - 10 * 10);
        assert!(rest.iter().all(|r| !r.overlaps(hole)));
    }

    #[test]
    fn covered_rect_disappears() {
        assert!(rect(5, 5, 10, 10).subtract_rects([rect(0, 0, 100, 100)]).is_empty());
        assert_eq!(rect(5, 5, 10, 10).subtract_rects([rect(50, 50, 1, 1)]), vec![rect(5, 5, 10, 10)]);
    }

    #[test]
    fn rects_stay_copy_for_plain_kinds() {
        // a coordinate space marker without any derives
        struct Surface;

        let area = Rectangle::<i32, Surface>::from_size((30, 30).into());
        let hole = Rectangle::<i32, Surface>::new((10, 10).into(), (10, 10).into());
        let copy = area;

        assert!(area == copy);
        assert_eq!(area.intersection(hole).map(|r| r.size.w), Some(10));
        assert_eq!(area.subtract_rects([hole]).len(), 4);
        assert!(Rectangle::<i32, Surface>::default().is_empty());
    }

    #[test]
    fn buffer_rects_convert_to_f64() {
        let src = Rectangle::<i32, Buffer>::new((1, 2).into(), (3, 4).into()).to_f64();
        assert_eq!(src.loc.x, 1.0);
        assert_eq!(src.size.h, 4.0);
        assert!(!src.is_empty());
    }
}
