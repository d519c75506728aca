//! Various utilities functions and types

mod geometry;
pub(crate) mod ids;
mod region;

pub use self::geometry::{Buffer, Coordinate, Physical, Point, Rectangle, Size, Transform};
pub use self::region::Region;
