use super::{Physical, Rectangle};

/// A set of pixels in output space, stored as non-overlapping rectangles
///
/// Used to accumulate the areas covered by the renderer, by planes and by
/// opaque content while views are visited front to back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    rects: Vec<Rectangle<i32, Physical>>,
}

impl Region {
    /// An empty region
    pub fn new() -> Self {
        Region::default()
    }

    /// Returns the rectangles making up this region
    pub fn rects(&self) -> &[Rectangle<i32, Physical>] {
        &self.rects
    }

    /// Returns true if the region contains no pixels
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Number of pixels covered by this region
    pub fn area(&self) -> i64 {
        self.rects
            .iter()
            .map(|rect| rect.size.w as i64 * rect.size.h as i64)
            .sum()
    }

    /// Adds a rectangle to the region
    pub fn union_rect(&mut self, rect: Rectangle<i32, Physical>) {
        if rect.is_empty() {
            return;
        }
        let missing = rect.subtract_rects(self.rects.iter().copied());
        self.rects.extend(missing);
    }

    /// Adds all rectangles of another region to this one
    pub fn union(&mut self, other: &Region) {
        for rect in other.rects.iter().copied() {
            self.union_rect(rect);
        }
    }

    /// Removes a set of rectangles from the region
    pub fn subtract_rects(&mut self, others: impl IntoIterator<Item = Rectangle<i32, Physical>>) {
        let rects = std::mem::take(&mut self.rects);
        self.rects = Rectangle::subtract_rects_many(rects, others);
    }

    /// Returns the part of `rect` that is not covered by this region
    pub fn uncovered(&self, rect: Rectangle<i32, Physical>) -> Region {
        Region {
            rects: rect.subtract_rects(self.rects.iter().copied()),
        }
    }

    /// Returns true if `rect` is entirely covered by this region
    pub fn contains_rect(&self, rect: Rectangle<i32, Physical>) -> bool {
        self.uncovered(rect).is_empty()
    }

    /// Returns true if any pixel of `rect` is part of this region
    pub fn overlaps(&self, rect: Rectangle<i32, Physical>) -> bool {
        self.rects.iter().any(|r| r.overlaps(rect))
    }

    /// Restricts the region to the inside of `clip`
    pub fn intersect_rect(&mut self, clip: Rectangle<i32, Physical>) {
        self.rects = self.rects.iter().filter_map(|r| r.intersection(clip)).collect();
    }

    /// Moves every rectangle of the region by the given offset
    pub fn translate(&mut self, x: i32, y: i32) {
        for rect in self.rects.iter_mut() {
            rect.loc.x = rect.loc.x.saturating_add(x);
            rect.loc.y = rect.loc.y.saturating_add(y);
        }
    }
}

impl From<Rectangle<i32, Physical>> for Region {
    fn from(rect: Rectangle<i32, Physical>) -> Self {
        let mut region = Region::new();
        region.union_rect(rect);
        region
    }
}

impl FromIterator<Rectangle<i32, Physical>> for Region {
    fn from_iter<T: IntoIterator<Item = Rectangle<i32, Physical>>>(iter: T) -> Self {
        let mut region = Region::new();
        for rect in iter {
            region.union_rect(rect);
        }
        region
    }
}
