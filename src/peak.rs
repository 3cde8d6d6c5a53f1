use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A coordinate on a trace, `x` in frames and `y` in signal units.
///
/// `x` is fractional when it was interpolated between frames.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// A point sitting on frame `index` of `trace`
    pub fn at(trace: &[f64], index: usize) -> Self {
        Self::new(index as f64, trace[index])
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self::new(x, y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The two boundary points of a peak
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PointPair {
    pub left: Point,
    pub right: Point,
}

impl PointPair {
    pub fn new(left: Point, right: Point) -> Self {
        Self { left, right }
    }

    /// The horizontal distance between the two points
    pub fn span(&self) -> f64 {
        self.right.x - self.left.x
    }

    /// The height of the straight line joining the two points at `x`
    pub fn height_at(&self, x: f64) -> f64 {
        let dx = self.span();
        if dx == 0.0 {
            return self.left.y.min(self.right.y);
        }
        self.left.y + (self.right.y - self.left.y) * (x - self.left.x) / dx
    }
}

/// The base of a peak: the edge heights and the angle of the line joining them
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Base {
    pub left: f64,
    pub right: f64,
    /// Angle of the base line in radians
    pub angle: f64,
}

impl Base {
    pub fn new(left: f64, right: f64, angle: f64) -> Self {
        Self { left, right, angle }
    }

    pub fn is_flat(&self) -> bool {
        self.angle == 0.0
    }
}

/// The height of a peak above its base
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Prominence {
    pub prominence: f64,
    /// The base height the prominence is measured from
    pub base: f64,
}

impl Prominence {
    pub fn new(prominence: f64, base: f64) -> Self {
        Self { prominence, base }
    }

    /// The absolute height `fraction` of the way from the base to the apex
    pub fn height_at(&self, fraction: f64) -> f64 {
        self.base + fraction * self.prominence
    }
}

/// Straight line fits to the rising and falling flanks of a peak, each
/// represented by its fitted end points. A flank too short to fit is `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SlopePoints {
    pub rising: Option<PointPair>,
    pub falling: Option<PointPair>,
}

impl SlopePoints {
    /// Where the line through `flank` reaches `height`, if it is not flat
    pub fn solve(flank: &PointPair, height: f64) -> Option<f64> {
        let dx = flank.span();
        let dy = flank.right.y - flank.left.y;
        if dx == 0.0 || dy == 0.0 || !dy.is_finite() {
            return None;
        }
        Some(flank.left.x + (height - flank.left.y) * dx / dy)
    }
}

/// The points at which a trace crosses a target height on either side of a peak
pub type CrossPoints = PointPair;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_line_height() {
        let pair = PointPair::new(Point::new(0.0, 1.0), Point::new(4.0, 3.0));
        assert_eq!(pair.span(), 4.0);
        assert_eq!(pair.height_at(2.0), 2.0);

        let flat = PointPair::new(Point::new(2.0, 1.0), Point::new(2.0, 3.0));
        assert_eq!(flat.height_at(2.0), 1.0);
    }

    #[test]
    fn test_solve_flank() {
        let flank = PointPair::new(Point::new(0.0, 0.0), Point::new(5.0, 10.0));
        assert_eq!(SlopePoints::solve(&flank, 5.0), Some(2.5));
        assert_eq!(SlopePoints::solve(&flank, -2.0), Some(-1.0));
        let flat = PointPair::new(Point::new(0.0, 1.0), Point::new(5.0, 1.0));
        assert_eq!(SlopePoints::solve(&flat, 0.5), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Point::new(1.5, 2.0).to_string(), "(1.5, 2)");
    }
}
