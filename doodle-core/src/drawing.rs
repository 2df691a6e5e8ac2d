//! Drawings - strokes, points, ink, and the geometry derived from them.

use serde::{Deserialize, Serialize};

/// A single sampled point along a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    /// X position in canvas coordinates.
    pub x: f32,
    /// Y position in canvas coordinates.
    pub y: f32,
    /// Stylus pressure (0.0 to 1.0, 1.0 for finger input).
    #[serde(default = "default_pressure")]
    pub pressure: f32,
    /// Stylus azimuth in radians.
    #[serde(default)]
    pub azimuth: f32,
    /// Stylus altitude in radians (pi/2 is perpendicular to the surface).
    #[serde(default = "default_altitude")]
    pub altitude: f32,
}

fn default_pressure() -> f32 {
    1.0
}

fn default_altitude() -> f32 {
    std::f32::consts::FRAC_PI_2
}

impl StrokePoint {
    /// Create a point with neutral stylus attributes.
    #[must_use]
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            pressure: default_pressure(),
            azimuth: 0.0,
            altitude: default_altitude(),
        }
    }

    /// Set the pressure.
    #[must_use]
    pub fn with_pressure(mut self, pressure: f32) -> Self {
        self.pressure = pressure;
        self
    }
}

/// 2-D affine transform in `[a b c d tx ty]` form.
///
/// A point maps to `(a*x + c*y + tx, b*x + d*y + ty)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    /// Scale / rotation component.
    pub a: f32,
    /// Shear / rotation component.
    pub b: f32,
    /// Shear / rotation component.
    pub c: f32,
    /// Scale / rotation component.
    pub d: f32,
    /// X translation.
    pub tx: f32,
    /// Y translation.
    pub ty: f32,
}

impl AffineTransform {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    /// A pure translation.
    #[must_use]
    pub const fn translation(tx: f32, ty: f32) -> Self {
        Self {
            tx,
            ty,
            ..Self::IDENTITY
        }
    }

    /// A pure scale about the origin.
    #[must_use]
    pub const fn scale(sx: f32, sy: f32) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    /// Apply the transform to a point.
    #[must_use]
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a.mul_add(x, self.c.mul_add(y, self.tx)),
            self.b.mul_add(x, self.d.mul_add(y, self.ty)),
        )
    }

    /// Check whether this is the identity transform.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// The drawing tool that produced a stroke.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InkKind {
    /// Pressure-sensitive pen.
    #[default]
    Pen,
    /// Textured pencil.
    Pencil,
    /// Wide translucent marker.
    Marker,
    /// Constant-width line.
    Monoline,
}

/// Ink used for a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InkStyle {
    /// Tool kind.
    pub kind: InkKind,
    /// RGBA color.
    pub color: [u8; 4],
    /// Nominal line width in canvas points.
    pub width: f32,
}

impl Default for InkStyle {
    fn default() -> Self {
        Self {
            kind: InkKind::Pen,
            color: [0, 0, 0, 255],
            width: 5.0,
        }
    }
}

/// Axis-aligned rectangle in canvas coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub width: f32,
    /// Height.
    pub height: f32,
}

impl Bounds {
    /// Create a rectangle.
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest rectangle containing every point, or `None` for no points.
    #[must_use]
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f32, f32)>,
    {
        let mut iter = points.into_iter();
        let (x0, y0) = iter.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (x0, y0, x0, y0);
        for (x, y) in iter {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    /// Smallest rectangle containing both rectangles.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let min_x = self.x.min(other.x);
        let min_y = self.y.min(other.y);
        let max_x = self.max_x().max(other.max_x());
        let max_y = self.max_y().max(other.max_y());
        Self::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Grow every edge outward by `amount`.
    #[must_use]
    pub fn expanded(&self, amount: f32) -> Self {
        Self::new(
            self.x - amount,
            self.y - amount,
            amount.mul_add(2.0, self.width),
            amount.mul_add(2.0, self.height),
        )
    }

    /// Right edge.
    #[must_use]
    pub fn max_x(&self) -> f32 {
        self.x + self.width
    }

    /// Bottom edge.
    #[must_use]
    pub fn max_y(&self) -> f32 {
        self.y + self.height
    }

    /// Center point.
    #[must_use]
    pub fn center(&self) -> (f32, f32) {
        (self.width.mul_add(0.5, self.x), self.height.mul_add(0.5, self.y))
    }

    /// Length of the longer side.
    #[must_use]
    pub fn max_side(&self) -> f32 {
        self.width.max(self.height)
    }

    /// Area of the rectangle.
    #[must_use]
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Check if a point lies within the rectangle (edges inclusive).
    #[must_use]
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.max_x() && y >= self.y && y <= self.max_y()
    }
}

/// Canvas dimensions at capture time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasSize {
    /// Width in points.
    pub width: f32,
    /// Height in points.
    pub height: f32,
}

impl CanvasSize {
    /// Create a canvas size.
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Both dimensions are strictly positive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// One continuous pen-down to pen-up gesture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    /// Sampled points in drawing order.
    pub points: Vec<StrokePoint>,
    /// Ink used for the stroke.
    #[serde(default)]
    pub ink: InkStyle,
    /// Transform applied to every point when replayed.
    #[serde(default)]
    pub transform: AffineTransform,
}

impl Stroke {
    /// Create a stroke with default ink and identity transform.
    #[must_use]
    pub fn new(points: Vec<StrokePoint>) -> Self {
        Self {
            points,
            ink: InkStyle::default(),
            transform: AffineTransform::IDENTITY,
        }
    }

    /// Create a stroke from bare coordinates.
    #[must_use]
    pub fn from_xy(coords: &[(f32, f32)]) -> Self {
        Self::new(coords.iter().map(|&(x, y)| StrokePoint::new(x, y)).collect())
    }

    /// Set the ink.
    #[must_use]
    pub fn with_ink(mut self, ink: InkStyle) -> Self {
        self.ink = ink;
        self
    }

    /// Set the transform.
    #[must_use]
    pub fn with_transform(mut self, transform: AffineTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Points with the stroke transform applied.
    pub fn transformed_points(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.points.iter().map(|p| self.transform.apply(p.x, p.y))
    }

    /// Bounds of the transformed points, not including ink width.
    #[must_use]
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(self.transformed_points())
    }

    /// Mean pressure over all points (1.0 for an empty stroke).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_pressure(&self) -> f32 {
        if self.points.is_empty() {
            return 1.0;
        }
        self.points.iter().map(|p| p.pressure).sum::<f32>() / self.points.len() as f32
    }
}

/// An ordered collection of strokes.
///
/// Drawings are value snapshots: the live canvas owns its mutable drawing and
/// hands clones to the core at decision points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Drawing {
    /// Strokes in drawing order.
    pub strokes: Vec<Stroke>,
}

impl Drawing {
    /// Create an empty drawing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a drawing from strokes.
    #[must_use]
    pub fn from_strokes(strokes: Vec<Stroke>) -> Self {
        Self { strokes }
    }

    /// Append a stroke.
    pub fn push(&mut self, stroke: Stroke) {
        self.strokes.push(stroke);
    }

    /// Number of strokes.
    #[must_use]
    pub fn stroke_count(&self) -> usize {
        self.strokes.len()
    }

    /// Total number of points across all strokes.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.strokes.iter().map(|s| s.points.len()).sum()
    }

    /// True when the drawing has no strokes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    /// Union of every stroke's bounds, or `None` if no stroke has points.
    #[must_use]
    pub fn bounds(&self) -> Option<Bounds> {
        self.strokes
            .iter()
            .filter_map(Stroke::bounds)
            .reduce(|acc, b| acc.union(&b))
    }

    /// Largest ink width used by any stroke.
    #[must_use]
    pub fn max_ink_width(&self) -> f32 {
        self.strokes
            .iter()
            .map(|s| s.ink.width)
            .fold(0.0, f32::max)
    }

    /// A new drawing holding the first `count` strokes.
    #[must_use]
    pub fn prefix(&self, count: usize) -> Self {
        let end = count.min(self.strokes.len());
        Self::from_strokes(self.strokes[..end].to_vec())
    }

    /// Remove and discard the first `count` strokes, keeping the rest in order.
    pub fn remove_prefix(&mut self, count: usize) {
        let end = count.min(self.strokes.len());
        self.strokes.drain(..end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affine_apply() {
        let t = AffineTransform::translation(10.0, -5.0);
        assert_eq!(t.apply(1.0, 2.0), (11.0, -3.0));

        let s = AffineTransform::scale(2.0, 3.0);
        assert_eq!(s.apply(1.0, 2.0), (2.0, 6.0));
        assert!(AffineTransform::default().is_identity());
    }

    #[test]
    fn test_stroke_bounds_uses_transform() {
        let stroke = Stroke::from_xy(&[(0.0, 0.0), (10.0, 20.0)])
            .with_transform(AffineTransform::translation(5.0, 5.0));
        let b = stroke.bounds().expect("bounds");
        assert_eq!(b, Bounds::new(5.0, 5.0, 10.0, 20.0));
    }

    #[test]
    fn test_drawing_bounds_union() {
        let drawing = Drawing::from_strokes(vec![
            Stroke::from_xy(&[(0.0, 0.0), (10.0, 10.0)]),
            Stroke::from_xy(&[(50.0, 40.0), (60.0, 45.0)]),
        ]);
        let b = drawing.bounds().expect("bounds");
        assert_eq!(b, Bounds::new(0.0, 0.0, 60.0, 45.0));
        assert_eq!(drawing.point_count(), 4);
    }

    #[test]
    fn test_empty_drawing_has_no_bounds() {
        assert!(Drawing::new().bounds().is_none());
        let only_empty = Drawing::from_strokes(vec![Stroke::new(Vec::new())]);
        assert!(only_empty.bounds().is_none());
    }

    #[test]
    fn test_prefix_and_remove_prefix() {
        let mut drawing = Drawing::from_strokes(vec![
            Stroke::from_xy(&[(0.0, 0.0)]),
            Stroke::from_xy(&[(1.0, 1.0)]),
            Stroke::from_xy(&[(2.0, 2.0)]),
        ]);
        assert_eq!(drawing.prefix(2).stroke_count(), 2);
        assert_eq!(drawing.prefix(10).stroke_count(), 3);

        drawing.remove_prefix(2);
        assert_eq!(drawing.stroke_count(), 1);
        assert!((drawing.strokes[0].points[0].x - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_bounds_helpers() {
        let b = Bounds::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(b.center(), (25.0, 40.0));
        assert!((b.max_side() - 40.0).abs() < f32::EPSILON);
        assert!(b.contains_point(10.0, 60.0));
        assert!(!b.contains_point(41.0, 30.0));
        assert_eq!(b.expanded(5.0), Bounds::new(5.0, 15.0, 40.0, 50.0));
    }

    #[test]
    fn test_point_defaults_when_deserializing() {
        let json = r#"{"points":[{"x":1.0,"y":2.0}]}"#;
        let stroke: Stroke = serde_json::from_str(json).expect("parse");
        assert!((stroke.points[0].pressure - 1.0).abs() < f32::EPSILON);
        assert!(stroke.transform.is_identity());
        assert_eq!(stroke.ink.kind, InkKind::Pen);
    }
}
