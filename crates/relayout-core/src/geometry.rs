//! Geometric primitives used by measure and arrange: Point, Size, Rect.

/// Relative tolerance used when comparing layout values.
///
/// Two values are close when their difference is within `f32::EPSILON`
/// scaled by their combined magnitude (plus a floor of 10 so values near zero
/// still get an absolute tolerance).
pub fn are_close(a: f32, b: f32) -> bool {
    if a == b {
        return true;
    }
    let eps = (a.abs() + b.abs() + 10.0) * f32::EPSILON;
    let delta = a - b;
    -eps < delta && eps > delta
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub const ZERO: Size = Size {
        width: 0.0,
        height: 0.0,
    };

    /// Unbounded constraint: "size to content" on both axes.
    pub const INFINITE: Size = Size {
        width: f32::INFINITY,
        height: f32::INFINITY,
    };

    pub fn is_close(&self, other: Size) -> bool {
        are_close(self.width, other.width) && are_close(self.height, other.height)
    }

    pub fn has_nan(&self) -> bool {
        self.width.is_nan() || self.height.is_nan()
    }

    pub fn has_infinity(&self) -> bool {
        self.width.is_infinite() || self.height.is_infinite()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_origin_size(origin: Point, size: Size) -> Self {
        Self {
            x: origin.x,
            y: origin.y,
            width: size.width,
            height: size.height,
        }
    }

    pub fn from_size(size: Size) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: size.width,
            height: size.height,
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            width: self.width,
            height: self.height,
        }
    }

    pub fn is_close(&self, other: Rect) -> bool {
        are_close(self.x, other.x)
            && are_close(self.y, other.y)
            && are_close(self.width, other.width)
            && are_close(self.height, other.height)
    }

    /// A final rect must have a finite, non-NaN extent.
    pub fn is_arrangeable(&self) -> bool {
        !(self.width.is_nan()
            || self.height.is_nan()
            || self.x.is_nan()
            || self.y.is_nan()
            || self.width.is_infinite()
            || self.height.is_infinite())
    }
}
