//! 2D vector math and axis-aligned rectangles

use std::ops::{Mul, Sub};

/// 2D vector. Mutating operations work on the receiver and return it for
/// chaining; copy the value first when the original must survive.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn set(&mut self, x: f32, y: f32) -> &mut Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn add(&mut self, dx: f32, dy: f32) -> &mut Self {
        self.x += dx;
        self.y += dy;
        self
    }

    pub fn scale(&mut self, k: f32) -> &mut Self {
        self.x *= k;
        self.y *= k;
        self
    }

    /// Rotates by `theta` radians (x' = x·cos − y·sin, y' = y·cos + x·sin).
    pub fn rotate(&mut self, theta: f32) -> &mut Self {
        let (sin, cos) = theta.sin_cos();
        let (x, y) = (self.x, self.y);
        self.x = x * cos - y * sin;
        self.y = y * cos + x * sin;
        self
    }

    /// Scales to unit length. The zero vector normalizes to (1, 0).
    #[cfg(test)]
    pub fn normalize(&mut self) -> &mut Self {
        let len = self.length();
        if len == 0.0 {
            self.set(1.0, 0.0)
        } else {
            self.scale(1.0 / len)
        }
    }

    #[inline]
    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

/// Axis-aligned rectangle anchored at its minimum corner.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        debug_assert!(width >= 0.0 && height >= 0.0, "negative rect extent");
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle of the given size centred on `center`.
    pub fn centered(center: Vec2, width: f32, height: f32) -> Self {
        Self::new(center.x - width / 2.0, center.y - height / 2.0, width, height)
    }

    /// Smallest rectangle containing both points. Equal points give a
    /// zero-sized rectangle.
    pub fn spanning(a: Vec2, b: Vec2) -> Self {
        let min_x = a.x.min(b.x);
        let min_y = a.y.min(b.y);
        Self::new(min_x, min_y, a.x.max(b.x) - min_x, a.y.max(b.y) - min_y)
    }

    /// Inclusive overlap test on both axes. Commutative.
    pub fn intersects(&self, other: &Rect) -> bool {
        let (a, b) = (self, other);
        (in_range(a.x, b.x, b.x + b.width) || in_range(b.x, a.x, a.x + a.width))
            && (in_range(a.y, b.y, b.y + b.height) || in_range(b.y, a.y, a.y + a.height))
    }
}

#[inline]
fn in_range(n: f32, min: f32, max: f32) -> bool {
    n >= min && n <= max
}
