use serde::{
    Deserialize,
    Serialize
};

pub type Vector2F = Vector2X<f32>;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Vector2X<T> {
    pub x: T,
    pub y: T,
}

pub type Rect2F = Rect2X<f32>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rect2X<T> {
    pub pos: Vector2X<T>,
    pub size: Vector2X<T>,
}

/// Linear RGBA color, each channel in `0.0..=1.0`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl<T: std::fmt::Display> std::fmt::Display for Vector2X<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{}]", self.x, self.y)
    }
}

impl<T> Vector2X<T>
where
    T: Default
{
    pub fn new(x: T, y: T) -> Self {
        Self { x, y }
    }

    pub fn zero() -> Self {
        Self { x: T::default(), y: T::default() }
    }
}

impl Vector2X<f32> {
    pub const ONE: Self = Self { x: 1.0, y: 1.0 };

    /// Component-wise product, used to stretch unit corner offsets to a quad size.
    pub fn scaled_by(&self, rhs: Self) -> Self {
        Self {
            x: self.x * rhs.x,
            y: self.y * rhs.y
        }
    }

    pub fn to_array(self) -> [f32; 2] {
        [self.x, self.y]
    }
}

impl<T> std::ops::Add for Vector2X<T>
where
    T: std::ops::Add<Output = T>
{
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y
        }

    }
}

impl<T> std::ops::AddAssign for Vector2X<T>
where
    T: std::ops::AddAssign
{
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl<T> Rect2X<T> {
    pub fn new(x: T, y: T, w: T, h: T) -> Self {
        Self { pos: Vector2X { x, y }, size: Vector2X { x: w, y: h } }
    }
}

impl Rect2X<f32> {
    /// Corners in quad order: top-right, bottom-right, bottom-left, top-left.
    pub fn corners(&self) -> [Vector2F; 4] {
        let left = self.pos.x;
        let bottom = self.pos.y;
        let right = self.pos.x + self.size.x;
        let top = self.pos.y + self.size.y;
        [
            Vector2F::new(right, top),
            Vector2F::new(right, bottom),
            Vector2F::new(left, bottom),
            Vector2F::new(left, top),
        ]
    }
}

impl Color {
    pub const WHITE: Self = Self { r: 1.0, g: 1.0, b: 1.0, a: 1.0 };
    pub const BLACK: Self = Self { r: 0.0, g: 0.0, b: 0.0, a: 1.0 };

    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_rgb8(rgb: [u8; 3]) -> Self {
        Self {
            r: rgb[0] as f32 / 255.0,
            g: rgb[1] as f32 / 255.0,
            b: rgb[2] as f32 / 255.0,
            a: 1.0
        }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

#[test]
fn test_vector_creation() {
    let v1 = Vector2X::<f32>::new(1.0, 2.0);
    assert_eq!(v1.x, 1.0);
    assert_eq!(v1.y, 2.0);
}

#[test]
fn test_vector_add_assign() {
    let v1 = Vector2X::<u32>::new(1, 2);
    let mut v2 = Vector2X::<u32>::new(10, 20);
    v2 += v1;
    assert_eq!(v2.x, 11);
    assert_eq!(v2.y, 22);
}

#[test]
fn test_vector_scaled_by() {
    let v1 = Vector2F::new(1.0, 0.0);
    let scale = Vector2F::new(32.0, 16.0);
    assert_eq!(v1.scaled_by(scale), Vector2F::new(32.0, 0.0));
}

#[test]
fn test_rect_corners_order() {
    let rect = Rect2F::new(1.0, 2.0, 3.0, 4.0);
    let corners = rect.corners();
    assert_eq!(corners[0], Vector2F::new(4.0, 6.0));
    assert_eq!(corners[1], Vector2F::new(4.0, 2.0));
    assert_eq!(corners[2], Vector2F::new(1.0, 2.0));
    assert_eq!(corners[3], Vector2F::new(1.0, 6.0));
}

#[test]
fn test_color_from_rgb8() {
    let color = Color::from_rgb8([255, 0, 51]);
    assert_eq!(color.to_array(), [1.0, 0.0, 0.2, 1.0]);
}
