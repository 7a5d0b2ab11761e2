use super::math::Vector2F;

/// Placement of an entity. `position` is the bottom-left corner of the quad
/// and `scale` is its full size in world units.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform {
    pub position: Vector2F,
    pub scale: Vector2F,
}

impl Transform {
    pub fn new(position: Vector2F, scale: Vector2F) -> Self {
        Self { position, scale }
    }

    /// World position of a quad corner given its unit offset, e.g. `(1, 1)` for top-right.
    pub fn corner(&self, offset: Vector2F) -> Vector2F {
        self.position + offset.scaled_by(self.scale)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vector2F::zero(),
            scale: Vector2F::ONE
        }
    }
}

#[test]
fn test_transform_corner_uses_scale_as_size() {
    let transform = Transform::new(Vector2F::new(100.0, 50.0), Vector2F::new(32.0, 16.0));
    assert_eq!(transform.corner(Vector2F::new(1.0, 1.0)), Vector2F::new(132.0, 66.0));
    assert_eq!(transform.corner(Vector2F::new(0.0, 0.0)), Vector2F::new(100.0, 50.0));
}
