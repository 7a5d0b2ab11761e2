use glam::{Mat4, Vec3};

use super::math::Vector2F;

const NEAR_PLANE: f32 = 0.0;
const FAR_PLANE: f32 = 100.0;
const EYE_DISTANCE: f32 = 20.0;

/// Orthographic 2D camera over a fixed logical viewport.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vector2F,
    viewport: Vector2F,
    projection: Mat4,
}

impl Camera {
    pub fn new(position: Vector2F, viewport: Vector2F) -> Self {
        let mut camera = Self {
            position,
            viewport,
            projection: Mat4::IDENTITY
        };
        camera.adjust_projection();
        camera
    }

    /// Recomputes the projection, maps `[0, viewport]` onto the whole screen.
    pub fn adjust_projection(&mut self) {
        self.projection = Mat4::orthographic_rh(
            0.0,
            self.viewport.x,
            0.0,
            self.viewport.y,
            NEAR_PLANE,
            FAR_PLANE
        );
    }

    pub fn set_viewport(&mut self, viewport: Vector2F) {
        self.viewport = viewport;
        self.adjust_projection();
    }

    pub fn viewport(&self) -> Vector2F {
        self.viewport
    }

    pub fn projection_matrix(&self) -> &Mat4 {
        &self.projection
    }

    /// Looks down `-Z` from above `position`, `+Y` up.
    pub fn view_matrix(&self) -> Mat4 {
        let eye = Vec3::new(self.position.x, self.position.y, EYE_DISTANCE);
        let center = Vec3::new(self.position.x, self.position.y, -1.0);
        Mat4::look_at_rh(eye, center, Vec3::Y)
    }
}

#[test]
fn test_projection_maps_viewport_to_ndc() {
    let camera = Camera::new(Vector2F::zero(), Vector2F::new(1280.0, 720.0));
    let projection = camera.projection_matrix();

    let bottom_left = projection.project_point3(Vec3::new(0.0, 0.0, -20.0));
    let top_right = projection.project_point3(Vec3::new(1280.0, 720.0, -20.0));
    assert!((bottom_left.x + 1.0).abs() < 1e-5 && (bottom_left.y + 1.0).abs() < 1e-5);
    assert!((top_right.x - 1.0).abs() < 1e-5 && (top_right.y - 1.0).abs() < 1e-5);
}

#[test]
fn test_view_translates_by_camera_position() {
    let camera = Camera::new(Vector2F::new(100.0, 40.0), Vector2F::new(1280.0, 720.0));
    let in_view = camera.view_matrix().transform_point3(Vec3::new(100.0, 40.0, 0.0));
    assert!(in_view.x.abs() < 1e-5);
    assert!(in_view.y.abs() < 1e-5);
    assert!((in_view.z + EYE_DISTANCE).abs() < 1e-5);
}

#[test]
fn test_sprite_at_origin_is_inside_depth_range() {
    let camera = Camera::new(Vector2F::zero(), Vector2F::new(1280.0, 720.0));
    let clip = *camera.projection_matrix() * camera.view_matrix() * glam::Vec4::new(10.0, 10.0, 0.0, 1.0);
    assert!((0.0..=1.0).contains(&clip.z));
}
