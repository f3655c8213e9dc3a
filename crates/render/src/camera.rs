use glam::{Mat4, Quat, Vec3};
use showcase_common::SurfaceSize;

/// Perspective camera with a vertical field of view in degrees.
///
/// Orientation is stored as a world-space rotation; [`look_at`] aims the
/// camera's -Z axis at a point with +Y as up.
///
/// [`look_at`]: PerspectiveCamera::look_at
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveCamera {
    pub fov_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self::new(75.0, SurfaceSize::default().aspect(), 0.1, 1000.0)
    }
}

impl PerspectiveCamera {
    pub fn new(fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            fov_degrees,
            aspect,
            near,
            far,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }

    /// Match the projection to a surface size.
    pub fn set_viewport(&mut self, size: SurfaceSize) {
        self.aspect = size.aspect();
    }

    pub fn fov_radians(&self) -> f32 {
        self.fov_degrees.to_radians()
    }

    pub fn look_at(&mut self, target: Vec3) {
        let forward = target - self.position;
        if forward.length_squared() < 1e-12 {
            return;
        }
        let view = Mat4::look_at_rh(self.position, target, Vec3::Y);
        let (_, rotation, _) = view.inverse().to_scale_rotation_translation();
        self.orientation = rotation.normalize();
    }

    /// Camera-to-world transform. Column 0 is screen right, column 1 screen up.
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.position)
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.world_matrix().inverse()
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn forward(&self) -> Vec3 {
        self.orientation * Vec3::NEG_Z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_projection() {
        let cam = PerspectiveCamera::default();
        assert_eq!(cam.fov_degrees, 75.0);
        assert_eq!(cam.near, 0.1);
        assert_eq!(cam.far, 1000.0);
        assert!(!cam.view_projection().col(0).x.is_nan());
    }

    #[test]
    fn look_at_points_forward_at_target() {
        let mut cam = PerspectiveCamera::default();
        cam.position = Vec3::new(0.0, 10.0, 20.0);
        cam.look_at(Vec3::ZERO);

        let expected = (Vec3::ZERO - cam.position).normalize();
        assert!((cam.forward() - expected).length() < 1e-5);

        let m = cam.world_matrix();
        assert!((m.col(0).truncate() - Vec3::X).length() < 1e-5);
        assert!(m.col(1).y > 0.0);

        let origin = cam.view_matrix().transform_point3(Vec3::ZERO);
        assert!(origin.z < 0.0, "target is in front of the camera");
    }

    #[test]
    fn look_at_own_position_is_ignored() {
        let mut cam = PerspectiveCamera::default();
        cam.position = Vec3::ONE;
        cam.look_at(Vec3::ONE);
        assert_eq!(cam.orientation, Quat::IDENTITY);
    }

    #[test]
    fn viewport_sets_aspect() {
        let mut cam = PerspectiveCamera::default();
        cam.set_viewport(SurfaceSize::new(800, 400));
        assert_eq!(cam.aspect, 2.0);
        cam.set_viewport(SurfaceSize::new(0, 0));
        assert_eq!(cam.aspect, 1.0);
    }
}
