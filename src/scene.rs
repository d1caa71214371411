use glam::{Mat4, Vec3};

/// Uniform block shared with the point shader
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SceneUniforms {
    pub view_proj: [[f32; 4]; 4],
    /// Viewport size in physical pixels
    pub viewport: [f32; 2],
    /// Point diameter in pixels
    pub point_size: f32,
    pub _padding: f32,
}

/// Camera and viewport for the particle grid.
///
/// A 45 degree perspective camera sits on the +z axis looking at the
/// origin, far enough back to frame a 320x180 grid. Points have a fixed
/// on-screen size; depth only moves them in space. Resizing touches the
/// camera and viewport, never the particles.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneHost {
    viewport: (u32, u32),
    point_size: f32,
    fov_y_degrees: f32,
    near: f32,
    far: f32,
    eye_distance: f32,
}

impl SceneHost {
    pub const CLEAR_COLOR: [f64; 4] = [0.0, 0.0, 0.0, 1.0];

    pub fn new(viewport: (u32, u32), point_size: f32) -> Self {
        Self {
            viewport: clamp_viewport(viewport),
            point_size,
            fov_y_degrees: 45.0,
            near: 1.0,
            far: 1000.0,
            eye_distance: 400.0,
        }
    }

    /// Update aspect ratio and viewport for a new surface size
    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = clamp_viewport((width, height));
        tracing::debug!(
            "Scene viewport resized to {}x{}",
            self.viewport.0,
            self.viewport.1
        );
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn point_size(&self) -> f32 {
        self.point_size
    }

    pub fn aspect(&self) -> f32 {
        self.viewport.0 as f32 / self.viewport.1 as f32
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y_degrees.to_radians(),
            self.aspect(),
            self.near,
            self.far,
        )
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(Vec3::new(0.0, 0.0, self.eye_distance), Vec3::ZERO, Vec3::Y)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection() * self.view()
    }

    pub fn uniforms(&self) -> SceneUniforms {
        SceneUniforms {
            view_proj: self.view_proj().to_cols_array_2d(),
            viewport: [self.viewport.0 as f32, self.viewport.1 as f32],
            point_size: self.point_size,
            _padding: 0.0,
        }
    }
}

fn clamp_viewport((width, height): (u32, u32)) -> (u32, u32) {
    (width.max(1), height.max(1))
}
