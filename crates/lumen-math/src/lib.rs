// SPDX-License-Identifier: CEPL-1.0
//! Transform block shared with the vertex shader.
//!
//! Layout mirrors the GLSL `uniform Transforms { mat4 model; mat4 view; mat4 proj; }`
//! block: three column-major 4x4 matrices, no padding.

use glam::{Mat4, Vec3};

/// Radians per second the model spins around +Z.
pub const SPIN_RATE: f32 = std::f32::consts::FRAC_PI_2;

const EYE: Vec3 = Vec3::new(2.0, 2.0, 2.0);
const FOV_Y: f32 = std::f32::consts::FRAC_PI_4;
const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 10.0;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct UniformTransforms {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

impl UniformTransforms {
    /// Transforms for a quad spinning at [`SPIN_RATE`], seen from a fixed
    /// camera. Pure in `elapsed` (seconds) and `aspect` (width / height).
    pub fn spinning(elapsed: f32, aspect: f32) -> Self {
        let model = Mat4::from_rotation_z(elapsed * SPIN_RATE);
        let view = Mat4::look_at_rh(EYE, Vec3::ZERO, Vec3::Z);
        let mut proj = Mat4::perspective_rh(FOV_Y, aspect, Z_NEAR, Z_FAR);
        // Vulkan clip space has +Y pointing down.
        proj.y_axis.y *= -1.0;

        Self {
            model: model.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
        }
    }
}

/// Width over height, or 1.0 for a degenerate (zero-height) viewport.
pub fn aspect_ratio(width: u32, height: u32) -> f32 {
    if height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}
