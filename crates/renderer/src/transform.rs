//! CPU side of the lattice map.
//!
//! The viewer draws an image inside nested copies of itself, each copy placed
//! by the affine map `p ↦ M·p + t` with `M = s·R(θ)`. The shader needs the
//! map's parameters plus its fixed point, which is approximated here by
//! iterating the map from the origin.

use std::f32::consts::PI;

use viewconfig::Configuration;

/// Number of map iterations used to approximate the fixed point.
pub const ORIGIN_ITERATIONS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatticeTransform {
    /// Reciprocal of the configured scale.
    pub scale: f32,
    /// Rotation in radians.
    pub rotation: f32,
    pub translation: [f32; 2],
    /// Row-major `scale · [[cos θ, sin θ], [-sin θ, cos θ]]`.
    pub matrix: [[f32; 2]; 2],
    /// Approximate fixed point of the map.
    pub origin: [f32; 2],
    /// True when `scale < 1`, the only case where `origin` is a true attractor.
    pub contracting: bool,
    /// True when iterating overflowed and `origin` fell back to `translation`.
    pub diverged: bool,
}

impl LatticeTransform {
    pub fn derive(configuration: &Configuration) -> Self {
        let scale = 1.0 / configuration.scale;
        let rotation = configuration.rotation / 180.0 * PI;
        let translation = configuration.translation;
        let (sin, cos) = rotation.sin_cos();
        let matrix = [[scale * cos, scale * sin], [-scale * sin, scale * cos]];

        let mut transform = Self {
            scale,
            rotation,
            translation,
            matrix,
            origin: [0.0, 0.0],
            contracting: scale < 1.0,
            diverged: false,
        };

        let mut origin = [0.0, 0.0];
        for _ in 0..ORIGIN_ITERATIONS {
            origin = transform.apply(origin);
        }

        if origin.iter().all(|value| value.is_finite()) {
            transform.origin = origin;
        } else {
            tracing::trace!(?origin, "lattice origin diverged");
            transform.diverged = true;
            transform.origin = translation;
        }
        transform
    }

    /// Applies the affine map once.
    pub fn apply(&self, point: [f32; 2]) -> [f32; 2] {
        let [[m00, m01], [m10, m11]] = self.matrix;
        let [x, y] = point;
        [
            m00 * x + m01 * y + self.translation[0],
            m10 * x + m11 * y + self.translation[1],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::count_warnings;

    fn configuration(scale: f32, rotation: f32, translation: [f32; 2]) -> Configuration {
        Configuration {
            scale,
            rotation,
            translation,
            ..Configuration::default()
        }
    }

    fn close(a: f32, b: f32, tolerance: f32) -> bool {
        (a - b).abs() <= tolerance
    }

    #[test]
    fn default_configuration_scales_by_a_quarter() {
        let transform = LatticeTransform::derive(&configuration(4.0, 0.0, [0.0, 0.0]));
        assert_eq!(transform.scale, 0.25);
        assert_eq!(transform.rotation, 0.0);
        assert_eq!(transform.origin, [0.0, 0.0]);
        assert!(transform.contracting);
    }

    #[test]
    fn matrix_follows_row_major_sign_convention() {
        let transform = LatticeTransform::derive(&configuration(2.0, 90.0, [0.0, 0.0]));
        let [[m00, m01], [m10, m11]] = transform.matrix;
        assert!(close(m00, 0.0, 1e-6));
        assert!(close(m01, 0.5, 1e-6));
        assert!(close(m10, -0.5, 1e-6));
        assert!(close(m11, 0.0, 1e-6));
    }

    #[test]
    fn origin_converges_to_fixed_point() {
        // x = 0.5·y + 1, y = -0.5·x  =>  (0.8, -0.4)
        let transform = LatticeTransform::derive(&configuration(2.0, 90.0, [1.0, 0.0]));
        assert!(close(transform.origin[0], 0.8, 1e-4));
        assert!(close(transform.origin[1], -0.4, 1e-4));

        let image = transform.apply(transform.origin);
        assert!(close(image[0], transform.origin[0], 1e-4));
        assert!(close(image[1], transform.origin[1], 1e-4));
    }

    #[test]
    fn pure_translation_scenario() {
        let transform = LatticeTransform::derive(&configuration(4.0, 0.0, [0.3, -0.6]));
        // Fixed point of p/4 + t is 4t/3.
        assert!(close(transform.origin[0], 0.4, 1e-5));
        assert!(close(transform.origin[1], -0.8, 1e-5));
    }

    #[test]
    fn contraction_flag_tracks_scale() {
        assert!(!LatticeTransform::derive(&configuration(1.0, 0.0, [0.0, 0.0])).contracting);
        assert!(!LatticeTransform::derive(&configuration(0.5, 0.0, [0.0, 0.0])).contracting);
        assert!(LatticeTransform::derive(&configuration(1.5, 30.0, [0.0, 0.0])).contracting);
    }

    #[test]
    fn divergent_origin_falls_back_to_translation() {
        // scale' = 1000, twenty iterations overflow f32.
        let transform = LatticeTransform::derive(&configuration(1.0e-3, 0.0, [1.0e30, 0.0]));
        assert!(transform.diverged);
        assert_eq!(transform.origin, [1.0e30, 0.0]);
    }

    #[test]
    fn deriving_every_frame_stays_quiet() {
        let warnings = count_warnings(|| {
            for _ in 0..60 {
                LatticeTransform::derive(&configuration(1.0, 0.0, [0.0, 0.0]));
                LatticeTransform::derive(&configuration(1.0e-3, 0.0, [1.0e30, 0.0]));
            }
        });
        assert_eq!(warnings, 0);
    }
}
