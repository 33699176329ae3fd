/// Opaque RGB colour with 8 bits per channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb8(0, 0, 0);
    pub const WHITE: Color = Color::rgb8(255, 255, 255);

    pub const fn rgb8(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }

    /// Channels as linear floats in `[0, 1]`
    pub fn to_unit(self) -> [f64; 3] {
        [
            self.r as f64 / 255.0,
            self.g as f64 / 255.0,
            self.b as f64 / 255.0,
        ]
    }

    /// Builds a colour from unit floats, saturating out-of-range channels
    pub fn from_unit(rgb: [f64; 3]) -> Self {
        let channel = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Color::rgb8(channel(rgb[0]), channel(rgb[1]), channel(rgb[2]))
    }

    /// Source-over blend of `self` onto `dst`
    pub fn blend_over(self, dst: Color, alpha: f64) -> Color {
        let a = alpha.clamp(0.0, 1.0);
        let mix = |s: u8, d: u8| (s as f64 * a + d as f64 * (1.0 - a)).round() as u8;
        Color::rgb8(mix(self.r, dst.r), mix(self.g, dst.g), mix(self.b, dst.b))
    }
}

/// Edge function used in rasterization
pub fn edge_function(a: &[f64; 2], b: &[f64; 2], c: &[f64; 2]) -> f64 {
    (c[0] - a[0]) * (b[1] - a[1]) - (c[1] - a[1]) * (b[0] - a[0])
}

/// Multiplies a 3x3 matrix by a 3-dimensional vector
pub fn multiply_matrix_vector(matrix: &[[f64; 3]; 3], vector: &[f64; 3]) -> [f64; 3] {
    let mut result = [0.0; 3];
    for i in 0..3 {
        for j in 0..3 {
            result[i] += matrix[i][j] * vector[j];
        }
    }
    result
}

/// Multiplies two 3x3 matrices
pub fn multiply_matrices(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut result = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                result[i][j] += a[i][k] * b[k][j];
            }
        }
    }
    result
}

/// Rotation about the X axis
pub fn rotation_x(angle: f64) -> [[f64; 3]; 3] {
    let (sin, cos) = angle.sin_cos();
    [[1.0, 0.0, 0.0], [0.0, cos, -sin], [0.0, sin, cos]]
}

/// Rotation about the Y axis
pub fn rotation_y(angle: f64) -> [[f64; 3]; 3] {
    let (sin, cos) = angle.sin_cos();
    [[cos, 0.0, sin], [0.0, 1.0, 0.0], [-sin, 0.0, cos]]
}

/// Orientation matrix for Euler angles applied in X-then-Y order on the object axes
pub fn euler_xy(angle_x: f64, angle_y: f64) -> [[f64; 3]; 3] {
    multiply_matrices(&rotation_x(angle_x), &rotation_y(angle_y))
}

pub fn sub(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub fn length(v: &[f64; 3]) -> f64 {
    dot(v, v).sqrt()
}

/// Unit vector along `v`; the zero vector is returned unchanged
pub fn normalize(v: &[f64; 3]) -> [f64; 3] {
    let len = length(v);
    if len <= f64::EPSILON {
        return *v;
    }
    [v[0] / len, v[1] / len, v[2] / len]
}

/// Calculates the normal vector of a triangle
pub fn calculate_normal(a: &[f64; 3], b: &[f64; 3], c: &[f64; 3]) -> [f64; 3] {
    let u = sub(b, a);
    let v = sub(c, a);
    let normal = [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ];
    normalize(&normal)
}

/// Lambert term for a point light seen from `position`
pub fn calculate_light_intensity(
    normal: &[f64; 3],
    position: &[f64; 3],
    light_pos: &[f64; 3],
) -> f64 {
    let light_dir = normalize(&sub(light_pos, position));
    dot(normal, &light_dir).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rotation_y_turns_x_into_negative_z() {
        let v = multiply_matrix_vector(&rotation_y(std::f64::consts::FRAC_PI_2), &[1.0, 0.0, 0.0]);
        assert_relative_eq!(v[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(v[2], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn light_behind_surface_contributes_nothing() {
        let i = calculate_light_intensity(&[0.0, 0.0, 1.0], &[0.0, 0.0, 0.0], &[0.0, 0.0, -4.0]);
        assert_eq!(i, 0.0);
    }

    #[test]
    fn blend_at_half_alpha_averages() {
        let c = Color::WHITE.blend_over(Color::BLACK, 0.5);
        assert_eq!(c, Color::rgb8(128, 128, 128));
    }
}
