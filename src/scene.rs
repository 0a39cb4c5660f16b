// Scene data - the cube mesh, its animation and the per-frame uniforms
//
// Everything here is plain CPU data; the renderer uploads it.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use std::f32::consts::TAU;

/// Interleaved cube vertex: position, normal, color
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
}

/// Matrices consumed by `cube.vert` (binding 0, std140)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformData {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

impl Default for UniformData {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        }
    }
}

pub struct CubeMesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
}

// (outward normal, tangent u, tangent v, color). u x v == normal so the
// quads come out counter-clockwise seen from outside.
const FACES: [([f32; 3], [f32; 3], [f32; 3], [f32; 3]); 6] = [
    ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0], [0.90, 0.30, 0.25]),
    ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [0.25, 0.75, 0.35]),
    ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.25, 0.45, 0.90]),
    ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.95, 0.80, 0.25]),
    ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.80, 0.35, 0.85]),
    ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.30, 0.85, 0.85]),
];

impl CubeMesh {
    /// Unit cube centred on the origin, 4 vertices per face so normals stay flat
    pub fn new(half_extent: f32) -> Self {
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        for (normal, u, v, color) in FACES {
            let n = Vec3::from(normal);
            let u = Vec3::from(u);
            let v = Vec3::from(v);
            let base = vertices.len() as u16;

            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let position = (n + u * su + v * sv) * half_extent;
                vertices.push(Vertex {
                    position: position.to_array(),
                    normal,
                    color,
                });
            }

            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }

        Self { vertices, indices }
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

/// Constant-speed rotation about a fixed axis
#[derive(Debug, Clone)]
pub struct Spin {
    axis: Vec3,
    /// Radians per second
    speed: f32,
    angle: f32,
    paused: bool,
}

impl Spin {
    pub fn new(axis: [f32; 3], degrees_per_second: f32) -> Self {
        Self {
            axis: Vec3::from(axis).try_normalize().unwrap_or(Vec3::Y),
            speed: degrees_per_second.to_radians(),
            angle: 0.0,
            paused: false,
        }
    }

    pub fn advance(&mut self, dt: f32) {
        if self.paused {
            return;
        }
        self.angle = (self.angle + self.speed * dt).rem_euclid(TAU);
    }

    pub fn model(&self) -> Mat4 {
        Mat4::from_axis_angle(self.axis, self.angle)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// Apply new axis/speed from a reloaded config, keeping the current angle
    pub fn reconfigure(&mut self, axis: [f32; 3], degrees_per_second: f32) {
        self.axis = Vec3::from(axis).try_normalize().unwrap_or(self.axis);
        self.speed = degrees_per_second.to_radians();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_has_flat_faces() {
        let mesh = CubeMesh::new(0.5);
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.index_count(), 36);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));

        for v in &mesh.vertices {
            for c in v.position {
                assert!((c.abs() - 0.5).abs() < 1e-6);
            }
            // Normal points away from the centre
            assert!(Vec3::from(v.normal).dot(Vec3::from(v.position)) > 0.0);
        }
    }

    #[test]
    fn triangles_wind_counter_clockwise_from_outside() {
        let mesh = CubeMesh::new(1.0);
        for tri in mesh.indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| mesh.vertices[i as usize]);
            let edge1 = Vec3::from(b.position) - Vec3::from(a.position);
            let edge2 = Vec3::from(c.position) - Vec3::from(a.position);
            let facing = edge1.cross(edge2).normalize();
            assert!(facing.dot(Vec3::from(a.normal)) > 0.99, "{:?}", tri);
        }
    }

    #[test]
    fn vertex_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 36);
        assert_eq!(std::mem::size_of::<UniformData>(), 192);
    }

    #[test]
    fn spin_wraps_angle() {
        let mut spin = Spin::new([0.0, 1.0, 0.0], 90.0);
        spin.advance(5.0);
        // 450 degrees wraps to a quarter turn
        let quarter = Mat4::from_rotation_y(90f32.to_radians());
        assert!(spin.model().abs_diff_eq(quarter, 1e-4));
    }

    #[test]
    fn paused_spin_holds_its_angle() {
        let mut spin = Spin::new([1.0, 0.0, 0.0], 30.0);
        spin.advance(1.0);
        let before = spin.model();

        spin.toggle_pause();
        spin.advance(10.0);
        assert_eq!(spin.model(), before);

        spin.toggle_pause();
        spin.advance(1.0);
        assert!(!spin.model().abs_diff_eq(before, 1e-4));
    }

    #[test]
    fn spin_model_rotates_about_axis() {
        let mut spin = Spin::new([0.0, 2.0, 0.0], 90.0);
        spin.advance(1.0);
        let rotated = spin.model().transform_point3(Vec3::X);
        assert!(rotated.abs_diff_eq(-Vec3::Z, 1e-5));
    }

    #[test]
    fn zero_axis_falls_back_to_y() {
        let spin = Spin::new([0.0, 0.0, 0.0], 10.0);
        assert!(spin.model().abs_diff_eq(Mat4::IDENTITY, 1e-6));
        assert_eq!(spin.axis, Vec3::Y);
    }
}
