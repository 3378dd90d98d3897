//! Vertex layouts shared with the GPU.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// A strip vertex in 640x480 screen space. `z` holds 1/w.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Base color, RGBA8.
    pub col: [u8; 4],
    /// Offset (specular) color, RGBA8.
    pub spc: [u8; 4],
    pub u: f32,
    pub v: f32,
    /// Second volume base color.
    #[serde(default)]
    pub col1: [u8; 4],
    #[serde(default)]
    pub spc1: [u8; 4],
    #[serde(default)]
    pub u1: f32,
    #[serde(default)]
    pub v1: f32,
}

impl Vertex {
    /// An opaque white vertex at the given position.
    #[must_use]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            col: [255; 4],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_uv(mut self, u: f32, v: f32) -> Self {
        self.u = u;
        self.v = v;
        self
    }

    #[must_use]
    pub fn with_color(mut self, col: [u8; 4]) -> Self {
        self.col = col;
        self
    }
}

/// A modifier volume vertex, position only.
pub type ModVolVertex = [f32; 3];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        assert_eq!(std::mem::size_of::<Vertex>(), 44);
    }

    #[test]
    fn test_vertex_cast() {
        let vertices = [Vertex::new(1.0, 2.0, 0.5)];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 44);
        assert_eq!(&bytes[12..16], &[255, 255, 255, 255]);
    }
}
