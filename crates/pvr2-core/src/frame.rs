//! A complete frame of tile accelerator output.

use std::path::Path;

use glam::Mat4;
use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};
use crate::params::{ListType, ModifierVolumeParam, PolyParam};
use crate::render_pass::{pass_ranges, PassRanges, RenderPass};
use crate::state::ClipRect;
use crate::vertex::{ModVolVertex, Vertex};

fn default_fog_clamp_max() -> u32 {
    0xFFFF_FFFF
}

fn default_pt_alpha_ref() -> f32 {
    0.5
}

fn default_shadow_scale() -> f32 {
    0.5
}

fn default_ndc() -> Mat4 {
    screen_to_ndc(640.0, 480.0)
}

/// Maps 640x480 screen space (Y down) to normalized device coordinates.
#[must_use]
pub fn screen_to_ndc(width: f32, height: f32) -> Mat4 {
    Mat4::orthographic_rh(0.0, width, height, 0.0, -1.0, 1.0)
}

/// Everything the renderer consumes for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameData {
    pub vertices: Vec<Vertex>,
    /// Strip indices into `vertices`.
    pub indices: Vec<u32>,
    /// Modifier volume triangles, three positions each.
    #[serde(default)]
    pub modvol_vertices: Vec<ModVolVertex>,

    #[serde(default)]
    pub op: Vec<PolyParam>,
    #[serde(default)]
    pub pt: Vec<PolyParam>,
    #[serde(default)]
    pub tr: Vec<PolyParam>,
    /// Modifier volumes applied to opaque and punch-through polygons.
    #[serde(default)]
    pub modvols: Vec<ModifierVolumeParam>,
    /// Modifier volumes applied to translucent polygons.
    #[serde(default)]
    pub tr_modvols: Vec<ModifierVolumeParam>,
    pub render_passes: Vec<RenderPass>,

    /// Packed ARGB8888 color clamp bounds.
    #[serde(default)]
    pub fog_clamp_min: u32,
    #[serde(default = "default_fog_clamp_max")]
    pub fog_clamp_max: u32,
    #[serde(default)]
    pub fog_color: [f32; 4],
    #[serde(default)]
    pub fog_density: f32,
    #[serde(default = "default_pt_alpha_ref")]
    pub pt_alpha_ref: f32,
    /// Color multiplier for shadowed single-volume polygons.
    #[serde(default = "default_shadow_scale")]
    pub shadow_scale: f32,

    /// Frame renders into a texture rather than the screen.
    #[serde(default)]
    pub is_rtt: bool,
    /// Target is Y-flipped, culling is reversed.
    #[serde(default)]
    pub clip_flip: bool,
    /// Maps screen space to target pixels, used for tile clip rectangles.
    #[serde(default)]
    pub viewport: Mat4,
    /// Maps screen space to normalized device coordinates.
    #[serde(default = "default_ndc")]
    pub ndc: Mat4,
    /// Scissor applied when a polygon has no user clip.
    #[serde(default)]
    pub base_clip: Option<ClipRect>,
}

impl Default for FrameData {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            modvol_vertices: Vec::new(),
            op: Vec::new(),
            pt: Vec::new(),
            tr: Vec::new(),
            modvols: Vec::new(),
            tr_modvols: Vec::new(),
            render_passes: Vec::new(),
            fog_clamp_min: 0,
            fog_clamp_max: default_fog_clamp_max(),
            fog_color: [0.0; 4],
            fog_density: 0.0,
            pt_alpha_ref: default_pt_alpha_ref(),
            shadow_scale: default_shadow_scale(),
            is_rtt: false,
            clip_flip: false,
            viewport: Mat4::IDENTITY,
            ndc: default_ndc(),
            base_clip: None,
        }
    }
}

impl FrameData {
    /// Reads a frame from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The polygon records of one list.
    #[must_use]
    pub fn list(&self, list: ListType) -> &[PolyParam] {
        match list {
            ListType::Opaque => &self.op,
            ListType::PunchThrough => &self.pt,
            ListType::Translucent => &self.tr,
        }
    }

    /// Number of whole modifier volume triangles.
    #[must_use]
    pub fn modvol_triangle_count(&self) -> usize {
        self.modvol_vertices.len() / 3
    }

    /// Checks that every range in the frame stays inside its buffer and
    /// returns the per-pass record ranges.
    pub fn validate(&self) -> Result<Vec<PassRanges>> {
        let ranges = pass_ranges(&self.render_passes)?;

        for (pass, rp) in self.render_passes.iter().enumerate() {
            let checks = [
                ("op", rp.op_count, self.op.len()),
                ("pt", rp.pt_count, self.pt.len()),
                ("tr", rp.tr_count, self.tr.len()),
                ("mvo", rp.mvo_count, self.modvols.len()),
                ("mvo_tr", rp.mvo_tr_count, self.tr_modvols.len()),
            ];
            for (field, count, len) in checks {
                if count as usize > len {
                    return Err(FrameError::PassCountOutOfRange {
                        pass,
                        field,
                        count,
                        len,
                    });
                }
            }
        }

        for list in [ListType::Opaque, ListType::PunchThrough, ListType::Translucent] {
            for (index, param) in self.list(list).iter().enumerate() {
                if param.end() > self.indices.len() as u64 {
                    return Err(FrameError::IndexSpanOutOfRange {
                        list: list.name(),
                        index,
                        first: param.first,
                        end: param.end(),
                        len: self.indices.len(),
                    });
                }
            }
        }

        if let Some((position, &vertex)) = self
            .indices
            .iter()
            .enumerate()
            .find(|(_, v)| **v as usize >= self.vertices.len())
        {
            return Err(FrameError::VertexOutOfRange {
                position,
                vertex,
                len: self.vertices.len(),
            });
        }

        if self.modvol_vertices.len() % 3 != 0 {
            return Err(FrameError::PartialModifierTriangle(self.modvol_vertices.len()));
        }
        let triangles = self.modvol_triangle_count();
        for (list, records) in [("opaque", &self.modvols), ("translucent", &self.tr_modvols)] {
            for (index, param) in records.iter().enumerate() {
                if param.end() > triangles as u64 {
                    return Err(FrameError::ModifierVolumeOutOfRange {
                        list,
                        index,
                        first: param.first,
                        end: param.end(),
                        len: triangles,
                    });
                }
            }
        }

        log::debug!(
            "frame valid: {} passes, {} OP, {} PT, {} TR, {} MV",
            ranges.len(),
            self.op.len(),
            self.pt.len(),
            self.tr.len(),
            self.modvols.len()
        );
        Ok(ranges)
    }
}

/// Assembles a [`FrameData`] strip by strip.
#[derive(Debug, Default)]
pub struct FrameBuilder {
    frame: FrameData,
}

impl FrameBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a strip to `list`. `first` and `count` of `template` are
    /// replaced with the location of the new indices.
    #[must_use]
    pub fn strip(mut self, list: ListType, vertices: &[Vertex], template: PolyParam) -> Self {
        let base = self.frame.vertices.len() as u32;
        let first = self.frame.indices.len() as u32;
        self.frame.vertices.extend_from_slice(vertices);
        self.frame
            .indices
            .extend((0..vertices.len() as u32).map(|i| base + i));

        let param = PolyParam {
            first,
            count: vertices.len() as u32,
            ..template
        };
        match list {
            ListType::Opaque => self.frame.op.push(param),
            ListType::PunchThrough => self.frame.pt.push(param),
            ListType::Translucent => self.frame.tr.push(param),
        }
        self
    }

    /// Appends a modifier volume record made of `triangles`.
    #[must_use]
    pub fn modifier_volume(
        mut self,
        triangles: &[[ModVolVertex; 3]],
        isp: crate::params::IspModVol,
        translucent: bool,
    ) -> Self {
        let first = self.frame.modvol_triangle_count() as u32;
        for triangle in triangles {
            self.frame.modvol_vertices.extend_from_slice(triangle);
        }
        let param = ModifierVolumeParam::new(first, triangles.len() as u32, isp);
        if translucent {
            self.frame.tr_modvols.push(param);
        } else {
            self.frame.modvols.push(param);
        }
        self
    }

    /// Closes a render pass containing everything appended so far.
    #[must_use]
    pub fn end_pass(mut self, autosort: bool) -> Self {
        self.frame.render_passes.push(RenderPass {
            op_count: self.frame.op.len() as u32,
            pt_count: self.frame.pt.len() as u32,
            tr_count: self.frame.tr.len() as u32,
            mvo_count: self.frame.modvols.len() as u32,
            mvo_tr_count: self.frame.tr_modvols.len() as u32,
            autosort,
        });
        self
    }

    /// Changes frame-level fields before building.
    #[must_use]
    pub fn configure(mut self, f: impl FnOnce(&mut FrameData)) -> Self {
        f(&mut self.frame);
        self
    }

    /// Finishes the frame, closing a final non-sorted pass if records were
    /// appended after the last [`FrameBuilder::end_pass`].
    #[must_use]
    pub fn build(self) -> FrameData {
        let pending = match self.frame.render_passes.last() {
            Some(last) => {
                last.op_count as usize != self.frame.op.len()
                    || last.pt_count as usize != self.frame.pt.len()
                    || last.tr_count as usize != self.frame.tr.len()
                    || last.mvo_count as usize != self.frame.modvols.len()
                    || last.mvo_tr_count as usize != self.frame.tr_modvols.len()
            }
            None => true,
        };
        if pending {
            self.end_pass(false).frame
        } else {
            self.frame
        }
    }
}

/// A quad as a 4-vertex strip covering `(x0, y0)`-`(x1, y1)` at depth `z`.
#[must_use]
pub fn quad_strip(x0: f32, y0: f32, x1: f32, y1: f32, z: f32) -> [Vertex; 4] {
    [
        Vertex::new(x0, y1, z).with_uv(0.0, 1.0),
        Vertex::new(x0, y0, z).with_uv(0.0, 0.0),
        Vertex::new(x1, y1, z).with_uv(1.0, 1.0),
        Vertex::new(x1, y0, z).with_uv(1.0, 0.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{Isp, IspModVol};

    fn opaque() -> PolyParam {
        PolyParam {
            isp: Isp(0).with_depth_mode(6),
            ..PolyParam::default()
        }
    }

    #[test]
    fn test_builder_strips() {
        let quad = quad_strip(0.0, 0.0, 10.0, 10.0, 1.0);
        let frame = FrameBuilder::new()
            .strip(ListType::Opaque, &quad, opaque())
            .strip(ListType::Translucent, &quad, opaque())
            .build();
        assert_eq!(frame.vertices.len(), 8);
        assert_eq!(frame.indices[4..], [4, 5, 6, 7]);
        assert_eq!((frame.tr[0].first, frame.tr[0].count), (4, 4));
        assert_eq!(frame.render_passes.len(), 1, "build closes the open pass");
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn test_builder_does_not_duplicate_closed_pass() {
        let quad = quad_strip(0.0, 0.0, 10.0, 10.0, 1.0);
        let frame = FrameBuilder::new()
            .strip(ListType::Opaque, &quad, opaque())
            .end_pass(true)
            .build();
        assert_eq!(frame.render_passes.len(), 1);
        assert!(frame.render_passes[0].autosort);
    }

    #[test]
    fn test_validate_index_span() {
        let mut frame = FrameBuilder::new()
            .strip(ListType::Opaque, &quad_strip(0.0, 0.0, 1.0, 1.0, 1.0), opaque())
            .build();
        frame.op[0].count = 9;
        assert!(matches!(
            frame.validate(),
            Err(FrameError::IndexSpanOutOfRange { list: "OP", .. })
        ));
    }

    #[test]
    fn test_validate_vertex_index() {
        let mut frame = FrameBuilder::new()
            .strip(ListType::Opaque, &quad_strip(0.0, 0.0, 1.0, 1.0, 1.0), opaque())
            .build();
        frame.indices[2] = 40;
        assert!(matches!(
            frame.validate(),
            Err(FrameError::VertexOutOfRange { position: 2, vertex: 40, .. })
        ));
    }

    #[test]
    fn test_validate_pass_count() {
        let mut frame = FrameBuilder::new()
            .strip(ListType::Opaque, &quad_strip(0.0, 0.0, 1.0, 1.0, 1.0), opaque())
            .build();
        frame.render_passes[0].op_count = 2;
        assert!(matches!(
            frame.validate(),
            Err(FrameError::PassCountOutOfRange { field: "op", .. })
        ));
    }

    #[test]
    fn test_validate_modvol_span() {
        let tri = [[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 1.0]];
        let mut frame = FrameBuilder::new()
            .modifier_volume(&[tri], IspModVol(0).with_depth_mode(1), false)
            .build();
        assert!(frame.validate().is_ok());
        frame.modvols[0].count = 2;
        assert!(matches!(
            frame.validate(),
            Err(FrameError::ModifierVolumeOutOfRange { .. })
        ));
        frame.modvol_vertices.pop();
        assert!(matches!(
            frame.validate(),
            Err(FrameError::PartialModifierTriangle(2))
        ));
    }

    #[test]
    fn test_json_round_trip_keeps_defaults() {
        let frame = FrameBuilder::new()
            .strip(ListType::Opaque, &quad_strip(0.0, 0.0, 1.0, 1.0, 1.0), opaque())
            .build();
        let text = frame.to_json().unwrap();
        let back = FrameData::from_json(&text).unwrap();
        assert_eq!(back, frame);

        let minimal: FrameData =
            FrameData::from_json(r#"{"vertices": [], "indices": [], "render_passes": []}"#).unwrap();
        assert_eq!(minimal.fog_clamp_max, 0xFFFF_FFFF);
        assert_eq!(minimal.ndc, screen_to_ndc(640.0, 480.0));
    }
}
