//! Modifier volume draw planning.
//!
//! Every volume triangle first toggles or sets a per-volume stencil bit. The
//! record closing a group then merges the whole group into the tile stencil
//! with an inclusion or exclusion draw.

use std::ops::Range;

use crate::params::ModifierVolumeParam;

/// Stencil mode of one modifier volume draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModVolMode {
    /// Closed volume, toggles the volume bit.
    Xor,
    /// Open volume or quad, sets the volume bit.
    Or,
    /// Merge the group, inside the volume counts as shadowed.
    Inclusion,
    /// Merge the group, outside the volume counts as shadowed.
    Exclusion,
}

/// One triangle-list draw of modifier volume geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModVolDraw {
    pub mode: ModVolMode,
    /// First triangle.
    pub first: u32,
    /// Number of triangles.
    pub count: u32,
    /// Raw 2-bit cull mode of the record that produced the draw.
    pub cull_mode: u32,
}

impl ModVolDraw {
    /// Vertex range in the modifier volume position buffer.
    #[must_use]
    pub fn vertices(&self) -> Range<u32> {
        self.first * 3..(self.first + self.count) * 3
    }
}

/// Plans the draws for a run of modifier volume records.
///
/// The open-volume test runs before the closing test, so a record that is
/// not flagged `volume_last` but closes a group (mode 1 or 2) is drawn with
/// [`ModVolMode::Or`] and then merged.
#[must_use]
pub fn plan_modifier_volumes(records: &[ModifierVolumeParam]) -> Vec<ModVolDraw> {
    let mut draws = Vec::with_capacity(records.len());
    let mut mod_base: Option<u32> = None;

    for param in records {
        if param.count == 0 {
            continue;
        }
        let mode = param.isp.depth_mode();
        let base = *mod_base.get_or_insert(param.first);

        let volume_mode = if !param.isp.volume_last() && mode > 0 {
            ModVolMode::Or
        } else {
            ModVolMode::Xor
        };
        draws.push(ModVolDraw {
            mode: volume_mode,
            first: param.first,
            count: param.count,
            cull_mode: param.isp.cull_mode(),
        });

        if mode == 1 || mode == 2 {
            draws.push(ModVolDraw {
                mode: if mode == 1 {
                    ModVolMode::Inclusion
                } else {
                    ModVolMode::Exclusion
                },
                first: base,
                count: (param.first + param.count).saturating_sub(base),
                cull_mode: param.isp.cull_mode(),
            });
            mod_base = None;
        }
    }

    draws
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::IspModVol;
    use proptest::prelude::*;

    fn record(first: u32, count: u32, mode: u32, last: bool) -> ModifierVolumeParam {
        ModifierVolumeParam::new(
            first,
            count,
            IspModVol(0).with_depth_mode(mode).with_volume_last(last),
        )
    }

    #[test]
    fn test_closed_volume_group() {
        let draws = plan_modifier_volumes(&[
            record(0, 4, 0, false),
            record(4, 2, 0, false),
            record(6, 2, 1, true),
        ]);
        let modes: Vec<_> = draws.iter().map(|d| d.mode).collect();
        assert_eq!(
            modes,
            [ModVolMode::Xor, ModVolMode::Xor, ModVolMode::Xor, ModVolMode::Inclusion]
        );
        assert_eq!((draws[3].first, draws[3].count), (0, 8), "merge spans the whole group");
    }

    #[test]
    fn test_open_check_wins_over_closing() {
        let draws = plan_modifier_volumes(&[record(10, 1, 2, false)]);
        assert_eq!(draws[0].mode, ModVolMode::Or);
        assert_eq!(draws[1].mode, ModVolMode::Exclusion);
        assert_eq!((draws[1].first, draws[1].count), (10, 1));
    }

    #[test]
    fn test_base_resets_between_groups() {
        let draws = plan_modifier_volumes(&[
            record(0, 2, 1, true),
            record(2, 3, 0, false),
            record(5, 1, 2, true),
        ]);
        assert_eq!(draws.len(), 5);
        assert_eq!((draws[1].first, draws[1].count), (0, 2));
        assert_eq!((draws[4].first, draws[4].count), (2, 4));
    }

    #[test]
    fn test_empty_records_skipped() {
        // An empty closing record does not close the group.
        let draws = plan_modifier_volumes(&[record(0, 2, 0, false), record(2, 0, 1, true)]);
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].mode, ModVolMode::Xor);
    }

    #[test]
    fn test_vertex_range() {
        let draw = ModVolDraw {
            mode: ModVolMode::Xor,
            first: 2,
            count: 3,
            cull_mode: 0,
        };
        assert_eq!(draw.vertices(), 6..15);
    }

    proptest! {
        #[test]
        fn prop_merges_cover_exactly_their_group(specs in prop::collection::vec((0u32..4, 0u32..4, any::<bool>()), 0..40)) {
            let mut records = Vec::new();
            let mut first = 0;
            for (count, mode, last) in specs {
                records.push(record(first, count, mode, last));
                first += count;
            }
            let draws = plan_modifier_volumes(&records);

            // Replay the records, tracking where each group should start.
            let mut expected_base: Option<u32> = None;
            let mut merges = draws.iter().filter(|d| matches!(d.mode, ModVolMode::Inclusion | ModVolMode::Exclusion));
            for r in records.iter().filter(|r| r.count > 0) {
                let base = *expected_base.get_or_insert(r.first);
                let mode = r.isp.depth_mode();
                if mode == 1 || mode == 2 {
                    let merge = merges.next().expect("one merge per closing record");
                    prop_assert_eq!(merge.first, base);
                    prop_assert_eq!(merge.first + merge.count, r.first + r.count);
                    expected_base = None;
                }
            }
            prop_assert!(merges.next().is_none());
        }
    }
}
