//! Conversions from the pipeline's state enums into wgpu types.

use pvr2_core::{
    BlendFactor, BlendState, CompareFunction, CullFace, FilterMode, SamplerState, StencilOp,
    WrapMode,
};

/// Local conversion trait, `From` is unavailable for foreign types on both sides.
pub(crate) trait IntoWgpu<T> {
    fn into_wgpu(self) -> T;
}

impl IntoWgpu<wgpu::CompareFunction> for CompareFunction {
    fn into_wgpu(self) -> wgpu::CompareFunction {
        match self {
            Self::Never => wgpu::CompareFunction::Never,
            Self::Less => wgpu::CompareFunction::Less,
            Self::Equal => wgpu::CompareFunction::Equal,
            Self::LessEqual => wgpu::CompareFunction::LessEqual,
            Self::Greater => wgpu::CompareFunction::Greater,
            Self::NotEqual => wgpu::CompareFunction::NotEqual,
            Self::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
            Self::Always => wgpu::CompareFunction::Always,
        }
    }
}

impl IntoWgpu<wgpu::BlendFactor> for BlendFactor {
    fn into_wgpu(self) -> wgpu::BlendFactor {
        match self {
            Self::Zero => wgpu::BlendFactor::Zero,
            Self::One => wgpu::BlendFactor::One,
            Self::SrcColor => wgpu::BlendFactor::Src,
            Self::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
            Self::DstColor => wgpu::BlendFactor::Dst,
            Self::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
            Self::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
            Self::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
            Self::DstAlpha => wgpu::BlendFactor::DstAlpha,
            Self::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        }
    }
}

impl IntoWgpu<wgpu::BlendState> for BlendState {
    fn into_wgpu(self) -> wgpu::BlendState {
        let component = wgpu::BlendComponent {
            src_factor: self.src.into_wgpu(),
            dst_factor: self.dst.into_wgpu(),
            operation: wgpu::BlendOperation::Add,
        };
        wgpu::BlendState {
            color: component,
            alpha: component,
        }
    }
}

impl IntoWgpu<wgpu::StencilOperation> for StencilOp {
    fn into_wgpu(self) -> wgpu::StencilOperation {
        match self {
            Self::Keep => wgpu::StencilOperation::Keep,
            Self::Zero => wgpu::StencilOperation::Zero,
            Self::Replace => wgpu::StencilOperation::Replace,
            Self::Invert => wgpu::StencilOperation::Invert,
        }
    }
}

impl IntoWgpu<Option<wgpu::Face>> for CullFace {
    fn into_wgpu(self) -> Option<wgpu::Face> {
        match self {
            Self::None => None,
            Self::Front => Some(wgpu::Face::Front),
            Self::Back => Some(wgpu::Face::Back),
        }
    }
}

impl IntoWgpu<wgpu::AddressMode> for WrapMode {
    fn into_wgpu(self) -> wgpu::AddressMode {
        match self {
            Self::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            Self::Repeat => wgpu::AddressMode::Repeat,
            Self::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
        }
    }
}

impl IntoWgpu<wgpu::FilterMode> for FilterMode {
    fn into_wgpu(self) -> wgpu::FilterMode {
        match self {
            Self::Nearest => wgpu::FilterMode::Nearest,
            Self::Linear => wgpu::FilterMode::Linear,
        }
    }
}

/// The hashable part of a [`SamplerState`]. LOD bias is applied in the
/// shader, wgpu samplers have no bias parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SamplerKey {
    wrap_u: WrapMode,
    wrap_v: WrapMode,
    mag_filter: FilterMode,
    min_filter: FilterMode,
    mipmap_filter: Option<FilterMode>,
    anisotropy: u16,
}

impl From<&SamplerState> for SamplerKey {
    fn from(state: &SamplerState) -> Self {
        let anisotropy = state.anisotropy.max(1);
        // anisotropic filtering requires linear filtering everywhere
        let filter = |mode: FilterMode| {
            if anisotropy > 1 {
                FilterMode::Linear
            } else {
                mode
            }
        };
        Self {
            wrap_u: state.wrap_u,
            wrap_v: state.wrap_v,
            mag_filter: filter(state.mag_filter),
            min_filter: filter(state.min_filter),
            mipmap_filter: state.mipmap_filter.map(filter),
            anisotropy,
        }
    }
}

impl Default for SamplerKey {
    fn default() -> Self {
        Self::from(&SamplerState::default())
    }
}

impl SamplerKey {
    pub fn descriptor(&self) -> wgpu::SamplerDescriptor<'static> {
        let mipmapped = self.mipmap_filter.is_some();
        wgpu::SamplerDescriptor {
            label: Some("pvr2 sampler"),
            address_mode_u: self.wrap_u.into_wgpu(),
            address_mode_v: self.wrap_v.into_wgpu(),
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: self.mag_filter.into_wgpu(),
            min_filter: self.min_filter.into_wgpu(),
            mipmap_filter: self.mipmap_filter.unwrap_or(self.min_filter).into_wgpu(),
            lod_min_clamp: 0.0,
            lod_max_clamp: if mipmapped { 32.0 } else { 0.0 },
            compare: None,
            anisotropy_clamp: self.anisotropy,
            border_color: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anisotropy_forces_linear() {
        let state = SamplerState {
            anisotropy: 4,
            mipmap_filter: Some(FilterMode::Nearest),
            ..SamplerState::default()
        };
        let desc = SamplerKey::from(&state).descriptor();
        assert_eq!(desc.mag_filter, wgpu::FilterMode::Linear);
        assert_eq!(desc.min_filter, wgpu::FilterMode::Linear);
        assert_eq!(desc.mipmap_filter, wgpu::FilterMode::Linear);
        assert_eq!(desc.anisotropy_clamp, 4);
    }

    #[test]
    fn test_lod_bias_not_part_of_key() {
        let a = SamplerState::default();
        let b = SamplerState {
            lod_bias: -2.0,
            ..a
        };
        assert_eq!(SamplerKey::from(&a), SamplerKey::from(&b));
    }

    #[test]
    fn test_unmipmapped_sampler_clamps_lod() {
        let desc = SamplerKey::default().descriptor();
        assert!(desc.lod_max_clamp.abs() < f32::EPSILON);
        assert_eq!(desc.address_mode_u, wgpu::AddressMode::ClampToEdge);
    }
}
