//! Lazily compiled shader variants.

use std::collections::HashMap;

use pvr2_core::ShaderVariant;

use crate::device::{GraphicsDevice, ProgramHandle};
use crate::error::RenderResult;

/// Maps shader variant keys to compiled programs.
///
/// A variant is compiled the first time it is requested. Entries are never
/// evicted, so a stall only happens the first time a frame uses a new
/// combination of flags.
#[derive(Debug, Default)]
pub struct ShaderCache {
    programs: HashMap<u32, ProgramHandle>,
    modifier_volume: Option<ProgramHandle>,
}

impl ShaderCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the program for `variant`, compiling it if needed.
    pub fn get_program(
        &mut self,
        device: &mut dyn GraphicsDevice,
        variant: &ShaderVariant,
    ) -> RenderResult<ProgramHandle> {
        let key = variant.key();
        if let Some(&program) = self.programs.get(&key) {
            return Ok(program);
        }
        let program = device.compile_program(variant)?;
        log::debug!("compiled shader variant {key:#07x}: {variant:?}");
        self.programs.insert(key, program);
        Ok(program)
    }

    /// Returns the modifier volume program, compiling it if needed.
    pub fn modifier_volume_program(
        &mut self,
        device: &mut dyn GraphicsDevice,
    ) -> RenderResult<ProgramHandle> {
        if let Some(program) = self.modifier_volume {
            return Ok(program);
        }
        let program = device.compile_modifier_volume_program()?;
        log::debug!("compiled modifier volume program");
        self.modifier_volume = Some(program);
        Ok(program)
    }

    /// Number of cached variants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Whether `variant` has been compiled.
    #[must_use]
    pub fn contains(&self, variant: &ShaderVariant) -> bool {
        self.programs.contains_key(&variant.key())
    }
}
