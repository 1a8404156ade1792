use std::collections::HashMap;

use crate::compile::{ProgramInterface, ScalarType, UniformKind, ValueType};

/// Value written to a named uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Uint(u32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
}

impl UniformValue {
    fn value_type(&self) -> ValueType {
        match self {
            UniformValue::Float(_) => ValueType::new(ScalarType::Float, 1),
            UniformValue::Int(_) => ValueType::new(ScalarType::Int, 1),
            UniformValue::Uint(_) => ValueType::new(ScalarType::Uint, 1),
            UniformValue::Vec2(_) => ValueType::new(ScalarType::Float, 2),
            UniformValue::Vec3(_) => ValueType::new(ScalarType::Float, 3),
            UniformValue::Vec4(_) => ValueType::new(ScalarType::Float, 4),
        }
    }

    fn write_to(&self, out: &mut [u8]) {
        match self {
            UniformValue::Float(value) => out.copy_from_slice(bytemuck::bytes_of(value)),
            UniformValue::Int(value) => out.copy_from_slice(bytemuck::bytes_of(value)),
            UniformValue::Uint(value) => out.copy_from_slice(bytemuck::bytes_of(value)),
            UniformValue::Vec2(value) => out.copy_from_slice(bytemuck::cast_slice(value)),
            UniformValue::Vec3(value) => out.copy_from_slice(bytemuck::cast_slice(value)),
            UniformValue::Vec4(value) => out.copy_from_slice(bytemuck::cast_slice(value)),
        }
    }
}

/// Outcome of a by-name uniform write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformWrite {
    Written,
    /// The program has no such uniform; the write is a no-op.
    Unknown,
    /// The uniform exists with a different type; nothing was written.
    Mismatch { expected: ValueType },
}

/// CPU mirror of the program's std140 uniform block.
#[derive(Debug, Clone, Default)]
pub struct UniformBlock {
    bytes: Vec<u8>,
    fields: HashMap<String, (ValueType, usize)>,
    dirty: bool,
}

impl UniformBlock {
    pub fn from_interface(interface: &ProgramInterface) -> Self {
        let size = match interface.uniform_block().map(|entry| entry.kind) {
            Some(crate::compile::BindingKind::UniformBuffer { size }) => size as usize,
            _ => 0,
        };
        let fields = interface
            .uniforms
            .iter()
            .filter_map(|slot| match slot.kind {
                UniformKind::Value { ty, offset } => Some((slot.name.clone(), (ty, offset as usize))),
                _ => None,
            })
            .collect();
        Self {
            // Rounded up so the buffer always satisfies the 16-byte std140 stride.
            bytes: vec![0; size.div_ceil(16) * 16],
            fields,
            dirty: true,
        }
    }

    pub fn set(&mut self, name: &str, value: UniformValue) -> UniformWrite {
        let Some(&(expected, offset)) = self.fields.get(name) else {
            return UniformWrite::Unknown;
        };
        if expected != value.value_type() {
            return UniformWrite::Mismatch { expected };
        }
        let end = offset + expected.size();
        if end > self.bytes.len() {
            return UniformWrite::Unknown;
        }
        let mut staged = [0u8; 16];
        let staged = &mut staged[..expected.size()];
        value.write_to(staged);
        let slot = &mut self.bytes[offset..end];
        if *slot != *staged {
            slot.copy_from_slice(staged);
            self.dirty = true;
        }
        UniformWrite::Written
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the block bytes if anything changed since the last call.
    pub(crate) fn take_dirty(&mut self) -> Option<&[u8]> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(&self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{check_shaders, ShaderSources};

    fn bundled_block() -> (ProgramInterface, UniformBlock) {
        let interface = check_shaders(&ShaderSources::bundled()).expect("bundled shaders link");
        let block = UniformBlock::from_interface(&interface);
        (interface, block)
    }

    fn offset_of(interface: &ProgramInterface, name: &str) -> usize {
        match interface.uniform(name).map(|slot| &slot.kind) {
            Some(UniformKind::Value { offset, .. }) => *offset as usize,
            other => panic!("{name} is not a block member: {other:?}"),
        }
    }

    #[test]
    fn writes_land_at_reflected_offsets() {
        let (interface, mut block) = bundled_block();
        assert_eq!(block.set("uScale", UniformValue::Float(0.25)), UniformWrite::Written);
        assert_eq!(
            block.set("uTranslation", UniformValue::Vec2([1.0, -2.0])),
            UniformWrite::Written
        );
        assert_eq!(block.set("uBoundary", UniformValue::Int(1)), UniformWrite::Written);

        let bytes = block.as_bytes();
        let scale = offset_of(&interface, "uScale");
        assert_eq!(&bytes[scale..scale + 4], &0.25f32.to_ne_bytes());
        let translation = offset_of(&interface, "uTranslation");
        assert_eq!(&bytes[translation..translation + 4], &1.0f32.to_ne_bytes());
        assert_eq!(&bytes[translation + 4..translation + 8], &(-2.0f32).to_ne_bytes());
        let boundary = offset_of(&interface, "uBoundary");
        assert_eq!(&bytes[boundary..boundary + 4], &1i32.to_ne_bytes());
    }

    #[test]
    fn unknown_names_are_ignored() {
        let (_, mut block) = bundled_block();
        let before = block.as_bytes().to_vec();
        assert_eq!(block.set("uMissing", UniformValue::Float(1.0)), UniformWrite::Unknown);
        assert_eq!(block.as_bytes(), before.as_slice());
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let (_, mut block) = bundled_block();
        let before = block.as_bytes().to_vec();
        assert_eq!(
            block.set("uScale", UniformValue::Vec2([1.0, 2.0])),
            UniformWrite::Mismatch {
                expected: ValueType::FLOAT
            }
        );
        assert_eq!(block.as_bytes(), before.as_slice());
    }

    #[test]
    fn dirty_flag_tracks_changes() {
        let (_, mut block) = bundled_block();
        assert!(block.take_dirty().is_some());
        assert!(block.take_dirty().is_none());

        block.set("uTime", UniformValue::Float(0.0));
        assert!(block.take_dirty().is_none(), "rewriting zero is not a change");

        block.set("uTime", UniformValue::Float(0.5));
        assert!(block.take_dirty().is_some());
    }

    #[test]
    fn block_size_is_std140_aligned() {
        let (_, block) = bundled_block();
        assert!(!block.is_empty());
        assert_eq!(block.as_bytes().len() % 16, 0);
    }
}
