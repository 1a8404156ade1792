//! Shader source loading, GLSL compilation and interface reflection.
//!
//! Both stages go through naga's GLSL front end and validator so problems are
//! reported with source-annotated diagnostics before any GPU object exists.
//! Reflection walks the validated modules to recover what WebGL-style code
//! would query at link time: uniform names with their std140 offsets, texture
//! and sampler slots, and vertex attribute locations.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use wgpu::naga::front::glsl;
use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};
use wgpu::naga::{
    AddressSpace, Binding, Module, ScalarKind, ShaderStage, TypeInner, VectorSize,
};

pub const VERTEX_FILE: &str = "shader.vert";
pub const FRAGMENT_FILE: &str = "shader.frag";

const BUNDLED_VERTEX: &str = include_str!("../shader/shader.vert");
const BUNDLED_FRAGMENT: &str = include_str!("../shader/shader.frag");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Vertex,
    Fragment,
}

impl StageKind {
    fn naga_stage(self) -> ShaderStage {
        match self {
            StageKind::Vertex => ShaderStage::Vertex,
            StageKind::Fragment => ShaderStage::Fragment,
        }
    }

    pub(crate) fn wgpu_stages(self) -> wgpu::ShaderStages {
        match self {
            StageKind::Vertex => wgpu::ShaderStages::VERTEX,
            StageKind::Fragment => wgpu::ShaderStages::FRAGMENT,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Vertex => f.write_str("vertex"),
            StageKind::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("failed to compile {stage} shader:\n{diagnostic}")]
    Compile { stage: StageKind, diagnostic: String },
    #[error("failed to link shader program: {diagnostic}")]
    Link { diagnostic: String },
    #[error("failed to read shader at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ShaderError {
    fn link(diagnostic: impl Into<String>) -> Self {
        ShaderError::Link {
            diagnostic: diagnostic.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderOrigin {
    Bundled,
    Directory(PathBuf),
}

impl fmt::Display for ShaderOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderOrigin::Bundled => f.write_str("bundled"),
            ShaderOrigin::Directory(dir) => write!(f, "{}", dir.display()),
        }
    }
}

/// A vertex/fragment source pair plus where it came from.
#[derive(Debug, Clone)]
pub struct ShaderSources {
    pub vertex: String,
    pub fragment: String,
    pub origin: ShaderOrigin,
}

impl ShaderSources {
    /// Shader pair compiled into the binary.
    pub fn bundled() -> Self {
        Self {
            vertex: BUNDLED_VERTEX.to_string(),
            fragment: BUNDLED_FRAGMENT.to_string(),
            origin: ShaderOrigin::Bundled,
        }
    }

    /// Reads `shader.vert` and `shader.frag` from `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, ShaderError> {
        let read = |name: &str| {
            let path = dir.join(name);
            std::fs::read_to_string(&path).map_err(|source| ShaderError::Io { path, source })
        };
        Ok(Self {
            vertex: read(VERTEX_FILE)?,
            fragment: read(FRAGMENT_FILE)?,
            origin: ShaderOrigin::Directory(dir.to_path_buf()),
        })
    }
}

/// Parses and validates a single GLSL stage.
pub fn compile_stage(stage: StageKind, source: &str) -> Result<Module, ShaderError> {
    let mut frontend = glsl::Frontend::default();
    let options = glsl::Options::from(stage.naga_stage());
    let module = frontend
        .parse(&options, source)
        .map_err(|errors| ShaderError::Compile {
            stage,
            diagnostic: errors.emit_to_string(source),
        })?;

    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|error| ShaderError::Compile {
            stage,
            diagnostic: error.emit_to_string(source),
        })?;
    Ok(module)
}

/// Compiles both stages and reflects their combined interface without a GPU.
pub fn check_shaders(sources: &ShaderSources) -> Result<ProgramInterface, ShaderError> {
    let vertex = compile_stage(StageKind::Vertex, &sources.vertex)?;
    let fragment = compile_stage(StageKind::Fragment, &sources.fragment)?;
    ProgramInterface::reflect(&vertex, &fragment)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Float,
    Int,
    Uint,
}

/// Scalar or vector type of a uniform member or vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueType {
    pub scalar: ScalarType,
    pub components: u8,
}

impl ValueType {
    pub const FLOAT: Self = Self::new(ScalarType::Float, 1);
    pub const VEC2: Self = Self::new(ScalarType::Float, 2);
    pub const INT: Self = Self::new(ScalarType::Int, 1);

    pub const fn new(scalar: ScalarType, components: u8) -> Self {
        Self { scalar, components }
    }

    pub fn size(&self) -> usize {
        4 * self.components as usize
    }

    fn from_inner(inner: &TypeInner) -> Option<Self> {
        let (scalar, components) = match inner {
            TypeInner::Scalar(scalar) => (*scalar, 1),
            TypeInner::Vector { size, scalar } => (*scalar, vector_len(*size)),
            _ => return None,
        };
        if scalar.width != 4 {
            return None;
        }
        let kind = match scalar.kind {
            ScalarKind::Float => ScalarType::Float,
            ScalarKind::Sint => ScalarType::Int,
            ScalarKind::Uint => ScalarType::Uint,
            _ => return None,
        };
        Some(Self::new(kind, components))
    }
}

fn vector_len(size: VectorSize) -> u8 {
    match size {
        VectorSize::Bi => 2,
        VectorSize::Tri => 3,
        VectorSize::Quad => 4,
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (scalar, prefix) = match self.scalar {
            ScalarType::Float => ("float", ""),
            ScalarType::Int => ("int", "i"),
            ScalarType::Uint => ("uint", "u"),
        };
        if self.components == 1 {
            f.write_str(scalar)
        } else {
            write!(f, "{prefix}vec{}", self.components)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniformKind {
    /// Member of the uniform block at `offset` bytes.
    Value { ty: ValueType, offset: u32 },
    Texture { binding: u32 },
    Sampler { binding: u32 },
}

impl fmt::Display for UniformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniformKind::Value { ty, offset } => write!(f, "{ty} @ offset {offset}"),
            UniformKind::Texture { binding } => write!(f, "texture2D @ binding {binding}"),
            UniformKind::Sampler { binding } => write!(f, "sampler @ binding {binding}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformSlot {
    pub name: String,
    pub kind: UniformKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSlot {
    pub name: String,
    pub location: u32,
    pub ty: ValueType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    UniformBuffer { size: u32 },
    Texture,
    Sampler { comparison: bool },
}

/// One entry of the program's single bind group (set 0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingEntry {
    pub name: String,
    pub binding: u32,
    pub kind: BindingKind,
    pub visibility: wgpu::ShaderStages,
}

/// Everything the renderer needs to know about a linked shader pair.
#[derive(Debug, Clone, Default)]
pub struct ProgramInterface {
    pub uniforms: Vec<UniformSlot>,
    pub attributes: Vec<AttributeSlot>,
    pub bindings: Vec<BindingEntry>,
}

struct Declared {
    entry: BindingEntry,
    members: Vec<UniformSlot>,
}

impl ProgramInterface {
    /// Links a vertex and fragment module and enumerates their active slots.
    pub fn reflect(vertex: &Module, fragment: &Module) -> Result<Self, ShaderError> {
        let mut merged: BTreeMap<u32, Declared> = BTreeMap::new();
        for (stage, module) in [(StageKind::Vertex, vertex), (StageKind::Fragment, fragment)] {
            for declared in stage_resources(stage, module)? {
                match merged.get_mut(&declared.entry.binding) {
                    Some(existing) => {
                        if existing.entry.kind != declared.entry.kind
                            || existing.members != declared.members
                        {
                            return Err(ShaderError::link(format!(
                                "binding {} is declared differently by the vertex and fragment stages",
                                declared.entry.binding
                            )));
                        }
                        existing.entry.visibility |= declared.entry.visibility;
                    }
                    None => {
                        merged.insert(declared.entry.binding, declared);
                    }
                }
            }
        }

        let blocks = merged
            .values()
            .filter(|declared| matches!(declared.entry.kind, BindingKind::UniformBuffer { .. }))
            .count();
        if blocks > 1 {
            return Err(ShaderError::link(format!(
                "expected at most one uniform block, found {blocks}"
            )));
        }

        let mut uniforms: Vec<UniformSlot> = Vec::new();
        let mut bindings = Vec::with_capacity(merged.len());
        for declared in merged.into_values() {
            let direct = match declared.entry.kind {
                BindingKind::UniformBuffer { .. } => None,
                BindingKind::Texture => Some(UniformKind::Texture {
                    binding: declared.entry.binding,
                }),
                BindingKind::Sampler { .. } => Some(UniformKind::Sampler {
                    binding: declared.entry.binding,
                }),
            };
            let slots = declared.members.into_iter().chain(direct.map(|kind| UniformSlot {
                name: declared.entry.name.clone(),
                kind,
            }));
            for slot in slots {
                if slot.name.is_empty() {
                    continue;
                }
                if uniforms.iter().any(|existing| existing.name == slot.name) {
                    return Err(ShaderError::link(format!(
                        "uniform `{}` is declared more than once",
                        slot.name
                    )));
                }
                uniforms.push(slot);
            }
            bindings.push(declared.entry);
        }

        let attributes = vertex_attributes(vertex)?;
        link_varyings(vertex, fragment)?;

        Ok(Self {
            uniforms,
            attributes,
            bindings,
        })
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformSlot> {
        self.uniforms.iter().find(|slot| slot.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeSlot> {
        self.attributes.iter().find(|slot| slot.name == name)
    }

    pub fn uniform_block(&self) -> Option<&BindingEntry> {
        self.bindings
            .iter()
            .find(|entry| matches!(entry.kind, BindingKind::UniformBuffer { .. }))
    }
}

fn stage_resources(stage: StageKind, module: &Module) -> Result<Vec<Declared>, ShaderError> {
    let mut declared = Vec::new();
    for (_, global) in module.global_variables.iter() {
        let Some(resource) = global.binding.as_ref() else {
            continue;
        };
        if !matches!(global.space, AddressSpace::Uniform | AddressSpace::Handle) {
            continue;
        }
        let name = global.name.clone().unwrap_or_default();
        if resource.group != 0 {
            return Err(ShaderError::link(format!(
                "`{name}` uses descriptor set {}; only set 0 is supported",
                resource.group
            )));
        }

        let inner = &module.types[global.ty].inner;
        let (kind, members) = match (global.space, inner) {
            (AddressSpace::Uniform, TypeInner::Struct { members, span }) => {
                let slots = members
                    .iter()
                    .filter_map(|member| {
                        let name = member.name.clone()?;
                        let ty = ValueType::from_inner(&module.types[member.ty].inner);
                        if ty.is_none() {
                            tracing::debug!(%stage, member = %name, "skipping non-scalar uniform member");
                        }
                        Some(UniformSlot {
                            name,
                            kind: UniformKind::Value {
                                ty: ty?,
                                offset: member.offset,
                            },
                        })
                    })
                    .collect();
                (BindingKind::UniformBuffer { size: *span }, slots)
            }
            (AddressSpace::Handle, TypeInner::Image { .. }) => (BindingKind::Texture, Vec::new()),
            (AddressSpace::Handle, TypeInner::Sampler { comparison }) => (
                BindingKind::Sampler {
                    comparison: *comparison,
                },
                Vec::new(),
            ),
            _ => {
                return Err(ShaderError::link(format!(
                    "unsupported resource `{name}` at binding {} in the {stage} stage",
                    resource.binding
                )));
            }
        };

        declared.push(Declared {
            entry: BindingEntry {
                name,
                binding: resource.binding,
                kind,
                visibility: stage.wgpu_stages(),
            },
            members,
        });
    }
    Ok(declared)
}

struct Varying {
    name: String,
    location: u32,
    inner: TypeInner,
}

fn entry_point(module: &Module, stage: StageKind) -> Result<&wgpu::naga::Function, ShaderError> {
    module
        .entry_points
        .iter()
        .find(|entry| entry.stage == stage.naga_stage())
        .map(|entry| &entry.function)
        .ok_or_else(|| ShaderError::link(format!("{stage} shader has no entry point")))
}

fn location_of(binding: Option<&Binding>) -> Option<u32> {
    match binding {
        Some(Binding::Location { location, .. }) => Some(*location),
        _ => None,
    }
}

fn stage_inputs(module: &Module, stage: StageKind) -> Result<Vec<Varying>, ShaderError> {
    let function = entry_point(module, stage)?;
    Ok(function
        .arguments
        .iter()
        .filter_map(|argument| {
            let location = location_of(argument.binding.as_ref())?;
            Some(Varying {
                name: argument.name.clone().unwrap_or_default(),
                location,
                inner: module.types[argument.ty].inner.clone(),
            })
        })
        .collect())
}

fn stage_outputs(module: &Module, stage: StageKind) -> Result<Vec<Varying>, ShaderError> {
    let function = entry_point(module, stage)?;
    let Some(result) = function.result.as_ref() else {
        return Ok(Vec::new());
    };
    if let Some(location) = location_of(result.binding.as_ref()) {
        return Ok(vec![Varying {
            name: String::new(),
            location,
            inner: module.types[result.ty].inner.clone(),
        }]);
    }
    let TypeInner::Struct { members, .. } = &module.types[result.ty].inner else {
        return Ok(Vec::new());
    };
    Ok(members
        .iter()
        .filter_map(|member| {
            let location = location_of(member.binding.as_ref())?;
            Some(Varying {
                name: member.name.clone().unwrap_or_default(),
                location,
                inner: module.types[member.ty].inner.clone(),
            })
        })
        .collect())
}

fn vertex_attributes(vertex: &Module) -> Result<Vec<AttributeSlot>, ShaderError> {
    let mut attributes = Vec::new();
    // Built-ins carry no location and never reach this list.
    for input in stage_inputs(vertex, StageKind::Vertex)? {
        let ty = ValueType::from_inner(&input.inner).ok_or_else(|| {
            ShaderError::link(format!(
                "vertex attribute `{}` has an unsupported type",
                input.name
            ))
        })?;
        attributes.push(AttributeSlot {
            name: input.name,
            location: input.location,
            ty,
        });
    }
    attributes.sort_by_key(|attribute| attribute.location);
    Ok(attributes)
}

fn link_varyings(vertex: &Module, fragment: &Module) -> Result<(), ShaderError> {
    let outputs = stage_outputs(vertex, StageKind::Vertex)?;
    for input in stage_inputs(fragment, StageKind::Fragment)? {
        let Some(output) = outputs.iter().find(|output| output.location == input.location) else {
            return Err(ShaderError::link(format!(
                "fragment input `{}` at location {} is not written by the vertex shader",
                input.name, input.location
            )));
        };
        if output.inner != input.inner {
            return Err(ShaderError::link(format!(
                "fragment input `{}` at location {} does not match the type of vertex output `{}`",
                input.name, input.location, output.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABI_UNIFORMS: [&str; 9] = [
        "uTexture",
        "uScale",
        "uRotation",
        "uTranslation",
        "uOrigin",
        "uTime",
        "uSize",
        "uBoundary",
        "uLatticePoint",
    ];

    const PLAIN_VERTEX: &str = r"#version 450
layout(location = 0) in vec2 vertexPosition;
layout(location = 0) out vec2 vPosition;
void main() {
    vPosition = vertexPosition;
    gl_Position = vec4(vertexPosition, 0.0, 1.0);
}
";

    #[test]
    fn bundled_shaders_expose_full_abi() {
        let interface = check_shaders(&ShaderSources::bundled()).expect("bundled shaders link");
        for name in ABI_UNIFORMS {
            assert!(interface.uniform(name).is_some(), "missing uniform {name}");
        }

        let position = interface
            .attribute("vertexPosition")
            .expect("vertexPosition attribute");
        assert_eq!(position.location, 0);
        assert_eq!(position.ty, ValueType::VEC2);

        assert_eq!(
            interface.uniform("uScale").map(|slot| &slot.kind),
            Some(&UniformKind::Value {
                ty: ValueType::FLOAT,
                offset: 0
            })
        );
        assert!(matches!(
            interface.uniform("uTranslation").map(|slot| &slot.kind),
            Some(UniformKind::Value { ty, offset }) if *ty == ValueType::VEC2 && offset % 8 == 0
        ));
        assert!(matches!(
            interface.uniform("uBoundary").map(|slot| &slot.kind),
            Some(UniformKind::Value { ty, .. }) if *ty == ValueType::INT
        ));
        assert!(matches!(
            interface.uniform("uTexture").map(|slot| &slot.kind),
            Some(UniformKind::Texture { binding: 1 })
        ));
    }

    #[test]
    fn uniform_block_covers_every_member() {
        let interface = check_shaders(&ShaderSources::bundled()).expect("bundled shaders link");
        let block = interface.uniform_block().expect("uniform block");
        let BindingKind::UniformBuffer { size } = block.kind else {
            panic!("expected a uniform buffer");
        };
        for slot in &interface.uniforms {
            if let UniformKind::Value { ty, offset } = slot.kind {
                assert!(offset as usize + ty.size() <= size as usize, "{}", slot.name);
            }
        }
    }

    #[test]
    fn builtins_are_not_reflected() {
        let vertex = r"#version 450
layout(location = 0) in vec2 vertexPosition;
layout(location = 0) out vec2 vPosition;
void main() {
    vPosition = vertexPosition + vec2(float(gl_VertexIndex) * 0.0);
    gl_Position = vec4(vertexPosition, 0.0, 1.0);
}
";
        let fragment = r"#version 450
layout(location = 0) in vec2 vPosition;
layout(location = 0) out vec4 outColor;
void main() {
    outColor = vec4(vPosition, gl_FragCoord.x * 0.0, 1.0);
}
";
        let sources = ShaderSources {
            vertex: vertex.to_string(),
            fragment: fragment.to_string(),
            origin: ShaderOrigin::Bundled,
        };
        let interface = check_shaders(&sources).expect("built-in pair links");
        let names: Vec<&str> = interface
            .attributes
            .iter()
            .map(|attribute| attribute.name.as_str())
            .collect();
        assert_eq!(names, ["vertexPosition"]);
        assert!(interface.uniforms.is_empty());
    }

    #[test]
    fn syntax_error_is_a_compile_error_with_diagnostic() {
        let broken = r"#version 450
layout(location = 0) in vec2 vPosition;
layout(location = 0) out vec4 outColor;
void main() {
    outColor = vec4(undefinedThing, 1.0);
}
";
        let err = compile_stage(StageKind::Fragment, broken).unwrap_err();
        match err {
            ShaderError::Compile { stage, diagnostic } => {
                assert_eq!(stage, StageKind::Fragment);
                assert!(diagnostic.contains("undefinedThing"), "{diagnostic}");
            }
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[test]
    fn unmatched_fragment_input_is_a_link_error() {
        let fragment = r"#version 450
layout(location = 0) in vec2 vPosition;
layout(location = 1) in vec3 vNormal;
layout(location = 0) out vec4 outColor;
void main() {
    outColor = vec4(vNormal + vec3(vPosition, 0.0), 1.0);
}
";
        let sources = ShaderSources {
            vertex: PLAIN_VERTEX.to_string(),
            fragment: fragment.to_string(),
            origin: ShaderOrigin::Bundled,
        };
        let err = check_shaders(&sources).unwrap_err();
        assert!(matches!(err, ShaderError::Link { .. }), "{err:?}");
    }

    #[test]
    fn mismatched_varying_type_is_a_link_error() {
        let fragment = r"#version 450
layout(location = 0) in vec4 vPosition;
layout(location = 0) out vec4 outColor;
void main() {
    outColor = vPosition;
}
";
        let sources = ShaderSources {
            vertex: PLAIN_VERTEX.to_string(),
            fragment: fragment.to_string(),
            origin: ShaderOrigin::Bundled,
        };
        assert!(matches!(
            check_shaders(&sources),
            Err(ShaderError::Link { .. })
        ));
    }

    #[test]
    fn from_dir_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = ShaderSources::from_dir(dir.path()).unwrap_err();
        match err {
            ShaderError::Io { path, .. } => assert!(path.ends_with(VERTEX_FILE)),
            other => panic!("expected io error, got {other:?}"),
        }
    }

    #[test]
    fn from_dir_reads_pair() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(VERTEX_FILE), PLAIN_VERTEX).unwrap();
        std::fs::write(dir.path().join(FRAGMENT_FILE), "// fragment").unwrap();
        let sources = ShaderSources::from_dir(dir.path()).unwrap();
        assert_eq!(sources.vertex, PLAIN_VERTEX);
        assert_eq!(sources.fragment, "// fragment");
        assert_eq!(sources.origin, ShaderOrigin::Directory(dir.path().to_path_buf()));
    }

    #[test]
    fn value_type_names_read_like_glsl() {
        assert_eq!(ValueType::FLOAT.to_string(), "float");
        assert_eq!(ValueType::VEC2.to_string(), "vec2");
        assert_eq!(ValueType::new(ScalarType::Int, 3).to_string(), "ivec3");
    }
}
