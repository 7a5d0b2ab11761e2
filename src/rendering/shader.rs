use std::path::{Path, PathBuf};

use super::gfx::{
    GraphicsContext,
    GraphicsError,
    ProgramId,
    UniformValue,
    VertexLayout
};

const TYPE_TAG: &str = "#type";

#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("Could not read shader '{path}', reason='{source}'")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Expected two '#type' sections, found {0}")]
    MissingTypeTag(usize),

    #[error("Expected exactly two '#type' sections, found {0}")]
    TooManyTypeTags(usize),

    #[error("Unexpected shader type '{0}'")]
    UnknownShaderType(String),

    #[error("Shader stage '{0}' declared twice")]
    DuplicateStage(&'static str),

    #[error("GraphicsError, reason='{0}'")]
    Graphics(#[from] GraphicsError),
}

/// Vertex and fragment stages split out of a single `#type`-tagged source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub vertex: String,
    pub fragment: String,
}

impl ShaderSource {
    /// Splits `source` into its two stages. Each stage starts on the line after
    /// its `#type <kind>` tag and runs up to the next tag.
    pub fn parse(source: &str) -> Result<Self, ShaderError> {
        let tags: Vec<usize> = source.match_indices(TYPE_TAG)
            .map(|(index, _)| index)
            .filter(|&index| source[index + TYPE_TAG.len()..].starts_with([' ', '\t']))
            .collect();

        if tags.len() < 2 {
            return Err(ShaderError::MissingTypeTag(tags.len()));
        }
        if tags.len() > 2 {
            return Err(ShaderError::TooManyTypeTags(tags.len()));
        }

        let mut vertex = None;
        let mut fragment = None;

        for (n, &tag_start) in tags.iter().enumerate() {
            let section_end = tags.get(n + 1).copied().unwrap_or(source.len());
            let section = &source[tag_start + TYPE_TAG.len()..section_end];

            let (tag_line, body) = match section.find('\n') {
                Some(eol) => (&section[..eol], &section[eol + 1..]),
                None => (section, ""),
            };

            match tag_line.trim() {
                "vertex" => {
                    if vertex.replace(body.to_string()).is_some() {
                        return Err(ShaderError::DuplicateStage("vertex"));
                    }
                },
                "fragment" => {
                    if fragment.replace(body.to_string()).is_some() {
                        return Err(ShaderError::DuplicateStage("fragment"));
                    }
                },
                other => return Err(ShaderError::UnknownShaderType(other.to_string())),
            }
        }

        match (vertex, fragment) {
            (Some(vertex), Some(fragment)) => Ok(Self { vertex, fragment }),
            // Two tags of which none duplicated means both stages are present.
            _ => Err(ShaderError::MissingTypeTag(tags.len())),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ShaderError> {
        let source = std::fs::read_to_string(path)
            .map_err(|source| ShaderError::Io { path: path.to_path_buf(), source })?;
        Self::parse(&source)
    }
}

/// Compiled shader program.
///
/// [`Shader::use_program`] and [`Shader::detach`] only reach the graphics
/// context when its bound program actually changes.
#[derive(Debug)]
pub struct Shader {
    name: String,
    source: ShaderSource,
    program: ProgramId,
}

impl Shader {
    pub fn compile<S: AsRef<str>>(gfx: &mut dyn GraphicsContext, name: S, source: ShaderSource, layout: &VertexLayout) -> Result<Self, ShaderError> {
        let program = gfx.compile_program(&source.vertex, &source.fragment, layout)?;
        log::debug!("Shader '{}' compiled as {:?}", name.as_ref(), program);
        Ok(Self {
            name: name.as_ref().to_string(),
            source,
            program
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &ShaderSource {
        &self.source
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn is_in_use(&self, gfx: &dyn GraphicsContext) -> bool {
        gfx.bound_program() == Some(self.program)
    }

    pub fn use_program(&self, gfx: &mut dyn GraphicsContext) -> Result<(), ShaderError> {
        if !self.is_in_use(gfx) {
            gfx.use_program(self.program)?;
        }
        Ok(())
    }

    pub fn detach(&self, gfx: &mut dyn GraphicsContext) {
        if self.is_in_use(gfx) {
            gfx.detach_program();
        }
    }

    pub fn upload_mat4(&self, gfx: &mut dyn GraphicsContext, name: &str, matrix: &glam::Mat4) -> Result<(), ShaderError> {
        self.upload(gfx, name, UniformValue::Mat4(matrix.to_cols_array()))
    }

    pub fn upload_vec2(&self, gfx: &mut dyn GraphicsContext, name: &str, value: glam::Vec2) -> Result<(), ShaderError> {
        self.upload(gfx, name, UniformValue::Vec2(value.to_array()))
    }

    pub fn upload_vec3(&self, gfx: &mut dyn GraphicsContext, name: &str, value: glam::Vec3) -> Result<(), ShaderError> {
        self.upload(gfx, name, UniformValue::Vec3(value.to_array()))
    }

    pub fn upload_vec4(&self, gfx: &mut dyn GraphicsContext, name: &str, value: glam::Vec4) -> Result<(), ShaderError> {
        self.upload(gfx, name, UniformValue::Vec4(value.to_array()))
    }

    pub fn upload_float(&self, gfx: &mut dyn GraphicsContext, name: &str, value: f32) -> Result<(), ShaderError> {
        self.upload(gfx, name, UniformValue::Float(value))
    }

    pub fn upload_int(&self, gfx: &mut dyn GraphicsContext, name: &str, value: i32) -> Result<(), ShaderError> {
        self.upload(gfx, name, UniformValue::Int(value))
    }

    pub fn upload_int_array(&self, gfx: &mut dyn GraphicsContext, name: &str, values: &[i32]) -> Result<(), ShaderError> {
        self.upload(gfx, name, UniformValue::IntArray(values.to_vec()))
    }

    fn upload(&self, gfx: &mut dyn GraphicsContext, name: &str, value: UniformValue) -> Result<(), ShaderError> {
        // Uniform uploads target the active program.
        self.use_program(gfx)?;
        gfx.set_uniform(self.program, name, &value)?;
        Ok(())
    }

    pub fn release(&self, gfx: &mut dyn GraphicsContext) {
        self.detach(gfx);
        gfx.release_program(self.program);
    }
}

#[cfg(test)]
use super::headless::{GpuCommand, HeadlessContext};

#[cfg(test)]
const TEST_LAYOUT: VertexLayout = VertexLayout { stride: 36, attributes: &[] };

#[test]
fn test_parse_splits_stages() {
    let source = ShaderSource::parse("#type vertex\nA\n#type fragment\nB\n").unwrap();
    assert_eq!(source.vertex, "A\n");
    assert_eq!(source.fragment, "B\n");
}

#[test]
fn test_parse_accepts_fragment_first() {
    let source = ShaderSource::parse("#type fragment\nfrag\n#type   vertex\nvert\n").unwrap();
    assert_eq!(source.vertex, "vert\n");
    assert_eq!(source.fragment, "frag\n");
}

#[test]
fn test_parse_single_tag_fails() {
    let result = ShaderSource::parse("#type vertex\nA\n");
    assert!(matches!(result, Err(ShaderError::MissingTypeTag(1))));
}

#[test]
fn test_parse_without_tags_fails() {
    assert!(matches!(ShaderSource::parse("void main() {}"), Err(ShaderError::MissingTypeTag(0))));
}

#[test]
fn test_parse_unknown_kind_fails() {
    let result = ShaderSource::parse("#type vertex\nA\n#type geometry\nB\n");
    assert!(matches!(result, Err(ShaderError::UnknownShaderType(kind)) if kind == "geometry"));
}

#[test]
fn test_parse_duplicate_stage_fails() {
    let result = ShaderSource::parse("#type vertex\nA\n#type vertex\nB\n");
    assert!(matches!(result, Err(ShaderError::DuplicateStage("vertex"))));
}

#[test]
fn test_parse_three_tags_fails() {
    let result = ShaderSource::parse("#type vertex\nA\n#type fragment\nB\n#type fragment\nC\n");
    assert!(matches!(result, Err(ShaderError::TooManyTypeTags(3))));
}

#[test]
fn test_use_is_idempotent() {
    let mut gfx = HeadlessContext::new();
    let source = ShaderSource::parse("#type vertex\nA\n#type fragment\nB\n").unwrap();
    let shader = Shader::compile(&mut gfx, "test", source, &TEST_LAYOUT).unwrap();

    shader.use_program(&mut gfx).unwrap();
    shader.use_program(&mut gfx).unwrap();
    assert_eq!(gfx.count_commands(|c| matches!(c, GpuCommand::UseProgram { .. })), 1);

    shader.detach(&mut gfx);
    shader.detach(&mut gfx);
    assert_eq!(gfx.count_commands(|c| matches!(c, GpuCommand::DetachProgram)), 1);

    shader.use_program(&mut gfx).unwrap();
    assert_eq!(gfx.count_commands(|c| matches!(c, GpuCommand::UseProgram { .. })), 2);
}

#[test]
fn test_uniform_upload_binds_program_once() {
    let mut gfx = HeadlessContext::new();
    let source = ShaderSource::parse("#type vertex\nA\n#type fragment\nB\n").unwrap();
    let shader = Shader::compile(&mut gfx, "test", source, &TEST_LAYOUT).unwrap();

    shader.upload_mat4(&mut gfx, "uProjection", &glam::Mat4::IDENTITY).unwrap();
    shader.upload_int_array(&mut gfx, "uTextures", &[0, 1, 2]).unwrap();
    shader.upload_float(&mut gfx, "uTime", 0.5).unwrap();

    assert!(shader.is_in_use(&gfx));
    assert_eq!(gfx.count_commands(|c| matches!(c, GpuCommand::UseProgram { .. })), 1);
    assert!(gfx.commands().contains(&GpuCommand::SetUniform {
        program: shader.program(),
        name: "uTextures".to_string(),
        value: UniformValue::IntArray(vec![0, 1, 2])
    }));
}

#[test]
fn test_interleaved_shaders_rebind() {
    let mut gfx = HeadlessContext::new();
    let first = Shader::compile(&mut gfx, "first", ShaderSource::parse("#type vertex\nA\n#type fragment\nB\n").unwrap(), &TEST_LAYOUT).unwrap();
    let second = Shader::compile(&mut gfx, "second", ShaderSource::parse("#type vertex\nC\n#type fragment\nD\n").unwrap(), &TEST_LAYOUT).unwrap();

    first.use_program(&mut gfx).unwrap();
    second.use_program(&mut gfx).unwrap();
    first.use_program(&mut gfx).unwrap();

    assert_eq!(gfx.bound_program(), Some(first.program()));
    assert!(!second.is_in_use(&gfx));
    assert_eq!(gfx.count_commands(|c| matches!(c, GpuCommand::UseProgram { .. })), 3);

    // detaching a shader that is no longer bound leaves the other one alone
    second.detach(&mut gfx);
    assert_eq!(gfx.bound_program(), Some(first.program()));
    assert_eq!(gfx.count_commands(|c| matches!(c, GpuCommand::DetachProgram)), 0);
}
