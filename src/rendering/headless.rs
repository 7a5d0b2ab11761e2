use std::collections::HashMap;

use crate::game::math::Color;

use super::gfx::{
    BufferId,
    GraphicsContext,
    GraphicsError,
    ProgramId,
    TextureId,
    UniformValue,
    VertexLayout,
    MAX_TEXTURE_UNIT
};

/// Every call made against a [`HeadlessContext`], in order.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    BeginFrame,
    EndFrame,
    CreateVertexBuffer { buffer: BufferId, size_bytes: u64 },
    CreateIndexBuffer { buffer: BufferId, index_count: usize },
    UploadVertices { buffer: BufferId, offset_bytes: u64, len: usize },
    CreateTexture { texture: TextureId, width: u32, height: u32 },
    BindTexture { unit: u32, texture: TextureId },
    UnbindTexture { unit: u32 },
    CompileProgram { program: ProgramId },
    UseProgram { program: ProgramId },
    DetachProgram,
    SetUniform { program: ProgramId, name: String, value: UniformValue },
    DrawIndexed { vertex_buffer: BufferId, index_buffer: BufferId, index_count: u32 },
    ReleaseBuffer { buffer: BufferId },
    ReleaseTexture { texture: TextureId },
    ReleaseProgram { program: ProgramId },
}

#[derive(Debug)]
enum BufferData {
    Vertex(Vec<u8>),
    Index(Vec<u32>),
}

/// In-memory [`GraphicsContext`]. Validates ids and bounds like a real
/// device would and keeps buffer contents so they can be inspected.
#[derive(Debug, Default)]
pub struct HeadlessContext {
    commands: Vec<GpuCommand>,
    buffers: HashMap<BufferId, BufferData>,
    textures: HashMap<TextureId, (u32, u32)>,
    programs: HashMap<ProgramId, VertexLayout>,
    bound_program: Option<ProgramId>,
    next_id: u32,
    frame_active: bool,
    frames: u64,
}

impl HeadlessContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn draw_calls(&self) -> usize {
        self.commands.iter()
            .filter(|c| matches!(c, GpuCommand::DrawIndexed { .. }))
            .count()
    }

    pub fn count_commands<F: Fn(&GpuCommand) -> bool>(&self, predicate: F) -> usize {
        self.commands.iter().filter(|c| predicate(c)).count()
    }

    pub fn vertex_data(&self, buffer: BufferId) -> Option<&[u8]> {
        match self.buffers.get(&buffer) {
            Some(BufferData::Vertex(data)) => Some(data),
            _ => None,
        }
    }

    pub fn index_data(&self, buffer: BufferId) -> Option<&[u32]> {
        match self.buffers.get(&buffer) {
            Some(BufferData::Index(data)) => Some(data),
            _ => None,
        }
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl GraphicsContext for HeadlessContext {
    fn begin_frame(&mut self, _clear_color: Color) -> Result<(), GraphicsError> {
        self.frame_active = true;
        self.commands.push(GpuCommand::BeginFrame);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), GraphicsError> {
        if !self.frame_active {
            return Err(GraphicsError::NoActiveFrame);
        }
        self.frame_active = false;
        self.frames += 1;
        self.commands.push(GpuCommand::EndFrame);
        Ok(())
    }

    fn resize(&mut self, _width: u32, _height: u32) {}

    fn create_vertex_buffer(&mut self, size_bytes: u64, _layout: &VertexLayout) -> Result<BufferId, GraphicsError> {
        let buffer = BufferId(self.allocate_id());
        self.buffers.insert(buffer, BufferData::Vertex(vec![0; size_bytes as usize]));
        self.commands.push(GpuCommand::CreateVertexBuffer { buffer, size_bytes });
        Ok(buffer)
    }

    fn create_index_buffer(&mut self, indices: &[u32]) -> Result<BufferId, GraphicsError> {
        let buffer = BufferId(self.allocate_id());
        self.buffers.insert(buffer, BufferData::Index(indices.to_vec()));
        self.commands.push(GpuCommand::CreateIndexBuffer { buffer, index_count: indices.len() });
        Ok(buffer)
    }

    fn upload_vertices(&mut self, buffer: BufferId, offset_bytes: u64, data: &[u8]) -> Result<(), GraphicsError> {
        let Some(BufferData::Vertex(storage)) = self.buffers.get_mut(&buffer) else {
            return Err(GraphicsError::UnknownBuffer(buffer));
        };

        let start = offset_bytes as usize;
        let end = start + data.len();
        if end > storage.len() {
            return Err(GraphicsError::UploadOutOfBounds {
                offset: offset_bytes,
                len: data.len() as u64,
                capacity: storage.len() as u64
            });
        }
        storage[start..end].copy_from_slice(data);

        self.commands.push(GpuCommand::UploadVertices { buffer, offset_bytes, len: data.len() });
        Ok(())
    }

    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureId, GraphicsError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(GraphicsError::TextureDataSize { expected, actual: rgba.len() });
        }

        let texture = TextureId(self.allocate_id());
        self.textures.insert(texture, (width, height));
        self.commands.push(GpuCommand::CreateTexture { texture, width, height });
        Ok(texture)
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) -> Result<(), GraphicsError> {
        if unit > MAX_TEXTURE_UNIT {
            return Err(GraphicsError::InvalidTextureUnit(unit));
        }
        if !self.textures.contains_key(&texture) {
            return Err(GraphicsError::UnknownTexture(texture));
        }
        self.commands.push(GpuCommand::BindTexture { unit, texture });
        Ok(())
    }

    fn unbind_texture(&mut self, unit: u32) {
        self.commands.push(GpuCommand::UnbindTexture { unit });
    }

    fn compile_program(&mut self, vertex_source: &str, fragment_source: &str, layout: &VertexLayout) -> Result<ProgramId, GraphicsError> {
        if vertex_source.trim().is_empty() || fragment_source.trim().is_empty() {
            return Err(GraphicsError::ProgramCompile("empty shader stage".to_string()));
        }

        let program = ProgramId(self.allocate_id());
        self.programs.insert(program, *layout);
        self.commands.push(GpuCommand::CompileProgram { program });
        Ok(program)
    }

    fn use_program(&mut self, program: ProgramId) -> Result<(), GraphicsError> {
        if !self.programs.contains_key(&program) {
            return Err(GraphicsError::UnknownProgram(program));
        }
        self.bound_program = Some(program);
        self.commands.push(GpuCommand::UseProgram { program });
        Ok(())
    }

    fn detach_program(&mut self) {
        self.bound_program = None;
        self.commands.push(GpuCommand::DetachProgram);
    }

    fn bound_program(&self) -> Option<ProgramId> {
        self.bound_program
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: &UniformValue) -> Result<(), GraphicsError> {
        if !self.programs.contains_key(&program) {
            return Err(GraphicsError::UnknownProgram(program));
        }
        self.commands.push(GpuCommand::SetUniform {
            program,
            name: name.to_string(),
            value: value.clone()
        });
        Ok(())
    }

    fn draw_indexed(&mut self, vertex_buffer: BufferId, index_buffer: BufferId, index_count: u32) -> Result<(), GraphicsError> {
        if self.bound_program.is_none() {
            return Err(GraphicsError::NoProgramBound);
        }
        if !matches!(self.buffers.get(&vertex_buffer), Some(BufferData::Vertex(_))) {
            return Err(GraphicsError::UnknownBuffer(vertex_buffer));
        }
        let Some(BufferData::Index(indices)) = self.buffers.get(&index_buffer) else {
            return Err(GraphicsError::UnknownBuffer(index_buffer));
        };
        if index_count as usize > indices.len() {
            return Err(GraphicsError::IndexOutOfBounds {
                buffer: index_buffer,
                requested: index_count,
                available: indices.len() as u64
            });
        }

        log::trace!("Headless draw of {index_count} indices from {vertex_buffer:?}");
        self.commands.push(GpuCommand::DrawIndexed { vertex_buffer, index_buffer, index_count });
        Ok(())
    }

    fn release_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
        self.commands.push(GpuCommand::ReleaseBuffer { buffer });
    }

    fn release_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.commands.push(GpuCommand::ReleaseTexture { texture });
    }

    fn release_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.bound_program == Some(program) {
            self.bound_program = None;
        }
        self.commands.push(GpuCommand::ReleaseProgram { program });
    }
}

#[test]
fn test_upload_out_of_bounds_is_rejected() {
    let mut gfx = HeadlessContext::new();
    const LAYOUT: VertexLayout = VertexLayout { stride: 4, attributes: &[] };
    let buffer = gfx.create_vertex_buffer(8, &LAYOUT).unwrap();

    assert!(gfx.upload_vertices(buffer, 4, &[1, 2, 3, 4]).is_ok());
    assert!(matches!(
        gfx.upload_vertices(buffer, 6, &[1, 2, 3, 4]),
        Err(GraphicsError::UploadOutOfBounds { offset: 6, len: 4, capacity: 8 })
    ));
    assert_eq!(gfx.vertex_data(buffer).unwrap(), &[0, 0, 0, 0, 1, 2, 3, 4]);
}

#[test]
fn test_draw_without_program_fails() {
    let mut gfx = HeadlessContext::new();
    const LAYOUT: VertexLayout = VertexLayout { stride: 4, attributes: &[] };
    let vertices = gfx.create_vertex_buffer(16, &LAYOUT).unwrap();
    let indices = gfx.create_index_buffer(&[0, 1, 2]).unwrap();

    assert!(matches!(gfx.draw_indexed(vertices, indices, 3), Err(GraphicsError::NoProgramBound)));
    assert_eq!(gfx.draw_calls(), 0);
}

#[test]
fn test_texture_size_is_validated() {
    let mut gfx = HeadlessContext::new();
    assert!(gfx.create_texture(2, 2, &[255; 16]).is_ok());
    assert!(matches!(
        gfx.create_texture(2, 2, &[255; 12]),
        Err(GraphicsError::TextureDataSize { expected: 16, actual: 12 })
    ));
}

#[test]
fn test_draw_past_stored_indices_fails() {
    let mut gfx = HeadlessContext::new();
    const LAYOUT: VertexLayout = VertexLayout { stride: 4, attributes: &[] };
    let vertices = gfx.create_vertex_buffer(16, &LAYOUT).unwrap();
    let indices = gfx.create_index_buffer(&[0, 1, 2, 2, 3, 0]).unwrap();
    let program = gfx.compile_program("v", "f", &LAYOUT).unwrap();
    gfx.use_program(program).unwrap();

    assert!(gfx.draw_indexed(vertices, indices, 6).is_ok());
    assert!(matches!(
        gfx.draw_indexed(vertices, indices, 7),
        Err(GraphicsError::IndexOutOfBounds { requested: 7, available: 6, .. })
    ));
    assert_eq!(gfx.draw_calls(), 1);
}
