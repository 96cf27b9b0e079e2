//! Test doubles for the GPU and collaborator seams

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use ash::vk::{self, Handle};

use crate::assets::{AssetError, AssetLoader, ImageData};
use crate::config::RenderSettings;
use crate::render::{
    Attachment, CommandEncoder, DescriptorResource, FramePresenter, FrameStats, FrameTarget, GpuBuffer, GpuDevice,
    GpuImage, ImageDesc, ImageTransition, Mesh, PipelineHandles, RenderError, RenderResult, RenderingInfo, UiOverlay,
    Vertex,
};

/// Device-level call observed by [`RecordingDevice`]
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateImage { image: vk::Image, name: &'static str, extent: vk::Extent2D },
    CreateTexture { image: vk::Image, name: String },
    DestroyImage(vk::Image),
    CreateBuffer { buffer: vk::Buffer, size: vk::DeviceSize },
    WriteBuffer { buffer: vk::Buffer, offset: vk::DeviceSize, len: usize },
    DestroyBuffer(vk::Buffer),
    WriteDescriptorSet { set: vk::DescriptorSet, bindings: Vec<(u32, DescriptorResource)> },
    WaitIdle,
    SubmitImmediate,
}

/// Command observed by [`RecordingEncoder`]
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Barrier { image: vk::Image, transition: &'static str },
    Copy { src: vk::Image, dst: vk::Image, extent: vk::Extent2D },
    BeginRendering { extent: vk::Extent2D, color: Vec<Attachment>, depth: Option<Attachment> },
    EndRendering,
    Viewport(vk::Extent2D),
    BindPipeline(vk::Pipeline),
    BindDescriptorSet { layout: vk::PipelineLayout, set_index: u32, set: vk::DescriptorSet, dynamic_offsets: Vec<u32> },
    PushDescriptorSet { layout: vk::PipelineLayout, set_index: u32, bindings: Vec<(u32, DescriptorResource)> },
    PushConstants { layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, data: Vec<u8> },
    BindVertexBuffer(vk::Buffer),
    BindIndexBuffer(vk::Buffer),
    DrawIndexed(u32),
}

/// Encoder appending every command to a shared log
#[derive(Debug, Clone, Default)]
pub struct RecordingEncoder {
    log: Rc<RefCell<Vec<Command>>>,
}

impl RecordingEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: Rc<RefCell<Vec<Command>>>) -> Self {
        Self { log }
    }

    pub fn commands(&self) -> Vec<Command> {
        self.log.borrow().clone()
    }

    pub fn indexed_draws(&self) -> Vec<u32> {
        indexed_draws(&self.log.borrow())
    }

    pub fn draw_count(&self) -> usize {
        self.indexed_draws().len()
    }

    fn push(&mut self, command: Command) {
        self.log.borrow_mut().push(command);
    }
}

pub fn indexed_draws(commands: &[Command]) -> Vec<u32> {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::DrawIndexed(count) => Some(*count),
            _ => None,
        })
        .collect()
}

impl CommandEncoder for RecordingEncoder {
    fn image_barrier(&mut self, image: vk::Image, _aspect: vk::ImageAspectFlags, transition: &ImageTransition) {
        self.push(Command::Barrier {
            image,
            transition: transition.name,
        });
    }

    fn copy_image(&mut self, src: vk::Image, dst: vk::Image, extent: vk::Extent2D) {
        self.push(Command::Copy { src, dst, extent });
    }

    fn begin_rendering(&mut self, info: &RenderingInfo<'_>) {
        self.push(Command::BeginRendering {
            extent: info.extent,
            color: info.color.to_vec(),
            depth: info.depth,
        });
    }

    fn end_rendering(&mut self) {
        self.push(Command::EndRendering);
    }

    fn set_viewport_and_scissor(&mut self, extent: vk::Extent2D) {
        self.push(Command::Viewport(extent));
    }

    fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.push(Command::BindPipeline(pipeline));
    }

    fn bind_descriptor_set(
        &mut self,
        layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
        dynamic_offsets: &[u32],
    ) {
        self.push(Command::BindDescriptorSet {
            layout,
            set_index,
            set,
            dynamic_offsets: dynamic_offsets.to_vec(),
        });
    }

    fn push_descriptor_set(&mut self, layout: vk::PipelineLayout, set_index: u32, bindings: &[(u32, DescriptorResource)]) {
        self.push(Command::PushDescriptorSet {
            layout,
            set_index,
            bindings: bindings.to_vec(),
        });
    }

    fn push_constants(&mut self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, data: &[u8]) {
        self.push(Command::PushConstants {
            layout,
            stages,
            data: data.to_vec(),
        });
    }

    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
        self.push(Command::BindVertexBuffer(buffer));
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer) {
        self.push(Command::BindIndexBuffer(buffer));
    }

    fn draw_indexed(&mut self, index_count: u32) {
        self.push(Command::DrawIndexed(index_count));
    }
}

#[derive(Default)]
struct DeviceState {
    next_handle: u64,
    calls: Vec<DeviceCall>,
    immediate: Vec<Command>,
    buffers: HashMap<vk::Buffer, Vec<u8>>,
    live_images: Vec<vk::Image>,
    images_until_failure: Option<usize>,
}

impl DeviceState {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

/// In-memory [`GpuDevice`] that fabricates handles and logs every call
pub struct RecordingDevice {
    state: RefCell<DeviceState>,
    frame_log: Rc<RefCell<Vec<Command>>>,
}

pub const UNIFORM_ALIGNMENT: vk::DeviceSize = 256;

impl RecordingDevice {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(DeviceState::default()),
            frame_log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.borrow().calls.clone()
    }

    pub fn descriptor_writes(&self) -> Vec<(vk::DescriptorSet, Vec<(u32, DescriptorResource)>)> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::WriteDescriptorSet { set, bindings } => Some((*set, bindings.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn created_buffer_count(&self) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| matches!(c, DeviceCall::CreateBuffer { .. }))
            .count()
    }

    /// Images created under `name`, in creation order
    pub fn created_images(&self, name: &str) -> Vec<vk::Image> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::CreateImage { image, name: n, .. } if *n == name => Some(*image),
                _ => None,
            })
            .collect()
    }

    pub fn wait_idle_count(&self) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| matches!(c, DeviceCall::WaitIdle))
            .count()
    }

    pub fn immediate_barriers(&self) -> Vec<(vk::Image, &'static str)> {
        self.state
            .borrow()
            .immediate
            .iter()
            .filter_map(|c| match c {
                Command::Barrier { image, transition } => Some((*image, *transition)),
                _ => None,
            })
            .collect()
    }

    /// Let `count` more image creations succeed, then fail
    pub fn fail_image_creation_after(&self, count: usize) {
        self.state.borrow_mut().images_until_failure = Some(count);
    }

    pub fn live_image_count(&self) -> usize {
        self.state.borrow().live_images.len()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    pub fn buffer_contents(&self, buffer: vk::Buffer) -> Vec<u8> {
        self.state.borrow().buffers.get(&buffer).cloned().unwrap_or_default()
    }

    /// Commands recorded through [`GpuDevice::encoder`] so far
    pub fn frame_commands(&self) -> Vec<Command> {
        self.frame_log.borrow().clone()
    }

    pub fn clear_frame_commands(&self) {
        self.frame_log.borrow_mut().clear();
    }

    fn new_image(&self, extent: vk::Extent2D, format: vk::Format, aspect: vk::ImageAspectFlags) -> RenderResult<GpuImage> {
        let mut state = self.state.borrow_mut();
        if let Some(remaining) = state.images_until_failure.as_mut() {
            if *remaining == 0 {
                return Err(RenderError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
            }
            *remaining -= 1;
        }
        let image = GpuImage {
            image: vk::Image::from_raw(state.handle()),
            view: vk::ImageView::from_raw(state.handle()),
            memory: vk::DeviceMemory::from_raw(state.handle()),
            extent,
            format,
            aspect,
        };
        state.live_images.push(image.image);
        Ok(image)
    }
}

impl GpuDevice for RecordingDevice {
    fn create_image(&self, desc: &ImageDesc) -> RenderResult<GpuImage> {
        let image = self.new_image(desc.extent, desc.format, desc.aspect)?;
        self.state.borrow_mut().calls.push(DeviceCall::CreateImage {
            image: image.image,
            name: desc.name,
            extent: desc.extent,
        });
        Ok(image)
    }

    fn create_texture(&self, data: &ImageData, name: &str) -> RenderResult<GpuImage> {
        let extent = vk::Extent2D {
            width: data.width,
            height: data.height,
        };
        let image = self.new_image(extent, vk::Format::R8G8B8A8_SRGB, vk::ImageAspectFlags::COLOR)?;
        self.state.borrow_mut().calls.push(DeviceCall::CreateTexture {
            image: image.image,
            name: name.to_string(),
        });
        Ok(image)
    }

    fn destroy_image(&self, image: &GpuImage) {
        let mut state = self.state.borrow_mut();
        state.live_images.retain(|i| *i != image.image);
        state.calls.push(DeviceCall::DestroyImage(image.image));
    }

    fn create_buffer(&self, size: vk::DeviceSize, _usage: vk::BufferUsageFlags) -> RenderResult<GpuBuffer> {
        let mut state = self.state.borrow_mut();
        let buffer = GpuBuffer {
            buffer: vk::Buffer::from_raw(state.handle()),
            memory: vk::DeviceMemory::from_raw(state.handle()),
            size,
        };
        state.buffers.insert(buffer.buffer, vec![0; size as usize]);
        state.calls.push(DeviceCall::CreateBuffer {
            buffer: buffer.buffer,
            size,
        });
        Ok(buffer)
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: vk::DeviceSize, data: &[u8]) -> RenderResult<()> {
        let mut state = self.state.borrow_mut();
        let contents = state
            .buffers
            .get_mut(&buffer.buffer)
            .ok_or_else(|| RenderError::InvalidOperation {
                reason: format!("write to unknown buffer {:?}", buffer.buffer),
            })?;
        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            return Err(RenderError::InvalidOperation {
                reason: format!("write {}..{} past end {}", start, end, contents.len()),
            });
        }
        contents[start..end].copy_from_slice(data);
        state.calls.push(DeviceCall::WriteBuffer {
            buffer: buffer.buffer,
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn destroy_buffer(&self, buffer: &GpuBuffer) {
        let mut state = self.state.borrow_mut();
        state.buffers.remove(&buffer.buffer);
        state.calls.push(DeviceCall::DestroyBuffer(buffer.buffer));
    }

    fn write_descriptor_set(&self, set: vk::DescriptorSet, bindings: &[(u32, DescriptorResource)]) {
        self.state.borrow_mut().calls.push(DeviceCall::WriteDescriptorSet {
            set,
            bindings: bindings.to_vec(),
        });
    }

    fn min_uniform_alignment(&self) -> vk::DeviceSize {
        UNIFORM_ALIGNMENT
    }

    fn wait_idle(&self) -> RenderResult<()> {
        self.state.borrow_mut().calls.push(DeviceCall::WaitIdle);
        Ok(())
    }

    fn submit_immediate(&self, record: &mut dyn FnMut(&mut dyn CommandEncoder)) -> RenderResult<()> {
        let mut encoder = RecordingEncoder::new();
        record(&mut encoder);
        let mut state = self.state.borrow_mut();
        state.immediate.extend(encoder.commands());
        state.calls.push(DeviceCall::SubmitImmediate);
        Ok(())
    }

    fn encoder(&self, _command_buffer: vk::CommandBuffer) -> Box<dyn CommandEncoder + '_> {
        Box::new(RecordingEncoder::with_log(self.frame_log.clone()))
    }
}

/// Observable state of a [`ScriptedPresenter`]
#[derive(Debug, Default)]
pub struct PresenterLog {
    pub begun: usize,
    pub ended: usize,
    pub recreated: usize,
    pub vsync: Vec<bool>,
    pub targets: Vec<FrameTarget>,
}

/// Handle for steering a boxed [`ScriptedPresenter`] from a test
#[derive(Clone)]
pub struct PresenterControl {
    pub size: Rc<Cell<vk::Extent2D>>,
    pub skip_next: Rc<Cell<bool>>,
    pub log: Rc<RefCell<PresenterLog>>,
}

pub const SWAPCHAIN_FORMAT: vk::Format = vk::Format::B8G8R8A8_SRGB;
const SWAPCHAIN_HANDLE_BASE: u64 = 1 << 40;

/// Presenter handing out fabricated swapchain images round-robin
pub struct ScriptedPresenter {
    control: PresenterControl,
    frames_in_flight: usize,
    next_frame: usize,
    generation: u64,
}

impl ScriptedPresenter {
    pub fn new(extent: vk::Extent2D, frames_in_flight: usize) -> (Self, PresenterControl) {
        let control = PresenterControl {
            size: Rc::new(Cell::new(extent)),
            skip_next: Rc::new(Cell::new(false)),
            log: Rc::new(RefCell::new(PresenterLog::default())),
        };
        let presenter = Self {
            control: control.clone(),
            frames_in_flight,
            next_frame: 0,
            generation: 0,
        };
        (presenter, control)
    }
}

impl FramePresenter for ScriptedPresenter {
    fn surface_size(&self) -> vk::Extent2D {
        self.control.size.get()
    }

    fn color_format(&self) -> vk::Format {
        SWAPCHAIN_FORMAT
    }

    fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    fn set_vsync(&mut self, enabled: bool) {
        self.control.log.borrow_mut().vsync.push(enabled);
    }

    fn begin_frame(&mut self) -> RenderResult<Option<FrameTarget>> {
        if self.control.skip_next.replace(false) {
            return Ok(None);
        }
        let slot = self.next_frame % self.frames_in_flight;
        self.next_frame += 1;
        let raw = SWAPCHAIN_HANDLE_BASE + self.generation * 16 + slot as u64;
        let target = FrameTarget {
            slot,
            image: vk::Image::from_raw(raw),
            view: vk::ImageView::from_raw(raw + 8),
            extent: self.control.size.get(),
            command_buffer: vk::CommandBuffer::from_raw(raw),
        };
        let mut log = self.control.log.borrow_mut();
        log.begun += 1;
        log.targets.push(target);
        Ok(Some(target))
    }

    fn end_frame(&mut self, _target: &FrameTarget) -> RenderResult<()> {
        self.control.log.borrow_mut().ended += 1;
        Ok(())
    }

    fn recreate(&mut self) -> RenderResult<()> {
        self.generation += 1;
        self.control.log.borrow_mut().recreated += 1;
        Ok(())
    }
}

/// Overlay that flips settings on request and counts recordings
#[derive(Default)]
pub struct ScriptedUi {
    pub toggle_vsync_on_frame: Option<u64>,
    pub recorded: Rc<Cell<usize>>,
}

impl UiOverlay for ScriptedUi {
    fn build(&mut self, settings: &mut RenderSettings, stats: &FrameStats) {
        if self.toggle_vsync_on_frame == Some(stats.frame_index) {
            settings.vsync = !settings.vsync;
        }
    }

    fn record(&mut self, _encoder: &mut dyn CommandEncoder, _extent: vk::Extent2D) {
        self.recorded.set(self.recorded.get() + 1);
    }
}

/// Asset loader serving in-memory meshes and textures
#[derive(Default)]
pub struct StaticAssets {
    meshes: HashMap<String, Mesh>,
    textures: HashMap<String, ImageData>,
}

impl StaticAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mesh(mut self, path: &str, mesh: Mesh) -> Self {
        self.meshes.insert(path.to_string(), mesh);
        self
    }

    pub fn with_texture(mut self, path: &str, image: ImageData) -> Self {
        self.textures.insert(path.to_string(), image);
        self
    }
}

impl AssetLoader for StaticAssets {
    fn load_mesh(&self, path: &str) -> Result<Mesh, AssetError> {
        self.meshes
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string())))
    }

    fn load_texture(&self, path: &str) -> Result<ImageData, AssetError> {
        self.textures
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string())))
    }
}

/// Triangle strip of `triangles` triangles as an indexed list
pub fn triangle_strip(triangles: u32) -> Mesh {
    let columns = triangles / 2 + 1;
    let vertices = (0..=columns)
        .flat_map(|i| {
            let x = i as f32;
            [
                Vertex::new([x, 0.0, 0.0], [0.0, 0.0, 1.0], [x, 0.0]),
                Vertex::new([x, 1.0, 0.0], [0.0, 0.0, 1.0], [x, 1.0]),
            ]
        })
        .collect();
    let indices = (0..triangles)
        .flat_map(|t| {
            if t % 2 == 0 {
                [t, t + 1, t + 2]
            } else {
                [t + 1, t, t + 2]
            }
        })
        .collect();
    Mesh::new(vertices, indices)
}

/// Pipeline handles with recognizable fabricated values
pub fn pipelines() -> PipelineHandles {
    PipelineHandles {
        geometry: vk::Pipeline::from_raw(0x9001),
        geometry_layout: vk::PipelineLayout::from_raw(0x9002),
        frame_set: vk::DescriptorSet::from_raw(0x9003),
        post_process: vk::Pipeline::from_raw(0x9004),
        post_process_layout: vk::PipelineLayout::from_raw(0x9005),
        post_process_set: vk::DescriptorSet::from_raw(0x9006),
        linear_sampler: vk::Sampler::from_raw(0x9007),
    }
}
