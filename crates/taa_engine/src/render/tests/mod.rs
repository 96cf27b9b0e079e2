//! Multi-frame scenarios driven through the recording device


use ash::vk::{self, Handle};

use crate::assets::ImageData;
use crate::config::{RendererConfig, SceneObjectConfig};
use crate::render::{FrameOrchestrator, FrameTarget, GpuDevice, GpuMesh, UiOverlay};
use crate::scene::{ObjectId, Scene};
use crate::testing::{
    pipelines, triangle_strip, Command, PresenterControl, RecordingDevice, ScriptedPresenter, StaticAssets,
    SWAPCHAIN_FORMAT,
};
use crate::Renderer;

const EXTENT: vk::Extent2D = vk::Extent2D {
    width: 800,
    height: 600,
};
const FRAMES_IN_FLIGHT: usize = 2;
const MESH: &str = "strip.obj";
const TEXTURE: &str = "checker.png";

fn assets() -> StaticAssets {
    StaticAssets::new()
        .with_mesh(MESH, triangle_strip(10))
        .with_texture(TEXTURE, ImageData::solid_color(4, 4, [200, 200, 200, 255]))
}

fn object_config() -> SceneObjectConfig {
    SceneObjectConfig {
        mesh: MESH.to_string(),
        texture: TEXTURE.to_string(),
        ..SceneObjectConfig::default()
    }
}

fn config_with_objects(count: usize) -> RendererConfig {
    RendererConfig {
        objects: vec![object_config(); count],
        ..RendererConfig::default()
    }
}

fn start<'a>(
    device: &'a RecordingDevice,
    config: RendererConfig,
    ui: Box<dyn UiOverlay + 'a>,
) -> (Renderer<'a>, PresenterControl) {
    let (presenter, control) = ScriptedPresenter::new(EXTENT, FRAMES_IN_FLIGHT);
    let renderer = Renderer::initialize(device, Box::new(presenter), ui, config, pipelines(), &assets()).unwrap();
    (renderer, control)
}

fn orchestrator(device: &RecordingDevice) -> FrameOrchestrator {
    let mut orchestrator = FrameOrchestrator::new(device, pipelines(), FRAMES_IN_FLIGHT, [0.0; 4]).unwrap();
    orchestrator.restore(device, EXTENT, SWAPCHAIN_FORMAT).unwrap();
    orchestrator
}

fn frame_target(slot: usize) -> FrameTarget {
    FrameTarget {
        slot,
        image: vk::Image::from_raw(0xA000 + slot as u64),
        view: vk::ImageView::from_raw(0xB000 + slot as u64),
        extent: EXTENT,
        command_buffer: vk::CommandBuffer::from_raw(0xC000 + slot as u64),
    }
}

/// Object with a 10-triangle mesh and, optionally, a texture
fn add_object(scene: &mut Scene, device: &RecordingDevice, textured: bool) -> ObjectId {
    let id = scene.create_object();
    let renderable = scene.get_renderable_mut(id).unwrap();
    renderable.set_name("strip");
    renderable.set_mesh(device, GpuMesh::upload(device, &triangle_strip(10)).unwrap());
    if textured {
        let texture = device
            .create_texture(&ImageData::solid_color(2, 2, [255; 4]), TEXTURE)
            .unwrap();
        renderable.set_texture(device, texture);
    }
    id
}

fn barrier_names(commands: &[Command]) -> Vec<&'static str> {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::Barrier { transition, .. } => Some(*transition),
            _ => None,
        })
        .collect()
}
