//! Top-level frame driver
//!
//! [`Renderer`] ties the scene, the frame orchestrator and the external
//! collaborators together:
//!
//! ```text
//! initialize -> run_frame* (release/restore on resize) -> shutdown
//! ```
//!
//! Each `run_frame` advances the clock, animates tracked objects, updates the
//! camera transform, lets the UI edit settings, reacts to surface or vsync
//! changes and records one frame.

use std::time::{Duration, Instant};

use ash::vk;

use crate::assets::AssetLoader;
use crate::config::{RenderSettings, RendererConfig, SceneObjectConfig};
use crate::foundation::math::{radians, Mat4, Mat4Ext, Vec3};
use crate::foundation::time::FrameClock;
use crate::render::{
    FrameOrchestrator, FramePresenter, FrameStats, GpuDevice, GpuMesh, PipelineHandles, RenderError, RenderResult,
    UiOverlay,
};
use crate::scene::{ObjectId, Scene, Transform};

/// Scroll sensitivity applied by [`Renderer::update_scale_by_delta`]
pub const SCROLL_SENSITIVITY: f32 = 3.0;

/// An object the driver animates every frame
#[derive(Debug, Clone)]
struct TrackedObject {
    id: ObjectId,
    base: Transform,
    spin_degrees_per_second: f32,
}

/// Owner of the scene and frame loop for one device
pub struct Renderer<'ctx> {
    device: &'ctx dyn GpuDevice,
    presenter: Box<dyn FramePresenter + 'ctx>,
    ui: Box<dyn UiOverlay + 'ctx>,
    config: RendererConfig,
    settings: RenderSettings,
    scene: Scene,
    tracked: Vec<TrackedObject>,
    orchestrator: Option<FrameOrchestrator>,
    clock: FrameClock,
    stats: FrameStats,
}

impl<'ctx> Renderer<'ctx> {
    /// Build frame resources, create resolution-dependent targets and load the configured scene
    ///
    /// Any failure is a setup error: everything created so far is released
    /// before the error is returned.
    pub fn initialize(
        device: &'ctx dyn GpuDevice,
        mut presenter: Box<dyn FramePresenter + 'ctx>,
        ui: Box<dyn UiOverlay + 'ctx>,
        config: RendererConfig,
        pipelines: PipelineHandles,
        assets: &dyn AssetLoader,
    ) -> RenderResult<Self> {
        let mut settings = config.settings.clone();
        settings.sanitize();
        presenter.set_vsync(settings.vsync);

        let orchestrator = FrameOrchestrator::new(device, pipelines, presenter.frames_in_flight(), config.clear_color)?;
        let mut renderer = Self {
            device,
            presenter,
            ui,
            config,
            settings,
            scene: Scene::new(),
            tracked: Vec::new(),
            orchestrator: Some(orchestrator),
            clock: FrameClock::new(),
            stats: FrameStats::default(),
        };

        if let Err(e) = renderer.load_scene(assets) {
            log::error!("Renderer initialization failed: {}", e);
            if let Err(cleanup) = renderer.shutdown() {
                log::error!("Cleanup after failed initialization failed: {}", cleanup);
            }
            return Err(e);
        }

        log::info!(
            "Renderer initialized: {} object(s), {:?} antialiasing, vsync {}",
            renderer.tracked.len(),
            renderer.settings.antialiasing,
            renderer.settings.vsync
        );
        Ok(renderer)
    }

    fn load_scene(&mut self, assets: &dyn AssetLoader) -> RenderResult<()> {
        self.restore_resolution_dependent_resources()?;
        let objects = self.config.objects.clone();
        for object in &objects {
            self.add_object(assets, object)?;
        }
        Ok(())
    }

    /// Load, upload and start tracking one object
    pub fn add_object(&mut self, assets: &dyn AssetLoader, config: &SceneObjectConfig) -> RenderResult<ObjectId> {
        let mesh = assets.load_mesh(&config.mesh)?;
        let texture = assets.load_texture(&config.texture)?;

        let id = self.scene.create_object();
        if let Err(e) = self.populate_object(id, &mesh, &texture, config) {
            self.scene.destroy(id, self.device);
            return Err(e);
        }

        let base = Transform::new(config.position, config.pitch, config.yaw, config.roll, config.scale);
        if let Some(transform) = self.scene.get_transform_mut(id) {
            *transform = base.clone();
        }
        self.tracked.push(TrackedObject {
            id,
            base,
            spin_degrees_per_second: config.spin_degrees_per_second,
        });
        log::info!("Added object '{}' ({} triangles)", config.mesh, mesh.triangle_count());
        Ok(id)
    }

    fn populate_object(
        &mut self,
        id: ObjectId,
        mesh: &crate::render::Mesh,
        texture: &crate::assets::ImageData,
        config: &SceneObjectConfig,
    ) -> RenderResult<()> {
        let device = self.device;
        let gpu_mesh = GpuMesh::upload(device, mesh)?;
        let renderable = match self.scene.get_renderable_mut(id) {
            Some(renderable) => renderable,
            None => {
                let mut gpu_mesh = gpu_mesh;
                gpu_mesh.destroy(device);
                return Err(RenderError::InvalidOperation {
                    reason: "new object has no renderable".to_string(),
                });
            }
        };
        renderable.set_name(config.mesh.clone());
        renderable.set_mesh(device, gpu_mesh);
        let gpu_texture = device.create_texture(texture, &config.texture)?;
        renderable.set_texture(device, gpu_texture);
        Ok(())
    }

    /// Advance one frame using the wall clock
    pub fn run_frame(&mut self) -> RenderResult<()> {
        self.clock.tick_at(Instant::now(), self.settings.animate);
        self.update_and_draw()
    }

    /// Advance one frame by a fixed wall-clock delta
    pub fn run_frame_with_delta(&mut self, elapsed: Duration) -> RenderResult<()> {
        self.clock.advance(elapsed, self.settings.animate);
        self.update_and_draw()
    }

    fn update_and_draw(&mut self) -> RenderResult<()> {
        if self.orchestrator.is_none() {
            return Err(RenderError::InvalidOperation {
                reason: "run_frame called before initialize or after shutdown".to_string(),
            });
        }

        self.stats = FrameStats {
            frame_index: self.clock.frame_count(),
            delta_seconds: self.clock.delta_time(),
            fps: self.clock.current_fps(),
        };
        self.simulate();

        let old_vsync = self.settings.vsync;
        self.ui.build(&mut self.settings, &self.stats);
        self.settings.sanitize();

        let surface = self.presenter.surface_size();
        if surface.width == 0 || surface.height == 0 {
            log::trace!("Surface has zero area, skipping frame");
            return Ok(());
        }
        let current = self.orchestrator.as_ref().map(|o| o.targets().extent()).unwrap_or_default();
        if surface != current {
            log::info!(
                "Surface resized {}x{} -> {}x{}",
                current.width,
                current.height,
                surface.width,
                surface.height
            );
            self.rebuild_resolution_dependent_resources()?;
        }

        self.draw_frame().map_err(|e| {
            if e.is_device_loss() {
                log::error!("Device lost while recording frame: {}", e);
            } else {
                log::error!("Frame failed: {}", e);
            }
            e
        })?;

        if self.settings.vsync != old_vsync {
            log::info!("Vertical sync {}", if self.settings.vsync { "enabled" } else { "disabled" });
            self.presenter.set_vsync(self.settings.vsync);
            self.rebuild_resolution_dependent_resources()?;
        }
        Ok(())
    }

    /// Apply per-object animation and update the camera transform
    fn simulate(&mut self) {
        let sim_time = self.clock.sim_time() as f32;
        let scale = self.settings.scale;
        for tracked in &self.tracked {
            if let Some(transform) = self.scene.get_transform_mut(tracked.id) {
                transform.position = tracked.base.position;
                transform.pitch = tracked.base.pitch;
                transform.yaw = tracked.base.yaw + tracked.spin_degrees_per_second * sim_time;
                transform.roll = tracked.base.roll;
                transform.scale = tracked.base.scale * scale;
            }
        }

        let view_projection = self.view_projection();
        if let Some(orchestrator) = self.orchestrator.as_mut() {
            orchestrator.set_view_projection(&view_projection);
        }
    }

    /// Projection x view for the configured camera at the current surface aspect
    pub fn view_projection(&self) -> Mat4 {
        let camera = &self.config.camera;
        let extent = self.presenter.surface_size();
        let aspect = if extent.height > 0 {
            extent.width as f32 / extent.height as f32
        } else {
            1.0
        };
        let projection = Mat4::perspective(radians(camera.fov_y_degrees), aspect, camera.near, camera.far);
        let view = Mat4::look_at(camera.position, camera.target, Vec3::y());
        projection * Mat4::vulkan_coordinate_transform() * view
    }

    fn draw_frame(&mut self) -> RenderResult<()> {
        let Some(target) = self.presenter.begin_frame()? else {
            log::debug!("Presenter skipped frame");
            return Ok(());
        };
        let orchestrator = self.orchestrator.as_mut().ok_or(RenderError::ResourcesReleased)?;
        orchestrator.draw_frame(self.device, &target, &mut self.scene, &self.settings, self.ui.as_mut())?;
        self.presenter.end_frame(&target)
    }

    fn rebuild_resolution_dependent_resources(&mut self) -> RenderResult<()> {
        self.release_resolution_dependent_resources()?;
        self.presenter.recreate()?;
        self.restore_resolution_dependent_resources()?;
        self.clock.reset_delta();
        Ok(())
    }

    /// Wait for the device to go idle and destroy resolution-dependent targets
    pub fn release_resolution_dependent_resources(&mut self) -> RenderResult<()> {
        self.device.wait_idle()?;
        if let Some(orchestrator) = self.orchestrator.as_mut() {
            orchestrator.release(self.device);
        }
        Ok(())
    }

    /// Recreate resolution-dependent targets at the presenter's surface size
    pub fn restore_resolution_dependent_resources(&mut self) -> RenderResult<()> {
        let extent = self.presenter.surface_size();
        let format = self.presenter.color_format();
        match self.orchestrator.as_mut() {
            Some(orchestrator) => orchestrator.restore(self.device, extent, format),
            None => Err(RenderError::InvalidOperation {
                reason: "restore called after shutdown".to_string(),
            }),
        }
    }

    /// Scale all tracked objects by a scroll delta
    pub fn update_scale_by_delta(&mut self, delta: f32) {
        self.settings.update_scale_by_delta(delta, SCROLL_SENSITIVITY);
    }

    /// Current runtime settings
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Mutable runtime settings, read at the next frame
    pub fn settings_mut(&mut self) -> &mut RenderSettings {
        &mut self.settings
    }

    /// Scene being rendered
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Mutable scene access
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    /// Statistics of the last frame
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Frame orchestrator, `None` after shutdown
    pub fn orchestrator(&self) -> Option<&FrameOrchestrator> {
        self.orchestrator.as_ref()
    }

    /// Resolution of the current render targets
    pub fn render_extent(&self) -> vk::Extent2D {
        self.orchestrator
            .as_ref()
            .map(|o| o.targets().extent())
            .unwrap_or_default()
    }

    /// Objects animated by the driver
    pub fn tracked_objects(&self) -> Vec<ObjectId> {
        self.tracked.iter().map(|t| t.id).collect()
    }

    /// Destroy a tracked object and stop animating it
    pub fn destroy_object(&mut self, id: ObjectId) -> RenderResult<bool> {
        self.device.wait_idle()?;
        self.tracked.retain(|t| t.id != id);
        Ok(self.scene.destroy(id, self.device))
    }

    /// Wait for the device and release every resource; safe to call twice
    pub fn shutdown(&mut self) -> RenderResult<()> {
        let Some(mut orchestrator) = self.orchestrator.take() else {
            return Ok(());
        };
        let idle = self.device.wait_idle();
        self.scene.destroy_all(self.device);
        self.tracked.clear();
        orchestrator.destroy(self.device);
        log::info!("Renderer shut down after {} frame(s)", self.clock.frame_count());
        idle
    }
}

impl Drop for Renderer<'_> {
    fn drop(&mut self) {
        if self.orchestrator.is_some() {
            log::warn!("Renderer dropped without shutdown, releasing resources");
            if let Err(e) = self.shutdown() {
                log::error!("Shutdown during drop failed: {}", e);
            }
        }
    }
}
