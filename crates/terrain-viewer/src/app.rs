use crate::{
    camera::{CameraController, OrbitCamera},
    config::Config,
    data::Dataset,
    renderer::{pipelines::terrain::TerrainGpu, Renderer},
    ui::{self, HudInfo, TerrainPanel},
};
use anyhow::{anyhow, Result};
use geoclipmap::{GeoTransform, RasterSource, Terrain, TerrainFollow, WorldOrigin};
use std::sync::Arc;
use std::time::Instant;
use winit::{event::WindowEvent, window::Window};

/// Longest frame fed to the ground-follow spring.
const MAX_FOLLOW_DT: f32 = 0.1;

pub struct App {
    pub renderer: Renderer,
    pub camera: OrbitCamera,
    pub camera_controller: CameraController,
    pub egui_ctx: egui::Context,
    pub egui_state: egui_winit::State,
    /// The session's single world origin; every raster is re-centred on it.
    pub origin: WorldOrigin,
    terrain: Option<Terrain<TerrainGpu>>,
    follow: TerrainFollow,
    panel: TerrainPanel,
    dataset_name: String,
    last_frame: Instant,
    frame_ms: f32,
}

impl App {
    pub async fn new(window: Arc<Window>, config: Config) -> Result<Self> {
        let dataset = Dataset::load(&config)?;
        log::info!(
            "Dataset '{}': DEM {}x{} @ {:?} m, image {}x{} @ {:?} m",
            dataset.name,
            dataset.dem.cols(),
            dataset.dem.rows(),
            dataset.dem.pixel_scale(),
            dataset.image.cols(),
            dataset.image.rows(),
            dataset.image.pixel_scale()
        );

        let mut origin = WorldOrigin::new();
        origin.establish_from(&dataset.dem, &dataset.image, config.height_bias);

        let mut renderer = Renderer::new(window.clone()).await?;

        let clipmap = config.clipmap();
        let levels = clipmap.levels;
        let terrain = Terrain::new(
            &dataset.dem,
            &dataset.image,
            &origin,
            clipmap,
            &mut renderer.terrain,
        )?;
        renderer.terrain.upload_geometry(terrain.geometry(), levels);

        // Start over the middle of the DEM, far enough out to see most of it.
        let dem_bounds = GeoTransform::of(&dataset.dem).bounds();
        let center = origin
            .to_local_xy(dem_bounds.center())
            .ok_or_else(|| anyhow!("world origin not established"))?;
        let ground = terrain.elevation_at(center).unwrap_or(0.0) * terrain.vertical_exaggeration();
        let extent = dem_bounds.size().max_element() as f32;
        let camera = OrbitCamera::new(
            center.extend(ground),
            (extent * 0.75).max(100.0),
            renderer.gfx.aspect(),
        );
        let camera_controller = CameraController::new();

        let egui_ctx = egui::Context::default();
        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui_ctx.viewport_id(),
            &*window,
            None,
            None,
        );

        let panel = TerrainPanel {
            vertical_exaggeration: terrain.vertical_exaggeration(),
            alpha: terrain.alpha(),
            follow_ground: true,
        };

        Ok(Self {
            renderer,
            camera,
            camera_controller,
            egui_ctx,
            egui_state,
            origin,
            terrain: Some(terrain),
            follow: TerrainFollow::default(),
            panel,
            dataset_name: dataset.name,
            last_frame: Instant::now(),
            frame_ms: 0.0,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.renderer.resize(new_size);
            self.camera.aspect = self.renderer.gfx.aspect();
        }
    }

    pub fn handle_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        let response = self.egui_state.on_window_event(window, event);
        if response.consumed {
            return true;
        }

        self.camera_controller.handle_event(event, &mut self.camera);

        if let WindowEvent::Resized(physical_size) = event {
            self.resize(*physical_size);
        }

        false
    }

    /// Waits for the GPU to finish the last frame and drops the terrain.
    pub fn shutdown(&mut self) {
        if let Some(terrain) = self.terrain.take() {
            terrain.shutdown(&mut self.renderer.terrain);
        }
    }

    pub fn render(&mut self, window: &Window) -> Result<(), wgpu::SurfaceError> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.frame_ms = dt * 1000.0;

        let Some(terrain) = self.terrain.as_mut() else {
            return Ok(());
        };

        let ground = terrain.elevation_at(self.camera.target.truncate());
        if self.panel.follow_ground {
            if let Some(delta) = self.follow.update(
                dt.min(MAX_FOLLOW_DT),
                self.camera.target,
                ground,
                terrain.vertical_exaggeration(),
            ) {
                self.camera.translate_target(delta);
            }
        }

        let frame = self.renderer.gfx.surface.get_current_texture()?;
        let swap_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.renderer.terrain.begin_frame(self.camera.view_proj());
        let stats = terrain.render(&self.camera.terrain_view(), &mut self.renderer.terrain);
        log::trace!(
            "Frame {}: {:?}, {} instances flushed",
            stats.frame,
            stats.fence,
            stats.instances_flushed
        );
        self.renderer.render(&swap_view);

        let egui_input = self.egui_state.take_egui_input(window);
        self.egui_ctx.begin_frame(egui_input);

        ui::draw_hud(
            &self.egui_ctx,
            &HudInfo {
                dataset: &self.dataset_name,
                distance_to_center: self.camera.distance_to_center,
                ground_elevation: terrain.absolute_elevation_at(self.camera.target.truncate()),
                frame_ms: self.frame_ms,
                stats: Some(&stats),
            },
        );
        if self.panel.draw(&self.egui_ctx) {
            terrain.set_vertical_exaggeration(self.panel.vertical_exaggeration);
            terrain.set_alpha(self.panel.alpha);
            if !self.panel.follow_ground {
                self.follow.reset();
            }
        }

        let egui_output = self.egui_ctx.end_frame();
        let shapes = self
            .egui_ctx
            .tessellate(egui_output.shapes, self.egui_ctx.pixels_per_point());

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [
                self.renderer.gfx.config.width,
                self.renderer.gfx.config.height,
            ],
            pixels_per_point: self.egui_ctx.pixels_per_point(),
        };

        let mut encoder = self
            .renderer
            .gfx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("UI Encoder"),
            });

        for (id, delta) in &egui_output.textures_delta.set {
            self.renderer.egui_renderer.update_texture(
                &self.renderer.gfx.device,
                &self.renderer.gfx.queue,
                *id,
                delta,
            );
        }

        self.renderer.egui_renderer.update_buffers(
            &self.renderer.gfx.device,
            &self.renderer.gfx.queue,
            &mut encoder,
            &shapes,
            &screen_descriptor,
        );

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("EGUI Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &swap_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.renderer
                .egui_renderer
                .render(&mut render_pass, &shapes, &screen_descriptor);
        }

        for id in &egui_output.textures_delta.free {
            self.renderer.egui_renderer.free_texture(id);
        }

        self.renderer
            .gfx
            .queue
            .submit(std::iter::once(encoder.finish()));
        frame.present();

        Ok(())
    }
}
