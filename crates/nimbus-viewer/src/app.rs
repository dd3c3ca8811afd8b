use std::sync::Arc;

use glam::Vec2;
use winit::event::WindowEvent;
use winit::keyboard::{KeyCode, PhysicalKey};

use nimbus_engine::core::{App, AppControl, FrameCtx};
use nimbus_engine::render::{SplatCamera, SplatRenderer};
use nimbus_splat::scheduler::DepthSorter;
use nimbus_splat::sort::SortMode;
use nimbus_splat::SplatDataset;

use crate::camera::FlyCamera;

/// Highest SH degree the shader evaluates.
const MAX_SH_DEGREE: u32 = 3;

pub struct ViewerApp {
    dataset: Arc<SplatDataset>,
    sorter: DepthSorter,
    renderer: SplatRenderer,
    camera: FlyCamera,
    sh_degree: u32,
    /// Last sort generation consumed; gates index-buffer re-uploads.
    last_generation: u64,
    /// Physical window size, tracked for drag normalization.
    window_size: (f32, f32),
}

impl ViewerApp {
    pub fn new(dataset: Arc<SplatDataset>) -> Self {
        let sorter = DepthSorter::spawn(Arc::clone(&dataset));
        Self {
            dataset,
            sorter,
            renderer: SplatRenderer::new(),
            camera: FlyCamera::new(),
            sh_degree: MAX_SH_DEGREE,
            last_generation: 0,
            window_size: (1.0, 1.0),
        }
    }

    fn handle_key(&mut self, code: KeyCode) -> Option<AppControl> {
        match code {
            KeyCode::Escape => return Some(AppControl::Exit),
            KeyCode::Digit1 => {
                self.sorter.set_mode(SortMode::Exact);
                log::info!("sort mode: exact");
            }
            KeyCode::Digit2 => {
                self.sorter.set_mode(SortMode::Bucketed);
                log::info!("sort mode: bucketed");
            }
            KeyCode::Digit0 => {
                self.sh_degree = (self.sh_degree + 1) % (MAX_SH_DEGREE + 1);
                log::info!("sh degree: {}", self.sh_degree);
            }
            _ => return None,
        }
        Some(AppControl::Continue)
    }
}

impl App for ViewerApp {
    fn on_window_event(&mut self, event: &WindowEvent) -> AppControl {
        if let WindowEvent::Resized(size) = event {
            self.window_size = (size.width.max(1) as f32, size.height.max(1) as f32);
        }
        if let WindowEvent::KeyboardInput { event: key, .. } = event {
            if key.state.is_pressed() {
                if let PhysicalKey::Code(code) = key.physical_key {
                    if let Some(control) = self.handle_key(code) {
                        return control;
                    }
                }
            }
        }
        self.camera.process_event(event, self.window_size);
        AppControl::Continue
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_>) -> AppControl {
        self.camera.update(ctx.time.dt);

        let size = ctx.gpu.size();
        let (w, h) = (size.width.max(1) as f32, size.height.max(1) as f32);
        self.window_size = (w, h);
        let view = self.camera.view_matrix();
        let projection = self.camera.projection_matrix(w, h);
        self.sorter.set_camera(projection, view);

        let (fx, fy) = self.camera.focal(w, h);
        let cam = SplatCamera {
            view,
            projection,
            cam_position: self.camera.world_position(),
            viewport: Vec2::new(w, h),
            focal: Vec2::new(fx, fy),
            sh_degree: self.sh_degree,
        };

        // Split borrows before the closure: the draw callback captures the
        // renderer mutably and the rest by shared reference.
        let renderer = &mut self.renderer;
        let dataset = &self.dataset;
        let sorter = &self.sorter;
        let last_generation = &mut self.last_generation;

        ctx.render(wgpu::Color::BLACK, |rctx, target| {
            renderer.upload_dataset(rctx, dataset);
            sorter.consume_if_fresh(last_generation, |indices| {
                renderer.upload_indices(rctx, indices);
            });
            renderer.render(rctx, target, &cam);
        })
    }
}
