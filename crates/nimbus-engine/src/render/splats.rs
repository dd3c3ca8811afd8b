use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};
use wgpu::util::DeviceExt;

use nimbus_splat::SplatDataset;

use super::{RenderCtx, RenderTarget};

/// Camera state the renderer needs each frame.
#[derive(Debug, Copy, Clone)]
pub struct SplatCamera {
    pub view: Mat4,
    pub projection: Mat4,
    pub cam_position: Vec3,
    /// Drawable size in physical pixels.
    pub viewport: Vec2,
    /// Focal lengths in pixels.
    pub focal: Vec2,
    /// Highest spherical-harmonics degree to evaluate (0..=3).
    pub sh_degree: u32,
}

/// Gaussian splat renderer.
///
/// One instanced draw per frame: a unit quad stretched per-splat in the
/// vertex shader, instances stepped by the depth ordering so that the blend
/// accumulates splats front-to-back. The splat storage buffer is uploaded
/// once; only the index buffer changes, and only when the sort worker has
/// published a fresh ordering.
#[derive(Default)]
pub struct SplatRenderer {
    pipeline_format: Option<wgpu::TextureFormat>,
    pipeline: Option<wgpu::RenderPipeline>,

    bind_group_layout: Option<wgpu::BindGroupLayout>,
    bind_group: Option<wgpu::BindGroup>,
    camera_ubo: Option<wgpu::Buffer>,

    splat_ssbo: Option<wgpu::Buffer>,

    quad_vbo: Option<wgpu::Buffer>,

    index_vbo: Option<wgpu::Buffer>,
    index_capacity: usize,
    /// Number of instances in the last uploaded ordering.
    drawn_count: u32,
}

impl SplatRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads the immutable dataset as a read-only storage buffer.
    ///
    /// Called once at startup; subsequent calls are ignored. A dataset
    /// larger than the device's storage-binding limit is a structural
    /// misconfiguration (the viewer requests raised limits), so it aborts.
    pub fn upload_dataset(&mut self, ctx: &RenderCtx<'_>, dataset: &SplatDataset) {
        if self.splat_ssbo.is_some() {
            return;
        }

        let bytes = dataset.as_bytes();
        let max = ctx.device.limits().max_storage_buffer_binding_size as usize;
        if bytes.len() > max {
            panic!(
                "splat buffer of {} bytes exceeds the device limit of {max} bytes",
                bytes.len(),
            );
        }

        self.splat_ssbo = Some(ctx.device.create_buffer_init(
            &wgpu::util::BufferInitDescriptor {
                label: Some("nimbus splat storage"),
                contents: bytes,
                usage: wgpu::BufferUsages::STORAGE,
            },
        ));

        // Bindings reference the storage buffer; rebuild them.
        self.bind_group = None;
    }

    /// Uploads a freshly published depth ordering.
    ///
    /// The draw keeps using the previous upload until this is called again,
    /// which is exactly the staleness the double-buffered sort allows.
    pub fn upload_indices(&mut self, ctx: &RenderCtx<'_>, indices: &[u32]) {
        self.ensure_index_capacity(ctx, indices.len());
        let Some(index_vbo) = self.index_vbo.as_ref() else { return };

        ctx.queue
            .write_buffer(index_vbo, 0, bytemuck::cast_slice(indices));
        self.drawn_count = indices.len() as u32;
    }

    /// Draws all splats in the last uploaded order.
    pub fn render(&mut self, ctx: &RenderCtx<'_>, target: &mut RenderTarget<'_>, cam: &SplatCamera) {
        self.ensure_pipeline(ctx);
        self.ensure_static_buffers(ctx);
        self.ensure_bindings(ctx);

        if self.drawn_count == 0 {
            // No ordering published yet; nothing sensible to draw.
            return;
        }

        self.write_camera_uniform(ctx, cam);

        let Some(pipeline) = self.pipeline.as_ref() else { return };
        let Some(bind_group) = self.bind_group.as_ref() else { return };
        let Some(quad_vbo) = self.quad_vbo.as_ref() else { return };
        let Some(index_vbo) = self.index_vbo.as_ref() else { return };

        let mut rpass = target.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("nimbus splat pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        rpass.set_pipeline(pipeline);
        rpass.set_bind_group(0, bind_group, &[]);
        rpass.set_vertex_buffer(0, quad_vbo.slice(..));
        rpass.set_vertex_buffer(1, index_vbo.slice(..));
        rpass.draw(0..4, 0..self.drawn_count);
    }

    fn ensure_pipeline(&mut self, ctx: &RenderCtx<'_>) {
        if self.pipeline_format == Some(ctx.surface_format) && self.pipeline.is_some() {
            return;
        }

        let shader_src = include_str!("shaders/splat.wgsl");
        let shader = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("nimbus splat shader"),
            source: wgpu::ShaderSource::Wgsl(shader_src.into()),
        });

        let bind_group_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("nimbus splat bgl"),
                    entries: &[
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::VERTEX,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: Some(
                                    std::num::NonZeroU64::new(
                                        std::mem::size_of::<CameraUniform>() as u64,
                                    )
                                    .unwrap(),
                                ),
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
                            visibility: wgpu::ShaderStages::VERTEX,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Storage { read_only: true },
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                    ],
                });

        let pipeline_layout =
            ctx.device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("nimbus splat pipeline layout"),
                    bind_group_layouts: &[&bind_group_layout],
                    immediate_size: 0,
                });

        let pipeline = ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("nimbus splat pipeline"),
            layout: Some(&pipeline_layout),

            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[quad_layout(), index_layout()],
            },

            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: ctx.surface_format,
                    blend: Some(splat_blend()),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),

            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            // Ordering is done CPU-side; no depth buffer.
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),

            multiview_mask: None,
            cache: None,
        });

        self.pipeline_format = Some(ctx.surface_format);
        self.pipeline = Some(pipeline);
        self.bind_group_layout = Some(bind_group_layout);

        self.bind_group = None;
        self.camera_ubo = None;
    }

    fn ensure_bindings(&mut self, ctx: &RenderCtx<'_>) {
        if self.bind_group.is_some() && self.camera_ubo.is_some() {
            return;
        }
        let Some(bgl) = self.bind_group_layout.as_ref() else { return };
        let Some(ssbo) = self.splat_ssbo.as_ref() else { return };

        let camera_ubo = self.camera_ubo.get_or_insert_with(|| {
            ctx.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("nimbus splat camera ubo"),
                size: std::mem::size_of::<CameraUniform>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });

        self.bind_group = Some(ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("nimbus splat bind group"),
            layout: bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_ubo.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: ssbo.as_entire_binding(),
                },
            ],
        }));
    }

    fn ensure_static_buffers(&mut self, ctx: &RenderCtx<'_>) {
        if self.quad_vbo.is_some() {
            return;
        }

        // Quad in "gaussian units": ±2 standard deviations, triangle strip.
        const QUAD: [[f32; 2]; 4] = [[-2.0, -2.0], [2.0, -2.0], [-2.0, 2.0], [2.0, 2.0]];
        self.quad_vbo = Some(ctx.device.create_buffer_init(
            &wgpu::util::BufferInitDescriptor {
                label: Some("nimbus splat quad vbo"),
                contents: bytemuck::cast_slice(&QUAD),
                usage: wgpu::BufferUsages::VERTEX,
            },
        ));
    }

    fn ensure_index_capacity(&mut self, ctx: &RenderCtx<'_>, required: usize) {
        if required <= self.index_capacity && self.index_vbo.is_some() {
            return;
        }

        // N is fixed per dataset, so this runs once in practice.
        let new_cap = required.next_power_of_two().max(64);
        self.index_vbo = Some(ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("nimbus splat index vbo"),
            size: (new_cap * std::mem::size_of::<u32>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        self.index_capacity = new_cap;
    }

    fn write_camera_uniform(&mut self, ctx: &RenderCtx<'_>, cam: &SplatCamera) {
        let Some(ubo) = self.camera_ubo.as_ref() else { return };
        let u = CameraUniform {
            view: cam.view.to_cols_array_2d(),
            projection: cam.projection.to_cols_array_2d(),
            cam_position: cam.cam_position.to_array(),
            sh_degree: cam.sh_degree.min(3),
            viewport: [cam.viewport.x.max(1.0), cam.viewport.y.max(1.0)],
            focal: cam.focal.to_array(),
            num_splats: self.drawn_count,
            _pad: [0; 3],
        };
        ctx.queue.write_buffer(ubo, 0, bytemuck::bytes_of(&u));
    }
}

/// Destination-alpha compositing: with front-to-back draw order each splat
/// contributes only through the opacity the pixel has left. Matches
/// `glBlendFuncSeparate(ONE_MINUS_DST_ALPHA, ONE, ...)` in classic GL splat
/// viewers.
fn splat_blend() -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::OneMinusDstAlpha,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

fn quad_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
    wgpu::VertexBufferLayout {
        array_stride: (std::mem::size_of::<f32>() * 2) as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRS,
    }
}

fn index_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Uint32];
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<u32>() as u64,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &ATTRS,
    }
}

/// Must match the `Camera` struct in `shaders/splat.wgsl`.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct CameraUniform {
    view: [[f32; 4]; 4],
    projection: [[f32; 4]; 4],
    cam_position: [f32; 3],
    sh_degree: u32,
    viewport: [f32; 2],
    focal: [f32; 2],
    num_splats: u32,
    _pad: [u32; 3],
}
