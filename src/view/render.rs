use wgpu::util::DeviceExt;
use wgpu::*;

use crate::controller::frame_loop::{CameraUniform, FrameRenderer, LightingUniform, ModelUniform, OutputSurface};
use crate::model::{Camera, SceneGraph};
use crate::utils::{MeshBuffer, Vertex};
use crate::view::gpu_init::GpuContext;

const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

pub fn create_depth_texture(device: &Device, width: u32, height: u32) -> (Texture, TextureView) {
    let depth_texture = device.create_texture(&TextureDescriptor {
        label: Some("depth_texture"),
        size: Extent3d { width: width.max(1), height: height.max(1), depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let depth_view = depth_texture.create_view(&TextureViewDescriptor::default());
    (depth_texture, depth_view)
}

fn uniform_layout_entry(binding: u32, visibility: ShaderStages) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Per-frame camera and light uniforms, bind group 0
pub struct FrameResources {
    pub camera_buffer: Buffer,
    pub lighting_buffer: Buffer,
    pub bind_group_layout: BindGroupLayout,
    pub bind_group: BindGroup,
}

pub fn create_frame_resources(device: &Device) -> FrameResources {
    let camera_buffer = device.create_buffer(&BufferDescriptor {
        label: Some("camera_buffer"),
        size: std::mem::size_of::<CameraUniform>() as BufferAddress,
        usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let lighting_buffer = device.create_buffer(&BufferDescriptor {
        label: Some("lighting_buffer"),
        size: std::mem::size_of::<LightingUniform>() as BufferAddress,
        usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("frame_bind_group_layout"),
        entries: &[
            uniform_layout_entry(0, ShaderStages::VERTEX | ShaderStages::FRAGMENT),
            uniform_layout_entry(1, ShaderStages::FRAGMENT),
        ],
    });

    let bind_group = device.create_bind_group(&BindGroupDescriptor {
        label: Some("frame_bind_group"),
        layout: &bind_group_layout,
        entries: &[
            BindGroupEntry { binding: 0, resource: camera_buffer.as_entire_binding() },
            BindGroupEntry { binding: 1, resource: lighting_buffer.as_entire_binding() },
        ],
    });

    FrameResources { camera_buffer, lighting_buffer, bind_group_layout, bind_group }
}

pub fn create_model_bind_group_layout(device: &Device) -> BindGroupLayout {
    device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("model_bind_group_layout"),
        entries: &[uniform_layout_entry(0, ShaderStages::VERTEX)],
    })
}

pub fn create_model_pipeline(
    device: &Device,
    format: TextureFormat,
    frame_layout: &BindGroupLayout,
    model_layout: &BindGroupLayout,
) -> RenderPipeline {
    let shader = device.create_shader_module(ShaderModuleDescriptor {
        label: Some("model_shader"),
        source: ShaderSource::Wgsl(include_str!("shaders/model.wgsl").into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some("model_pipeline_layout"),
        bind_group_layouts: &[frame_layout, model_layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some("model_pipeline"),
        layout: Some(&pipeline_layout),
        vertex: VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[VertexBufferLayout {
                array_stride: std::mem::size_of::<Vertex>() as BufferAddress,
                step_mode: VertexStepMode::Vertex,
                attributes: &[
                    VertexAttribute { offset: 0, shader_location: 0, format: VertexFormat::Float32x3 },
                    VertexAttribute { offset: 12, shader_location: 1, format: VertexFormat::Float32x3 },
                    VertexAttribute { offset: 24, shader_location: 2, format: VertexFormat::Float32x4 },
                ],
            }],
            compilation_options: Default::default(),
        },
        fragment: Some(FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(ColorTargetState {
                format,
                blend: Some(BlendState::ALPHA_BLENDING),
                write_mask: ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        // Ground and car panels are double sided
        primitive: PrimitiveState {
            topology: PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: CompareFunction::Less,
            stencil: StencilState::default(),
            bias: DepthBiasState::default(),
        }),
        multisample: MultisampleState { count: 1, mask: !0, alpha_to_coverage_enabled: false },
        multiview: None,
        cache: None,
    })
}

/// GPU copy of one scene mesh and its transform uniform
struct GpuMesh {
    buffers: MeshBuffer,
    model_buffer: Buffer,
    bind_group: BindGroup,
}

/// wgpu forward renderer for the viewer scene
pub struct RenderState {
    pub gpu: GpuContext,
    pipeline: RenderPipeline,
    frame: FrameResources,
    model_layout: BindGroupLayout,
    _depth_texture: Texture,
    depth_view: TextureView,
    /// One slot per scene mesh instance, in traversal order
    meshes: Vec<Option<GpuMesh>>,
    scene_revision: Option<u64>,
    clear_color: Color,
}

impl RenderState {
    pub fn new(gpu: GpuContext, clear_color: [f64; 4]) -> Self {
        let device = &gpu.device;
        let frame = create_frame_resources(device);
        let model_layout = create_model_bind_group_layout(device);
        let pipeline = create_model_pipeline(device, gpu.format, &frame.bind_group_layout, &model_layout);
        let (depth_texture, depth_view) = create_depth_texture(device, gpu.config.width, gpu.config.height);
        let [r, g, b, a] = clear_color;

        Self {
            pipeline,
            frame,
            model_layout,
            _depth_texture: depth_texture,
            depth_view,
            meshes: Vec::new(),
            scene_revision: None,
            clear_color: Color { r, g, b, a },
            gpu,
        }
    }

    fn upload_mesh(&self, buffers: MeshBuffer) -> GpuMesh {
        let device = &self.gpu.device;
        let model_buffer = device.create_buffer_init(&util::BufferInitDescriptor {
            label: Some("model_buffer"),
            contents: bytemuck::bytes_of(&ModelUniform::from_world(glam::Mat4::IDENTITY)),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("model_bind_group"),
            layout: &self.model_layout,
            entries: &[BindGroupEntry { binding: 0, resource: model_buffer.as_entire_binding() }],
        });
        GpuMesh { buffers, model_buffer, bind_group }
    }

    /// Re-upload scene meshes when nodes were added since the last frame
    fn sync_meshes(&mut self, scene: &SceneGraph) {
        if self.scene_revision == Some(scene.revision()) {
            return;
        }
        let uploads: Vec<Option<GpuMesh>> = scene
            .mesh_instances()
            .iter()
            .map(|instance| {
                let mesh = &instance.node.mesh;
                (!mesh.is_empty()).then(|| self.upload_mesh(mesh.upload(&self.gpu.device)))
            })
            .collect();
        tracing::debug!(meshes = uploads.len(), revision = scene.revision(), "uploaded scene meshes");
        self.meshes = uploads;
        self.scene_revision = Some(scene.revision());
    }

    fn acquire_frame(&self) -> Option<SurfaceTexture> {
        match self.gpu.surface.get_current_texture() {
            Ok(frame) => Some(frame),
            Err(SurfaceError::Lost | SurfaceError::Outdated) => {
                self.gpu.reconfigure();
                None
            }
            Err(e) => {
                tracing::warn!("skipping frame: {e}");
                None
            }
        }
    }
}

impl FrameRenderer for RenderState {
    fn render(&mut self, scene: &SceneGraph, camera: &Camera) {
        self.sync_meshes(scene);

        let queue = &self.gpu.queue;
        queue.write_buffer(&self.frame.camera_buffer, 0, bytemuck::bytes_of(&CameraUniform::from_camera(camera)));
        queue.write_buffer(
            &self.frame.lighting_buffer,
            0,
            bytemuck::bytes_of(&LightingUniform::from_scene(scene)),
        );

        let instances = scene.mesh_instances();
        for (instance, gpu_mesh) in instances.iter().zip(&self.meshes) {
            if let (true, Some(gpu_mesh)) = (instance.visible, gpu_mesh) {
                queue.write_buffer(&gpu_mesh.model_buffer, 0, bytemuck::bytes_of(&ModelUniform::from_world(instance.world)));
            }
        }

        let Some(frame) = self.acquire_frame() else {
            return;
        };
        let view = frame.texture.create_view(&TextureViewDescriptor::default());
        let mut encoder = self.gpu.device.create_command_encoder(&CommandEncoderDescriptor { label: Some("encoder") });

        {
            let mut rp = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("scene_pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations { load: LoadOp::Clear(self.clear_color), store: StoreOp::Store },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(Operations { load: LoadOp::Clear(1.0), store: StoreOp::Store }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            rp.set_pipeline(&self.pipeline);
            rp.set_bind_group(0, &self.frame.bind_group, &[]);

            for (instance, gpu_mesh) in instances.iter().zip(&self.meshes) {
                let Some(gpu_mesh) = gpu_mesh else { continue };
                if !instance.visible || gpu_mesh.buffers.index_count == 0 {
                    continue;
                }
                rp.set_bind_group(1, &gpu_mesh.bind_group, &[]);
                rp.set_vertex_buffer(0, gpu_mesh.buffers.vertex_buffer.slice(..));
                rp.set_index_buffer(gpu_mesh.buffers.index_buffer.slice(..), IndexFormat::Uint32);
                rp.draw_indexed(0..gpu_mesh.buffers.index_count, 0, 0..1);
            }
        }

        queue.submit(std::iter::once(encoder.finish()));
        frame.present();
    }
}

impl OutputSurface for RenderState {
    fn resize(&mut self, width: u32, height: u32, pixel_ratio: f64) {
        let (w, h) = physical_size(width, height, pixel_ratio);
        self.gpu.resize(w, h);
        let (depth_texture, depth_view) = create_depth_texture(&self.gpu.device, w, h);
        self._depth_texture = depth_texture;
        self.depth_view = depth_view;
    }
}

/// Logical size scaled by the device pixel ratio, at least 1x1
pub fn physical_size(width: u32, height: u32, pixel_ratio: f64) -> (u32, u32) {
    let scale = |v: u32| ((v as f64 * pixel_ratio).round() as u32).max(1);
    (scale(width), scale(height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physical_size_applies_pixel_ratio() {
        assert_eq!(physical_size(800, 600, 1.0), (800, 600));
        assert_eq!(physical_size(800, 600, 2.0), (1600, 1200));
        assert_eq!(physical_size(333, 100, 1.5), (500, 150));
        assert_eq!(physical_size(0, 10, 2.0), (1, 20));
    }
}
