use crate::shaders;
use bytemuck::{Pod, Zeroable};
use showcase_common::{NodeId, Rgb, SurfaceSize};
use showcase_render::{FrameInput, RenderBackend, RenderError, RendererSettings};
use showcase_scene::{Background, EnvironmentMap, MeshGeometry, NodeKind, Scene, TextureImage};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use wgpu::util::DeviceExt;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const ENV_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
const BASE_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Errors while creating the GPU renderer.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[error("no compatible GPU adapter found")]
    NoAdapter,
    #[error("failed to create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("surface reports no supported formats")]
    UnsupportedSurface,
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct CameraUniforms {
    view_proj: [[f32; 4]; 4],
    inv_view_proj: [[f32; 4]; 4],
    eye: [f32; 4],
    ambient: [f32; 4],
    env_average: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct MeshUniforms {
    model: [[f32; 4]; 4],
    normal_matrix: [[f32; 4]; 4],
    color: [f32; 4],
    params: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct Vertex {
    position: [f32; 3],
    normal: [f32; 3],
    uv: [f32; 2],
}

/// Interleave positions, normals and UVs; missing normals point up and
/// missing UVs sit at the origin.
fn interleave(geometry: &MeshGeometry) -> Vec<Vertex> {
    geometry
        .positions
        .iter()
        .enumerate()
        .map(|(i, p)| Vertex {
            position: *p,
            normal: geometry.normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
            uv: geometry.uvs.get(i).copied().unwrap_or_default(),
        })
        .collect()
}

/// Upload extent of a base colour image, or `None` if it cannot be uploaded.
fn texture_extent(image: &TextureImage, max_dimension: u32) -> Option<wgpu::Extent3d> {
    if !image.is_valid() || image.width > max_dimension || image.height > max_dimension {
        return None;
    }
    Some(wgpu::Extent3d {
        width: image.width,
        height: image.height,
        depth_or_array_layers: 1,
    })
}

/// Drop cache entries whose key is not in `live`, handing each to `release`.
fn retain_live<K: Ord, V>(
    cache: &mut BTreeMap<K, V>,
    live: &BTreeSet<K>,
    mut release: impl FnMut(&V),
) {
    cache.retain(|key, value| {
        let keep = live.contains(key);
        if !keep {
            release(value);
        }
        keep
    });
}

/// Environment texels as little-endian RGBA16F rows.
fn env_texture_bytes(env: &EnvironmentMap) -> Vec<u8> {
    env.to_rgba()
        .into_iter()
        .flat_map(|v| half::f16::from_f32(v).to_le_bytes())
        .collect()
}

fn clear_color(color: Rgb, alpha: f32, srgb_target: bool) -> wgpu::Color {
    let [r, g, b] = if srgb_target {
        color.to_linear()
    } else {
        [color.r, color.g, color.b].map(|c| c as f32 / 255.0)
    };
    wgpu::Color {
        r: r as f64,
        g: g as f64,
        b: b as f64,
        a: alpha as f64,
    }
}

/// A frame acquired from the surface, ready for overlay passes and `present`.
pub struct SurfaceFrame {
    pub texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
}

impl SurfaceFrame {
    pub fn present(self) {
        self.texture.present();
    }
}

/// Buffers for one mesh node, keyed by node id and rebuilt when its
/// geometry changes.
struct GpuMesh {
    geometry_key: usize,
    texture_key: Option<usize>,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    edge_buffer: Option<(wgpu::Buffer, u32)>,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl GpuMesh {
    fn destroy(&self) {
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
        self.uniform_buffer.destroy();
        if let Some((buffer, _)) = &self.edge_buffer {
            buffer.destroy();
        }
    }
}

struct EnvTexture {
    key: usize,
    texture: wgpu::Texture,
}

/// An uploaded base colour image. Holding the `Arc` keeps its address, and
/// so its cache key, from being reused while cached.
struct GpuTexture {
    _image: Option<Arc<TextureImage>>,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// wgpu renderer owning its surface, device and GPU resources.
///
/// Draws the environment background, lit meshes and wireframe meshes. The
/// 2D overlay is left to the caller, which draws into the returned
/// [`SurfaceFrame`] before presenting it.
pub struct WgpuRenderer {
    settings: RendererSettings,
    surface: Option<wgpu::Surface<'static>>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    background_pipeline: wgpu::RenderPipeline,
    mesh_pipeline: wgpu::RenderPipeline,
    wire_pipeline: wgpu::RenderPipeline,
    global_layout: wgpu::BindGroupLayout,
    mesh_layout: wgpu::BindGroupLayout,
    camera_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    global_bind_group: wgpu::BindGroup,
    env: Option<EnvTexture>,
    placeholder_env: wgpu::Texture,
    base_sampler: wgpu::Sampler,
    /// 1x1 white, bound when a material has no texture.
    placeholder_base: GpuTexture,
    textures: BTreeMap<usize, GpuTexture>,
    depth: (wgpu::Texture, wgpu::TextureView),
    meshes: BTreeMap<NodeId, GpuMesh>,
    disposed: bool,
}

impl WgpuRenderer {
    /// Create a surface for `target` and a renderer drawing into it.
    pub async fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        size: SurfaceSize,
        settings: RendererSettings,
    ) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(target)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("showcase_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or(GpuError::UnsupportedSurface)?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        tracing::info!(
            backend = adapter.get_info().backend.to_str(),
            ?format,
            width = config.width,
            height = config.height,
            "GPU initialized"
        );
        Ok(Self::with_device(surface, device, queue, config, settings))
    }

    fn with_device(
        surface: wgpu::Surface<'static>,
        device: wgpu::Device,
        queue: wgpu::Queue,
        config: wgpu::SurfaceConfiguration,
        settings: RendererSettings,
    ) -> Self {
        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("camera_buffer"),
            size: std::mem::size_of::<CameraUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let global_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("global_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let mesh_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mesh_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("env_sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let base_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("base_color_sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let white = TextureImage::new("placeholder", 1, 1, vec![255; 4]);
        let placeholder_base = Self::create_base_texture(&device, &queue, &white, None);

        let placeholder_env = Self::create_env_texture(&device, &queue, 1, 1, &[0u8; 8]);
        let global_bind_group =
            Self::create_global_bind_group(&device, &global_layout, &camera_buffer, &placeholder_env, &sampler);

        let background_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("background_pipeline_layout"),
            bind_group_layouts: &[&global_layout],
            push_constant_ranges: &[],
        });
        let mesh_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mesh_pipeline_layout"),
            bind_group_layouts: &[&global_layout, &mesh_layout],
            push_constant_ranges: &[],
        });

        let background_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("background_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::background_shader().into()),
        });
        let mesh_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mesh_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::mesh_shader().into()),
        });

        let color_target = [Some(wgpu::ColorTargetState {
            format: config.format,
            blend: Some(wgpu::BlendState::REPLACE),
            write_mask: wgpu::ColorWrites::ALL,
        })];

        let background_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("background_pipeline"),
            layout: Some(&background_layout),
            vertex: wgpu::VertexState {
                module: &background_shader,
                entry_point: Some("vs_background"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &background_shader,
                entry_point: Some("fs_background"),
                compilation_options: Default::default(),
                targets: &color_target,
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        let vertex_layout = [wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &wgpu::vertex_attr_array![
                0 => Float32x3,
                1 => Float32x3,
                2 => Float32x2,
            ],
        }];

        let mesh_pipeline_for = |label: &str, topology: wgpu::PrimitiveTopology| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&mesh_pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &mesh_shader,
                    entry_point: Some("vs_mesh"),
                    compilation_options: Default::default(),
                    buffers: &vertex_layout,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &mesh_shader,
                    entry_point: Some("fs_mesh"),
                    compilation_options: Default::default(),
                    targets: &color_target,
                }),
                primitive: wgpu::PrimitiveState {
                    topology,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
                multisample: Default::default(),
                multiview: None,
                cache: None,
            })
        };
        let mesh_pipeline = mesh_pipeline_for("mesh_pipeline", wgpu::PrimitiveTopology::TriangleList);
        let wire_pipeline = mesh_pipeline_for("wireframe_pipeline", wgpu::PrimitiveTopology::LineList);

        let depth = Self::create_depth_texture(&device, config.width, config.height);

        Self {
            settings,
            surface: Some(surface),
            device,
            queue,
            config,
            background_pipeline,
            mesh_pipeline,
            wire_pipeline,
            global_layout,
            mesh_layout,
            camera_buffer,
            sampler,
            global_bind_group,
            env: None,
            placeholder_env,
            base_sampler,
            placeholder_base,
            textures: BTreeMap::new(),
            depth,
            meshes: BTreeMap::new(),
            disposed: false,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Number of mesh nodes with live GPU buffers.
    pub fn cached_meshes(&self) -> usize {
        self.meshes.len()
    }

    fn create_depth_texture(
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> (wgpu::Texture, wgpu::TextureView) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth_texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&Default::default());
        (texture, view)
    }

    fn create_env_texture(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        width: u32,
        height: u32,
        bytes: &[u8],
    ) -> wgpu::Texture {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("environment_texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: ENV_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 8),
                rows_per_image: Some(height),
            },
            size,
        );
        texture
    }

    /// Upload an RGBA8 image. The caller checks it against [`texture_extent`].
    fn create_base_texture(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image: &TextureImage,
        keep: Option<Arc<TextureImage>>,
    ) -> GpuTexture {
        let size = wgpu::Extent3d {
            width: image.width.max(1),
            height: image.height.max(1),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("base_color_texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: BASE_COLOR_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &image.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size.width * 4),
                rows_per_image: Some(size.height),
            },
            size,
        );
        let view = texture.create_view(&Default::default());
        GpuTexture {
            _image: keep,
            texture,
            view,
        }
    }

    /// Cache key of the uploaded copy of `image`, uploading it on first use.
    fn ensure_texture(&mut self, image: &Arc<TextureImage>) -> Option<usize> {
        let key = Arc::as_ptr(image) as usize;
        if self.textures.contains_key(&key) {
            return Some(key);
        }
        let max = self.device.limits().max_texture_dimension_2d;
        if texture_extent(image, max).is_none() {
            tracing::warn!(
                name = %image.name,
                width = image.width,
                height = image.height,
                max,
                "base colour texture not uploaded"
            );
            return None;
        }
        let texture = Self::create_base_texture(&self.device, &self.queue, image, Some(image.clone()));
        self.textures.insert(key, texture);
        tracing::debug!(name = %image.name, width = image.width, height = image.height, "texture uploaded");
        Some(key)
    }

    fn create_global_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        camera_buffer: &wgpu::Buffer,
        env: &wgpu::Texture,
        sampler: &wgpu::Sampler,
    ) -> wgpu::BindGroup {
        let view = env.create_view(&Default::default());
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("global_bind_group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    /// Upload the scene environment when it changes.
    fn sync_environment(&mut self, scene: &Scene) {
        let Some(env) = scene.environment() else {
            return;
        };
        let key = Arc::as_ptr(env) as usize;
        if self.env.as_ref().is_some_and(|e| e.key == key) {
            return;
        }
        let max = self.device.limits().max_texture_dimension_2d;
        if env.width > max || env.height > max {
            tracing::warn!(
                width = env.width,
                height = env.height,
                max,
                "environment map exceeds texture limits, not uploaded"
            );
            return;
        }

        let texture = Self::create_env_texture(
            &self.device,
            &self.queue,
            env.width,
            env.height,
            &env_texture_bytes(env),
        );
        self.global_bind_group = Self::create_global_bind_group(
            &self.device,
            &self.global_layout,
            &self.camera_buffer,
            &texture,
            &self.sampler,
        );
        if let Some(old) = self.env.replace(EnvTexture { key, texture }) {
            old.texture.destroy();
        }
        tracing::debug!(width = env.width, height = env.height, "environment uploaded");
    }

    /// Upload new meshes, refresh per-node uniforms and free buffers of nodes
    /// that left the scene. Returns draw order.
    fn sync_meshes(&mut self, scene: &Scene) -> Vec<(NodeId, bool)> {
        let mut draws = Vec::new();
        let mut drawn = BTreeSet::new();
        let mut used_textures = BTreeSet::new();
        let mut live = Vec::new();
        scene.traverse_world(&mut |node, world| {
            if let NodeKind::Mesh { geometry, material } = &node.kind {
                if !geometry.is_empty() {
                    live.push((node.id, world, geometry.clone(), material.clone()));
                }
            }
        });

        for (id, world, geometry, material) in live {
            let key = Arc::as_ptr(&geometry) as usize;
            let texture_key = material
                .base_color_texture
                .as_ref()
                .and_then(|image| self.ensure_texture(image));
            used_textures.extend(texture_key);
            let stale = self.meshes.get(&id).is_none_or(|m| {
                m.geometry_key != key
                    || m.texture_key != texture_key
                    || m.edge_buffer.is_some() != material.wireframe
            });
            if stale {
                let mesh = self.upload_mesh(key, &geometry, material.wireframe, texture_key);
                if let Some(old) = self.meshes.insert(id, mesh) {
                    old.destroy();
                }
            }

            let [r, g, b] = material.color.to_linear();
            let uniforms = MeshUniforms {
                model: world.to_cols_array_2d(),
                normal_matrix: world.inverse().transpose().to_cols_array_2d(),
                color: [r, g, b, 1.0],
                params: [
                    material.metalness,
                    material.roughness,
                    material.env_map_intensity,
                    0.0,
                ],
            };
            if let Some(mesh) = self.meshes.get(&id) {
                self.queue
                    .write_buffer(&mesh.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
            }
            drawn.insert(id);
            draws.push((id, material.wireframe));
        }

        retain_live(&mut self.meshes, &drawn, GpuMesh::destroy);
        retain_live(&mut self.textures, &used_textures, |t| t.texture.destroy());
        draws
    }

    fn upload_mesh(
        &self,
        key: usize,
        geometry: &MeshGeometry,
        wireframe: bool,
        texture_key: Option<usize>,
    ) -> GpuMesh {
        let vertices = interleave(geometry);
        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh_vertex_buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh_index_buffer"),
            contents: bytemuck::cast_slice(&geometry.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let edge_buffer = wireframe.then(|| {
            let edges = geometry.wireframe_edges();
            let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh_edge_buffer"),
                contents: bytemuck::cast_slice(&edges),
                usage: wgpu::BufferUsages::INDEX,
            });
            (buffer, edges.len() as u32)
        });
        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("mesh_uniform_buffer"),
            size: std::mem::size_of::<MeshUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let base = texture_key
            .and_then(|k| self.textures.get(&k))
            .unwrap_or(&self.placeholder_base);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("mesh_bind_group"),
            layout: &self.mesh_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&base.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.base_sampler),
                },
            ],
        });

        tracing::debug!(
            vertices = geometry.vertex_count(),
            triangles = geometry.triangle_count(),
            wireframe,
            textured = texture_key.is_some(),
            "mesh uploaded"
        );
        GpuMesh {
            geometry_key: key,
            texture_key,
            vertex_buffer,
            index_buffer,
            index_count: geometry.indices.len() as u32,
            edge_buffer,
            uniform_buffer,
            bind_group,
        }
    }

    fn write_camera(&self, frame: &FrameInput<'_>, has_env: bool) {
        let view_proj = frame.camera.view_projection();
        let eye = frame.camera.position;
        let [ar, ag, ab] = frame.scene.ambient_radiance();
        let [er, eg, eb] = frame
            .scene
            .environment()
            .map(|e| e.average_radiance())
            .unwrap_or_default();
        let uniforms = CameraUniforms {
            view_proj: view_proj.to_cols_array_2d(),
            inv_view_proj: view_proj.inverse().to_cols_array_2d(),
            eye: [eye.x, eye.y, eye.z, if has_env { 1.0 } else { 0.0 }],
            ambient: [ar, ag, ab, 1.0],
            env_average: [er, eg, eb, 1.0],
        };
        self.queue
            .write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&uniforms));
    }
}

impl RenderBackend for WgpuRenderer {
    type Output = Option<SurfaceFrame>;

    fn settings(&self) -> RendererSettings {
        self.settings
    }

    fn size(&self) -> SurfaceSize {
        SurfaceSize::new(self.config.width, self.config.height)
    }

    fn resize(&mut self, size: SurfaceSize) {
        if self.disposed {
            return;
        }
        let size = SurfaceSize::new(size.width, size.height);
        self.config.width = size.width;
        self.config.height = size.height;
        if let Some(surface) = &self.surface {
            surface.configure(&self.device, &self.config);
        }
        let old = std::mem::replace(
            &mut self.depth,
            Self::create_depth_texture(&self.device, size.width, size.height),
        );
        old.0.destroy();
    }

    /// Returns `None` when the surface had to be reconfigured and the frame
    /// was skipped.
    fn render(&mut self, frame: &FrameInput<'_>) -> Result<Option<SurfaceFrame>, RenderError> {
        if self.disposed {
            return Err(RenderError::Disposed);
        }
        let texture = {
            let Some(surface) = &self.surface else {
                return Err(RenderError::Disposed);
            };
            match surface.get_current_texture() {
                Ok(t) => t,
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    tracing::debug!("surface lost or outdated, reconfiguring");
                    surface.configure(&self.device, &self.config);
                    return Ok(None);
                }
                Err(wgpu::SurfaceError::Timeout) => {
                    tracing::warn!("surface timeout, skipping frame");
                    return Ok(None);
                }
                Err(e) => return Err(RenderError::Surface(e.to_string())),
            }
        };
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.sync_environment(frame.scene);
        let draws = self.sync_meshes(frame.scene);

        let (clear, draw_background) = match frame.scene.background() {
            Some(Background::Environment(_)) => (self.settings.clear_color, self.env.is_some()),
            Some(Background::Color(c)) => (*c, false),
            None => (self.settings.clear_color, false),
        };
        self.write_camera(frame, self.env.is_some());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("render_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("main_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear_color(
                            clear,
                            self.settings.clear_alpha,
                            self.config.format.is_srgb(),
                        )),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.1,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            pass.set_bind_group(0, &self.global_bind_group, &[]);
            if draw_background {
                pass.set_pipeline(&self.background_pipeline);
                pass.draw(0..3, 0..1);
            }

            for (id, wireframe) in &draws {
                let Some(mesh) = self.meshes.get(id) else {
                    continue;
                };
                pass.set_bind_group(1, &mesh.bind_group, &[]);
                pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                match (&mesh.edge_buffer, wireframe) {
                    (Some((edges, count)), true) => {
                        pass.set_pipeline(&self.wire_pipeline);
                        pass.set_index_buffer(edges.slice(..), wgpu::IndexFormat::Uint32);
                        pass.draw_indexed(0..*count, 0, 0..1);
                    }
                    _ => {
                        pass.set_pipeline(&self.mesh_pipeline);
                        pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                        pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                    }
                }
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        Ok(Some(SurfaceFrame { texture, view }))
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        let meshes = self.meshes.len();
        let textures = self.textures.len();
        for mesh in self.meshes.values() {
            mesh.destroy();
        }
        self.meshes.clear();
        for texture in self.textures.values() {
            texture.texture.destroy();
        }
        self.textures.clear();
        self.placeholder_base.texture.destroy();
        if let Some(env) = self.env.take() {
            env.texture.destroy();
        }
        self.placeholder_env.destroy();
        self.depth.0.destroy();
        self.camera_buffer.destroy();
        self.surface = None;
        self.disposed = true;
        tracing::info!(meshes, textures, "GPU resources released");
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Drop for WgpuRenderer {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleave_fills_missing_normals() {
        let geometry = MeshGeometry::new(
            vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![[0.0, 0.0, 1.0]],
            vec![0, 1, 2],
        );
        let vertices = interleave(&geometry);
        assert_eq!(vertices.len(), 3);
        assert_eq!(vertices[0].normal, [0.0, 0.0, 1.0]);
        assert_eq!(vertices[2].normal, [0.0, 1.0, 0.0]);
        assert_eq!(vertices[1].position, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn interleave_carries_uvs() {
        let geometry = MeshGeometry::new(
            vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![],
            vec![0, 1, 2],
        )
        .with_uvs(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        let vertices = interleave(&geometry);
        assert_eq!(vertices[1].uv, [1.0, 0.0]);
        assert_eq!(vertices[2].uv, [0.0, 1.0]);

        let bare = MeshGeometry::new(vec![[0.0; 3]], vec![], vec![]);
        assert_eq!(interleave(&bare)[0].uv, [0.0, 0.0]);
    }

    #[test]
    fn vertex_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
    }

    #[test]
    fn texture_extent_rejects_bad_images() {
        let ok = TextureImage::new("ok", 2, 1, vec![0; 8]);
        let extent = texture_extent(&ok, 8192).unwrap();
        assert_eq!((extent.width, extent.height), (2, 1));

        let short = TextureImage::new("short", 2, 2, vec![0; 8]);
        assert!(texture_extent(&short, 8192).is_none());
        let wide = TextureImage::new("wide", 16, 1, vec![0; 64]);
        assert!(texture_extent(&wide, 8).is_none());
    }

    #[test]
    fn retain_live_releases_only_dead_entries() {
        let ids: Vec<NodeId> = (0..4).map(|_| NodeId::new()).collect();
        let mut cache: BTreeMap<NodeId, usize> = ids.iter().copied().zip(0..).collect();
        let live: BTreeSet<NodeId> = [ids[0], ids[2]].into_iter().collect();

        let mut released = Vec::new();
        retain_live(&mut cache, &live, |v| released.push(*v));
        released.sort();
        assert_eq!(released, [1, 3]);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains_key(&ids[0]) && cache.contains_key(&ids[2]));
    }

    #[test]
    fn env_bytes_are_rgba16f() {
        let env = EnvironmentMap::new(2, 1, vec![[1.0, 0.5, 0.0], [2.0, 0.0, 0.25]]);
        let bytes = env_texture_bytes(&env);
        assert_eq!(bytes.len(), 2 * 4 * 2);
        let texel = |i: usize| half::f16::from_le_bytes([bytes[i * 2], bytes[i * 2 + 1]]).to_f32();
        assert_eq!(texel(0), 1.0);
        assert_eq!(texel(1), 0.5);
        assert_eq!(texel(3), 1.0, "alpha is opaque");
        assert_eq!(texel(4), 2.0);
    }

    #[test]
    fn clear_color_respects_target_encoding() {
        let grey = Rgb::from_hex(0x505050);
        let raw = clear_color(grey, 1.0, false);
        assert!((raw.r - 80.0 / 255.0).abs() < 1e-6);
        let linear = clear_color(grey, 1.0, true);
        assert!(linear.r < raw.r);
        assert_eq!(linear.a, 1.0);
    }

    #[test]
    fn uniform_layouts_are_16_byte_aligned() {
        assert_eq!(std::mem::size_of::<CameraUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<MeshUniforms>() % 16, 0);
    }
}
