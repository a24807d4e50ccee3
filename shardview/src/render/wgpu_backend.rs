use std::collections::HashMap;

use anyhow::{anyhow, Result};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;
use wgpu::{
    vertex_attr_array, AddressMode, BindGroupDescriptor, BindGroupEntry, BindGroupLayout,
    BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingResource, BindingType, Buffer,
    BufferBindingType, BufferUsages, ColorTargetState, ColorWrites, CommandEncoder,
    CommandEncoderDescriptor, CompareFunction, DepthStencilState, DeviceDescriptor, Extent3d,
    FilterMode, FragmentState, Instance, LoadOp, MultisampleState, Operations, Origin3d,
    PipelineLayoutDescriptor, PresentMode, PrimitiveState, RenderPassColorAttachment,
    RenderPassDepthStencilAttachment, RenderPassDescriptor, RenderPipeline,
    RenderPipelineDescriptor, RequestAdapterOptions, Sampler, SamplerBindingType,
    SamplerDescriptor, ShaderModuleDescriptor, ShaderSource, SurfaceConfiguration,
    TexelCopyBufferLayout, TexelCopyTextureInfo, Texture, TextureAspect, TextureDescriptor,
    TextureDimension, TextureFormat, TextureSampleType, TextureUsages, TextureView,
    TextureViewDescriptor, TextureViewDimension, VertexState,
};
use winit::{dpi::PhysicalSize, window::Window};

use crate::math::{Rect, Vec2};
use crate::render::compositor::{FramePlan, LightBlend, LightPass, WorldTarget};
use crate::render::light::LightData;
use crate::render::sprite::TextureHandle;

/// Largest number of quads one frame may queue across all passes.
const MAX_QUADS_PER_FRAME: usize = 4096;

/// One queued quad draw: a uniform slot plus the texture to bind.
struct QuadDrawCommand {
    uniform_offset: u64,
    texture: TextureHandle,
}

/// Wrapper around wgpu surface/device setup and frame management.
pub struct Renderer<'window> {
    backend: WgpuBackend<'window>,
}

impl<'window> Renderer<'window> {
    pub fn new(window: &'window Window, vsync: bool) -> Result<Self> {
        Ok(Self {
            backend: WgpuBackend::new(window, vsync)?,
        })
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.backend.resize(new_size);
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.backend.surface_size()
    }

    pub fn begin_frame(&mut self, plan: &FramePlan) -> Result<Frame> {
        self.backend.begin_frame(plan)
    }

    /// Queue one world quad. Missing art is a transient skip, not an error.
    pub fn queue_world(
        &mut self,
        frame: &mut Frame,
        graphic: u16,
        screen: Vec2,
        depth: i32,
        alpha: u8,
        transparent_pass: bool,
    ) {
        self.backend
            .queue_world(frame, graphic, screen, depth, alpha, transparent_pass);
    }

    /// Queue one accumulated light for the additive pass.
    pub fn queue_light(&mut self, frame: &mut Frame, light: &LightData) {
        self.backend.queue_light(frame, light);
    }

    /// Queue a solid overlay rectangle in screen space.
    pub fn queue_overlay_rect(&mut self, frame: &mut Frame, rect: Rect, color: [f32; 4]) {
        let white = self.backend.white;
        self.backend.queue_overlay(frame, white, rect, color);
    }

    /// Queue the four edges of a rectangle as a one-pixel border.
    pub fn queue_overlay_border(&mut self, frame: &mut Frame, rect: Rect, color: [f32; 4]) {
        let white = self.backend.white;
        for edge in [
            Rect::new(rect.x, rect.y, rect.width, 1.0),
            Rect::new(rect.x, rect.bottom() - 1.0, rect.width, 1.0),
            Rect::new(rect.x, rect.y, 1.0, rect.height),
            Rect::new(rect.right() - 1.0, rect.y, 1.0, rect.height),
        ] {
            self.backend.queue_overlay(frame, white, edge, color);
        }
    }

    /// Queue a textured overlay quad (glyphs, bar art) in screen space.
    pub fn queue_overlay_texture(
        &mut self,
        frame: &mut Frame,
        texture: TextureHandle,
        rect: Rect,
        color: [f32; 4],
    ) {
        self.backend.queue_overlay(frame, texture, rect, color);
    }

    /// Flush all queued passes in plan order and present.
    pub fn end_frame(&mut self, frame: Frame, plan: &FramePlan) -> Result<()> {
        self.backend.end_frame(frame, plan)
    }

    /// Register world art for a graphic id; pushed by the asset layer.
    pub fn upload_art(&mut self, graphic: u16, rgba: &[u8], width: u32, height: u32) -> Result<()> {
        let handle = self.backend.load_texture_from_rgba(rgba, width, height)?;
        self.backend.art_map.insert(graphic, handle);
        Ok(())
    }

    /// Register a light-shape sprite; pushed by the asset layer.
    pub fn upload_light_shape(
        &mut self,
        shape: u8,
        rgba: &[u8],
        width: u32,
        height: u32,
    ) -> Result<()> {
        let handle = self.backend.load_texture_from_rgba(rgba, width, height)?;
        self.backend.light_map.insert(shape, handle);
        Ok(())
    }

    /// Upload raw RGBA pixels and get a handle (glyph cache upload path).
    pub fn load_texture_from_rgba(
        &mut self,
        rgba: &[u8],
        width: u32,
        height: u32,
    ) -> Result<TextureHandle> {
        self.backend.load_texture_from_rgba(rgba, width, height)
    }

    /// Decode and upload a PNG/compatible image.
    pub fn load_texture_from_bytes(&mut self, bytes: &[u8]) -> Result<TextureHandle> {
        let image = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = image.dimensions();
        self.backend.load_texture_from_rgba(&image, width, height)
    }

    pub fn texture_size(&self, handle: TextureHandle) -> Option<(u32, u32)> {
        self.backend.textures.get(&handle).map(|t| t.size)
    }

    /// Replace the palette colored lights are tinted with.
    pub fn set_light_palette(&mut self, palette: Vec<[f32; 3]>) {
        self.backend.light_palette = palette;
    }
}

/// Per-frame GPU state: the swapchain texture, encoder, queued draws, and the
/// frame's render targets.
pub struct Frame {
    surface_texture: Option<wgpu::SurfaceTexture>,
    view: TextureView,
    encoder: Option<CommandEncoder>,
    opaque_draws: Vec<QuadDrawCommand>,
    transparent_draws: Vec<QuadDrawCommand>,
    light_draws: Vec<QuadDrawCommand>,
    overlay_draws: Vec<QuadDrawCommand>,
    world_texture: Option<Texture>,
    world_view: Option<TextureView>,
    depth_texture: Option<Texture>,
    depth_view: Option<TextureView>,
    light_texture: Option<Texture>,
    light_view: Option<TextureView>,
    /// Size the world pass renders at; differs from the surface under upscale.
    world_size: (u32, u32),
}

impl Drop for Frame {
    fn drop(&mut self) {
        // A frame abandoned mid-draw still presents so the surface is not
        // leaked; the encoder is simply dropped.
        if let Some(surface_texture) = self.surface_texture.take() {
            surface_texture.present();
        }
    }
}

struct TextureEntry {
    #[allow(dead_code)]
    texture: Texture,
    view: TextureView,
    sampler: Sampler,
    size: (u32, u32),
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct QuadVertex {
    position: [f32; 2],
    uv: [f32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct QuadUniforms {
    mvp: [[f32; 4]; 4],
    tint: [f32; 4],
    depth: f32,
    _pad: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct CompositeUniforms {
    mode: f32,
    _pad: [f32; 3],
}

struct QuadPipeline {
    opaque: RenderPipeline,
    transparent: RenderPipeline,
    additive: RenderPipeline,
    overlay: RenderPipeline,
    bind_group_layout: BindGroupLayout,
    vertex_buffer: Buffer,
    uniform_buffer: Buffer,
    uniform_alignment: u64,
}

struct CompositePipeline {
    pipeline: RenderPipeline,
    bind_group_layout: BindGroupLayout,
    vertex_buffer: Buffer,
    uniform_buffer: Buffer,
}

const QUAD_VERTICES: [QuadVertex; 6] = [
    QuadVertex {
        position: [0.0, 0.0],
        uv: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, 0.0],
        uv: [1.0, 0.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        uv: [1.0, 1.0],
    },
    QuadVertex {
        position: [0.0, 0.0],
        uv: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        uv: [1.0, 1.0],
    },
    QuadVertex {
        position: [0.0, 1.0],
        uv: [0.0, 1.0],
    },
];

const FULLSCREEN_VERTICES: [QuadVertex; 6] = [
    QuadVertex {
        position: [-1.0, -1.0],
        uv: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, -1.0],
        uv: [1.0, 1.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        uv: [1.0, 0.0],
    },
    QuadVertex {
        position: [-1.0, -1.0],
        uv: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        uv: [1.0, 0.0],
    },
    QuadVertex {
        position: [-1.0, 1.0],
        uv: [0.0, 0.0],
    },
];

struct WgpuBackend<'window> {
    surface: wgpu::Surface<'window>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: SurfaceConfiguration,
    present_mode: PresentMode,
    quad_pipeline: QuadPipeline,
    composite_pipeline: CompositePipeline,
    textures: HashMap<TextureHandle, TextureEntry>,
    art_map: HashMap<u16, TextureHandle>,
    light_map: HashMap<u8, TextureHandle>,
    /// Palette used to tint colored lights; uploaded by the asset layer,
    /// white until then.
    light_palette: Vec<[f32; 3]>,
    white: TextureHandle,
    next_texture_id: u32,
    uniform_write_offset: u64,
    bind_group_cache: HashMap<TextureHandle, wgpu::BindGroup>,
}

impl<'window> WgpuBackend<'window> {
    fn new(window: &'window Window, vsync: bool) -> Result<Self> {
        let instance = Instance::default();
        let surface = instance.create_surface(window)?;

        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&DeviceDescriptor {
            label: Some("shardview-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: wgpu::Trace::Off,
        }))?;

        let size = window.inner_size();
        let capabilities = surface.get_capabilities(&adapter);
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(|format| format.is_srgb())
            .unwrap_or(capabilities.formats[0]);

        let present_mode = choose_present_mode(&capabilities.present_modes, vsync);

        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: capabilities.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let quad_pipeline = create_quad_pipelines(&device, format);
        let composite_pipeline = create_composite_pipeline(&device, format);

        let mut backend = Self {
            surface,
            device,
            queue,
            surface_config,
            present_mode,
            quad_pipeline,
            composite_pipeline,
            textures: HashMap::new(),
            art_map: HashMap::new(),
            light_map: HashMap::new(),
            light_palette: Vec::new(),
            white: TextureHandle(0),
            next_texture_id: 1,
            uniform_write_offset: 0,
            bind_group_cache: HashMap::new(),
        };
        backend.white = backend.load_texture_from_rgba(&[255, 255, 255, 255], 1, 1)?;
        Ok(backend)
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.surface_config.width = new_size.width;
        self.surface_config.height = new_size.height;
        self.surface_config.present_mode = self.present_mode;
        self.surface.configure(&self.device, &self.surface_config);
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    fn begin_frame(&mut self, plan: &FramePlan) -> Result<Frame> {
        self.uniform_write_offset = 0;
        self.bind_group_cache.clear();

        let (surface_w, surface_h) = self.surface_size();
        // Upscale renders the world small and lets the composite filter
        // stretch it; direct renders 1:1.
        let world_size = match plan.world {
            Some(WorldTarget::Upscaled { scale }) if scale > 0.0 => (
                ((surface_w as f32 / scale) as u32).max(1),
                ((surface_h as f32 / scale) as u32).max(1),
            ),
            _ => (surface_w, surface_h),
        };

        loop {
            match self.surface.get_current_texture() {
                Ok(surface_texture) => {
                    let view = surface_texture
                        .texture
                        .create_view(&TextureViewDescriptor::default());
                    let encoder = self
                        .device
                        .create_command_encoder(&CommandEncoderDescriptor {
                            label: Some("frame-encoder"),
                        });

                    let format = self.surface_config.format;
                    let world_texture =
                        self.create_target("world-texture", world_size, format, false);
                    let world_view = world_texture.create_view(&TextureViewDescriptor::default());
                    let depth_texture = self.create_target(
                        "world-depth",
                        world_size,
                        TextureFormat::Depth32Float,
                        true,
                    );
                    let depth_view = depth_texture.create_view(&TextureViewDescriptor::default());
                    let light_texture =
                        self.create_target("light-map", world_size, format, false);
                    let light_view = light_texture.create_view(&TextureViewDescriptor::default());

                    return Ok(Frame {
                        surface_texture: Some(surface_texture),
                        view,
                        encoder: Some(encoder),
                        opaque_draws: Vec::new(),
                        transparent_draws: Vec::new(),
                        light_draws: Vec::new(),
                        overlay_draws: Vec::new(),
                        world_texture: Some(world_texture),
                        world_view: Some(world_view),
                        depth_texture: Some(depth_texture),
                        depth_view: Some(depth_view),
                        light_texture: Some(light_texture),
                        light_view: Some(light_view),
                        world_size,
                    });
                }
                Err(e) => match e {
                    wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                        self.surface.configure(&self.device, &self.surface_config);
                        continue;
                    }
                    wgpu::SurfaceError::Timeout => {
                        continue;
                    }
                    wgpu::SurfaceError::OutOfMemory => {
                        return Err(anyhow!("surface ran out of memory"));
                    }
                    wgpu::SurfaceError::Other => {
                        return Err(anyhow!("surface error"));
                    }
                },
            }
        }
    }

    fn create_target(
        &self,
        label: &str,
        size: (u32, u32),
        format: TextureFormat,
        depth: bool,
    ) -> Texture {
        let usage = if depth {
            TextureUsages::RENDER_ATTACHMENT
        } else {
            TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING
        };
        self.device.create_texture(&TextureDescriptor {
            label: Some(label),
            size: Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        })
    }

    fn queue_world(
        &mut self,
        frame: &mut Frame,
        graphic: u16,
        screen: Vec2,
        depth: i32,
        alpha: u8,
        transparent_pass: bool,
    ) {
        let handle = match self.art_map.get(&graphic) {
            Some(&handle) => handle,
            None => return, // art not loaded yet; skip for this frame
        };
        let size = match self.textures.get(&handle) {
            Some(entry) => entry.size,
            None => return,
        };
        let rect = Rect::new(screen.x, screen.y, size.0 as f32, size.1 as f32);
        let tint = [1.0, 1.0, 1.0, alpha as f32 / 255.0];
        // Map the signed isometric depth key into [0, 1] for the depth test.
        let depth_value = ((depth as f32) / 2_097_152.0 + 0.5).clamp(0.0, 1.0);
        if let Some(command) =
            self.write_quad_uniforms(frame.world_size, handle, rect, tint, depth_value)
        {
            if transparent_pass {
                frame.transparent_draws.push(command);
            } else {
                frame.opaque_draws.push(command);
            }
        }
    }

    fn queue_light(&mut self, frame: &mut Frame, light: &LightData) {
        let handle = match self.light_map.get(&light.shape) {
            Some(&handle) => handle,
            None => return,
        };
        let size = match self.textures.get(&handle) {
            Some(entry) => entry.size,
            None => return,
        };
        // Lights are centered on their draw position.
        let rect = Rect::new(
            light.x - size.0 as f32 * 0.5,
            light.y - size.1 as f32 * 0.5,
            size.0 as f32,
            size.1 as f32,
        );
        let rgb = self.light_color(light);
        if let Some(command) =
            self.write_quad_uniforms(frame.world_size, handle, rect, [rgb[0], rgb[1], rgb[2], 1.0], 0.0)
        {
            frame.light_draws.push(command);
        }
    }

    fn light_color(&self, light: &LightData) -> [f32; 3] {
        if light.color == 0 {
            return [1.0, 1.0, 1.0];
        }
        // Stored colors are offset by one; index 0 is reserved.
        let index = (light.color - 1) as usize;
        self.light_palette
            .get(index)
            .copied()
            .unwrap_or([1.0, 1.0, 1.0])
    }

    fn queue_overlay(
        &mut self,
        frame: &mut Frame,
        texture: TextureHandle,
        rect: Rect,
        color: [f32; 4],
    ) {
        if let Some(command) = self.write_quad_uniforms(self.surface_size(), texture, rect, color, 0.0)
        {
            frame.overlay_draws.push(command);
        }
    }

    /// Writes one quad's uniforms at the next aligned slot and returns the
    /// draw command, or None when the frame's quad budget is exhausted.
    fn write_quad_uniforms(
        &mut self,
        target_size: (u32, u32),
        texture: TextureHandle,
        rect: Rect,
        tint: [f32; 4],
        depth: f32,
    ) -> Option<QuadDrawCommand> {
        let alignment = self.quad_pipeline.uniform_alignment;
        if self.uniform_write_offset >= MAX_QUADS_PER_FRAME as u64 * alignment {
            log::warn!("quad budget exhausted, dropping draw");
            return None;
        }

        let projection = crate::math::screen_projection(target_size.0, target_size.1, 1.0);
        let model = Mat4::from_translation(Vec3::new(rect.x, rect.y, 0.0))
            * Mat4::from_scale(Vec3::new(rect.width, rect.height, 1.0));
        let uniforms = QuadUniforms {
            mvp: (projection * model).to_cols_array_2d(),
            tint,
            depth,
            _pad: [0.0; 3],
        };

        let offset = self.uniform_write_offset;
        self.queue.write_buffer(
            &self.quad_pipeline.uniform_buffer,
            offset,
            bytemuck::bytes_of(&uniforms),
        );
        self.uniform_write_offset = offset + alignment;

        self.ensure_bind_group(texture)?;
        Some(QuadDrawCommand {
            uniform_offset: offset,
            texture,
        })
    }

    fn ensure_bind_group(&mut self, texture: TextureHandle) -> Option<()> {
        if self.bind_group_cache.contains_key(&texture) {
            return Some(());
        }
        let entry = self.textures.get(&texture)?;
        let uniform_size = std::mem::size_of::<QuadUniforms>() as u64;
        let bind_group = self.device.create_bind_group(&BindGroupDescriptor {
            label: Some("quad-bind-group"),
            layout: &self.quad_pipeline.bind_group_layout,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &self.quad_pipeline.uniform_buffer,
                        offset: 0,
                        size: std::num::NonZeroU64::new(uniform_size),
                    }),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::TextureView(&entry.view),
                },
                BindGroupEntry {
                    binding: 2,
                    resource: BindingResource::Sampler(&entry.sampler),
                },
            ],
        });
        self.bind_group_cache.insert(texture, bind_group);
        Some(())
    }

    fn end_frame(&mut self, mut frame: Frame, plan: &FramePlan) -> Result<()> {
        if plan.world.is_some() {
            self.flush_world(&mut frame)?;
            self.flush_lights(&mut frame, plan.lights)?;
            self.composite(&mut frame, plan.lights)?;
        } else {
            self.clear_surface(&mut frame)?;
        }
        self.flush_overlays(&mut frame)?;

        let encoder = frame
            .encoder
            .take()
            .ok_or_else(|| anyhow!("frame already ended"))?;
        self.queue.submit(Some(encoder.finish()));

        drop(frame.world_texture.take());
        drop(frame.world_view.take());
        drop(frame.depth_texture.take());
        drop(frame.depth_view.take());
        drop(frame.light_texture.take());
        drop(frame.light_view.take());

        let surface_texture = frame
            .surface_texture
            .take()
            .ok_or_else(|| anyhow!("frame already ended"))?;
        surface_texture.present();
        Ok(())
    }

    /// World pass: opaque categories painter-ordered with depth writes, then
    /// the transparent list tested against that depth.
    fn flush_world(&mut self, frame: &mut Frame) -> Result<()> {
        let encoder = frame
            .encoder
            .as_mut()
            .ok_or_else(|| anyhow!("frame already ended"))?;
        let world_view = frame
            .world_view
            .as_ref()
            .ok_or_else(|| anyhow!("world target missing"))?;
        let depth_view = frame
            .depth_view
            .as_ref()
            .ok_or_else(|| anyhow!("depth target missing"))?;

        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("world-pass"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view: world_view,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(Operations {
                    load: LoadOp::Clear(0.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            multiview_mask: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        pass.set_vertex_buffer(0, self.quad_pipeline.vertex_buffer.slice(..));
        pass.set_pipeline(&self.quad_pipeline.opaque);
        for command in &frame.opaque_draws {
            if let Some(bind_group) = self.bind_group_cache.get(&command.texture) {
                pass.set_bind_group(0, bind_group, &[command.uniform_offset as u32]);
                pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
            }
        }
        pass.set_pipeline(&self.quad_pipeline.transparent);
        for command in &frame.transparent_draws {
            if let Some(bind_group) = self.bind_group_cache.get(&command.texture) {
                pass.set_bind_group(0, bind_group, &[command.uniform_offset as u32]);
                pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
            }
        }
        drop(pass);
        Ok(())
    }

    /// Light pass: clear the light map to the plan's ambient level, then
    /// accumulate light sprites additively.
    fn flush_lights(&mut self, frame: &mut Frame, pass_config: Option<LightPass>) -> Result<()> {
        let encoder = frame
            .encoder
            .as_mut()
            .ok_or_else(|| anyhow!("frame already ended"))?;
        let light_view = frame
            .light_view
            .as_ref()
            .ok_or_else(|| anyhow!("light target missing"))?;

        // Without a light pass the map clears to white so the multiply
        // composite leaves the scene untouched.
        let clear = match pass_config {
            Some(pass) => pass.clear_level as f64,
            None => 1.0,
        };

        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("light-pass"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view: light_view,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Clear(wgpu::Color {
                        r: clear,
                        g: clear,
                        b: clear,
                        a: 1.0,
                    }),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            multiview_mask: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        if pass_config.is_some() {
            pass.set_pipeline(&self.quad_pipeline.additive);
            pass.set_vertex_buffer(0, self.quad_pipeline.vertex_buffer.slice(..));
            for command in &frame.light_draws {
                if let Some(bind_group) = self.bind_group_cache.get(&command.texture) {
                    pass.set_bind_group(0, bind_group, &[command.uniform_offset as u32]);
                    pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
                }
            }
        }
        drop(pass);
        Ok(())
    }

    /// Final composite: world x light map onto the swapchain, stretching the
    /// world target when the upscale filter is active.
    fn composite(&mut self, frame: &mut Frame, lights: Option<LightPass>) -> Result<()> {
        let world_view = frame
            .world_view
            .as_ref()
            .ok_or_else(|| anyhow!("world target missing"))?;
        let light_view = frame
            .light_view
            .as_ref()
            .ok_or_else(|| anyhow!("light target missing"))?;

        let mode = match lights.map(|l| l.blend) {
            Some(LightBlend::Alternate) => 1.0,
            _ => 0.0,
        };
        self.queue.write_buffer(
            &self.composite_pipeline.uniform_buffer,
            0,
            bytemuck::bytes_of(&CompositeUniforms {
                mode,
                _pad: [0.0; 3],
            }),
        );

        let sampler = self.device.create_sampler(&SamplerDescriptor {
            label: Some("composite-sampler"),
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let bind_group = self.device.create_bind_group(&BindGroupDescriptor {
            label: Some("composite-bind-group"),
            layout: &self.composite_pipeline.bind_group_layout,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::TextureView(world_view),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::Sampler(&sampler),
                },
                BindGroupEntry {
                    binding: 2,
                    resource: BindingResource::TextureView(light_view),
                },
                BindGroupEntry {
                    binding: 3,
                    resource: BindingResource::Sampler(&sampler),
                },
                BindGroupEntry {
                    binding: 4,
                    resource: BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &self.composite_pipeline.uniform_buffer,
                        offset: 0,
                        size: std::num::NonZeroU64::new(
                            std::mem::size_of::<CompositeUniforms>() as u64
                        ),
                    }),
                },
            ],
        });

        let encoder = frame
            .encoder
            .as_mut()
            .ok_or_else(|| anyhow!("frame already ended"))?;
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("composite-pass"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view: &frame.view,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            multiview_mask: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        // The composite owns the full window again; restore the viewport the
        // world pass may have narrowed.
        let (w, h) = self.surface_size();
        pass.set_viewport(0.0, 0.0, w as f32, h as f32, 0.0, 1.0);
        pass.set_pipeline(&self.composite_pipeline.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_vertex_buffer(0, self.composite_pipeline.vertex_buffer.slice(..));
        pass.draw(0..FULLSCREEN_VERTICES.len() as u32, 0..1);
        drop(pass);
        Ok(())
    }

    fn clear_surface(&mut self, frame: &mut Frame) -> Result<()> {
        let encoder = frame
            .encoder
            .as_mut()
            .ok_or_else(|| anyhow!("frame already ended"))?;
        let pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("clear-pass"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view: &frame.view,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            multiview_mask: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        drop(pass);
        Ok(())
    }

    /// Overlays draw straight onto the swapchain after the composite, so
    /// text, bars, and the selection rectangle always sit on top.
    fn flush_overlays(&mut self, frame: &mut Frame) -> Result<()> {
        if frame.overlay_draws.is_empty() {
            return Ok(());
        }
        let encoder = frame
            .encoder
            .as_mut()
            .ok_or_else(|| anyhow!("frame already ended"))?;
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("overlay-pass"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view: &frame.view,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            multiview_mask: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.quad_pipeline.overlay);
        pass.set_vertex_buffer(0, self.quad_pipeline.vertex_buffer.slice(..));
        for command in &frame.overlay_draws {
            if let Some(bind_group) = self.bind_group_cache.get(&command.texture) {
                pass.set_bind_group(0, bind_group, &[command.uniform_offset as u32]);
                pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
            }
        }
        drop(pass);
        Ok(())
    }

    fn load_texture_from_rgba(
        &mut self,
        data: &[u8],
        width: u32,
        height: u32,
    ) -> Result<TextureHandle> {
        let size = Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&TextureDescriptor {
            label: Some("texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8UnormSrgb,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.queue.write_texture(
            TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: Origin3d::ZERO,
                aspect: TextureAspect::All,
            },
            data,
            TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&TextureViewDescriptor::default());
        let sampler = self.device.create_sampler(&SamplerDescriptor {
            label: Some("texture-sampler"),
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let handle = TextureHandle(self.next_texture_id);
        self.next_texture_id += 1;
        self.textures.insert(
            handle,
            TextureEntry {
                texture,
                view,
                sampler,
                size: (width, height),
            },
        );
        Ok(handle)
    }
}

fn choose_present_mode(available: &[PresentMode], vsync: bool) -> PresentMode {
    if vsync {
        PresentMode::AutoVsync
    } else if available.contains(&PresentMode::Immediate) {
        PresentMode::Immediate
    } else {
        PresentMode::AutoNoVsync
    }
}

fn quad_bind_group_layout(device: &wgpu::Device) -> BindGroupLayout {
    device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("quad-bind-group-layout"),
        entries: &[
            BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: std::num::NonZeroU64::new(
                        std::mem::size_of::<QuadUniforms>() as u64,
                    ),
                },
                count: None,
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: true },
                    view_dimension: TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: BindingType::Sampler(SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

fn create_quad_pipelines(device: &wgpu::Device, surface_format: TextureFormat) -> QuadPipeline {
    let shader = device.create_shader_module(ShaderModuleDescriptor {
        label: Some("quad-shader"),
        source: ShaderSource::Wgsl(include_str!("quad.wgsl").into()),
    });

    let bind_group_layout = quad_bind_group_layout(device);
    let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some("quad-pipeline-layout"),
        bind_group_layouts: &[&bind_group_layout],
        immediate_size: 0,
    });

    let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("quad-vertices"),
        contents: bytemuck::cast_slice(&QUAD_VERTICES),
        usage: BufferUsages::VERTEX,
    });

    let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
    let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("quad-uniform-buffer"),
        size: uniform_alignment * MAX_QUADS_PER_FRAME as u64,
        usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let make = |label: &str,
                blend: wgpu::BlendState,
                depth_stencil: Option<DepthStencilState>|
     -> RenderPipeline {
        device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            vertex: VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &vertex_attr_array![0 => Float32x2, 1 => Float32x2],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(ColorTargetState {
                    format: surface_format,
                    blend: Some(blend),
                    write_mask: ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: PrimitiveState::default(),
            depth_stencil,
            multisample: MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        })
    };

    let additive_blend = wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Add,
        },
    };

    let opaque = make(
        "world-opaque-pipeline",
        wgpu::BlendState::ALPHA_BLENDING,
        Some(DepthStencilState {
            format: TextureFormat::Depth32Float,
            depth_write_enabled: true,
            depth_compare: CompareFunction::Always,
            stencil: Default::default(),
            bias: Default::default(),
        }),
    );
    let transparent = make(
        "world-transparent-pipeline",
        wgpu::BlendState::ALPHA_BLENDING,
        Some(DepthStencilState {
            format: TextureFormat::Depth32Float,
            depth_write_enabled: false,
            depth_compare: CompareFunction::GreaterEqual,
            stencil: Default::default(),
            bias: Default::default(),
        }),
    );
    let additive = make("light-additive-pipeline", additive_blend, None);
    let overlay = make("overlay-pipeline", wgpu::BlendState::ALPHA_BLENDING, None);

    QuadPipeline {
        opaque,
        transparent,
        additive,
        overlay,
        bind_group_layout,
        vertex_buffer,
        uniform_buffer,
        uniform_alignment,
    }
}

fn create_composite_pipeline(
    device: &wgpu::Device,
    surface_format: TextureFormat,
) -> CompositePipeline {
    let shader = device.create_shader_module(ShaderModuleDescriptor {
        label: Some("composite-shader"),
        source: ShaderSource::Wgsl(include_str!("composite.wgsl").into()),
    });

    let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("composite-bind-group-layout"),
        entries: &[
            BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: true },
                    view_dimension: TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: BindingType::Sampler(SamplerBindingType::Filtering),
                count: None,
            },
            BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: true },
                    view_dimension: TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: BindingType::Sampler(SamplerBindingType::Filtering),
                count: None,
            },
            BindGroupLayoutEntry {
                binding: 4,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: std::num::NonZeroU64::new(
                        std::mem::size_of::<CompositeUniforms>() as u64,
                    ),
                },
                count: None,
            },
        ],
    });

    let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some("composite-pipeline-layout"),
        bind_group_layouts: &[&bind_group_layout],
        immediate_size: 0,
    });

    let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("composite-vertices"),
        contents: bytemuck::cast_slice(&FULLSCREEN_VERTICES),
        usage: BufferUsages::VERTEX,
    });

    let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("composite-uniform-buffer"),
        size: std::mem::size_of::<CompositeUniforms>() as u64,
        usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some("composite-pipeline"),
        layout: Some(&pipeline_layout),
        vertex: VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &vertex_attr_array![0 => Float32x2, 1 => Float32x2],
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(ColorTargetState {
                format: surface_format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: PrimitiveState::default(),
        depth_stencil: None,
        multisample: MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    });

    CompositePipeline {
        pipeline,
        bind_group_layout,
        vertex_buffer,
        uniform_buffer,
    }
}
