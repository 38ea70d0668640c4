use anyhow::Context as _;

use crate::error::{TileError, TileResult};

/// Device, queue and what the adapter can do.
///
/// The engines never own a window or surface; a host either hands over the
/// device it already renders with ([`Context::from_device`]) or lets the
/// crate create one without a surface ([`Context::headless`]).
#[derive(Debug)]
pub struct Context {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
    pub limits: wgpu::Limits,
    pub downlevel: wgpu::DownlevelCapabilities,
}

impl Context {
    pub async fn headless() -> anyhow::Result<Self> {
        // BackendBit::PRIMARY => Vulkan + Metal + DX12 + Browser WebGPU
        log::info!("WGPU setup");
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("no suitable GPU adapter")?;

        log::info!("device and queue");
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("flow-ribbon device"),
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features, so if
                // we're building for the web we'll have to disable some.
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("could not open a device")?;

        Ok(Self::from_device(&adapter, device, queue))
    }

    /// Wraps a device the host already has.
    pub fn from_device(adapter: &wgpu::Adapter, device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let adapter_info = adapter.get_info();
        let downlevel = adapter.get_downlevel_capabilities();
        let limits = device.limits();
        log::info!(
            "Using {} ({:?}), max {} texture array layers",
            adapter_info.name,
            adapter_info.backend,
            limits.max_texture_array_layers
        );
        Self {
            device,
            queue,
            adapter_info,
            limits,
            downlevel,
        }
    }

    /// Fails unless the device can sample 2D array textures with `layers` layers.
    pub fn ensure_array_textures(&self, layers: u32) -> TileResult<()> {
        if self.limits.max_texture_array_layers == 0 {
            return Err(TileError::missing_capability(format!(
                "{:?} backend reports no array texture support",
                self.adapter_info.backend
            )));
        }
        if layers > self.limits.max_texture_array_layers {
            return Err(TileError::missing_capability(format!(
                "{layers} layers requested, the device allows {}",
                self.limits.max_texture_array_layers
            )));
        }
        Ok(())
    }
}
