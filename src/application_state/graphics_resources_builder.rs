//! # Graphics Resources Builder
//!
//! Creates the headless WebGPU context used by the extraction backend. No
//! window or surface is involved: surface extraction only needs an adapter
//! that supports compute shaders and storage buffers.
//!
//! The main components are:
//! - `Graphics`: The adapter, device and queue handles
//! - `GraphicsBuilder`: Requests those handles, blocking on native targets

use std::future::Future;

use log::info;
use wgpu::{Adapter, Device, Instance, Queue};

use crate::{
    core::StSystem,
    error::{Result, TerrainError},
};

/// GPU handles shared by everything that records GPU work.
pub struct Graphics {
    /// Instance the adapter was enumerated from
    pub instance: Instance,
    /// Selected adapter
    pub adapter: Adapter,
    /// Logical device, shared with the buffer registry
    pub device: StSystem<Device>,
    /// Submission queue, shared with the buffer registry
    pub queue: StSystem<Queue>,
}

impl Graphics {
    /// Human-readable adapter description for logs.
    pub fn adapter_summary(&self) -> String {
        let info = self.adapter.get_info();
        format!("{} ({:?}, {:?})", info.name, info.device_type, info.backend)
    }
}

/// Options for requesting the headless context.
#[derive(Debug, Clone)]
pub struct GraphicsBuilder {
    /// Backends to enumerate
    pub backends: wgpu::Backends,
    /// Preferred adapter power class
    pub power_preference: wgpu::PowerPreference,
    /// Accept only a software (fallback) adapter
    pub force_fallback_adapter: bool,
}

impl Default for GraphicsBuilder {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::PRIMARY,
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
        }
    }
}

impl GraphicsBuilder {
    /// Creates a builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asynchronously requests an adapter and device.
    ///
    /// The device is created with the adapter's own limits so that large
    /// point and triangle buffers can be bound as storage.
    pub fn create_graphics(&self) -> impl Future<Output = Result<Graphics>> + 'static {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: self.backends,
            ..Default::default()
        });
        let options = self.clone();

        async move {
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: options.power_preference,
                    compatible_surface: None,
                    force_fallback_adapter: options.force_fallback_adapter,
                })
                .await
                .map_err(|e| TerrainError::AdapterUnavailable(e.to_string()))?;

            let (device, queue) = adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: Some("Terrain Extraction Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::MemoryUsage,
                    trace: wgpu::Trace::Off,
                })
                .await
                .map_err(|e| TerrainError::DeviceRequest(e.to_string()))?;

            let graphics = Graphics {
                instance,
                adapter,
                device: StSystem::new(Box::new(device)),
                queue: StSystem::new(Box::new(queue)),
            };
            info!("GPU context ready on {}", graphics.adapter_summary());
            Ok(graphics)
        }
    }

    /// Requests the context and blocks until it is ready.
    pub fn build_blocking(&self) -> Result<Graphics> {
        pollster::block_on(self.create_graphics())
    }
}
