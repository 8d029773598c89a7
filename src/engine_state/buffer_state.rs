//! # Buffer State Module
//!
//! A named registry for the GPU buffers the extraction backend owns. It
//! handles buffer creation, bounds-checked writes, blocking readback and
//! explicit release, and records how much memory each buffer occupies.
//!
//! ## Lifecycle
//!
//! Buffers are created under a static name and live until `destroy_buffer`
//! or `release_all` is called, or the registry is dropped. Creating a buffer
//! under a name that is already taken destroys the old buffer first, so a
//! resize can never leak the previous allocation.
//!
//! ## Allocation Failures
//!
//! wgpu reports out-of-memory and validation problems asynchronously through
//! error scopes. `create_buffer` wraps each allocation in both scopes and turns
//! a captured error into a `TerrainError` before the buffer is registered.

use std::collections::HashMap;
use std::sync::mpsc;

use log::{debug, trace};
use wgpu::{Buffer, Device, MapMode, Queue};

use crate::{
    core::{StResource, StSystem},
    error::{Result, TerrainError},
};

/// Analytics data for a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferAnalytics {
    /// Total memory allocated for the buffer in bytes
    pub allocated_memory: u64,
    /// Highest byte offset written so far
    pub used_memory: u64,
    /// Number of times the buffer has been written to
    pub times_written: u64,
}

/// Central registry for GPU buffers
///
/// # Examples
///
/// ```no_run
/// use marching_terrain::application_state::GraphicsBuilder;
/// use marching_terrain::engine_state::buffer_state::BufferState;
///
/// let graphics = GraphicsBuilder::new().build_blocking()?;
/// let mut buffer_state = BufferState::new(graphics.device.clone(), graphics.queue.clone());
///
/// buffer_state.create_buffer(
///     "scratch",
///     wgpu::BufferDescriptor {
///         label: Some("Scratch Buffer"),
///         size: 256,
///         usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
///         mapped_at_creation: false,
///     },
/// )?;
/// buffer_state.write_buffer("scratch", 0, &[0u8; 64])?;
/// assert_eq!(buffer_state.get_total_used_memory(), 64);
/// # Ok::<(), marching_terrain::TerrainError>(())
/// ```
pub struct BufferState {
    /// Reference to the GPU device
    pub device: StSystem<Device>,
    /// Reference to the GPU command queue
    pub queue: StSystem<Queue>,
    /// Map of buffer names to buffer objects
    buffers: HashMap<&'static str, Buffer>,
    /// Analytics data for each buffer
    buffer_analytics: StResource<HashMap<&'static str, BufferAnalytics>>,
}

impl BufferState {
    /// Creates an empty registry bound to `device` and `queue`.
    pub fn new(device: StSystem<Device>, queue: StSystem<Queue>) -> Self {
        Self {
            device,
            queue,
            buffers: HashMap::new(),
            buffer_analytics: StResource::new(HashMap::new()),
        }
    }

    /// Creates an empty buffer, replacing (and destroying) any buffer already
    /// registered under `buffer_name`.
    ///
    /// # Errors
    ///
    /// Returns `GpuAllocation` when the device reports an out-of-memory or
    /// validation error for the allocation.
    pub fn create_buffer(
        &mut self,
        buffer_name: &'static str,
        buffer_descriptor: wgpu::BufferDescriptor,
    ) -> Result<()> {
        self.destroy_buffer(buffer_name);

        let buffer = {
            let device = self.device.get();
            device.push_error_scope(wgpu::ErrorFilter::Validation);
            device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
            let buffer = device.create_buffer(&buffer_descriptor);
            let out_of_memory = pollster::block_on(device.pop_error_scope());
            let validation = pollster::block_on(device.pop_error_scope());

            if let Some(error) = out_of_memory.or(validation) {
                buffer.destroy();
                return Err(TerrainError::GpuAllocation {
                    name: buffer_name,
                    message: error.to_string(),
                });
            }
            buffer
        };

        trace!(
            "Created buffer '{}' ({} bytes)",
            buffer_name,
            buffer_descriptor.size
        );
        self.buffers.insert(buffer_name, buffer);
        self.buffer_analytics.get_mut().insert(
            buffer_name,
            BufferAnalytics {
                allocated_memory: buffer_descriptor.size,
                used_memory: 0,
                times_written: 0,
            },
        );
        Ok(())
    }

    /// Writes raw bytes into a buffer through the queue.
    ///
    /// The write is staged and lands before the next submission on the queue.
    pub fn write_buffer(
        &self,
        buffer_name: &'static str,
        offset: wgpu::BufferAddress,
        data: &[u8],
    ) -> Result<()> {
        let buffer = self.get_buffer(buffer_name)?;
        let mut buffer_dictionary = self.buffer_analytics.get_mut();
        let buffer_analytics = buffer_dictionary
            .get_mut(buffer_name)
            .ok_or(TerrainError::MissingBuffer(buffer_name))?;

        let buffer_size = buffer_analytics.allocated_memory;
        let data_size = data.len() as u64;

        if offset + data_size > buffer_size {
            return Err(TerrainError::BufferWriteOutOfBounds {
                name: buffer_name,
                offset,
                len: data_size,
                size: buffer_size,
            });
        }

        self.queue.get().write_buffer(buffer, offset, data);
        buffer_analytics.used_memory = buffer_analytics.used_memory.max(offset + data_size);
        buffer_analytics.times_written += 1;
        Ok(())
    }

    /// Maps the first `len` bytes of a `MAP_READ` buffer, copies them out and
    /// unmaps again. Blocks until all submitted work touching the buffer is
    /// complete.
    pub fn read_buffer(&self, buffer_name: &'static str, len: u64) -> Result<Vec<u8>> {
        let buffer = self.get_buffer(buffer_name)?;
        if len == 0 {
            return Ok(Vec::new());
        }
        if len > buffer.size() {
            return Err(TerrainError::BufferWriteOutOfBounds {
                name: buffer_name,
                offset: 0,
                len,
                size: buffer.size(),
            });
        }

        let slice = buffer.slice(..len);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        self.device
            .get()
            .poll(wgpu::PollType::Wait)
            .map_err(|e| TerrainError::BufferMap {
                name: buffer_name,
                message: e.to_string(),
            })?;

        receiver
            .recv()
            .map_err(|e| TerrainError::BufferMap {
                name: buffer_name,
                message: e.to_string(),
            })?
            .map_err(|e| TerrainError::BufferMap {
                name: buffer_name,
                message: e.to_string(),
            })?;

        let bytes = slice.get_mapped_range().to_vec();
        buffer.unmap();
        Ok(bytes)
    }

    /// Gets a reference to a buffer by name
    pub fn get_buffer(&self, buffer_name: &'static str) -> Result<&Buffer> {
        self.buffers
            .get(buffer_name)
            .ok_or(TerrainError::MissingBuffer(buffer_name))
    }

    /// Gets a binding resource for the entire buffer
    pub fn get_entire_binding(&self, buffer_name: &'static str) -> Result<wgpu::BindingResource> {
        Ok(self.get_buffer(buffer_name)?.as_entire_binding())
    }

    /// Destroys and unregisters a buffer. Returns whether one existed.
    pub fn destroy_buffer(&mut self, buffer_name: &'static str) -> bool {
        self.buffer_analytics.get_mut().remove(buffer_name);
        match self.buffers.remove(buffer_name) {
            Some(buffer) => {
                buffer.destroy();
                trace!("Destroyed buffer '{}'", buffer_name);
                true
            }
            None => false,
        }
    }

    /// Destroys every registered buffer.
    pub fn release_all(&mut self) {
        let released = self.buffers.len();
        for (_, buffer) in self.buffers.drain() {
            buffer.destroy();
        }
        self.buffer_analytics.get_mut().clear();
        if released > 0 {
            debug!("Released {} GPU buffers", released);
        }
    }

    /// Gets the total allocated memory across all buffers
    pub fn get_total_allocated_memory(&self) -> u64 {
        self.buffer_analytics
            .get()
            .values()
            .map(|analytics| analytics.allocated_memory)
            .sum()
    }

    /// Gets the total used memory across all buffers
    pub fn get_total_used_memory(&self) -> u64 {
        self.buffer_analytics
            .get()
            .values()
            .map(|analytics| analytics.used_memory)
            .sum()
    }
}

impl Drop for BufferState {
    fn drop(&mut self) {
        self.release_all();
    }
}
