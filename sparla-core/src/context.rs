use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use bytemuck::{Pod, Zeroable};
use wgpu::{util::DeviceExt, PollType};

use crate::error::{Result, SparlaCoreError};

/// Wrapper for the WGPU device and queue, with host/device transfer
/// counters. Internal to the crate; users go through `GpuDevice`.
#[derive(Debug, Clone)]
pub(crate) struct GpuContext {
    pub(crate) device: Arc<wgpu::Device>,
    pub(crate) queue: Arc<wgpu::Queue>,
    /// Bytes transferred from host to device via the instrumented helpers.
    pub(crate) bytes_to_gpu: Arc<AtomicU64>,
    /// Bytes transferred from device to host via the instrumented helpers.
    pub(crate) bytes_from_gpu: Arc<AtomicU64>,
}

impl GpuContext {
    /// Initializes the WGPU context asynchronously. Compute-only: no
    /// surface is requested.
    pub(crate) async fn new() -> Result<Self> {
        log::info!("Initializing WGPU context");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| SparlaCoreError::WgpuInit("no suitable adapter found".to_string()))?;

        log::info!("Selected adapter: {:?}", adapter.get_info());

        let mut limits = wgpu::Limits::default().using_resolution(adapter.limits());
        // SpMV binds up to six storage buffers in one shader stage.
        limits.max_storage_buffers_per_shader_stage =
            limits.max_storage_buffers_per_shader_stage.max(6);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("sparla-core device"),
                trace: wgpu::Trace::Off,
                memory_hints: wgpu::MemoryHints::Performance,
                // Kernels accumulate in f64.
                required_features: wgpu::Features::SHADER_F64,
                required_limits: limits,
            })
            .await
            .map_err(|e| SparlaCoreError::WgpuInit(format!("failed to request device: {}", e)))?;

        if !device.features().contains(wgpu::Features::SHADER_F64) {
            return Err(SparlaCoreError::WgpuInit(
                "adapter does not support SHADER_F64".to_string(),
            ));
        }
        log::info!("Device and queue obtained, SHADER_F64 enabled");

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            bytes_to_gpu: Arc::new(AtomicU64::new(0)),
            bytes_from_gpu: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Creates a GPU buffer initialized with `contents`, counting the
    /// transfer.
    pub(crate) fn create_gpu_buffer_with_data(
        &self,
        label: &str,
        contents: &[u8],
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        let byte_len = contents.len() as u64;
        log::debug!("Creating GPU buffer '{}' with {} bytes", label, byte_len);
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage,
            });
        self.bytes_to_gpu.fetch_add(byte_len, Ordering::Relaxed);
        buffer
    }

    /// Creates an uninitialized GPU buffer, typically for kernel outputs.
    pub(crate) fn create_empty_buffer(
        &self,
        label: &str,
        size: u64,
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        log::debug!("Creating empty GPU buffer '{}' of size {}", label, size);
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    /// Writes a host slice into an existing GPU buffer, counting the
    /// transfer.
    pub(crate) fn write_buffer<T: Pod>(&self, buffer: &wgpu::Buffer, data: &[T]) -> Result<()> {
        let byte_len = (std::mem::size_of_val(data)) as u64;
        if byte_len == 0 {
            return Ok(());
        }
        if buffer.size() < byte_len {
            return Err(SparlaCoreError::Internal(format!(
                "target buffer size ({}) is smaller than data size ({})",
                buffer.size(),
                byte_len
            )));
        }
        if !buffer.usage().contains(wgpu::BufferUsages::COPY_DST) {
            return Err(SparlaCoreError::Internal(
                "target buffer must have COPY_DST usage".to_string(),
            ));
        }
        self.queue.write_buffer(buffer, 0, bytemuck::cast_slice(data));
        self.bytes_to_gpu.fetch_add(byte_len, Ordering::Relaxed);
        Ok(())
    }

    /// Reads the contents of a GPU buffer back to the host through a
    /// staging buffer.
    pub(crate) async fn read_buffer_to_cpu<T: Pod + Zeroable>(
        &self,
        buffer: &wgpu::Buffer,
        element_count: usize,
    ) -> Result<Vec<T>> {
        let element_size = std::mem::size_of::<T>();
        let size_bytes = (element_count * element_size) as u64;
        if size_bytes == 0 {
            return Ok(Vec::new());
        }
        if buffer.size() < size_bytes {
            return Err(SparlaCoreError::Internal(format!(
                "GPU buffer size ({}) is smaller than the {} bytes requested",
                buffer.size(),
                size_bytes
            )));
        }

        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback staging buffer"),
            size: size_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging_buffer, 0, size_bytes);
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            if sender.send(result).is_err() {
                log::error!("readback receiver dropped before map completed");
            }
        });

        self.bytes_from_gpu.fetch_add(size_bytes, Ordering::Relaxed);
        let _ = self.device.poll(PollType::Wait);

        match receiver.await {
            Ok(Ok(())) => {
                let result = {
                    let data = buffer_slice.get_mapped_range();
                    let mapped_len = data.len();
                    if mapped_len != size_bytes as usize {
                        drop(data);
                        staging_buffer.unmap();
                        return Err(SparlaCoreError::Internal(format!(
                            "mapped {} bytes, expected {}",
                            mapped_len, size_bytes
                        )));
                    }
                    bytemuck::cast_slice(&data).to_vec()
                };
                staging_buffer.unmap();
                Ok(result)
            }
            Ok(Err(e)) => Err(SparlaCoreError::Wgpu(format!("buffer mapping failed: {}", e))),
            Err(_) => Err(SparlaCoreError::Internal(
                "channel receive error during buffer mapping".to_string(),
            )),
        }
    }

    /// Blocks until all submitted work has completed.
    pub(crate) fn wait_idle(&self) {
        let _ = self.device.poll(PollType::Wait);
    }

    pub(crate) fn get_transfer_stats(&self) -> (u64, u64) {
        (
            self.bytes_to_gpu.load(Ordering::Relaxed),
            self.bytes_from_gpu.load(Ordering::Relaxed),
        )
    }

    pub(crate) fn reset_transfer_stats(&self) {
        self.bytes_to_gpu.store(0, Ordering::Relaxed);
        self.bytes_from_gpu.store(0, Ordering::Relaxed);
    }
}
