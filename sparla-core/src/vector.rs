use std::{mem, sync::Arc};

use crate::context::GpuContext;
use crate::error::{Result, SparlaCoreError};
use crate::traits::Vector;

/// A dense `f64` vector resident in GPU memory.
///
/// Created through `GpuDevice::create_vector` / `create_empty_vector`;
/// reading and writing cross the host/device boundary as single bulk
/// transfers.
#[derive(Debug)]
pub struct GpuVector {
    buffer: wgpu::Buffer,
    size: usize,
    size_bytes: u64,
    label: String,
    pub(crate) context: Arc<GpuContext>,
}

impl GpuVector {
    /// Internal constructor used by `GpuDevice`.
    pub(crate) fn new_internal(
        buffer: wgpu::Buffer,
        size: usize,
        label: String,
        context: Arc<GpuContext>,
    ) -> Self {
        let size_bytes = (size * mem::size_of::<f64>()) as u64;
        Self {
            buffer,
            size,
            size_bytes,
            label,
            context,
        }
    }

    pub(crate) fn inner(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Number of `f64` elements.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Size of the underlying buffer in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn as_entire_binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }

    /// True when both vectors live on the same logical device.
    pub(crate) fn same_context(&self, other: &GpuVector) -> bool {
        Arc::ptr_eq(&self.context, &other.context)
    }

    /// Reads the vector's contents back to the host. Synchronizes with the
    /// device.
    pub async fn read_contents(&self) -> Result<Vec<f64>> {
        self.context
            .read_buffer_to_cpu(self.inner(), self.size())
            .await
    }

    /// Writes a host slice into this vector.
    pub fn write_contents(&self, data: &[f64]) -> Result<()> {
        if data.len() != self.size {
            return Err(SparlaCoreError::ShapeMismatch(format!(
                "data length ({}) does not match vector size ({})",
                data.len(),
                self.size
            )));
        }
        self.context.write_buffer(self.inner(), data)
    }

    /// Copies the contents of `source` into this vector on the device.
    pub fn clone_from(&mut self, source: &GpuVector) -> Result<()> {
        if !self.same_context(source) {
            return Err(SparlaCoreError::MemorySpaceMismatch(
                "vectors belong to different devices".to_string(),
            ));
        }
        if self.size != source.size {
            return Err(SparlaCoreError::ShapeMismatch(format!(
                "vector sizes for clone_from mismatch: {} != {}",
                self.size, source.size
            )));
        }
        if self.size_bytes == 0 {
            return Ok(());
        }

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("GpuVector clone_from encoder"),
                });
        encoder.copy_buffer_to_buffer(source.inner(), 0, self.inner(), 0, self.size_bytes);
        self.context.queue.submit(Some(encoder.finish()));
        self.context.wait_idle();
        Ok(())
    }
}

impl Vector for GpuVector {
    type Value = f64;

    fn len(&self) -> usize {
        self.size()
    }
}
