use crate::buffer::GpuBuffer;
use crate::dev::GpuDispatch;
use crate::error::DeviceError;
use crate::tex::GpuTexture;

/// The subset of a graphics device that atlas pages and instance buffers need.
///
/// Implementations are only ever driven from the thread that owns them, so
/// nothing here requires `Sync`.
pub trait UploadDevice {
    type Texture;
    type Buffer;

    /// Largest texture edge the device accepts.
    fn max_texture_dimension(&self) -> u32;

    fn create_texture(
        &self,
        width: u32,
        height: u32,
        label: &str,
    ) -> Result<Self::Texture, DeviceError>;

    /// Upload `extent` texels to `origin`. `data` begins at the first texel
    /// and advances `bytes_per_row` per row.
    fn write_texture(
        &self,
        texture: &Self::Texture,
        origin: (u32, u32),
        extent: (u32, u32),
        bytes_per_row: u32,
        data: &[u8],
    );

    fn create_buffer(&self, size: u64, label: &str) -> Result<Self::Buffer, DeviceError>;

    fn write_buffer(&self, buffer: &Self::Buffer, data: &[u8]);
}

impl GpuDispatch {
    /// Run an allocation inside validation and out-of-memory error scopes so
    /// refusals come back as values instead of reaching the uncaptured handler.
    fn scoped_allocation<T>(
        &self,
        label: &str,
        allocate: impl FnOnce() -> T,
    ) -> Result<T, DeviceError> {
        let device = self.device();
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let value = allocate();
        let oom = futures::executor::block_on(device.pop_error_scope());
        let validation = futures::executor::block_on(device.pop_error_scope());

        if oom.is_some() {
            return Err(DeviceError::OutOfMemory {
                label: label.to_string(),
            });
        }
        if let Some(err) = validation {
            return Err(DeviceError::Validation {
                label: label.to_string(),
                reason: err.to_string(),
            });
        }
        Ok(value)
    }
}

impl UploadDevice for GpuDispatch {
    type Texture = GpuTexture;
    type Buffer = GpuBuffer;

    fn max_texture_dimension(&self) -> u32 {
        self.device().limits().max_texture_dimension_2d
    }

    fn create_texture(
        &self,
        width: u32,
        height: u32,
        label: &str,
    ) -> Result<GpuTexture, DeviceError> {
        self.scoped_allocation(label, || {
            GpuTexture::empty(self, width, height, Some(label), GpuTexture::PAGE_USAGE)
        })
    }

    fn write_texture(
        &self,
        texture: &GpuTexture,
        origin: (u32, u32),
        extent: (u32, u32),
        bytes_per_row: u32,
        data: &[u8],
    ) {
        texture.replace_region(self, origin, extent, bytes_per_row, data);
    }

    fn create_buffer(&self, size: u64, label: &str) -> Result<GpuBuffer, DeviceError> {
        self.scoped_allocation(label, || {
            GpuBuffer::empty(self, size, Some(label), GpuBuffer::INSTANCE_USAGE)
        })
    }

    fn write_buffer(&self, buffer: &GpuBuffer, data: &[u8]) {
        buffer.write(self, data);
    }
}
