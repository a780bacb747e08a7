use crate::dev::GpuDispatch;

/// Fixed-size GPU buffer. Growing means allocating a new one.
#[derive(Debug)]
pub struct GpuBuffer {
    pub size: u64,
    pub buffer: wgpu::Buffer,
}

impl GpuBuffer {
    pub const INSTANCE_USAGE: wgpu::BufferUsages =
        wgpu::BufferUsages::VERTEX.union(wgpu::BufferUsages::COPY_DST);

    pub fn empty(
        dispatch: &GpuDispatch,
        size: u64,
        label: Option<&str>,
        usage: wgpu::BufferUsages,
    ) -> Self {
        let buffer = dispatch.device().create_buffer(&wgpu::BufferDescriptor {
            label,
            size,
            usage,
            mapped_at_creation: false,
        });
        Self { size, buffer }
    }

    pub fn buffer_slice(&self) -> wgpu::BufferSlice<'_> {
        self.buffer.slice(..)
    }

    /// Overwrite the start of the buffer with `data`.
    pub fn write(&self, dispatch: &GpuDispatch, data: &[u8]) {
        assert!(
            data.len() as u64 <= self.size,
            "write of {} bytes exceeds buffer of {}",
            data.len(),
            self.size
        );
        dispatch.queue().write_buffer(&self.buffer, 0, data);
    }
}
