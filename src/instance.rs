//! Per-instance draw data and the growable buffer it is uploaded through.

use atlasfeed_gpu::{DeviceError, UploadDevice};
use bytemuck::Zeroable;

use crate::atlas::ResourcePlacement;

/// World position and scale of a resource.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldTransform {
    pub x: f32,
    pub y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
}

impl Default for WorldTransform {
    fn default() -> Self {
        Self::at(0.0, 0.0)
    }
}

impl WorldTransform {
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRecord {
    /// Column-major model matrix for a unit quad.
    pub transform: [[f32; 4]; 4],
    pub uv_origin: [f32; 2],
    pub uv_size: [f32; 2],
    pub page: u32,
    pub _padding: [u32; 3],
}

impl InstanceRecord {
    /// Stretch the unit quad to the resource's pixel size, scaled and moved
    /// into world space.
    pub fn new(
        world: &WorldTransform,
        width: u32,
        height: u32,
        placement: &ResourcePlacement,
    ) -> Self {
        let sx = width as f32 * world.scale_x;
        let sy = height as f32 * world.scale_y;
        Self {
            transform: [
                [sx, 0.0, 0.0, 0.0],
                [0.0, sy, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [world.x, world.y, 0.0, 1.0],
            ],
            uv_origin: placement.uv_origin(),
            uv_size: placement.uv_size(),
            page: placement.page_index() as u32,
            _padding: [0; 3],
        }
    }
}

/// CPU-side instance records plus the GPU buffer they are mirrored into.
///
/// Writes only mark the buffer dirty; `update_instance_buffer` uploads
/// everything written so far in one go.
#[derive(Debug)]
pub struct InstanceTransformBuffer<B> {
    records: Vec<InstanceRecord>,
    len: usize,
    dirty: bool,
    gpu: Option<(B, usize)>,
    uploads: usize,
}

impl<B> InstanceTransformBuffer<B> {
    pub const LABEL: &'static str = "instance transforms";

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: vec![InstanceRecord::zeroed(); capacity],
            len: 0,
            dirty: false,
            gpu: None,
            uploads: 0,
        }
    }

    pub fn insert_instance(&mut self, index: u32, record: InstanceRecord) {
        let index = index as usize;
        if index >= self.records.len() {
            let capacity = (self.records.len() * 2).max(index + 1);
            log::debug!(
                "Growing instance buffer from {} to {capacity}",
                self.records.len()
            );
            self.records.resize(capacity, InstanceRecord::zeroed());
        }
        self.records[index] = record;
        self.len = self.len.max(index + 1);
        self.dirty = true;
    }

    /// Mirror `[0, len)` to the GPU if anything changed since the last call.
    ///
    /// The GPU buffer is recreated whenever it is smaller than the CPU
    /// capacity. Returns whether an upload happened.
    pub fn update_instance_buffer<D>(&mut self, device: &D) -> Result<bool, DeviceError>
    where
        D: UploadDevice<Buffer = B>,
    {
        if !self.dirty {
            return Ok(false);
        }

        let capacity = self.records.len();
        let stale = self
            .gpu
            .as_ref()
            .map_or(true, |&(_, gpu_capacity)| gpu_capacity < capacity);
        if stale {
            let size = (capacity * std::mem::size_of::<InstanceRecord>()) as u64;
            self.gpu = Some((device.create_buffer(size, Self::LABEL)?, capacity));
        }

        if let Some((buffer, _)) = &self.gpu {
            device.write_buffer(buffer, bytemuck::cast_slice(&self.records[..self.len]));
        }
        self.dirty = false;
        self.uploads += 1;
        Ok(true)
    }

    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn records(&self) -> &[InstanceRecord] {
        &self.records[..self.len]
    }

    pub fn gpu_buffer(&self) -> Option<&B> {
        self.gpu.as_ref().map(|(buffer, _)| buffer)
    }

    pub fn upload_count(&self) -> usize {
        self.uploads
    }
}

#[cfg(test)]
mod tests {
    use atlasfeed_gpu::recording::{RecordedBuffer, RecordingDevice};

    use super::*;

    fn record(page: u32) -> InstanceRecord {
        InstanceRecord {
            page,
            ..InstanceRecord::zeroed()
        }
    }

    #[test]
    fn record_layout_matches_shader_stride() {
        assert_eq!(std::mem::size_of::<InstanceRecord>(), 96);
    }

    #[test]
    fn capacity_always_exceeds_highest_index() {
        let mut buffer: InstanceTransformBuffer<RecordedBuffer> =
            InstanceTransformBuffer::with_capacity(4);
        let mut highest = 0;
        for index in [0, 3, 4, 9, 2, 100, 101, 57] {
            buffer.insert_instance(index, record(index));
            highest = highest.max(index as usize);
            assert!(buffer.capacity() > highest);
            assert_eq!(buffer.len(), highest + 1);
        }
        // Doubling from 4: 8, then 16, then straight to 101, then 202.
        assert_eq!(buffer.capacity(), 202);
        assert_eq!(buffer.records()[9].page, 9);
        assert_eq!(buffer.records()[5], InstanceRecord::zeroed());
    }

    #[test]
    fn zero_capacity_grows() {
        let mut buffer: InstanceTransformBuffer<RecordedBuffer> =
            InstanceTransformBuffer::with_capacity(0);
        buffer.insert_instance(0, record(1));
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn clean_buffer_makes_no_device_calls() {
        let device = RecordingDevice::new();
        let mut buffer = InstanceTransformBuffer::with_capacity(8);
        assert!(!buffer.update_instance_buffer(&device).unwrap());
        assert!(!buffer.is_dirty());
        assert_eq!(device.buffers_created(), 0);
        assert_eq!(device.buffer_write_count(), 0);
        assert!(buffer.gpu_buffer().is_none());
    }

    #[test]
    fn uploads_once_per_update_and_recreates_on_growth() {
        let device = RecordingDevice::new();
        let mut buffer = InstanceTransformBuffer::with_capacity(2);

        buffer.insert_instance(0, record(0));
        buffer.insert_instance(1, record(1));
        assert!(buffer.is_dirty());
        assert!(buffer.update_instance_buffer(&device).unwrap());
        assert!(!buffer.is_dirty());
        assert_eq!(device.buffers_created(), 1);
        assert_eq!(device.buffer_write_count(), 1);
        assert_eq!(buffer.gpu_buffer().map(|b| b.size), Some(192));

        assert!(!buffer.update_instance_buffer(&device).unwrap());
        assert_eq!(device.buffer_write_count(), 1);

        buffer.insert_instance(2, record(2));
        assert!(buffer.update_instance_buffer(&device).unwrap());
        assert_eq!(device.buffers_created(), 2);
        assert_eq!(buffer.gpu_buffer().map(|b| b.size), Some(4 * 96));
        assert_eq!(
            device.last_buffer_write(),
            Some(bytemuck::cast_slice::<_, u8>(buffer.records()).to_vec())
        );
        assert_eq!(buffer.upload_count(), 2);
    }

    #[test]
    fn transform_scales_then_translates() {
        let device = RecordingDevice::new();
        let mut packer = crate::atlas::AtlasPacker::new(256, 256, None);
        let placement = packer.insert(&device, 64, 32, &[0; 64 * 32 * 4]).unwrap();
        let world = WorldTransform {
            x: 512.0,
            y: -1024.0,
            scale_x: 2.0,
            scale_y: 1.0,
        };

        let record = InstanceRecord::new(&world, 64, 32, &placement);
        assert_eq!(record.transform[0][0], 128.0);
        assert_eq!(record.transform[1][1], 32.0);
        assert_eq!(record.transform[3], [512.0, -1024.0, 0.0, 1.0]);
        assert_eq!(record.uv_size, [0.25, 0.125]);
        assert_eq!(record.page, 0);
    }
}
