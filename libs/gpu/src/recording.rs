//! A device that records what would have been sent to the GPU.
//!
//! Used by tests that exercise page allocation and instance uploads without
//! a graphics adapter.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::device::UploadDevice;
use crate::error::DeviceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTexture {
    pub id: usize,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBuffer {
    pub id: usize,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureWrite {
    pub texture: usize,
    pub origin: (u32, u32),
    pub extent: (u32, u32),
    pub bytes_per_row: u32,
}

#[derive(Debug)]
pub struct RecordingDevice {
    max_dimension: u32,
    texture_limit: Option<usize>,
    textures: AtomicUsize,
    buffers: AtomicUsize,
    texture_writes: Mutex<Vec<TextureWrite>>,
    buffer_writes: Mutex<Vec<Vec<u8>>>,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self {
            max_dimension: 16384,
            texture_limit: None,
            textures: AtomicUsize::new(0),
            buffers: AtomicUsize::new(0),
            texture_writes: Mutex::new(Vec::new()),
            buffer_writes: Mutex::new(Vec::new()),
        }
    }

    /// Refuse texture allocations past `limit`, as a device out of memory would.
    pub fn with_texture_limit(mut self, limit: usize) -> Self {
        self.texture_limit = Some(limit);
        self
    }

    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    pub fn textures_created(&self) -> usize {
        self.textures.load(Ordering::Acquire)
    }

    pub fn buffers_created(&self) -> usize {
        self.buffers.load(Ordering::Acquire)
    }

    pub fn texture_writes(&self) -> Vec<TextureWrite> {
        self.texture_writes.lock().clone()
    }

    pub fn buffer_write_count(&self) -> usize {
        self.buffer_writes.lock().len()
    }

    pub fn last_buffer_write(&self) -> Option<Vec<u8>> {
        self.buffer_writes.lock().last().cloned()
    }
}

impl UploadDevice for RecordingDevice {
    type Texture = RecordedTexture;
    type Buffer = RecordedBuffer;

    fn max_texture_dimension(&self) -> u32 {
        self.max_dimension
    }

    fn create_texture(
        &self,
        width: u32,
        height: u32,
        label: &str,
    ) -> Result<RecordedTexture, DeviceError> {
        let id = self.textures.load(Ordering::Acquire);
        if self.texture_limit.is_some_and(|limit| id >= limit) {
            return Err(DeviceError::OutOfMemory {
                label: label.to_string(),
            });
        }
        self.textures.store(id + 1, Ordering::Release);
        Ok(RecordedTexture { id, width, height })
    }

    fn write_texture(
        &self,
        texture: &RecordedTexture,
        origin: (u32, u32),
        extent: (u32, u32),
        bytes_per_row: u32,
        data: &[u8],
    ) {
        let required = bytes_per_row as usize * (extent.1 as usize - 1) + extent.0 as usize * 4;
        assert!(
            data.len() >= required,
            "texture write needs {required} bytes, got {}",
            data.len()
        );
        self.texture_writes.lock().push(TextureWrite {
            texture: texture.id,
            origin,
            extent,
            bytes_per_row,
        });
    }

    fn create_buffer(&self, size: u64, _label: &str) -> Result<RecordedBuffer, DeviceError> {
        let id = self.buffers.fetch_add(1, Ordering::AcqRel);
        Ok(RecordedBuffer { id, size })
    }

    fn write_buffer(&self, buffer: &RecordedBuffer, data: &[u8]) {
        assert!(data.len() as u64 <= buffer.size);
        self.buffer_writes.lock().push(data.to_vec());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_limit_refuses_allocation() {
        let device = RecordingDevice::new().with_texture_limit(1);
        assert!(device.create_texture(64, 64, "page").is_ok());
        assert_eq!(
            device.create_texture(64, 64, "page"),
            Err(DeviceError::OutOfMemory {
                label: "page".to_string()
            })
        );
        assert_eq!(device.textures_created(), 1);
    }

    #[test]
    fn writes_are_recorded() {
        let device = RecordingDevice::new();
        let texture = device.create_texture(8, 8, "page").unwrap();
        device.write_texture(&texture, (2, 2), (2, 2), 32, &[0; 40]);
        let buffer = device.create_buffer(16, "instances").unwrap();
        device.write_buffer(&buffer, &[1; 16]);

        assert_eq!(
            device.texture_writes(),
            vec![TextureWrite {
                texture: 0,
                origin: (2, 2),
                extent: (2, 2),
                bytes_per_row: 32,
            }]
        );
        assert_eq!(device.buffer_write_count(), 1);
        assert_eq!(device.last_buffer_write(), Some(vec![1; 16]));
    }
}
