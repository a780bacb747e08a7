//! Fixed-size atlas pages filled by shelf packing.

mod page;

use atlasfeed_gpu::{DeviceError, UploadDevice};

use crate::error::PackError;

pub use page::{AtlasPage, PixelRect, ShelfCursor};

/// Where a rectangle ended up. Placements never move once handed out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourcePlacement {
    page_index: usize,
    uv_origin: [f32; 2],
    uv_size: [f32; 2],
    instance_index: u32,
    rect: PixelRect,
}

impl ResourcePlacement {
    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn uv_origin(&self) -> [f32; 2] {
        self.uv_origin
    }

    pub fn uv_size(&self) -> [f32; 2] {
        self.uv_size
    }

    pub fn instance_index(&self) -> u32 {
        self.instance_index
    }

    /// Pixel rectangle on the page.
    pub fn rect(&self) -> PixelRect {
        self.rect
    }
}

#[derive(Debug)]
pub struct AtlasPacker<T> {
    page_width: u32,
    page_height: u32,
    max_pages: Option<usize>,
    pages: Vec<AtlasPage<T>>,
    next_instance: u32,
}

impl<T> AtlasPacker<T> {
    /// Page dimensions are expected to be powers of two so UVs are exact.
    pub fn new(page_width: u32, page_height: u32, max_pages: Option<usize>) -> Self {
        debug_assert!(page_width.is_power_of_two() && page_height.is_power_of_two());
        Self {
            page_width,
            page_height,
            max_pages,
            pages: Vec::new(),
            next_instance: 0,
        }
    }

    /// Place a `width` x `height` block of RGBA8 pixels.
    ///
    /// Existing pages are tried in creation order before a new one is
    /// allocated. Nothing is modified when an error is returned.
    pub fn insert<D>(
        &mut self,
        device: &D,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<ResourcePlacement, PackError>
    where
        D: UploadDevice<Texture = T>,
    {
        if width > self.page_width || height > self.page_height {
            return Err(PackError::TooLarge {
                width,
                height,
                page_width: self.page_width,
                page_height: self.page_height,
            });
        }
        if width == 0 || height == 0 {
            return Err(PackError::Empty { width, height });
        }
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(PackError::PixelMismatch {
                expected,
                actual: pixels.len(),
            });
        }

        let reserved = self
            .pages
            .iter_mut()
            .enumerate()
            .find_map(|(index, page)| page.reserve(width, height).map(|rect| (index, rect)));

        let (page_index, rect) = match reserved {
            Some(found) => found,
            None => {
                let index = self.allocate_page(device)?;
                let rect = self.pages[index]
                    .reserve(width, height)
                    .ok_or(PackError::TooLarge {
                        width,
                        height,
                        page_width: self.page_width,
                        page_height: self.page_height,
                    })?;
                (index, rect)
            }
        };

        self.pages[page_index].blit(rect, pixels);

        let instance_index = self.next_instance;
        self.next_instance += 1;

        let page_width = self.page_width as f32;
        let page_height = self.page_height as f32;
        Ok(ResourcePlacement {
            page_index,
            uv_origin: [rect.x as f32 / page_width, rect.y as f32 / page_height],
            uv_size: [rect.width as f32 / page_width, rect.height as f32 / page_height],
            instance_index,
            rect,
        })
    }

    fn allocate_page<D>(&mut self, device: &D) -> Result<usize, PackError>
    where
        D: UploadDevice<Texture = T>,
    {
        if let Some(limit) = self.max_pages {
            if self.pages.len() >= limit {
                return Err(PackError::Capacity(DeviceError::LimitReached {
                    kind: "atlas pages",
                    limit,
                }));
            }
        }
        let max_dimension = device.max_texture_dimension();
        if self.page_width > max_dimension || self.page_height > max_dimension {
            return Err(PackError::Capacity(DeviceError::LimitReached {
                kind: "texture dimension",
                limit: max_dimension as usize,
            }));
        }

        let index = self.pages.len();
        let texture = device
            .create_texture(
                self.page_width,
                self.page_height,
                &format!("atlas page {index}"),
            )
            .map_err(PackError::Capacity)?;
        log::info!(
            "Allocated atlas page {index} ({}x{})",
            self.page_width,
            self.page_height
        );
        self.pages
            .push(AtlasPage::new(index, self.page_width, self.page_height, texture));
        Ok(index)
    }

    /// Upload every page written to since the last flush, one write per page.
    pub fn flush_uploads<D>(&mut self, device: &D) -> usize
    where
        D: UploadDevice<Texture = T>,
    {
        self.pages
            .iter_mut()
            .map(|page| page.flush(device))
            .filter(|&uploaded| uploaded)
            .count()
    }

    pub fn pages(&self) -> &[AtlasPage<T>] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page_size(&self) -> (u32, u32) {
        (self.page_width, self.page_height)
    }

    pub fn placed_count(&self) -> usize {
        self.next_instance as usize
    }
}

#[cfg(test)]
mod tests {
    use atlasfeed_gpu::recording::{RecordedTexture, RecordingDevice, TextureWrite};

    use super::*;

    fn solid(width: u32, height: u32, value: u8) -> Vec<u8> {
        vec![value; width as usize * height as usize * 4]
    }

    fn packer(size: u32) -> AtlasPacker<RecordedTexture> {
        AtlasPacker::new(size, size, None)
    }

    #[test]
    fn two_squares_share_the_first_shelf() {
        let device = RecordingDevice::new();
        let mut packer = packer(256);

        let first = packer.insert(&device, 64, 64, &solid(64, 64, 1)).unwrap();
        let second = packer.insert(&device, 64, 64, &solid(64, 64, 2)).unwrap();

        assert_eq!(first.page_index(), 0);
        assert_eq!(first.uv_origin(), [0.0, 0.0]);
        assert_eq!(first.uv_size(), [0.25, 0.25]);
        assert_eq!(second.page_index(), 0);
        assert_eq!(second.uv_origin(), [0.25, 0.0]);
        assert_eq!(second.uv_size(), [0.25, 0.25]);
        assert_eq!((first.instance_index(), second.instance_index()), (0, 1));
        assert_eq!(packer.page_count(), 1);
    }

    #[test]
    fn too_large_touches_nothing() {
        let device = RecordingDevice::new();
        let mut packer = packer(256);

        assert!(matches!(
            packer.insert(&device, 300, 300, &solid(300, 300, 9)),
            Err(PackError::TooLarge { .. })
        ));
        assert_eq!(packer.page_count(), 0);
        assert_eq!(device.textures_created(), 0);

        packer.insert(&device, 16, 16, &solid(16, 16, 1)).unwrap();
        let before = packer.pages()[0].pixels().to_vec();
        let dirty = packer.pages()[0].dirty_rect();
        assert!(matches!(
            packer.insert(&device, 300, 300, &solid(300, 300, 9)),
            Err(PackError::TooLarge { .. })
        ));
        assert_eq!(packer.pages()[0].pixels(), before.as_slice());
        assert_eq!(packer.pages()[0].dirty_rect(), dirty);
        assert_eq!(packer.placed_count(), 1);
    }

    #[test]
    fn malformed_input_is_rejected() {
        let device = RecordingDevice::new();
        let mut packer = packer(256);
        assert_eq!(
            packer.insert(&device, 0, 8, &[]),
            Err(PackError::Empty {
                width: 0,
                height: 8
            })
        );
        assert_eq!(
            packer.insert(&device, 2, 2, &[0; 15]),
            Err(PackError::PixelMismatch {
                expected: 16,
                actual: 15
            })
        );
        assert_eq!(packer.page_count(), 0);
    }

    #[test]
    fn random_rectangles_never_overlap_and_stay_in_bounds() {
        let device = RecordingDevice::new();
        let mut packer = packer(256);
        let mut placements = Vec::new();

        // Small LCG so the sequence is reproducible.
        let mut state = 0x2545_f491_u32;
        let mut next = |bound: u32| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 16) % bound + 1
        };

        for _ in 0..400 {
            let (w, h) = (next(80), next(80));
            placements.push(packer.insert(&device, w, h, &solid(w, h, 7)).unwrap());
        }

        for (i, a) in placements.iter().enumerate() {
            let rect = a.rect();
            assert!(rect.right() <= 256 && rect.bottom() <= 256);
            for axis in 0..2 {
                assert!(a.uv_origin()[axis] + a.uv_size()[axis] <= 1.0);
            }
            for b in &placements[i + 1..] {
                if a.page_index() == b.page_index() {
                    assert!(!rect.overlaps(&b.rect()), "{a:?} overlaps {b:?}");
                }
            }
        }
        assert!(packer.page_count() > 1);
        assert_eq!(packer.placed_count(), 400);
    }

    #[test]
    fn earlier_pages_are_reused_before_new_ones() {
        let device = RecordingDevice::new();
        let mut packer = packer(64);

        packer.insert(&device, 64, 48, &solid(64, 48, 1)).unwrap();
        let spill = packer.insert(&device, 64, 32, &solid(64, 32, 2)).unwrap();
        assert_eq!(spill.page_index(), 1);

        // Still fits below the first rectangle.
        let back = packer.insert(&device, 32, 16, &solid(32, 16, 3)).unwrap();
        assert_eq!(back.page_index(), 0);
        assert_eq!(back.uv_origin(), [0.0, 0.75]);
        assert_eq!(device.textures_created(), 2);
    }

    #[test]
    fn page_limit_is_a_capacity_error() {
        let device = RecordingDevice::new();
        let mut packer: AtlasPacker<RecordedTexture> = AtlasPacker::new(64, 64, Some(1));
        packer.insert(&device, 64, 64, &solid(64, 64, 1)).unwrap();
        assert_eq!(
            packer.insert(&device, 8, 8, &solid(8, 8, 1)),
            Err(PackError::Capacity(DeviceError::LimitReached {
                kind: "atlas pages",
                limit: 1
            }))
        );
    }

    #[test]
    fn device_refusal_is_a_capacity_error() {
        let device = RecordingDevice::new().with_texture_limit(0);
        let mut packer = packer(64);
        assert!(matches!(
            packer.insert(&device, 8, 8, &solid(8, 8, 1)),
            Err(PackError::Capacity(DeviceError::OutOfMemory { .. }))
        ));

        let device = RecordingDevice::new().with_max_dimension(32);
        assert!(matches!(
            packer.insert(&device, 8, 8, &solid(8, 8, 1)),
            Err(PackError::Capacity(DeviceError::LimitReached { .. }))
        ));
        assert_eq!(packer.page_count(), 0);
    }

    #[test]
    fn flush_writes_each_dirty_page_once() {
        let device = RecordingDevice::new();
        let mut packer = packer(64);

        packer.insert(&device, 16, 16, &solid(16, 16, 1)).unwrap();
        packer.insert(&device, 16, 8, &solid(16, 8, 2)).unwrap();
        packer.insert(&device, 64, 64, &solid(64, 64, 3)).unwrap();

        assert_eq!(packer.flush_uploads(&device), 2);
        assert_eq!(
            device.texture_writes(),
            vec![
                TextureWrite {
                    texture: 0,
                    origin: (0, 0),
                    extent: (32, 16),
                    bytes_per_row: 256,
                },
                TextureWrite {
                    texture: 1,
                    origin: (0, 0),
                    extent: (64, 64),
                    bytes_per_row: 256,
                },
            ]
        );
        assert!(packer.pages().iter().all(|page| page.dirty_rect().is_none()));
        assert_eq!(packer.flush_uploads(&device), 0);
        assert_eq!(device.texture_writes().len(), 2);
    }
}
