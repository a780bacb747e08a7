use atlasfeed_gpu::UploadDevice;

/// An axis-aligned rectangle of page pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn overlaps(&self, other: &PixelRect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &PixelRect) -> PixelRect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        PixelRect {
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        }
    }
}

/// Shelf packing state of one page.
///
/// Rectangles are laid left to right along the current shelf. The shelf is
/// as tall as the tallest rectangle on it; when a rectangle does not fit
/// the remaining width, a new shelf opens directly below.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShelfCursor {
    shelf_y: u32,
    shelf_height: u32,
    x: u32,
}

impl ShelfCursor {
    pub fn try_place(
        &mut self,
        width: u32,
        height: u32,
        page_width: u32,
        page_height: u32,
    ) -> Option<(u32, u32)> {
        if self.x + width <= page_width && self.shelf_y + height <= page_height {
            let origin = (self.x, self.shelf_y);
            self.x += width;
            self.shelf_height = self.shelf_height.max(height);
            return Some(origin);
        }

        let next_y = self.shelf_y + self.shelf_height;
        if width <= page_width && next_y + height <= page_height {
            self.shelf_y = next_y;
            self.shelf_height = height;
            self.x = width;
            return Some((0, next_y));
        }

        None
    }
}

/// One fixed-size atlas texture and the CPU copy it is uploaded from.
#[derive(Debug)]
pub struct AtlasPage<T> {
    index: usize,
    width: u32,
    height: u32,
    cursor: ShelfCursor,
    /// RGBA8, tightly packed rows.
    pixels: Vec<u8>,
    texture: T,
    dirty: Option<PixelRect>,
    placed: usize,
}

impl<T> AtlasPage<T> {
    pub(super) fn new(index: usize, width: u32, height: u32, texture: T) -> Self {
        Self {
            index,
            width,
            height,
            cursor: ShelfCursor::default(),
            pixels: vec![0; width as usize * height as usize * 4],
            texture,
            dirty: None,
            placed: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.width as usize * 4
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn texture(&self) -> &T {
        &self.texture
    }

    pub fn dirty_rect(&self) -> Option<PixelRect> {
        self.dirty
    }

    pub fn placed_count(&self) -> usize {
        self.placed
    }

    /// Reserve space for a `width` x `height` rectangle, if there is room.
    pub(super) fn reserve(&mut self, width: u32, height: u32) -> Option<PixelRect> {
        let (x, y) = self
            .cursor
            .try_place(width, height, self.width, self.height)?;
        Some(PixelRect {
            x,
            y,
            width,
            height,
        })
    }

    /// Copy tightly packed RGBA rows into `rect` and mark it for upload.
    pub(super) fn blit(&mut self, rect: PixelRect, pixels: &[u8]) {
        let row_len = rect.width as usize * 4;
        let stride = self.stride();
        for (row, source) in pixels.chunks_exact(row_len).enumerate() {
            let start = (rect.y as usize + row) * stride + rect.x as usize * 4;
            self.pixels[start..start + row_len].copy_from_slice(source);
        }

        self.dirty = Some(match self.dirty {
            Some(dirty) => dirty.union(&rect),
            None => rect,
        });
        self.placed += 1;
    }

    /// Upload the dirty region with a single texture write.
    pub(super) fn flush<D>(&mut self, device: &D) -> bool
    where
        D: UploadDevice<Texture = T>,
    {
        let Some(dirty) = self.dirty.take() else {
            return false;
        };
        let offset = dirty.y as usize * self.stride() + dirty.x as usize * 4;
        device.write_texture(
            &self.texture,
            (dirty.x, dirty.y),
            (dirty.width, dirty.height),
            self.width * 4,
            &self.pixels[offset..],
        );
        true
    }
}
