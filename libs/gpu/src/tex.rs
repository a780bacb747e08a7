use crate::dev::GpuDispatch;

const TEX_DIM: wgpu::TextureDimension = wgpu::TextureDimension::D2;
pub const TEX_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// GPU texture abstraction.
#[derive(Debug)]
pub struct GpuTexture {
    pub size: wgpu::Extent3d,
    pub texture: wgpu::Texture,
}

impl GpuTexture {
    pub const PAGE_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::COPY_DST
        .union(wgpu::TextureUsages::COPY_SRC)
        .union(wgpu::TextureUsages::TEXTURE_BINDING);

    /// Create an empty texture.
    pub fn empty(
        dispatch: &GpuDispatch,
        width: u32,
        height: u32,
        label: Option<&str>,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let texture = dispatch.device().create_texture(&wgpu::TextureDescriptor {
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: TEX_DIM,
            format: TEX_FORMAT,
            view_formats: &[
                wgpu::TextureFormat::Rgba8Unorm,
                wgpu::TextureFormat::Rgba8UnormSrgb,
            ],
            usage,
            label,
        });

        Self { texture, size }
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    /// Make a texture view of this GPU texture.
    pub fn create_view(&self) -> wgpu::TextureView {
        self.texture
            .create_view(&wgpu::TextureViewDescriptor::default())
    }

    /// Replace a section of the texture with raw RGBA data.
    ///
    /// ### Note
    /// `data` starts at the first texel of the section and advances
    /// `bytes_per_row` bytes per row, so a sub-rectangle of a larger
    /// tightly packed image can be passed without repacking it.
    pub fn replace_region(
        &self,
        dispatch: &GpuDispatch,
        (x, y): (u32, u32),
        (width, height): (u32, u32),
        bytes_per_row: u32,
        data: &[u8],
    ) {
        debug_assert!(x + width <= self.width() && y + height <= self.height());
        dispatch.queue().write_texture(
            // Tells wgpu where to copy the pixel data
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            // The actual pixel data
            data,
            // The layout of the texture
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}
