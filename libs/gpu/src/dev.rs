use crate::error::DeviceError;

/// An opened adapter and the logical device requested from it.
#[derive(Debug)]
pub struct GpuHandle {
    adapter: wgpu::Adapter,
    dispatch: GpuDispatch,
}

/// Device and queue pair handed to everything that allocates or uploads.
///
/// Cloning is cheap; every clone refers to the same logical device.
#[derive(Debug, Clone)]
pub struct GpuDispatch {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl GpuDispatch {
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

impl GpuHandle {
    pub fn instance_descriptor() -> wgpu::InstanceDescriptor {
        wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::default(),
            ..Default::default()
        }
    }

    pub const ADAPTER_OPTIONS: wgpu::RequestAdapterOptions<'static, 'static> =
        wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        };

    /// Headless: no surface is ever created.
    pub async fn new() -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(&Self::instance_descriptor());
        let adapter = instance
            .request_adapter(&Self::ADAPTER_OPTIONS)
            .await
            .ok_or(DeviceError::NoAdapter)?;
        Self::from_adapter(adapter).await
    }

    pub async fn from_adapter(adapter: wgpu::Adapter) -> Result<Self, DeviceError> {
        let info = adapter.get_info();
        log::info!(
            "Using adapter {} ({:?}, {:?})",
            info.name,
            info.device_type,
            info.backend
        );
        let supported = adapter.limits();
        log::debug!("Adapter limits: {supported:?}");

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("atlasfeed_device"),
                    required_limits: atlas_limits(&supported),
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|err| DeviceError::RequestDevice(err.to_string()))?;

        Ok(Self {
            adapter,
            dispatch: GpuDispatch { device, queue },
        })
    }

    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    pub fn dispatch(&self) -> &GpuDispatch {
        &self.dispatch
    }

    /// Largest page side the device accepts.
    pub fn max_page_dimension(&self) -> u32 {
        self.dispatch.device.limits().max_texture_dimension_2d
    }
}

/// Default limits, raised to whatever the adapter allows for the two that
/// bound page size and instance count.
pub fn atlas_limits(supported: &wgpu::Limits) -> wgpu::Limits {
    wgpu::Limits {
        max_texture_dimension_2d: supported.max_texture_dimension_2d,
        max_buffer_size: supported.max_buffer_size,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_take_page_and_buffer_bounds_from_the_adapter() {
        let supported = wgpu::Limits {
            max_texture_dimension_2d: 16384,
            max_buffer_size: 1 << 34,
            max_bind_groups: 8,
            ..Default::default()
        };
        let limits = atlas_limits(&supported);
        assert_eq!(limits.max_texture_dimension_2d, 16384);
        assert_eq!(limits.max_buffer_size, 1 << 34);
        assert_eq!(limits.max_bind_groups, wgpu::Limits::default().max_bind_groups);
    }
}
