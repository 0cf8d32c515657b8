use crate::config::WindowConfig;
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

use super::DEPTH_FORMAT;

/// Acquired swapchain image plus the view the scene pass renders into.
#[derive(Debug)]
pub struct SurfaceFrame {
    view: wgpu::TextureView,
    texture: wgpu::SurfaceTexture,
}

impl SurfaceFrame {
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn present(self) {
        self.texture.present();
    }
}

/// What the editor does about a failed frame acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcquireFailure {
    /// Surface lost or outdated; reconfigure at the current size and skip the frame.
    Reconfigure,
    /// Transient; the next redraw tries again.
    SkipFrame,
    Fatal,
}

impl AcquireFailure {
    fn classify(error: &wgpu::SurfaceError) -> Self {
        match error {
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => Self::Reconfigure,
            wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Other => Self::SkipFrame,
            wgpu::SurfaceError::OutOfMemory => Self::Fatal,
        }
    }
}

/// Everything created together once the window exists.
struct GpuState {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth_view: wgpu::TextureView,
}

impl GpuState {
    /// Applies `size` to the swapchain and rebuilds the depth target to match.
    fn reconfigure(&mut self, size: PhysicalSize<u32>) {
        self.config.width = size.width.max(1);
        self.config.height = size.height.max(1);
        self.surface.configure(&self.device, &self.config);
        self.depth_view = create_depth_view(&self.device, size);
    }
}

/// The editor window and its wgpu surface. GPU objects exist only after `ensure_window`.
pub struct WindowSurface {
    window: Option<Arc<Window>>,
    gpu: Option<GpuState>,
    size: PhysicalSize<u32>,
    title: String,
    vsync: bool,
    #[cfg(test)]
    reconfigure_attempts: usize,
}

impl WindowSurface {
    pub fn new(window_cfg: &WindowConfig) -> Self {
        Self {
            window: None,
            gpu: None,
            size: PhysicalSize::new(window_cfg.width, window_cfg.height),
            title: window_cfg.title.clone(),
            vsync: window_cfg.vsync,
            #[cfg(test)]
            reconfigure_attempts: 0,
        }
    }

    pub fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        if self.window.is_some() {
            return Ok(());
        }
        let attrs = Window::default_attributes().with_title(self.title.clone()).with_inner_size(self.size);
        let window = Arc::new(event_loop.create_window(attrs).context("Failed to create window")?);
        let gpu = pollster::block_on(self.create_gpu(&window))?;
        self.size = window.inner_size();
        self.gpu = Some(gpu);
        self.window = Some(window);
        Ok(())
    }

    fn gpu(&self) -> Result<&GpuState> {
        self.gpu.as_ref().context("GPU device not initialized")
    }

    pub fn device(&self) -> Result<&wgpu::Device> {
        Ok(&self.gpu()?.device)
    }

    pub fn device_and_queue(&self) -> Result<(&wgpu::Device, &wgpu::Queue)> {
        let gpu = self.gpu()?;
        Ok((&gpu.device, &gpu.queue))
    }

    pub fn depth_view(&self) -> Result<&wgpu::TextureView> {
        Ok(&self.gpu()?.depth_view)
    }

    pub fn surface_format(&self) -> Result<wgpu::TextureFormat> {
        Ok(self.gpu()?.config.format)
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn window(&self) -> Option<&Window> {
        self.window.as_deref()
    }

    /// Records the new size. A zero-area size (minimized window) leaves the swapchain as is.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.size = new_size;
        #[cfg(test)]
        {
            self.reconfigure_attempts += 1;
        }
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.reconfigure(new_size);
            log::debug!("[renderer] surface resized to {}x{}", new_size.width, new_size.height);
        }
    }

    pub fn acquire_surface_frame(&mut self) -> Result<SurfaceFrame> {
        let error = match self.gpu()?.surface.get_current_texture() {
            Ok(texture) => {
                let view = texture.texture.create_view(&wgpu::TextureViewDescriptor::default());
                return Ok(SurfaceFrame { view, texture });
            }
            Err(error) => error,
        };
        Err(self.recover_from(&error))
    }

    fn recover_from(&mut self, error: &wgpu::SurfaceError) -> anyhow::Error {
        match AcquireFailure::classify(error) {
            AcquireFailure::Reconfigure => {
                self.resize(self.size);
                anyhow!("Surface {error:?}; reconfigured, frame skipped")
            }
            AcquireFailure::SkipFrame => anyhow!("Surface {error:?}; frame skipped"),
            AcquireFailure::Fatal => anyhow!("Surface out of memory"),
        }
    }

    fn present_mode(&self, supported: &[wgpu::PresentMode]) -> wgpu::PresentMode {
        if self.vsync {
            return wgpu::PresentMode::Fifo;
        }
        [wgpu::PresentMode::Mailbox, wgpu::PresentMode::Immediate]
            .into_iter()
            .find(|mode| supported.contains(mode))
            .unwrap_or(wgpu::PresentMode::Fifo)
    }

    async fn create_gpu(&self, window: &Arc<Window>) -> Result<GpuState> {
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window.clone()).context("Failed to create WGPU surface")?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("Failed to request WGPU adapter")?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("CopperLab Device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::default(),
            })
            .await
            .context("Failed to request WGPU device")?;

        let caps = surface.get_capabilities(&adapter);
        let format = srgb_or_first(&caps.formats).context("Surface reports no supported formats")?;
        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: self.present_mode(&caps.present_modes),
            alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        let depth_view = create_depth_view(&device, size);
        log::info!(
            "[renderer] {:?} surface {}x{} {:?} {:?}",
            adapter.get_info().backend,
            config.width,
            config.height,
            format,
            config.present_mode
        );
        Ok(GpuState { surface, device, queue, config, depth_view })
    }
}

fn srgb_or_first(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    formats.iter().copied().find(|format| format.is_srgb()).or_else(|| formats.first().copied())
}

fn create_depth_view(device: &wgpu::Device, size: PhysicalSize<u32>) -> wgpu::TextureView {
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("Scene Depth"),
            size: wgpu::Extent3d {
                width: size.width.max(1),
                height: size.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vsync_forces_fifo_and_otherwise_prefers_mailbox() {
        let mut surface = WindowSurface::new(&WindowConfig { vsync: false, ..WindowConfig::default() });
        let all = [wgpu::PresentMode::Fifo, wgpu::PresentMode::Immediate, wgpu::PresentMode::Mailbox];
        assert_eq!(surface.present_mode(&all), wgpu::PresentMode::Mailbox);
        assert_eq!(surface.present_mode(&[wgpu::PresentMode::Fifo]), wgpu::PresentMode::Fifo);
        surface.vsync = true;
        assert_eq!(surface.present_mode(&all), wgpu::PresentMode::Fifo);
    }

    #[test]
    fn acquire_failures_are_classified() {
        use wgpu::SurfaceError;
        assert_eq!(AcquireFailure::classify(&SurfaceError::Lost), AcquireFailure::Reconfigure);
        assert_eq!(AcquireFailure::classify(&SurfaceError::Outdated), AcquireFailure::Reconfigure);
        assert_eq!(AcquireFailure::classify(&SurfaceError::Timeout), AcquireFailure::SkipFrame);
        assert_eq!(AcquireFailure::classify(&SurfaceError::Other), AcquireFailure::SkipFrame);
        assert_eq!(AcquireFailure::classify(&SurfaceError::OutOfMemory), AcquireFailure::Fatal);
    }

    #[test]
    fn lost_surface_reconfigures_even_before_gpu_init() {
        let mut surface = WindowSurface::new(&WindowConfig::default());
        let err = surface.recover_from(&wgpu::SurfaceError::Lost);
        assert!(err.to_string().contains("reconfigured"));
        assert_eq!(surface.reconfigure_attempts, 1);
    }

    #[test]
    fn minimized_resize_keeps_size_without_gpu() {
        let mut surface = WindowSurface::new(&WindowConfig::default());
        surface.resize(PhysicalSize::new(0, 0));
        assert_eq!(surface.size(), PhysicalSize::new(0, 0));
        assert!(surface.device().is_err());
    }

    #[test]
    fn frame_acquire_without_gpu_errors() {
        let mut surface = WindowSurface::new(&WindowConfig::default());
        let err = surface.acquire_surface_frame().expect_err("no surface yet");
        assert!(err.to_string().contains("not initialized"));
    }
}
