use std::sync::Arc;

use dpi::PhysicalSize;
use parking_lot::RwLock;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Hash)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<PhysicalSize<u32>> for SurfaceSize {
    fn from(size: PhysicalSize<u32>) -> Self {
        SurfaceSize {
            width: size.width,
            height: size.height,
        }
    }
}

impl From<SurfaceSize> for PhysicalSize<u32> {
    fn from(size: SurfaceSize) -> Self {
        PhysicalSize::new(size.width, size.height)
    }
}

/// Arguments for [`wgpu::RenderPass::set_viewport`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    /// Covers the whole surface. `None` when there is nothing to draw into, e.g. while the window is minimized.
    pub fn covering(size: SurfaceSize) -> Option<Self> {
        if size.is_empty() {
            return None;
        }

        Some(Viewport {
            x: 0.0,
            y: 0.0,
            width: size.width as f32,
            height: size.height as f32,
        })
    }
}

/// The window side of resize notifications. Each [`ResizeHandle`] picks up the new size on its next update.
#[derive(Debug, Clone)]
pub struct SurfaceResizeSource {
    inner: Arc<RwLock<SurfaceSize>>,
}

impl SurfaceResizeSource {
    pub fn new(size: impl Into<SurfaceSize>) -> Self {
        SurfaceResizeSource {
            inner: Arc::new(RwLock::new(size.into())),
        }
    }

    pub fn resize(&self, size: impl Into<SurfaceSize>) {
        *self.inner.write() = size.into();
    }

    pub fn handle(&self) -> ResizeHandle {
        ResizeHandle {
            inner: self.inner.clone(),
            last_known_size: Default::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResizeHandle {
    inner: Arc<RwLock<SurfaceSize>>,
    last_known_size: SurfaceSize,
}

impl ResizeHandle {
    pub fn get(&mut self) -> SurfaceSize {
        let size = *self.inner.read();
        self.last_known_size = size;
        size
    }

    /// Returns the new size if it changed since the last call to [`Self::get`] or [`Self::update`].
    pub fn update(&mut self) -> Option<SurfaceSize> {
        let size = *self.inner.read();
        if size != self.last_known_size {
            self.last_known_size = size;
            Some(size)
        } else {
            None
        }
    }

    /// Viewport for the size last returned by [`Self::get`] or [`Self::update`], so it matches the configured surface.
    pub fn get_viewport(&self) -> Option<Viewport> {
        Viewport::covering(self.last_known_size)
    }
}
