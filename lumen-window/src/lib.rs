//! The display side of lumen: owns the window, drives the render schedule and turns key presses into pipeline commands.

mod input;
mod readout;

use std::{sync::Arc, time::Instant};

use anyhow::Context;
use cfg_if::cfg_if;
use lumen_core::SharedState;
use lumen_render::{
    RenderStage, SensorOrientation, SurfaceResizeSource, SurfaceSize, WgpuResources,
    init::{init_wgpu, surface_reinit},
};
use tracing::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::PhysicalKey,
    window::{Window, WindowId},
};

pub use input::PreviewAction;
pub use readout::{Readout, TITLE_REFRESH_INTERVAL, format_title};

pub struct PreviewParams {
    pub shared: SharedState,
    /// Shown in the title next to the toggle state.
    pub effect_name: String,
    pub orientation: SensorOrientation,
    pub window_size: LogicalSize<u32>,
}

pub struct WindowState {
    pub window: Arc<Window>,
    pub resize_source: SurfaceResizeSource,
}

impl WindowState {
    pub fn new(
        event_loop: &ActiveEventLoop,
        window_size: LogicalSize<u32>,
    ) -> anyhow::Result<Self> {
        #[allow(unused_mut)]
        let mut attributes = Window::default_attributes().with_title("lumen");

        cfg_if! {
            if #[cfg(not(target_os = "android"))] {
                attributes = attributes
                    .with_inner_size(window_size)
                    .with_maximized(false);
            } else {
                // the activity decides the size
                let _ = window_size;
            }
        }

        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .context("Creating the window")?,
        );

        let size = window.inner_size();
        info!("Created a window with size: {:?}", size);

        Ok(Self {
            window,
            resize_source: SurfaceResizeSource::new(size),
        })
    }
}

struct Operational {
    winit: WindowState,
    wgpu: WgpuResources,
    stage: RenderStage,
    readout: Readout,
}

#[derive(Default)]
enum WinitAppState {
    WaitingForInitialResume {
        params: PreviewParams,
    },
    /// Some platforms report a zero-sized window at first, and a surface can't be configured until it grows
    WaitingForNonzeroSize {
        params: PreviewParams,
        winit: WindowState,
    },
    Operational(Box<Operational>),
    /// wgpu could not be initialized. Capture keeps running and the title keeps reporting throughput.
    Degraded {
        winit: WindowState,
        readout: Readout,
    },
    #[default]
    Poison,
}

impl WinitAppState {
    fn winit(&self) -> Option<&WindowState> {
        match self {
            WinitAppState::WaitingForInitialResume { .. } => None,
            WinitAppState::WaitingForNonzeroSize { winit, .. } => Some(winit),
            WinitAppState::Operational(operational) => Some(&operational.winit),
            WinitAppState::Degraded { winit, .. } => Some(winit),
            WinitAppState::Poison => None,
        }
    }

    fn readout_mut(&mut self) -> Option<&mut Readout> {
        match self {
            WinitAppState::Operational(operational) => Some(&mut operational.readout),
            WinitAppState::Degraded { readout, .. } => Some(readout),
            _ => None,
        }
    }
}

fn start_wgpu_init(params: PreviewParams, winit: WindowState) -> WinitAppState {
    let PreviewParams {
        shared,
        effect_name,
        orientation,
        window_size: _,
    } = params;
    let readout = Readout::new(shared.clone(), effect_name);

    // windows want accesses to window handles to be on the main thread, so the init is done synchronously everywhere
    let result = pollster::block_on(init_wgpu(
        winit.window.clone(),
        winit.resize_source.handle(),
    ));

    match result {
        Ok(result) => {
            let (wgpu, surface) = result.into_resources();
            let stage = RenderStage::new(
                &wgpu,
                surface,
                winit.resize_source.clone(),
                shared.relay.clone(),
                orientation,
            );

            WinitAppState::Operational(Box::new(Operational {
                winit,
                wgpu,
                stage,
                readout,
            }))
        }
        Err(e) => {
            error!("Failed to initialize wgpu: {:#}. Frames will not be displayed", e);
            WinitAppState::Degraded { winit, readout }
        }
    }
}

struct PreviewHandler {
    state: WinitAppState,
    on_exit: Option<Box<dyn FnOnce()>>,
}

impl PreviewHandler {
    fn shutdown(&mut self) {
        if let Some(on_exit) = self.on_exit.take() {
            on_exit();
        }
    }

    fn on_key(&mut self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        let KeyEvent {
            physical_key: PhysicalKey::Code(code),
            state: ElementState::Pressed,
            repeat: false,
            ..
        } = event
        else {
            return;
        };

        match PreviewAction::from_key(*code) {
            Some(PreviewAction::ToggleEffect) => {
                if let Some(readout) = self.state.readout_mut() {
                    let enabled = readout.shared().toggle.toggle();
                    info!("Effect {}", if enabled { "enabled" } else { "disabled" });
                    readout.invalidate();
                }
            }
            Some(PreviewAction::Exit) => event_loop.exit(),
            None => {}
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let WinitAppState::Operational(operational) = &mut self.state else {
            return;
        };
        let Operational { winit, stage, .. } = operational.as_mut();

        match stage.draw(|| winit.window.pre_present_notify()) {
            Ok(_) => {}
            Err(wgpu::SurfaceError::Timeout) => debug!("Surface timed out, skipping the frame"),
            Err(wgpu::SurfaceError::OutOfMemory) => {
                error!("Out of memory while acquiring the surface texture, exiting");
                event_loop.exit();
            }
            Err(e) => warn!("Failed to acquire the surface texture: {}", e),
        }
    }

    fn refresh_title(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        match &mut self.state {
            WinitAppState::Operational(operational) => {
                let frame_size = operational.stage.frame_size();
                if let Some(title) = operational.readout.poll(now, frame_size) {
                    operational.winit.window.set_title(&title);
                }
            }
            WinitAppState::Degraded { winit, readout } => {
                if let Some(title) = readout.poll(now, None) {
                    winit.window.set_title(&title);
                }
                // nothing requests redraws here, so wake up for the next title refresh
                event_loop.set_control_flow(ControlFlow::WaitUntil(readout.next_refresh(now)));
            }
            _ => {}
        }
    }
}

impl ApplicationHandler for PreviewHandler {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        match std::mem::take(&mut self.state) {
            WinitAppState::WaitingForInitialResume { params } => {
                let winit = match WindowState::new(event_loop, params.window_size) {
                    Ok(winit) => winit,
                    Err(e) => {
                        error!("{:#}", e);
                        event_loop.exit();
                        return;
                    }
                };

                let current_size = SurfaceSize::from(winit.window.inner_size());
                self.state = if !current_size.is_empty() {
                    start_wgpu_init(params, winit)
                } else {
                    WinitAppState::WaitingForNonzeroSize { params, winit }
                };
            }
            WinitAppState::Operational(mut operational) => {
                let Operational {
                    winit, wgpu, stage, ..
                } = operational.as_mut();

                match surface_reinit(wgpu, winit.window.clone(), winit.resize_source.handle()) {
                    Ok(surface) => stage.replace_surface(surface),
                    Err(e) => error!("Failed to re-create the surface: {:#}", e),
                }

                self.state = WinitAppState::Operational(operational);
            }
            state => self.state = state,
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(winit) = self.state.winit() else {
            return;
        };

        if window_id != winit.window.id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(physical_size) => {
                winit.resize_source.resize(physical_size);
                winit.window.request_redraw();

                match std::mem::take(&mut self.state) {
                    WinitAppState::WaitingForNonzeroSize { params, winit }
                        if !SurfaceSize::from(physical_size).is_empty() =>
                    {
                        self.state = start_wgpu_init(params, winit);
                    }
                    state => self.state = state,
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.on_key(event_loop, &event),
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        self.refresh_title(event_loop);

        if let WinitAppState::Operational(operational) = &self.state {
            operational.winit.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        info!("Shutting down");
        self.shutdown();
    }
}

/// Runs the preview until the window is closed.
///
/// `on_exit` runs once the event loop stops and before any GPU resources are released.
pub fn run_window(params: PreviewParams, on_exit: impl FnOnce() + 'static) -> anyhow::Result<()> {
    let event_loop = EventLoop::new().context("Creating the event loop")?;

    let mut handler = PreviewHandler {
        state: WinitAppState::WaitingForInitialResume { params },
        on_exit: Some(Box::new(on_exit)),
    };

    let result = event_loop
        .run_app(&mut handler)
        .context("Running the event loop");

    // `exiting` is not reached when the loop fails to start
    handler.shutdown();
    drop(handler);

    result
}
