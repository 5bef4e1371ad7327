use std::time::{Duration, Instant};

use lumen_core::SharedState;
use winit::dpi::PhysicalSize;

/// The UI polls the estimator at most this often.
pub const TITLE_REFRESH_INTERVAL: Duration = Duration::from_millis(250);

pub fn format_title(
    fps: f64,
    frame_size: Option<PhysicalSize<u32>>,
    effect_name: &str,
    effect_enabled: bool,
) -> String {
    let size = match frame_size {
        Some(size) => format!("{}x{}", size.width, size.height),
        None => "no frame".to_string(),
    };
    let effect_state = if effect_enabled { "on" } else { "off" };

    format!(
        "lumen | FPS: {:.1} | {} | {} {}",
        fps, size, effect_name, effect_state
    )
}

/// Throughput read-out shown in the window title.
pub struct Readout {
    shared: SharedState,
    effect_name: String,
    last_refresh: Option<Instant>,
    last_title: String,
}

impl Readout {
    pub fn new(shared: SharedState, effect_name: String) -> Self {
        Self {
            shared,
            effect_name,
            last_refresh: None,
            last_title: String::new(),
        }
    }

    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    /// Forces the next [`Self::poll`] to produce a title, e.g. after the effect was toggled.
    pub fn invalidate(&mut self) {
        self.last_refresh = None;
    }

    /// Returns a new title if the refresh interval has passed and the text changed.
    pub fn poll(&mut self, now: Instant, frame_size: Option<PhysicalSize<u32>>) -> Option<String> {
        if self
            .last_refresh
            .is_some_and(|last| now.duration_since(last) < TITLE_REFRESH_INTERVAL)
        {
            return None;
        }
        self.last_refresh = Some(now);

        let title = format_title(
            self.shared.fps.read(),
            frame_size,
            &self.effect_name,
            self.shared.toggle.is_enabled(),
        );
        if title == self.last_title {
            return None;
        }
        self.last_title.clone_from(&title);
        Some(title)
    }

    /// When the title is due to be refreshed next.
    pub fn next_refresh(&self, now: Instant) -> Instant {
        match self.last_refresh {
            Some(last) => last + TITLE_REFRESH_INTERVAL,
            None => now,
        }
    }
}
