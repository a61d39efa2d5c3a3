//! Window management module for syncplay
//!
//! A single fixed-size winit window driven by pumping its event loop from
//! the playback thread rather than handing control to `run_app`. Closing the
//! window, pressing any key, or pressing a button on a connected game
//! controller counts as a quit request.

use crate::utils::config::WindowConfig;
use crate::utils::error::{IntoPlayerError, PlayerError, Result};
use gilrs::{EventType, Gilrs};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

/// How long `open` waits for the platform to hand over a window
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);
const OPEN_POLL: Duration = Duration::from_millis(10);

/// Event state collected between pumps
struct WindowState {
    config: WindowConfig,
    window: Option<Arc<Window>>,
    quit: bool,
    resized: Option<PhysicalSize<u32>>,
    error: Option<String>,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(LogicalSize::new(self.config.width as f64, self.config.height as f64))
            .with_resizable(false);
        match event_loop.create_window(attributes) {
            Ok(window) => self.window = Some(Arc::new(window)),
            Err(e) => {
                self.error = Some(e.to_string());
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                debug!("Window close requested");
                self.quit = true;
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                debug!("Key pressed, quitting");
                self.quit = true;
            }
            WindowEvent::Resized(size) => {
                self.resized = Some(size);
            }
            _ => {}
        }
    }
}

/// Whether a controller event asks playback to stop
fn is_quit_event(event: &EventType) -> bool {
    matches!(event, EventType::ButtonPressed(..))
}

/// The playback window
pub struct PlayerWindow {
    event_loop: EventLoop<()>,
    state: WindowState,

    /// None when the platform has no controller support
    gamepads: Option<Gilrs>,
}

impl PlayerWindow {
    /// Create the event loop and wait for the window to appear
    pub fn open(config: &WindowConfig) -> Result<Self> {
        let mut event_loop = EventLoop::new().init_err("Failed to create event loop")?;
        let mut state = WindowState {
            config: config.clone(),
            window: None,
            quit: false,
            resized: None,
            error: None,
        };

        let mut waited = Duration::ZERO;
        while state.window.is_none() && state.error.is_none() && waited < OPEN_TIMEOUT {
            if let PumpStatus::Exit(code) = event_loop.pump_app_events(Some(OPEN_POLL), &mut state) {
                return Err(PlayerError::Init(format!(
                    "Event loop exited with code {} before the window opened",
                    code
                )));
            }
            waited += OPEN_POLL;
        }

        if let Some(error) = state.error.take() {
            return Err(PlayerError::Init(format!("Failed to create window: {}", error)));
        }
        if state.window.is_none() {
            return Err(PlayerError::Init("Timed out waiting for the window".to_string()));
        }

        let gamepads = match Gilrs::new() {
            Ok(gilrs) => Some(gilrs),
            Err(e) => {
                warn!("Controller input unavailable: {}", e);
                None
            }
        };

        info!("Opened {}x{} window", config.width, config.height);
        Ok(Self {
            event_loop,
            state,
            gamepads,
        })
    }

    /// Shared handle for surface creation
    pub fn handle(&self) -> Result<Arc<Window>> {
        self.state
            .window
            .clone()
            .ok_or_else(|| PlayerError::Window("Window is gone".to_string()))
    }

    pub fn inner_size(&self) -> (u32, u32) {
        match &self.state.window {
            Some(window) => {
                let size = window.inner_size();
                (size.width, size.height)
            }
            None => (self.state.config.width, self.state.config.height),
        }
    }

    /// Process pending events without blocking; true once a quit was asked
    pub fn pump(&mut self) -> bool {
        if let PumpStatus::Exit(_) = self.event_loop.pump_app_events(Some(Duration::ZERO), &mut self.state) {
            self.state.quit = true;
        }

        if let Some(gamepads) = self.gamepads.as_mut() {
            while let Some(event) = gamepads.next_event() {
                if is_quit_event(&event.event) {
                    debug!("Controller button pressed, quitting");
                    self.state.quit = true;
                }
            }
        }
        self.state.quit
    }

    /// Latest size change since the last call
    pub fn take_resize(&mut self) -> Option<(u32, u32)> {
        self.state.resized.take().map(|size| (size.width, size.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_connection_changes_do_not_quit() {
        assert!(!is_quit_event(&EventType::Connected));
        assert!(!is_quit_event(&EventType::Disconnected));
        assert!(!is_quit_event(&EventType::Dropped));
    }
}
