//! Invariant validation for the core state.
//!
//! Called after every dispatch in debug builds.

use crate::registry::{Capability, Object, Part};
use crate::state::State;

/// Error indicating which invariant was violated.
#[derive(Debug, thiserror::Error)]
pub enum InvariantError {
    #[error("Frame of {window} is stacked {count} times")]
    FrameStackCount { window: String, count: usize },

    #[error("Stacking of screen {screen} holds {handle}, which is not a frame")]
    StrayStackEntry { screen: usize, handle: String },

    #[error("Viewport ({vx}, {vy}) of screen {screen} is outside 0..=({max_x}, {max_y})")]
    ViewportOutOfRange {
        screen: usize,
        vx: i32,
        vy: i32,
        max_x: i32,
        max_y: i32,
    },

    #[error("Current desktop index {index} of screen {screen} is out of range")]
    CurrentDesktopOutOfRange { screen: usize, index: usize },

    #[error("Focused window {0} does not exist")]
    FocusedWindowMissing(String),

    #[error("Window {window} lists transient {transient} which does not point back")]
    TransientLink { window: String, transient: String },

    #[error("Client of {0} is not registered")]
    ClientUnregistered(String),
}

/// Validate all core invariants. Returns the first violation found.
pub fn validate(state: &State) -> Result<(), InvariantError> {
    // 1. Viewport within bounds, current desktop exists
    for (screen, s) in state.screens.iter().enumerate() {
        if !(0..=s.vmax_x()).contains(&s.vx) || !(0..=s.vmax_y()).contains(&s.vy) {
            return Err(InvariantError::ViewportOutOfRange {
                screen,
                vx: s.vx,
                vy: s.vy,
                max_x: s.vmax_x(),
                max_y: s.vmax_y(),
            });
        }
        if s.current >= s.desktops.len() {
            return Err(InvariantError::CurrentDesktopOutOfRange {
                screen,
                index: s.current,
            });
        }

        // 2. Only frames are stacked
        for handle in s.stacking.iter() {
            let is_frame = matches!(
                state.registry.find(handle, Capability::FRAME),
                Some(Object::Decoration {
                    part: Part::Frame,
                    ..
                })
            );
            if !is_frame {
                return Err(InvariantError::StrayStackEntry {
                    screen,
                    handle: handle.to_string(),
                });
            }
        }
    }

    for (id, window) in &state.windows {
        // 3. Each frame sits in exactly one layer of its own screen and
        // nowhere else
        let count = state
            .screens
            .iter()
            .map(|s| s.stacking.occurrences(window.parts.frame))
            .sum::<usize>();
        let on_own = state
            .screens
            .get(window.screen)
            .map_or(0, |s| s.stacking.occurrences(window.parts.frame));
        if count != 1 || on_own != 1 {
            return Err(InvariantError::FrameStackCount {
                window: id.to_string(),
                count,
            });
        }

        // 4. Client handle resolves back to the window
        if state.window_by_client(window.client) != Some(*id) {
            return Err(InvariantError::ClientUnregistered(id.to_string()));
        }

        // 5. Transient links are symmetric
        for t in &window.transients {
            if let Some(child) = state.windows.get(t) {
                if child.transient_for != Some(*id) {
                    return Err(InvariantError::TransientLink {
                        window: id.to_string(),
                        transient: t.to_string(),
                    });
                }
            }
        }
    }

    // 6. Focused window must exist
    if let Some(fid) = state.focus.focused {
        if !state.windows.contains_key(&fid) {
            return Err(InvariantError::FocusedWindowMissing(fid.to_string()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::geometry::Geometry;
    use crate::input::Bindings;
    use crate::registry::Handle;
    use crate::screen::Screen;
    use crate::stacking::Position;
    use crate::window::{FrameParts, Layer, ManagedWindow, WindowId};

    fn state_with_window() -> State {
        let mut state = State::new(Config::default(), Bindings::default());
        state.screens.push(Screen::new(Handle(1), 800, 600, 2, 1));
        let mut w = ManagedWindow::new(WindowId(1), Handle(0x10), 0, Geometry::new(0, 0, 100, 100));
        w.parts = FrameParts {
            frame: Handle(0x20),
            ..FrameParts::default()
        };
        state.add_window(w);
        state.screens[0]
            .stacking
            .insert(Handle(0x20), Layer::Normal, Position::Front);
        state
    }

    #[test]
    fn test_valid_state() {
        assert!(validate(&state_with_window()).is_ok());
    }

    #[test]
    fn test_unstacked_frame_is_reported() {
        let mut state = state_with_window();
        state.screens[0].stacking.remove(Handle(0x20));
        assert!(matches!(
            validate(&state),
            Err(InvariantError::FrameStackCount { count: 0, .. })
        ));
    }

    #[test]
    fn test_viewport_out_of_range() {
        let mut state = state_with_window();
        state.screens[0].vx = 1000;
        assert!(matches!(
            validate(&state),
            Err(InvariantError::ViewportOutOfRange { vx: 1000, .. })
        ));
    }

    #[test]
    fn test_stray_stack_entry() {
        let mut state = state_with_window();
        state.screens[0]
            .stacking
            .insert(Handle(0x99), Layer::OnTop, Position::Front);
        assert!(matches!(
            validate(&state),
            Err(InvariantError::StrayStackEntry { .. })
        ));
    }

    #[test]
    fn test_frame_stacked_on_two_screens() {
        let mut state = state_with_window();
        state.screens.push(Screen::new(Handle(2), 800, 600, 2, 1));
        state.screens[1]
            .stacking
            .insert(Handle(0x20), Layer::OnTop, Position::Back);
        assert!(matches!(
            validate(&state),
            Err(InvariantError::FrameStackCount { count: 2, .. })
        ));
    }

    #[test]
    fn test_frame_stacked_on_foreign_screen() {
        let mut state = state_with_window();
        state.screens.push(Screen::new(Handle(2), 800, 600, 2, 1));
        state.screens[0].stacking.remove(Handle(0x20));
        state.screens[1]
            .stacking
            .insert(Handle(0x20), Layer::Normal, Position::Front);
        assert!(matches!(
            validate(&state),
            Err(InvariantError::FrameStackCount { count: 1, .. })
        ));
    }

    #[test]
    fn test_one_sided_transient() {
        let mut state = state_with_window();
        let mut child = ManagedWindow::new(WindowId(2), Handle(0x30), 0, Geometry::new(0, 0, 50, 50));
        child.parts = FrameParts {
            frame: Handle(0x40),
            ..FrameParts::default()
        };
        state.add_window(child);
        state.screens[0]
            .stacking
            .insert(Handle(0x40), Layer::Normal, Position::Front);
        assert!(validate(&state).is_ok());

        state.windows.get_mut(&WindowId(1)).unwrap().transients.push(WindowId(2));
        assert!(matches!(
            validate(&state),
            Err(InvariantError::TransientLink { .. })
        ));

        state.windows.get_mut(&WindowId(2)).unwrap().transient_for = Some(WindowId(1));
        assert!(validate(&state).is_ok());
    }

    #[test]
    fn test_unregistered_client() {
        let mut state = state_with_window();
        state.registry.remove(Handle(0x10));
        assert!(matches!(
            validate(&state),
            Err(InvariantError::ClientUnregistered(_))
        ));
    }

    #[test]
    fn test_current_desktop_out_of_range() {
        let mut state = state_with_window();
        state.screens[0].current = 99;
        assert!(matches!(
            validate(&state),
            Err(InvariantError::CurrentDesktopOutOfRange { index: 99, .. })
        ));
    }

    #[test]
    fn test_missing_focus_target() {
        let mut state = state_with_window();
        state.focus.focused = Some(WindowId(42));
        assert!(matches!(
            validate(&state),
            Err(InvariantError::FocusedWindowMissing(_))
        ));
    }
}
