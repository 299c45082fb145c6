//! Viewport scrolling, desktop switching and work-area upkeep.

use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::registry::{Edge, ScreenId};
use crate::screen::{Direction, Strut};
use crate::window::{WindowFlags, WindowId};
use crate::Core;

impl<B: Backend> Core<B> {
    // ── Viewport ─────────────────────────────────────────────────────

    /// Scroll the viewport of `screen` to `(x, y)`, clamped to the
    /// virtual space.
    pub fn move_viewport_to(&mut self, screen: ScreenId, x: i32, y: i32) {
        let Some(s) = self.state.screens.get_mut(screen) else {
            return;
        };
        let (dx, dy) = s.set_viewport(x, y);
        if (dx, dy) == (0, 0) {
            return;
        }
        let (vx, vy, root) = (s.vx, s.vy, s.root);
        debug!("Viewport of screen {} at ({}, {})", screen, vx, vy);
        self.shift_windows(screen, dx, dy, false);
        self.backend.shift_menus(screen, dx, dy);
        self.backend.set_viewport(root, vx, vy);
    }

    /// Scroll one screen towards `direction` and warp the pointer back so
    /// it stays near the edge it came through.
    pub fn move_viewport(&mut self, screen: ScreenId, direction: Direction) {
        let Some(step) = self
            .state
            .screens
            .get(screen)
            .and_then(|s| s.viewport_step(direction))
        else {
            return;
        };
        self.move_viewport_to(screen, step.x, step.y);
        self.backend.warp_pointer(step.warp_dx, step.warp_dy);
    }

    /// Scroll during a viewport drag: the viewport moves against the
    /// pointer and only windows that are or were on screen are redrawn.
    pub(crate) fn drag_viewport(&mut self, screen: ScreenId, dx: i32, dy: i32) {
        let Some(s) = self.state.screens.get_mut(screen) else {
            return;
        };
        let (sx, sy) = s.set_viewport(s.vx - dx, s.vy - dy);
        if (sx, sy) == (0, 0) {
            return;
        }
        self.shift_windows(screen, sx, sy, true);
        self.backend.shift_menus(screen, sx, sy);
    }

    /// Resync every window once a viewport drag is over.
    pub(crate) fn finish_viewport_drag(&mut self, screen: ScreenId, ids: &[WindowId]) {
        let Some((width, height, root, vx, vy)) = self
            .state
            .screens
            .get(screen)
            .map(|s| (s.width, s.height, s.root, s.vx, s.vy))
        else {
            return;
        };
        for &id in ids {
            self.set_virtual_pos(id);
            let visible = self
                .state
                .window(id)
                .is_some_and(|w| w.frame.visible_on(width, height));
            if visible {
                self.send_config(id);
            }
        }
        self.backend.set_viewport(root, vx, vy);
    }

    /// Shift every non-sticky window of `screen` by `(dx, dy)`.
    ///
    /// Windows that stay off screen are pushed without telling the client,
    /// then get their virtual position published once.
    fn shift_windows(&mut self, screen: ScreenId, dx: i32, dy: i32, dragging: bool) {
        let Some((width, height)) = self.state.screens.get(screen).map(|s| (s.width, s.height)) else {
            return;
        };
        for id in self.state.window_ids_on(screen) {
            let Some(w) = self.state.windows.get_mut(&id) else {
                continue;
            };
            if w.is_sticky() {
                continue;
            }
            let was = w.frame_geometry().visible_on(width, height);
            w.geometry = w.geometry.translated(dx, dy);
            let now = w.frame_geometry().visible_on(width, height);

            if dragging {
                if was || now {
                    self.redraw_window(id);
                }
            } else if now {
                self.redraw(id, true);
            } else if was {
                self.redraw_window(id);
            } else {
                let quiet = w.flags.contains(WindowFlags::DONT_SEND);
                w.flags.insert(WindowFlags::DONT_SEND);
                self.redraw_window(id);
                if !quiet {
                    if let Some(w) = self.state.windows.get_mut(&id) {
                        w.flags.remove(WindowFlags::DONT_SEND);
                    }
                }
                self.set_virtual_pos(id);
            }
        }
    }

    // ── Desktops ─────────────────────────────────────────────────────

    /// Make desktop `number` current on `screen`.
    pub fn go_to_desktop(&mut self, screen: ScreenId, number: u32) {
        let Some(s) = self.state.screens.get(screen) else {
            return;
        };
        let Some(index) = s.desktop_index(number) else {
            warn!("Screen {} has no desktop {}", screen, number);
            return;
        };
        if index == s.current {
            return;
        }
        let root = s.root;
        let previous = self.state.focus.focused;

        self.backend.set_input_focus(root);
        self.state.screens[screen].switch_desktop(index);
        for id in self.state.window_ids_on(screen) {
            let member = self
                .state
                .window(id)
                .is_some_and(|w| w.desktops.contains(number));
            if member {
                self.show_window(id);
            } else {
                self.hide_window(id);
            }
        }

        let refocus = previous.filter(|&p| {
            self.state
                .window(p)
                .is_some_and(|w| w.screen == screen && w.desktops.contains(number))
        });
        if let Some(id) = refocus {
            self.focus(id, false);
        }

        let docks = self.state.screens[screen].docks_visible();
        self.backend.set_docks_visible(screen, docks);
        self.update_workarea(screen);
        self.backend.set_current_desktop(root, number);
        info!("Screen {} switched to desktop {}", screen, number);
    }

    /// Go to the following desktop, wrapping to the first.
    pub fn next_desktop(&mut self, screen: ScreenId) {
        let next = self.state.screens.get(screen).map(|s| {
            let index = (s.current + 1) % s.desktops.len();
            s.desktops[index].number
        });
        if let Some(number) = next {
            self.go_to_desktop(screen, number);
        }
    }

    /// Go to the preceding desktop, wrapping to the last.
    pub fn previous_desktop(&mut self, screen: ScreenId) {
        let previous = self.state.screens.get(screen).map(|s| {
            let count = s.desktops.len();
            s.desktops[(s.current + count - 1) % count].number
        });
        if let Some(number) = previous {
            self.go_to_desktop(screen, number);
        }
    }

    // ── Work-area ────────────────────────────────────────────────────

    /// Recompute the work-area of the current desktop from the struts of
    /// its windows. Maximized windows follow a change.
    pub fn update_workarea(&mut self, screen: ScreenId) {
        let Some(s) = self.state.screens.get(screen) else {
            return;
        };
        let current = s.current_number();
        let struts: Vec<Strut> = s
            .struts
            .iter()
            .filter(|e| {
                match self
                    .state
                    .window_by_client(e.owner)
                    .and_then(|id| self.state.window(id))
                {
                    Some(w) => w.desktops.contains(current),
                    None => s.dock_desktops.contains(current),
                }
            })
            .map(|e| e.strut)
            .collect();
        let area = s.compute_workarea(&struts);
        if !self.state.screens[screen].set_workarea(area) {
            return;
        }
        debug!("Work-area of screen {} is now {:?}", screen, area);
        self.publish_workarea(screen);

        let maximized: Vec<WindowId> = self
            .state
            .windows_on(screen)
            .filter(|w| w.is_maximized() && w.desktops.contains(current))
            .map(|w| w.id)
            .collect();
        for id in maximized {
            self.remaximize(id);
        }
    }

    /// The physical size of `screen` changed.
    pub fn resize_screen(&mut self, screen: ScreenId, width: i32, height: i32) {
        let Some(s) = self.state.screens.get_mut(screen) else {
            return;
        };
        if (s.width, s.height) == (width, height) {
            return;
        }
        let (dx, dy) = s.resize(width, height);
        info!("Screen {} resized to {}x{}", screen, width, height);

        let edges: Vec<_> = Edge::ALL
            .into_iter()
            .map(|e| (s.edge_handle(e), s.edge_geometry(e)))
            .filter(|(h, _)| !h.is_none())
            .collect();
        for (handle, geometry) in edges {
            self.backend.move_resize(handle, geometry);
        }

        let (vx, vy, root) = (s.vx, s.vy, s.root);
        if (dx, dy) != (0, 0) {
            self.shift_windows(screen, dx, dy, false);
            self.backend.shift_menus(screen, dx, dy);
            self.backend.set_viewport(root, vx, vy);
        }
        self.update_workarea(screen);
        self.publish_workarea(screen);
    }
}
