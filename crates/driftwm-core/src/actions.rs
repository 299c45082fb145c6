//! Behavior execution and the window operations bindings invoke.

use tracing::{debug, info, trace, warn};

use crate::backend::{with_valid, Backend};
use crate::desktop::DesktopMask;
use crate::event::{Event, WmState};
use crate::geometry::GeometrySpec;
use crate::input::{ActionBinding, Behavior};
use crate::interaction::Side;
use crate::registry::ScreenId;
use crate::screen::Direction;
use crate::stacking::Position;
use crate::window::{DecorFlags, Layer, ShadeChange, WindowFlags, WindowId};
use crate::Core;

/// What a binding acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Window(WindowId),
    Screen(ScreenId),
}

impl<B: Backend> Core<B> {
    /// Run the behavior of `binding`, triggered by `event`, on `target`.
    ///
    /// Screen behaviors bound on a window run on the window's screen;
    /// window behaviors bound on a root or an edge are ignored.
    pub(crate) fn execute(&mut self, target: Target, binding: &ActionBinding, event: &Event) {
        let behavior = binding.behavior;
        let param = binding.param.as_deref();
        if behavior.needs_param() && param.is_none() {
            debug!("{} without an argument, ignored", behavior);
            return;
        }
        trace!("execute {} on {:?}", behavior, target);
        match target {
            Target::Window(id) if behavior.targets_window() => {
                self.window_behavior(id, behavior, param, event);
            },
            Target::Window(id) => {
                if let Some(screen) = self.state.window(id).map(|w| w.screen) {
                    self.screen_behavior(screen, behavior, param);
                }
            },
            Target::Screen(screen) if !behavior.targets_window() => {
                self.screen_behavior(screen, behavior, param);
            },
            Target::Screen(_) => trace!("{} needs a window", behavior),
        }
    }

    fn window_behavior(&mut self, id: WindowId, behavior: Behavior, param: Option<&str>, event: &Event) {
        let Some(w) = self.state.window(id) else {
            return;
        };
        let (layer, decor, shaded, maximized, minimized, sticky) = (
            w.layer,
            w.decor_flags,
            w.is_shaded(),
            w.is_maximized(),
            w.is_minimized(),
            w.is_sticky(),
        );
        let param = param.unwrap_or_default();

        match behavior {
            Behavior::Raise => self.raise(id),
            Behavior::Lower => self.lower(id),
            Behavior::Focus => self.focus(id, false),
            Behavior::RaiseFocus => {
                self.raise(id);
                self.focus(id, false);
            },
            Behavior::Move => self.start_move(id, false, event),
            Behavior::MoveOpaque => self.start_move(id, true, event),
            Behavior::ResizeLeft => self.start_resize(id, Side::Left, false, event),
            Behavior::ResizeRight => self.start_resize(id, Side::Right, false, event),
            Behavior::ResizeLeftOpaque => self.start_resize(id, Side::Left, true, event),
            Behavior::ResizeRightOpaque => self.start_resize(id, Side::Right, true, event),

            Behavior::Maximize => self.maximize(id),
            Behavior::UnMaximize => self.unmaximize(id),
            Behavior::ToggleMaximize if maximized => self.unmaximize(id),
            Behavior::ToggleMaximize => self.maximize(id),
            Behavior::Shade => self.shade(id),
            Behavior::UnShade => self.unshade(id),
            Behavior::ToggleShade if shaded => self.unshade(id),
            Behavior::ToggleShade => self.shade(id),

            Behavior::Sticky => self.set_sticky(id, true),
            Behavior::UnSticky => self.set_sticky(id, false),
            Behavior::ToggleSticky => self.set_sticky(id, !sticky),
            Behavior::Minimize => self.minimize(id),
            Behavior::UnMinimize => self.unminimize(id),
            Behavior::ToggleMinimize if minimized => self.unminimize(id),
            Behavior::ToggleMinimize => self.minimize(id),

            Behavior::AlwaysOnTopOn => self.set_layer(id, Layer::OnTop),
            Behavior::AlwaysOnTopOff if layer == Layer::OnTop => self.set_layer(id, Layer::Normal),
            Behavior::AlwaysOnTopToggle if layer == Layer::OnTop => self.set_layer(id, Layer::Normal),
            Behavior::AlwaysOnTopToggle => self.set_layer(id, Layer::OnTop),
            Behavior::AlwaysAtBottomOn => self.set_layer(id, Layer::AtBottom),
            Behavior::AlwaysAtBottomOff if layer == Layer::AtBottom => {
                self.set_layer(id, Layer::Normal);
            },
            Behavior::AlwaysAtBottomToggle if layer == Layer::AtBottom => {
                self.set_layer(id, Layer::Normal);
            },
            Behavior::AlwaysAtBottomToggle => self.set_layer(id, Layer::AtBottom),

            Behavior::DecorTitleOn => self.set_decor(id, DecorFlags::TITLE, true),
            Behavior::DecorTitleOff => self.set_decor(id, DecorFlags::TITLE, false),
            Behavior::DecorTitleToggle => {
                self.set_decor(id, DecorFlags::TITLE, !decor.contains(DecorFlags::TITLE));
            },
            Behavior::DecorHandleOn => self.set_decor(id, DecorFlags::HANDLE, true),
            Behavior::DecorHandleOff => self.set_decor(id, DecorFlags::HANDLE, false),
            Behavior::DecorHandleToggle => {
                self.set_decor(id, DecorFlags::HANDLE, !decor.contains(DecorFlags::HANDLE));
            },
            Behavior::DecorBorderOn => self.set_decor(id, DecorFlags::BORDER, true),
            Behavior::DecorBorderOff => self.set_decor(id, DecorFlags::BORDER, false),
            Behavior::DecorBorderToggle => {
                self.set_decor(id, DecorFlags::BORDER, !decor.contains(DecorFlags::BORDER));
            },
            Behavior::DecorAllOn => self.set_decor(id, DecorFlags::all(), true),
            Behavior::DecorAllOff => self.set_decor(id, DecorFlags::all(), false),

            Behavior::AcceptConfigRequestOn => self.set_flag(id, WindowFlags::IGNORE_CONFIG_REQ, false),
            Behavior::AcceptConfigRequestOff => self.set_flag(id, WindowFlags::IGNORE_CONFIG_REQ, true),
            Behavior::AcceptConfigRequestToggle => {
                let ignoring = self
                    .state
                    .window(id)
                    .is_some_and(|w| w.flags.contains(WindowFlags::IGNORE_CONFIG_REQ));
                self.set_flag(id, WindowFlags::IGNORE_CONFIG_REQ, !ignoring);
            },

            Behavior::Close => self.close(id),
            Behavior::Kill => self.kill(id),
            Behavior::CloseKill => self.close_kill(id),
            Behavior::MoveResize => self.move_resize_to(id, param, false),
            Behavior::MoveResizeVirtual => self.move_resize_to(id, param, true),

            Behavior::JoinDesktop => {
                if let Some(n) = self.desktop_param(id, param) {
                    self.change_desktops(id, |mask, _| mask.union(DesktopMask::single(n)));
                }
            },
            Behavior::PartDesktop => {
                if let Some(n) = self.desktop_param(id, param) {
                    self.change_desktops(id, |mask, _| mask.difference(DesktopMask::single(n)));
                }
            },
            Behavior::PartCurrentDesktop => {
                self.change_desktops(id, |mask, current| mask.difference(DesktopMask::single(current)));
            },
            Behavior::JoinAllDesktops => self.change_desktops(id, |_, _| DesktopMask::ALL),
            Behavior::PartAllDesktopsExceptCurrent => {
                self.change_desktops(id, |_, current| DesktopMask::single(current));
            },
            Behavior::PartCurrentJoinDesktop => {
                if let Some(n) = self.desktop_param(id, param) {
                    self.change_desktops(id, |mask, current| {
                        mask.difference(DesktopMask::single(current))
                            .union(DesktopMask::single(n))
                    });
                }
            },
            Behavior::SetDesktopMask => {
                let count = self.desktop_count_of(id);
                match DesktopMask::parse(param, count) {
                    Some(mask) if mask.is_empty() => {
                        self.change_desktops(id, |_, _| DesktopMask::single(0));
                    },
                    Some(mask) => self.change_desktops(id, |_, _| mask),
                    None => warn!("Bad desktop mask {:?}", param),
                }
            },

            // Only reachable with a window target when a toggle guard above
            // did not apply; nothing to do.
            _ => {},
        }
    }

    fn screen_behavior(&mut self, screen: ScreenId, behavior: Behavior, param: Option<&str>) {
        let param = param.unwrap_or_default();
        match behavior {
            Behavior::EndMoveResize => self.end_session(),
            Behavior::MoveViewportLeft => self.move_viewport(screen, Direction::West),
            Behavior::MoveViewportRight => self.move_viewport(screen, Direction::East),
            Behavior::MoveViewportUp => self.move_viewport(screen, Direction::North),
            Behavior::MoveViewportDown => self.move_viewport(screen, Direction::South),
            Behavior::ViewportFixedMove => self.viewport_fixed_move(screen, param),
            Behavior::ViewportRelativeMove => self.viewport_relative_move(screen, param),
            Behavior::ViewportMove => self.start_viewport_drag(screen),
            Behavior::GoToDesktop => match param.trim().parse() {
                Ok(n) => self.go_to_desktop(screen, n),
                Err(_) => warn!("Bad desktop number {:?}", param),
            },
            Behavior::NextDesktop => self.next_desktop(screen),
            Behavior::PreviousDesktop => self.previous_desktop(screen),
            Behavior::NextTask => self.switch_task(false),
            Behavior::PreviousTask => self.switch_task(true),
            Behavior::PointerFixedWarp => self.pointer_fixed_warp(screen, param),
            Behavior::PointerRelativeWarp => {
                if let Some(spec) = parse_geometry(param) {
                    let dx = spec.x.map_or(0, |o| o.value);
                    let dy = spec.y.map_or(0, |o| o.value);
                    self.backend.warp_pointer(dx, dy);
                }
            },
            Behavior::Exec => {
                info!("Running {:?}", param);
                self.backend.spawn(param);
            },
            Behavior::Restart => {
                info!("Restart requested");
                self.restart_requested = true;
                self.should_exit = true;
            },
            Behavior::Exit => {
                info!("Exit requested");
                self.should_exit = true;
            },
            _ => {},
        }
    }

    // ── Stacking ─────────────────────────────────────────────────────

    /// Raise `id` within its layer, transients along with it.
    pub fn raise(&mut self, id: WindowId) {
        let Some(w) = self.state.window(id) else {
            return;
        };
        if w.flags.contains(WindowFlags::FORCE_BOTTOM) {
            return;
        }
        let (screen, frame) = (w.screen, w.parts.frame);
        let transients = if self.state.config.general.transient_above {
            self.state.transient_frames(id)
        } else {
            Vec::new()
        };
        if self.state.screens[screen].stacking.raise_group(frame, &transients) {
            self.restack(screen);
        }
    }

    pub fn lower(&mut self, id: WindowId) {
        let Some(w) = self.state.window(id) else {
            return;
        };
        if w.flags.contains(WindowFlags::FORCE_BOTTOM) {
            return;
        }
        let (screen, frame) = (w.screen, w.parts.frame);
        if self.state.screens[screen].stacking.lower(frame) {
            self.restack(screen);
        }
    }

    /// Move `id` into `layer`. Windows leaving the on-top layer land at the
    /// front of the normal one; every other transfer lands at the back.
    pub fn set_layer(&mut self, id: WindowId, layer: Layer) {
        let Some(w) = self.state.window_mut(id) else {
            return;
        };
        let from = w.layer;
        if from == layer {
            return;
        }
        w.layer = layer;
        let (screen, frame) = (w.screen, w.parts.frame);
        let at = if from == Layer::OnTop && layer == Layer::Normal {
            Position::Front
        } else {
            Position::Back
        };
        self.state.screens[screen].stacking.set_layer(frame, layer, at);
        debug!("{} moved to layer {:?}", id, layer);
        self.restack(screen);
        self.publish_net_state(id);
    }

    // ── Focus ────────────────────────────────────────────────────────

    /// Give `id` the input focus. With `vis` the window is first made
    /// visible: un-minimized, its desktop made current and the viewport
    /// scrolled to it.
    pub fn focus(&mut self, id: WindowId, vis: bool) {
        let Some(w) = self.state.window_mut(id) else {
            return;
        };
        if !vis && w.is_hidden() {
            return;
        }
        if !w.flags.contains(WindowFlags::MAPPED) {
            w.flags.insert(WindowFlags::WANT_FOCUS);
            return;
        }
        if vis {
            self.make_visible(id);
        }
        let Some(w) = self.state.window(id) else {
            return;
        };
        let (client, colormap) = (w.client, w.colormap);
        self.backend.install_colormap(colormap);
        with_valid(&mut self.backend, client, |d| d.set_input_focus(client));
    }

    fn make_visible(&mut self, id: WindowId) {
        if self.state.window(id).is_some_and(|w| w.is_minimized()) {
            self.unminimize(id);
        }
        let Some(w) = self.state.window(id) else {
            return;
        };
        let (screen, desktops) = (w.screen, w.desktops);
        let s = &self.state.screens[screen];
        if !desktops.contains(s.current_number()) {
            if let Some(n) = desktops.iter().find(|&n| s.desktop_index(n).is_some()) {
                self.go_to_desktop(screen, n);
            }
        }

        let Some(w) = self.state.window(id) else {
            return;
        };
        let s = &self.state.screens[screen];
        let g = w.geometry;
        let off_screen = g.x >= s.width
            || g.y >= s.height
            || g.x + g.width <= 0
            || g.y + g.height <= 0;
        if off_screen {
            let x = (s.vx + g.x).div_euclid(s.width) * s.width;
            let y = (s.vy + g.y).div_euclid(s.height) * s.height;
            self.move_viewport_to(screen, x, y);
        }
    }

    /// Raise and focus a window from the focus history: the previously
    /// focused one, or the one focused longest ago.
    fn switch_task(&mut self, previous: bool) {
        if self.session.is_some() {
            return;
        }
        let history = &self.state.focus.history;
        let pick = if previous {
            history.get(1).copied()
        } else {
            history.last().copied()
        };
        if let Some(id) = pick {
            self.raise(id);
            self.focus(id, true);
        }
    }

    // ── Window state ─────────────────────────────────────────────────

    pub fn set_sticky(&mut self, id: WindowId, on: bool) {
        self.set_flag(id, WindowFlags::STICKY, on);
        self.publish_net_state(id);
    }

    fn set_flag(&mut self, id: WindowId, flag: WindowFlags, on: bool) {
        if let Some(w) = self.state.window_mut(id) {
            w.flags.set(flag, on);
        }
    }

    pub fn minimize(&mut self, id: WindowId) {
        let Some(w) = self.state.window_mut(id) else {
            return;
        };
        if w.is_minimized() {
            return;
        }
        w.flags.insert(WindowFlags::MINIMIZED);
        let (client, screen) = (w.client, w.screen);
        self.hide_window(id);
        self.backend.set_wm_state(client, WmState::Iconic);
        self.publish_net_state(id);
        if self.state.focus.focused == Some(id) {
            let root = self.state.screens[screen].root;
            self.backend.set_input_focus(root);
        }
    }

    pub fn unminimize(&mut self, id: WindowId) {
        let Some(w) = self.state.window_mut(id) else {
            return;
        };
        if !w.is_minimized() {
            return;
        }
        w.flags.remove(WindowFlags::MINIMIZED);
        let (client, screen, desktops) = (w.client, w.screen, w.desktops);
        if desktops.contains(self.state.screens[screen].current_number()) {
            self.show_window(id);
        }
        self.backend.set_wm_state(client, WmState::Normal);
        self.publish_net_state(id);
    }

    /// Switch fullscreen on or off: an undecorated, always-on-top maximize.
    pub(crate) fn set_fullscreen(&mut self, id: WindowId, on: bool) {
        let Some(w) = self.state.window_mut(id) else {
            return;
        };
        if w.flags.contains(WindowFlags::FULLSCREEN) == on {
            return;
        }
        w.flags.set(WindowFlags::FULLSCREEN, on);
        let layer = w.layer;
        if on {
            self.set_decor(id, DecorFlags::all(), false);
            self.set_layer(id, Layer::OnTop);
            self.maximize(id);
        } else {
            self.unmaximize(id);
            if layer == Layer::OnTop {
                self.set_layer(id, Layer::Normal);
            }
            self.set_decor(id, DecorFlags::all(), true);
        }
        self.publish_net_state(id);
    }

    /// Turn decoration elements on or off. The title stays while shaded.
    pub fn set_decor(&mut self, id: WindowId, flags: DecorFlags, on: bool) {
        let Some(w) = self.state.window_mut(id) else {
            return;
        };
        if !on && flags.contains(DecorFlags::TITLE) && w.is_shaded() {
            return;
        }
        let new = if on {
            w.decor_flags | flags
        } else {
            w.decor_flags - flags
        };
        if new == w.decor_flags {
            return;
        }
        w.decor_flags = new;
        w.applied = None;
        let saved = w.maximized.take();
        self.redraw(id, true);
        if let Some(saved) = saved {
            if let Some(w) = self.state.window_mut(id) {
                w.maximized = Some(saved);
            }
            self.remaximize(id);
        }
        self.publish_net_state(id);
    }

    // ── Closing ──────────────────────────────────────────────────────

    /// Ask the client to close through the delete-window protocol.
    pub fn close(&mut self, id: WindowId) {
        if let Some(client) = self.state.window(id).map(|w| w.client) {
            with_valid(&mut self.backend, client, |d| d.close(client));
        }
    }

    pub fn kill(&mut self, id: WindowId) {
        if let Some(client) = self.state.window(id).map(|w| w.client) {
            with_valid(&mut self.backend, client, |d| d.kill(client));
        }
    }

    /// Close politely when the client supports it, kill it otherwise.
    pub fn close_kill(&mut self, id: WindowId) {
        let Some(client) = self.state.window(id).map(|w| w.client) else {
            return;
        };
        let polite = with_valid(&mut self.backend, client, |d| d.supports_delete(client))
            .unwrap_or(false);
        if polite {
            self.close(id);
        } else {
            self.kill(id);
        }
    }

    // ── Geometry ─────────────────────────────────────────────────────

    /// Apply a geometry string to `id`. Negative offsets count back from
    /// the screen's far edge, or from the far edge of the virtual space
    /// when `virtual_space` is set.
    pub fn move_resize_to(&mut self, id: WindowId, param: &str, virtual_space: bool) {
        if self.session.is_some() {
            return;
        }
        let Some(spec) = parse_geometry(param) else {
            return;
        };
        let Some(w) = self.state.windows.get_mut(&id) else {
            return;
        };
        let s = &self.state.screens[w.screen];
        let width = spec.width.unwrap_or(w.geometry.width);
        let height = spec.height.unwrap_or(w.geometry.height);
        let mut shade = ShadeChange::None;
        if let Some(check) = w.check_size(width, height) {
            shade = w.apply_size(check);
        }
        let g = &mut w.geometry;
        if virtual_space {
            if let Some(x) = spec.x {
                g.x = x.resolve(s.vmax_x() + s.width - g.width) - s.vx;
            }
            if let Some(y) = spec.y {
                g.y = y.resolve(s.vmax_y() + s.height - g.height) - s.vy;
            }
        } else {
            if let Some(x) = spec.x {
                g.x = x.resolve(s.width - g.width);
            }
            if let Some(y) = spec.y {
                g.y = y.resolve(s.height - g.height);
            }
        }
        self.redraw_window(id);
        if shade != ShadeChange::None {
            self.publish_net_state(id);
        }
    }

    fn viewport_fixed_move(&mut self, screen: ScreenId, param: &str) {
        let Some(spec) = parse_geometry(param) else {
            return;
        };
        let Some(s) = self.state.screens.get(screen) else {
            return;
        };
        let x = spec.x.map_or(0, |o| o.resolve(s.vmax_x()));
        let y = spec.y.map_or(0, |o| o.resolve(s.vmax_y()));
        self.move_viewport_to(screen, x, y);
    }

    fn viewport_relative_move(&mut self, screen: ScreenId, param: &str) {
        let Some(spec) = parse_geometry(param) else {
            return;
        };
        let Some(s) = self.state.screens.get(screen) else {
            return;
        };
        let x = s.vx + spec.x.map_or(0, |o| o.value);
        let y = s.vy + spec.y.map_or(0, |o| o.value);
        self.move_viewport_to(screen, x, y);
    }

    fn pointer_fixed_warp(&mut self, screen: ScreenId, param: &str) {
        let Some(spec) = parse_geometry(param) else {
            return;
        };
        let Some(s) = self.state.screens.get(screen) else {
            return;
        };
        let (width, height, root) = (s.width, s.height, s.root);
        let pointer = self.backend.query_pointer(root).root;
        let x = spec.x.map_or(pointer.x, |o| o.resolve(width));
        let y = spec.y.map_or(pointer.y, |o| o.resolve(height));
        self.backend.warp_pointer(x - pointer.x, y - pointer.y);
    }

    // ── Desktop membership ───────────────────────────────────────────

    pub(crate) fn desktop_count_of(&self, id: WindowId) -> u32 {
        self.state
            .window(id)
            .and_then(|w| self.state.screens.get(w.screen))
            .map_or(0, |s| s.desktop_count())
    }

    fn desktop_param(&self, id: WindowId, param: &str) -> Option<u32> {
        match param.trim().parse::<u32>() {
            Ok(n) if n < self.desktop_count_of(id) => Some(n),
            _ => {
                warn!("Bad desktop number {:?}", param);
                None
            },
        }
    }

    /// Replace the desktop mask of `id` with `f(mask, current)`. A change
    /// that would leave the window on no desktop is refused.
    pub(crate) fn change_desktops(&mut self, id: WindowId, f: impl FnOnce(DesktopMask, u32) -> DesktopMask) {
        let Some(w) = self.state.windows.get_mut(&id) else {
            return;
        };
        let current = self.state.screens[w.screen].current_number();
        let mask = f(w.desktops, current);
        if mask.is_empty() || mask == w.desktops {
            return;
        }
        w.desktops = mask;
        let client = w.client;
        if mask.contains(current) {
            self.show_window(id);
        } else {
            self.hide_window(id);
        }
        debug!("{} now on desktops {}", id, mask);
        self.backend.set_desktop(client, mask);
    }
}

fn parse_geometry(param: &str) -> Option<GeometrySpec> {
    GeometrySpec::parse(param)
        .map_err(|e| warn!("Bad geometry {:?}: {}", param, e))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Point;
    use crate::geometry::Geometry;
    use crate::input::ActionKind;
    use crate::mock::{self, Call, MockBackend, ROOT};
    use crate::test_util::{core, map_client};
    use pretty_assertions::assert_eq;

    fn run(core: &mut Core<MockBackend>, target: Target, behavior: Behavior, param: Option<&str>) {
        let mut binding = ActionBinding::new(ActionKind::ButtonPress, 1, behavior);
        binding.param = param.map(String::from);
        let event = mock::button_press(ROOT, 1, Default::default(), Point::new(10, 10), 2000);
        core.execute(target, &binding, &event);
    }

    fn frame(core: &Core<MockBackend>, id: WindowId) -> crate::Handle {
        core.state.window(id).unwrap().parts.frame
    }

    #[test]
    fn test_raise_brings_transients_along() {
        let mut core = core();
        let owner = map_client(&mut core, Geometry::new(0, 0, 100, 100));
        let owner_client = core.state.window(owner).unwrap().client;
        let dialog_client = core.backend.create_client(Geometry::new(0, 0, 80, 80));
        core.backend.client_mut(dialog_client).unwrap().transient_for = Some(owner_client);
        core.dispatch(mock::map_request(dialog_client));
        let dialog = core.state.window_by_client(dialog_client).unwrap();
        let other = map_client(&mut core, Geometry::new(0, 0, 100, 100));

        core.raise(owner);
        let normal: Vec<_> = core.state.screens[0].stacking.list(Layer::Normal).iter().copied().collect();
        assert_eq!(normal, vec![frame(&core, dialog), frame(&core, owner), frame(&core, other)]);
    }

    #[test]
    fn test_forced_bottom_window_stays_put() {
        let mut core = core();
        let a = map_client(&mut core, Geometry::new(0, 0, 100, 100));
        let _b = map_client(&mut core, Geometry::new(0, 0, 100, 100));
        core.state.window_mut(a).unwrap().flags |= WindowFlags::FORCE_BOTTOM;
        core.raise(a);
        let normal = core.state.screens[0].stacking.list(Layer::Normal);
        assert_eq!(normal.back(), Some(&frame(&core, a)));
    }

    #[test]
    fn test_layer_toggles() {
        let mut core = core();
        let a = map_client(&mut core, Geometry::new(0, 0, 100, 100));
        run(&mut core, Target::Window(a), Behavior::AlwaysOnTopToggle, None);
        assert_eq!(core.state.window(a).unwrap().layer, Layer::OnTop);
        assert_eq!(core.state.screens[0].stacking.layer_of(frame(&core, a)), Some(Layer::OnTop));

        run(&mut core, Target::Window(a), Behavior::AlwaysAtBottomOff, None);
        assert_eq!(core.state.window(a).unwrap().layer, Layer::OnTop);

        run(&mut core, Target::Window(a), Behavior::AlwaysOnTopToggle, None);
        assert_eq!(core.state.screens[0].stacking.layer_of(frame(&core, a)), Some(Layer::Normal));
    }

    #[test]
    fn test_window_behavior_on_root_is_ignored() {
        let mut core = core();
        core.backend.calls.clear();
        run(&mut core, Target::Screen(0), Behavior::Maximize, None);
        run(&mut core, Target::Screen(0), Behavior::Close, None);
        assert!(core.backend.calls.is_empty());
    }

    #[test]
    fn test_missing_argument_is_ignored() {
        let mut core = core();
        run(&mut core, Target::Screen(0), Behavior::Exec, None);
        assert!(!core.backend.called(|c| matches!(c, Call::Spawn(_))));
    }

    #[test]
    fn test_exec_exit_and_restart() {
        let mut core = core();
        let a = map_client(&mut core, Geometry::new(0, 0, 100, 100));
        // Screen behaviors bound on a window run on its screen
        run(&mut core, Target::Window(a), Behavior::Exec, Some("xterm"));
        assert!(core.backend.called(|c| *c == Call::Spawn("xterm".into())));

        run(&mut core, Target::Screen(0), Behavior::Restart, None);
        assert!(core.restart_requested && core.should_exit);
    }

    #[test]
    fn test_close_kill_prefers_delete_protocol() {
        let mut core = core();
        let a = map_client(&mut core, Geometry::new(0, 0, 100, 100));
        let client = core.state.window(a).unwrap().client;
        run(&mut core, Target::Window(a), Behavior::CloseKill, None);
        assert!(core.backend.called(|c| *c == Call::Close(client)));

        core.backend.client_mut(client).unwrap().supports_delete = false;
        run(&mut core, Target::Window(a), Behavior::CloseKill, None);
        assert!(core.backend.called(|c| *c == Call::Kill(client)));
    }

    #[test]
    fn test_close_on_stale_client_is_skipped() {
        let mut core = core();
        let a = map_client(&mut core, Geometry::new(0, 0, 100, 100));
        let client = core.state.window(a).unwrap().client;
        core.backend.forget(client);
        run(&mut core, Target::Window(a), Behavior::Close, None);
        assert!(!core.backend.called(|c| matches!(c, Call::Close(_))));
    }

    #[test]
    fn test_move_resize_from_far_edge() {
        let mut core = core();
        let a = map_client(&mut core, Geometry::new(100, 100, 300, 200));
        run(&mut core, Target::Window(a), Behavior::MoveResize, Some("200x100-0+10"));
        assert_eq!(core.state.window(a).unwrap().geometry, Geometry::new(600, 10, 200, 100));
    }

    #[test]
    fn test_move_resize_virtual_is_relative_to_viewport() {
        let mut core = core();
        let a = map_client(&mut core, Geometry::new(100, 100, 300, 200));
        core.move_viewport_to(0, 800, 0);
        run(&mut core, Target::Window(a), Behavior::MoveResizeVirtual, Some("+1000+50"));
        let w = core.state.window(a).unwrap();
        assert_eq!((w.geometry.x, w.geometry.y), (200, 50));
        assert_eq!(core.virtual_pos(a), Some(Point::new(1000, 50)));
    }

    #[test]
    fn test_bad_geometry_changes_nothing() {
        let mut core = core();
        let a = map_client(&mut core, Geometry::new(100, 100, 300, 200));
        run(&mut core, Target::Window(a), Behavior::MoveResize, Some("big"));
        assert_eq!(core.state.window(a).unwrap().geometry, Geometry::new(101, 122, 300, 200));
    }

    #[test]
    fn test_desktop_membership() {
        let mut core = core();
        let a = map_client(&mut core, Geometry::new(0, 0, 100, 100));
        let client = core.state.window(a).unwrap().client;

        run(&mut core, Target::Window(a), Behavior::SetDesktopMask, Some("1 2"));
        assert!(core.state.window(a).unwrap().is_hidden());
        assert_eq!(core.backend.published.desktops[&client], DesktopMask(0b110));

        run(&mut core, Target::Window(a), Behavior::JoinDesktop, Some("0"));
        assert!(core.state.window(a).unwrap().is_shown());

        run(&mut core, Target::Window(a), Behavior::PartAllDesktopsExceptCurrent, None);
        assert_eq!(core.state.window(a).unwrap().desktops, DesktopMask::single(0));

        // The last desktop cannot be parted
        run(&mut core, Target::Window(a), Behavior::PartCurrentDesktop, None);
        assert_eq!(core.state.window(a).unwrap().desktops, DesktopMask::single(0));

        run(&mut core, Target::Window(a), Behavior::JoinDesktop, Some("9"));
        assert_eq!(core.state.window(a).unwrap().desktops, DesktopMask::single(0));
    }

    #[test]
    fn test_decor_change_reframes() {
        let mut core = core();
        let a = map_client(&mut core, Geometry::new(100, 100, 300, 200));
        core.backend.calls.clear();
        run(&mut core, Target::Window(a), Behavior::DecorTitleOff, None);
        let w = core.state.window(a).unwrap();
        assert_eq!(w.frame, Geometry::new(100, 121, 300, 207));
        assert!(core.backend.called(|c| matches!(c, Call::ConfigureFrame { .. })));
    }

    #[test]
    fn test_title_stays_while_shaded() {
        let mut core = core();
        let a = map_client(&mut core, Geometry::new(100, 100, 300, 200));
        core.shade(a);
        run(&mut core, Target::Window(a), Behavior::DecorTitleOff, None);
        run(&mut core, Target::Window(a), Behavior::DecorAllOff, None);
        assert!(core.state.window(a).unwrap().decor_flags.contains(DecorFlags::TITLE));
    }

    #[test]
    fn test_decor_change_keeps_maximized() {
        let mut core = core();
        let a = map_client(&mut core, Geometry::new(100, 100, 300, 200));
        core.maximize(a);
        let before = core.state.window(a).unwrap().geometry;
        run(&mut core, Target::Window(a), Behavior::DecorHandleOff, None);
        let w = core.state.window(a).unwrap();
        assert!(w.is_maximized());
        // The handle's room goes to the client
        assert_eq!(w.geometry.height, before.height + 7);
    }

    #[test]
    fn test_minimize_round_trip() {
        let mut core = core();
        let a = map_client(&mut core, Geometry::new(0, 0, 100, 100));
        let client = core.state.window(a).unwrap().client;

        run(&mut core, Target::Window(a), Behavior::ToggleMinimize, None);
        assert!(core.state.window(a).unwrap().is_hidden());
        assert_eq!(core.backend.published.wm_state[&client], WmState::Iconic);
        assert!(core.backend.published.net_state[&client].contains(crate::backend::NetStates::HIDDEN));

        run(&mut core, Target::Window(a), Behavior::ToggleMinimize, None);
        assert!(core.state.window(a).unwrap().is_shown());
        assert_eq!(core.backend.published.wm_state[&client], WmState::Normal);
    }

    #[test]
    fn test_focus_vis_goes_to_the_window() {
        let mut core = core();
        let client = core.backend.create_client(Geometry::new(100, 100, 100, 100));
        core.backend.client_mut(client).unwrap().desktops = Some(DesktopMask::single(2));
        core.dispatch(mock::map_request(client));
        let a = core.state.window_by_client(client).unwrap();

        core.focus(a, false);
        assert!(!core.backend.called(|c| *c == Call::SetInputFocus(client)));

        core.focus(a, true);
        assert_eq!(core.state.screens[0].current_number(), 2);
        assert!(core.backend.called(|c| *c == Call::SetInputFocus(client)));
    }

    #[test]
    fn test_focus_vis_scrolls_to_window() {
        let mut core = core();
        let a = map_client(&mut core, Geometry::new(100, 100, 300, 200));
        core.move_viewport_to(0, 1600, 600);
        core.focus(a, true);
        let s = &core.state.screens[0];
        assert_eq!((s.vx, s.vy), (0, 0));
    }

    #[test]
    fn test_focus_before_map_is_remembered() {
        let mut core = core();
        let client = core.backend.create_client(Geometry::new(0, 0, 100, 100));
        let a = core.manage(0, client).unwrap();
        core.state.window_mut(a).unwrap().flags.remove(WindowFlags::WANT_FOCUS);
        core.focus(a, false);
        assert!(core.state.window(a).unwrap().flags.contains(WindowFlags::WANT_FOCUS));
    }

    #[test]
    fn test_task_switching_follows_history() {
        let mut core = core();
        let a = map_client(&mut core, Geometry::new(0, 0, 100, 100));
        let b = map_client(&mut core, Geometry::new(0, 0, 100, 100));
        let c = map_client(&mut core, Geometry::new(0, 0, 100, 100));
        for id in [a, b, c] {
            core.state.focus.set_focused(id);
        }
        let client = |core: &Core<MockBackend>, id| core.state.window(id).unwrap().client;

        core.backend.calls.clear();
        run(&mut core, Target::Screen(0), Behavior::PreviousTask, None);
        let b_client = client(&core, b);
        assert!(core.backend.called(|call| *call == Call::SetInputFocus(b_client)));

        core.backend.calls.clear();
        run(&mut core, Target::Screen(0), Behavior::NextTask, None);
        let a_client = client(&core, a);
        assert!(core.backend.called(|call| *call == Call::SetInputFocus(a_client)));
        assert_eq!(
            core.state.screens[0].stacking.list(Layer::Normal).front(),
            Some(&frame(&core, a))
        );
    }

    #[test]
    fn test_viewport_moves_from_arguments() {
        let mut core = core();
        run(&mut core, Target::Screen(0), Behavior::ViewportFixedMove, Some("-0-0"));
        assert_eq!((core.state.screens[0].vx, core.state.screens[0].vy), (1600, 1200));

        run(&mut core, Target::Screen(0), Behavior::ViewportRelativeMove, Some("-100-200"));
        assert_eq!((core.state.screens[0].vx, core.state.screens[0].vy), (1500, 1000));
    }

    #[test]
    fn test_pointer_warps() {
        let mut core = core();
        core.backend.pointer.root = Point::new(10, 10);
        run(&mut core, Target::Screen(0), Behavior::PointerFixedWarp, Some("+100+50"));
        assert!(core.backend.called(|c| *c == Call::WarpPointer(90, 40)));

        run(&mut core, Target::Screen(0), Behavior::PointerRelativeWarp, Some("-5+5"));
        assert!(core.backend.called(|c| *c == Call::WarpPointer(-5, 5)));
    }

    #[test]
    fn test_sticky_and_config_flags() {
        let mut core = core();
        let a = map_client(&mut core, Geometry::new(0, 0, 100, 100));
        run(&mut core, Target::Window(a), Behavior::ToggleSticky, None);
        assert!(core.state.window(a).unwrap().is_sticky());
        run(&mut core, Target::Window(a), Behavior::AcceptConfigRequestToggle, None);
        assert!(core.state.window(a).unwrap().flags.contains(WindowFlags::IGNORE_CONFIG_REQ));
        run(&mut core, Target::Window(a), Behavior::AcceptConfigRequestOn, None);
        assert!(!core.state.window(a).unwrap().flags.contains(WindowFlags::IGNORE_CONFIG_REQ));
    }
}
