//! Window lifecycle and display synchronisation.
//!
//! Managing wraps a client in a frame and registers every part. Redrawing
//! pushes the model geometry to the display, touching only what changed
//! since the previous push.

use tracing::{debug, info};

use crate::backend::{with_valid, Backend, ClientAttributes, NetStates, ServerGrab};
use crate::event::{Point, WmState};
use crate::geometry::Geometry;
use crate::input::BindingContext;
use crate::registry::{Capability, Handle, Object, ScreenId};
use crate::screen::DockApp;
use crate::stacking::Position;
use crate::window::{Layer, ManagedWindow, WindowFlags, WindowId};
use crate::Core;

impl<B: Backend> Core<B> {
    // ── Managing ─────────────────────────────────────────────────────

    /// Take `client` under management on `screen`.
    ///
    /// Override-redirect windows are left alone and clients that ask to
    /// start withdrawn become dock apps; both return `None`.
    pub fn manage(&mut self, screen: ScreenId, client: Handle) -> Option<WindowId> {
        let Some(attrs) = self.backend.read_attributes(client) else {
            debug!("Map request for vanished window {}", client);
            return None;
        };
        if attrs.override_redirect {
            return None;
        }
        let initial = self.backend.read_initial_state(client);
        if initial == Some(WmState::Withdrawn) {
            self.add_dock(screen, client, &attrs);
            return None;
        }
        let s = self.state.screens.get(screen)?;
        let (vx, vy) = (s.vx, s.vy);
        let (count, current) = (s.desktop_count(), s.current_desktop().mask());

        let id = self.next_window_id();
        let names = self.backend.read_names(client);
        let mut window = ManagedWindow::new(id, client, screen, attrs.geometry);
        window.class = names.class;
        window.name = names.name;
        window.title = names.title;
        window.colormap = attrs.colormap;
        window.style = self.state.config.decor;
        window.hints = self
            .backend
            .read_normal_hints(client)
            .unwrap_or_default()
            .normalized(&window.decor());
        window.geometry.width = window.geometry.width.max(window.hints.min_width);
        window.geometry.height = window.geometry.height.max(window.hints.min_height);

        // A position stored by a previous session is already a client
        // position; fresh windows get their gravity applied.
        match self.backend.read_virtual_pos(client) {
            Some(p) => {
                window.geometry.x = p.x - vx;
                window.geometry.y = p.y - vy;
            },
            None => window.gravitate(1),
        }

        let net = self.backend.read_net_state(client);
        window.layer = if net.contains(NetStates::ABOVE) {
            Layer::OnTop
        } else if net.contains(NetStates::BELOW) {
            Layer::AtBottom
        } else {
            Layer::Normal
        };
        window.flags.set(WindowFlags::STICKY, net.contains(NetStates::STICKY));
        window.flags.set(
            WindowFlags::MINIMIZED,
            initial == Some(WmState::Iconic) || net.contains(NetStates::HIDDEN),
        );
        if self.state.config.general.focus_new {
            window.flags |= WindowFlags::WANT_FOCUS;
        }
        window.desktops = self
            .backend
            .read_desktop_mask(client)
            .map(|m| m.limit(count))
            .filter(|m| !m.is_empty())
            .unwrap_or(current);
        window.transient_for = self
            .backend
            .read_transient_for(client)
            .and_then(|owner| self.state.window_by_client(owner));

        window.parts = self.backend.create_frame(&window);
        let (frame, layer, owner, desktops) = (
            window.parts.frame,
            window.layer,
            window.transient_for,
            window.desktops,
        );
        info!(
            "Managing {} ({:?}) as {} on screen {}",
            client, window.class, id, screen
        );
        self.state.add_window(window);
        if let Some(owner) = owner.and_then(|o| self.state.window_mut(o)) {
            owner.transients.push(id);
        }
        self.state.screens[screen]
            .stacking
            .insert(frame, layer, Position::Front);

        if let Some(strut) = self.backend.read_strut(client) {
            self.state.screens[screen].set_strut(client, strut);
            self.update_workarea(screen);
        }

        self.refresh_grabs(id);
        self.redraw_window(id);
        if net.contains(NetStates::SHADED) {
            self.shade(id);
        }
        if net.contains(NetStates::FULLSCREEN) {
            self.set_fullscreen(id, true);
        } else if net.contains(NetStates::MAXIMIZED) {
            self.maximize(id);
        }

        self.backend.set_desktop(client, desktops);
        self.publish_net_state(id);
        self.restack(screen);
        self.publish_client_lists(screen);
        Some(id)
    }

    /// Release a managed window. `destroyed` is set when the client no
    /// longer exists.
    pub fn unmanage(&mut self, id: WindowId, destroyed: bool) {
        if self.session.as_ref().is_some_and(|s| s.target == Some(id)) {
            self.abort_session();
        }
        self.cancel_window_actions(id);

        let was_focused = self.state.focus.focused == Some(id);
        let had_strut = self.state.window(id).is_some_and(|w| {
            self.state
                .screens
                .get(w.screen)
                .is_some_and(|s| s.struts.iter().any(|e| e.owner == w.client))
        });
        let Some(mut window) = self.state.remove_window(id) else {
            return;
        };
        window.flags |= WindowFlags::DESTROYED;
        let screen = window.screen;

        let restore = {
            let (sw, sh) = self
                .state
                .screens
                .get(screen)
                .map_or((1, 1), |s| (s.width.max(1), s.height.max(1)));
            window.gravitate(-1);
            let mut g = Geometry::new(
                window.geometry.x,
                window.geometry.y,
                window.geometry.width,
                window.client_height(),
            );
            if g.x >= sw {
                g.x %= sw;
            }
            if g.y >= sh {
                g.y %= sh;
            }
            if g.right() <= 0 {
                g.x = sw + g.x % sw;
            }
            if g.bottom() <= 0 {
                g.y = sh + g.y % sh;
            }
            g
        };

        {
            let mut grab = ServerGrab::new(&mut self.backend);
            let client = if !destroyed && grab.validate(window.client) {
                window.client
            } else {
                Handle::NONE
            };
            grab.destroy_frame(&window.parts, client, restore);
        }
        if !destroyed {
            self.backend.set_wm_state(window.client, WmState::Withdrawn);
        }
        info!("Unmanaged {} ({})", id, window.client);

        if had_strut {
            self.update_workarea(screen);
        }
        self.restack(screen);
        self.publish_client_lists(screen);

        if was_focused {
            let current = self
                .state
                .screens
                .get(screen)
                .map_or(0, |s| s.current_number());
            let next = self.state.focus.history.iter().copied().find(|w| {
                self.state
                    .window(*w)
                    .is_some_and(|w| w.is_shown() && w.desktops.contains(current))
            });
            match next {
                Some(next) => self.focus(next, false),
                None => {
                    if let Some(s) = self.state.screens.get(screen) {
                        self.backend.set_active_window(s.root, None);
                    }
                },
            }
        }
    }

    fn add_dock(&mut self, screen: ScreenId, client: Handle, attrs: &ClientAttributes) {
        let Some(s) = self.state.screens.get_mut(screen) else {
            return;
        };
        if s.docks.iter().any(|d| d.client == client) {
            return;
        }
        s.docks.push(DockApp {
            client,
            width: attrs.geometry.width,
            height: attrs.geometry.height,
        });
        self.state.registry.insert(client, Object::Dock { screen });
        info!("Docking {} on screen {}", client, screen);
        self.backend
            .relayout_docks(screen, &self.state.screens[screen].docks);
    }

    /// Forget a dock app; false if `client` is not one.
    pub(crate) fn remove_dock(&mut self, client: Handle) -> bool {
        let Some(Object::Dock { screen }) = self.state.registry.find(client, Capability::DOCK) else {
            return false;
        };
        self.state.registry.remove(client);
        if let Some(s) = self.state.screens.get_mut(screen) {
            s.docks.retain(|d| d.client != client);
            self.backend.relayout_docks(screen, &s.docks);
        }
        debug!("Dock app {} went away", client);
        true
    }

    /// Replace the passive grabs of `id` with its active or passive list.
    pub(crate) fn refresh_grabs(&mut self, id: WindowId) {
        let Some(w) = self.state.windows.get(&id) else {
            return;
        };
        let context = if w.flags.contains(WindowFlags::FOCUSED) {
            BindingContext::WindowActive
        } else {
            BindingContext::WindowPassive
        };
        let list = self.state.bindings.resolve(context, Some(&w.identity()));
        self.backend.update_grabs(w.client, list);
    }

    // ── Display synchronisation ──────────────────────────────────────

    /// Push the geometry of `id` to the display if it changed.
    pub fn redraw_window(&mut self, id: WindowId) {
        self.redraw(id, false);
    }

    /// Like [`redraw_window`](Self::redraw_window), but also repaints the
    /// decorations when nothing moved.
    pub(crate) fn redraw(&mut self, id: WindowId, force: bool) {
        let Some(w) = self.state.windows.get_mut(&id) else {
            return;
        };
        let Some(screen) = self.state.screens.get(w.screen) else {
            return;
        };
        let g = w.geometry;
        let old = w.applied;
        let moved = old.map_or(true, |o| o.x != g.x || o.y != g.y);
        let width_changed = old.map_or(true, |o| o.width != g.width);
        let resized = width_changed || old.map_or(true, |o| o.height != g.height);
        if !(moved || resized || force) {
            return;
        }

        w.frame = w.frame_geometry();
        w.applied = Some(g);
        if moved {
            if let Some(max) = w.maximized.as_mut() {
                max.anchor_x = screen.vx + w.frame.x;
                max.anchor_y = screen.vy + w.frame.y;
            }
        }
        let mut state_changed = false;
        if resized && w.maximized.is_some() && (width_changed || w.shaded.is_none()) {
            w.maximized = None;
            state_changed = true;
        }
        let notify = (moved || resized)
            && w.shaded.is_none()
            && !w.flags.contains(WindowFlags::DONT_SEND);

        let w = &self.state.windows[&id];
        if moved || resized {
            with_valid(&mut self.backend, w.client, |d| d.configure_frame(w));
        }
        if width_changed || force {
            let decor = w.decor();
            if decor.has_title() {
                self.backend.redraw_titlebar(w);
            }
            if decor.has_handle() {
                self.backend.redraw_handlebar(w);
            }
        }
        if notify {
            self.set_virtual_pos(id);
            self.send_config(id);
        }
        if state_changed {
            self.publish_net_state(id);
        }
    }

    /// Tell the client where it is, with its unshaded height.
    pub(crate) fn send_config(&mut self, id: WindowId) {
        let Some(w) = self.state.windows.get(&id) else {
            return;
        };
        let g = Geometry::new(w.geometry.x, w.geometry.y, w.geometry.width, w.client_height());
        let (client, frame) = (w.client, w.parts.frame);
        with_valid(&mut self.backend, client, |d| {
            d.send_configure_notify(client, frame, g);
        });
    }

    /// Position of `id` in the virtual space.
    pub fn virtual_pos(&self, id: WindowId) -> Option<Point> {
        let w = self.state.window(id)?;
        let s = self.state.screens.get(w.screen)?;
        Some(Point::new(s.vx + w.geometry.x, s.vy + w.geometry.y))
    }

    pub(crate) fn set_virtual_pos(&mut self, id: WindowId) {
        let (Some(p), Some(w)) = (self.virtual_pos(id), self.state.window(id)) else {
            return;
        };
        self.backend.set_virtual_pos(w.client, p.x, p.y);
    }

    /// Map client and frame the first time, honouring desktop membership
    /// and a pending minimize.
    pub(crate) fn map_window(&mut self, id: WindowId) {
        let Some(w) = self.state.windows.get(&id) else {
            return;
        };
        let client = w.client;
        with_valid(&mut self.backend, client, |d| d.map(client));
        self.redraw_window(id);

        let Some(w) = self.state.windows.get_mut(&id) else {
            return;
        };
        let current = self.state.screens[w.screen].current_number();
        let visible = w.desktops.contains(current) && !w.is_minimized();
        if visible {
            self.backend.map(w.parts.frame);
            w.flags.remove(WindowFlags::HIDDEN);
        } else {
            w.flags.insert(WindowFlags::HIDDEN);
        }
        w.flags.insert(WindowFlags::MAPPED);
        let wm_state = if w.is_minimized() {
            WmState::Iconic
        } else {
            WmState::Normal
        };
        let want_focus = w.flags.contains(WindowFlags::WANT_FOCUS);
        w.flags.remove(WindowFlags::WANT_FOCUS);
        self.backend.set_wm_state(client, wm_state);
        self.set_virtual_pos(id);
        self.send_config(id);
        if want_focus && visible {
            self.focus(id, false);
        }
    }

    /// Map the frame of a window that is hidden only because it was off
    /// the current desktop.
    pub(crate) fn show_window(&mut self, id: WindowId) {
        let Some(w) = self.state.windows.get_mut(&id) else {
            return;
        };
        if w.is_hidden() && w.flags.contains(WindowFlags::MAPPED) && !w.is_minimized() {
            self.backend.map(w.parts.frame);
            w.flags.remove(WindowFlags::HIDDEN);
        }
    }

    pub(crate) fn hide_window(&mut self, id: WindowId) {
        let Some(w) = self.state.windows.get_mut(&id) else {
            return;
        };
        if !w.is_hidden() {
            self.backend.unmap(w.parts.frame);
            w.flags.insert(WindowFlags::HIDDEN);
        }
    }

    // ── Hint publishing ──────────────────────────────────────────────

    pub(crate) fn publish_net_state(&mut self, id: WindowId) {
        if let Some(w) = self.state.windows.get(&id) {
            self.backend.set_net_state(w.client, NetStates::of(w));
        }
    }

    pub(crate) fn publish_client_lists(&mut self, screen: ScreenId) {
        let Some(root) = self.state.screens.get(screen).map(|s| s.root) else {
            return;
        };
        let clients = self.state.client_list(screen);
        let stacking = self.state.client_list_stacking(screen);
        self.backend.set_client_list(root, &clients);
        self.backend.set_client_list_stacking(root, &stacking);
    }

    pub(crate) fn publish_workarea(&mut self, screen: ScreenId) {
        if let Some(s) = self.state.screens.get(screen) {
            self.backend.set_workarea(s.root, &s.all_workareas());
        }
    }

    /// Send the physical stacking order of `screen` in one request and
    /// publish it.
    pub fn restack(&mut self, screen: ScreenId) {
        let Some(s) = self.state.screens.get(screen) else {
            return;
        };
        let mut pinned = s.edges.to_vec();
        if let Some(outline) = self
            .session
            .as_ref()
            .filter(|sess| sess.screen == screen)
            .and_then(|sess| sess.outline)
        {
            pinned.extend(outline);
        }
        let order = s.stacking.order(&pinned);
        self.backend.restack(&order);
        let stacking = self.state.client_list_stacking(screen);
        self.backend.set_client_list_stacking(s.root, &stacking);
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::NetStates;
    use crate::event::{Point, WmState};
    use crate::geometry::Geometry;
    use crate::mock::{Call, MockClient};
    use crate::screen::Strut;
    use crate::test_util::{core, map_client};
    use crate::window::{Layer, WindowFlags};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_manage_frames_and_maps() {
        let mut core = core();
        let id = map_client(&mut core, Geometry::new(100, 100, 300, 200));
        let w = core.state.window(id).unwrap();
        // North-west gravity pushes the client below the title bar
        assert_eq!(w.geometry, Geometry::new(101, 122, 300, 200));
        assert_eq!(w.frame, Geometry::new(100, 100, 300, 200 + 21 + 7));
        assert!(w.is_shown());
        assert_eq!(core.backend.published.wm_state.get(&w.client), Some(&WmState::Normal));
        assert_eq!(core.backend.published.client_list, vec![w.client]);
        assert!(core.backend.called(|c| *c == Call::Map(w.parts.frame)));
        assert_eq!(
            core.backend.published.virtual_pos.get(&w.client),
            Some(&Point::new(101, 122))
        );
    }

    #[test]
    fn test_manage_reads_client_hints() {
        let mut core = core();
        let client = core.backend.create_client(Geometry::new(0, 0, 10, 10));
        let ewmh = MockClient {
            net_state: NetStates::ABOVE | NetStates::STICKY,
            virtual_pos: Some(Point::new(900, 50)),
            ..core.backend.clients[&client].clone()
        };
        core.backend.clients.insert(client, ewmh);
        let id = core.manage(0, client).unwrap();
        let w = core.state.window(id).unwrap();
        assert_eq!(w.layer, Layer::OnTop);
        assert!(w.is_sticky());
        assert_eq!(w.geometry.width, w.hints.min_width);
        assert_eq!((w.geometry.x, w.geometry.y), (900, 50));
    }

    #[test]
    fn test_override_redirect_is_ignored() {
        let mut core = core();
        let client = core.backend.create_client(Geometry::new(0, 0, 10, 10));
        core.backend.client_mut(client).unwrap().attributes.override_redirect = true;
        assert_eq!(core.manage(0, client), None);
        assert!(core.state.windows.is_empty());
    }

    #[test]
    fn test_withdrawn_client_becomes_dock() {
        let mut core = core();
        let client = core.backend.create_client(Geometry::new(0, 0, 64, 64));
        core.backend.client_mut(client).unwrap().initial_state = Some(WmState::Withdrawn);
        assert_eq!(core.manage(0, client), None);
        assert_eq!(core.state.screens[0].docks.len(), 1);
        assert!(core.backend.called(|c| *c == Call::RelayoutDocks(0)));
        assert!(core.remove_dock(client));
        assert!(core.state.screens[0].docks.is_empty());
    }

    #[test]
    fn test_unmanage_restores_client() {
        let mut core = core();
        let id = map_client(&mut core, Geometry::new(100, 100, 300, 200));
        let (client, frame) = {
            let w = core.state.window(id).unwrap();
            (w.client, w.parts.frame)
        };
        core.unmanage(id, false);
        assert!(core.state.windows.is_empty());
        assert!(core.state.screens[0].stacking.is_empty());
        assert!(core.backend.called(|c| *c == Call::DestroyFrame { client, frame }));
        assert_eq!(core.backend.published.wm_state.get(&client), Some(&WmState::Withdrawn));
        assert!(core.backend.published.client_list.is_empty());
    }

    #[test]
    fn test_unmanage_destroyed_skips_reparent() {
        let mut core = core();
        let id = map_client(&mut core, Geometry::new(10, 10, 100, 100));
        let frame = core.state.window(id).unwrap().parts.frame;
        core.unmanage(id, true);
        assert!(core.backend.called(|c| *c
            == Call::DestroyFrame {
                client: crate::registry::Handle::NONE,
                frame
            }));
    }

    #[test]
    fn test_strut_updates_workarea() {
        let mut core = core();
        let client = core.backend.create_client(Geometry::new(0, 0, 800, 24));
        core.backend.client_mut(client).unwrap().strut = Some(Strut {
            top: 24,
            ..Strut::default()
        });
        let id = core.manage(0, client).unwrap();
        assert_eq!(core.state.screens[0].workarea(), Geometry::new(0, 24, 800, 576));
        assert_eq!(core.backend.published.workarea[0], Geometry::new(0, 24, 800, 576));
        core.unmanage(id, true);
        assert_eq!(core.state.screens[0].workarea(), Geometry::new(0, 0, 800, 600));
    }

    #[test]
    fn test_redraw_only_when_changed() {
        let mut core = core();
        let id = map_client(&mut core, Geometry::new(10, 10, 100, 100));
        core.backend.calls.clear();
        core.redraw_window(id);
        assert!(core.backend.calls.is_empty());

        core.state.window_mut(id).unwrap().geometry.x += 5;
        core.redraw_window(id);
        assert!(core.backend.called(|c| matches!(c, Call::ConfigureFrame { .. })));
        assert!(core.backend.called(|c| matches!(c, Call::SendConfigureNotify { .. })));
        // A move does not repaint the title bar
        assert!(!core.backend.called(|c| matches!(c, Call::RedrawTitlebar(_))));
    }

    #[test]
    fn test_dont_send_suppresses_notification() {
        let mut core = core();
        let id = map_client(&mut core, Geometry::new(10, 10, 100, 100));
        core.backend.calls.clear();
        let w = core.state.window_mut(id).unwrap();
        w.flags |= WindowFlags::DONT_SEND;
        w.geometry.x = -2000;
        core.redraw_window(id);
        assert!(core.backend.called(|c| matches!(c, Call::ConfigureFrame { .. })));
        assert!(!core.backend.called(|c| matches!(c, Call::SendConfigureNotify { .. })));
    }

    #[test]
    fn test_map_off_desktop_stays_hidden() {
        let mut core = core();
        let client = core.backend.create_client(Geometry::new(10, 10, 100, 100));
        core.backend.client_mut(client).unwrap().desktops = Some(crate::desktop::DesktopMask::single(2));
        let id = core.manage(0, client).unwrap();
        core.map_window(id);
        let w = core.state.window(id).unwrap();
        assert!(w.is_hidden());
        assert!(w.flags.contains(WindowFlags::MAPPED));
        assert!(!core.backend.called(|c| *c == Call::Map(w.parts.frame)));
    }

    #[test]
    fn test_restack_pins_edges_first() {
        let mut core = core();
        let a = map_client(&mut core, Geometry::new(10, 10, 100, 100));
        let frame = core.state.window(a).unwrap().parts.frame;
        core.restack(0);
        let order = core.backend.last_restack().unwrap();
        assert_eq!(&order[..4], &core.state.screens[0].edges[..]);
        assert_eq!(order[4], frame);
        assert_eq!(core.backend.published.client_list_stacking.len(), 1);
    }
}
