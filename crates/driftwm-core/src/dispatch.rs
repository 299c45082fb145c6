//! Event classification and routing.
//!
//! Every event enters through [`Core::handle_event`]. Input events are
//! turned into [`ActionEvent`]s, resolved through the registry to the list
//! of the object they arrived on and matched against it; everything else
//! goes to the handler for its kind.

use tracing::{debug, trace};

use crate::backend::{with_valid, Backend};
use crate::desktop::DesktopMask;
use crate::event::{
    ClientMessage, ConfigureMask, ConfigureRequest, Event, MoveResizeDirection, NetState, Property,
    StackMode, StateAction, WmState,
};
use crate::geometry::Gravity;
use crate::input::{ActionEvent, ActionKind, BindingContext, Modifiers};
use crate::interaction::Side;
use crate::registry::{Capability, Edge, Handle, Object, Part, ScreenId};
use crate::window::{DecorFlags, Layer, WindowFlags, WindowId};
use crate::{Core, Target};

const fn part_context(part: Part) -> BindingContext {
    match part {
        Part::Frame => BindingContext::Frame,
        Part::Title => BindingContext::Title,
        Part::Label => BindingContext::Label,
        Part::Handle => BindingContext::Handle,
        Part::LeftGrip => BindingContext::LeftGrip,
        Part::RightGrip => BindingContext::RightGrip,
        Part::Button(_) => BindingContext::Button,
    }
}

const fn edge_context(edge: Edge) -> BindingContext {
    match edge {
        Edge::West => BindingContext::WestEdge,
        Edge::East => BindingContext::EastEdge,
        Edge::North => BindingContext::NorthEdge,
        Edge::South => BindingContext::SouthEdge,
    }
}

impl<B: Backend> Core<B> {
    pub(crate) fn handle_event(&mut self, event: Event) {
        match event {
            Event::ButtonPress {
                window,
                button,
                state,
                time,
                ..
            } => {
                let interval = self.state.config.general.double_click_ms;
                let kind = self.clicks.press(button, window, time, interval);
                let ae = ActionEvent {
                    kind,
                    detail: button,
                    state,
                };
                self.act(window, ae, &event);
            },
            Event::ButtonRelease {
                window,
                button,
                state,
                ..
            } => {
                let ae = ActionEvent {
                    kind: ActionKind::ButtonRelease,
                    detail: button,
                    state,
                };
                self.act(window, ae, &event);
            },
            Event::KeyPress {
                window,
                keycode,
                state,
                ..
            }
            | Event::KeyRelease {
                window,
                keycode,
                state,
                ..
            } => {
                let kind = if matches!(event, Event::KeyPress { .. }) {
                    ActionKind::KeyPress
                } else {
                    ActionKind::KeyRelease
                };
                let ae = ActionEvent {
                    kind,
                    detail: keycode,
                    state,
                };
                self.act(window, ae, &event);
            },
            Event::Enter { grab: true, .. } | Event::Leave { grab: true, .. } => {
                trace!("Ignoring grab crossing");
            },
            Event::Enter { window, state, .. } => {
                let ae = ActionEvent {
                    kind: ActionKind::EnterNotify,
                    detail: 0,
                    state,
                };
                self.act(window, ae, &event);
            },
            Event::Leave { window, state, .. } => {
                let ae = ActionEvent {
                    kind: ActionKind::LeaveNotify,
                    detail: 0,
                    state,
                };
                self.act(window, ae, &event);
            },
            Event::Motion { .. } | Event::FocusOut { .. } => {},
            Event::Expose { window, count } => {
                if count == 0 {
                    self.backend.compress_expose(window);
                    self.expose(window);
                }
            },
            Event::PropertyChange {
                window,
                property,
                deleted,
            } => self.property_change(window, property, deleted),
            Event::MapRequest { parent, window } => {
                self.map_request(parent, window);
                let state = self.backend.query_pointer(parent).state;
                let ae = ActionEvent {
                    kind: ActionKind::MapRequest,
                    detail: 0,
                    state,
                };
                self.act(window, ae, &event);
            },
            Event::Unmap { event: reported, window } => {
                if reported == window {
                    self.teardown(window, false);
                }
            },
            Event::Destroy { window } => self.teardown(window, true),
            Event::ConfigureRequest(req) => self.configure_request(&req),
            Event::ClientMessage { window, message } => self.client_message(window, message),
            Event::ColormapChange { window, colormap } => {
                if let Some(w) = self
                    .state
                    .window_by_client(window)
                    .and_then(|id| self.state.window_mut(id))
                {
                    w.colormap = colormap;
                }
                self.backend.install_colormap(colormap);
            },
            Event::FocusIn { window } => self.focus_in(window),
            Event::ShapeChange { window } => {
                if let Some(id) = self.state.window_by_client(window) {
                    self.redraw(id, true);
                }
            },
            Event::ScreenChange { root, width, height } => {
                if let Some(screen) = self.state.screen_of_root(root) {
                    self.resize_screen(screen, width, height);
                }
            },
        }
    }

    /// Whether an interaction session is running and not yet asked to end.
    fn session_running(&self) -> bool {
        self.session.as_ref().is_some_and(|s| !s.is_finished())
    }

    // ── Action routing ───────────────────────────────────────────────

    /// Route an action event to the list of whatever `handle` is.
    fn act(&mut self, handle: Handle, ae: ActionEvent, event: &Event) {
        self.cancel_deferred(handle);
        let Some(object) = self.state.registry.find(handle, Capability::all()) else {
            trace!("No object for {}", handle);
            return;
        };
        match object {
            Object::Client(id) => {
                let focused = self
                    .state
                    .window(id)
                    .is_some_and(|w| w.flags.contains(WindowFlags::FOCUSED));
                let context = if focused {
                    BindingContext::WindowActive
                } else {
                    BindingContext::WindowPassive
                };
                self.window_act(id, context, handle, ae, event);
            },
            Object::Decoration { window, part } => {
                self.window_act(window, part_context(part), handle, ae, event);
                if matches!(part, Part::Button(_)) && ae.kind == ActionKind::ButtonPress {
                    if let Some(w) = self.state.window(window) {
                        self.backend.button_pressed(w, handle);
                    }
                }
            },
            Object::Root(screen) => self.screen_act(screen, BindingContext::Root, handle, ae, event),
            Object::Edge { screen, edge } => {
                self.screen_act(screen, edge_context(edge), handle, ae, event);
            },
            Object::Dock { .. } | Object::Outline => {},
        }
    }

    fn window_act(
        &mut self,
        id: WindowId,
        context: BindingContext,
        handle: Handle,
        mut ae: ActionEvent,
        event: &Event,
    ) {
        let Some(w) = self.state.window(id) else {
            return;
        };
        let bindings = self.state.bindings.resolve(context, Some(&w.identity())).to_vec();
        let client = matches!(
            context,
            BindingContext::WindowActive | BindingContext::WindowPassive
        );

        let mut matched = false;
        let mut replay = false;
        let mut wait_release = false;
        if self.session_running() {
            ae.state |= Modifiers::MOVE_RESIZE;
        } else if client {
            // A press whose release is bound is held until the release
            let release = match ae.kind {
                ActionKind::ButtonPress => Some(ActionKind::ButtonRelease),
                ActionKind::KeyPress => Some(ActionKind::KeyRelease),
                _ => None,
            };
            if let Some(release) = release {
                wait_release = bindings.iter().any(|b| {
                    b.kind == release
                        && b.detail == ae.detail
                        && !b.required.contains(Modifiers::MOVE_RESIZE)
                });
                matched = wait_release;
            }
        }

        for binding in bindings.iter().filter(|b| b.matches(&ae)) {
            matched = true;
            if binding.replay && !wait_release {
                replay = true;
            }
            if binding.delay_ms > 0 {
                self.schedule(handle, Target::Window(id), binding, event);
            } else {
                self.execute(Target::Window(id), binding, event);
            }
        }

        if !client || self.session_running() {
            return;
        }
        let time = event.time().unwrap_or_else(|| self.backend.now());
        if ae.kind.is_button() {
            self.backend.allow_events(replay || !matched, false, time);
        } else if ae.kind.is_key() {
            self.backend.allow_events(replay || !matched, true, time);
        }
    }

    fn screen_act(
        &mut self,
        screen: ScreenId,
        context: BindingContext,
        handle: Handle,
        mut ae: ActionEvent,
        event: &Event,
    ) {
        if self.session_running() {
            ae.state |= Modifiers::MOVE_RESIZE;
        }
        let bindings = self.state.bindings.resolve(context, None).to_vec();
        for binding in bindings.iter().filter(|b| b.matches(&ae)) {
            if binding.delay_ms > 0 {
                self.schedule(handle, Target::Screen(screen), binding, event);
            } else {
                self.execute(Target::Screen(screen), binding, event);
            }
        }
    }

    // ── Window lifecycle ─────────────────────────────────────────────

    fn map_request(&mut self, parent: Handle, window: Handle) {
        if let Some(id) = self.state.window_by_client(window) {
            if self.state.window(id).is_some_and(|w| w.is_minimized()) {
                self.unminimize(id);
            }
            return;
        }
        let screen = self.state.screen_of_root(parent).unwrap_or(0);
        if let Some(id) = self.manage(screen, window) {
            self.map_window(id);
        }
    }

    fn teardown(&mut self, window: Handle, destroyed: bool) {
        match self
            .state
            .registry
            .find(window, Capability::CLIENT | Capability::DOCK)
        {
            Some(Object::Client(id)) => {
                if destroyed {
                    if let Some(w) = self.state.window_mut(id) {
                        w.flags |= WindowFlags::DESTROYED;
                    }
                }
                self.unmanage(id, destroyed);
            },
            Some(Object::Dock { .. }) => {
                self.remove_dock(window);
            },
            _ => {},
        }
        self.cancel_deferred(window);
    }

    // ── Configure requests ───────────────────────────────────────────

    fn configure_request(&mut self, req: &ConfigureRequest) {
        match self
            .state
            .registry
            .find(req.window, Capability::CLIENT | Capability::DOCK)
        {
            Some(Object::Client(id)) => self.configure_managed(id, req),
            Some(Object::Dock { screen }) => {
                if let Some(dock) = self
                    .state
                    .screens
                    .get_mut(screen)
                    .and_then(|s| s.docks.iter_mut().find(|d| d.client == req.window))
                {
                    if req.mask.contains(ConfigureMask::WIDTH) {
                        dock.width = req.width;
                    }
                    if req.mask.contains(ConfigureMask::HEIGHT) {
                        dock.height = req.height;
                    }
                }
                with_valid(&mut self.backend, req.window, |d| d.configure_window(req));
                if let Some(s) = self.state.screens.get(screen) {
                    self.backend.relayout_docks(screen, &s.docks);
                }
            },
            _ => {
                with_valid(&mut self.backend, req.window, |d| d.configure_window(req));
            },
        }
    }

    fn configure_managed(&mut self, id: WindowId, req: &ConfigureRequest) {
        let Some(w) = self.state.window_mut(id) else {
            return;
        };
        if w.flags.contains(WindowFlags::IGNORE_CONFIG_REQ) {
            trace!("{} ignores configure requests", id);
            return;
        }
        let before = w.geometry;
        w.gravitate(-1);
        if req.mask.contains(ConfigureMask::X) {
            w.geometry.x = req.x;
        }
        if req.mask.contains(ConfigureMask::Y) {
            w.geometry.y = req.y;
        }
        let width = if req.mask.contains(ConfigureMask::WIDTH) {
            req.width
        } else {
            w.geometry.width
        };
        let height = if req.mask.contains(ConfigureMask::HEIGHT) {
            req.height
        } else {
            w.geometry.height
        };
        if (width, height) != (w.geometry.width, w.geometry.height) {
            if let Some(check) = w.check_size(width, height) {
                w.apply_size(check);
            }
        }
        w.gravitate(1);
        let (layer, unchanged) = (w.layer, w.geometry == before);

        if req.mask.contains(ConfigureMask::STACK_MODE) {
            match req.stack_mode {
                StackMode::Above => self.raise(id),
                StackMode::Below => self.lower(id),
                StackMode::TopIf => self.set_layer(id, Layer::OnTop),
                StackMode::BottomIf => self.set_layer(id, Layer::AtBottom),
                StackMode::Opposite => match layer {
                    Layer::OnTop => self.set_layer(id, Layer::AtBottom),
                    Layer::AtBottom => self.set_layer(id, Layer::OnTop),
                    Layer::Normal => {},
                },
            }
        }
        if unchanged {
            // The client still expects to hear where it is
            self.send_config(id);
        } else {
            self.redraw_window(id);
        }
    }

    // ── Client messages ──────────────────────────────────────────────

    fn client_message(&mut self, window: Handle, message: ClientMessage) {
        let managed = self.state.window_by_client(window);
        let screen = self.state.screen_of_root(window);
        trace!("Client message {:?} on {}", message, window);

        match (message, managed, screen) {
            (ClientMessage::ActiveWindow, Some(id), _) => {
                self.raise(id);
                self.focus(id, true);
            },
            (ClientMessage::ChangeState(state), Some(id), _) => match state {
                WmState::Iconic => self.minimize(id),
                WmState::Normal => self.unminimize(id),
                WmState::Withdrawn => self.unmanage(id, false),
            },
            (ClientMessage::Desktop(n), Some(id), _) => {
                if n == DesktopMask::ALL_WIRE || n == DesktopMask::ALL_WIRE - 1 {
                    self.change_desktops(id, |_, _| DesktopMask::ALL);
                } else if n < self.desktop_count_of(id) {
                    self.change_desktops(id, |_, _| DesktopMask::single(n));
                } else {
                    debug!("Desktop {} out of range for {}", n, id);
                }
            },
            (
                ClientMessage::State {
                    action,
                    first,
                    second,
                },
                Some(id),
                _,
            ) => {
                let mut max_done = false;
                for state in [first, second].into_iter().flatten() {
                    if matches!(state, NetState::MaximizedVert | NetState::MaximizedHorz) {
                        if max_done {
                            continue;
                        }
                        max_done = true;
                    }
                    self.change_net_state(id, action, state);
                }
            },
            (ClientMessage::CloseWindow, Some(id), _) => self.close(id),
            (
                ClientMessage::MoveResizeWindow {
                    gravity,
                    mask,
                    x,
                    y,
                    width,
                    height,
                },
                Some(id),
                _,
            ) => self.move_resize_request(id, gravity, mask, (x, y, width, height)),
            (
                ClientMessage::WmMoveResize {
                    root,
                    direction,
                    button,
                },
                Some(id),
                _,
            ) => {
                let trigger = Event::ButtonPress {
                    window,
                    button,
                    state: Modifiers::empty(),
                    root,
                    time: self.backend.now(),
                };
                match direction {
                    MoveResizeDirection::Move | MoveResizeDirection::MoveKeyboard => {
                        self.start_move(id, true, &trigger);
                    },
                    MoveResizeDirection::SizeTopLeft
                    | MoveResizeDirection::SizeBottomLeft
                    | MoveResizeDirection::SizeLeft => {
                        self.start_resize(id, Side::Left, true, &trigger);
                    },
                    _ => self.start_resize(id, Side::Right, true, &trigger),
                }
            },
            (ClientMessage::DesktopViewport { x, y }, _, Some(screen)) => {
                self.move_viewport_to(screen, x, y);
            },
            (ClientMessage::CurrentDesktop(n), _, Some(screen)) => self.go_to_desktop(screen, n),
            (ClientMessage::DndEnter, ..) => self.dnd_crossing(window, true),
            (ClientMessage::DndLeave, ..) => self.dnd_crossing(window, false),
            (message, ..) => trace!("Unhandled client message {:?} on {}", message, window),
        }
    }

    fn change_net_state(&mut self, id: WindowId, action: StateAction, state: NetState) {
        let Some(w) = self.state.window(id) else {
            return;
        };
        let decor = w.decor_flags;
        let current = match state {
            NetState::Sticky => w.is_sticky(),
            NetState::Shaded => w.is_shaded(),
            NetState::Hidden => w.is_minimized(),
            NetState::MaximizedVert | NetState::MaximizedHorz => w.is_maximized(),
            NetState::Above => w.layer == Layer::OnTop,
            NetState::Below => w.layer == Layer::AtBottom,
            NetState::Fullscreen => w.flags.contains(WindowFlags::FULLSCREEN),
            NetState::Decor => decor.is_all(),
            NetState::DecorTitle => decor.contains(DecorFlags::TITLE),
            NetState::DecorHandle => decor.contains(DecorFlags::HANDLE),
            NetState::DecorBorder => decor.contains(DecorFlags::BORDER),
        };
        let on = match action {
            StateAction::Add => true,
            StateAction::Remove => false,
            StateAction::Toggle => !current,
        };

        match state {
            NetState::Sticky => self.set_sticky(id, on),
            NetState::Shaded if on => self.shade(id),
            NetState::Shaded => self.unshade(id),
            NetState::Hidden if on => self.minimize(id),
            NetState::Hidden => self.unminimize(id),
            NetState::MaximizedVert | NetState::MaximizedHorz if on => self.maximize(id),
            NetState::MaximizedVert | NetState::MaximizedHorz => self.unmaximize(id),
            NetState::Above if on => self.set_layer(id, Layer::OnTop),
            NetState::Below if on => self.set_layer(id, Layer::AtBottom),
            NetState::Above | NetState::Below => {
                if current {
                    self.set_layer(id, Layer::Normal);
                }
            },
            NetState::Fullscreen => self.set_fullscreen(id, on),
            NetState::Decor => self.set_decor(id, DecorFlags::all(), on),
            NetState::DecorTitle => self.set_decor(id, DecorFlags::TITLE, on),
            NetState::DecorHandle => self.set_decor(id, DecorFlags::HANDLE, on),
            NetState::DecorBorder => self.set_decor(id, DecorFlags::BORDER, on),
        }
    }

    /// Place `id` as a move-resize message asks: coordinates refer to the
    /// screen corner named by the gravity.
    fn move_resize_request(
        &mut self,
        id: WindowId,
        gravity: Option<Gravity>,
        mask: ConfigureMask,
        (x, y, width, height): (i32, i32, i32, i32),
    ) {
        let Some(w) = self.state.windows.get_mut(&id) else {
            return;
        };
        let Some(s) = self.state.screens.get(w.screen) else {
            return;
        };
        let (sw, sh) = (s.width, s.height);
        let gravity = gravity.unwrap_or(w.hints.gravity);
        let x = if mask.contains(ConfigureMask::X) { x } else { w.geometry.x };
        let y = if mask.contains(ConfigureMask::Y) { y } else { w.geometry.y };
        let width = if mask.contains(ConfigureMask::WIDTH) {
            width
        } else {
            w.geometry.width
        };
        let height = if mask.contains(ConfigureMask::HEIGHT) {
            height
        } else {
            w.geometry.height
        };
        if let Some(check) = w.check_size(width, height) {
            w.apply_size(check);
        }

        let gravitates = gravity != Gravity::Static;
        if gravitates {
            w.gravitate(-1);
        }
        let g = &mut w.geometry;
        g.x = match gravity {
            Gravity::NorthEast | Gravity::East | Gravity::SouthEast => sw - x - g.width,
            _ => x,
        };
        g.y = match gravity {
            Gravity::SouthWest | Gravity::South | Gravity::SouthEast => sh - y - g.height,
            _ => y,
        };
        if matches!(gravity, Gravity::North | Gravity::South | Gravity::Center) {
            g.x -= g.width / 2;
        }
        if matches!(gravity, Gravity::East | Gravity::West | Gravity::Center) {
            g.y -= g.height / 2;
        }
        if gravitates {
            w.gravitate(1);
        }
        self.redraw_window(id);
    }

    /// A drag-and-drop crossing acts like a pointer crossing.
    fn dnd_crossing(&mut self, window: Handle, enter: bool) {
        let (root, state) = if self.state.screen_of_root(window).is_some() {
            let p = self.backend.query_pointer(window);
            (p.root, p.state)
        } else {
            (Default::default(), Modifiers::empty())
        };
        let (kind, event) = if enter {
            (ActionKind::EnterNotify, Event::Enter {
                window,
                root,
                state,
                grab: false,
            })
        } else {
            (ActionKind::LeaveNotify, Event::Leave {
                window,
                root,
                state,
                grab: false,
            })
        };
        let ae = ActionEvent {
            kind,
            detail: 0,
            state,
        };
        self.act(window, ae, &event);
    }

    // ── Properties, exposure and focus ───────────────────────────────

    fn property_change(&mut self, window: Handle, property: Property, deleted: bool) {
        let Some(id) = self.state.window_by_client(window) else {
            return;
        };
        match property {
            Property::Strut => {
                let Some(screen) = self.state.window(id).map(|w| w.screen) else {
                    return;
                };
                let strut = if deleted {
                    None
                } else {
                    self.backend.read_strut(window)
                };
                let s = &mut self.state.screens[screen];
                let changed = match strut {
                    Some(strut) => {
                        s.set_strut(window, strut);
                        true
                    },
                    None => s.remove_strut(window),
                };
                if changed {
                    self.update_workarea(screen);
                }
            },
            Property::Name if !deleted => {
                let names = self.backend.read_names(window);
                let Some(w) = self.state.window_mut(id) else {
                    return;
                };
                w.name = names.name;
                w.title = names.title;
                if w.decor().has_title() {
                    self.backend.redraw_titlebar(w);
                }
                // Class rules may match on the title
                self.refresh_grabs(id);
            },
            Property::NormalHints if !deleted => {
                let hints = self.backend.read_normal_hints(window);
                if let (Some(hints), Some(w)) = (hints, self.state.window_mut(id)) {
                    w.hints = hints.normalized(&w.decor());
                }
            },
            _ => {},
        }
    }

    fn expose(&mut self, window: Handle) {
        let Some(Object::Decoration { window: id, part }) =
            self.state.registry.find(window, Capability::DECORATION)
        else {
            return;
        };
        let Some(w) = self.state.window(id) else {
            return;
        };
        match part {
            Part::Title | Part::Label | Part::Button(_) => self.backend.redraw_titlebar(w),
            Part::Handle | Part::LeftGrip | Part::RightGrip => self.backend.redraw_handlebar(w),
            Part::Frame => {},
        }
    }

    /// Track the focused window: swap its binding list to the active one,
    /// refresh passive grabs, repaint and publish.
    fn focus_in(&mut self, window: Handle) {
        let previous = self.state.focus.focused;
        let id = self
            .state
            .registry
            .find(window, Capability::CLIENT)
            .and_then(|o| o.window());
        if id.is_some() && id == previous {
            return;
        }
        let root_screen = self.state.screen_of_root(window);
        for (i, s) in self.state.screens.iter_mut().enumerate() {
            s.root_focused = root_screen == Some(i);
        }

        if let Some(prev) = previous {
            if let Some(w) = self.state.window_mut(prev) {
                w.flags.remove(WindowFlags::FOCUSED);
                let screen = w.screen;
                self.refresh_grabs(prev);
                if let Some(w) = self.state.window(prev) {
                    self.backend.focus_changed(w, false);
                }
                if id.is_none() {
                    let root = self.state.screens[screen].root;
                    self.backend.set_active_window(root, None);
                }
            }
            self.state.focus.clear_focused();
        }

        let Some(id) = id else {
            return;
        };
        let Some(w) = self.state.window_mut(id) else {
            return;
        };
        w.flags.insert(WindowFlags::FOCUSED);
        let (client, screen) = (w.client, w.screen);
        self.refresh_grabs(id);
        if let Some(w) = self.state.window(id) {
            self.backend.focus_changed(w, true);
        }
        self.state.focus.set_focused(id);
        let root = self.state.screens[screen].root;
        self.backend.set_active_window(root, Some(client));
        debug!("{} has focus", id);
    }
}
