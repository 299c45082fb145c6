//! Modal interaction sessions.
//!
//! Moving, resizing and dragging the viewport run a nested event loop that
//! owns the pointer and keyboard until an end action fires, the target
//! window disappears or the event source goes away. At most one session
//! exists at a time; asking for another while one runs does nothing.
//!
//! Outline modes drag four proxy strips around and apply the geometry once
//! at the end. Live modes move the frame on every motion with outgoing
//! configure notifications suppressed, and tell the client once when done.

use tracing::{debug, info, trace};

use crate::backend::{with_valid, Backend, Fetched};
use crate::event::{Event, EventMask, Point};
use crate::geometry::Geometry;
use crate::registry::{Handle, Object, ScreenId};
use crate::window::{inc_size_check, Decor, MaxRestore, ShadeChange, SizeCheck, WindowFlags, WindowId};
use crate::Core;

/// State of the interaction state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Idle,
    Moving,
    MovingLive,
    ResizingLeft,
    ResizingLeftLive,
    ResizingRight,
    ResizingRightLive,
    Shading,
    ViewportDrag,
}

impl Mode {
    /// Events the nested loop handles itself in this mode; everything else
    /// goes through the ordinary dispatcher.
    pub const fn return_mask(self) -> EventMask {
        match self {
            Self::Moving
            | Self::MovingLive
            | Self::ResizingLeft
            | Self::ResizingLeftLive
            | Self::ResizingRight
            | Self::ResizingRightLive => EventMask::MOVE_RESIZE,
            Self::ViewportDrag => EventMask::VIEWPORT_DRAG,
            Self::Idle | Self::Shading => EventMask::empty(),
        }
    }

    pub const fn is_live(self) -> bool {
        matches!(
            self,
            Self::MovingLive | Self::ResizingLeftLive | Self::ResizingRightLive
        )
    }

    pub const fn is_move(self) -> bool {
        matches!(self, Self::Moving | Self::MovingLive)
    }

    /// Width change per pointer pixel: 1 dragging the right side, -1 the
    /// left one. `None` outside resize modes.
    pub const fn resize_side(self) -> Option<i32> {
        match self {
            Self::ResizingRight | Self::ResizingRightLive => Some(1),
            Self::ResizingLeft | Self::ResizingLeftLive => Some(-1),
            _ => None,
        }
    }
}

/// Which side a resize drags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// The running modal operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Current state; an end action sets it to [`Mode::Idle`].
    pub mode: Mode,
    /// The operation this session performs.
    pub operation: Mode,
    pub target: Option<WindowId>,
    pub screen: ScreenId,
    /// Pointer position of the last processed motion.
    pub anchor: Point,
    /// Pointer travel since the session started.
    pub delta: Point,
    /// Client geometry the session works on: the proxy for outline modes,
    /// the tracked position for a live move.
    pub geometry: Geometry,
    /// Target client geometry when the session started.
    pub start: Geometry,
    /// Unsnapped size the pointer asks for while resizing.
    pub candidate: (i32, i32),
    /// Latest accepted size of an outline resize.
    pub pending: Option<SizeCheck>,
    pub outline: Option<[Handle; 4]>,
    /// Map requests held back until the session ends, in arrival order.
    pub deferred_maps: Vec<Event>,
}

impl Session {
    fn new(operation: Mode, target: Option<WindowId>, screen: ScreenId, anchor: Point) -> Self {
        Self {
            mode: operation,
            operation,
            target,
            screen,
            anchor,
            delta: Point::default(),
            geometry: Geometry::default(),
            start: Geometry::default(),
            candidate: (0, 0),
            pending: None,
            outline: None,
            deferred_maps: Vec::new(),
        }
    }

    pub const fn is_finished(&self) -> bool {
        matches!(self.mode, Mode::Idle)
    }
}

/// The four outline strips (west, east, north, south) around a client at
/// `client` with decoration `decor`.
pub fn outline_strips(client: Geometry, decor: &Decor) -> [Geometry; 4] {
    let bw = if decor.border_w > 0 { decor.border_w } else { 2 };
    let (t, h, b) = (decor.title_w, decor.handle_w, decor.border_w);
    let top = client.y - t - b - bw;
    let tall = 2 * bw + t + h + client.height + 2 * b;
    let wide = client.width + 2 * bw;
    [
        Geometry::new(client.x - bw, top, bw, tall),
        Geometry::new(client.x + client.width, top, bw, tall),
        Geometry::new(client.x - bw, top, wide, bw),
        Geometry::new(client.x - bw, client.y + client.height + h + b, wide, bw),
    ]
}

impl<B: Backend> Core<B> {
    // ── Entry ────────────────────────────────────────────────────────

    /// Move `id` with the pointer. `trigger` is the event that started it;
    /// a map request places the window under the pointer first.
    pub fn start_move(&mut self, id: WindowId, live: bool, trigger: &Event) {
        let mode = if live { Mode::MovingLive } else { Mode::Moving };
        self.start_window_session(id, mode, trigger);
    }

    pub fn start_resize(&mut self, id: WindowId, side: Side, live: bool, trigger: &Event) {
        let mode = match (side, live) {
            (Side::Left, false) => Mode::ResizingLeft,
            (Side::Left, true) => Mode::ResizingLeftLive,
            (Side::Right, false) => Mode::ResizingRight,
            (Side::Right, true) => Mode::ResizingRightLive,
        };
        self.start_window_session(id, mode, trigger);
    }

    fn start_window_session(&mut self, id: WindowId, mode: Mode, trigger: &Event) {
        if let Some(s) = &self.session {
            debug!("{:?} of {} refused, {:?} in progress", mode, id, s.operation);
            return;
        }
        let Some(w) = self.state.window(id) else {
            return;
        };
        let screen = w.screen;
        let Some(root) = self.state.screens.get(screen).map(|s| s.root) else {
            return;
        };
        let grab_window = if w.flags.contains(WindowFlags::MAPPED) && !w.is_hidden() {
            w.client
        } else {
            root
        };
        let pointer = self.backend.query_pointer(root).root;
        if !self.grab_input(grab_window) {
            return;
        }

        let Some(w) = self.state.window_mut(id) else {
            return;
        };
        let d = w.decor();
        let mut geometry = w.geometry;
        let placed = matches!(trigger, Event::MapRequest { .. });
        if placed {
            let (b, t) = (d.border_w, d.title_w);
            match mode.resize_side() {
                None => {
                    geometry.x = pointer.x + b;
                    geometry.y = pointer.y + t + b;
                },
                Some(side) => {
                    geometry.x = if side > 0 {
                        pointer.x - geometry.width - 2 * b
                    } else {
                        pointer.x
                    };
                    geometry.y = pointer.y - geometry.height - t - 4 * b;
                },
            }
        }
        w.flags |= WindowFlags::MOVE_RESIZE;
        if mode.is_live() {
            w.flags |= WindowFlags::DONT_SEND;
            w.geometry = geometry;
        }

        let mut session = Session::new(mode, Some(id), screen, pointer);
        session.geometry = geometry;
        session.start = geometry;
        session.candidate = (geometry.width, geometry.height);
        self.session = Some(session);
        info!("Started {:?} of {}", mode, id);

        if placed {
            if mode.is_live() {
                self.redraw_window(id);
            } else {
                self.show_outline();
            }
        }
        self.run_session();
    }

    /// Scroll the viewport of `screen` by dragging the pointer.
    pub fn start_viewport_drag(&mut self, screen: ScreenId) {
        if let Some(s) = &self.session {
            debug!("Viewport drag refused, {:?} in progress", s.operation);
            return;
        }
        let Some(root) = self.state.screens.get(screen).map(|s| s.root) else {
            return;
        };
        let pointer = self.backend.query_pointer(root).root;
        if !self.grab_input(root) {
            return;
        }
        for id in self.state.window_ids_on(screen) {
            if let Some(w) = self.state.window_mut(id) {
                w.flags |= WindowFlags::DONT_SEND;
            }
        }
        self.session = Some(Session::new(Mode::ViewportDrag, None, screen, pointer));
        info!("Started viewport drag on screen {}", screen);
        self.run_session();
    }

    /// Grab pointer and keyboard on `window`. Either failing leaves
    /// nothing grabbed.
    fn grab_input(&mut self, window: Handle) -> bool {
        let granted = with_valid(&mut self.backend, window, |d| {
            if !d.grab_pointer(window) {
                return false;
            }
            if !d.grab_keyboard(window) {
                d.ungrab_pointer();
                return false;
            }
            true
        })
        .unwrap_or(false);
        if !granted {
            debug!("Input grab on {} failed", window);
        }
        granted
    }

    // ── Nested loop ──────────────────────────────────────────────────

    fn run_session(&mut self) {
        loop {
            let Some(s) = self.session.as_ref() else {
                return;
            };
            if s.is_finished() {
                self.finish_session();
                return;
            }
            let (mask, operation) = (s.mode.return_mask(), s.operation);
            match self.fetch() {
                Fetched::Event(event) if mask.intersects(event.kind()) => self.session_event(event),
                Fetched::Event(event) => self.dispatch(event),
                Fetched::TimedOut => {},
                Fetched::Disconnected => {
                    info!("Event source disconnected during {:?}", operation);
                    self.disconnected = true;
                    self.abort_session();
                    return;
                },
            }
            self.fire_due_actions();
        }
    }

    fn session_event(&mut self, event: Event) {
        let Some(s) = self.session.as_ref() else {
            return;
        };
        let operation = s.operation;
        let screen = s.screen;
        let target_client = s
            .target
            .and_then(|id| self.state.window(id))
            .map(|w| w.client);
        let is_edge = |core: &Self, h: Handle| {
            core.state
                .screens
                .get(screen)
                .and_then(|s| s.edge_at(h))
                .is_some()
        };

        match event {
            Event::Motion { window, .. } => {
                let newest = self.backend.coalesce_motion(window).unwrap_or(event);
                if let Some(p) = newest.root() {
                    self.drag_to(p);
                }
            },
            Event::Enter { window, .. } | Event::Leave { window, .. }
                if operation != Mode::ViewportDrag && is_edge(self, window) =>
            {
                self.cross_edge(event);
            },
            Event::Leave { .. } if operation != Mode::ViewportDrag => {
                let root = self.state.screens[screen].root;
                let p = self.backend.query_pointer(root).root;
                self.drag_to(p);
            },
            Event::Enter { .. } | Event::Leave { .. } => {},
            Event::Unmap { event: reported, window } if reported == window && Some(window) == target_client => {
                self.target_vanished(event);
            },
            Event::Destroy { window } if Some(window) == target_client => {
                self.target_vanished(event);
            },
            Event::ConfigureRequest(req) if Some(req.window) == target_client => {
                trace!("Ignoring configure request of {} during {:?}", req.window, operation);
            },
            Event::MapRequest { window, .. } => {
                debug!("Deferring map request of {}", window);
                if let Some(s) = self.session.as_mut() {
                    s.deferred_maps.push(event);
                }
            },
            Event::ButtonPress { .. }
            | Event::ButtonRelease { .. }
            | Event::KeyPress { .. }
            | Event::KeyRelease { .. } => {
                let event = match target_client {
                    Some(client) => event.retarget(client),
                    None => event,
                };
                self.dispatch(event);
                self.after_session_input();
            },
            other => self.dispatch(other),
        }
    }

    /// Refresh what an input event routed mid-session may have disturbed.
    fn after_session_input(&mut self) {
        let Some(s) = self.session.as_mut() else {
            return;
        };
        if s.is_finished() {
            return;
        }
        if s.operation.is_live() && s.operation.resize_side().is_some() {
            if let Some(w) = s.target.and_then(|id| self.state.windows.get(&id)) {
                s.candidate = (w.geometry.width, w.geometry.height);
            }
        }
        if s.outline.is_some() {
            self.show_outline();
        }
    }

    fn drag_to(&mut self, p: Point) {
        let Some(s) = self.session.as_mut() else {
            return;
        };
        let (dx, dy) = (p.x - s.anchor.x, p.y - s.anchor.y);
        if dx == 0 && dy == 0 {
            return;
        }
        s.anchor = p;
        s.delta.x += dx;
        s.delta.y += dy;
        let (operation, target, screen) = (s.operation, s.target, s.screen);

        match operation {
            Mode::Moving => {
                s.geometry = s.geometry.translated(dx, dy);
                self.show_outline();
            },
            Mode::MovingLive => {
                s.geometry = s.geometry.translated(dx, dy);
                let (x, y) = (s.geometry.x, s.geometry.y);
                let Some(id) = target else {
                    return;
                };
                if let Some(w) = self.state.window_mut(id) {
                    w.geometry.x = x;
                    w.geometry.y = y;
                }
                self.redraw_window(id);
                self.set_virtual_pos(id);
            },
            Mode::ResizingLeft
            | Mode::ResizingLeftLive
            | Mode::ResizingRight
            | Mode::ResizingRightLive => {
                let side = operation.resize_side().unwrap_or(1);
                s.candidate.0 += dx * side;
                s.candidate.1 += dy;
                self.resize_step();
            },
            Mode::ViewportDrag => self.drag_viewport(screen, dx, dy),
            Mode::Idle | Mode::Shading => {},
        }
    }

    fn resize_step(&mut self) {
        let Some(s) = self.session.as_mut() else {
            return;
        };
        let Some(id) = s.target else {
            return;
        };
        let Some(w) = self.state.windows.get_mut(&id) else {
            return;
        };
        let left = s.operation.resize_side() == Some(-1);
        let (cw, ch) = s.candidate;

        if s.operation.is_live() {
            let Some(check) = w.check_size(cw, ch) else {
                return;
            };
            if left {
                w.geometry.x -= check.width - w.geometry.width;
            }
            let change = w.apply_size(check);
            self.redraw_window(id);
            self.set_virtual_pos(id);
            if change != ShadeChange::None {
                self.publish_net_state(id);
            }
        } else {
            let mut sizing = w.sizing();
            sizing.width = s.geometry.width;
            sizing.height = s.geometry.height;
            let Some(check) = inc_size_check(&sizing, cw, ch) else {
                return;
            };
            if left {
                s.geometry.x -= check.width - s.geometry.width;
            }
            s.geometry.width = check.width;
            s.geometry.height = check.height;
            s.pending = Some(check);
            self.show_outline();
        }
    }

    /// Route a crossing of a screen edge, keeping the drag consistent with
    /// any viewport scroll it caused.
    fn cross_edge(&mut self, event: Event) {
        let Some(screen) = self.session.as_ref().map(|s| s.screen) else {
            return;
        };
        let before = self.state.screens.get(screen).map(|s| (s.vx, s.vy));
        self.dispatch(event);
        let after = self.state.screens.get(screen).map(|s| (s.vx, s.vy));
        let (Some((vx0, vy0)), Some((vx1, vy1))) = (before, after) else {
            return;
        };
        let Some(s) = self.session.as_mut() else {
            return;
        };
        if s.operation.resize_side().is_none() || (vx0, vy0) == (vx1, vy1) {
            return;
        }
        s.anchor.x -= vx1 - vx0;
        s.anchor.y -= vy1 - vy0;
        if s.operation.is_live() {
            return;
        }
        let Some(w) = s.target.and_then(|id| self.state.windows.get(&id)) else {
            return;
        };
        s.geometry.x = if s.operation.resize_side() == Some(-1) {
            w.geometry.x - (s.geometry.width - w.geometry.width)
        } else {
            w.geometry.x
        };
        s.geometry.y = w.geometry.y;
        self.show_outline();
    }

    /// Create the outline on first use and place it around the session
    /// geometry.
    fn show_outline(&mut self) {
        let Some(s) = self.session.as_ref() else {
            return;
        };
        let Some(w) = s.target.and_then(|id| self.state.window(id)) else {
            return;
        };
        let strips = outline_strips(s.geometry, &w.decor());
        let screen = s.screen;
        let outline = match s.outline {
            Some(outline) => outline,
            None => {
                let outline = self.backend.create_outline(screen);
                for h in outline {
                    self.state.registry.insert(h, Object::Outline);
                }
                if let Some(s) = self.session.as_mut() {
                    s.outline = Some(outline);
                }
                self.restack(screen);
                outline
            },
        };
        self.backend.place_outline(&outline, &strips);
    }

    // ── Exit paths ───────────────────────────────────────────────────

    /// Ask the running session to finish; the nested loop applies the
    /// result once the current event is done.
    pub fn end_session(&mut self) {
        if let Some(s) = self.session.as_mut() {
            if s.mode != Mode::Shading {
                s.mode = Mode::Idle;
            }
        }
    }

    /// The session target went away: hand the event back to the
    /// dispatcher ahead of the deferred map requests and stop.
    fn target_vanished(&mut self, event: Event) {
        let Some(mut s) = self.session.take() else {
            return;
        };
        debug!("Target of {:?} vanished", s.operation);
        let maps = std::mem::take(&mut s.deferred_maps);
        self.put_back(std::iter::once(event).chain(maps));
        self.clear_session_flags(&s);
        self.release_session(s);
    }

    /// Stop the running session without applying its result.
    pub fn abort_session(&mut self) {
        let Some(s) = self.session.take() else {
            return;
        };
        if s.operation == Mode::Shading {
            return;
        }
        debug!("Aborting {:?}", s.operation);
        self.clear_session_flags(&s);
        if let Some(w) = s.target.and_then(|id| self.state.window(id)) {
            if s.operation.is_live() && w.geometry != s.start {
                let id = w.id;
                self.set_virtual_pos(id);
                self.send_config(id);
            }
        }
        self.release_session(s);
    }

    fn finish_session(&mut self) {
        let Some(s) = self.session.take() else {
            return;
        };
        self.clear_session_flags(&s);
        if let Some(id) = s.target {
            self.apply_session_result(id, &s);
        }
        info!("Finished {:?}", s.operation);
        self.release_session(s);
    }

    fn apply_session_result(&mut self, id: WindowId, s: &Session) {
        let Some(w) = self.state.window_mut(id) else {
            return;
        };
        match s.operation {
            Mode::Moving => {
                w.geometry.x = s.geometry.x;
                w.geometry.y = s.geometry.y;
                self.redraw_window(id);
            },
            Mode::ResizingLeft | Mode::ResizingRight => {
                let Some(check) = s.pending else {
                    return;
                };
                w.geometry.x = s.geometry.x;
                let change = w.apply_size(check);
                self.redraw_window(id);
                if change != ShadeChange::None {
                    self.publish_net_state(id);
                }
            },
            Mode::MovingLive | Mode::ResizingLeftLive | Mode::ResizingRightLive => {
                if w.geometry != s.start {
                    self.set_virtual_pos(id);
                    self.send_config(id);
                }
            },
            _ => {},
        }
    }

    /// Undo the per-window flags a session set.
    fn clear_session_flags(&mut self, s: &Session) {
        let ids = match s.operation {
            Mode::ViewportDrag => self.state.window_ids_on(s.screen),
            _ => s.target.into_iter().collect(),
        };
        for id in &ids {
            if let Some(w) = self.state.window_mut(*id) {
                w.flags.remove(WindowFlags::MOVE_RESIZE | WindowFlags::DONT_SEND);
            }
        }
        if s.operation == Mode::ViewportDrag {
            self.finish_viewport_drag(s.screen, &ids);
        }
    }

    /// Cleanup shared by every exit path: drop the outline, release the
    /// grabs and replay deferred map requests.
    fn release_session(&mut self, s: Session) {
        if let Some(outline) = s.outline {
            self.backend.destroy_outline(&outline);
            for h in outline {
                self.state.registry.remove(h);
            }
            self.restack(s.screen);
        }
        self.backend.ungrab_keyboard();
        self.backend.ungrab_pointer();
        if !s.deferred_maps.is_empty() {
            debug!("Replaying {} deferred map request(s)", s.deferred_maps.len());
            self.put_back(s.deferred_maps);
        }
    }

    // ── Maximize and shade ───────────────────────────────────────────

    /// Fill the work-area of the window's screen with `id`.
    pub fn maximize(&mut self, id: WindowId) {
        self.maximize_at(id, None);
    }

    /// Maximize with the frame at the virtual position `anchor`, or at the
    /// current work-area when `None`.
    fn maximize_at(&mut self, id: WindowId, anchor: Option<Point>) {
        let Some(w) = self.state.windows.get_mut(&id) else {
            return;
        };
        if w.is_maximized() {
            return;
        }
        let Some(screen) = self.state.screens.get(w.screen) else {
            return;
        };
        let work = screen.workarea();
        let (vx, vy) = (screen.vx, screen.vy);
        let d = w.decor();
        let b = d.border_w;

        let width = work.width - b * 2;
        let mut height = work.height - b * 2 - d.title_w - d.handle_w;
        if d.has_title() {
            height -= b;
        }
        if d.has_handle() {
            height -= b;
        }
        let mut restore_height = w.geometry.height;
        let mut shade_restore = None;
        if let Some(pre_shade) = w.shaded {
            restore_height = pre_shade;
            shade_restore = Some(height);
            height = w.geometry.height;
        }
        let Some(check) = w.check_size(width, height) else {
            debug!("Maximize of {} refused by size hints", id);
            return;
        };

        let (x, y) = match anchor {
            Some(a) => (a.x - vx, a.y - vy),
            None => (work.x, work.y),
        };
        let restore = MaxRestore {
            width: w.geometry.width,
            height: restore_height,
            dx: w.geometry.x - x,
            dy: w.geometry.y - y,
            anchor_x: vx + x,
            anchor_y: vy + y,
        };
        w.geometry.x = x + b;
        w.geometry.y = y + b;
        if d.has_title() {
            w.geometry.y += d.title_w + b;
        }
        w.apply_size(check);
        if shade_restore.is_some() {
            w.shaded = shade_restore;
        }
        self.redraw_window(id);
        if let Some(w) = self.state.windows.get_mut(&id) {
            w.maximized = Some(restore);
        }
        debug!("Maximized {}", id);
        self.publish_net_state(id);
    }

    /// Restore the pre-maximize size and position, relative to where the
    /// viewport has scrolled since.
    pub fn unmaximize(&mut self, id: WindowId) {
        let Some(w) = self.state.windows.get_mut(&id) else {
            return;
        };
        let Some(restore) = w.maximized else {
            return;
        };
        let Some(screen) = self.state.screens.get(w.screen) else {
            return;
        };
        let (vx, vy) = (screen.vx, screen.vy);
        let height = if w.is_shaded() {
            w.geometry.height
        } else {
            restore.height
        };
        let Some(check) = w.check_size(restore.width, height) else {
            return;
        };
        let shade_restore = w.shaded.map(|_| restore.height);
        w.geometry.x = restore.dx + (restore.anchor_x - vx);
        w.geometry.y = restore.dy + (restore.anchor_y - vy);
        w.apply_size(check);
        w.maximized = None;
        self.redraw_window(id);
        if let Some(w) = self.state.windows.get_mut(&id) {
            if shade_restore.is_some() {
                w.shaded = shade_restore;
            }
        }
        debug!("Restored {}", id);
        self.publish_net_state(id);
    }

    /// Maximize again at the same virtual position after the work-area
    /// changed, keeping the original restore data.
    pub(crate) fn remaximize(&mut self, id: WindowId) {
        let Some(saved) = self.state.window_mut(id).and_then(|w| w.maximized.take()) else {
            return;
        };
        self.maximize_at(id, Some(Point::new(saved.anchor_x, saved.anchor_y)));
        if let Some(w) = self.state.window_mut(id) {
            match w.maximized.as_mut() {
                Some(max) => {
                    max.width = saved.width;
                    max.height = saved.height;
                    max.dx = saved.dx;
                    max.dy = saved.dy;
                },
                None => w.maximized = Some(saved),
            }
        }
    }

    /// Collapse `id` to its title bar.
    pub fn shade(&mut self, id: WindowId) {
        self.shading(id, |core| {
            let Some(w) = core.state.windows.get_mut(&id) else {
                return;
            };
            if w.is_shaded() || !w.decor().has_title() {
                return;
            }
            let Some(check) = w.check_size(w.geometry.width, w.decor().shade_threshold()) else {
                return;
            };
            w.apply_size(check);
            core.redraw_window(id);
            core.publish_net_state(id);
        });
    }

    pub fn unshade(&mut self, id: WindowId) {
        self.shading(id, |core| {
            let Some(w) = core.state.windows.get_mut(&id) else {
                return;
            };
            let Some(height) = w.shaded else {
                return;
            };
            w.geometry.height = height;
            // Still marked shaded while redrawing so a maximized window
            // keeps its state.
            core.redraw_window(id);
            let Some(w) = core.state.windows.get_mut(&id) else {
                return;
            };
            w.shaded = None;
            let quiet = w.flags.contains(WindowFlags::DONT_SEND);
            if !quiet {
                core.set_virtual_pos(id);
                core.send_config(id);
            }
            core.publish_net_state(id);
        });
    }

    /// Run a shade transition as a short session of its own when nothing
    /// else is running.
    fn shading(&mut self, id: WindowId, op: impl FnOnce(&mut Self)) {
        let scoped = self.session.is_none();
        if scoped {
            let screen = self.state.window(id).map_or(0, |w| w.screen);
            self.session = Some(Session::new(Mode::Shading, Some(id), screen, Point::default()));
        }
        op(self);
        if scoped {
            self.session = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Point;
    use crate::input::Modifiers;
    use crate::mock::{self, Call, ROOT};
    use crate::test_util::{core, map_client};
    use crate::window::WindowFlags;
    use pretty_assertions::assert_eq;

    fn press(client: Handle) -> Event {
        mock::button_press(client, 1, Modifiers::MOD1, Point::new(150, 130), 1000)
    }

    fn release(window: Handle, button: u32, at: Point) -> Event {
        mock::button_release(window, button, Modifiers::BUTTON1, at, 1100)
    }

    #[test]
    fn test_outline_strips_surround_frame() {
        let decor = Decor {
            title_w: 20,
            handle_w: 6,
            border_w: 1,
        };
        let [west, east, north, south] = outline_strips(Geometry::new(101, 122, 300, 200), &decor);
        assert_eq!(west, Geometry::new(100, 100, 1, 2 + 20 + 6 + 200 + 2));
        assert_eq!(east, Geometry::new(401, 100, 1, 230));
        assert_eq!(north, Geometry::new(100, 100, 302, 1));
        assert_eq!(south, Geometry::new(100, 122 + 200 + 6 + 1, 302, 1));
    }

    #[test]
    fn test_outline_strips_without_border() {
        let decor = Decor::default();
        let [west, ..] = outline_strips(Geometry::new(10, 10, 50, 50), &decor);
        assert_eq!(west.width, 2);
    }

    #[test]
    fn test_return_mask_per_mode() {
        assert_eq!(Mode::ResizingLeftLive.return_mask(), EventMask::MOVE_RESIZE);
        assert_eq!(Mode::ViewportDrag.return_mask(), EventMask::VIEWPORT_DRAG);
        assert!(Mode::Idle.return_mask().is_empty());
    }

    #[test]
    fn test_outline_move_applies_at_end() {
        let mut core = core();
        let id = map_client(&mut core, Geometry::new(100, 100, 300, 200));
        let client = core.state.window(id).unwrap().client;
        core.backend.pointer.root = Point::new(150, 130);
        core.backend.push_events([
            mock::motion(client, Point::new(170, 140), 1010),
            mock::motion(client, Point::new(180, 150), 1020),
            release(client, 1, Point::new(180, 150)),
        ]);
        core.start_move(id, false, &press(client));

        let w = core.state.window(id).unwrap();
        assert_eq!((w.geometry.x, w.geometry.y), (131, 142));
        assert!(!w.flags.contains(WindowFlags::MOVE_RESIZE));
        assert!(core.session().is_none());
        assert!(core.backend.called(|c| *c == Call::GrabPointer(client)));
        assert!(core.backend.called(|c| matches!(c, Call::CreateOutline(_))));
        assert!(core.backend.called(|c| matches!(c, Call::DestroyOutline(_))));
        assert!(core.backend.called(|c| *c == Call::UngrabKeyboard));
        // The outline is gone from the stacking order again
        assert_eq!(core.backend.last_restack().unwrap().len(), 5);
    }

    #[test]
    fn test_live_move_suppresses_notifications() {
        let mut core = core();
        let id = map_client(&mut core, Geometry::new(100, 100, 300, 200));
        let client = core.state.window(id).unwrap().client;
        core.backend.pointer.root = Point::new(150, 130);
        core.backend
            .push_event(mock::motion(client, Point::new(160, 130), 1010));
        core.backend.calls.clear();
        core.start_move(id, true, &press(client));
        // The source ran dry, which aborts the session
        assert!(core.is_disconnected());
        assert!(core.session().is_none());
        let notifies: Vec<_> = core
            .backend
            .calls
            .iter()
            .filter(|c| matches!(c, Call::SendConfigureNotify { .. }))
            .collect();
        assert_eq!(notifies.len(), 1);
        assert_eq!(core.state.window(id).unwrap().geometry.x, 111);
        assert!(!core.state.window(id).unwrap().flags.contains(WindowFlags::DONT_SEND));
    }

    #[test]
    fn test_live_resize_left_keeps_right_edge() {
        let mut core = core();
        let id = map_client(&mut core, Geometry::new(100, 100, 300, 200));
        let client = core.state.window(id).unwrap().client;
        core.backend.pointer.root = Point::new(100, 300);
        core.backend.push_events([
            mock::motion(client, Point::new(60, 330), 1010),
            release(client, 1, Point::new(60, 330)),
        ]);
        core.start_resize(id, Side::Left, true, &press(client));

        let w = core.state.window(id).unwrap();
        assert_eq!(w.geometry, Geometry::new(61, 122, 340, 230));
        assert!(core.backend.called(|c| *c
            == Call::SendConfigureNotify {
                client,
                geometry: Geometry::new(61, 122, 340, 230)
            }));
    }

    #[test]
    fn test_outline_resize_snaps_to_increments() {
        let mut core = core();
        let id = map_client(&mut core, Geometry::new(100, 100, 300, 200));
        let client = core.state.window(id).unwrap().client;
        {
            let w = core.state.window_mut(id).unwrap();
            w.hints.width_inc = 10;
            w.hints.base_width = 0;
        }
        core.backend.pointer.root = Point::new(400, 300);
        core.backend.push_events([
            mock::motion(client, Point::new(415, 300), 1010),
            release(client, 1, Point::new(415, 300)),
        ]);
        core.start_resize(id, Side::Right, false, &press(client));
        assert_eq!(core.state.window(id).unwrap().geometry.width, 310);
    }

    #[test]
    fn test_grab_failure_aborts_before_side_effects() {
        let mut core = core();
        let id = map_client(&mut core, Geometry::new(100, 100, 300, 200));
        let client = core.state.window(id).unwrap().client;
        core.backend.grant_keyboard = false;
        core.backend.calls.clear();
        core.start_move(id, false, &mock::map_request(client));

        assert!(core.session().is_none());
        assert!(core.backend.called(|c| *c == Call::UngrabPointer));
        assert!(!core.backend.called(|c| matches!(c, Call::CreateOutline(_))));
        let w = core.state.window(id).unwrap();
        assert_eq!((w.geometry.x, w.geometry.y), (101, 122));
        assert!(!w.flags.contains(WindowFlags::MOVE_RESIZE));
    }

    #[test]
    fn test_second_session_is_refused() {
        let mut core = core();
        let id = map_client(&mut core, Geometry::new(100, 100, 300, 200));
        let client = core.state.window(id).unwrap().client;
        core.backend.pointer.root = Point::new(150, 130);
        core.backend.push_events([
            // Alt+Button3 would start a resize outside a session
            mock::button_press(client, 3, Modifiers::MOD1 | Modifiers::BUTTON1, Point::new(150, 130), 1005),
            release(client, 1, Point::new(150, 130)),
        ]);
        core.start_move(id, false, &press(client));
        let grabs = core
            .backend
            .calls
            .iter()
            .filter(|c| matches!(c, Call::GrabPointer(_)))
            .count();
        assert_eq!(grabs, 1);
        assert!(core.session().is_none());
    }

    #[test]
    fn test_viewport_drag_scrolls_against_pointer() {
        let mut core = core();
        let id = map_client(&mut core, Geometry::new(100, 100, 300, 200));
        core.backend.pointer.root = Point::new(400, 300);
        core.backend.push_events([
            mock::motion(ROOT, Point::new(300, 300), 1010),
            release(ROOT, 2, Point::new(300, 300)),
        ]);
        core.start_viewport_drag(0);

        assert_eq!((core.state.screens[0].vx, core.state.screens[0].vy), (100, 0));
        assert_eq!(core.backend.published.viewport, Some(Point::new(100, 0)));
        let w = core.state.window(id).unwrap();
        assert_eq!(w.geometry.x, 1);
        assert!(!w.flags.contains(WindowFlags::DONT_SEND));
        assert_eq!(
            core.backend.published.virtual_pos.get(&w.client),
            Some(&Point::new(101, 122))
        );
    }

    #[test]
    fn test_maximize_and_restore() {
        let mut core = core();
        let id = map_client(&mut core, Geometry::new(100, 100, 300, 200));
        core.maximize(id);
        let w = core.state.window(id).unwrap();
        assert!(w.is_maximized());
        assert_eq!(w.geometry, Geometry::new(1, 22, 798, 570));
        assert_eq!(w.frame, Geometry::new(0, 0, 798, 570 + 21 + 7));

        core.unmaximize(id);
        let w = core.state.window(id).unwrap();
        assert!(!w.is_maximized());
        assert_eq!(w.geometry, Geometry::new(101, 122, 300, 200));
    }

    #[test]
    fn test_restore_follows_viewport() {
        let mut core = core();
        let id = map_client(&mut core, Geometry::new(100, 100, 300, 200));
        core.maximize(id);
        core.move_viewport_to(0, 800, 0);
        core.unmaximize(id);
        let w = core.state.window(id).unwrap();
        assert_eq!((w.geometry.x, w.geometry.y), (-699, 122));
    }

    #[test]
    fn test_shade_keeps_maximized() {
        let mut core = core();
        let id = map_client(&mut core, Geometry::new(100, 100, 300, 200));
        core.maximize(id);
        core.shade(id);
        let w = core.state.window(id).unwrap();
        assert!(w.is_shaded() && w.is_maximized());
        assert_eq!(w.frame.height, 20);
        assert!(core.session().is_none());

        core.unshade(id);
        let w = core.state.window(id).unwrap();
        assert!(!w.is_shaded() && w.is_maximized());
        assert_eq!(w.geometry.height, 570);
    }

    #[test]
    fn test_unmaximize_while_shaded_stays_shaded() {
        let mut core = core();
        let id = map_client(&mut core, Geometry::new(100, 100, 300, 200));
        core.maximize(id);
        core.shade(id);
        core.unmaximize(id);
        let w = core.state.window(id).unwrap();
        assert!(w.is_shaded());
        assert_eq!(w.shaded, Some(200));
        core.unshade(id);
        assert_eq!(core.state.window(id).unwrap().geometry.height, 200);
    }

    #[test]
    fn test_end_session_without_session_is_noop() {
        let mut core = core();
        core.end_session();
        core.abort_session();
        assert!(core.session().is_none());
    }
}
