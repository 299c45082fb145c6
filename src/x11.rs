//! X11 backend on x11rb.
//!
//! Implements the core's collaborator traits against a live X server:
//! substructure redirect on the root, reparenting frames with plain
//! filled decorations, passive grabs for the window binding lists, and
//! the EWMH hints the core publishes.

use std::collections::VecDeque;
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, trace, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::errors::ReplyError;
use x11rb::protocol::randr::{self, ConnectionExt as _};
use x11rb::protocol::shape::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{
    self, Allow, AtomEnum, ButtonIndex, ChangeWindowAttributesAux, ClientMessageEvent,
    ConfigureNotifyEvent, ConfigureWindowAux, ConnectionExt as _, CreateGCAux, CreateWindowAux,
    EventMask, GrabMode, GrabStatus, InputFocus, MapState, ModMask, NotifyDetail, NotifyMode,
    PropMode, Rectangle, SetMode, WindowClass,
};
use x11rb::protocol::Event as XEvent;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::{CURRENT_TIME, NONE};

use driftwm_core::backend::{
    ClientAttributes, ClientNames, Decorator, Display, EventSource, Fetched, Furniture, Hints,
    NetStates, PointerState,
};
use driftwm_core::desktop::DesktopMask;
use driftwm_core::event::{
    ClientMessage, ConfigureMask, ConfigureRequest, Event, MoveResizeDirection, NetState, Point,
    Property, StackMode, StateAction, Timestamp, WmState,
};
use driftwm_core::geometry::{Geometry, Gravity};
use driftwm_core::input::{ActionBinding, ActionKind, Modifiers};
use driftwm_core::registry::ScreenId;
use driftwm_core::screen::{DockApp, Strut};
use driftwm_core::window::{FrameParts, ManagedWindow, SizeHints, WindowFlags};
use driftwm_core::Handle;

use crate::atoms::Atoms;

/// How often a timed wait looks for new events.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Width of the resize grips at both ends of the handle bar.
const GRIP_WIDTH: i32 = 25;

/// Decoration colors as 24-bit true-color pixels.
mod color {
    pub const BORDER: u32 = 0x0020_2020;
    pub const TITLE_FOCUSED: u32 = 0x0035_5f8c;
    pub const TITLE: u32 = 0x0060_6060;
    pub const TEXT: u32 = 0x00f0_f0f0;
    pub const BUTTON: u32 = 0x0090_9090;
    pub const BUTTON_PRESSED: u32 = 0x00c0_c0c0;
    pub const HANDLE: u32 = 0x0050_5050;
    pub const GRIP: u32 = 0x0070_7070;
    pub const OUTLINE: u32 = 0x00ff_ffff;
}

/// Frame-relative rectangles of the decoration parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PartLayout {
    client: Geometry,
    title: Option<Geometry>,
    label: Option<Geometry>,
    handle: Option<Geometry>,
    left_grip: Option<Geometry>,
    right_grip: Option<Geometry>,
    /// Square size and left edge of the first title button.
    buttons: Option<(i32, i32)>,
}

/// Lay the parts out inside a frame: title on top, then a border line,
/// the client, another border line and the handle bar.
fn part_layout(w: &ManagedWindow) -> PartLayout {
    let d = w.decor();
    let (b, t, h) = (d.border_w, d.title_w, d.handle_w);
    let width = w.geometry.width;
    let client_y = if t > 0 { t + b } else { 0 };
    let client = Geometry::new(0, client_y, width, w.client_height());

    let buttons = i32::from(w.style.buttons);
    let (title, label, button_row) = if t > 0 {
        let size = (t - 4).max(1);
        let row = width - buttons * (size + 2) - 2;
        (
            Some(Geometry::new(0, 0, width, t)),
            Some(Geometry::new(2, 2, (row - 4).max(1), (t - 4).max(1))),
            Some((size, row)),
        )
    } else {
        (None, None, None)
    };

    let (handle, left_grip, right_grip) = if h > 0 {
        let y = w.frame.height - h;
        let grip = GRIP_WIDTH.min(width / 3);
        (
            Some(Geometry::new(grip, y, (width - grip * 2).max(1), h)),
            Some(Geometry::new(0, y, grip.max(1), h)),
            Some(Geometry::new(width - grip, y, grip.max(1), h)),
        )
    } else {
        (None, None, None)
    };

    PartLayout {
        client,
        title,
        label,
        handle,
        left_grip,
        right_grip,
        buttons: button_row,
    }
}

fn to_i16(v: i32) -> i16 {
    v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

fn to_u16(v: i32) -> u16 {
    v.clamp(1, i32::from(u16::MAX)) as u16
}

fn point(x: i16, y: i16) -> Point {
    Point::new(i32::from(x), i32::from(y))
}

const fn wm_state_from_raw(raw: u32) -> Option<WmState> {
    match raw {
        0 => Some(WmState::Withdrawn),
        1 => Some(WmState::Normal),
        3 => Some(WmState::Iconic),
        _ => None,
    }
}

const fn wm_state_to_raw(state: WmState) -> u32 {
    match state {
        WmState::Withdrawn => 0,
        WmState::Normal => 1,
        WmState::Iconic => 3,
    }
}

const fn state_action(raw: u32) -> Option<StateAction> {
    match raw {
        0 => Some(StateAction::Remove),
        1 => Some(StateAction::Add),
        2 => Some(StateAction::Toggle),
        _ => None,
    }
}

const fn moveresize_direction(raw: u32) -> Option<MoveResizeDirection> {
    Some(match raw {
        0 => MoveResizeDirection::SizeTopLeft,
        1 => MoveResizeDirection::SizeTop,
        2 => MoveResizeDirection::SizeTopRight,
        3 => MoveResizeDirection::SizeRight,
        4 => MoveResizeDirection::SizeBottomRight,
        5 => MoveResizeDirection::SizeBottom,
        6 => MoveResizeDirection::SizeBottomLeft,
        7 => MoveResizeDirection::SizeLeft,
        8 => MoveResizeDirection::Move,
        9 => MoveResizeDirection::SizeKeyboard,
        10 => MoveResizeDirection::MoveKeyboard,
        _ => return None,
    })
}

/// Decode the flags word of a moveresize-window message: gravity in the
/// low byte, which of x/y/width/height are set in bits 8 to 11.
fn moveresize_flags(flags: u32) -> (Option<Gravity>, ConfigureMask) {
    let gravity = match flags & 0xff {
        0 => None,
        raw => Some(Gravity::from_raw(raw)),
    };
    let mut mask = ConfigureMask::empty();
    for (bit, field) in [
        (8, ConfigureMask::X),
        (9, ConfigureMask::Y),
        (10, ConfigureMask::WIDTH),
        (11, ConfigureMask::HEIGHT),
    ] {
        if flags & (1 << bit) != 0 {
            mask |= field;
        }
    }
    (gravity, mask)
}

/// Parse a `WM_NORMAL_HINTS` value into size hints over the defaults.
fn parse_normal_hints(v: &[u32]) -> Option<SizeHints> {
    const MIN_SIZE: u32 = 1 << 4;
    const MAX_SIZE: u32 = 1 << 5;
    const RESIZE_INC: u32 = 1 << 6;
    const BASE_SIZE: u32 = 1 << 8;
    const WIN_GRAVITY: u32 = 1 << 9;

    if v.len() < 15 {
        return None;
    }
    let flags = v[0];
    let int = |i: usize| v[i] as i32;
    let mut hints = SizeHints::default();
    if flags & MIN_SIZE != 0 {
        hints.min_width = int(5);
        hints.min_height = int(6);
    }
    if flags & MAX_SIZE != 0 {
        hints.max_width = int(7);
        hints.max_height = int(8);
    }
    if flags & RESIZE_INC != 0 {
        hints.width_inc = int(9);
        hints.height_inc = int(10);
    }
    if flags & BASE_SIZE != 0 && v.len() >= 17 {
        hints.base_width = int(15);
        hints.base_height = int(16);
    } else {
        hints.base_width = hints.min_width;
        hints.base_height = hints.min_height;
    }
    if flags & WIN_GRAVITY != 0 && v.len() >= 18 {
        hints.gravity = Gravity::from_raw(v[17]);
    }
    Some(hints)
}

/// Log a failed request; the window manager keeps running.
fn logged<T, E: std::fmt::Display>(result: Result<T, E>, what: &str) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            debug!("{} failed: {}", what, e);
            None
        },
    }
}

pub struct X11Backend {
    conn: RustConnection,
    screen_num: usize,
    root: u32,
    width: i32,
    height: i32,
    atoms: Atoms,
    gc: u32,
    time: Timestamp,
    /// Events read while coalescing, served before new ones.
    queue: VecDeque<Event>,
    docks: Vec<Handle>,
    has_shape: bool,
}

impl X11Backend {
    /// Connect to `display` (or `$DISPLAY`) and take over its default
    /// screen. Fails when another window manager holds substructure
    /// redirect on the root.
    pub fn connect(display: Option<&str>) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(display).context("Failed to connect to the X server")?;
        let atoms = Atoms::new(&conn)?.reply().context("Failed to intern atoms")?;
        let screen = &conn.setup().roots[screen_num];
        let (root, width, height) = (
            screen.root,
            i32::from(screen.width_in_pixels),
            i32::from(screen.height_in_pixels),
        );

        let mask = EventMask::SUBSTRUCTURE_REDIRECT
            | EventMask::SUBSTRUCTURE_NOTIFY
            | EventMask::ENTER_WINDOW
            | EventMask::LEAVE_WINDOW
            | EventMask::PROPERTY_CHANGE
            | EventMask::BUTTON_PRESS
            | EventMask::BUTTON_RELEASE
            | EventMask::FOCUS_CHANGE
            | EventMask::COLOR_MAP_CHANGE;
        conn.change_window_attributes(root, &ChangeWindowAttributesAux::new().event_mask(mask))?
            .check()
            .context("Another window manager is already running")?;

        let has_shape = conn
            .extension_information(shape::X11_EXTENSION_NAME)?
            .is_some();
        if conn.extension_information(randr::X11_EXTENSION_NAME)?.is_some() {
            conn.randr_select_input(root, randr::NotifyMask::SCREEN_CHANGE)?;
        }

        let font = conn.generate_id()?;
        conn.open_font(font, b"fixed")?;
        let gc = conn.generate_id()?;
        conn.create_gc(
            gc,
            root,
            &CreateGCAux::new().foreground(color::TEXT).font(font),
        )?;
        conn.close_font(font)?;
        conn.flush()?;

        info!("Connected to X screen {} ({}x{})", screen_num, width, height);
        Ok(Self {
            conn,
            screen_num,
            root,
            width,
            height,
            atoms,
            gc,
            time: Timestamp(0),
            queue: VecDeque::new(),
            docks: Vec::new(),
            has_shape,
        })
    }

    pub const fn root(&self) -> Handle {
        Handle(self.root)
    }

    pub const fn screen_size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    /// Advertise the supported hints and the desktop layout on the root.
    pub fn announce(&mut self, desktop_count: u32, virtual_x: i32, virtual_y: i32) -> Result<()> {
        let a = &self.atoms;
        let supported = [
            a._NET_CLIENT_LIST,
            a._NET_CLIENT_LIST_STACKING,
            a._NET_NUMBER_OF_DESKTOPS,
            a._NET_CURRENT_DESKTOP,
            a._NET_DESKTOP_VIEWPORT,
            a._NET_DESKTOP_GEOMETRY,
            a._NET_WORKAREA,
            a._NET_ACTIVE_WINDOW,
            a._NET_CLOSE_WINDOW,
            a._NET_MOVERESIZE_WINDOW,
            a._NET_WM_MOVERESIZE,
            a._NET_WM_DESKTOP,
            a._NET_WM_STRUT,
            a._NET_WM_STRUT_PARTIAL,
            a._NET_WM_STATE,
            a._NET_WM_STATE_STICKY,
            a._NET_WM_STATE_SHADED,
            a._NET_WM_STATE_HIDDEN,
            a._NET_WM_STATE_MAXIMIZED_VERT,
            a._NET_WM_STATE_MAXIMIZED_HORZ,
            a._NET_WM_STATE_ABOVE,
            a._NET_WM_STATE_BELOW,
            a._NET_WM_STATE_FULLSCREEN,
        ];
        let root = self.root;
        self.conn
            .change_property32(PropMode::REPLACE, root, a._NET_SUPPORTED, AtomEnum::ATOM, &supported)?;
        self.conn.change_property32(
            PropMode::REPLACE,
            root,
            a._NET_NUMBER_OF_DESKTOPS,
            AtomEnum::CARDINAL,
            &[desktop_count],
        )?;
        let geometry = [
            (self.width * virtual_x) as u32,
            (self.height * virtual_y) as u32,
        ];
        self.conn.change_property32(
            PropMode::REPLACE,
            root,
            a._NET_DESKTOP_GEOMETRY,
            AtomEnum::CARDINAL,
            &geometry,
        )?;

        let check = self.conn.generate_id()?;
        self.conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            check,
            root,
            -1,
            -1,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new().override_redirect(1),
        )?;
        for window in [root, check] {
            self.conn.change_property32(
                PropMode::REPLACE,
                window,
                a._NET_SUPPORTING_WM_CHECK,
                AtomEnum::WINDOW,
                &[check],
            )?;
        }
        self.conn.change_property8(
            PropMode::REPLACE,
            check,
            a._NET_WM_NAME,
            a.UTF8_STRING,
            b"driftwm",
        )?;
        self.conn.flush()?;
        Ok(())
    }

    /// Top-level windows already mapped when we started.
    pub fn existing_clients(&self) -> Result<Vec<Handle>> {
        let tree = self.conn.query_tree(self.root)?.reply()?;
        let mut clients = Vec::new();
        for window in tree.children {
            let Ok(attrs) = self.conn.get_window_attributes(window)?.reply() else {
                continue;
            };
            if !attrs.override_redirect && attrs.map_state == MapState::VIEWABLE {
                clients.push(Handle(window));
            }
        }
        Ok(clients)
    }

    fn new_id(&self) -> u32 {
        logged(self.conn.generate_id(), "Allocating an X id").unwrap_or(NONE)
    }

    fn cardinals(&self, window: u32, property: u32, ty: impl Into<u32>) -> Option<Vec<u32>> {
        let reply = self
            .conn
            .get_property(false, window, property, ty, 0, 1024)
            .ok()?
            .reply()
            .ok()?;
        let values: Vec<u32> = reply.value32()?.collect();
        (!values.is_empty()).then_some(values)
    }

    fn text(&self, window: u32, property: u32, ty: impl Into<u32>) -> Option<String> {
        let reply = self
            .conn
            .get_property(false, window, property, ty, 0, 1024)
            .ok()?
            .reply()
            .ok()?;
        (!reply.value.is_empty()).then(|| String::from_utf8_lossy(&reply.value).into_owned())
    }

    fn set_cardinals(&self, window: Handle, property: u32, ty: impl Into<u32>, values: &[u32]) {
        logged(
            self.conn
                .change_property32(PropMode::REPLACE, window.0, property, ty, values),
            "Setting a property",
        );
    }

    /// Create a decoration child of `parent`.
    fn create_part(&self, parent: u32, class: WindowClass, background: u32) -> Handle {
        let id = self.new_id();
        let mask = EventMask::BUTTON_PRESS
            | EventMask::BUTTON_RELEASE
            | EventMask::BUTTON_MOTION
            | EventMask::EXPOSURE
            | EventMask::ENTER_WINDOW
            | EventMask::LEAVE_WINDOW;
        let mut aux = CreateWindowAux::new().event_mask(mask);
        if class == WindowClass::INPUT_OUTPUT {
            aux = aux.background_pixel(background);
        }
        logged(
            self.conn.create_window(
                x11rb::COPY_DEPTH_FROM_PARENT,
                id,
                parent,
                0,
                0,
                1,
                1,
                0,
                class,
                x11rb::COPY_FROM_PARENT,
                &aux,
            ),
            "Creating a decoration part",
        );
        Handle(id)
    }

    fn place(&self, window: Handle, g: Option<Geometry>) {
        if window.is_none() {
            return;
        }
        match g {
            Some(g) => {
                let aux = ConfigureWindowAux::new()
                    .x(g.x)
                    .y(g.y)
                    .width(u32::from(to_u16(g.width)))
                    .height(u32::from(to_u16(g.height)));
                logged(self.conn.configure_window(window.0, &aux), "Placing a part");
                logged(self.conn.map_window(window.0), "Mapping a part");
            },
            None => {
                logged(self.conn.unmap_window(window.0), "Unmapping a part");
            },
        }
    }

    fn fill(&self, window: Handle, pixel: u32, g: Option<Geometry>) {
        let Some(g) = g.filter(|_| !window.is_none()) else {
            return;
        };
        let rect = Rectangle {
            x: 0,
            y: 0,
            width: to_u16(g.width),
            height: to_u16(g.height),
        };
        logged(
            self.conn
                .change_gc(self.gc, &xproto::ChangeGCAux::new().foreground(pixel)),
            "Changing the drawing color",
        );
        logged(
            self.conn.poly_fill_rectangle(window.0, self.gc, &[rect]),
            "Filling a part",
        );
    }

    fn paint_title(&self, w: &ManagedWindow, focused: bool) {
        let layout = part_layout(w);
        let background = if focused {
            color::TITLE_FOCUSED
        } else {
            color::TITLE
        };
        self.fill(w.parts.title, background, layout.title);
        self.fill(w.parts.label, background, layout.label);
        if let Some(label) = layout.label.filter(|_| !w.parts.label.is_none()) {
            logged(
                self.conn
                    .change_gc(self.gc, &xproto::ChangeGCAux::new().foreground(color::TEXT)),
                "Changing the text color",
            );
            let text: Vec<u8> = w.title.bytes().take(255).collect();
            let baseline = to_i16((label.height + 9) / 2);
            logged(
                self.conn.image_text8(w.parts.label.0, self.gc, 2, baseline, &text),
                "Drawing the title",
            );
        }
        if let Some((size, _)) = layout.buttons {
            let square = Some(Geometry::new(0, 0, size, size));
            for button in &w.parts.buttons {
                self.fill(*button, color::BUTTON, square);
            }
        }
    }

    fn paint_handle(&self, w: &ManagedWindow) {
        let layout = part_layout(w);
        self.fill(w.parts.handle, color::HANDLE, layout.handle);
        self.fill(w.parts.left_grip, color::GRIP, layout.left_grip);
        self.fill(w.parts.right_grip, color::GRIP, layout.right_grip);
    }

    fn track_time(&mut self, event: &Event) {
        if let Some(t) = event.time() {
            self.time = t;
        }
    }

    fn net_state_atom(&self, atom: u32) -> Option<NetState> {
        let a = &self.atoms;
        let table = [
            (a._NET_WM_STATE_STICKY, NetState::Sticky),
            (a._NET_WM_STATE_SHADED, NetState::Shaded),
            (a._NET_WM_STATE_HIDDEN, NetState::Hidden),
            (a._NET_WM_STATE_MAXIMIZED_VERT, NetState::MaximizedVert),
            (a._NET_WM_STATE_MAXIMIZED_HORZ, NetState::MaximizedHorz),
            (a._NET_WM_STATE_ABOVE, NetState::Above),
            (a._NET_WM_STATE_BELOW, NetState::Below),
            (a._NET_WM_STATE_FULLSCREEN, NetState::Fullscreen),
            (a._DRIFTWM_STATE_DECOR, NetState::Decor),
            (a._DRIFTWM_STATE_DECOR_TITLE, NetState::DecorTitle),
            (a._DRIFTWM_STATE_DECOR_HANDLE, NetState::DecorHandle),
            (a._DRIFTWM_STATE_DECOR_BORDER, NetState::DecorBorder),
        ];
        table.iter().find(|(a, _)| *a == atom).map(|(_, s)| *s)
    }

    fn client_message(&self, e: &ClientMessageEvent) -> Option<ClientMessage> {
        let a = &self.atoms;
        let d = e.data.as_data32();
        let t = e.type_;
        let message = if t == a._NET_ACTIVE_WINDOW {
            ClientMessage::ActiveWindow
        } else if t == a.WM_CHANGE_STATE {
            ClientMessage::ChangeState(wm_state_from_raw(d[0])?)
        } else if t == a._NET_WM_DESKTOP {
            ClientMessage::Desktop(d[0])
        } else if t == a._NET_WM_STATE {
            ClientMessage::State {
                action: state_action(d[0])?,
                first: self.net_state_atom(d[1]),
                second: self.net_state_atom(d[2]),
            }
        } else if t == a._NET_DESKTOP_VIEWPORT {
            ClientMessage::DesktopViewport {
                x: d[0] as i32,
                y: d[1] as i32,
            }
        } else if t == a._NET_CLOSE_WINDOW {
            ClientMessage::CloseWindow
        } else if t == a._NET_CURRENT_DESKTOP {
            ClientMessage::CurrentDesktop(d[0])
        } else if t == a._NET_MOVERESIZE_WINDOW {
            let (gravity, mask) = moveresize_flags(d[0]);
            ClientMessage::MoveResizeWindow {
                gravity,
                mask,
                x: d[1] as i32,
                y: d[2] as i32,
                width: d[3] as i32,
                height: d[4] as i32,
            }
        } else if t == a._NET_WM_MOVERESIZE {
            ClientMessage::WmMoveResize {
                root: Point::new(d[0] as i32, d[1] as i32),
                direction: moveresize_direction(d[2])?,
                button: d[3],
            }
        } else if t == a.XdndEnter {
            ClientMessage::DndEnter
        } else if t == a.XdndLeave {
            ClientMessage::DndLeave
        } else {
            return None;
        };
        Some(message)
    }

    /// Translate a protocol event; `None` for events the core ignores.
    fn decode(&self, raw: XEvent) -> Option<Event> {
        let mods = |state: xproto::KeyButMask| Modifiers::from_bits_truncate(u16::from(state));
        let event = match raw {
            XEvent::ButtonPress(e) => Event::ButtonPress {
                window: Handle(e.event),
                button: u32::from(e.detail),
                state: mods(e.state),
                root: point(e.root_x, e.root_y),
                time: Timestamp(e.time),
            },
            XEvent::ButtonRelease(e) => Event::ButtonRelease {
                window: Handle(e.event),
                button: u32::from(e.detail),
                state: mods(e.state),
                root: point(e.root_x, e.root_y),
                time: Timestamp(e.time),
            },
            XEvent::KeyPress(e) => Event::KeyPress {
                window: Handle(e.event),
                keycode: u32::from(e.detail),
                state: mods(e.state),
                root: point(e.root_x, e.root_y),
                time: Timestamp(e.time),
            },
            XEvent::KeyRelease(e) => Event::KeyRelease {
                window: Handle(e.event),
                keycode: u32::from(e.detail),
                state: mods(e.state),
                root: point(e.root_x, e.root_y),
                time: Timestamp(e.time),
            },
            XEvent::MotionNotify(e) => Event::Motion {
                window: Handle(e.event),
                root: point(e.root_x, e.root_y),
                state: mods(e.state),
                time: Timestamp(e.time),
            },
            XEvent::EnterNotify(e) => Event::Enter {
                window: Handle(e.event),
                root: point(e.root_x, e.root_y),
                state: mods(e.state),
                grab: e.mode == NotifyMode::GRAB || e.mode == NotifyMode::UNGRAB,
            },
            XEvent::LeaveNotify(e) => Event::Leave {
                window: Handle(e.event),
                root: point(e.root_x, e.root_y),
                state: mods(e.state),
                grab: e.mode == NotifyMode::GRAB || e.mode == NotifyMode::UNGRAB,
            },
            XEvent::Expose(e) => Event::Expose {
                window: Handle(e.window),
                count: u32::from(e.count),
            },
            XEvent::PropertyNotify(e) => {
                let a = &self.atoms;
                let property = if e.atom == u32::from(AtomEnum::WM_NAME) || e.atom == a._NET_WM_NAME {
                    Property::Name
                } else if e.atom == a._NET_WM_STRUT || e.atom == a._NET_WM_STRUT_PARTIAL {
                    Property::Strut
                } else if e.atom == u32::from(AtomEnum::WM_NORMAL_HINTS) {
                    Property::NormalHints
                } else {
                    Property::Other
                };
                Event::PropertyChange {
                    window: Handle(e.window),
                    property,
                    deleted: e.state == xproto::Property::DELETE,
                }
            },
            XEvent::MapRequest(e) => Event::MapRequest {
                parent: Handle(e.parent),
                window: Handle(e.window),
            },
            XEvent::UnmapNotify(e) => Event::Unmap {
                event: Handle(e.event),
                window: Handle(e.window),
            },
            XEvent::DestroyNotify(e) => Event::Destroy {
                window: Handle(e.window),
            },
            XEvent::ConfigureRequest(e) => Event::ConfigureRequest(ConfigureRequest {
                window: Handle(e.window),
                x: i32::from(e.x),
                y: i32::from(e.y),
                width: i32::from(e.width),
                height: i32::from(e.height),
                border_width: i32::from(e.border_width),
                sibling: Handle(e.sibling),
                stack_mode: match e.stack_mode {
                    xproto::StackMode::BELOW => StackMode::Below,
                    xproto::StackMode::TOP_IF => StackMode::TopIf,
                    xproto::StackMode::BOTTOM_IF => StackMode::BottomIf,
                    xproto::StackMode::OPPOSITE => StackMode::Opposite,
                    _ => StackMode::Above,
                },
                mask: ConfigureMask::from_bits_truncate(u16::from(e.value_mask)),
            }),
            XEvent::ClientMessage(e) => Event::ClientMessage {
                window: Handle(e.window),
                message: self.client_message(&e)?,
            },
            XEvent::ColormapNotify(e) if e.new => Event::ColormapChange {
                window: Handle(e.window),
                colormap: e.colormap,
            },
            XEvent::FocusIn(e) if e.detail != NotifyDetail::POINTER => Event::FocusIn {
                window: Handle(e.event),
            },
            XEvent::FocusOut(e) => Event::FocusOut {
                window: Handle(e.event),
            },
            XEvent::ShapeNotify(e) => Event::ShapeChange {
                window: Handle(e.affected_window),
            },
            XEvent::RandrScreenChangeNotify(e) => Event::ScreenChange {
                root: Handle(e.root),
                width: i32::from(e.width),
                height: i32::from(e.height),
            },
            XEvent::Error(e) => {
                debug!("X error: {:?}", e);
                return None;
            },
            other => {
                trace!("Ignoring {:?}", other);
                return None;
            },
        };
        Some(event)
    }

    /// Read every event already waiting, decoded, without blocking.
    fn drain_pending(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(Some(raw)) = self.conn.poll_for_event() {
            if let Some(event) = self.decode(raw) {
                events.push(event);
            }
        }
        events
    }
}

impl EventSource for X11Backend {
    fn next_event(&mut self, timeout: Option<Duration>) -> Fetched {
        if let Some(event) = self.queue.pop_front() {
            self.track_time(&event);
            return Fetched::Event(event);
        }
        if let Err(e) = self.conn.flush() {
            info!("X connection lost: {}", e);
            return Fetched::Disconnected;
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let polled = match deadline {
                None => self.conn.wait_for_event().map(Some),
                Some(_) => self.conn.poll_for_event(),
            };
            match polled {
                Ok(Some(raw)) => {
                    if let Some(event) = self.decode(raw) {
                        self.track_time(&event);
                        return Fetched::Event(event);
                    }
                },
                Ok(None) => {
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        return Fetched::TimedOut;
                    }
                    std::thread::sleep(POLL_INTERVAL);
                },
                Err(e) => {
                    info!("X connection lost: {}", e);
                    return Fetched::Disconnected;
                },
            }
        }
    }

    fn coalesce_motion(&mut self, window: Handle) -> Option<Event> {
        let mut newest = None;
        for event in self.drain_pending() {
            match event {
                Event::Motion { window: w, .. } if w == window => newest = Some(event),
                other => self.queue.push_back(other),
            }
        }
        if let Some(event) = &newest {
            self.track_time(event);
        }
        newest
    }

    fn compress_expose(&mut self, window: Handle) {
        for event in self.drain_pending() {
            if !matches!(event, Event::Expose { window: w, .. } if w == window) {
                self.queue.push_back(event);
            }
        }
    }

    fn now(&self) -> Timestamp {
        self.time
    }
}

impl Display for X11Backend {
    fn grab_server(&mut self) {
        logged(self.conn.grab_server(), "Grabbing the server");
    }

    fn ungrab_server(&mut self) {
        logged(self.conn.ungrab_server(), "Ungrabbing the server");
        logged(self.conn.flush(), "Flushing");
    }

    fn validate(&mut self, window: Handle) -> bool {
        let reply: Result<_, ReplyError> = self
            .conn
            .get_window_attributes(window.0)
            .map_err(ReplyError::from)
            .and_then(|c| c.reply());
        reply.is_ok()
    }

    fn grab_pointer(&mut self, window: Handle) -> bool {
        let mask = EventMask::BUTTON_PRESS
            | EventMask::BUTTON_RELEASE
            | EventMask::POINTER_MOTION
            | EventMask::ENTER_WINDOW
            | EventMask::LEAVE_WINDOW;
        let reply = self
            .conn
            .grab_pointer(
                false,
                window.0,
                mask,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                NONE,
                NONE,
                CURRENT_TIME,
            )
            .map_err(ReplyError::from)
            .and_then(|c| c.reply());
        matches!(reply, Ok(r) if r.status == GrabStatus::SUCCESS)
    }

    fn ungrab_pointer(&mut self) {
        logged(self.conn.ungrab_pointer(CURRENT_TIME), "Ungrabbing the pointer");
    }

    fn grab_keyboard(&mut self, window: Handle) -> bool {
        let reply = self
            .conn
            .grab_keyboard(false, window.0, CURRENT_TIME, GrabMode::ASYNC, GrabMode::ASYNC)
            .map_err(ReplyError::from)
            .and_then(|c| c.reply());
        matches!(reply, Ok(r) if r.status == GrabStatus::SUCCESS)
    }

    fn ungrab_keyboard(&mut self) {
        logged(self.conn.ungrab_keyboard(CURRENT_TIME), "Ungrabbing the keyboard");
    }

    fn query_pointer(&mut self, root: Handle) -> PointerState {
        let reply = self
            .conn
            .query_pointer(root.0)
            .map_err(ReplyError::from)
            .and_then(|c| c.reply());
        match reply {
            Ok(r) => PointerState {
                root: point(r.root_x, r.root_y),
                state: Modifiers::from_bits_truncate(u16::from(r.mask)),
            },
            Err(e) => {
                debug!("Pointer query failed: {}", e);
                PointerState::default()
            },
        }
    }

    fn warp_pointer(&mut self, dx: i32, dy: i32) {
        logged(
            self.conn
                .warp_pointer(NONE, NONE, 0, 0, 0, 0, to_i16(dx), to_i16(dy)),
            "Warping the pointer",
        );
    }

    fn restack(&mut self, order: &[Handle]) {
        let mut above = None;
        for window in order.iter().filter(|h| !h.is_none()) {
            let aux = match above {
                None => ConfigureWindowAux::new().stack_mode(xproto::StackMode::ABOVE),
                Some(sibling) => ConfigureWindowAux::new()
                    .sibling(sibling)
                    .stack_mode(xproto::StackMode::BELOW),
            };
            logged(self.conn.configure_window(window.0, &aux), "Restacking");
            above = Some(window.0);
        }
    }

    fn create_frame(&mut self, window: &ManagedWindow) -> FrameParts {
        let frame = self.new_id();
        let g = window.frame;
        let aux = CreateWindowAux::new()
            .background_pixel(color::BORDER)
            .border_pixel(color::BORDER)
            .override_redirect(1)
            .event_mask(
                EventMask::SUBSTRUCTURE_REDIRECT
                    | EventMask::SUBSTRUCTURE_NOTIFY
                    | EventMask::ENTER_WINDOW
                    | EventMask::LEAVE_WINDOW,
            );
        logged(
            self.conn.create_window(
                x11rb::COPY_DEPTH_FROM_PARENT,
                frame,
                self.root,
                to_i16(g.x),
                to_i16(g.y),
                to_u16(g.width),
                to_u16(g.height),
                window.decor().border_w.max(0) as u16,
                WindowClass::INPUT_OUTPUT,
                x11rb::COPY_FROM_PARENT,
                &aux,
            ),
            "Creating a frame",
        );

        let title = self.create_part(frame, WindowClass::INPUT_OUTPUT, color::TITLE);
        let mut parts = FrameParts {
            frame: Handle(frame),
            title,
            label: self.create_part(title.0, WindowClass::INPUT_OUTPUT, color::TITLE),
            handle: self.create_part(frame, WindowClass::INPUT_OUTPUT, color::HANDLE),
            left_grip: self.create_part(frame, WindowClass::INPUT_OUTPUT, color::GRIP),
            right_grip: self.create_part(frame, WindowClass::INPUT_OUTPUT, color::GRIP),
            buttons: Vec::new(),
        };
        for _ in 0..window.style.buttons {
            parts
                .buttons
                .push(self.create_part(title.0, WindowClass::INPUT_OUTPUT, color::BUTTON));
        }

        let client = window.client.0;
        let layout = part_layout(window);
        logged(self.conn.change_save_set(SetMode::INSERT, client), "Adding to the save set");
        logged(
            self.conn.configure_window(client, &ConfigureWindowAux::new().border_width(0)),
            "Clearing the client border",
        );
        logged(
            self.conn
                .reparent_window(client, frame, 0, to_i16(layout.client.y)),
            "Reparenting",
        );
        let mask = EventMask::PROPERTY_CHANGE
            | EventMask::STRUCTURE_NOTIFY
            | EventMask::FOCUS_CHANGE
            | EventMask::COLOR_MAP_CHANGE
            | EventMask::ENTER_WINDOW
            | EventMask::LEAVE_WINDOW;
        logged(
            self.conn
                .change_window_attributes(client, &ChangeWindowAttributesAux::new().event_mask(mask)),
            "Selecting client events",
        );
        if self.has_shape {
            logged(self.conn.shape_select_input(client, true), "Selecting shape events");
        }
        debug!("Framed 0x{:x} in 0x{:x}", client, frame);
        parts
    }

    fn destroy_frame(&mut self, parts: &FrameParts, client: Handle, restore: Geometry) {
        if !client.is_none() {
            logged(
                self.conn.reparent_window(
                    client.0,
                    self.root,
                    to_i16(restore.x),
                    to_i16(restore.y),
                ),
                "Reparenting back to the root",
            );
            logged(
                self.conn.change_save_set(SetMode::DELETE, client.0),
                "Leaving the save set",
            );
        }
        logged(self.conn.destroy_window(parts.frame.0), "Destroying a frame");
    }

    fn create_edge(&mut self, _screen: ScreenId, geometry: Geometry) -> Handle {
        let id = self.new_id();
        let aux = CreateWindowAux::new().override_redirect(1).event_mask(
            EventMask::ENTER_WINDOW
                | EventMask::LEAVE_WINDOW
                | EventMask::BUTTON_PRESS
                | EventMask::BUTTON_RELEASE,
        );
        logged(
            self.conn.create_window(
                0,
                id,
                self.root,
                to_i16(geometry.x),
                to_i16(geometry.y),
                to_u16(geometry.width),
                to_u16(geometry.height),
                0,
                WindowClass::INPUT_ONLY,
                x11rb::COPY_FROM_PARENT,
                &aux,
            ),
            "Creating a screen edge",
        );
        // Drag-and-drop sources may scroll the viewport through the edges
        self.set_cardinals(Handle(id), self.atoms.XdndAware, AtomEnum::ATOM, &[5]);
        logged(self.conn.map_window(id), "Mapping a screen edge");
        Handle(id)
    }

    fn create_outline(&mut self, _screen: ScreenId) -> [Handle; 4] {
        let aux = CreateWindowAux::new()
            .background_pixel(color::OUTLINE)
            .override_redirect(1)
            .save_under(1);
        [(); 4].map(|()| {
            let id = self.new_id();
            logged(
                self.conn.create_window(
                    x11rb::COPY_DEPTH_FROM_PARENT,
                    id,
                    self.root,
                    0,
                    0,
                    1,
                    1,
                    0,
                    WindowClass::INPUT_OUTPUT,
                    x11rb::COPY_FROM_PARENT,
                    &aux,
                ),
                "Creating an outline strip",
            );
            Handle(id)
        })
    }

    fn place_outline(&mut self, outline: &[Handle; 4], strips: &[Geometry; 4]) {
        for (window, g) in outline.iter().zip(strips) {
            self.place(*window, Some(*g));
            logged(
                self.conn.configure_window(
                    window.0,
                    &ConfigureWindowAux::new().stack_mode(xproto::StackMode::ABOVE),
                ),
                "Raising an outline strip",
            );
        }
    }

    fn destroy_outline(&mut self, outline: &[Handle; 4]) {
        for window in outline {
            logged(self.conn.destroy_window(window.0), "Destroying an outline strip");
        }
    }

    fn configure_frame(&mut self, window: &ManagedWindow) {
        let g = window.frame;
        let aux = ConfigureWindowAux::new()
            .x(g.x)
            .y(g.y)
            .width(u32::from(to_u16(g.width)))
            .height(u32::from(to_u16(g.height)))
            .border_width(window.decor().border_w.max(0) as u32);
        logged(self.conn.configure_window(window.parts.frame.0, &aux), "Configuring a frame");

        let layout = part_layout(window);
        let c = layout.client;
        logged(
            self.conn.configure_window(
                window.client.0,
                &ConfigureWindowAux::new()
                    .x(c.x)
                    .y(c.y)
                    .width(u32::from(to_u16(c.width)))
                    .height(u32::from(to_u16(c.height))),
            ),
            "Configuring a client",
        );
        let p = &window.parts;
        self.place(p.title, layout.title);
        self.place(p.label, layout.label);
        self.place(p.handle, layout.handle);
        self.place(p.left_grip, layout.left_grip);
        self.place(p.right_grip, layout.right_grip);
        for (i, button) in p.buttons.iter().enumerate() {
            let g = layout
                .buttons
                .map(|(size, left)| Geometry::new(left + i as i32 * (size + 2), 2, size, size));
            self.place(*button, g);
        }
    }

    fn configure_window(&mut self, request: &ConfigureRequest) {
        let m = request.mask;
        let mut aux = ConfigureWindowAux::new();
        if m.contains(ConfigureMask::X) {
            aux = aux.x(request.x);
        }
        if m.contains(ConfigureMask::Y) {
            aux = aux.y(request.y);
        }
        if m.contains(ConfigureMask::WIDTH) {
            aux = aux.width(u32::from(to_u16(request.width)));
        }
        if m.contains(ConfigureMask::HEIGHT) {
            aux = aux.height(u32::from(to_u16(request.height)));
        }
        if m.contains(ConfigureMask::BORDER_WIDTH) {
            aux = aux.border_width(request.border_width.max(0) as u32);
        }
        if m.contains(ConfigureMask::SIBLING) {
            aux = aux.sibling(request.sibling.0);
        }
        if m.contains(ConfigureMask::STACK_MODE) {
            aux = aux.stack_mode(match request.stack_mode {
                StackMode::Above => xproto::StackMode::ABOVE,
                StackMode::Below => xproto::StackMode::BELOW,
                StackMode::TopIf => xproto::StackMode::TOP_IF,
                StackMode::BottomIf => xproto::StackMode::BOTTOM_IF,
                StackMode::Opposite => xproto::StackMode::OPPOSITE,
            });
        }
        logged(self.conn.configure_window(request.window.0, &aux), "Passing a configure request");
    }

    fn move_resize(&mut self, window: Handle, g: Geometry) {
        let aux = ConfigureWindowAux::new()
            .x(g.x)
            .y(g.y)
            .width(u32::from(to_u16(g.width)))
            .height(u32::from(to_u16(g.height)));
        logged(self.conn.configure_window(window.0, &aux), "Moving a window");
    }

    fn send_configure_notify(&mut self, client: Handle, frame: Handle, g: Geometry) {
        let event = ConfigureNotifyEvent {
            response_type: xproto::CONFIGURE_NOTIFY_EVENT,
            sequence: 0,
            event: client.0,
            window: client.0,
            above_sibling: frame.0,
            x: to_i16(g.x),
            y: to_i16(g.y),
            width: to_u16(g.width),
            height: to_u16(g.height),
            border_width: 0,
            override_redirect: false,
        };
        logged(
            self.conn
                .send_event(false, client.0, EventMask::STRUCTURE_NOTIFY, event),
            "Sending a configure notify",
        );
    }

    fn map(&mut self, window: Handle) {
        logged(self.conn.map_window(window.0), "Mapping");
    }

    fn unmap(&mut self, window: Handle) {
        logged(self.conn.unmap_window(window.0), "Unmapping");
    }

    fn set_input_focus(&mut self, window: Handle) {
        logged(
            self.conn
                .set_input_focus(InputFocus::POINTER_ROOT, window.0, CURRENT_TIME),
            "Setting input focus",
        );
    }

    fn install_colormap(&mut self, colormap: u32) {
        if colormap != NONE {
            logged(self.conn.install_colormap(colormap), "Installing a colormap");
        }
    }

    fn allow_events(&mut self, replay: bool, keyboard: bool, time: Timestamp) {
        let mode = match (keyboard, replay) {
            (false, true) => Allow::REPLAY_POINTER,
            (false, false) => Allow::ASYNC_POINTER,
            (true, true) => Allow::REPLAY_KEYBOARD,
            (true, false) => Allow::ASYNC_KEYBOARD,
        };
        logged(self.conn.allow_events(mode, time.0), "Releasing frozen events");
    }

    fn supports_delete(&mut self, client: Handle) -> bool {
        self.cardinals(client.0, self.atoms.WM_PROTOCOLS, AtomEnum::ATOM)
            .is_some_and(|protocols| protocols.contains(&self.atoms.WM_DELETE_WINDOW))
    }

    fn close(&mut self, client: Handle) {
        let data = [self.atoms.WM_DELETE_WINDOW, self.time.0, 0, 0, 0];
        let event = ClientMessageEvent::new(32, client.0, self.atoms.WM_PROTOCOLS, data);
        logged(
            self.conn
                .send_event(false, client.0, EventMask::NO_EVENT, event),
            "Sending delete-window",
        );
    }

    fn kill(&mut self, client: Handle) {
        logged(self.conn.kill_client(client.0), "Killing a client");
    }

    fn spawn(&mut self, command: &str) {
        match Command::new("/bin/sh").arg("-c").arg(command).spawn() {
            Ok(child) => debug!("Spawned `{}` as {}", command, child.id()),
            Err(e) => warn!("Failed to run `{}`: {}", command, e),
        }
    }

    fn update_grabs(&mut self, client: Handle, bindings: &[ActionBinding]) {
        let w = client.0;
        logged(
            self.conn.ungrab_button(ButtonIndex::ANY, w, ModMask::ANY),
            "Releasing button grabs",
        );
        logged(
            self.conn.ungrab_key(xproto::Grab::ANY, w, ModMask::ANY),
            "Releasing key grabs",
        );
        // Lock and NumLock must not defeat a grab
        let ignored = [
            Modifiers::empty(),
            Modifiers::LOCK,
            Modifiers::MOD2,
            Modifiers::LOCK | Modifiers::MOD2,
        ];
        for b in bindings {
            // Session-only bindings never need a passive grab
            if b.required.contains(Modifiers::MOVE_RESIZE) {
                continue;
            }
            let base = b.required;
            for extra in ignored {
                let mods = ModMask::from(u16::from((base | extra).bits() & 0xff));
                match b.kind {
                    ActionKind::ButtonPress | ActionKind::ButtonRelease | ActionKind::DoubleClick => {
                        let button = if b.detail == 0 {
                            ButtonIndex::ANY
                        } else {
                            ButtonIndex::from(b.detail as u8)
                        };
                        logged(
                            self.conn.grab_button(
                                false,
                                w,
                                EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE,
                                GrabMode::SYNC,
                                GrabMode::ASYNC,
                                NONE,
                                NONE,
                                button,
                                mods,
                            ),
                            "Grabbing a button",
                        );
                    },
                    ActionKind::KeyPress | ActionKind::KeyRelease => {
                        let key = if b.detail == 0 { 0 } else { b.detail as u8 };
                        logged(
                            self.conn
                                .grab_key(true, w, mods, key, GrabMode::ASYNC, GrabMode::SYNC),
                            "Grabbing a key",
                        );
                    },
                    _ => {},
                }
            }
        }
    }
}

impl Hints for X11Backend {
    fn read_attributes(&mut self, client: Handle) -> Option<ClientAttributes> {
        let attrs = self.conn.get_window_attributes(client.0).ok()?.reply().ok()?;
        let g = self.conn.get_geometry(client.0).ok()?.reply().ok()?;
        Some(ClientAttributes {
            geometry: Geometry::new(
                i32::from(g.x),
                i32::from(g.y),
                i32::from(g.width),
                i32::from(g.height),
            ),
            border_width: i32::from(g.border_width),
            override_redirect: attrs.override_redirect,
            colormap: attrs.colormap,
            viewable: attrs.map_state == MapState::VIEWABLE,
        })
    }

    fn read_names(&mut self, client: Handle) -> ClientNames {
        let w = client.0;
        let class = self
            .text(w, AtomEnum::WM_CLASS.into(), AtomEnum::STRING)
            .unwrap_or_default();
        let mut parts = class.split('\0');
        let name = parts.next().unwrap_or_default().to_string();
        let class = parts.next().unwrap_or_default().to_string();
        let title = self
            .text(w, self.atoms._NET_WM_NAME, self.atoms.UTF8_STRING)
            .or_else(|| self.text(w, AtomEnum::WM_NAME.into(), AtomEnum::ANY))
            .unwrap_or_default();
        ClientNames { class, name, title }
    }

    fn read_normal_hints(&mut self, client: Handle) -> Option<SizeHints> {
        let v = self.cardinals(
            client.0,
            AtomEnum::WM_NORMAL_HINTS.into(),
            AtomEnum::WM_SIZE_HINTS,
        )?;
        parse_normal_hints(&v)
    }

    fn read_initial_state(&mut self, client: Handle) -> Option<WmState> {
        const STATE_HINT: u32 = 1 << 1;
        let v = self.cardinals(client.0, AtomEnum::WM_HINTS.into(), AtomEnum::WM_HINTS)?;
        if v.len() < 3 || v[0] & STATE_HINT == 0 {
            return None;
        }
        wm_state_from_raw(v[2])
    }

    fn read_transient_for(&mut self, client: Handle) -> Option<Handle> {
        let v = self.cardinals(
            client.0,
            AtomEnum::WM_TRANSIENT_FOR.into(),
            AtomEnum::WINDOW,
        )?;
        v.first().filter(|w| **w != NONE).map(|w| Handle(*w))
    }

    fn read_strut(&mut self, client: Handle) -> Option<Strut> {
        let v = self
            .cardinals(client.0, self.atoms._NET_WM_STRUT_PARTIAL, AtomEnum::CARDINAL)
            .or_else(|| self.cardinals(client.0, self.atoms._NET_WM_STRUT, AtomEnum::CARDINAL))?;
        (v.len() >= 4).then(|| Strut {
            left: v[0] as i32,
            right: v[1] as i32,
            top: v[2] as i32,
            bottom: v[3] as i32,
        })
    }

    fn read_desktop_mask(&mut self, client: Handle) -> Option<DesktopMask> {
        if let Some(v) = self.cardinals(client.0, self.atoms._DRIFTWM_DESKTOP_MASK, AtomEnum::CARDINAL) {
            return Some(DesktopMask(v[0]));
        }
        let v = self.cardinals(client.0, self.atoms._NET_WM_DESKTOP, AtomEnum::CARDINAL)?;
        Some(match v[0] {
            DesktopMask::ALL_WIRE => DesktopMask::ALL,
            n if n < DesktopMask::MAX_DESKTOPS => DesktopMask::single(n),
            _ => return None,
        })
    }

    fn read_net_state(&mut self, client: Handle) -> NetStates {
        let mut states = NetStates::empty();
        let Some(atoms) = self.cardinals(client.0, self.atoms._NET_WM_STATE, AtomEnum::ATOM) else {
            return states;
        };
        for state in atoms.into_iter().filter_map(|a| self.net_state_atom(a)) {
            states |= match state {
                NetState::Sticky => NetStates::STICKY,
                NetState::Shaded => NetStates::SHADED,
                NetState::Hidden => NetStates::HIDDEN,
                NetState::MaximizedVert | NetState::MaximizedHorz => NetStates::MAXIMIZED,
                NetState::Above => NetStates::ABOVE,
                NetState::Below => NetStates::BELOW,
                NetState::Fullscreen => NetStates::FULLSCREEN,
                NetState::Decor => {
                    NetStates::DECOR_TITLE | NetStates::DECOR_HANDLE | NetStates::DECOR_BORDER
                },
                NetState::DecorTitle => NetStates::DECOR_TITLE,
                NetState::DecorHandle => NetStates::DECOR_HANDLE,
                NetState::DecorBorder => NetStates::DECOR_BORDER,
            };
        }
        states
    }

    fn read_virtual_pos(&mut self, client: Handle) -> Option<Point> {
        let v = self.cardinals(client.0, self.atoms._NET_VIRTUAL_POS, AtomEnum::CARDINAL)?;
        (v.len() >= 2).then(|| Point::new(v[0] as i32, v[1] as i32))
    }

    fn set_wm_state(&mut self, client: Handle, state: WmState) {
        let atom = self.atoms.WM_STATE;
        self.set_cardinals(client, atom, atom, &[wm_state_to_raw(state), NONE]);
    }

    fn set_virtual_pos(&mut self, client: Handle, x: i32, y: i32) {
        self.set_cardinals(
            client,
            self.atoms._NET_VIRTUAL_POS,
            AtomEnum::CARDINAL,
            &[x as u32, y as u32],
        );
    }

    fn set_desktop(&mut self, client: Handle, mask: DesktopMask) {
        self.set_cardinals(
            client,
            self.atoms._NET_WM_DESKTOP,
            AtomEnum::CARDINAL,
            &[mask.wire_desktop()],
        );
        self.set_cardinals(
            client,
            self.atoms._DRIFTWM_DESKTOP_MASK,
            AtomEnum::CARDINAL,
            &[mask.0],
        );
    }

    fn set_net_state(&mut self, client: Handle, state: NetStates) {
        let a = &self.atoms;
        let table = [
            (NetStates::STICKY, a._NET_WM_STATE_STICKY),
            (NetStates::SHADED, a._NET_WM_STATE_SHADED),
            (NetStates::HIDDEN, a._NET_WM_STATE_HIDDEN),
            (NetStates::MAXIMIZED, a._NET_WM_STATE_MAXIMIZED_VERT),
            (NetStates::MAXIMIZED, a._NET_WM_STATE_MAXIMIZED_HORZ),
            (NetStates::ABOVE, a._NET_WM_STATE_ABOVE),
            (NetStates::BELOW, a._NET_WM_STATE_BELOW),
            (NetStates::FULLSCREEN, a._NET_WM_STATE_FULLSCREEN),
            (NetStates::DECOR_TITLE, a._DRIFTWM_STATE_DECOR_TITLE),
            (NetStates::DECOR_HANDLE, a._DRIFTWM_STATE_DECOR_HANDLE),
            (NetStates::DECOR_BORDER, a._DRIFTWM_STATE_DECOR_BORDER),
        ];
        let atoms: Vec<u32> = table
            .iter()
            .filter(|(flag, _)| state.contains(*flag))
            .map(|(_, atom)| *atom)
            .collect();
        self.set_cardinals(client, a._NET_WM_STATE, AtomEnum::ATOM, &atoms);
    }

    fn set_client_list(&mut self, root: Handle, clients: &[Handle]) {
        let ids: Vec<u32> = clients.iter().map(|h| h.0).collect();
        self.set_cardinals(root, self.atoms._NET_CLIENT_LIST, AtomEnum::WINDOW, &ids);
    }

    fn set_client_list_stacking(&mut self, root: Handle, clients: &[Handle]) {
        let ids: Vec<u32> = clients.iter().map(|h| h.0).collect();
        self.set_cardinals(root, self.atoms._NET_CLIENT_LIST_STACKING, AtomEnum::WINDOW, &ids);
    }

    fn set_workarea(&mut self, root: Handle, areas: &[Geometry]) {
        let values: Vec<u32> = areas
            .iter()
            .flat_map(|g| [g.x as u32, g.y as u32, g.width as u32, g.height as u32])
            .collect();
        self.set_cardinals(root, self.atoms._NET_WORKAREA, AtomEnum::CARDINAL, &values);
    }

    fn set_viewport(&mut self, root: Handle, x: i32, y: i32) {
        self.set_cardinals(
            root,
            self.atoms._NET_DESKTOP_VIEWPORT,
            AtomEnum::CARDINAL,
            &[x as u32, y as u32],
        );
    }

    fn set_current_desktop(&mut self, root: Handle, desktop: u32) {
        self.set_cardinals(root, self.atoms._NET_CURRENT_DESKTOP, AtomEnum::CARDINAL, &[desktop]);
    }

    fn set_active_window(&mut self, root: Handle, client: Option<Handle>) {
        let id = client.map_or(NONE, |h| h.0);
        self.set_cardinals(root, self.atoms._NET_ACTIVE_WINDOW, AtomEnum::WINDOW, &[id]);
    }
}

impl Decorator for X11Backend {
    fn redraw_titlebar(&mut self, window: &ManagedWindow) {
        self.paint_title(window, window.flags.contains(WindowFlags::FOCUSED));
    }

    fn redraw_handlebar(&mut self, window: &ManagedWindow) {
        self.paint_handle(window);
    }

    fn focus_changed(&mut self, window: &ManagedWindow, focused: bool) {
        self.paint_title(window, focused);
    }

    fn button_pressed(&mut self, window: &ManagedWindow, button: Handle) {
        if let Some((size, _)) = part_layout(window).buttons {
            self.fill(button, color::BUTTON_PRESSED, Some(Geometry::new(0, 0, size, size)));
        }
    }
}

impl Furniture for X11Backend {
    fn relayout_docks(&mut self, _screen: ScreenId, docks: &[DockApp]) {
        let mut y = 0;
        for dock in docks {
            let aux = ConfigureWindowAux::new()
                .x(self.width - dock.width)
                .y(y)
                .width(u32::from(to_u16(dock.width)))
                .height(u32::from(to_u16(dock.height)));
            logged(self.conn.configure_window(dock.client.0, &aux), "Placing a dock app");
            logged(self.conn.map_window(dock.client.0), "Mapping a dock app");
            y += dock.height;
        }
        self.docks = docks.iter().map(|d| d.client).collect();
    }

    fn set_docks_visible(&mut self, _screen: ScreenId, visible: bool) {
        for dock in &self.docks {
            if visible {
                logged(self.conn.map_window(dock.0), "Showing a dock app");
            } else {
                logged(self.conn.unmap_window(dock.0), "Hiding a dock app");
            }
        }
    }

    fn shift_menus(&mut self, _screen: ScreenId, dx: i32, dy: i32) {
        trace!("No menus to shift by ({}, {})", dx, dy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftwm_core::window::WindowId;
    use pretty_assertions::assert_eq;

    fn window(width: i32, height: i32) -> ManagedWindow {
        let mut w = ManagedWindow::new(WindowId(1), Handle(10), 0, Geometry::new(50, 50, width, height));
        w.frame = w.decor().frame_around(w.geometry);
        w
    }

    #[test]
    fn test_layout_stacks_title_client_handle() {
        let w = window(300, 200);
        let layout = part_layout(&w);
        // title 20, border 1, handle 6
        assert_eq!(layout.title, Some(Geometry::new(0, 0, 300, 20)));
        assert_eq!(layout.client, Geometry::new(0, 21, 300, 200));
        assert_eq!(layout.left_grip, Some(Geometry::new(0, 222, 25, 6)));
        assert_eq!(layout.handle, Some(Geometry::new(25, 222, 250, 6)));
        assert_eq!(layout.right_grip, Some(Geometry::new(275, 222, 25, 6)));
        let (size, left) = layout.buttons.unwrap();
        assert_eq!(size, 16);
        assert_eq!(left + 3 * (size + 2) + 2, 300);
    }

    #[test]
    fn test_layout_without_decorations() {
        let mut w = window(300, 200);
        w.decor_flags = driftwm_core::window::DecorFlags::empty();
        w.frame = w.decor().frame_around(w.geometry);
        let layout = part_layout(&w);
        assert_eq!(layout.client, Geometry::new(0, 0, 300, 200));
        assert_eq!(layout.title, None);
        assert_eq!(layout.handle, None);
        assert_eq!(layout.buttons, None);
    }

    #[test]
    fn test_moveresize_flags() {
        let (gravity, mask) = moveresize_flags(9 | 1 << 8 | 1 << 11);
        assert_eq!(gravity, Some(Gravity::SouthEast));
        assert_eq!(mask, ConfigureMask::X | ConfigureMask::HEIGHT);
        assert_eq!(moveresize_flags(0), (None, ConfigureMask::empty()));
    }

    #[test]
    fn test_normal_hints_parsing() {
        let mut v = vec![0u32; 18];
        v[0] = (1 << 4) | (1 << 6) | (1 << 9);
        v[5] = 100;
        v[6] = 50;
        v[9] = 10;
        v[10] = 20;
        v[17] = 3;
        let hints = parse_normal_hints(&v).unwrap();
        assert_eq!((hints.min_width, hints.min_height), (100, 50));
        assert_eq!((hints.width_inc, hints.height_inc), (10, 20));
        // No base size: the minimum stands in
        assert_eq!((hints.base_width, hints.base_height), (100, 50));
        assert_eq!(hints.gravity, Gravity::NorthEast);
        assert_eq!(hints.max_width, SizeHints::default().max_width);

        assert_eq!(parse_normal_hints(&v[..4]), None);
    }

    #[test]
    fn test_protocol_enums() {
        assert_eq!(wm_state_from_raw(3), Some(WmState::Iconic));
        assert_eq!(wm_state_from_raw(2), None);
        assert_eq!(wm_state_to_raw(WmState::Normal), 1);
        assert_eq!(state_action(2), Some(StateAction::Toggle));
        assert_eq!(state_action(7), None);
        assert_eq!(moveresize_direction(8), Some(MoveResizeDirection::Move));
        assert_eq!(moveresize_direction(11), None);
    }
}
