//! Collaborator traits the core drives.
//!
//! A backend is one value implementing all five traits: the display
//! connection, the event source, the hint encoder, the decoration renderer
//! and the furniture (docks and menus) layer. The core never talks to the
//! display server any other way.

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use bitflags::bitflags;
use tracing::debug;

use crate::desktop::DesktopMask;
use crate::event::{ConfigureRequest, Event, Point, Timestamp, WmState};
use crate::geometry::Geometry;
use crate::input::{ActionBinding, Modifiers};
use crate::registry::{Handle, ScreenId};
use crate::screen::{DockApp, Strut};
use crate::window::{FrameParts, ManagedWindow, SizeHints};

/// Result of waiting for an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Event(Event),
    TimedOut,
    /// The connection is gone; the outer loop ends.
    Disconnected,
}

pub trait EventSource {
    /// Block for the next event, at most `timeout` when given.
    fn next_event(&mut self, timeout: Option<Duration>) -> Fetched;

    /// Drop queued motion events for `window` and return the newest one.
    fn coalesce_motion(&mut self, _window: Handle) -> Option<Event> {
        None
    }

    /// Drop queued expose events for `window`.
    fn compress_expose(&mut self, _window: Handle) {}

    /// Current server time.
    fn now(&self) -> Timestamp;
}

/// Pointer position and button/modifier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PointerState {
    pub root: Point,
    pub state: Modifiers,
}

/// Attributes read from a client at manage time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientAttributes {
    pub geometry: Geometry,
    pub border_width: i32,
    pub override_redirect: bool,
    pub colormap: u32,
    pub viewable: bool,
}

/// Identity strings of a client.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientNames {
    pub class: String,
    pub name: String,
    pub title: String,
}

bitflags! {
    /// Window state as published to, or read from, the state hint.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NetStates: u16 {
        const STICKY       = 1 << 0;
        const SHADED       = 1 << 1;
        const HIDDEN       = 1 << 2;
        const MAXIMIZED    = 1 << 3;
        const ABOVE        = 1 << 4;
        const BELOW        = 1 << 5;
        const FULLSCREEN   = 1 << 6;
        const DECOR_TITLE  = 1 << 7;
        const DECOR_HANDLE = 1 << 8;
        const DECOR_BORDER = 1 << 9;
    }
}

impl NetStates {
    pub fn of(window: &ManagedWindow) -> Self {
        use crate::window::{DecorFlags, Layer, WindowFlags};

        let mut s = Self::empty();
        s.set(Self::STICKY, window.is_sticky());
        s.set(Self::SHADED, window.is_shaded());
        s.set(Self::HIDDEN, window.is_minimized());
        s.set(Self::MAXIMIZED, window.is_maximized());
        s.set(Self::ABOVE, window.layer == Layer::OnTop);
        s.set(Self::BELOW, window.layer == Layer::AtBottom);
        s.set(Self::FULLSCREEN, window.flags.contains(WindowFlags::FULLSCREEN));
        s.set(Self::DECOR_TITLE, window.decor_flags.contains(DecorFlags::TITLE));
        s.set(Self::DECOR_HANDLE, window.decor_flags.contains(DecorFlags::HANDLE));
        s.set(Self::DECOR_BORDER, window.decor_flags.contains(DecorFlags::BORDER));
        s
    }
}

/// Display-server requests.
pub trait Display {
    fn grab_server(&mut self);
    fn ungrab_server(&mut self);
    /// Whether `window` still exists. Only meaningful under a server grab.
    fn validate(&mut self, window: Handle) -> bool;

    fn grab_pointer(&mut self, window: Handle) -> bool;
    fn ungrab_pointer(&mut self);
    fn grab_keyboard(&mut self, window: Handle) -> bool;
    fn ungrab_keyboard(&mut self);

    fn query_pointer(&mut self, root: Handle) -> PointerState;
    /// Move the pointer relative to where it is.
    fn warp_pointer(&mut self, dx: i32, dy: i32);

    /// Restack windows top to bottom in one request.
    fn restack(&mut self, order: &[Handle]);

    /// Create a frame with its decoration parts around `window.frame` and
    /// reparent the client into it.
    fn create_frame(&mut self, window: &ManagedWindow) -> FrameParts;
    /// Reparent `client` back to the root at `restore` and destroy the
    /// frame. `client` is [`Handle::NONE`] when the client is already gone.
    fn destroy_frame(&mut self, parts: &FrameParts, client: Handle, restore: Geometry);
    fn create_edge(&mut self, screen: ScreenId, geometry: Geometry) -> Handle;

    /// Create the four unmapped outline strips.
    fn create_outline(&mut self, screen: ScreenId) -> [Handle; 4];
    fn place_outline(&mut self, outline: &[Handle; 4], strips: &[Geometry; 4]);
    fn destroy_outline(&mut self, outline: &[Handle; 4]);

    /// Push `window.frame` and the client size (the pre-shade height while
    /// shaded) to the display.
    fn configure_frame(&mut self, window: &ManagedWindow);
    /// Pass a configure request through for a window we do not manage.
    fn configure_window(&mut self, request: &ConfigureRequest);
    fn move_resize(&mut self, window: Handle, geometry: Geometry);
    /// Synthetic configure notify telling `client` where it is.
    fn send_configure_notify(&mut self, client: Handle, frame: Handle, geometry: Geometry);

    fn map(&mut self, window: Handle);
    fn unmap(&mut self, window: Handle);

    fn set_input_focus(&mut self, window: Handle);
    fn install_colormap(&mut self, colormap: u32);
    /// Release a frozen passive grab, replaying the event to the client
    /// when `replay` is set.
    fn allow_events(&mut self, replay: bool, keyboard: bool, time: Timestamp);

    /// Whether `client` takes part in the delete-window protocol.
    fn supports_delete(&mut self, client: Handle) -> bool;
    fn close(&mut self, client: Handle);
    fn kill(&mut self, client: Handle);
    fn spawn(&mut self, command: &str);

    /// Replace the passive button and key grabs on `client`.
    fn update_grabs(&mut self, client: Handle, bindings: &[ActionBinding]);
}

/// Reading and publishing window-manager hints.
pub trait Hints {
    fn read_attributes(&mut self, client: Handle) -> Option<ClientAttributes>;
    fn read_names(&mut self, client: Handle) -> ClientNames;
    fn read_normal_hints(&mut self, client: Handle) -> Option<SizeHints>;
    fn read_initial_state(&mut self, client: Handle) -> Option<WmState>;
    fn read_transient_for(&mut self, client: Handle) -> Option<Handle>;
    fn read_strut(&mut self, client: Handle) -> Option<Strut>;
    fn read_desktop_mask(&mut self, client: Handle) -> Option<DesktopMask>;
    fn read_net_state(&mut self, client: Handle) -> NetStates;
    /// Virtual position stored by a previous window manager session.
    fn read_virtual_pos(&mut self, client: Handle) -> Option<Point>;

    fn set_wm_state(&mut self, client: Handle, state: WmState);
    fn set_virtual_pos(&mut self, client: Handle, x: i32, y: i32);
    fn set_desktop(&mut self, client: Handle, mask: DesktopMask);
    fn set_net_state(&mut self, client: Handle, state: NetStates);
    fn set_client_list(&mut self, root: Handle, clients: &[Handle]);
    fn set_client_list_stacking(&mut self, root: Handle, clients: &[Handle]);
    fn set_workarea(&mut self, root: Handle, areas: &[Geometry]);
    fn set_viewport(&mut self, root: Handle, x: i32, y: i32);
    fn set_current_desktop(&mut self, root: Handle, desktop: u32);
    fn set_active_window(&mut self, root: Handle, client: Option<Handle>);
}

/// Decoration rendering.
pub trait Decorator {
    fn redraw_titlebar(&mut self, window: &ManagedWindow);
    fn redraw_handlebar(&mut self, window: &ManagedWindow);
    fn focus_changed(&mut self, window: &ManagedWindow, focused: bool);
    fn button_pressed(&mut self, window: &ManagedWindow, button: Handle);
}

/// Docks and menus.
pub trait Furniture {
    fn relayout_docks(&mut self, screen: ScreenId, docks: &[DockApp]);
    fn set_docks_visible(&mut self, screen: ScreenId, visible: bool);
    /// Shift mapped menus that are not pinned to the root.
    fn shift_menus(&mut self, screen: ScreenId, dx: i32, dy: i32);
}

/// Everything the core needs from its environment.
pub trait Backend: Display + EventSource + Hints + Decorator + Furniture {}

impl<T: Display + EventSource + Hints + Decorator + Furniture> Backend for T {}

/// Server grab held for the lifetime of the guard.
pub struct ServerGrab<'a, D: Display + ?Sized> {
    display: &'a mut D,
}

impl<'a, D: Display + ?Sized> ServerGrab<'a, D> {
    pub fn new(display: &'a mut D) -> Self {
        display.grab_server();
        Self { display }
    }
}

impl<D: Display + ?Sized> Deref for ServerGrab<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.display
    }
}

impl<D: Display + ?Sized> DerefMut for ServerGrab<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        self.display
    }
}

impl<D: Display + ?Sized> Drop for ServerGrab<'_, D> {
    fn drop(&mut self) {
        self.display.ungrab_server();
    }
}

/// Run `op` on `display` if `window` survives validation under a server
/// grab. Stale handles skip the operation.
pub fn with_valid<D, R>(display: &mut D, window: Handle, op: impl FnOnce(&mut D) -> R) -> Option<R>
where
    D: Display + ?Sized,
{
    let mut grab = ServerGrab::new(display);
    if grab.validate(window) {
        Some(op(&mut *grab))
    } else {
        debug!("Skipping request on stale window {}", window);
        None
    }
}
