//! Events the backend feeds into the core.
//!
//! The shapes follow what the display server reports, decoded into plain
//! Rust types. Hint-carrying client messages arrive already decoded into
//! [`ClientMessage`] by the backend.

use bitflags::bitflags;

use crate::geometry::Gravity;
use crate::input::Modifiers;
use crate::registry::Handle;

/// Server time in milliseconds; wraps at `u32::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Timestamp(pub u32);

impl Timestamp {
    /// Milliseconds from `earlier` to `self`, across clock wraparound.
    pub const fn since(self, earlier: Self) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    #[must_use]
    pub const fn after(self, ms: u32) -> Self {
        Self(self.0.wrapping_add(ms))
    }

    /// Whether `self` is at or past `deadline`, treating anything within
    /// half the clock range behind as past.
    pub const fn reached(self, deadline: Self) -> bool {
        self.since(deadline) < u32::MAX / 2
    }
}

/// Pointer position in root coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

bitflags! {
    /// Which fields of a configure request are set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ConfigureMask: u16 {
        const X            = 1 << 0;
        const Y            = 1 << 1;
        const WIDTH        = 1 << 2;
        const HEIGHT       = 1 << 3;
        const BORDER_WIDTH = 1 << 4;
        const SIBLING      = 1 << 5;
        const STACK_MODE   = 1 << 6;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackMode {
    Above,
    Below,
    TopIf,
    BottomIf,
    Opposite,
}

/// A client asking to be moved, resized or restacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigureRequest {
    pub window: Handle,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub border_width: i32,
    pub sibling: Handle,
    pub stack_mode: StackMode,
    pub mask: ConfigureMask,
}

/// ICCCM window states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WmState {
    Withdrawn,
    Normal,
    Iconic,
}

/// How a net-state client message changes a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateAction {
    Remove,
    Add,
    Toggle,
}

/// State properties a client can ask to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetState {
    Sticky,
    Shaded,
    Hidden,
    MaximizedVert,
    MaximizedHorz,
    Above,
    Below,
    Fullscreen,
    /// Decoration on/off toggle.
    Decor,
    DecorTitle,
    DecorHandle,
    DecorBorder,
}

/// Direction argument of an interactive move/resize request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveResizeDirection {
    SizeTopLeft,
    SizeTop,
    SizeTopRight,
    SizeRight,
    SizeBottomRight,
    SizeBottom,
    SizeBottomLeft,
    SizeLeft,
    Move,
    SizeKeyboard,
    MoveKeyboard,
}

/// Decoded client messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    ActiveWindow,
    ChangeState(WmState),
    /// Requested desktop number; [`crate::desktop::DesktopMask::ALL_WIRE`]
    /// means all desktops.
    Desktop(u32),
    State {
        action: StateAction,
        first: Option<NetState>,
        second: Option<NetState>,
    },
    DesktopViewport {
        x: i32,
        y: i32,
    },
    CloseWindow,
    CurrentDesktop(u32),
    MoveResizeWindow {
        gravity: Option<Gravity>,
        mask: ConfigureMask,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    WmMoveResize {
        root: Point,
        direction: MoveResizeDirection,
        button: u32,
    },
    /// Drag-and-drop entered the window; handled like a pointer enter.
    DndEnter,
    DndLeave,
}

/// Protocol events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ButtonPress {
        window: Handle,
        button: u32,
        state: Modifiers,
        root: Point,
        time: Timestamp,
    },
    ButtonRelease {
        window: Handle,
        button: u32,
        state: Modifiers,
        root: Point,
        time: Timestamp,
    },
    KeyPress {
        window: Handle,
        keycode: u32,
        state: Modifiers,
        root: Point,
        time: Timestamp,
    },
    KeyRelease {
        window: Handle,
        keycode: u32,
        state: Modifiers,
        root: Point,
        time: Timestamp,
    },
    Motion {
        window: Handle,
        root: Point,
        state: Modifiers,
        time: Timestamp,
    },
    Enter {
        window: Handle,
        root: Point,
        state: Modifiers,
        /// Crossing generated by a grab activating or releasing.
        grab: bool,
    },
    Leave {
        window: Handle,
        root: Point,
        state: Modifiers,
        grab: bool,
    },
    Expose {
        window: Handle,
        /// Number of expose events still to follow.
        count: u32,
    },
    PropertyChange {
        window: Handle,
        property: Property,
        deleted: bool,
    },
    MapRequest {
        parent: Handle,
        window: Handle,
    },
    Unmap {
        /// Window whose event queue reported it.
        event: Handle,
        window: Handle,
    },
    Destroy {
        window: Handle,
    },
    ConfigureRequest(ConfigureRequest),
    ClientMessage {
        window: Handle,
        message: ClientMessage,
    },
    ColormapChange {
        window: Handle,
        colormap: u32,
    },
    FocusIn {
        window: Handle,
    },
    FocusOut {
        window: Handle,
    },
    ShapeChange {
        window: Handle,
    },
    ScreenChange {
        root: Handle,
        width: i32,
        height: i32,
    },
}

/// Properties whose changes the core reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Name,
    Strut,
    NormalHints,
    Other,
}

bitflags! {
    /// Event kinds, used as the return mask of nested loops.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventMask: u32 {
        const BUTTON_PRESS      = 1 << 0;
        const BUTTON_RELEASE    = 1 << 1;
        const KEY_PRESS         = 1 << 2;
        const KEY_RELEASE       = 1 << 3;
        const MOTION            = 1 << 4;
        const ENTER             = 1 << 5;
        const LEAVE             = 1 << 6;
        const EXPOSE            = 1 << 7;
        const PROPERTY          = 1 << 8;
        const MAP_REQUEST       = 1 << 9;
        const UNMAP             = 1 << 10;
        const DESTROY           = 1 << 11;
        const CONFIGURE_REQUEST = 1 << 12;
        const CLIENT_MESSAGE    = 1 << 13;
        const COLORMAP          = 1 << 14;
        const FOCUS             = 1 << 15;
        const SHAPE             = 1 << 16;
        const SCREEN_CHANGE     = 1 << 17;
    }
}

impl EventMask {
    /// Events a move or resize session handles itself.
    pub const MOVE_RESIZE: Self = Self::MOTION
        .union(Self::BUTTON_PRESS)
        .union(Self::BUTTON_RELEASE)
        .union(Self::KEY_PRESS)
        .union(Self::KEY_RELEASE)
        .union(Self::MAP_REQUEST)
        .union(Self::UNMAP)
        .union(Self::DESTROY)
        .union(Self::ENTER)
        .union(Self::LEAVE)
        .union(Self::CONFIGURE_REQUEST);

    /// Events a viewport drag handles itself.
    pub const VIEWPORT_DRAG: Self = Self::MOTION
        .union(Self::BUTTON_PRESS)
        .union(Self::BUTTON_RELEASE)
        .union(Self::KEY_PRESS)
        .union(Self::KEY_RELEASE)
        .union(Self::MAP_REQUEST)
        .union(Self::ENTER)
        .union(Self::LEAVE);
}

impl Event {
    pub const fn kind(&self) -> EventMask {
        match self {
            Self::ButtonPress { .. } => EventMask::BUTTON_PRESS,
            Self::ButtonRelease { .. } => EventMask::BUTTON_RELEASE,
            Self::KeyPress { .. } => EventMask::KEY_PRESS,
            Self::KeyRelease { .. } => EventMask::KEY_RELEASE,
            Self::Motion { .. } => EventMask::MOTION,
            Self::Enter { .. } => EventMask::ENTER,
            Self::Leave { .. } => EventMask::LEAVE,
            Self::Expose { .. } => EventMask::EXPOSE,
            Self::PropertyChange { .. } => EventMask::PROPERTY,
            Self::MapRequest { .. } => EventMask::MAP_REQUEST,
            Self::Unmap { .. } => EventMask::UNMAP,
            Self::Destroy { .. } => EventMask::DESTROY,
            Self::ConfigureRequest(_) => EventMask::CONFIGURE_REQUEST,
            Self::ClientMessage { .. } => EventMask::CLIENT_MESSAGE,
            Self::ColormapChange { .. } => EventMask::COLORMAP,
            Self::FocusIn { .. } | Self::FocusOut { .. } => EventMask::FOCUS,
            Self::ShapeChange { .. } => EventMask::SHAPE,
            Self::ScreenChange { .. } => EventMask::SCREEN_CHANGE,
        }
    }

    /// The window the event is reported for.
    pub const fn window(&self) -> Handle {
        match self {
            Self::ButtonPress { window, .. }
            | Self::ButtonRelease { window, .. }
            | Self::KeyPress { window, .. }
            | Self::KeyRelease { window, .. }
            | Self::Motion { window, .. }
            | Self::Enter { window, .. }
            | Self::Leave { window, .. }
            | Self::Expose { window, .. }
            | Self::PropertyChange { window, .. }
            | Self::MapRequest { window, .. }
            | Self::Unmap { window, .. }
            | Self::Destroy { window }
            | Self::ClientMessage { window, .. }
            | Self::ColormapChange { window, .. }
            | Self::FocusIn { window }
            | Self::FocusOut { window }
            | Self::ShapeChange { window } => *window,
            Self::ConfigureRequest(req) => req.window,
            Self::ScreenChange { root, .. } => *root,
        }
    }

    /// Server time carried by input events.
    pub const fn time(&self) -> Option<Timestamp> {
        match self {
            Self::ButtonPress { time, .. }
            | Self::ButtonRelease { time, .. }
            | Self::KeyPress { time, .. }
            | Self::KeyRelease { time, .. }
            | Self::Motion { time, .. } => Some(*time),
            _ => None,
        }
    }

    /// Root pointer position carried by pointer and key events.
    pub const fn root(&self) -> Option<Point> {
        match self {
            Self::ButtonPress { root, .. }
            | Self::ButtonRelease { root, .. }
            | Self::KeyPress { root, .. }
            | Self::KeyRelease { root, .. }
            | Self::Motion { root, .. }
            | Self::Enter { root, .. }
            | Self::Leave { root, .. } => Some(*root),
            _ => None,
        }
    }

    /// Redirect an input event to another window, as a grab does.
    #[must_use]
    pub fn retarget(mut self, to: Handle) -> Self {
        match &mut self {
            Self::ButtonPress { window, .. }
            | Self::ButtonRelease { window, .. }
            | Self::KeyPress { window, .. }
            | Self::KeyRelease { window, .. } => *window = to,
            _ => {},
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_wraparound() {
        let before = Timestamp(u32::MAX - 100);
        let after = Timestamp(99);
        assert_eq!(after.since(before), 200);
        assert!(after.reached(before.after(150)));
        assert!(!before.reached(after));
    }

    #[test]
    fn test_return_masks() {
        assert!(EventMask::MOVE_RESIZE.contains(EventMask::DESTROY | EventMask::CONFIGURE_REQUEST));
        assert!(!EventMask::VIEWPORT_DRAG.intersects(
            EventMask::UNMAP | EventMask::DESTROY | EventMask::CONFIGURE_REQUEST
        ));
        assert!(EventMask::VIEWPORT_DRAG.contains(EventMask::MAP_REQUEST | EventMask::LEAVE));
        assert!(!EventMask::MOVE_RESIZE.contains(EventMask::EXPOSE));
    }

    #[test]
    fn test_retarget_only_touches_input() {
        let press = Event::ButtonPress {
            window: Handle(3),
            button: 1,
            state: Modifiers::empty(),
            root: Point::new(0, 0),
            time: Timestamp(0),
        };
        assert_eq!(press.retarget(Handle(9)).window(), Handle(9));
        let destroy = Event::Destroy { window: Handle(3) };
        assert_eq!(destroy.retarget(Handle(9)).window(), Handle(3));
    }
}
