//! Handle → object registry.
//!
//! Every display-server window the core cares about is registered here
//! together with the object that owns it. Lookups by handle always go
//! through [`Registry::find`], which filters on a capability mask so callers
//! only ever see the variants they can act on.

use std::collections::HashMap;
use std::fmt;

use bitflags::bitflags;
use tracing::trace;

use crate::window::WindowId;

/// Opaque display-server window handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Handle(pub u32);

impl Handle {
    pub const NONE: Self = Self(0);

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Screen index into [`crate::state::State::screens`].
pub type ScreenId = usize;

/// Which strip along the screen border an edge window covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    West,
    East,
    North,
    South,
}

impl Edge {
    pub const ALL: [Self; 4] = [Self::West, Self::East, Self::North, Self::South];
}

/// Decoration parts that make up a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Part {
    Frame,
    Title,
    Label,
    Handle,
    LeftGrip,
    RightGrip,
    /// Title bar button with its index from the left.
    Button(u8),
}

/// A registered object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Object {
    /// The client window of a managed window.
    Client(WindowId),
    /// A decoration part owned by a managed window.
    Decoration { window: WindowId, part: Part },
    Root(ScreenId),
    Edge { screen: ScreenId, edge: Edge },
    /// An embedded dock application client.
    Dock { screen: ScreenId },
    /// One of the four outline proxy strips of a drag session.
    Outline,
}

bitflags! {
    /// Capability tags for filtered lookups.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capability: u16 {
        const CLIENT     = 1 << 0;
        const FRAME      = 1 << 1;
        const TITLE      = 1 << 2;
        const LABEL      = 1 << 3;
        const HANDLE     = 1 << 4;
        const LEFT_GRIP  = 1 << 5;
        const RIGHT_GRIP = 1 << 6;
        const BUTTON     = 1 << 7;
        const ROOT       = 1 << 8;
        const EDGE       = 1 << 9;
        const DOCK       = 1 << 10;
        const OUTLINE    = 1 << 11;

        const DECORATION = Self::FRAME.bits()
            | Self::TITLE.bits()
            | Self::LABEL.bits()
            | Self::HANDLE.bits()
            | Self::LEFT_GRIP.bits()
            | Self::RIGHT_GRIP.bits()
            | Self::BUTTON.bits();
        /// Anything that resolves to a managed window.
        const WINDOW = Self::CLIENT.bits() | Self::DECORATION.bits();
    }
}

impl Object {
    pub const fn capability(&self) -> Capability {
        match self {
            Self::Client(_) => Capability::CLIENT,
            Self::Decoration { part, .. } => match part {
                Part::Frame => Capability::FRAME,
                Part::Title => Capability::TITLE,
                Part::Label => Capability::LABEL,
                Part::Handle => Capability::HANDLE,
                Part::LeftGrip => Capability::LEFT_GRIP,
                Part::RightGrip => Capability::RIGHT_GRIP,
                Part::Button(_) => Capability::BUTTON,
            },
            Self::Root(_) => Capability::ROOT,
            Self::Edge { .. } => Capability::EDGE,
            Self::Dock { .. } => Capability::DOCK,
            Self::Outline => Capability::OUTLINE,
        }
    }

    /// The managed window behind a client or decoration object.
    pub const fn window(&self) -> Option<WindowId> {
        match self {
            Self::Client(id) | Self::Decoration { window: id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// Process-wide handle table.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    table: HashMap<Handle, Object>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: Handle, object: Object) {
        if handle.is_none() {
            return;
        }
        trace!("registry: {} -> {:?}", handle, object);
        self.table.insert(handle, object);
    }

    pub fn remove(&mut self, handle: Handle) -> Option<Object> {
        self.table.remove(&handle)
    }

    /// Drop every entry that belongs to `window`.
    pub fn remove_window(&mut self, window: WindowId) {
        self.table.retain(|_, obj| obj.window() != Some(window));
    }

    /// Resolve `handle` if its object carries one of the capabilities in
    /// `mask`.
    pub fn find(&self, handle: Handle, mask: Capability) -> Option<Object> {
        self.table
            .get(&handle)
            .copied()
            .filter(|obj| mask.intersects(obj.capability()))
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.table.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, Object)> + '_ {
        self.table.iter().map(|(&h, &o)| (h, o))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_filters_on_capability() {
        let mut reg = Registry::new();
        let w = WindowId(7);
        reg.insert(Handle(10), Object::Client(w));
        reg.insert(
            Handle(11),
            Object::Decoration {
                window: w,
                part: Part::Title,
            },
        );
        reg.insert(Handle(1), Object::Root(0));

        assert_eq!(reg.find(Handle(10), Capability::CLIENT), Some(Object::Client(w)));
        assert_eq!(reg.find(Handle(10), Capability::ROOT), None);
        assert_eq!(
            reg.find(Handle(11), Capability::WINDOW).and_then(|o| o.window()),
            Some(w)
        );
        assert_eq!(reg.find(Handle(11), Capability::FRAME), None);
        assert_eq!(reg.find(Handle(99), Capability::all()), None);
    }

    #[test]
    fn test_remove_window_drops_all_parts() {
        let mut reg = Registry::new();
        let w = WindowId(1);
        reg.insert(Handle(2), Object::Client(w));
        reg.insert(
            Handle(3),
            Object::Decoration {
                window: w,
                part: Part::Frame,
            },
        );
        reg.insert(Handle(4), Object::Root(0));
        reg.remove_window(w);
        assert_eq!(reg.len(), 1);
        assert!(reg.contains(Handle(4)));
    }

    #[test]
    fn test_none_handle_is_never_registered() {
        let mut reg = Registry::new();
        reg.insert(Handle::NONE, Object::Outline);
        assert!(reg.is_empty());
    }
}
