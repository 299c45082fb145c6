//! Window-manager state owned by [`crate::Core`].

use indexmap::IndexMap;

use crate::config::Config;
use crate::input::Bindings;
use crate::registry::{Capability, Handle, Object, Part, Registry, ScreenId};
use crate::screen::Screen;
use crate::window::{ManagedWindow, WindowFlags, WindowId};

/// Input focus tracking.
#[derive(Debug, Clone, Default)]
pub struct FocusState {
    pub focused: Option<WindowId>,
    /// Most recently focused first.
    pub history: Vec<WindowId>,
}

impl FocusState {
    pub fn set_focused(&mut self, id: WindowId) {
        self.history.retain(|&w| w != id);
        self.history.insert(0, id);
        self.focused = Some(id);
    }

    pub fn clear_focused(&mut self) {
        self.focused = None;
    }

    pub fn forget(&mut self, id: WindowId) {
        self.history.retain(|&w| w != id);
        if self.focused == Some(id) {
            self.focused = None;
        }
    }
}

#[derive(Debug)]
pub struct State {
    pub config: Config,
    pub bindings: Bindings,
    /// Managed windows in map order.
    pub windows: IndexMap<WindowId, ManagedWindow>,
    pub registry: Registry,
    pub screens: Vec<Screen>,
    pub focus: FocusState,
}

impl State {
    pub fn new(config: Config, bindings: Bindings) -> Self {
        Self {
            config,
            bindings,
            windows: IndexMap::new(),
            registry: Registry::new(),
            screens: Vec::new(),
            focus: FocusState::default(),
        }
    }

    pub fn window(&self, id: WindowId) -> Option<&ManagedWindow> {
        self.windows.get(&id)
    }

    pub fn window_mut(&mut self, id: WindowId) -> Option<&mut ManagedWindow> {
        self.windows.get_mut(&id)
    }

    /// The managed window a client or decoration handle belongs to.
    pub fn window_of(&self, handle: Handle) -> Option<WindowId> {
        self.registry
            .find(handle, Capability::WINDOW)
            .and_then(|obj| obj.window())
    }

    /// The managed window whose client is `client`.
    pub fn window_by_client(&self, client: Handle) -> Option<WindowId> {
        match self.registry.find(client, Capability::CLIENT) {
            Some(Object::Client(id)) => Some(id),
            _ => None,
        }
    }

    pub fn screen_of_root(&self, root: Handle) -> Option<ScreenId> {
        match self.registry.find(root, Capability::ROOT) {
            Some(Object::Root(screen)) => Some(screen),
            _ => None,
        }
    }

    /// Register `window` and every part of its frame.
    pub fn add_window(&mut self, window: ManagedWindow) -> WindowId {
        let id = window.id;
        self.registry.insert(window.client, Object::Client(id));
        let parts = &window.parts;
        let named = [
            (parts.frame, Part::Frame),
            (parts.title, Part::Title),
            (parts.label, Part::Label),
            (parts.handle, Part::Handle),
            (parts.left_grip, Part::LeftGrip),
            (parts.right_grip, Part::RightGrip),
        ];
        for (handle, part) in named {
            self.registry
                .insert(handle, Object::Decoration { window: id, part });
        }
        for (i, &handle) in parts.buttons.iter().enumerate() {
            let part = Part::Button(u8::try_from(i).unwrap_or(u8::MAX));
            self.registry
                .insert(handle, Object::Decoration { window: id, part });
        }
        self.windows.insert(id, window);
        id
    }

    /// Forget `id` everywhere: registry, stacking, owner and transient
    /// links, focus history.
    pub fn remove_window(&mut self, id: WindowId) -> Option<ManagedWindow> {
        let window = self.windows.shift_remove(&id)?;
        self.registry.remove_window(id);
        if let Some(screen) = self.screens.get_mut(window.screen) {
            screen.stacking.remove(window.parts.frame);
            screen.remove_strut(window.client);
        }
        if let Some(owner) = window.transient_for.and_then(|o| self.windows.get_mut(&o)) {
            owner.transients.retain(|&t| t != id);
        }
        for t in &window.transients {
            if let Some(child) = self.windows.get_mut(t) {
                child.transient_for = None;
            }
        }
        self.focus.forget(id);
        Some(window)
    }

    /// Frame handles of the live transients of `id`, in list order. Dead
    /// entries are pruned from the list.
    pub fn transient_frames(&mut self, id: WindowId) -> Vec<Handle> {
        let Some(window) = self.windows.get(&id) else {
            return Vec::new();
        };
        let live: Vec<WindowId> = window
            .transients
            .iter()
            .copied()
            .filter(|t| self.windows.contains_key(t))
            .collect();
        let frames = live
            .iter()
            .filter_map(|t| self.windows.get(t))
            .map(|w| w.parts.frame)
            .collect();
        if let Some(window) = self.windows.get_mut(&id) {
            window.transients = live;
        }
        frames
    }

    /// Windows on `screen`, in map order.
    pub fn windows_on(&self, screen: ScreenId) -> impl Iterator<Item = &ManagedWindow> + '_ {
        self.windows.values().filter(move |w| w.screen == screen)
    }

    pub fn window_ids_on(&self, screen: ScreenId) -> Vec<WindowId> {
        self.windows_on(screen).map(|w| w.id).collect()
    }

    /// Client handles in map order, for the client-list hint.
    pub fn client_list(&self, screen: ScreenId) -> Vec<Handle> {
        self.windows_on(screen).map(|w| w.client).collect()
    }

    /// Client handles bottom to top, for the client-list-stacking hint.
    pub fn client_list_stacking(&self, screen: ScreenId) -> Vec<Handle> {
        let Some(s) = self.screens.get(screen) else {
            return Vec::new();
        };
        let mut clients: Vec<Handle> = s
            .stacking
            .iter()
            .filter_map(|frame| self.window_of(frame))
            .filter_map(|id| self.windows.get(&id))
            .map(|w| w.client)
            .collect();
        clients.reverse();
        clients
    }

    pub fn is_focused(&self, id: WindowId) -> bool {
        self.windows
            .get(&id)
            .is_some_and(|w| w.flags.contains(WindowFlags::FOCUSED))
    }

    /// Check all state invariants.
    pub fn validate_invariants(&self) -> Result<(), crate::invariants::InvariantError> {
        crate::invariants::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::stacking::Position;
    use crate::window::{FrameParts, Layer};

    fn window(id: u64, client: u32, frame: u32) -> ManagedWindow {
        let mut w = ManagedWindow::new(WindowId(id), Handle(client), 0, Geometry::new(0, 0, 100, 100));
        w.parts = FrameParts {
            frame: Handle(frame),
            title: Handle(frame + 1),
            buttons: vec![Handle(frame + 2)],
            ..FrameParts::default()
        };
        w
    }

    fn state() -> State {
        let mut s = State::new(Config::default(), Bindings::default());
        s.screens.push(Screen::new(Handle(1), 800, 600, 1, 1));
        s
    }

    #[test]
    fn test_add_window_registers_parts() {
        let mut s = state();
        s.add_window(window(1, 0x10, 0x20));
        assert_eq!(s.window_of(Handle(0x10)), Some(WindowId(1)));
        assert_eq!(s.window_of(Handle(0x21)), Some(WindowId(1)));
        assert_eq!(
            s.registry.find(Handle(0x22), Capability::BUTTON),
            Some(Object::Decoration {
                window: WindowId(1),
                part: Part::Button(0)
            })
        );
        assert_eq!(s.window_by_client(Handle(0x20)), None);
    }

    #[test]
    fn test_remove_window_unlinks_everything() {
        let mut s = state();
        let mut owner = window(1, 0x10, 0x20);
        owner.transients.push(WindowId(2));
        let mut dialog = window(2, 0x30, 0x40);
        dialog.transient_for = Some(WindowId(1));
        s.add_window(owner);
        s.add_window(dialog);
        s.screens[0].stacking.insert(Handle(0x40), Layer::Normal, Position::Front);
        s.focus.set_focused(WindowId(2));

        assert!(s.remove_window(WindowId(2)).is_some());
        assert!(s.window(WindowId(1)).unwrap().transients.is_empty());
        assert!(s.screens[0].stacking.is_empty());
        assert_eq!(s.focus.focused, None);
        assert!(s.registry.find(Handle(0x30), Capability::all()).is_none());
    }

    #[test]
    fn test_transient_frames_prunes_dead_entries() {
        let mut s = state();
        let mut owner = window(1, 0x10, 0x20);
        owner.transients = vec![WindowId(9), WindowId(2)];
        s.add_window(owner);
        s.add_window(window(2, 0x30, 0x40));
        assert_eq!(s.transient_frames(WindowId(1)), vec![Handle(0x40)]);
        assert_eq!(s.window(WindowId(1)).unwrap().transients, vec![WindowId(2)]);
    }

    #[test]
    fn test_focus_history_is_most_recent_first() {
        let mut f = FocusState::default();
        f.set_focused(WindowId(1));
        f.set_focused(WindowId(2));
        f.set_focused(WindowId(1));
        assert_eq!(f.history, vec![WindowId(1), WindowId(2)]);
        f.forget(WindowId(1));
        assert_eq!(f.focused, None);
        assert_eq!(f.history, vec![WindowId(2)]);
    }
}
