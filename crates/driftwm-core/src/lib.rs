//! driftwm core: protocol-agnostic window manager interaction engine
//!
//! This crate holds the part of the window manager that decides what
//! happens when an event arrives: binding matching and dispatch, the
//! three-layer stacking model, modal move/resize/shade/maximize sessions
//! with their nested event loop, and the virtual viewport and desktop model.
//!
//! Backends implement the collaborator traits in [`backend`] and hand
//! themselves to [`Core`], which pulls events through
//! [`EventSource::next_event`](backend::EventSource::next_event) and drives
//! the display through the other traits.
//!
//! # Quick Start
//! ```
//! use driftwm_core::config::Config;
//! use driftwm_core::geometry::Geometry;
//! use driftwm_core::mock::{map_request, MockBackend, ROOT};
//! use driftwm_core::Core;
//!
//! let mut backend = MockBackend::new(800, 600);
//! let client = backend.create_client(Geometry::new(10, 10, 300, 200));
//! backend.push_event(map_request(client));
//!
//! let mut core = Core::new(Config::default(), backend)?;
//! core.add_screen(ROOT, 800, 600);
//!
//! // Runs until the scripted events are used up
//! core.run();
//! assert_eq!(core.state.windows.len(), 1);
//! # Ok::<(), driftwm_core::config::ConfigError>(())
//! ```

pub mod actions;
pub mod backend;
pub mod click;
pub mod config;
pub mod desktop;
pub mod dispatch;
pub mod event;
pub mod frame;
pub mod geometry;
pub mod input;
pub mod interaction;
pub mod invariants;
pub mod mock;
pub mod registry;
pub mod screen;
pub mod stacking;
pub mod state;
pub mod viewport;
pub mod window;

// Re-export primary API types at crate root
pub use actions::Target;
pub use backend::Backend;
pub use event::Event;
pub use geometry::Geometry;
pub use interaction::{Mode, Session};
pub use registry::Handle;
pub use window::WindowId;

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use backend::Fetched;
use click::ClickTracker;
use config::{Config, ConfigError};
use event::Timestamp;
use input::ActionBinding;
use registry::{Edge, Object, ScreenId};
use screen::Screen;
use state::State;

/// A binding whose execution was postponed by its delay.
#[derive(Debug, Clone)]
struct DeferredAction {
    due: Timestamp,
    /// Handle the triggering event was routed through.
    handle: Handle,
    target: Target,
    binding: ActionBinding,
    event: Event,
}

/// The window manager engine.
///
/// Owns all state and the backend. Drive it with [`run`](Core::run), or
/// feed single events with [`dispatch`](Core::dispatch).
pub struct Core<B: Backend> {
    /// All window-manager state
    pub state: State,
    /// Display connection, event source and the other collaborators
    pub backend: B,
    clicks: ClickTracker,
    /// Events put back for the next fetch, consumed before the backend.
    pending: VecDeque<Event>,
    deferred: Vec<DeferredAction>,
    session: Option<Session>,
    /// Monotonic window ID counter
    next_wid: u64,
    /// Exit requested
    pub should_exit: bool,
    /// Restart requested; the binary re-executes itself
    pub restart_requested: bool,
    disconnected: bool,
}

impl<B: Backend> Core<B> {
    /// Create the engine. Fails when the configuration does not validate.
    pub fn new(config: Config, backend: B) -> Result<Self, ConfigError> {
        config.validate()?;
        let bindings = config.bindings()?;
        Ok(Self {
            state: State::new(config, bindings),
            backend,
            clicks: ClickTracker::new(),
            pending: VecDeque::new(),
            deferred: Vec::new(),
            session: None,
            next_wid: 1,
            should_exit: false,
            restart_requested: false,
            disconnected: false,
        })
    }

    /// Take over the screen whose root window is `root`.
    pub fn add_screen(&mut self, root: Handle, width: i32, height: i32) -> ScreenId {
        let config = &self.state.config;
        let g = &config.general;
        let id = self.state.screens.len();
        let mut screen = Screen::new(root, width, height, g.virtual_x, g.virtual_y)
            .with_desktops(&config.desktop_names());
        screen.edge_thickness = g.edge_thickness;
        screen.dock_desktops = config.dock_desktops();

        if screen.edge_thickness > 0 {
            for (i, edge) in Edge::ALL.into_iter().enumerate() {
                let scrolls = match edge {
                    Edge::West | Edge::East => screen.virtual_x > 1,
                    Edge::North | Edge::South => screen.virtual_y > 1,
                };
                if scrolls {
                    let handle = self.backend.create_edge(id, screen.edge_geometry(edge));
                    self.state.registry.insert(handle, Object::Edge { screen: id, edge });
                    screen.edges[i] = handle;
                }
            }
        }
        self.state.registry.insert(root, Object::Root(id));
        info!(
            "Managing screen {} ({}x{}, {}x{} virtual, {} desktops)",
            id,
            width,
            height,
            screen.virtual_x,
            screen.virtual_y,
            screen.desktop_count()
        );
        self.state.screens.push(screen);

        self.backend.set_viewport(root, 0, 0);
        self.backend.set_current_desktop(root, 0);
        self.publish_workarea(id);
        self.restack(id);
        id
    }

    /// Generate a fresh, unique `WindowId`.
    pub fn next_window_id(&mut self) -> WindowId {
        let id = WindowId(self.next_wid);
        self.next_wid += 1;
        id
    }

    /// The running interaction session, if any.
    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Whether the event source went away.
    pub const fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    /// Number of scheduled delayed actions.
    pub fn deferred_actions(&self) -> usize {
        self.deferred.len()
    }

    // ── Event loop ───────────────────────────────────────────────────

    /// Process events until the source disconnects or an exit is requested.
    pub fn run(&mut self) {
        info!("Entering event loop");
        while !self.should_exit && !self.disconnected {
            match self.fetch() {
                Fetched::Event(event) => self.dispatch(event),
                Fetched::TimedOut => {},
                Fetched::Disconnected => {
                    info!("Event source disconnected");
                    self.disconnected = true;
                },
            }
            self.fire_due_actions();
        }
        info!("Event loop finished");
    }

    /// Process one event.
    pub fn dispatch(&mut self, event: Event) {
        trace!("dispatch: {:?}", event);
        self.handle_event(event);

        #[cfg(debug_assertions)]
        if let Err(e) = self.state.validate_invariants() {
            warn!("Invariant violation after dispatch: {}", e);
        }
    }

    /// Next event: put-back events first, then the backend, waiting no
    /// longer than the next delayed action.
    fn fetch(&mut self) -> Fetched {
        if let Some(event) = self.pending.pop_front() {
            return Fetched::Event(event);
        }
        let now = self.backend.now();
        let timeout = next_timeout(now, self.deferred.iter().map(|d| d.due));
        self.backend.next_event(timeout)
    }

    /// Queue `events` ahead of everything else, keeping their order.
    fn put_back(&mut self, events: impl IntoIterator<Item = Event>) {
        let events: Vec<Event> = events.into_iter().collect();
        for event in events.into_iter().rev() {
            self.pending.push_front(event);
        }
    }

    // ── Delayed actions ──────────────────────────────────────────────

    fn schedule(&mut self, handle: Handle, target: Target, binding: &ActionBinding, event: &Event) {
        let due = self.backend.now().after(binding.delay_ms);
        debug!(
            "Deferring {} on {} by {}ms",
            binding.behavior, handle, binding.delay_ms
        );
        self.deferred.push(DeferredAction {
            due,
            handle,
            target,
            binding: binding.clone(),
            event: event.clone(),
        });
    }

    /// Drop delayed actions scheduled through `handle`.
    fn cancel_deferred(&mut self, handle: Handle) {
        let before = self.deferred.len();
        self.deferred.retain(|d| d.handle != handle);
        if self.deferred.len() != before {
            debug!("Cancelled {} delayed action(s) on {}", before - self.deferred.len(), handle);
        }
    }

    fn cancel_window_actions(&mut self, id: WindowId) {
        self.deferred.retain(|d| d.target != Target::Window(id));
    }

    /// Run every delayed action whose time has come.
    pub fn fire_due_actions(&mut self) {
        if self.deferred.is_empty() {
            return;
        }
        let now = self.backend.now();
        let (due, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.deferred)
            .into_iter()
            .partition(|d| now.reached(d.due));
        self.deferred = rest;
        for action in due {
            self.execute(action.target, &action.binding, &action.event);
        }
    }
}


/// Time left until the earliest of `deadlines`; overdue ones count as
/// zero.
fn next_timeout(now: Timestamp, deadlines: impl Iterator<Item = Timestamp>) -> Option<Duration> {
    deadlines
        .map(|due| if now.reached(due) { 0 } else { due.since(now) })
        .min()
        .map(|ms| Duration::from_millis(u64::from(ms)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{ActionKind, Behavior, Modifiers};
    use crate::mock::{self, Call, MockBackend, ROOT};
    use crate::test_util::core;

    #[test]
    fn test_add_screen_creates_edges_and_publishes() {
        let core = core();
        let screen = &core.state.screens[0];
        assert!(screen.edges.iter().all(|e| !e.is_none()));
        assert_eq!(screen.desktop_count(), 4);
        assert_eq!(core.backend.published.current_desktop, Some(0));
        assert_eq!(core.backend.published.workarea.len(), 4);
        assert_eq!(core.backend.last_restack(), Some(&screen.edges[..]));
    }

    #[test]
    fn test_no_edges_without_virtual_space() {
        let mut config = Config::default();
        config.general.virtual_x = 1;
        config.general.virtual_y = 1;
        let mut core = Core::new(config, MockBackend::new(800, 600)).unwrap();
        core.add_screen(ROOT, 800, 600);
        assert!(core.state.screens[0].edges.iter().all(|e| e.is_none()));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = Config::default();
        config.general.desktop_count = 0;
        assert!(Core::new(config, MockBackend::new(800, 600)).is_err());
    }

    #[test]
    fn test_overdue_deadline_waits_zero() {
        let now = Timestamp(1000);
        let due = [Timestamp(1500), Timestamp(900), Timestamp(1200)];
        assert_eq!(next_timeout(now, due.into_iter()), Some(Duration::ZERO));
        assert_eq!(next_timeout(now, due[..1].iter().copied()), Some(Duration::from_millis(500)));
        assert_eq!(next_timeout(now, [Timestamp(1000)].into_iter()), Some(Duration::ZERO));
        assert_eq!(next_timeout(now, std::iter::empty()), None);
    }

    #[test]
    fn test_window_ids_are_unique() {
        let mut core = core();
        let a = core.next_window_id();
        let b = core.next_window_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_put_back_events_come_first() {
        let mut core = core();
        core.backend.push_event(Event::Destroy { window: Handle(7) });
        core.put_back([
            Event::Destroy { window: Handle(1) },
            Event::Destroy { window: Handle(2) },
        ]);
        let order: Vec<Handle> = (0..3)
            .filter_map(|_| match core.fetch() {
                Fetched::Event(e) => Some(e.window()),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec![Handle(1), Handle(2), Handle(7)]);
    }

    #[test]
    fn test_run_stops_on_disconnect() {
        let mut core = core();
        core.run();
        assert!(core.is_disconnected());
    }

    #[test]
    fn test_deferred_action_fires_when_due() {
        let mut core = core();
        let binding = ActionBinding::new(ActionKind::ButtonPress, 1, Behavior::Exec)
            .param("xterm")
            .delay(500);
        let event = mock::button_press(ROOT, 1, Modifiers::empty(), Default::default(), 1000);
        core.schedule(ROOT, Target::Screen(0), &binding, &event);

        core.fire_due_actions();
        assert_eq!(core.deferred_actions(), 1);

        core.backend.time = Timestamp(1500);
        core.fire_due_actions();
        assert_eq!(core.deferred_actions(), 0);
        assert!(core.backend.called(|c| *c == Call::Spawn("xterm".into())));
    }

    #[test]
    fn test_deferred_action_cancelled_by_handle() {
        let mut core = core();
        let binding = ActionBinding::new(ActionKind::ButtonPress, 1, Behavior::Exit).delay(100);
        let event = mock::button_press(ROOT, 1, Modifiers::empty(), Default::default(), 1000);
        core.schedule(ROOT, Target::Screen(0), &binding, &event);
        core.cancel_deferred(ROOT);
        core.backend.time = Timestamp(5000);
        core.fire_due_actions();
        assert!(!core.should_exit);
    }
}
