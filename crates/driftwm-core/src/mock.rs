//! Recording backend for tests and benchmarks.
//!
//! `MockBackend` implements every collaborator trait against in-memory
//! state. Display requests are appended to [`MockBackend::calls`]; published
//! hints land in [`Published`] so tests can assert on the latest value.
//! Events are served from a script queue; an empty queue reports
//! [`Fetched::Disconnected`], which ends both the outer and nested loops.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use crate::backend::{
    ClientAttributes, ClientNames, Decorator, Display, EventSource, Fetched, Furniture, Hints,
    NetStates, PointerState,
};
use crate::desktop::DesktopMask;
use crate::event::{ConfigureRequest, Event, Point, Timestamp, WmState};
use crate::geometry::Geometry;
use crate::input::{ActionBinding, Modifiers};
use crate::registry::{Handle, ScreenId};
use crate::screen::{DockApp, Strut};
use crate::window::{FrameParts, ManagedWindow, SizeHints, WindowId};

/// Root window of screen 0.
pub const ROOT: Handle = Handle(1);

/// A recorded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GrabServer,
    UngrabServer,
    GrabPointer(Handle),
    UngrabPointer,
    GrabKeyboard(Handle),
    UngrabKeyboard,
    WarpPointer(i32, i32),
    Restack(Vec<Handle>),
    CreateFrame { client: Handle, frame: Handle },
    DestroyFrame { client: Handle, frame: Handle },
    CreateEdge(Handle),
    CreateOutline([Handle; 4]),
    PlaceOutline([Geometry; 4]),
    DestroyOutline([Handle; 4]),
    ConfigureFrame { client: Handle, frame: Geometry },
    ConfigureWindow(Handle),
    MoveResize(Handle, Geometry),
    SendConfigureNotify { client: Handle, geometry: Geometry },
    Map(Handle),
    Unmap(Handle),
    SetInputFocus(Handle),
    InstallColormap(u32),
    AllowEvents { replay: bool, keyboard: bool },
    Close(Handle),
    Kill(Handle),
    Spawn(String),
    UpdateGrabs(Handle),
    RedrawTitlebar(WindowId),
    RedrawHandlebar(WindowId),
    FocusChanged(WindowId, bool),
    ButtonPressed(Handle),
    RelayoutDocks(usize),
    SetDocksVisible(bool),
    ShiftMenus(i32, i32),
}

/// Client-side properties a test sets up before a map request.
#[derive(Debug, Clone, Default)]
pub struct MockClient {
    pub attributes: ClientAttributes,
    pub names: ClientNames,
    pub hints: Option<SizeHints>,
    pub initial_state: Option<WmState>,
    pub transient_for: Option<Handle>,
    pub strut: Option<Strut>,
    pub desktops: Option<DesktopMask>,
    pub net_state: NetStates,
    pub virtual_pos: Option<Point>,
    pub supports_delete: bool,
}

/// Latest published hint values.
#[derive(Debug, Clone, Default)]
pub struct Published {
    pub wm_state: HashMap<Handle, WmState>,
    pub virtual_pos: HashMap<Handle, Point>,
    /// Every virtual position update, in order.
    pub virtual_pos_log: Vec<Handle>,
    pub desktops: HashMap<Handle, DesktopMask>,
    pub net_state: HashMap<Handle, NetStates>,
    pub client_list: Vec<Handle>,
    pub client_list_stacking: Vec<Handle>,
    pub workarea: Vec<Geometry>,
    pub viewport: Option<Point>,
    pub current_desktop: Option<u32>,
    pub active: Option<Handle>,
}

#[derive(Debug, Clone)]
pub struct MockBackend {
    pub width: i32,
    pub height: i32,
    pub calls: Vec<Call>,
    pub events: VecDeque<Event>,
    pub clients: HashMap<Handle, MockClient>,
    pub published: Published,
    pub pointer: PointerState,
    pub time: Timestamp,
    /// When false, pointer grabs fail.
    pub grant_pointer: bool,
    pub grant_keyboard: bool,
    /// Handles that still exist on the display.
    live: HashSet<Handle>,
    next_handle: u32,
}

impl MockBackend {
    pub fn new(width: i32, height: i32) -> Self {
        let mut live = HashSet::new();
        live.insert(ROOT);
        Self {
            width,
            height,
            calls: Vec::new(),
            events: VecDeque::new(),
            clients: HashMap::new(),
            published: Published::default(),
            pointer: PointerState::default(),
            time: Timestamp(1000),
            grant_pointer: true,
            grant_keyboard: true,
            live,
            next_handle: 0x100,
        }
    }

    fn alloc(&mut self) -> Handle {
        let h = Handle(self.next_handle);
        self.next_handle += 1;
        self.live.insert(h);
        h
    }

    /// Create a client window at `geometry` that has not been mapped yet.
    pub fn create_client(&mut self, geometry: Geometry) -> Handle {
        let h = self.alloc();
        self.clients.insert(
            h,
            MockClient {
                attributes: ClientAttributes {
                    geometry,
                    ..ClientAttributes::default()
                },
                supports_delete: true,
                ..MockClient::default()
            },
        );
        h
    }

    pub fn client_mut(&mut self, client: Handle) -> Option<&mut MockClient> {
        self.clients.get_mut(&client)
    }

    /// Make `handle` stale, as if the client died without us noticing.
    pub fn forget(&mut self, handle: Handle) {
        self.live.remove(&handle);
        self.clients.remove(&handle);
    }

    pub fn is_live(&self, handle: Handle) -> bool {
        self.live.contains(&handle)
    }

    pub fn push_event(&mut self, event: Event) {
        self.events.push_back(event);
    }

    pub fn push_events(&mut self, events: impl IntoIterator<Item = Event>) {
        self.events.extend(events);
    }

    /// Whether a call matching `pred` was recorded.
    pub fn called(&self, pred: impl Fn(&Call) -> bool) -> bool {
        self.calls.iter().any(pred)
    }

    /// The most recent restack order.
    pub fn last_restack(&self) -> Option<&[Handle]> {
        self.calls.iter().rev().find_map(|c| match c {
            Call::Restack(order) => Some(order.as_slice()),
            _ => None,
        })
    }
}

// ── Event builders ───────────────────────────────────────────────────

pub fn button_press(window: Handle, button: u32, state: Modifiers, at: Point, time: u32) -> Event {
    Event::ButtonPress {
        window,
        button,
        state,
        root: at,
        time: Timestamp(time),
    }
}

pub fn button_release(window: Handle, button: u32, state: Modifiers, at: Point, time: u32) -> Event {
    Event::ButtonRelease {
        window,
        button,
        state,
        root: at,
        time: Timestamp(time),
    }
}

pub fn motion(window: Handle, at: Point, time: u32) -> Event {
    Event::Motion {
        window,
        root: at,
        state: Modifiers::BUTTON1,
        time: Timestamp(time),
    }
}

pub fn enter(window: Handle, at: Point) -> Event {
    Event::Enter {
        window,
        root: at,
        state: Modifiers::empty(),
        grab: false,
    }
}

pub const fn map_request(window: Handle) -> Event {
    Event::MapRequest {
        parent: ROOT,
        window,
    }
}

// ── Trait implementations ────────────────────────────────────────────

impl EventSource for MockBackend {
    fn next_event(&mut self, _timeout: Option<Duration>) -> Fetched {
        match self.events.pop_front() {
            Some(event) => {
                if let Some(t) = event.time() {
                    self.time = t;
                }
                if let Some(p) = event.root() {
                    self.pointer.root = p;
                }
                Fetched::Event(event)
            },
            None => Fetched::Disconnected,
        }
    }

    fn coalesce_motion(&mut self, window: Handle) -> Option<Event> {
        let mut newest = None;
        self.events.retain(|e| {
            if matches!(e, Event::Motion { window: w, .. } if *w == window) {
                newest = Some(e.clone());
                false
            } else {
                true
            }
        });
        if let Some(p) = newest.as_ref().and_then(Event::root) {
            self.pointer.root = p;
        }
        newest
    }

    fn compress_expose(&mut self, window: Handle) {
        self.events
            .retain(|e| !matches!(e, Event::Expose { window: w, .. } if *w == window));
    }

    fn now(&self) -> Timestamp {
        self.time
    }
}

impl Display for MockBackend {
    fn grab_server(&mut self) {
        self.calls.push(Call::GrabServer);
    }

    fn ungrab_server(&mut self) {
        self.calls.push(Call::UngrabServer);
    }

    fn validate(&mut self, window: Handle) -> bool {
        self.live.contains(&window)
    }

    fn grab_pointer(&mut self, window: Handle) -> bool {
        self.calls.push(Call::GrabPointer(window));
        self.grant_pointer
    }

    fn ungrab_pointer(&mut self) {
        self.calls.push(Call::UngrabPointer);
    }

    fn grab_keyboard(&mut self, window: Handle) -> bool {
        self.calls.push(Call::GrabKeyboard(window));
        self.grant_keyboard
    }

    fn ungrab_keyboard(&mut self) {
        self.calls.push(Call::UngrabKeyboard);
    }

    fn query_pointer(&mut self, _root: Handle) -> PointerState {
        self.pointer
    }

    fn warp_pointer(&mut self, dx: i32, dy: i32) {
        self.pointer.root.x += dx;
        self.pointer.root.y += dy;
        self.calls.push(Call::WarpPointer(dx, dy));
    }

    fn restack(&mut self, order: &[Handle]) {
        self.calls.push(Call::Restack(order.to_vec()));
    }

    fn create_frame(&mut self, window: &ManagedWindow) -> FrameParts {
        let frame = self.alloc();
        let mut parts = FrameParts {
            frame,
            title: self.alloc(),
            label: self.alloc(),
            handle: self.alloc(),
            left_grip: self.alloc(),
            right_grip: self.alloc(),
            buttons: Vec::new(),
        };
        for _ in 0..window.style.buttons {
            let b = self.alloc();
            parts.buttons.push(b);
        }
        self.calls.push(Call::CreateFrame {
            client: window.client,
            frame,
        });
        parts
    }

    fn destroy_frame(&mut self, parts: &FrameParts, client: Handle, _restore: Geometry) {
        for h in parts.handles() {
            self.live.remove(&h);
        }
        self.calls.push(Call::DestroyFrame {
            client,
            frame: parts.frame,
        });
    }

    fn create_edge(&mut self, _screen: ScreenId, _geometry: Geometry) -> Handle {
        let h = self.alloc();
        self.calls.push(Call::CreateEdge(h));
        h
    }

    fn create_outline(&mut self, _screen: ScreenId) -> [Handle; 4] {
        let outline = [self.alloc(), self.alloc(), self.alloc(), self.alloc()];
        self.calls.push(Call::CreateOutline(outline));
        outline
    }

    fn place_outline(&mut self, _outline: &[Handle; 4], strips: &[Geometry; 4]) {
        self.calls.push(Call::PlaceOutline(*strips));
    }

    fn destroy_outline(&mut self, outline: &[Handle; 4]) {
        for h in outline {
            self.live.remove(h);
        }
        self.calls.push(Call::DestroyOutline(*outline));
    }

    fn configure_frame(&mut self, window: &ManagedWindow) {
        self.calls.push(Call::ConfigureFrame {
            client: window.client,
            frame: window.frame,
        });
    }

    fn configure_window(&mut self, request: &ConfigureRequest) {
        self.calls.push(Call::ConfigureWindow(request.window));
    }

    fn move_resize(&mut self, window: Handle, geometry: Geometry) {
        self.calls.push(Call::MoveResize(window, geometry));
    }

    fn send_configure_notify(&mut self, client: Handle, _frame: Handle, geometry: Geometry) {
        self.calls.push(Call::SendConfigureNotify { client, geometry });
    }

    fn map(&mut self, window: Handle) {
        if let Some(c) = self.clients.get_mut(&window) {
            c.attributes.viewable = true;
        }
        self.calls.push(Call::Map(window));
    }

    fn unmap(&mut self, window: Handle) {
        if let Some(c) = self.clients.get_mut(&window) {
            c.attributes.viewable = false;
        }
        self.calls.push(Call::Unmap(window));
    }

    fn set_input_focus(&mut self, window: Handle) {
        self.calls.push(Call::SetInputFocus(window));
    }

    fn install_colormap(&mut self, colormap: u32) {
        self.calls.push(Call::InstallColormap(colormap));
    }

    fn allow_events(&mut self, replay: bool, keyboard: bool, _time: Timestamp) {
        self.calls.push(Call::AllowEvents { replay, keyboard });
    }

    fn supports_delete(&mut self, client: Handle) -> bool {
        self.clients.get(&client).is_some_and(|c| c.supports_delete)
    }

    fn close(&mut self, client: Handle) {
        self.calls.push(Call::Close(client));
    }

    fn kill(&mut self, client: Handle) {
        self.calls.push(Call::Kill(client));
    }

    fn spawn(&mut self, command: &str) {
        self.calls.push(Call::Spawn(command.to_string()));
    }

    fn update_grabs(&mut self, client: Handle, _bindings: &[ActionBinding]) {
        self.calls.push(Call::UpdateGrabs(client));
    }
}

impl Hints for MockBackend {
    fn read_attributes(&mut self, client: Handle) -> Option<ClientAttributes> {
        self.clients.get(&client).map(|c| c.attributes)
    }

    fn read_names(&mut self, client: Handle) -> ClientNames {
        self.clients
            .get(&client)
            .map(|c| c.names.clone())
            .unwrap_or_default()
    }

    fn read_normal_hints(&mut self, client: Handle) -> Option<SizeHints> {
        self.clients.get(&client).and_then(|c| c.hints)
    }

    fn read_initial_state(&mut self, client: Handle) -> Option<WmState> {
        self.clients.get(&client).and_then(|c| c.initial_state)
    }

    fn read_transient_for(&mut self, client: Handle) -> Option<Handle> {
        self.clients.get(&client).and_then(|c| c.transient_for)
    }

    fn read_strut(&mut self, client: Handle) -> Option<Strut> {
        self.clients.get(&client).and_then(|c| c.strut)
    }

    fn read_desktop_mask(&mut self, client: Handle) -> Option<DesktopMask> {
        self.clients.get(&client).and_then(|c| c.desktops)
    }

    fn read_net_state(&mut self, client: Handle) -> NetStates {
        self.clients
            .get(&client)
            .map_or_else(NetStates::empty, |c| c.net_state)
    }

    fn read_virtual_pos(&mut self, client: Handle) -> Option<Point> {
        self.clients.get(&client).and_then(|c| c.virtual_pos)
    }

    fn set_wm_state(&mut self, client: Handle, state: WmState) {
        self.published.wm_state.insert(client, state);
    }

    fn set_virtual_pos(&mut self, client: Handle, x: i32, y: i32) {
        self.published.virtual_pos.insert(client, Point::new(x, y));
        self.published.virtual_pos_log.push(client);
    }

    fn set_desktop(&mut self, client: Handle, mask: DesktopMask) {
        self.published.desktops.insert(client, mask);
    }

    fn set_net_state(&mut self, client: Handle, state: NetStates) {
        self.published.net_state.insert(client, state);
    }

    fn set_client_list(&mut self, _root: Handle, clients: &[Handle]) {
        self.published.client_list = clients.to_vec();
    }

    fn set_client_list_stacking(&mut self, _root: Handle, clients: &[Handle]) {
        self.published.client_list_stacking = clients.to_vec();
    }

    fn set_workarea(&mut self, _root: Handle, areas: &[Geometry]) {
        self.published.workarea = areas.to_vec();
    }

    fn set_viewport(&mut self, _root: Handle, x: i32, y: i32) {
        self.published.viewport = Some(Point::new(x, y));
    }

    fn set_current_desktop(&mut self, _root: Handle, desktop: u32) {
        self.published.current_desktop = Some(desktop);
    }

    fn set_active_window(&mut self, _root: Handle, client: Option<Handle>) {
        self.published.active = client;
    }
}

impl Decorator for MockBackend {
    fn redraw_titlebar(&mut self, window: &ManagedWindow) {
        self.calls.push(Call::RedrawTitlebar(window.id));
    }

    fn redraw_handlebar(&mut self, window: &ManagedWindow) {
        self.calls.push(Call::RedrawHandlebar(window.id));
    }

    fn focus_changed(&mut self, window: &ManagedWindow, focused: bool) {
        self.calls.push(Call::FocusChanged(window.id, focused));
    }

    fn button_pressed(&mut self, _window: &ManagedWindow, button: Handle) {
        self.calls.push(Call::ButtonPressed(button));
    }
}

impl Furniture for MockBackend {
    fn relayout_docks(&mut self, screen: ScreenId, _docks: &[DockApp]) {
        self.calls.push(Call::RelayoutDocks(screen));
    }

    fn set_docks_visible(&mut self, _screen: ScreenId, visible: bool) {
        self.calls.push(Call::SetDocksVisible(visible));
    }

    fn shift_menus(&mut self, _screen: ScreenId, dx: i32, dy: i32) {
        self.calls.push(Call::ShiftMenus(dx, dy));
    }
}
