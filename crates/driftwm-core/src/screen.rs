//! Per-screen viewport, desktop and work-area model.
//!
//! The virtual space of a screen is `virtual_x × virtual_y` physical screens
//! large. Managed windows keep their geometry relative to the physical
//! screen, so scrolling the viewport means shifting every non-sticky window
//! by the negated scroll delta.

use crate::desktop::{Desktop, DesktopMask};
use crate::geometry::Geometry;
use crate::registry::{Edge, Handle};
use crate::stacking::Stacking;

/// Space reserved along the screen borders by a panel-like client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Strut {
    pub left: i32,
    pub right: i32,
    pub top: i32,
    pub bottom: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrutEntry {
    pub owner: Handle,
    pub strut: Strut,
}

/// One-screen viewport steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    West,
    East,
    North,
    South,
}

/// Outcome of a one-screen viewport step: where the viewport goes and how
/// far the pointer is warped so it stays near the edge it crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportStep {
    pub x: i32,
    pub y: i32,
    pub warp_dx: i32,
    pub warp_dy: i32,
}

/// Pixels the pointer ends up away from the far edge after a step.
const EDGE_MARGIN: i32 = 6;

/// An embedded dock application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DockApp {
    pub client: Handle,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone)]
pub struct Screen {
    pub root: Handle,
    pub width: i32,
    pub height: i32,
    /// Size of the virtual space in physical screens.
    pub virtual_x: i32,
    pub virtual_y: i32,
    /// Current viewport offset.
    pub vx: i32,
    pub vy: i32,
    pub desktops: Vec<Desktop>,
    /// Index into `desktops`.
    pub current: usize,
    pub stacking: Stacking,
    pub struts: Vec<StrutEntry>,
    /// West, east, north and south edge strips, in [`Edge::ALL`] order.
    pub edges: [Handle; 4],
    pub edge_thickness: i32,
    /// Desktops the dock holders are shown on.
    pub dock_desktops: DesktopMask,
    pub docks: Vec<DockApp>,
    /// Whether the root window holds the input focus.
    pub root_focused: bool,
}

impl Screen {
    pub fn new(root: Handle, width: i32, height: i32, virtual_x: i32, virtual_y: i32) -> Self {
        let full = Geometry::new(0, 0, width, height);
        Self {
            root,
            width,
            height,
            virtual_x: virtual_x.max(1),
            virtual_y: virtual_y.max(1),
            vx: 0,
            vy: 0,
            desktops: vec![Desktop::new(0, "Desktop 1", full)],
            current: 0,
            stacking: Stacking::new(),
            struts: Vec::new(),
            edges: [Handle::NONE; 4],
            edge_thickness: 2,
            dock_desktops: DesktopMask::ALL,
            docks: Vec::new(),
            root_focused: false,
        }
    }

    /// Replace the desktop list with `names.len()` desktops (at least one).
    #[must_use]
    pub fn with_desktops(mut self, names: &[String]) -> Self {
        let full = Geometry::new(0, 0, self.width, self.height);
        let count = names.len().clamp(1, DesktopMask::MAX_DESKTOPS as usize);
        self.desktops = (0..count)
            .map(|n| {
                let name = names
                    .get(n)
                    .cloned()
                    .unwrap_or_else(|| format!("Desktop {}", n + 1));
                Desktop::new(n as u32, name, full)
            })
            .collect();
        self.current = 0;
        self
    }

    pub const fn vmax_x(&self) -> i32 {
        (self.virtual_x - 1) * self.width
    }

    pub const fn vmax_y(&self) -> i32 {
        (self.virtual_y - 1) * self.height
    }

    pub fn clamp_viewport(&self, x: i32, y: i32) -> (i32, i32) {
        (x.clamp(0, self.vmax_x()), y.clamp(0, self.vmax_y()))
    }

    /// Move the viewport to the clamped `(x, y)` and return how far windows
    /// must shift, which is the negated scroll delta.
    pub fn set_viewport(&mut self, x: i32, y: i32) -> (i32, i32) {
        let (x, y) = self.clamp_viewport(x, y);
        let shift = (self.vx - x, self.vy - y);
        self.vx = x;
        self.vy = y;
        shift
    }

    /// One-screen step towards `direction`, or `None` at the border.
    pub fn viewport_step(&self, direction: Direction) -> Option<ViewportStep> {
        let (vx, vy) = (self.vx, self.vy);
        let step = match direction {
            Direction::West if vx > 0 => {
                let vd = self.width.min(vx);
                ViewportStep { x: vx - vd, y: vy, warp_dx: vd - EDGE_MARGIN, warp_dy: 0 }
            },
            Direction::East if vx < self.vmax_x() => {
                let vd = self.width.min(self.vmax_x() - vx);
                ViewportStep { x: vx + vd, y: vy, warp_dx: EDGE_MARGIN - vd, warp_dy: 0 }
            },
            Direction::North if vy > 0 => {
                let vd = self.height.min(vy);
                ViewportStep { x: vx, y: vy - vd, warp_dx: 0, warp_dy: vd - EDGE_MARGIN }
            },
            Direction::South if vy < self.vmax_y() => {
                let vd = self.height.min(self.vmax_y() - vy);
                ViewportStep { x: vx, y: vy + vd, warp_dx: 0, warp_dy: EDGE_MARGIN - vd }
            },
            _ => return None,
        };
        Some(step)
    }

    /// Apply a new physical size and reclamp the viewport. Returns the
    /// window shift caused by the reclamp.
    pub fn resize(&mut self, width: i32, height: i32) -> (i32, i32) {
        self.width = width;
        self.height = height;
        self.set_viewport(self.vx, self.vy)
    }

    pub fn current_desktop(&self) -> &Desktop {
        &self.desktops[self.current]
    }

    pub fn current_number(&self) -> u32 {
        self.current_desktop().number
    }

    pub fn desktop_count(&self) -> u32 {
        self.desktops.len() as u32
    }

    pub fn desktop_index(&self, number: u32) -> Option<usize> {
        self.desktops.iter().position(|d| d.number == number)
    }

    pub fn workarea(&self) -> Geometry {
        self.current_desktop().workarea
    }

    pub fn all_workareas(&self) -> Vec<Geometry> {
        self.desktops.iter().map(|d| d.workarea).collect()
    }

    /// Switch to the desktop at `index`, carrying the current work-area over.
    pub fn switch_desktop(&mut self, index: usize) {
        let workarea = self.workarea();
        self.desktops[index].workarea = workarea;
        self.current = index;
    }

    /// Store a new work-area for the current desktop; true when it changed.
    pub fn set_workarea(&mut self, area: Geometry) -> bool {
        let current = &mut self.desktops[self.current].workarea;
        if *current == area {
            return false;
        }
        *current = area;
        true
    }

    /// Work-area left over by `struts`: largest left/top reservation,
    /// smallest remaining right/bottom extent, made relative to the origin.
    pub fn compute_workarea<'a>(&self, struts: impl IntoIterator<Item = &'a Strut>) -> Geometry {
        let (mut x, mut y, mut right, mut bottom) = (0, 0, self.width, self.height);
        for s in struts {
            x = x.max(s.left);
            y = y.max(s.top);
            right = right.min(self.width - s.right);
            bottom = bottom.min(self.height - s.bottom);
        }
        Geometry::new(x, y, right - x, bottom - y)
    }

    pub fn set_strut(&mut self, owner: Handle, strut: Strut) {
        match self.struts.iter_mut().find(|e| e.owner == owner) {
            Some(entry) => entry.strut = strut,
            None => self.struts.push(StrutEntry { owner, strut }),
        }
    }

    /// Forget the strut of `owner`; true if there was one.
    pub fn remove_strut(&mut self, owner: Handle) -> bool {
        let before = self.struts.len();
        self.struts.retain(|e| e.owner != owner);
        self.struts.len() != before
    }

    pub const fn edge_handle(&self, edge: Edge) -> Handle {
        self.edges[edge_index(edge)]
    }

    pub fn edge_at(&self, handle: Handle) -> Option<Edge> {
        if handle.is_none() {
            return None;
        }
        Edge::ALL.into_iter().find(|&e| self.edge_handle(e) == handle)
    }

    /// Placement of an edge strip on the physical screen.
    pub const fn edge_geometry(&self, edge: Edge) -> Geometry {
        let t = self.edge_thickness;
        match edge {
            Edge::West => Geometry::new(0, 0, t, self.height),
            Edge::East => Geometry::new(self.width - t, 0, t, self.height),
            Edge::North => Geometry::new(0, 0, self.width, t),
            Edge::South => Geometry::new(0, self.height - t, self.width, t),
        }
    }

    pub fn docks_visible(&self) -> bool {
        self.dock_desktops.contains(self.current_number())
    }
}

const fn edge_index(edge: Edge) -> usize {
    match edge {
        Edge::West => 0,
        Edge::East => 1,
        Edge::North => 2,
        Edge::South => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn screen() -> Screen {
        Screen::new(Handle(1), 800, 600, 3, 2)
    }

    #[test]
    fn test_viewport_clamps_and_reports_shift() {
        let mut s = screen();
        assert_eq!(s.vmax_x(), 1600);
        assert_eq!(s.vmax_y(), 600);
        assert_eq!(s.set_viewport(900, -40), (-900, 0));
        assert_eq!((s.vx, s.vy), (900, 0));
        assert_eq!(s.set_viewport(5000, 5000), (-700, -600));
        assert_eq!((s.vx, s.vy), (1600, 600));
    }

    #[test]
    fn test_viewport_step_limits_to_remaining_distance() {
        let mut s = screen();
        assert_eq!(s.viewport_step(Direction::West), None);
        s.set_viewport(1200, 0);
        let east = s.viewport_step(Direction::East).unwrap();
        assert_eq!((east.x, east.warp_dx), (1600, 6 - 400));
        let west = s.viewport_step(Direction::West).unwrap();
        assert_eq!((west.x, west.warp_dx), (400, 800 - 6));
        let south = s.viewport_step(Direction::South).unwrap();
        assert_eq!((south.y, south.warp_dy), (600, 6 - 600));
    }

    #[test]
    fn test_workarea_from_struts() {
        let s = screen();
        let panel = Strut {
            top: 24,
            ..Strut::default()
        };
        let dock = Strut {
            right: 64,
            bottom: 10,
            ..Strut::default()
        };
        assert_eq!(s.compute_workarea([&panel, &dock]), Geometry::new(0, 24, 736, 566));
        assert_eq!(s.compute_workarea(std::iter::empty()), Geometry::new(0, 0, 800, 600));
    }

    #[test]
    fn test_switch_desktop_carries_workarea() {
        let names = vec!["one".to_string(), "two".to_string()];
        let mut s = screen().with_desktops(&names);
        assert!(s.set_workarea(Geometry::new(0, 20, 800, 580)));
        assert!(!s.set_workarea(Geometry::new(0, 20, 800, 580)));
        s.switch_desktop(1);
        assert_eq!(s.current_number(), 1);
        assert_eq!(s.workarea(), Geometry::new(0, 20, 800, 580));
    }

    #[test]
    fn test_edges() {
        let mut s = screen();
        s.edges = [Handle(10), Handle(11), Handle::NONE, Handle(13)];
        assert_eq!(s.edge_at(Handle(11)), Some(Edge::East));
        assert_eq!(s.edge_at(Handle::NONE), None);
        assert_eq!(s.edge_geometry(Edge::South), Geometry::new(0, 598, 800, 2));
    }

    #[test]
    fn test_resize_reclamps() {
        let mut s = screen();
        s.set_viewport(1600, 600);
        assert_eq!(s.resize(1000, 500), (0, 100));
        assert_eq!((s.vx, s.vy), (1600, 500));
    }
}
