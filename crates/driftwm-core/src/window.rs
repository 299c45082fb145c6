//! Managed window model and the size-increment check.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::desktop::DesktopMask;
use crate::geometry::{Geometry, Gravity};
use crate::input::WindowIdentity;
use crate::registry::{Handle, ScreenId};

/// Stable key of a managed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "win:{}", self.0)
    }
}

bitflags! {
    /// Window state flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WindowFlags: u32 {
        /// Excluded from viewport scrolling.
        const STICKY             = 1 << 0;
        /// Frame unmapped: off the current desktop or minimized.
        const HIDDEN             = 1 << 1;
        /// Never raised or lowered (desktop-type utility windows).
        const FORCE_BOTTOM       = 1 << 2;
        /// Configure requests from the client are ignored.
        const IGNORE_CONFIG_REQ  = 1 << 3;
        /// Suppress outgoing geometry notifications while set.
        const DONT_SEND          = 1 << 4;
        /// The client is gone; teardown in progress.
        const DESTROYED          = 1 << 5;
        const MAPPED             = 1 << 6;
        const FOCUSED            = 1 << 7;
        /// Target of the running interaction session.
        const MOVE_RESIZE        = 1 << 8;
        /// Fullscreen requested through the state hint.
        const FULLSCREEN         = 1 << 9;
        const MINIMIZED          = 1 << 10;
        /// Focus once mapped.
        const WANT_FOCUS         = 1 << 11;
    }
}

bitflags! {
    /// Which decoration elements a window shows.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DecorFlags: u8 {
        const TITLE  = 1 << 0;
        const HANDLE = 1 << 1;
        const BORDER = 1 << 2;
    }
}

impl Default for DecorFlags {
    fn default() -> Self {
        Self::all()
    }
}

/// Stacking tier of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    OnTop,
    #[default]
    Normal,
    AtBottom,
}

/// Configured decoration thicknesses, independent of what a window shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecorStyle {
    pub title_height: i32,
    pub handle_height: i32,
    pub border_width: i32,
    /// Title bar buttons created per frame.
    pub buttons: u8,
}

impl Default for DecorStyle {
    fn default() -> Self {
        Self {
            title_height: 20,
            handle_height: 6,
            border_width: 1,
            buttons: 3,
        }
    }
}

/// Effective decoration thicknesses; zero for elements that are off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decor {
    pub title_w: i32,
    pub handle_w: i32,
    pub border_w: i32,
}

impl Decor {
    pub fn new(flags: DecorFlags, style: &DecorStyle) -> Self {
        let pick = |flag, value| if flags.contains(flag) { value } else { 0 };
        Self {
            title_w: pick(DecorFlags::TITLE, style.title_height),
            handle_w: pick(DecorFlags::HANDLE, style.handle_height),
            border_w: pick(DecorFlags::BORDER, style.border_width),
        }
    }

    pub const fn has_title(&self) -> bool {
        self.title_w > 0
    }

    pub const fn has_handle(&self) -> bool {
        self.handle_w > 0
    }

    /// Client height that collapses the frame to its title bar.
    pub const fn shaded_height(&self) -> i32 {
        let h = -(self.handle_w + self.border_w);
        if self.has_handle() {
            h - self.border_w
        } else {
            h
        }
    }

    /// Heights at or below this request a shade.
    pub const fn shade_threshold(&self) -> i32 {
        -(self.handle_w + self.border_w * 2)
    }

    /// Frame rectangle around a client at `client`.
    pub const fn frame_around(&self, client: Geometry) -> Geometry {
        let mut y = client.y - self.border_w;
        let mut height = client.height;
        if self.has_title() {
            y -= self.title_w + self.border_w;
            height += self.title_w + self.border_w;
        }
        if self.has_handle() {
            height += self.handle_w + self.border_w;
        }
        Geometry::new(client.x - self.border_w, y, client.width, height)
    }
}

/// Client size constraints from the normal-hints property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeHints {
    pub min_width: i32,
    pub min_height: i32,
    pub max_width: i32,
    pub max_height: i32,
    pub base_width: i32,
    pub base_height: i32,
    pub width_inc: i32,
    pub height_inc: i32,
    pub gravity: Gravity,
}

impl Default for SizeHints {
    fn default() -> Self {
        Self {
            min_width: 1,
            min_height: 1,
            max_width: 65536,
            max_height: 65536,
            base_width: 1,
            base_height: 1,
            width_inc: 1,
            height_inc: 1,
            gravity: Gravity::NorthWest,
        }
    }
}

impl SizeHints {
    /// Clamp nonsense client values and enforce a minimum width that keeps
    /// the title bar buttons usable.
    #[must_use]
    pub fn normalized(mut self, decor: &Decor) -> Self {
        self.width_inc = self.width_inc.max(1);
        self.height_inc = self.height_inc.max(1);
        self.min_width = self
            .min_width
            .max((decor.title_w - 4) * 3 + 8)
            .max(50 + decor.border_w);
        self.max_width = self.max_width.max(self.min_width);
        self.max_height = self.max_height.max(self.min_height);
        self
    }
}

/// Shade transition implied by a size check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadeChange {
    None,
    Shade,
    Unshade,
}

/// An accepted size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeCheck {
    pub width: i32,
    pub height: i32,
    pub shade: ShadeChange,
}

/// Everything the size check looks at.
#[derive(Debug, Clone, Copy)]
pub struct SizingState<'a> {
    pub width: i32,
    pub height: i32,
    pub shaded: bool,
    pub hints: &'a SizeHints,
    pub decor: Decor,
}

const fn snap(value: i32, base: i32, inc: i32) -> i32 {
    if inc <= 1 {
        value
    } else {
        value - (value - base) % inc
    }
}

/// Decide whether a candidate client size may be applied.
///
/// A dimension is accepted when it moved by at least one increment (or is
/// unchanged) and lies within min/max; accepted values snap down onto the
/// increment grid anchored at the base size. Heights at or below the shade
/// threshold shade a titled window down to its shaded height; a height
/// below 1 with a minimum height of at most 1 shades it too but keeps the
/// snapped request. An in-bounds height unshades. Returns `None` when
/// nothing may change.
pub fn inc_size_check(state: &SizingState<'_>, width: i32, height: i32) -> Option<SizeCheck> {
    let hints = state.hints;
    let winc = hints.width_inc.max(1);
    let hinc = hints.height_inc.max(1);

    let mut accepted = false;
    let mut check = SizeCheck {
        width: state.width,
        height: state.height,
        shade: ShadeChange::None,
    };

    let width_step = width >= state.width + winc || width <= state.width - winc || width == state.width;
    if width_step && (hints.min_width..=hints.max_width).contains(&width) {
        accepted = true;
        check.width = snap(width, hints.base_width, winc);
    }

    let titled = state.decor.has_title();
    if titled && height <= state.decor.shade_threshold() {
        if !state.shaded {
            check.shade = ShadeChange::Shade;
        }
        check.height = state.decor.shaded_height();
        return accepted.then_some(check);
    }

    let height_step =
        height >= state.height + hinc || height <= state.height - hinc || height == state.height;
    if height_step {
        if height < 1 && hints.min_height <= 1 && titled {
            accepted = true;
            if !state.shaded {
                check.shade = ShadeChange::Shade;
            }
            check.height = snap(height, hints.base_height, hinc);
        } else if (hints.min_height..=hints.max_height).contains(&height) {
            accepted = true;
            if state.shaded {
                check.shade = ShadeChange::Unshade;
            }
            check.height = snap(height, hints.base_height, hinc);
        }
    }

    accepted.then_some(check)
}

/// State saved when a window is maximized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxRestore {
    /// Client size before maximizing.
    pub width: i32,
    pub height: i32,
    /// Client position before maximizing, relative to the maximized frame.
    pub dx: i32,
    pub dy: i32,
    /// Virtual position of the maximized frame; kept current while
    /// maximized so restoring works after the viewport scrolled.
    pub anchor_x: i32,
    pub anchor_y: i32,
}

/// Display handles of a frame and its decoration parts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameParts {
    pub frame: Handle,
    pub title: Handle,
    pub label: Handle,
    pub handle: Handle,
    pub left_grip: Handle,
    pub right_grip: Handle,
    pub buttons: Vec<Handle>,
}

impl FrameParts {
    /// All non-empty handles.
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        [
            self.frame,
            self.title,
            self.label,
            self.handle,
            self.left_grip,
            self.right_grip,
        ]
        .into_iter()
        .chain(self.buttons.iter().copied())
        .filter(|h| !h.is_none())
    }
}

/// A client window under management.
#[derive(Debug, Clone)]
pub struct ManagedWindow {
    pub id: WindowId,
    pub client: Handle,
    pub parts: FrameParts,
    pub screen: ScreenId,

    pub class: String,
    pub name: String,
    pub title: String,

    /// Client geometry as requested, in screen coordinates of the viewport.
    pub geometry: Geometry,
    /// Geometry last pushed to the display; `None` before the first redraw.
    pub applied: Option<Geometry>,
    /// Frame rectangle derived from `geometry` at the last redraw.
    pub frame: Geometry,

    pub decor_flags: DecorFlags,
    pub style: DecorStyle,
    pub hints: SizeHints,
    pub flags: WindowFlags,
    pub layer: Layer,
    pub desktops: DesktopMask,
    pub colormap: u32,

    /// Height to restore when unshading; set while shaded.
    pub shaded: Option<i32>,
    /// Pre-maximize state; set while maximized.
    pub maximized: Option<MaxRestore>,

    /// Dialog windows owned by this one, oldest first.
    pub transients: Vec<WindowId>,
    pub transient_for: Option<WindowId>,
}

impl ManagedWindow {
    pub fn new(id: WindowId, client: Handle, screen: ScreenId, geometry: Geometry) -> Self {
        Self {
            id,
            client,
            parts: FrameParts::default(),
            screen,
            class: String::new(),
            name: String::new(),
            title: String::new(),
            geometry,
            applied: None,
            frame: geometry,
            decor_flags: DecorFlags::default(),
            style: DecorStyle::default(),
            hints: SizeHints::default(),
            flags: WindowFlags::empty(),
            layer: Layer::Normal,
            desktops: DesktopMask::single(0),
            colormap: 0,
            shaded: None,
            maximized: None,
            transients: Vec::new(),
            transient_for: None,
        }
    }

    pub fn decor(&self) -> Decor {
        Decor::new(self.decor_flags, &self.style)
    }

    pub fn frame_geometry(&self) -> Geometry {
        self.decor().frame_around(self.geometry)
    }

    pub const fn is_shaded(&self) -> bool {
        self.shaded.is_some()
    }

    pub const fn is_maximized(&self) -> bool {
        self.maximized.is_some()
    }

    pub const fn is_sticky(&self) -> bool {
        self.flags.contains(WindowFlags::STICKY)
    }

    pub const fn is_hidden(&self) -> bool {
        self.flags.contains(WindowFlags::HIDDEN)
    }

    pub const fn is_minimized(&self) -> bool {
        self.flags.contains(WindowFlags::MINIMIZED)
    }

    /// Whether the frame is currently mapped on screen.
    pub const fn is_shown(&self) -> bool {
        self.flags.contains(WindowFlags::MAPPED) && !self.is_hidden()
    }

    pub const fn is_destroyed(&self) -> bool {
        self.flags.contains(WindowFlags::DESTROYED)
    }

    /// Height the client should be told about; the pre-shade one if shaded.
    pub fn client_height(&self) -> i32 {
        self.shaded.unwrap_or(self.geometry.height)
    }

    pub fn identity(&self) -> WindowIdentity<'_> {
        WindowIdentity {
            class: &self.class,
            name: &self.name,
            title: &self.title,
        }
    }

    pub fn sizing(&self) -> SizingState<'_> {
        SizingState {
            width: self.geometry.width,
            height: self.geometry.height,
            shaded: self.is_shaded(),
            hints: &self.hints,
            decor: self.decor(),
        }
    }

    /// Run the size check against this window's current state.
    pub fn check_size(&self, width: i32, height: i32) -> Option<SizeCheck> {
        inc_size_check(&self.sizing(), width, height)
    }

    /// Apply an accepted size, tracking the shade transition. Returns the
    /// shade change that actually happened.
    pub fn apply_size(&mut self, check: SizeCheck) -> ShadeChange {
        match check.shade {
            ShadeChange::Shade if self.shaded.is_none() => {
                self.shaded = Some(self.geometry.height);
            },
            ShadeChange::Unshade if self.shaded.is_some() => {
                self.shaded = None;
            },
            _ => {},
        }
        self.geometry.width = check.width;
        self.geometry.height = check.height;
        check.shade
    }

    /// Shift the client position between "frame reference point" and
    /// "client origin" according to its gravity; `multiplier` is 1 to
    /// apply and -1 to remove.
    pub fn gravitate(&mut self, multiplier: i32) {
        let d = self.decor();
        let (b, t, h) = (d.border_w, d.title_w, d.handle_w);
        let g = &mut self.geometry;
        match self.hints.gravity {
            Gravity::NorthWest | Gravity::NorthEast | Gravity::North => {
                match self.hints.gravity {
                    Gravity::NorthWest => g.x += multiplier * b,
                    Gravity::NorthEast => g.x -= multiplier * b,
                    _ => {},
                }
                g.y += multiplier * b;
                if t > 0 {
                    g.y += multiplier * (t + b);
                }
            },
            Gravity::SouthWest | Gravity::SouthEast | Gravity::South => {
                match self.hints.gravity {
                    Gravity::SouthWest => g.x += multiplier * b,
                    Gravity::SouthEast => g.x -= multiplier * b,
                    _ => {},
                }
                g.y -= multiplier * b;
                if h > 0 {
                    g.y -= multiplier * (h + b);
                }
            },
            Gravity::Center => {
                g.x += multiplier * (b / 2);
                g.y += multiplier * (b / 2);
                if t > 0 {
                    g.y += multiplier * ((t + b) / 2);
                }
            },
            Gravity::West | Gravity::East | Gravity::Static => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decor(title_w: i32, handle_w: i32, border_w: i32) -> Decor {
        Decor {
            title_w,
            handle_w,
            border_w,
        }
    }

    fn state(hints: &SizeHints, width: i32, height: i32, d: Decor) -> SizingState<'_> {
        SizingState {
            width,
            height,
            shaded: false,
            hints,
            decor: d,
        }
    }

    #[test]
    fn test_frame_geometry() {
        let d = decor(20, 6, 2);
        let f = d.frame_around(Geometry::new(100, 100, 400, 300));
        assert_eq!(f, Geometry::new(98, 76, 400, 300 + 22 + 8));
    }

    #[test]
    fn test_shaded_frame_collapses_to_title() {
        for d in [decor(20, 6, 2), decor(20, 0, 2), decor(18, 4, 0)] {
            let f = d.frame_around(Geometry::new(0, 0, 100, d.shaded_height()));
            assert_eq!(f.height, d.title_w);
        }
    }

    #[test]
    fn test_size_snapping() {
        let hints = SizeHints {
            min_width: 50,
            base_width: 50,
            width_inc: 10,
            ..SizeHints::default()
        };
        let s = state(&hints, 100, 100, decor(20, 6, 1));
        let check = inc_size_check(&s, 57, 100).unwrap();
        assert_eq!(check.width, 50);
        assert_eq!(check.height, 100);
        assert_eq!(check.shade, ShadeChange::None);
    }

    #[test]
    fn test_size_step_too_small_is_rejected() {
        let hints = SizeHints {
            width_inc: 10,
            height_inc: 10,
            ..SizeHints::default()
        };
        let s = state(&hints, 100, 100, decor(20, 6, 1));
        assert_eq!(inc_size_check(&s, 105, 104), None);
    }

    #[test]
    fn test_size_bounds() {
        let hints = SizeHints {
            min_width: 80,
            max_width: 200,
            ..SizeHints::default()
        };
        let s = state(&hints, 100, 100, decor(20, 6, 1));
        assert_eq!(inc_size_check(&s, 60, 90).map(|c| c.width), Some(100));
        assert_eq!(inc_size_check(&s, 300, 100).map(|c| c.width), Some(100));
        assert_eq!(
            inc_size_check(&s, 300, 0).map(|c| c.shade),
            Some(ShadeChange::Shade)
        );
    }

    #[test]
    fn test_small_height_shades_keeping_snapped_request() {
        let hints = SizeHints {
            min_height: 0,
            base_height: -3,
            height_inc: 2,
            ..SizeHints::default()
        };
        let d = decor(20, 6, 1);
        let s = state(&hints, 100, 100, d);
        let check = inc_size_check(&s, 100, 0).unwrap();
        assert_eq!(check.shade, ShadeChange::Shade);
        assert_eq!(check.height, -1);
        assert_ne!(check.height, d.shaded_height());

        let plain = SizeHints::default();
        let s = state(&plain, 100, 100, d);
        let check = inc_size_check(&s, 100, 0).unwrap();
        assert_eq!(check.shade, ShadeChange::Shade);
        assert_eq!(check.height, 0);
    }

    #[test]
    fn test_shade_threshold_shades_titled_window() {
        let hints = SizeHints::default();
        let d = decor(20, 6, 2);
        let s = state(&hints, 100, 100, d);
        let check = inc_size_check(&s, 100, d.shade_threshold()).unwrap();
        assert_eq!(check.shade, ShadeChange::Shade);
        assert_eq!(check.height, -(6 + 2 + 2));

        let untitled = state(&hints, 100, 100, decor(0, 6, 2));
        let check = inc_size_check(&untitled, 100, -10).unwrap();
        assert_eq!(check.shade, ShadeChange::None);
        assert_eq!(check.height, 100);
    }

    #[test]
    fn test_unshade_on_valid_height() {
        let hints = SizeHints::default();
        let d = decor(20, 0, 1);
        let s = SizingState {
            width: 100,
            height: d.shaded_height(),
            shaded: true,
            hints: &hints,
            decor: d,
        };
        let check = inc_size_check(&s, 100, 150).unwrap();
        assert_eq!(check.shade, ShadeChange::Unshade);
        assert_eq!(check.height, 150);
    }

    #[test]
    fn test_apply_size_tracks_restore_height() {
        let mut w = ManagedWindow::new(WindowId(1), Handle(5), 0, Geometry::new(0, 0, 200, 150));
        let d = w.decor();
        let check = w.check_size(200, d.shade_threshold()).unwrap();
        w.apply_size(check);
        assert_eq!(w.shaded, Some(150));
        assert_eq!(w.client_height(), 150);
        let check = w.check_size(200, 150).unwrap();
        assert_eq!(w.apply_size(check), ShadeChange::Unshade);
        assert_eq!(w.shaded, None);
        assert_eq!(w.geometry.height, 150);
    }

    #[test]
    fn test_gravitate_round_trip() {
        for gravity in [
            Gravity::NorthWest,
            Gravity::NorthEast,
            Gravity::South,
            Gravity::Center,
            Gravity::Static,
        ] {
            let mut w = ManagedWindow::new(WindowId(1), Handle(5), 0, Geometry::new(10, 20, 100, 100));
            w.hints.gravity = gravity;
            w.gravitate(1);
            w.gravitate(-1);
            assert_eq!(w.geometry, Geometry::new(10, 20, 100, 100), "{gravity:?}");
        }
    }

    #[test]
    fn test_normalized_hints() {
        let hints = SizeHints {
            width_inc: 0,
            min_width: 10,
            ..SizeHints::default()
        }
        .normalized(&decor(20, 6, 1));
        assert_eq!(hints.width_inc, 1);
        assert_eq!(hints.min_width, 56);
    }
}
