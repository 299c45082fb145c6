//! Action bindings and the matching engine.
//!
//! A binding maps (event kind, detail, required modifiers, forbidden
//! modifiers) to a [`Behavior`]. Bindings live in ordered lists keyed by the
//! [`BindingContext`] of the object the event arrived on; every matching
//! binding in a list fires, in declaration order.

use std::collections::HashMap;

use bitflags::bitflags;
use regex::Regex;
use thiserror::Error;

/// Binding construction errors.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error("Unknown event kind: {0}")]
    EventKind(String),
    #[error("Invalid modifier: {0}")]
    Modifier(String),
    #[error("Invalid detail: {0}")]
    Detail(String),
    #[error("Unknown function: {0}")]
    Function(String),
    #[error("Function {0} needs a parameter")]
    MissingParam(String),
    #[error("Invalid class pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

bitflags! {
    /// Modifier and pointer-button state of an input event.
    ///
    /// The low thirteen bits follow the protocol's state mask. `MOVE_RESIZE`
    /// is a pseudo modifier the dispatcher sets while a modal session runs,
    /// so bindings can require or refuse it like any other bit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u16 {
        const SHIFT       = 1 << 0;
        const LOCK        = 1 << 1;
        const CONTROL     = 1 << 2;
        const MOD1        = 1 << 3;
        const MOD2        = 1 << 4;
        const MOD3        = 1 << 5;
        const MOD4        = 1 << 6;
        const MOD5        = 1 << 7;
        const BUTTON1     = 1 << 8;
        const BUTTON2     = 1 << 9;
        const BUTTON3     = 1 << 10;
        const BUTTON4     = 1 << 11;
        const BUTTON5     = 1 << 12;
        const MOVE_RESIZE = 1 << 13;
    }
}

impl Modifiers {
    /// Bits the display server reports; everything else is ours.
    pub const PROTOCOL: Self = Self::from_bits_truncate((1 << 13) - 1);

    pub fn from_name(name: &str) -> Result<Self, BindingError> {
        let flag = match name.trim().to_lowercase().as_str() {
            "shift" => Self::SHIFT,
            "lock" | "capslock" => Self::LOCK,
            "control" | "ctrl" => Self::CONTROL,
            "mod1" | "alt" => Self::MOD1,
            "mod2" | "numlock" => Self::MOD2,
            "mod3" => Self::MOD3,
            "mod4" | "super" | "win" => Self::MOD4,
            "mod5" => Self::MOD5,
            "button1" => Self::BUTTON1,
            "button2" => Self::BUTTON2,
            "button3" => Self::BUTTON3,
            "button4" => Self::BUTTON4,
            "button5" => Self::BUTTON5,
            "moveresize" => Self::MOVE_RESIZE,
            other => return Err(BindingError::Modifier(other.to_string())),
        };
        Ok(flag)
    }

    /// Parse a `&`-separated list where a leading `!` marks a forbidden
    /// modifier, e.g. `"Mod1&!Shift&MoveResize"`. Returns (required,
    /// forbidden).
    pub fn parse_constraints(s: &str) -> Result<(Self, Self), BindingError> {
        let mut required = Self::empty();
        let mut forbidden = Self::empty();

        for part in s.split('&').map(str::trim).filter(|p| !p.is_empty()) {
            match part.strip_prefix('!') {
                Some(name) => forbidden |= Self::from_name(name)?,
                None => required |= Self::from_name(part)?,
            }
        }

        Ok((required, forbidden))
    }
}

/// The closed set of event kinds a binding can react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    ButtonPress,
    ButtonRelease,
    DoubleClick,
    KeyPress,
    KeyRelease,
    EnterNotify,
    LeaveNotify,
    MapRequest,
}

impl ActionKind {
    pub fn from_name(name: &str) -> Result<Self, BindingError> {
        let kind = match name.trim().to_lowercase().as_str() {
            "buttonpress" => Self::ButtonPress,
            "buttonrelease" => Self::ButtonRelease,
            "doubleclick" => Self::DoubleClick,
            "keypress" => Self::KeyPress,
            "keyrelease" => Self::KeyRelease,
            "enternotify" => Self::EnterNotify,
            "leavenotify" => Self::LeaveNotify,
            "maprequest" => Self::MapRequest,
            other => return Err(BindingError::EventKind(other.to_string())),
        };
        Ok(kind)
    }

    pub const fn is_button(self) -> bool {
        matches!(
            self,
            Self::ButtonPress | Self::ButtonRelease | Self::DoubleClick
        )
    }

    pub const fn is_key(self) -> bool {
        matches!(self, Self::KeyPress | Self::KeyRelease)
    }
}

/// What the dispatcher knows about an event when matching bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionEvent {
    pub kind: ActionKind,
    /// Button number or key code; 0 for crossings and map requests.
    pub detail: u32,
    pub state: Modifiers,
}

/// Functions a binding can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Behavior {
    Nop,
    Raise,
    Lower,
    Focus,
    RaiseFocus,
    Move,
    MoveOpaque,
    ResizeLeft,
    ResizeRight,
    ResizeLeftOpaque,
    ResizeRightOpaque,
    EndMoveResize,
    Maximize,
    UnMaximize,
    ToggleMaximize,
    Shade,
    UnShade,
    ToggleShade,
    Sticky,
    UnSticky,
    ToggleSticky,
    Minimize,
    UnMinimize,
    ToggleMinimize,
    AlwaysOnTopOn,
    AlwaysOnTopOff,
    AlwaysOnTopToggle,
    AlwaysAtBottomOn,
    AlwaysAtBottomOff,
    AlwaysAtBottomToggle,
    DecorTitleOn,
    DecorTitleOff,
    DecorTitleToggle,
    DecorHandleOn,
    DecorHandleOff,
    DecorHandleToggle,
    DecorBorderOn,
    DecorBorderOff,
    DecorBorderToggle,
    DecorAllOn,
    DecorAllOff,
    AcceptConfigRequestOn,
    AcceptConfigRequestOff,
    AcceptConfigRequestToggle,
    Close,
    Kill,
    CloseKill,
    MoveResize,
    MoveResizeVirtual,
    JoinDesktop,
    PartDesktop,
    PartCurrentDesktop,
    JoinAllDesktops,
    PartAllDesktopsExceptCurrent,
    PartCurrentJoinDesktop,
    SetDesktopMask,
    MoveViewportLeft,
    MoveViewportRight,
    MoveViewportUp,
    MoveViewportDown,
    ViewportFixedMove,
    ViewportRelativeMove,
    ViewportMove,
    GoToDesktop,
    NextDesktop,
    PreviousDesktop,
    NextTask,
    PreviousTask,
    PointerFixedWarp,
    PointerRelativeWarp,
    Exec,
    Restart,
    Exit,
}

const BEHAVIOR_NAMES: &[(&str, Behavior)] = &[
    ("nop", Behavior::Nop),
    ("raise", Behavior::Raise),
    ("lower", Behavior::Lower),
    ("focus", Behavior::Focus),
    ("raisefocus", Behavior::RaiseFocus),
    ("move", Behavior::Move),
    ("moveopaque", Behavior::MoveOpaque),
    ("resizeleft", Behavior::ResizeLeft),
    ("resizeright", Behavior::ResizeRight),
    ("resizeleftopaque", Behavior::ResizeLeftOpaque),
    ("resizerightopaque", Behavior::ResizeRightOpaque),
    ("endmoveresize", Behavior::EndMoveResize),
    ("maximize", Behavior::Maximize),
    ("unmaximize", Behavior::UnMaximize),
    ("togglemaximize", Behavior::ToggleMaximize),
    ("shade", Behavior::Shade),
    ("unshade", Behavior::UnShade),
    ("toggleshade", Behavior::ToggleShade),
    ("sticky", Behavior::Sticky),
    ("unsticky", Behavior::UnSticky),
    ("togglesticky", Behavior::ToggleSticky),
    ("minimize", Behavior::Minimize),
    ("unminimize", Behavior::UnMinimize),
    ("toggleminimize", Behavior::ToggleMinimize),
    ("alwaysontopon", Behavior::AlwaysOnTopOn),
    ("alwaysontopoff", Behavior::AlwaysOnTopOff),
    ("alwaysontoptoggle", Behavior::AlwaysOnTopToggle),
    ("alwaysatbottomon", Behavior::AlwaysAtBottomOn),
    ("alwaysatbottomoff", Behavior::AlwaysAtBottomOff),
    ("alwaysatbottomtoggle", Behavior::AlwaysAtBottomToggle),
    ("decortitleon", Behavior::DecorTitleOn),
    ("decortitleoff", Behavior::DecorTitleOff),
    ("decortitletoggle", Behavior::DecorTitleToggle),
    ("decorhandleon", Behavior::DecorHandleOn),
    ("decorhandleoff", Behavior::DecorHandleOff),
    ("decorhandletoggle", Behavior::DecorHandleToggle),
    ("decorborderon", Behavior::DecorBorderOn),
    ("decorborderoff", Behavior::DecorBorderOff),
    ("decorbordertoggle", Behavior::DecorBorderToggle),
    ("decorallon", Behavior::DecorAllOn),
    ("decoralloff", Behavior::DecorAllOff),
    ("acceptconfigrequeston", Behavior::AcceptConfigRequestOn),
    ("acceptconfigrequestoff", Behavior::AcceptConfigRequestOff),
    ("acceptconfigrequesttoggle", Behavior::AcceptConfigRequestToggle),
    ("close", Behavior::Close),
    ("kill", Behavior::Kill),
    ("closekill", Behavior::CloseKill),
    ("moveresize", Behavior::MoveResize),
    ("moveresizevirtual", Behavior::MoveResizeVirtual),
    ("joindesktop", Behavior::JoinDesktop),
    ("partdesktop", Behavior::PartDesktop),
    ("partcurrentdesktop", Behavior::PartCurrentDesktop),
    ("joinalldesktops", Behavior::JoinAllDesktops),
    (
        "partalldesktopsexceptcurrent",
        Behavior::PartAllDesktopsExceptCurrent,
    ),
    ("partcurrentjoindesktop", Behavior::PartCurrentJoinDesktop),
    ("setdesktopmask", Behavior::SetDesktopMask),
    ("moveviewportleft", Behavior::MoveViewportLeft),
    ("moveviewportright", Behavior::MoveViewportRight),
    ("moveviewportup", Behavior::MoveViewportUp),
    ("moveviewportdown", Behavior::MoveViewportDown),
    ("viewportfixedmove", Behavior::ViewportFixedMove),
    ("viewportrelativemove", Behavior::ViewportRelativeMove),
    ("viewportmove", Behavior::ViewportMove),
    ("gotodesktop", Behavior::GoToDesktop),
    ("nextdesktop", Behavior::NextDesktop),
    ("previousdesktop", Behavior::PreviousDesktop),
    ("nexttask", Behavior::NextTask),
    ("previoustask", Behavior::PreviousTask),
    ("pointerfixedwarp", Behavior::PointerFixedWarp),
    ("pointerrelativewarp", Behavior::PointerRelativeWarp),
    ("exec", Behavior::Exec),
    ("restart", Behavior::Restart),
    ("exit", Behavior::Exit),
];

impl Behavior {
    /// Look up a function by name, ignoring case.
    pub fn from_name(name: &str) -> Result<Self, BindingError> {
        let name = name.trim();
        BEHAVIOR_NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, b)| b)
            .ok_or_else(|| BindingError::Function(name.to_string()))
    }

    pub fn name(self) -> &'static str {
        BEHAVIOR_NAMES
            .iter()
            .find(|&&(_, b)| b == self)
            .map_or("nop", |&(n, _)| n)
    }

    /// Functions that do nothing without an argument string.
    pub const fn needs_param(self) -> bool {
        matches!(
            self,
            Self::MoveResize
                | Self::MoveResizeVirtual
                | Self::JoinDesktop
                | Self::PartDesktop
                | Self::PartCurrentJoinDesktop
                | Self::SetDesktopMask
                | Self::ViewportFixedMove
                | Self::ViewportRelativeMove
                | Self::GoToDesktop
                | Self::PointerFixedWarp
                | Self::PointerRelativeWarp
                | Self::Exec
        )
    }

    /// Functions that only make sense on a managed window.
    pub const fn targets_window(self) -> bool {
        !matches!(
            self,
            Self::Nop
                | Self::EndMoveResize
                | Self::MoveViewportLeft
                | Self::MoveViewportRight
                | Self::MoveViewportUp
                | Self::MoveViewportDown
                | Self::ViewportFixedMove
                | Self::ViewportRelativeMove
                | Self::ViewportMove
                | Self::GoToDesktop
                | Self::NextDesktop
                | Self::PreviousDesktop
                | Self::NextTask
                | Self::PreviousTask
                | Self::PointerFixedWarp
                | Self::PointerRelativeWarp
                | Self::Exec
                | Self::Restart
                | Self::Exit
        )
    }
}

impl std::fmt::Display for Behavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of an action list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionBinding {
    pub kind: ActionKind,
    /// 0 matches any detail.
    pub detail: u32,
    pub required: Modifiers,
    pub forbidden: Modifiers,
    pub behavior: Behavior,
    pub param: Option<String>,
    /// Deferred execution delay in milliseconds; 0 runs immediately.
    pub delay_ms: u32,
    /// Replay the triggering press to the client after the action ran.
    pub replay: bool,
}

impl ActionBinding {
    pub const fn new(kind: ActionKind, detail: u32, behavior: Behavior) -> Self {
        Self {
            kind,
            detail,
            required: Modifiers::empty(),
            forbidden: Modifiers::empty(),
            behavior,
            param: None,
            delay_ms: 0,
            replay: false,
        }
    }

    #[must_use]
    pub const fn require(mut self, mods: Modifiers) -> Self {
        self.required = mods;
        self
    }

    #[must_use]
    pub const fn forbid(mut self, mods: Modifiers) -> Self {
        self.forbidden = mods;
        self
    }

    #[must_use]
    pub fn param(mut self, param: impl Into<String>) -> Self {
        self.param = Some(param.into());
        self
    }

    #[must_use]
    pub const fn delay(mut self, ms: u32) -> Self {
        self.delay_ms = ms;
        self
    }

    #[must_use]
    pub const fn replay(mut self, replay: bool) -> Self {
        self.replay = replay;
        self
    }

    /// Parse a detail string: a number, `ButtonN`, or `Any`/empty for the
    /// wildcard.
    pub fn parse_detail(s: &str) -> Result<u32, BindingError> {
        let t = s.trim();
        if t.is_empty() || t.eq_ignore_ascii_case("any") {
            return Ok(0);
        }
        let digits = t
            .get(..6)
            .filter(|p| p.eq_ignore_ascii_case("button"))
            .map_or(t, |_| &t[6..]);
        digits
            .parse::<u32>()
            .map_err(|_| BindingError::Detail(t.to_string()))
    }

    /// The matching rule every dispatch path uses.
    pub fn matches(&self, event: &ActionEvent) -> bool {
        self.kind == event.kind
            && (self.detail == 0 || self.detail == event.detail)
            && event.state.contains(self.required)
            && !event.state.intersects(self.forbidden)
    }
}

/// The object capability an action list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingContext {
    /// Client window while it has focus.
    WindowActive,
    /// Client window without focus.
    WindowPassive,
    Frame,
    Title,
    Label,
    Handle,
    LeftGrip,
    RightGrip,
    Button,
    Root,
    WestEdge,
    EastEdge,
    NorthEdge,
    SouthEdge,
}

impl BindingContext {
    pub const ALL: [Self; 14] = [
        Self::WindowActive,
        Self::WindowPassive,
        Self::Frame,
        Self::Title,
        Self::Label,
        Self::Handle,
        Self::LeftGrip,
        Self::RightGrip,
        Self::Button,
        Self::Root,
        Self::WestEdge,
        Self::EastEdge,
        Self::NorthEdge,
        Self::SouthEdge,
    ];

    /// Whether the lists of this context can be overridden per window class.
    pub const fn per_window(self) -> bool {
        !matches!(
            self,
            Self::Root | Self::WestEdge | Self::EastEdge | Self::NorthEdge | Self::SouthEdge
        )
    }
}

/// Ordered action lists keyed by context.
#[derive(Debug, Clone, Default)]
pub struct BindingSet {
    lists: HashMap<BindingContext, Vec<ActionBinding>>,
}

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, context: BindingContext, binding: ActionBinding) {
        self.lists.entry(context).or_default().push(binding);
    }

    #[must_use]
    pub fn with(mut self, context: BindingContext, binding: ActionBinding) -> Self {
        self.push(context, binding);
        self
    }

    pub fn list(&self, context: BindingContext) -> &[ActionBinding] {
        self.lists.get(&context).map_or(&[], Vec::as_slice)
    }

    pub fn has(&self, context: BindingContext) -> bool {
        !self.list(context).is_empty()
    }
}

/// Identity strings a class rule is matched against.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowIdentity<'a> {
    pub class: &'a str,
    pub name: &'a str,
    pub title: &'a str,
}

/// Overrides window-scoped lists for windows whose class, instance name or
/// title matches `pattern`.
#[derive(Debug, Clone)]
pub struct ClassRule {
    pub pattern: Regex,
    pub set: BindingSet,
}

impl ClassRule {
    pub fn new(pattern: &str, set: BindingSet) -> Result<Self, BindingError> {
        let pattern = Regex::new(pattern).map_err(|source| BindingError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { pattern, set })
    }

    pub fn applies_to(&self, id: &WindowIdentity<'_>) -> bool {
        self.pattern.is_match(id.class)
            || self.pattern.is_match(id.name)
            || self.pattern.is_match(id.title)
    }
}

/// All action lists the dispatcher consults.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    pub default: BindingSet,
    pub rules: Vec<ClassRule>,
}

impl Bindings {
    /// Resolve the list for `context`. The first class rule that matches
    /// the window and defines that context wins over the defaults.
    pub fn resolve(
        &self,
        context: BindingContext,
        window: Option<&WindowIdentity<'_>>,
    ) -> &[ActionBinding] {
        if let Some(id) = window.filter(|_| context.per_window()) {
            if let Some(rule) = self
                .rules
                .iter()
                .find(|r| r.set.has(context) && r.applies_to(id))
            {
                return rule.set.list(context);
            }
        }
        self.default.list(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(detail: u32, state: Modifiers) -> ActionEvent {
        ActionEvent {
            kind: ActionKind::ButtonPress,
            detail,
            state,
        }
    }

    #[test]
    fn test_modifier_constraints() {
        let (req, forb) = Modifiers::parse_constraints("Mod1 & !Shift&MoveResize").unwrap();
        assert_eq!(req, Modifiers::MOD1 | Modifiers::MOVE_RESIZE);
        assert_eq!(forb, Modifiers::SHIFT);
        assert!(Modifiers::parse_constraints("Hyper").is_err());
        assert_eq!(
            Modifiers::parse_constraints("").unwrap(),
            (Modifiers::empty(), Modifiers::empty())
        );
    }

    #[test]
    fn test_eventmatch_detail_wildcard() {
        let any = ActionBinding::new(ActionKind::ButtonPress, 0, Behavior::Raise);
        let one = ActionBinding::new(ActionKind::ButtonPress, 1, Behavior::Raise);
        assert!(any.matches(&press(3, Modifiers::empty())));
        assert!(one.matches(&press(1, Modifiers::empty())));
        assert!(!one.matches(&press(3, Modifiers::empty())));
    }

    #[test]
    fn test_eventmatch_modifiers() {
        let b = ActionBinding::new(ActionKind::ButtonPress, 1, Behavior::Move)
            .require(Modifiers::MOD1)
            .forbid(Modifiers::SHIFT);
        assert!(b.matches(&press(1, Modifiers::MOD1 | Modifiers::LOCK)));
        assert!(!b.matches(&press(1, Modifiers::MOD1 | Modifiers::SHIFT)));
        assert!(!b.matches(&press(1, Modifiers::empty())));
    }

    #[test]
    fn test_eventmatch_move_resize_pseudo_bit() {
        let during = ActionBinding::new(ActionKind::ButtonRelease, 1, Behavior::EndMoveResize)
            .require(Modifiers::MOVE_RESIZE);
        let outside = ActionBinding::new(ActionKind::ButtonRelease, 1, Behavior::Raise)
            .forbid(Modifiers::MOVE_RESIZE);
        let release = |state| ActionEvent {
            kind: ActionKind::ButtonRelease,
            detail: 1,
            state,
        };
        assert!(during.matches(&release(Modifiers::MOVE_RESIZE)));
        assert!(!during.matches(&release(Modifiers::empty())));
        assert!(outside.matches(&release(Modifiers::empty())));
        assert!(!outside.matches(&release(Modifiers::MOVE_RESIZE)));
    }

    #[test]
    fn test_eventmatch_kind_must_equal() {
        let b = ActionBinding::new(ActionKind::DoubleClick, 0, Behavior::ToggleShade);
        assert!(!b.matches(&press(1, Modifiers::empty())));
    }

    #[test]
    fn test_behavior_names() {
        assert_eq!(Behavior::from_name("RaiseFocus").unwrap(), Behavior::RaiseFocus);
        assert_eq!(
            Behavior::from_name("viewportFixedMove").unwrap(),
            Behavior::ViewportFixedMove
        );
        assert!(Behavior::from_name("menumap").is_err());
        assert_eq!(Behavior::ResizeLeftOpaque.to_string(), "resizeleftopaque");
        assert!(Behavior::Exec.needs_param());
        assert!(!Behavior::NextDesktop.targets_window());
        assert!(Behavior::Shade.targets_window());
    }

    #[test]
    fn test_parse_detail() {
        assert_eq!(ActionBinding::parse_detail("Button3").unwrap(), 3);
        assert_eq!(ActionBinding::parse_detail("38").unwrap(), 38);
        assert_eq!(ActionBinding::parse_detail("any").unwrap(), 0);
        assert!(ActionBinding::parse_detail("Buttonx").is_err());
    }

    #[test]
    fn test_class_rule_overrides_window_lists() {
        let default = BindingSet::new().with(
            BindingContext::Title,
            ActionBinding::new(ActionKind::ButtonPress, 1, Behavior::Raise),
        );
        let rule = ClassRule::new(
            "^XTerm$",
            BindingSet::new().with(
                BindingContext::Title,
                ActionBinding::new(ActionKind::ButtonPress, 1, Behavior::Lower),
            ),
        )
        .unwrap();
        let bindings = Bindings {
            default,
            rules: vec![rule],
        };

        let xterm = WindowIdentity {
            class: "XTerm",
            name: "xterm",
            title: "~",
        };
        let other = WindowIdentity {
            class: "Firefox",
            ..WindowIdentity::default()
        };
        assert_eq!(
            bindings.resolve(BindingContext::Title, Some(&xterm))[0].behavior,
            Behavior::Lower
        );
        assert_eq!(
            bindings.resolve(BindingContext::Title, Some(&other))[0].behavior,
            Behavior::Raise
        );
        assert!(bindings.resolve(BindingContext::Root, Some(&xterm)).is_empty());
    }
}
