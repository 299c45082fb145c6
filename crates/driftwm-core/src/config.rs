//! Core configuration.
//!
//! Plain serde structures read from TOML. Binding lists are kept as strings
//! here and turned into typed [`Bindings`] by [`Config::bindings`], which is
//! also what validation runs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::desktop::DesktopMask;
use crate::input::{
    ActionBinding, ActionKind, Behavior, BindingContext, BindingError, BindingSet, Bindings,
    ClassRule, Modifiers,
};
use crate::window::DecorStyle;

/// Configuration errors, reported at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Binding #{index} in [bindings.{context}]: {source}")]
    Binding {
        context: &'static str,
        index: usize,
        #[source]
        source: BindingError,
    },

    #[error("Rule #{index}: {source}")]
    Rule {
        index: usize,
        #[source]
        source: BindingError,
    },

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub decor: DecorStyle,
    pub bindings: BindingsConfig,
    /// Per-class overrides of window-scoped lists, first match wins.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            decor: DecorStyle::default(),
            bindings: default_bindings(),
            rules: Vec::new(),
        }
    }
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.general;
        if !(1..=DesktopMask::MAX_DESKTOPS).contains(&g.desktop_count) {
            return Err(ConfigError::Invalid {
                field: "general.desktop_count",
                reason: format!("must be between 1 and {}", DesktopMask::MAX_DESKTOPS),
            });
        }
        if g.virtual_x < 1 || g.virtual_y < 1 {
            return Err(ConfigError::Invalid {
                field: "general.virtual_x/virtual_y",
                reason: "virtual size must be at least one screen".to_string(),
            });
        }
        if g.double_click_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "general.double_click_ms",
                reason: "must be positive".to_string(),
            });
        }
        if DesktopMask::parse(&g.dock_desktops, g.desktop_count).is_none() {
            return Err(ConfigError::Invalid {
                field: "general.dock_desktops",
                reason: format!("{:?} is not \"all\" or a list of numbers", g.dock_desktops),
            });
        }
        self.bindings()?;
        Ok(())
    }

    /// Build the typed action lists.
    pub fn bindings(&self) -> Result<Bindings, ConfigError> {
        let default = self.bindings.to_set()?;
        let rules = self
            .rules
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                let set = rule.bindings.to_set()?;
                ClassRule::new(&rule.pattern, set).map_err(|source| ConfigError::Rule { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Bindings { default, rules })
    }

    /// Desktop names padded with generated ones up to the desktop count.
    pub fn desktop_names(&self) -> Vec<String> {
        (0..self.general.desktop_count as usize)
            .map(|n| {
                self.general
                    .desktop_names
                    .get(n)
                    .cloned()
                    .unwrap_or_else(|| format!("Desktop {}", n + 1))
            })
            .collect()
    }

    pub fn dock_desktops(&self) -> DesktopMask {
        DesktopMask::parse(&self.general.dock_desktops, self.general.desktop_count)
            .unwrap_or(DesktopMask::ALL)
    }
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Two presses closer than this pair into a double click
    pub double_click_ms: u32,
    /// Number of desktops
    pub desktop_count: u32,
    /// Desktop names; missing ones are generated
    pub desktop_names: Vec<String>,
    /// Virtual space size in screens
    pub virtual_x: i32,
    pub virtual_y: i32,
    /// Thickness of the viewport edge strips; 0 disables them
    pub edge_thickness: i32,
    /// Give focus to newly mapped windows
    pub focus_new: bool,
    /// Keep transients above their owner when it is raised
    pub transient_above: bool,
    /// Desktops the dock holders are visible on ("all" or "0,2")
    pub dock_desktops: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            double_click_ms: 300,
            desktop_count: 4,
            desktop_names: Vec::new(),
            virtual_x: 3,
            virtual_y: 3,
            edge_thickness: 2,
            focus_new: true,
            transient_above: true,
            dock_desktops: "all".to_string(),
        }
    }
}

/// One binding as written in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingEntry {
    /// Event kind, e.g. "ButtonPress" or "DoubleClick"
    pub event: String,
    /// "Button1", a key code, or empty for any
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
    /// Constraints such as "Mod1&!Shift"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub modifiers: String,
    /// Function name
    pub function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    /// Deferred execution in milliseconds
    #[serde(default, skip_serializing_if = "is_zero")]
    pub delay: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub replay: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero(v: &u32) -> bool {
    *v == 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(v: &bool) -> bool {
    !*v
}

impl BindingEntry {
    pub fn new(event: &str, detail: &str, function: &str) -> Self {
        Self {
            event: event.to_string(),
            detail: detail.to_string(),
            modifiers: String::new(),
            function: function.to_string(),
            param: None,
            delay: 0,
            replay: false,
        }
    }

    #[must_use]
    pub fn modifiers(mut self, modifiers: &str) -> Self {
        self.modifiers = modifiers.to_string();
        self
    }

    #[must_use]
    pub fn param(mut self, param: &str) -> Self {
        self.param = Some(param.to_string());
        self
    }

    #[must_use]
    pub const fn replay(mut self) -> Self {
        self.replay = true;
        self
    }

    pub fn to_binding(&self) -> Result<ActionBinding, BindingError> {
        let kind = ActionKind::from_name(&self.event)?;
        let detail = ActionBinding::parse_detail(&self.detail)?;
        let (required, forbidden) = Modifiers::parse_constraints(&self.modifiers)?;
        let behavior = Behavior::from_name(&self.function)?;
        if behavior.needs_param() && self.param.as_deref().map_or(true, str::is_empty) {
            return Err(BindingError::MissingParam(self.function.clone()));
        }

        let mut binding = ActionBinding::new(kind, detail, behavior)
            .require(required)
            .forbid(forbidden)
            .delay(self.delay)
            .replay(self.replay);
        binding.param = self.param.clone();
        Ok(binding)
    }
}

/// Action lists per object kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingsConfig {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub window_active: Vec<BindingEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub window_passive: Vec<BindingEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub frame: Vec<BindingEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub title: Vec<BindingEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub label: Vec<BindingEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub handle: Vec<BindingEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub left_grip: Vec<BindingEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub right_grip: Vec<BindingEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub button: Vec<BindingEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub root: Vec<BindingEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub west_edge: Vec<BindingEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub east_edge: Vec<BindingEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub north_edge: Vec<BindingEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub south_edge: Vec<BindingEntry>,
}

impl BindingsConfig {
    pub fn entries(&self, context: BindingContext) -> &[BindingEntry] {
        match context {
            BindingContext::WindowActive => &self.window_active,
            BindingContext::WindowPassive => &self.window_passive,
            BindingContext::Frame => &self.frame,
            BindingContext::Title => &self.title,
            BindingContext::Label => &self.label,
            BindingContext::Handle => &self.handle,
            BindingContext::LeftGrip => &self.left_grip,
            BindingContext::RightGrip => &self.right_grip,
            BindingContext::Button => &self.button,
            BindingContext::Root => &self.root,
            BindingContext::WestEdge => &self.west_edge,
            BindingContext::EastEdge => &self.east_edge,
            BindingContext::NorthEdge => &self.north_edge,
            BindingContext::SouthEdge => &self.south_edge,
        }
    }

    pub fn to_set(&self) -> Result<BindingSet, ConfigError> {
        let mut set = BindingSet::new();
        for context in BindingContext::ALL {
            for (index, entry) in self.entries(context).iter().enumerate() {
                let binding = entry.to_binding().map_err(|source| ConfigError::Binding {
                    context: context_key(context),
                    index,
                    source,
                })?;
                set.push(context, binding);
            }
        }
        Ok(set)
    }
}

const fn context_key(context: BindingContext) -> &'static str {
    match context {
        BindingContext::WindowActive => "window_active",
        BindingContext::WindowPassive => "window_passive",
        BindingContext::Frame => "frame",
        BindingContext::Title => "title",
        BindingContext::Label => "label",
        BindingContext::Handle => "handle",
        BindingContext::LeftGrip => "left_grip",
        BindingContext::RightGrip => "right_grip",
        BindingContext::Button => "button",
        BindingContext::Root => "root",
        BindingContext::WestEdge => "west_edge",
        BindingContext::EastEdge => "east_edge",
        BindingContext::NorthEdge => "north_edge",
        BindingContext::SouthEdge => "south_edge",
    }
}

/// Class-regex override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Regular expression tried against class, instance name and title
    pub pattern: String,
    #[serde(default)]
    pub bindings: BindingsConfig,
}

/// Stock action lists: click to raise and focus, drag the title to move,
/// drag the grips to resize, double-click the title to shade, Alt-drag
/// anywhere in the window, middle-drag the root to scroll the viewport and
/// push against the screen edges to step it.
fn default_bindings() -> BindingsConfig {
    let end_drag = |button: &str| {
        BindingEntry::new("ButtonRelease", button, "endmoveresize").modifiers("MoveResize")
    };
    let window = vec![
        BindingEntry::new("ButtonPress", "Button1", "raisefocus")
            .modifiers("!Mod1")
            .replay(),
        BindingEntry::new("ButtonPress", "Button1", "move").modifiers("Mod1"),
        BindingEntry::new("ButtonPress", "Button3", "resizeright").modifiers("Mod1"),
        end_drag("Button1"),
        end_drag("Button3"),
    ];
    let bar = vec![
        BindingEntry::new("ButtonPress", "Button1", "raise"),
        BindingEntry::new("ButtonPress", "Button1", "focus"),
        BindingEntry::new("ButtonPress", "Button1", "move"),
        end_drag("Button1"),
        BindingEntry::new("DoubleClick", "Button1", "toggleshade"),
        BindingEntry::new("ButtonPress", "Button2", "lower"),
        BindingEntry::new("ButtonPress", "Button3", "togglemaximize"),
    ];
    let grip = |function: &str| {
        vec![
            BindingEntry::new("ButtonPress", "Button1", "raise"),
            BindingEntry::new("ButtonPress", "Button1", function),
            end_drag("Button1"),
        ]
    };

    BindingsConfig {
        window_active: window.clone(),
        window_passive: window,
        frame: Vec::new(),
        title: bar.clone(),
        label: bar,
        handle: grip("move"),
        left_grip: grip("resizeleft"),
        right_grip: grip("resizeright"),
        button: vec![BindingEntry::new("ButtonRelease", "Button1", "closekill")],
        root: vec![
            BindingEntry::new("ButtonPress", "Button2", "viewportmove"),
            end_drag("Button2"),
            BindingEntry::new("ButtonPress", "Button4", "previousdesktop"),
            BindingEntry::new("ButtonPress", "Button5", "nextdesktop"),
        ],
        west_edge: vec![BindingEntry::new("EnterNotify", "", "moveviewportleft")],
        east_edge: vec![BindingEntry::new("EnterNotify", "", "moveviewportright")],
        north_edge: vec![BindingEntry::new("EnterNotify", "", "moveviewportup")],
        south_edge: vec![BindingEntry::new("EnterNotify", "", "moveviewportdown")],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{ActionEvent, WindowIdentity};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.double_click_ms, 300);
        assert!(config.validate().is_ok());
        let bindings = config.bindings().unwrap();
        assert!(bindings.default.has(BindingContext::Title));
        assert!(bindings.default.has(BindingContext::EastEdge));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = Config::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed.bindings, config.bindings);
        assert_eq!(parsed.decor, config.decor);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed = Config::from_toml_str(
            r#"
            [general]
            desktop_count = 2
            desktop_names = ["web"]
            "#,
        )
        .unwrap();
        assert_eq!(parsed.general.virtual_x, 3);
        assert_eq!(parsed.desktop_names(), vec!["web".to_string(), "Desktop 2".to_string()]);
    }

    #[test]
    fn test_binding_entry_parsing() {
        let config = Config::from_toml_str(
            r#"
            [bindings]
            root = [
                { event = "KeyPress", detail = "38", modifiers = "Mod4&!Shift", function = "exec", param = "xterm", delay = 200 },
            ]
            "#,
        )
        .unwrap();
        let bindings = config.bindings().unwrap();
        let root = bindings.default.list(BindingContext::Root);
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].behavior, Behavior::Exec);
        assert_eq!(root[0].detail, 38);
        assert_eq!(root[0].delay_ms, 200);
        assert!(root[0].matches(&ActionEvent {
            kind: ActionKind::KeyPress,
            detail: 38,
            state: Modifiers::MOD4,
        }));
        // An explicit list replaces the default one.
        assert!(!bindings.default.has(BindingContext::Title));
    }

    #[test]
    fn test_invalid_binding_is_reported() {
        let err = Config::from_toml_str(
            r#"
            [bindings]
            title = [ { event = "ButtonPress", detail = "Button1", function = "fly" } ]
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Binding { context: "title", index: 0, source: BindingError::Function(_) }
        ));

        let err = Config::from_toml_str(
            r#"
            [bindings]
            root = [ { event = "ButtonPress", function = "gotodesktop" } ]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("needs a parameter"), "{err}");
    }

    #[test]
    fn test_rules() {
        let config = Config::from_toml_str(
            r#"
            [[rules]]
            pattern = "^XTerm$"
            [rules.bindings]
            title = [ { event = "ButtonPress", detail = "Button1", function = "nop" } ]
            "#,
        )
        .unwrap();
        let bindings = config.bindings().unwrap();
        let xterm = WindowIdentity {
            class: "XTerm",
            name: "xterm",
            title: "~",
        };
        let list = bindings.resolve(BindingContext::Title, Some(&xterm));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].behavior, Behavior::Nop);

        let bad = Config::from_toml_str("[[rules]]\npattern = \"(\"\n");
        assert!(matches!(bad, Err(ConfigError::Rule { index: 0, .. })));
    }

    #[test]
    fn test_invalid_general_values() {
        assert!(Config::from_toml_str("[general]\ndesktop_count = 0\n").is_err());
        assert!(Config::from_toml_str("[general]\nvirtual_x = 0\n").is_err());
        assert!(Config::from_toml_str("[general]\ndock_desktops = \"x\"\n").is_err());
    }
}
