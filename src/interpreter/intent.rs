use serde::Serialize;
use std::fmt;

/// Structured result of interpreting one command line.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Intent {
    pub action: Action,
    /// Unresolved target phrase; empty for commands without an operand
    pub target: String,
    /// Transition duration from a modifier clause, if one was given
    pub transition_ms: Option<u32>,
}

impl Intent {
    pub fn new(action: Action, target: impl Into<String>) -> Self {
        Self {
            action,
            target: target.into(),
            transition_ms: None,
        }
    }

    pub fn with_transition(mut self, transition_ms: Option<u32>) -> Self {
        self.transition_ms = transition_ms;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Lights,
    Rooms,
    Zones,
    Scenes,
}

impl ListKind {
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "lights" | "light" | "lamps" => Some(ListKind::Lights),
            "rooms" | "room" => Some(ListKind::Rooms),
            "zones" | "zone" => Some(ListKind::Zones),
            "scenes" | "scene" => Some(ListKind::Scenes),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimedEffect {
    Sunrise,
    Sunset,
}

impl TimedEffect {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimedEffect::Sunrise => "sunrise",
            TimedEffect::Sunset => "sunset",
        }
    }
}

/// Verb category plus its parameters.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "verb", rename_all = "snake_case")]
pub enum Action {
    Power {
        on: bool,
    },
    BrightnessAbsolute {
        level: u8,
    },
    /// Signed percentage points
    BrightnessRelative {
        delta: i16,
    },
    BrightnessPreset {
        name: String,
        level: u8,
    },
    ColorNamed {
        name: String,
        rgb: (u8, u8, u8),
    },
    ColorHex {
        rgb: (u8, u8, u8),
    },
    ColorRgb {
        rgb: (u8, u8, u8),
    },
    ColorTemperature {
        kelvin: u32,
    },
    /// Named white. `scene_alias` marks keywords that double as scene names
    /// ("concentrate", "relax") and should try a scene first.
    ColorTemperaturePreset {
        name: String,
        kelvin: u32,
        scene_alias: bool,
    },
    SceneRecall {
        scene: String,
    },
    Effect {
        name: String,
    },
    EffectClear,
    TimedEffect {
        effect: TimedEffect,
    },
    Identify,
    Status,
    List {
        kind: ListKind,
    },
    Refresh,
    Help,
}

impl Action {
    pub fn verb(&self) -> &'static str {
        match self {
            Action::Power { .. } => "power",
            Action::BrightnessAbsolute { .. } => "brightness-absolute",
            Action::BrightnessRelative { .. } => "brightness-relative",
            Action::BrightnessPreset { .. } => "brightness-preset",
            Action::ColorNamed { .. } => "color-named",
            Action::ColorHex { .. } => "color-hex",
            Action::ColorRgb { .. } => "color-rgb",
            Action::ColorTemperature { .. } => "color-temperature-kelvin",
            Action::ColorTemperaturePreset { .. } => "color-temperature-preset",
            Action::SceneRecall { .. } => "scene-recall",
            Action::Effect { .. } => "effect-apply",
            Action::EffectClear => "effect-clear",
            Action::TimedEffect { .. } => "timed-effect",
            Action::Identify => "identify",
            Action::Status => "status",
            Action::List { .. } => "list",
            Action::Refresh => "refresh",
            Action::Help => "help",
        }
    }

    /// Commands answered from the cache or the session itself
    pub fn is_introspection(&self) -> bool {
        matches!(
            self,
            Action::Status | Action::List { .. } | Action::Refresh | Action::Help
        )
    }
}

/// Input that matched no command pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseFailure {
    pub input: String,
    pub reason: String,
}

impl ParseFailure {
    pub(crate) fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Could not understand \"{}\": {}. Type 'help' for examples.",
            self.input, self.reason
        )
    }
}

impl std::error::Error for ParseFailure {}
