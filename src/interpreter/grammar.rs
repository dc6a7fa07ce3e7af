// Command grammar: an ordered rule table plus the value classifier table.
//
// Rules are tried top to bottom and the first one whose pattern matches and
// whose builder accepts the captures wins. A builder returning None passes
// the text on to the next rule.

use super::intent::{Action, ListKind, TimedEffect};
use super::InterpreterConfig;
use crate::color::{hex_to_rgb, mirek_to_kelvin, MIREK_MAX, MIREK_MIN};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Effects the bridge can run on a light.
pub const EFFECT_NAMES: &[&str] = &[
    "candle",
    "fire",
    "prism",
    "sparkle",
    "opal",
    "glisten",
    "underwater",
    "cosmos",
    "sunbeam",
    "enchant",
];

const BRIGHTNESS_PRESETS: &[(&str, u8)] = &[
    ("full", 100),
    ("max", 100),
    ("maximum", 100),
    ("bright", 100),
    ("brightest", 100),
    ("high", 80),
    ("medium", 50),
    ("half", 50),
    ("mid", 50),
    ("low", 25),
    ("dim", 25),
    ("minimum", 1),
    ("min", 1),
    ("lowest", 1),
    ("dimmest", 1),
];

const TEMPERATURE_PRESETS: &[(&str, u32)] = &[
    ("candle", 2000),
    ("warmest", 2000),
    ("warm", 2700),
    ("soft", 3000),
    ("neutral", 4000),
    ("cool", 5000),
    ("cold", 5000),
    ("daylight", 6500),
    ("coolest", 6500),
];

const COLOR_NAMES: &[(&str, (u8, u8, u8))] = &[
    ("red", (255, 0, 0)),
    ("green", (0, 255, 0)),
    ("blue", (0, 0, 255)),
    ("yellow", (255, 255, 0)),
    ("cyan", (0, 255, 255)),
    ("magenta", (255, 0, 255)),
    ("orange", (255, 165, 0)),
    ("pink", (255, 192, 203)),
    ("purple", (128, 0, 128)),
    ("violet", (238, 130, 238)),
    ("indigo", (75, 0, 130)),
    ("lime", (0, 255, 0)),
    ("teal", (0, 128, 128)),
    ("aqua", (0, 255, 255)),
    ("coral", (255, 127, 80)),
    ("salmon", (250, 128, 114)),
    ("gold", (255, 215, 0)),
    ("turquoise", (64, 224, 208)),
    ("lavender", (230, 230, 250)),
    ("white", (255, 255, 255)),
    ("warm white", (255, 244, 229)),
    ("cool white", (255, 255, 255)),
];

/// Last-resort color temperatures for words that are also common scene names.
const TEMPERATURE_KEYWORDS: &[(&str, u32)] = &[
    ("relax", 2700),
    ("relaxed", 2700),
    ("cozy", 2200),
    ("nightlight", 2000),
    ("concentrate", 4200),
    ("focus", 4200),
    ("reading", 4000),
    ("read", 4000),
    ("energize", 6500),
];

/// Words that can never be a target on their own.
const NON_TARGETS: &[&str] = &[
    "turn", "switch", "power", "set", "make", "put", "change", "it", "them", "that", "this", "the",
    "my", "a",
];

type Classifier = fn(&str) -> Option<Action>;

/// Value classifiers in precedence order.
pub(crate) const VALUE_CLASSIFIERS: &[(&str, Classifier)] = &[
    ("percent", percent),
    ("brightness-preset", brightness_preset),
    ("temperature-preset", temperature_preset),
    ("color-name", color_name),
    ("hex", hex_color),
    ("rgb", rgb_color),
    ("kelvin", kelvin),
    ("level", bare_level),
    ("mirek", bare_mirek),
    ("temperature-keyword", temperature_keyword),
];

/// Classify a setting value ("warm", "50%", "#ff5500", "2700k").
pub(crate) fn classify_value(value: &str) -> Option<(&'static str, Action)> {
    let value = value.trim();
    VALUE_CLASSIFIERS
        .iter()
        .find_map(|(name, classify)| classify(value).map(|action| (*name, action)))
}

static PERCENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,3})\s*(?:%|percent|pct)$").expect("percent regex must compile")
});
static LEVEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,3})$").expect("level regex must compile"));
static HEX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:#[0-9a-f]{3}|#?[0-9a-f]{6})$").expect("hex regex must compile")
});
static RGB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:rgb\s*\(\s*)?(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*\)?$")
        .expect("rgb regex must compile")
});
static KELVIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{3,5})\s*(?:k|kelvin)$|^(\d{4,5})$").expect("kelvin regex must compile")
});
static MIREK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{3})\s*(?:mirek|mired)s?$").expect("mirek regex must compile")
});

fn level(text: &str) -> Option<u8> {
    text.parse::<u8>().ok().filter(|v| *v <= 100)
}

fn percent(value: &str) -> Option<Action> {
    let caps = PERCENT_RE.captures(value)?;
    level(&caps[1]).map(|level| Action::BrightnessAbsolute { level })
}

fn bare_level(value: &str) -> Option<Action> {
    let caps = LEVEL_RE.captures(value)?;
    level(&caps[1]).map(|level| Action::BrightnessAbsolute { level })
}

fn brightness_preset(value: &str) -> Option<Action> {
    BRIGHTNESS_PRESETS
        .iter()
        .find(|(name, _)| *name == value)
        .map(|(name, level)| Action::BrightnessPreset {
            name: name.to_string(),
            level: *level,
        })
}

fn temperature_preset(value: &str) -> Option<Action> {
    TEMPERATURE_PRESETS
        .iter()
        .find(|(name, _)| *name == value)
        .map(|(name, kelvin)| Action::ColorTemperaturePreset {
            name: name.to_string(),
            kelvin: *kelvin,
            scene_alias: false,
        })
}

fn color_name(value: &str) -> Option<Action> {
    COLOR_NAMES
        .iter()
        .find(|(name, _)| *name == value)
        .map(|(name, rgb)| Action::ColorNamed {
            name: name.to_string(),
            rgb: *rgb,
        })
}

fn hex_color(value: &str) -> Option<Action> {
    if !HEX_RE.is_match(value) {
        return None;
    }
    // A bare six-letter word like "facade" is not a color
    if !value.starts_with('#') && !value.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    hex_to_rgb(value).map(|rgb| Action::ColorHex { rgb })
}

fn rgb_color(value: &str) -> Option<Action> {
    let caps = RGB_RE.captures(value)?;
    let channel = |i: usize| caps[i].parse::<u8>().ok();
    Some(Action::ColorRgb {
        rgb: (channel(1)?, channel(2)?, channel(3)?),
    })
}

fn kelvin(value: &str) -> Option<Action> {
    if let Some(caps) = MIREK_RE.captures(value) {
        let mirek = caps[1].parse::<u16>().ok()?;
        if !(MIREK_MIN..=MIREK_MAX).contains(&mirek) {
            return None;
        }
        return Some(Action::ColorTemperature {
            kelvin: mirek_to_kelvin(mirek),
        });
    }
    let caps = KELVIN_RE.captures(value)?;
    let digits = caps.get(1).or_else(|| caps.get(2))?.as_str();
    let kelvin = digits.parse::<u32>().ok()?;
    (1000..=20_000)
        .contains(&kelvin)
        .then_some(Action::ColorTemperature { kelvin })
}

/// A bare three-digit number above 100 is a mirek value.
fn bare_mirek(value: &str) -> Option<Action> {
    let caps = LEVEL_RE.captures(value)?;
    let mirek = caps[1].parse::<u16>().ok()?;
    (MIREK_MIN..=MIREK_MAX)
        .contains(&mirek)
        .then(|| Action::ColorTemperature {
            kelvin: mirek_to_kelvin(mirek),
        })
}

fn temperature_keyword(value: &str) -> Option<Action> {
    TEMPERATURE_KEYWORDS
        .iter()
        .find(|(name, _)| *name == value)
        .map(|(name, kelvin)| Action::ColorTemperaturePreset {
            name: name.to_string(),
            kelvin: *kelvin,
            scene_alias: true,
        })
}

/// Strip articles and filler from a captured target phrase.
pub(crate) fn clean_target(raw: &str) -> Option<String> {
    const PREFIXES: &[&str] = &[
        "the ",
        "my ",
        "lights in ",
        "lights on ",
        "lights for ",
        "light in ",
        "lamps in ",
    ];
    const SUFFIXES: &[&str] = &[" lights", " lamps"];

    let mut target = raw.trim();
    loop {
        let before = target;
        for prefix in PREFIXES {
            if let Some(rest) = target.strip_prefix(prefix) {
                target = rest.trim_start();
            }
        }
        for suffix in SUFFIXES {
            if let Some(rest) = target.strip_suffix(suffix) {
                if !rest.trim().is_empty() {
                    target = rest.trim_end();
                }
            }
        }
        if target == before {
            break;
        }
    }

    if target.is_empty() || NON_TARGETS.contains(&target) {
        None
    } else {
        Some(target.to_string())
    }
}

/// Split "office warm white" into a trailing value and the target before it,
/// preferring the longest value that classifies.
fn split_trailing_value(text: &str) -> Option<(Action, String)> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let longest = words.len().saturating_sub(1).min(3);
    (1..=longest).rev().find_map(|k| {
        let (target, value) = words.split_at(words.len() - k);
        let (_, action) = classify_value(&value.join(" "))?;
        Some((action, clean_target(&target.join(" "))?))
    })
}

pub(crate) struct Parsed {
    pub action: Action,
    pub target: String,
}

type Build = fn(&Captures<'_>, &InterpreterConfig) -> Option<Parsed>;

pub(crate) struct Rule {
    pub name: &'static str,
    pattern: Regex,
    build: Build,
}

impl Rule {
    fn new(name: &'static str, pattern: &str, build: Build) -> Self {
        let pattern = Regex::new(pattern)
            .unwrap_or_else(|e| panic!("rule {} has an invalid pattern: {}", name, e));
        Self {
            name,
            pattern,
            build,
        }
    }

    pub(crate) fn apply(&self, text: &str, config: &InterpreterConfig) -> Option<Parsed> {
        let caps = self.pattern.captures(text)?;
        (self.build)(&caps, config)
    }
}

fn group<'t>(caps: &Captures<'t>, name: &str) -> Option<&'t str> {
    caps.name(name).map(|m| m.as_str())
}

fn targeted(action: Action, caps: &Captures<'_>) -> Option<Parsed> {
    let target = clean_target(group(caps, "target")?)?;
    Some(Parsed { action, target })
}

fn untargeted(action: Action) -> Option<Parsed> {
    Some(Parsed {
        action,
        target: String::new(),
    })
}

fn build_help(_: &Captures<'_>, _: &InterpreterConfig) -> Option<Parsed> {
    untargeted(Action::Help)
}

fn build_list(caps: &Captures<'_>, _: &InterpreterConfig) -> Option<Parsed> {
    let kind = ListKind::parse(group(caps, "kind")?)?;
    untargeted(Action::List { kind })
}

fn build_refresh(_: &Captures<'_>, _: &InterpreterConfig) -> Option<Parsed> {
    untargeted(Action::Refresh)
}

fn build_status(caps: &Captures<'_>, _: &InterpreterConfig) -> Option<Parsed> {
    match group(caps, "target") {
        Some(_) => targeted(Action::Status, caps),
        None => untargeted(Action::Status),
    }
}

fn build_effect_clear(caps: &Captures<'_>, _: &InterpreterConfig) -> Option<Parsed> {
    targeted(Action::EffectClear, caps)
}

fn build_timed_effect(caps: &Captures<'_>, _: &InterpreterConfig) -> Option<Parsed> {
    let effect = match group(caps, "effect")? {
        "sunrise" => TimedEffect::Sunrise,
        "sunset" => TimedEffect::Sunset,
        _ => return None,
    };
    targeted(Action::TimedEffect { effect }, caps)
}

fn build_effect(caps: &Captures<'_>, _: &InterpreterConfig) -> Option<Parsed> {
    let name = match group(caps, "effect")? {
        "fireplace" => "fire",
        other => other,
    };
    targeted(
        Action::Effect {
            name: name.to_string(),
        },
        caps,
    )
}

fn build_identify(caps: &Captures<'_>, _: &InterpreterConfig) -> Option<Parsed> {
    targeted(Action::Identify, caps)
}

fn build_scene(caps: &Captures<'_>, _: &InterpreterConfig) -> Option<Parsed> {
    let scene = group(caps, "scene")?.trim().trim_start_matches("the ").trim();
    if scene.is_empty() {
        return None;
    }
    targeted(
        Action::SceneRecall {
            scene: scene.to_string(),
        },
        caps,
    )
}

fn build_power(caps: &Captures<'_>, _: &InterpreterConfig) -> Option<Parsed> {
    let on = match group(caps, "state")? {
        "on" | "enable" | "activate" => true,
        "off" | "disable" | "deactivate" | "kill" => false,
        state if state.starts_with("shut") => false,
        _ => return None,
    };
    targeted(Action::Power { on }, caps)
}

fn build_brightness_absolute(caps: &Captures<'_>, _: &InterpreterConfig) -> Option<Parsed> {
    let level = level(group(caps, "amount")?)?;
    targeted(Action::BrightnessAbsolute { level }, caps)
}

fn build_brightness_relative(caps: &Captures<'_>, config: &InterpreterConfig) -> Option<Parsed> {
    let amount = match group(caps, "amount") {
        Some(amount) => level(amount)?,
        None => config.brightness_step,
    };
    let delta = match group(caps, "verb")? {
        "dim" | "darken" | "lower" | "reduce" | "decrease" | "dimmer" | "darker" | "down" => {
            -(amount as i16)
        }
        _ => amount as i16,
    };
    targeted(Action::BrightnessRelative { delta }, caps)
}

fn build_set_value(caps: &Captures<'_>, _: &InterpreterConfig) -> Option<Parsed> {
    let (_, action) = classify_value(group(caps, "value")?)?;
    targeted(action, caps)
}

fn build_trailing_value(caps: &Captures<'_>, _: &InterpreterConfig) -> Option<Parsed> {
    let (action, target) = split_trailing_value(group(caps, "rest")?)?;
    Some(Parsed { action, target })
}

const SCENE_KEYWORDS_ALT: &str = "relax|concentrate|energize|nightlight|dimmed|read|reading";

const EFFECTS_ALT: &str =
    "candle|fireplace|fire|prism|sparkle|opal|glisten|underwater|cosmos|sunbeam|enchant";

/// The grammar, in precedence order.
pub(crate) static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::new(
            "help",
            r"^(?:help|\?|commands|usage|what can you do)$",
            build_help,
        ),
        Rule::new(
            "list",
            r"^(?:(?:list|show)\s+)?(?:all\s+)?(?:the\s+)?(?P<kind>lights|rooms|zones|scenes)$",
            build_list,
        ),
        Rule::new(
            "refresh",
            r"^(?:refresh|sync|resync|reload)(?:\s+(?:state|cache|everything))?$",
            build_refresh,
        ),
        Rule::new("status", r"^(?:status|state|info)$", build_status),
        Rule::new(
            "status",
            r"^(?:status|state|show|check)\s+(?:of\s+|for\s+)?(?P<target>.+)$",
            build_status,
        ),
        Rule::new(
            "status",
            r"^(?:is|are)\s+(?P<target>.+?)\s+(?:on|off)\??$",
            build_status,
        ),
        Rule::new(
            "effect-clear",
            r"^(?:stop|clear|cancel|end|remove|disable)\s+(?:the\s+|all\s+)?(?:effects?|animations?)\s+(?:on|in|for|from)\s+(?P<target>.+)$",
            build_effect_clear,
        ),
        Rule::new(
            "effect-clear",
            r"^(?:stop|clear|cancel|end|remove|disable)\s+(?P<target>.+?)\s+(?:effects?|animations?)$",
            build_effect_clear,
        ),
        Rule::new(
            "effect-clear",
            r"^(?:set|turn)\s+(?P<target>.+)\s+to\s+no\s+effects?$",
            build_effect_clear,
        ),
        Rule::new(
            "timed-effect",
            r"^(?:(?:start|begin|run|do)\s+)?(?:an?\s+|the\s+)?(?P<effect>sunrise|sunset)(?:\s+effect)?\s+(?:in|on|for)\s+(?P<target>.+)$",
            build_timed_effect,
        ),
        Rule::new(
            "timed-effect",
            r"^(?:set|make|turn|start)\s+(?P<target>.+)\s+(?:to|with)\s+(?:an?\s+)?(?P<effect>sunrise|sunset)$",
            build_timed_effect,
        ),
        Rule::new(
            "effect",
            &format!(
                r"^(?:(?:start|apply|use|set|put)\s+)?(?:an?\s+|the\s+)?(?P<effect>{})(?:\s+effect)?\s+(?:in|on|for)\s+(?P<target>.+)$",
                EFFECTS_ALT
            ),
            build_effect,
        ),
        Rule::new(
            "effect",
            &format!(
                r"^(?:set|make|turn|put)\s+(?P<target>.+)\s+(?:to|into|on)\s+(?:an?\s+|the\s+)?(?P<effect>{})\s+effect$",
                EFFECTS_ALT
            ),
            build_effect,
        ),
        Rule::new(
            "identify",
            r"^(?:identify|blink|flash|ping|locate)\s+(?P<target>.+)$",
            build_identify,
        ),
        Rule::new(
            "scene",
            r"^(?:(?:activate|recall|start|set|apply|use|enable|turn\s+on|switch\s+to)\s+)?(?:the\s+)?(?P<scene>.+?)\s+(?:mode|scene)\s+(?:in|on|for)\s+(?P<target>.+)$",
            build_scene,
        ),
        Rule::new(
            "scene",
            r"^(?:set|switch|change|put)\s+(?P<target>.+)\s+to\s+(?P<scene>.+?)\s+(?:mode|scene)$",
            build_scene,
        ),
        Rule::new(
            "scene",
            r"^(?:activate|recall|apply)\s+(?:the\s+)?(?:scene\s+)?(?P<scene>.+?)\s+(?:in|on|for)\s+(?P<target>.+)$",
            build_scene,
        ),
        Rule::new(
            "scene",
            r"^(?:set\s+)?scene\s+(?P<scene>.+?)\s+(?:in|on|for)\s+(?P<target>.+)$",
            build_scene,
        ),
        Rule::new(
            "scene",
            &format!(r"^(?P<scene>{})\s+(?:in|on|for)\s+(?P<target>.+)$", SCENE_KEYWORDS_ALT),
            build_scene,
        ),
        Rule::new(
            "power",
            r"^(?:turn|switch|power|flip|put)\s+(?P<state>on|off)\s+(?P<target>.+)$",
            build_power,
        ),
        Rule::new(
            "power",
            r"^(?:turn|switch|power|flip|put)\s+(?P<target>.+?)\s+(?P<state>on|off)$",
            build_power,
        ),
        Rule::new(
            "power",
            r"^(?P<state>enable|activate|disable|deactivate|kill|shut\s+off|shut\s+down)\s+(?P<target>.+)$",
            build_power,
        ),
        Rule::new(
            "power",
            r"^(?P<target>.+?)\s+(?P<state>on|off)$",
            build_power,
        ),
        Rule::new(
            "power",
            r"^(?:lights?\s+)?(?P<state>on|off)\s+(?:in\s+|for\s+)?(?P<target>.+)$",
            build_power,
        ),
        Rule::new(
            "brightness-absolute",
            r"^(?:dim|brighten|set|turn|make|put|change|adjust|bring)\s+(?P<target>.+)\s+(?:to|at)\s+(?P<amount>\d{1,3})\s*(?:%|percent|pct)?(?:\s+brightness)?$",
            build_brightness_absolute,
        ),
        Rule::new(
            "brightness-absolute",
            r"^(?:set\s+)?(?:the\s+)?brightness\s+(?:of\s+|in\s+|for\s+|on\s+)?(?P<target>.+)\s+to\s+(?P<amount>\d{1,3})\s*(?:%|percent)?$",
            build_brightness_absolute,
        ),
        Rule::new(
            "brightness-relative",
            r"^(?P<verb>dim|darken|lower|reduce|decrease|brighten|raise|increase|boost|lighten)\s+(?P<target>.+?)\s+by\s+(?P<amount>\d{1,3})\s*(?:%|percent)?$",
            build_brightness_relative,
        ),
        Rule::new(
            "brightness-relative",
            r"^(?:make\s+)?(?P<target>.+?)\s+(?P<verb>brighter|dimmer|darker)(?:\s+by\s+(?P<amount>\d{1,3})\s*(?:%|percent)?)?$",
            build_brightness_relative,
        ),
        Rule::new(
            "brightness-relative",
            r"^turn\s+(?P<verb>up|down)\s+(?P<target>.+)$",
            build_brightness_relative,
        ),
        Rule::new(
            "brightness-relative",
            r"^turn\s+(?P<target>.+?)\s+(?P<verb>up|down)$",
            build_brightness_relative,
        ),
        Rule::new(
            "set-value",
            r"^(?:set|make|turn|change|put|switch|dim|brighten|paint|color|colour)\s+(?P<target>.+)\s+(?:to|into|at)\s+(?P<value>.+)$",
            build_set_value,
        ),
        Rule::new(
            "set-value",
            r"^(?:make|set|turn|paint|color|colour)\s+(?P<rest>.+)$",
            build_trailing_value,
        ),
        Rule::new(
            "set-value",
            r"^(?:(?:set|make)\s+)?(?P<value>.+?)\s+(?:in|for|on)\s+(?P<target>.+)$",
            build_set_value,
        ),
        Rule::new(
            "brightness-relative",
            r"^(?P<verb>dim|darken|brighten|lighten)\s+(?P<target>.+)$",
            build_brightness_relative,
        ),
        Rule::new(
            "brightness-absolute",
            r"^(?P<target>.+?)\s+(?:(?:to|at)\s+)?(?P<amount>\d{1,3})\s*(?:%|percent)$",
            build_brightness_absolute,
        ),
        // Below power and brightness so "reading lamp off" targets the lamp
        Rule::new(
            "scene",
            &format!(r"^(?P<scene>{})\s+(?P<target>.+)$", SCENE_KEYWORDS_ALT),
            build_scene,
        ),
        Rule::new("set-value", r"^(?P<rest>.+)$", build_trailing_value),
    ]
});
