// Natural-language command interpreter
//
// parse() normalizes the line, strips a transition modifier clause, then
// runs the ordered rule table in grammar.rs. Parsing never touches the
// cache; target phrases are resolved later by the executor.

mod grammar;
mod intent;

pub use grammar::EFFECT_NAMES;
pub use intent::{Action, Intent, ListKind, ParseFailure, TimedEffect};

use grammar::RULES;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Word-level tunables shared with the executor section of the config.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InterpreterConfig {
    /// Duration for "slowly"
    pub slow_transition_ms: u32,
    /// Duration for "quickly"
    pub quick_transition_ms: u32,
    /// Percentage points for "brighter"/"dim" without an amount
    pub brightness_step: u8,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            slow_transition_ms: 2000,
            quick_transition_ms: 100,
            brightness_step: 25,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Pace {
    Slow,
    Quick,
    Instant,
    /// Captured number times this many milliseconds
    Scaled(f64),
}

static TRANSITIONS: Lazy<Vec<(Regex, Pace)>> = Lazy::new(|| {
    [
        (r"\s+(?:in|over)\s+(\d+(?:\.\d+)?)\s*(?:ms|millis|milliseconds?)$", Pace::Scaled(1.0)),
        (r"\s+(?:in|over)\s+(\d+(?:\.\d+)?)\s*(?:s|secs?|seconds?)$", Pace::Scaled(1000.0)),
        (r"\s+(?:in|over)\s+(\d+(?:\.\d+)?)\s*(?:m|mins?|minutes?)$", Pace::Scaled(60_000.0)),
        (r"\s+(?:slowly|gradually|slow)$", Pace::Slow),
        (r"\s+(?:instantly|immediately|instant)$", Pace::Instant),
        (r"\s+(?:quickly|fast|quick)$", Pace::Quick),
        (r"^(?:slowly|gradually)\s+", Pace::Slow),
        (r"^(?:instantly|immediately)\s+", Pace::Instant),
        (r"^(?:quickly)\s+", Pace::Quick),
    ]
    .into_iter()
    .map(|(pattern, pace)| {
        let re = Regex::new(pattern).expect("transition regex must compile");
        (re, pace)
    })
    .collect()
});

const POLITE_PREFIXES: &[&str] = &["please ", "can you ", "could you ", "would you "];

/// Lowercase, collapse whitespace and drop politeness and end punctuation.
fn prepare(text: &str) -> String {
    let mut line = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if line.len() > 1 {
        line = line.trim_end_matches(&['.', '!', '?'][..]).trim_end().to_string();
    }
    for prefix in POLITE_PREFIXES {
        if let Some(rest) = line.strip_prefix(prefix) {
            line = rest.to_string();
        }
    }
    if let Some(rest) = line.strip_suffix(" please") {
        line = rest.to_string();
    }
    line
}

pub struct Interpreter {
    config: InterpreterConfig,
}

impl Interpreter {
    pub fn new(config: InterpreterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Parse one command line into an intent.
    pub fn parse(&self, text: &str) -> Result<Intent, ParseFailure> {
        self.interpret(text).map(|(intent, _)| intent)
    }

    /// Name of the grammar rule that accepts `text`, if any.
    pub fn matching_rule(&self, text: &str) -> Option<&'static str> {
        self.interpret(text).ok().map(|(_, rule)| rule)
    }

    fn interpret(&self, text: &str) -> Result<(Intent, &'static str), ParseFailure> {
        let line = prepare(text);
        if line.is_empty() {
            return Err(ParseFailure::new(text, "empty command"));
        }

        let (rest, transition_ms) = self.strip_transition(&line);
        if rest.is_empty() {
            return Err(ParseFailure::new(text, "only a transition was given"));
        }

        for rule in RULES.iter() {
            if let Some(parsed) = rule.apply(&rest, &self.config) {
                debug!(rule = rule.name, verb = parsed.action.verb(), target = %parsed.target, "Parsed command");
                let intent =
                    Intent::new(parsed.action, parsed.target).with_transition(transition_ms);
                return Ok((intent, rule.name));
            }
        }

        Err(ParseFailure::new(text, "no command pattern matched"))
    }

    /// Remove the first transition modifier found and convert it to milliseconds.
    fn strip_transition(&self, line: &str) -> (String, Option<u32>) {
        for (pattern, pace) in TRANSITIONS.iter() {
            let Some(caps) = pattern.captures(line) else {
                continue;
            };
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let ms = match pace {
                Pace::Slow => Some(self.config.slow_transition_ms),
                Pace::Quick => Some(self.config.quick_transition_ms),
                Pace::Instant => Some(0),
                Pace::Scaled(factor) => caps
                    .get(1)
                    .and_then(|m| m.as_str().parse::<f64>().ok())
                    .map(|n| (n * factor).round().min(u32::MAX as f64) as u32),
            };
            let rest = format!("{} {}", &line[..whole.start()], &line[whole.end()..]);
            return (rest.trim().to_string(), ms);
        }
        (line.to_string(), None)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(InterpreterConfig::default())
    }
}

/// Example commands shown by `help`.
pub const HELP_TEXT: &str = "\
Power:        turn on kitchen | turn off all lights | bedroom off
Brightness:   dim kitchen to 50% | set office to low | make kitchen brighter | dim bedroom by 10%
Color:        set bedroom to blue | make office warm | set kitchen to #ff5500 | set den to rgb(255, 80, 0)
Temperature:  set office to 4000k | set bedroom to candle
Scenes:       relax mode in office | activate energize in living room | set office to concentrate
Effects:      candle effect in bedroom | stop effects in bedroom | sunrise in bedroom over 20 minutes
Identify:     blink desk lamp
Transitions:  append slowly, quickly, instantly or 'in 5 seconds'
Info:         status | status kitchen | lights | rooms | zones | scenes | refresh | help";
