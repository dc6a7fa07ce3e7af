// Command executor: binds an intent's target phrase and dispatches the
// resulting state change to the bridge.
//
// Rooms and zones are addressed through their grouped_light (one request,
// group quota). Single lights, "all lights" and anything a grouped_light
// cannot carry go out as one request per light (device quota), concurrently,
// with every outcome recorded.

mod payload;
#[cfg(test)]
mod tests;

pub use payload::{RecallPayload, StatePayload};

use crate::event::ResourceKind;
use crate::interpreter::{Action, Intent, InterpreterConfig};
use crate::rate_limit::RequestCategory;
use crate::resolver::{Candidate, Resolution, Resolver, SceneMatch, Target};
use crate::state::{Arena, Light, ResourceRef, Scene, StateCache};
use crate::transport::{BridgeClient, TransportError};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Executor defaults
#[derive(Clone, Debug, Deserialize)]
pub struct ExecutorConfig {
    /// Transition applied when a command gives none
    #[serde(default = "default_transition_ms")]
    pub default_transition_ms: u32,
    #[serde(default = "default_slow_transition_ms")]
    pub slow_transition_ms: u32,
    #[serde(default = "default_quick_transition_ms")]
    pub quick_transition_ms: u32,
    /// Sunrise/sunset length when the command gives none
    #[serde(default = "default_timed_effect_minutes")]
    pub default_timed_effect_minutes: u32,
    /// Step for "brighter"/"dimmer" without an amount
    #[serde(default = "default_brightness_step")]
    pub brightness_step: u8,
}

fn default_transition_ms() -> u32 {
    400
}

fn default_slow_transition_ms() -> u32 {
    2000
}

fn default_quick_transition_ms() -> u32 {
    100
}

fn default_timed_effect_minutes() -> u32 {
    30
}

fn default_brightness_step() -> u8 {
    25
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_transition_ms: default_transition_ms(),
            slow_transition_ms: default_slow_transition_ms(),
            quick_transition_ms: default_quick_transition_ms(),
            default_timed_effect_minutes: default_timed_effect_minutes(),
            brightness_step: default_brightness_step(),
        }
    }
}

impl ExecutorConfig {
    /// Word-level settings the interpreter needs.
    pub fn interpreter_config(&self) -> InterpreterConfig {
        InterpreterConfig {
            slow_transition_ms: self.slow_transition_ms,
            quick_transition_ms: self.quick_transition_ms,
            brightness_step: self.brightness_step,
        }
    }
}

/// Why a command was not dispatched.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    /// Several targets match the phrase closely
    Ambiguous {
        phrase: String,
        candidates: Vec<Candidate>,
    },
    /// Nothing matches the phrase
    NotFound {
        phrase: String,
        available: Vec<String>,
    },
    SceneNotFound {
        scene: String,
        scope: String,
        available: Vec<String>,
    },
    SceneAmbiguous {
        scene: String,
        options: Vec<String>,
    },
    /// Target resolved but contains no lights
    NoLights { target: String },
    /// Introspection commands are answered by the session, not dispatched
    NotDispatchable { verb: &'static str },
    /// Request body could not be built
    Payload { reason: String },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Ambiguous { phrase, candidates } => {
                let options: Vec<String> = candidates.iter().map(|c| c.target.to_string()).collect();
                write!(
                    f,
                    "'{}' is ambiguous. Did you mean: {}?",
                    phrase,
                    options.join(", ")
                )
            }
            CommandError::NotFound { phrase, available } if phrase.is_empty() => {
                write!(f, "No target given. Available: {}", available.join(", "))
            }
            CommandError::NotFound { phrase, available } => write!(
                f,
                "No light, room or zone matches '{}'. Available: {}",
                phrase,
                available.join(", ")
            ),
            CommandError::SceneNotFound {
                scene,
                scope,
                available,
            } if available.is_empty() => {
                write!(f, "No scene '{}' in {} (it has no scenes)", scene, scope)
            }
            CommandError::SceneNotFound {
                scene,
                scope,
                available,
            } => write!(
                f,
                "No scene '{}' in {}. Available: {}",
                scene,
                scope,
                available.join(", ")
            ),
            CommandError::SceneAmbiguous { scene, options } => write!(
                f,
                "Scene '{}' is ambiguous. Did you mean: {}?",
                scene,
                options.join(", ")
            ),
            CommandError::NoLights { target } => write!(f, "{} has no lights", target),
            CommandError::NotDispatchable { verb } => {
                write!(f, "'{}' is not a light command", verb)
            }
            CommandError::Payload { reason } => {
                write!(f, "Could not build the request: {}", reason)
            }
        }
    }
}

impl std::error::Error for CommandError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Partial,
    Failure,
}

/// Result of one dispatched request.
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchOutcome {
    /// Display name of the addressed light, group or scene
    pub name: String,
    pub resource: ResourceRef,
    pub error: Option<TransportError>,
}

impl DispatchOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate result of executing one intent.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionReport {
    pub message: String,
    pub status: ExecutionStatus,
    pub target_name: String,
    /// Lights the command reached
    pub affected: Vec<String>,
    pub outcomes: Vec<DispatchOutcome>,
    /// Target lights the bridge reports unreachable
    pub unreachable: Vec<String>,
}

impl ExecutionReport {
    /// Names whose request failed.
    pub fn failed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.succeeded())
            .map(|o| o.name.as_str())
            .collect()
    }

    pub fn has_auth_failure(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.error.as_ref().is_some_and(TransportError::is_auth))
    }
}

/// How an intent reaches the bridge.
enum Route<'a> {
    Grouped { grouped_light: String },
    PerLight(Vec<&'a Light>),
}

pub struct CommandExecutor {
    cache: Arc<StateCache>,
    resolver: Resolver,
    client: Arc<BridgeClient>,
    config: ExecutorConfig,
}

impl CommandExecutor {
    pub fn new(
        cache: Arc<StateCache>,
        resolver: Resolver,
        client: Arc<BridgeClient>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            cache,
            resolver,
            client,
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Bind a target phrase against the current cache generation.
    pub fn resolve(&self, arena: &Arena, phrase: &str) -> Result<Target, CommandError> {
        match self.resolver.resolve(arena, phrase) {
            Resolution::Unique(target) => Ok(target),
            Resolution::Ambiguous { phrase, candidates } => {
                Err(CommandError::Ambiguous { phrase, candidates })
            }
            Resolution::NotFound { phrase, available } => {
                Err(CommandError::NotFound { phrase, available })
            }
        }
    }

    /// Resolve, build and dispatch one intent.
    ///
    /// Resolution problems return `Err` before any request is made. Once
    /// requests go out the result is always a report, whose status says
    /// whether all, some or none of them succeeded.
    pub async fn execute(&self, intent: &Intent) -> Result<ExecutionReport, CommandError> {
        if intent.action.is_introspection() {
            return Err(CommandError::NotDispatchable {
                verb: intent.action.verb(),
            });
        }

        let arena = self.cache.snapshot();
        let target = self.resolve(&arena, &intent.target)?;
        let lights = arena.lights_for(&target);
        if lights.is_empty() {
            return Err(CommandError::NoLights {
                target: target.name().to_string(),
            });
        }
        let unreachable: Vec<String> = lights
            .iter()
            .filter(|l| !l.reachable)
            .map(|l| l.name.clone())
            .collect();

        debug!(
            verb = intent.action.verb(),
            target = %target,
            lights = lights.len(),
            "Executing command"
        );

        match &intent.action {
            Action::SceneRecall { scene } => {
                let scene = self.find_scene(&arena, &target, scene)?;
                return self
                    .recall_scene(scene, intent.transition_ms, unreachable)
                    .await;
            }
            Action::ColorTemperaturePreset {
                name,
                scene_alias: true,
                ..
            } => {
                // "set office to concentrate" prefers an actual Concentrate scene
                if let Ok(scene) = self.find_scene(&arena, &target, name) {
                    return self
                        .recall_scene(scene, intent.transition_ms, unreachable)
                        .await;
                }
            }
            _ => {}
        }

        let route = self.route(&arena, &target, &intent.action, lights.clone());
        let transition_ms = match intent.action {
            Action::TimedEffect { .. } => intent
                .transition_ms
                .unwrap_or(self.config.default_timed_effect_minutes.saturating_mul(60_000)),
            _ => intent
                .transition_ms
                .unwrap_or(self.config.default_transition_ms),
        };
        let grouped = matches!(route, Route::Grouped { .. });
        let Some(payload) = StatePayload::for_action(&intent.action, transition_ms, grouped) else {
            return Err(CommandError::NotDispatchable {
                verb: intent.action.verb(),
            });
        };
        let body = encode_body(&payload)?;

        let (outcomes, affected) = match route {
            Route::Grouped { grouped_light } => {
                let result = self
                    .client
                    .put_resource(
                        RequestCategory::Group,
                        ResourceKind::GroupedLight,
                        &grouped_light,
                        &body,
                    )
                    .await;
                let affected = match result {
                    Ok(_) => lights.iter().map(|l| l.name.clone()).collect(),
                    Err(_) => Vec::new(),
                };
                let outcome = DispatchOutcome {
                    name: target.name().to_string(),
                    resource: ResourceRef::new(grouped_light, ResourceKind::GroupedLight),
                    error: result.err(),
                };
                (vec![outcome], affected)
            }
            Route::PerLight(lights) => {
                let requests = lights.iter().map(|light| {
                    let body = &body;
                    async move {
                        let result = self
                            .client
                            .put_resource(
                                RequestCategory::Device,
                                ResourceKind::Light,
                                &light.id,
                                body,
                            )
                            .await;
                        DispatchOutcome {
                            name: light.name.clone(),
                            resource: ResourceRef::new(light.id.clone(), ResourceKind::Light),
                            error: result.err(),
                        }
                    }
                });
                let outcomes = join_all(requests).await;
                let affected = outcomes
                    .iter()
                    .filter(|o| o.succeeded())
                    .map(|o| o.name.clone())
                    .collect();
                (outcomes, affected)
            }
        };

        let report = build_report(
            describe(&intent.action, target.name(), transition_ms),
            target.name(),
            affected,
            outcomes,
            unreachable,
        );
        info!(
            target = %target,
            verb = intent.action.verb(),
            status = ?report.status,
            "Command executed"
        );
        Ok(report)
    }

    fn route<'a>(
        &self,
        arena: &Arena,
        target: &Target,
        action: &Action,
        lights: Vec<&'a Light>,
    ) -> Route<'a> {
        let grouped_light = match target {
            Target::Room { id, .. } | Target::Zone { id, .. } => {
                arena.group(id).and_then(|g| g.grouped_light.clone())
            }
            _ => None,
        };
        // The body is only needed to know whether a grouped_light can carry it
        let fits = StatePayload::for_action(action, 0, true)
            .map(|p| p.fits_grouped_light())
            .unwrap_or(false);

        match grouped_light {
            Some(grouped_light) if fits => Route::Grouped { grouped_light },
            Some(_) => Route::PerLight(lights),
            None => {
                if target.is_group() {
                    warn!(target = %target, "Group has no grouped_light, addressing lights individually");
                }
                Route::PerLight(lights)
            }
        }
    }

    /// Pick the scene a recall refers to, scoped to the target's room or zone.
    fn find_scene<'a>(
        &self,
        arena: &'a Arena,
        target: &Target,
        phrase: &str,
    ) -> Result<&'a Scene, CommandError> {
        let (scope_id, scope) = match target {
            Target::Room { id, name } | Target::Zone { id, name } => {
                (Some(id.clone()), name.clone())
            }
            Target::Light { id, .. } => match arena.room_of_light(id) {
                Some(room) => (Some(room.id.clone()), room.name.clone()),
                None => (None, "any room".to_string()),
            },
            Target::AllLights => (None, "any room".to_string()),
        };

        match self.resolver.resolve_scene(arena, phrase, scope_id.as_deref()) {
            SceneMatch::Unique(scene) => Ok(scene),
            SceneMatch::Ambiguous(scenes) => Err(CommandError::SceneAmbiguous {
                scene: phrase.to_string(),
                options: scenes
                    .iter()
                    .map(|s| match s.group.as_ref().and_then(|g| arena.group(&g.rid)) {
                        Some(group) => format!("{} ({})", s.name, group.name),
                        None => s.name.clone(),
                    })
                    .collect(),
            }),
            SceneMatch::NotFound { available } => Err(CommandError::SceneNotFound {
                scene: phrase.to_string(),
                scope,
                available,
            }),
        }
    }

    async fn recall_scene(
        &self,
        scene: &Scene,
        transition_ms: Option<u32>,
        unreachable: Vec<String>,
    ) -> Result<ExecutionReport, CommandError> {
        let body = encode_body(&RecallPayload::active(transition_ms))?;
        let result = self
            .client
            .put_resource(RequestCategory::Group, ResourceKind::Scene, &scene.id, &body)
            .await;

        let arena = self.cache.snapshot();
        let group = scene.group.as_ref().and_then(|g| arena.group(&g.rid));
        let target_name = group
            .map(|g| g.name.clone())
            .unwrap_or_else(|| scene.name.clone());
        let affected = match (&result, group) {
            (Ok(_), Some(group)) => arena
                .lights_for(&Target::Room {
                    id: group.id.clone(),
                    name: group.name.clone(),
                })
                .iter()
                .map(|l| l.name.clone())
                .collect(),
            _ => Vec::new(),
        };

        info!(scene_id = %scene.id, scene = %scene.name, ok = result.is_ok(), "Scene recalled");
        Ok(build_report(
            format!("Activated scene '{}' in {}", scene.name, target_name),
            &target_name,
            affected,
            vec![DispatchOutcome {
                name: scene.name.clone(),
                resource: ResourceRef::new(scene.id.clone(), ResourceKind::Scene),
                error: result.err(),
            }],
            unreachable,
        ))
    }
}

/// Serialize a request body; a failure here means nothing is sent.
fn encode_body<T: Serialize>(payload: &T) -> Result<serde_json::Value, CommandError> {
    serde_json::to_value(payload).map_err(|e| CommandError::Payload {
        reason: e.to_string(),
    })
}

fn build_report(
    success_message: String,
    target_name: &str,
    affected: Vec<String>,
    outcomes: Vec<DispatchOutcome>,
    unreachable: Vec<String>,
) -> ExecutionReport {
    let failed: Vec<&DispatchOutcome> = outcomes.iter().filter(|o| !o.succeeded()).collect();
    let status = if failed.is_empty() {
        ExecutionStatus::Success
    } else if failed.len() < outcomes.len() {
        ExecutionStatus::Partial
    } else {
        ExecutionStatus::Failure
    };

    let mut message = match status {
        ExecutionStatus::Success => success_message,
        ExecutionStatus::Partial => {
            let names: Vec<&str> = failed.iter().map(|o| o.name.as_str()).collect();
            format!("{}; failed for: {}", success_message, names.join(", "))
        }
        ExecutionStatus::Failure => {
            let reason = failed
                .first()
                .and_then(|o| o.error.as_ref())
                .map(|e| e.to_string())
                .unwrap_or_default();
            format!("Failed to update {}: {}", target_name, reason)
        }
    };
    if !unreachable.is_empty() {
        message.push_str(&format!(" (unreachable: {})", unreachable.join(", ")));
    }

    ExecutionReport {
        message,
        status,
        target_name: target_name.to_string(),
        affected,
        outcomes,
        unreachable,
    }
}

/// Success message for a state change.
fn describe(action: &Action, target: &str, transition_ms: u32) -> String {
    match action {
        Action::Power { on: true } => format!("Turned on {}", target),
        Action::Power { on: false } | Action::BrightnessAbsolute { level: 0 } => {
            format!("Turned off {}", target)
        }
        Action::BrightnessAbsolute { level } => format!("Set {} to {}%", target, level),
        Action::BrightnessPreset { name, level } => {
            format!("Set {} to {} ({}%)", target, name, level)
        }
        Action::BrightnessRelative { delta } if *delta >= 0 => {
            format!("Brightened {} by {}%", target, delta)
        }
        Action::BrightnessRelative { delta } => {
            format!("Dimmed {} by {}%", target, delta.unsigned_abs())
        }
        Action::ColorNamed { name, .. } => format!("Set {} to {}", target, name),
        Action::ColorHex { rgb } | Action::ColorRgb { rgb } => format!(
            "Set {} to #{:02x}{:02x}{:02x}",
            target, rgb.0, rgb.1, rgb.2
        ),
        Action::ColorTemperature { kelvin } => format!("Set {} to {}K", target, kelvin),
        Action::ColorTemperaturePreset { name, kelvin, .. } => {
            format!("Set {} to {} ({}K)", target, name, kelvin)
        }
        Action::Effect { name } => format!("Started {} effect on {}", name, target),
        Action::EffectClear => format!("Cleared effects on {}", target),
        Action::TimedEffect { effect } => format!(
            "Started {} on {} ({} min)",
            effect.as_str(),
            target,
            transition_ms / 60_000
        ),
        Action::Identify => format!("Identifying {}", target),
        Action::SceneRecall { scene } => format!("Activated scene '{}' in {}", scene, target),
        Action::Status | Action::List { .. } | Action::Refresh | Action::Help => {
            format!("{} {}", action.verb(), target)
        }
    }
}
