// Attribute-update bodies for light, grouped_light and scene PUTs

use crate::color::{kelvin_to_mirek, rgb_to_xy};
use crate::interpreter::Action;
use crate::state::XyColor;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OnField {
    pub on: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DimmingField {
    pub brightness: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaAction {
    Up,
    Down,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DimmingDelta {
    pub action: DeltaAction,
    pub brightness_delta: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColorField {
    pub xy: XyColor,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TemperatureField {
    pub mirek: u16,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Dynamics {
    pub duration: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EffectField {
    pub effect: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimedEffectField {
    pub effect: String,
    pub duration: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActionField {
    pub action: String,
}

/// Body of a light or grouped_light PUT. Unset fields are omitted.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StatePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<OnField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimming: Option<DimmingField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimming_delta: Option<DimmingDelta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_temperature: Option<TemperatureField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamics: Option<Dynamics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effects: Option<EffectField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timed_effects: Option<TimedEffectField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identify: Option<ActionField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<ActionField>,
}

impl StatePayload {
    /// Build the body for a state-changing action.
    ///
    /// `transition_ms` becomes `dynamics.duration` for power, brightness and
    /// color changes; for timed effects it is the effect duration. `grouped`
    /// selects the grouped_light form of identify (`alert`). Returns `None`
    /// for actions that are not a light state change.
    pub fn for_action(action: &Action, transition_ms: u32, grouped: bool) -> Option<Self> {
        let mut payload = StatePayload::default();
        match action {
            Action::Power { on } => {
                payload.on = Some(OnField { on: *on });
            }
            Action::BrightnessAbsolute { level } | Action::BrightnessPreset { level, .. } => {
                if *level == 0 {
                    payload.on = Some(OnField { on: false });
                } else {
                    payload.on = Some(OnField { on: true });
                    payload.dimming = Some(DimmingField {
                        brightness: f64::from(*level),
                    });
                }
            }
            Action::BrightnessRelative { delta } => {
                let action = if *delta >= 0 {
                    // Brightening a light that is off should also switch it on
                    payload.on = Some(OnField { on: true });
                    DeltaAction::Up
                } else {
                    DeltaAction::Down
                };
                payload.dimming_delta = Some(DimmingDelta {
                    action,
                    brightness_delta: f64::from(delta.unsigned_abs().min(100)),
                });
            }
            Action::ColorNamed { rgb, .. } | Action::ColorHex { rgb } | Action::ColorRgb { rgb } => {
                payload.on = Some(OnField { on: true });
                payload.color = Some(ColorField {
                    xy: rgb_to_xy(rgb.0, rgb.1, rgb.2),
                });
            }
            Action::ColorTemperature { kelvin } | Action::ColorTemperaturePreset { kelvin, .. } => {
                payload.on = Some(OnField { on: true });
                payload.color_temperature = Some(TemperatureField {
                    mirek: kelvin_to_mirek(*kelvin),
                });
            }
            Action::Effect { name } => {
                payload.on = Some(OnField { on: true });
                payload.effects = Some(EffectField {
                    effect: name.clone(),
                });
                return Some(payload);
            }
            Action::EffectClear => {
                payload.effects = Some(EffectField {
                    effect: "no_effect".to_string(),
                });
                return Some(payload);
            }
            Action::TimedEffect { effect } => {
                payload.timed_effects = Some(TimedEffectField {
                    effect: effect.as_str().to_string(),
                    duration: transition_ms,
                });
                return Some(payload);
            }
            Action::Identify => {
                if grouped {
                    payload.alert = Some(ActionField {
                        action: "breathe".to_string(),
                    });
                } else {
                    payload.identify = Some(ActionField {
                        action: "identify".to_string(),
                    });
                }
                return Some(payload);
            }
            Action::SceneRecall { .. }
            | Action::Status
            | Action::List { .. }
            | Action::Refresh
            | Action::Help => return None,
        }

        payload.dynamics = Some(Dynamics {
            duration: transition_ms,
        });
        Some(payload)
    }

    /// Whether a grouped_light accepts this body. Effects only exist per light.
    pub fn fits_grouped_light(&self) -> bool {
        self.effects.is_none() && self.timed_effects.is_none() && self.identify.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Recall {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
}

/// Body of a scene PUT that activates the scene.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecallPayload {
    pub recall: Recall,
}

impl RecallPayload {
    pub fn active(duration: Option<u32>) -> Self {
        Self {
            recall: Recall {
                action: "active".to_string(),
                duration,
            },
        }
    }
}
