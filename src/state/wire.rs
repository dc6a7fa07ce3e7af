// Listing payloads as returned by GET /resource/<kind>

use super::model::{
    grouped_light_service, scene_action, Connectivity, Device, Group, GroupedLight, Light,
    LightColor, Resource, ResourceRef, Scene, XyColor,
};
use crate::event::ResourceKind;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Default, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct OnState {
    pub on: bool,
}

#[derive(Debug, Deserialize)]
pub struct Dimming {
    pub brightness: f64,
}

#[derive(Debug, Deserialize)]
pub struct ColorState {
    pub xy: XyColor,
}

#[derive(Debug, Deserialize)]
pub struct ColorTemperatureState {
    #[serde(default)]
    pub mirek: Option<u16>,
    #[serde(default)]
    pub mirek_valid: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EffectsState {
    #[serde(default)]
    pub effect_values: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LightData {
    pub id: String,
    #[serde(default)]
    pub owner: Option<ResourceRef>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub on: Option<OnState>,
    #[serde(default)]
    pub dimming: Option<Dimming>,
    #[serde(default)]
    pub color: Option<ColorState>,
    #[serde(default)]
    pub color_temperature: Option<ColorTemperatureState>,
    #[serde(default)]
    pub effects: Option<EffectsState>,
}

#[derive(Debug, Deserialize)]
pub struct DeviceData {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub services: Vec<ResourceRef>,
}

#[derive(Debug, Deserialize)]
pub struct GroupData {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub children: Vec<ResourceRef>,
    #[serde(default)]
    pub services: Vec<ResourceRef>,
}

#[derive(Debug, Deserialize)]
pub struct GroupedLightData {
    pub id: String,
    #[serde(default)]
    pub owner: Option<ResourceRef>,
    #[serde(default)]
    pub on: Option<OnState>,
    #[serde(default)]
    pub dimming: Option<Dimming>,
}

#[derive(Debug, Deserialize)]
pub struct SceneStatus {
    #[serde(default)]
    pub active: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SceneData {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub group: Option<ResourceRef>,
    #[serde(default)]
    pub actions: Vec<Value>,
    #[serde(default)]
    pub palette: Option<Value>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub auto_dynamic: Option<bool>,
    #[serde(default)]
    pub status: Option<SceneStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectivityData {
    pub id: String,
    #[serde(default)]
    pub owner: Option<ResourceRef>,
    #[serde(default)]
    pub status: String,
}

/// Result of a full fetch, one vector per resource kind.
#[derive(Debug, Default, Deserialize)]
pub struct Listing {
    #[serde(default)]
    pub lights: Vec<LightData>,
    #[serde(default)]
    pub devices: Vec<DeviceData>,
    #[serde(default)]
    pub rooms: Vec<GroupData>,
    #[serde(default)]
    pub zones: Vec<GroupData>,
    #[serde(default)]
    pub grouped_lights: Vec<GroupedLightData>,
    #[serde(default)]
    pub scenes: Vec<SceneData>,
    #[serde(default)]
    pub zigbee_connectivity: Vec<ConnectivityData>,
}

impl Listing {
    pub fn into_resources(self) -> Vec<Resource> {
        let mut resources = Vec::new();
        resources.extend(self.lights.into_iter().map(|l| Resource::Light(l.into())));
        resources.extend(self.devices.into_iter().map(|d| Resource::Device(d.into())));
        resources.extend(self.rooms.into_iter().map(|r| Resource::Room(r.into())));
        resources.extend(self.zones.into_iter().map(|z| Resource::Zone(z.into())));
        resources.extend(
            self.grouped_lights
                .into_iter()
                .map(|g| Resource::GroupedLight(g.into())),
        );
        resources.extend(self.scenes.into_iter().map(|s| Resource::Scene(s.into())));
        resources.extend(
            self.zigbee_connectivity
                .into_iter()
                .map(|c| Resource::ZigbeeConnectivity(c.into())),
        );
        resources
    }
}

impl From<LightData> for Light {
    fn from(data: LightData) -> Self {
        let temperature = data
            .color_temperature
            .as_ref()
            .filter(|ct| ct.mirek_valid.unwrap_or(true))
            .and_then(|ct| ct.mirek);
        // A valid mirek value means the light is in temperature mode.
        let color = match (temperature, &data.color) {
            (Some(mirek), _) => Some(LightColor::Temperature { mirek }),
            (None, Some(c)) => Some(LightColor::Xy(c.xy)),
            (None, None) => None,
        };

        Light {
            id: data.id,
            name: data.metadata.name,
            owner: data.owner,
            on: data.on.map(|o| o.on).unwrap_or(false),
            brightness: data.dimming.map(|d| d.brightness),
            color,
            reachable: true,
            supports_color: data.color.is_some(),
            supports_temperature: data.color_temperature.is_some(),
            effects: data.effects.unwrap_or_default().effect_values,
        }
    }
}

impl From<DeviceData> for Device {
    fn from(data: DeviceData) -> Self {
        Device {
            id: data.id,
            name: data.metadata.name,
            services: data.services,
        }
    }
}

impl From<GroupData> for Group {
    fn from(data: GroupData) -> Self {
        Group {
            grouped_light: grouped_light_service(&data.services),
            id: data.id,
            name: data.metadata.name,
            children: data.children,
        }
    }
}

impl From<GroupedLightData> for GroupedLight {
    fn from(data: GroupedLightData) -> Self {
        GroupedLight {
            id: data.id,
            owner: data.owner,
            on: data.on.map(|o| o.on),
            brightness: data.dimming.map(|d| d.brightness),
        }
    }
}

impl From<SceneData> for Scene {
    fn from(data: SceneData) -> Self {
        Scene {
            id: data.id,
            name: data.metadata.name,
            group: data.group,
            actions: data.actions.iter().filter_map(scene_action).collect(),
            palette: data.palette,
            speed: data.speed,
            auto_dynamic: data.auto_dynamic.unwrap_or(false),
            active: data.status.and_then(|s| s.active),
        }
    }
}

impl From<ConnectivityData> for Connectivity {
    fn from(data: ConnectivityData) -> Self {
        Connectivity {
            id: data.id,
            owner: data.owner,
            status: data.status,
        }
    }
}

/// Build a resource from the full body carried by an `add` event.
pub(crate) fn resource_from_attributes(
    kind: ResourceKind,
    id: &str,
    attributes: &Map<String, Value>,
) -> Result<Resource, serde_json::Error> {
    let mut body = attributes.clone();
    body.insert("id".to_string(), Value::String(id.to_string()));
    let body = Value::Object(body);

    Ok(match kind {
        ResourceKind::Light => Resource::Light(serde_json::from_value::<LightData>(body)?.into()),
        ResourceKind::Device => {
            Resource::Device(serde_json::from_value::<DeviceData>(body)?.into())
        }
        ResourceKind::Room => Resource::Room(serde_json::from_value::<GroupData>(body)?.into()),
        ResourceKind::Zone => Resource::Zone(serde_json::from_value::<GroupData>(body)?.into()),
        ResourceKind::GroupedLight => {
            Resource::GroupedLight(serde_json::from_value::<GroupedLightData>(body)?.into())
        }
        ResourceKind::Scene => Resource::Scene(serde_json::from_value::<SceneData>(body)?.into()),
        ResourceKind::ZigbeeConnectivity => Resource::ZigbeeConnectivity(
            serde_json::from_value::<ConnectivityData>(body)?.into(),
        ),
        ResourceKind::BridgeHome | ResourceKind::Unknown => {
            return Err(serde::de::Error::custom(format!(
                "{} resources are not cached",
                kind
            )))
        }
    })
}
