use crate::event::ResourceKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `(id, kind)` pair addressing any bridge resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub rid: String,
    pub rtype: ResourceKind,
}

impl ResourceRef {
    pub fn new(rid: impl Into<String>, rtype: ResourceKind) -> Self {
        Self {
            rid: rid.into(),
            rtype,
        }
    }
}

/// CIE 1931 chromaticity coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct XyColor {
    pub x: f64,
    pub y: f64,
}

/// Current color mode of a light.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum LightColor {
    Xy(XyColor),
    Temperature { mirek: u16 },
}

#[derive(Clone, Debug, Serialize)]
pub struct Light {
    pub id: String,
    pub name: String,
    /// Owning device
    pub owner: Option<ResourceRef>,
    pub on: bool,
    /// 0-100, `None` for non-dimmable lights
    pub brightness: Option<f64>,
    pub color: Option<LightColor>,
    /// Derived from the owning device's zigbee connectivity
    pub reachable: bool,
    pub supports_color: bool,
    pub supports_temperature: bool,
    /// Effects the light advertises (`effects.effect_values`)
    pub effects: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub services: Vec<ResourceRef>,
}

impl Device {
    /// Light services owned by this device.
    pub fn light_ids(&self) -> impl Iterator<Item = &str> {
        self.services
            .iter()
            .filter(|s| s.rtype == ResourceKind::Light)
            .map(|s| s.rid.as_str())
    }
}

/// Room or zone.
#[derive(Clone, Debug, Serialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    /// Devices for rooms, light services for zones
    pub children: Vec<ResourceRef>,
    /// The grouped_light service controlling this group
    pub grouped_light: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct GroupedLight {
    pub id: String,
    pub owner: Option<ResourceRef>,
    /// Aggregate on flag, only ever copied from the bridge
    pub on: Option<bool>,
    pub brightness: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SceneAction {
    pub target: ResourceRef,
    pub action: Value,
}

#[derive(Clone, Debug, Serialize)]
pub struct Scene {
    pub id: String,
    pub name: String,
    pub group: Option<ResourceRef>,
    pub actions: Vec<SceneAction>,
    pub palette: Option<Value>,
    pub speed: Option<f64>,
    pub auto_dynamic: bool,
    /// `status.active` as reported (`inactive`, `static`, `dynamic_palette`)
    pub active: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Connectivity {
    pub id: String,
    pub owner: Option<ResourceRef>,
    pub status: String,
}

impl Connectivity {
    pub fn is_connected(&self) -> bool {
        self.status == "connected"
    }
}

/// Any cached resource.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Resource {
    Light(Light),
    Device(Device),
    Room(Group),
    Zone(Group),
    GroupedLight(GroupedLight),
    Scene(Scene),
    ZigbeeConnectivity(Connectivity),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Light(_) => ResourceKind::Light,
            Resource::Device(_) => ResourceKind::Device,
            Resource::Room(_) => ResourceKind::Room,
            Resource::Zone(_) => ResourceKind::Zone,
            Resource::GroupedLight(_) => ResourceKind::GroupedLight,
            Resource::Scene(_) => ResourceKind::Scene,
            Resource::ZigbeeConnectivity(_) => ResourceKind::ZigbeeConnectivity,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Resource::Light(r) => &r.id,
            Resource::Device(r) => &r.id,
            Resource::Room(r) | Resource::Zone(r) => &r.id,
            Resource::GroupedLight(r) => &r.id,
            Resource::Scene(r) => &r.id,
            Resource::ZigbeeConnectivity(r) => &r.id,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Resource::Light(r) => Some(&r.name),
            Resource::Device(r) => Some(&r.name),
            Resource::Room(r) | Resource::Zone(r) => Some(&r.name),
            Resource::Scene(r) => Some(&r.name),
            Resource::GroupedLight(_) | Resource::ZigbeeConnectivity(_) => None,
        }
    }

    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(self.id(), self.kind())
    }

    /// Overwrite the attributes present in `attributes`.
    ///
    /// Returns the names of the attributes that were recognised. Unknown keys
    /// are ignored so new bridge fields never break an update.
    pub fn merge(&mut self, attributes: &Map<String, Value>) -> Vec<String> {
        let mut changed = Vec::new();
        for (key, value) in attributes {
            let applied = match self {
                Resource::Light(light) => merge_light(light, key, value),
                Resource::Device(device) => merge_device(device, key, value),
                Resource::Room(group) | Resource::Zone(group) => merge_group(group, key, value),
                Resource::GroupedLight(grouped) => merge_grouped_light(grouped, key, value),
                Resource::Scene(scene) => merge_scene(scene, key, value),
                Resource::ZigbeeConnectivity(conn) => merge_connectivity(conn, key, value),
            };
            if applied {
                changed.push(if key == "metadata" {
                    "name".to_string()
                } else {
                    key.clone()
                });
            }
        }
        changed
    }
}

fn metadata_name(value: &Value) -> Option<String> {
    value.get("name").and_then(Value::as_str).map(str::to_string)
}

fn on_flag(value: &Value) -> Option<bool> {
    value.get("on").and_then(Value::as_bool)
}

fn brightness(value: &Value) -> Option<f64> {
    value.get("brightness").and_then(Value::as_f64)
}

fn reference(value: &Value) -> Option<ResourceRef> {
    serde_json::from_value(value.clone()).ok()
}

fn references(value: &Value) -> Option<Vec<ResourceRef>> {
    serde_json::from_value(value.clone()).ok()
}

fn merge_light(light: &mut Light, key: &str, value: &Value) -> bool {
    match key {
        "metadata" => metadata_name(value).map(|name| light.name = name).is_some(),
        "owner" => reference(value).map(|owner| light.owner = Some(owner)).is_some(),
        "on" => on_flag(value).map(|on| light.on = on).is_some(),
        "dimming" => brightness(value)
            .map(|b| light.brightness = Some(b))
            .is_some(),
        "color" => {
            let xy = value
                .get("xy")
                .and_then(|xy| serde_json::from_value::<XyColor>(xy.clone()).ok());
            match xy {
                Some(xy) => {
                    light.color = Some(LightColor::Xy(xy));
                    light.supports_color = true;
                    true
                }
                None => false,
            }
        }
        "color_temperature" => {
            let valid = value
                .get("mirek_valid")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            match value.get("mirek").and_then(Value::as_u64) {
                Some(mirek) if valid => {
                    light.color = Some(LightColor::Temperature {
                        mirek: mirek.min(u16::MAX as u64) as u16,
                    });
                    light.supports_temperature = true;
                    true
                }
                _ => false,
            }
        }
        "effects" => match value.get("effect_values").and_then(|v| v.as_array()) {
            Some(values) => {
                light.effects = values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect();
                true
            }
            None => false,
        },
        _ => false,
    }
}

fn merge_device(device: &mut Device, key: &str, value: &Value) -> bool {
    match key {
        "metadata" => metadata_name(value).map(|name| device.name = name).is_some(),
        "services" => references(value).map(|s| device.services = s).is_some(),
        _ => false,
    }
}

fn merge_group(group: &mut Group, key: &str, value: &Value) -> bool {
    match key {
        "metadata" => metadata_name(value).map(|name| group.name = name).is_some(),
        "children" => references(value).map(|c| group.children = c).is_some(),
        "services" => match references(value) {
            Some(services) => {
                group.grouped_light = grouped_light_service(&services);
                true
            }
            None => false,
        },
        _ => false,
    }
}

fn merge_grouped_light(grouped: &mut GroupedLight, key: &str, value: &Value) -> bool {
    match key {
        "owner" => reference(value).map(|o| grouped.owner = Some(o)).is_some(),
        "on" => on_flag(value).map(|on| grouped.on = Some(on)).is_some(),
        "dimming" => brightness(value)
            .map(|b| grouped.brightness = Some(b))
            .is_some(),
        _ => false,
    }
}

fn merge_scene(scene: &mut Scene, key: &str, value: &Value) -> bool {
    match key {
        "metadata" => metadata_name(value).map(|name| scene.name = name).is_some(),
        "group" => reference(value).map(|g| scene.group = Some(g)).is_some(),
        "palette" => {
            scene.palette = Some(value.clone());
            true
        }
        "speed" => value.as_f64().map(|s| scene.speed = Some(s)).is_some(),
        "auto_dynamic" => value.as_bool().map(|a| scene.auto_dynamic = a).is_some(),
        "status" => match value.get("active").and_then(Value::as_str) {
            Some(active) => {
                scene.active = Some(active.to_string());
                true
            }
            None => false,
        },
        "actions" => match value.as_array() {
            Some(items) => {
                scene.actions = items.iter().filter_map(scene_action).collect();
                true
            }
            None => false,
        },
        _ => false,
    }
}

fn merge_connectivity(conn: &mut Connectivity, key: &str, value: &Value) -> bool {
    match key {
        "status" => value
            .as_str()
            .map(|s| conn.status = s.to_string())
            .is_some(),
        "owner" => reference(value).map(|o| conn.owner = Some(o)).is_some(),
        _ => false,
    }
}

pub(crate) fn scene_action(value: &Value) -> Option<SceneAction> {
    Some(SceneAction {
        target: reference(value.get("target")?)?,
        action: value.get("action").cloned().unwrap_or(Value::Null),
    })
}

pub(crate) fn grouped_light_service(services: &[ResourceRef]) -> Option<String> {
    services
        .iter()
        .find(|s| s.rtype == ResourceKind::GroupedLight)
        .map(|s| s.rid.clone())
}
