use super::metrics::CacheMetrics;
use super::model::{Group, GroupedLight, Light, Resource, ResourceRef, Scene};
use super::wire::{resource_from_attributes, Listing};
use crate::event::{ChangeKind, ResourceEvent, ResourceKind};
use crate::resolver::{NameIndex, Target};
use crate::transport::{BridgeClient, StreamMessage, TransportError};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Notification sent to collaborators after every cache mutation.
#[derive(Clone, Debug)]
pub enum CacheChange {
    /// Contents replaced by a full sync
    Synced { generation: u64, resources: usize },
    /// One resource changed
    Resource {
        resource: ResourceRef,
        change: ChangeKind,
        attributes: Vec<String>,
        generation: u64,
    },
}

/// What [`StateCache::apply`] did with an event.
#[derive(Clone, Debug, PartialEq)]
pub enum ApplyOutcome {
    Updated(Vec<String>),
    Added,
    Removed,
    Ignored,
}

/// Counts for introspection.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CacheSummary {
    pub generation: u64,
    pub lights: usize,
    pub unreachable_lights: usize,
    pub lights_on: usize,
    pub rooms: usize,
    pub zones: usize,
    pub scenes: usize,
    pub last_sync: Option<DateTime<Utc>>,
}

/// Immutable view of every cached resource at one generation.
///
/// All resources live in a single map keyed by id, so an id can never be
/// cached twice under different kinds.
#[derive(Clone, Debug, Default)]
pub struct Arena {
    resources: HashMap<String, Resource>,
    index: NameIndex,
    generation: u64,
    synced_at: Option<DateTime<Utc>>,
}

impl Arena {
    fn from_resources(resources: Vec<Resource>, generation: u64) -> Self {
        let mut arena = Arena {
            resources: HashMap::with_capacity(resources.len()),
            index: NameIndex::default(),
            generation,
            synced_at: Some(Utc::now()),
        };
        for resource in resources {
            let id = resource.id().to_string();
            if let Some(previous) = arena.resources.get(&id) {
                if previous.kind() != resource.kind() {
                    warn!(
                        resource_id = %id,
                        first = %previous.kind(),
                        second = %resource.kind(),
                        "Duplicate id with different kinds, keeping first"
                    );
                    continue;
                }
            }
            arena.resources.insert(id, resource);
        }
        arena.enforce_room_exclusivity(None);
        arena.refresh_reachability(None);
        arena.rebuild_index();
        arena
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.synced_at
    }

    pub fn name_index(&self) -> &NameIndex {
        &self.index
    }

    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn light(&self, id: &str) -> Option<&Light> {
        match self.resources.get(id) {
            Some(Resource::Light(light)) => Some(light),
            _ => None,
        }
    }

    pub fn room(&self, id: &str) -> Option<&Group> {
        match self.resources.get(id) {
            Some(Resource::Room(group)) => Some(group),
            _ => None,
        }
    }

    pub fn zone(&self, id: &str) -> Option<&Group> {
        match self.resources.get(id) {
            Some(Resource::Zone(group)) => Some(group),
            _ => None,
        }
    }

    pub fn scene(&self, id: &str) -> Option<&Scene> {
        match self.resources.get(id) {
            Some(Resource::Scene(scene)) => Some(scene),
            _ => None,
        }
    }

    /// All lights, sorted by name.
    pub fn lights(&self) -> Vec<&Light> {
        let mut lights: Vec<&Light> = self
            .resources
            .values()
            .filter_map(|r| match r {
                Resource::Light(light) => Some(light),
                _ => None,
            })
            .collect();
        lights.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        lights
    }

    pub fn rooms(&self) -> Vec<&Group> {
        self.groups(ResourceKind::Room)
    }

    pub fn zones(&self) -> Vec<&Group> {
        self.groups(ResourceKind::Zone)
    }

    fn groups(&self, kind: ResourceKind) -> Vec<&Group> {
        let mut groups: Vec<&Group> = self
            .resources
            .values()
            .filter_map(|r| match r {
                Resource::Room(g) if kind == ResourceKind::Room => Some(g),
                Resource::Zone(g) if kind == ResourceKind::Zone => Some(g),
                _ => None,
            })
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        groups
    }

    pub fn scenes(&self) -> Vec<&Scene> {
        let mut scenes: Vec<&Scene> = self
            .resources
            .values()
            .filter_map(|r| match r {
                Resource::Scene(scene) => Some(scene),
                _ => None,
            })
            .collect();
        scenes.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        scenes
    }

    /// Scenes bound to a room or zone.
    pub fn scenes_for_group(&self, group_id: &str) -> Vec<&Scene> {
        self.scenes()
            .into_iter()
            .filter(|s| s.group.as_ref().map(|g| g.rid.as_str()) == Some(group_id))
            .collect()
    }

    /// The room or zone with this id.
    pub fn group(&self, id: &str) -> Option<&Group> {
        self.room(id).or_else(|| self.zone(id))
    }

    /// Grouped-light service of a room or zone, if the bridge exposes one.
    pub fn grouped_light_for(&self, group_id: &str) -> Option<&GroupedLight> {
        let grouped_id = self.group(group_id)?.grouped_light.as_deref()?;
        match self.resources.get(grouped_id) {
            Some(Resource::GroupedLight(grouped)) => Some(grouped),
            _ => None,
        }
    }

    /// Room containing the device that owns `light_id`.
    pub fn room_of_light(&self, light_id: &str) -> Option<&Group> {
        let device = self.light(light_id)?.owner.as_ref()?;
        self.rooms()
            .into_iter()
            .find(|room| room.children.iter().any(|c| c.rid == device.rid))
    }

    /// Lights addressed by a target, sorted by name and without duplicates.
    pub fn lights_for(&self, target: &Target) -> Vec<&Light> {
        match target {
            Target::Light { id, .. } => self.light(id).into_iter().collect(),
            Target::Room { id, .. } | Target::Zone { id, .. } => match self.group(id) {
                Some(group) => self.lights_in_group(group),
                None => Vec::new(),
            },
            Target::AllLights => self.lights(),
        }
    }

    fn lights_in_group(&self, group: &Group) -> Vec<&Light> {
        let mut seen = HashSet::new();
        let mut lights = Vec::new();
        for child in &group.children {
            let ids: Vec<&str> = match self.resources.get(&child.rid) {
                Some(Resource::Device(device)) => device.light_ids().collect(),
                Some(Resource::Light(light)) => vec![light.id.as_str()],
                _ => Vec::new(),
            };
            for id in ids {
                if let Some(light) = self.light(id) {
                    if seen.insert(light.id.as_str()) {
                        lights.push(light);
                    }
                }
            }
        }
        lights.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        lights
    }

    pub fn summary(&self) -> CacheSummary {
        let lights = self.lights();
        CacheSummary {
            generation: self.generation,
            unreachable_lights: lights.iter().filter(|l| !l.reachable).count(),
            lights_on: lights.iter().filter(|l| l.on).count(),
            lights: lights.len(),
            rooms: self.rooms().len(),
            zones: self.zones().len(),
            scenes: self.scenes().len(),
            last_sync: self.synced_at,
        }
    }

    fn rebuild_index(&mut self) {
        self.index = NameIndex::build(self.resources.values());
    }

    /// A device may belong to at most one room. `claimant` (a room whose
    /// children just changed) keeps its devices; otherwise rooms claim in id
    /// order and later rooms lose devices already claimed.
    fn enforce_room_exclusivity(&mut self, claimant: Option<&str>) {
        let mut room_ids: Vec<String> = self
            .resources
            .values()
            .filter(|r| r.kind() == ResourceKind::Room)
            .map(|r| r.id().to_string())
            .collect();
        room_ids.sort_by_key(|id| (Some(id.as_str()) != claimant, id.clone()));

        let mut claimed: HashMap<String, String> = HashMap::new();
        for room_id in room_ids {
            let Some(Resource::Room(room)) = self.resources.get_mut(&room_id) else {
                continue;
            };
            room.children.retain(|child| {
                if child.rtype != ResourceKind::Device {
                    return true;
                }
                match claimed.get(&child.rid) {
                    Some(owner) => {
                        warn!(
                            device_id = %child.rid,
                            room_id = %room_id,
                            claimed_by = %owner,
                            "Device listed in more than one room, dropping duplicate membership"
                        );
                        false
                    }
                    None => {
                        claimed.insert(child.rid.clone(), room_id.clone());
                        true
                    }
                }
            });
        }
    }

    /// Recompute `Light::reachable` from zigbee connectivity, for every light
    /// or only those owned by `device_id`.
    fn refresh_reachability(&mut self, device_id: Option<&str>) {
        let connectivity: HashMap<String, bool> = self
            .resources
            .values()
            .filter_map(|r| match r {
                Resource::ZigbeeConnectivity(c) => {
                    c.owner.as_ref().map(|o| (o.rid.clone(), c.is_connected()))
                }
                _ => None,
            })
            .collect();

        for resource in self.resources.values_mut() {
            let Resource::Light(light) = resource else {
                continue;
            };
            let Some(owner) = light.owner.as_ref() else {
                continue;
            };
            if device_id.is_some_and(|d| d != owner.rid) {
                continue;
            }
            // No connectivity record: assume reachable
            light.reachable = connectivity.get(&owner.rid).copied().unwrap_or(true);
        }
    }

    /// Merge one event. Returns the outcome without touching the generation.
    fn apply_event(&mut self, event: &ResourceEvent) -> ApplyOutcome {
        if event.kind == ResourceKind::Unknown || event.kind == ResourceKind::BridgeHome {
            return ApplyOutcome::Ignored;
        }

        match event.change {
            ChangeKind::Update => {
                let Some(resource) = self.resources.get_mut(&event.id) else {
                    debug!(resource_id = %event.id, kind = %event.kind, "Update for unknown resource, ignoring");
                    return ApplyOutcome::Ignored;
                };
                if resource.kind() != event.kind {
                    warn!(
                        resource_id = %event.id,
                        cached = %resource.kind(),
                        event = %event.kind,
                        "Event kind does not match cached resource, ignoring"
                    );
                    return ApplyOutcome::Ignored;
                }

                let changed = resource.merge(&event.attributes);
                if changed.is_empty() {
                    return ApplyOutcome::Ignored;
                }
                self.after_change(event.kind, &event.id, &changed);
                ApplyOutcome::Updated(changed)
            }
            ChangeKind::Add => {
                if let Some(existing) = self.resources.get(&event.id) {
                    if existing.kind() != event.kind {
                        warn!(resource_id = %event.id, "Add event reuses an id of another kind, ignoring");
                        return ApplyOutcome::Ignored;
                    }
                }
                match resource_from_attributes(event.kind, &event.id, &event.attributes) {
                    Ok(resource) => {
                        self.resources.insert(event.id.clone(), resource);
                        let derived = ["name", "children", "owner"].map(String::from);
                        self.after_change(event.kind, &event.id, &derived);
                        ApplyOutcome::Added
                    }
                    Err(e) => {
                        warn!(resource_id = %event.id, kind = %event.kind, error = %e, "Malformed add event, ignoring");
                        ApplyOutcome::Ignored
                    }
                }
            }
            ChangeKind::Delete => match self.resources.get(&event.id) {
                Some(existing) if existing.kind() == event.kind => {
                    let owner = match existing {
                        Resource::ZigbeeConnectivity(c) => c.owner.as_ref().map(|o| o.rid.clone()),
                        _ => None,
                    };
                    self.resources.remove(&event.id);
                    if let Some(device) = owner {
                        self.refresh_reachability(Some(&device));
                    }
                    self.rebuild_index();
                    ApplyOutcome::Removed
                }
                _ => ApplyOutcome::Ignored,
            },
            ChangeKind::Error => ApplyOutcome::Ignored,
        }
    }

    /// Keep derived data (index, room membership, reachability) consistent.
    fn after_change(&mut self, kind: ResourceKind, id: &str, changed: &[String]) {
        match kind {
            ResourceKind::ZigbeeConnectivity => {
                let owner = match self.resources.get(id) {
                    Some(Resource::ZigbeeConnectivity(c)) => c.owner.as_ref().map(|o| o.rid.clone()),
                    _ => None,
                };
                if let Some(device) = owner {
                    self.refresh_reachability(Some(&device));
                }
            }
            ResourceKind::Light if changed.iter().any(|c| c == "owner") => {
                self.refresh_reachability(None);
            }
            ResourceKind::Room if changed.iter().any(|c| c == "children") => {
                self.enforce_room_exclusivity(Some(id));
            }
            _ => {}
        }

        let renamed = changed.iter().any(|c| c == "name");
        if renamed
            && matches!(
                kind,
                ResourceKind::Light | ResourceKind::Room | ResourceKind::Zone
            )
        {
            self.rebuild_index();
        }
    }
}

/// In-memory model of the bridge.
///
/// The arena sits behind one lock and is replaced copy-on-write: readers
/// take an `Arc` snapshot and release the lock immediately; writers (sync
/// and the event task) mutate under the write lock, which also serializes a
/// full replace against a partial merge.
pub struct StateCache {
    arena: RwLock<Arc<Arena>>,
    changes: broadcast::Sender<CacheChange>,
    metrics: CacheMetrics,
}

impl StateCache {
    /// Create an empty cache (generation 0).
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(1000);
        Self {
            arena: RwLock::new(Arc::new(Arena::default())),
            changes,
            metrics: CacheMetrics::new(),
        }
    }

    /// Current generation snapshot.
    pub fn snapshot(&self) -> Arc<Arena> {
        Arc::clone(&self.arena.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheChange> {
        self.changes.subscribe()
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Fetch every resource kind and replace the cache contents.
    ///
    /// All-or-nothing: if any listing fails the previous generation stays.
    pub async fn sync(&self, client: &BridgeClient) -> Result<u64, TransportError> {
        info!("Synchronizing state cache with bridge");

        let (lights, devices, rooms, zones, grouped_lights, scenes, zigbee_connectivity) =
            futures::try_join!(
                client.get_resources(ResourceKind::Light),
                client.get_resources(ResourceKind::Device),
                client.get_resources(ResourceKind::Room),
                client.get_resources(ResourceKind::Zone),
                client.get_resources(ResourceKind::GroupedLight),
                client.get_resources(ResourceKind::Scene),
                client.get_resources(ResourceKind::ZigbeeConnectivity),
            )?;

        Ok(self.load(Listing {
            lights,
            devices,
            rooms,
            zones,
            grouped_lights,
            scenes,
            zigbee_connectivity,
        }))
    }

    /// Replace the cache contents with `listing`. Returns the new generation.
    pub fn load(&self, listing: Listing) -> u64 {
        let resources = listing.into_resources();
        let count = resources.len();

        let generation = {
            let mut guard = self.arena.write().unwrap_or_else(PoisonError::into_inner);
            let generation = guard.generation + 1;
            *guard = Arc::new(Arena::from_resources(resources, generation));
            generation
        };

        self.metrics.record_sync();
        info!(resources = count, generation = generation, "Loaded state from bridge");
        let _ = self.changes.send(CacheChange::Synced {
            generation,
            resources: count,
        });
        generation
    }

    /// Merge one event into the cache.
    ///
    /// Unknown ids and attributes are ignored; applying the same event twice
    /// leaves the same state.
    pub fn apply(&self, event: &ResourceEvent) -> ApplyOutcome {
        let (outcome, generation) = {
            let mut guard = self.arena.write().unwrap_or_else(PoisonError::into_inner);
            let arena = Arc::make_mut(&mut guard);
            let outcome = arena.apply_event(event);
            if outcome != ApplyOutcome::Ignored {
                arena.generation += 1;
            }
            (outcome, arena.generation)
        };

        if outcome == ApplyOutcome::Ignored {
            self.metrics.record_ignored();
            return outcome;
        }

        self.metrics.record_applied();
        debug!(
            resource_id = %event.id,
            kind = %event.kind,
            change = ?event.change,
            generation = generation,
            "Applied event"
        );

        let attributes = match &outcome {
            ApplyOutcome::Updated(changed) => changed.clone(),
            _ => Vec::new(),
        };
        let _ = self.changes.send(CacheChange::Resource {
            resource: ResourceRef::new(event.id.clone(), event.kind),
            change: event.change,
            attributes,
            generation,
        });
        outcome
    }

    /// Consume the event stream until it ends. This task is the cache's only
    /// event-driven writer, so events are applied in arrival order.
    pub async fn run_subscriber<S>(self: Arc<Self>, mut stream: S)
    where
        S: Stream<Item = StreamMessage> + Unpin,
    {
        info!("Starting state cache event subscriber");

        while let Some(message) = stream.next().await {
            match message {
                StreamMessage::Connected => self.metrics.record_connected(),
                StreamMessage::Event(event) => {
                    self.apply(&event);
                }
                StreamMessage::Disconnected { reason } => {
                    self.metrics.record_disconnected();
                    debug!(reason = %reason, "Event stream disconnected");
                }
                StreamMessage::Rejected { reason } => {
                    self.metrics.record_rejected();
                    warn!(reason = %reason, "Event stream credentials rejected");
                }
            }
        }

        self.metrics.record_disconnected();
        warn!("State cache subscriber stream ended");
    }
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new()
    }
}
