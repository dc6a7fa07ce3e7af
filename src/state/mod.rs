// Resource state cache, kept current by the bridge event stream

mod cache;
mod metrics;
mod model;
mod wire;

pub use cache::{ApplyOutcome, Arena, CacheChange, CacheSummary, StateCache};
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use model::{
    Connectivity, Device, Group, GroupedLight, Light, LightColor, Resource, ResourceRef, Scene,
    SceneAction, XyColor,
};
pub use wire::Listing;

#[cfg(test)]
pub(crate) mod fixtures;
#[cfg(test)]
mod tests;
