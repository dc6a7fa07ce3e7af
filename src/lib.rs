// Token-bucket pacing for bridge requests
pub mod rate_limit;

// Resource change events and the SSE codec
pub mod event;

// CLIP v2 HTTP client and event stream
pub mod transport;

// Resource cache kept current by the event stream
pub mod state;

// Fuzzy binding of target phrases to lights, rooms and zones
pub mod resolver;

// Free-text command grammar
pub mod interpreter;

// Intent dispatch to the bridge
pub mod executor;

// Line-oriented command surface
pub mod session;

// Color space conversions
pub mod color;

// TOML configuration and environment overrides
pub mod config;
