// Normalized item model shared by every connector
pub mod item;

// Outbound request rate limiting
pub mod rate_limit;

// TOML configuration
pub mod config;

pub use item::{CommonItem, ItemClass, ListingWindow};
