pub mod allowlist;
pub mod config;
pub mod events;
pub mod framing;
pub mod fsutil;
pub mod process;
pub mod sessions;
pub mod store;
pub mod tools;
