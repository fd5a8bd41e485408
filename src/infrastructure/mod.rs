pub mod backend_client;
pub mod config;
pub mod error;
pub mod event_cache;
pub mod frame_codec;
pub mod launcher;
pub mod logging;
