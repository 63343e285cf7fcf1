mod settings;

pub use settings::{HubConfig, LogConfig, ServerConfig, Settings};
