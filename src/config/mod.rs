mod settings;

pub use settings::{Config, ReconnectPolicy, StreamConfig, TomlConfig, EXAMPLE_CONFIG};
