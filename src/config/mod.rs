mod settings;

pub use settings::{AssetSettings, Config, Mount, ServerSettings, Settings, WispSettings};
