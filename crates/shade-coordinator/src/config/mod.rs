pub mod device;
pub mod settings;

pub use device::{ConfigError, DeviceConfig, DeviceStore, DeviceUpdate};
pub use settings::{
    BreachSettings, CollectorSettings, CoordinatorSettings, LoadedSettings, SettingsError,
    SettingsLoader,
};
