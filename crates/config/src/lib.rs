// Configuration loading

pub mod columns;
pub mod credentials;
pub mod settings;

pub use columns::OrderColumns;
pub use credentials::{resolve_credentials, CredentialSource, Credentials};
pub use settings::{
    CarrierSettings, ConfigError, HandoffSettings, OrderSettings, PackageSettings, PathSettings,
    PickupAddress, RetrySettings, Settings,
};
