pub mod config;
pub mod config_loader;
pub mod error;
pub mod poller;
pub mod state_machine;
pub mod traits;

pub use config::{CONFIG_TEMPLATE, InviteCodeSettings, PublishSettings, PublisherConfig};
pub use config_loader::{ConfigLoadOptions, ConfigLoader};
pub use error::*;
pub use poller::*;
pub use state_machine::*;
pub use traits::*;
