pub mod types;
pub mod error;
pub mod model;
pub mod events;
pub mod voice;
pub mod history;
pub mod resolver;
pub mod recommend;
pub mod player;
pub mod registry;
pub mod builder;

#[cfg(feature = "util")]
pub mod util;

pub use builder::{PlayerConfig, RegistryBuilder, ServiceConfig};
pub use player::PlayerHandle;
pub use registry::{CommandContext, PlayerRegistry};
