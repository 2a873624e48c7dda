pub mod config;
pub mod container;
pub mod engine;
pub mod error;
pub mod identity;
pub mod lockfile;
pub mod logging;
pub mod primitive;
pub mod provider;

pub use config::SecsConfig;
pub use container::{Container, State};
pub use engine::{ContainerService, Step, StepPolicy, MIN_CREATE_MB};
pub use error::{SecsError, SecsResult};
pub use identity::Identity;
pub use primitive::Primitive;
pub use provider::ContainerProvider;
