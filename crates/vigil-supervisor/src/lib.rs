//! Edge-node side of vigil: supervises the local inference process on
//! controller command and publishes inference results and sensor triggers.

pub mod config;
pub mod error;
pub mod link;
pub mod node;
pub mod process;
pub mod publisher;
pub mod supervisor;

pub use config::{ProcessSpec, SupervisorConfig};
pub use error::SupervisorError;
pub use link::ControllerLink;
pub use node::SupervisorNode;
pub use process::PidFile;
pub use publisher::EdgePublisher;
pub use supervisor::ProcessSupervisor;
