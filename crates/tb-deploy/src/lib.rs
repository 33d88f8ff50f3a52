pub mod artifacts;
pub mod deployment;
pub mod error;
pub mod name;
pub mod poll;
pub mod profiles;
pub mod services;
pub mod settings;
pub mod status;

pub use deployment::{Backends, Deployment, DeploymentReport};
pub use error::{DeployError, Result};
pub use name::DeploymentName;
pub use poll::PollPolicy;
pub use settings::Settings;
pub use status::{Progress, Status};
