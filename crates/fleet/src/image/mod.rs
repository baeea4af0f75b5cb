//! Container engine abstraction for building and pushing deployment images.

mod docker;
mod traits;

pub use docker::DockerCli;
pub use traits::{BuildRequest, EngineError, ImageEngine, ImageRef};
