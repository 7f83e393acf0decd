//! Domain models for the orchestration engine.

mod allocation;
mod assessment;
mod conflict;
mod patient;
mod resource;

pub use allocation::*;
pub use assessment::*;
pub use conflict::*;
pub use patient::*;
pub use resource::*;
