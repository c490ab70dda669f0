//! Runtime state shared between start-up stages

pub mod domains;
pub mod model;

pub use domains::DomainSet;
pub use model::StartupContext;
