//! Outbound ports - Interfaces that the application requires from storage

mod clock_port;
mod error;
mod repository_port;

pub use clock_port::ClockPort;
pub use error::RepoError;
pub use repository_port::{BackendKind, EntityRepositoryPort, StorageBackendPort};
