//! Application services

mod entity_repository;

pub use entity_repository::Repository;
