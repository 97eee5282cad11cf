//! Data transfer objects for the dispatch boundary

mod entity;

pub use entity::{CreateEntityRequestDto, DtoError, EntityResponseDto, UpdateEntityRequestDto};
