//! Application layer - Ports, typed repositories and boundary DTOs

pub mod dto;
pub mod ports;
pub mod services;
