//! Adapters facing callers: API-key authentication and wire DTOs.

pub mod auth;
pub mod dto;
