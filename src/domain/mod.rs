//! Domain layer - Core business logic
//!
//! This module contains the core domain entities, repository traits,
//! and domain services. It knows nothing about concrete container or
//! filesystem formats.

pub mod entities;
pub mod repositories;
pub mod services;
