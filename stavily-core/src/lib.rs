//! Stavily Agent Core
//!
//! Shared types for the Stavily agent: the domain model of agent identity,
//! instructions, plugins, and their results, and the wire DTOs for the
//! Orchestrator HTTP API.
//!
//! This crate contains:
//! - Domain types: core business entities
//! - DTOs: data transfer objects for the Orchestrator Client

pub mod domain;
pub mod dto;
