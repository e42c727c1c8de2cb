//! taxaharvest - resumable harvesting of plant taxon records.
//!
//! Fetches one structured record per named target, merges it into a
//! persistent store without ever replacing a complete record with an
//! incomplete one, and resumes across restarts, bans and rate limiting.

pub mod config;
pub mod extract;
pub mod fetch;
pub mod harvest;
pub mod identity;
pub mod merge;
pub mod models;
pub mod repository;
pub mod schema;
pub mod state;
pub mod targets;
