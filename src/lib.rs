//! Lead Intent & Prioritization Engine
//!
//! Scores leads from profile, engagement and firmographic data, detects
//! buying signals, derives insights and next best actions, and ranks a
//! workspace's active leads into priority tiers.
//!
//! # Modules
//!
//! - `cache_validator`: Checksummed cache entries.
//! - `config`: Configuration management.
//! - `datastore`: Persistence trait used by the service.
//! - `db`: Database connection and pool management.
//! - `db_storage`: Postgres datastore.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers and routes.
//! - `insights`: Insights, recommendations and next best actions.
//! - `memory_store`: In-memory datastore for tests and demos.
//! - `models`: Core data models.
//! - `prioritizer`: Priority tiers and ranking.
//! - `scoring`: Score calculator.
//! - `service`: Request pipelines.
//! - `signals`: Buying signal detection.

pub mod cache_validator;
pub mod config;
pub mod datastore;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod handlers;
pub mod insights;
pub mod memory_store;
pub mod models;
pub mod prioritizer;
pub mod scoring;
pub mod service;
pub mod signals;
