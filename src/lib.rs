pub mod auth;
pub mod cache;
pub mod config;
pub mod database;
pub mod document;
pub mod domain;
pub mod embedding;
pub mod generation;
pub mod handlers;
pub mod ingest;
pub mod logging;
pub mod orchestrator;
pub mod planner;
pub mod retrieval;
pub mod state;
pub mod strategies;
pub mod utils;

#[cfg(test)]
#[path = "test/integration_test.rs"]
mod integration_test;
