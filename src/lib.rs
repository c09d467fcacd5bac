//! Coordinated PostgreSQL schema migrations and schema drift detection.

pub mod commands;
pub mod config;
pub mod constants;
pub mod definition;
pub mod drift;
pub mod runner;
pub mod schema;
pub mod schemas;
pub mod store;
