// Integration tests for schemaflow

pub mod cli;
pub mod helpers;
pub mod runner;
