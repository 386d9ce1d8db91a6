//! Core domain types and logic: dataset, rolling statistics, results, schemas,
//! composite scoring, the domain processors and the pipeline that runs them.

pub mod dataset;
pub mod timeseries;
pub mod result;
pub mod schema;
pub mod composite;
pub mod processors;
pub mod pipeline;
pub mod config_validation;
pub mod error;
