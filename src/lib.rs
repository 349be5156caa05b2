pub mod archive;
pub mod cli;
pub mod config;
pub mod convert;
pub mod csv_store;
pub mod db;
pub mod detect;
pub mod error;
pub mod model;
pub mod parser;
pub mod query;
pub mod report;
pub mod stats;
