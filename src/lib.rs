pub mod batch;
pub mod cli;
pub mod client;
pub mod collector;
pub mod config;
pub mod error;
pub mod logging;
pub mod records;
pub mod resolver;
pub mod run_summary;
pub mod samples;
pub mod table;
pub mod template;
