pub mod config;
pub mod display;
pub mod errors;
pub mod exec;
pub mod extract;
pub mod harness;
pub mod stats;
pub mod template;
pub mod types;
