pub mod cli;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod fuzz;
pub mod http;
pub mod models;
pub mod pipeline;
pub mod sink;
pub mod tools;
pub mod utils;
