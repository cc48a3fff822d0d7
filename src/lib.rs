// eval-adapter - intercepting adapter proxy for language model evaluation
// Author: kelexine (https://github.com/kelexine)

pub mod adapter;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod hooks;
pub mod interceptors;
pub mod metrics;
pub mod server;
pub mod utils;
