pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod logging;
pub mod performance;
pub mod state;
pub mod sync;
pub mod utils;
pub mod v3;
pub mod web;
