pub mod auth;
pub mod cli;
pub mod config;
pub mod handlers;
pub mod media;
pub mod models;
pub mod pass;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod utils;
