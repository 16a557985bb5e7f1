// Library entry point for the Violeta API
// Exposes modules for testing

pub mod api;
pub mod auth;
pub mod compile;
pub mod config;
pub mod error;
pub mod files;
pub mod models;
pub mod store;
