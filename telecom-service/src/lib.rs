pub mod config;
pub mod engines;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
