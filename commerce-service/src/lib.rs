pub mod config;
pub mod dtos;
pub mod epay;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;
