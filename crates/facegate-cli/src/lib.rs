pub mod cli;
pub mod commands;
pub mod config;
pub mod doctor;
pub mod engine;
pub mod errors;
pub mod keyring;
pub mod output;
