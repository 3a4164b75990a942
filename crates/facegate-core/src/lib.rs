pub mod errors;
pub mod faces;
pub mod secret_service;
