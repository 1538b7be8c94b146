pub mod models;
pub mod repositories;
pub mod server;
pub mod services;
pub mod settings;
pub mod validation;
