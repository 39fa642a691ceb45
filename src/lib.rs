pub mod catalog;
pub mod checker;
pub mod checks;
pub mod cluster;
pub mod config;
pub mod context;
pub mod entities;
pub mod models;
pub mod queries;
pub mod reporter;
