pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod field_path;
pub mod models;
pub mod store;
