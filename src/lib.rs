pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod directory;
pub mod docs;
pub mod engine;
pub mod error;
pub mod model;
pub mod notifier;
pub mod routes;
pub mod store;
pub mod utils;
