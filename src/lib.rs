pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod state;
pub mod users;
