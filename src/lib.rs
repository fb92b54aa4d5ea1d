pub mod api;
pub mod config;
pub mod error;
pub mod estimation;
pub mod geocode;
pub mod search;
pub mod service;
pub mod source;
pub mod state;
pub mod weather;
