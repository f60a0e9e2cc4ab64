pub mod backend;
pub mod cache;
pub mod config;
pub mod data;
pub mod error;
pub mod location;
pub mod retry;
