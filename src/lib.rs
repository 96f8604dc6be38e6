//! Client-side synchronization layer for the taskso task tracker: session
//! and credential lifetime, a typed gateway to the task service, a query
//! cache with mutation-driven invalidation, and the route guard.

pub mod cache;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod guard;
pub mod models;
pub mod services;
pub mod session;
pub mod state;

pub use error::AppError;
pub use state::AppContext;
