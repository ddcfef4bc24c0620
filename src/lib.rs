//! jpashop Library
//!
//! Re-exports modules for integration testing and external use.

pub mod aggregate;
pub mod api;
pub mod audit;
pub mod domain;
pub mod handlers;
pub mod repository;

pub mod config;
pub mod db;
pub mod error;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use domain::{DomainError, OperationContext};
