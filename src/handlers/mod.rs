//! Command Handlers module
//!
//! Handlers that orchestrate business operations.
//! Each handler coordinates aggregates, stores, and the audit log.

mod catalog_handler;
mod commands;
mod order_handler;
mod signup_handler;


pub use catalog_handler::CatalogHandler;
pub use commands::*;
pub use order_handler::{CancelOrderHandler, CreateOrderHandler, PlaceOrderHandler};
pub use signup_handler::SignUpHandler;
