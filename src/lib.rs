//! flashSale Library
//!
//! Time-boxed, limited-stock sales: lifecycle state machine, purchase
//! transactions and deadline scheduling. External systems are reached
//! through the traits in `ports`.

pub mod config;
pub mod domain;
pub mod jobs;
pub mod manager;
pub mod ports;

mod error;

pub use config::Config;
pub use error::{AppError, AppResult, ErrorResponse};
pub use domain::{CreateError, Price, PurchaseError, RemoveError, Sale, SaleEvent, SaleStatus};
pub use jobs::SaleScheduler;
pub use manager::{Actor, CreateSaleCommand, Receipt, SaleManager, SalePorts};
