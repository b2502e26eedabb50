//! Domain module
//!
//! Core sale types and business rules.

pub mod duration;
pub mod error;
pub mod events;
pub mod price;
pub mod sale;

pub use duration::{format_duration, format_std_duration, parse_duration, FormatError};
pub use error::{CreateError, PurchaseError, RemoveError};
pub use events::SaleEvent;
pub use price::{Balance, Price, PriceError};
pub use sale::{ItemSnapshot, Sale, SaleStateError, SaleStatus};
