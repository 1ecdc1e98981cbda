pub mod analysis;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod notify;
pub mod rollup;
pub mod session;
pub mod store;

pub use error::SnapcalError;
