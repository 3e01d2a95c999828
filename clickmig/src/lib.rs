#![forbid(unsafe_code)]

mod config;
mod context;
mod database;
mod error;
mod lease;
mod ledger;
mod lock;
mod migration;
mod worker;

pub use config::*;
pub use context::*;
pub use database::*;
pub use error::*;
pub use lease::*;
pub use ledger::*;
pub use lock::*;
pub use migration::*;
pub use worker::*;

pub mod store {
    pub use clickmig_store::*;
}

pub mod client {
    pub use clickmig_client::*;
}

pub use clickmig_client::Client;
pub use clickmig_store::{Clock, SystemClock};

#[cfg(feature = "memory")]
pub use clickmig_store::ManualClock;
