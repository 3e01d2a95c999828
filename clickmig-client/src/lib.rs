#![forbid(unsafe_code)]

mod client;
mod engine;
mod error;

pub use client::*;
pub use engine::*;
pub use error::*;
