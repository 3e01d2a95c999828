#![forbid(unsafe_code)]

mod clock;
mod engine;
mod error;

pub use clock::*;
pub use engine::*;
pub use error::*;
