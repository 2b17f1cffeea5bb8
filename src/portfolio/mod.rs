// src/portfolio/mod.rs
mod models;
mod service;
mod valuation;

pub use models::*;
pub use service::*;
pub use valuation::*;
