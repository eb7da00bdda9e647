pub mod envelope;
pub mod error;

pub use envelope::{ApiResponse, Page, ResponseHeader, unwrap, unwrap_paginated};
pub use error::DoorayError;
