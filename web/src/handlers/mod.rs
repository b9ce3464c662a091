//! HTTP request handlers.
//!
//! This module contains all HTTP handlers organized by domain. Every
//! queue handler takes a [`QueueScope`](crate::extractors::QueueScope) and
//! leaves committing to the transaction layer.

use office_hours_core::schedule::DayOfWeek;
use serde::Deserialize;

use crate::error::AppError;

pub mod appointments;
pub mod entries;
pub mod health;
pub mod queue;
pub mod websocket;

// Re-export common handler utilities
pub use health::{health_check, readiness};

/// Weekday index from a path, `0` being Sunday.
pub(crate) fn weekday(index: u8) -> Result<DayOfWeek, AppError> {
    DayOfWeek::new(index).map_err(|error| AppError::validation(error.to_string()))
}

/// `{ "content": ... }`
#[derive(Debug, Deserialize)]
pub struct ContentBody {
    /// Text.
    pub content: String,
}
