// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Shadow Defective: shadow-based time-of-day analysis
//!
//! Prepares a photograph and its coordinates for a hosted vision model,
//! asks it to reason about solar angle from the shadows, and exports the
//! answer as a plain-text report.

pub mod client;
pub mod config;
pub mod encoder;
pub mod error;
pub mod geo;
pub mod orchestrator;
pub mod report;
pub mod request;

pub use config::AppConfig;
pub use error::{Result, ShadowError};
