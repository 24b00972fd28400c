// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Prompt resolution and request assembly

use crate::encoder::ImagePayload;
use crate::{Result, ShadowError};

pub const LAT_PLACEHOLDER: &str = "{lat}";
pub const LON_PLACEHOLDER: &str = "{lon}";

/// Replace `{lat}` and `{lon}` with the given text.
///
/// Substitution is literal: the coordinate strings are inserted as-is.
pub fn resolve_prompt(template: &str, latitude: &str, longitude: &str) -> Result<String> {
    let prompt = template
        .replace(LAT_PLACEHOLDER, latitude)
        .replace(LON_PLACEHOLDER, longitude);

    if prompt.trim().is_empty() {
        return Err(ShadowError::Validation("Prompt cannot be empty.".to_string()));
    }

    Ok(prompt)
}

/// Everything the vision client needs for one call.
///
/// Fields are private so a built request cannot be altered before it is sent.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    image: ImagePayload,
    prompt: String,
    model: String,
    max_output_tokens: u32,
}

impl AnalysisRequest {
    pub fn new(
        image: ImagePayload,
        prompt: String,
        model: impl Into<String>,
        max_output_tokens: u32,
    ) -> Self {
        Self {
            image,
            prompt,
            model: model.into(),
            max_output_tokens,
        }
    }

    pub fn image(&self) -> &ImagePayload {
        &self.image
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }
}
