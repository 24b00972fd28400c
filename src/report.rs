// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Plain-text analysis reports

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

use crate::{Result, ShadowError};

pub const REPORT_TITLE: &str = "Shadow Defective OSINT Report";

/// File extensions offered for saved reports
pub const REPORT_EXTENSIONS: &[&str] = &["txt", "md"];

const RULE_WIDTH: usize = 40;

/// One finished analysis, ready to be written out
#[derive(Debug, Clone)]
pub struct Report {
    pub generated_at: DateTime<Local>,
    pub image_path: Option<PathBuf>,
    pub latitude: String,
    pub longitude: String,
    pub prompt: String,
    pub analysis: String,
}

impl Report {
    /// Create a report stamped with the current local time
    pub fn new(
        image_path: Option<PathBuf>,
        latitude: impl Into<String>,
        longitude: impl Into<String>,
        prompt: impl Into<String>,
        analysis: impl Into<String>,
    ) -> Self {
        Self {
            generated_at: Local::now(),
            image_path,
            latitude: latitude.into(),
            longitude: longitude.into(),
            prompt: prompt.into(),
            analysis: analysis.into(),
        }
    }

    /// Render the fixed text layout
    pub fn render(&self) -> String {
        let heavy = "=".repeat(RULE_WIDTH);
        let light = "-".repeat(RULE_WIDTH);
        let image = self
            .image_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "N/A".to_string());

        format!(
            "{title}\n\
             {heavy}\n\
             Timestamp  : {timestamp}\n\
             Image      : {image}\n\
             Latitude   : {lat}\n\
             Longitude  : {lon}\n\
             {heavy}\n\
             \n\
             PROMPT\n\
             {light}\n\
             {prompt}\n\
             \n\
             ANALYSIS\n\
             {light}\n\
             {analysis}\n",
            title = REPORT_TITLE,
            heavy = heavy,
            light = light,
            timestamp = self.generated_at.format("%Y-%m-%d %H:%M:%S"),
            image = image,
            lat = self.latitude.trim(),
            lon = self.longitude.trim(),
            prompt = self.prompt.trim(),
            analysis = self.analysis.trim(),
        )
    }

    /// `shadow_report_<YYYYMMDD_HHMMSS>.txt`
    pub fn default_filename(&self) -> String {
        format!(
            "shadow_report_{}.txt",
            self.generated_at.format("%Y%m%d_%H%M%S")
        )
    }

    /// Write the report to `path`. An empty analysis is refused.
    pub fn save(&self, path: &Path) -> Result<()> {
        if self.analysis.trim().is_empty() {
            return Err(ShadowError::Validation("Run an analysis first.".to_string()));
        }

        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| REPORT_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);
        if !supported {
            return Err(ShadowError::Validation(format!(
                "Report must be saved as one of: {}",
                REPORT_EXTENSIONS.join(", ")
            )));
        }

        std::fs::write(path, self.render())?;
        tracing::info!("Report saved to {:?}", path);
        Ok(())
    }
}
