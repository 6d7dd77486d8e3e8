use crate::db;
use chrono::Datelike;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const EXPORT_SECTION: &str = "setup.export";
pub const LOG_ENV: &str = "LECTURED_LOG";

/// Logs go to stderr; stdout carries the IPC protocol.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSettings {
    pub campaign_label: String,
    pub year_suffix: String,
    pub pixel_ratio: f64,
    pub jpeg_quality: u8,
    pub font_timeout_ms: u64,
    pub settle_delay_ms: u64,
}

fn current_year_suffix() -> String {
    format!("{:02}", chrono::Local::now().year().rem_euclid(100))
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            campaign_label: "강의계획서".to_string(),
            year_suffix: current_year_suffix(),
            pixel_ratio: 2.0,
            jpeg_quality: 92,
            font_timeout_ms: 3000,
            settle_delay_ms: 100,
        }
    }
}

impl ExportSettings {
    pub fn font_timeout(&self) -> Duration {
        Duration::from_millis(self.font_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Builds settings from a persisted section. Missing or out-of-range
    /// values fall back to defaults.
    pub fn from_section(obj: &Map<String, Value>) -> Self {
        let d = Self::default();
        let campaign_label = obj
            .get("campaignLabel")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(d.campaign_label);
        let year_suffix = obj
            .get("yearSuffix")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(d.year_suffix);
        let pixel_ratio = obj
            .get("pixelRatio")
            .and_then(|v| v.as_f64())
            .filter(|v| (1.0..=4.0).contains(v))
            .unwrap_or(d.pixel_ratio);
        let jpeg_quality = obj
            .get("jpegQuality")
            .and_then(|v| v.as_u64())
            .filter(|v| (1..=100).contains(v))
            .map(|v| v as u8)
            .unwrap_or(d.jpeg_quality);
        let font_timeout_ms = obj
            .get("fontTimeoutMs")
            .and_then(|v| v.as_u64())
            .filter(|v| *v <= 60_000)
            .unwrap_or(d.font_timeout_ms);
        let settle_delay_ms = obj
            .get("settleDelayMs")
            .and_then(|v| v.as_u64())
            .filter(|v| *v <= 10_000)
            .unwrap_or(d.settle_delay_ms);
        Self {
            campaign_label,
            year_suffix,
            pixel_ratio,
            jpeg_quality,
            font_timeout_ms,
            settle_delay_ms,
        }
    }

    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        let section = db::settings_get_json(conn, EXPORT_SECTION)?
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();
        Ok(Self::from_section(&section))
    }
}

/// Merges a patch into the stored section and returns the effective settings.
pub fn update_export_section(conn: &Connection, patch: &Map<String, Value>) -> anyhow::Result<ExportSettings> {
    let mut section = db::settings_get_json(conn, EXPORT_SECTION)?
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    for (k, v) in patch {
        if v.is_null() {
            section.remove(k);
        } else {
            section.insert(k.clone(), v.clone());
        }
    }
    db::settings_set_json(conn, EXPORT_SECTION, &Value::Object(section.clone()))?;
    Ok(ExportSettings::from_section(&section))
}
