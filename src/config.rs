//! Animator configuration.
//!
//! JSON keys are camelCase, every key is optional:
//!
//! ```json
//! {
//!   "images": ["vis/1715.jpg", "vis/1730.jpg"],
//!   "delay": 250, "delayStep": 50, "delayMin": 25, "delayMax": 5000,
//!   "dwellMultiplier": 2,
//!   "loopMode": "sweep",
//!   "defaultFrame": "last",
//!   "autoRefresh": 60000,
//!   "keyboard": true
//! }
//! ```
//!
//! Out-of-range values are normalized by [`AnimatorConfig::normalized`], never
//! rejected. `autoRefresh` accepts milliseconds, `false` or `null`.

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::entities::{LoopMode, Timing};

/// Named frame for `defaultFrame`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameAnchor {
    First,
    Last,
}

/// Frame shown after construction: an index (clamped) or first/last
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultFrame {
    Index(i64),
    Anchor(FrameAnchor),
}

impl Default for DefaultFrame {
    fn default() -> Self {
        DefaultFrame::Index(0)
    }
}

impl FromStr for DefaultFrame {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(DefaultFrame::Anchor(FrameAnchor::First)),
            "last" => Ok(DefaultFrame::Anchor(FrameAnchor::Last)),
            other => other
                .parse::<i64>()
                .map(DefaultFrame::Index)
                .map_err(|_| format!("invalid default frame '{}' (expected index, first or last)", s)),
        }
    }
}

/// Per-animator settings (each animator owns its copy)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnimatorConfig {
    pub images: Vec<String>,
    pub delay: u64,           // ms between frames
    pub delay_step: u64,      // ms per speed up/down
    pub delay_min: u64,
    pub delay_max: u64,
    pub dwell_multiplier: f64, // dwell on first/last frame ~ N * delay
    pub loop_mode: LoopMode,
    pub default_frame: DefaultFrame,
    #[serde(with = "auto_refresh_ms")]
    pub auto_refresh: Option<u64>, // ms between reloads, None = off
    pub keyboard: bool,
}

impl Default for AnimatorConfig {
    fn default() -> Self {
        let timing = Timing::default();
        Self {
            images: Vec::new(),
            delay: 250,
            delay_step: timing.delay_step,
            delay_min: timing.delay_min,
            delay_max: timing.delay_max,
            dwell_multiplier: timing.dwell_multiplier,
            loop_mode: LoopMode::Loop,
            default_frame: DefaultFrame::default(),
            auto_refresh: None,
            keyboard: true,
        }
    }
}

impl AnimatorConfig {
    /// Parse JSON text (missing keys use defaults)
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse animator config")
    }

    /// Load JSON config file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Clamp inconsistent values into a usable configuration.
    pub fn normalized(mut self) -> Self {
        if self.delay_min > self.delay_max {
            warn!("delayMin {} > delayMax {}, swapping", self.delay_min, self.delay_max);
            std::mem::swap(&mut self.delay_min, &mut self.delay_max);
        }

        let clamped = self.delay.clamp(self.delay_min, self.delay_max);
        if clamped != self.delay {
            warn!("delay {}ms outside [{}, {}], using {}ms", self.delay, self.delay_min, self.delay_max, clamped);
            self.delay = clamped;
        }

        if !self.dwell_multiplier.is_finite() || self.dwell_multiplier < 0.0 {
            warn!("dwellMultiplier {} invalid, using default", self.dwell_multiplier);
            self.dwell_multiplier = Timing::default().dwell_multiplier;
        }

        if self.auto_refresh == Some(0) {
            warn!("autoRefresh of 0ms disables auto-refresh");
            self.auto_refresh = None;
        }
        self
    }

    pub fn timing(&self) -> Timing {
        Timing {
            delay_step: self.delay_step,
            delay_min: self.delay_min,
            delay_max: self.delay_max,
            dwell_multiplier: self.dwell_multiplier,
        }
    }

    pub fn auto_refresh_interval(&self) -> Option<Duration> {
        self.auto_refresh.filter(|ms| *ms > 0).map(Duration::from_millis)
    }
}

/// `autoRefresh`: number of ms, or `false` / `null` when disabled
mod auto_refresh_ms {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(ms) => serializer.serialize_u64(*ms),
            None => serializer.serialize_bool(false),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null | Value::Bool(false) => Ok(None),
            Value::Number(n) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("autoRefresh must be a positive integer, got {}", n))),
            other => Err(D::Error::custom(format!(
                "autoRefresh must be milliseconds or false, got {}",
                other
            ))),
        }
    }
}
