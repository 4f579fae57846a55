//! Quality presets for sampler settings.
//!
//! A preset bundles step count, guidance scale, sampler, scheduler and
//! a square resolution. Explicit request values always win over the
//! preset, and the preset wins over tool defaults.

use serde::Serialize;

/// Named quality presets, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    Draft,
    Standard,
    High,
    Ultra,
}

/// Concrete sampler settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresetSettings {
    pub steps: u32,
    pub cfg: f64,
    pub sampler: String,
    pub scheduler: String,
    pub width: u32,
    pub height: u32,
}

/// Values supplied explicitly by a caller. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct SettingOverrides {
    pub steps: Option<u32>,
    pub cfg: Option<f64>,
    pub sampler: Option<String>,
    pub scheduler: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// All preset names accepted by [`QualityPreset::from_name`].
pub const PRESET_NAMES: &[&str] = &["draft", "standard", "high", "ultra"];

impl QualityPreset {
    /// Look up a preset by name (case-insensitive).
    ///
    /// Unrecognised names fall back to [`QualityPreset::High`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "draft" => Self::Draft,
            "standard" => Self::Standard,
            "high" => Self::High,
            "ultra" => Self::Ultra,
            other => {
                tracing::debug!(preset = %other, "Unknown quality preset, using 'high'");
                Self::High
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Standard => "standard",
            Self::High => "high",
            Self::Ultra => "ultra",
        }
    }

    /// The settings this preset stands for.
    pub fn settings(self) -> PresetSettings {
        let (steps, cfg, sampler, scheduler, side) = match self {
            Self::Draft => (15, 6.0, "euler", "normal", 512),
            Self::Standard => (25, 7.5, "dpmpp_2m", "karras", 768),
            Self::High => (35, 8.0, "dpmpp_2m", "karras", 1024),
            Self::Ultra => (50, 9.0, "dpmpp_2m", "karras", 1536),
        };
        PresetSettings {
            steps,
            cfg,
            sampler: sampler.to_string(),
            scheduler: scheduler.to_string(),
            width: side,
            height: side,
        }
    }
}

/// Merge explicit values, an optional preset and tool defaults.
///
/// Precedence per field: `overrides`, then the preset named by
/// `preset_name` (if any), then `defaults`.
pub fn resolve_settings(
    preset_name: Option<&str>,
    overrides: &SettingOverrides,
    defaults: &PresetSettings,
) -> PresetSettings {
    let base = match preset_name {
        Some(name) => QualityPreset::from_name(name).settings(),
        None => defaults.clone(),
    };

    PresetSettings {
        steps: overrides.steps.unwrap_or(base.steps),
        cfg: overrides.cfg.unwrap_or(base.cfg),
        sampler: overrides.sampler.clone().unwrap_or(base.sampler),
        scheduler: overrides.scheduler.clone().unwrap_or(base.scheduler),
        width: overrides.width.unwrap_or(base.width),
        height: overrides.height.unwrap_or(base.height),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_defaults() -> PresetSettings {
        PresetSettings {
            steps: 30,
            cfg: 8.0,
            sampler: "dpmpp_2m".into(),
            scheduler: "karras".into(),
            width: 1024,
            height: 1024,
        }
    }

    #[test]
    fn known_names_resolve() {
        assert_eq!(QualityPreset::from_name("draft"), QualityPreset::Draft);
        assert_eq!(QualityPreset::from_name("standard"), QualityPreset::Standard);
        assert_eq!(QualityPreset::from_name("ULTRA"), QualityPreset::Ultra);
    }

    #[test]
    fn unknown_name_falls_back_to_high() {
        assert_eq!(QualityPreset::from_name("cinematic"), QualityPreset::High);
        assert_eq!(QualityPreset::from_name(""), QualityPreset::High);
        assert_eq!(
            QualityPreset::from_name("cinematic").settings(),
            QualityPreset::from_name("cinematic").settings()
        );
    }

    #[test]
    fn every_listed_name_round_trips() {
        for name in PRESET_NAMES {
            assert_eq!(QualityPreset::from_name(name).name(), *name);
        }
    }

    #[test]
    fn draft_settings() {
        let s = QualityPreset::Draft.settings();
        assert_eq!(s.steps, 15);
        assert_eq!(s.cfg, 6.0);
        assert_eq!(s.sampler, "euler");
        assert_eq!(s.scheduler, "normal");
        assert_eq!((s.width, s.height), (512, 512));
    }

    #[test]
    fn no_preset_uses_defaults() {
        let s = resolve_settings(None, &SettingOverrides::default(), &tool_defaults());
        assert_eq!(s, tool_defaults());
    }

    #[test]
    fn preset_fills_missing_fields() {
        let s = resolve_settings(
            Some("standard"),
            &SettingOverrides::default(),
            &tool_defaults(),
        );
        assert_eq!(s, QualityPreset::Standard.settings());
    }

    #[test]
    fn explicit_values_beat_preset() {
        let overrides = SettingOverrides {
            steps: Some(12),
            width: Some(640),
            ..Default::default()
        };
        let s = resolve_settings(Some("ultra"), &overrides, &tool_defaults());
        assert_eq!(s.steps, 12);
        assert_eq!(s.width, 640);
        assert_eq!(s.height, 1536);
        assert_eq!(s.cfg, 9.0);
    }
}
