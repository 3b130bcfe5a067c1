use std::path::{Path, PathBuf};

use crate::canvas::DEFAULT_BACKGROUND_GRAY;
use crate::ops::segmentation::MaskStrategy;
use crate::ops::tiles::ScaleCalibration;

const SETTINGS_FILE: &str = "masonry_settings.cfg";

/// Persisted visualizer preferences (key=value lines).
#[derive(Clone, Debug, PartialEq)]
pub struct VisualizerSettings {
    pub canvas_long_edge: u32,
    pub canvas_short_edge: u32,
    pub background_gray: u8,
    pub texture_reference_size: f32,
    pub stone_scale_divisor: f32,
    pub stone_scale_multiplier: f32,
    pub brick_scale_multiplier: f32,
    pub texture_scale_divisor: f32,
    pub texture_scale_multiplier: f32,
    pub default_stone_scale: f32,
    pub default_texture_scale: f32,
    pub mask_strategy: MaskStrategy,
    /// System font family for comparison labels; empty = any sans-serif.
    pub label_font: String,
    pub export_prefix: String,
    pub jpeg_quality: u8,
}

impl Default for VisualizerSettings {
    fn default() -> Self {
        let calib = ScaleCalibration::default();
        Self {
            canvas_long_edge: 1600,
            canvas_short_edge: 960,
            background_gray: DEFAULT_BACKGROUND_GRAY,
            texture_reference_size: calib.reference_size,
            stone_scale_divisor: calib.stone_divisor,
            stone_scale_multiplier: calib.stone_multiplier,
            brick_scale_multiplier: calib.brick_multiplier,
            texture_scale_divisor: calib.texture_divisor,
            texture_scale_multiplier: calib.texture_multiplier,
            default_stone_scale: calib.default_stone_scale,
            default_texture_scale: calib.default_texture_scale,
            mask_strategy: MaskStrategy::default(),
            label_font: String::new(),
            export_prefix: "Masonry".to_string(),
            jpeg_quality: 90,
        }
    }
}

/// Parse a positive, finite float or keep `fallback`.
fn positive_or(val: &str, fallback: f32) -> f32 {
    match val.parse::<f32>() {
        Ok(v) if v.is_finite() && v > 0.0 => v,
        _ => fallback,
    }
}

impl VisualizerSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/masonry-preview/masonry_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\MasonryPreview\masonry_settings.cfg
    /// On macOS:   ~/Library/Application Support/MasonryPreview/masonry_settings.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("masonry-preview");
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).unwrap_or_else(|_| {
                std::env::current_exe()
                    .ok()
                    .and_then(|p| p.parent().map(|d| d.to_string_lossy().into_owned()))
                    .unwrap_or_default()
            });
            return Some(PathBuf::from(appdata).join("MasonryPreview").join(SETTINGS_FILE));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("MasonryPreview")
                    .join(SETTINGS_FILE),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join(SETTINGS_FILE)))
        }
    }

    /// Load settings from disk (returns default if file missing or corrupt)
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    /// Save settings to disk.  Failures are logged, never fatal.
    pub fn save(&self) {
        if let Some(path) = Self::settings_path() {
            self.save_to(&path);
        }
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        if let Err(e) = std::fs::write(path, self.to_config_string()) {
            log_warn!("Could not write settings to {}: {}", path.display(), e);
        }
    }

    /// Settings from `key=value` lines.  Unknown keys and bad values are
    /// ignored.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "canvas_long_edge" => {
                    s.canvas_long_edge = val.parse().ok().filter(|v| *v > 0).unwrap_or(s.canvas_long_edge);
                }
                "canvas_short_edge" => {
                    s.canvas_short_edge = val.parse().ok().filter(|v| *v > 0).unwrap_or(s.canvas_short_edge);
                }
                "background_gray" => {
                    s.background_gray = val.parse().unwrap_or(s.background_gray);
                }
                "texture_reference_size" => {
                    s.texture_reference_size = positive_or(val, s.texture_reference_size);
                }
                "stone_scale_divisor" => {
                    s.stone_scale_divisor = positive_or(val, s.stone_scale_divisor);
                }
                "stone_scale_multiplier" => {
                    s.stone_scale_multiplier = positive_or(val, s.stone_scale_multiplier);
                }
                "brick_scale_multiplier" => {
                    s.brick_scale_multiplier = positive_or(val, s.brick_scale_multiplier);
                }
                "texture_scale_divisor" => {
                    s.texture_scale_divisor = positive_or(val, s.texture_scale_divisor);
                }
                "texture_scale_multiplier" => {
                    s.texture_scale_multiplier = positive_or(val, s.texture_scale_multiplier);
                }
                "default_stone_scale" => {
                    s.default_stone_scale = positive_or(val, s.default_stone_scale);
                }
                "default_texture_scale" => {
                    s.default_texture_scale = positive_or(val, s.default_texture_scale);
                }
                "mask_strategy" => {
                    s.mask_strategy = MaskStrategy::parse(val).unwrap_or_default();
                }
                "label_font" => {
                    s.label_font = val.to_string();
                }
                "export_prefix" => {
                    if !val.is_empty() {
                        s.export_prefix = val.to_string();
                    }
                }
                "jpeg_quality" => {
                    s.jpeg_quality = val.parse::<u8>().map(|q| q.clamp(1, 100)).unwrap_or(s.jpeg_quality);
                }
                _ => {}
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "canvas_long_edge={}\n\
             canvas_short_edge={}\n\
             background_gray={}\n\
             texture_reference_size={}\n\
             stone_scale_divisor={}\n\
             stone_scale_multiplier={}\n\
             brick_scale_multiplier={}\n\
             texture_scale_divisor={}\n\
             texture_scale_multiplier={}\n\
             default_stone_scale={}\n\
             default_texture_scale={}\n\
             mask_strategy={}\n\
             label_font={}\n\
             export_prefix={}\n\
             jpeg_quality={}\n",
            self.canvas_long_edge,
            self.canvas_short_edge,
            self.background_gray,
            self.texture_reference_size,
            self.stone_scale_divisor,
            self.stone_scale_multiplier,
            self.brick_scale_multiplier,
            self.texture_scale_divisor,
            self.texture_scale_multiplier,
            self.default_stone_scale,
            self.default_texture_scale,
            self.mask_strategy.as_str(),
            self.label_font,
            self.export_prefix,
            self.jpeg_quality,
        )
    }

    pub fn calibration(&self) -> ScaleCalibration {
        ScaleCalibration {
            reference_size: self.texture_reference_size,
            stone_divisor: self.stone_scale_divisor,
            stone_multiplier: self.stone_scale_multiplier,
            brick_multiplier: self.brick_scale_multiplier,
            texture_divisor: self.texture_scale_divisor,
            texture_multiplier: self.texture_scale_multiplier,
            default_stone_scale: self.default_stone_scale,
            default_texture_scale: self.default_texture_scale,
        }
    }

    /// `(long, short)` canvas edges.
    pub fn canvas_edges(&self) -> (u32, u32) {
        (self.canvas_long_edge, self.canvas_short_edge)
    }

    pub fn label_font(&self) -> Option<&str> {
        let f = self.label_font.trim();
        (!f.is_empty()).then_some(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_calibration() {
        let s = VisualizerSettings::default();
        assert_eq!(s.calibration(), ScaleCalibration::default());
        assert_eq!(s.canvas_edges(), (1600, 960));
        assert_eq!(s.background_gray, 240);
        assert_eq!(s.label_font(), None);
    }

    #[test]
    fn parse_ignores_unknown_and_bad_values() {
        let s = VisualizerSettings::parse(
            "canvas_long_edge=2000\n\
             stone_scale_multiplier=-3\n\
             jpeg_quality=abc\n\
             mask_strategy=click_points\n\
             not_a_key=1\n\
             garbage line\n",
        );
        assert_eq!(s.canvas_long_edge, 2000);
        assert_eq!(s.stone_scale_multiplier, 1.725);
        assert_eq!(s.jpeg_quality, 90);
        assert_eq!(s.mask_strategy, MaskStrategy::ClickPoints);
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir()
            .join(format!("masonry-settings-{}", uuid::Uuid::new_v4()))
            .join(SETTINGS_FILE);
        let mut s = VisualizerSettings::default();
        s.label_font = "DejaVu Sans".into();
        s.export_prefix = "Acme".into();
        s.default_stone_scale = 150.0;
        s.save_to(&path);
        assert_eq!(VisualizerSettings::load_from(&path), s);
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
        assert_eq!(VisualizerSettings::load_from(&path), VisualizerSettings::default());
    }
}
