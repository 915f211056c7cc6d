use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::canvas::CanvasOptions;
use crate::config::EngineConfig;
use crate::paths;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub engine: EngineConfig,
    pub save_debug_artifacts: bool,
    pub workspace_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    canvas: Option<CanvasSettings>,
    profile: Option<ProfileSettings>,
    split: Option<SplitSettings>,
    merge: Option<MergeSettings>,
    mask: Option<MaskSettings>,
    debug: Option<DebugSettings>,
    workspace: Option<WorkspaceSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct CanvasSettings {
    max_width: Option<u32>,
    background: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProfileSettings {
    background_tolerance: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct SplitSettings {
    min_height: Option<u32>,
    max_height: Option<u32>,
    margin: Option<u32>,
    min_run_height: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct MergeSettings {
    horizontal_gap: Option<u32>,
    vertical_gap: Option<u32>,
    min_confidence: Option<f32>,
    dilation: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct MaskSettings {
    dilation: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct DebugSettings {
    save_artifacts: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkspaceSettings {
    dir: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = paths::settings_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings
                .merge(parsed)
                .with_context(|| format!("invalid settings: {}", path.display()))?;
        }
    }

    Ok(settings)
}

impl Settings {
    /// The engine parameters, checked for values that make planning
    /// impossible.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        self.engine
            .validate()
            .with_context(|| "settings produce an unusable engine configuration")?;
        Ok(self.engine.clone())
    }

    pub fn workspace(&self) -> PathBuf {
        paths::workspace_dir(self.workspace_dir.as_deref())
    }

    fn merge(&mut self, incoming: SettingsFile) -> Result<()> {
        if let Some(canvas) = incoming.canvas {
            self.merge_canvas(canvas)?;
        }
        if let Some(profile) = incoming.profile {
            if let Some(tolerance) = profile.background_tolerance {
                self.engine.profile.background_tolerance = tolerance;
            }
        }
        if let Some(split) = incoming.split {
            let options = &mut self.engine.split;
            if let Some(value) = split.min_height {
                options.min_height = value;
            }
            if let Some(value) = split.max_height {
                options.max_height = value;
            }
            if let Some(value) = split.margin {
                options.margin = value;
            }
            if let Some(value) = split.min_run_height {
                options.min_run_height = value;
            }
        }
        if let Some(merge) = incoming.merge {
            let options = &mut self.engine.merge;
            if let Some(value) = merge.horizontal_gap {
                options.horizontal_gap = value;
            }
            if let Some(value) = merge.vertical_gap {
                options.vertical_gap = value;
            }
            if let Some(value) = merge.min_confidence {
                options.min_confidence = value;
            }
            if let Some(value) = merge.dilation {
                options.dilation = value;
            }
        }
        if let Some(mask) = incoming.mask {
            if let Some(dilation) = mask.dilation {
                self.engine.mask_dilation = dilation;
            }
        }
        if let Some(debug) = incoming.debug {
            if let Some(save) = debug.save_artifacts {
                self.save_debug_artifacts = save;
            }
        }
        if let Some(workspace) = incoming.workspace {
            if let Some(dir) = workspace.dir {
                if !dir.trim().is_empty() {
                    self.workspace_dir = Some(dir);
                }
            }
        }
        Ok(())
    }

    fn merge_canvas(&mut self, canvas: CanvasSettings) -> Result<()> {
        let options: &mut CanvasOptions = &mut self.engine.canvas;
        if let Some(width) = canvas.max_width {
            options.max_width = if width == 0 { None } else { Some(width) };
        }
        if let Some(color) = canvas.background {
            if !color.trim().is_empty() {
                options.background = parse_hex_color(&color)?;
            }
        }
        Ok(())
    }
}

/// `#rrggbb` or `#rgb`, leading `#` optional.
pub fn parse_hex_color(value: &str) -> Result<[u8; 3]> {
    let hex = value.trim().trim_start_matches('#');
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|ch| [ch, ch]).collect(),
        6 => hex.to_string(),
        _ => return Err(anyhow!("invalid color '{}': expected #rrggbb", value)),
    };
    let mut rgb = [0u8; 3];
    for (idx, channel) in rgb.iter_mut().enumerate() {
        let part = expanded
            .get(idx * 2..idx * 2 + 2)
            .ok_or_else(|| anyhow!("invalid color '{}'", value))?;
        *channel = u8::from_str_radix(part, 16)
            .with_context(|| format!("invalid color '{}'", value))?;
    }
    Ok(rgb)
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = paths::settings_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}
