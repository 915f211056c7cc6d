use std::path::{Path, PathBuf};

const WORKSPACE_ENV: &str = "PANEL_SPLITTER_WORKSPACE";
const HOME_DIR_NAME: &str = ".panel-splitter-rust";

/// `~/.panel-splitter-rust`, when HOME is set.
pub(crate) fn settings_dir() -> Option<PathBuf> {
    home_join(HOME_DIR_NAME)
}

/// Artifact root used when no explicit output directory is given. The
/// environment override wins over the configured directory.
pub(crate) fn workspace_dir(configured: Option<&str>) -> PathBuf {
    if let Some(dir) = workspace_override() {
        return dir;
    }
    if let Some(dir) = configured.and_then(normalize_dir) {
        return dir;
    }
    home_join(&format!("{}/workspace", HOME_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(HOME_DIR_NAME).join("workspace"))
}

fn workspace_override() -> Option<PathBuf> {
    std::env::var(WORKSPACE_ENV)
        .ok()
        .and_then(|value| normalize_dir(&value))
}

fn home_join(suffix: &str) -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(suffix))
        }
    })
}

pub(crate) fn normalize_dir(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = expand_tilde(trimmed);
    Some(normalize_path(PathBuf::from(expanded)))
}

fn normalize_path(path: PathBuf) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        normalized.push(component.as_os_str());
    }
    normalized
}

fn expand_tilde(value: &str) -> String {
    if value == "~" || value.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            let home = home.trim();
            if home.is_empty() {
                return value.to_string();
            }
            if value == "~" {
                return home.to_string();
            }
            return format!("{}{}", home, &value[1..]);
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::with_temp_home;

    #[test]
    fn tilde_expands_against_home() {
        with_temp_home(|home| {
            assert_eq!(normalize_dir("~/pages"), Some(home.join("pages")));
            assert_eq!(normalize_dir("   "), None);
        });
    }

    #[test]
    fn workspace_prefers_env_then_settings_then_home() {
        with_temp_home(|home| {
            assert_eq!(
                workspace_dir(None),
                home.join(".panel-splitter-rust/workspace")
            );
            assert_eq!(workspace_dir(Some("~/chapters")), home.join("chapters"));

            let custom = home.join("override");
            unsafe {
                std::env::set_var(WORKSPACE_ENV, &custom);
            }
            let resolved = workspace_dir(Some("~/chapters"));
            unsafe {
                std::env::remove_var(WORKSPACE_ENV);
            }
            assert_eq!(resolved, custom);
        });
    }
}
