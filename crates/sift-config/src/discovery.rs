//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `$SIFT_CONFIG_DIR/config.toml`, or `<platform config dir>/sift/config.toml`
//! 2. `./sift.toml` (project-local)
//! 3. CLI arguments (handled externally)

use std::path::{Path, PathBuf};

use crate::{ConfigError, Result, SiftConfig};

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "sift.toml";

/// Default config filename within the user config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for platform directory resolution.
const APP_NAME: &str = "sift";

/// Environment variable to override the config directory.
const CONFIG_DIR_ENV: &str = "SIFT_CONFIG_DIR";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file.
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: SiftConfig,
    /// Sources that were checked, in order of precedence (lowest first).
    pub sources: Vec<ConfigSource>,
    /// Warnings generated during loading (unreadable layers, plaintext keys).
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Get paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Load configuration by discovering and merging all config layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Load configuration with explicit control over the user config directory.
///
/// `config_dir` overrides both `SIFT_CONFIG_DIR` and the platform default.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = SiftConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    let user_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => user_config_path(),
    };
    if let Some(path) = user_path {
        sources.push(load_layer(&mut config, &path, &mut warnings));
    }

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path, &mut warnings));

    check_plaintext_keys(&config, &mut warnings);
    config.validate()?;

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<SiftConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    SiftConfig::from_toml(&contents)
}

/// Save configuration to a file, creating parent directories.
pub fn save_config(config: &SiftConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = config.to_toml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

/// Path of the user-level config file.
pub fn user_config_path() -> Option<PathBuf> {
    user_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// User config directory: `SIFT_CONFIG_DIR` if set, else the platform default.
pub fn user_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Try to load a config file and merge it into the existing config.
///
/// A missing file is skipped silently; an unreadable or malformed one
/// becomes a warning so that a broken project file never hides the user layer.
fn load_layer(config: &mut SiftConfig, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    if !path.is_file() {
        return ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        };
    }

    match load_config_file(path) {
        Ok(layer) => {
            config.merge(layer);
            ConfigSource {
                path: path.to_path_buf(),
                loaded: true,
            }
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {}", path.display(), e));
            ConfigSource {
                path: path.to_path_buf(),
                loaded: false,
            }
        }
    }
}

fn check_plaintext_keys(config: &SiftConfig, warnings: &mut Vec<String>) {
    let has_key = config
        .embedding
        .as_ref()
        .and_then(|e| e.openai.as_ref())
        .is_some_and(|o| o.api_key.as_ref().is_some_and(|k| !k.is_empty()));

    if has_key {
        warnings.push(
            "[embedding.openai] contains a plaintext API key. \
             Consider setting OPENAI_API_KEY instead."
                .to_string(),
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    use crate::EmbeddingProvider;

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[embedding]
provider = "mock"
dimensions = 64
"#,
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        let embedding = config.embedding.unwrap();
        assert_eq!(embedding.provider, EmbeddingProvider::Mock);
        assert_eq!(embedding.dimensions, Some(64));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_project_overrides_user() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::write(
            user.path().join("config.toml"),
            "[search]\nk = 5\n\n[vector]\nenabled = false\n",
        )
        .unwrap();
        fs::write(project.path().join("sift.toml"), "[search]\nk = 20\n").unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        assert_eq!(loaded.config.search().k, 20);
        assert!(!loaded.config.vector().enabled);
        assert_eq!(loaded.loaded_from().len(), 2);
    }

    #[test]
    fn test_no_files_gives_defaults() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        assert!(loaded.loaded_from().is_empty());
        assert_eq!(loaded.config.search().k, 10);
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn test_broken_layer_becomes_warning() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::write(user.path().join("config.toml"), "[search]\nk = 3\n").unwrap();
        fs::write(project.path().join("sift.toml"), "not = [valid").unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        assert_eq!(loaded.config.search().k, 3);
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("sift.toml"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::write(project.path().join("sift.toml"), "[search]\nrrf_k = -1.0\n").unwrap();

        let err = load_config_with_options(Some(project.path()), Some(user.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_plaintext_key_warning() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::write(
            project.path().join("sift.toml"),
            "[embedding]\nprovider = \"openai\"\n\n[embedding.openai]\napi_key = \"sk-test\"\n",
        )
        .unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        assert!(loaded.warnings.iter().any(|w| w.contains("plaintext")));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = SiftConfig::new();
        config.search = Some(crate::SearchConfig {
            k: 42,
            ..Default::default()
        });
        save_config(&config, &path).unwrap();

        let reloaded = load_config_file(&path).unwrap();
        assert_eq!(reloaded.search().k, 42);
    }
}
