use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    cache::{DatasetCache, Resource},
    report::ReportOptions,
};

pub const MNIST_IMAGES_URL: &str =
    "https://storage.googleapis.com/learnjs-data/model-builder/mnist_images.png";
pub const MNIST_LABELS_URL: &str =
    "https://storage.googleapis.com/learnjs-data/model-builder/mnist_labels_uint8";

/// Settings for one load → train → predict → report run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub seed: u64,
    pub images_url: String,
    pub labels_url: String,
    pub images_path: PathBuf,
    pub labels_path: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub results_dir: PathBuf,
    pub fetch_timeout_secs: u64,
    /// Samples in the single batch the model is fitted on.
    pub train_samples: usize,
    pub validation_samples: usize,
    pub prediction_samples: usize,
    /// Mini-batch size used inside `fit`.
    pub fit_batch_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub report: ReportOptions,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 1337,
            images_url: MNIST_IMAGES_URL.to_string(),
            labels_url: MNIST_LABELS_URL.to_string(),
            images_path: PathBuf::from("images.png"),
            labels_path: PathBuf::from("labels.bin"),
            checkpoint_dir: PathBuf::from("model"),
            results_dir: PathBuf::from("res"),
            fetch_timeout_secs: 120,
            train_samples: 500,
            validation_samples: 100,
            prediction_samples: 1000,
            fit_batch_size: 64,
            epochs: 10,
            learning_rate: 1e-3,
            report: ReportOptions::default(),
        }
    }
}

impl RunConfig {
    /// Load (or create) the config at `path`, with relative paths resolved
    /// against the directory holding it.
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = load_or_init(path, Self::default)?;
        let root = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(config.rooted_at(root))
    }

    pub fn dataset_cache(&self) -> DatasetCache {
        DatasetCache::new(
            Resource::new(&self.images_url, &self.images_path),
            Resource::new(&self.labels_url, &self.labels_path),
        )
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Resolve every relative path against `root`.
    pub fn rooted_at(mut self, root: &Path) -> Self {
        for path in [
            &mut self.images_path,
            &mut self.labels_path,
            &mut self.checkpoint_dir,
            &mut self.results_dir,
        ] {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        }
        self
    }
}

/// Load a JSON configuration from disk, creating it with the provided initializer if missing.
pub fn load_or_init<T, F>(path: &Path, initializer: F) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> T,
{
    if path.exists() {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let value = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;
        Ok(value)
    } else {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        let value = initializer();
        let serialized = serde_json::to_string_pretty(&value)?;
        fs::write(path, serialized)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config: RunConfig = load_or_init(&path, RunConfig::default).unwrap();

        assert_eq!(config, RunConfig::default());
        assert!(path.exists());
        let reloaded: RunConfig = load_or_init(&path, || unreachable!()).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "epochs": 2, "report": { "print_to_console": true } }"#).unwrap();

        let config: RunConfig = load_or_init(&path, RunConfig::default).unwrap();

        assert_eq!(config.epochs, 2);
        assert!(config.report.print_to_console);
        assert!(config.report.write_to_disk);
        assert_eq!(config.train_samples, 500);
    }

    #[test]
    fn malformed_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = load_or_init::<RunConfig, _>(&path, RunConfig::default).unwrap_err();
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn relative_paths_are_rooted() {
        let config = RunConfig {
            results_dir: PathBuf::from("/abs/res"),
            ..RunConfig::default()
        }
        .rooted_at(Path::new("/work"));

        assert_eq!(config.images_path, PathBuf::from("/work/images.png"));
        assert_eq!(config.checkpoint_dir, PathBuf::from("/work/model"));
        assert_eq!(config.results_dir, PathBuf::from("/abs/res"));
    }

    #[test]
    fn load_roots_paths_at_the_config_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs").join("config.json");

        let config = RunConfig::load(&path).unwrap();

        assert_eq!(config.images_path, dir.path().join("runs").join("images.png"));
        assert_eq!(config.results_dir, dir.path().join("runs").join("res"));

        // the file on disk keeps the relative defaults
        let stored: RunConfig = load_or_init(&path, || unreachable!()).unwrap();
        assert_eq!(stored.images_path, PathBuf::from("images.png"));
    }

    #[test]
    fn bare_file_name_keeps_relative_paths() {
        let config = RunConfig::default().rooted_at(Path::new("config.json").parent().unwrap());
        assert_eq!(config.labels_path, PathBuf::from("labels.bin"));
    }
}
