//! Process-wide settings.
//!
//! Uses `figment` for layered configuration: defaults -> `hydrofold.toml` ->
//! `HYDROFOLD_*` environment variables (nested keys split on `__`, e.g.
//! `HYDROFOLD_DIRECTORIES__TRAINING_DIR`).

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::dataset::{CollectionInfo, CollectionRegistry};
use crate::error::Result;

/// Where configurations, trainings and collection data live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directories {
    pub config_dir: PathBuf,
    pub training_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl Default for Directories {
    fn default() -> Self {
        Directories {
            config_dir: PathBuf::from("./results/configs"),
            training_dir: PathBuf::from("./results/trainings"),
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl Directories {
    /// Resolves a collection-relative path against `data_dir`.
    pub fn data_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub directories: Directories,
    /// Known collections; relative catalog paths are under `data_dir`.
    #[serde(default)]
    pub collections: Vec<CollectionInfo>,
}

impl Settings {
    /// Loads defaults, then `file` when given, then the environment.
    pub fn load(file: Option<&Path>) -> Result<Settings> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("HYDROFOLD_").split("__"));
        Ok(figment.extract()?)
    }

    /// Registry of the configured collections with paths resolved against
    /// `data_dir`.
    pub fn registry(&self) -> Result<CollectionRegistry> {
        let mut registry = CollectionRegistry::new();
        for info in &self.collections {
            let mut resolved = info.clone();
            resolved.catalog = self.directories.data_path(&info.catalog);
            resolved.sample_catalog = info.sample_catalog.as_deref().map(|p| self.directories.data_path(p));
            registry.register(resolved)?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_file() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.directories.config_dir, PathBuf::from("./results/configs"));
        assert!(settings.collections.is_empty());
    }

    #[test]
    fn toml_overrides_and_registers_collections() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[directories]
config_dir = "/tmp/cfg"
training_dir = "/tmp/trn"
data_dir = "/data"

[[collections]]
id = "shipsear"
catalog = "shipsear/info.csv"
sample_catalog = "shipsear/sample.csv"
id_column = "ID"
"#
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.directories.training_dir, PathBuf::from("/tmp/trn"));
        let registry = settings.registry().unwrap();
        let info = registry.get("shipsear").unwrap();
        assert_eq!(info.catalog, PathBuf::from("/data/shipsear/info.csv"));
        assert_eq!(info.sample_catalog.as_deref(), Some(Path::new("/data/shipsear/sample.csv")));
    }
}
