//! Output writing - places the generated runner and manifest on disk
//!
//! Both artifacts are rendered in memory before anything touches the
//! filesystem, so a registry with outstanding errors produces no partial
//! output.

use std::fs;
use std::path::{Path, PathBuf};

use crate::model::Registry;

use super::{GenerateError, manifest, runner};

/// Writes one generation run's output directory
pub struct RunnerProject {
    output_dir: PathBuf,
    runner_name: String,
}

impl RunnerProject {
    pub fn new(output_dir: impl AsRef<Path>, runner_name: &str) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            runner_name: runner_name.to_string(),
        }
    }

    /// Path of the emitted runner source
    pub fn runner_file(&self) -> PathBuf {
        self.output_dir.join(format!("{}.c", self.runner_name))
    }

    /// Path of the emitted manifest
    pub fn manifest_file(&self) -> PathBuf {
        self.output_dir.join("manifest.json")
    }

    /// Render and write runner source and manifest
    #[tracing::instrument(skip_all, fields(output_dir = %self.output_dir.display()))]
    pub fn generate(&self, registry: &Registry) -> Result<(), GenerateError> {
        let runner_src = runner::generate_runner(registry)?;
        let manifest =
            manifest::generate_manifest(registry, &format!("{}.c", self.runner_name))?;
        let manifest_text = serde_json::to_string_pretty(&manifest)?;

        fs::create_dir_all(&self.output_dir)?;
        fs::write(self.runner_file(), runner_src)?;
        fs::write(self.manifest_file(), manifest_text + "\n")?;
        Ok(())
    }
}
