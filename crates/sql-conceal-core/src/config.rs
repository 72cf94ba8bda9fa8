//! Configuration management for sql-conceal

use crate::naming::NamingMode;
use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub naming: NamingConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamingConfig {
    #[serde(default)]
    pub mode: NamingMode,
    /// Fixed seed for realistic names. Unset means a fresh seed per session.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Literals longer than this many characters are not masked.
    pub max_string_literal_len: usize,
    /// Purely alphabetic names up to this length are treated as table aliases.
    pub table_alias_max_len: usize,
    pub min_column_len: usize,
    pub strip_code_fences: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_string_literal_len: 200,
            table_alias_max_len: 4,
            min_column_len: 2,
            strip_code_fences: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Where mapping documents are written when no explicit path is given.
    pub directory: PathBuf,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("mappings"),
        }
    }
}

impl Config {
    pub fn get_app_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "sql-conceal", "sql-conceal")
            .ok_or_else(|| anyhow::anyhow!("Failed to determine application directories"))
    }

    pub fn resolve_paths(&mut self) -> Result<()> {
        if self.mapping.directory.is_relative() {
            let project_dirs = Self::get_app_dirs()?;
            self.mapping.directory = project_dirs.data_dir().join(&self.mapping.directory);
        }
        Ok(())
    }

    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&contents)?;
        config.resolve_paths()?;
        Ok(config)
    }

    pub fn get_default_config_path() -> Result<PathBuf> {
        let project_dirs = Self::get_app_dirs()?;
        let config_dir = project_dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;
        Ok(config_dir.join("sql-conceal.toml"))
    }

    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let extraction = &self.extraction;
        if extraction.max_string_literal_len == 0 {
            return Err(anyhow::anyhow!("max_string_literal_len must be greater than 0"));
        }
        if extraction.min_column_len == 0 {
            return Err(anyhow::anyhow!("min_column_len must be greater than 0"));
        }

        if self.mapping.directory.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Mapping directory must not be empty"));
        }
        if !self.mapping.directory.exists() {
            std::fs::create_dir_all(&self.mapping.directory)?;
        }

        Ok(())
    }
}
