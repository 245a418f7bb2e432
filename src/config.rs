//! JSON settings file and platform default locations

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MirrorError, MirrorResult};
use crate::schema::{default_terms, Term};

const DEFAULT_CONFIG_NAME: &str = "campus-mirror.json";
const DEFAULT_FACTS_DB: &str = "facts.sqlite";
const DEFAULT_GRAPH_DB: &str = "graph.sqlite";
const DEFAULT_DOCUMENTS_DIR: &str = "documents";

/// Knobs of the synthetic data generator
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub students_per_group: usize,
    /// Probability that a student attended a given occurrence
    pub attendance_probability: f64,
    /// Fixed seed for reproducible datasets; entropy when absent
    pub seed: Option<u64>,
    pub terms: Vec<Term>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            students_per_group: 10,
            attendance_probability: 0.7,
            seed: None,
            terms: default_terms(),
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> MirrorResult<()> {
        if !(0.0..=1.0).contains(&self.attendance_probability) {
            return Err(MirrorError::config(format!(
                "attendance_probability must be within [0, 1], got {}",
                self.attendance_probability
            )));
        }
        if self.terms.is_empty() {
            return Err(MirrorError::config("at least one term is required"));
        }
        for term in &self.terms {
            term.semester()?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub facts_db: Option<PathBuf>,
    pub graph_db: Option<PathBuf>,
    pub documents_dir: Option<PathBuf>,
    pub generation: GenerationConfig,
}

impl Settings {
    /// Load settings from `path`, or from the platform config dir when it
    /// holds a settings file. Falls back to defaults.
    pub fn load(path: Option<&Path>) -> MirrorResult<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match project_dirs() {
                Ok(dirs) if dirs.config_dir().join(DEFAULT_CONFIG_NAME).exists() => {
                    dirs.config_dir().join(DEFAULT_CONFIG_NAME)
                }
                _ => return Ok(Self::default()),
            },
        };

        let raw = fs::read_to_string(&path).map_err(|err| {
            MirrorError::config(format!("read settings {}: {err}", path.display()))
        })?;
        let settings: Settings = serde_json::from_str(&raw).map_err(|err| {
            MirrorError::config(format!("parse settings {}: {err}", path.display()))
        })?;
        settings.generation.validate()?;

        Ok(settings)
    }

    pub fn facts_path(&self) -> MirrorResult<PathBuf> {
        resolve(self.facts_db.as_deref(), DEFAULT_FACTS_DB)
    }

    pub fn graph_path(&self) -> MirrorResult<PathBuf> {
        resolve(self.graph_db.as_deref(), DEFAULT_GRAPH_DB)
    }

    pub fn documents_path(&self) -> MirrorResult<PathBuf> {
        resolve(self.documents_dir.as_deref(), DEFAULT_DOCUMENTS_DIR)
    }
}

fn project_dirs() -> MirrorResult<ProjectDirs> {
    ProjectDirs::from("", "", "campus-mirror")
        .ok_or_else(|| MirrorError::config("could not determine the platform data directory"))
}

/// An explicit path wins; otherwise `default_name` under the platform data dir
fn resolve(explicit: Option<&Path>, default_name: &str) -> MirrorResult<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let data_dir = project_dirs()?.data_dir().to_path_buf();
    fs::create_dir_all(&data_dir)?;
    Ok(data_dir.join(default_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "facts_db": "/tmp/f.sqlite", "generation": { "seed": 42 } }"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.facts_db, Some(PathBuf::from("/tmp/f.sqlite")));
        assert_eq!(settings.generation.seed, Some(42));
        assert_eq!(settings.generation.students_per_group, 10);
        assert_eq!(settings.generation.attendance_probability, 0.7);
        assert_eq!(settings.generation.terms.len(), 6);
        assert_eq!(
            settings.facts_path().unwrap(),
            PathBuf::from("/tmp/f.sqlite")
        );
    }

    #[test]
    fn test_rejects_bad_probability() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "generation": { "attendance_probability": 1.5 } }"#).unwrap();

        let err = Settings::load(Some(&path)).unwrap_err();
        assert!(matches!(err, MirrorError::Config(_)));
    }

    #[test]
    fn test_rejects_term_across_semesters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "generation": { "terms": [
                { "name": "long", "start": "2023-05-01", "end": "2023-09-30" }
            ] } }"#,
        )
        .unwrap();

        assert!(matches!(
            Settings::load(Some(&path)),
            Err(MirrorError::InvalidTerm { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(Some(&dir.path().join("absent.json"))).is_err());
    }
}
