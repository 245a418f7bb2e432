use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{GenerationConfig, Settings};
use crate::error::MirrorResult;

#[derive(Parser, Debug)]
#[command(name = "campus-mirror")]
#[command(
    version,
    about = "Generate a university attendance dataset and mirror it into a property graph"
)]
pub struct Cli {
    /// JSON settings file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Relational fact store path
    #[arg(long, global = true)]
    pub facts_db: Option<PathBuf>,

    /// Graph mirror path
    #[arg(long, global = true)]
    pub graph_db: Option<PathBuf>,

    /// Show the full-screen progress dashboard
    #[arg(long, global = true)]
    pub tui: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a dataset, then rebuild the graph and peer mirrors
    Run {
        #[command(flatten)]
        generation: GenerationArgs,

        /// Directory of the peer mirror files
        #[arg(long)]
        documents_dir: Option<PathBuf>,
    },

    /// Replace the fact store with a freshly generated dataset
    Generate {
        #[command(flatten)]
        generation: GenerationArgs,
    },

    /// Rebuild the graph mirror from the fact store
    Sync {
        /// Continue an interrupted sync instead of starting over
        #[arg(long)]
        resume: bool,
    },

    /// Rebuild the document collection and student roster from the fact store
    ExportDocuments {
        /// Directory of the peer mirror files
        #[arg(long)]
        documents_dir: Option<PathBuf>,
    },

    /// List entity types in sync order with their relationships
    ListEntities,

    /// Show row, node and relationship counts
    Stats,
}

#[derive(Args, Debug, Default, Clone)]
pub struct GenerationArgs {
    /// Seed for a reproducible dataset
    #[arg(long)]
    pub seed: Option<u64>,

    /// Students created in every group
    #[arg(long)]
    pub students_per_group: Option<usize>,

    /// Probability that a student attended a lecture
    #[arg(long)]
    pub attendance_probability: Option<f64>,
}

impl GenerationArgs {
    /// Override the file settings with whatever was given on the command line
    pub fn apply(&self, config: &mut GenerationConfig) {
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(students) = self.students_per_group {
            config.students_per_group = students;
        }
        if let Some(p) = self.attendance_probability {
            config.attendance_probability = p;
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Settings file merged with the command line flags
    pub fn settings(&self) -> MirrorResult<Settings> {
        let mut settings = Settings::load(self.config.as_deref())?;

        if let Some(path) = &self.facts_db {
            settings.facts_db = Some(path.clone());
        }
        if let Some(path) = &self.graph_db {
            settings.graph_db = Some(path.clone());
        }

        match &self.command {
            Commands::Run {
                generation,
                documents_dir,
            } => {
                generation.apply(&mut settings.generation);
                if let Some(dir) = documents_dir {
                    settings.documents_dir = Some(dir.clone());
                }
            }
            Commands::Generate { generation } => generation.apply(&mut settings.generation),
            Commands::ExportDocuments {
                documents_dir: Some(dir),
            } => settings.documents_dir = Some(dir.clone()),
            _ => {}
        }
        settings.generation.validate()?;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_settings() {
        let cli = Cli::try_parse_from([
            "campus-mirror",
            "--facts-db",
            "/tmp/facts.sqlite",
            "generate",
            "--seed",
            "42",
            "--students-per-group",
            "3",
        ])
        .unwrap();

        let settings = cli.settings().unwrap();
        assert_eq!(settings.facts_db, Some(PathBuf::from("/tmp/facts.sqlite")));
        assert_eq!(settings.generation.seed, Some(42));
        assert_eq!(settings.generation.students_per_group, 3);
        assert_eq!(settings.generation.attendance_probability, 0.7);
    }

    #[test]
    fn test_sync_resume_flag() {
        let cli = Cli::try_parse_from(["campus-mirror", "sync", "--resume", "--tui"]).unwrap();
        assert!(cli.tui);
        assert!(matches!(cli.command, Commands::Sync { resume: true }));
    }

    #[test]
    fn test_invalid_probability_rejected() {
        let cli = Cli::try_parse_from([
            "campus-mirror",
            "generate",
            "--attendance-probability",
            "2",
        ])
        .unwrap();
        assert!(cli.settings().is_err());
    }
}
