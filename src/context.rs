use std::path::Path;
use tracing::info;

use crate::config::Settings;
use crate::error::MirrorResult;
use crate::graph::GraphStore;
use crate::store::FactStore;

/// The store handles a run works against, opened once and held for its duration
pub struct RunContext {
    pub facts: FactStore,
    pub graph: GraphStore,
}

impl RunContext {
    pub fn open(facts_db: &Path, graph_db: &Path) -> MirrorResult<Self> {
        let facts = FactStore::open(facts_db)?;
        let graph = GraphStore::open(graph_db)?;
        info!(facts = %facts_db.display(), graph = %graph_db.display(), "stores opened");

        Ok(Self { facts, graph })
    }

    pub fn from_settings(settings: &Settings) -> MirrorResult<Self> {
        Self::open(&settings.facts_path()?, &settings.graph_path()?)
    }

    /// Both stores in memory, for tests and dry runs
    pub fn in_memory() -> MirrorResult<Self> {
        Ok(Self {
            facts: FactStore::open_in_memory()?,
            graph: GraphStore::open_in_memory()?,
        })
    }
}
