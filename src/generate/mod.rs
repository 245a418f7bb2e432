//! Synthetic dataset generation into the fact store

pub mod catalog;
pub mod facts;
pub mod schedule;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::config::GenerationConfig;
use crate::error::MirrorResult;
use crate::store::FactStore;
use crate::ui::{Phase, Ui};

pub use catalog::{load_catalog, CatalogCounts};
pub use facts::{generate_students_and_attendance, FactCounts};
pub use schedule::{generate_schedule, SCHEDULES_PER_TERM};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationReport {
    pub catalog: CatalogCounts,
    pub schedules: u64,
    pub facts: FactCounts,
    pub seed: Option<u64>,
}

/// Replace the fact store's content with a freshly generated dataset.
///
/// The store is reset first; everything after that is one transaction, so a
/// failure leaves an empty store rather than a partial dataset.
pub fn generate_dataset<U: Ui>(
    store: &FactStore,
    config: &GenerationConfig,
    ui: &mut U,
) -> MirrorResult<GenerationReport> {
    config.validate()?;

    ui.set_phase(Phase::Resetting);
    store.reset()?;

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let tx = store.connection().unchecked_transaction()?;

    ui.set_phase(Phase::LoadingCatalog);
    let catalog = load_catalog(store)?;
    ui.log(format!("Catalog: {} reference rows", catalog.total()));

    ui.set_phase(Phase::Scheduling);
    let schedules = generate_schedule(store, &config.terms, &mut rng)?;
    ui.log(format!(
        "Schedule: {} occurrences over {} terms",
        schedules,
        config.terms.len()
    ));

    ui.set_phase(Phase::GeneratingFacts);
    let facts = generate_students_and_attendance(store, config, &mut rng, ui)?;
    ui.clear_progress();
    ui.log(format!(
        "Facts: {} students, {} attendance rows ({} attended)",
        facts.students, facts.attendance, facts.attended
    ));

    tx.commit()?;

    info!(
        schedules,
        students = facts.students,
        attendance = facts.attendance,
        seed = ?config.seed,
        "dataset generated"
    );
    Ok(GenerationReport {
        catalog,
        schedules,
        facts,
        seed: config.seed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntityKind;
    use crate::ui::SilentUi;

    #[test]
    fn test_regenerating_replaces_dataset() {
        let store = FactStore::open_in_memory().unwrap();
        let config = GenerationConfig {
            students_per_group: 2,
            seed: Some(99),
            ..GenerationConfig::default()
        };

        let first = generate_dataset(&store, &config, &mut SilentUi).unwrap();
        let second = generate_dataset(&store, &config, &mut SilentUi).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            store.count(EntityKind::Schedule).unwrap(),
            first.schedules
        );
        assert_eq!(store.partitions().unwrap().len(), 6);
    }
}
