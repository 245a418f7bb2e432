//! Rebuilding the graph mirror from the fact store
//!
//! A run clears the graph, then mirrors one entity type at a time in
//! dependency order. Each type is read through one cursor and written in
//! one graph transaction, so a failing type leaves every earlier type
//! committed and nothing of its own.

pub mod record;

use tracing::{debug, error, info, warn};

use crate::context::RunContext;
use crate::error::{MirrorError, MirrorResult};
use crate::graph::ClearStats;
use crate::schema::{get_entity, DependencyResolver, EntityKind, EntitySchema, ALL_ENTITIES};
use crate::ui::{Phase, Ui};
use record::node_from_row;

const PROGRESS_EVERY: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Clear the graph and mirror every type
    Full,
    /// Continue after the last committed type of an unfinished run
    Resume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Clearing,
    Syncing(EntityKind),
    Completed,
    Failed(EntityKind),
}

/// Outcome of mirroring one entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeReport {
    pub kind: EntityKind,
    pub nodes: u64,
    pub edges: u64,
    /// Malformed rows left out of the mirror
    pub skipped: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub cleared: Option<ClearStats>,
    /// Set when a previous run was resumed after this type
    pub resumed_after: Option<EntityKind>,
    pub types: Vec<TypeReport>,
    pub state: SyncState,
}

impl SyncReport {
    pub fn nodes(&self) -> u64 {
        self.types.iter().map(|t| t.nodes).sum()
    }

    pub fn edges(&self) -> u64 {
        self.types.iter().map(|t| t.edges).sum()
    }

    pub fn skipped(&self) -> u64 {
        self.types.iter().map(|t| t.skipped).sum()
    }
}

pub struct GraphSynchronizer<'a, U: Ui> {
    ctx: &'a mut RunContext,
    ui: &'a mut U,
    resolver: DependencyResolver,
    state: SyncState,
}

impl<'a, U: Ui> GraphSynchronizer<'a, U> {
    pub fn new(ctx: &'a mut RunContext, ui: &'a mut U) -> MirrorResult<Self> {
        let resolver = DependencyResolver::new();
        let canonical: Vec<EntityKind> = ALL_ENTITIES.iter().map(|e| e.kind).collect();
        resolver
            .validate_order(&canonical)
            .map_err(MirrorError::config)?;

        Ok(Self {
            ctx,
            ui,
            resolver,
            state: SyncState::Idle,
        })
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn run(&mut self, mode: SyncMode) -> MirrorResult<SyncReport> {
        let resume_after = match mode {
            SyncMode::Full => None,
            SyncMode::Resume => self.resume_point()?,
        };

        let (cleared, pending) = match resume_after {
            Some(last) => {
                info!(after = %last, "resuming unfinished sync");
                self.ui.log(format!("Resuming after {}", last));
                (None, self.ordered(self.resolver.entities_after(last))?)
            }
            None => {
                let stats = self.clear()?;
                (Some(stats), self.ordered(self.resolver.all_entities_ordered())?)
            }
        };

        let mut types = Vec::with_capacity(pending.len());
        for schema in pending {
            types.push(self.sync_entity(schema.kind)?);
        }

        self.ctx.graph.mark_completed()?;
        self.state = SyncState::Completed;
        self.ui.set_phase(Phase::Complete);

        let report = SyncReport {
            cleared,
            resumed_after: resume_after,
            types,
            state: self.state,
        };
        info!(
            nodes = report.nodes(),
            edges = report.edges(),
            skipped = report.skipped(),
            "graph mirror rebuilt"
        );
        Ok(report)
    }

    /// Delete every node and relationship from the mirror
    pub fn clear(&mut self) -> MirrorResult<ClearStats> {
        self.state = SyncState::Clearing;
        self.ui.set_phase(Phase::Clearing);

        let stats = self.ctx.graph.clear()?;
        self.ui.log(format!(
            "Cleared {} nodes and {} relationships",
            stats.nodes, stats.edges
        ));
        Ok(stats)
    }

    /// Mirror every row of one entity type in a single graph transaction.
    ///
    /// Parents must already be mirrored; a missing parent node fails the
    /// type with `ReferentialViolation` and rolls it back.
    pub fn sync_entity(&mut self, kind: EntityKind) -> MirrorResult<TypeReport> {
        self.state = SyncState::Syncing(kind);
        self.ui.set_phase(Phase::Syncing(kind));

        match self.mirror_type(get_entity(kind)) {
            Ok(report) => {
                self.ui.clear_progress();
                self.ui.tally(kind, report.nodes, report.edges, report.skipped);
                self.ui.log(format!(
                    "{}: {} nodes, {} relationships{}",
                    kind,
                    report.nodes,
                    report.edges,
                    if report.skipped > 0 {
                        format!(", {} skipped", report.skipped)
                    } else {
                        String::new()
                    }
                ));
                Ok(report)
            }
            Err(err) => {
                error!(entity = %kind, error = %err, "entity type rolled back");
                self.state = SyncState::Failed(kind);
                self.ui.set_phase(Phase::Failed(kind));
                self.ui.log(format!("{} failed: {}", kind, err));
                Err(err)
            }
        }
    }

    fn mirror_type(&mut self, schema: &'static EntitySchema) -> MirrorResult<TypeReport> {
        let RunContext { facts, graph } = &mut *self.ctx;
        let ui = &mut *self.ui;

        let total = facts.count(schema.kind)?;
        let mut batch = graph.begin()?;
        let mut seen: u64 = 0;
        let mut skipped: u64 = 0;

        facts.for_each_row(schema, |row| {
            seen += 1;

            match node_from_row(schema, row).and_then(|node| batch.create_node(&node)) {
                Ok(_) => {}
                Err(err) if err.is_row_local() => {
                    skipped += 1;
                    warn!(entity = %schema.kind, error = %err, "row skipped");
                    ui.warn(format!("skipped: {}", err));
                }
                Err(err) => return Err(err),
            }

            if seen % PROGRESS_EVERY == 0 {
                ui.set_progress(seen, total, schema.kind.label());
            }
            Ok(())
        })?;

        batch.record_checkpoint(schema.kind)?;
        let (nodes, edges) = batch.commit()?;
        debug!(entity = %schema.kind, nodes, edges, skipped, "entity type committed");

        Ok(TypeReport {
            kind: schema.kind,
            nodes,
            edges,
            skipped,
        })
    }

    /// Last committed type of an unfinished run, if there is one
    fn resume_point(&self) -> MirrorResult<Option<EntityKind>> {
        Ok(match self.ctx.graph.checkpoint()? {
            Some(cp) if !cp.completed => cp.last_committed,
            _ => None,
        })
    }

    fn ordered(
        &self,
        order: Result<Vec<&'static EntitySchema>, String>,
    ) -> MirrorResult<Vec<&'static EntitySchema>> {
        order.map_err(MirrorError::config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tables::{INSTITUTE, UNIVERSITY};
    use crate::store::SqlValue;
    use crate::ui::SilentUi;

    fn msu_context() -> RunContext {
        let ctx = RunContext::in_memory().unwrap();
        ctx.facts
            .insert_entity(
                &UNIVERSITY,
                &[("id", SqlValue::Integer(1)), ("name", SqlValue::from("MSU"))],
            )
            .unwrap();
        ctx.facts
            .insert_entity(
                &INSTITUTE,
                &[
                    ("id", SqlValue::Integer(1)),
                    ("name", SqlValue::from("Mechanics")),
                    ("university_id", SqlValue::Integer(1)),
                ],
            )
            .unwrap();
        ctx
    }

    #[test]
    fn test_full_run_mirrors_msu() {
        let mut ctx = msu_context();
        let mut ui = SilentUi::new();

        let report = GraphSynchronizer::new(&mut ctx, &mut ui)
            .unwrap()
            .run(SyncMode::Full)
            .unwrap();

        assert_eq!(report.state, SyncState::Completed);
        assert_eq!(report.types.len(), ALL_ENTITIES.len());
        assert_eq!(report.nodes(), 2);
        assert_eq!(report.edges(), 1);
        assert_eq!(
            ctx.graph
                .edges_between(
                    "HAS_INSTITUTE",
                    (EntityKind::University, 1),
                    (EntityKind::Institute, 1)
                )
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_institute_before_university_fails() {
        let mut ctx = msu_context();
        let mut ui = SilentUi::new();
        let mut sync = GraphSynchronizer::new(&mut ctx, &mut ui).unwrap();

        let err = sync.sync_entity(EntityKind::Institute).unwrap_err();
        assert!(matches!(
            err,
            MirrorError::ReferentialViolation {
                entity: EntityKind::Institute,
                parent: EntityKind::University,
                ..
            }
        ));
        assert_eq!(sync.state(), SyncState::Failed(EntityKind::Institute));
        drop(sync);

        assert_eq!(ctx.graph.node_count(Some(EntityKind::Institute)).unwrap(), 0);
    }

    #[test]
    fn test_malformed_row_is_skipped() {
        let mut ctx = msu_context();
        // Blank name slips past NOT NULL but is not a valid node
        ctx.facts
            .connection()
            .execute("INSERT INTO university (id, name) VALUES (2, '')", [])
            .unwrap();
        let mut ui = SilentUi::new();

        let report = GraphSynchronizer::new(&mut ctx, &mut ui)
            .unwrap()
            .run(SyncMode::Full)
            .unwrap();

        let universities = &report.types[0];
        assert_eq!(universities.kind, EntityKind::University);
        assert_eq!(universities.nodes, 1);
        assert_eq!(universities.skipped, 1);
        assert!(ctx.graph.node(EntityKind::University, 2).unwrap().is_none());
    }

    #[test]
    fn test_resume_without_checkpoint_is_full() {
        let mut ctx = msu_context();
        let mut ui = SilentUi::new();

        let report = GraphSynchronizer::new(&mut ctx, &mut ui)
            .unwrap()
            .run(SyncMode::Resume)
            .unwrap();

        assert!(report.cleared.is_some());
        assert_eq!(report.resumed_after, None);
        assert_eq!(report.nodes(), 2);
    }
}
