use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

use crate::error::{MirrorError, MirrorResult};
use crate::schema::{EdgeDirection, EntityKind};

const GRAPH_DDL: &str = "
CREATE TABLE IF NOT EXISTS nodes (
    label TEXT NOT NULL,
    id INTEGER NOT NULL,
    properties TEXT NOT NULL,
    PRIMARY KEY (label, id)
);
CREATE TABLE IF NOT EXISTS edges (
    rel_type TEXT NOT NULL,
    from_label TEXT NOT NULL,
    from_id INTEGER NOT NULL,
    to_label TEXT NOT NULL,
    to_id INTEGER NOT NULL,
    FOREIGN KEY (from_label, from_id) REFERENCES nodes(label, id),
    FOREIGN KEY (to_label, to_id) REFERENCES nodes(label, id)
);
CREATE INDEX IF NOT EXISTS idx_edges_rel_type ON edges(rel_type);
CREATE INDEX IF NOT EXISTS idx_edges_from ON edges(from_label, from_id);
CREATE INDEX IF NOT EXISTS idx_edges_to ON edges(to_label, to_id);
CREATE TABLE IF NOT EXISTS sync_checkpoint (
    slot INTEGER PRIMARY KEY CHECK (slot = 1),
    last_committed TEXT,
    completed INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// One typed edge of a node, identified by the node at the other end
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSpec {
    pub relationship: &'static str,
    pub other: EntityKind,
    pub other_id: i64,
    pub direction: EdgeDirection,
}

/// A node to create together with the edges onto its parents
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub kind: EntityKind,
    pub id: i64,
    pub properties: Map<String, Value>,
    pub edges: Vec<EdgeSpec>,
}

impl NodeSpec {
    pub fn new(kind: EntityKind, id: i64) -> Self {
        let mut properties = Map::new();
        properties.insert("id".to_string(), Value::from(id));

        Self {
            kind,
            id,
            properties,
            edges: Vec::new(),
        }
    }

    pub fn property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn edge(
        mut self,
        relationship: &'static str,
        other: EntityKind,
        other_id: i64,
        direction: EdgeDirection,
    ) -> Self {
        self.edges.push(EdgeSpec {
            relationship,
            other,
            other_id,
            direction,
        });
        self
    }
}

/// Progress of the last synchronization, persisted with the graph
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub last_committed: Option<EntityKind>,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

/// What a Clear removed
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClearStats {
    pub nodes: u64,
    pub edges: u64,
}

/// The graph mirror: labeled nodes and typed edges in their own database
pub struct GraphStore {
    conn: Connection,
}

impl GraphStore {
    pub fn open(db_path: &Path) -> MirrorResult<Self> {
        let conn = Connection::open(db_path).map_err(|source| MirrorError::Connection {
            store: "graph",
            path: db_path.display().to_string(),
            source,
        })?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> MirrorResult<Self> {
        let conn = Connection::open_in_memory().map_err(|source| MirrorError::Connection {
            store: "graph",
            path: ":memory:".to_string(),
            source,
        })?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> MirrorResult<Self> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        conn.execute_batch(GRAPH_DDL)?;
        Ok(Self { conn })
    }

    /// Delete every node and relationship and reset the checkpoint
    pub fn clear(&mut self) -> MirrorResult<ClearStats> {
        let tx = self.conn.transaction()?;
        let edges = tx.execute("DELETE FROM edges", [])? as u64;
        let nodes = tx.execute("DELETE FROM nodes", [])? as u64;
        write_checkpoint(&tx, None, false)?;
        tx.commit()?;

        debug!(nodes, edges, "graph cleared");
        Ok(ClearStats { nodes, edges })
    }

    /// Open the write transaction for one entity type
    pub fn begin(&mut self) -> MirrorResult<GraphBatch<'_>> {
        Ok(GraphBatch {
            tx: self.conn.transaction()?,
            nodes: 0,
            edges: 0,
        })
    }

    pub fn checkpoint(&self) -> MirrorResult<Option<Checkpoint>> {
        let row = self
            .conn
            .query_row(
                "SELECT last_committed, completed, updated_at FROM sync_checkpoint WHERE slot = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, bool>(1)?,
                        row.get::<_, DateTime<Utc>>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((last, completed, updated_at)) = row else {
            return Ok(None);
        };

        let last_committed = match last {
            Some(label) => Some(label.parse().map_err(|e: String| {
                MirrorError::config(format!("corrupt sync checkpoint: {}", e))
            })?),
            None => None,
        };

        Ok(Some(Checkpoint {
            last_committed,
            completed,
            updated_at,
        }))
    }

    /// Flag the current run as finished
    pub fn mark_completed(&self) -> MirrorResult<()> {
        self.conn.execute(
            "UPDATE sync_checkpoint SET completed = 1, updated_at = ?1 WHERE slot = 1",
            [Utc::now()],
        )?;
        Ok(())
    }

    /// Properties of one node
    pub fn node(&self, kind: EntityKind, id: i64) -> MirrorResult<Option<Map<String, Value>>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT properties FROM nodes WHERE label = ?1 AND id = ?2",
                params![kind.label(), id],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(raw) => match serde_json::from_str(&raw)? {
                Value::Object(map) => Ok(Some(map)),
                _ => Ok(Some(Map::new())),
            },
            None => Ok(None),
        }
    }

    /// Number of nodes, optionally restricted to one label
    pub fn node_count(&self, kind: Option<EntityKind>) -> MirrorResult<u64> {
        let count: i64 = match kind {
            Some(kind) => self.conn.query_row(
                "SELECT COUNT(*) FROM nodes WHERE label = ?1",
                [kind.label()],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?,
        };
        Ok(count as u64)
    }

    /// Number of edges, optionally restricted to one relationship type
    pub fn edge_count(&self, relationship: Option<&str>) -> MirrorResult<u64> {
        let count: i64 = match relationship {
            Some(rel) => self.conn.query_row(
                "SELECT COUNT(*) FROM edges WHERE rel_type = ?1",
                [rel],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?,
        };
        Ok(count as u64)
    }

    /// Number of `relationship` edges from one node to another
    pub fn edges_between(
        &self,
        relationship: &str,
        from: (EntityKind, i64),
        to: (EntityKind, i64),
    ) -> MirrorResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM edges
             WHERE rel_type = ?1 AND from_label = ?2 AND from_id = ?3
               AND to_label = ?4 AND to_id = ?5",
            params![relationship, from.0.label(), from.1, to.0.label(), to.1],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Node count per label, alphabetical
    pub fn label_counts(&self) -> MirrorResult<Vec<(String, u64)>> {
        self.grouped_counts("SELECT label, COUNT(*) FROM nodes GROUP BY label ORDER BY label")
    }

    /// Edge count per relationship type, alphabetical
    pub fn relationship_counts(&self) -> MirrorResult<Vec<(String, u64)>> {
        self.grouped_counts(
            "SELECT rel_type, COUNT(*) FROM edges GROUP BY rel_type ORDER BY rel_type",
        )
    }

    fn grouped_counts(&self, sql: &str) -> MirrorResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

/// Write transaction covering one entity type's full row set.
///
/// Dropping it without `commit` rolls every node of the type back.
pub struct GraphBatch<'conn> {
    tx: Transaction<'conn>,
    nodes: u64,
    edges: u64,
}

impl GraphBatch<'_> {
    /// Create a node and its edges as one unit of work.
    ///
    /// Every endpoint must already exist; a missing one fails with
    /// `ReferentialViolation` and leaves nothing behind for this node.
    pub fn create_node(&mut self, spec: &NodeSpec) -> MirrorResult<usize> {
        let sp = self.tx.savepoint()?;

        for edge in &spec.edges {
            let exists: bool = sp
                .prepare_cached(
                    "SELECT EXISTS (SELECT 1 FROM nodes WHERE label = ?1 AND id = ?2)",
                )?
                .query_row(params![edge.other.label(), edge.other_id], |row| row.get(0))?;

            if !exists {
                return Err(MirrorError::ReferentialViolation {
                    entity: spec.kind,
                    id: Some(spec.id),
                    parent: edge.other,
                    parent_id: edge.other_id,
                    relationship: edge.relationship,
                });
            }
        }

        let properties = Value::Object(spec.properties.clone()).to_string();
        sp.prepare_cached("INSERT INTO nodes (label, id, properties) VALUES (?1, ?2, ?3)")?
            .execute(params![spec.kind.label(), spec.id, properties])?;

        {
            let mut stmt = sp.prepare_cached(
                "INSERT INTO edges (rel_type, from_label, from_id, to_label, to_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for edge in &spec.edges {
                let this = (spec.kind.label(), spec.id);
                let other = (edge.other.label(), edge.other_id);
                let (from, to) = match edge.direction {
                    EdgeDirection::FromParent => (other, this),
                    EdgeDirection::ToParent => (this, other),
                };
                stmt.execute(params![edge.relationship, from.0, from.1, to.0, to.1])?;
            }
        }

        sp.commit()?;
        self.nodes += 1;
        self.edges += spec.edges.len() as u64;
        Ok(spec.edges.len())
    }

    /// Record `kind` as the last fully mirrored type; lands with the commit
    pub fn record_checkpoint(&self, kind: EntityKind) -> MirrorResult<()> {
        write_checkpoint(&self.tx, Some(kind), false)
    }

    /// Commit the type and return the nodes and edges it created
    pub fn commit(self) -> MirrorResult<(u64, u64)> {
        let counts = (self.nodes, self.edges);
        self.tx.commit()?;
        Ok(counts)
    }
}

fn write_checkpoint(
    conn: &Connection,
    last_committed: Option<EntityKind>,
    completed: bool,
) -> MirrorResult<()> {
    conn.execute(
        "INSERT INTO sync_checkpoint (slot, last_committed, completed, updated_at)
         VALUES (1, ?1, ?2, ?3)
         ON CONFLICT(slot) DO UPDATE SET
             last_committed = excluded.last_committed,
             completed = excluded.completed,
             updated_at = excluded.updated_at",
        params![last_committed.map(|k| k.label()), completed, Utc::now()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn university(id: i64) -> NodeSpec {
        NodeSpec::new(EntityKind::University, id).property("name", "MSU")
    }

    fn institute(id: i64, university_id: i64) -> NodeSpec {
        NodeSpec::new(EntityKind::Institute, id)
            .property("name", "Mechanics")
            .edge(
                "HAS_INSTITUTE",
                EntityKind::University,
                university_id,
                EdgeDirection::FromParent,
            )
    }

    #[test]
    fn test_create_node_with_parent_edge() {
        let mut graph = GraphStore::open_in_memory().unwrap();
        let mut batch = graph.begin().unwrap();
        batch.create_node(&university(1)).unwrap();
        assert_eq!(batch.create_node(&institute(1, 1)).unwrap(), 1);
        assert_eq!(batch.commit().unwrap(), (2, 1));

        let node = graph.node(EntityKind::Institute, 1).unwrap().unwrap();
        assert_eq!(node["name"], "Mechanics");
        assert_eq!(node["id"], 1);
        assert_eq!(
            graph
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
    fn test_missing_endpoint_leaves_no_orphan() {
        let mut graph = GraphStore::open_in_memory().unwrap();
        let mut batch = graph.begin().unwrap();

        let err = batch.create_node(&institute(1, 1)).unwrap_err();
        assert!(matches!(
            err,
            MirrorError::ReferentialViolation {
                parent: EntityKind::University,
                parent_id: 1,
                ..
            }
        ));
        drop(batch);

        assert_eq!(graph.node_count(None).unwrap(), 0);
    }

    #[test]
    fn test_child_to_parent_direction() {
        let mut graph = GraphStore::open_in_memory().unwrap();
        let mut batch = graph.begin().unwrap();
        batch
            .create_node(&NodeSpec::new(EntityKind::Group, 4).property("name", "MEC-101"))
            .unwrap();
        batch
            .create_node(&NodeSpec::new(EntityKind::Schedule, 9).edge(
                "FOR_GROUP",
                EntityKind::Group,
                4,
                EdgeDirection::ToParent,
            ))
            .unwrap();
        batch.commit().unwrap();

        assert_eq!(
            graph
                .edges_between("FOR_GROUP", (EntityKind::Schedule, 9), (EntityKind::Group, 4))
                .unwrap(),
            1
        );
        assert_eq!(
            graph
                .edges_between("FOR_GROUP", (EntityKind::Group, 4), (EntityKind::Schedule, 9))
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_checkpoint_commits_with_batch() {
        let mut graph = GraphStore::open_in_memory().unwrap();
        assert!(graph.checkpoint().unwrap().is_none());

        graph.clear().unwrap();
        let cp = graph.checkpoint().unwrap().unwrap();
        assert_eq!(cp.last_committed, None);
        assert!(!cp.completed);

        {
            let mut batch = graph.begin().unwrap();
            batch.create_node(&university(1)).unwrap();
            batch.record_checkpoint(EntityKind::University).unwrap();
            // dropped without commit
        }
        assert_eq!(graph.checkpoint().unwrap().unwrap().last_committed, None);

        let mut batch = graph.begin().unwrap();
        batch.create_node(&university(1)).unwrap();
        batch.record_checkpoint(EntityKind::University).unwrap();
        batch.commit().unwrap();
        graph.mark_completed().unwrap();

        let cp = graph.checkpoint().unwrap().unwrap();
        assert_eq!(cp.last_committed, Some(EntityKind::University));
        assert!(cp.completed);
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut graph = GraphStore::open_in_memory().unwrap();
        let mut batch = graph.begin().unwrap();
        batch.create_node(&university(1)).unwrap();
        batch.create_node(&institute(2, 1)).unwrap();
        batch.commit().unwrap();

        let stats = graph.clear().unwrap();
        assert_eq!(stats, ClearStats { nodes: 2, edges: 1 });
        assert_eq!(graph.node_count(None).unwrap(), 0);
        assert_eq!(graph.edge_count(None).unwrap(), 0);
        assert!(graph.label_counts().unwrap().is_empty());
    }
}
