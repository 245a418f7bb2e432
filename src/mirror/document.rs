use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use tracing::{debug, warn};

use super::{replace_file, MirrorReport, PeerMirror};
use crate::error::{MirrorError, MirrorResult};
use crate::schema::EntityKind;
use crate::store::FactStore;

const COLLECTION: &str = "universities";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniversityDoc {
    pub id: i64,
    pub name: String,
    pub location: String,
    pub institutes: Vec<InstituteDoc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstituteDoc {
    pub name: String,
    pub departments: Vec<DepartmentDoc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentDoc {
    pub name: String,
    pub specializations: Vec<String>,
}

/// Nested university documents in a JSON Lines collection file
pub struct DocumentMirror {
    dir: PathBuf,
}

impl DocumentMirror {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn collection_path(&self) -> PathBuf {
        self.dir.join(format!("{}.jsonl", COLLECTION))
    }

    /// Read the collection back
    pub fn load(&self) -> MirrorResult<Vec<UniversityDoc>> {
        let reader = BufReader::new(File::open(self.collection_path())?);
        let mut docs = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            docs.push(serde_json::from_str(&line)?);
        }
        Ok(docs)
    }
}

impl PeerMirror for DocumentMirror {
    fn name(&self) -> &'static str {
        "documents"
    }

    fn rebuild(&self, facts: &FactStore) -> MirrorResult<MirrorReport> {
        let (docs, rejected) = build_documents(facts)?;

        let path = self.collection_path();
        replace_file(&path, |writer| {
            for doc in &docs {
                serde_json::to_writer(&mut *writer, doc)?;
                writer.write_all(b"\n")?;
            }
            Ok(())
        })?;

        debug!(
            documents = docs.len(),
            rejected,
            path = %path.display(),
            "document collection rebuilt"
        );
        Ok(MirrorReport {
            mirror: self.name(),
            documents: docs.len() as u64,
            rejected,
        })
    }
}

/// Assemble one document per university, dropping those that fail validation
fn build_documents(facts: &FactStore) -> MirrorResult<(Vec<UniversityDoc>, u64)> {
    let conn = facts.connection();

    let mut specializations: BTreeMap<i64, Vec<String>> = BTreeMap::new();
    let mut stmt = conn.prepare("SELECT department_id, name FROM specialty ORDER BY id")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        specializations
            .entry(row.get(0)?)
            .or_default()
            .push(row.get(1)?);
    }

    let mut departments: BTreeMap<i64, Vec<DepartmentDoc>> = BTreeMap::new();
    let mut stmt = conn.prepare("SELECT id, institute_id, name FROM department ORDER BY id")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        departments
            .entry(row.get(1)?)
            .or_default()
            .push(DepartmentDoc {
                name: row.get(2)?,
                specializations: specializations.remove(&id).unwrap_or_default(),
            });
    }

    let mut institutes: BTreeMap<i64, Vec<InstituteDoc>> = BTreeMap::new();
    let mut stmt = conn.prepare("SELECT id, university_id, name FROM institute ORDER BY id")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        institutes
            .entry(row.get(1)?)
            .or_default()
            .push(InstituteDoc {
                name: row.get(2)?,
                departments: departments.remove(&id).unwrap_or_default(),
            });
    }

    let mut docs = Vec::new();
    let mut rejected = 0;
    let mut stmt = conn.prepare("SELECT id, name, location FROM university ORDER BY id")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        let name: Option<String> = row.get(1)?;
        let location: Option<String> = row.get(2)?;

        match validate(id, name, location) {
            Ok((name, location)) => docs.push(UniversityDoc {
                id,
                name,
                location,
                institutes: institutes.remove(&id).unwrap_or_default(),
            }),
            Err(err) => {
                warn!(error = %err, "university document rejected");
                rejected += 1;
            }
        }
    }

    Ok((docs, rejected))
}

/// `name` and `location` are required and non-empty
fn validate(
    id: i64,
    name: Option<String>,
    location: Option<String>,
) -> MirrorResult<(String, String)> {
    let required = |field: &str, value: Option<String>| {
        value.filter(|v| !v.trim().is_empty()).ok_or_else(|| {
            MirrorError::malformed(
                EntityKind::University,
                Some(id),
                format!("document requires a {}", field),
            )
        })
    };

    Ok((required("name", name)?, required("location", location)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::load_catalog;

    #[test]
    fn test_nested_documents() {
        let store = FactStore::open_in_memory().unwrap();
        load_catalog(&store).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mirror = DocumentMirror::new(dir.path());

        let report = mirror.rebuild(&store).unwrap();
        assert_eq!(report.documents, 5);
        assert_eq!(report.rejected, 0);

        let docs = mirror.load().unwrap();
        let msu = &docs[0];
        assert_eq!(msu.name, "MSU");
        assert_eq!(msu.location, "Moscow");
        assert_eq!(msu.institutes[0].name, "Mechanics");
        assert_eq!(msu.institutes[0].departments[0].name, "Theoretical Mechanics");
        assert_eq!(
            msu.institutes[0].departments[0].specializations,
            vec!["Theoretical Mechanics".to_string()]
        );
    }

    #[test]
    fn test_rebuild_replaces_collection() {
        let store = FactStore::open_in_memory().unwrap();
        load_catalog(&store).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mirror = DocumentMirror::new(dir.path());

        mirror.rebuild(&store).unwrap();
        mirror.rebuild(&store).unwrap();
        assert_eq!(mirror.load().unwrap().len(), 5);
        assert!(!mirror.collection_path().with_extension("jsonl.tmp").exists());
    }

    #[test]
    fn test_university_without_location_is_rejected() {
        let store = FactStore::open_in_memory().unwrap();
        store
            .connection()
            .execute_batch(
                "INSERT INTO university (id, name, location) VALUES (1, 'MSU', 'Moscow');
                 INSERT INTO university (id, name) VALUES (2, 'Nowhere');",
            )
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mirror = DocumentMirror::new(dir.path());

        let report = mirror.rebuild(&store).unwrap();
        assert_eq!(report.documents, 1);
        assert_eq!(report.rejected, 1);
        assert!(mirror.load().unwrap()[0].institutes.is_empty());
    }
}
