//! Student roster cache with lookup indexes by name, mail, group and
//! free-text term.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

use super::{replace_file, MirrorReport, PeerMirror};
use crate::error::{MirrorError, MirrorResult};
use crate::schema::EntityKind;
use crate::store::FactStore;

const ROSTER_FILE: &str = "students.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentEntry {
    pub id: i64,
    pub name: String,
    pub age: Option<i64>,
    pub mail: Option<String>,
    pub group: String,
}

type IdSet = BTreeSet<i64>;

/// Lowercased key to the ids of every student filed under it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Indexes {
    name: BTreeMap<String, IdSet>,
    mail: BTreeMap<String, IdSet>,
    group: BTreeMap<String, IdSet>,
    term: BTreeMap<String, IdSet>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    students: BTreeMap<i64, StudentEntry>,
    indexes: Indexes,
}

impl Roster {
    pub fn insert(&mut self, entry: StudentEntry) {
        let id = entry.id;
        let file = |index: &mut BTreeMap<String, IdSet>, key: &str| {
            index.entry(key.to_lowercase()).or_default().insert(id);
        };

        file(&mut self.indexes.name, &entry.name);
        if let Some(mail) = entry.mail.as_deref().filter(|m| !m.is_empty()) {
            file(&mut self.indexes.mail, mail);
        }
        file(&mut self.indexes.group, &entry.group);

        let text = format!(
            "{} {} {}",
            entry.name,
            entry.mail.as_deref().unwrap_or_default(),
            entry.group
        );
        for term in text.split_whitespace() {
            file(&mut self.indexes.term, term);
        }

        self.students.insert(id, entry);
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&StudentEntry> {
        self.students.get(&id)
    }

    pub fn by_name(&self, name: &str) -> Vec<i64> {
        lookup(&self.indexes.name, name)
    }

    pub fn by_mail(&self, mail: &str) -> Vec<i64> {
        lookup(&self.indexes.mail, mail)
    }

    pub fn by_group(&self, group: &str) -> Vec<i64> {
        lookup(&self.indexes.group, group)
    }

    /// Students matching every whitespace-separated term of `query`
    pub fn search(&self, query: &str) -> Vec<i64> {
        let mut terms = query.split_whitespace().map(str::to_lowercase);
        let Some(first) = terms.next() else {
            return Vec::new();
        };

        let mut hits = self.indexes.term.get(&first).cloned().unwrap_or_default();
        for term in terms {
            match self.indexes.term.get(&term) {
                Some(ids) => hits.retain(|id| ids.contains(id)),
                None => return Vec::new(),
            }
        }
        hits.into_iter().collect()
    }
}

fn lookup(index: &BTreeMap<String, IdSet>, key: &str) -> Vec<i64> {
    index
        .get(&key.to_lowercase())
        .map(|ids| ids.iter().copied().collect())
        .unwrap_or_default()
}

/// Roster cache kept as one JSON file
pub struct RosterMirror {
    dir: PathBuf,
}

impl RosterMirror {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn roster_path(&self) -> PathBuf {
        self.dir.join(ROSTER_FILE)
    }

    pub fn load(&self) -> MirrorResult<Roster> {
        let raw = fs::read_to_string(self.roster_path())?;
        Ok(serde_json::from_str(&raw)?)
    }
}

impl PeerMirror for RosterMirror {
    fn name(&self) -> &'static str {
        "roster"
    }

    fn rebuild(&self, facts: &FactStore) -> MirrorResult<MirrorReport> {
        let (roster, rejected) = build_roster(facts)?;

        let path = self.roster_path();
        replace_file(&path, |writer| Ok(serde_json::to_writer(writer, &roster)?))?;

        debug!(
            students = roster.len(),
            rejected,
            path = %path.display(),
            "student roster rebuilt"
        );
        Ok(MirrorReport {
            mirror: self.name(),
            documents: roster.len() as u64,
            rejected,
        })
    }
}

fn build_roster(facts: &FactStore) -> MirrorResult<(Roster, u64)> {
    let mut stmt = facts.connection().prepare(
        "SELECT s.id, s.name, s.age, s.mail, g.name
         FROM students s LEFT JOIN student_group g ON g.id = s.group_id
         ORDER BY s.id",
    )?;
    let mut rows = stmt.query([])?;

    let mut roster = Roster::default();
    let mut rejected = 0;
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        let name: Option<String> = row.get(1)?;
        let group: Option<String> = row.get(4)?;

        let name = name.filter(|n| !n.trim().is_empty());
        let group = group.filter(|g| !g.trim().is_empty());
        match (name, group) {
            (Some(name), Some(group)) => roster.insert(StudentEntry {
                id,
                name,
                age: row.get(2)?,
                mail: row.get(3)?,
                group,
            }),
            _ => {
                let err = MirrorError::malformed(
                    EntityKind::Student,
                    Some(id),
                    "roster entry requires a name and a named group",
                );
                warn!(error = %err, "roster entry rejected");
                rejected += 1;
            }
        }
    }

    Ok((roster, rejected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::load_catalog;

    fn entry(id: i64, name: &str, mail: Option<&str>, group: &str) -> StudentEntry {
        StudentEntry {
            id,
            name: name.to_string(),
            age: Some(19),
            mail: mail.map(str::to_string),
            group: group.to_string(),
        }
    }

    #[test]
    fn test_indexes_are_case_insensitive() {
        let mut roster = Roster::default();
        roster.insert(entry(1, "stud10001", Some("stud10001@university.example"), "MM-101"));
        roster.insert(entry(2, "stud10002", None, "MM-101"));
        roster.insert(entry(3, "stud10003", None, "PH-201"));

        assert_eq!(roster.by_group("mm-101"), vec![1, 2]);
        assert_eq!(roster.by_name("STUD10003"), vec![3]);
        assert_eq!(roster.by_mail("Stud10001@University.example"), vec![1]);
        assert!(roster.by_mail("").is_empty());
        assert_eq!(roster.get(2).unwrap().group, "MM-101");
    }

    #[test]
    fn test_search_intersects_terms() {
        let mut roster = Roster::default();
        roster.insert(entry(1, "stud10001", None, "MM-101"));
        roster.insert(entry(2, "stud10002", None, "MM-101"));

        assert_eq!(roster.search("mm-101"), vec![1, 2]);
        assert_eq!(roster.search("MM-101 stud10002"), vec![2]);
        assert!(roster.search("mm-101 nobody").is_empty());
        assert!(roster.search("   ").is_empty());
    }

    #[test]
    fn test_rebuild_from_fact_store() {
        let store = FactStore::open_in_memory().unwrap();
        load_catalog(&store).unwrap();
        store
            .insert_student("stud12345", Some(18), Some("stud12345@university.example"), 1)
            .unwrap();
        store.insert_student(" ", Some(18), None, 1).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let mirror = RosterMirror::new(dir.path());
        let report = mirror.rebuild(&store).unwrap();
        assert_eq!(report.documents, 1);
        assert_eq!(report.rejected, 1);

        let roster = mirror.load().unwrap();
        let group = roster.get(1).unwrap().group.clone();
        assert_eq!(roster.by_group(&group), vec![1]);
        assert_eq!(roster.search("stud12345"), vec![1]);

        // a second rebuild replaces rather than appends
        mirror.rebuild(&store).unwrap();
        assert_eq!(mirror.load().unwrap(), roster);
    }
}
