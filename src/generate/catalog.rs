//! Fixed reference data: the organisational hierarchy and teaching content
//!
//! Ids are explicit and positional (first row is id 1) so child rows can
//! name their parents directly.

use crate::error::MirrorResult;
use crate::schema::tables::{
    COURSE, DEPARTMENT, GROUP, INSTITUTE, LECTURE, MATERIAL, SPECIALTY, UNIVERSITY,
};
use crate::schema::EntitySchema;
use crate::store::{FactStore, SqlValue};

const UNIVERSITIES: &[(&str, &str)] = &[
    ("MSU", "Moscow"),
    ("Saint Petersburg State University", "Saint Petersburg"),
    ("Novosibirsk State University", "Novosibirsk"),
    ("Kazan Federal University", "Kazan"),
    ("Tomsk State University", "Tomsk"),
];

/// (name, university)
const INSTITUTES: &[(&str, i64)] = &[
    ("Mechanics", 1),
    ("Faculty of Physics", 1),
    ("Faculty of Law", 2),
    ("Institute of History", 2),
    ("Faculty of Information Technology", 3),
    ("Faculty of Biology", 4),
    ("Institute of Geology", 4),
    ("Faculty of Applied Mathematics", 5),
];

/// (name, institute)
const DEPARTMENTS: &[(&str, i64)] = &[
    ("Theoretical Mechanics", 1),
    ("Hydrodynamics", 1),
    ("Quantum Physics", 2),
    ("Civil Law", 3),
    ("Modern History", 4),
    ("Artificial Intelligence", 5),
    ("Systems Analysis", 5),
    ("Genetics", 6),
    ("Geophysics", 7),
    ("Probability Theory", 8),
];

/// (name, department)
const SPECIALTIES: &[(&str, i64)] = &[
    ("Theoretical Mechanics", 1),
    ("Fluid Dynamics", 2),
    ("Quantum Information", 3),
    ("Civil Law", 4),
    ("Contemporary History", 5),
    ("Machine Learning", 6),
    ("Data Engineering", 7),
    ("Molecular Genetics", 8),
    ("Exploration Geophysics", 9),
    ("Applied Statistics", 10),
];

/// (name, specialty)
const GROUPS: &[(&str, i64)] = &[
    ("MEC-101", 1),
    ("MEC-102", 1),
    ("FLD-101", 2),
    ("QIN-101", 3),
    ("LAW-101", 4),
    ("HIS-101", 5),
    ("ML-101", 6),
    ("ML-102", 6),
    ("DE-101", 7),
    ("GEN-101", 8),
    ("GPH-101", 9),
    ("STA-101", 10),
];

/// (name, department, specialty)
const COURSES: &[(&str, i64, i64)] = &[
    ("Statics", 1, 1),
    ("Analytical Dynamics", 1, 1),
    ("Navier-Stokes Equations", 2, 2),
    ("Quantum Algorithms", 3, 3),
    ("Contract Law", 4, 4),
    ("Twentieth Century History", 5, 5),
    ("Deep Learning", 6, 6),
    ("Stream Processing", 7, 7),
    ("Gene Expression", 8, 8),
    ("Seismic Methods", 9, 9),
    ("Bayesian Inference", 10, 10),
];

/// (name, course)
const LECTURES: &[(&str, i64)] = &[
    ("Forces and Moments", 1),
    ("Equilibrium of Rigid Bodies", 1),
    ("Lagrangian Mechanics", 2),
    ("Hamiltonian Mechanics", 2),
    ("Viscous Flow", 3),
    ("Turbulence", 3),
    ("Grover Search", 4),
    ("Shor Factoring", 4),
    ("Offer and Acceptance", 5),
    ("Breach of Contract", 5),
    ("The Interwar Period", 6),
    ("The Cold War", 6),
    ("Backpropagation", 7),
    ("Attention Mechanisms", 7),
    ("Windowing", 8),
    ("Exactly-once Delivery", 8),
    ("Transcription", 9),
    ("Regulatory Networks", 9),
    ("Wave Propagation", 10),
    ("Reflection Surveys", 10),
    ("Priors and Posteriors", 11),
    ("Markov Chain Monte Carlo", 11),
];

/// (name, lecture)
const MATERIALS: &[(&str, i64)] = &[
    ("Free-body diagram worksheet", 1),
    ("Equilibrium problem set", 2),
    ("Euler-Lagrange notes", 3),
    ("Phase space slides", 4),
    ("Boundary layer notes", 5),
    ("Kolmogorov scaling handout", 6),
    ("Oracle construction notes", 7),
    ("Period finding walkthrough", 8),
    ("Case law digest", 9),
    ("Remedies summary", 10),
    ("Interwar reading list", 11),
    ("Cold War timeline", 12),
    ("Gradient derivation notes", 13),
    ("Transformer paper annotations", 14),
    ("Watermark examples", 15),
    ("Idempotent sink lab", 16),
    ("Promoter motif slides", 17),
    ("Network inference lab", 18),
    ("Wave equation notes", 19),
    ("Survey design handbook", 20),
    ("Conjugate priors table", 21),
    ("Sampler diagnostics lab", 22),
];

/// Rows inserted per entity type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogCounts {
    pub universities: u64,
    pub institutes: u64,
    pub departments: u64,
    pub specialties: u64,
    pub groups: u64,
    pub courses: u64,
    pub lectures: u64,
    pub materials: u64,
}

impl CatalogCounts {
    pub fn total(&self) -> u64 {
        self.universities
            + self.institutes
            + self.departments
            + self.specialties
            + self.groups
            + self.courses
            + self.lectures
            + self.materials
    }
}

/// Insert the reference catalog top-down
pub fn load_catalog(store: &FactStore) -> MirrorResult<CatalogCounts> {
    for (id, (name, location)) in (1i64..).zip(UNIVERSITIES) {
        store.insert_entity(
            &UNIVERSITY,
            &[
                ("id", id.into()),
                ("name", (*name).into()),
                ("location", (*location).into()),
            ],
        )?;
    }

    let single = |rows: &[(&'static str, i64)]| -> Vec<(&'static str, Vec<i64>)> {
        rows.iter().map(|(name, parent)| (*name, vec![*parent])).collect()
    };
    let courses: Vec<(&str, Vec<i64>)> = COURSES
        .iter()
        .map(|(name, department, specialty)| (*name, vec![*department, *specialty]))
        .collect();

    Ok(CatalogCounts {
        universities: UNIVERSITIES.len() as u64,
        institutes: insert_children(store, &INSTITUTE, &single(INSTITUTES))?,
        departments: insert_children(store, &DEPARTMENT, &single(DEPARTMENTS))?,
        specialties: insert_children(store, &SPECIALTY, &single(SPECIALTIES))?,
        groups: insert_children(store, &GROUP, &single(GROUPS))?,
        courses: insert_children(store, &COURSE, &courses)?,
        lectures: insert_children(store, &LECTURE, &single(LECTURES))?,
        materials: insert_children(store, &MATERIAL, &single(MATERIALS))?,
    })
}

/// Insert named rows whose parent ids follow the schema's foreign key order
fn insert_children(
    store: &FactStore,
    schema: &EntitySchema,
    rows: &[(&str, Vec<i64>)],
) -> MirrorResult<u64> {
    for (id, (name, parents)) in (1i64..).zip(rows) {
        let mut values: Vec<(&str, SqlValue)> =
            vec![("id", SqlValue::Integer(id)), ("name", (*name).into())];
        values.extend(
            schema
                .foreign_keys
                .iter()
                .zip(parents)
                .map(|(fk, parent)| (fk.column, SqlValue::Integer(*parent))),
        );
        store.insert_entity(schema, &values)?;
    }

    Ok(rows.len() as u64)
}
