use rand::distributions::Bernoulli;
use rand::Rng;
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::config::GenerationConfig;
use crate::error::{MirrorError, MirrorResult};
use crate::schema::{EntityKind, Semester};
use crate::store::FactStore;
use crate::ui::Ui;

/// Rows produced by the student and attendance pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactCounts {
    pub students: u64,
    pub attendance: u64,
    /// Attendance rows with `attended = true`
    pub attended: u64,
    pub partitions_created: u64,
}

/// Create every term's attendance partition up front
pub fn ensure_term_partitions(
    store: &FactStore,
    config: &GenerationConfig,
) -> MirrorResult<u64> {
    let semesters: BTreeSet<Semester> = config
        .terms
        .iter()
        .map(|t| t.semester())
        .collect::<MirrorResult<_>>()?;

    let mut created = 0;
    for semester in &semesters {
        if store.ensure_semester_partition(semester)? {
            created += 1;
        }
    }
    Ok(created)
}

/// Populate each group with students and give every student one attendance
/// row per scheduled occurrence of their group.
pub fn generate_students_and_attendance<R: Rng, U: Ui>(
    store: &FactStore,
    config: &GenerationConfig,
    rng: &mut R,
    ui: &mut U,
) -> MirrorResult<FactCounts> {
    let attendance = Bernoulli::new(config.attendance_probability).map_err(|e| {
        MirrorError::config(format!(
            "attendance_probability {}: {}",
            config.attendance_probability, e
        ))
    })?;

    let mut counts = FactCounts {
        partitions_created: ensure_term_partitions(store, config)?,
        ..FactCounts::default()
    };

    let groups = store.ids(EntityKind::Group)?;
    for (done, &group_id) in groups.iter().enumerate() {
        let schedules = store.schedules_for_group(group_id)?;

        for _ in 0..config.students_per_group {
            let name = format!("stud{}", rng.gen_range(10000..99999));
            let age: i64 = rng.gen_range(17..25);
            let mail = format!("{}@university.example", name);
            let student_id = store.insert_student(&name, Some(age), Some(&mail), group_id)?;
            counts.students += 1;

            for &(schedule_id, _) in &schedules {
                let attended = rng.sample(attendance);
                record_attendance(store, student_id, schedule_id, attended, &mut counts)?;
                counts.attendance += 1;
                if attended {
                    counts.attended += 1;
                }
            }
        }

        ui.set_progress(done as u64 + 1, groups.len() as u64, "groups");
    }

    debug!(
        students = counts.students,
        attendance = counts.attendance,
        "students and attendance generated"
    );
    Ok(counts)
}

/// Insert one attendance row, creating its partition and retrying once when
/// the semester has none yet.
fn record_attendance(
    store: &FactStore,
    student_id: i64,
    schedule_id: i64,
    attended: bool,
    counts: &mut FactCounts,
) -> MirrorResult<i64> {
    match store.insert_attendance(student_id, schedule_id, attended) {
        Err(MirrorError::PartitionMissing(semester)) => {
            warn!(semester = %semester, "attendance partition missing, creating it");
            if store.ensure_semester_partition(&semester)? {
                counts.partitions_created += 1;
            }
            store.insert_attendance(student_id, schedule_id, attended)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::catalog::load_catalog;
    use crate::generate::schedule::{generate_schedule, SCHEDULES_PER_TERM};
    use crate::schema::Term;
    use crate::ui::SilentUi;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn spring_2023() -> Term {
        Term::new(
            "2023_spring",
            NaiveDate::from_ymd_opt(2023, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 5, 31).unwrap(),
        )
    }

    #[test]
    fn test_every_student_attends_every_group_schedule() {
        let store = FactStore::open_in_memory().unwrap();
        load_catalog(&store).unwrap();
        let config = GenerationConfig {
            students_per_group: 3,
            terms: vec![spring_2023()],
            ..GenerationConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        generate_schedule(&store, &config.terms, &mut rng).unwrap();

        let counts =
            generate_students_and_attendance(&store, &config, &mut rng, &mut SilentUi).unwrap();

        let groups = store.count(EntityKind::Group).unwrap();
        assert_eq!(counts.students, groups * 3);
        assert_eq!(counts.attendance, counts.students * SCHEDULES_PER_TERM as u64);
        assert_eq!(store.count(EntityKind::Attendance).unwrap(), counts.attendance);
        assert_eq!(counts.partitions_created, 1);
        assert!(counts.attended <= counts.attendance);

        let bad_mail: i64 = store
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM students
                 WHERE mail != name || '@university.example' OR age < 17 OR age >= 25",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(bad_mail, 0);
    }

    #[test]
    fn test_missing_partition_is_created_on_demand() {
        let store = FactStore::open_in_memory().unwrap();
        load_catalog(&store).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        generate_schedule(&store, &[spring_2023()], &mut rng).unwrap();

        // Terms only cover fall, so the spring partition is not pre-created
        let fall = Term::new(
            "2023_fall",
            NaiveDate::from_ymd_opt(2023, 9, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 12, 20).unwrap(),
        );
        let config = GenerationConfig {
            students_per_group: 1,
            terms: vec![fall],
            ..GenerationConfig::default()
        };

        let counts =
            generate_students_and_attendance(&store, &config, &mut rng, &mut SilentUi).unwrap();
        assert_eq!(counts.partitions_created, 2);
        assert!(store
            .has_partition(&"2023_spring".parse().unwrap())
            .unwrap());
        assert_eq!(store.count(EntityKind::Attendance).unwrap(), counts.attendance);
    }

    #[test]
    fn test_probability_extremes() {
        let store = FactStore::open_in_memory().unwrap();
        load_catalog(&store).unwrap();
        let config = GenerationConfig {
            students_per_group: 2,
            attendance_probability: 0.0,
            terms: vec![spring_2023()],
            ..GenerationConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(5);
        generate_schedule(&store, &config.terms, &mut rng).unwrap();

        let counts =
            generate_students_and_attendance(&store, &config, &mut rng, &mut SilentUi).unwrap();
        assert!(counts.attendance > 0);
        assert_eq!(counts.attended, 0);
    }
}
