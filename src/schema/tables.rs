//! Entity definitions for the academic hierarchy, listed in sync order

use super::types::*;

// =============================================================================
// Organisational hierarchy
// =============================================================================

pub static UNIVERSITY: EntitySchema = EntitySchema {
    kind: EntityKind::University,
    table: "university",
    columns: &[
        Column::required("id", ColumnType::Integer),
        Column::required("name", ColumnType::Text),
        Column::new("location", ColumnType::Text),
    ],
    foreign_keys: &[],
    partitioned: false,
};

pub static INSTITUTE: EntitySchema = EntitySchema {
    kind: EntityKind::Institute,
    table: "institute",
    columns: &[
        Column::required("id", ColumnType::Integer),
        Column::required("name", ColumnType::Text),
        Column::required("university_id", ColumnType::Integer),
    ],
    foreign_keys: &[ForeignKey::new(
        "university_id",
        EntityKind::University,
        "HAS_INSTITUTE",
    )],
    partitioned: false,
};

pub static DEPARTMENT: EntitySchema = EntitySchema {
    kind: EntityKind::Department,
    table: "department",
    columns: &[
        Column::required("id", ColumnType::Integer),
        Column::required("name", ColumnType::Text),
        Column::required("institute_id", ColumnType::Integer),
    ],
    foreign_keys: &[ForeignKey::new(
        "institute_id",
        EntityKind::Institute,
        "HAS_DEPARTMENT",
    )],
    partitioned: false,
};

pub static SPECIALTY: EntitySchema = EntitySchema {
    kind: EntityKind::Specialty,
    table: "specialty",
    columns: &[
        Column::required("id", ColumnType::Integer),
        Column::required("name", ColumnType::Text),
        Column::required("department_id", ColumnType::Integer),
    ],
    foreign_keys: &[ForeignKey::new(
        "department_id",
        EntityKind::Department,
        "HAS_SPECIALTY",
    )],
    partitioned: false,
};

pub static GROUP: EntitySchema = EntitySchema {
    kind: EntityKind::Group,
    table: "student_group",
    columns: &[
        Column::required("id", ColumnType::Integer),
        Column::required("name", ColumnType::Text),
        Column::required("specialty_id", ColumnType::Integer),
    ],
    foreign_keys: &[ForeignKey::new(
        "specialty_id",
        EntityKind::Specialty,
        "HAS_GROUP",
    )],
    partitioned: false,
};

// =============================================================================
// Teaching content
// =============================================================================

pub static COURSE: EntitySchema = EntitySchema {
    kind: EntityKind::Course,
    table: "course",
    columns: &[
        Column::required("id", ColumnType::Integer),
        Column::required("name", ColumnType::Text),
        Column::required("department_id", ColumnType::Integer),
        Column::required("specialty_id", ColumnType::Integer),
    ],
    foreign_keys: &[
        ForeignKey::new("department_id", EntityKind::Department, "OFFERS"),
        ForeignKey::new("specialty_id", EntityKind::Specialty, "INCLUDES_COURSE"),
    ],
    partitioned: false,
};

pub static LECTURE: EntitySchema = EntitySchema {
    kind: EntityKind::Lecture,
    table: "lecture",
    columns: &[
        Column::required("id", ColumnType::Integer),
        Column::required("name", ColumnType::Text),
        Column::required("course_id", ColumnType::Integer),
    ],
    foreign_keys: &[ForeignKey::new(
        "course_id",
        EntityKind::Course,
        "HAS_LECTURE",
    )],
    partitioned: false,
};

pub static MATERIAL: EntitySchema = EntitySchema {
    kind: EntityKind::Material,
    table: "material",
    columns: &[
        Column::required("id", ColumnType::Integer),
        Column::required("name", ColumnType::Text),
        Column::required("lecture_id", ColumnType::Integer),
    ],
    foreign_keys: &[ForeignKey::new(
        "lecture_id",
        EntityKind::Lecture,
        "HAS_MATERIAL",
    )],
    partitioned: false,
};

// =============================================================================
// Facts
// =============================================================================

pub static SCHEDULE: EntitySchema = EntitySchema {
    kind: EntityKind::Schedule,
    table: "schedule",
    columns: &[
        Column::required("id", ColumnType::Integer),
        Column::required("date", ColumnType::Timestamp),
        Column::required("lecture_id", ColumnType::Integer),
        Column::required("group_id", ColumnType::Integer),
        Column::new("semester", ColumnType::Text).derived(),
    ],
    foreign_keys: &[
        ForeignKey::new("lecture_id", EntityKind::Lecture, "SCHEDULED_AT"),
        ForeignKey::new("group_id", EntityKind::Group, "FOR_GROUP").pointing_up(),
    ],
    partitioned: false,
};

pub static STUDENT: EntitySchema = EntitySchema {
    kind: EntityKind::Student,
    table: "students",
    columns: &[
        Column::required("id", ColumnType::Integer),
        Column::required("name", ColumnType::Text),
        Column::new("age", ColumnType::Integer),
        Column::new("mail", ColumnType::Text),
        Column::required("group_id", ColumnType::Integer),
    ],
    foreign_keys: &[ForeignKey::new(
        "group_id",
        EntityKind::Group,
        "HAS_STUDENT",
    )],
    partitioned: false,
};

pub static ATTENDANCE: EntitySchema = EntitySchema {
    kind: EntityKind::Attendance,
    table: "attendance",
    columns: &[
        Column::required("id", ColumnType::Integer),
        Column::required("student_id", ColumnType::Integer),
        Column::required("schedule_id", ColumnType::Integer),
        Column::required("attended", ColumnType::Boolean),
        Column::required("semester", ColumnType::Text).derived(),
    ],
    foreign_keys: &[
        ForeignKey::new("student_id", EntityKind::Student, "HAS_ATTENDANCE"),
        ForeignKey::new("schedule_id", EntityKind::Schedule, "FOR_SCHEDULE").pointing_up(),
    ],
    partitioned: true,
};

/// Every entity, parents before children. This is the sync order.
pub static ALL_ENTITIES: &[&EntitySchema] = &[
    &UNIVERSITY,
    &INSTITUTE,
    &DEPARTMENT,
    &SPECIALTY,
    &GROUP,
    &COURSE,
    &LECTURE,
    &MATERIAL,
    &SCHEDULE,
    &STUDENT,
    &ATTENDANCE,
];

/// Look up the schema for an entity kind
pub fn get_entity(kind: EntityKind) -> &'static EntitySchema {
    ALL_ENTITIES
        .iter()
        .copied()
        .find(|e| e.kind == kind)
        .unwrap_or_else(|| unreachable!("every EntityKind has a schema"))
}

/// Every relationship type in the mirror
pub fn relationship_types() -> Vec<&'static str> {
    ALL_ENTITIES
        .iter()
        .flat_map(|e| e.foreign_keys.iter().map(|fk| fk.relationship))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_relationship_catalog_is_complete() {
        let rels: HashSet<_> = relationship_types().into_iter().collect();
        let expected: HashSet<_> = [
            "HAS_INSTITUTE",
            "HAS_DEPARTMENT",
            "HAS_SPECIALTY",
            "HAS_GROUP",
            "OFFERS",
            "INCLUDES_COURSE",
            "HAS_LECTURE",
            "HAS_MATERIAL",
            "SCHEDULED_AT",
            "FOR_GROUP",
            "HAS_STUDENT",
            "HAS_ATTENDANCE",
            "FOR_SCHEDULE",
        ]
        .into_iter()
        .collect();
        assert_eq!(rels, expected);
    }

    #[test]
    fn test_course_has_two_parents() {
        assert_eq!(
            COURSE.dependencies(),
            [EntityKind::Department, EntityKind::Specialty]
                .into_iter()
                .collect()
        );
    }

    #[test]
    fn test_kind_round_trips_through_label() {
        for entity in ALL_ENTITIES {
            let parsed: EntityKind = entity.kind.label().parse().unwrap();
            assert_eq!(parsed, entity.kind);
            assert_eq!(get_entity(parsed).table, entity.table);
        }
        assert!("Dormitory".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_property_columns_skip_foreign_keys() {
        let names: Vec<_> = SCHEDULE.property_columns().map(|c| c.name).collect();
        assert_eq!(names, vec!["id", "date", "semester"]);

        let inserted: Vec<_> = ATTENDANCE.insert_columns().map(|c| c.name).collect();
        assert!(!inserted.contains(&"semester"));
    }
}
