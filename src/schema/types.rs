use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// The eleven row kinds of the academic hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    University,
    Institute,
    Department,
    Specialty,
    Group,
    Course,
    Lecture,
    Material,
    Schedule,
    Student,
    Attendance,
}

impl EntityKind {
    /// Node label used in the graph mirror
    pub const fn label(self) -> &'static str {
        match self {
            EntityKind::University => "University",
            EntityKind::Institute => "Institute",
            EntityKind::Department => "Department",
            EntityKind::Specialty => "Specialty",
            EntityKind::Group => "Group",
            EntityKind::Course => "Course",
            EntityKind::Lecture => "Lecture",
            EntityKind::Material => "Material",
            EntityKind::Schedule => "Schedule",
            EntityKind::Student => "Student",
            EntityKind::Attendance => "Attendance",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        super::tables::ALL_ENTITIES
            .iter()
            .map(|e| e.kind)
            .find(|k| k.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown entity type: {}", s))
    }
}

/// Column data type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnType {
    Integer,
    Text,
    Boolean,
    /// Date and time of day, stored as `YYYY-MM-DD HH:MM:SS`
    Timestamp,
}

impl ColumnType {
    pub const fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Integer | ColumnType::Boolean => "INTEGER",
            ColumnType::Text | ColumnType::Timestamp => "TEXT",
        }
    }
}

/// Column definition
#[derive(Debug, Clone)]
pub struct Column {
    pub name: &'static str,
    pub col_type: ColumnType,
    pub nullable: bool,
    /// Filled in by the store rather than the caller (e.g. `semester`)
    pub derived: bool,
}

impl Column {
    /// Create an optional (nullable) column
    pub const fn new(name: &'static str, col_type: ColumnType) -> Self {
        Self {
            name,
            col_type,
            nullable: true,
            derived: false,
        }
    }

    /// Create a required (non-nullable) column
    pub const fn required(name: &'static str, col_type: ColumnType) -> Self {
        Self {
            name,
            col_type,
            nullable: false,
            derived: false,
        }
    }

    /// Mark the column as computed by the store
    pub const fn derived(self) -> Self {
        Self {
            derived: true,
            ..self
        }
    }
}

/// Which way a mirrored relationship points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDirection {
    /// `(parent)-[REL]->(child)`
    FromParent,
    /// `(child)-[REL]->(parent)`
    ToParent,
}

/// Foreign key reference, mirrored as one typed edge
#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references: EntityKind,
    pub relationship: &'static str,
    pub direction: EdgeDirection,
}

impl ForeignKey {
    pub const fn new(
        column: &'static str,
        references: EntityKind,
        relationship: &'static str,
    ) -> Self {
        Self {
            column,
            references,
            relationship,
            direction: EdgeDirection::FromParent,
        }
    }

    /// Relationship drawn from the child towards its parent
    pub const fn pointing_up(self) -> Self {
        Self {
            direction: EdgeDirection::ToParent,
            ..self
        }
    }
}

/// Entity schema definition
#[derive(Debug, Clone)]
pub struct EntitySchema {
    pub kind: EntityKind,
    /// Relational table (or view, for partitioned entities)
    pub table: &'static str,
    pub columns: &'static [Column],
    pub foreign_keys: &'static [ForeignKey],
    /// Rows live in per-semester partitions behind a view
    pub partitioned: bool,
}

impl EntitySchema {
    /// Get all entity kinds this entity depends on (FK parents)
    pub fn dependencies(&self) -> HashSet<EntityKind> {
        self.foreign_keys.iter().map(|fk| fk.references).collect()
    }

    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }

    /// Scalar columns that become node properties
    pub fn property_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns
            .iter()
            .filter(move |c| self.foreign_key(c.name).is_none())
    }

    /// Columns a caller supplies on insert
    pub fn insert_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.derived)
    }
}
