use crate::schema::{get_entity, EntitySchema, Semester};

/// Catalog of attendance partitions that exist
pub const PARTITION_CATALOG_DDL: &str = "CREATE TABLE IF NOT EXISTS attendance_partitions (
    semester TEXT PRIMARY KEY,
    table_name TEXT NOT NULL UNIQUE
)";

/// Allocates attendance ids that are unique across partitions
pub const ATTENDANCE_KEYS_DDL: &str = "CREATE TABLE IF NOT EXISTS attendance_keys (
    id INTEGER PRIMARY KEY,
    semester TEXT NOT NULL REFERENCES attendance_partitions(semester)
)";

fn column_definitions(schema: &EntitySchema) -> Vec<String> {
    let mut columns = Vec::new();

    for col in schema.columns {
        let pk = col.name == "id";
        let null_constraint = if !col.nullable && !pk { " NOT NULL" } else { "" };
        let pk = if pk { " PRIMARY KEY" } else { "" };

        columns.push(format!(
            "    {} {}{}{}",
            col.name,
            col.col_type.sql_type(),
            pk,
            null_constraint
        ));
    }

    columns
}

fn foreign_key_clauses(schema: &EntitySchema) -> Vec<String> {
    schema
        .foreign_keys
        .iter()
        .map(|fk| {
            format!(
                "    FOREIGN KEY ({}) REFERENCES {}(id)",
                fk.column,
                get_entity(fk.references).table
            )
        })
        .collect()
}

/// Generate CREATE TABLE SQL for an unpartitioned entity
pub fn generate_create_table(schema: &EntitySchema) -> String {
    generate_table(schema.table, schema, None)
}

/// Generate CREATE TABLE SQL for one semester partition of a partitioned entity
pub fn generate_partition_table(schema: &EntitySchema, semester: &Semester) -> String {
    let label = semester.label();
    let check = format!("    CHECK (semester = '{}')", label);
    generate_table(&semester.partition_table(), schema, Some(check))
}

fn generate_table(name: &str, schema: &EntitySchema, check: Option<String>) -> String {
    let mut sql = format!("CREATE TABLE IF NOT EXISTS {} (\n", name);
    let mut columns = column_definitions(schema);
    columns.extend(check);
    columns.extend(foreign_key_clauses(schema));

    sql.push_str(&columns.join(",\n"));
    sql.push_str("\n)");

    sql
}

/// Generate CREATE INDEX statements for foreign key columns
pub fn generate_indexes(table: &str, schema: &EntitySchema) -> Vec<String> {
    schema
        .foreign_keys
        .iter()
        .map(|fk| {
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {}({})",
                table, fk.column, table, fk.column
            )
        })
        .collect()
}

/// Generate the view that unions every partition of a partitioned entity
pub fn generate_partition_view(schema: &EntitySchema, semesters: &[Semester]) -> String {
    let names: Vec<&str> = schema.columns.iter().map(|c| c.name).collect();

    let body = if semesters.is_empty() {
        let nulls: Vec<String> = schema
            .columns
            .iter()
            .map(|c| format!("CAST(NULL AS {}) AS {}", c.col_type.sql_type(), c.name))
            .collect();
        format!("SELECT {} WHERE 0", nulls.join(", "))
    } else {
        semesters
            .iter()
            .map(|s| format!("SELECT {} FROM {}", names.join(", "), s.partition_table()))
            .collect::<Vec<_>>()
            .join("\nUNION ALL\n")
    };

    format!("CREATE VIEW {} AS\n{}", schema.table, body)
}

/// Triggers that keep a derived `semester` column in step with `date`.
///
/// Both call `semester_of`, which the store registers on its connection.
pub fn generate_semester_triggers(schema: &EntitySchema) -> Vec<String> {
    ["INSERT", "UPDATE OF date"]
        .iter()
        .map(|event| {
            let suffix = if *event == "INSERT" { "insert" } else { "update" };
            format!(
                "CREATE TRIGGER IF NOT EXISTS {table}_semester_on_{suffix}
AFTER {event} ON {table}
FOR EACH ROW
BEGIN
    UPDATE {table} SET semester = semester_of(NEW.date) WHERE id = NEW.id;
END",
                table = schema.table,
                suffix = suffix,
                event = event,
            )
        })
        .collect()
}
