use chrono::NaiveDateTime;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, info};

use super::schema_gen::{
    generate_create_table, generate_indexes, generate_partition_table, generate_partition_view,
    generate_semester_triggers, ATTENDANCE_KEYS_DDL, PARTITION_CATALOG_DDL,
};
use super::value::SqlValue;
use crate::error::{is_foreign_key_violation, MirrorError, MirrorResult};
use crate::schema::tables::{ATTENDANCE, SCHEDULE, STUDENT};
use crate::schema::{
    get_entity, parse_stored_date, ColumnType, EntityKind, EntitySchema, Semester, ALL_ENTITIES,
};

/// Format used for every stored timestamp
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The relational source of truth: the entity hierarchy plus
/// semester-partitioned attendance facts.
pub struct FactStore {
    conn: Connection,
}

impl FactStore {
    /// Open (or create) the fact store at `db_path` and make sure the schema exists
    pub fn open(db_path: &Path) -> MirrorResult<Self> {
        let conn = Connection::open(db_path).map_err(|source| MirrorError::Connection {
            store: "fact",
            path: db_path.display().to_string(),
            source,
        })?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> MirrorResult<Self> {
        let conn = Connection::open_in_memory().map_err(|source| MirrorError::Connection {
            store: "fact",
            path: ":memory:".to_string(),
            source,
        })?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> MirrorResult<Self> {
        // Enable foreign keys and optimize for bulk insert
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;",
        )?;
        register_semester_function(&conn)?;

        let store = Self { conn };
        store.create_schema()?;
        Ok(store)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create every table, index, trigger and the attendance view if missing
    pub fn create_schema(&self) -> MirrorResult<()> {
        for schema in ALL_ENTITIES.iter().filter(|s| !s.partitioned) {
            self.conn.execute_batch(&generate_create_table(schema))?;
            for index_sql in generate_indexes(schema.table, schema) {
                self.conn.execute_batch(&index_sql)?;
            }
        }

        for trigger in generate_semester_triggers(&SCHEDULE) {
            self.conn.execute_batch(&trigger)?;
        }

        self.conn.execute_batch(PARTITION_CATALOG_DDL)?;
        self.conn.execute_batch(ATTENDANCE_KEYS_DDL)?;

        let view_exists: bool = self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'view' AND name = ?1)",
            [ATTENDANCE.table],
            |row| row.get(0),
        )?;
        if !view_exists {
            self.rebuild_partition_view()?;
        }

        Ok(())
    }

    /// Drop the whole dataset, partitions included, and recreate an empty schema
    pub fn reset(&self) -> MirrorResult<()> {
        let objects: Vec<(String, String)> = {
            let mut stmt = self.conn.prepare(
                "SELECT type, name FROM sqlite_master
                 WHERE type IN ('view', 'table') AND name NOT LIKE 'sqlite_%'",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<Result<_, _>>()?
        };

        // FK checks would make DROP TABLE order-sensitive
        self.conn.execute_batch("PRAGMA foreign_keys = OFF")?;
        let dropped = self.with_savepoint("reset_dataset", |conn| {
            for (kind, name) in objects.iter().filter(|(k, _)| k == "view") {
                conn.execute_batch(&format!("DROP {} IF EXISTS {}", kind.to_uppercase(), name))?;
            }
            for (kind, name) in objects.iter().filter(|(k, _)| k == "table") {
                conn.execute_batch(&format!("DROP {} IF EXISTS {}", kind.to_uppercase(), name))?;
            }
            Ok(objects.len())
        });
        self.conn.execute_batch("PRAGMA foreign_keys = ON")?;

        let dropped = dropped?;
        info!(objects = dropped, "fact store reset");
        self.create_schema()
    }

    /// Create the attendance partition for `semester` if it does not exist yet.
    ///
    /// Returns whether a partition was created.
    pub fn ensure_semester_partition(&self, semester: &Semester) -> MirrorResult<bool> {
        if self.has_partition(semester)? {
            return Ok(false);
        }

        self.with_savepoint("ensure_partition", |conn| {
            let table = semester.partition_table();
            conn.execute_batch(&generate_partition_table(&ATTENDANCE, semester))?;
            for index_sql in generate_indexes(&table, &ATTENDANCE) {
                conn.execute_batch(&index_sql)?;
            }
            conn.execute(
                "INSERT INTO attendance_partitions (semester, table_name) VALUES (?1, ?2)",
                params![semester.label(), table],
            )?;
            Ok(())
        })?;
        self.rebuild_partition_view()?;

        debug!(semester = %semester, "attendance partition created");
        Ok(true)
    }

    pub fn has_partition(&self, semester: &Semester) -> MirrorResult<bool> {
        Ok(self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM attendance_partitions WHERE semester = ?1)",
            [semester.label()],
            |row| row.get(0),
        )?)
    }

    /// Every semester with an attendance partition, oldest first
    pub fn partitions(&self) -> MirrorResult<Vec<Semester>> {
        let mut stmt = self
            .conn
            .prepare("SELECT semester FROM attendance_partitions")?;
        let labels = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut semesters = Vec::new();
        for label in labels {
            semesters.push(label?.parse()?);
        }
        semesters.sort();
        Ok(semesters)
    }

    fn rebuild_partition_view(&self) -> MirrorResult<()> {
        let semesters = self.partitions()?;
        self.conn.execute_batch(&format!(
            "DROP VIEW IF EXISTS {};\n{}",
            ATTENDANCE.table,
            generate_partition_view(&ATTENDANCE, &semesters)
        ))?;
        Ok(())
    }

    /// Insert a row into an unpartitioned entity table and return its id.
    ///
    /// Omitted columns are left to their defaults; an omitted `id` is assigned by the store.
    pub fn insert_entity(
        &self,
        schema: &EntitySchema,
        values: &[(&str, SqlValue)],
    ) -> MirrorResult<i64> {
        if schema.partitioned {
            return Err(MirrorError::malformed(
                schema.kind,
                None,
                "partitioned rows must go through their dedicated insert",
            ));
        }

        let columns: Vec<&str> = values.iter().map(|(c, _)| *c).collect();
        if let Some(column) = columns
            .iter()
            .find(|c| !schema.insert_columns().any(|col| col.name == **c))
        {
            return Err(MirrorError::malformed(
                schema.kind,
                None,
                format!("{} is not a column callers may supply", column),
            ));
        }

        let placeholders: Vec<&str> = columns.iter().map(|_| "?").collect();
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            schema.table,
            columns.join(", "),
            placeholders.join(", ")
        );

        let mut stmt = self.conn.prepare_cached(&insert_sql)?;
        for (idx, (_, value)) in values.iter().enumerate() {
            value.bind_to(idx + 1, &mut stmt)?;
        }

        match stmt.raw_execute() {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(err) if is_foreign_key_violation(&err) => {
                let explicit_id = values
                    .iter()
                    .find(|(c, _)| *c == "id")
                    .and_then(|(_, v)| v.as_i64());
                Err(self.diagnose_missing_parent(schema, explicit_id, values, err)?)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Work out which parent an FK failure refers to
    fn diagnose_missing_parent(
        &self,
        schema: &EntitySchema,
        id: Option<i64>,
        values: &[(&str, SqlValue)],
        err: rusqlite::Error,
    ) -> MirrorResult<MirrorError> {
        for fk in schema.foreign_keys {
            let Some(parent_id) = values
                .iter()
                .find(|(c, _)| *c == fk.column)
                .and_then(|(_, v)| v.as_i64())
            else {
                continue;
            };

            if !self.row_exists(get_entity(fk.references), parent_id)? {
                return Ok(MirrorError::ReferentialViolation {
                    entity: schema.kind,
                    id,
                    parent: fk.references,
                    parent_id,
                    relationship: fk.relationship,
                });
            }
        }

        Ok(err.into())
    }

    pub fn row_exists(&self, schema: &EntitySchema, id: i64) -> MirrorResult<bool> {
        Ok(self.conn.query_row(
            &format!("SELECT EXISTS (SELECT 1 FROM {} WHERE id = ?1)", schema.table),
            [id],
            |row| row.get(0),
        )?)
    }

    /// Insert a schedule occurrence. Its semester is filled in by trigger.
    pub fn insert_schedule(
        &self,
        date: NaiveDateTime,
        lecture_id: i64,
        group_id: i64,
    ) -> MirrorResult<i64> {
        self.insert_entity(
            &SCHEDULE,
            &[
                ("date", date.format(TIMESTAMP_FORMAT).to_string().into()),
                ("lecture_id", lecture_id.into()),
                ("group_id", group_id.into()),
            ],
        )
    }

    /// Move a schedule to a new date; the trigger recomputes its semester.
    ///
    /// Attendance rows of the schedule follow it into the partition of the
    /// new semester, created if needed. Returns how many rows moved.
    pub fn reschedule(&self, schedule_id: i64, date: NaiveDateTime) -> MirrorResult<u64> {
        self.with_savepoint("reschedule", |conn| {
            let updated = conn.execute(
                "UPDATE schedule SET date = ?1 WHERE id = ?2",
                params![date.format(TIMESTAMP_FORMAT).to_string(), schedule_id],
            )?;
            if updated == 0 {
                return Err(MirrorError::ScheduleNotFound(schedule_id));
            }

            let label = self
                .schedule_semester(schedule_id)?
                .ok_or(MirrorError::ScheduleNotFound(schedule_id))?;
            let target: Semester = label.parse()?;

            let mut moved = 0;
            for source in self.partitions()?.into_iter().filter(|s| *s != target) {
                moved += self.move_attendance(schedule_id, &source, &target)?;
            }
            if moved > 0 {
                debug!(schedule_id, moved, semester = %target, "attendance moved with its schedule");
            }
            Ok(moved)
        })
    }

    /// Move one schedule's attendance rows from `source` into `target`,
    /// re-deriving their semester from the schedule date.
    fn move_attendance(
        &self,
        schedule_id: i64,
        source: &Semester,
        target: &Semester,
    ) -> MirrorResult<u64> {
        let from = source.partition_table();
        let pending: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE schedule_id = ?1", from),
            [schedule_id],
            |row| row.get(0),
        )?;
        if pending == 0 {
            return Ok(0);
        }

        self.ensure_semester_partition(target)?;
        let to = target.partition_table();
        self.conn.execute(
            &format!(
                "INSERT INTO {to} (id, student_id, schedule_id, attended, semester)
                 SELECT a.id, a.student_id, a.schedule_id, a.attended, semester_of(s.date)
                 FROM {from} a JOIN schedule s ON s.id = a.schedule_id
                 WHERE a.schedule_id = ?1"
            ),
            [schedule_id],
        )?;
        self.conn.execute(
            &format!("DELETE FROM {} WHERE schedule_id = ?1", from),
            [schedule_id],
        )?;
        self.conn.execute(
            &format!(
                "UPDATE attendance_keys SET semester = ?1
                 WHERE id IN (SELECT id FROM {} WHERE schedule_id = ?2)",
                to
            ),
            params![target.label(), schedule_id],
        )?;

        Ok(pending as u64)
    }

    /// The stored semester label of a schedule
    pub fn schedule_semester(&self, schedule_id: i64) -> MirrorResult<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT semester FROM schedule WHERE id = ?1",
                [schedule_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten())
    }

    pub fn insert_student(
        &self,
        name: &str,
        age: Option<i64>,
        mail: Option<&str>,
        group_id: i64,
    ) -> MirrorResult<i64> {
        self.insert_entity(
            &STUDENT,
            &[
                ("name", name.into()),
                ("age", age.into()),
                ("mail", mail.into()),
                ("group_id", group_id.into()),
            ],
        )
    }

    /// Record one attendance fact.
    ///
    /// The semester is derived inside the store from the referenced schedule's
    /// date, never supplied by the caller. Fails with `ScheduleNotFound` when
    /// the schedule does not exist and `PartitionMissing` when its semester has
    /// no partition yet.
    pub fn insert_attendance(
        &self,
        student_id: i64,
        schedule_id: i64,
        attended: bool,
    ) -> MirrorResult<i64> {
        let label: String = self
            .conn
            .query_row(
                "SELECT semester_of(date) FROM schedule WHERE id = ?1",
                [schedule_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten()
            .ok_or(MirrorError::ScheduleNotFound(schedule_id))?;
        let semester: Semester = label.parse()?;

        if !self.has_partition(&semester)? {
            return Err(MirrorError::PartitionMissing(semester));
        }

        self.with_savepoint("attendance_insert", |conn| {
            conn.execute(
                "INSERT INTO attendance_keys (semester) VALUES (?1)",
                [&label],
            )?;
            let id = conn.last_insert_rowid();

            let insert_sql = format!(
                "INSERT INTO {} (id, student_id, schedule_id, attended, semester)
                 SELECT ?1, ?2, ?3, ?4, semester_of(date) FROM schedule WHERE id = ?3",
                semester.partition_table()
            );
            match conn.execute(&insert_sql, params![id, student_id, schedule_id, attended]) {
                Ok(_) => Ok(id),
                Err(err) if is_foreign_key_violation(&err) => Err(MirrorError::ReferentialViolation {
                    entity: EntityKind::Attendance,
                    id: Some(id),
                    parent: EntityKind::Student,
                    parent_id: student_id,
                    relationship: "HAS_ATTENDANCE",
                }),
                Err(err) => Err(err.into()),
            }
        })
    }

    /// Number of rows of an entity
    pub fn count(&self, kind: EntityKind) -> MirrorResult<u64> {
        let table = get_entity(kind).table;
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }

    /// Ids of an entity in ascending order
    pub fn ids(&self, kind: EntityKind) -> MirrorResult<Vec<i64>> {
        let table = get_entity(kind).table;
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT id FROM {} ORDER BY id", table))?;
        let ids = stmt.query_map([], |row| row.get(0))?;
        Ok(ids.collect::<Result<_, _>>()?)
    }

    /// Schedules of one group with their timestamps
    pub fn schedules_for_group(&self, group_id: i64) -> MirrorResult<Vec<(i64, NaiveDateTime)>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id, date FROM schedule WHERE group_id = ?1 ORDER BY id")?;
        let mut rows = stmt.query([group_id])?;

        let mut schedules = Vec::new();
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let raw: String = row.get(1)?;
            let date = NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
                .map_err(|e| MirrorError::malformed(EntityKind::Schedule, Some(id), e.to_string()))?;
            schedules.push((id, date));
        }
        Ok(schedules)
    }

    /// Stream every row of an entity, ordered by id, through `f`.
    ///
    /// Holds one read cursor for the whole pass.
    pub fn for_each_row<F>(&self, schema: &EntitySchema, mut f: F) -> MirrorResult<u64>
    where
        F: FnMut(&Row<'_>) -> MirrorResult<()>,
    {
        let columns: Vec<&str> = schema.columns.iter().map(|c| c.name).collect();
        let sql = format!(
            "SELECT {} FROM {} ORDER BY id",
            columns.join(", "),
            schema.table
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut count = 0;

        while let Some(row) = rows.next()? {
            f(row)?;
            count += 1;
        }

        Ok(count)
    }

    /// Run `f` inside a named savepoint, rolling back if it fails
    fn with_savepoint<T>(
        &self,
        name: &str,
        f: impl FnOnce(&Connection) -> MirrorResult<T>,
    ) -> MirrorResult<T> {
        self.conn.execute_batch(&format!("SAVEPOINT {}", name))?;

        match f(&self.conn) {
            Ok(value) => {
                self.conn.execute_batch(&format!("RELEASE {}", name))?;
                Ok(value)
            }
            Err(err) => {
                self.conn
                    .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))?;
                Err(err)
            }
        }
    }
}

/// Register `semester_of(timestamp)` on a connection
fn register_semester_function(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "semester_of",
        1,
        FunctionFlags::SQLITE_UTF8
            | FunctionFlags::SQLITE_DETERMINISTIC
            | FunctionFlags::SQLITE_INNOCUOUS,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            match value {
                None => Ok(None),
                Some(raw) => parse_stored_date(&raw)
                    .map(|date| Some(Semester::of(date).label()))
                    .ok_or_else(|| {
                        rusqlite::Error::UserFunctionError(
                            format!("not a timestamp: {}", raw).into(),
                        )
                    }),
            }
        },
    )
}

/// Check that a stored value fits its declared column type
pub fn value_matches(col_type: ColumnType, value: &SqlValue) -> bool {
    match (col_type, value) {
        (_, SqlValue::Null) => true,
        (ColumnType::Integer, SqlValue::Integer(_)) => true,
        (ColumnType::Boolean, SqlValue::Integer(i)) => *i == 0 || *i == 1,
        (ColumnType::Text, SqlValue::Text(_)) => true,
        (ColumnType::Timestamp, SqlValue::Text(s)) => parse_stored_date(s).is_some(),
        _ => false,
    }
}
