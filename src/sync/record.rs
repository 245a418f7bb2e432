//! Turning relational rows into graph nodes

use rusqlite::Row;
use serde_json::Value;

use crate::error::{MirrorError, MirrorResult};
use crate::graph::NodeSpec;
use crate::schema::{parse_stored_date, ColumnType, EntitySchema};
use crate::store::facts::value_matches;
use crate::store::SqlValue;

/// Build the node for one row selected with `schema.columns`, in order.
///
/// Scalar columns become properties, every foreign key becomes an edge onto
/// its parent. Shape problems are reported as `MalformedRow`.
pub fn node_from_row(schema: &EntitySchema, row: &Row<'_>) -> MirrorResult<NodeSpec> {
    let values = read_values(schema, row)?;
    node_from_values(schema, &values)
}

fn read_values(schema: &EntitySchema, row: &Row<'_>) -> MirrorResult<Vec<SqlValue>> {
    let mut values = Vec::with_capacity(schema.columns.len());

    for (idx, col) in schema.columns.iter().enumerate() {
        let value = SqlValue::from_ref(row.get_ref(idx)?).ok_or_else(|| {
            MirrorError::malformed(
                schema.kind,
                None,
                format!("column {} holds an unsupported value", col.name),
            )
        })?;
        values.push(value);
    }

    Ok(values)
}

/// Build a node from column values given in `schema.columns` order
pub fn node_from_values(schema: &EntitySchema, values: &[SqlValue]) -> MirrorResult<NodeSpec> {
    let lookup = |name: &str| {
        schema
            .columns
            .iter()
            .position(|c| c.name == name)
            .and_then(|idx| values.get(idx))
    };

    let id = lookup("id")
        .and_then(SqlValue::as_i64)
        .ok_or_else(|| MirrorError::malformed(schema.kind, None, "row has no integer id"))?;
    let malformed = |reason: String| MirrorError::malformed(schema.kind, Some(id), reason);

    let mut node = NodeSpec::new(schema.kind, id);

    for fk in schema.foreign_keys {
        let parent_id = match lookup(fk.column) {
            Some(SqlValue::Integer(parent_id)) => *parent_id,
            Some(SqlValue::Null) | None => {
                return Err(malformed(format!("{} is NULL", fk.column)));
            }
            Some(other) => {
                return Err(malformed(format!("{} is not an id: {:?}", fk.column, other)));
            }
        };
        node = node.edge(fk.relationship, fk.references, parent_id, fk.direction);
    }

    for col in schema.property_columns().filter(|c| c.name != "id") {
        let value = lookup(col.name).unwrap_or(&SqlValue::Null);

        let empty = value.is_null() || value.as_str().is_some_and(|s| s.trim().is_empty());
        if !col.nullable && empty {
            return Err(malformed(format!("required {} is empty", col.name)));
        }
        if !value_matches(col.col_type, value) {
            return Err(malformed(format!(
                "{} is not a valid {:?}: {:?}",
                col.name, col.col_type, value
            )));
        }

        node = node.property(col.name, property_value(col.col_type, value));
    }

    Ok(node)
}

fn property_value(col_type: ColumnType, value: &SqlValue) -> Value {
    match (col_type, value) {
        (ColumnType::Boolean, SqlValue::Integer(i)) => Value::Bool(*i != 0),
        // Mirrored as a calendar date
        (ColumnType::Timestamp, SqlValue::Text(s)) => parse_stored_date(s)
            .map(|d| Value::from(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),
        _ => value.to_json(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tables::{ATTENDANCE, COURSE, SCHEDULE, STUDENT};
    use crate::schema::{EdgeDirection, EntityKind};

    #[test]
    fn test_course_has_two_parent_edges() {
        let values = vec![
            SqlValue::Integer(3),
            SqlValue::from("Statics"),
            SqlValue::Integer(1),
            SqlValue::Integer(2),
        ];
        let node = node_from_values(&COURSE, &values).unwrap();

        assert_eq!(node.kind, EntityKind::Course);
        assert_eq!(node.properties["name"], "Statics");
        assert_eq!(node.edges.len(), 2);
        assert_eq!(node.edges[0].relationship, "OFFERS");
        assert_eq!(node.edges[0].other, EntityKind::Department);
        assert_eq!(node.edges[1].relationship, "INCLUDES_COURSE");
        assert_eq!(node.edges[1].other_id, 2);
        assert!(!node.properties.contains_key("department_id"));
    }

    #[test]
    fn test_schedule_date_and_direction() {
        let values = vec![
            SqlValue::Integer(7),
            SqlValue::from("2023-03-14 10:45:00"),
            SqlValue::Integer(1),
            SqlValue::Integer(4),
            SqlValue::from("2023_spring"),
        ];
        let node = node_from_values(&SCHEDULE, &values).unwrap();

        assert_eq!(node.properties["date"], "2023-03-14");
        assert_eq!(node.properties["semester"], "2023_spring");
        let for_group = node
            .edges
            .iter()
            .find(|e| e.relationship == "FOR_GROUP")
            .unwrap();
        assert_eq!(for_group.direction, EdgeDirection::ToParent);
    }

    #[test]
    fn test_attended_is_boolean() {
        let values = vec![
            SqlValue::Integer(1),
            SqlValue::Integer(10),
            SqlValue::Integer(7),
            SqlValue::Integer(1),
            SqlValue::from("2023_spring"),
        ];
        let node = node_from_values(&ATTENDANCE, &values).unwrap();
        assert_eq!(node.properties["attended"], Value::Bool(true));
    }

    #[test]
    fn test_malformed_rows() {
        // NULL parent reference
        let values = vec![
            SqlValue::Integer(5),
            SqlValue::from("stud12345"),
            SqlValue::Null,
            SqlValue::Null,
            SqlValue::Null,
        ];
        let err = node_from_values(&STUDENT, &values).unwrap_err();
        assert!(err.is_row_local());
        assert!(err.to_string().contains("group_id is NULL"));

        // Empty required name
        let values = vec![
            SqlValue::Integer(5),
            SqlValue::from("  "),
            SqlValue::Null,
            SqlValue::Null,
            SqlValue::Integer(1),
        ];
        assert!(node_from_values(&STUDENT, &values).unwrap_err().is_row_local());

        // Unparseable timestamp
        let values = vec![
            SqlValue::Integer(7),
            SqlValue::from("someday"),
            SqlValue::Integer(1),
            SqlValue::Integer(4),
            SqlValue::Null,
        ];
        assert!(node_from_values(&SCHEDULE, &values).unwrap_err().is_row_local());
    }
}
