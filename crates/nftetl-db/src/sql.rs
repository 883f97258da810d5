//! Statement rendering
//!
//! Identifiers are validated against `[A-Za-z_][A-Za-z0-9_]*` and always
//! double-quoted. Values are never written into statement text: each one
//! becomes a `$n` placeholder, except SQL `NULL`, which is rendered as the
//! keyword so the server infers the column type.

use crate::error::{DbError, DbResult};
use crate::filter::{Condition, Direction, Filter, Operand, Operator, Select};
use crate::schema::{ColumnSpec, ColumnType};
use crate::value::{Row, SqlValue};

/// PostgreSQL truncates identifiers beyond this many bytes
const MAX_IDENTIFIER_LEN: usize = 63;

/// Statement text plus the values bound to its placeholders, in order
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Validate and double-quote an identifier
pub fn quote_ident(name: &str) -> DbResult<String> {
    let mut chars = name.chars();
    let valid_start = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_start || !valid_rest || name.len() > MAX_IDENTIFIER_LEN {
        return Err(DbError::InvalidIdentifier(name.to_string()));
    }

    Ok(format!("\"{}\"", name))
}

/// Collects bound values and hands out placeholders
#[derive(Default)]
struct Params {
    values: Vec<SqlValue>,
}

impl Params {
    fn push(&mut self, value: &SqlValue) -> String {
        if value.is_null() {
            return "NULL".to_string();
        }
        self.values.push(value.clone());
        format!("${}", self.values.len())
    }
}

fn column_definition(column: &ColumnSpec) -> DbResult<String> {
    let mut definition = format!("{} {}", quote_ident(&column.name)?, column.column_type);
    for constraint in &column.constraints {
        definition.push(' ');
        definition.push_str(&constraint.to_string());
    }
    Ok(definition)
}

pub fn create_table(table: &str, columns: &[ColumnSpec], if_not_exists: bool) -> DbResult<String> {
    if columns.is_empty() {
        return Err(DbError::Schema(format!("table '{}' needs at least one column", table)));
    }

    let definitions = columns.iter().map(column_definition).collect::<DbResult<Vec<_>>>()?;

    Ok(format!(
        "CREATE TABLE {}{} ({})",
        if if_not_exists { "IF NOT EXISTS " } else { "" },
        quote_ident(table)?,
        definitions.join(", ")
    ))
}

pub fn drop_table(table: &str, if_exists: bool) -> DbResult<String> {
    Ok(format!(
        "DROP TABLE {}{}",
        if if_exists { "IF EXISTS " } else { "" },
        quote_ident(table)?
    ))
}

pub fn add_column(table: &str, column: &ColumnSpec) -> DbResult<String> {
    Ok(format!("ALTER TABLE {} ADD COLUMN {}", quote_ident(table)?, column_definition(column)?))
}

pub fn drop_column(table: &str, column: &str) -> DbResult<String> {
    Ok(format!("ALTER TABLE {} DROP COLUMN {}", quote_ident(table)?, quote_ident(column)?))
}

pub fn alter_column(table: &str, column: &str, new_type: ColumnType) -> DbResult<String> {
    let column = quote_ident(column)?;
    let new_type = new_type.storage_type();
    Ok(format!(
        "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{}",
        quote_ident(table)?,
        column,
        new_type,
        column,
        new_type
    ))
}

/// `INSERT ... RETURNING "<key>"::bigint`
pub fn insert(table: &str, fields: &Row, returning: &str) -> DbResult<Statement> {
    let table = quote_ident(table)?;
    let returning = quote_ident(returning)?;

    if fields.is_empty() {
        return Ok(Statement {
            sql: format!("INSERT INTO {} DEFAULT VALUES RETURNING {}::bigint", table, returning),
            params: Vec::new(),
        });
    }

    let mut params = Params::default();
    let mut columns = Vec::with_capacity(fields.len());
    let mut placeholders = Vec::with_capacity(fields.len());

    for (column, value) in fields {
        columns.push(quote_ident(column)?);
        placeholders.push(params.push(value));
    }

    Ok(Statement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}::bigint",
            table,
            columns.join(", "),
            placeholders.join(", "),
            returning
        ),
        params: params.values,
    })
}

fn condition_sql(condition: &Condition, params: &mut Params) -> DbResult<String> {
    let column = quote_ident(&condition.column)?;

    match (&condition.operator, &condition.operand) {
        (Operator::In, Operand::List(values)) => {
            if values.is_empty() {
                return Ok("FALSE".to_string());
            }
            if values.iter().any(SqlValue::is_null) {
                return Err(DbError::InvalidValue(format!(
                    "IN list for '{}' cannot contain NULL",
                    condition.column
                )));
            }
            let placeholders: Vec<String> = values.iter().map(|v| params.push(v)).collect();
            Ok(format!("{} IN ({})", column, placeholders.join(", ")))
        },
        (Operator::In, Operand::Value(_)) => Err(DbError::InvalidValue(format!(
            "IN on '{}' requires a list operand",
            condition.column
        ))),
        (_, Operand::List(_)) => Err(DbError::InvalidValue(format!(
            "{} on '{}' requires a single value",
            condition.operator, condition.column
        ))),
        (Operator::Eq, Operand::Value(SqlValue::Null)) => Ok(format!("{} IS NULL", column)),
        (Operator::Ne, Operand::Value(SqlValue::Null)) => Ok(format!("{} IS NOT NULL", column)),
        (op, Operand::Value(SqlValue::Null)) => Err(DbError::InvalidValue(format!(
            "{} on '{}' cannot compare against NULL",
            op, condition.column
        ))),
        (op, Operand::Value(value)) => Ok(format!("{} {} {}", column, op, params.push(value))),
    }
}

fn where_clause(filter: &Filter, params: &mut Params) -> DbResult<String> {
    if filter.is_empty() {
        return Ok(String::new());
    }

    let conditions = filter
        .conditions
        .iter()
        .map(|c| condition_sql(c, params))
        .collect::<DbResult<Vec<_>>>()?;

    Ok(format!(" WHERE {}", conditions.join(" AND ")))
}

pub fn select(query: &Select) -> DbResult<Statement> {
    let mut params = Params::default();

    let columns = match &query.columns {
        Some(columns) if !columns.is_empty() => columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<DbResult<Vec<_>>>()?
            .join(", "),
        _ => "*".to_string(),
    };

    let mut sql = format!("SELECT {} FROM {}", columns, quote_ident(&query.table)?);
    sql.push_str(&where_clause(&query.filter, &mut params)?);

    if let Some(order_by) = &query.order_by {
        let direction = match order_by.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        sql.push_str(&format!(" ORDER BY {} {}", quote_ident(&order_by.column)?, direction));
    }

    if let Some(limit) = query.limit {
        let limit = i64::try_from(limit)
            .map_err(|_| DbError::InvalidValue(format!("limit {} is out of range", limit)))?;
        let placeholder = params.push(&SqlValue::Int(limit));
        sql.push_str(&format!(" LIMIT {}", placeholder));
    }

    Ok(Statement {
        sql,
        params: params.values,
    })
}

pub fn count(table: &str, filter: &Filter) -> DbResult<Statement> {
    let mut params = Params::default();
    let sql = format!(
        "SELECT COUNT(*) FROM {}{}",
        quote_ident(table)?,
        where_clause(filter, &mut params)?
    );
    Ok(Statement {
        sql,
        params: params.values,
    })
}

pub fn update(table: &str, filter: &Filter, fields: &Row) -> DbResult<Statement> {
    if fields.is_empty() {
        return Err(DbError::InvalidValue("update requires at least one field".to_string()));
    }

    let mut params = Params::default();
    let assignments = fields
        .iter()
        .map(|(column, value)| Ok(format!("{} = {}", quote_ident(column)?, params.push(value))))
        .collect::<DbResult<Vec<_>>>()?;

    let mut sql = format!("UPDATE {} SET {}", quote_ident(table)?, assignments.join(", "));
    sql.push_str(&where_clause(filter, &mut params)?);

    Ok(Statement {
        sql,
        params: params.values,
    })
}

pub fn delete(table: &str, filter: &Filter) -> DbResult<Statement> {
    let mut params = Params::default();
    let sql = format!("DELETE FROM {}{}", quote_ident(table)?, where_clause(filter, &mut params)?);
    Ok(Statement {
        sql,
        params: params.values,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::filter::OrderBy;
    use crate::schema::DefaultValue;
    use serde_json::json;

    fn row(pairs: &[(&str, SqlValue)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("opensea_collections").unwrap(), "\"opensea_collections\"");
        assert_eq!(quote_ident("_private2").unwrap(), "\"_private2\"");
        assert!(quote_ident("").is_err());
        assert!(quote_ident("1st").is_err());
        assert!(quote_ident("name\"; DROP TABLE x; --").is_err());
        assert!(quote_ident("owner name").is_err());
        assert!(quote_ident(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_create_table() {
        let columns = vec![
            ColumnSpec::new("id", ColumnType::BigSerial).primary_key(),
            ColumnSpec::new("name", ColumnType::Varchar(255)).not_null(),
            ColumnSpec::new("created_at", ColumnType::TimestampTz)
                .not_null()
                .default_value(DefaultValue::Now),
        ];

        assert_eq!(
            create_table("items", &columns, true).unwrap(),
            "CREATE TABLE IF NOT EXISTS \"items\" (\"id\" BIGSERIAL PRIMARY KEY, \
             \"name\" VARCHAR(255) NOT NULL, \"created_at\" TIMESTAMPTZ NOT NULL DEFAULT now())"
        );
        assert!(create_table("items", &columns, false).unwrap().starts_with("CREATE TABLE \"items\""));
        assert!(create_table("items", &[], false).is_err());
    }

    #[test]
    fn test_structural_statements() {
        assert_eq!(drop_table("items", false).unwrap(), "DROP TABLE \"items\"");
        assert_eq!(drop_table("items", true).unwrap(), "DROP TABLE IF EXISTS \"items\"");
        assert_eq!(
            add_column("items", &ColumnSpec::new("slug", ColumnType::Text)).unwrap(),
            "ALTER TABLE \"items\" ADD COLUMN \"slug\" TEXT"
        );
        assert_eq!(
            drop_column("items", "slug").unwrap(),
            "ALTER TABLE \"items\" DROP COLUMN \"slug\""
        );
        assert_eq!(
            alter_column("items", "rank", ColumnType::BigSerial).unwrap(),
            "ALTER TABLE \"items\" ALTER COLUMN \"rank\" TYPE BIGINT USING \"rank\"::BIGINT"
        );
    }

    #[test]
    fn test_insert_binds_values_and_inlines_null() {
        let fields = row(&[
            ("contracts", SqlValue::Json(json!([]))),
            ("description", SqlValue::Null),
            ("name", SqlValue::Text("Punks".to_string())),
        ]);

        let statement = insert("items", &fields, "id").unwrap();
        assert_eq!(
            statement.sql,
            "INSERT INTO \"items\" (\"contracts\", \"description\", \"name\") \
             VALUES ($1, NULL, $2) RETURNING \"id\"::bigint"
        );
        assert_eq!(
            statement.params,
            vec![SqlValue::Json(json!([])), SqlValue::Text("Punks".to_string())]
        );
    }

    #[test]
    fn test_insert_without_fields_uses_defaults() {
        let statement = insert("items", &Row::new(), "id").unwrap();
        assert_eq!(statement.sql, "INSERT INTO \"items\" DEFAULT VALUES RETURNING \"id\"::bigint");
        assert!(statement.params.is_empty());
    }

    #[test]
    fn test_values_never_reach_statement_text() {
        let hostile = "alice'; DROP TABLE items; --";
        let statement = Select::from("items")
            .filter(Filter::new().eq("owner", hostile).like("name", "%x%"))
            .prepare()
            .unwrap();

        assert!(!statement.sql().contains("DROP"));
        assert_eq!(statement.sql(), "SELECT * FROM \"items\" WHERE \"owner\" = $1 AND \"name\" LIKE $2");
        assert_eq!(statement.params()[0], SqlValue::Text(hostile.to_string()));
    }

    #[test]
    fn test_select_with_order_and_limit() {
        let query = Select::from("items")
            .columns(["id", "owner"])
            .filter(Filter::new().eq("owner", "alice"))
            .order_by(OrderBy::asc("created_at"))
            .limit(10);

        let statement = select(&query).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT \"id\", \"owner\" FROM \"items\" WHERE \"owner\" = $1 \
             ORDER BY \"created_at\" ASC LIMIT $2"
        );
        assert_eq!(statement.params, vec![SqlValue::from("alice"), SqlValue::Int(10)]);
    }

    #[test]
    fn test_select_rejects_bad_identifiers() {
        let query = Select::from("items").order_by(OrderBy::desc("created_at DESC; --"));
        assert!(matches!(select(&query), Err(DbError::InvalidIdentifier(_))));
    }

    #[test]
    fn test_null_comparisons() {
        let statement = count("items", &Filter::new().eq("owner", SqlValue::Null).ne("name", SqlValue::Null)).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT COUNT(*) FROM \"items\" WHERE \"owner\" IS NULL AND \"name\" IS NOT NULL"
        );
        assert!(statement.params.is_empty());

        assert!(count("items", &Filter::new().lt("id", SqlValue::Null)).is_err());
    }

    #[test]
    fn test_in_operator() {
        let statement = delete("items", &Filter::new().is_in("id", [3, 5])).unwrap();
        assert_eq!(statement.sql, "DELETE FROM \"items\" WHERE \"id\" IN ($1, $2)");
        assert_eq!(statement.params, vec![SqlValue::Int(3), SqlValue::Int(5)]);

        let empty = delete("items", &Filter::new().is_in("id", Vec::<i64>::new())).unwrap();
        assert_eq!(empty.sql, "DELETE FROM \"items\" WHERE FALSE");

        let misuse = Filter::new().and(Condition::new("id", Operator::In, SqlValue::Int(1)));
        assert!(delete("items", &misuse).is_err());
    }

    #[test]
    fn test_update_numbers_set_before_where() {
        let fields = row(&[("owner", SqlValue::from("bob"))]);
        let statement = update("items", &Filter::new().eq("owner", "alice"), &fields).unwrap();
        assert_eq!(statement.sql, "UPDATE \"items\" SET \"owner\" = $1 WHERE \"owner\" = $2");
        assert_eq!(statement.params, vec![SqlValue::from("bob"), SqlValue::from("alice")]);

        assert!(update("items", &Filter::new(), &Row::new()).is_err());
    }
}
