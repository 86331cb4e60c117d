//! SQLite dialect.
//!
//! SQLite resolves declared types through affinity rules, so most types map
//! onto `INTEGER`, `TEXT`, `REAL` or `BLOB`. Bounded strings keep their
//! declared length (`VARCHAR(255)` has TEXT affinity) so the schema still
//! documents the bound.

use crate::operations::SyncOperation;
use crate::schema::{ColumnSchema, IndexSchema, SqlType};

use super::SyncDialect;

/// SQLite SQL generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn create_table_sql(
        &self,
        name: &str,
        columns: &[ColumnSchema],
        primary_key: &[String],
        if_not_exists: bool,
    ) -> String {
        let mut sql = String::from("CREATE TABLE ");
        if if_not_exists {
            sql.push_str("IF NOT EXISTS ");
        }
        sql.push_str(&self.quote_identifier(name));
        sql.push_str(" (\n");

        let col_defs: Vec<String> = columns.iter().map(|c| self.column_definition(c)).collect();
        sql.push_str("  ");
        sql.push_str(&col_defs.join(",\n  "));

        // Composite keys, or keys not declared inline on a column.
        let inline_pk = primary_key.len() == 1
            && columns
                .iter()
                .any(|c| c.primary_key && c.name == primary_key[0]);

        if !primary_key.is_empty() && !inline_pk {
            let quoted: Vec<String> = primary_key
                .iter()
                .map(|c| self.quote_identifier(c))
                .collect();
            sql.push_str(",\n  PRIMARY KEY (");
            sql.push_str(&quoted.join(", "));
            sql.push(')');
        }

        sql.push_str("\n)");
        sql
    }

    fn add_column_sql(&self, table: &str, column: &ColumnSchema) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(column)
        )
    }

    fn create_index_sql(&self, table: &str, index: &IndexSchema, if_not_exists: bool) -> String {
        let mut sql = String::from("CREATE ");
        if index.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        if if_not_exists {
            sql.push_str("IF NOT EXISTS ");
        }
        sql.push_str(&self.quote_identifier(&index.name));
        sql.push_str(" ON ");
        sql.push_str(&self.quote_identifier(table));
        sql.push_str(" (");

        let quoted: Vec<String> = index
            .columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect();
        sql.push_str(&quoted.join(", "));
        sql.push(')');
        sql
    }
}

impl SyncDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn generate_sql(&self, operation: &SyncOperation) -> String {
        match operation {
            SyncOperation::CreateTable {
                name,
                columns,
                primary_key,
                if_not_exists,
            } => self.create_table_sql(name, columns, primary_key, *if_not_exists),

            SyncOperation::AddColumn { table, column } => self.add_column_sql(table, column),

            SyncOperation::CreateIndex {
                table,
                index,
                if_not_exists,
            } => self.create_index_sql(table, index, *if_not_exists),
        }
    }

    fn type_name(&self, sql_type: &SqlType) -> String {
        match sql_type {
            SqlType::Integer | SqlType::SmallInt | SqlType::BigInt | SqlType::Boolean => {
                "INTEGER".to_string()
            }
            SqlType::Varchar(len) => format!("VARCHAR({len})"),
            SqlType::Char(len) => format!("CHAR({len})"),
            SqlType::Text
            | SqlType::DateTime
            | SqlType::Timestamp
            | SqlType::Date
            | SqlType::Time
            | SqlType::Json
            | SqlType::Uuid => "TEXT".to_string(),
            SqlType::Real | SqlType::Double => "REAL".to_string(),
            SqlType::Decimal(_, _) => "NUMERIC".to_string(),
            SqlType::Blob => "BLOB".to_string(),
        }
    }

    fn auto_increment_keyword(&self) -> &'static str {
        "AUTOINCREMENT"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DefaultValue, TableSchema};

    fn dialect() -> SqliteDialect {
        SqliteDialect::new()
    }

    #[test]
    fn test_create_table_simple() {
        let table = TableSchema::new("users")
            .column(
                ColumnSchema::new("id", SqlType::BigInt)
                    .primary_key()
                    .auto_increment(),
            )
            .column(ColumnSchema::new("name", SqlType::Varchar(255)).not_null());

        let sql = dialect().generate_sql(&SyncOperation::create_table(&table));
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"users\" (\n  \
             \"id\" INTEGER PRIMARY KEY AUTOINCREMENT,\n  \
             \"name\" VARCHAR(255) NOT NULL\n)"
        );
    }

    #[test]
    fn test_create_table_composite_key() {
        let op = SyncOperation::CreateTable {
            name: "memberships".to_string(),
            columns: vec![
                ColumnSchema::new("user_id", SqlType::BigInt).not_null(),
                ColumnSchema::new("group_id", SqlType::BigInt).not_null(),
            ],
            primary_key: vec!["user_id".to_string(), "group_id".to_string()],
            if_not_exists: false,
        };

        let sql = dialect().generate_sql(&op);
        assert!(sql.starts_with("CREATE TABLE \"memberships\""));
        assert!(sql.contains("PRIMARY KEY (\"user_id\", \"group_id\")"));
    }

    #[test]
    fn test_add_column_with_default() {
        let op = SyncOperation::add_column(
            "users",
            ColumnSchema::new("is_active", SqlType::Boolean)
                .not_null()
                .default(DefaultValue::Bool(true)),
        );

        assert_eq!(
            dialect().generate_sql(&op),
            "ALTER TABLE \"users\" ADD COLUMN \"is_active\" INTEGER NOT NULL DEFAULT 1"
        );
    }

    #[test]
    fn test_create_index() {
        let op = SyncOperation::create_index(
            "users",
            IndexSchema::new("idx_users_email", &["email"]).unique(),
        );

        assert_eq!(
            dialect().generate_sql(&op),
            "CREATE UNIQUE INDEX IF NOT EXISTS \"idx_users_email\" ON \"users\" (\"email\")"
        );
    }

    #[test]
    fn test_quote_identifier_escapes_quotes() {
        assert_eq!(dialect().quote_identifier("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn test_type_names() {
        let d = dialect();
        assert_eq!(d.type_name(&SqlType::BigInt), "INTEGER");
        assert_eq!(d.type_name(&SqlType::Varchar(255)), "VARCHAR(255)");
        assert_eq!(d.type_name(&SqlType::Boolean), "INTEGER");
        assert_eq!(d.type_name(&SqlType::Timestamp), "TEXT");
        assert_eq!(d.type_name(&SqlType::Blob), "BLOB");
        assert_eq!(d.name(), "sqlite");
    }
}
