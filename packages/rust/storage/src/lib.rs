//! libSQL-backed school records store.
//!
//! The [`Storage`] struct wraps a local libSQL database holding the school
//! schema and executes the read-only statements produced by the query
//! builder. It implements [`Fetcher`] so it can stand in for the REST API.
//!
//! **Access rules:**
//! - `aulabot db init` opens read-write via [`Storage::open`] (migrations, demo seed)
//! - question answering opens read-only via [`Storage::open_readonly`]
//!
//! User-derived text only ever reaches the database as bound values.

mod migrations;

use std::path::Path;

use async_trait::async_trait;
use aulabot_shared::{AulabotError, Fetcher, QuerySpec, Result, ResultRow, ResultSet, SqlQuery, SqlValue};
use libsql::params::Params;
use libsql::{Connection, Database, Value, params};
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument};

/// Demo school used by `aulabot db init --demo` and by tests.
const DEMO_SEED: &str = include_str!("demo.sql");

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AulabotError::io(parent, e))?;
        }

        let (db, conn) = connect(path).await?;
        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` for queries only.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AulabotError::Storage(format!(
                "database not found at {}; run `aulabot db init` first",
                path.display()
            )));
        }

        let (db, conn) = connect(path).await?;
        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        AulabotError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    pub async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(AulabotError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// Load the demo school. Returns `false` when students already exist.
    pub async fn seed_demo(&self) -> Result<bool> {
        self.check_writable()?;

        let existing = self
            .query(&SqlQuery {
                text: "SELECT COUNT(*) AS total FROM estudiantes".into(),
                params: Vec::new(),
            })
            .await?;
        let total = existing
            .first()
            .and_then(|row| row.integer("total"))
            .unwrap_or(0);
        if total > 0 {
            debug!(total, "database already has students, skipping demo seed");
            return Ok(false);
        }

        self.conn
            .execute_batch(DEMO_SEED)
            .await
            .map_err(|e| AulabotError::Storage(format!("demo seed failed: {e}")))?;
        info!("demo data loaded");
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Query execution
    // -----------------------------------------------------------------------

    /// Execute one read-only statement with positional bound values.
    #[instrument(skip_all, fields(params = query.params.len()))]
    pub async fn query(&self, query: &SqlQuery) -> Result<ResultSet> {
        if !is_read_only(&query.text) {
            return Err(AulabotError::validation(
                "only single SELECT statements may be executed",
            ));
        }

        let params = Params::Positional(query.params.iter().map(to_libsql).collect());
        let mut rows = self
            .conn
            .query(&query.text, params)
            .await
            .map_err(|e| AulabotError::Storage(e.to_string()))?;

        let columns: Vec<String> = (0..rows.column_count())
            .map(|i| rows.column_name(i).unwrap_or("?").to_string())
            .collect();

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| AulabotError::Storage(e.to_string()))?
        {
            let mut out = ResultRow::new();
            for (i, name) in columns.iter().enumerate() {
                let value = row
                    .get_value(i as i32)
                    .map_err(|e| AulabotError::Storage(e.to_string()))?;
                out.insert(name.clone(), to_json(value));
            }
            results.push(out);
        }

        debug!(rows = results.len(), "query executed");
        Ok(results)
    }
}

#[async_trait]
impl Fetcher for Storage {
    fn name(&self) -> &str {
        "sql"
    }

    async fn fetch(&self, query: &QuerySpec) -> Result<ResultSet> {
        match query {
            QuerySpec::Sql(sql) => self.query(sql).await,
            QuerySpec::Rest(rest) => Err(AulabotError::validation(format!(
                "SQL backend cannot run REST action '{}'",
                rest.action
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn connect(path: &Path) -> Result<(Database, Connection)> {
    let db = libsql::Builder::new_local(path)
        .build()
        .await
        .map_err(|e| AulabotError::Storage(e.to_string()))?;

    let conn = db
        .connect()
        .map_err(|e| AulabotError::Storage(e.to_string()))?;

    Ok((db, conn))
}

/// A single statement that starts with SELECT.
fn is_read_only(sql: &str) -> bool {
    let trimmed = sql.trim().trim_end_matches(';').trim_end();
    trimmed
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("select"))
        && !trimmed.contains(';')
}

fn to_libsql(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Integer(*i),
        SqlValue::Real(f) => Value::Real(*f),
        SqlValue::Text(s) => Value::Text(s.clone()),
    }
}

fn to_json(value: Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Integer(i) => JsonValue::from(i),
        Value::Real(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Text(s) => JsonValue::String(s),
        Value::Blob(b) => JsonValue::String(String::from_utf8_lossy(&b).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_db() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("aulabot_test_{}.db", Uuid::now_v7()))
    }

    async fn demo_storage() -> Storage {
        let storage = Storage::open(&temp_db()).await.expect("open storage");
        assert!(storage.seed_demo().await.expect("seed"));
        storage
    }

    fn sql(text: &str, params: Vec<SqlValue>) -> SqlQuery {
        SqlQuery {
            text: text.into(),
            params,
        }
    }

    #[tokio::test]
    async fn open_creates_schema() {
        let storage = Storage::open(&temp_db()).await.expect("open storage");
        assert_eq!(storage.schema_version().await, 2);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = temp_db();
        let first = Storage::open(&tmp).await.expect("first open");
        drop(first);
        let second = Storage::open(&tmp).await.expect("second open");
        assert_eq!(second.schema_version().await, 2);
        let _ = std::fs::remove_file(&tmp);
    }

    #[tokio::test]
    async fn seed_runs_once() {
        let storage = demo_storage().await;
        assert!(!storage.seed_demo().await.expect("second seed"));
    }

    #[tokio::test]
    async fn bound_parameters_select_rows() {
        let storage = demo_storage().await;
        let rows = storage
            .query(&sql(
                "SELECT e.nombre, e.apellido, c.anio, c.division \
                 FROM estudiantes e JOIN cursos c ON e.curso_id = c.id \
                 WHERE e.activo = 1 AND c.anio = ? AND c.division = ? \
                 ORDER BY e.apellido, e.nombre",
                vec![SqlValue::Integer(3), SqlValue::Text("B".into())],
            ))
            .await
            .expect("query");

        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0].full_name(), "Ana Acosta");
        assert_eq!(rows[0].course_label(), "3° B");
    }

    #[tokio::test]
    async fn real_values_survive_conversion() {
        let storage = demo_storage().await;
        let rows = storage
            .query(&sql(
                "SELECT AVG(nota) AS promedio FROM notas WHERE estudiante_id = ?",
                vec![SqlValue::Integer(1)],
            ))
            .await
            .expect("query");
        assert_eq!(rows[0].number("promedio"), Some(7.25));
    }

    #[tokio::test]
    async fn injected_text_is_just_a_value() {
        let storage = demo_storage().await;
        let rows = storage
            .query(&sql(
                "SELECT id FROM estudiantes WHERE apellido LIKE ?",
                vec![SqlValue::Text("%'; DROP TABLE estudiantes; --%".into())],
            ))
            .await
            .expect("query");
        assert!(rows.is_empty());

        let count = storage
            .query(&sql("SELECT COUNT(*) AS total FROM estudiantes", vec![]))
            .await
            .expect("count");
        assert_eq!(count[0].integer("total"), Some(20));
    }

    #[tokio::test]
    async fn writes_are_refused() {
        let storage = demo_storage().await;
        for statement in [
            "DELETE FROM estudiantes",
            "SELECT 1; DROP TABLE estudiantes",
            "  update notas set nota = 10",
        ] {
            let err = storage.query(&sql(statement, vec![])).await.unwrap_err();
            assert!(matches!(err, AulabotError::Validation { .. }), "{statement}");
        }
    }

    #[tokio::test]
    async fn fetcher_rejects_rest_queries() {
        let storage = demo_storage().await;
        let query = QuerySpec::Rest(aulabot_shared::RestQuery::new("estudiantes"));
        let err = storage.fetch(&query).await.unwrap_err();
        assert!(err.to_string().contains("estudiantes"));
        assert_eq!(storage.name(), "sql");
    }

    #[tokio::test]
    async fn readonly_rejects_seed() {
        let tmp = temp_db();
        drop(Storage::open(&tmp).await.expect("create"));

        let ro = Storage::open_readonly(&tmp).await.expect("open ro");
        let result = ro.seed_demo().await;
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn readonly_requires_existing_file() {
        let err = Storage::open_readonly(&temp_db()).await.err().expect("missing db");
        assert!(err.to_string().contains("db init"));
    }
}
