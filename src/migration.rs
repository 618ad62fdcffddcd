//! Catalog DDL for PostgreSQL. Idempotent: every statement is `IF NOT EXISTS`.
//!
//! Constraint names match `model::constraint` so violations map back to field sets.
//! Delete rules live here: author -> book CASCADE, book -> book_instance RESTRICT,
//! language -> book and borrower -> book_instance SET NULL.

use crate::error::AppError;
use sqlx::ConnectOptions;
use sqlx::PgPool;
use std::str::FromStr;

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn catalog_ddl(schema: &str) -> Vec<String> {
    let s = quote_ident(schema);
    vec![
        format!("CREATE SCHEMA IF NOT EXISTS {s}"),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {s}.language (
                id BIGSERIAL PRIMARY KEY,
                name VARCHAR(200) NOT NULL
            )
            "#
        ),
        // Plain UNIQUE: an author with an empty date never collides.
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {s}.author (
                id BIGSERIAL PRIMARY KEY,
                name VARCHAR(100) NOT NULL,
                last_name VARCHAR(100) NOT NULL DEFAULT '',
                middle_name VARCHAR(100) NOT NULL,
                date_of_birth DATE,
                date_of_death DATE,
                CONSTRAINT author_identity_key UNIQUE
                    (name, last_name, middle_name, date_of_birth, date_of_death)
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {s}.book (
                id BIGSERIAL PRIMARY KEY,
                title VARCHAR(100) NOT NULL,
                author_id BIGINT NOT NULL
                    CONSTRAINT book_author_fk REFERENCES {s}.author (id) ON DELETE CASCADE,
                year_of_rel INTEGER NOT NULL
                    CONSTRAINT book_year_of_rel_check CHECK (year_of_rel BETWEEN 1000 AND 9999),
                summary VARCHAR(1000) NOT NULL,
                isbn VARCHAR(13) NOT NULL CONSTRAINT book_isbn_key UNIQUE,
                genre VARCHAR(100) NOT NULL DEFAULT '',
                category VARCHAR(100) NOT NULL DEFAULT '',
                publisher VARCHAR(100) NOT NULL DEFAULT '',
                language_id BIGINT
                    CONSTRAINT book_language_fk REFERENCES {s}.language (id) ON DELETE SET NULL,
                photo_preview TEXT,
                book_file TEXT,
                CONSTRAINT book_identity_key UNIQUE (title, author_id, year_of_rel, publisher)
            )
            "#
        ),
        format!("CREATE INDEX IF NOT EXISTS book_author_idx ON {s}.book (author_id)"),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {s}.borrower (
                id BIGSERIAL PRIMARY KEY,
                username VARCHAR(150) NOT NULL CONSTRAINT borrower_username_key UNIQUE,
                first_name VARCHAR(150) NOT NULL DEFAULT '',
                last_name VARCHAR(150) NOT NULL DEFAULT '',
                email VARCHAR(254) NOT NULL DEFAULT '',
                is_staff BOOLEAN NOT NULL DEFAULT FALSE,
                can_mark_returned BOOLEAN NOT NULL DEFAULT FALSE,
                identity TEXT
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {s}.book_instance (
                id UUID CONSTRAINT book_instance_pkey PRIMARY KEY,
                book_id BIGINT
                    CONSTRAINT instance_book_fk REFERENCES {s}.book (id) ON DELETE RESTRICT,
                imprint VARCHAR(200) NOT NULL,
                due_back DATE,
                borrower_id BIGINT
                    CONSTRAINT instance_borrower_fk REFERENCES {s}.borrower (id) ON DELETE SET NULL,
                status VARCHAR(1) NOT NULL DEFAULT 'd'
                    CONSTRAINT instance_status_check CHECK (status IN ('d', 'o', 'a', 'r'))
            )
            "#
        ),
        format!("CREATE INDEX IF NOT EXISTS book_instance_status_idx ON {s}.book_instance (status)"),
        format!("CREATE INDEX IF NOT EXISTS book_instance_due_back_idx ON {s}.book_instance (due_back)"),
        format!("CREATE INDEX IF NOT EXISTS book_instance_borrower_idx ON {s}.book_instance (borrower_id)"),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {s}.cover (
                id BIGSERIAL PRIMARY KEY,
                cover TEXT NOT NULL DEFAULT ''
            )
            "#
        ),
    ]
}

/// Create the catalog schema and tables in one transaction.
pub async fn apply_migrations(pool: &PgPool, schema: &str) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    for ddl in catalog_ddl(schema) {
        tracing::debug!(sql = %ddl, "migration");
        sqlx::query(&ddl).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    tracing::info!(schema = %schema, "catalog schema ready");
    Ok(())
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await?;
        tracing::info!(database = %db_name, "created database");
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| AppError::BadRequest("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}
