//! PostgreSQL record store. Integrity rules are DDL constraints (see `migration`);
//! this module maps their violations onto `AppError`.

use super::{not_found, BookFilter, CatalogSummary, DueBackFilter, InstanceFilter, Page, RecordStore};
use crate::error::AppError;
use crate::migration::quote_ident;
use crate::model::{
    Author, AuthorInput, Book, BookInput, BookInstance, BookInstanceInput, Borrower, BorrowerInput, Cover, Language,
    LanguageInput, MediaField, UniqueConstraint, YEAR_OF_REL_CHECK, YEAR_OF_REL_MAX, YEAR_OF_REL_MIN,
};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use sqlx::PgPool;
use uuid::Uuid;

const BOOK_COLUMNS: &str = "b.id, b.title, b.author_id, b.year_of_rel, b.summary, b.isbn, b.genre, b.category, \
     b.publisher, b.language_id, b.photo_preview, b.book_file";
const INSTANCE_COLUMNS: &str = "id, book_id, imprint, due_back, borrower_id, status";
const AUTHOR_COLUMNS: &str = "id, name, last_name, middle_name, date_of_birth, date_of_death";
const BORROWER_COLUMNS: &str = "id, username, first_name, last_name, email, is_staff, can_mark_returned, identity";

#[derive(sqlx::FromRow)]
struct InstanceRow {
    id: Uuid,
    book_id: Option<i64>,
    imprint: String,
    due_back: Option<NaiveDate>,
    borrower_id: Option<i64>,
    status: String,
}

impl TryFrom<InstanceRow> for BookInstance {
    type Error = AppError;

    fn try_from(row: InstanceRow) -> Result<Self, Self::Error> {
        Ok(BookInstance {
            id: row.id,
            book_id: row.book_id,
            imprint: row.imprint,
            due_back: row.due_back,
            borrower_id: row.borrower_id,
            status: row.status.parse()?,
        })
    }
}

/// Field name for a foreign-key constraint, as reported to clients.
fn fk_field(constraint: &str) -> &'static str {
    match constraint {
        "book_author_fk" => "author",
        "book_language_fk" => "language",
        "instance_book_fk" => "book",
        "instance_borrower_fk" => "borrower",
        _ => "reference",
    }
}

/// Map a failed INSERT/UPDATE to the error taxonomy.
fn write_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        let constraint = db.constraint().unwrap_or("");
        match db.code().as_deref() {
            Some("23505") => {
                return match UniqueConstraint::by_name(constraint) {
                    Some(c) => c.violation(),
                    None => AppError::DuplicateKey {
                        fields: Vec::new(),
                        message: db.message().to_string(),
                    },
                };
            }
            Some("23503") => {
                return AppError::constraint(
                    fk_field(constraint),
                    "Выберите корректный вариант. Вашего варианта нет среди допустимых значений.",
                );
            }
            Some("23514") if constraint == YEAR_OF_REL_CHECK => {
                return AppError::OutOfRange {
                    field: "yearOfRel".into(),
                    message: format!(
                        "Убедитесь, что это значение находится в диапазоне от {} до {}.",
                        YEAR_OF_REL_MIN, YEAR_OF_REL_MAX
                    ),
                };
            }
            Some("23514") | Some("22001") => {
                return AppError::ConstraintViolation {
                    fields: Vec::new(),
                    message: db.message().to_string(),
                };
            }
            _ => {}
        }
    }
    AppError::Db(e)
}

/// Map a failed DELETE: foreign-key violations mean a RESTRICT rule blocked it.
fn delete_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some("23503") {
            tracing::warn!(constraint = ?db.constraint(), "delete blocked by dependent rows");
            return AppError::ReferentialIntegrity(db.message().to_string());
        }
    }
    write_error(e)
}

/// `(from, to, has_date)` bounds for the due_back SQL predicate.
fn due_back_bounds(filter: Option<&DueBackFilter>) -> (Option<NaiveDate>, Option<NaiveDate>, Option<bool>) {
    match filter {
        None => (None, None, None),
        Some(DueBackFilter::On(d)) => (Some(*d), Some(*d + Duration::days(1)), None),
        Some(DueBackFilter::Between { from, to }) => (Some(*from), Some(*to), None),
        Some(DueBackFilter::HasDate) => (None, None, Some(true)),
        Some(DueBackFilter::NoDate) => (None, None, Some(false)),
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    schema: String,
}

impl PgStore {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        PgStore {
            pool,
            schema: schema.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Schema-qualified table name.
    fn table(&self, name: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), name)
    }

    async fn delete_by_id(&self, table: &str, kind: &str, id: i64) -> Result<(), AppError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.table(table));
        tracing::debug!(sql = %sql, id, "query");
        let done = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(delete_error)?;
        if done.rows_affected() == 0 {
            return Err(not_found(kind, id));
        }
        tracing::info!(kind, id, "deleted");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn insert_language(&self, input: &LanguageInput) -> Result<Language, AppError> {
        let sql = format!("INSERT INTO {} (name) VALUES ($1) RETURNING id, name", self.table("language"));
        tracing::debug!(sql = %sql, "query");
        sqlx::query_as::<_, Language>(&sql)
            .bind(&input.name)
            .fetch_one(&self.pool)
            .await
            .map_err(write_error)
    }

    async fn update_language(&self, id: i64, input: &LanguageInput) -> Result<Language, AppError> {
        let sql = format!(
            "UPDATE {} SET name = $2 WHERE id = $1 RETURNING id, name",
            self.table("language")
        );
        tracing::debug!(sql = %sql, id, "query");
        sqlx::query_as::<_, Language>(&sql)
            .bind(id)
            .bind(&input.name)
            .fetch_optional(&self.pool)
            .await
            .map_err(write_error)?
            .ok_or_else(|| not_found("language", id))
    }

    async fn get_language(&self, id: i64) -> Result<Option<Language>, AppError> {
        let sql = format!("SELECT id, name FROM {} WHERE id = $1", self.table("language"));
        Ok(sqlx::query_as::<_, Language>(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn list_languages(&self, page: Page) -> Result<Vec<Language>, AppError> {
        let sql = format!(
            "SELECT id, name FROM {} ORDER BY id LIMIT $1 OFFSET $2",
            self.table("language")
        );
        tracing::debug!(sql = %sql, "query");
        Ok(sqlx::query_as::<_, Language>(&sql)
            .bind(page.limit() as i64)
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn delete_language(&self, id: i64) -> Result<(), AppError> {
        self.delete_by_id("language", "language", id).await
    }

    async fn insert_author(&self, input: &AuthorInput) -> Result<Author, AppError> {
        let sql = format!(
            "INSERT INTO {} (name, last_name, middle_name, date_of_birth, date_of_death) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            self.table("author"),
            AUTHOR_COLUMNS
        );
        tracing::debug!(sql = %sql, "query");
        sqlx::query_as::<_, Author>(&sql)
            .bind(&input.name)
            .bind(&input.last_name)
            .bind(&input.middle_name)
            .bind(input.date_of_birth)
            .bind(input.date_of_death)
            .fetch_one(&self.pool)
            .await
            .map_err(write_error)
    }

    async fn update_author(&self, id: i64, input: &AuthorInput) -> Result<Author, AppError> {
        let sql = format!(
            "UPDATE {} SET name = $2, last_name = $3, middle_name = $4, date_of_birth = $5, date_of_death = $6 \
             WHERE id = $1 RETURNING {}",
            self.table("author"),
            AUTHOR_COLUMNS
        );
        tracing::debug!(sql = %sql, id, "query");
        sqlx::query_as::<_, Author>(&sql)
            .bind(id)
            .bind(&input.name)
            .bind(&input.last_name)
            .bind(&input.middle_name)
            .bind(input.date_of_birth)
            .bind(input.date_of_death)
            .fetch_optional(&self.pool)
            .await
            .map_err(write_error)?
            .ok_or_else(|| not_found("author", id))
    }

    async fn get_author(&self, id: i64) -> Result<Option<Author>, AppError> {
        let sql = format!("SELECT {} FROM {} WHERE id = $1", AUTHOR_COLUMNS, self.table("author"));
        Ok(sqlx::query_as::<_, Author>(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn list_authors(&self, page: Page) -> Result<Vec<Author>, AppError> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY last_name, name, id LIMIT $1 OFFSET $2",
            AUTHOR_COLUMNS,
            self.table("author")
        );
        tracing::debug!(sql = %sql, "query");
        Ok(sqlx::query_as::<_, Author>(&sql)
            .bind(page.limit() as i64)
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Books go with the author (ON DELETE CASCADE); a book that still has copies aborts
    /// the whole statement through the RESTRICT rule on book_instance.
    async fn delete_author(&self, id: i64) -> Result<(), AppError> {
        self.delete_by_id("author", "author", id).await
    }

    async fn insert_book(&self, input: &BookInput) -> Result<Book, AppError> {
        let sql = format!(
            "INSERT INTO {} AS b (title, author_id, year_of_rel, summary, isbn, genre, category, publisher, language_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
            self.table("book"),
            BOOK_COLUMNS
        );
        tracing::debug!(sql = %sql, "query");
        sqlx::query_as::<_, Book>(&sql)
            .bind(&input.title)
            .bind(input.author)
            .bind(input.year_of_rel)
            .bind(&input.summary)
            .bind(&input.isbn)
            .bind(&input.genre)
            .bind(&input.category)
            .bind(&input.publisher)
            .bind(input.language)
            .fetch_one(&self.pool)
            .await
            .map_err(write_error)
    }

    async fn update_book(&self, id: i64, input: &BookInput) -> Result<Book, AppError> {
        let sql = format!(
            "UPDATE {} AS b SET title = $2, author_id = $3, year_of_rel = $4, summary = $5, isbn = $6, \
             genre = $7, category = $8, publisher = $9, language_id = $10 WHERE b.id = $1 RETURNING {}",
            self.table("book"),
            BOOK_COLUMNS
        );
        tracing::debug!(sql = %sql, id, "query");
        sqlx::query_as::<_, Book>(&sql)
            .bind(id)
            .bind(&input.title)
            .bind(input.author)
            .bind(input.year_of_rel)
            .bind(&input.summary)
            .bind(&input.isbn)
            .bind(&input.genre)
            .bind(&input.category)
            .bind(&input.publisher)
            .bind(input.language)
            .fetch_optional(&self.pool)
            .await
            .map_err(write_error)?
            .ok_or_else(|| not_found("book", id))
    }

    async fn set_book_media(&self, id: i64, field: MediaField, path: Option<&str>) -> Result<Book, AppError> {
        let sql = format!(
            "UPDATE {} AS b SET {} = $2 WHERE b.id = $1 RETURNING {}",
            self.table("book"),
            field.column(),
            BOOK_COLUMNS
        );
        tracing::debug!(sql = %sql, id, "query");
        sqlx::query_as::<_, Book>(&sql)
            .bind(id)
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .map_err(write_error)?
            .ok_or_else(|| not_found("book", id))
    }

    async fn get_book(&self, id: i64) -> Result<Option<Book>, AppError> {
        let sql = format!("SELECT {} FROM {} AS b WHERE b.id = $1", BOOK_COLUMNS, self.table("book"));
        Ok(sqlx::query_as::<_, Book>(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn list_books(&self, filter: &BookFilter, page: Page) -> Result<Vec<Book>, AppError> {
        let sql = format!(
            "SELECT {} FROM {} AS b JOIN {} AS a ON a.id = b.author_id \
             WHERE ($1::bigint IS NULL OR b.author_id = $1) AND ($2::bigint IS NULL OR b.language_id = $2) \
             ORDER BY b.title, a.last_name, a.name, b.id LIMIT $3 OFFSET $4",
            BOOK_COLUMNS,
            self.table("book"),
            self.table("author")
        );
        tracing::debug!(sql = %sql, filter = ?filter, "query");
        Ok(sqlx::query_as::<_, Book>(&sql)
            .bind(filter.author_id)
            .bind(filter.language_id)
            .bind(page.limit() as i64)
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn delete_book(&self, id: i64) -> Result<(), AppError> {
        self.delete_by_id("book", "book", id).await
    }

    async fn insert_instance(&self, input: &BookInstanceInput) -> Result<BookInstance, AppError> {
        let sql = format!(
            "INSERT INTO {} (id, book_id, imprint, due_back, borrower_id, status) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            self.table("book_instance"),
            INSTANCE_COLUMNS
        );
        tracing::debug!(sql = %sql, "query");
        sqlx::query_as::<_, InstanceRow>(&sql)
            .bind(input.id.unwrap_or_else(Uuid::new_v4))
            .bind(input.book)
            .bind(&input.imprint)
            .bind(input.due_back)
            .bind(input.borrower)
            .bind(input.status.code())
            .fetch_one(&self.pool)
            .await
            .map_err(write_error)?
            .try_into()
    }

    async fn update_instance(&self, id: Uuid, input: &BookInstanceInput) -> Result<BookInstance, AppError> {
        let sql = format!(
            "UPDATE {} SET book_id = $2, imprint = $3, due_back = $4, borrower_id = $5, status = $6 \
             WHERE id = $1 RETURNING {}",
            self.table("book_instance"),
            INSTANCE_COLUMNS
        );
        tracing::debug!(sql = %sql, id = %id, "query");
        sqlx::query_as::<_, InstanceRow>(&sql)
            .bind(id)
            .bind(input.book)
            .bind(&input.imprint)
            .bind(input.due_back)
            .bind(input.borrower)
            .bind(input.status.code())
            .fetch_optional(&self.pool)
            .await
            .map_err(write_error)?
            .ok_or_else(|| not_found("book instance", id))?
            .try_into()
    }

    async fn get_instance(&self, id: Uuid) -> Result<Option<BookInstance>, AppError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1",
            INSTANCE_COLUMNS,
            self.table("book_instance")
        );
        sqlx::query_as::<_, InstanceRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(BookInstance::try_from)
            .transpose()
    }

    async fn list_instances(&self, filter: &InstanceFilter, page: Page) -> Result<Vec<BookInstance>, AppError> {
        let (from, to, has_date) = due_back_bounds(filter.due_back.as_ref());
        let sql = format!(
            "SELECT {} FROM {} \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::date IS NULL OR due_back >= $2) \
               AND ($3::date IS NULL OR due_back < $3) \
               AND ($4::boolean IS NULL OR (due_back IS NOT NULL) = $4) \
               AND ($5::bigint IS NULL OR book_id = $5) \
               AND ($6::bigint IS NULL OR borrower_id = $6) \
             ORDER BY due_back ASC NULLS LAST, id LIMIT $7 OFFSET $8",
            INSTANCE_COLUMNS,
            self.table("book_instance")
        );
        tracing::debug!(sql = %sql, filter = ?filter, "query");
        let rows = sqlx::query_as::<_, InstanceRow>(&sql)
            .bind(filter.status.map(|s| s.code()))
            .bind(from)
            .bind(to)
            .bind(has_date)
            .bind(filter.book_id)
            .bind(filter.borrower_id)
            .bind(page.limit() as i64)
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(BookInstance::try_from).collect()
    }

    async fn delete_instance(&self, id: Uuid) -> Result<(), AppError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.table("book_instance"));
        tracing::debug!(sql = %sql, id = %id, "query");
        let done = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(delete_error)?;
        if done.rows_affected() == 0 {
            return Err(not_found("book instance", id));
        }
        Ok(())
    }

    async fn insert_borrower(&self, input: &BorrowerInput) -> Result<Borrower, AppError> {
        let sql = format!(
            "INSERT INTO {} (username, first_name, last_name, email, is_staff, can_mark_returned, identity) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            self.table("borrower"),
            BORROWER_COLUMNS
        );
        tracing::debug!(sql = %sql, "query");
        sqlx::query_as::<_, Borrower>(&sql)
            .bind(&input.username)
            .bind(&input.first_name)
            .bind(&input.last_name)
            .bind(&input.email)
            .bind(input.is_staff)
            .bind(input.can_mark_returned)
            .bind(&input.identity)
            .fetch_one(&self.pool)
            .await
            .map_err(write_error)
    }

    async fn update_borrower(&self, id: i64, input: &BorrowerInput) -> Result<Borrower, AppError> {
        let sql = format!(
            "UPDATE {} SET username = $2, first_name = $3, last_name = $4, email = $5, is_staff = $6, \
             can_mark_returned = $7, identity = $8 WHERE id = $1 RETURNING {}",
            self.table("borrower"),
            BORROWER_COLUMNS
        );
        tracing::debug!(sql = %sql, id, "query");
        sqlx::query_as::<_, Borrower>(&sql)
            .bind(id)
            .bind(&input.username)
            .bind(&input.first_name)
            .bind(&input.last_name)
            .bind(&input.email)
            .bind(input.is_staff)
            .bind(input.can_mark_returned)
            .bind(&input.identity)
            .fetch_optional(&self.pool)
            .await
            .map_err(write_error)?
            .ok_or_else(|| not_found("user", id))
    }

    async fn get_borrower(&self, id: i64) -> Result<Option<Borrower>, AppError> {
        let sql = format!("SELECT {} FROM {} WHERE id = $1", BORROWER_COLUMNS, self.table("borrower"));
        Ok(sqlx::query_as::<_, Borrower>(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn list_borrowers(&self, page: Page) -> Result<Vec<Borrower>, AppError> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY id LIMIT $1 OFFSET $2",
            BORROWER_COLUMNS,
            self.table("borrower")
        );
        Ok(sqlx::query_as::<_, Borrower>(&sql)
            .bind(page.limit() as i64)
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn delete_borrower(&self, id: i64) -> Result<(), AppError> {
        self.delete_by_id("borrower", "user", id).await
    }

    async fn insert_cover(&self, path: &str) -> Result<Cover, AppError> {
        let sql = format!("INSERT INTO {} (cover) VALUES ($1) RETURNING id, cover", self.table("cover"));
        tracing::debug!(sql = %sql, "query");
        sqlx::query_as::<_, Cover>(&sql)
            .bind(path)
            .fetch_one(&self.pool)
            .await
            .map_err(write_error)
    }

    async fn get_cover(&self, id: i64) -> Result<Option<Cover>, AppError> {
        let sql = format!("SELECT id, cover FROM {} WHERE id = $1", self.table("cover"));
        Ok(sqlx::query_as::<_, Cover>(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn list_covers(&self, page: Page) -> Result<Vec<Cover>, AppError> {
        let sql = format!(
            "SELECT id, cover FROM {} ORDER BY id LIMIT $1 OFFSET $2",
            self.table("cover")
        );
        Ok(sqlx::query_as::<_, Cover>(&sql)
            .bind(page.limit() as i64)
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn delete_cover(&self, id: i64) -> Result<(), AppError> {
        self.delete_by_id("cover", "cover", id).await
    }

    async fn summary(&self) -> Result<CatalogSummary, AppError> {
        let sql = format!(
            "SELECT \
               (SELECT COUNT(*) FROM {book}) AS num_books, \
               (SELECT COUNT(*) FROM {inst}) AS num_instances, \
               (SELECT COUNT(*) FROM {inst} WHERE status = 'a') AS num_instances_available, \
               (SELECT COUNT(*) FROM {author}) AS num_authors, \
               (SELECT COUNT(*) FROM {lang}) AS num_languages",
            book = self.table("book"),
            inst = self.table("book_instance"),
            author = self.table("author"),
            lang = self.table("language"),
        );
        Ok(sqlx::query_as::<_, CatalogSummary>(&sql).fetch_one(&self.pool).await?)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn blank_status_rows_load_as_maintenance() {
        let row = InstanceRow {
            id: Uuid::new_v4(),
            book_id: Some(1),
            imprint: "Москва, 1999".into(),
            due_back: None,
            borrower_id: None,
            status: String::new(),
        };
        let copy = BookInstance::try_from(row).unwrap();
        assert_eq!(copy.status, crate::model::LoanStatus::Maintenance);
    }

    #[test]
    fn due_back_bounds_for_exact_day_are_half_open() {
        let d = date(2024, 2, 29);
        assert_eq!(due_back_bounds(Some(&DueBackFilter::On(d))), (Some(d), Some(date(2024, 3, 1)), None));
        assert_eq!(due_back_bounds(Some(&DueBackFilter::NoDate)), (None, None, Some(false)));
        assert_eq!(due_back_bounds(None), (None, None, None));
    }

    #[test]
    fn fk_constraints_name_fields() {
        assert_eq!(fk_field("book_author_fk"), "author");
        assert_eq!(fk_field("instance_borrower_fk"), "borrower");
    }

    #[test]
    fn non_database_errors_pass_through() {
        assert!(matches!(write_error(sqlx::Error::RowNotFound), AppError::Db(sqlx::Error::RowNotFound)));
        assert!(matches!(delete_error(sqlx::Error::PoolTimedOut), AppError::Db(_)));
    }
}
