//! Record Store: persistence of catalog records with relational integrity.
//!
//! Two implementations share the [`RecordStore`] trait: [`PgStore`] (PostgreSQL, constraints
//! declared in DDL) and [`MemoryStore`] (in-process, same rules checked in code).
//!
//! Delete rules:
//! - Author -> Book: cascade (blocked if a cascaded book still has copies)
//! - Book -> BookInstance: restrict
//! - Language -> Book, Borrower -> BookInstance: set null

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::AppError;
use crate::model::{
    Author, AuthorInput, Book, BookInput, BookInstance, BookInstanceInput, Borrower, BorrowerInput, Cover, Language,
    LanguageInput, LoanStatus, MediaField,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

/// Limit/offset for list queries. Limit defaults to 100 and is capped at 1000.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Page {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl Page {
    pub const DEFAULT_LIMIT: u32 = 100;
    pub const MAX_LIMIT: u32 = 1000;

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).min(Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    /// Apply to an already ordered in-memory result.
    pub fn slice<T>(&self, rows: Vec<T>) -> Vec<T> {
        rows.into_iter()
            .skip(self.offset() as usize)
            .take(self.limit() as usize)
            .collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BookFilter {
    pub author_id: Option<i64>,
    pub language_id: Option<i64>,
}

/// Filter on the indexed `due_back` column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DueBackFilter {
    On(NaiveDate),
    /// Half-open range `[from, to)`.
    Between { from: NaiveDate, to: NaiveDate },
    HasDate,
    NoDate,
}

impl DueBackFilter {
    pub fn matches(&self, due_back: Option<NaiveDate>) -> bool {
        match (self, due_back) {
            (DueBackFilter::On(d), Some(due)) => due == *d,
            (DueBackFilter::Between { from, to }, Some(due)) => due >= *from && due < *to,
            (DueBackFilter::HasDate, Some(_)) => true,
            (DueBackFilter::NoDate, None) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstanceFilter {
    pub status: Option<LoanStatus>,
    pub due_back: Option<DueBackFilter>,
    pub book_id: Option<i64>,
    pub borrower_id: Option<i64>,
}

impl InstanceFilter {
    pub fn matches(&self, i: &BookInstance) -> bool {
        self.status.map_or(true, |s| i.status == s)
            && self.due_back.as_ref().map_or(true, |f| f.matches(i.due_back))
            && self.book_id.map_or(true, |b| i.book_id == Some(b))
            && self.borrower_id.map_or(true, |b| i.borrower_id == Some(b))
    }
}

/// Counts shown on the catalog home page.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct CatalogSummary {
    pub num_books: i64,
    pub num_instances: i64,
    pub num_instances_available: i64,
    pub num_authors: i64,
    pub num_languages: i64,
}

/// Typed persistence for every catalog record.
///
/// Inputs are expected to have passed `service::validation` already; the store enforces
/// the schema-level rules (uniqueness, references, year range, delete semantics).
/// Updates and deletes of missing records fail with `NotFound`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_language(&self, input: &LanguageInput) -> Result<Language, AppError>;
    async fn update_language(&self, id: i64, input: &LanguageInput) -> Result<Language, AppError>;
    async fn get_language(&self, id: i64) -> Result<Option<Language>, AppError>;
    async fn list_languages(&self, page: Page) -> Result<Vec<Language>, AppError>;
    async fn delete_language(&self, id: i64) -> Result<(), AppError>;

    async fn insert_author(&self, input: &AuthorInput) -> Result<Author, AppError>;
    async fn update_author(&self, id: i64, input: &AuthorInput) -> Result<Author, AppError>;
    async fn get_author(&self, id: i64) -> Result<Option<Author>, AppError>;
    /// Ordered by (last_name, name).
    async fn list_authors(&self, page: Page) -> Result<Vec<Author>, AppError>;
    async fn delete_author(&self, id: i64) -> Result<(), AppError>;

    async fn insert_book(&self, input: &BookInput) -> Result<Book, AppError>;
    async fn update_book(&self, id: i64, input: &BookInput) -> Result<Book, AppError>;
    async fn set_book_media(&self, id: i64, field: MediaField, path: Option<&str>) -> Result<Book, AppError>;
    async fn get_book(&self, id: i64) -> Result<Option<Book>, AppError>;
    /// Ordered by title, then by the author's ordering.
    async fn list_books(&self, filter: &BookFilter, page: Page) -> Result<Vec<Book>, AppError>;
    async fn delete_book(&self, id: i64) -> Result<(), AppError>;

    async fn insert_instance(&self, input: &BookInstanceInput) -> Result<BookInstance, AppError>;
    async fn update_instance(&self, id: Uuid, input: &BookInstanceInput) -> Result<BookInstance, AppError>;
    async fn get_instance(&self, id: Uuid) -> Result<Option<BookInstance>, AppError>;
    /// Ordered by due_back, empty dates last.
    async fn list_instances(&self, filter: &InstanceFilter, page: Page) -> Result<Vec<BookInstance>, AppError>;
    async fn delete_instance(&self, id: Uuid) -> Result<(), AppError>;

    async fn insert_borrower(&self, input: &BorrowerInput) -> Result<Borrower, AppError>;
    async fn update_borrower(&self, id: i64, input: &BorrowerInput) -> Result<Borrower, AppError>;
    async fn get_borrower(&self, id: i64) -> Result<Option<Borrower>, AppError>;
    async fn list_borrowers(&self, page: Page) -> Result<Vec<Borrower>, AppError>;
    async fn delete_borrower(&self, id: i64) -> Result<(), AppError>;

    async fn insert_cover(&self, path: &str) -> Result<Cover, AppError>;
    async fn get_cover(&self, id: i64) -> Result<Option<Cover>, AppError>;
    async fn list_covers(&self, page: Page) -> Result<Vec<Cover>, AppError>;
    async fn delete_cover(&self, id: i64) -> Result<(), AppError>;

    async fn summary(&self) -> Result<CatalogSummary, AppError>;

    /// Readiness probe.
    async fn ping(&self) -> Result<(), AppError>;
}

pub(crate) fn not_found(kind: &str, id: impl std::fmt::Display) -> AppError {
    AppError::NotFound(format!("{} {}", kind, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn page_defaults_and_cap() {
        assert_eq!(Page::default().limit(), 100);
        assert_eq!(Page { limit: Some(5000), offset: None }.limit(), 1000);
        let rows: Vec<i32> = (0..10).collect();
        assert_eq!(Page { limit: Some(3), offset: Some(8) }.slice(rows), vec![8, 9]);
    }

    #[test]
    fn due_back_filters() {
        let d = date(2024, 6, 15);
        assert!(DueBackFilter::On(d).matches(Some(d)));
        assert!(!DueBackFilter::On(d).matches(None));
        let range = DueBackFilter::Between { from: date(2024, 6, 1), to: date(2024, 7, 1) };
        assert!(range.matches(Some(d)));
        assert!(!range.matches(Some(date(2024, 7, 1))));
        assert!(DueBackFilter::NoDate.matches(None));
        assert!(!DueBackFilter::HasDate.matches(None));
    }
}
