//! In-process record store. Same rules as the PostgreSQL schema, checked in code.

use super::{not_found, BookFilter, CatalogSummary, InstanceFilter, Page, RecordStore};
use crate::error::AppError;
use crate::model::{
    Author, AuthorInput, Book, BookInput, BookInstance, BookInstanceInput, Borrower, BorrowerInput, Cover, Language,
    LanguageInput, LoanStatus, MediaField, AUTHOR_IDENTITY, BOOK_IDENTITY, BOOK_ISBN, BORROWER_USERNAME,
    INSTANCE_ID,
};
use crate::service::validation::validate_year_of_rel;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const INVALID_CHOICE: &str = "Выберите корректный вариант. Вашего варианта нет среди допустимых значений.";

#[derive(Default)]
struct Tables {
    seq: HashMap<&'static str, i64>,
    languages: BTreeMap<i64, Language>,
    authors: BTreeMap<i64, Author>,
    books: BTreeMap<i64, Book>,
    instances: BTreeMap<Uuid, BookInstance>,
    borrowers: BTreeMap<i64, Borrower>,
    covers: BTreeMap<i64, Cover>,
}

impl Tables {
    fn next_id(&mut self, table: &'static str) -> i64 {
        let n = self.seq.entry(table).or_insert(0);
        *n += 1;
        *n
    }

    /// An empty date never collides: NULLs are distinct in the unique tuple.
    fn check_author(&self, id: Option<i64>, input: &AuthorInput) -> Result<(), AppError> {
        if input.date_of_birth.is_none() || input.date_of_death.is_none() {
            return Ok(());
        }
        let taken = self
            .authors
            .values()
            .any(|a| Some(a.id) != id && AuthorInput::from(a).identity() == input.identity());
        if taken {
            return Err(AUTHOR_IDENTITY.violation());
        }
        Ok(())
    }

    fn check_book(&self, id: Option<i64>, input: &BookInput) -> Result<i64, AppError> {
        let author_id = input
            .author
            .filter(|a| self.authors.contains_key(a))
            .ok_or_else(|| AppError::constraint("author", INVALID_CHOICE))?;
        if let Some(lang) = input.language {
            if !self.languages.contains_key(&lang) {
                return Err(AppError::constraint("language", INVALID_CHOICE));
            }
        }
        let year = input
            .year_of_rel
            .ok_or_else(|| AppError::constraint("yearOfRel", "Обязательное поле."))?;
        validate_year_of_rel(year)?;
        if self.other_books(id).any(|b| b.isbn == input.isbn) {
            return Err(BOOK_ISBN.violation());
        }
        if self.other_books(id).any(|b| {
            b.title == input.title && b.author_id == author_id && b.year_of_rel == year && b.publisher == input.publisher
        }) {
            return Err(BOOK_IDENTITY.violation());
        }
        Ok(author_id)
    }

    fn other_books(&self, id: Option<i64>) -> impl Iterator<Item = &Book> + '_ {
        self.books.values().filter(move |b| Some(b.id) != id)
    }

    fn check_instance(&self, input: &BookInstanceInput) -> Result<(), AppError> {
        if let Some(book) = input.book {
            if !self.books.contains_key(&book) {
                return Err(AppError::constraint("book", INVALID_CHOICE));
            }
        }
        if let Some(borrower) = input.borrower {
            if !self.borrowers.contains_key(&borrower) {
                return Err(AppError::constraint("borrower", INVALID_CHOICE));
            }
        }
        Ok(())
    }

    fn check_borrower(&self, id: Option<i64>, input: &BorrowerInput) -> Result<(), AppError> {
        if self
            .borrowers
            .values()
            .any(|b| Some(b.id) != id && b.username == input.username)
        {
            return Err(BORROWER_USERNAME.violation());
        }
        Ok(())
    }

    fn book_from(&self, id: i64, author_id: i64, input: &BookInput, media: Option<&Book>) -> Book {
        Book {
            id,
            title: input.title.clone(),
            author_id,
            year_of_rel: input.year_of_rel.unwrap_or_default(),
            summary: input.summary.clone(),
            isbn: input.isbn.clone(),
            genre: input.genre.clone(),
            category: input.category.clone(),
            publisher: input.publisher.clone(),
            language_id: input.language,
            photo_preview: media.and_then(|b| b.photo_preview.clone()),
            book_file: media.and_then(|b| b.book_file.clone()),
        }
    }

    fn author_sort_key(&self, author_id: i64) -> (String, String) {
        self.authors
            .get(&author_id)
            .map(|a| (a.last_name.clone(), a.name.clone()))
            .unwrap_or_default()
    }
}

fn author_from(id: i64, input: &AuthorInput) -> Author {
    Author {
        id,
        name: input.name.clone(),
        last_name: input.last_name.clone(),
        middle_name: input.middle_name.clone(),
        date_of_birth: input.date_of_birth,
        date_of_death: input.date_of_death,
    }
}

fn instance_from(id: Uuid, input: &BookInstanceInput) -> BookInstance {
    BookInstance {
        id,
        book_id: input.book,
        imprint: input.imprint.clone(),
        due_back: input.due_back,
        borrower_id: input.borrower,
        status: input.status,
    }
}

fn borrower_from(id: i64, input: &BorrowerInput) -> Borrower {
    Borrower {
        id,
        username: input.username.clone(),
        first_name: input.first_name.clone(),
        last_name: input.last_name.clone(),
        email: input.email.clone(),
        is_staff: input.is_staff,
        can_mark_returned: input.can_mark_returned,
        identity: input.identity.clone(),
    }
}

/// Mutex-guarded tables; writes are serialized by the lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_language(&self, input: &LanguageInput) -> Result<Language, AppError> {
        let mut t = self.tables();
        let id = t.next_id("language");
        let row = Language { id, name: input.name.clone() };
        t.languages.insert(id, row.clone());
        Ok(row)
    }

    async fn update_language(&self, id: i64, input: &LanguageInput) -> Result<Language, AppError> {
        let mut t = self.tables();
        let row = t.languages.get_mut(&id).ok_or_else(|| not_found("language", id))?;
        row.name = input.name.clone();
        Ok(row.clone())
    }

    async fn get_language(&self, id: i64) -> Result<Option<Language>, AppError> {
        Ok(self.tables().languages.get(&id).cloned())
    }

    async fn list_languages(&self, page: Page) -> Result<Vec<Language>, AppError> {
        Ok(page.slice(self.tables().languages.values().cloned().collect()))
    }

    async fn delete_language(&self, id: i64) -> Result<(), AppError> {
        let mut t = self.tables();
        t.languages.remove(&id).ok_or_else(|| not_found("language", id))?;
        for book in t.books.values_mut().filter(|b| b.language_id == Some(id)) {
            book.language_id = None;
        }
        Ok(())
    }

    async fn insert_author(&self, input: &AuthorInput) -> Result<Author, AppError> {
        let mut t = self.tables();
        t.check_author(None, input)?;
        let id = t.next_id("author");
        let row = author_from(id, input);
        t.authors.insert(id, row.clone());
        Ok(row)
    }

    async fn update_author(&self, id: i64, input: &AuthorInput) -> Result<Author, AppError> {
        let mut t = self.tables();
        if !t.authors.contains_key(&id) {
            return Err(not_found("author", id));
        }
        t.check_author(Some(id), input)?;
        let row = author_from(id, input);
        t.authors.insert(id, row.clone());
        Ok(row)
    }

    async fn get_author(&self, id: i64) -> Result<Option<Author>, AppError> {
        Ok(self.tables().authors.get(&id).cloned())
    }

    async fn list_authors(&self, page: Page) -> Result<Vec<Author>, AppError> {
        let mut rows: Vec<Author> = self.tables().authors.values().cloned().collect();
        rows.sort_by(|a, b| (&a.last_name, &a.name, a.id).cmp(&(&b.last_name, &b.name, b.id)));
        Ok(page.slice(rows))
    }

    async fn delete_author(&self, id: i64) -> Result<(), AppError> {
        let mut t = self.tables();
        if !t.authors.contains_key(&id) {
            return Err(not_found("author", id));
        }
        let book_ids: Vec<i64> = t.books.values().filter(|b| b.author_id == id).map(|b| b.id).collect();
        if let Some(blocked) = t
            .instances
            .values()
            .find(|i| i.book_id.map_or(false, |b| book_ids.contains(&b)))
        {
            tracing::warn!(author = id, copy = %blocked.id, "delete blocked by dependent rows");
            return Err(AppError::ReferentialIntegrity(format!(
                "author {} has book {} still referenced by copy {}",
                id,
                blocked.book_id.unwrap_or_default(),
                blocked.id
            )));
        }
        for book_id in &book_ids {
            t.books.remove(book_id);
        }
        t.authors.remove(&id);
        tracing::info!(author = id, cascaded_books = book_ids.len(), "author deleted");
        Ok(())
    }

    async fn insert_book(&self, input: &BookInput) -> Result<Book, AppError> {
        let mut t = self.tables();
        let author_id = t.check_book(None, input)?;
        let id = t.next_id("book");
        let row = t.book_from(id, author_id, input, None);
        t.books.insert(id, row.clone());
        Ok(row)
    }

    async fn update_book(&self, id: i64, input: &BookInput) -> Result<Book, AppError> {
        let mut t = self.tables();
        let existing = t.books.get(&id).cloned().ok_or_else(|| not_found("book", id))?;
        let author_id = t.check_book(Some(id), input)?;
        let row = t.book_from(id, author_id, input, Some(&existing));
        t.books.insert(id, row.clone());
        Ok(row)
    }

    async fn set_book_media(&self, id: i64, field: MediaField, path: Option<&str>) -> Result<Book, AppError> {
        let mut t = self.tables();
        let book = t.books.get_mut(&id).ok_or_else(|| not_found("book", id))?;
        let value = path.map(str::to_string);
        match field {
            MediaField::PhotoPreview => book.photo_preview = value,
            MediaField::BookFile => book.book_file = value,
        }
        Ok(book.clone())
    }

    async fn get_book(&self, id: i64) -> Result<Option<Book>, AppError> {
        Ok(self.tables().books.get(&id).cloned())
    }

    async fn list_books(&self, filter: &BookFilter, page: Page) -> Result<Vec<Book>, AppError> {
        let t = self.tables();
        let mut rows: Vec<Book> = t
            .books
            .values()
            .filter(|b| filter.author_id.map_or(true, |a| b.author_id == a))
            .filter(|b| filter.language_id.map_or(true, |l| b.language_id == Some(l)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (&a.title, t.author_sort_key(a.author_id), a.id).cmp(&(&b.title, t.author_sort_key(b.author_id), b.id))
        });
        Ok(page.slice(rows))
    }

    async fn delete_book(&self, id: i64) -> Result<(), AppError> {
        let mut t = self.tables();
        if !t.books.contains_key(&id) {
            return Err(not_found("book", id));
        }
        if let Some(blocked) = t.instances.values().find(|i| i.book_id == Some(id)) {
            tracing::warn!(book = id, copy = %blocked.id, "delete blocked by dependent rows");
            return Err(AppError::ReferentialIntegrity(format!(
                "book {} is still referenced by copy {}",
                id, blocked.id
            )));
        }
        t.books.remove(&id);
        Ok(())
    }

    async fn insert_instance(&self, input: &BookInstanceInput) -> Result<BookInstance, AppError> {
        let mut t = self.tables();
        t.check_instance(input)?;
        let id = input.id.unwrap_or_else(Uuid::new_v4);
        if t.instances.contains_key(&id) {
            return Err(INSTANCE_ID.violation());
        }
        let row = instance_from(id, input);
        t.instances.insert(id, row.clone());
        Ok(row)
    }

    async fn update_instance(&self, id: Uuid, input: &BookInstanceInput) -> Result<BookInstance, AppError> {
        let mut t = self.tables();
        if !t.instances.contains_key(&id) {
            return Err(not_found("book instance", id));
        }
        t.check_instance(input)?;
        let row = instance_from(id, input);
        t.instances.insert(id, row.clone());
        Ok(row)
    }

    async fn get_instance(&self, id: Uuid) -> Result<Option<BookInstance>, AppError> {
        Ok(self.tables().instances.get(&id).cloned())
    }

    async fn list_instances(&self, filter: &InstanceFilter, page: Page) -> Result<Vec<BookInstance>, AppError> {
        let mut rows: Vec<BookInstance> = self
            .tables()
            .instances
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        // NULL due dates sort last, as in PostgreSQL ascending order.
        rows.sort_by(|a, b| {
            (a.due_back.is_none(), a.due_back, a.id).cmp(&(b.due_back.is_none(), b.due_back, b.id))
        });
        Ok(page.slice(rows))
    }

    async fn delete_instance(&self, id: Uuid) -> Result<(), AppError> {
        self.tables()
            .instances
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found("book instance", id))
    }

    async fn insert_borrower(&self, input: &BorrowerInput) -> Result<Borrower, AppError> {
        let mut t = self.tables();
        t.check_borrower(None, input)?;
        let id = t.next_id("borrower");
        let row = borrower_from(id, input);
        t.borrowers.insert(id, row.clone());
        Ok(row)
    }

    async fn update_borrower(&self, id: i64, input: &BorrowerInput) -> Result<Borrower, AppError> {
        let mut t = self.tables();
        if !t.borrowers.contains_key(&id) {
            return Err(not_found("user", id));
        }
        t.check_borrower(Some(id), input)?;
        let row = borrower_from(id, input);
        t.borrowers.insert(id, row.clone());
        Ok(row)
    }

    async fn get_borrower(&self, id: i64) -> Result<Option<Borrower>, AppError> {
        Ok(self.tables().borrowers.get(&id).cloned())
    }

    async fn list_borrowers(&self, page: Page) -> Result<Vec<Borrower>, AppError> {
        Ok(page.slice(self.tables().borrowers.values().cloned().collect()))
    }

    async fn delete_borrower(&self, id: i64) -> Result<(), AppError> {
        let mut t = self.tables();
        t.borrowers.remove(&id).ok_or_else(|| not_found("user", id))?;
        for instance in t.instances.values_mut().filter(|i| i.borrower_id == Some(id)) {
            instance.borrower_id = None;
        }
        Ok(())
    }

    async fn insert_cover(&self, path: &str) -> Result<Cover, AppError> {
        let mut t = self.tables();
        let id = t.next_id("cover");
        let row = Cover { id, cover: path.to_string() };
        t.covers.insert(id, row.clone());
        Ok(row)
    }

    async fn get_cover(&self, id: i64) -> Result<Option<Cover>, AppError> {
        Ok(self.tables().covers.get(&id).cloned())
    }

    async fn list_covers(&self, page: Page) -> Result<Vec<Cover>, AppError> {
        Ok(page.slice(self.tables().covers.values().cloned().collect()))
    }

    async fn delete_cover(&self, id: i64) -> Result<(), AppError> {
        self.tables()
            .covers
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found("cover", id))
    }

    async fn summary(&self) -> Result<CatalogSummary, AppError> {
        let t = self.tables();
        Ok(CatalogSummary {
            num_books: t.books.len() as i64,
            num_instances: t.instances.len() as i64,
            num_instances_available: t
                .instances
                .values()
                .filter(|i| i.status == LoanStatus::Available)
                .count() as i64,
            num_authors: t.authors.len() as i64,
            num_languages: t.languages.len() as i64,
        })
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}
