//! Catalog records: languages, authors, books, loanable copies, borrowers and covers.
//!
//! Records are plain data. Inputs (`*Input`) are what create/update accept; the store
//! assigns ids. Field-level checks live in `service::validation`, schema-level ones
//! (uniqueness, references, delete rules) in the store.

mod author;
mod book;
mod borrower;
mod constraint;
mod cover;
mod instance;
mod language;

pub use author::{Author, AuthorInput};
pub use book::{Book, BookInput, MediaField};
pub use borrower::{Borrower, BorrowerInput};
pub use constraint::{
    UniqueConstraint, AUTHOR_IDENTITY, BOOK_IDENTITY, BOOK_ISBN, BORROWER_USERNAME, INSTANCE_ID, UNIQUE_CONSTRAINTS,
    YEAR_OF_REL_CHECK, YEAR_OF_REL_MAX, YEAR_OF_REL_MIN,
};
pub use cover::Cover;
pub use instance::{BookInstance, BookInstanceInput, BookInstanceView, LoanStatus};
pub use language::{Language, LanguageInput};

use chrono::NaiveDate;

/// Current local date; the reference point for overdue and renewal checks.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
