//! Named schema constraints shared by every store implementation.
//!
//! The PostgreSQL DDL uses these names, so a database violation can be mapped back to
//! the same field set and message the in-memory store reports.

use crate::error::AppError;

pub const YEAR_OF_REL_MIN: i32 = 1000;
pub const YEAR_OF_REL_MAX: i32 = 9999;
pub const YEAR_OF_REL_CHECK: &str = "book_year_of_rel_check";

#[derive(Debug)]
pub struct UniqueConstraint {
    pub name: &'static str,
    pub fields: &'static [&'static str],
    pub message: &'static str,
}

impl UniqueConstraint {
    pub fn violation(&self) -> AppError {
        AppError::DuplicateKey {
            fields: self.fields.iter().map(|f| f.to_string()).collect(),
            message: self.message.to_string(),
        }
    }

    pub fn by_name(name: &str) -> Option<&'static UniqueConstraint> {
        UNIQUE_CONSTRAINTS.iter().copied().find(|c| c.name == name)
    }
}

pub const AUTHOR_IDENTITY: UniqueConstraint = UniqueConstraint {
    name: "author_identity_key",
    fields: &["name", "last_name", "middle_name", "date_of_birth", "date_of_death"],
    message: "Автор с такими значениями полей Имя, Фамилия, Отчество, Дата рождения и Дата смерти уже существует.",
};

pub const BOOK_IDENTITY: UniqueConstraint = UniqueConstraint {
    name: "book_identity_key",
    fields: &["title", "author", "yearOfRel", "publisher"],
    message: "Книга с такими значениями полей Название книги, Автор, Год выпуска и Издательство уже существует.",
};

pub const BOOK_ISBN: UniqueConstraint = UniqueConstraint {
    name: "book_isbn_key",
    fields: &["isbn"],
    message: "Книга с таким ISBN уже существует.",
};

pub const BORROWER_USERNAME: UniqueConstraint = UniqueConstraint {
    name: "borrower_username_key",
    fields: &["username"],
    message: "Пользователь с таким именем уже существует.",
};

pub const INSTANCE_ID: UniqueConstraint = UniqueConstraint {
    name: "book_instance_pkey",
    fields: &["id"],
    message: "Экземпляр книги с таким Id уже существует.",
};

pub const UNIQUE_CONSTRAINTS: &[&UniqueConstraint] =
    &[&AUTHOR_IDENTITY, &BOOK_IDENTITY, &BOOK_ISBN, &BORROWER_USERNAME, &INSTANCE_ID];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name() {
        let c = UniqueConstraint::by_name("book_isbn_key").expect("registered");
        assert_eq!(c.fields, &["isbn"]);
        assert!(UniqueConstraint::by_name("nope").is_none());
    }

    #[test]
    fn violation_names_whole_tuple() {
        match BOOK_IDENTITY.violation() {
            AppError::DuplicateKey { fields, .. } => {
                assert_eq!(fields, vec!["title", "author", "yearOfRel", "publisher"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
