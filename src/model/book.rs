use crate::routes::{reverse, RouteName};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A catalog entry (not a specific copy of a book).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Book {
    pub id: i64,
    pub title: String,
    #[serde(rename = "author")]
    pub author_id: i64,
    #[serde(rename = "yearOfRel")]
    pub year_of_rel: i32,
    pub summary: String,
    pub isbn: String,
    pub genre: String,
    pub category: String,
    pub publisher: String,
    #[serde(rename = "language")]
    pub language_id: Option<i64>,
    #[serde(rename = "photoPreview")]
    pub photo_preview: Option<String>,
    #[serde(rename = "bookFile")]
    pub book_file: Option<String>,
}

impl Book {
    pub fn absolute_url(&self) -> String {
        reverse(RouteName::BookDetail, Some(&self.id.to_string()))
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

/// Create/update payload. Media fields are set through uploads, never here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: Option<i64>,
    #[serde(default, rename = "yearOfRel")]
    pub year_of_rel: Option<i32>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub isbn: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub language: Option<i64>,
}

impl From<&Book> for BookInput {
    fn from(b: &Book) -> Self {
        BookInput {
            title: b.title.clone(),
            author: Some(b.author_id),
            year_of_rel: Some(b.year_of_rel),
            summary: b.summary.clone(),
            isbn: b.isbn.clone(),
            genre: b.genre.clone(),
            category: b.category.clone(),
            publisher: b.publisher.clone(),
            language: b.language_id,
        }
    }
}

/// File-backed columns of a book.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaField {
    PhotoPreview,
    BookFile,
}

impl MediaField {
    /// Field name as exposed over the API.
    pub fn field_name(&self) -> &'static str {
        match self {
            MediaField::PhotoPreview => "photoPreview",
            MediaField::BookFile => "bookFile",
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            MediaField::PhotoPreview => "photo_preview",
            MediaField::BookFile => "book_file",
        }
    }

    pub fn upload_to(&self) -> &'static str {
        match self {
            MediaField::PhotoPreview => "cover/",
            MediaField::BookFile => "books/",
        }
    }

    /// Image fields are size-limited and must sniff as an image.
    pub fn is_image(&self) -> bool {
        matches!(self, MediaField::PhotoPreview)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_legacy_field_names() {
        let b = Book {
            id: 7,
            title: "Война и мир".into(),
            author_id: 1,
            year_of_rel: 1869,
            summary: "…".into(),
            isbn: "9785170906307".into(),
            genre: String::new(),
            category: String::new(),
            publisher: String::new(),
            language_id: None,
            photo_preview: None,
            book_file: None,
        };
        let v = serde_json::to_value(&b).unwrap();
        assert_eq!(v["yearOfRel"], 1869);
        assert_eq!(v["author"], 1);
        assert!(v["photoPreview"].is_null());
        assert_eq!(b.absolute_url(), "/book/7");
    }

    #[test]
    fn input_accepts_partial_json() {
        let input: BookInput = serde_json::from_str(r#"{"title":"T","yearOfRel":2001}"#).unwrap();
        assert_eq!(input.year_of_rel, Some(2001));
        assert_eq!(input.author, None);
        assert_eq!(input.publisher, "");
    }
}
