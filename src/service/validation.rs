//! Field-level validation applied before any write reaches the store.
//!
//! The first failing field wins, in declaration order. Messages are user-facing.

use crate::error::AppError;
use crate::model::{
    AuthorInput, BookInput, BookInstanceInput, BorrowerInput, LanguageInput, YEAR_OF_REL_MAX, YEAR_OF_REL_MIN,
};
use chrono::{Duration, NaiveDate};

/// Upper bound for image uploads: 2 MiB.
pub const IMAGE_SIZE_LIMIT: usize = 2 * 1024 * 1024;

/// Renewals may not extend a loan further than this from today.
pub const MAX_RENEWAL_WEEKS: i64 = 4;

const REQUIRED: &str = "Обязательное поле.";

pub trait Validate {
    fn validate(&self) -> Result<(), AppError>;
}

fn required(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::constraint(field, REQUIRED));
    }
    Ok(())
}

fn required_some<T>(field: &str, value: Option<T>) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::constraint(field, REQUIRED))
}

/// Length is counted in characters, not bytes.
fn max_chars(field: &str, value: &str, max: usize) -> Result<(), AppError> {
    let len = value.chars().count();
    if len > max {
        return Err(AppError::constraint(
            field,
            format!(
                "Убедитесь, что это значение содержит не более {} символов (сейчас {}).",
                max, len
            ),
        ));
    }
    Ok(())
}

pub fn validate_year_of_rel(year: i32) -> Result<(), AppError> {
    if year < YEAR_OF_REL_MIN {
        return Err(AppError::OutOfRange {
            field: "yearOfRel".into(),
            message: format!("Убедитесь, что это значение больше либо равно {}.", YEAR_OF_REL_MIN),
        });
    }
    if year > YEAR_OF_REL_MAX {
        return Err(AppError::OutOfRange {
            field: "yearOfRel".into(),
            message: format!("Убедитесь, что это значение меньше либо равно {}.", YEAR_OF_REL_MAX),
        });
    }
    Ok(())
}

/// Size check for image uploads (book preview, covers).
pub fn validate_image_size(field: &str, size: usize) -> Result<(), AppError> {
    if size > IMAGE_SIZE_LIMIT {
        return Err(AppError::PayloadTooLarge {
            field: field.to_string(),
            message: "Файл слишком большой. Размер файла не должен превышать 2MB".into(),
        });
    }
    Ok(())
}

/// Size, then a full decode: a valid header over truncated or corrupt data is rejected too.
pub fn validate_image(field: &str, bytes: &[u8]) -> Result<(), AppError> {
    validate_image_size(field, bytes.len())?;
    if let Err(e) = image::load_from_memory(bytes) {
        tracing::debug!(field, error = %e, "image upload failed to decode");
        return Err(AppError::constraint(
            field,
            "Загрузите правильное изображение. Файл, который вы загрузили, поврежден или не является изображением.",
        ));
    }
    Ok(())
}

/// A renewal date may not lie in the past nor more than four weeks ahead of `today`.
pub fn validate_renewal_date(date: NaiveDate, today: NaiveDate) -> Result<(), AppError> {
    if date < today {
        return Err(AppError::constraint("renewal_date", "Неверная дата: продление в прошлом."));
    }
    if date > today + Duration::weeks(MAX_RENEWAL_WEEKS) {
        return Err(AppError::constraint(
            "renewal_date",
            "Неверная дата: продление более чем на 4 недели вперёд.",
        ));
    }
    Ok(())
}

impl Validate for LanguageInput {
    fn validate(&self) -> Result<(), AppError> {
        required("name", &self.name)?;
        max_chars("name", &self.name, 200)
    }
}

impl Validate for AuthorInput {
    fn validate(&self) -> Result<(), AppError> {
        required("name", &self.name)?;
        max_chars("name", &self.name, 100)?;
        max_chars("last_name", &self.last_name, 100)?;
        required("middle_name", &self.middle_name)?;
        max_chars("middle_name", &self.middle_name, 100)?;
        if let (Some(born), Some(died)) = (self.date_of_birth, self.date_of_death) {
            if died < born {
                return Err(AppError::ConstraintViolation {
                    fields: vec!["date_of_birth".into(), "date_of_death".into()],
                    message: "Дата смерти не может быть раньше даты рождения.".into(),
                });
            }
        }
        Ok(())
    }
}

impl Validate for BookInput {
    fn validate(&self) -> Result<(), AppError> {
        required("title", &self.title)?;
        max_chars("title", &self.title, 100)?;
        required_some("author", self.author)?;
        let year = required_some("yearOfRel", self.year_of_rel)?;
        validate_year_of_rel(year)?;
        required("summary", &self.summary)?;
        max_chars("summary", &self.summary, 1000)?;
        required("isbn", &self.isbn)?;
        max_chars("isbn", &self.isbn, 13)?;
        max_chars("genre", &self.genre, 100)?;
        max_chars("category", &self.category, 100)?;
        max_chars("publisher", &self.publisher, 100)
    }
}

impl Validate for BookInstanceInput {
    fn validate(&self) -> Result<(), AppError> {
        required("imprint", &self.imprint)?;
        max_chars("imprint", &self.imprint, 200)
    }
}

impl Validate for BorrowerInput {
    fn validate(&self) -> Result<(), AppError> {
        required("username", &self.username)?;
        max_chars("username", &self.username, 150)?;
        max_chars("first_name", &self.first_name, 150)?;
        max_chars("last_name", &self.last_name, 150)?;
        max_chars("email", &self.email, 254)?;
        if !self.email.is_empty() && (!self.email.contains('@') || self.email.len() < 3) {
            return Err(AppError::constraint("email", "Введите правильный адрес электронной почты."));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> BookInput {
        BookInput {
            title: "Мастер и Маргарита".into(),
            author: Some(1),
            year_of_rel: Some(1967),
            summary: "Роман".into(),
            isbn: "9785170878888".into(),
            ..Default::default()
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn valid_book_passes() {
        book().validate().unwrap();
    }

    #[test]
    fn year_bounds_are_inclusive() {
        for year in [1000, 9999] {
            let b = BookInput { year_of_rel: Some(year), ..book() };
            b.validate().unwrap();
        }
        for year in [999, 10000, -5] {
            let b = BookInput { year_of_rel: Some(year), ..book() };
            assert!(matches!(b.validate(), Err(AppError::OutOfRange { .. })), "year {year}");
        }
    }

    #[test]
    fn missing_year_is_required_not_range() {
        let b = BookInput { year_of_rel: None, ..book() };
        match b.validate() {
            Err(AppError::ConstraintViolation { fields, message }) => {
                assert_eq!(fields, vec!["yearOfRel"]);
                assert_eq!(message, REQUIRED);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn isbn_longer_than_13_chars_rejected() {
        let b = BookInput { isbn: "97851708788889".into(), ..book() };
        assert_eq!(b.validate().unwrap_err().fields(), Some(vec!["isbn".to_string()]));
    }

    #[test]
    fn lengths_counted_in_chars() {
        // 100 Cyrillic characters are 200 bytes but still fit.
        let b = BookInput { title: "я".repeat(100), ..book() };
        b.validate().unwrap();
        let b = BookInput { title: "я".repeat(101), ..book() };
        assert!(b.validate().is_err());
    }

    #[test]
    fn author_requires_name_and_middle_name() {
        let a = AuthorInput { name: "Антон".into(), ..Default::default() };
        assert_eq!(a.validate().unwrap_err().fields(), Some(vec!["middle_name".to_string()]));
        let a = AuthorInput { middle_name: "Чехов".into(), ..Default::default() };
        assert_eq!(a.validate().unwrap_err().fields(), Some(vec!["name".to_string()]));
    }

    #[test]
    fn image_size_limit() {
        validate_image_size("cover", IMAGE_SIZE_LIMIT).unwrap();
        assert!(matches!(
            validate_image_size("cover", IMAGE_SIZE_LIMIT + 1),
            Err(AppError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn image_must_decode_fully() {
        let mut png = Vec::new();
        image::RgbImage::new(2, 2)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        validate_image("photoPreview", &png).unwrap();

        let png_header = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert!(matches!(
            validate_image("photoPreview", &png_header),
            Err(AppError::ConstraintViolation { .. })
        ));
        assert!(validate_image("photoPreview", &png[..png.len() / 2]).is_err());
        assert!(matches!(
            validate_image("photoPreview", b"not an image at all"),
            Err(AppError::ConstraintViolation { .. })
        ));
    }

    #[test]
    fn oversized_image_reports_size_before_format() {
        let bytes = vec![0u8; IMAGE_SIZE_LIMIT + 1];
        assert!(matches!(validate_image("cover", &bytes), Err(AppError::PayloadTooLarge { .. })));
    }

    #[test]
    fn renewal_window() {
        let today = date(2024, 3, 1);
        validate_renewal_date(today, today).unwrap();
        validate_renewal_date(today + Duration::weeks(4), today).unwrap();
        assert!(validate_renewal_date(date(2024, 2, 29), today).is_err());
        assert!(validate_renewal_date(today + Duration::weeks(4) + Duration::days(1), today).is_err());
    }
}
