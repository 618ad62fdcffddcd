//! Admin Surface: declarative back-office configuration per record type.
//!
//! Everything here is static data (list columns, list filters, grouped edit fieldsets and
//! inlines) plus the projections that turn a record into a changelist row or a change form.
//! Integrity rules stay in the validation layer and the store.

use crate::error::AppError;
use crate::model::LoanStatus;
use crate::store::DueBackFilter;
use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::str::FromStr;

/// Record types registered with the admin site. Keys are the URL segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Author,
    Book,
    BookInstance,
    Language,
    User,
}

impl ModelKind {
    pub fn key(&self) -> &'static str {
        match self {
            ModelKind::Author => "author",
            ModelKind::Book => "book",
            ModelKind::BookInstance => "bookinstance",
            ModelKind::Language => "language",
            ModelKind::User => "user",
        }
    }
}

impl FromStr for ModelKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "author" => Ok(ModelKind::Author),
            "book" => Ok(ModelKind::Book),
            "bookinstance" => Ok(ModelKind::BookInstance),
            "language" => Ok(ModelKind::Language),
            "user" => Ok(ModelKind::User),
            _ => Err(AppError::NotFound(format!("admin model {}", s))),
        }
    }
}

/// One line of a fieldset: a single field, or several fields shown side by side.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(untagged)]
pub enum FieldRow {
    Single(&'static str),
    Inline(&'static [&'static str]),
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct Fieldset {
    pub name: Option<&'static str>,
    pub fields: &'static [FieldRow],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "field", rename_all = "lowercase")]
pub enum ListFilter {
    /// Filter by one of a field's fixed choices.
    Choices(&'static str),
    /// Relative date ranges plus has/no date.
    Date(&'static str),
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct InlineAdmin {
    pub model: ModelKind,
    /// Field on the inline model that points at the parent.
    pub fk: &'static str,
    pub style: &'static str,
    pub fields: &'static [&'static str],
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct ModelAdmin {
    pub model: ModelKind,
    pub verbose_name: &'static str,
    pub verbose_name_plural: &'static str,
    pub list_display: &'static [&'static str],
    pub list_filter: &'static [ListFilter],
    pub fieldsets: &'static [Fieldset],
    pub inlines: &'static [InlineAdmin],
}

/// Column showing the record's display string.
pub const STR_COLUMN: &str = "__str__";

const AUTHOR_ADMIN: ModelAdmin = ModelAdmin {
    model: ModelKind::Author,
    verbose_name: "Автор",
    verbose_name_plural: "Авторы",
    list_display: &["last_name", "name", "middle_name", "date_of_birth", "date_of_death"],
    list_filter: &[],
    fieldsets: &[Fieldset {
        name: None,
        fields: &[
            FieldRow::Single("name"),
            FieldRow::Single("last_name"),
            FieldRow::Single("middle_name"),
            FieldRow::Inline(&["date_of_birth", "date_of_death"]),
        ],
    }],
    inlines: &[],
};

const BOOK_INSTANCE_INLINE: InlineAdmin = InlineAdmin {
    model: ModelKind::BookInstance,
    fk: "book",
    style: "tabular",
    fields: &["id", "imprint", "status", "due_back", "borrower"],
};

const BOOK_ADMIN: ModelAdmin = ModelAdmin {
    model: ModelKind::Book,
    verbose_name: "Книга",
    verbose_name_plural: "Книги",
    list_display: &["title", "author"],
    list_filter: &[],
    fieldsets: &[Fieldset {
        name: None,
        fields: &[
            FieldRow::Single("title"),
            FieldRow::Single("author"),
            FieldRow::Single("yearOfRel"),
            FieldRow::Single("summary"),
            FieldRow::Single("isbn"),
            FieldRow::Single("genre"),
            FieldRow::Single("category"),
            FieldRow::Single("publisher"),
            FieldRow::Single("language"),
            FieldRow::Single("photoPreview"),
            FieldRow::Single("bookFile"),
        ],
    }],
    inlines: &[BOOK_INSTANCE_INLINE],
};

const BOOK_INSTANCE_ADMIN: ModelAdmin = ModelAdmin {
    model: ModelKind::BookInstance,
    verbose_name: "book instance",
    verbose_name_plural: "book instances",
    list_display: &["book", "status", "borrower", "due_back", "id"],
    list_filter: &[ListFilter::Choices("status"), ListFilter::Date("due_back")],
    fieldsets: &[
        Fieldset {
            name: None,
            fields: &[FieldRow::Single("book"), FieldRow::Single("imprint"), FieldRow::Single("id")],
        },
        Fieldset {
            name: Some("Availability"),
            fields: &[
                FieldRow::Single("status"),
                FieldRow::Single("due_back"),
                FieldRow::Single("borrower"),
            ],
        },
    ],
    inlines: &[],
};

const LANGUAGE_ADMIN: ModelAdmin = ModelAdmin {
    model: ModelKind::Language,
    verbose_name: "language",
    verbose_name_plural: "languages",
    list_display: &[STR_COLUMN],
    list_filter: &[],
    fieldsets: &[Fieldset {
        name: None,
        fields: &[FieldRow::Single("name")],
    }],
    inlines: &[],
};

const USER_ADMIN: ModelAdmin = ModelAdmin {
    model: ModelKind::User,
    verbose_name: "пользователь",
    verbose_name_plural: "пользователи",
    list_display: &["username", "email", "first_name", "last_name", "is_staff"],
    list_filter: &[],
    fieldsets: &[
        Fieldset {
            name: None,
            fields: &[FieldRow::Single("username"), FieldRow::Single("identity")],
        },
        Fieldset {
            name: Some("Personal info"),
            fields: &[
                FieldRow::Single("first_name"),
                FieldRow::Single("last_name"),
                FieldRow::Single("email"),
            ],
        },
        Fieldset {
            name: Some("Permissions"),
            fields: &[FieldRow::Single("is_staff"), FieldRow::Single("can_mark_returned")],
        },
    ],
    inlines: &[],
};

pub struct AdminSite {
    models: Vec<ModelAdmin>,
}

impl AdminSite {
    /// The catalog registrations.
    pub fn catalog() -> Self {
        AdminSite {
            models: vec![AUTHOR_ADMIN, BOOK_ADMIN, BOOK_INSTANCE_ADMIN, LANGUAGE_ADMIN, USER_ADMIN],
        }
    }

    pub fn models(&self) -> &[ModelAdmin] {
        &self.models
    }

    pub fn get(&self, kind: ModelKind) -> Result<&ModelAdmin, AppError> {
        self.models
            .iter()
            .find(|m| m.model == kind)
            .ok_or_else(|| AppError::NotFound(format!("admin model {}", kind.key())))
    }
}

impl ModelAdmin {
    /// Changelist column headers.
    pub fn columns(&self) -> Vec<&'static str> {
        self.list_display.to_vec()
    }

    /// One changelist row. `display` overrides raw values (related records, choice labels,
    /// and the `__str__` column).
    pub fn project(&self, record: &Value, display: &HashMap<&'static str, Value>) -> Vec<Value> {
        self.list_display
            .iter()
            .map(|col| {
                display
                    .get(col)
                    .cloned()
                    .unwrap_or_else(|| record.get(*col).cloned().unwrap_or(Value::Null))
            })
            .collect()
    }

    /// Change form: record values grouped by fieldset.
    pub fn change_form(&self, record: &Value) -> Value {
        let field = |name: &str| json!({ "name": name, "value": record.get(name).cloned().unwrap_or(Value::Null) });
        let fieldsets: Vec<Value> = self
            .fieldsets
            .iter()
            .map(|fs| {
                let rows: Vec<Value> = fs
                    .fields
                    .iter()
                    .map(|row| match row {
                        FieldRow::Single(name) => field(*name),
                        FieldRow::Inline(names) => Value::Array(names.iter().map(|n| field(*n)).collect()),
                    })
                    .collect();
                json!({ "name": fs.name, "fields": rows })
            })
            .collect();
        json!({ "model": self.model.key(), "fieldsets": fieldsets })
    }

    /// Choices offered for each list filter, for an operator UI.
    pub fn filter_choices(&self) -> Value {
        let mut out = Map::new();
        for f in self.list_filter {
            let (field, choices) = match f {
                ListFilter::Choices("status") => (
                    "status",
                    LoanStatus::ALL
                        .iter()
                        .map(|s| json!({ "value": s.code(), "label": s.label() }))
                        .collect::<Vec<_>>(),
                ),
                ListFilter::Choices(field) => (*field, Vec::new()),
                ListFilter::Date(field) => (
                    *field,
                    DateChoice::ALL
                        .iter()
                        .map(|c| json!({ "value": c.key(), "label": c.label() }))
                        .collect::<Vec<_>>(),
                ),
            };
            out.insert(field.to_string(), Value::Array(choices));
        }
        Value::Object(out)
    }
}

impl InlineAdmin {
    /// One inline row: the configured fields of a child record.
    pub fn project(&self, record: &Value) -> Vec<Value> {
        self.fields
            .iter()
            .map(|f| record.get(*f).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

/// Relative date filter choices for date columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateChoice {
    Today,
    Past7Days,
    ThisMonth,
    ThisYear,
    NoDate,
    HasDate,
}

impl DateChoice {
    pub const ALL: [DateChoice; 6] = [
        DateChoice::Today,
        DateChoice::Past7Days,
        DateChoice::ThisMonth,
        DateChoice::ThisYear,
        DateChoice::NoDate,
        DateChoice::HasDate,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            DateChoice::Today => "today",
            DateChoice::Past7Days => "past_7_days",
            DateChoice::ThisMonth => "this_month",
            DateChoice::ThisYear => "this_year",
            DateChoice::NoDate => "no_date",
            DateChoice::HasDate => "has_date",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DateChoice::Today => "Today",
            DateChoice::Past7Days => "Past 7 days",
            DateChoice::ThisMonth => "This month",
            DateChoice::ThisYear => "This year",
            DateChoice::NoDate => "No date",
            DateChoice::HasDate => "Has date",
        }
    }

    pub fn to_filter(&self, today: NaiveDate) -> DueBackFilter {
        let tomorrow = today + Duration::days(1);
        match self {
            DateChoice::Today => DueBackFilter::Between { from: today, to: tomorrow },
            DateChoice::Past7Days => DueBackFilter::Between {
                from: today - Duration::days(7),
                to: tomorrow,
            },
            DateChoice::ThisMonth => {
                let from = today.with_day(1).unwrap_or(today);
                let to = if from.month() == 12 {
                    NaiveDate::from_ymd_opt(from.year() + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(from.year(), from.month() + 1, 1)
                }
                .unwrap_or(tomorrow);
                DueBackFilter::Between { from, to }
            }
            DateChoice::ThisYear => {
                let from = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today);
                let to = NaiveDate::from_ymd_opt(today.year() + 1, 1, 1).unwrap_or(tomorrow);
                DueBackFilter::Between { from, to }
            }
            DateChoice::NoDate => DueBackFilter::NoDate,
            DateChoice::HasDate => DueBackFilter::HasDate,
        }
    }
}

/// Parse a date list-filter value: a choice key or an exact `YYYY-MM-DD` date.
pub fn parse_date_filter(value: &str, today: NaiveDate) -> Result<DueBackFilter, AppError> {
    if let Some(choice) = DateChoice::ALL.iter().find(|c| c.key() == value) {
        return Ok(choice.to_filter(today));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(DueBackFilter::On)
        .map_err(|_| AppError::BadRequest(format!("invalid date filter: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn registry_has_catalog_models() {
        let site = AdminSite::catalog();
        let keys: Vec<_> = site.models().iter().map(|m| m.model.key()).collect();
        assert_eq!(keys, vec!["author", "book", "bookinstance", "language", "user"]);
        assert_eq!(
            site.get(ModelKind::BookInstance).unwrap().columns(),
            vec!["book", "status", "borrower", "due_back", "id"]
        );
        assert!("cover".parse::<ModelKind>().is_err());
    }

    #[test]
    fn project_prefers_display_overrides() {
        let admin = AdminSite::catalog();
        let book = admin.get(ModelKind::Book).unwrap();
        let record = json!({ "title": "Дар", "author": 3 });
        let display = HashMap::from([("author", json!("Владимир Набоков Владимирович"))]);
        assert_eq!(book.project(&record, &display), vec![json!("Дар"), json!("Владимир Набоков Владимирович")]);
    }

    #[test]
    fn change_form_groups_fieldsets_and_inline_rows() {
        let admin = AdminSite::catalog();
        let author = admin.get(ModelKind::Author).unwrap();
        let form = author.change_form(&json!({ "name": "Осип", "date_of_birth": "1891-01-15" }));
        let rows = form["fieldsets"][0]["fields"].as_array().unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[3][0]["name"], "date_of_birth");
        assert_eq!(rows[3][0]["value"], "1891-01-15");
        assert_eq!(rows[3][1]["value"], Value::Null);

        let inst = admin.get(ModelKind::BookInstance).unwrap().change_form(&json!({}));
        assert_eq!(inst["fieldsets"][1]["name"], "Availability");
    }

    #[test]
    fn filter_choices_list_statuses_and_dates() {
        let admin = AdminSite::catalog();
        let choices = admin.get(ModelKind::BookInstance).unwrap().filter_choices();
        assert_eq!(choices["status"].as_array().unwrap().len(), 4);
        assert_eq!(choices["due_back"][0]["value"], "today");
    }

    #[test]
    fn date_choices_map_to_ranges() {
        let today = date(2024, 12, 15);
        assert_eq!(
            parse_date_filter("this_month", today).unwrap(),
            DueBackFilter::Between { from: date(2024, 12, 1), to: date(2025, 1, 1) }
        );
        assert_eq!(
            parse_date_filter("past_7_days", today).unwrap(),
            DueBackFilter::Between { from: date(2024, 12, 8), to: date(2024, 12, 16) }
        );
        assert_eq!(parse_date_filter("2024-01-02", today).unwrap(), DueBackFilter::On(date(2024, 1, 2)));
        assert_eq!(parse_date_filter("no_date", today).unwrap(), DueBackFilter::NoDate);
        assert!(parse_date_filter("yesterday", today).is_err());
    }
}
