use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

/// Loan status of a physical copy. Stored as a one-letter code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanStatus {
    #[default]
    #[serde(rename = "d", alias = "")]
    Maintenance,
    #[serde(rename = "o")]
    OnLoan,
    #[serde(rename = "a")]
    Available,
    #[serde(rename = "r")]
    Reserved,
}

impl LoanStatus {
    pub const ALL: [LoanStatus; 4] = [
        LoanStatus::Maintenance,
        LoanStatus::OnLoan,
        LoanStatus::Available,
        LoanStatus::Reserved,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            LoanStatus::Maintenance => "d",
            LoanStatus::OnLoan => "o",
            LoanStatus::Available => "a",
            LoanStatus::Reserved => "r",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LoanStatus::Maintenance => "Maintenance",
            LoanStatus::OnLoan => "On loan",
            LoanStatus::Available => "Available",
            LoanStatus::Reserved => "Reserved",
        }
    }
}

impl FromStr for LoanStatus {
    type Err = AppError;

    /// A blank code is the default status.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(LoanStatus::default());
        }
        LoanStatus::ALL
            .into_iter()
            .find(|st| st.code() == s)
            .ok_or_else(|| {
                AppError::constraint(
                    "status",
                    format!("Значения {:?} нет среди допустимых вариантов.", s),
                )
            })
    }
}

/// A specific copy of a book that can be borrowed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookInstance {
    pub id: Uuid,
    #[serde(rename = "book")]
    pub book_id: Option<i64>,
    pub imprint: String,
    pub due_back: Option<NaiveDate>,
    #[serde(rename = "borrower")]
    pub borrower_id: Option<i64>,
    pub status: LoanStatus,
}

impl BookInstance {
    /// True when a due date is set and lies strictly before `today`.
    pub fn is_overdue_on(&self, today: NaiveDate) -> bool {
        matches!(self.due_back, Some(due) if due < today)
    }

    pub fn is_overdue(&self) -> bool {
        self.is_overdue_on(super::today())
    }

    pub fn view(self, today: NaiveDate) -> BookInstanceView {
        let is_overdue = self.is_overdue_on(today);
        BookInstanceView {
            instance: self,
            is_overdue,
        }
    }

    /// Display form: "id (book title)", or just the id when the book reference is empty.
    pub fn display_with(&self, book_title: Option<&str>) -> String {
        match book_title {
            Some(title) => format!("{} ({})", self.id, title),
            None => self.id.to_string(),
        }
    }
}

impl fmt::Display for BookInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Instance as returned over the API, with the derived overdue flag.
#[derive(Clone, Debug, Serialize)]
pub struct BookInstanceView {
    #[serde(flatten)]
    pub instance: BookInstance,
    pub is_overdue: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookInstanceInput {
    /// Generated when absent.
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub book: Option<i64>,
    #[serde(default)]
    pub imprint: String,
    #[serde(default)]
    pub due_back: Option<NaiveDate>,
    #[serde(default)]
    pub borrower: Option<i64>,
    #[serde(default)]
    pub status: LoanStatus,
}

impl From<&BookInstance> for BookInstanceInput {
    fn from(i: &BookInstance) -> Self {
        BookInstanceInput {
            id: Some(i.id),
            book: i.book_id,
            imprint: i.imprint.clone(),
            due_back: i.due_back,
            borrower: i.borrower_id,
            status: i.status,
        }
    }
}
