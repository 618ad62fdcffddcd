use crate::routes::{reverse, RouteName};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub last_name: String,
    pub middle_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_death: Option<NaiveDate>,
}

impl Author {
    pub fn absolute_url(&self) -> String {
        reverse(RouteName::AuthorDetail, Some(&self.id.to_string()))
    }
}

/// Display form used by lists and the admin: "name last_name middle_name".
impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.last_name, self.middle_name)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub middle_name: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub date_of_death: Option<NaiveDate>,
}

impl AuthorInput {
    /// Values of the author uniqueness tuple.
    pub fn identity(&self) -> (&str, &str, &str, Option<NaiveDate>, Option<NaiveDate>) {
        (
            &self.name,
            &self.last_name,
            &self.middle_name,
            self.date_of_birth,
            self.date_of_death,
        )
    }
}

impl From<&Author> for AuthorInput {
    fn from(a: &Author) -> Self {
        AuthorInput {
            name: a.name.clone(),
            last_name: a.last_name.clone(),
            middle_name: a.middle_name.clone(),
            date_of_birth: a.date_of_birth,
            date_of_death: a.date_of_death,
        }
    }
}
