//! Admin JSON API: registry, changelists, change forms and record writes (staff only).

use crate::admin::{parse_date_filter, ModelAdmin, ModelKind, STR_COLUMN};
use crate::error::AppError;
use crate::extractors::CurrentUserId;
use crate::model::{
    self, AuthorInput, BookInput, BookInstanceInput, BorrowerInput, LanguageInput, LoanStatus,
};
use crate::response::{success_created, success_one, One};
use crate::service::validation::Validate;
use crate::state::AppState;
use crate::store::{BookFilter, InstanceFilter, Page, RecordStore};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Clone, Copy, Debug)]
enum RecordId {
    Int(i64),
    Uuid(Uuid),
}

fn parse_id(kind: ModelKind, id_str: &str) -> Result<RecordId, AppError> {
    match kind {
        ModelKind::BookInstance => Uuid::parse_str(id_str)
            .map(RecordId::Uuid)
            .map_err(|_| AppError::BadRequest("invalid uuid".into())),
        _ => id_str
            .parse()
            .map(RecordId::Int)
            .map_err(|_| AppError::BadRequest("invalid id".into())),
    }
}

fn to_json<T: Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn decode<T: DeserializeOwned + Validate>(body: Value) -> Result<T, AppError> {
    if !body.is_object() {
        return Err(AppError::BadRequest("body must be a JSON object".into()));
    }
    let input: T =
        serde_json::from_value(body).map_err(|e| AppError::BadRequest(format!("invalid body: {}", e)))?;
    input.validate()?;
    Ok(input)
}

fn page_from(params: &HashMap<String, String>) -> Result<Page, AppError> {
    let num = |key: &str| -> Result<Option<u32>, AppError> {
        params
            .get(key)
            .map(|v| v.parse().map_err(|_| AppError::BadRequest(format!("invalid {}: {}", key, v))))
            .transpose()
    };
    Ok(Page {
        limit: num("limit")?,
        offset: num("offset")?,
    })
}

/// Display strings for referenced records, fetched once per changelist.
struct Labels<'a> {
    store: &'a dyn RecordStore,
    authors: HashMap<i64, String>,
    books: HashMap<i64, String>,
    users: HashMap<i64, String>,
}

impl<'a> Labels<'a> {
    fn new(store: &'a dyn RecordStore) -> Self {
        Labels {
            store,
            authors: HashMap::new(),
            books: HashMap::new(),
            users: HashMap::new(),
        }
    }

    async fn author(&mut self, id: i64) -> Result<Value, AppError> {
        if !self.authors.contains_key(&id) {
            let label = self.store.get_author(id).await?.map(|a| a.to_string()).unwrap_or_default();
            self.authors.insert(id, label);
        }
        Ok(json!(self.authors.get(&id)))
    }

    async fn book(&mut self, id: Option<i64>) -> Result<Option<String>, AppError> {
        let Some(id) = id else { return Ok(None) };
        if !self.books.contains_key(&id) {
            let label = self.store.get_book(id).await?.map(|b| b.title).unwrap_or_default();
            self.books.insert(id, label);
        }
        Ok(self.books.get(&id).cloned())
    }

    async fn user(&mut self, id: Option<i64>) -> Result<Value, AppError> {
        let Some(id) = id else { return Ok(Value::Null) };
        if !self.users.contains_key(&id) {
            let label = self.store.get_borrower(id).await?.map(|u| u.username).unwrap_or_default();
            self.users.insert(id, label);
        }
        Ok(json!(self.users.get(&id)))
    }
}

#[derive(Serialize)]
struct ChangeRow {
    id: Value,
    display: String,
    values: Vec<Value>,
}

#[derive(Serialize)]
struct ChangeList {
    model: ModelKind,
    columns: Vec<&'static str>,
    filters: Value,
    rows: Vec<ChangeRow>,
    count: usize,
    limit: u32,
    offset: u32,
}

/// GET /admin/
pub async fn registry(
    State(state): State<AppState>,
    user: CurrentUserId,
) -> Result<One<Vec<ModelAdmin>>, AppError> {
    user.require_staff(state.store.as_ref()).await?;
    Ok(success_one(state.admin.models().to_vec()))
}

/// GET /admin/{model}/
pub async fn changelist(
    State(state): State<AppState>,
    user: CurrentUserId,
    Path(model_key): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<One<Value>, AppError> {
    let store = state.store.as_ref();
    user.require_staff(store).await?;
    let kind: ModelKind = model_key.parse()?;
    let admin = state.admin.get(kind)?;
    let page = page_from(&params)?;
    let mut labels = Labels::new(store);
    let mut rows = Vec::new();

    match kind {
        ModelKind::Author => {
            for a in store.list_authors(page).await? {
                rows.push(ChangeRow {
                    id: json!(a.id),
                    display: a.to_string(),
                    values: admin.project(&to_json(&a), &HashMap::new()),
                });
            }
        }
        ModelKind::Book => {
            for b in store.list_books(&BookFilter::default(), page).await? {
                let display = HashMap::from([("author", labels.author(b.author_id).await?)]);
                rows.push(ChangeRow {
                    id: json!(b.id),
                    display: b.to_string(),
                    values: admin.project(&to_json(&b), &display),
                });
            }
        }
        ModelKind::BookInstance => {
            let today = model::today();
            let filter = InstanceFilter {
                status: params
                    .get("status")
                    .filter(|s| !s.is_empty())
                    .map(|s| s.parse::<LoanStatus>())
                    .transpose()?,
                due_back: params.get("due_back").map(|v| parse_date_filter(v, today)).transpose()?,
                ..Default::default()
            };
            for i in store.list_instances(&filter, page).await? {
                let title = labels.book(i.book_id).await?;
                let display = HashMap::from([
                    ("book", json!(title)),
                    ("status", json!(i.status.label())),
                    ("borrower", labels.user(i.borrower_id).await?),
                ]);
                rows.push(ChangeRow {
                    id: json!(i.id),
                    display: i.display_with(title.as_deref()),
                    values: admin.project(&to_json(&i), &display),
                });
            }
        }
        ModelKind::Language => {
            for l in store.list_languages(page).await? {
                let display = HashMap::from([(STR_COLUMN, json!(l.to_string()))]);
                rows.push(ChangeRow {
                    id: json!(l.id),
                    display: l.to_string(),
                    values: admin.project(&to_json(&l), &display),
                });
            }
        }
        ModelKind::User => {
            for u in store.list_borrowers(page).await? {
                rows.push(ChangeRow {
                    id: json!(u.id),
                    display: u.to_string(),
                    values: admin.project(&to_json(&u), &HashMap::new()),
                });
            }
        }
    }

    let list = ChangeList {
        model: kind,
        columns: admin.columns(),
        filters: admin.filter_choices(),
        count: rows.len(),
        rows,
        limit: page.limit(),
        offset: page.offset(),
    };
    Ok(success_one(to_json(list)))
}

/// Fetch one record as JSON with its display string.
async fn fetch(store: &dyn RecordStore, kind: ModelKind, id: RecordId) -> Result<(Value, String), AppError> {
    let missing = || AppError::NotFound(format!("{} {}", kind.key(), display_id(id)));
    Ok(match (kind, id) {
        (ModelKind::Author, RecordId::Int(id)) => {
            let a = store.get_author(id).await?.ok_or_else(missing)?;
            (to_json(&a), a.to_string())
        }
        (ModelKind::Book, RecordId::Int(id)) => {
            let b = store.get_book(id).await?.ok_or_else(missing)?;
            (to_json(&b), b.to_string())
        }
        (ModelKind::BookInstance, RecordId::Uuid(id)) => {
            let i = store.get_instance(id).await?.ok_or_else(missing)?;
            let title = match i.book_id {
                Some(b) => store.get_book(b).await?.map(|b| b.title),
                None => None,
            };
            let display = i.display_with(title.as_deref());
            (to_json(i.view(model::today())), display)
        }
        (ModelKind::Language, RecordId::Int(id)) => {
            let l = store.get_language(id).await?.ok_or_else(missing)?;
            (to_json(&l), l.to_string())
        }
        (ModelKind::User, RecordId::Int(id)) => {
            let u = store.get_borrower(id).await?.ok_or_else(missing)?;
            (to_json(&u), u.to_string())
        }
        _ => return Err(missing()),
    })
}

fn display_id(id: RecordId) -> String {
    match id {
        RecordId::Int(n) => n.to_string(),
        RecordId::Uuid(u) => u.to_string(),
    }
}

/// GET /admin/{model}/{id}
pub async fn change_form(
    State(state): State<AppState>,
    user: CurrentUserId,
    Path((model_key, id_str)): Path<(String, String)>,
) -> Result<One<Value>, AppError> {
    let store = state.store.as_ref();
    user.require_staff(store).await?;
    let kind: ModelKind = model_key.parse()?;
    let admin = state.admin.get(kind)?;
    let id = parse_id(kind, &id_str)?;
    let (record, display) = fetch(store, kind, id).await?;

    let mut inlines = Vec::new();
    for inline in admin.inlines {
        // Book is the only parent with an inline; its children are its copies.
        let RecordId::Int(parent) = id else { continue };
        let filter = InstanceFilter {
            book_id: Some(parent),
            ..Default::default()
        };
        let rows: Vec<Vec<Value>> = store
            .list_instances(&filter, Page { limit: Some(Page::MAX_LIMIT), offset: None })
            .await?
            .iter()
            .map(|i| inline.project(&to_json(i)))
            .collect();
        inlines.push(json!({
            "model": inline.model,
            "fk": inline.fk,
            "style": inline.style,
            "columns": inline.fields,
            "rows": rows,
        }));
    }

    let mut form = admin.change_form(&record);
    if let Value::Object(map) = &mut form {
        map.insert("id".into(), json!(display_id(id)));
        map.insert("display".into(), json!(display));
        map.insert("inlines".into(), Value::Array(inlines));
    }
    Ok(success_one(form))
}

/// POST /admin/{model}/
pub async fn create(
    State(state): State<AppState>,
    user: CurrentUserId,
    Path(model_key): Path<String>,
    Json(body): Json<Value>,
) -> Result<One<Value>, AppError> {
    let store = state.store.as_ref();
    let staff = user.require_staff(store).await?;
    let kind: ModelKind = model_key.parse()?;
    let created = match kind {
        ModelKind::Author => to_json(store.insert_author(&decode::<AuthorInput>(body)?).await?),
        ModelKind::Book => to_json(store.insert_book(&decode::<BookInput>(body)?).await?),
        ModelKind::BookInstance => to_json(
            store
                .insert_instance(&decode::<BookInstanceInput>(body)?)
                .await?
                .view(model::today()),
        ),
        ModelKind::Language => to_json(store.insert_language(&decode::<LanguageInput>(body)?).await?),
        ModelKind::User => to_json(store.insert_borrower(&decode::<BorrowerInput>(body)?).await?),
    };
    tracing::info!(model = kind.key(), id = %created["id"], by = %staff.username, "admin create");
    Ok(success_created(created))
}

/// PUT /admin/{model}/{id}
pub async fn update(
    State(state): State<AppState>,
    user: CurrentUserId,
    Path((model_key, id_str)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<One<Value>, AppError> {
    let store = state.store.as_ref();
    let staff = user.require_staff(store).await?;
    let kind: ModelKind = model_key.parse()?;
    let updated = match (kind, parse_id(kind, &id_str)?) {
        (ModelKind::Author, RecordId::Int(id)) => to_json(store.update_author(id, &decode(body)?).await?),
        (ModelKind::Book, RecordId::Int(id)) => to_json(store.update_book(id, &decode(body)?).await?),
        (ModelKind::BookInstance, RecordId::Uuid(id)) => to_json(
            store
                .update_instance(id, &decode(body)?)
                .await?
                .view(model::today()),
        ),
        (ModelKind::Language, RecordId::Int(id)) => to_json(store.update_language(id, &decode(body)?).await?),
        (ModelKind::User, RecordId::Int(id)) => to_json(store.update_borrower(id, &decode(body)?).await?),
        _ => return Err(AppError::BadRequest("invalid id".into())),
    };
    tracing::info!(model = kind.key(), id = %id_str, by = %staff.username, "admin update");
    Ok(success_one(updated))
}

/// DELETE /admin/{model}/{id}
pub async fn delete(
    State(state): State<AppState>,
    user: CurrentUserId,
    Path((model_key, id_str)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let store = state.store.as_ref();
    let staff = user.require_staff(store).await?;
    let kind: ModelKind = model_key.parse()?;
    match (kind, parse_id(kind, &id_str)?) {
        (ModelKind::Author, RecordId::Int(id)) => store.delete_author(id).await?,
        (ModelKind::Book, RecordId::Int(id)) => store.delete_book(id).await?,
        (ModelKind::BookInstance, RecordId::Uuid(id)) => store.delete_instance(id).await?,
        (ModelKind::Language, RecordId::Int(id)) => store.delete_language(id).await?,
        (ModelKind::User, RecordId::Int(id)) => store.delete_borrower(id).await?,
        _ => return Err(AppError::BadRequest("invalid id".into())),
    }
    tracing::info!(model = kind.key(), id = %id_str, by = %staff.username, "admin delete");
    Ok(StatusCode::NO_CONTENT)
}
