//! Catalog handlers, dispatched through the ordered route table.
//!
//! Every path outside `/admin`, `/api/v1` and the common routes lands in [`dispatch`], which
//! resolves it against [`RouteTable`](crate::routes::RouteTable) and runs the matched action.

use crate::error::AppError;
use crate::extractors::CurrentUserId;
use crate::model::{self, Author, AuthorInput, Book, BookInstanceInput, BookInstanceView, Language, LoanStatus};
use crate::response::{success_created, success_many, success_one, success_one_with_meta};
use crate::routes::{reverse, RouteMatch, RouteName};
use crate::service::validation::{validate_renewal_date, Validate};
use crate::state::AppState;
use crate::store::{BookFilter, InstanceFilter, Page};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{Method, Uri},
    response::{IntoResponse, Response},
};
use chrono::{Duration, NaiveDate};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

/// Default renewal proposal: three weeks from today.
pub const PROPOSED_RENEWAL_WEEKS: i64 = 3;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub author: Option<i64>,
    pub language: Option<i64>,
}

impl ListParams {
    /// Parsed only once the path matched a list route, so routing errors come first.
    fn from_uri(uri: &Uri) -> Result<Self, AppError> {
        Query::<ListParams>::try_from_uri(uri)
            .map(|Query(params)| params)
            .map_err(|e| AppError::BadRequest(format!("invalid query string: {}", e.body_text())))
    }

    fn page(&self) -> Page {
        Page {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// A record together with its canonical path.
#[derive(Serialize)]
pub struct WithUrl<T> {
    #[serde(flatten)]
    pub record: T,
    pub url: String,
}

impl WithUrl<Book> {
    fn book(book: Book) -> Self {
        let url = book.absolute_url();
        WithUrl { record: book, url }
    }
}

impl WithUrl<Author> {
    fn author(author: Author) -> Self {
        let url = author.absolute_url();
        WithUrl { record: author, url }
    }
}

#[derive(Serialize)]
struct BookDetail {
    #[serde(flatten)]
    book: WithUrl<Book>,
    author_detail: Option<WithUrl<Author>>,
    language_detail: Option<Language>,
    copies: Vec<BookInstanceView>,
}

#[derive(Serialize)]
struct AuthorDetail {
    #[serde(flatten)]
    author: WithUrl<Author>,
    books: Vec<WithUrl<Book>>,
}

#[derive(Serialize)]
struct Loan {
    #[serde(flatten)]
    instance: BookInstanceView,
    book_title: Option<String>,
}

#[derive(Serialize)]
struct RenewProposal {
    instance: BookInstanceView,
    proposed_renewal_date: NaiveDate,
}

#[derive(Deserialize)]
struct RenewForm {
    renewal_date: Option<NaiveDate>,
}

#[derive(Serialize)]
struct Deleted {
    id: i64,
    redirect: String,
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    if body.is_empty() {
        return Err(AppError::BadRequest("request body required".into()));
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("invalid JSON body: {}", e)))
}

/// `pk` of a numeric route. Regex guarantees digits; out-of-range ids match nothing.
fn numeric_pk(m: &RouteMatch, kind: &str) -> Result<i64, AppError> {
    let pk = m.pk.as_deref().unwrap_or_default();
    pk.parse().map_err(|_| AppError::NotFound(format!("{} {}", kind, pk)))
}

fn not_allowed(method: &Method, m: &RouteMatch) -> AppError {
    AppError::MethodNotAllowed(format!("{} {}", method, m.name))
}

/// Fallback handler for the catalog paths.
pub async fn dispatch(
    State(state): State<AppState>,
    user: CurrentUserId,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Result<Response, AppError> {
    let m = state.routes.resolve(uri.path())?;
    tracing::debug!(route = %m.name, method = %method, "dispatch");
    match (m.name, &method) {
        (RouteName::Index, &Method::GET) => index(&state).await,
        (RouteName::Books, &Method::GET) => books(&state, &ListParams::from_uri(&uri)?).await,
        (RouteName::BookDetail, &Method::GET) => book_detail(&state, numeric_pk(&m, "book")?).await,
        (RouteName::Authors, &Method::GET) => authors(&state, &ListParams::from_uri(&uri)?).await,
        (RouteName::AuthorDetail, &Method::GET) => author_detail(&state, numeric_pk(&m, "author")?).await,
        (RouteName::MyBorrowed, &Method::GET) => my_borrowed(&state, user, &ListParams::from_uri(&uri)?).await,
        (RouteName::RenewBookLibrarian, &Method::GET) => renew_proposal(&state, user, &m).await,
        (RouteName::RenewBookLibrarian, &Method::POST) => renew_apply(&state, user, &m, &body).await,
        (RouteName::AuthorCreate, &Method::POST) => author_create(&state, user, &body).await,
        (RouteName::AuthorUpdate, &Method::GET) | (RouteName::AuthorDelete, &Method::GET) => {
            user.require_staff(state.store.as_ref()).await?;
            author_show(&state, numeric_pk(&m, "author")?).await
        }
        (RouteName::AuthorUpdate, &Method::POST) => {
            author_update(&state, user, numeric_pk(&m, "author")?, &body).await
        }
        (RouteName::AuthorDelete, &Method::POST) => author_delete(&state, user, numeric_pk(&m, "author")?).await,
        _ => Err(not_allowed(&method, &m)),
    }
}

async fn index(state: &AppState) -> Result<Response, AppError> {
    let summary = state.store.summary().await?;
    Ok(success_one(summary).into_response())
}

async fn books(state: &AppState, params: &ListParams) -> Result<Response, AppError> {
    let filter = BookFilter {
        author_id: params.author,
        language_id: params.language,
    };
    let page = params.page();
    let rows = state.store.list_books(&filter, page).await?;
    let rows: Vec<_> = rows.into_iter().map(WithUrl::book).collect();
    Ok(success_many(rows, page).into_response())
}

async fn book_detail(state: &AppState, id: i64) -> Result<Response, AppError> {
    let store = state.store.as_ref();
    let book = store
        .get_book(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("book {}", id)))?;
    let author = store.get_author(book.author_id).await?.map(WithUrl::author);
    let language = match book.language_id {
        Some(lang) => store.get_language(lang).await?,
        None => None,
    };
    let filter = InstanceFilter {
        book_id: Some(book.id),
        ..Default::default()
    };
    let today = model::today();
    let copies = store
        .list_instances(&filter, Page { limit: Some(Page::MAX_LIMIT), offset: None })
        .await?
        .into_iter()
        .map(|i| i.view(today))
        .collect();
    Ok(success_one(BookDetail {
        book: WithUrl::book(book),
        author_detail: author,
        language_detail: language,
        copies,
    })
    .into_response())
}

async fn authors(state: &AppState, params: &ListParams) -> Result<Response, AppError> {
    let page = params.page();
    let rows = state.store.list_authors(page).await?;
    let rows: Vec<_> = rows.into_iter().map(WithUrl::author).collect();
    Ok(success_many(rows, page).into_response())
}

async fn author_detail(state: &AppState, id: i64) -> Result<Response, AppError> {
    let author = state
        .store
        .get_author(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("author {}", id)))?;
    let filter = BookFilter {
        author_id: Some(id),
        ..Default::default()
    };
    let books = state
        .store
        .list_books(&filter, Page { limit: Some(Page::MAX_LIMIT), offset: None })
        .await?
        .into_iter()
        .map(WithUrl::book)
        .collect();
    Ok(success_one(AuthorDetail {
        author: WithUrl::author(author),
        books,
    })
    .into_response())
}

/// On-loan copies of the current user, earliest due date first.
async fn my_borrowed(state: &AppState, user: CurrentUserId, params: &ListParams) -> Result<Response, AppError> {
    let store = state.store.as_ref();
    let borrower = user.resolve(store).await?;
    let filter = InstanceFilter {
        status: Some(LoanStatus::OnLoan),
        borrower_id: Some(borrower.id),
        ..Default::default()
    };
    let page = params.page();
    let today = model::today();
    let mut loans = Vec::new();
    for instance in store.list_instances(&filter, page).await? {
        let book_title = match instance.book_id {
            Some(id) => store.get_book(id).await?.map(|b| b.title),
            None => None,
        };
        loans.push(Loan {
            instance: instance.view(today),
            book_title,
        });
    }
    Ok(success_many(loans, page).into_response())
}

/// Renew ids are matched as `[-\w]+`; anything that is not a UUID names no copy.
fn renew_id(m: &RouteMatch) -> Result<Uuid, AppError> {
    let pk = m.pk.as_deref().unwrap_or_default();
    Uuid::parse_str(pk).map_err(|_| AppError::NotFound(format!("book instance {}", pk)))
}

async fn renew_proposal(state: &AppState, user: CurrentUserId, m: &RouteMatch) -> Result<Response, AppError> {
    let store = state.store.as_ref();
    user.require_can_mark_returned(store).await?;
    let id = renew_id(m)?;
    let instance = store
        .get_instance(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("book instance {}", id)))?;
    let today = model::today();
    Ok(success_one(RenewProposal {
        instance: instance.view(today),
        proposed_renewal_date: today + Duration::weeks(PROPOSED_RENEWAL_WEEKS),
    })
    .into_response())
}

async fn renew_apply(state: &AppState, user: CurrentUserId, m: &RouteMatch, body: &Bytes) -> Result<Response, AppError> {
    let store = state.store.as_ref();
    let librarian = user.require_can_mark_returned(store).await?;
    let id = renew_id(m)?;
    let instance = store
        .get_instance(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("book instance {}", id)))?;
    let form: RenewForm = parse_body(body)?;
    let renewal_date = form
        .renewal_date
        .ok_or_else(|| AppError::constraint("renewal_date", "Обязательное поле."))?;
    let today = model::today();
    validate_renewal_date(renewal_date, today)?;

    let mut input = BookInstanceInput::from(&instance);
    input.due_back = Some(renewal_date);
    let updated = store.update_instance(id, &input).await?;
    tracing::info!(instance = %id, due_back = %renewal_date, by = %librarian.username, "loan renewed");
    Ok(success_one_with_meta(updated.view(today), serde_json::json!({ "renewed_by": librarian.username })).into_response())
}

async fn author_show(state: &AppState, id: i64) -> Result<Response, AppError> {
    let author = state
        .store
        .get_author(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("author {}", id)))?;
    Ok(success_one(WithUrl::author(author)).into_response())
}

async fn author_create(state: &AppState, user: CurrentUserId, body: &Bytes) -> Result<Response, AppError> {
    user.require_staff(state.store.as_ref()).await?;
    let input: AuthorInput = parse_body(body)?;
    input.validate()?;
    let author = state.store.insert_author(&input).await?;
    tracing::info!(author = author.id, "author created");
    Ok(success_created(WithUrl::author(author)).into_response())
}

async fn author_update(state: &AppState, user: CurrentUserId, id: i64, body: &Bytes) -> Result<Response, AppError> {
    user.require_staff(state.store.as_ref()).await?;
    let input: AuthorInput = parse_body(body)?;
    input.validate()?;
    let author = state.store.update_author(id, &input).await?;
    Ok(success_one(WithUrl::author(author)).into_response())
}

async fn author_delete(state: &AppState, user: CurrentUserId, id: i64) -> Result<Response, AppError> {
    user.require_staff(state.store.as_ref()).await?;
    state.store.delete_author(id).await?;
    tracing::info!(author = id, "author deleted");
    Ok(success_one(Deleted {
        id,
        redirect: reverse(RouteName::Authors, None),
    })
    .into_response())
}
