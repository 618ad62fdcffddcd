//! End-to-end tests over the in-memory store and a temporary media root.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, NaiveDate};
use locallibrary::model::{AuthorInput, BookInput, BookInstanceInput, BorrowerInput, LanguageInput, LoanStatus};
use locallibrary::store::Page;
use locallibrary::{app, AppState, LocalStorage, MemoryStore, RecordStore};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    media: TempDir,
    staff: i64,
    reader: i64,
}

async fn setup() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let media = tempfile::tempdir().unwrap();
    let state = AppState::new(store.clone(), Arc::new(LocalStorage::new(media.path()))).unwrap();
    let staff = store
        .insert_borrower(&BorrowerInput {
            username: "librarian".into(),
            is_staff: true,
            can_mark_returned: true,
            ..Default::default()
        })
        .await
        .unwrap()
        .id;
    let reader = store
        .insert_borrower(&BorrowerInput {
            username: "reader".into(),
            ..Default::default()
        })
        .await
        .unwrap()
        .id;
    TestApp {
        router: app(state, 8 * 1024 * 1024),
        store,
        media,
        staff,
        reader,
    }
}

impl TestApp {
    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn call(&self, method: Method, uri: &str, user: Option<i64>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(id) = user {
            req = req.header("X-User-Id", id.to_string());
        }
        let req = match body {
            Some(b) => req
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        self.send(req).await
    }

    async fn get(&self, uri: &str, user: Option<i64>) -> (StatusCode, Value) {
        self.call(Method::GET, uri, user, None).await
    }

    async fn upload(&self, uri: &str, file_name: &str, bytes: &[u8]) -> (StatusCode, Value) {
        let boundary = "catalogtestboundary";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("X-User-Id", self.staff.to_string())
            .header("content-type", format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap();
        self.send(req).await
    }

    async fn author(&self, name: &str, last_name: &str) -> i64 {
        self.store
            .insert_author(&AuthorInput {
                name: name.into(),
                last_name: last_name.into(),
                middle_name: "Петрович".into(),
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    async fn book(&self, title: &str, author: i64, isbn: &str) -> i64 {
        self.store
            .insert_book(&book_input(title, author, isbn))
            .await
            .unwrap()
            .id
    }

    async fn copy(&self, book: i64, status: LoanStatus, due_back: Option<NaiveDate>, borrower: Option<i64>) -> String {
        self.store
            .insert_instance(&BookInstanceInput {
                book: Some(book),
                imprint: "Москва, 1999".into(),
                status,
                due_back,
                borrower,
                ..Default::default()
            })
            .await
            .unwrap()
            .id
            .to_string()
    }
}

fn book_input(title: &str, author: i64, isbn: &str) -> BookInput {
    BookInput {
        title: title.into(),
        author: Some(author),
        year_of_rel: Some(1966),
        summary: "Роман".into(),
        isbn: isbn.into(),
        ..Default::default()
    }
}

fn today() -> NaiveDate {
    locallibrary::model::today()
}

/// A small image that decodes fully.
fn real_png() -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbImage::new(4, 4)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// PNG signature padded with zeros: enough to reach the size check, not a decodable image.
fn png(size: usize) -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.resize(size, 0);
    bytes
}

#[tokio::test]
async fn unknown_book_and_unmatched_paths_are_not_found() {
    let t = setup().await;
    let (status, body) = t.get("/book/42", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, _) = t.get("/no/such/page", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = t.get("/book/abc", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn routing_is_decided_before_the_query_string() {
    let t = setup().await;
    let (status, body) = t.get("/no/such/page?limit=abc", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, body) = t.get("/book/42?author=x", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, body) = t.get("/books/?limit=-1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = t.get("/authors/?limit=abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn percent_escaped_paths_reach_their_route() {
    let t = setup().await;
    let a = t.author("Михаил", "Булгаков").await;
    let b = t.book("Мастер и Маргарита", a, "9785170000001").await;
    let escaped: String = b.to_string().bytes().map(|d| format!("%{:02X}", d)).collect();

    let (status, body) = t.get(&format!("/book/{escaped}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["url"], format!("/book/{b}"));

    let (status, body) = t.get("/book/%FF", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn index_reports_catalog_counts() {
    let t = setup().await;
    let a = t.author("Михаил", "Булгаков").await;
    let b = t.book("Мастер и Маргарита", a, "9785170000001").await;
    t.copy(b, LoanStatus::Available, None, None).await;
    t.copy(b, LoanStatus::OnLoan, Some(today()), Some(t.reader)).await;
    t.store
        .insert_language(&LanguageInput { name: "Русский".into() })
        .await
        .unwrap();

    let (status, body) = t.get("/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!({
            "num_books": 1,
            "num_instances": 2,
            "num_instances_available": 1,
            "num_authors": 1,
            "num_languages": 1,
        })
    );
}

#[tokio::test]
async fn book_list_and_detail_carry_urls_and_copies() {
    let t = setup().await;
    let a = t.author("Михаил", "Булгаков").await;
    let b = t.book("Мастер и Маргарита", a, "9785170000001").await;
    t.book("Белая гвардия", a, "9785170000002").await;
    let overdue = t.copy(b, LoanStatus::OnLoan, Some(today() - Duration::days(1)), Some(t.reader)).await;

    let (status, body) = t.get("/books/", None).await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<_> = body["data"].as_array().unwrap().iter().map(|b| b["title"].clone()).collect();
    assert_eq!(titles, vec![json!("Белая гвардия"), json!("Мастер и Маргарита")]);
    assert_eq!(body["meta"]["count"], 2);

    let (status, body) = t.get(&format!("/book/{b}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["url"], format!("/book/{b}"));
    assert_eq!(data["yearOfRel"], 1966);
    assert_eq!(data["author_detail"]["url"], format!("/author/{a}"));
    assert_eq!(data["copies"][0]["id"], overdue);
    assert_eq!(data["copies"][0]["is_overdue"], true);
    assert_eq!(data["copies"][0]["status"], "o");
}

#[tokio::test]
async fn author_detail_lists_books() {
    let t = setup().await;
    let a = t.author("Лев", "Толстой").await;
    t.book("Война и мир", a, "1111111111111").await;
    let (status, body) = t.get(&format!("/author/{a}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["last_name"], "Толстой");
    assert_eq!(body["data"]["books"][0]["title"], "Война и мир");

    let (status, body) = t.get("/authors/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["url"], format!("/author/{a}"));
}

#[tokio::test]
async fn my_books_lists_own_loans_by_due_date() {
    let t = setup().await;
    let a = t.author("Антон", "Чехов").await;
    let b = t.book("Рассказы", a, "2222222222222").await;
    let later = t.copy(b, LoanStatus::OnLoan, Some(today() + Duration::days(10)), Some(t.reader)).await;
    let sooner = t.copy(b, LoanStatus::OnLoan, Some(today() + Duration::days(2)), Some(t.reader)).await;
    t.copy(b, LoanStatus::Reserved, Some(today()), Some(t.reader)).await;
    t.copy(b, LoanStatus::OnLoan, Some(today()), Some(t.staff)).await;

    let (status, _) = t.get("/mybooks/", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = t.get("/mybooks/", Some(t.reader)).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<_> = body["data"].as_array().unwrap().iter().map(|i| i["id"].clone()).collect();
    assert_eq!(ids, vec![json!(sooner), json!(later)]);
    assert_eq!(body["data"][0]["book_title"], "Рассказы");
}

#[tokio::test]
async fn renew_requires_permission_and_valid_date() {
    let t = setup().await;
    let a = t.author("Антон", "Чехов").await;
    let b = t.book("Рассказы", a, "2222222222222").await;
    let copy = t.copy(b, LoanStatus::OnLoan, Some(today()), Some(t.reader)).await;
    let uri = format!("/book/{copy}/renew/");

    let (status, _) = t.get(&uri, Some(t.reader)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = t.get(&uri, Some(t.staff)).await;
    assert_eq!(status, StatusCode::OK);
    let proposed = (today() + Duration::weeks(3)).format("%Y-%m-%d").to_string();
    assert_eq!(body["data"]["proposed_renewal_date"], proposed);

    let too_far = (today() + Duration::weeks(5)).format("%Y-%m-%d").to_string();
    let (status, body) = t
        .call(Method::POST, &uri, Some(t.staff), Some(json!({ "renewal_date": too_far })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["details"]["fields"], json!(["renewal_date"]));

    let (status, body) = t
        .call(Method::POST, &uri, Some(t.staff), Some(json!({ "renewal_date": proposed })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["due_back"], proposed);

    let (status, _) = t.get("/book/not-a-uuid/renew/", Some(t.staff)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn author_writes_need_staff() {
    let t = setup().await;
    let body = json!({
        "name": "Осип",
        "last_name": "Мандельштам",
        "middle_name": "Эмильевич",
        "date_of_birth": "1891-01-15",
        "date_of_death": "1938-12-27",
    });

    let (status, _) = t.call(Method::POST, "/author/create/", None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = t.call(Method::POST, "/author/create/", Some(t.reader), Some(body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created) = t.call(Method::POST, "/author/create/", Some(t.staff), Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["data"]["id"].as_i64().unwrap();
    assert_eq!(created["data"]["url"], format!("/author/{id}"));

    let (status, dup) = t.call(Method::POST, "/author/create/", Some(t.staff), Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(dup["error"]["code"], "duplicate_key");

    let (status, _) = t.get("/author/create/", Some(t.staff)).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, updated) = t
        .call(
            Method::POST,
            &format!("/author/{id}/update/"),
            Some(t.staff),
            Some(json!({ "name": "Осип", "last_name": "Мандельштам", "middle_name": "Э." })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["middle_name"], "Э.");
}

#[tokio::test]
async fn author_delete_cascades_unless_copies_remain() {
    let t = setup().await;
    let free = t.author("Иван", "Бунин").await;
    let free_book = t.book("Темные аллеи", free, "3333333333333").await;

    let (status, body) = t.call(Method::POST, &format!("/author/{free}/delete/"), Some(t.staff), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["redirect"], "/authors/");
    assert!(t.store.get_book(free_book).await.unwrap().is_none());

    let held = t.author("Иван", "Гончаров").await;
    let held_book = t.book("Обломов", held, "4444444444444").await;
    t.copy(held_book, LoanStatus::Available, None, None).await;
    let (status, body) = t.call(Method::POST, &format!("/author/{held}/delete/"), Some(t.staff), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "referential_integrity");
    assert!(t.store.get_author(held).await.unwrap().is_some());
    assert!(t.store.get_book(held_book).await.unwrap().is_some());
}

#[tokio::test]
async fn admin_rejects_invalid_books() {
    let t = setup().await;
    let a = t.author("Михаил", "Булгаков").await;
    t.book("Мастер и Маргарита", a, "9785170000001").await;

    let mut dup = serde_json::to_value(book_input("Собачье сердце", a, "9785170000001")).unwrap();
    let (status, body) = t.call(Method::POST, "/admin/book/", Some(t.staff), Some(dup.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["details"]["fields"], json!(["isbn"]));

    dup["isbn"] = json!("9785170000009");
    dup["yearOfRel"] = json!(999);
    let (status, body) = t.call(Method::POST, "/admin/book/", Some(t.staff), Some(dup.clone())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "out_of_range");

    dup["yearOfRel"] = json!(1925);
    let (status, body) = t.call(Method::POST, "/admin/book/", Some(t.staff), Some(dup)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["title"], "Собачье сердце");

    let (status, _) = t.call(Method::GET, "/admin/", Some(t.reader), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_book_delete_is_restricted_by_copies() {
    let t = setup().await;
    let a = t.author("Михаил", "Булгаков").await;
    let b = t.book("Мастер и Маргарита", a, "9785170000001").await;
    let copy = t.copy(b, LoanStatus::Available, None, None).await;

    let (status, _) = t.call(Method::DELETE, &format!("/admin/book/{b}"), Some(t.staff), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = t
        .call(Method::DELETE, &format!("/admin/bookinstance/{copy}"), Some(t.staff), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = t.call(Method::DELETE, &format!("/admin/book/{b}"), Some(t.staff), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn admin_changelist_filters_and_change_form() {
    let t = setup().await;
    let a = t.author("Михаил", "Булгаков").await;
    let b = t.book("Мастер и Маргарита", a, "9785170000001").await;
    let loaned = t.copy(b, LoanStatus::OnLoan, Some(today()), Some(t.reader)).await;
    t.copy(b, LoanStatus::Available, None, None).await;

    let (status, body) = t.get("/admin/bookinstance/?status=o&due_back=today", Some(t.staff)).await;
    assert_eq!(status, StatusCode::OK);
    let list = &body["data"];
    assert_eq!(list["columns"], json!(["book", "status", "borrower", "due_back", "id"]));
    assert_eq!(list["count"], 1);
    assert_eq!(
        list["rows"][0]["values"],
        json!(["Мастер и Маргарита", "On loan", "reader", today(), loaned])
    );
    assert_eq!(list["rows"][0]["display"], format!("{loaned} (Мастер и Маргарита)"));

    let (status, body) = t.get("/admin/bookinstance/?due_back=no_date", Some(t.staff)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 1);

    let (status, body) = t.get(&format!("/admin/book/{b}"), Some(t.staff)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["display"], "Мастер и Маргарита");
    assert_eq!(body["data"]["inlines"][0]["rows"].as_array().unwrap().len(), 2);

    let (status, _) = t.get("/admin/cover/", Some(t.staff)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_photo_is_rejected_without_side_effects() {
    let t = setup().await;
    let a = t.author("Михаил", "Булгаков").await;
    let b = t.book("Мастер и Маргарита", a, "9785170000001").await;

    let (status, body) = t
        .upload(&format!("/api/v1/uploads/book/{b}/photo"), "big.png", &png(2 * 1024 * 1024 + 1))
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"]["details"]["fields"], json!(["photoPreview"]));
    assert_eq!(t.store.get_book(b).await.unwrap().unwrap().photo_preview, None);
    assert!(!t.media.path().join("cover").exists());

    let (status, _) = t
        .upload(&format!("/api/v1/uploads/book/{b}/photo"), "notes.txt", b"plain text")
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = t
        .upload(&format!("/api/v1/uploads/book/{b}/photo"), "header.png", &png(64))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["details"]["fields"], json!(["photoPreview"]));
    assert!(!t.media.path().join("cover").exists());

    let (status, body) = t
        .upload(&format!("/api/v1/uploads/book/{b}/photo"), "cover.png", &real_png())
        .await;
    assert_eq!(status, StatusCode::OK);
    let key = body["data"]["photoPreview"].as_str().unwrap().to_string();
    assert!(key.starts_with("cover/") && key.ends_with("_cover.png"), "{key}");
    assert!(t.media.path().join(&key).exists());
}

#[tokio::test]
async fn book_file_and_cover_uploads() {
    let t = setup().await;
    let a = t.author("Михаил", "Булгаков").await;
    let b = t.book("Мастер и Маргарита", a, "9785170000001").await;

    let (status, body) = t
        .upload(&format!("/api/v1/uploads/book/{b}/file"), "book.epub", &vec![7u8; 3 * 1024 * 1024])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["bookFile"].as_str().unwrap().starts_with("books/"));

    let (status, _) = t.upload("/api/v1/uploads/book/999/file", "x.pdf", b"%PDF").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = t.upload("/api/v1/uploads/cover", "title.png", &real_png()).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_i64().unwrap();
    let key = body["data"]["cover"].as_str().unwrap().to_string();
    assert!(key.starts_with("cover/books/title/"));

    let (status, body) = t.get(&format!("/api/v1/uploads/cover/{id}"), Some(t.staff)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cover"], key);

    let (status, _) = t
        .call(Method::DELETE, &format!("/api/v1/uploads/cover/{id}"), Some(t.staff), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!t.media.path().join(&key).exists());
}

#[tokio::test]
async fn oversized_cover_is_rejected_without_side_effects() {
    let t = setup().await;
    let (status, body) = t
        .upload("/api/v1/uploads/cover", "huge.png", &png(2 * 1024 * 1024 + 1))
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"]["details"]["fields"], json!(["cover"]));
    assert!(t.store.list_covers(Page::default()).await.unwrap().is_empty());
    assert!(!t.media.path().join("cover/books/title").exists());
}

#[tokio::test]
async fn health_and_ready() {
    let t = setup().await;
    let (status, body) = t.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    let (status, body) = t.get("/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store"], "ok");
}
