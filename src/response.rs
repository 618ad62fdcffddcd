//! Success envelopes: `{"data": ...}` for one record, `{"data": [...], "meta": {...}}` for lists.

use crate::store::Page;
use axum::{http::StatusCode, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct SuccessOne<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Serialize)]
pub struct SuccessMany<T> {
    pub data: Vec<T>,
    pub meta: ListMeta,
}

#[derive(Serialize)]
pub struct ListMeta {
    pub count: u64,
    pub limit: u32,
    pub offset: u32,
}

pub type One<T> = (StatusCode, Json<SuccessOne<T>>);
pub type Many<T> = (StatusCode, Json<SuccessMany<T>>);

pub fn success_created<T: Serialize>(data: T) -> One<T> {
    (StatusCode::CREATED, Json(SuccessOne { data, meta: None }))
}

pub fn success_one<T: Serialize>(data: T) -> One<T> {
    (StatusCode::OK, Json(SuccessOne { data, meta: None }))
}

pub fn success_one_with_meta<T: Serialize>(data: T, meta: serde_json::Value) -> One<T> {
    (StatusCode::OK, Json(SuccessOne { data, meta: Some(meta) }))
}

/// A list already cut to `page`.
pub fn success_many<T: Serialize>(data: Vec<T>, page: Page) -> Many<T> {
    let count = data.len() as u64;
    (
        StatusCode::OK,
        Json(SuccessMany {
            data,
            meta: ListMeta {
                count,
                limit: page.limit(),
                offset: page.offset(),
            },
        }),
    )
}
