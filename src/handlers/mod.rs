//! HTTP handlers: catalog (route-table dispatch), admin API and media uploads.

pub mod admin;
pub mod catalog;
pub mod upload;
