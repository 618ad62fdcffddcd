//! Request extractors.

pub mod current_user;

pub use current_user::{CurrentUserId, USER_ID_HEADER};
