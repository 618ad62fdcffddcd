//! Extract the calling user's id from the request (`X-User-Id` header).
//!
//! Authentication happens upstream; this service only trusts the forwarded id and
//! resolves it against the borrower table.

use crate::error::AppError;
use crate::model::Borrower;
use crate::store::RecordStore;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

pub const USER_ID_HEADER: &str = "X-User-Id";

/// Optional borrower id of the caller. A header that is not an integer counts as absent.
#[derive(Clone, Copy, Debug, Default)]
pub struct CurrentUserId(pub Option<i64>);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUserId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<i64>().ok());
        Ok(CurrentUserId(value))
    }
}

impl CurrentUserId {
    /// The caller's borrower record; `Unauthorized` when absent or unknown.
    pub async fn resolve(&self, store: &dyn RecordStore) -> Result<Borrower, AppError> {
        let id = self.0.ok_or(AppError::Unauthorized)?;
        store.get_borrower(id).await?.ok_or(AppError::Unauthorized)
    }

    pub async fn require_staff(&self, store: &dyn RecordStore) -> Result<Borrower, AppError> {
        let user = self.resolve(store).await?;
        if !user.is_staff {
            return Err(AppError::Forbidden(format!("{} is not staff", user.username)));
        }
        Ok(user)
    }

    pub async fn require_can_mark_returned(&self, store: &dyn RecordStore) -> Result<Borrower, AppError> {
        let user = self.resolve(store).await?;
        if !user.can_mark_returned {
            return Err(AppError::Forbidden(format!(
                "{} may not renew or return loans",
                user.username
            )));
        }
        Ok(user)
    }
}
