use serde::{Deserialize, Serialize};

/// Standalone uploaded image. `cover` is the storage key, empty when no file was attached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Cover {
    pub id: i64,
    pub cover: String,
}

impl Cover {
    /// Storage key prefix for cover uploads.
    pub const UPLOAD_TO: &'static str = "cover/books/title/";
}
