//! Services applied between handlers and the store.

pub mod validation;

pub use validation::{validate_image, validate_renewal_date, Validate, IMAGE_SIZE_LIMIT, MAX_RENEWAL_WEEKS};
