//! Validation errors for model construction.

/// Errors raised when a record fails its field constraints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// A required text field is empty
    #[error("{0} is required")]
    Missing(&'static str),

    /// Lesson order must be a positive integer
    #[error("lesson order must be at least 1, got {0}")]
    InvalidOrder(u32),

    /// Price must be non-negative
    #[error("price must not be negative")]
    NegativePrice,
}
