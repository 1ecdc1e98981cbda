use thiserror::Error;

/// Failures surfaced to the user during a review session.
///
/// Persistence problems never appear here: the store degrades to in-memory
/// operation instead of failing the caller.
#[derive(Debug, Error)]
pub enum SnapcalError {
    /// The uploaded file could not be accepted (wrong type, too large, empty).
    #[error("Could not read the image file: {0}")]
    Input(String),

    /// The analysis service failed or returned something other than a food list.
    #[error("Failed to analyze image: {0}")]
    Analysis(String),

    #[error("No daily goal configured yet. Set one before logging meals")]
    GoalNotConfigured,

    /// Another analysis or review is already in progress.
    #[error("A meal is already being analyzed or reviewed")]
    Busy,

    #[error("No meal is under review")]
    NotReviewing,

    #[error("Food item '{0}' not found in the current review")]
    ItemNotFound(String),

    #[error("{0}")]
    Validation(String),
}

impl SnapcalError {
    pub(crate) fn validation(err: &anyhow::Error) -> Self {
        Self::Validation(format!("{err:#}"))
    }
}
