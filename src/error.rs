//! Error taxonomy of the acquisition engine

/// Network or HTTP failure that survived every retry
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to fetch {url} after {attempts} attempt(s): {reason}")]
pub struct FetchError {
    pub url: String,
    pub attempts: u32,
    pub reason: String,
}

/// Headless rendering failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderError {
    #[error("headless browser failed to start: {0}")]
    Launch(String),

    #[error("headless render of {url} failed: {reason}")]
    Page { url: String, reason: String },

    #[error("headless rendering is disabled")]
    Disabled,
}

/// An operator-supplied selector did not yield a price
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtractionError {
    #[error("invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("selector {0:?} matched nothing")]
    SelectorNotFound(String),

    #[error("selector {selector:?} matched {text:?}, which holds no price")]
    NoPrice { selector: String, text: String },
}

/// Anything an adapter can fail with
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
