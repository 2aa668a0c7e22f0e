use thiserror::Error;

/// Errors from authorized downstream requests.
#[derive(Error, Debug)]
pub enum RequestError {
    /// No token exists for the requested audience
    #[error("No api token for audience {0}")]
    MissingToken(String),

    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from the backend
    #[error("Status:{status}. Message: {body}")]
    Status { status: u16, body: String },

    /// Response body could not be decoded
    #[error("Invalid response body: {0}")]
    InvalidBody(String),

    /// GraphQL-level failure
    #[error("Query failed: {0}")]
    Query(String),

    /// The session ended while a result was held
    #[error("User is unauthorized")]
    Unauthorized,

    /// A request was made before token provisioning
    #[error("Api tokens are not fetched.")]
    TokensNotFetched,

    /// Free-form failure from a wrapped request function
    #[error("{0}")]
    Message(String),
}
