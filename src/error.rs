use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL has no host: {0}")]
    MissingHost(String),

    #[error("Unknown request method: {0}")]
    UnknownMethod(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no valid target")]
    NoValidTargets,

    #[error("invalid form item: {0}")]
    InvalidFormItem(String),

    #[error("not allowed form key: {0}")]
    NotAllowedFormKey(String),

    #[error("invalid keyword format: {0}")]
    InvalidKeywordItem(String),

    #[error("custom headers can't be parsed: {0}")]
    InvalidHeaders(#[from] serde_json::Error),

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },
}

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebDriver error {name}: {message}")]
    WebDriver { name: String, message: String },

    #[error("WebDriver HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("WebDriver protocol error: {0}")]
    Protocol(String),

    #[error("driver launch failed: {0}")]
    Launch(String),

    #[error("browser already closed")]
    Closed,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool is closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

pub type Result<T> = std::result::Result<T, Error>;
