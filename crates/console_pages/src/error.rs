use resource_machine::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("invalid resource url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http client setup failed: {0}")]
    Client(#[from] reqwest::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
}
