use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlockError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport unavailable: {0}")]
    Transport(String),

    #[error("Malformed snapshot: {0}")]
    Codec(String),
}

pub type Result<T> = std::result::Result<T, FlockError>;
