use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot read {path}: {source}")]
    Source {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed jsonline {line_no}: {reason}")]
    MalformedLine { line_no: usize, reason: String },

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid orden_compra: {0}")]
    InvalidOrderNumber(String),

    #[error("More than one compra with orden_compra {orden_compra} in {year}")]
    AmbiguousPurchase { orden_compra: i64, year: i32 },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Logging error: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, ImportError>;
