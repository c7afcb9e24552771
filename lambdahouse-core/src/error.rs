#[derive(thiserror::Error, Debug)]
pub enum LambdahouseError {
    #[error("{0}")]
    BadArguments(String),
    #[error("{0}")]
    NotImplemented(String),
    #[error("{0}")]
    Syntax(String),
    #[error("{0}")]
    FormatAlreadySpecified(String),
    #[error("Unknown format {0}")]
    UnknownFormat(String),
    #[error("{0}")]
    UnknownType(String),
    #[error("Unknown setting {0}")]
    UnknownSetting(String),
    #[error("{0}")]
    IncorrectData(String),
    #[error("{0}")]
    TooManyRows(String),
    #[error("{0}")]
    QueryTooLarge(String),
    #[error("{0}")]
    AccessDenied(String),
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    FileAlreadyExists(String),
    #[error("Cannot load configuration: {0}")]
    CannotLoadConfig(String),
    #[error("Failed to parse lambda input JSON: {0}")]
    Payload(String),
    #[error("{0}")]
    Storage(String),
    #[error("{0}")]
    Internal(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LambdahouseError {
    /// Stable numeric code, also used as the process exit code on fatal startup errors.
    pub fn code(&self) -> i32 {
        match self {
            LambdahouseError::BadArguments(_) => 36,
            LambdahouseError::NotImplemented(_) => 48,
            LambdahouseError::UnknownType(_) => 50,
            LambdahouseError::Syntax(_) => 62,
            LambdahouseError::FileAlreadyExists(_) => 57,
            LambdahouseError::Io(_) => 74,
            LambdahouseError::UnknownFormat(_) => 73,
            LambdahouseError::UnknownSetting(_) => 115,
            LambdahouseError::IncorrectData(_) => 117,
            LambdahouseError::QueryTooLarge(_) => 154,
            LambdahouseError::TooManyRows(_) => 396,
            LambdahouseError::AccessDenied(_) => 497,
            LambdahouseError::Authentication(_) => 516,
            LambdahouseError::FormatAlreadySpecified(_) => 529,
            LambdahouseError::CannotLoadConfig(_) => 573,
            LambdahouseError::Payload(_) => 27,
            LambdahouseError::Storage(_) => 1001,
            LambdahouseError::Internal(_) => 1002,
        }
    }
}

pub type Result<T> = std::result::Result<T, LambdahouseError>;
