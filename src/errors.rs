/// Domain-specific error types for the debt analyzer.
/// Field-level failures are absorbed into absent values by the parser;
/// structural and parameter errors always propagate to the caller.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("malformed field: {0}")]
    MalformedField(String),

    #[error("table structure error: {0}")]
    Structure(String),

    #[error("empty portfolio: {0}")]
    EmptyPortfolio(String),

    #[error("division by zero: {0}")]
    DivideByZero(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for AnalyzerError {
    fn from(e: std::io::Error) -> Self {
        AnalyzerError::Io(e.to_string())
    }
}

pub type AnalyzerResult<T> = Result<T, AnalyzerError>;
