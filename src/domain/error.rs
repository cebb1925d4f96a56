//! Domain error types.

/// A parse error with position information for strategy rule parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for quantx.
#[derive(Debug, thiserror::Error)]
pub enum QuantxError {
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("insufficient data for {what}: have {have}, need {need}")]
    InsufficientData {
        what: String,
        have: usize,
        need: usize,
    },

    #[error("no convergence: {reason}")]
    NoConvergence { reason: String },

    #[error("unknown symbol {symbol}")]
    UnknownSymbol { symbol: String },

    #[error("invalid date range: start {start} is not before end {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    RuleParse(#[from] ParseError),

    #[error("invalid strategy {name}: {reason}")]
    StrategyInvalid { name: String, reason: String },

    #[error("strategy not found: {name}")]
    StrategyNotFound { name: String },

    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl QuantxError {
    pub fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        QuantxError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn insufficient_data(what: &str, have: usize, need: usize) -> Self {
        QuantxError::InsufficientData {
            what: what.to_string(),
            have,
            need,
        }
    }
}

impl From<serde_json::Error> for QuantxError {
    fn from(err: serde_json::Error) -> Self {
        QuantxError::Serialization {
            reason: err.to_string(),
        }
    }
}

impl From<&QuantxError> for std::process::ExitCode {
    fn from(err: &QuantxError) -> Self {
        let code: u8 = match err {
            QuantxError::Io(_) | QuantxError::Serialization { .. } => 1,
            QuantxError::ConfigParse { .. }
            | QuantxError::ConfigMissing { .. }
            | QuantxError::ConfigInvalid { .. } => 2,
            QuantxError::DataSource { .. } => 3,
            QuantxError::RuleParse(_)
            | QuantxError::StrategyInvalid { .. }
            | QuantxError::StrategyNotFound { .. } => 4,
            QuantxError::NoData { .. }
            | QuantxError::InsufficientData { .. }
            | QuantxError::UnknownSymbol { .. } => 5,
            QuantxError::InvalidParameter { .. }
            | QuantxError::InvalidDateRange { .. }
            | QuantxError::NoConvergence { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
