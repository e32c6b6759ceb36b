use thiserror::Error;

#[derive(Error, Debug)]
pub enum HabError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration value: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("InfluxDB error: {message}")]
    InfluxError { message: String },

    #[error("Grid data error: {message}")]
    GridDataError { message: String },

    #[error("No data available: {what}")]
    NoDataError { what: String },

    #[error("No price calculation exists for the year {year}")]
    NoTariffError { year: i32 },

    #[error("Invalid request: {message}")]
    BadRequestError { message: String },
}

impl HabError {
    pub fn no_data(what: impl Into<String>) -> Self {
        Self::NoDataError { what: what.into() }
    }

    pub fn influx(message: impl Into<String>) -> Self {
        Self::InfluxError {
            message: message.into(),
        }
    }

    /// Upstream failures are the ones a retry may fix.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::HttpError(_) | Self::InfluxError { .. } | Self::GridDataError { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, HabError>;
