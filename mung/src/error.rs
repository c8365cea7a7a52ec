use thiserror::Error;

/// Errors raised by the estimation and evaluation routines.
///
/// `InsufficientData` is recoverable: callers turn it into a missing
/// value for the regulator, sample, fold or score concerned. The
/// other variants abort the run.
#[derive(Debug, Error)]
pub enum MungError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("degenerate fit: {0}; set a positive regularization strength")]
    DegenerateFit(String),

    #[error("sample keys don't align: {0}")]
    Alignment(String),

    #[error("empty regulator-target weights")]
    EmptyWeights,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MungError {
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, MungError::InsufficientData(_))
    }
}

pub type Result<T> = std::result::Result<T, MungError>;
