//! Error types.
//!
//! - `FitError` is returned by every library operation (fitting, conversions,
//!   model evaluation).
//! - `AppError` is what the `dce` binary reports; it carries a process exit code.

/// Failure of a fitting or conversion routine.
#[derive(Clone, PartialEq)]
pub enum FitError {
    /// An algebraic step produced an undefined or non-physical value
    /// (log of a non-positive number, division by zero, negative T1/S0, ...).
    Domain(String),
    /// An iterative solver ran out of iterations or damping range.
    Convergence { iterations: usize, message: String },
    /// Mismatched sequence lengths or too few points for the method.
    Shape(String),
}

impl FitError {
    pub fn domain(message: impl Into<String>) -> Self {
        FitError::Domain(message.into())
    }

    pub fn shape(message: impl Into<String>) -> Self {
        FitError::Shape(message.into())
    }

    pub fn convergence(iterations: usize, message: impl Into<String>) -> Self {
        FitError::Convergence {
            iterations,
            message: message.into(),
        }
    }

    /// Short machine-friendly label (used in CSV exports).
    pub fn kind_label(&self) -> &'static str {
        match self {
            FitError::Domain(_) => "domain",
            FitError::Convergence { .. } => "convergence",
            FitError::Shape(_) => "shape",
        }
    }
}

impl std::fmt::Display for FitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitError::Domain(msg) => write!(f, "domain error: {msg}"),
            FitError::Convergence { iterations, message } => {
                write!(f, "convergence error after {iterations} iterations: {message}")
            }
            FitError::Shape(msg) => write!(f, "shape error: {msg}"),
        }
    }
}

impl std::fmt::Debug for FitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FitError({self})")
    }
}

impl std::error::Error for FitError {}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        let exit_code = match err {
            FitError::Shape(_) => 3,
            FitError::Domain(_) | FitError::Convergence { .. } => 4,
        };
        AppError::new(exit_code, err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
