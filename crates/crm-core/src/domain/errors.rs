use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CrmResult<T> = Result<T, CrmError>;
pub type LoadResult<T> = CrmResult<T>;

/// Failure classes, each with its own process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrmErrorCategory {
    /// Inconsistent or malformed run input and databases.
    InputValidationError,
    /// Files that cannot be read or written.
    IoSystemError,
    /// Numerical failures such as a singular block balance.
    ComputationError,
    /// Broken internal invariants.
    InternalError,
}

impl CrmErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::InputValidationError => 2,
            Self::IoSystemError => 3,
            Self::ComputationError => 4,
            Self::InternalError => 5,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::InputValidationError => "InputValidationError",
            Self::IoSystemError => "IoSystemError",
            Self::ComputationError => "ComputationError",
            Self::InternalError => "InternalError",
        }
    }

    /// Placeholder prefix shared by every code of the category.
    pub const fn code_prefix(self) -> &'static str {
        match self {
            Self::InputValidationError => "INPUT",
            Self::IoSystemError => "IO",
            Self::ComputationError => "RUN",
            Self::InternalError => "SYS",
        }
    }
}

/// Fatal failure of a kinetics run.
///
/// `placeholder` is a stable dotted code (`INPUT.NELE_SEQUENCE`,
/// `RUN.SINGULAR_BLOCK_MATRIX`, ...) that scripts can match on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrmError {
    category: CrmErrorCategory,
    placeholder: &'static str,
    message: String,
}

impl CrmError {
    pub fn new(
        category: CrmErrorCategory,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder,
            message: message.into(),
        }
    }

    pub fn input_validation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(CrmErrorCategory::InputValidationError, placeholder, message)
    }

    pub fn io_system(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(CrmErrorCategory::IoSystemError, placeholder, message)
    }

    pub fn computation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(CrmErrorCategory::ComputationError, placeholder, message)
    }

    pub fn internal(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(CrmErrorCategory::InternalError, placeholder, message)
    }

    pub const fn category(&self) -> CrmErrorCategory {
        self.category
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    /// `ERROR: [CODE] message`, the first stderr line of a failed run.
    pub fn diagnostic_line(&self) -> String {
        format!("ERROR: [{}] {}", self.placeholder, self.message)
    }

    pub fn fatal_exit_line(&self) -> String {
        format!("FATAL EXIT CODE: {}", self.exit_code())
    }
}

impl Display for CrmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.label(),
            self.placeholder,
            self.message
        )
    }
}

impl Error for CrmError {}
