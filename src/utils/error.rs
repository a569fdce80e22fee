use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrepError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("NIfTI error: {0}")]
    NiftiError(#[from] nifti::NiftiError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse '{path}' at line {line}: {message}")]
    ParseError {
        path: String,
        line: usize,
        message: String,
    },

    #[error("Shape mismatch: {message}")]
    ShapeError { message: String },

    #[error("Missing mandatory input '{field}' on {interface}")]
    MissingInput { interface: String, field: String },

    #[error("Interface error on {interface}: {message}")]
    InterfaceError { interface: String, message: String },

    #[error("Workflow '{workflow}' is invalid: {message}")]
    WorkflowError { workflow: String, message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

/// 錯誤分類，決定 CLI 的退出碼
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Io,
    Configuration,
    Data,
    Declaration,
}

impl PrepError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PrepError::IoError(_) | PrepError::NiftiError(_) => ErrorCategory::Io,
            PrepError::ConfigValidationError { .. } | PrepError::InvalidConfigValueError { .. } => {
                ErrorCategory::Configuration
            }
            PrepError::SerializationError(_)
            | PrepError::ParseError { .. }
            | PrepError::ShapeError { .. }
            | PrepError::ProcessingError { .. } => ErrorCategory::Data,
            PrepError::MissingInput { .. }
            | PrepError::InterfaceError { .. }
            | PrepError::WorkflowError { .. } => ErrorCategory::Declaration,
        }
    }

    /// 給使用者的修復建議
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            PrepError::IoError(_) => "Check that the input files exist and the output directory is writable",
            PrepError::NiftiError(_) => "Make sure the image is a valid NIfTI-1 file (.nii or .nii.gz)",
            PrepError::SerializationError(_) => "Report this as a bug; the output could not be serialized",
            PrepError::ConfigValidationError { .. } | PrepError::InvalidConfigValueError { .. } => {
                "Fix the highlighted entry in the TOML configuration"
            }
            PrepError::ParseError { .. } => {
                "Tables must be whitespace separated numbers (FSL .mat, .bval, .bvec)"
            }
            PrepError::ShapeError { .. } => {
                "Check that the b-values, b-vectors and volumes describe the same acquisition"
            }
            PrepError::MissingInput { .. } => "Set the missing input or connect it from an upstream node",
            PrepError::InterfaceError { .. } => "Check the inputs given to the tool wrapper",
            PrepError::WorkflowError { .. } => "Check node names and field names in the connections",
            PrepError::ProcessingError { .. } => "Inspect the input data for empty or constant images",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Configuration => 2,
            ErrorCategory::Data => 3,
            ErrorCategory::Declaration => 4,
            ErrorCategory::Io => 5,
        }
    }

    pub(crate) fn shape(message: impl Into<String>) -> Self {
        PrepError::ShapeError {
            message: message.into(),
        }
    }

    pub(crate) fn workflow(workflow: &str, message: impl Into<String>) -> Self {
        PrepError::WorkflowError {
            workflow: workflow.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn interface(interface: &str, message: impl Into<String>) -> Self {
        PrepError::InterfaceError {
            interface: interface.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PrepError>;
