pub mod error;
pub mod logger;
pub mod nifti_io;
pub mod text_io;
pub mod validation;
