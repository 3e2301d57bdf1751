//! speakeasy-media: Artifact validation, upload to the analysis service,
//! result normalization, and live capture.

pub mod capture;
pub mod error;
pub mod normalizer;
pub mod types;
pub mod uploader;
pub mod validator;

pub use error::AnalysisError;
pub use types::{AnalysisService, ProgressReporter, ProgressUpdate, UploadRequest};
