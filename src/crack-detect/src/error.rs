//! Error taxonomy for the inference pipeline.
//!
//! A prediction either fully succeeds or fails with one of these kinds; no
//! partial results. Frontends map the kinds onto their own status codes and
//! log once at the boundary.

/// Client input defects, always recoverable per request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("No image selected")]
    NoFile,

    #[error("Unsupported file format. Please upload a PNG or JPG image.")]
    UnsupportedFormat,

    #[error("File too large. Maximum size is 5MB.")]
    TooLarge,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The upload passed validation but is not a decodable image.
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// Weight source unreachable or weight shapes do not match the
    /// architecture. Fatal at startup for eager loading; a per-request
    /// "service unavailable" for lazy loading.
    #[error("could not load model: {0}")]
    ModelLoad(String),

    /// Forward pass failure, including an input tensor of the wrong shape.
    #[error("inference failed: {0}")]
    Inference(String),
}

impl Error {
    pub fn model_load(err: impl std::fmt::Display) -> Self {
        Error::ModelLoad(err.to_string())
    }

    pub fn inference(err: impl std::fmt::Display) -> Self {
        Error::Inference(err.to_string())
    }
}
