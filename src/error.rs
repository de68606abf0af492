use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Walkdir(#[from] walkdir::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("Unable to open image {path:?}: {source}")]
    ImageOpen {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    /// The feature extractor failed on a batch. Never retried.
    #[error("Feature extractor failed: {0}")]
    ExtractorInvocation(#[source] anyhow::Error),
    #[error("Unable to use feature cache {path:?}: {reason}")]
    CacheIo {
        path: PathBuf,
        reason: String,
    },
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("Malformed bounding box: ({xmin}, {ymin}, {xmax}, {ymax})")]
    MalformedBox {
        xmin: f32,
        ymin: f32,
        xmax: f32,
        ymax: f32,
    },
    #[error("Class id {0} is not in the label table")]
    UnknownClass(usize),
    #[error("Unable to rewrite path: {0}")]
    PathRewrite(String),
}

impl Error {
    pub(crate) fn cache(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::CacheIo {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
