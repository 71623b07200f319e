use thiserror::Error;

/// Failure taxonomy of the treatment layer.
///
/// `InvalidInput`/`InvalidPath` report bad caller input, `Internal` marks a
/// violated invariant of this crate, `Delegate` carries a failure reported by
/// an external tool. Engine errors surface unchanged as [`Error::Gdal`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid path: {0}")]
    InvalidPath(std::path::PathBuf),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("'{algorithm}' failed: {message}")]
    Delegate { algorithm: String, message: String },
    #[error("Invalid string: {0}")]
    InvalidString(#[from] std::ffi::NulError),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
    #[error(transparent)]
    Infra(#[from] inf::Error),
}
