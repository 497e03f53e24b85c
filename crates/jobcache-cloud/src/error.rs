use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Connection to {0} is closed")]
    Closed(String),
}

pub type Result<T> = std::result::Result<T, CloudError>;

impl CloudError {
    fn io_kind(&self) -> io::ErrorKind {
        match self {
            CloudError::Io(err) => err.kind(),
            CloudError::ObjectStore(object_store::Error::NotFound { .. }) => io::ErrorKind::NotFound,
            CloudError::ObjectStore(object_store::Error::AlreadyExists { .. }) => {
                io::ErrorKind::AlreadyExists
            }
            CloudError::ObjectStore(object_store::Error::NotImplemented) => {
                io::ErrorKind::Unsupported
            }
            CloudError::InvalidPath(_) | CloudError::Config(_) => io::ErrorKind::InvalidInput,
            CloudError::Closed(_) => io::ErrorKind::NotConnected,
            _ => io::ErrorKind::Other,
        }
    }
}

impl From<CloudError> for io::Error {
    fn from(err: CloudError) -> Self {
        match err {
            CloudError::Io(io_err) => io_err,
            other => io::Error::new(other.io_kind(), other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_kinds_are_preserved() {
        let err: io::Error = CloudError::Closed("memory:///cache".to_string()).into();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);

        let err: io::Error = CloudError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "no")).into();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);

        let err: io::Error = CloudError::ObjectStore(object_store::Error::NotFound {
            path: "cache/app.jar".to_string(),
            source: "missing".into(),
        })
        .into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
