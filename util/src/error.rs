use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A marshal or unmarshal ran off the end of the supplied buffer.
    #[error("buffer too short: needed {expected} bytes, have {actual}")]
    UnexpectedEndOfBuffer { expected: usize, actual: usize },

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Boxed(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps a crate-local error so it can travel through the shared
    /// marshal traits without losing its concrete type.
    pub fn from_std<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Boxed(Box::new(error))
    }

    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        if let Error::Boxed(inner) = self {
            inner.downcast_ref()
        } else {
            None
        }
    }
}
