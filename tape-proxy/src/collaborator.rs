use std::{error::Error, fmt, future::Future, path::Path, pin::Pin};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Owns the replay sequence counters.
pub trait SequenceController: Send + Sync {
    fn reset(&self) -> BoxFuture<'_, Result<(), CollaboratorError>>;
}

/// Owns the location tapes are persisted to and loaded from.
pub trait TapeStore: Send + Sync {
    fn set_path<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<(), CollaboratorError>>;
}

#[derive(Debug)]
pub struct CollaboratorError {
    component: &'static str,
    source: Box<dyn Error + Send + Sync>,
}

impl CollaboratorError {
    pub fn new(component: &'static str, source: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self {
            component,
            source: source.into(),
        }
    }

    pub fn component(&self) -> &'static str {
        self.component
    }
}

impl fmt::Display for CollaboratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.component, self.source)
    }
}

impl Error for CollaboratorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&*self.source)
    }
}
