use std::io;
use std::path::{Path, PathBuf};

/// The executable a resolver session is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableIdentity {
    path: PathBuf,
}

impl ExecutableIdentity {
    /// Identity of the running process, from `std::env::current_exe`.
    pub fn current() -> io::Result<Self> {
        std::env::current_exe().map(Self::new)
    }

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
