use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Why a single capture attempt produced no trace.
///
/// Per-frame resolution failures never show up here; they degrade into an
/// unresolved [`Symbol`](crate::Symbol) inside a successful trace.
#[derive(Debug)]
pub enum CaptureError {
    /// The platform unwinder could not produce raw addresses.
    Unwind { reason: &'static str },
    /// Raw addresses could not be turned into text descriptions.
    Symbolize,
    /// The executable-scoped resolver session could not be opened.
    ResolverInit(ResolverInitError),
    /// Storage for the resolved frames could not be allocated.
    OutOfMemory { frames: usize },
}

impl CaptureError {
    /// Fixed, allocation-free description of the error kind.
    pub fn static_message(&self) -> &'static str {
        match self {
            Self::Unwind { reason } => *reason,
            Self::Symbolize => "stackshot: failed to describe captured addresses\n",
            Self::ResolverInit(_) => "stackshot: failed to open symbol resolver\n",
            Self::OutOfMemory { .. } => "stackshot: out of memory allocating frames\n",
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unwind { reason } => write!(f, "stack unwind failed: {}", reason.trim_end()),
            Self::Symbolize => write!(f, "failed to describe captured return addresses"),
            Self::ResolverInit(source) => write!(f, "failed to open symbol resolver: {source}"),
            Self::OutOfMemory { frames } => {
                write!(f, "out of memory allocating storage for {frames} frames")
            }
        }
    }
}

impl Error for CaptureError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ResolverInit(source) => Some(source),
            _ => None,
        }
    }
}

impl From<ResolverInitError> for CaptureError {
    fn from(source: ResolverInitError) -> Self {
        Self::ResolverInit(source)
    }
}

#[derive(Debug)]
pub enum ResolverInitError {
    ExecutableIdentity(io::Error),
    LoadExecutable { path: PathBuf, reason: String },
}

impl fmt::Display for ResolverInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutableIdentity(source) => {
                write!(f, "could not determine current executable: {source}")
            }
            Self::LoadExecutable { path, reason } => {
                write!(f, "could not load {}: {reason}", path.display())
            }
        }
    }
}

impl Error for ResolverInitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ExecutableIdentity(source) => Some(source),
            Self::LoadExecutable { .. } => None,
        }
    }
}
