//! Capture, symbolicate, and render a snapshot of the calling thread's stack.
//!
//! ```no_run
//! use stackshot::Trace;
//!
//! let trace = Trace::capture_to_depth(None, 16)?;
//! trace.walk(|frame, index, _| {
//!     println!("#{index:02} {:?}", frame.function());
//!     true
//! });
//! eprint!("{trace}");
//! # Ok::<(), stackshot::CaptureError>(())
//! ```
//!
//! Capture may run inside a signal handler after a fault. Raw addresses go
//! into a fixed thread-local arena, failures are reported through a fixed
//! `write(2)` message, and a frame that cannot be symbolicated degrades to
//! the platform's raw description instead of failing the capture.

mod config;
mod crash;
mod error;
mod frame;
mod identity;
mod render;
mod report;
mod resolver;
mod signal;
mod trace;
pub mod unwind;
mod walk;

pub use config::{
    CAPTURE_CEILING, CaptureOptions, CrashHandlerOptions, DEFAULT_FATAL_SIGNALS, MAX_DEPTH_ENV,
    SKIP_FRAMES_ENV,
};
pub use crash::{CrashHandlerGuard, install_crash_handler};
pub use error::{CaptureError, ResolverInitError};
pub use frame::{Frame, ResolvedSymbol, Symbol};
pub use identity::ExecutableIdentity;
pub use render::print_now;
pub use report::report_static;
pub use resolver::{Addr2LineResolver, Addr2LineSession, ResolveSession, Resolver};
pub use signal::Signal;
pub use stackshot_types::{FrameRecord, InvariantError, SignalRecord, TraceRecord};
pub use trace::Trace;

#[cfg(test)]
mod tests;
