//! Fatal-signal handler that prints a trace before the process dies.
//!
//! The handler runs on an alternate stack allocated at install time, so a
//! stack overflow still gets reported. After printing it restores the
//! default disposition and re-raises, so the process terminates (and dumps
//! core) exactly as it would have without the handler.

use crate::config::{CaptureOptions, CrashHandlerOptions};
use crate::report::{self, FdWriter};
use crate::resolver::Addr2LineResolver;
use crate::signal::Signal;
use crate::trace::Trace;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

/// Symbolication is stack-hungry, so the alternate stack is much larger than
/// `SIGSTKSZ`.
const ALT_STACK_SIZE: usize = 1024 * 1024;

static INSTALLED: AtomicBool = AtomicBool::new(false);
static HANDLING: AtomicBool = AtomicBool::new(false);
static MAX_DEPTH: AtomicUsize = AtomicUsize::new(usize::MAX);
static SKIP_FRAMES: AtomicUsize = AtomicUsize::new(0);

/// Keeps the handler installed; dropping it restores what was there before.
pub struct CrashHandlerGuard {
    previous: Vec<(libc::c_int, libc::sigaction)>,
    previous_stack: libc::stack_t,
    _alt_stack: Box<[u8]>,
}

impl std::fmt::Debug for CrashHandlerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrashHandlerGuard")
            .field(
                "signals",
                &self.previous.iter().map(|(s, _)| *s).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Installs the crash handler for `options.signals`.
///
/// Only one handler can be installed per process at a time.
pub fn install_crash_handler(options: CrashHandlerOptions) -> io::Result<CrashHandlerGuard> {
    if INSTALLED.swap(true, Ordering::AcqRel) {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "crash handler already installed",
        ));
    }

    match install(&options) {
        Ok(guard) => {
            debug!(
                signals = ?options.signals,
                max_depth = options.capture.max_depth,
                "crash handler installed"
            );
            Ok(guard)
        }
        Err(error) => {
            INSTALLED.store(false, Ordering::Release);
            Err(error)
        }
    }
}

fn install(options: &CrashHandlerOptions) -> io::Result<CrashHandlerGuard> {
    MAX_DEPTH.store(options.capture.max_depth, Ordering::Release);
    SKIP_FRAMES.store(options.capture.skip_frames, Ordering::Release);

    let mut alt_stack = vec![0u8; ALT_STACK_SIZE].into_boxed_slice();
    let new_stack = libc::stack_t {
        ss_sp: alt_stack.as_mut_ptr().cast(),
        ss_flags: 0,
        ss_size: alt_stack.len(),
    };
    let mut previous_stack: libc::stack_t = unsafe { std::mem::zeroed() };
    if unsafe { libc::sigaltstack(&new_stack, &mut previous_stack) } != 0 {
        return Err(io::Error::last_os_error());
    }

    let mut previous = Vec::with_capacity(options.signals.len());
    for &signum in &options.signals {
        let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
        action.sa_sigaction = crash_handler as *const () as usize;
        action.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK;
        unsafe { libc::sigemptyset(&mut action.sa_mask) };

        let mut old: libc::sigaction = unsafe { std::mem::zeroed() };
        if unsafe { libc::sigaction(signum, &action, &mut old) } != 0 {
            let error = io::Error::last_os_error();
            restore(&previous, &previous_stack);
            return Err(error);
        }
        previous.push((signum, old));
    }

    Ok(CrashHandlerGuard {
        previous,
        previous_stack,
        _alt_stack: alt_stack,
    })
}

fn restore(previous: &[(libc::c_int, libc::sigaction)], previous_stack: &libc::stack_t) {
    for (signum, old) in previous.iter().rev() {
        unsafe { libc::sigaction(*signum, old, std::ptr::null_mut()) };
    }
    unsafe { libc::sigaltstack(previous_stack, std::ptr::null_mut()) };
}

impl Drop for CrashHandlerGuard {
    fn drop(&mut self) {
        restore(&self.previous, &self.previous_stack);
        INSTALLED.store(false, Ordering::Release);
    }
}

extern "C" fn crash_handler(
    signum: libc::c_int,
    info: *mut libc::siginfo_t,
    _ctx: *mut libc::c_void,
) {
    // A fault inside the handler itself goes straight to the default action.
    if HANDLING.swap(true, Ordering::AcqRel) {
        reraise_default(signum);
        return;
    }

    let signal = unsafe { Signal::from_siginfo(signum, info) };
    let options = CaptureOptions {
        max_depth: MAX_DEPTH.load(Ordering::Acquire),
        skip_frames: SKIP_FRAMES.load(Ordering::Acquire),
    };
    report::report_static("stackshot: fatal signal received, capturing stack\n");
    if let Ok(trace) = Trace::capture_with(&Addr2LineResolver, Some(&signal), &options) {
        let _ = trace.print(FdWriter(libc::STDERR_FILENO));
    }

    reraise_default(signum);
}

fn reraise_default(signum: libc::c_int) {
    unsafe {
        libc::signal(signum, libc::SIG_DFL);
        libc::raise(signum);
    }
}
