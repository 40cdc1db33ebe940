//! Platform unwinder: raw return addresses and their textual descriptions.

use crate::CaptureError;
use crate::config::CAPTURE_CEILING;
use std::cell::RefCell;
use std::collections::TryReserveError;
use std::ffi::CStr;
use std::fmt::Write as _;

thread_local! {
    static SCRATCH: RefCell<[usize; CAPTURE_CEILING]> =
        const { RefCell::new([0; CAPTURE_CEILING]) };
}

const REENTRANT_CAPTURE: &str = "stackshot: capture already in progress on this thread\n";
const THREAD_EXITING: &str = "stackshot: thread-local scratch space unavailable\n";
const NO_FRAMES: &str = "stackshot: unwinder reported no frames\n";

/// Runs `f` with this thread's fixed-size address arena.
///
/// Fails instead of aliasing the arena when a capture is already running on
/// this thread, e.g. when a signal handler interrupts one.
pub(crate) fn with_scratch<R>(
    f: impl FnOnce(&mut [usize]) -> Result<R, CaptureError>,
) -> Result<R, CaptureError> {
    SCRATCH
        .try_with(|cell| match cell.try_borrow_mut() {
            Ok(mut scratch) => f(&mut scratch[..]),
            Err(_) => Err(CaptureError::Unwind {
                reason: REENTRANT_CAPTURE,
            }),
        })
        .unwrap_or(Err(CaptureError::Unwind {
            reason: THREAD_EXITING,
        }))
}

/// Fills `buf` with return addresses of the calling thread, innermost first,
/// after dropping `skip` frames. Returns how many were written.
pub fn capture_addresses(buf: &mut [usize], skip: usize) -> Result<usize, CaptureError> {
    platform::capture_addresses_impl(buf, skip)
}

/// One description per address, in the `module(symbol+0xoff) [0xaddr]`
/// layout of glibc's `backtrace_symbols`.
///
/// Every buffer, the outer one and each description, is reserved fallibly
/// before it is written, so allocation failure surfaces as `Symbolize`.
pub fn describe_addresses(addresses: &[usize]) -> Result<Vec<String>, CaptureError> {
    let mut descriptions = Vec::new();
    descriptions
        .try_reserve_exact(addresses.len())
        .map_err(|_| CaptureError::Symbolize)?;
    for &address in addresses {
        let description = describe_address(address).map_err(|_| CaptureError::Symbolize)?;
        descriptions.push(description);
    }
    Ok(descriptions)
}

/// Punctuation plus two hex numbers of at most 16 digits each.
const DESCRIPTION_SLACK: usize = 64;

fn description_capacity(info: Option<&RawModuleInfo<'_>>) -> usize {
    let Some(info) = info else {
        return DESCRIPTION_SLACK;
    };
    let module = info.path.map_or(0, |path| path.to_bytes().len());
    let symbol = info.symbol.map_or(0, |symbol| symbol.name.to_bytes().len());
    module + symbol + DESCRIPTION_SLACK
}

pub(crate) fn describe_address(address: usize) -> Result<String, TryReserveError> {
    platform::with_module_info(address, |info| -> Result<String, TryReserveError> {
        let mut out = String::new();
        out.try_reserve_exact(description_capacity(info.as_ref()))?;
        let Some(info) = info else {
            let _ = write!(out, "[0x{address:x}]");
            return Ok(out);
        };
        let module = info.path.map_or("", lossless_or_placeholder);
        match info.symbol {
            Some(symbol) => {
                let _ = write!(
                    out,
                    "{module}({}+0x{:x}) [0x{address:x}]",
                    lossless_or_placeholder(symbol.name),
                    address.wrapping_sub(symbol.address)
                );
            }
            None => {
                let _ = write!(
                    out,
                    "{module}(+0x{:x}) [0x{address:x}]",
                    address.wrapping_sub(info.base)
                );
            }
        }
        Ok(out)
    })
}

fn lossless_or_placeholder(text: &CStr) -> &str {
    text.to_str().unwrap_or("<non-utf8>")
}

/// `dladdr` result borrowing the loader's own strings.
#[derive(Clone, Copy)]
pub(crate) struct RawModuleInfo<'a> {
    pub base: usize,
    pub path: Option<&'a CStr>,
    pub symbol: Option<RawSymbol<'a>>,
}

#[derive(Clone, Copy)]
pub(crate) struct RawSymbol<'a> {
    pub name: &'a CStr,
    pub address: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ModuleInfo {
    pub base: usize,
    pub path: Option<String>,
    pub symbol: Option<NearestSymbol>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NearestSymbol {
    pub name: String,
    pub address: usize,
}

pub(crate) fn module_info_for_address(address: usize) -> Option<ModuleInfo> {
    platform::with_module_info(address, |info| {
        let info = info?;
        Some(ModuleInfo {
            base: info.base,
            path: info.path.map(|path| path.to_string_lossy().into_owned()),
            symbol: info.symbol.map(|symbol| NearestSymbol {
                name: symbol.name.to_string_lossy().into_owned(),
                address: symbol.address,
            }),
        })
    })
}

/// Runtime base of the module holding this crate's code, i.e. the main
/// program unless the crate was linked into a shared library.
pub(crate) fn main_program_base() -> Option<usize> {
    let here = main_program_base as fn() -> Option<usize> as usize;
    platform::with_module_info(here, |info| info.map(|info| info.base))
}

#[cfg(unix)]
mod platform {
    use super::{CaptureError, NO_FRAMES, RawModuleInfo, RawSymbol};
    use std::ffi::{CStr, c_void};

    #[inline(never)]
    pub fn capture_addresses_impl(buf: &mut [usize], skip: usize) -> Result<usize, CaptureError> {
        let mut seen = 0usize;
        let mut written = 0usize;

        // SAFETY: no other unwinder state is shared with this call; the
        // caller holds this thread's scratch arena exclusively.
        unsafe {
            backtrace::trace_unsynchronized(|frame| {
                let ip = frame.ip() as usize;
                if ip == 0 {
                    return true;
                }
                seen += 1;
                if seen <= skip {
                    return true;
                }
                if written == buf.len() {
                    return false;
                }
                buf[written] = ip;
                written += 1;
                true
            });
        }

        if seen == 0 {
            return Err(CaptureError::Unwind { reason: NO_FRAMES });
        }
        Ok(written)
    }

    /// Calls `f` with what `dladdr` knows about `address`. The strings are
    /// only borrowed for the duration of `f`.
    pub fn with_module_info<R>(
        address: usize,
        f: impl FnOnce(Option<RawModuleInfo<'_>>) -> R,
    ) -> R {
        let mut info = std::mem::MaybeUninit::<libc::Dl_info>::zeroed();
        let ok = unsafe { libc::dladdr(address as *const c_void, info.as_mut_ptr()) };
        if ok == 0 {
            return f(None);
        }

        let info = unsafe { info.assume_init() };
        if info.dli_fbase.is_null() {
            return f(None);
        }

        let path = if info.dli_fname.is_null() {
            None
        } else {
            Some(unsafe { CStr::from_ptr(info.dli_fname) })
        }
        .filter(|path| !path.is_empty());

        let symbol = if info.dli_sname.is_null() || info.dli_saddr.is_null() {
            None
        } else {
            Some(RawSymbol {
                name: unsafe { CStr::from_ptr(info.dli_sname) },
                address: info.dli_saddr as usize,
            })
        };

        f(Some(RawModuleInfo {
            base: info.dli_fbase as usize,
            path,
            symbol,
        }))
    }
}

#[cfg(not(unix))]
mod platform {
    use super::{CaptureError, RawModuleInfo};

    const UNSUPPORTED: &str = "stackshot: unsupported platform for stack capture\n";

    pub fn capture_addresses_impl(
        _buf: &mut [usize],
        _skip: usize,
    ) -> Result<usize, CaptureError> {
        Err(CaptureError::Unwind {
            reason: UNSUPPORTED,
        })
    }

    pub fn with_module_info<R>(
        _address: usize,
        f: impl FnOnce(Option<RawModuleInfo<'_>>) -> R,
    ) -> R {
        f(None)
    }
}
