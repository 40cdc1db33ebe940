use tracing::warn;

/// Upper bound on raw addresses recorded by one capture.
///
/// Sized after glibc's `SIGSTKSZ`; the scratch arena holding addresses is
/// allocated once per thread at this size and never grows.
pub const CAPTURE_CEILING: usize = 8192;

pub const MAX_DEPTH_ENV: &str = "STACKSHOT_MAX_DEPTH";
pub const SKIP_FRAMES_ENV: &str = "STACKSHOT_SKIP_FRAMES";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Frames kept in the trace. `usize::MAX` means unbounded.
    pub max_depth: usize,
    /// Innermost frames dropped before anything is counted, e.g. the
    /// capture machinery itself.
    pub skip_frames: usize,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            max_depth: usize::MAX,
            skip_frames: 0,
        }
    }
}

impl CaptureOptions {
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            ..Self::default()
        }
    }

    /// Defaults overridden by `STACKSHOT_MAX_DEPTH` / `STACKSHOT_SKIP_FRAMES`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();
        if let Some(depth) = parse_var(&lookup, MAX_DEPTH_ENV) {
            options.max_depth = depth;
        }
        if let Some(skip) = parse_var(&lookup, SKIP_FRAMES_ENV) {
            options.skip_frames = skip;
        }
        options
    }
}

fn parse_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<usize> {
    let raw = lookup(key)?;
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("unbounded") {
        return Some(usize::MAX);
    }
    match trimmed.parse::<usize>() {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(key, value = %raw, %error, "ignoring unparsable capture option");
            None
        }
    }
}

/// Signals handled by [`install_crash_handler`](crate::install_crash_handler)
/// unless configured otherwise.
pub const DEFAULT_FATAL_SIGNALS: &[libc::c_int] = &[
    libc::SIGSEGV,
    libc::SIGBUS,
    libc::SIGILL,
    libc::SIGFPE,
    libc::SIGABRT,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashHandlerOptions {
    pub signals: Vec<libc::c_int>,
    pub capture: CaptureOptions,
}

impl Default for CrashHandlerOptions {
    fn default() -> Self {
        Self {
            signals: DEFAULT_FATAL_SIGNALS.to_vec(),
            capture: CaptureOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let options = CaptureOptions::from_lookup(lookup(&[]));
        assert_eq!(options, CaptureOptions::default());
        assert_eq!(options.max_depth, usize::MAX);
    }

    #[test]
    fn reads_both_variables() {
        let options = CaptureOptions::from_lookup(lookup(&[
            (MAX_DEPTH_ENV, " 12 "),
            (SKIP_FRAMES_ENV, "2"),
        ]));
        assert_eq!(
            options,
            CaptureOptions {
                max_depth: 12,
                skip_frames: 2
            }
        );
    }

    #[test]
    fn unbounded_keyword() {
        let options = CaptureOptions::from_lookup(lookup(&[(MAX_DEPTH_ENV, "Unbounded")]));
        assert_eq!(options.max_depth, usize::MAX);
    }

    #[test]
    fn garbage_falls_back_to_default() {
        let options = CaptureOptions::from_lookup(lookup(&[
            (MAX_DEPTH_ENV, "lots"),
            (SKIP_FRAMES_ENV, "-1"),
        ]));
        assert_eq!(options, CaptureOptions::default());
    }

    #[test]
    fn crash_handler_defaults_cover_segv() {
        let options = CrashHandlerOptions::default();
        assert!(options.signals.contains(&libc::SIGSEGV));
        assert!(!options.signals.contains(&libc::SIGKILL));
    }
}
