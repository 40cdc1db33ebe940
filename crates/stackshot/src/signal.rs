use stackshot_types::SignalRecord;
use std::fmt::Write as _;

/// Fault context attached to a trace: which signal triggered the capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal {
    number: libc::c_int,
    code: libc::c_int,
    fault_address: Option<usize>,
}

const SIGNAL_NAMES: &[(libc::c_int, &str)] = &[
    (libc::SIGHUP, "SIGHUP"),
    (libc::SIGINT, "SIGINT"),
    (libc::SIGQUIT, "SIGQUIT"),
    (libc::SIGILL, "SIGILL"),
    (libc::SIGTRAP, "SIGTRAP"),
    (libc::SIGABRT, "SIGABRT"),
    (libc::SIGBUS, "SIGBUS"),
    (libc::SIGFPE, "SIGFPE"),
    (libc::SIGKILL, "SIGKILL"),
    (libc::SIGUSR1, "SIGUSR1"),
    (libc::SIGSEGV, "SIGSEGV"),
    (libc::SIGUSR2, "SIGUSR2"),
    (libc::SIGPIPE, "SIGPIPE"),
    (libc::SIGALRM, "SIGALRM"),
    (libc::SIGTERM, "SIGTERM"),
    (libc::SIGCHLD, "SIGCHLD"),
    (libc::SIGCONT, "SIGCONT"),
    (libc::SIGSTOP, "SIGSTOP"),
    (libc::SIGTSTP, "SIGTSTP"),
    (libc::SIGTTIN, "SIGTTIN"),
    (libc::SIGTTOU, "SIGTTOU"),
    (libc::SIGURG, "SIGURG"),
    (libc::SIGXCPU, "SIGXCPU"),
    (libc::SIGXFSZ, "SIGXFSZ"),
    (libc::SIGVTALRM, "SIGVTALRM"),
    (libc::SIGPROF, "SIGPROF"),
    (libc::SIGWINCH, "SIGWINCH"),
    (libc::SIGSYS, "SIGSYS"),
];

impl Signal {
    pub fn new(number: libc::c_int, code: libc::c_int, fault_address: Option<usize>) -> Self {
        Self {
            number,
            code,
            fault_address,
        }
    }

    /// Reads a `siginfo_t` as delivered to an `SA_SIGINFO` handler.
    ///
    /// # Safety
    ///
    /// `info` must be null or point to a valid `siginfo_t`.
    pub unsafe fn from_siginfo(number: libc::c_int, info: *const libc::siginfo_t) -> Self {
        if info.is_null() {
            return Self::new(number, 0, None);
        }
        let info = unsafe { &*info };
        // Only kernel-generated faults (positive codes) fill in `si_addr`.
        let fault_address = if info.si_code > 0 && carries_fault_address(number) {
            Some(unsafe { info.si_addr() } as usize)
        } else {
            None
        };
        Self::new(number, info.si_code, fault_address)
    }

    pub fn number(&self) -> libc::c_int {
        self.number
    }

    pub fn code(&self) -> libc::c_int {
        self.code
    }

    pub fn fault_address(&self) -> Option<usize> {
        self.fault_address
    }

    pub fn name(&self) -> Option<&'static str> {
        SIGNAL_NAMES
            .iter()
            .find(|(number, _)| *number == self.number)
            .map(|(_, name)| *name)
    }

    /// Appends a one-line description, newline included.
    pub fn render(&self, out: &mut String) {
        match self.name() {
            Some(name) => {
                let _ = write!(out, "signal {name} ({})", self.number);
            }
            None => {
                let _ = write!(out, "signal {}", self.number);
            }
        }
        let _ = write!(out, ", code {}", self.code);
        if let Some(address) = self.fault_address {
            let _ = write!(out, ", fault address 0x{address:016x}");
        }
        out.push('\n');
    }

    pub fn to_record(&self) -> SignalRecord {
        SignalRecord {
            number: self.number,
            name: self.name().map(str::to_owned),
            code: self.code,
            fault_address: self.fault_address.map(|address| address as u64),
        }
    }
}

fn carries_fault_address(number: libc::c_int) -> bool {
    matches!(
        number,
        libc::SIGSEGV | libc::SIGBUS | libc::SIGILL | libc::SIGFPE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(signal: Signal) -> String {
        let mut out = String::new();
        signal.render(&mut out);
        out
    }

    #[test]
    fn renders_segv_with_fault_address() {
        let signal = Signal::new(libc::SIGSEGV, 1, Some(0x10));
        assert_eq!(
            rendered(signal),
            format!(
                "signal SIGSEGV ({}), code 1, fault address 0x0000000000000010\n",
                libc::SIGSEGV
            )
        );
    }

    #[test]
    fn renders_unnamed_signal() {
        let signal = Signal::new(77, 0, None);
        assert_eq!(signal.name(), None);
        assert_eq!(rendered(signal), "signal 77, code 0\n");
    }

    #[test]
    fn render_appends() {
        let mut out = String::from("before\n");
        Signal::new(libc::SIGABRT, 0, None).render(&mut out);
        assert!(out.starts_with("before\nsignal SIGABRT"));
    }

    #[test]
    fn null_siginfo_has_no_fault_context() {
        let signal = unsafe { Signal::from_siginfo(libc::SIGSEGV, std::ptr::null()) };
        assert_eq!(signal, Signal::new(libc::SIGSEGV, 0, None));
    }

    #[test]
    fn record_carries_name() {
        let record = Signal::new(libc::SIGBUS, 2, Some(0xdead)).to_record();
        assert_eq!(record.name.as_deref(), Some("SIGBUS"));
        assert_eq!(record.fault_address, Some(0xdead));
    }
}
