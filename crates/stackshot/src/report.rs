//! Allocation-free diagnostic channel.
//!
//! Capture failures may happen after a fault with a damaged heap, so they are
//! reported by writing fixed byte strings straight to stderr with `write(2)`.
//! Nothing here allocates or takes a lock.

use crate::CaptureError;

/// Writes `message` to stderr, retrying on short writes and `EINTR`.
pub fn report_static(message: &str) {
    write_all_fd(libc::STDERR_FILENO, message.as_bytes());
}

pub(crate) fn report_error(err: &CaptureError) {
    report_static(err.static_message());
}

/// Raw `write(2)` loop. Errors other than `EINTR` drop the rest of the output.
pub(crate) fn write_all_fd(fd: libc::c_int, mut bytes: &[u8]) {
    while !bytes.is_empty() {
        let n = unsafe { libc::write(fd, bytes.as_ptr().cast(), bytes.len()) };
        if n < 0 {
            if std::io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return;
        }
        if n == 0 {
            return;
        }
        bytes = &bytes[n as usize..];
    }
}

/// `io::Write` over a raw file descriptor, for printing from a signal handler
/// without going through `std::io::stderr()`'s lock.
pub(crate) struct FdWriter(pub libc::c_int);

impl std::io::Write for FdWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        write_all_fd(self.0, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::os::fd::FromRawFd;

    #[test]
    fn fd_writer_writes_everything() {
        let mut fds = [0 as libc::c_int; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let [read_fd, write_fd] = fds;

        let mut writer = FdWriter(write_fd);
        writer.write_all(b"stackshot: hello\n").unwrap();
        unsafe { libc::close(write_fd) };

        let mut reader = unsafe { std::fs::File::from_raw_fd(read_fd) };
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "stackshot: hello\n");
    }
}
