use crate::trace::Trace;
use std::fmt;
use std::io::{self, Write};

impl Trace<'_> {
    /// Appends the signal line (if any), then one line per frame.
    ///
    /// Existing content of `out` is left untouched.
    pub fn render_into(&self, out: &mut String) {
        if let Some(signal) = self.signal() {
            signal.render(out);
        }
        for frame in self {
            frame.render(out);
            out.push('\n');
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    /// Renders into a fresh buffer and writes it to `out` in one go.
    pub fn print<W: Write>(&self, mut out: W) -> io::Result<()> {
        out.write_all(self.render().as_bytes())?;
        out.flush()
    }
}

impl fmt::Display for Trace<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Captures the current stack and prints it to `out`.
#[inline(never)]
pub fn print_now<W: Write>(out: W) -> io::Result<()> {
    let trace = Trace::capture(None).map_err(io::Error::other)?;
    trace.print(out)
}
