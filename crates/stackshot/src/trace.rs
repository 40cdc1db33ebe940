use crate::config::CaptureOptions;
use crate::error::{CaptureError, ResolverInitError};
use crate::frame::Frame;
use crate::identity::ExecutableIdentity;
use crate::report;
use crate::resolver::{Addr2LineResolver, ResolveSession, Resolver};
use crate::signal::Signal;
use crate::unwind;
use stackshot_types::{InvariantError, TraceRecord};

/// An immutable snapshot of the calling thread's stack.
///
/// Frames are kept in the order the unwinder produced them, innermost (most
/// recent call) first. `signal` is borrowed from the caller and never owned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace<'s> {
    max_frames: usize,
    frames: Box<[Frame]>,
    signal: Option<&'s Signal>,
}

impl<'s> Trace<'s> {
    /// Captures the whole stack.
    #[inline(never)]
    pub fn capture(signal: Option<&'s Signal>) -> Result<Self, CaptureError> {
        Self::capture_with(&Addr2LineResolver, signal, &CaptureOptions::default())
    }

    /// Captures at most `max_depth` frames; `usize::MAX` means unbounded.
    #[inline(never)]
    pub fn capture_to_depth(
        signal: Option<&'s Signal>,
        max_depth: usize,
    ) -> Result<Self, CaptureError> {
        Self::capture_with(
            &Addr2LineResolver,
            signal,
            &CaptureOptions::with_max_depth(max_depth),
        )
    }

    /// Captures with an explicit resolver and options.
    ///
    /// A failure is written once to stderr through the allocation-free
    /// channel before it is returned; no partial trace is ever produced.
    #[inline(never)]
    pub fn capture_with<R: Resolver>(
        resolver: &R,
        signal: Option<&'s Signal>,
        options: &CaptureOptions,
    ) -> Result<Self, CaptureError> {
        let result =
            unwind::with_scratch(|scratch| capture_into(scratch, resolver, signal, options));
        if let Err(err) = &result {
            report::report_error(err);
        }
        result
    }

    /// Assembles a trace from already-resolved frames.
    pub fn from_frames(
        max_frames: usize,
        frames: Vec<Frame>,
        signal: Option<&'s Signal>,
    ) -> Result<Self, InvariantError> {
        if frames.len() > max_frames {
            return Err(InvariantError::MoreFramesThanCaptured {
                frames: frames.len() as u64,
                max_frames: max_frames as u64,
            });
        }
        Ok(Self {
            max_frames,
            frames: frames.into_boxed_slice(),
            signal,
        })
    }

    /// Frames the unwinder produced before the depth bound was applied.
    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Whether the depth bound cut frames off.
    pub fn is_truncated(&self) -> bool {
        self.frames.len() < self.max_frames
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Frame> {
        self.frames.iter()
    }

    pub fn signal(&self) -> Option<&'s Signal> {
        self.signal
    }

    pub fn to_record(&self) -> TraceRecord {
        TraceRecord {
            max_frames: self.max_frames as u64,
            signal: self.signal.map(Signal::to_record),
            frames: self
                .frames
                .iter()
                .enumerate()
                .map(|(index, frame)| frame.to_record(index as u32))
                .collect(),
        }
    }
}

impl<'a, 's> IntoIterator for &'a Trace<'s> {
    type Item = &'a Frame;
    type IntoIter = std::slice::Iter<'a, Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

/// Capture through a caller-provided address buffer, whose length is the hard
/// ceiling on `max_frames`.
pub(crate) fn capture_into<'s, R: Resolver>(
    scratch: &mut [usize],
    resolver: &R,
    signal: Option<&'s Signal>,
    options: &CaptureOptions,
) -> Result<Trace<'s>, CaptureError> {
    let max_frames = unwind::capture_addresses(scratch, options.skip_frames)?;
    let num_frames = max_frames.min(options.max_depth);
    let addresses = &scratch[..num_frames];

    let descriptions = if addresses.is_empty() {
        Vec::new()
    } else {
        unwind::describe_addresses(addresses)?
    };

    let executable =
        ExecutableIdentity::current().map_err(ResolverInitError::ExecutableIdentity)?;
    let mut session = resolver.open(&executable)?;

    let mut frames = Vec::new();
    frames
        .try_reserve_exact(num_frames)
        .map_err(|_| CaptureError::OutOfMemory { frames: num_frames })?;
    for (&address, raw) in addresses.iter().zip(descriptions) {
        frames.push(session.resolve(address, raw));
    }
    drop(session);

    Ok(Trace {
        max_frames,
        frames: frames.into_boxed_slice(),
        signal,
    })
}
