use super::*;
use std::hint::black_box;

/// Resolves every address to a made-up name without touching debug info.
struct NamingResolver;

struct NamingSession;

impl Resolver for NamingResolver {
    type Session = NamingSession;

    fn open(&self, _executable: &ExecutableIdentity) -> Result<NamingSession, ResolverInitError> {
        Ok(NamingSession)
    }
}

impl ResolveSession for NamingSession {
    fn resolve(&mut self, address: usize, _raw: String) -> Frame {
        Frame::resolved(
            address,
            ResolvedSymbol {
                function: format!("fn_{address:x}"),
                file: None,
                line: None,
                column: None,
                module: None,
            },
        )
    }
}

/// Fails to resolve exactly one frame index.
struct FlakyResolver {
    broken_index: usize,
}

struct FlakySession {
    broken_index: usize,
    next_index: usize,
}

impl Resolver for FlakyResolver {
    type Session = FlakySession;

    fn open(&self, _executable: &ExecutableIdentity) -> Result<FlakySession, ResolverInitError> {
        Ok(FlakySession {
            broken_index: self.broken_index,
            next_index: 0,
        })
    }
}

impl ResolveSession for FlakySession {
    fn resolve(&mut self, address: usize, raw: String) -> Frame {
        let index = self.next_index;
        self.next_index += 1;
        if index == self.broken_index {
            return Frame::unresolved(address, raw, "symbol table unreadable");
        }
        NamingSession.resolve(address, raw)
    }
}

struct BrokenResolver;

impl Resolver for BrokenResolver {
    type Session = NamingSession;

    fn open(&self, executable: &ExecutableIdentity) -> Result<NamingSession, ResolverInitError> {
        Err(ResolverInitError::LoadExecutable {
            path: executable.path().to_path_buf(),
            reason: "no debug object".to_owned(),
        })
    }
}

/// Tries to capture again from inside resolution.
struct NestingResolver;

struct NestingSession;

impl Resolver for NestingResolver {
    type Session = NestingSession;

    fn open(&self, _executable: &ExecutableIdentity) -> Result<NestingSession, ResolverInitError> {
        Ok(NestingSession)
    }
}

impl ResolveSession for NestingSession {
    fn resolve(&mut self, address: usize, raw: String) -> Frame {
        let nested =
            Trace::capture_with(&NamingResolver, None, &CaptureOptions::with_max_depth(1));
        let reason = match nested {
            Err(CaptureError::Unwind { .. }) => "nested capture refused",
            Err(_) => "nested capture failed differently",
            Ok(_) => "nested capture succeeded",
        };
        Frame::unresolved(address, raw, reason)
    }
}

#[inline(never)]
fn at_depth<T>(remaining: usize, f: &mut dyn FnMut() -> T) -> T {
    if remaining == 0 {
        return f();
    }
    let out = at_depth(remaining - 1, f);
    black_box(remaining);
    out
}

fn capture_named(max_depth: usize) -> Trace<'static> {
    Trace::capture_with(
        &NamingResolver,
        None,
        &CaptureOptions::with_max_depth(max_depth),
    )
    .unwrap()
}

#[test]
fn frame_count_is_min_of_depth_and_stack() {
    for depth in [0, 1, 2, 3, 7, 64, usize::MAX] {
        let trace = at_depth(5, &mut || capture_named(depth));
        assert_eq!(trace.len(), trace.max_frames().min(depth), "depth {depth}");
        assert!(trace.len() <= trace.max_frames());
    }
}

#[test]
fn zero_depth_keeps_metadata() {
    let trace = at_depth(4, &mut || capture_named(0));
    assert!(trace.is_empty());
    assert!(trace.max_frames() >= 4);
    assert!(trace.is_truncated());
    assert_eq!(trace.render(), "");
}

#[test]
fn shallow_bound_on_deep_stack() {
    let trace = at_depth(10, &mut || capture_named(3));
    assert_eq!(trace.len(), 3);
    assert!(trace.max_frames() >= 10, "max_frames {}", trace.max_frames());
}

#[test]
fn same_call_site_gives_same_frames() {
    let captures: Vec<Vec<usize>> = (0..2)
        .map(|_| {
            let trace = at_depth(3, &mut || capture_named(usize::MAX));
            trace.iter().map(Frame::address).collect()
        })
        .collect();
    assert_eq!(captures[0], captures[1]);
}

#[test]
fn one_unresolved_frame_does_not_fail_capture() {
    let trace = at_depth(6, &mut || {
        Trace::capture_with(
            &FlakyResolver { broken_index: 2 },
            None,
            &CaptureOptions::default(),
        )
        .unwrap()
    });
    assert!(trace.len() > 3);
    for (index, frame) in trace.iter().enumerate() {
        if index == 2 {
            let Symbol::Unresolved { raw, reason } = frame.symbol() else {
                panic!("frame 2 should be unresolved");
            };
            assert!(!raw.is_empty());
            assert!(raw.contains(&format!("0x{:x}", frame.address())), "{raw}");
            assert_eq!(reason, "symbol table unreadable");
        } else {
            assert!(frame.is_resolved(), "frame {index}");
        }
    }
}

#[test]
fn resolver_init_failure_yields_no_trace() {
    let err = Trace::capture_with(&BrokenResolver, None, &CaptureOptions::default()).unwrap_err();
    match err {
        CaptureError::ResolverInit(ResolverInitError::LoadExecutable { reason, .. }) => {
            assert_eq!(reason, "no debug object")
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn nested_capture_on_same_thread_is_refused() {
    let trace =
        Trace::capture_with(&NestingResolver, None, &CaptureOptions::with_max_depth(1)).unwrap();
    let Symbol::Unresolved { reason, .. } = trace.frames()[0].symbol() else {
        panic!("nesting resolver only produces unresolved frames");
    };
    assert_eq!(reason, "nested capture refused");

    // The arena is free again once the outer capture is done.
    assert_eq!(capture_named(1).len(), 1);
}

#[test]
fn stack_deeper_than_the_buffer_is_capped() {
    let mut buffer = [0usize; 4];
    let trace = at_depth(12, &mut || {
        crate::trace::capture_into(
            &mut buffer,
            &NamingResolver,
            None,
            &CaptureOptions::default(),
        )
        .unwrap()
    });
    assert_eq!(trace.max_frames(), 4);
    assert_eq!(trace.len(), 4);
    assert!(!trace.is_truncated());
    assert!(trace.iter().all(Frame::is_resolved));

    let trace = at_depth(12, &mut || {
        crate::trace::capture_into(
            &mut buffer,
            &NamingResolver,
            None,
            &CaptureOptions::with_max_depth(2),
        )
        .unwrap()
    });
    assert_eq!(trace.max_frames(), 4);
    assert_eq!(trace.len(), 2);
}

#[test]
fn skip_frames_shrinks_the_stack() {
    let (full, skipped) = at_depth(3, &mut || {
        let mut counts = [0; 2];
        for (count, skip_frames) in counts.iter_mut().zip([0, 2]) {
            let options = CaptureOptions {
                max_depth: usize::MAX,
                skip_frames,
            };
            *count = Trace::capture_with(&NamingResolver, None, &options)
                .unwrap()
                .max_frames();
        }
        (counts[0], counts[1])
    });
    assert_eq!(skipped + 2, full);
}

#[test]
fn signal_is_borrowed_not_copied() {
    let signal = Signal::new(libc::SIGSEGV, 1, Some(0));
    let trace = Trace::capture_with(
        &NamingResolver,
        Some(&signal),
        &CaptureOptions::with_max_depth(2),
    )
    .unwrap();
    assert!(std::ptr::eq(trace.signal().unwrap(), &signal));
    assert!(trace.render().starts_with("signal SIGSEGV"));
}

#[test]
fn record_mirrors_trace() {
    let signal = Signal::new(libc::SIGABRT, 0, None);
    let trace = at_depth(2, &mut || {
        Trace::capture_with(
            &FlakyResolver { broken_index: 0 },
            Some(&signal),
            &CaptureOptions::with_max_depth(3),
        )
        .unwrap()
    });
    let record = trace.to_record();
    assert_eq!(record.max_frames, trace.max_frames() as u64);
    assert_eq!(record.frames.len(), 3);
    assert_eq!(
        record.signal.as_ref().unwrap().name.as_deref(),
        Some("SIGABRT")
    );
    assert!(!record.frames[0].is_resolved());
    assert!(record.frames[1].is_resolved());

    let validated = TraceRecord::new(
        record.max_frames,
        record.signal.clone(),
        record.frames.clone(),
    )
    .unwrap();
    assert_eq!(validated, record);
}

#[test]
fn from_frames_rejects_more_frames_than_captured() {
    let frames = vec![Frame::unresolved(1, String::new(), "x"); 3];
    let err = Trace::from_frames(2, frames, None).unwrap_err();
    assert_eq!(
        err,
        InvariantError::MoreFramesThanCaptured {
            frames: 3,
            max_frames: 2
        }
    );
}

#[test]
fn trace_is_shareable_across_threads() {
    let trace = at_depth(2, &mut || capture_named(8));
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                let mut count = 0;
                trace.walk(|_, _, _| {
                    count += 1;
                    true
                });
                assert_eq!(count, trace.len());
                assert_eq!(trace.render().lines().count(), trace.len());
            });
        }
    });
}
