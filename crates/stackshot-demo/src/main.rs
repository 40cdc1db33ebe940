use facet::Facet;
use figue as args;
use stackshot::{CaptureOptions, CrashHandlerOptions, Trace, install_crash_handler};
use std::io::Write;
use tracing::info;

type AnyResult<T> = Result<T, String>;

#[derive(Facet, Debug)]
struct Cli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    /// Maximum number of frames to keep (default: STACKSHOT_MAX_DEPTH or unbounded).
    #[facet(args::named, default)]
    depth: Option<usize>,
    /// Print the trace as a JSON record instead of text.
    #[facet(args::named, default)]
    json: bool,
    #[facet(args::subcommand)]
    command: CommandKind,
}

#[derive(Facet, Debug)]
#[repr(u8)]
enum CommandKind {
    /// Capture and print the current stack.
    Now,
    /// Install the crash handler and fault on purpose.
    Crash,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> AnyResult<()> {
    let cli = parse_cli()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut options = CaptureOptions::from_env();
    if let Some(depth) = cli.depth {
        options.max_depth = depth;
    }

    match cli.command {
        CommandKind::Now => outer(&options, cli.json),
        CommandKind::Crash => crash(options),
    }
}

fn parse_cli() -> AnyResult<Cli> {
    let figue_config = args::builder::<Cli>()
        .map_err(|e| format!("failed to build CLI schema: {e}"))?
        .cli(|cli| cli.strict())
        .help(|h| {
            h.program_name("stackshot-demo")
                .description("Capture, symbolicate and print the stack of this process")
                .version(option_env!("CARGO_PKG_VERSION").unwrap_or("dev"))
        })
        .build();
    let cli = args::Driver::new(figue_config)
        .run()
        .into_result()
        .map_err(|e| e.to_string())?;
    Ok(cli.value)
}

// A few real frames so the output has something to show.
#[inline(never)]
fn outer(options: &CaptureOptions, json: bool) -> AnyResult<()> {
    let result = middle(options, json);
    std::hint::black_box(options);
    result
}

#[inline(never)]
fn middle(options: &CaptureOptions, json: bool) -> AnyResult<()> {
    let result = inner(options, json);
    std::hint::black_box(options);
    result
}

#[inline(never)]
fn inner(options: &CaptureOptions, json: bool) -> AnyResult<()> {
    let trace = Trace::capture_with(&stackshot::Addr2LineResolver, None, options)
        .map_err(|e| format!("capture failed: {e}"))?;
    info!(
        frames = trace.len(),
        max_frames = trace.max_frames(),
        truncated = trace.is_truncated(),
        "captured stack"
    );

    let mut stdout = std::io::stdout().lock();
    if json {
        let json = trace
            .to_record()
            .to_json()
            .map_err(|e| format!("failed to encode trace: {e}"))?;
        writeln!(stdout, "{json}").map_err(|e| format!("failed to write trace: {e}"))?;
        Ok(())
    } else {
        trace
            .print(&mut stdout)
            .map_err(|e| format!("failed to write trace: {e}"))
    }
}

fn crash(capture: CaptureOptions) -> AnyResult<()> {
    let _guard = install_crash_handler(CrashHandlerOptions {
        capture,
        ..CrashHandlerOptions::default()
    })
    .map_err(|e| format!("failed to install crash handler: {e}"))?;
    info!("crash handler installed, raising SIGSEGV");
    unsafe { libc::raise(libc::SIGSEGV) };
    Err("SIGSEGV did not terminate the process".to_owned())
}
