use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use crossbeam_channel::{select, Receiver};

use facegate_core::capture::domain::video_source::VideoSource;
use facegate_core::capture::infrastructure::ffmpeg_live_feed::FfmpegLiveFeed;
use facegate_core::capture::infrastructure::jpeg_frame_capturer::JpegFrameCapturer;
use facegate_core::capture::infrastructure::still_image_source::StillImageSource;
use facegate_core::gateway::infrastructure::http_recognition_gateway::HttpRecognitionGateway;
use facegate_core::shared::config::{ConfigOverrides, RemoteConfiguration};
use facegate_core::shared::constants::IMAGE_EXTENSIONS;
use facegate_core::workflow::domain::operation_kind::OperationKind;
use facegate_core::workflow::domain::outcome::Outcome;
use facegate_core::workflow::domain::workflow_state::WorkflowState;
use facegate_core::workflow::workflow_controller::{InFlight, WorkflowController, WorkflowEvent};

const REGISTERED_TEXT: &str =
    "You are registered to the system. Please verify to verify your identity.";
const NEGATIVE_EXIT_CODE: i32 = 2;

/// Register, verify and analyze a face against a remote recognition service.
#[derive(Parser)]
#[command(name = "facegate", version)]
struct Cli {
    /// JSON config file (defaults to the per-user config file).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the recognition service.
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Face detector backend used by analyze.
    #[arg(long, global = true)]
    detector_backend: Option<String>,

    /// Ask the service to run anti-spoofing during analyze.
    #[arg(long, global = true)]
    anti_spoofing: bool,

    /// Disable anti-spoofing even if the config file or environment enables it.
    #[arg(long, global = true, conflicts_with = "anti_spoofing")]
    no_anti_spoofing: bool,

    /// Request timeout in seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register the captured face.
    Register(ActionArgs),
    /// Verify the captured face against registered identities.
    Verify(ActionArgs),
    /// Estimate age, race, gender and emotion of each face.
    Analyze(ActionArgs),
    /// Interactive loop: r = register, v = verify, a = analyze, q = quit.
    Session(SourceArgs),
    /// Print the effective configuration.
    Config,
}

#[derive(Args)]
struct ActionArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Print the resulting state as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SourceArgs {
    /// Still image to use instead of a camera.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Capture device or stream URL (defaults to the platform camera).
    #[arg(long)]
    device: Option<String>,

    /// ffmpeg input format for --device (v4l2, avfoundation, dshow, ...).
    #[arg(long)]
    input_format: Option<String>,

    /// How long to wait for the first camera frame, in milliseconds.
    #[arg(long, default_value = "2000")]
    warmup_ms: u64,
}

enum SessionCommand {
    Run(OperationKind),
    Quit,
}

fn main() {
    env_logger::init();

    match run() {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

fn run() -> Result<i32, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let config = Arc::new(RemoteConfiguration::load(
        cli.config.as_deref(),
        cli_overrides(&cli),
    )?);

    match &cli.command {
        Command::Register(args) => run_action(OperationKind::Register, config, args),
        Command::Verify(args) => run_action(OperationKind::Verify, config, args),
        Command::Analyze(args) => run_action(OperationKind::Analyze, config, args),
        Command::Session(source) => {
            let controller = build_controller(config, source)?;
            run_session(&controller)?;
            Ok(0)
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(config.as_ref())?);
            Ok(0)
        }
    }
}

fn run_action(
    kind: OperationKind,
    config: Arc<RemoteConfiguration>,
    args: &ActionArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let controller = build_controller(config, &args.source)?;
    let state = controller.perform_blocking(kind)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        for line in render(&state) {
            println!("{line}");
        }
    }

    Ok(if succeeded(&state, kind) {
        0
    } else {
        NEGATIVE_EXIT_CODE
    })
}

fn run_session(controller: &WorkflowController) -> Result<(), Box<dyn std::error::Error>> {
    let events = controller.subscribe();
    let (line_tx, line_rx) = crossbeam_channel::unbounded::<String>();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    println!("Commands: r = register, v = verify, a = analyze, q = quit");
    let mut pending = None;
    loop {
        let keep_going = select! {
            recv(line_rx) -> line => match line {
                Ok(line) => handle_line(controller, &line, &mut pending),
                Err(_) => false,
            },
            recv(events) -> event => match event {
                Ok(event) => {
                    print_event(&event);
                    true
                }
                Err(_) => false,
            },
        };
        if !keep_going {
            break;
        }
    }

    if let Some(active) = controller.state().active_operation() {
        println!("Waiting for {active} to finish...");
    }
    for event in finish_session(&events, pending) {
        print_event(&event);
    }
    Ok(())
}

/// Waits for the last started operation and returns every event not yet
/// printed. `Completed` is published before `InFlight::wait` returns, so
/// nothing can be missed.
fn finish_session(
    events: &Receiver<WorkflowEvent>,
    pending: Option<InFlight>,
) -> Vec<WorkflowEvent> {
    if let Some(in_flight) = pending {
        in_flight.wait();
    }
    events.try_iter().collect()
}

/// Returns false once the user asked to quit.
fn handle_line(
    controller: &WorkflowController,
    line: &str,
    pending: &mut Option<InFlight>,
) -> bool {
    match parse_command(line) {
        Some(SessionCommand::Run(kind)) => {
            // Refusals come back as Rejected events.
            if let Ok(in_flight) = controller.perform(kind) {
                *pending = Some(in_flight);
            }
        }
        Some(SessionCommand::Quit) => return false,
        None if line.trim().is_empty() => {}
        None => println!("Unknown command '{}'", line.trim()),
    }
    true
}

fn print_event(event: &WorkflowEvent) {
    match event {
        WorkflowEvent::Started(kind) => println!("{kind}..."),
        WorkflowEvent::Completed { state, .. } => {
            for line in render(state) {
                println!("{line}");
            }
        }
        WorkflowEvent::Rejected { reason, .. } => println!("{reason}"),
    }
}

fn parse_command(line: &str) -> Option<SessionCommand> {
    match line.trim().to_lowercase().as_str() {
        "q" | "quit" | "exit" => Some(SessionCommand::Quit),
        "r" => Some(SessionCommand::Run(OperationKind::Register)),
        "v" => Some(SessionCommand::Run(OperationKind::Verify)),
        "a" => Some(SessionCommand::Run(OperationKind::Analyze)),
        other => other.parse().ok().map(SessionCommand::Run),
    }
}

fn build_controller(
    config: Arc<RemoteConfiguration>,
    source: &SourceArgs,
) -> Result<WorkflowController, Box<dyn std::error::Error>> {
    let video = open_source(source)?;
    let capturer = JpegFrameCapturer::new(video);
    let gateway = HttpRecognitionGateway::new(config)?;
    Ok(WorkflowController::new(Box::new(capturer), Arc::new(gateway)))
}

fn open_source(source: &SourceArgs) -> Result<Arc<dyn VideoSource>, Box<dyn std::error::Error>> {
    if let Some(path) = &source.image {
        log::info!("Using still image {}", path.display());
        return Ok(Arc::new(StillImageSource::open(path)?));
    }

    let (device, input_format) = match &source.device {
        Some(device) => (device.clone(), source.input_format.clone()),
        None => {
            let (device, format) = default_device();
            (
                device.to_string(),
                source
                    .input_format
                    .clone()
                    .or_else(|| format.map(str::to_string)),
            )
        }
    };

    let feed = FfmpegLiveFeed::start(&device, input_format.as_deref())?;
    if !feed.wait_for_frame(Duration::from_millis(source.warmup_ms)) {
        log::warn!("No frame from {device} after {}ms", source.warmup_ms);
    }
    Ok(Arc::new(feed))
}

/// Platform camera and the ffmpeg demuxer that reads it.
fn default_device() -> (&'static str, Option<&'static str>) {
    if cfg!(target_os = "macos") {
        ("0", Some("avfoundation"))
    } else if cfg!(target_os = "windows") {
        ("video=Integrated Camera", Some("dshow"))
    } else if cfg!(target_os = "linux") {
        ("/dev/video0", Some("v4l2"))
    } else {
        ("/dev/video0", None)
    }
}

fn cli_overrides(cli: &Cli) -> ConfigOverrides {
    ConfigOverrides {
        service_endpoint: cli.endpoint.clone(),
        detector_backend: cli.detector_backend.clone(),
        anti_spoofing: match (cli.anti_spoofing, cli.no_anti_spoofing) {
            (true, _) => Some(true),
            (false, true) => Some(false),
            (false, false) => None,
        },
        request_timeout_secs: cli.timeout,
        ..Default::default()
    }
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.timeout == Some(0) {
        return Err("Timeout must be a positive number of seconds".into());
    }
    if let Some(path) = &cli.config {
        if !path.exists() {
            return Err(format!("Config file not found: {}", path.display()).into());
        }
    }
    let source = match &cli.command {
        Command::Register(args) | Command::Verify(args) | Command::Analyze(args) => &args.source,
        Command::Session(source) => source,
        Command::Config => return Ok(()),
    };
    if source.image.is_some() && source.device.is_some() {
        return Err("--image and --device are mutually exclusive".into());
    }
    if source.image.is_some() && source.input_format.is_some() {
        return Err("--input-format only applies to camera capture".into());
    }
    if let Some(path) = &source.image {
        if !path.exists() {
            return Err(format!("Image file not found: {}", path.display()).into());
        }
        if !is_image(path) {
            return Err(format!(
                "Unsupported image type: {} (expected one of {})",
                path.display(),
                IMAGE_EXTENSIONS.join(", ")
            )
            .into());
        }
    }
    Ok(())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Lines shown for a state: error banner first, then the current result.
fn render(state: &WorkflowState) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(notice) = state.last_error() {
        lines.push(format!("Error: {}", notice.message()));
    }
    if let Some(active) = state.active_operation() {
        lines.push(format!("{active} in progress..."));
    }
    match state.outcome() {
        Some(Outcome::Registration(r)) if r.succeeded => lines.push(REGISTERED_TEXT.to_string()),
        Some(Outcome::Verification(v)) if v.succeeded => {
            let name = v
                .identity_label
                .as_deref()
                .map(|label| format!(" {label}"))
                .unwrap_or_default();
            lines.push(format!("Verified. Welcome{name}"));
        }
        Some(Outcome::Verification(_)) => lines.push("Not Verified".to_string()),
        Some(Outcome::Analysis(a)) if !a.summaries.is_empty() => lines.push(a.summaries.join(",")),
        _ => {}
    }
    lines
}

fn succeeded(state: &WorkflowState, kind: OperationKind) -> bool {
    state.last_error().is_none()
        && state
            .outcome()
            .is_some_and(|outcome| outcome.kind() == kind && outcome.succeeded())
}
