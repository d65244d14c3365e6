//! CLI: extract, boot and supervise a bundled interpreter workload.
//!
//! Usage: `bundle_supervisor [OPTIONS] <COMMAND>`
//! Example: bundle_supervisor --archive app.zip --dest /data/bundle boot
//!
//! Settings come from (lowest to highest) built-in defaults, `--config <file.json>`,
//! command-line flags and `BUNDLE_*` environment variables.
//!
//! Set RUST_LOG=bundle_supervisor=trace for TRACE-level span enter/exit and events.

use bundle_supervisor::config::SessionConfig;
use bundle_supervisor::health::{HealthProbe, HttpHealthProbe, local_health_url};
use bundle_supervisor::session::{BootEvent, RuntimeSession};
use bundle_supervisor::status_channel::{FileStatusChannel, StatusChannel};
use bundle_supervisor::types::ExtractionPhase;
use bundle_supervisor::{Extractor, ExtractionOutcome, ResumeSupervisor, VersionGuard};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

/// Extract, boot and supervise a bundled interpreter workload.
#[derive(Parser, Debug)]
#[command(name = "bundle_supervisor")]
#[command(
  after_help = r#"Environment variables (override the matching flags when set):
  BUNDLE_ARCHIVE        Compressed resource bundle.
  BUNDLE_DEST           Directory the bundle is extracted into.
  BUNDLE_RUNTIME_DIR    Directory holding extraction/startup/runtime status files.
  BUNDLE_PORT           Port of the workload's health endpoint (default: 8080).
  BUNDLE_APP_VERSION    App version part of the bundle version token.
  BUNDLE_BUILD_NUMBER   Build number part of the bundle version token.

Examples:
  bundle_supervisor --archive app.zip --dest /data/bundle extract
  bundle_supervisor --config session.json boot
  bundle_supervisor --runtime-dir /data/runtime status"#
)]
struct Args {
  /// JSON session config; missing fields take their defaults.
  #[arg(long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Compressed resource bundle. Overridden by BUNDLE_ARCHIVE if set.
  #[arg(long, value_name = "FILE")]
  archive: Option<PathBuf>,

  /// Extraction destination. Overridden by BUNDLE_DEST if set.
  #[arg(long, value_name = "DIR")]
  dest: Option<PathBuf>,

  /// Status file directory. Overridden by BUNDLE_RUNTIME_DIR if set.
  #[arg(long, value_name = "DIR")]
  runtime_dir: Option<PathBuf>,

  /// Health endpoint port. Overridden by BUNDLE_PORT if set.
  #[arg(long)]
  port: Option<u16>,

  /// Overridden by BUNDLE_APP_VERSION if set.
  #[arg(long)]
  app_version: Option<String>,

  /// Overridden by BUNDLE_BUILD_NUMBER if set.
  #[arg(long)]
  build_number: Option<String>,

  /// Module run as the workload's main program.
  #[arg(long, value_name = "MODULE")]
  entry_module: Option<String>,

  /// Interpreter executable (default: <dest>/python/bin/python3).
  #[arg(long, value_name = "FILE")]
  interpreter: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Extract if needed, start the workload and supervise it until Ctrl-C.
  Boot {
    /// Exit once the workload is healthy instead of supervising it.
    #[arg(long)]
    no_supervise: bool,
  },
  /// Extract the bundle if the version token or canaries require it.
  Extract,
  /// Print the status files of the runtime directory.
  Status,
  /// Run one health check; exit code 0 when healthy.
  Probe,
}

fn session_config(args: &Args) -> SessionConfig {
  let mut config = match &args.config {
    Some(path) => match SessionConfig::from_file(path) {
      Ok(c) => c,
      Err(e) => {
        eprintln!("Error reading config {}: {}", path.display(), e);
        process::exit(2);
      }
    },
    None => SessionConfig::default(),
  };
  if let Some(v) = &args.archive {
    config.archive = v.clone();
  }
  if let Some(v) = &args.dest {
    config.dest = v.clone();
  }
  if let Some(v) = &args.runtime_dir {
    config.runtime_dir = v.clone();
  }
  if let Some(v) = args.port {
    config.port = v;
  }
  if let Some(v) = &args.app_version {
    config.app_version = v.clone();
  }
  if let Some(v) = &args.build_number {
    config.build_number = v.clone();
  }
  if let Some(v) = &args.entry_module {
    config.entry_module = v.clone();
  }
  if let Some(v) = &args.interpreter {
    config.interpreter_program = Some(v.clone());
  }
  // Env vars override flags.
  config.with_env_overrides()
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
    .init();

  let args = Args::parse();
  let config = session_config(&args);
  info!(
    archive = %config.archive.display(),
    dest = %config.dest.display(),
    runtime_dir = %config.runtime_dir.display(),
    port = config.port,
    token = %config.version_token(),
    "options (env, flags or config)"
  );

  let code = match args.command {
    Command::Boot { no_supervise } => boot(config, no_supervise).await,
    Command::Extract => extract(&config),
    Command::Status => status(&config).await,
    Command::Probe => probe(&config).await,
  };
  process::exit(code);
}

async fn boot(config: SessionConfig, no_supervise: bool) -> i32 {
  let session = match RuntimeSession::from_config(config) {
    Ok(s) => s,
    Err(e) => {
      eprintln!("Error: {}", e);
      return 2;
    }
  };

  let report = match session.boot(&print_event).await {
    Ok(r) => r,
    Err(e) => {
      eprintln!("Boot failed: {}", e);
      if e.is_retryable() {
        eprintln!("  (retrying may help)");
      }
      session.shutdown();
      return 1;
    }
  };
  println!("Workload ready.");
  println!("  Session: {}", report.session_id);
  println!("  Extraction: {:?}", report.extraction);
  println!("  Health attempts: {}", report.ready.attempts());
  println!("  Elapsed: {:?}", report.elapsed);
  if no_supervise {
    return 0;
  }

  let supervisor = session
    .resume_supervisor(report.ready, || {
      warn!("hard restart requested, exiting");
      process::exit(75);
    })
    .with_observer(|snap| {
      println!(
        "Resume state: {} (failed attempts: {})",
        snap.state, snap.reconnect.attempts
      )
    });
  supervise(Arc::new(supervisor)).await;
  session.shutdown();
  0
}

fn print_event(event: &BootEvent) {
  match event {
    BootEvent::Extracting(s) if s.phase == ExtractionPhase::Extracting => match s.fraction() {
      Some(f) => println!("Extracting... {:.0}%", f * 100.0),
      None => println!("Extracting... {} files", s.files_extracted),
    },
    BootEvent::Extracting(_) | BootEvent::Status(_) => {}
    BootEvent::Extracted { entries } => println!("Extracted {} entries.", entries),
    BootEvent::UpToDate => println!("Bundle up to date."),
    BootEvent::Bootstrapped => println!("Interpreter initialized."),
    BootEvent::Launched(outcome) => println!("Workload launch: {:?}", outcome),
    BootEvent::Startup(state) => info!(?state, "startup"),
    BootEvent::Ready { attempts } => info!(attempts, "ready"),
  }
}

/// Runs until Ctrl-C. On unix, SIGUSR1 simulates a foreground transition and SIGUSR2 a
/// retry from the restart overlay. Cycles run on their own tasks so Ctrl-C stays live.
async fn supervise(supervisor: Arc<ResumeSupervisor>) {
  #[cfg(unix)]
  {
    use tokio::signal::unix::{SignalKind, signal};
    let (mut foreground, mut retry) = match (
      signal(SignalKind::user_defined1()),
      signal(SignalKind::user_defined2()),
    ) {
      (Ok(a), Ok(b)) => (a, b),
      _ => {
        warn!("resume signals unavailable, supervising until Ctrl-C only");
        let _ = tokio::signal::ctrl_c().await;
        return;
      }
    };
    loop {
      tokio::select! {
        _ = tokio::signal::ctrl_c() => return,
        _ = foreground.recv() => {
          let supervisor = supervisor.clone();
          tokio::spawn(async move { supervisor.on_foreground().await });
        }
        _ = retry.recv() => {
          let supervisor = supervisor.clone();
          tokio::spawn(async move { supervisor.retry().await });
        }
      }
    }
  }
  #[cfg(not(unix))]
  {
    let _ = &supervisor;
    let _ = tokio::signal::ctrl_c().await;
  }
}

fn extract(config: &SessionConfig) -> i32 {
  let guard = VersionGuard::new(
    config.layout.clone(),
    Extractor::new(config.timings.progress_batch),
  );
  let files = FileStatusChannel::new(config.runtime_dir.clone());
  let result = guard.ensure_extracted(
    &config.archive,
    &config.dest,
    &config.version_token(),
    &mut |s| {
      if let Err(e) = files.write_extraction(s) {
        warn!(error = %e, "could not write extraction status");
      }
    },
  );
  match result {
    Ok(ExtractionOutcome::UpToDate) => {
      println!("Bundle up to date ({}).", config.version_token());
      0
    }
    Ok(ExtractionOutcome::Extracted(n)) => {
      println!("Extracted {} entries into {}.", n, config.dest.display());
      0
    }
    Err(e) => {
      eprintln!("Extraction failed: {}", e);
      1
    }
  }
}

async fn status(config: &SessionConfig) -> i32 {
  let files = FileStatusChannel::new(config.runtime_dir.clone());
  let extraction = files.extraction_status();
  let snapshot = files.snapshot().await;
  let out = serde_json::json!({
    "extraction": extraction,
    "startup": snapshot.startup,
    "runtime": snapshot.runtime,
  });
  match serde_json::to_string_pretty(&out) {
    Ok(s) => {
      println!("{}", s);
      0
    }
    Err(e) => {
      eprintln!("Error: {}", e);
      1
    }
  }
}

async fn probe(config: &SessionConfig) -> i32 {
  let probe = match HttpHealthProbe::new(
    local_health_url(config.port),
    config.timings.request_timeout(),
    config.timings.probe_timeout(),
  ) {
    Ok(p) => p,
    Err(e) => {
      eprintln!("Error: {}", e);
      return 2;
    }
  };
  if probe.check_health().await {
    println!("Healthy: {}", probe.url());
    0
  } else {
    println!("Unhealthy: {}", probe.url());
    1
  }
}
