use cfuconv::arch::cfu::Cfu;
use cfuconv::backend::BackendKind;
use cfuconv::simulator::config::load_and_merge_configs;
use cfuconv::simulator::server::socket::CfuServer;
use cfuconv::simulator::utils::log::{init_log, set_log};
use cfuconv::simulator::utils::report::print_profile_report;
use cfuconv::simulator::{verify_workload, ConvEngine, Workload};
use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;

/// cfuconv - quantized im2col convolution with CFU offload
#[derive(Parser, Debug)]
#[command(name = "cfuconv")]
#[command(version = "0.1.0")]
#[command(about = "Per-channel quantized convolution on a software or CFU backend", long_about = None)]
struct Args {
  /// Configuration file merged over the built-in defaults
  #[arg(short, long, global = true, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Matrix-multiply backend: software or accelerator
  #[arg(short, long, global = true, value_name = "KIND")]
  backend: Option<String>,

  /// Accelerator transport: model or socket
  #[arg(long, global = true, value_name = "TRANSPORT")]
  transport: Option<String>,

  /// Quiet mode (suppress log messages and profile tables)
  #[arg(short, long, global = true)]
  quiet: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run a JSON workload and print its output
  Run {
    #[arg(long, value_name = "FILE")]
    case: PathBuf,
  },
  /// Run a JSON workload on both backends and compare them
  Verify {
    #[arg(long, value_name = "FILE")]
    case: PathBuf,
  },
  /// Host the CFU model behind the command socket
  Serve {
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
  },
}

fn to_json<T: serde::Serialize>(value: &T) -> io::Result<String> {
  serde_json::to_string_pretty(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn main() -> io::Result<()> {
  init_log();

  let args = Args::parse();

  let mut config = load_and_merge_configs(
    args.config.as_deref(),
    args.quiet,
    args.backend.as_deref(),
    args.transport.as_deref(),
  )?;
  let quiet = config.simulation.quiet;
  if quiet {
    set_log(false);
  }

  match args.command {
    Command::Run { case } => {
      let workload = Workload::load(&case)?;
      let mut engine = ConvEngine::from_config(&config)?;
      let output = engine.run(&workload)?;
      println!("{}", to_json(&output)?);
      if !quiet {
        print_profile_report(engine.backend_name(), &output.profile);
      }
    },
    Command::Verify { case } => {
      let workload = Workload::load(&case)?;
      // the reference side is always software; compare against the CFU
      if config.backend_kind()? == BackendKind::Software {
        config.backend.kind = "accelerator".to_string();
      }
      let mut engine = ConvEngine::from_config(&config)?;
      let report = verify_workload(&workload, &mut engine)?;
      println!("{}", to_json(&report)?);
      if !report.passed() {
        std::process::exit(1);
      }
    },
    Command::Serve { host, port } => {
      let host = host.unwrap_or_else(|| config.accelerator.host.clone());
      let port = port.unwrap_or(config.accelerator.port);
      let device = Cfu::with_max_kernel_volume(config.accelerator.max_kernel_volume);
      let mut server = CfuServer::bind(&host, port, device)?;
      server.serve_forever()?;
    },
  }

  Ok(())
}
