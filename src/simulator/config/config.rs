use crate::arch::cfu::cfu::DEFAULT_MAX_KERNEL_VOLUME;
use crate::backend::BackendKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

const DEFAULT_CONFIG: &str = include_str!("default.toml");

/// Backend selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendSection {
  #[serde(default = "default_backend_kind")]
  pub kind: String,
}

fn default_backend_kind() -> String {
  "software".to_string()
}

impl Default for BackendSection {
  fn default() -> Self {
    Self {
      kind: default_backend_kind(),
    }
  }
}

/// Where accelerator commands go
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AcceleratorSection {
  #[serde(default = "default_transport")]
  pub transport: String,
  #[serde(default = "default_host")]
  pub host: String,
  #[serde(default = "default_port")]
  pub port: u16,
  /// Operand buffer depth of the hosted CFU model, in kernel-window rows
  #[serde(default = "default_max_kernel_volume")]
  pub max_kernel_volume: usize,
}

fn default_transport() -> String {
  "model".to_string()
}

fn default_host() -> String {
  "127.0.0.1".to_string()
}

fn default_port() -> u16 {
  6000
}

fn default_max_kernel_volume() -> usize {
  DEFAULT_MAX_KERNEL_VOLUME
}

impl Default for AcceleratorSection {
  fn default() -> Self {
    Self {
      transport: default_transport(),
      host: default_host(),
      port: default_port(),
      max_kernel_volume: default_max_kernel_volume(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SimulationSection {
  #[serde(default)]
  pub quiet: bool,
}

/// Unified application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
  #[serde(default)]
  pub backend: BackendSection,
  #[serde(default)]
  pub accelerator: AcceleratorSection,
  #[serde(default)]
  pub simulation: SimulationSection,
}

/// How the accelerator backend reaches its device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
  Model,
  Socket,
}

impl AppConfig {
  pub fn backend_kind(&self) -> io::Result<BackendKind> {
    BackendKind::parse(&self.backend.kind).ok_or_else(|| {
      io::Error::new(
        io::ErrorKind::InvalidData,
        format!("unsupported backend kind: {}", self.backend.kind),
      )
    })
  }

  pub fn transport(&self) -> io::Result<Transport> {
    match self.accelerator.transport.to_lowercase().as_str() {
      "model" => Ok(Transport::Model),
      "socket" => Ok(Transport::Socket),
      other => Err(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("unsupported accelerator transport: {}", other),
      )),
    }
  }
}

/// Load the embedded default configuration
pub fn load_default_config() -> io::Result<AppConfig> {
  parse_config(DEFAULT_CONFIG)
}

/// Load a configuration file
pub fn load_config_file(path: &Path) -> io::Result<AppConfig> {
  let content = fs::read_to_string(path)
    .map_err(|e| io::Error::new(io::ErrorKind::NotFound, format!("cannot read config file {:?}: {}", path, e)))?;
  parse_config(&content)
}

fn parse_config(content: &str) -> io::Result<AppConfig> {
  toml::from_str::<AppConfig>(content)
    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("failed to parse TOML config: {}", e)))
}

/// Merge two configurations (the second overrides the first)
pub fn merge_config(mut base: AppConfig, override_config: AppConfig) -> AppConfig {
  if !override_config.backend.kind.is_empty() {
    base.backend.kind = override_config.backend.kind;
  }

  if !override_config.accelerator.transport.is_empty() {
    base.accelerator.transport = override_config.accelerator.transport;
  }
  if !override_config.accelerator.host.is_empty() {
    base.accelerator.host = override_config.accelerator.host;
  }
  if override_config.accelerator.port != 0 {
    base.accelerator.port = override_config.accelerator.port;
  }
  if override_config.accelerator.max_kernel_volume != 0 {
    base.accelerator.max_kernel_volume = override_config.accelerator.max_kernel_volume;
  }

  if override_config.simulation.quiet {
    base.simulation.quiet = true;
  }

  base
}

/// Apply CLI overrides
pub fn apply_cli_overrides(config: &mut AppConfig, quiet: bool, backend: Option<&str>, transport: Option<&str>) {
  if quiet {
    config.simulation.quiet = true;
  }
  if let Some(kind) = backend {
    config.backend.kind = kind.to_string();
  }
  if let Some(transport) = transport {
    config.accelerator.transport = transport.to_string();
  }
}

/// Validate the configuration
pub fn validate_config(config: &AppConfig) -> io::Result<()> {
  let kind = config.backend_kind()?;
  if config.accelerator.max_kernel_volume == 0 {
    return Err(io::Error::new(
      io::ErrorKind::InvalidData,
      "accelerator.max_kernel_volume must be at least 1".to_string(),
    ));
  }
  if kind == BackendKind::Accelerator && config.transport()? == Transport::Socket {
    if config.accelerator.host.trim().is_empty() {
      return Err(io::Error::new(
        io::ErrorKind::InvalidData,
        "accelerator.host cannot be empty for the socket transport".to_string(),
      ));
    }
    if config.accelerator.port == 0 {
      return Err(io::Error::new(
        io::ErrorKind::InvalidData,
        "accelerator.port cannot be 0 for the socket transport".to_string(),
      ));
    }
  }
  Ok(())
}

/// Load and merge configurations
///
/// Steps:
/// 1. Load the default configuration
/// 2. Merge a custom configuration file, if given
/// 3. Apply CLI overrides
/// 4. Validate
pub fn load_and_merge_configs(
  custom_config_path: Option<&Path>,
  quiet: bool,
  backend: Option<&str>,
  transport: Option<&str>,
) -> io::Result<AppConfig> {
  let mut config = load_default_config()?;

  if let Some(custom_path) = custom_config_path {
    let custom_config = load_config_file(custom_path)?;
    config = merge_config(config, custom_config);
  }

  apply_cli_overrides(&mut config, quiet, backend, transport);

  validate_config(&config)?;

  Ok(config)
}
