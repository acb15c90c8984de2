/// Global logging configuration
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

static ENABLE_LOG: AtomicBool = AtomicBool::new(true);
static INIT: Once = Once::new();

/// Installs the `env_logger` backend once; `RUST_LOG` takes precedence
/// over the default `info` level.
pub fn init_log() {
  INIT.call_once(|| {
    let installed = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
      .format_timestamp(None)
      .try_init();
    if let Err(e) = installed {
      log::debug!("env_logger not installed: {}", e);
    }
  });
}

/// Set logging enabled; disabling drops the level to warnings only
pub fn set_log(enabled: bool) {
  ENABLE_LOG.store(enabled, Ordering::Relaxed);
  let level = if enabled {
    log::LevelFilter::Trace
  } else {
    log::LevelFilter::Warn
  };
  log::set_max_level(level);
}

/// Check if logging is enabled, default is true
pub fn is_log_enabled() -> bool {
  ENABLE_LOG.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_init_is_idempotent() {
    init_log();
    init_log();
    set_log(false);
    assert!(!is_log_enabled());
    set_log(true);
    assert!(is_log_enabled());
  }

  #[test]
  fn test_init_tolerates_existing_logger() {
    // a logger installed elsewhere makes try_init fail; init_log reports it and carries on
    let _ = env_logger::builder().is_test(true).try_init();
    init_log();
    log::debug!("still logging after init_log");
    set_log(true);
    assert!(is_log_enabled());
  }
}
