use cfuconv::simulator::config::config::{apply_cli_overrides, load_default_config};
use cfuconv::simulator::{verify_workload, ConvEngine, Precision, Workload};
use std::path::PathBuf;

fn demo(name: &str) -> Workload {
  let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(name);
  Workload::load(&path).unwrap()
}

fn accelerator_engine() -> ConvEngine {
  let mut config = load_default_config().unwrap();
  apply_cli_overrides(&mut config, true, Some("accelerator"), Some("model"));
  ConvEngine::from_config(&config).unwrap()
}

#[test]
fn textbook_demo_runs_on_both_backends() {
  let workload = demo("textbook.json");
  // multiplier 0.5, shift -1: a quarter of the textbook sums, rounded
  let expected = vec![11, 14, 16, 21, 24, 26, 31, 34, 36];

  let software = ConvEngine::software().run(&workload).unwrap();
  assert_eq!(software.output, expected);
  assert_eq!(software.profile.phases, 1);

  let accelerator = accelerator_engine().run(&workload).unwrap();
  assert_eq!(accelerator.backend, "accelerator");
  assert_eq!(accelerator.output, expected);
  assert!(accelerator.profile.cycles > software.profile.cycles);
}

#[test]
fn padded_grouped_demo_verifies() {
  let workload = demo("padded_grouped.json");
  assert_eq!(workload.precision, Precision::Int8);
  let report = verify_workload(&workload, &mut accelerator_engine()).unwrap();
  assert!(report.passed(), "{:?}", report.mismatch);
  assert_eq!(report.accelerator, "accelerator");
}

#[test]
fn packed_int4_workload_matches_unpacked() {
  let mut unpacked = demo("textbook.json");
  unpacked.filter = vec![1, -2, 3, -4];
  let mut packed = unpacked.clone();
  packed.precision = Precision::Int4;
  // low nibble first: (1, -2) -> 0xE1, (3, -4) -> 0xC3
  packed.filter = vec![0xE1u8 as i8 as i32, 0xC3u8 as i8 as i32];

  let a = ConvEngine::software().run(&unpacked).unwrap();
  let b = ConvEngine::software().run(&packed).unwrap();
  assert_eq!(a.output, b.output);
  assert!(verify_workload(&packed, &mut accelerator_engine()).unwrap().passed());
}
