use crate::backend::ResultMatrix;
use crate::profile::ProfileReport;

pub fn print_profile_report(backend: &str, report: &ProfileReport) {
  println!("\n--- Profile [{}] ---", backend);
  println!("  phases:  {}", report.phases);
  println!("  cycles:  {}", report.cycles);
  println!("  elapsed: {} us", report.elapsed_us);
  println!("--- End Profile ---\n");
}

/// Human-readable description of the first result-matrix difference.
pub fn describe_mismatch(batch: usize, expected: &ResultMatrix<i32>, actual: &ResultMatrix<i32>) -> Option<String> {
  expected.first_mismatch(actual).map(|(channel, pos)| {
    if expected.rows() != actual.rows() || expected.cols() != actual.cols() {
      return format!(
        "batch {}: result matrix is {}x{}, expected {}x{}",
        batch,
        actual.rows(),
        actual.cols(),
        expected.rows(),
        expected.cols()
      );
    }
    format!(
      "batch {}: channel {} position {}: expected {}, got {}",
      batch,
      channel,
      pos,
      expected.get(channel, pos),
      actual.get(channel, pos)
    )
  })
}
