use crate::error::{shape_mismatch, ConvError, Result};
use crate::kernel::ConvParams;
use crate::profile::ProfileReport;
use crate::tensor::RuntimeShape;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Element layout of a workload's tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
  /// i8 input and filter, i32 bias
  #[default]
  Int8,
  /// i8 input, filter packed two int4 per byte, i32 bias
  Int4,
  /// i16 input, i8 filter, i64 bias
  Int16,
}

/// One convolution described in JSON.
///
/// Integer data is kept wide here and narrowed to the precision's element
/// types when the workload is prepared.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Workload {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub precision: Precision,
  #[serde(default)]
  pub params: ConvParams,
  pub input_shape: RuntimeShape,
  pub input: Vec<i32>,
  pub filter_shape: RuntimeShape,
  pub filter: Vec<i32>,
  #[serde(default)]
  pub bias: Option<Vec<i64>>,
  pub output_shape: RuntimeShape,
  pub output_multiplier: Vec<i32>,
  pub output_shift: Vec<i32>,
}

/// Result of running a workload.
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadOutput {
  pub name: String,
  pub backend: String,
  pub output_shape: RuntimeShape,
  pub output: Vec<i32>,
  pub profile: ProfileReport,
}

fn narrow<T: TryFrom<i64>>(values: impl IntoIterator<Item = i64>, what: &str, element: &str) -> Result<Vec<T>> {
  values
    .into_iter()
    .enumerate()
    .map(|(idx, v)| {
      T::try_from(v).map_err(|_| shape_mismatch(format!("{}[{}] = {} does not fit in {}", what, idx, v, element)))
    })
    .collect()
}

impl Workload {
  pub fn from_json(text: &str) -> Result<Self> {
    serde_json::from_str(text).map_err(|e| ConvError::Config(format!("invalid workload: {}", e)))
  }

  pub fn load(path: &Path) -> Result<Self> {
    let text = fs::read_to_string(path)?;
    Self::from_json(&text)
  }

  pub fn input_i8(&self) -> Result<Vec<i8>> {
    narrow(self.input.iter().map(|&v| v as i64), "input", "i8")
  }

  pub fn input_i16(&self) -> Result<Vec<i16>> {
    narrow(self.input.iter().map(|&v| v as i64), "input", "i16")
  }

  /// Filter bytes as stored: unpacked i8 values, or packed int4 pairs.
  pub fn filter_i8(&self) -> Result<Vec<i8>> {
    narrow(self.filter.iter().map(|&v| v as i64), "filter", "i8")
  }

  pub fn bias_i32(&self) -> Result<Option<Vec<i32>>> {
    self
      .bias
      .as_ref()
      .map(|b| narrow(b.iter().copied(), "bias", "i32"))
      .transpose()
  }

  pub fn bias_i64(&self) -> Option<&[i64]> {
    self.bias.as_deref()
  }
}
