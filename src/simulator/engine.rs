use super::config::{AppConfig, Transport};
use super::server::socket::CfuClient;
use super::utils::report::describe_mismatch;
use super::workload::{Precision, Workload, WorkloadOutput};
use crate::arch::cfu::Cfu;
use crate::backend::{AcceleratorBackend, BackendKind, MatmulBackend, ResultMatrix, SoftwareBackend};
use crate::error::{ConvError, Result};
use crate::kernel::conv::check_i8_accumulation;
use crate::kernel::im2col::{lower_filter, lower_input};
use crate::kernel::{conv_per_channel, conv_per_channel_i16, conv_per_channel_packed_int4};
use crate::kernel::{ConvGeometry, ConvParams, PerChannelQuant};
use crate::profile::{ProfileReport, Profiler};
use crate::quant::unpack_dense_int4_into_int8;
use crate::tensor::{RuntimeShape, Tensor, TensorMut};
use serde::Serialize;

/// A matrix-multiply backend plus the profiling context it reports into.
pub struct ConvEngine {
  backend: Box<dyn MatmulBackend>,
  profiler: Profiler,
}

impl ConvEngine {
  pub fn new(backend: Box<dyn MatmulBackend>) -> Self {
    Self {
      backend,
      profiler: Profiler::new(),
    }
  }

  pub fn software() -> Self {
    Self::new(Box::new(SoftwareBackend::new()))
  }

  pub fn from_config(config: &AppConfig) -> Result<Self> {
    let backend: Box<dyn MatmulBackend> = match config.backend_kind()? {
      BackendKind::Software => Box::new(SoftwareBackend::new()),
      BackendKind::Accelerator => accelerator_backend(config)?,
    };
    log::debug!("engine built with the {} backend", backend.name());
    Ok(Self::new(backend))
  }

  pub fn backend_name(&self) -> &'static str {
    self.backend.name()
  }

  pub fn profiler(&self) -> &Profiler {
    &self.profiler
  }

  pub fn profiler_mut(&mut self) -> &mut Profiler {
    &mut self.profiler
  }

  pub fn conv_i8(
    &mut self,
    params: &ConvParams,
    quant: &PerChannelQuant,
    input: &Tensor<i8>,
    filter: &Tensor<i8>,
    bias: Option<&[i32]>,
    output: &mut TensorMut<i8>,
  ) -> Result<()> {
    conv_per_channel(
      params,
      quant,
      input,
      filter,
      bias,
      output,
      &mut *self.backend,
      &mut self.profiler,
    )
  }

  /// The 16-bit path always multiplies in software, whatever the backend.
  pub fn conv_i16(
    &mut self,
    params: &ConvParams,
    quant: &PerChannelQuant,
    input: &Tensor<i16>,
    filter: &Tensor<i8>,
    bias: Option<&[i64]>,
    output: &mut TensorMut<i16>,
  ) -> Result<()> {
    conv_per_channel_i16(params, quant, input, filter, bias, output, &mut self.profiler)
  }

  /// Raw result matrices of the 8-bit path, one per batch element.
  pub fn result_matrices(
    &mut self,
    params: &ConvParams,
    input: &Tensor<i8>,
    filter: &Tensor<i8>,
    output_shape: &RuntimeShape,
  ) -> Result<Vec<ResultMatrix<i32>>> {
    let geom = ConvGeometry::new(params, input.shape(), filter.shape(), None, output_shape)?;
    check_i8_accumulation(&geom, params.input_offset, None)?;
    let lowered_filter = lower_filter(&geom, filter);
    let mut matrices = Vec::with_capacity(geom.batches);
    for batch in 0..geom.batches {
      let lowered_input = lower_input(&geom, input, batch);
      let backend = &mut self.backend;
      let matrix = self
        .profiler
        .measure(|cycles| backend.matmul(&lowered_filter, &lowered_input, params.input_offset, cycles))?;
      matrices.push(matrix);
    }
    Ok(matrices)
  }

  pub fn run(&mut self, workload: &Workload) -> Result<WorkloadOutput> {
    let quant = PerChannelQuant::new(&workload.output_multiplier, &workload.output_shift);
    let input_shape = &workload.input_shape;
    let filter_shape = &workload.filter_shape;
    let output_shape = &workload.output_shape;
    let flat = output_shape.flat_size();

    let (backend, output) = match workload.precision {
      Precision::Int8 => {
        let input = workload.input_i8()?;
        let filter = workload.filter_i8()?;
        let bias = workload.bias_i32()?;
        let mut output = vec![0i8; flat];
        self.conv_i8(
          &workload.params,
          &quant,
          &Tensor::new(input_shape, &input)?,
          &Tensor::new(filter_shape, &filter)?,
          bias.as_deref(),
          &mut TensorMut::new(output_shape, &mut output)?,
        )?;
        (self.backend_name(), output.into_iter().map(i32::from).collect())
      },
      Precision::Int4 => {
        let input = workload.input_i8()?;
        let packed = workload.filter_i8()?;
        let bias = workload.bias_i32()?;
        let mut output = vec![0i8; flat];
        conv_per_channel_packed_int4(
          &workload.params,
          &quant,
          &Tensor::new(input_shape, &input)?,
          filter_shape,
          &packed,
          bias.as_deref(),
          &mut TensorMut::new(output_shape, &mut output)?,
          &mut *self.backend,
          &mut self.profiler,
        )?;
        (self.backend_name(), output.into_iter().map(i32::from).collect())
      },
      Precision::Int16 => {
        let input = workload.input_i16()?;
        let filter = workload.filter_i8()?;
        let mut output = vec![0i16; flat];
        self.conv_i16(
          &workload.params,
          &quant,
          &Tensor::new(input_shape, &input)?,
          &Tensor::new(filter_shape, &filter)?,
          workload.bias_i64(),
          &mut TensorMut::new(output_shape, &mut output)?,
        )?;
        ("software", output.into_iter().map(i32::from).collect())
      },
    };

    Ok(WorkloadOutput {
      name: workload.name.clone(),
      backend: backend.to_string(),
      output_shape: output_shape.clone(),
      output,
      profile: self.profiler.report(),
    })
  }
}

fn accelerator_backend(config: &AppConfig) -> Result<Box<dyn MatmulBackend>> {
  match config.transport()? {
    Transport::Model => {
      let device = Cfu::with_max_kernel_volume(config.accelerator.max_kernel_volume);
      Ok(Box::new(AcceleratorBackend::new(device)))
    },
    Transport::Socket => {
      let client = CfuClient::connect(&config.accelerator.host, config.accelerator.port)?;
      Ok(Box::new(AcceleratorBackend::new(client)))
    },
  }
}

/// Outcome of running one workload through both backends.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
  pub name: String,
  pub accelerator: String,
  pub matrices_match: bool,
  pub outputs_match: bool,
  pub mismatch: Option<String>,
  pub software_profile: ProfileReport,
  pub accelerator_profile: ProfileReport,
}

impl VerifyReport {
  pub fn passed(&self) -> bool {
    self.matrices_match && self.outputs_match
  }
}

/// Checks the accelerator path against the software reference, first on the
/// raw result matrices and then on the requantized outputs.
pub fn verify_workload(workload: &Workload, accelerator: &mut ConvEngine) -> Result<VerifyReport> {
  let (input, filter) = match workload.precision {
    Precision::Int8 => (workload.input_i8()?, workload.filter_i8()?),
    Precision::Int4 => {
      let packed = workload.filter_i8()?;
      let filter = unpack_dense_int4_into_int8(&packed, workload.filter_shape.flat_size())?;
      (workload.input_i8()?, filter)
    },
    Precision::Int16 => {
      return Err(ConvError::Config(
        "16-bit workloads have no accelerator path to verify".to_string(),
      ))
    },
  };
  let input = Tensor::new(&workload.input_shape, &input)?;
  let filter = Tensor::new(&workload.filter_shape, &filter)?;

  let mut reference = ConvEngine::software();
  let expected = reference.result_matrices(&workload.params, &input, &filter, &workload.output_shape)?;
  let actual = accelerator.result_matrices(&workload.params, &input, &filter, &workload.output_shape)?;
  let mismatch = expected
    .iter()
    .zip(actual.iter())
    .enumerate()
    .find_map(|(batch, (e, a))| describe_mismatch(batch, e, a));

  let software_out = reference.run(workload)?;
  let accelerator_out = accelerator.run(workload)?;
  let outputs_match = software_out.output == accelerator_out.output;
  if mismatch.is_some() || !outputs_match {
    log::warn!("workload '{}' diverges between backends", workload.name);
  }

  Ok(VerifyReport {
    name: workload.name.clone(),
    accelerator: accelerator.backend_name().to_string(),
    matrices_match: mismatch.is_none(),
    outputs_match,
    mismatch,
    software_profile: reference.profiler().report(),
    accelerator_profile: accelerator.profiler().report(),
  })
}
