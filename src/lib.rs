pub mod arch;
pub mod backend;
pub mod error;
pub mod kernel;
pub mod profile;
pub mod quant;
pub mod simulator;
pub mod tensor;

pub use error::{ConvError, Result};
pub use simulator::{ConvEngine, Workload};
