pub mod config;
pub mod engine;
pub mod server;
pub mod utils;
pub mod workload;

// provide to cfuconv
pub use engine::{verify_workload, ConvEngine, VerifyReport};
pub use utils::log;
pub use workload::{Precision, Workload, WorkloadOutput};
