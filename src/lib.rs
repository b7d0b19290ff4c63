pub mod circuit;
pub mod cli;
pub mod companion;
pub mod error;
pub mod history;
pub mod mna;
pub mod output;
pub mod parser;
pub mod simulator;
pub mod solver;
pub mod steady_state;

// Re-export commonly used types
pub use circuit::{Component, ComponentType, ControlledKind, DeviceKind, Netlist, Waveform};
pub use companion::CompanionConfig;
pub use simulator::{ProgressSink, RunState, Simulator, SimulatorConfig, TransientResult, TransientRun};
pub use steady_state::{SteadyStateRow, SteadyStateSolution, SteadyStateSolver};

// Error types
pub use error::{ConfigurationError, Result, SimError};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
