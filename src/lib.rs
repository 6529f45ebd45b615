// ============================================================================
// lib.rs — flockd
// GPU-resident boid flocking engine: double-buffered agent fields, velocity
// and position kernels, centroid reduction, two-controller predator steering
// and a 4 Hz viewer-relative analytics sampler.
// ============================================================================

pub mod backend;
pub mod config;
pub mod error;
pub mod headless;
pub mod interaction;
pub mod kernels;
pub mod metrics;
pub mod pipeline;
pub mod recorder;
pub mod simulation;
pub mod state_io;
pub mod store;
pub mod viewer;
pub mod world;

pub use backend::{ComputeBackend, CpuBackend, GpuBackend, RenderInputs};
pub use config::{BackendKind, FlockConfig, ForceTuning, SimulationParams};
pub use error::{FlockError, FlockResult};
pub use interaction::{GrabEvent, IndicatorChange};
pub use simulation::{AnalyticsSample, FlockSimulation, FrameOutput, FrameSink, FrameView};
pub use store::{AgentSample, Snapshot};
pub use viewer::{Pose, ViewerPose};
