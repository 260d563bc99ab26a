//! Propagation and measurement framework for neuron-assembly experiments.
//!
//! Regions (any type implementing [`region::Region`]) are wired into a
//! [`network::Network`], driven with sparse stimuli, and measured with the
//! functions in [`metrics`]. [`experiment::Orchestrator`] runs many isolated
//! copies of a subject in parallel and aggregates their time series.
//!
//! ```
//! use assemblies::prelude::*;
//!
//! let region = KCapRegion::new(KCapConfig::with_size(64, 128, 8).with_seed(1)).unwrap();
//! let spec = ExperimentSpec::new(
//!     Subject::Region(Box::new(region)),
//!     StimulusPolicy::PerExperiment { density: 0.1 },
//!     30,
//! );
//! let batch = Orchestrator::new(2).run(&spec, 4).unwrap();
//! let median = batch.median_convergence(0, 5);
//! assert_eq!(median.len(), 30);
//! ```

#[path = "core/activation.rs"]
pub mod activation;

#[path = "core/assembly.rs"]
pub mod assembly;

#[path = "core/config.rs"]
pub mod config;

#[path = "core/error.rs"]
pub mod error;

#[path = "core/experiment.rs"]
pub mod experiment;

#[path = "core/kcap.rs"]
pub mod kcap;

#[path = "core/metrics.rs"]
pub mod metrics;

#[path = "core/network.rs"]
pub mod network;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/region.rs"]
pub mod region;

pub mod observer;

pub mod prelude {
    pub use crate::activation::Activation;
    pub use crate::assembly::{probe, project, project_network, sparse_random, subset};
    pub use crate::config::SimulationConfig;
    pub use crate::error::{AssemblyError, ConfigError, ExperimentError, NetworkError, RegionError};
    pub use crate::experiment::{
        BatchResult, CancelToken, ExperimentSpec, Measurements, Orchestrator, StimulusPolicy,
        Subject,
    };
    pub use crate::kcap::{KCapConfig, KCapRegion};
    pub use crate::metrics::{convergence, overlap, relative_distance};
    pub use crate::network::{Adjacency, Network, NetworkBuilder, NodeRef};
    pub use crate::prng::Prng;
    pub use crate::region::{Region, RegionOutput, SynapseMatrix};
}
