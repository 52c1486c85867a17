//! Core ring-coordination primitives shared by the node binary and its
//! tests: topology state, the Chang–Roberts election engine, the
//! shared-variable service and the peer TCP transport they all use.

pub mod delay;
pub mod election;
pub mod error;
pub mod message;
pub mod node_info;
pub mod registry;
pub mod ring;
pub mod state;
pub mod transport;
pub mod variable;

pub use election::ElectionEngine;
pub use error::{CoreError, Result};
pub use message::{PeerRequest, PeerResponse};
pub use node_info::NodeInfo;
pub use registry::Registry;
pub use ring::{JoinOutcome, RingManager, UpdateNeighborsRequest};
pub use state::{HealthSnapshot, NodeHandle, NodeState};
pub use transport::PeerClient;
pub use variable::{VariableError, VariableService};
