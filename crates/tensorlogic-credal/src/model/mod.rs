//! Directed graphical models: plain, causal and credal.

mod causal;
mod dag;
mod network;

pub use causal::{CredalNetwork, StructuralCausalModel};
pub use dag::DirectedAcyclicGraph;
pub use network::GraphicalModel;

use crate::factor::BayesianFactor;

/// A graphical model with precise conditional probability tables.
pub type BayesianNetwork = GraphicalModel<BayesianFactor>;
