//! Causal Inference Example: Confounded Treatment
//!
//! This example builds a structural causal model in which a confounder drives
//! both a treatment and an outcome, and contrasts observational queries with
//! interventional ones.
//!
//! Structure: Treatment ← Confounder → Outcome, Treatment → Outcome

use std::collections::BTreeMap;
use std::time::Duration;
use tensorlogic_credal::{
    invoke_with_timeout, CausalInference, CausalVE, CredalCausalApproxLp, DirectedAcyclicGraph,
    Evidence, StructuralCausalModel,
};

const TREATMENT: usize = 0;
const OUTCOME: usize = 1;
const CONFOUNDER: usize = 2;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Structural Causal Model: Confounded Treatment ===\n");

    let mut dag = DirectedAcyclicGraph::new();
    for v in [TREATMENT, OUTCOME, CONFOUNDER] {
        dag.add_variable(v);
    }
    dag.add_link(CONFOUNDER, TREATMENT)?;
    dag.add_link(CONFOUNDER, OUTCOME)?;
    dag.add_link(TREATMENT, OUTCOME)?;

    let cards = BTreeMap::from([(TREATMENT, 2), (OUTCOME, 2), (CONFOUNDER, 2)]);
    let mut scm = StructuralCausalModel::markovian(&dag, &cards)?;
    scm.fill_with_random_factors(1234, 3)?;

    println!("Endogenous variables: {:?}", scm.endogenous());
    println!("Exogenous variables:  {:?}", scm.exogenous());
    for x in scm.endogenous() {
        let u = scm.exogenous_parents(x);
        let card = scm.model().cardinality(u[0])?;
        println!("  U{} has {} states (one per response function)", x, card);
    }
    println!();

    // Precise answers
    let precise = CausalVE::new(scm.clone());
    let none = Evidence::new();
    let seen = Evidence::from([(TREATMENT, 1)]);

    let observational = precise.query(&[OUTCOME], &seen, &none)?;
    let interventional = precise.query(&[OUTCOME], &none, &seen)?;
    println!("P(Outcome | Treatment = 1)     = {:?}", observational.data());
    println!("P(Outcome | do(Treatment = 1)) = {:?}", interventional.data());
    println!();

    // Without knowing the exogenous priors, only bounds are identified
    println!("Credal bounds from the observational conditionals (LP relaxation):");
    let credal = CredalCausalApproxLp::new(&scm)?;
    let bounds = invoke_with_timeout(Duration::from_secs(30), move || {
        credal.query(&[OUTCOME], &Evidence::new(), &Evidence::from([(TREATMENT, 1)]))
    })?;
    for state in 0..2 {
        println!(
            "  P(Outcome = {} | do(Treatment = 1)) ∈ [{:.4}, {:.4}]",
            state,
            bounds.lower_data()[state],
            bounds.upper_data()[state]
        );
    }

    Ok(())
}
