//! Credal Network Example: Imprecise Weather Prior
//!
//! A rain prior known only up to intervals drives whether the grass is wet.
//! Both credal solvers bound the posterior, and loopy belief propagation
//! answers the same question for one precise member of the set.
//!
//! Structure: Rain → WetGrass

use tensorlogic_credal::factor::convert::{
    halfspace_to_vertex, interval_to_halfspace, point_to_halfspace, point_to_vertex,
};
use tensorlogic_credal::{
    ApproxLp, BayesianFactor, BayesianNetwork, CredalVariableElimination, Domain, Evidence,
    GraphicalModel, IntervalFactor, LoopyBeliefPropagation, MessagePassingAlgorithm,
};

const RAIN: usize = 0;
const WET: usize = 1;

fn rain_to_wet<F>() -> tensorlogic_credal::Result<GraphicalModel<F>> {
    let mut model = GraphicalModel::new();
    model.add_variable(2)?;
    model.add_variable(2)?;
    model.add_link(RAIN, WET)?;
    Ok(model)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Credal Network: Imprecise Weather Prior ===\n");

    // P(Rain = 0) ∈ [0.2, 0.5]
    let rain = IntervalFactor::new(
        Domain::var(RAIN, 2),
        Domain::empty(),
        vec![0.2, 0.5],
        vec![0.5, 0.8],
    )?;

    // P(WetGrass | Rain), first variable fastest:
    // R=0: [0.3, 0.7], R=1: [0.9, 0.1]
    let wet = BayesianFactor::new(
        Domain::new(&[RAIN, WET], &[2, 2])?,
        vec![0.3, 0.9, 0.7, 0.1],
    )?;

    let mut vertex_model = rain_to_wet()?;
    let mut linear_model = rain_to_wet()?;
    vertex_model.set_factors(vec![
        halfspace_to_vertex(&interval_to_halfspace(&rain)?)?,
        point_to_vertex(&wet, WET)?,
    ])?;
    linear_model.set_factors(vec![
        interval_to_halfspace(&rain)?,
        point_to_halfspace(&wet, WET)?,
    ])?;

    let evidence = Evidence::from([(WET, 0)]);

    let exact = CredalVariableElimination::new().bounds(&vertex_model, &[RAIN], &evidence)?;
    let relaxed = ApproxLp::default().query(&linear_model, &[RAIN], &evidence)?;
    println!("P(Rain | WetGrass = 0):");
    for state in 0..2 {
        println!(
            "  state {}: vertex [{:.4}, {:.4}]   LP [{:.4}, {:.4}]",
            state,
            exact.lower_data()[state],
            exact.upper_data()[state],
            relaxed.lower_data()[state],
            relaxed.upper_data()[state]
        );
    }
    println!();

    // One precise member of the credal set
    let mut precise: BayesianNetwork = rain_to_wet()?;
    precise.set_factors(vec![
        BayesianFactor::new(Domain::var(RAIN, 2), vec![0.35, 0.65])?,
        wet,
    ])?;

    let lbp = LoopyBeliefPropagation::default();
    let (belief, stats) = lbp.run_with_stats(&precise, &evidence, RAIN)?;
    println!(
        "{} with P(Rain = 0) = 0.35: {:?} (last max delta {:.2e})",
        lbp.name(),
        belief.data(),
        stats.max_delta
    );

    Ok(())
}
