//! Simulated-annealing search over burn schedules.
//!
//! Geometric cooling with a block of neighbor moves per temperature step.
//! Four move kinds chosen uniformly: time-shift, pairwise swap, defer,
//! reinstate. Strictly-improving moves are always accepted; worsening
//! moves with probability `exp(-ΔC/T)`. A caller-supplied seed makes the
//! whole search deterministic; all candidate orderings are by ascending
//! request id.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;

use crate::config::defaults::CANCEL_CHECK_EVERY;
use crate::config::OptimizerParams;
use crate::error::{AppError, Result};
use crate::types::OptimizationImprovements;

use super::cost::total_cost;
use super::schedule::{active_conflicts, Assignment, OptimizationInput, Slot, Solution};

/// Search result: the best solution seen and run metrics.
#[derive(Debug, Clone)]
pub struct AnnealingOutcome {
    pub solution: Solution,
    pub improvements: OptimizationImprovements,
}

/// Solution with every request at its requested slot, feasible or not.
/// The "before coordination" baseline that `conflicts_resolved` measures
/// against.
fn as_requested(input: &OptimizationInput) -> Solution {
    input
        .requests
        .iter()
        .map(|r| {
            Assignment::Placed(Slot {
                date: r.burn_date,
                start_hour: r.window.start_minute / 60,
            })
        })
        .collect()
}

/// Greedy initial solution: descending priority (id ascending on ties),
/// each request takes its best-weather feasible slot that does not
/// activate a known conflict with already-placed requests.
pub fn greedy_initial(input: &OptimizationInput, feasible: &[Vec<Slot>]) -> Solution {
    let mut order: Vec<usize> = (0..input.requests.len()).collect();
    order.sort_by_key(|&i| {
        (
            std::cmp::Reverse(input.requests[i].priority_score),
            input.requests[i].id,
        )
    });

    let mut solution: Solution = vec![Assignment::Deferred; input.requests.len()];

    for &i in &order {
        if feasible[i].is_empty() {
            continue;
        }

        // Rank candidate slots by weather quality, then chronology.
        let mut candidates: Vec<&Slot> = feasible[i].iter().collect();
        candidates.sort_by(|a, b| {
            input
                .weather
                .score(b)
                .partial_cmp(&input.weather.score(a))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.date.cmp(&b.date))
                .then(a.start_hour.cmp(&b.start_hour))
        });

        let mut chosen = None;
        for slot in &candidates {
            solution[i] = Assignment::Placed(**slot);
            if active_conflicts(input, &solution).is_empty() {
                chosen = Some(**slot);
                break;
            }
        }
        match chosen {
            Some(slot) => solution[i] = Assignment::Placed(slot),
            None => {
                // Every slot collides; take the best-weather one anyway and
                // let the annealer trade it off.
                solution[i] = Assignment::Placed(*candidates[0]);
            }
        }
    }

    solution
}

/// Run the annealing search.
pub fn anneal(
    input: &OptimizationInput,
    params: &OptimizerParams,
    cancel: &CancellationToken,
) -> Result<AnnealingOutcome> {
    let n = input.requests.len();
    if n == 0 {
        return Ok(AnnealingOutcome {
            solution: Vec::new(),
            improvements: OptimizationImprovements::default(),
        });
    }

    let feasible: Vec<Vec<Slot>> = input
        .requests
        .iter()
        .map(|r| input.feasible_slots(r, params))
        .collect();

    let mut solution = greedy_initial(input, &feasible);
    // The resolved-conflict count measures against everyone burning when
    // they asked to, not against the already-deconflicted greedy start.
    let initial_conflicts = active_conflicts(input, &as_requested(input)).len();
    let initial_cost = total_cost(input, &solution, &params.weights);

    let mut current_cost = initial_cost;
    let mut best = solution.clone();
    let mut best_cost = current_cost;

    let mut rng = StdRng::seed_from_u64(params.seed);
    let max_iterations = params.effective_max_iterations(n);
    let mut iterations: u64 = 0;
    let mut temperature = params.t0;

    'cooling: while temperature >= params.t_min && iterations < max_iterations {
        for _ in 0..n.max(4) {
            iterations += 1;
            if iterations % CANCEL_CHECK_EVERY == 0 && cancel.is_cancelled() {
                return Err(AppError::cancelled());
            }
            if iterations > max_iterations {
                break 'cooling;
            }

            let Some(undo) = propose_move(&mut rng, input, &feasible, &mut solution) else {
                continue;
            };

            let new_cost = total_cost(input, &solution, &params.weights);
            let delta = new_cost - current_cost;
            let accept =
                delta < 0.0 || rng.gen::<f64>() < (-delta / temperature.max(1e-9)).exp();

            if accept {
                current_cost = new_cost;
                if current_cost < best_cost {
                    best_cost = current_cost;
                    best = solution.clone();
                }
            } else {
                undo.apply(&mut solution);
            }
        }
        temperature *= params.alpha;
    }

    let final_conflicts = active_conflicts(input, &best).len();
    Ok(AnnealingOutcome {
        solution: best,
        improvements: OptimizationImprovements {
            conflicts_resolved: initial_conflicts.saturating_sub(final_conflicts),
            initial_cost,
            final_cost: best_cost,
            iterations,
            converged: temperature < params.t_min,
        },
    })
}

/// Reversal record for a rejected move.
enum Undo {
    One(usize, Assignment),
    Two(usize, Assignment, usize, Assignment),
}

impl Undo {
    fn apply(self, solution: &mut Solution) {
        match self {
            Undo::One(i, a) => solution[i] = a,
            Undo::Two(i, a, j, b) => {
                solution[i] = a;
                solution[j] = b;
            }
        }
    }
}

/// Propose one neighbor move in place. Returns the undo record, or None
/// when the sampled move is a no-op.
fn propose_move(
    rng: &mut StdRng,
    input: &OptimizationInput,
    feasible: &[Vec<Slot>],
    solution: &mut Solution,
) -> Option<Undo> {
    let n = solution.len();
    match rng.gen_range(0..4u8) {
        // (a) time-shift one placed request within its feasible set
        0 => {
            let placed: Vec<usize> = (0..n)
                .filter(|&i| !solution[i].is_deferred() && feasible[i].len() > 1)
                .collect();
            let &i = pick(rng, &placed)?;
            let slot = feasible[i][rng.gen_range(0..feasible[i].len())];
            let old = solution[i];
            if old == Assignment::Placed(slot) {
                return None;
            }
            solution[i] = Assignment::Placed(slot);
            Some(Undo::One(i, old))
        }
        // (b) swap slots between two placed requests
        1 => {
            let placed: Vec<usize> = (0..n).filter(|&i| !solution[i].is_deferred()).collect();
            if placed.len() < 2 {
                return None;
            }
            let &i = pick(rng, &placed)?;
            let &j = pick(rng, &placed)?;
            if i == j {
                return None;
            }
            let (Assignment::Placed(si), Assignment::Placed(sj)) = (solution[i], solution[j])
            else {
                return None;
            };
            // Each must be able to occupy the other's slot.
            if !feasible[i].contains(&sj) || !feasible[j].contains(&si) {
                return None;
            }
            solution[i] = Assignment::Placed(sj);
            solution[j] = Assignment::Placed(si);
            Some(Undo::Two(i, Assignment::Placed(si), j, Assignment::Placed(sj)))
        }
        // (c) defer one placed request
        2 => {
            let placed: Vec<usize> = (0..n).filter(|&i| !solution[i].is_deferred()).collect();
            let &i = pick(rng, &placed)?;
            let old = solution[i];
            solution[i] = Assignment::Deferred;
            Some(Undo::One(i, old))
        }
        // (d) reinstate a deferred request
        _ => {
            let deferred: Vec<usize> = (0..n)
                .filter(|&i| solution[i].is_deferred() && !feasible[i].is_empty())
                .collect();
            let &i = pick(rng, &deferred)?;
            let slot = feasible[i][rng.gen_range(0..feasible[i].len())];
            solution[i] = Assignment::Placed(slot);
            Some(Undo::One(i, Assignment::Deferred))
        }
    }
}

/// Deterministic random pick from an index list (already id-ordered).
fn pick<'a>(rng: &mut StdRng, candidates: &'a [usize]) -> Option<&'a usize> {
    if candidates.is_empty() {
        return None;
    }
    Some(&candidates[rng.gen_range(0..candidates.len())])
}
