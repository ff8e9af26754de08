//! Stage 4: the schedule optimizer.
//!
//! Wraps the annealing search with the outcome contract: every input
//! request appears exactly once with status scheduled, deferred, or
//! rejected (rejected iff no slot exists anywhere in the horizon even
//! ignoring weather), plus reasons and the improvements report.

pub mod annealing;
pub mod cost;
pub mod schedule;

pub use schedule::{Assignment, OptimizationInput, Slot, WeatherTable};

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::OptimizerParams;
use crate::error::Result;
use crate::types::{
    BurnRequest, OptimizationImprovements, ScheduleEntry, ScheduleStatus, TimeWindow,
};

/// One request's placement in the run's output.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AssignmentOutcome {
    pub request_id: i64,
    pub status: ScheduleStatus,
    pub assigned_date: Option<NaiveDate>,
    pub assigned_window: Option<TimeWindow>,
    pub reason: Option<String>,
}

/// Full result of one optimizer run.
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    pub run_id: uuid::Uuid,
    pub assignments: Vec<AssignmentOutcome>,
    pub improvements: OptimizationImprovements,
    /// True when at least one request could be placed; when every request
    /// is deferred or rejected the caller surfaces `FEASIBILITY`.
    pub any_scheduled: bool,
}

impl OptimizationOutcome {
    /// Convert to persistable schedule entries.
    pub fn to_entries(&self, now_micros: i64) -> Vec<ScheduleEntry> {
        self.assignments
            .iter()
            .map(|a| ScheduleEntry {
                id: 0,
                burn_request_id: a.request_id,
                run_id: self.run_id,
                status: a.status,
                assigned_date: a.assigned_date,
                assigned_window: a.assigned_window,
                cost: self.improvements.final_cost,
                reason: a.reason.clone(),
                created_at: now_micros,
            })
            .collect()
    }
}

/// See module docs.
pub struct Optimizer {
    params: OptimizerParams,
}

impl Optimizer {
    pub fn new(params: OptimizerParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &OptimizerParams {
        &self.params
    }

    /// Run the search. `seed_override` pins determinism for callers that
    /// supply their own seed (the API and E2E tests).
    pub fn optimize(
        &self,
        input: &OptimizationInput,
        seed_override: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<OptimizationOutcome> {
        let mut params = self.params.clone();
        if let Some(seed) = seed_override {
            params.seed = seed;
        }

        let outcome = annealing::anneal(input, &params, cancel)?;

        let assignments = input
            .requests
            .iter()
            .enumerate()
            .map(|(i, request)| self.classify(input, request, outcome.solution.get(i), &params))
            .collect::<Vec<_>>();

        let any_scheduled = assignments
            .iter()
            .any(|a| a.status == ScheduleStatus::Scheduled);

        info!(
            requests = input.requests.len(),
            scheduled = assignments
                .iter()
                .filter(|a| a.status == ScheduleStatus::Scheduled)
                .count(),
            conflicts_resolved = outcome.improvements.conflicts_resolved,
            final_cost = outcome.improvements.final_cost,
            iterations = outcome.improvements.iterations,
            "optimizer run complete"
        );

        Ok(OptimizationOutcome {
            run_id: uuid::Uuid::new_v4(),
            assignments,
            improvements: outcome.improvements,
            any_scheduled,
        })
    }

    fn classify(
        &self,
        input: &OptimizationInput,
        request: &BurnRequest,
        assignment: Option<&Assignment>,
        params: &OptimizerParams,
    ) -> AssignmentOutcome {
        match assignment {
            Some(Assignment::Placed(slot)) => AssignmentOutcome {
                request_id: request.id,
                status: ScheduleStatus::Scheduled,
                assigned_date: Some(slot.date),
                assigned_window: Some(input.window_at(request, slot)),
                reason: None,
            },
            _ => {
                // Distinguish "no slot exists at all" (rejected) from
                // "slots exist but weather or conflicts pushed it out"
                // (deferred).
                let weather_blind = self.slots_ignoring_weather(input, request, params);
                if weather_blind == 0 {
                    AssignmentOutcome {
                        request_id: request.id,
                        status: ScheduleStatus::Rejected,
                        assigned_date: None,
                        assigned_window: None,
                        reason: Some("no_feasible_slot".to_string()),
                    }
                } else {
                    let with_weather = input.feasible_slots(request, params).len();
                    let reason = if with_weather == 0 {
                        "weather_unsuitable"
                    } else {
                        "conflict_avoidance"
                    };
                    AssignmentOutcome {
                        request_id: request.id,
                        status: ScheduleStatus::Deferred,
                        assigned_date: None,
                        assigned_window: None,
                        reason: Some(reason.to_string()),
                    }
                }
            }
        }
    }

    /// Slot count from dates and legal hours alone, ignoring weather.
    fn slots_ignoring_weather(
        &self,
        input: &OptimizationInput,
        request: &BurnRequest,
        params: &OptimizerParams,
    ) -> usize {
        let duration_hours =
            (request.window.duration_minutes() as f64 / 60.0).ceil().max(1.0) as u32;
        let horizon_end = input.horizon_start + chrono::Duration::days(input.horizon_days - 1);
        let earliest = (request.burn_date - chrono::Duration::days(params.date_flex_days))
            .max(input.horizon_start);
        let latest =
            (request.burn_date + chrono::Duration::days(params.date_flex_days)).min(horizon_end);
        if latest < earliest {
            return 0;
        }
        let days = (latest - earliest).num_days() + 1;
        let hours_per_day = params
            .legal_hour_end
            .saturating_sub(duration_hours)
            .saturating_sub(params.legal_hour_start)
            .saturating_add(1);
        days as usize * hours_per_day as usize
    }
}
