//! Decision variables and feasible sets for the schedule optimizer.
//!
//! Each pending request is assigned a `(date, start hour)` slot from its
//! feasible set, or the special `Deferred` slot. Feasible sets come from
//! the request's date window (±flex days), legal burn hours, and per-slot
//! weather suitability.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::config::OptimizerParams;
use crate::types::{BurnRequest, Conflict, TimeWindow};

/// A concrete placement: the burn starts at `start_hour` on `date` and
/// keeps its requested duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub date: NaiveDate,
    pub start_hour: u32,
}

/// Assignment of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    Placed(Slot),
    Deferred,
}

impl Assignment {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Assignment::Deferred)
    }
}

/// Per-(date, hour) weather suitability for the optimization horizon.
/// Slots without an entry fall back to `default_score`; a zero score
/// makes the slot infeasible.
#[derive(Debug, Clone)]
pub struct WeatherTable {
    scores: HashMap<(NaiveDate, u32), f64>,
    default_score: f64,
}

impl WeatherTable {
    pub fn new(scores: HashMap<(NaiveDate, u32), f64>, default_score: f64) -> Self {
        Self {
            scores,
            default_score,
        }
    }

    /// A table with no data: every slot gets the default score.
    pub fn uniform(default_score: f64) -> Self {
        Self {
            scores: HashMap::new(),
            default_score,
        }
    }

    pub fn score(&self, slot: &Slot) -> f64 {
        *self
            .scores
            .get(&(slot.date, slot.start_hour))
            .unwrap_or(&self.default_score)
    }

    pub fn is_suitable(&self, slot: &Slot) -> bool {
        self.score(slot) > 0.0
    }
}

/// Everything an optimization run consumes. Requests are sorted by id on
/// construction so all iteration orders are deterministic.
#[derive(Debug, Clone)]
pub struct OptimizationInput {
    pub requests: Vec<BurnRequest>,
    pub conflicts: Vec<Conflict>,
    pub weather: WeatherTable,
    /// Predicted max PM2.5 per request id (from the latest predictions).
    pub predicted_pm25: HashMap<i64, f64>,
    /// First date of the planning horizon.
    pub horizon_start: NaiveDate,
    pub horizon_days: i64,
}

impl OptimizationInput {
    pub fn new(
        mut requests: Vec<BurnRequest>,
        conflicts: Vec<Conflict>,
        weather: WeatherTable,
        predicted_pm25: HashMap<i64, f64>,
        horizon_start: NaiveDate,
        horizon_days: i64,
    ) -> Self {
        requests.sort_by_key(|r| r.id);
        Self {
            requests,
            conflicts,
            weather,
            predicted_pm25,
            horizon_start,
            horizon_days: horizon_days.max(1),
        }
    }

    /// The window a request occupies if started at `slot`.
    pub fn window_at(&self, request: &BurnRequest, slot: &Slot) -> TimeWindow {
        let duration = request.window.duration_minutes().max(0) as u32;
        TimeWindow {
            start_minute: slot.start_hour * 60,
            end_minute: slot.start_hour * 60 + duration,
        }
    }

    /// Enumerate the feasible slots for a request, in deterministic
    /// (date, hour) order.
    pub fn feasible_slots(&self, request: &BurnRequest, params: &OptimizerParams) -> Vec<Slot> {
        let duration_hours =
            (request.window.duration_minutes() as f64 / 60.0).ceil().max(1.0) as u32;

        let horizon_end = self.horizon_start + chrono::Duration::days(self.horizon_days - 1);
        let earliest =
            (request.burn_date - chrono::Duration::days(params.date_flex_days)).max(self.horizon_start);
        let latest =
            (request.burn_date + chrono::Duration::days(params.date_flex_days)).min(horizon_end);

        let mut slots = Vec::new();
        let mut date = earliest;
        while date <= latest {
            let last_start = params.legal_hour_end.saturating_sub(duration_hours);
            for start_hour in params.legal_hour_start..=last_start {
                let slot = Slot { date, start_hour };
                if self.weather.is_suitable(&slot) {
                    slots.push(slot);
                }
            }
            date += chrono::Duration::days(1);
        }
        slots
    }
}

/// A full candidate solution: one assignment per request, index-aligned
/// with `OptimizationInput::requests`.
pub type Solution = Vec<Assignment>;

/// Count conflicts still active under a solution: both endpoints placed on
/// the same date with overlapping occupancy windows.
pub fn active_conflicts(input: &OptimizationInput, solution: &Solution) -> Vec<usize> {
    let index_of: HashMap<i64, usize> = input
        .requests
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id, i))
        .collect();

    let mut active = Vec::new();
    for (ci, conflict) in input.conflicts.iter().enumerate() {
        let (Some(&ia), Some(&ib)) = (
            index_of.get(&conflict.request_a),
            index_of.get(&conflict.request_b),
        ) else {
            continue;
        };
        let (Assignment::Placed(sa), Assignment::Placed(sb)) = (&solution[ia], &solution[ib])
        else {
            continue;
        };
        if sa.date != sb.date {
            continue;
        }
        let wa = input.window_at(&input.requests[ia], sa);
        let wb = input.window_at(&input.requests[ib], sb);
        if wa.overlaps(&wb) {
            active.push(ci);
        }
    }
    active
}

#[cfg(test)]
pub(crate) fn test_request(id: i64, date: NaiveDate, start_hour: u32, end_hour: u32) -> BurnRequest {
    use crate::types::{CropType, GeoPoint, RequestStatus};
    BurnRequest {
        id,
        field_id: id,
        farm_id: 1,
        burn_date: date,
        window: TimeWindow::from_hours(start_hour, end_hour),
        fuel_load_t_per_ha: 15.0,
        area_hectares: 50.0,
        crop_type: CropType::Rice,
        centroid: GeoPoint::new(38.58, -121.49),
        status: RequestStatus::Pending,
        priority_score: 7,
        terrain_vector: vec![0.0; crate::types::TERRAIN_DIMS],
        created_at: 0,
        updated_at: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 4).expect("valid date")
    }

    fn input(requests: Vec<BurnRequest>) -> OptimizationInput {
        OptimizationInput::new(
            requests,
            Vec::new(),
            WeatherTable::uniform(0.8),
            HashMap::new(),
            date() - chrono::Duration::days(1),
            7,
        )
    }

    #[test]
    fn feasible_slots_respect_legal_hours_and_duration() {
        let params = OptimizerParams::default();
        let input = input(vec![test_request(1, date(), 9, 13)]);
        let slots = input.feasible_slots(&input.requests[0], &params);
        assert!(!slots.is_empty());
        for slot in &slots {
            assert!(slot.start_hour >= params.legal_hour_start);
            // 4h burn must finish by legal_hour_end
            assert!(slot.start_hour + 4 <= params.legal_hour_end);
        }
        // ±3 days flex, clamped to horizon start
        let dates: std::collections::HashSet<NaiveDate> =
            slots.iter().map(|s| s.date).collect();
        assert!(dates.len() >= 4);
    }

    #[test]
    fn unsuitable_weather_removes_slots() {
        let params = OptimizerParams::default();
        let requests = vec![test_request(1, date(), 9, 13)];
        let zeroed = OptimizationInput::new(
            requests,
            Vec::new(),
            WeatherTable::uniform(0.0),
            HashMap::new(),
            date(),
            7,
        );
        assert!(zeroed
            .feasible_slots(&zeroed.requests[0], &params)
            .is_empty());
    }

    #[test]
    fn active_conflict_requires_same_date_overlap() {
        let r1 = test_request(1, date(), 9, 13);
        let r2 = test_request(2, date(), 9, 13);
        let conflict = Conflict {
            id: 1,
            request_a: 1,
            request_b: 2,
            date: date(),
            overlap: crate::types::PolygonRing::default(),
            overlap_area_km2: 0.5,
            max_combined_pm25: 80.0,
            severity: crate::types::ConflictSeverity::High,
            resolution_status: crate::types::ResolutionStatus::Pending,
        };
        let mut input = input(vec![r1, r2]);
        input.conflicts = vec![conflict];

        let both_same = vec![
            Assignment::Placed(Slot { date: date(), start_hour: 9 }),
            Assignment::Placed(Slot { date: date(), start_hour: 9 }),
        ];
        assert_eq!(active_conflicts(&input, &both_same).len(), 1);

        let separated_hours = vec![
            Assignment::Placed(Slot { date: date(), start_hour: 6 }),
            Assignment::Placed(Slot { date: date(), start_hour: 11 }),
        ];
        assert!(active_conflicts(&input, &separated_hours).is_empty());

        let separated_days = vec![
            Assignment::Placed(Slot { date: date(), start_hour: 9 }),
            Assignment::Placed(Slot {
                date: date() + chrono::Duration::days(1),
                start_hour: 9,
            }),
        ];
        assert!(active_conflicts(&input, &separated_days).is_empty());

        let one_deferred = vec![
            Assignment::Placed(Slot { date: date(), start_hour: 9 }),
            Assignment::Deferred,
        ];
        assert!(active_conflicts(&input, &one_deferred).is_empty());
    }
}
