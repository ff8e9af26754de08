//! The optimizer's cost function. Lower is better.
//!
//! Five terms, weighted from `params.weights`:
//! conflict severity over still-active conflicts, quadratic PM2.5
//! over-exposure, priority-weighted delay, weather quality shortfall,
//! and a flat penalty per deferred request.

use crate::config::CostWeights;

use super::schedule::{active_conflicts, Assignment, OptimizationInput, Solution};

/// PM2.5 over-exposure threshold (µg/m³), the EPA 24-hour standard.
const PM25_SAFE: f64 = 35.0;

/// Total cost of a candidate solution.
pub fn total_cost(input: &OptimizationInput, solution: &Solution, weights: &CostWeights) -> f64 {
    let mut cost = 0.0;

    // Conflict term: severity weight of every still-active conflict.
    for ci in active_conflicts(input, solution) {
        cost += weights.conf * input.conflicts[ci].severity.cost_weight();
    }

    for (i, request) in input.requests.iter().enumerate() {
        match &solution[i] {
            Assignment::Placed(slot) => {
                // Over-exposure penalty, quadratic above the safe line.
                if let Some(pm25) = input.predicted_pm25.get(&request.id) {
                    let over = (pm25 - PM25_SAFE).max(0.0);
                    cost += weights.pm25 * over * over;
                }

                // Priority-weighted delay from the requested slot.
                let day_delay =
                    (slot.date - request.burn_date).num_days().unsigned_abs() as f64 * 24.0;
                let hour_delay = (f64::from(slot.start_hour)
                    - f64::from(request.window.start_minute) / 60.0)
                    .abs();
                cost += weights.prio * f64::from(request.priority_score) * (day_delay + hour_delay);

                // Weather quality shortfall.
                cost += weights.weather * (1.0 - input.weather.score(slot)).max(0.0);
            }
            Assignment::Deferred => {
                cost += weights.defer;
            }
        }
    }

    cost
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::schedule::{test_request, Slot, WeatherTable};
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 4).expect("valid date")
    }

    fn basic_input() -> OptimizationInput {
        OptimizationInput::new(
            vec![test_request(1, date(), 9, 13)],
            Vec::new(),
            WeatherTable::uniform(0.8),
            HashMap::new(),
            date(),
            7,
        )
    }

    #[test]
    fn requested_slot_is_cheapest_placement() {
        let input = basic_input();
        let weights = CostWeights::default();

        let on_time = total_cost(
            &input,
            &vec![Assignment::Placed(Slot { date: date(), start_hour: 9 })],
            &weights,
        );
        let shifted = total_cost(
            &input,
            &vec![Assignment::Placed(Slot { date: date(), start_hour: 14 })],
            &weights,
        );
        let next_day = total_cost(
            &input,
            &vec![Assignment::Placed(Slot {
                date: date() + chrono::Duration::days(1),
                start_hour: 9,
            })],
            &weights,
        );
        assert!(on_time < shifted);
        assert!(shifted < next_day);
    }

    #[test]
    fn deferral_costs_more_than_modest_delay() {
        let input = basic_input();
        let weights = CostWeights::default();
        let deferred = total_cost(&input, &vec![Assignment::Deferred], &weights);
        let delayed = total_cost(
            &input,
            &vec![Assignment::Placed(Slot { date: date(), start_hour: 11 })],
            &weights,
        );
        assert!(deferred > delayed);
    }

    #[test]
    fn overexposure_penalty_is_quadratic() {
        let weights = CostWeights::default();
        let mut input = basic_input();
        let slot = vec![Assignment::Placed(Slot { date: date(), start_hour: 9 })];

        input.predicted_pm25.insert(1, 35.0);
        let at_line = total_cost(&input, &slot, &weights);

        input.predicted_pm25.insert(1, 45.0);
        let ten_over = total_cost(&input, &slot, &weights);

        input.predicted_pm25.insert(1, 55.0);
        let twenty_over = total_cost(&input, &slot, &weights);

        let first_step = ten_over - at_line;
        let second_step = twenty_over - ten_over;
        assert!(first_step > 0.0);
        assert!(second_step > first_step);
    }

    #[test]
    fn worse_weather_costs_more() {
        let weights = CostWeights::default();
        let request = test_request(1, date(), 9, 13);

        let good = OptimizationInput::new(
            vec![request.clone()],
            Vec::new(),
            WeatherTable::uniform(0.95),
            HashMap::new(),
            date(),
            7,
        );
        let poor = OptimizationInput::new(
            vec![request],
            Vec::new(),
            WeatherTable::uniform(0.3),
            HashMap::new(),
            date(),
            7,
        );
        let slot = vec![Assignment::Placed(Slot { date: date(), start_hour: 9 })];
        assert!(total_cost(&poor, &slot, &weights) > total_cost(&good, &slot, &weights));
    }
}
