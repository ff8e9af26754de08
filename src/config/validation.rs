//! Config validation: physical range checks run once at startup.
//!
//! Warnings never abort startup; hard errors (weights that cannot produce
//! a sane schedule) do. The caller decides how to surface each list.

use super::AppConfig;

/// A non-fatal config warning (suspicious value, degraded behavior).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a loaded config. Returns warnings; `Err` on values that would
/// make the pipeline produce nonsense.
pub fn validate(config: &AppConfig) -> Result<Vec<ValidationWarning>, String> {
    let mut warnings = Vec::new();

    // Priority weights must form a convex combination.
    let weight_sum = config.priority.sum();
    if (weight_sum - 1.0).abs() > 0.01 {
        return Err(format!(
            "priority weights must sum to 1.0 (got {weight_sum:.3})"
        ));
    }

    // Annealing schedule sanity.
    let opt = &config.optimizer;
    if !(0.90..=0.99).contains(&opt.alpha) {
        return Err(format!(
            "optimizer.alpha must be within [0.90, 0.99] (got {})",
            opt.alpha
        ));
    }
    if opt.t0 <= opt.t_min {
        return Err(format!(
            "optimizer.t0 ({}) must exceed optimizer.t_min ({})",
            opt.t0, opt.t_min
        ));
    }
    if opt.legal_hour_start >= opt.legal_hour_end || opt.legal_hour_end > 24 {
        return Err(format!(
            "optimizer legal hours [{}, {}) are not a valid daytime range",
            opt.legal_hour_start, opt.legal_hour_end
        ));
    }
    if opt.date_flex_days < 0 || opt.date_flex_days > 14 {
        warnings.push(ValidationWarning {
            field: "optimizer.date_flex_days".to_string(),
            message: format!("{} days is outside the typical 0-14 range", opt.date_flex_days),
        });
    }

    // Predictor geometry.
    let pred = &config.predictor;
    if pred.r_max_km <= 0.0 || pred.grid_step_km <= 0.0 {
        return Err("predictor radii and grid step must be positive".to_string());
    }
    if pred.grid_step_km > pred.r_max_km {
        return Err(format!(
            "predictor.grid_step_km ({}) exceeds r_max_km ({})",
            pred.grid_step_km, pred.r_max_km
        ));
    }
    if pred.grid_step_km < 0.05 {
        warnings.push(ValidationWarning {
            field: "predictor.grid_step_km".to_string(),
            message: format!(
                "{} km grid step makes conflict sampling very expensive",
                pred.grid_step_km
            ),
        });
    }

    // Alert retry policy.
    let retry = &config.alerts.retry;
    if retry.base_secs == 0 || retry.cap_secs < retry.base_secs {
        return Err("alert retry backoff must have 0 < base <= cap".to_string());
    }
    if retry.max_attempts == 0 {
        return Err("alert retry max_attempts must be at least 1".to_string());
    }

    if config.alerts.sms_gateway_url.is_none() {
        warnings.push(ValidationWarning {
            field: "alerts.sms_gateway_url".to_string(),
            message: "not configured — SMS/voice deliveries will be logged only".to_string(),
        });
    }
    if config.embedding.api_url.is_none() {
        warnings.push(ValidationWarning {
            field: "embedding.api_url".to_string(),
            message: "not configured — semantic terrain dims will be zero".to_string(),
        });
    }

    Ok(warnings)
}
