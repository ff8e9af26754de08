//! Per-type message templates with named variables and language fallback.
//!
//! Variables are `{name}` placeholders. A render with a missing variable
//! fails with `VALIDATION` naming the variable. Unknown languages fall
//! back to English. All rendered output is HTML-stripped before delivery.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{AppError, Result};
use crate::types::AlertType;

/// Template text for a (type, language) pair.
fn template_for(alert_type: AlertType, language: &str) -> &'static str {
    match (alert_type, language) {
        (AlertType::Approval, "es") => {
            "Quema aprobada para {farm_name}: {burn_date} {window}. Prioridad {priority}."
        }
        (AlertType::Approval, _) => {
            "Burn approved for {farm_name}: {burn_date} {window}. Priority {priority}."
        }
        (AlertType::ScheduleChange, "es") => {
            "Horario de quema actualizado para {farm_name}: ahora {burn_date} {window}. Motivo: {reason}."
        }
        (AlertType::ScheduleChange, _) => {
            "Burn schedule updated for {farm_name}: now {burn_date} {window}. Reason: {reason}."
        }
        (AlertType::ConflictNotice, _) => {
            "Smoke overlap detected between your burn and a nearby burn on {burn_date}. \
             Combined PM2.5 may reach {combined_pm25} ug/m3 ({severity})."
        }
        (AlertType::WeatherUnsuitable, _) => {
            "Weather on {burn_date} is unsuitable for burning at {farm_name}: {factors}. \
             Your request has been deferred."
        }
        (AlertType::EmergencyHalt, "es") => {
            "EMERGENCIA: suspenda toda quema inmediatamente. {reason}. Confirme recepcion."
        }
        (AlertType::EmergencyHalt, _) => {
            "EMERGENCY: halt all burning immediately. {reason}. Acknowledge receipt."
        }
        (AlertType::DecisionRequired, _) => {
            "Action needed for your burn on {burn_date}: {question} Reply to acknowledge."
        }
    }
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").unwrap_or_else(|_| Regex::new("x").expect("static regex")))
}

fn html_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").unwrap_or_else(|_| Regex::new("x").expect("static regex")))
}

/// Strip HTML tags from message content before delivery.
pub fn strip_html(input: &str) -> String {
    html_tag_re().replace_all(input, "").to_string()
}

/// Render a template. Unknown languages fall back to English; a missing
/// variable is a `VALIDATION` error naming it.
pub fn render(
    alert_type: AlertType,
    language: &str,
    vars: &HashMap<String, String>,
) -> Result<String> {
    let template = template_for(alert_type, language);

    let mut missing: Vec<String> = Vec::new();
    let rendered = placeholder_re().replace_all(template, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match vars.get(name) {
            Some(value) => strip_html(value),
            None => {
                missing.push(name.to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        missing.sort();
        missing.dedup();
        return Err(AppError::validation(format!(
            "template variables missing: {}",
            missing.join(", ")
        ))
        .with_details(serde_json::json!({ "missing": missing })));
    }

    Ok(strip_html(&rendered))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn renders_with_all_variables() {
        let message = render(
            AlertType::Approval,
            "en",
            &vars(&[
                ("farm_name", "Johnson Ranch"),
                ("burn_date", "2026-08-04"),
                ("window", "09:00-13:00"),
                ("priority", "7"),
            ]),
        )
        .expect("render");
        assert!(message.contains("Johnson Ranch"));
        assert!(message.contains("09:00-13:00"));
        assert!(!message.contains('{'));
    }

    #[test]
    fn missing_variable_is_validation_error() {
        let err = render(
            AlertType::Approval,
            "en",
            &vars(&[("farm_name", "Johnson Ranch")]),
        )
        .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Validation);
        assert!(err.message.contains("burn_date"));
    }

    #[test]
    fn unknown_language_falls_back_to_english() {
        let en = render(
            AlertType::EmergencyHalt,
            "en",
            &vars(&[("reason", "Red flag warning")]),
        )
        .expect("render");
        let fr = render(
            AlertType::EmergencyHalt,
            "fr",
            &vars(&[("reason", "Red flag warning")]),
        )
        .expect("render");
        assert_eq!(en, fr);

        let es = render(
            AlertType::EmergencyHalt,
            "es",
            &vars(&[("reason", "Red flag")]),
        )
        .expect("render");
        assert_ne!(en, es);
    }

    #[test]
    fn html_is_stripped_from_variables_and_output() {
        let message = render(
            AlertType::DecisionRequired,
            "en",
            &vars(&[
                ("burn_date", "2026-08-04"),
                ("question", "<b>Confirm</b> your <script>x()</script>window?"),
            ]),
        )
        .expect("render");
        assert!(!message.contains('<'));
        assert!(message.contains("Confirm"));
    }
}
