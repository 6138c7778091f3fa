//! Validation for requests, planner output and configuration.

use serde::Serialize;

use crate::config::ServiceConfig;
use crate::types::{PlanningRequest, ShippingOption};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub level: ValidationLevel,
    pub code: &'static str,
    pub message: String,
}

impl ValidationIssue {
    pub fn error(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            level: ValidationLevel::Error,
            code,
            message: message.into(),
        }
    }

    pub fn warning(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            level: ValidationLevel::Warning,
            code,
            message: message.into(),
        }
    }
}

pub trait Validate {
    fn validate(&self) -> Vec<ValidationIssue>;
}

pub fn has_errors(issues: &[ValidationIssue]) -> bool {
    issues
        .iter()
        .any(|issue| issue.level == ValidationLevel::Error)
}

/// Joins error-level issues into `code: message; ...`.
pub fn render_errors(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .filter(|issue| issue.level == ValidationLevel::Error)
        .map(|issue| format!("{}: {}", issue.code, issue.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Shape checks only; whether the quote exists is decided by the launcher.
impl Validate for PlanningRequest {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        if self.quote_id.0.trim().is_empty() {
            issues.push(ValidationIssue::error(
                "request.quote_id.empty",
                "quoteId must not be empty",
            ));
        }
        if self.destination.trim().is_empty() {
            issues.push(ValidationIssue::error(
                "request.destination.empty",
                "destination must not be empty",
            ));
        }
        issues
    }
}

impl Validate for ShippingOption {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        if self.id.trim().is_empty() {
            issues.push(ValidationIssue::error("option.id.empty", "option id is empty"));
        }
        if self.eta_days == 0 {
            issues.push(ValidationIssue::error(
                "option.eta_days.zero",
                format!("option {} has etaDays 0", self.id),
            ));
        }
        if !is_non_negative(self.price_usd) {
            issues.push(ValidationIssue::error(
                "option.price_usd.negative",
                format!("option {} has invalid priceUsd {}", self.id, self.price_usd),
            ));
        }
        if let Some(co2) = self.co2_kg {
            if !is_non_negative(co2) {
                issues.push(ValidationIssue::error(
                    "option.co2_kg.negative",
                    format!("option {} has invalid co2kg {co2}", self.id),
                ));
            }
        }
        if !is_non_negative(self.weight_kg) || !is_non_negative(self.volume_m3) {
            issues.push(ValidationIssue::error(
                "option.dimensions.negative",
                format!("option {} has negative weight or volume", self.id),
            ));
        }
        if self.route.is_empty() {
            issues.push(ValidationIssue::error(
                "option.route.empty",
                format!("option {} has an empty route", self.id),
            ));
        }
        issues
    }
}

impl Validate for ServiceConfig {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.server.bind.trim().is_empty() {
            issues.push(ValidationIssue::error(
                "server.bind.empty",
                "server.bind must not be empty",
            ));
        }
        if self.planner.stage_timeout_secs == 0 {
            issues.push(ValidationIssue::error(
                "planner.stage_timeout.zero",
                "planner.stage_timeout_secs must be greater than zero",
            ));
        }
        if self.planner.sweep_interval_secs == 0 {
            issues.push(ValidationIssue::error(
                "planner.sweep_interval.zero",
                "planner.sweep_interval_secs must be greater than zero",
            ));
        }
        if self.planner.retention_secs == 0 {
            issues.push(ValidationIssue::warning(
                "planner.retention.zero",
                "sealed tasks are purged on the first sweep after their last subscriber leaves",
            ));
        }
        if self.client.idle_timeout_secs == 0 {
            issues.push(ValidationIssue::error(
                "client.idle_timeout.zero",
                "client.idle_timeout_secs must be greater than zero",
            ));
        }
        if self.quotes.path.as_os_str().is_empty() {
            issues.push(ValidationIssue::error(
                "quotes.path.empty",
                "quotes.path must not be empty",
            ));
        }

        if self.carriers.is_empty() {
            issues.push(ValidationIssue::error(
                "carriers.empty",
                "no carriers configured; every plan would produce zero options",
            ));
        }
        for carrier in &self.carriers {
            if carrier.carrier.trim().is_empty() || carrier.service.trim().is_empty() {
                issues.push(ValidationIssue::error(
                    "carriers.name.empty",
                    "carrier and service names must not be empty",
                ));
            }
            if carrier.eta_days == 0 {
                issues.push(ValidationIssue::error(
                    "carriers.eta_days.zero",
                    format!("carrier {} has eta_days 0", carrier.carrier),
                ));
            }
            let rates = [carrier.base_usd, carrier.per_kg_usd, carrier.per_m3_usd];
            if rates.iter().any(|rate| !is_non_negative(*rate)) {
                issues.push(ValidationIssue::error(
                    "carriers.rate.negative",
                    format!("carrier {} has a negative rate", carrier.carrier),
                ));
            }
            if carrier.co2_kg_per_kg.is_some_and(|co2| !is_non_negative(co2)) {
                issues.push(ValidationIssue::error(
                    "carriers.co2.negative",
                    format!("carrier {} has a negative co2 factor", carrier.carrier),
                ));
            }
        }

        issues
    }
}

fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_service_config;
    use crate::test_support::sample_option;
    use crate::types::Preference;

    fn codes(issues: &[ValidationIssue]) -> Vec<&'static str> {
        issues.iter().map(|issue| issue.code).collect()
    }

    #[test]
    fn request_requires_quote_and_destination() {
        let ok = PlanningRequest::new("q1", "Rotterdam, NL", Preference::Balanced);
        assert!(ok.validate().is_empty());

        let blank = PlanningRequest::new(" ", "   ", Preference::Balanced);
        let issues = blank.validate();
        assert_eq!(
            codes(&issues),
            vec!["request.quote_id.empty", "request.destination.empty"]
        );
        assert!(has_errors(&issues));
        assert!(render_errors(&issues).contains("destination must not be empty"));
    }

    #[test]
    fn option_bounds_are_enforced() {
        assert!(sample_option("o1").validate().is_empty());

        let mut bad = sample_option("o2");
        bad.eta_days = 0;
        bad.price_usd = -1.0;
        bad.co2_kg = Some(f64::NAN);
        bad.route.clear();
        let issues = bad.validate();
        assert_eq!(
            codes(&issues),
            vec![
                "option.eta_days.zero",
                "option.price_usd.negative",
                "option.co2_kg.negative",
                "option.route.empty",
            ]
        );
    }

    #[test]
    fn service_config_reports_zero_timeouts_and_missing_carriers() {
        let config = parse_service_config(
            r#"
[server]
bind = ""

[planner]
stage_timeout_secs = 0
retention_secs = 0

[quotes]
path = "quotes.toml"
"#,
        )
        .expect("parse config");

        let issues = config.validate();
        let found = codes(&issues);
        assert!(found.contains(&"server.bind.empty"));
        assert!(found.contains(&"planner.stage_timeout.zero"));
        assert!(found.contains(&"planner.retention.zero"));
        assert!(found.contains(&"carriers.empty"));
        assert!(issues
            .iter()
            .any(|issue| issue.code == "planner.retention.zero"
                && issue.level == ValidationLevel::Warning));
    }

    #[test]
    fn service_config_checks_carrier_rows() {
        let config = parse_service_config(
            r#"
[server]
bind = "127.0.0.1:9860"

[quotes]
path = "quotes.toml"

[[carriers]]
carrier = "Slowboat"
service = "Barge"
base_usd = -5.0
eta_days = 0
"#,
        )
        .expect("parse config");

        let found = codes(&config.validate());
        assert_eq!(found, vec!["carriers.eta_days.zero", "carriers.rate.negative"]);
    }
}
