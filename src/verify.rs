//! Station Parameter Verification
//!
//! Compares what a station actually reports against the desired label
//! table, so an operator can see before ingesting which labels will be
//! filled, which come from the alternate resolution, and which will stay
//! empty. Purely diagnostic: resolution does not depend on this report.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::model::ParameterLabel;
use crate::parameters::{ResolvedParameters, resolve_against};

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterReport {
    pub station_id: String,
    pub status: VerificationStatus,
    /// Every distinct parameter id seen for the station, sorted.
    pub parameters_observed: Vec<String>,
    /// `label (id)` for desired labels whose preferred id is observed.
    pub have: Vec<String>,
    /// `label (preferred → fallback)` for labels served by the alternate resolution.
    pub fallback: Vec<String>,
    /// `label (id)` for desired labels that will stay empty.
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    Success,
    PartialSuccess,
    Failed,
}

// ============================================================================
// Report construction
// ============================================================================

pub fn verify_station_parameters(
    station_id: &str,
    desired: &[(ParameterLabel, String)],
    observed: &BTreeSet<String>,
) -> ParameterReport {
    let resolved: ResolvedParameters = resolve_against(desired, observed);

    let mut have = Vec::new();
    let mut fallback = Vec::new();
    let mut missing = Vec::new();

    for (label, preferred) in desired {
        match resolved.get(*label) {
            Some(entry) if entry.is_fallback() => {
                fallback.push(format!("{} ({} → {})", label, preferred, entry.parameter_id));
            }
            Some(_) => have.push(format!("{} ({})", label, preferred)),
            None => missing.push(format!("{} ({})", label, preferred)),
        }
    }

    let status = if resolved.is_empty() {
        VerificationStatus::Failed
    } else if missing.is_empty() && fallback.is_empty() {
        VerificationStatus::Success
    } else {
        VerificationStatus::PartialSuccess
    };

    ParameterReport {
        station_id: station_id.to_string(),
        status,
        parameters_observed: observed.iter().cloned().collect(),
        have,
        fallback,
        missing,
    }
}

pub fn print_report(report: &ParameterReport) {
    println!("\n═══════════════════════════════════════════════════════════");
    println!("📊 PARAMETERS FOR STATION {}", report.station_id);
    println!("═══════════════════════════════════════════════════════════");
    println!("Raw observed properties: {}", report.parameters_observed.join(", "));
    println!("Have (from desired list): {}", report.have.join(", "));
    if !report.fallback.is_empty() {
        println!("Fallback resolution:      {}", report.fallback.join(", "));
    }
    println!("Missing (from desired list): {}", report.missing.join(", "));
    println!("Status: {:?}", report.status);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn desired() -> Vec<(ParameterLabel, String)> {
        vec![
            (ParameterLabel::Rain, "precip_past10min".to_string()),
            (ParameterLabel::AverageTemperature, "temp_mean_past10min".to_string()),
            (ParameterLabel::Humidity, "humidity".to_string()),
        ]
    }

    #[test]
    fn test_full_coverage_is_success() {
        let report = verify_station_parameters(
            "06074",
            &desired(),
            &observed(&["precip_past10min", "temp_mean_past10min", "humidity", "wind_dir"]),
        );
        assert_eq!(report.status, VerificationStatus::Success);
        assert_eq!(report.have.len(), 3);
        assert!(report.missing.is_empty());
        assert_eq!(report.parameters_observed.len(), 4);
    }

    #[test]
    fn test_fallback_and_missing_are_partial() {
        let report = verify_station_parameters("06074", &desired(), &observed(&["precip_past1h", "humidity"]));

        assert_eq!(report.status, VerificationStatus::PartialSuccess);
        assert_eq!(report.have, vec!["humidity (humidity)"]);
        assert_eq!(report.fallback, vec!["rain (precip_past10min → precip_past1h)"]);
        assert_eq!(report.missing, vec!["average_temperature (temp_mean_past10min)"]);
    }

    #[test]
    fn test_nothing_usable_is_failed() {
        let report = verify_station_parameters("06074", &desired(), &observed(&[]));
        assert_eq!(report.status, VerificationStatus::Failed);
        assert_eq!(report.missing.len(), 3);
    }
}
