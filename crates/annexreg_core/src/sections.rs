//! The twelve Annex IV section keys with their required fields, titles and
//! completeness weights.
//!
//! The required-field sets and weights are a fixed dictionary maintained
//! alongside the code; weights sum to 100. `CHANGE_MANAGEMENT` carries no
//! required fields, so its section score comes entirely from evidence.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
pub enum SectionKey {
    #[serde(rename = "ANNEX4.GENERAL")]
    #[strum(serialize = "ANNEX4.GENERAL")]
    General,
    #[serde(rename = "ANNEX4.INTENDED_PURPOSE")]
    #[strum(serialize = "ANNEX4.INTENDED_PURPOSE")]
    IntendedPurpose,
    #[serde(rename = "ANNEX4.SYSTEM_DESCRIPTION")]
    #[strum(serialize = "ANNEX4.SYSTEM_DESCRIPTION")]
    SystemDescription,
    #[serde(rename = "ANNEX4.RISK_MANAGEMENT")]
    #[strum(serialize = "ANNEX4.RISK_MANAGEMENT")]
    RiskManagement,
    #[serde(rename = "ANNEX4.DATA_GOVERNANCE")]
    #[strum(serialize = "ANNEX4.DATA_GOVERNANCE")]
    DataGovernance,
    #[serde(rename = "ANNEX4.MODEL_TECHNICAL")]
    #[strum(serialize = "ANNEX4.MODEL_TECHNICAL")]
    ModelTechnical,
    #[serde(rename = "ANNEX4.PERFORMANCE")]
    #[strum(serialize = "ANNEX4.PERFORMANCE")]
    Performance,
    #[serde(rename = "ANNEX4.HUMAN_OVERSIGHT")]
    #[strum(serialize = "ANNEX4.HUMAN_OVERSIGHT")]
    HumanOversight,
    #[serde(rename = "ANNEX4.LOGGING")]
    #[strum(serialize = "ANNEX4.LOGGING")]
    Logging,
    #[serde(rename = "ANNEX4.ACCURACY_ROBUSTNESS_CYBERSEC")]
    #[strum(serialize = "ANNEX4.ACCURACY_ROBUSTNESS_CYBERSEC")]
    AccuracyRobustnessCybersec,
    #[serde(rename = "ANNEX4.POST_MARKET_MONITORING")]
    #[strum(serialize = "ANNEX4.POST_MARKET_MONITORING")]
    PostMarketMonitoring,
    #[serde(rename = "ANNEX4.CHANGE_MANAGEMENT")]
    #[strum(serialize = "ANNEX4.CHANGE_MANAGEMENT")]
    ChangeManagement,
}

impl SectionKey {
    pub fn all() -> impl Iterator<Item = SectionKey> {
        SectionKey::iter()
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::General => "General Information",
            Self::IntendedPurpose => "Intended Purpose",
            Self::SystemDescription => "System Description",
            Self::RiskManagement => "Risk Management System",
            Self::DataGovernance => "Data Governance",
            Self::ModelTechnical => "Model & Technical Documentation",
            Self::Performance => "Performance Metrics",
            Self::HumanOversight => "Human Oversight",
            Self::Logging => "Logging & Traceability",
            Self::AccuracyRobustnessCybersec => "Accuracy, Robustness & Cybersecurity",
            Self::PostMarketMonitoring => "Post-Market Monitoring",
            Self::ChangeManagement => "Change Management",
        }
    }

    /// Closed set of required field names used by the completeness formula.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::General => &[
                "provider_name",
                "provider_address",
                "system_name",
                "system_version",
                "conformity_declaration_date",
            ],
            Self::IntendedPurpose => &[
                "intended_purpose",
                "target_users",
                "deployment_context",
                "geographic_scope",
            ],
            Self::SystemDescription => &[
                "system_architecture",
                "hardware_requirements",
                "software_dependencies",
                "external_interfaces",
                "ui_description",
            ],
            Self::RiskManagement => &[
                "risk_methodology",
                "identified_risks",
                "mitigation_measures",
                "residual_risks",
                "testing_procedures",
            ],
            Self::DataGovernance => &[
                "data_sources",
                "data_collection_methods",
                "data_preparation",
                "bias_examination",
                "data_protection_measures",
            ],
            Self::ModelTechnical => &[
                "model_type",
                "training_methodology",
                "model_parameters",
                "optimization_objectives",
            ],
            Self::Performance => &[
                "accuracy_metrics",
                "performance_results",
                "known_limitations",
                "foreseeable_misuse",
            ],
            Self::HumanOversight => &[
                "oversight_measures",
                "intervention_points",
                "operator_training",
            ],
            Self::Logging => &[
                "logging_capabilities",
                "log_retention",
                "traceability_measures",
            ],
            Self::AccuracyRobustnessCybersec => &[
                "accuracy_measures",
                "robustness_testing",
                "cybersecurity_measures",
                "resilience_assessment",
            ],
            Self::PostMarketMonitoring => &[
                "monitoring_plan",
                "data_collection_plan",
                "incident_reporting",
            ],
            Self::ChangeManagement => &[],
        }
    }

    /// Weight in the version-level completeness mean. Weights sum to 100;
    /// change management carries zero weight.
    pub fn weight(self) -> f64 {
        match self {
            Self::General => 5.0,
            Self::IntendedPurpose => 8.0,
            Self::SystemDescription => 10.0,
            Self::RiskManagement => 15.0,
            Self::DataGovernance => 12.0,
            Self::ModelTechnical => 10.0,
            Self::Performance => 10.0,
            Self::HumanOversight => 8.0,
            Self::Logging => 7.0,
            Self::AccuracyRobustnessCybersec => 10.0,
            Self::PostMarketMonitoring => 5.0,
            Self::ChangeManagement => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn there_are_twelve_sections() {
        assert_eq!(SectionKey::all().count(), 12);
    }

    #[test]
    fn weights_sum_to_one_hundred() {
        let total: f64 = SectionKey::all().map(|k| k.weight()).sum();
        assert!((total - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn keys_round_trip_through_strings() {
        for key in SectionKey::all() {
            let s = key.to_string();
            assert!(s.starts_with("ANNEX4."));
            assert_eq!(SectionKey::from_str(&s).unwrap(), key);
        }
        assert!(SectionKey::from_str("ANNEX4.NOPE").is_err());
    }

    #[test]
    fn general_has_five_required_fields() {
        assert_eq!(SectionKey::General.required_fields().len(), 5);
        assert!(SectionKey::ChangeManagement.required_fields().is_empty());
    }
}
