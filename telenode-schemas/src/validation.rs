//! Batch Validation
//!
//! The collector drops whatever it cannot use without telling the node:
//! envelopes of another version are rejected outright, measurements of
//! unknown sensors are silently skipped. [`validate_batch`] applies the same
//! rules locally so the node can log what the collector is going to discard.
//!
//! Validation never blocks a publish. A record that is stored is offered to
//! the collector as is; the report only feeds the log.

use telenode_core::constants::MAX_KNOWN_SENSOR_ID;
use telenode_core::{MeasurementBatch, Status};

use crate::SCHEMA_VERSION;

/// Validate a batch the way the collector will
pub fn validate_batch(batch: &MeasurementBatch) -> ValidationReport {
    let mut report = ValidationReport::new();

    if batch.schema_version != SCHEMA_VERSION {
        report.add_error(ValidationIssue {
            issue_type: IssueType::UnsupportedVersion,
            field: Some("version".to_string()),
            message: format!(
                "Envelope version {} is not accepted (expected {})",
                batch.schema_version, SCHEMA_VERSION
            ),
            severity: Severity::Error,
        });
    }

    if batch.device_id.trim().is_empty() {
        report.add_error(ValidationIssue {
            issue_type: IssueType::MissingField,
            field: Some("device_id".to_string()),
            message: "Device id is empty".to_string(),
            severity: Severity::Error,
        });
    }

    if batch.is_empty() {
        report.add_info(ValidationIssue {
            issue_type: IssueType::EmptyBatch,
            field: Some("measurements".to_string()),
            message: "Batch carries no measurements".to_string(),
            severity: Severity::Info,
        });
    }

    for (index, measurement) in batch.measurements.iter().enumerate() {
        let field = format!("measurements[{}]", index);

        if measurement.sensor_id() > MAX_KNOWN_SENSOR_ID {
            report.add_warning(ValidationIssue {
                issue_type: IssueType::UnknownSensor,
                field: Some(field.clone()),
                message: format!(
                    "Sensor id {} is outside 0..={} and will be ignored",
                    measurement.sensor_id(),
                    MAX_KNOWN_SENSOR_ID
                ),
                severity: Severity::Warning,
            });
        }

        if measurement.status() == Status::Ok && !measurement.value().is_finite() {
            report.add_error(ValidationIssue {
                issue_type: IssueType::NonFiniteValue,
                field: Some(field),
                message: format!("Value {} is not a number JSON can carry", measurement.value()),
                severity: Severity::Error,
            });
        }
    }

    report
}

/// Validation report containing all issues found
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// The collector will reject the batch
    pub errors: Vec<ValidationIssue>,

    /// The collector will drop part of the batch
    pub warnings: Vec<ValidationIssue>,

    /// Informational messages
    pub info: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Create new empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if validation passed (no errors)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, issue: ValidationIssue) {
        self.errors.push(issue);
    }

    pub fn add_warning(&mut self, issue: ValidationIssue) {
        self.warnings.push(issue);
    }

    pub fn add_info(&mut self, issue: ValidationIssue) {
        self.info.push(issue);
    }

    /// Get total issue count
    pub fn total_issues(&self) -> usize {
        self.errors.len() + self.warnings.len() + self.info.len()
    }

    /// Every issue, most severe first
    pub fn issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.errors.iter().chain(&self.warnings).chain(&self.info)
    }
}

/// Individual validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Type of issue
    pub issue_type: IssueType,

    /// Field that caused the issue (if applicable)
    pub field: Option<String>,

    /// Human-readable message
    pub message: String,

    /// Issue severity
    pub severity: Severity,
}

/// Types of validation issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueType {
    /// Envelope version the collector does not accept
    UnsupportedVersion,

    /// Required field is missing or empty
    MissingField,

    /// Sensor id outside the range the collector stores
    UnknownSensor,

    /// NaN or infinite value on a successful reading
    NonFiniteValue,

    /// Nothing to store
    EmptyBatch,
}

/// Issue severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational only
    Info,

    /// Part of the data will be dropped
    Warning,

    /// Whole batch will be dropped
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use telenode_core::Measurement;

    fn batch(measurements: Vec<Measurement>) -> MeasurementBatch {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap();
        MeasurementBatch::new(SCHEMA_VERSION, "FEZ26", at, measurements)
    }

    fn at() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 14, 40).unwrap()
    }

    #[test]
    fn well_formed_batch_passes() {
        let report = validate_batch(&batch(vec![
            Measurement::ok(0, 22.3, at()),
            Measurement::ok(1, 55.1, at()),
            Measurement::ok(2, 310.0, at()),
        ]));
        assert!(report.is_valid());
        assert_eq!(report.total_issues(), 0);
    }

    #[test]
    fn fail_measurements_are_valid() {
        let report = validate_batch(&batch(vec![Measurement::fail(0, at()), Measurement::fail(1, at())]));
        assert!(report.is_valid());
    }

    #[test]
    fn unknown_sensor_is_a_warning() {
        let report = validate_batch(&batch(vec![Measurement::ok(7, 1.0, at())]));
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].issue_type, IssueType::UnknownSensor);
        assert_eq!(report.warnings[0].field.as_deref(), Some("measurements[0]"));
    }

    #[test]
    fn wrong_version_is_an_error() {
        let mut b = batch(vec![Measurement::ok(0, 22.3, at())]);
        b.schema_version = 1;
        let report = validate_batch(&b);
        assert!(!report.is_valid());
        assert_eq!(report.errors[0].issue_type, IssueType::UnsupportedVersion);
    }

    #[test]
    fn empty_device_and_nan_are_errors() {
        let mut b = batch(vec![Measurement::ok(0, f32::NAN, at())]);
        b.device_id = "  ".into();
        let report = validate_batch(&b);
        let kinds: Vec<_> = report.errors.iter().map(|i| i.issue_type).collect();
        assert_eq!(kinds, vec![IssueType::MissingField, IssueType::NonFiniteValue]);
    }

    #[test]
    fn empty_batch_is_informational() {
        let report = validate_batch(&batch(vec![]));
        assert!(report.is_valid());
        assert_eq!(report.info.len(), 1);
        assert_eq!(report.issues().count(), 1);
    }
}
