//! Typed report parameters.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::report_job::ReportType;
use super::volunteering::AssignmentStatus;
use crate::error::ReportError;

const COMMON_KEYS: [&str; 2] = ["include_inactive", "title"];

/// Filters applied by the report adapters.
///
/// Unknown keys in the incoming JSON are ignored. A known key with the wrong
/// shape is a validation error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ReportParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_to: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_status: Option<AssignmentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_inactive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ReportParameters {
    /// Parses parameters from a JSON object. `null` yields the defaults.
    pub fn from_json(value: &Value) -> Result<Self, ReportError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(_) => {
                let params: ReportParameters = serde_json::from_value(value.clone())
                    .map_err(|e| ReportError::validation(format!("Invalid report parameters: {}", e)))?;
                params.validate()?;
                Ok(params)
            }
            _ => Err(ReportError::validation(
                "Report parameters must be a JSON object",
            )),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Default::default()))
    }

    pub fn validate(&self) -> Result<(), ReportError> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(ReportError::validation(format!(
                    "date_from ({}) is after date_to ({})",
                    from, to
                )));
            }
        }
        if let Some(title) = &self.title {
            if title.chars().count() > 200 {
                return Err(ReportError::validation("title must be at most 200 characters"));
            }
        }
        Ok(())
    }

    /// Returns a copy where every key set in `overrides` replaces the value
    /// held by `self`.
    pub fn merged_with(&self, overrides: &ReportParameters) -> ReportParameters {
        ReportParameters {
            date_from: overrides.date_from.or(self.date_from),
            date_to: overrides.date_to.or(self.date_to),
            event_id: overrides.event_id.or(self.event_id),
            venue_id: overrides.venue_id.or(self.venue_id),
            role_id: overrides.role_id.or(self.role_id),
            assignment_status: overrides.assignment_status.or(self.assignment_status),
            include_inactive: overrides.include_inactive.or(self.include_inactive),
            title: overrides.title.clone().or_else(|| self.title.clone()),
        }
    }

    /// Keys honoured by the adapter of `report_type`.
    pub fn recognized_keys(report_type: ReportType) -> Vec<&'static str> {
        let specific: &[&'static str] = match report_type {
            ReportType::Summary => &["date_from", "date_to", "event_id", "venue_id"],
            ReportType::VolunteerDetail => &["date_from", "date_to", "event_id", "assignment_status"],
            ReportType::EventPerformance => &["date_from", "date_to", "event_id", "venue_id", "role_id"],
            ReportType::VenueUtilization => &["date_from", "date_to", "venue_id"],
            ReportType::RoleAssignment => &[
                "date_from",
                "date_to",
                "event_id",
                "role_id",
                "assignment_status",
            ],
        };
        specific.iter().chain(COMMON_KEYS.iter()).copied().collect()
    }

    /// Keys present in `value` that `report_type` does not use.
    pub fn ignored_keys(value: &Value, report_type: ReportType) -> Vec<String> {
        let recognized = Self::recognized_keys(report_type);
        match value {
            Value::Object(map) => map
                .keys()
                .filter(|k| !recognized.contains(&k.as_str()))
                .cloned()
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether `date` lies inside the inclusive date range.
    pub fn includes_date(&self, date: NaiveDate) -> bool {
        self.date_from.map_or(true, |from| date >= from) && self.date_to.map_or(true, |to| date <= to)
    }

    /// Whether a span of days overlaps the inclusive date range.
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.date_from.map_or(true, |from| end >= from) && self.date_to.map_or(true, |to| start <= to)
    }

    pub fn include_inactive(&self) -> bool {
        self.include_inactive.unwrap_or(false)
    }
}
