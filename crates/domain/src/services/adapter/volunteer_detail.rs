use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{AdapterError, CellValue, ColumnDef, ColumnType, RecordAdapter};
use crate::models::{AssignmentStatus, ReportParameters, ReportType, VolunteerRecord};
use crate::services::data_source::{RecordIter, RecordKind, VolunteerDataSource};

const COLUMNS: [ColumnDef; 11] = [
    ColumnDef::new("volunteer_name", "Volunteer", ColumnType::Text),
    ColumnDef::new("email", "Email", ColumnType::Text),
    ColumnDef::new("phone", "Phone", ColumnType::Text),
    ColumnDef::new("skills", "Skills", ColumnType::Text),
    ColumnDef::new("joined_on", "Joined", ColumnType::Date),
    ColumnDef::new("active", "Active", ColumnType::Boolean),
    ColumnDef::new("assignments", "Assignments", ColumnType::Integer),
    ColumnDef::new("completed", "Completed", ColumnType::Integer),
    ColumnDef::new("no_shows", "No Shows", ColumnType::Integer),
    ColumnDef::new("hours", "Hours", ColumnType::Decimal),
    ColumnDef::new("last_assigned_on", "Last Assignment", ColumnType::Date),
];

/// One row per volunteer with totals over the matching assignments.
///
/// When the parameters narrow the assignments (`event_id` or
/// `assignment_status`), volunteers without a matching assignment are left
/// out.
pub struct VolunteerDetailAdapter {
    source: Arc<dyn VolunteerDataSource>,
}

pub struct VolunteerDetail {
    volunteer: VolunteerRecord,
    totals: AssignmentTotals,
}

#[derive(Default)]
struct AssignmentTotals {
    assignments: u64,
    completed: u64,
    no_shows: u64,
    hours: f64,
    last_assigned_on: Option<NaiveDate>,
}

impl VolunteerDetailAdapter {
    pub fn new(source: Arc<dyn VolunteerDataSource>) -> Self {
        Self { source }
    }

    fn totals(&self, params: &ReportParameters) -> Result<HashMap<Uuid, AssignmentTotals>, AdapterError> {
        let mut totals: HashMap<Uuid, AssignmentTotals> = HashMap::new();
        for assignment in self.source.assignments(params)? {
            let assignment = assignment?;
            let entry = totals.entry(assignment.volunteer_id).or_default();
            entry.assignments += 1;
            match assignment.status {
                AssignmentStatus::Completed => {
                    entry.completed += 1;
                    entry.hours += assignment.hours;
                }
                AssignmentStatus::NoShow => entry.no_shows += 1,
                AssignmentStatus::Cancelled => {}
                AssignmentStatus::Pending | AssignmentStatus::Confirmed => {
                    entry.hours += assignment.hours;
                }
            }
            entry.last_assigned_on = entry.last_assigned_on.max(Some(assignment.assigned_on));
        }
        Ok(totals)
    }
}

fn narrows_assignments(params: &ReportParameters) -> bool {
    params.event_id.is_some() || params.role_id.is_some() || params.assignment_status.is_some()
}

impl RecordAdapter for VolunteerDetailAdapter {
    type Record = VolunteerDetail;

    fn report_type(&self) -> ReportType {
        ReportType::VolunteerDetail
    }

    fn columns(&self) -> Vec<ColumnDef> {
        COLUMNS.to_vec()
    }

    fn estimate_rows(&self, params: &ReportParameters) -> Result<Option<u64>, AdapterError> {
        if narrows_assignments(params) {
            return Ok(None);
        }
        self.source.count(RecordKind::Volunteers, params)
    }

    fn iterate_rows<'a>(
        &'a self,
        params: &'a ReportParameters,
    ) -> Result<RecordIter<'a, VolunteerDetail>, AdapterError> {
        let mut totals = self.totals(params)?;
        let only_matching = narrows_assignments(params);

        let volunteers = self.source.volunteers(params)?;
        Ok(Box::new(volunteers.filter_map(move |volunteer| {
            let volunteer = match volunteer {
                Ok(v) => v,
                Err(e) => return Some(Err(e)),
            };
            match totals.remove(&volunteer.id) {
                Some(t) => Some(Ok(VolunteerDetail { volunteer, totals: t })),
                None if only_matching => None,
                None => Some(Ok(VolunteerDetail {
                    volunteer,
                    totals: AssignmentTotals::default(),
                })),
            }
        })))
    }

    fn format_row(&self, r: &VolunteerDetail) -> Vec<CellValue> {
        let v = &r.volunteer;
        vec![
            CellValue::text(v.full_name()),
            CellValue::text(&v.email),
            CellValue::optional_text(v.phone.as_ref()),
            CellValue::text(v.skills.join("; ")),
            CellValue::Date(v.joined_on),
            CellValue::Boolean(v.is_active),
            CellValue::Integer(r.totals.assignments as i64),
            CellValue::Integer(r.totals.completed as i64),
            CellValue::Integer(r.totals.no_shows as i64),
            CellValue::Decimal(r.totals.hours),
            r.totals.last_assigned_on.map_or(CellValue::Null, CellValue::Date),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::adapter::fixtures::{date, sample};
    use crate::services::adapter::ReportAdapter;

    #[test]
    fn test_volunteer_totals() {
        let s = sample();
        let adapter: Box<dyn ReportAdapter> = Box::new(VolunteerDetailAdapter::new(Arc::new(s.source)));
        let params = ReportParameters::default();
        let rows: Vec<_> = adapter.rows(&params).unwrap().map(|r| r.unwrap()).collect();

        // Cy is inactive and hidden by default.
        assert_eq!(rows.len(), 2);
        let ada = &rows[0];
        assert_eq!(ada[0], CellValue::text("Ada Lovelace"));
        assert_eq!(ada[6], CellValue::Integer(2));
        assert_eq!(ada[7], CellValue::Integer(1));
        assert_eq!(ada[9], CellValue::Decimal(9.0));
        assert_eq!(ada[10], CellValue::Date(date(2026, 4, 1)));

        let bo = &rows[1];
        assert_eq!(bo[8], CellValue::Integer(1));
        assert_eq!(bo[9], CellValue::Decimal(4.0));
    }

    #[test]
    fn test_status_filter_drops_unmatched_volunteers() {
        let s = sample();
        let adapter: Box<dyn ReportAdapter> = Box::new(VolunteerDetailAdapter::new(Arc::new(s.source)));
        let params = ReportParameters {
            assignment_status: Some(AssignmentStatus::NoShow),
            ..Default::default()
        };
        let rows: Vec<_> = adapter.rows(&params).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], CellValue::text("Bo Diddley"));
        assert_eq!(adapter.estimate_rows(&params).unwrap(), None);
    }
}
