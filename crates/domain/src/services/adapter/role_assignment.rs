use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{collect_records, lookup_scope, AdapterError, CellValue, ColumnDef, ColumnType, RecordAdapter};
use crate::models::{AssignmentRecord, ReportParameters, ReportType};
use crate::services::data_source::{RecordIter, RecordKind, VolunteerDataSource};

const COLUMNS: [ColumnDef; 8] = [
    ColumnDef::new("event_name", "Event", ColumnType::Text),
    ColumnDef::new("role", "Role", ColumnType::Text),
    ColumnDef::new("volunteer_name", "Volunteer", ColumnType::Text),
    ColumnDef::new("volunteer_email", "Email", ColumnType::Text),
    ColumnDef::new("status", "Status", ColumnType::Text),
    ColumnDef::new("hours", "Hours", ColumnType::Decimal),
    ColumnDef::new("assigned_on", "Assigned On", ColumnType::Date),
    ColumnDef::new("event_date", "Event Date", ColumnType::Date),
];

/// One row per assignment, resolved to event, role and volunteer names.
pub struct RoleAssignmentAdapter {
    source: Arc<dyn VolunteerDataSource>,
}

pub struct AssignmentRow {
    assignment: AssignmentRecord,
    event: Option<(String, chrono::NaiveDate)>,
    role: Option<String>,
    volunteer: Option<(String, String)>,
}

impl RoleAssignmentAdapter {
    pub fn new(source: Arc<dyn VolunteerDataSource>) -> Self {
        Self { source }
    }
}

impl RecordAdapter for RoleAssignmentAdapter {
    type Record = AssignmentRow;

    fn report_type(&self) -> ReportType {
        ReportType::RoleAssignment
    }

    fn columns(&self) -> Vec<ColumnDef> {
        COLUMNS.to_vec()
    }

    fn estimate_rows(&self, params: &ReportParameters) -> Result<Option<u64>, AdapterError> {
        self.source.count(RecordKind::Assignments, params)
    }

    fn iterate_rows<'a>(
        &'a self,
        params: &'a ReportParameters,
    ) -> Result<RecordIter<'a, AssignmentRow>, AdapterError> {
        let scope = lookup_scope(params);
        let events: HashMap<Uuid, (String, chrono::NaiveDate)> = collect_records(self.source.events(&scope)?)?
            .into_iter()
            .map(|e| (e.id, (e.name, e.start_date)))
            .collect();
        let roles: HashMap<Uuid, String> = collect_records(self.source.roles(&scope)?)?
            .into_iter()
            .map(|r| (r.id, r.name))
            .collect();
        let volunteers: HashMap<Uuid, (String, String)> = collect_records(self.source.volunteers(&scope)?)?
            .into_iter()
            .map(|v| (v.id, (v.full_name(), v.email)))
            .collect();

        let assignments = self.source.assignments(params)?;
        Ok(Box::new(assignments.map(move |assignment| {
            let assignment = assignment?;
            Ok(AssignmentRow {
                event: events.get(&assignment.event_id).cloned(),
                role: roles.get(&assignment.role_id).cloned(),
                volunteer: volunteers.get(&assignment.volunteer_id).cloned(),
                assignment,
            })
        })))
    }

    fn format_row(&self, r: &AssignmentRow) -> Vec<CellValue> {
        let (event_name, event_date) = match &r.event {
            Some((name, date)) => (CellValue::text(name), CellValue::Date(*date)),
            None => (CellValue::Null, CellValue::Null),
        };
        let (volunteer_name, volunteer_email) = match &r.volunteer {
            Some((name, email)) => (CellValue::text(name), CellValue::text(email)),
            None => (CellValue::Null, CellValue::Null),
        };
        vec![
            event_name,
            CellValue::optional_text(r.role.as_ref()),
            volunteer_name,
            volunteer_email,
            CellValue::text(r.assignment.status.as_str()),
            CellValue::Decimal(r.assignment.hours),
            CellValue::Date(r.assignment.assigned_on),
            event_date,
        ]
    }
}
