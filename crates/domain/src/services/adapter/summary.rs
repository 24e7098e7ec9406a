use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{collect_records, lookup_scope, AdapterError, CellValue, ColumnDef, ColumnType, RecordAdapter};
use crate::models::{EventRecord, ReportParameters, ReportType};
use crate::services::data_source::{RecordIter, RecordKind, VolunteerDataSource};

const COLUMNS: [ColumnDef; 10] = [
    ColumnDef::new("event_name", "Event", ColumnType::Text),
    ColumnDef::new("venue", "Venue", ColumnType::Text),
    ColumnDef::new("start_date", "Start Date", ColumnType::Date),
    ColumnDef::new("end_date", "End Date", ColumnType::Date),
    ColumnDef::new("status", "Status", ColumnType::Text),
    ColumnDef::new("roles", "Roles", ColumnType::Integer),
    ColumnDef::new("volunteers_required", "Volunteers Required", ColumnType::Integer),
    ColumnDef::new("volunteers_assigned", "Volunteers Assigned", ColumnType::Integer),
    ColumnDef::new("hours_committed", "Hours Committed", ColumnType::Decimal),
    ColumnDef::new("fill_rate", "Fill Rate (%)", ColumnType::Percentage),
];

/// One row per event with its headline staffing numbers.
pub struct SummaryAdapter {
    source: Arc<dyn VolunteerDataSource>,
}

pub struct EventSummary {
    event: EventRecord,
    venue: Option<String>,
    roles: u64,
    required: u64,
    assigned: u64,
    hours: f64,
}

#[derive(Default)]
struct EventTotals {
    roles: u64,
    required: u64,
    assigned: u64,
    hours: f64,
}

impl SummaryAdapter {
    pub fn new(source: Arc<dyn VolunteerDataSource>) -> Self {
        Self { source }
    }

    fn totals(&self, params: &ReportParameters) -> Result<HashMap<Uuid, EventTotals>, AdapterError> {
        let scope = lookup_scope(params);
        let mut totals: HashMap<Uuid, EventTotals> = HashMap::new();

        for role in self.source.roles(&scope)? {
            let role = role?;
            let entry = totals.entry(role.event_id).or_default();
            entry.roles += 1;
            entry.required += u64::from(role.required_volunteers);
        }
        for assignment in self.source.assignments(&scope)? {
            let assignment = assignment?;
            if assignment.status.is_active() {
                let entry = totals.entry(assignment.event_id).or_default();
                entry.assigned += 1;
                entry.hours += assignment.hours;
            }
        }
        Ok(totals)
    }
}

impl RecordAdapter for SummaryAdapter {
    type Record = EventSummary;

    fn report_type(&self) -> ReportType {
        ReportType::Summary
    }

    fn columns(&self) -> Vec<ColumnDef> {
        COLUMNS.to_vec()
    }

    fn estimate_rows(&self, params: &ReportParameters) -> Result<Option<u64>, AdapterError> {
        self.source.count(RecordKind::Events, params)
    }

    fn iterate_rows<'a>(
        &'a self,
        params: &'a ReportParameters,
    ) -> Result<RecordIter<'a, EventSummary>, AdapterError> {
        let venues: HashMap<Uuid, String> = collect_records(self.source.venues(&lookup_scope(params))?)?
            .into_iter()
            .map(|v| (v.id, v.name))
            .collect();
        let mut totals = self.totals(params)?;

        let events = self.source.events(params)?;
        Ok(Box::new(events.map(move |event| {
            let event = event?;
            let t = totals.remove(&event.id).unwrap_or_default();
            Ok(EventSummary {
                venue: event.venue_id.and_then(|id| venues.get(&id).cloned()),
                event,
                roles: t.roles,
                required: t.required,
                assigned: t.assigned,
                hours: t.hours,
            })
        })))
    }

    fn format_row(&self, r: &EventSummary) -> Vec<CellValue> {
        vec![
            CellValue::text(&r.event.name),
            CellValue::optional_text(r.venue.as_ref()),
            CellValue::Date(r.event.start_date),
            CellValue::Date(r.event.end_date),
            CellValue::text(r.event.status.as_str()),
            CellValue::Integer(r.roles as i64),
            CellValue::Integer(r.required as i64),
            CellValue::Integer(r.assigned as i64),
            CellValue::Decimal(r.hours),
            CellValue::ratio(r.assigned as f64, r.required as f64),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::adapter::fixtures::sample;
    use crate::services::adapter::ReportAdapter;

    #[test]
    fn test_summary_rows() {
        let s = sample();
        let adapter: Box<dyn ReportAdapter> = Box::new(SummaryAdapter::new(Arc::new(s.source)));
        let params = ReportParameters::default();
        let rows: Vec<_> = adapter.rows(&params).unwrap().map(|r| r.unwrap()).collect();

        assert_eq!(rows.len(), 2);
        let gala = &rows[0];
        assert_eq!(gala[0], CellValue::text("Spring Gala"));
        assert_eq!(gala[1], CellValue::text("Town Hall"));
        assert_eq!(gala[5], CellValue::Integer(2));
        assert_eq!(gala[6], CellValue::Integer(4));
        // The cancelled greeter assignment does not count.
        assert_eq!(gala[7], CellValue::Integer(2));
        assert_eq!(gala[8], CellValue::Decimal(8.0));
        assert_eq!(gala[9], CellValue::Percentage(50.0));
        assert_eq!(adapter.estimate_rows(&params).unwrap(), Some(2));
    }

    #[test]
    fn test_summary_filtered_by_event() {
        let s = sample();
        let cleanup = s.cleanup;
        let adapter: Box<dyn ReportAdapter> = Box::new(SummaryAdapter::new(Arc::new(s.source)));
        let params = ReportParameters {
            event_id: Some(cleanup),
            ..Default::default()
        };
        let rows: Vec<_> = adapter.rows(&params).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][7], CellValue::Integer(2));
        assert_eq!(rows[0][9], CellValue::Percentage(50.0));
    }
}
