use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{collect_records, lookup_scope, AdapterError, CellValue, ColumnDef, ColumnType, RecordAdapter};
use crate::models::{AssignmentStatus, EventRecord, ReportParameters, ReportType, RoleRecord};
use crate::services::data_source::{RecordIter, RecordKind, VolunteerDataSource};

const COLUMNS: [ColumnDef; 10] = [
    ColumnDef::new("event_name", "Event", ColumnType::Text),
    ColumnDef::new("event_date", "Event Date", ColumnType::Date),
    ColumnDef::new("role", "Role", ColumnType::Text),
    ColumnDef::new("shift_hours", "Shift Hours", ColumnType::Decimal),
    ColumnDef::new("required", "Required", ColumnType::Integer),
    ColumnDef::new("assigned", "Assigned", ColumnType::Integer),
    ColumnDef::new("completed", "Completed", ColumnType::Integer),
    ColumnDef::new("no_shows", "No Shows", ColumnType::Integer),
    ColumnDef::new("fill_rate", "Fill Rate (%)", ColumnType::Percentage),
    ColumnDef::new("shortfall", "Shortfall", ColumnType::Integer),
];

/// One row per role slot of each matching event.
pub struct EventPerformanceAdapter {
    source: Arc<dyn VolunteerDataSource>,
}

pub struct RoleSlot {
    event_name: String,
    event_date: chrono::NaiveDate,
    role: RoleRecord,
    stats: SlotStats,
}

#[derive(Default, Clone, Copy)]
struct SlotStats {
    assigned: u64,
    completed: u64,
    no_shows: u64,
}

impl EventPerformanceAdapter {
    pub fn new(source: Arc<dyn VolunteerDataSource>) -> Self {
        Self { source }
    }

    fn slots_for(
        event: EventRecord,
        roles: &mut HashMap<Uuid, Vec<RoleRecord>>,
        stats: &HashMap<Uuid, SlotStats>,
    ) -> Vec<RoleSlot> {
        roles
            .remove(&event.id)
            .unwrap_or_default()
            .into_iter()
            .map(|role| RoleSlot {
                event_name: event.name.clone(),
                event_date: event.start_date,
                stats: stats.get(&role.id).copied().unwrap_or_default(),
                role,
            })
            .collect()
    }
}

impl RecordAdapter for EventPerformanceAdapter {
    type Record = RoleSlot;

    fn report_type(&self) -> ReportType {
        ReportType::EventPerformance
    }

    fn columns(&self) -> Vec<ColumnDef> {
        COLUMNS.to_vec()
    }

    fn estimate_rows(&self, params: &ReportParameters) -> Result<Option<u64>, AdapterError> {
        // Role count is exact only when no event-level filter applies.
        if params.date_from.is_some() || params.date_to.is_some() || params.venue_id.is_some() {
            return Ok(None);
        }
        self.source.count(RecordKind::Roles, params)
    }

    fn iterate_rows<'a>(
        &'a self,
        params: &'a ReportParameters,
    ) -> Result<RecordIter<'a, RoleSlot>, AdapterError> {
        let scope = lookup_scope(params);

        let mut roles: HashMap<Uuid, Vec<RoleRecord>> = HashMap::new();
        for role in collect_records(self.source.roles(&scope)?)? {
            roles.entry(role.event_id).or_default().push(role);
        }

        let mut stats: HashMap<Uuid, SlotStats> = HashMap::new();
        for assignment in self.source.assignments(&scope)? {
            let assignment = assignment?;
            let entry = stats.entry(assignment.role_id).or_default();
            match assignment.status {
                AssignmentStatus::Cancelled => {}
                AssignmentStatus::Completed => {
                    entry.assigned += 1;
                    entry.completed += 1;
                }
                AssignmentStatus::NoShow => {
                    entry.assigned += 1;
                    entry.no_shows += 1;
                }
                AssignmentStatus::Pending | AssignmentStatus::Confirmed => entry.assigned += 1,
            }
        }

        let events = self.source.events(params)?;
        Ok(Box::new(events.flat_map(move |event| {
            let slots: Vec<Result<RoleSlot, AdapterError>> = match event {
                Ok(event) => Self::slots_for(event, &mut roles, &stats)
                    .into_iter()
                    .map(Ok)
                    .collect(),
                Err(e) => vec![Err(e)],
            };
            slots
        })))
    }

    fn format_row(&self, r: &RoleSlot) -> Vec<CellValue> {
        let required = u64::from(r.role.required_volunteers);
        vec![
            CellValue::text(&r.event_name),
            CellValue::Date(r.event_date),
            CellValue::text(&r.role.name),
            CellValue::Decimal(r.role.shift_hours),
            CellValue::Integer(required as i64),
            CellValue::Integer(r.stats.assigned as i64),
            CellValue::Integer(r.stats.completed as i64),
            CellValue::Integer(r.stats.no_shows as i64),
            CellValue::ratio(r.stats.assigned as f64, required as f64),
            CellValue::Integer(required.saturating_sub(r.stats.assigned) as i64),
        ]
    }
}
