use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{collect_records, lookup_scope, AdapterError, CellValue, ColumnDef, ColumnType, RecordAdapter};
use crate::models::{ReportParameters, ReportType, VenueRecord};
use crate::services::data_source::{RecordIter, RecordKind, VolunteerDataSource};

const COLUMNS: [ColumnDef; 8] = [
    ColumnDef::new("venue", "Venue", ColumnType::Text),
    ColumnDef::new("city", "City", ColumnType::Text),
    ColumnDef::new("capacity", "Capacity", ColumnType::Integer),
    ColumnDef::new("events_hosted", "Events Hosted", ColumnType::Integer),
    ColumnDef::new("volunteer_slots", "Volunteer Slots", ColumnType::Integer),
    ColumnDef::new("volunteers_assigned", "Volunteers Assigned", ColumnType::Integer),
    ColumnDef::new("utilization", "Utilization (%)", ColumnType::Percentage),
    ColumnDef::new("avg_volunteers_per_event", "Avg Volunteers / Event", ColumnType::Decimal),
];

/// One row per venue, aggregated over the events it hosts in the date range.
pub struct VenueUtilizationAdapter {
    source: Arc<dyn VolunteerDataSource>,
}

pub struct VenueUsage {
    venue: VenueRecord,
    events: u64,
    slots: u64,
    assigned: u64,
}

#[derive(Default)]
struct Usage {
    events: u64,
    slots: u64,
    assigned: u64,
}

impl VenueUtilizationAdapter {
    pub fn new(source: Arc<dyn VolunteerDataSource>) -> Self {
        Self { source }
    }

    fn usage(&self, params: &ReportParameters) -> Result<HashMap<Uuid, Usage>, AdapterError> {
        // Events follow the report's date range; roles and assignments are
        // looked up for those events only.
        let event_params = ReportParameters {
            venue_id: params.venue_id,
            date_from: params.date_from,
            date_to: params.date_to,
            include_inactive: params.include_inactive,
            ..Default::default()
        };
        let mut venue_of_event: HashMap<Uuid, Uuid> = HashMap::new();
        let mut usage: HashMap<Uuid, Usage> = HashMap::new();
        for event in collect_records(self.source.events(&event_params)?)? {
            if let Some(venue_id) = event.venue_id {
                venue_of_event.insert(event.id, venue_id);
                usage.entry(venue_id).or_default().events += 1;
            }
        }

        let scope = lookup_scope(&ReportParameters::default());
        for role in self.source.roles(&scope)? {
            let role = role?;
            if let Some(venue_id) = venue_of_event.get(&role.event_id) {
                usage.entry(*venue_id).or_default().slots += u64::from(role.required_volunteers);
            }
        }
        for assignment in self.source.assignments(&scope)? {
            let assignment = assignment?;
            if !assignment.status.is_active() {
                continue;
            }
            if let Some(venue_id) = venue_of_event.get(&assignment.event_id) {
                usage.entry(*venue_id).or_default().assigned += 1;
            }
        }
        Ok(usage)
    }
}

impl RecordAdapter for VenueUtilizationAdapter {
    type Record = VenueUsage;

    fn report_type(&self) -> ReportType {
        ReportType::VenueUtilization
    }

    fn columns(&self) -> Vec<ColumnDef> {
        COLUMNS.to_vec()
    }

    fn estimate_rows(&self, params: &ReportParameters) -> Result<Option<u64>, AdapterError> {
        self.source.count(RecordKind::Venues, params)
    }

    fn iterate_rows<'a>(
        &'a self,
        params: &'a ReportParameters,
    ) -> Result<RecordIter<'a, VenueUsage>, AdapterError> {
        let mut usage = self.usage(params)?;
        let venues = self.source.venues(params)?;
        Ok(Box::new(venues.map(move |venue| {
            let venue = venue?;
            let u = usage.remove(&venue.id).unwrap_or_default();
            Ok(VenueUsage {
                venue,
                events: u.events,
                slots: u.slots,
                assigned: u.assigned,
            })
        })))
    }

    fn format_row(&self, r: &VenueUsage) -> Vec<CellValue> {
        let average = if r.events > 0 {
            CellValue::Decimal(r.assigned as f64 / r.events as f64)
        } else {
            CellValue::Null
        };
        vec![
            CellValue::text(&r.venue.name),
            CellValue::optional_text(r.venue.city.as_ref()),
            r.venue
                .capacity
                .map_or(CellValue::Null, |c| CellValue::Integer(i64::from(c))),
            CellValue::Integer(r.events as i64),
            CellValue::Integer(r.slots as i64),
            CellValue::Integer(r.assigned as i64),
            CellValue::ratio(r.assigned as f64, r.slots as f64),
            average,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::adapter::fixtures::{date, sample};
    use crate::services::adapter::ReportAdapter;

    #[test]
    fn test_venue_usage() {
        let s = sample();
        let adapter: Box<dyn ReportAdapter> = Box::new(VenueUtilizationAdapter::new(Arc::new(s.source)));
        let params = ReportParameters::default();
        let rows: Vec<_> = adapter.rows(&params).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);

        let hall = &rows[0];
        assert_eq!(hall[0], CellValue::text("Town Hall"));
        assert_eq!(hall[2], CellValue::Integer(300));
        assert_eq!(hall[3], CellValue::Integer(1));
        assert_eq!(hall[4], CellValue::Integer(4));
        assert_eq!(hall[5], CellValue::Integer(2));
        assert_eq!(hall[6], CellValue::Percentage(50.0));
        assert_eq!(hall[7], CellValue::Decimal(2.0));

        let park = &rows[1];
        assert_eq!(park[1], CellValue::Null);
        assert_eq!(park[2], CellValue::Null);
    }

    #[test]
    fn test_date_range_excludes_events() {
        let s = sample();
        let adapter: Box<dyn ReportAdapter> = Box::new(VenueUtilizationAdapter::new(Arc::new(s.source)));
        let params = ReportParameters {
            date_from: Some(date(2026, 5, 1)),
            ..Default::default()
        };
        let rows: Vec<_> = adapter.rows(&params).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rows[0][3], CellValue::Integer(0));
        assert_eq!(rows[0][6], CellValue::Null);
        assert_eq!(rows[0][7], CellValue::Null);
        assert_eq!(rows[1][3], CellValue::Integer(1));
    }
}
