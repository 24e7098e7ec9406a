//! Read-only access to the volunteer management data behind the reports.

use std::fmt;

use crate::models::{
    AssignmentRecord, EventRecord, ReportParameters, RoleRecord, VenueRecord, VolunteerRecord,
};
use crate::services::adapter::AdapterError;

/// Boxed iterator of records produced by a data source.
pub type RecordIter<'a, T> = Box<dyn Iterator<Item = Result<T, AdapterError>> + Send + 'a>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Events,
    Venues,
    Roles,
    Volunteers,
    Assignments,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::Events => "events",
            RecordKind::Venues => "venues",
            RecordKind::Roles => "roles",
            RecordKind::Volunteers => "volunteers",
            RecordKind::Assignments => "assignments",
        };
        f.write_str(name)
    }
}

/// Source of report records.
///
/// Methods are synchronous: adapters run on a blocking worker thread.
/// Each method applies the filters of `params` that concern its record kind:
///
/// - events: `event_id`, `venue_id`, date range overlap, `include_inactive`
/// - venues: `venue_id`, `include_inactive`
/// - roles: `event_id`, `role_id`
/// - volunteers: `include_inactive`
/// - assignments: `event_id`, `role_id`, `assignment_status`, `assigned_on` in the date range
pub trait VolunteerDataSource: Send + Sync {
    fn events<'a>(&'a self, params: &ReportParameters) -> Result<RecordIter<'a, EventRecord>, AdapterError>;

    fn venues<'a>(&'a self, params: &ReportParameters) -> Result<RecordIter<'a, VenueRecord>, AdapterError>;

    fn roles<'a>(&'a self, params: &ReportParameters) -> Result<RecordIter<'a, RoleRecord>, AdapterError>;

    fn volunteers<'a>(
        &'a self,
        params: &ReportParameters,
    ) -> Result<RecordIter<'a, VolunteerRecord>, AdapterError>;

    fn assignments<'a>(
        &'a self,
        params: &ReportParameters,
    ) -> Result<RecordIter<'a, AssignmentRecord>, AdapterError>;

    /// Number of records `kind` would yield for `params`, if known.
    fn count(&self, _kind: RecordKind, _params: &ReportParameters) -> Result<Option<u64>, AdapterError> {
        Ok(None)
    }
}

pub fn event_matches(event: &EventRecord, params: &ReportParameters) -> bool {
    params.event_id.map_or(true, |id| event.id == id)
        && params.venue_id.map_or(true, |id| event.venue_id == Some(id))
        && params.overlaps(event.start_date, event.end_date)
        && (params.include_inactive() || event.is_active)
}

pub fn venue_matches(venue: &VenueRecord, params: &ReportParameters) -> bool {
    params.venue_id.map_or(true, |id| venue.id == id) && (params.include_inactive() || venue.is_active)
}

pub fn role_matches(role: &RoleRecord, params: &ReportParameters) -> bool {
    params.event_id.map_or(true, |id| role.event_id == id) && params.role_id.map_or(true, |id| role.id == id)
}

pub fn volunteer_matches(volunteer: &VolunteerRecord, params: &ReportParameters) -> bool {
    params.include_inactive() || volunteer.is_active
}

pub fn assignment_matches(assignment: &AssignmentRecord, params: &ReportParameters) -> bool {
    params.event_id.map_or(true, |id| assignment.event_id == id)
        && params.role_id.map_or(true, |id| assignment.role_id == id)
        && params
            .assignment_status
            .map_or(true, |status| assignment.status == status)
        && params.includes_date(assignment.assigned_on)
}

/// Snapshot data source backed by vectors. Used by tests and the
/// `memory` storage mode.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataSource {
    events: Vec<EventRecord>,
    venues: Vec<VenueRecord>,
    roles: Vec<RoleRecord>,
    volunteers: Vec<VolunteerRecord>,
    assignments: Vec<AssignmentRecord>,
}

impl InMemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(mut self, events: Vec<EventRecord>) -> Self {
        self.events = events;
        self
    }

    pub fn with_venues(mut self, venues: Vec<VenueRecord>) -> Self {
        self.venues = venues;
        self
    }

    pub fn with_roles(mut self, roles: Vec<RoleRecord>) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_volunteers(mut self, volunteers: Vec<VolunteerRecord>) -> Self {
        self.volunteers = volunteers;
        self
    }

    pub fn with_assignments(mut self, assignments: Vec<AssignmentRecord>) -> Self {
        self.assignments = assignments;
        self
    }

    fn filtered<'a, T: Clone + Send + Sync>(
        items: &'a [T],
        params: &ReportParameters,
        matches: fn(&T, &ReportParameters) -> bool,
    ) -> RecordIter<'a, T> {
        let params = params.clone();
        Box::new(
            items
                .iter()
                .filter(move |item| matches(item, &params))
                .cloned()
                .map(Ok),
        )
    }
}

impl VolunteerDataSource for InMemoryDataSource {
    fn events<'a>(&'a self, params: &ReportParameters) -> Result<RecordIter<'a, EventRecord>, AdapterError> {
        Ok(Self::filtered(&self.events, params, event_matches))
    }

    fn venues<'a>(&'a self, params: &ReportParameters) -> Result<RecordIter<'a, VenueRecord>, AdapterError> {
        Ok(Self::filtered(&self.venues, params, venue_matches))
    }

    fn roles<'a>(&'a self, params: &ReportParameters) -> Result<RecordIter<'a, RoleRecord>, AdapterError> {
        Ok(Self::filtered(&self.roles, params, role_matches))
    }

    fn volunteers<'a>(
        &'a self,
        params: &ReportParameters,
    ) -> Result<RecordIter<'a, VolunteerRecord>, AdapterError> {
        Ok(Self::filtered(&self.volunteers, params, volunteer_matches))
    }

    fn assignments<'a>(
        &'a self,
        params: &ReportParameters,
    ) -> Result<RecordIter<'a, AssignmentRecord>, AdapterError> {
        Ok(Self::filtered(&self.assignments, params, assignment_matches))
    }

    fn count(&self, kind: RecordKind, params: &ReportParameters) -> Result<Option<u64>, AdapterError> {
        let count = match kind {
            RecordKind::Events => self.events.iter().filter(|e| event_matches(e, params)).count(),
            RecordKind::Venues => self.venues.iter().filter(|v| venue_matches(v, params)).count(),
            RecordKind::Roles => self.roles.iter().filter(|r| role_matches(r, params)).count(),
            RecordKind::Volunteers => self
                .volunteers
                .iter()
                .filter(|v| volunteer_matches(v, params))
                .count(),
            RecordKind::Assignments => self
                .assignments
                .iter()
                .filter(|a| assignment_matches(a, params))
                .count(),
        };
        Ok(Some(count as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssignmentStatus;
    use crate::services::adapter::fixtures::{date, sample};

    #[test]
    fn test_inactive_volunteers_hidden_by_default() {
        let s = sample();
        let params = ReportParameters::default();
        assert_eq!(s.source.volunteers(&params).unwrap().count(), 2);
        let params = ReportParameters {
            include_inactive: Some(true),
            ..Default::default()
        };
        assert_eq!(s.source.volunteers(&params).unwrap().count(), 3);
    }

    #[test]
    fn test_event_filters() {
        let s = sample();
        let params = ReportParameters {
            venue_id: Some(s.park),
            ..Default::default()
        };
        let events: Vec<_> = s.source.events(&params).unwrap().map(|e| e.unwrap().id).collect();
        assert_eq!(events, vec![s.cleanup]);

        let params = ReportParameters {
            date_from: Some(date(2026, 5, 3)),
            ..Default::default()
        };
        let events: Vec<_> = s.source.events(&params).unwrap().map(|e| e.unwrap().id).collect();
        assert_eq!(events, vec![s.cleanup]);
    }

    #[test]
    fn test_assignment_filters_and_count() {
        let s = sample();
        let params = ReportParameters {
            assignment_status: Some(AssignmentStatus::Confirmed),
            ..Default::default()
        };
        assert_eq!(s.source.assignments(&params).unwrap().count(), 2);
        assert_eq!(s.source.count(RecordKind::Assignments, &params).unwrap(), Some(2));

        let params = ReportParameters {
            role_id: Some(s.greeter),
            ..Default::default()
        };
        assert_eq!(s.source.count(RecordKind::Assignments, &params).unwrap(), Some(1));
        assert_eq!(s.source.count(RecordKind::Roles, &params).unwrap(), Some(1));
    }
}
