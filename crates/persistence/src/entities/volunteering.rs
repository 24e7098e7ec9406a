//! Row mappings for the volunteer management tables read by reports.
//!
//! These tables belong to the wider application; reports only read them.

use chrono::NaiveDate;
use domain::models::{
    AssignmentRecord, AssignmentStatus, EventRecord, EventStatus, RoleRecord, VenueRecord,
    VolunteerRecord,
};
use domain::services::AdapterError;
use sqlx::FromRow;
use uuid::Uuid;

fn invalid(table: &str, id: Uuid, err: String) -> AdapterError {
    AdapterError::InvalidRecord(format!("{} {}: {}", table, id, err))
}

#[derive(Debug, Clone, FromRow)]
pub struct EventEntity {
    pub id: Uuid,
    pub name: String,
    pub venue_id: Option<Uuid>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub is_active: bool,
}

impl EventEntity {
    pub fn into_record(self) -> Result<EventRecord, AdapterError> {
        let status = self
            .status
            .parse::<EventStatus>()
            .map_err(|e| invalid("events", self.id, e))?;
        Ok(EventRecord {
            id: self.id,
            name: self.name,
            venue_id: self.venue_id,
            start_date: self.start_date,
            end_date: self.end_date,
            status,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct VenueEntity {
    pub id: Uuid,
    pub name: String,
    pub city: Option<String>,
    pub capacity: Option<i32>,
    pub is_active: bool,
}

impl From<VenueEntity> for VenueRecord {
    fn from(entity: VenueEntity) -> Self {
        VenueRecord {
            id: entity.id,
            name: entity.name,
            city: entity.city,
            capacity: entity.capacity.map(|c| c.max(0) as u32),
            is_active: entity.is_active,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RoleEntity {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub required_volunteers: i32,
    pub shift_hours: f64,
}

impl From<RoleEntity> for RoleRecord {
    fn from(entity: RoleEntity) -> Self {
        RoleRecord {
            id: entity.id,
            event_id: entity.event_id,
            name: entity.name,
            required_volunteers: entity.required_volunteers.max(0) as u32,
            shift_hours: entity.shift_hours,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct VolunteerEntity {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    /// TEXT[] column.
    pub skills: Vec<String>,
    pub is_active: bool,
    pub joined_on: NaiveDate,
}

impl From<VolunteerEntity> for VolunteerRecord {
    fn from(entity: VolunteerEntity) -> Self {
        VolunteerRecord {
            id: entity.id,
            first_name: entity.first_name,
            last_name: entity.last_name,
            email: entity.email,
            phone: entity.phone,
            skills: entity.skills,
            is_active: entity.is_active,
            joined_on: entity.joined_on,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AssignmentEntity {
    pub id: Uuid,
    pub event_id: Uuid,
    pub role_id: Uuid,
    pub volunteer_id: Uuid,
    pub status: String,
    pub hours: f64,
    pub assigned_on: NaiveDate,
}

impl AssignmentEntity {
    pub fn into_record(self) -> Result<AssignmentRecord, AdapterError> {
        let status = self
            .status
            .parse::<AssignmentStatus>()
            .map_err(|e| invalid("assignments", self.id, e))?;
        Ok(AssignmentRecord {
            id: self.id,
            event_id: self.event_id,
            role_id: self.role_id,
            volunteer_id: self.volunteer_id,
            status,
            hours: self.hours,
            assigned_on: self.assigned_on,
        })
    }
}
