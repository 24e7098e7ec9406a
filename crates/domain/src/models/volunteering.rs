//! Read-only views of the volunteer management data consumed by reports.
//!
//! These records are owned by the CRUD side of the application. The report
//! engine only reads them through [`crate::services::data_source::VolunteerDataSource`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Draft,
    Published,
    Completed,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "draft",
            EventStatus::Published => "published",
            EventStatus::Completed => "completed",
            EventStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(EventStatus::Draft),
            "published" => Ok(EventStatus::Published),
            "completed" => Ok(EventStatus::Completed),
            "cancelled" | "canceled" => Ok(EventStatus::Cancelled),
            _ => Err(format!("Unknown event status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Confirmed => "confirmed",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Cancelled => "cancelled",
            AssignmentStatus::NoShow => "no_show",
        }
    }

    /// Whether the assignment occupies a slot.
    pub fn is_active(&self) -> bool {
        !matches!(self, AssignmentStatus::Cancelled)
    }
}

impl FromStr for AssignmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(AssignmentStatus::Pending),
            "confirmed" => Ok(AssignmentStatus::Confirmed),
            "completed" => Ok(AssignmentStatus::Completed),
            "cancelled" | "canceled" => Ok(AssignmentStatus::Cancelled),
            "no_show" => Ok(AssignmentStatus::NoShow),
            _ => Err(format!("Unknown assignment status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub name: String,
    pub venue_id: Option<Uuid>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: EventStatus,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueRecord {
    pub id: Uuid,
    pub name: String,
    pub city: Option<String>,
    pub capacity: Option<u32>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub required_volunteers: u32,
    pub shift_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolunteerRecord {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub skills: Vec<String>,
    pub is_active: bool,
    pub joined_on: NaiveDate,
}

impl VolunteerRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub id: Uuid,
    pub event_id: Uuid,
    pub role_id: Uuid,
    pub volunteer_id: Uuid,
    pub status: AssignmentStatus,
    pub hours: f64,
    pub assigned_on: NaiveDate,
}
