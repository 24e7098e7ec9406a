//! Common test utilities for integration tests.
//!
//! Everything runs against the in-memory stores, so no database is needed.

#![allow(dead_code)]

use axum::{body::Body, http::Request, response::Response, Router};
use chrono::NaiveDate;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use std::sync::Arc;
use uuid::Uuid;

use domain::models::{
    AssignmentRecord, AssignmentStatus, EventRecord, EventStatus, RoleRecord, VenueRecord,
    VolunteerRecord,
};
use domain::services::{ArtifactStorage, InMemoryDataSource, ReportStores, VolunteerDataSource};
use persistence::{InMemoryArtifactStorage, InMemoryReportStore};
use reports_api::app::{create_app, AppState};
use reports_api::config::Config;

/// Test configuration built from the embedded defaults.
pub fn test_config() -> Config {
    Config::load_for_test(&[]).expect("test config")
}

/// Application wired to in-memory stores, with handles on the stores and
/// the artifact storage for assertions.
pub struct TestApp {
    pub state: AppState,
    pub stores: ReportStores,
    pub storage: InMemoryArtifactStorage,
}

impl TestApp {
    pub fn new(source: InMemoryDataSource) -> Self {
        Self::with_source(Arc::new(source))
    }

    pub fn empty() -> Self {
        Self::new(InMemoryDataSource::new())
    }

    pub fn with_source(source: Arc<dyn VolunteerDataSource>) -> Self {
        let stores = ReportStores::from_single(Arc::new(InMemoryReportStore::new()));
        let storage = InMemoryArtifactStorage::new();
        let artifacts: Arc<dyn ArtifactStorage> = Arc::new(storage.clone());
        let state = AppState::new(test_config(), stores.clone(), artifacts, source, None);
        Self {
            state,
            stores,
            storage,
        }
    }

    pub fn router(&self) -> Router {
        create_app(self.state.clone())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn fake_volunteer(joined_on: NaiveDate) -> VolunteerRecord {
    VolunteerRecord {
        id: Uuid::new_v4(),
        first_name: FirstName().fake(),
        last_name: LastName().fake(),
        email: SafeEmail().fake(),
        phone: None,
        skills: vec!["first aid".to_string()],
        is_active: true,
        joined_on,
    }
}

/// One venue hosting one event with a single role, staffed by
/// `volunteers` volunteers with one confirmed assignment each.
pub fn staffed_event(volunteers: usize) -> InMemoryDataSource {
    let venue = VenueRecord {
        id: Uuid::new_v4(),
        name: "Riverside Hall".to_string(),
        city: Some("Springfield".to_string()),
        capacity: Some(300),
        is_active: true,
    };
    let event = EventRecord {
        id: Uuid::new_v4(),
        name: "Spring Fair".to_string(),
        venue_id: Some(venue.id),
        start_date: date(2026, 4, 11),
        end_date: date(2026, 4, 12),
        status: EventStatus::Published,
        is_active: true,
    };
    let role = RoleRecord {
        id: Uuid::new_v4(),
        event_id: event.id,
        name: "Steward".to_string(),
        required_volunteers: volunteers as u32 + 2,
        shift_hours: 4.0,
    };
    let people: Vec<VolunteerRecord> = (0..volunteers)
        .map(|_| fake_volunteer(date(2025, 9, 1)))
        .collect();
    let assignments = people
        .iter()
        .map(|v| AssignmentRecord {
            id: Uuid::new_v4(),
            event_id: event.id,
            role_id: role.id,
            volunteer_id: v.id,
            status: AssignmentStatus::Confirmed,
            hours: 4.0,
            assigned_on: date(2026, 3, 1),
        })
        .collect();

    InMemoryDataSource::new()
        .with_venues(vec![venue])
        .with_events(vec![event])
        .with_roles(vec![role])
        .with_volunteers(people)
        .with_assignments(assignments)
}

/// Parse a response body as JSON.
pub async fn parse_response_body(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
}

pub async fn response_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body")
        .to_vec()
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}
