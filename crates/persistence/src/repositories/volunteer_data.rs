//! PostgreSQL implementation of [`VolunteerDataSource`].
//!
//! Records are read in keyset pages ordered by id. The data source is called
//! from blocking export workers, so each page is fetched by blocking on the
//! runtime handle captured at construction.

use std::vec::IntoIter;

use domain::models::{
    AssignmentRecord, EventRecord, ReportParameters, RoleRecord, VenueRecord, VolunteerRecord,
};
use domain::services::{AdapterError, RecordIter, RecordKind, VolunteerDataSource};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::QueryAs;
use sqlx::{FromRow, PgPool, Postgres};
use tokio::runtime::Handle;
use uuid::Uuid;

use crate::entities::{AssignmentEntity, EventEntity, RoleEntity, VenueEntity, VolunteerEntity};
use crate::metrics::QueryTimer;

pub const DEFAULT_PAGE_SIZE: u32 = 500;

struct KindQuery {
    table: &'static str,
    columns: &'static str,
    /// Filter clause using placeholders `$1..=$arity`.
    filter: &'static str,
    arity: usize,
}

fn kind_query(kind: RecordKind) -> KindQuery {
    match kind {
        RecordKind::Events => KindQuery {
            table: "events",
            columns: "id, name, venue_id, start_date, end_date, status, is_active",
            filter: "($1::UUID IS NULL OR id = $1) AND ($2::UUID IS NULL OR venue_id = $2) \
                     AND ($3::DATE IS NULL OR end_date >= $3) AND ($4::DATE IS NULL OR start_date <= $4) \
                     AND ($5 OR is_active)",
            arity: 5,
        },
        RecordKind::Venues => KindQuery {
            table: "venues",
            columns: "id, name, city, capacity, is_active",
            filter: "($1::UUID IS NULL OR id = $1) AND ($2 OR is_active)",
            arity: 2,
        },
        RecordKind::Roles => KindQuery {
            table: "roles",
            columns: "id, event_id, name, required_volunteers, shift_hours",
            filter: "($1::UUID IS NULL OR event_id = $1) AND ($2::UUID IS NULL OR id = $2)",
            arity: 2,
        },
        RecordKind::Volunteers => KindQuery {
            table: "volunteers",
            columns: "id, first_name, last_name, email, phone, skills, is_active, joined_on",
            filter: "($1 OR is_active)",
            arity: 1,
        },
        RecordKind::Assignments => KindQuery {
            table: "assignments",
            columns: "id, event_id, role_id, volunteer_id, status, hours, assigned_on",
            filter: "($1::UUID IS NULL OR event_id = $1) AND ($2::UUID IS NULL OR role_id = $2) \
                     AND ($3::TEXT IS NULL OR status = $3) \
                     AND ($4::DATE IS NULL OR assigned_on >= $4) AND ($5::DATE IS NULL OR assigned_on <= $5)",
            arity: 5,
        },
    }
}

/// Binds the filter values in placeholder order for `kind`.
fn bind_filters<'q, O>(
    query: QueryAs<'q, Postgres, O, PgArguments>,
    kind: RecordKind,
    params: &ReportParameters,
) -> QueryAs<'q, Postgres, O, PgArguments> {
    match kind {
        RecordKind::Events => query
            .bind(params.event_id)
            .bind(params.venue_id)
            .bind(params.date_from)
            .bind(params.date_to)
            .bind(params.include_inactive()),
        RecordKind::Venues => query.bind(params.venue_id).bind(params.include_inactive()),
        RecordKind::Roles => query.bind(params.event_id).bind(params.role_id),
        RecordKind::Volunteers => query.bind(params.include_inactive()),
        RecordKind::Assignments => query
            .bind(params.event_id)
            .bind(params.role_id)
            .bind(params.assignment_status.map(|s| s.as_str()))
            .bind(params.date_from)
            .bind(params.date_to),
    }
}

/// Entities usable as keyset cursor pages.
trait Keyed {
    fn key(&self) -> Uuid;
}

macro_rules! keyed {
    ($($entity:ty),*) => {
        $(impl Keyed for $entity {
            fn key(&self) -> Uuid {
                self.id
            }
        })*
    };
}

keyed!(EventEntity, VenueEntity, RoleEntity, VolunteerEntity, AssignmentEntity);

/// PostgreSQL-backed volunteer data source.
#[derive(Clone)]
pub struct PgVolunteerDataSource {
    pool: PgPool,
    runtime: Handle,
    page_size: u32,
}

impl PgVolunteerDataSource {
    /// Must be called from within a tokio runtime.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            runtime: Handle::current(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn pages<'a, E, T>(
        &'a self,
        kind: RecordKind,
        params: &ReportParameters,
        convert: fn(E) -> Result<T, AdapterError>,
    ) -> RecordIter<'a, T>
    where
        E: for<'r> FromRow<'r, PgRow> + Keyed + Send + Unpin + 'a,
        T: Send + 'a,
    {
        Box::new(KeysetPages {
            source: self,
            kind,
            params: params.clone(),
            after: None,
            buffer: Vec::new().into_iter(),
            done: false,
            convert,
        })
    }
}

struct KeysetPages<'a, E, T> {
    source: &'a PgVolunteerDataSource,
    kind: RecordKind,
    params: ReportParameters,
    after: Option<Uuid>,
    buffer: IntoIter<E>,
    done: bool,
    convert: fn(E) -> Result<T, AdapterError>,
}

impl<'a, E, T> KeysetPages<'a, E, T>
where
    E: for<'r> FromRow<'r, PgRow> + Keyed + Send + Unpin,
{
    fn fetch_page(&self) -> Result<Vec<E>, AdapterError> {
        let query = kind_query(self.kind);
        let sql = format!(
            "SELECT {} FROM {} WHERE {} AND (${}::UUID IS NULL OR id > ${}) ORDER BY id LIMIT ${}",
            query.columns,
            query.table,
            query.filter,
            query.arity + 1,
            query.arity + 1,
            query.arity + 2
        );

        let timer = QueryTimer::new(format!("report_source_{}", query.table));
        let result = self.source.runtime.block_on(
            bind_filters(sqlx::query_as::<_, E>(&sql), self.kind, &self.params)
                .bind(self.after)
                .bind(self.source.page_size as i64)
                .fetch_all(&self.source.pool),
        );
        timer.record();

        result.map_err(|e| AdapterError::Source(format!("{}: {}", query.table, e)))
    }
}

impl<'a, E, T> Iterator for KeysetPages<'a, E, T>
where
    E: for<'r> FromRow<'r, PgRow> + Keyed + Send + Unpin,
{
    type Item = Result<T, AdapterError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entity) = self.buffer.next() {
                return Some((self.convert)(entity));
            }
            if self.done {
                return None;
            }
            match self.fetch_page() {
                Ok(page) => {
                    self.done = page.len() < self.source.page_size as usize;
                    match page.last() {
                        Some(last) => self.after = Some(last.key()),
                        None => return None,
                    }
                    self.buffer = page.into_iter();
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl VolunteerDataSource for PgVolunteerDataSource {
    fn events<'a>(&'a self, params: &ReportParameters) -> Result<RecordIter<'a, EventRecord>, AdapterError> {
        Ok(self.pages(RecordKind::Events, params, EventEntity::into_record))
    }

    fn venues<'a>(&'a self, params: &ReportParameters) -> Result<RecordIter<'a, VenueRecord>, AdapterError> {
        Ok(self.pages(RecordKind::Venues, params, |e: VenueEntity| Ok(e.into())))
    }

    fn roles<'a>(&'a self, params: &ReportParameters) -> Result<RecordIter<'a, RoleRecord>, AdapterError> {
        Ok(self.pages(RecordKind::Roles, params, |e: RoleEntity| Ok(e.into())))
    }

    fn volunteers<'a>(
        &'a self,
        params: &ReportParameters,
    ) -> Result<RecordIter<'a, VolunteerRecord>, AdapterError> {
        Ok(self.pages(RecordKind::Volunteers, params, |e: VolunteerEntity| Ok(e.into())))
    }

    fn assignments<'a>(
        &'a self,
        params: &ReportParameters,
    ) -> Result<RecordIter<'a, AssignmentRecord>, AdapterError> {
        Ok(self.pages(RecordKind::Assignments, params, AssignmentEntity::into_record))
    }

    fn count(&self, kind: RecordKind, params: &ReportParameters) -> Result<Option<u64>, AdapterError> {
        let query = kind_query(kind);
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {}", query.table, query.filter);

        let timer = QueryTimer::new(format!("report_source_count_{}", query.table));
        let result = self.runtime.block_on(
            bind_filters(sqlx::query_as::<_, (i64,)>(&sql), kind, params).fetch_one(&self.pool),
        );
        timer.record();

        let (count,) = result.map_err(|e| AdapterError::Source(format!("{}: {}", query.table, e)))?;
        Ok(Some(count.max(0) as u64))
    }
}
