//! Recurring report schedules.
//!
//! A schedule fires at `run_time` in its own fixed UTC offset. Frequencies
//! are calendar-naive day counts: a MONTHLY schedule runs every 30 days, not
//! on the same day of each month.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use super::report_job::ExportFormat;
use super::report_parameters::ReportParameters;
use crate::error::ReportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleFrequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl ScheduleFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleFrequency::Daily => "daily",
            ScheduleFrequency::Weekly => "weekly",
            ScheduleFrequency::Monthly => "monthly",
            ScheduleFrequency::Quarterly => "quarterly",
            ScheduleFrequency::Yearly => "yearly",
        }
    }

    pub fn interval_days(&self) -> i64 {
        match self {
            ScheduleFrequency::Daily => 1,
            ScheduleFrequency::Weekly => 7,
            ScheduleFrequency::Monthly => 30,
            ScheduleFrequency::Quarterly => 90,
            ScheduleFrequency::Yearly => 365,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::days(self.interval_days())
    }
}

impl std::fmt::Display for ScheduleFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(ScheduleFrequency::Daily),
            "weekly" => Ok(ScheduleFrequency::Weekly),
            "monthly" => Ok(ScheduleFrequency::Monthly),
            "quarterly" => Ok(ScheduleFrequency::Quarterly),
            "yearly" => Ok(ScheduleFrequency::Yearly),
            _ => Err(format!("Unknown schedule frequency: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    Paused,
    Disabled,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Active => "active",
            ScheduleStatus::Paused => "paused",
            ScheduleStatus::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ScheduleStatus::Active),
            "paused" => Ok(ScheduleStatus::Paused),
            "disabled" => Ok(ScheduleStatus::Disabled),
            _ => Err(format!("Unknown schedule status: {}", s)),
        }
    }
}

/// Fixed UTC offset a schedule's run time is expressed in.
///
/// Accepts `UTC`, `Z`, `+05:30`, `-0800` and `+02`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScheduleTimezone(FixedOffset);

impl ScheduleTimezone {
    pub fn utc() -> Self {
        Self(Utc.fix())
    }

    pub fn offset(&self) -> FixedOffset {
        self.0
    }

    pub fn offset_seconds(&self) -> i32 {
        self.0.local_minus_utc()
    }
}

impl Default for ScheduleTimezone {
    fn default() -> Self {
        Self::utc()
    }
}

impl FromStr for ScheduleTimezone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("utc") || trimmed.eq_ignore_ascii_case("z") {
            return Ok(Self::utc());
        }

        let invalid = || format!("Invalid timezone offset: {}", s);
        let (sign, rest) = match trimmed.chars().next() {
            Some('+') => (1, &trimmed[1..]),
            Some('-') => (-1, &trimmed[1..]),
            _ => return Err(invalid()),
        };
        let digits: String = rest.chars().filter(|c| *c != ':').collect();
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let (hours, minutes) = match digits.len() {
            2 => (digits.parse::<i32>().map_err(|_| invalid())?, 0),
            4 => (
                digits[..2].parse::<i32>().map_err(|_| invalid())?,
                digits[2..].parse::<i32>().map_err(|_| invalid())?,
            ),
            _ => return Err(invalid()),
        };
        if hours > 14 || minutes > 59 {
            return Err(invalid());
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(Self)
            .ok_or_else(invalid)
    }
}

impl std::fmt::Display for ScheduleTimezone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let seconds = self.offset_seconds();
        if seconds == 0 {
            return f.write_str("UTC");
        }
        let sign = if seconds < 0 { '-' } else { '+' };
        let abs = seconds.abs();
        write!(f, "{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
    }
}

impl TryFrom<String> for ScheduleTimezone {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScheduleTimezone> for String {
    fn from(tz: ScheduleTimezone) -> Self {
        tz.to_string()
    }
}

/// Parses a time of day given as `HH:MM` or `HH:MM:SS`.
pub fn parse_run_time(value: &str) -> Result<NaiveTime, ReportError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value.trim(), "%H:%M:%S"))
        .map_err(|_| ReportError::validation(format!("Invalid run_time: {}", value)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportSchedule {
    pub id: Uuid,
    pub name: String,
    pub frequency: ScheduleFrequency,
    pub template_id: Uuid,
    pub parameter_overrides: ReportParameters,
    pub format_override: Option<ExportFormat>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub run_time: NaiveTime,
    pub timezone: ScheduleTimezone,
    pub status: ScheduleStatus,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub last_job_id: Option<Uuid>,
    pub last_error: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a schedule.
#[derive(Debug, Clone)]
pub struct NewReportSchedule {
    pub name: String,
    pub frequency: ScheduleFrequency,
    pub template_id: Uuid,
    pub parameter_overrides: ReportParameters,
    pub format_override: Option<ExportFormat>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub run_time: NaiveTime,
    pub timezone: ScheduleTimezone,
    pub created_by: Option<Uuid>,
}

impl ReportSchedule {
    /// Creates an ACTIVE schedule whose next run is the first occurrence at
    /// or after `now`.
    pub fn new(input: NewReportSchedule, now: DateTime<Utc>) -> Result<Self, ReportError> {
        if let Some(end) = input.end_date {
            if end < input.start_date {
                return Err(ReportError::validation("end_date must not be before start_date"));
            }
        }
        if input.name.trim().is_empty() {
            return Err(ReportError::validation("Schedule name must not be empty"));
        }

        let mut schedule = Self {
            id: Uuid::new_v4(),
            name: input.name,
            frequency: input.frequency,
            template_id: input.template_id,
            parameter_overrides: input.parameter_overrides,
            format_override: input.format_override,
            start_date: input.start_date,
            end_date: input.end_date,
            run_time: input.run_time,
            timezone: input.timezone,
            status: ScheduleStatus::Active,
            last_run: None,
            next_run: None,
            run_count: 0,
            last_job_id: None,
            last_error: None,
            created_by: input.created_by,
            created_at: now,
            updated_at: now,
        };
        schedule.next_run = Some(schedule.next_occurrence_from(now));
        if schedule.has_ended(now) {
            return Err(ReportError::validation("end_date has already passed"));
        }
        Ok(schedule)
    }

    /// `date` at the schedule's run time, converted to UTC.
    pub fn at_run_time(&self, date: NaiveDate) -> DateTime<Utc> {
        let local = date.and_time(self.run_time);
        Utc.from_utc_datetime(&(local - Duration::seconds(i64::from(self.timezone.offset_seconds()))))
    }

    /// Calendar date of `instant` in the schedule's timezone.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.timezone.offset()).date_naive()
    }

    /// The start date at the run time.
    pub fn first_run(&self) -> DateTime<Utc> {
        self.at_run_time(self.start_date)
    }

    /// Next run derived from the last run (or start date) plus one
    /// frequency interval, never earlier than the first run.
    pub fn calculate_next_run(&self) -> DateTime<Utc> {
        let base = self
            .last_run
            .map(|last| self.local_date(last))
            .unwrap_or(self.start_date);
        let next = self.at_run_time(base + self.frequency.interval());
        next.max(self.first_run())
    }

    /// First occurrence in the schedule's cadence at or after `now`.
    pub fn next_occurrence_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let first = self.first_run();
        if first >= now {
            return first;
        }
        let step = self.frequency.interval_days();
        let elapsed_days = (self.local_date(now) - self.start_date).num_days().max(0);
        let mut k = elapsed_days / step;
        loop {
            let candidate = self.at_run_time(self.start_date + Duration::days(k * step));
            if candidate >= now {
                return candidate;
            }
            k += 1;
        }
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end_date
            .map_or(false, |end| self.local_date(now) > end)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ScheduleStatus::Active
            && self.next_run.map_or(false, |next| next <= now)
            && !self.has_ended(now)
    }

    /// Records an execution at `now`. The next run never moves backwards.
    /// A schedule whose next run falls after its end date is disabled.
    pub fn record_run(&mut self, now: DateTime<Utc>, job_id: Option<Uuid>, error: Option<String>) {
        self.last_run = Some(now);
        self.run_count += 1;
        if job_id.is_some() {
            self.last_job_id = job_id;
        }
        self.last_error = error;
        self.updated_at = now;

        let computed = self.calculate_next_run();
        let next = match self.next_run {
            Some(existing) => computed.max(existing),
            None => computed,
        };
        self.next_run = Some(next);

        if let Some(end) = self.end_date {
            if self.local_date(next) > end {
                self.status = ScheduleStatus::Disabled;
                self.next_run = None;
            }
        }
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<(), ReportError> {
        if self.status != ScheduleStatus::Active {
            return Err(ReportError::validation(format!(
                "Only active schedules can be paused (status: {})",
                self.status
            )));
        }
        self.status = ScheduleStatus::Paused;
        self.updated_at = now;
        Ok(())
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), ReportError> {
        if self.status != ScheduleStatus::Paused {
            return Err(ReportError::validation(format!(
                "Only paused schedules can be resumed (status: {})",
                self.status
            )));
        }
        if self.has_ended(now) {
            return Err(ReportError::validation("Schedule end_date has passed"));
        }
        self.status = ScheduleStatus::Active;
        self.next_run = Some(self.next_occurrence_from(now));
        self.updated_at = now;
        Ok(())
    }

    pub fn disable(&mut self, now: DateTime<Utc>) {
        self.status = ScheduleStatus::Disabled;
        self.next_run = None;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct CreateReportScheduleRequest {
    #[validate(length(min = 1, max = 120, message = "Name must be 1-120 characters"))]
    pub name: String,
    pub frequency: ScheduleFrequency,
    pub template_id: Uuid,
    #[serde(default)]
    pub parameter_overrides: Option<serde_json::Value>,
    pub format_override: Option<ExportFormat>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    #[validate(length(min = 4, max = 8, message = "run_time must be HH:MM or HH:MM:SS"))]
    pub run_time: String,
    pub timezone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn schedule(frequency: ScheduleFrequency, tz: &str) -> ReportSchedule {
        ReportSchedule::new(
            NewReportSchedule {
                name: "Weekly roster".into(),
                frequency,
                template_id: Uuid::new_v4(),
                parameter_overrides: ReportParameters::default(),
                format_override: None,
                start_date: date(2026, 1, 1),
                end_date: None,
                run_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                timezone: tz.parse().unwrap(),
                created_by: None,
            },
            at(2025, 12, 20, 0, 0),
        )
        .unwrap()
    }

    #[test]
    fn test_timezone_parsing() {
        assert_eq!("UTC".parse::<ScheduleTimezone>().unwrap().offset_seconds(), 0);
        assert_eq!("+05:30".parse::<ScheduleTimezone>().unwrap().offset_seconds(), 19800);
        assert_eq!("-0800".parse::<ScheduleTimezone>().unwrap().offset_seconds(), -28800);
        assert_eq!("+02".parse::<ScheduleTimezone>().unwrap().offset_seconds(), 7200);
        assert!("Europe/Paris".parse::<ScheduleTimezone>().is_err());
        assert!("+25:00".parse::<ScheduleTimezone>().is_err());
        assert_eq!("+05:30".parse::<ScheduleTimezone>().unwrap().to_string(), "+05:30");
    }

    #[test]
    fn test_new_schedule_first_run_is_start_date() {
        let s = schedule(ScheduleFrequency::Weekly, "UTC");
        assert_eq!(s.status, ScheduleStatus::Active);
        assert_eq!(s.next_run, Some(at(2026, 1, 1, 9, 0)));
    }

    #[test]
    fn test_weekly_run_advances_seven_days() {
        let mut s = schedule(ScheduleFrequency::Weekly, "UTC");
        let fired = at(2026, 1, 1, 9, 0);
        assert!(s.is_due(fired));
        s.record_run(fired, None, None);
        assert_eq!(s.next_run, Some(at(2026, 1, 8, 9, 0)));
        assert_eq!(s.run_count, 1);
    }

    #[test]
    fn test_daily_next_run_is_pure() {
        let mut s = schedule(ScheduleFrequency::Daily, "UTC");
        s.last_run = Some(at(2026, 2, 10, 9, 0));
        assert_eq!(s.calculate_next_run(), at(2026, 2, 11, 9, 0));
        assert_eq!(s.calculate_next_run(), s.calculate_next_run());
    }

    #[test]
    fn test_next_run_respects_timezone() {
        let mut s = schedule(ScheduleFrequency::Daily, "+05:30");
        assert_eq!(s.first_run(), at(2026, 1, 1, 3, 30));

        // 2026-01-05T20:00Z is already 2026-01-06 in +05:30.
        s.last_run = Some(at(2026, 1, 5, 20, 0));
        assert_eq!(s.calculate_next_run(), at(2026, 1, 7, 3, 30));
    }

    #[test]
    fn test_frequency_intervals() {
        let mut s = schedule(ScheduleFrequency::Quarterly, "UTC");
        s.last_run = Some(at(2026, 1, 1, 9, 0));
        assert_eq!(s.calculate_next_run(), at(2026, 4, 1, 9, 0));

        s.frequency = ScheduleFrequency::Monthly;
        assert_eq!(s.calculate_next_run(), at(2026, 1, 31, 9, 0));
    }

    #[test]
    fn test_next_occurrence_from_keeps_cadence() {
        let s = schedule(ScheduleFrequency::Weekly, "UTC");
        assert_eq!(s.next_occurrence_from(at(2026, 1, 10, 12, 0)), at(2026, 1, 15, 9, 0));
        assert_eq!(s.next_occurrence_from(at(2026, 1, 15, 9, 0)), at(2026, 1, 15, 9, 0));
    }

    #[test]
    fn test_end_date_disables() {
        let mut s = schedule(ScheduleFrequency::Weekly, "UTC");
        s.end_date = Some(date(2026, 1, 5));
        s.record_run(at(2026, 1, 1, 9, 0), None, None);
        assert_eq!(s.status, ScheduleStatus::Disabled);
        assert!(s.next_run.is_none());
        assert!(s.has_ended(at(2026, 1, 6, 0, 0)));
    }

    #[test]
    fn test_pause_resume() {
        let mut s = schedule(ScheduleFrequency::Daily, "UTC");
        s.pause(at(2026, 1, 2, 0, 0)).unwrap();
        assert!(!s.is_due(at(2026, 1, 3, 0, 0)));
        assert!(s.pause(at(2026, 1, 2, 0, 0)).is_err());

        s.resume(at(2026, 1, 3, 10, 0)).unwrap();
        assert_eq!(s.next_run, Some(at(2026, 1, 4, 9, 0)));

        s.disable(at(2026, 1, 3, 10, 0));
        assert!(s.resume(at(2026, 1, 3, 10, 0)).is_err());
    }

    #[test]
    fn test_run_now_does_not_move_next_run_backwards() {
        let mut s = schedule(ScheduleFrequency::Weekly, "UTC");
        s.next_run = Some(at(2026, 3, 1, 9, 0));
        s.record_run(at(2026, 1, 2, 9, 0), None, None);
        assert_eq!(s.next_run, Some(at(2026, 3, 1, 9, 0)));
    }

    #[test]
    fn test_parse_run_time() {
        assert_eq!(parse_run_time("09:00").unwrap(), NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(
            parse_run_time("17:45:30").unwrap(),
            NaiveTime::from_hms_opt(17, 45, 30).unwrap()
        );
        assert!(parse_run_time("9am").is_err());
    }

    #[test]
    fn test_rejects_inverted_dates() {
        let result = ReportSchedule::new(
            NewReportSchedule {
                name: "Bad".into(),
                frequency: ScheduleFrequency::Daily,
                template_id: Uuid::new_v4(),
                parameter_overrides: ReportParameters::default(),
                format_override: None,
                start_date: date(2026, 2, 1),
                end_date: Some(date(2026, 1, 1)),
                run_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                timezone: ScheduleTimezone::utc(),
                created_by: None,
            },
            at(2026, 1, 1, 0, 0),
        );
        assert!(result.is_err());
    }
}
