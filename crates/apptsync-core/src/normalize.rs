//! Normalization of raw upstream records.
//!
//! A page is never rejected as a whole: each record either becomes a
//! [`ChangeEvent`] or is dropped with a [`NormalizationDrop`] reason that is
//! logged. Output order matches input order.

use crate::error::NormalizationDrop;
use crate::event::{AppointmentStatus, ChangeEvent, RawChangeRecord};
use chrono::{DateTime, FixedOffset, Local, LocalResult, NaiveDate, NaiveTime, TimeZone};

const DATE_FORMAT: &str = "%m/%d/%Y";
const TIME_FORMAT: &str = "%H:%M";

/// Normalize records, resolving appointment times in the server's local zone.
#[must_use]
pub fn normalize(records: &[RawChangeRecord]) -> Vec<ChangeEvent> {
    normalize_in(records, &Local)
}

/// Normalize records, resolving appointment times in `tz`.
#[must_use]
pub fn normalize_in<Tz: TimeZone>(records: &[RawChangeRecord], tz: &Tz) -> Vec<ChangeEvent> {
    records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| match normalize_record(record, tz) {
            Ok(event) => Some(event),
            Err(reason) => {
                tracing::warn!(
                    index,
                    appointment_id = ?record.appointment_id,
                    event_id = ?record.event_id,
                    %reason,
                    "Dropping change record"
                );
                None
            }
        })
        .collect()
}

/// Normalize a single record.
///
/// # Errors
///
/// Returns the reason the record cannot be forwarded.
pub fn normalize_record<Tz: TimeZone>(
    record: &RawChangeRecord,
    tz: &Tz,
) -> Result<ChangeEvent, NormalizationDrop> {
    let raw_id = record
        .appointment_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(NormalizationDrop::MissingAppointmentId)?;
    let appointment_id = raw_id
        .parse::<i64>()
        .map_err(|_| NormalizationDrop::InvalidAppointmentId(raw_id.to_string()))?;

    let status_code = record
        .status
        .as_deref()
        .ok_or(NormalizationDrop::UnrecognizedStatus(None))?;
    let status = AppointmentStatus::from_code(status_code);
    if !status.is_accepted() {
        return Err(NormalizationDrop::UnrecognizedStatus(record.status.clone()));
    }

    let start_time = start_instant(record.date.as_deref(), record.start_time.as_deref(), tz)?;

    Ok(ChangeEvent {
        appointment_id,
        status,
        status_code: status_code.trim().to_string(),
        start_time,
        event_id: record.event_id.clone(),
        patient_id: record.patient_id.clone(),
        appointment_type: record.appointment_type.clone(),
    })
}

/// Combine an MM/DD/YYYY date and an HH:MM time into an absolute instant.
fn start_instant<Tz: TimeZone>(
    date: Option<&str>,
    time: Option<&str>,
    tz: &Tz,
) -> Result<DateTime<FixedOffset>, NormalizationDrop> {
    let date_str = date.map(str::trim).unwrap_or_default();
    let day = NaiveDate::parse_from_str(date_str, DATE_FORMAT)
        .map_err(|_| NormalizationDrop::MalformedDate(date.map(ToString::to_string)))?;

    let time_str = time.map(str::trim).unwrap_or_default();
    let clock = NaiveTime::parse_from_str(time_str, TIME_FORMAT)
        .map_err(|_| NormalizationDrop::MalformedTime(time.map(ToString::to_string)))?;

    match tz.from_local_datetime(&day.and_time(clock)) {
        LocalResult::Single(instant) | LocalResult::Ambiguous(instant, _) => {
            Ok(instant.fixed_offset())
        }
        LocalResult::None => Err(NormalizationDrop::NonexistentLocalTime {
            date: date_str.to_string(),
            time: time_str.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: &str, status: &str, event_id: &str) -> RawChangeRecord {
        RawChangeRecord {
            appointment_id: Some(id.to_string()),
            status: Some(status.to_string()),
            date: Some("03/14/2025".to_string()),
            start_time: Some("09:30".to_string()),
            event_id: Some(event_id.to_string()),
            patient_id: None,
            appointment_type: None,
        }
    }

    #[test]
    fn unrecognized_status_is_dropped_and_order_preserved() {
        let records = vec![
            record("1", "o", "10"),
            record("2", "x", "11"),
            record("3", "?", "12"),
            record("4", "f", "13"),
            record("5", "o", "14"),
        ];

        let events = normalize_in(&records, &Utc);

        let ids: Vec<i64> = events.iter().map(|e| e.appointment_id).collect();
        assert_eq!(ids, vec![1, 2, 4, 5]);
    }

    #[test]
    fn missing_or_blank_appointment_id_is_dropped() {
        let mut blank = record("", "o", "1");
        blank.appointment_id = Some("  ".to_string());
        let mut missing = record("1", "o", "2");
        missing.appointment_id = None;

        assert_eq!(
            normalize_record(&blank, &Utc),
            Err(NormalizationDrop::MissingAppointmentId)
        );
        assert_eq!(
            normalize_record(&missing, &Utc),
            Err(NormalizationDrop::MissingAppointmentId)
        );
    }

    #[test]
    fn non_integer_appointment_id_is_dropped() {
        assert_eq!(
            normalize_record(&record("A-17", "o", "1"), &Utc),
            Err(NormalizationDrop::InvalidAppointmentId("A-17".to_string()))
        );
    }

    #[test]
    fn malformed_date_and_time_drop_only_that_record() {
        let mut bad_date = record("1", "o", "1");
        bad_date.date = Some("2025-03-14".to_string());
        let mut bad_time = record("2", "o", "2");
        bad_time.start_time = Some("9.30am".to_string());
        let good = record("3", "x", "3");

        let events = normalize_in(&[bad_date.clone(), bad_time.clone(), good], &Utc);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].appointment_id, 3);

        assert!(matches!(
            normalize_record(&bad_date, &Utc),
            Err(NormalizationDrop::MalformedDate(_))
        ));
        assert!(matches!(
            normalize_record(&bad_time, &Utc),
            Err(NormalizationDrop::MalformedTime(_))
        ));
    }

    #[test]
    fn start_time_is_resolved_in_the_given_zone() {
        let eastern = FixedOffset::west_opt(5 * 3600).unwrap();
        let event = normalize_record(&record("42", "x", "101"), &eastern).unwrap();

        assert_eq!(event.start_time.to_rfc3339(), "2025-03-14T09:30:00-05:00");
        assert_eq!(
            event.start_time.with_timezone(&Utc).to_rfc3339(),
            "2025-03-14T14:30:00+00:00"
        );
        assert_eq!(event.status, AppointmentStatus::Cancelled);
        assert_eq!(event.status_code, "x");
        assert_eq!(event.event_id.as_deref(), Some("101"));
    }

    #[test]
    fn passthrough_fields_are_kept() {
        let mut raw = record("7", "f", "9");
        raw.patient_id = Some("3301".to_string());
        raw.appointment_type = Some("NEW PATIENT".to_string());

        let event = normalize_record(&raw, &Utc).unwrap();
        assert_eq!(event.patient_id.as_deref(), Some("3301"));
        assert_eq!(event.appointment_type.as_deref(), Some("NEW PATIENT"));
    }
}
