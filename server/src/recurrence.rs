//! Expansion of ongoing appointments into calendar occurrences.
//!
//! A stored appointment always yields its own anchor occurrence. An ongoing
//! appointment with both a frequency and an end date additionally yields one
//! occurrence per period, stepping from the previous occurrence, for as long
//! as the occurrence date stays strictly before the end date. Comparisons use
//! calendar dates only; the anchor's time of day is kept on every repeat.

use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime};

use crate::models::{AppointmentOccurrence, Frequency, StoredAppointment, TreatmentType};

/// Upper bound on repeats generated from a single appointment.
///
/// A daily series with a multi-year end date is truncated here; callers that
/// need a longer horizon re-anchor and expand again.
pub const MAX_GENERATED_OCCURRENCES: usize = 100;

impl Frequency {
    /// The next occurrence one period after `current`, or `None` past chrono's range.
    ///
    /// Month and year steps clamp to the last valid day (Jan 31 + 1 month is Feb 28/29).
    pub fn advance(&self, current: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Frequency::Daily => current.checked_add_days(Days::new(1)),
            Frequency::Weekly => current.checked_add_days(Days::new(7)),
            Frequency::Monthly => current.checked_add_months(Months::new(1)),
            Frequency::Yearly => current.checked_add_months(Months::new(12)),
        }
    }
}

/// Expands `appointments` into occurrences for a calendar window.
///
/// Returns nothing when `window_start > window_end`. Otherwise the window is
/// not used for filtering: the caller already selected appointments for it
/// and decides at render time which occurrences to show. Output is unsorted.
pub fn expand(
    appointments: &[StoredAppointment],
    window_start: NaiveDateTime,
    window_end: NaiveDateTime,
) -> Vec<AppointmentOccurrence> {
    if window_start > window_end {
        return Vec::new();
    }

    let mut occurrences = Vec::with_capacity(appointments.len());
    for appointment in appointments {
        occurrences.push(AppointmentOccurrence::anchor(appointment));
        occurrences.extend(repeats(appointment));
    }
    occurrences
}

fn repeats(appointment: &StoredAppointment) -> Vec<AppointmentOccurrence> {
    let (Some(frequency), Some(end_date)) = (appointment.frequency, appointment.end_date) else {
        return Vec::new();
    };
    if appointment.treatment_type != TreatmentType::Ongoing {
        return Vec::new();
    }

    let mut generated = Vec::new();
    let mut current = appointment.start_at;
    for _ in 0..MAX_GENERATED_OCCURRENCES {
        if current.date() >= end_date {
            break;
        }
        let Some(next) = frequency.advance(current) else {
            break;
        };
        if next.date() < end_date {
            generated.push(AppointmentOccurrence::at(
                appointment,
                repeat_id(appointment, next),
                next,
            ));
        }
        current = next;
    }
    generated
}

fn repeat_id(appointment: &StoredAppointment, start_at: NaiveDateTime) -> String {
    format!("{}-{}", appointment.id, start_at.and_utc().timestamp_millis())
}

/// Default calendar fetch window: first day of `today`'s month through the
/// last day of the following month.
pub fn calendar_window(today: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let month_start = today.with_day(1).unwrap_or(today);
    let after_next = month_start
        .checked_add_months(Months::new(2))
        .unwrap_or(NaiveDate::MAX);
    let window_end = after_next.pred_opt().unwrap_or(after_next);

    (
        month_start.and_hms_opt(0, 0, 0).unwrap_or_default(),
        window_end.and_hms_opt(23, 59, 59).unwrap_or_default(),
    )
}

/// Occurrences falling on `day`, in start order.
pub fn on_day(occurrences: &[AppointmentOccurrence], day: NaiveDate) -> Vec<AppointmentOccurrence> {
    let mut matching: Vec<AppointmentOccurrence> = occurrences
        .iter()
        .filter(|o| o.start_at.date() == day)
        .cloned()
        .collect();
    matching.sort_by_key(|o| o.start_at);
    matching
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppointmentStatus;
    use uuid::Uuid;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn appointment(start_at: NaiveDateTime) -> StoredAppointment {
        StoredAppointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            start_at,
            duration_minutes: 45,
            status: AppointmentStatus::Scheduled,
            notes: Some("physio".to_string()),
            cost: Some(250_000.0),
            treatment_type: TreatmentType::OneTime,
            frequency: None,
            end_date: None,
        }
    }

    fn ongoing(start_at: NaiveDateTime, frequency: Frequency, end_date: NaiveDate) -> StoredAppointment {
        StoredAppointment {
            treatment_type: TreatmentType::Ongoing,
            frequency: Some(frequency),
            end_date: Some(end_date),
            ..appointment(start_at)
        }
    }

    fn wide_window() -> (NaiveDateTime, NaiveDateTime) {
        (at(2000, 1, 1, 0, 0), at(2100, 1, 1, 0, 0))
    }

    #[test]
    fn test_one_time_appointment_yields_itself() {
        let apt = appointment(at(2024, 1, 1, 9, 0));
        let (start, end) = wide_window();

        let occurrences = expand(&[apt.clone()], start, end);

        assert_eq!(occurrences.len(), 1);
        assert_eq!(occurrences[0], AppointmentOccurrence::anchor(&apt));
        assert_eq!(occurrences[0].occurrence_id, apt.id.to_string());
        assert_eq!(occurrences[0].notes.as_deref(), Some("physio"));
    }

    #[test]
    fn test_daily_series_stops_before_end_date() {
        let apt = ongoing(at(2024, 1, 1, 9, 0), Frequency::Daily, date(2024, 1, 4));
        let (start, end) = wide_window();

        let occurrences = expand(&[apt], start, end);

        let starts: Vec<NaiveDateTime> = occurrences.iter().map(|o| o.start_at).collect();
        assert_eq!(
            starts,
            vec![at(2024, 1, 1, 9, 0), at(2024, 1, 2, 9, 0), at(2024, 1, 3, 9, 0)]
        );
    }

    #[test]
    fn test_time_of_day_is_ignored_against_end_date() {
        // Late-evening anchor still counts by date only.
        let apt = ongoing(at(2024, 1, 1, 23, 30), Frequency::Daily, date(2024, 1, 3));
        let (start, end) = wide_window();

        let occurrences = expand(&[apt], start, end);

        assert_eq!(occurrences.len(), 2);
        assert_eq!(occurrences[1].start_at, at(2024, 1, 2, 23, 30));
    }

    #[test]
    fn test_weekly_year_produces_one_per_week() {
        let apt = ongoing(at(2024, 1, 1, 10, 0), Frequency::Weekly, date(2025, 1, 1));
        let (start, end) = wide_window();

        let occurrences = expand(&[apt], start, end);

        // Anchor plus 52 weekly repeats, the last on 2024-12-30.
        assert_eq!(occurrences.len(), 53);
        assert_eq!(occurrences.last().unwrap().start_at, at(2024, 12, 30, 10, 0));
        assert!(occurrences.len() <= MAX_GENERATED_OCCURRENCES + 1);
    }

    #[test]
    fn test_generation_is_capped() {
        let apt = ongoing(at(2024, 1, 1, 8, 0), Frequency::Daily, date(2026, 1, 1));
        let (start, end) = wide_window();

        let occurrences = expand(&[apt], start, end);

        assert_eq!(occurrences.len(), MAX_GENERATED_OCCURRENCES + 1);
        assert_eq!(occurrences.last().unwrap().start_at, at(2024, 4, 10, 8, 0));
    }

    #[test]
    fn test_ongoing_without_end_date_is_not_expanded() {
        let mut apt = ongoing(at(2024, 1, 1, 9, 0), Frequency::Daily, date(2024, 2, 1));
        apt.end_date = None;
        let (start, end) = wide_window();

        assert_eq!(expand(&[apt], start, end).len(), 1);
    }

    #[test]
    fn test_ongoing_without_frequency_is_not_expanded() {
        let mut apt = ongoing(at(2024, 1, 1, 9, 0), Frequency::Daily, date(2024, 2, 1));
        apt.frequency = None;
        let (start, end) = wide_window();

        assert_eq!(expand(&[apt], start, end).len(), 1);
    }

    #[test]
    fn test_one_time_with_stray_recurrence_fields_is_not_expanded() {
        let mut apt = ongoing(at(2024, 1, 1, 9, 0), Frequency::Daily, date(2024, 2, 1));
        apt.treatment_type = TreatmentType::OneTime;
        let (start, end) = wide_window();

        assert_eq!(expand(&[apt], start, end).len(), 1);
    }

    #[test]
    fn test_end_date_on_or_before_anchor_yields_only_anchor() {
        let apt = ongoing(at(2024, 3, 5, 9, 0), Frequency::Weekly, date(2024, 3, 5));
        let (start, end) = wide_window();

        assert_eq!(expand(&[apt], start, end).len(), 1);
    }

    #[test]
    fn test_monthly_steps_clamp_to_month_end() {
        let apt = ongoing(at(2024, 1, 31, 14, 0), Frequency::Monthly, date(2024, 5, 1));
        let (start, end) = wide_window();

        let starts: Vec<NaiveDate> = expand(&[apt], start, end)
            .iter()
            .map(|o| o.start_at.date())
            .collect();

        assert_eq!(
            starts,
            vec![date(2024, 1, 31), date(2024, 2, 29), date(2024, 3, 29), date(2024, 4, 29)]
        );
    }

    #[test]
    fn test_yearly_series() {
        let apt = ongoing(at(2020, 6, 15, 9, 0), Frequency::Yearly, date(2023, 6, 16));
        let (start, end) = wide_window();

        let occurrences = expand(&[apt], start, end);

        assert_eq!(occurrences.len(), 4);
        assert_eq!(occurrences[3].start_at, at(2023, 6, 15, 9, 0));
    }

    #[test]
    fn test_repeat_ids_are_distinct_and_derived_from_source() {
        let apt = ongoing(at(2024, 1, 1, 9, 0), Frequency::Daily, date(2024, 1, 10));
        let (start, end) = wide_window();

        let occurrences = expand(&[apt.clone()], start, end);

        let mut ids: Vec<&str> = occurrences.iter().map(|o| o.occurrence_id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), occurrences.len());
        assert!(occurrences
            .iter()
            .all(|o| o.source_id == apt.id && o.occurrence_id.starts_with(&apt.id.to_string())));
    }

    #[test]
    fn test_anchor_outside_window_is_still_emitted() {
        let apt = appointment(at(2023, 12, 31, 9, 0));

        let occurrences = expand(&[apt], at(2024, 1, 1, 0, 0), at(2024, 1, 31, 23, 59));

        assert_eq!(occurrences.len(), 1);
    }

    #[test]
    fn test_inverted_window_yields_nothing() {
        let apt = appointment(at(2024, 1, 1, 9, 0));

        assert!(expand(&[apt], at(2024, 2, 1, 0, 0), at(2024, 1, 1, 0, 0)).is_empty());
        assert!(expand(&[], at(2024, 1, 1, 0, 0), at(2024, 2, 1, 0, 0)).is_empty());
    }

    #[test]
    fn test_calendar_window_spans_two_months() {
        let (start, end) = calendar_window(date(2024, 1, 17));
        assert_eq!(start, at(2024, 1, 1, 0, 0));
        assert_eq!(end, date(2024, 2, 29).and_hms_opt(23, 59, 59).unwrap());

        let (start, end) = calendar_window(date(2024, 12, 5));
        assert_eq!(start, at(2024, 12, 1, 0, 0));
        assert_eq!(end.date(), date(2025, 1, 31));
    }

    #[test]
    fn test_on_day_filters_and_sorts() {
        let early = appointment(at(2024, 1, 2, 8, 0));
        let late = appointment(at(2024, 1, 2, 16, 0));
        let other = appointment(at(2024, 1, 3, 9, 0));
        let (start, end) = wide_window();
        let occurrences = expand(&[late, other, early], start, end);

        let day = on_day(&occurrences, date(2024, 1, 2));

        assert_eq!(day.len(), 2);
        assert!(day[0].start_at < day[1].start_at);
    }
}
