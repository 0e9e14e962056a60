use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{AppointmentStatus, Revenue, RevenueStatus, StoredAppointment};

pub const DAILY_WINDOW_DAYS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub amount: f64,
}

/// Dashboard totals over revenue rows and appointment costs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueSummary {
    pub total: f64,
    pub completed: f64,
    pub pending: f64,
    pub estimated: f64,
    pub daily: Vec<DailyRevenue>,
}

impl RevenueSummary {
    pub fn compute(revenue: &[Revenue], appointments: &[StoredAppointment], today: NaiveDate) -> Self {
        let revenue_total: f64 = revenue.iter().map(|r| r.amount).sum();
        let revenue_completed = sum_with_status(revenue, RevenueStatus::Completed);
        let pending = sum_with_status(revenue, RevenueStatus::Pending);

        let appointments_completed: f64 = appointments
            .iter()
            .filter(|a| a.status == AppointmentStatus::Completed)
            .filter_map(|a| a.cost)
            .sum();
        let appointments_expected: f64 = appointments
            .iter()
            .filter(|a| a.status != AppointmentStatus::Cancelled)
            .filter_map(|a| a.cost)
            .sum();

        Self {
            total: revenue_total + appointments_completed,
            completed: revenue_completed + appointments_completed,
            pending,
            estimated: revenue_completed + appointments_expected,
            daily: daily_series(revenue, today),
        }
    }
}

fn sum_with_status(revenue: &[Revenue], status: RevenueStatus) -> f64 {
    revenue
        .iter()
        .filter(|r| r.status == status)
        .map(|r| r.amount)
        .sum()
}

/// Per-day sums for the 30 days ending at `today`, oldest first. Days with
/// nothing positive are left out.
pub fn daily_series(revenue: &[Revenue], today: NaiveDate) -> Vec<DailyRevenue> {
    let first = today
        .checked_sub_days(Days::new(DAILY_WINDOW_DAYS - 1))
        .unwrap_or(NaiveDate::MIN);

    let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for row in revenue {
        if row.transaction_date >= first && row.transaction_date <= today {
            *by_day.entry(row.transaction_date).or_default() += row.amount;
        }
    }

    by_day
        .into_iter()
        .filter(|(_, amount)| *amount > 0.0)
        .map(|(date, amount)| DailyRevenue { date, amount })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TreatmentType;
    use uuid::Uuid;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(amount: f64, status: RevenueStatus, date: NaiveDate) -> Revenue {
        Revenue {
            id: Uuid::new_v4(),
            amount,
            payment_method: "cash".to_string(),
            status,
            transaction_date: date,
            notes: None,
            appointment_id: None,
        }
    }

    fn appointment(status: AppointmentStatus, cost: Option<f64>) -> StoredAppointment {
        StoredAppointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            start_at: day(2024, 5, 1).and_hms_opt(9, 0, 0).unwrap(),
            duration_minutes: 30,
            status,
            notes: None,
            cost,
            treatment_type: TreatmentType::OneTime,
            frequency: None,
            end_date: None,
        }
    }

    #[test]
    fn test_summary_totals() {
        let today = day(2024, 5, 20);
        let revenue = vec![
            row(100.0, RevenueStatus::Completed, today),
            row(40.0, RevenueStatus::Pending, today),
            row(10.0, RevenueStatus::Cancelled, today),
        ];
        let appointments = vec![
            appointment(AppointmentStatus::Completed, Some(50.0)),
            appointment(AppointmentStatus::Scheduled, Some(25.0)),
            appointment(AppointmentStatus::Cancelled, Some(99.0)),
            appointment(AppointmentStatus::Completed, None),
        ];

        let summary = RevenueSummary::compute(&revenue, &appointments, today);

        assert_eq!(summary.total, 200.0);
        assert_eq!(summary.completed, 150.0);
        assert_eq!(summary.pending, 40.0);
        assert_eq!(summary.estimated, 175.0);
    }

    #[test]
    fn test_daily_series_window_and_positive_days() {
        let today = day(2024, 5, 30);
        let revenue = vec![
            row(10.0, RevenueStatus::Completed, day(2024, 5, 1)),
            row(20.0, RevenueStatus::Completed, day(2024, 4, 30)),
            row(5.0, RevenueStatus::Pending, day(2024, 5, 30)),
            row(7.0, RevenueStatus::Completed, day(2024, 5, 30)),
            row(0.0, RevenueStatus::Completed, day(2024, 5, 15)),
            row(3.0, RevenueStatus::Completed, day(2024, 6, 1)),
        ];

        let daily = daily_series(&revenue, today);

        assert_eq!(
            daily,
            vec![
                DailyRevenue {
                    date: day(2024, 5, 1),
                    amount: 10.0
                },
                DailyRevenue {
                    date: day(2024, 5, 30),
                    amount: 12.0
                },
            ]
        );
    }

    #[test]
    fn test_empty_summary() {
        let summary = RevenueSummary::compute(&[], &[], day(2024, 1, 1));
        assert_eq!(summary.total, 0.0);
        assert!(summary.daily.is_empty());
    }
}
