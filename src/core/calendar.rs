//! Operating calendar for scheduled withdrawals.
//!
//! Dates are civil dates in the operating timezone, not UTC: a withdrawal requested at
//! 23:30 local on Monday counts "today" as Monday even though it is already Tuesday in UTC.

use crate::{
    config::LedgerSettings,
    errors::{Error, Result},
};
use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementCalendar {
    offset: FixedOffset,
    settlement_time: NaiveTime,
    max_schedule_days: u32,
}

impl SettlementCalendar {
    pub fn new(utc_offset_minutes: i32, settlement_hour: u32, max_schedule_days: u32) -> Result<Self> {
        let offset = utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| Error::Config {
                message: format!("invalid UTC offset of {utc_offset_minutes} minutes"),
            })?;
        let settlement_time =
            NaiveTime::from_hms_opt(settlement_hour, 0, 0).ok_or_else(|| Error::Config {
                message: format!("invalid settlement hour {settlement_hour}"),
            })?;
        if max_schedule_days == 0 {
            return Err(Error::Config {
                message: "max_schedule_days must be at least 1".to_string(),
            });
        }
        Ok(Self {
            offset,
            settlement_time,
            max_schedule_days,
        })
    }

    pub fn from_settings(settings: &LedgerSettings) -> Result<Self> {
        Self::new(
            settings.utc_offset_minutes,
            settings.settlement_hour,
            settings.max_schedule_days,
        )
    }

    /// Civil date of `instant` in the operating timezone.
    #[must_use]
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// Validates `date` against the window `(today, today + max_schedule_days]` and
    /// returns the UTC instant at which the withdrawal becomes due.
    pub fn scheduled_instant(&self, date: NaiveDate, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let today = self.local_date(now);
        if date <= today {
            return Err(Error::validation(
                "scheduled_at",
                format!("{date} must be after today ({today})"),
            ));
        }
        let last_day = today
            .checked_add_days(Days::new(u64::from(self.max_schedule_days)))
            .ok_or_else(|| Error::validation("scheduled_at", "date is out of range"))?;
        if date > last_day {
            return Err(Error::validation(
                "scheduled_at",
                format!(
                    "{date} is more than {} days ahead (last allowed day is {last_day})",
                    self.max_schedule_days
                ),
            ));
        }

        self.offset
            .from_local_datetime(&date.and_time(self.settlement_time))
            .single()
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| Error::validation("scheduled_at", format!("{date} has no settlement instant")))
    }
}
