//! Calendars decide whether a timer may fire at a given instant.
//!
//! Timestamps are milliseconds since the Unix epoch, interpreted in UTC. Both
//! provided calendars are externalizable, so a session's calendars travel
//! through the content strategy like any other user object.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Weekday};

use crate::error::{MarshalError, Result};
use crate::object::{Externalizable, Fact};
use crate::stream::{ObjectInput, ObjectOutput};

pub trait Calendar: Send + Sync + fmt::Debug {
    fn is_time_included(&self, timestamp: i64) -> bool;
}

fn date_of(timestamp: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(timestamp).map(|t| t.date_naive())
}

// ------------- WeeklyCalendar -------------
/// Excludes whole weekdays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WeeklyCalendar {
    excluded: u8, // one bit per weekday, Monday first
}

impl WeeklyCalendar {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn weekend() -> Self {
        Self::new().exclude(Weekday::Sat).exclude(Weekday::Sun)
    }
    pub fn exclude(mut self, day: Weekday) -> Self {
        self.excluded |= 1 << day.num_days_from_monday();
        self
    }
    pub fn is_excluded(&self, day: Weekday) -> bool {
        self.excluded & (1 << day.num_days_from_monday()) != 0
    }
}

impl Calendar for WeeklyCalendar {
    fn is_time_included(&self, timestamp: i64) -> bool {
        date_of(timestamp)
            .map(|date| !self.is_excluded(date.weekday()))
            .unwrap_or(false)
    }
}

impl Fact for WeeklyCalendar {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn externalize(&self) -> Option<Result<Vec<u8>>> {
        Some(self.encode())
    }
    fn as_calendar(&self) -> Option<&dyn Calendar> {
        Some(self)
    }
}

impl Externalizable for WeeklyCalendar {
    const TYPE_NAME: &'static str = "session_marshal.calendar.WeeklyCalendar";
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(vec![self.excluded])
    }
    fn decode(bytes: &[u8]) -> Result<Self> {
        match bytes {
            [excluded] if *excluded < 0x80 => Ok(Self { excluded: *excluded }),
            _ => Err(MarshalError::corrupt("invalid weekly calendar encoding")),
        }
    }
}

// ------------- HolidayCalendar -------------
/// Excludes specific dates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HolidayCalendar {
    excluded: BTreeSet<NaiveDate>,
}

impl HolidayCalendar {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add_excluded_date(&mut self, date: NaiveDate) -> bool {
        self.excluded.insert(date)
    }
    pub fn remove_excluded_date(&mut self, date: &NaiveDate) -> bool {
        self.excluded.remove(date)
    }
    pub fn excluded_dates(&self) -> impl Iterator<Item = &NaiveDate> {
        self.excluded.iter()
    }
}

impl Calendar for HolidayCalendar {
    fn is_time_included(&self, timestamp: i64) -> bool {
        date_of(timestamp)
            .map(|date| !self.excluded.contains(&date))
            .unwrap_or(false)
    }
}

impl Fact for HolidayCalendar {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn externalize(&self) -> Option<Result<Vec<u8>>> {
        Some(self.encode())
    }
    fn as_calendar(&self) -> Option<&dyn Calendar> {
        Some(self)
    }
}

impl Externalizable for HolidayCalendar {
    const TYPE_NAME: &'static str = "session_marshal.calendar.HolidayCalendar";
    fn encode(&self) -> Result<Vec<u8>> {
        let mut out = ObjectOutput::new();
        out.write_len(self.excluded.len())?;
        for date in &self.excluded {
            out.write_i32(date.num_days_from_ce());
        }
        Ok(out.into_inner())
    }
    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut input = ObjectInput::new(bytes);
        let count = input.read_len()?;
        let mut calendar = Self::new();
        for _ in 0..count {
            let days = input.read_i32()?;
            let date = NaiveDate::from_num_days_from_ce_opt(days)
                .ok_or_else(|| MarshalError::corrupt(format!("day {days} is out of range")))?;
            calendar.excluded.insert(date);
        }
        Ok(calendar)
    }
}
