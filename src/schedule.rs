use chrono::{Datelike, NaiveDate};
use uuid::Uuid;

use crate::models::{Class, Schedule};
use crate::snapshot::{parse_clock, parse_days};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("class name is required")]
    MissingName,
    #[error("a teacher must be assigned to the class")]
    MissingTeacher,
    #[error("start time and end time are required (HH:MM)")]
    MissingTimes,
    #[error("end time must be after start time")]
    TimesOutOfOrder,
    #[error("recurring days are required, e.g. \"Mon, Wed, Fri\"")]
    MissingDays,
    #[error("both a start date and an end date must be given, or neither")]
    OneSidedRange,
    #[error("end date {end} must be after start date {start}")]
    RangeOutOfOrder { start: NaiveDate, end: NaiveDate },
}

/// Form input for a new class, as typed by an administrator.
#[derive(Debug, Clone, Default)]
pub struct ClassDraft {
    pub name: String,
    pub subject_name: Option<String>,
    pub teacher_id: Option<String>,
    pub days: String,
    pub start_time: String,
    pub end_time: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl ClassDraft {
    pub fn validate(&self) -> Result<Schedule, ScheduleError> {
        if self.name.trim().is_empty() {
            return Err(ScheduleError::MissingName);
        }
        if self
            .teacher_id
            .as_deref()
            .map_or(true, |id| id.trim().is_empty())
        {
            return Err(ScheduleError::MissingTeacher);
        }

        let (Some(start_time), Some(end_time)) =
            (parse_clock(&self.start_time), parse_clock(&self.end_time))
        else {
            return Err(ScheduleError::MissingTimes);
        };
        if end_time <= start_time {
            return Err(ScheduleError::TimesOutOfOrder);
        }

        let days = parse_days(&self.days);
        if days.is_empty() {
            return Err(ScheduleError::MissingDays);
        }

        let validity = match (self.start_date, self.end_date) {
            (None, None) => None,
            (Some(start), Some(end)) if start >= end => {
                return Err(ScheduleError::RangeOutOfOrder { start, end })
            }
            (Some(start), Some(end)) => Some((start, end)),
            _ => return Err(ScheduleError::OneSidedRange),
        };

        Ok(Schedule {
            days,
            start_time: Some(start_time),
            end_time: Some(end_time),
            validity,
        })
    }

    pub fn into_class(self) -> Result<Class, ScheduleError> {
        let schedule = self.validate()?;
        Ok(Class {
            id: Uuid::new_v4().to_string(),
            name: self.name.trim().to_string(),
            subject_name: self.subject_name.filter(|s| !s.trim().is_empty()),
            teacher_id: self.teacher_id,
            schedule,
            disabled: false,
        })
    }
}

impl Class {
    /// Whether a session of this class is held on `date`.
    pub fn runs_on(&self, date: NaiveDate) -> bool {
        if let Some((start, end)) = self.schedule.validity {
            if date < start || date > end {
                return false;
            }
        }
        self.schedule.days.contains(&date.weekday())
    }
}
