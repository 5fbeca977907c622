use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::Serialize;

pub const UNKNOWN_SUBJECT: &str = "Unknown Subject";
pub const DEFAULT_MIN_ATTENDANCE: u8 = 75;
pub const DEFAULT_EDIT_WINDOW_HOURS: i64 = 24;

/// Which of the two enrollment schemas a membership came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EnrollmentOrigin {
    /// The single `ClassID` field on older student records.
    Legacy,
    /// An entry in the student's `classes` map.
    Mapping,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub enrolled_on: Option<NaiveDate>,
    pub origin: EnrollmentOrigin,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardianContact {
    pub father_name: String,
    pub mother_name: String,
    pub student_phone: String,
    pub parent_phone: String,
    pub student_email: String,
    pub parent_email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub contact: GuardianContact,
    /// Class id to enrollment, with both schemas already folded in.
    pub enrollments: BTreeMap<String, Enrollment>,
    pub disabled: bool,
}

impl Student {
    pub fn is_enrolled_in(&self, class_id: &str) -> bool {
        self.enrollments.contains_key(class_id)
    }
}

/// Profile fields written by roster uploads. Enrollments are left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentProfile {
    pub id: String,
    pub name: String,
    pub contact: GuardianContact,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    /// Monday-first, no duplicates.
    pub days: Vec<Weekday>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    /// Inclusive date range; both bounds or neither.
    pub validity: Option<(NaiveDate, NaiveDate)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Class {
    pub id: String,
    pub name: String,
    pub subject_name: Option<String>,
    pub teacher_id: Option<String>,
    pub schedule: Schedule,
    pub disabled: bool,
}

impl Class {
    pub fn subject(&self) -> &str {
        self.subject_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(UNKNOWN_SUBJECT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Present" => Some(Self::Present),
            "Absent" => Some(Self::Absent),
            "Late" => Some(Self::Late),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "Present",
            Self::Absent => "Absent",
            Self::Late => "Late",
        }
    }

    /// Late arrivals count as attended.
    pub fn counts_as_present(self) -> bool {
        matches!(self, Self::Present | Self::Late)
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceEntry {
    /// `None` when the stored status is not one we recognise.
    pub status: Option<AttendanceStatus>,
    pub timestamp: Option<i64>,
    pub marked_by: Option<String>,
}

/// date -> class id -> student id -> entry
pub type AttendanceTree = BTreeMap<NaiveDate, BTreeMap<String, BTreeMap<String, AttendanceEntry>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub min_attendance: u8,
    pub edit_window_hours: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            min_attendance: DEFAULT_MIN_ATTENDANCE,
            edit_window_hours: DEFAULT_EDIT_WINDOW_HOURS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceWrite {
    pub date: NaiveDate,
    pub class_id: String,
    pub student_id: String,
    pub status: AttendanceStatus,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub marked_by: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceTotals {
    pub total: u32,
    pub present: u32,
    pub late: u32,
    pub absent: u32,
}

impl AttendanceTotals {
    pub fn record(&mut self, status: AttendanceStatus) {
        self.total += 1;
        if status.counts_as_present() {
            self.present += 1;
        }
        match status {
            AttendanceStatus::Late => self.late += 1,
            AttendanceStatus::Absent => self.absent += 1,
            AttendanceStatus::Present => {}
        }
    }

    pub fn merge(&mut self, other: &AttendanceTotals) {
        self.total += other.total;
        self.present += other.present;
        self.late += other.late;
        self.absent += other.absent;
    }

    /// Nothing held yet reads as full attendance.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.present as f64 / self.total as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectSummary {
    pub subject_name: String,
    #[serde(flatten)]
    pub totals: AttendanceTotals,
    pub percentage: f64,
}

impl SubjectSummary {
    pub fn new(subject_name: String, totals: AttendanceTotals) -> Self {
        Self {
            subject_name,
            percentage: totals.percentage(),
            totals,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentAttendance {
    pub student_id: String,
    pub student_name: String,
    pub subjects: Vec<SubjectSummary>,
    pub overall: AttendanceTotals,
    pub overall_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassDaySummary {
    pub class_id: String,
    pub class_name: String,
    #[serde(flatten)]
    pub totals: AttendanceTotals,
    pub absent_students: Vec<String>,
    /// Whoever made the most recent mark for the class that day.
    pub marked_by: Option<String>,
}
