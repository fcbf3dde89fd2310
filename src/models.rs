use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AttendanceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Late => "late",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = AttendanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            "late" => Ok(Self::Late),
            other => Err(AttendanceError::Validation(format!(
                "unknown attendance status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Student {
    pub id: Uuid,
    /// External student number, unique across the roster.
    pub student_id: String,
    pub name: String,
    pub class: String,
    pub section: String,
    pub photo: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub note: Option<String>,
    pub recorded_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line of a bulk attendance submission, keyed by the external student number.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkEntry {
    pub student_id: String,
    pub status: AttendanceStatus,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StudentWithAttendance {
    pub student: Student,
    pub records: Vec<AttendanceRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyReportEntry {
    pub student_id: String,
    pub name: String,
    pub class: String,
    pub section: String,
    pub total_days: i64,
    pub present_days: i64,
    pub absent_days: i64,
    pub late_days: i64,
    pub attendance_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStatistics {
    pub date: NaiveDate,
    pub total_students: i64,
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    pub recorded: i64,
    pub not_recorded: i64,
    pub attendance_percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeStatistics {
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    pub total: i64,
}

/// Roster listing filter. All fields optional; set fields combine with AND.
#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    pub class: Option<String>,
    pub section: Option<String>,
    pub search: Option<String>,
}

/// Attendance listing filter, keyed by the external student number.
#[derive(Debug, Clone, Default)]
pub struct AttendanceFilter {
    pub date: Option<NaiveDate>,
    pub student_id: Option<String>,
    pub status: Option<AttendanceStatus>,
}

/// One attendance row joined with its student, for listings.
#[derive(Debug, Clone)]
pub struct AttendanceListEntry {
    pub record: AttendanceRecord,
    pub student: Student,
}
