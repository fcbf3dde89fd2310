use std::fmt::Write;

use chrono::NaiveDate;

use crate::error::{AttendanceError, Result};
use crate::models::{
    AttendanceStatus, DailyStatistics, MonthlyReportEntry, StudentWithAttendance,
};

pub fn month_bounds(month: &str) -> Result<(NaiveDate, NaiveDate)> {
    let bytes = month.as_bytes();
    let well_formed = bytes.len() == 7
        && bytes[4] == b'-'
        && bytes[..4].iter().all(|b| b.is_ascii_digit())
        && bytes[5..].iter().all(|b| b.is_ascii_digit());
    if !well_formed {
        return Err(AttendanceError::Validation(format!(
            "invalid month '{month}', expected YYYY-MM"
        )));
    }

    let year: i32 = month[..4]
        .parse()
        .map_err(|_| AttendanceError::Validation(format!("invalid year in '{month}'")))?;
    let month_number: u32 = month[5..]
        .parse()
        .map_err(|_| AttendanceError::Validation(format!("invalid month in '{month}'")))?;

    let start = NaiveDate::from_ymd_opt(year, month_number, 1).ok_or_else(|| {
        AttendanceError::Validation(format!("'{month}' does not name a calendar month"))
    })?;
    let next_month = if month_number == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month_number + 1, 1)
    };
    let end = next_month.and_then(|d| d.pred_opt()).ok_or_else(|| {
        AttendanceError::Validation(format!("'{month}' does not name a calendar month"))
    })?;

    Ok((start, end))
}

pub fn days_in_range(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days() + 1
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn build_monthly_report(
    students: &[StudentWithAttendance],
    total_days: i64,
) -> Vec<MonthlyReportEntry> {
    students
        .iter()
        .map(|entry| {
            let mut present_days = 0i64;
            let mut absent_days = 0i64;
            let mut late_days = 0i64;
            for record in &entry.records {
                match record.status {
                    AttendanceStatus::Present => present_days += 1,
                    AttendanceStatus::Absent => absent_days += 1,
                    AttendanceStatus::Late => late_days += 1,
                }
            }

            let attendance_percentage = if total_days > 0 {
                round2(present_days as f64 / total_days as f64 * 100.0)
            } else {
                0.0
            };

            MonthlyReportEntry {
                student_id: entry.student.student_id.clone(),
                name: entry.student.name.clone(),
                class: entry.student.class.clone(),
                section: entry.student.section.clone(),
                total_days,
                present_days,
                absent_days,
                late_days,
                attendance_percentage,
            }
        })
        .collect()
}

pub fn build_daily_statistics(
    date: NaiveDate,
    total_students: i64,
    present: i64,
    absent: i64,
    late: i64,
    recorded: i64,
) -> DailyStatistics {
    let attendance_percentage = if total_students > 0 {
        round2(present as f64 / total_students as f64 * 100.0)
    } else {
        0.0
    };

    DailyStatistics {
        date,
        total_students,
        present,
        absent,
        late,
        recorded,
        not_recorded: total_students - recorded,
        attendance_percentage,
    }
}

pub fn render_report(month: &str, class: Option<&str>, entries: &[MonthlyReportEntry]) -> String {
    let mut output = String::new();
    let scope = class.unwrap_or("all classes");

    let _ = writeln!(output, "# Monthly Attendance Report");
    let _ = writeln!(output, "Generated for {} ({})", month, scope);
    let _ = writeln!(output);

    if entries.is_empty() {
        let _ = writeln!(output, "No students found for this period.");
        return output;
    }

    for entry in entries {
        let _ = writeln!(
            output,
            "- {} ({}, class {} section {}): {:.2}% over {} days ({} present / {} absent / {} late)",
            entry.name,
            entry.student_id,
            entry.class,
            entry.section,
            entry.attendance_percentage,
            entry.total_days,
            entry.present_days,
            entry.absent_days,
            entry.late_days
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "Total students: {}", entries.len());

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Student;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_student(student_id: &str, class: &str) -> Student {
        Student {
            id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            name: "Avery Lee".to_string(),
            class: class.to_string(),
            section: "A".to_string(),
            photo: None,
        }
    }

    fn sample_record(student: &Student, day: u32, status: AttendanceStatus) -> crate::models::AttendanceRecord {
        crate::models::AttendanceRecord {
            id: Uuid::new_v4(),
            student_id: student.id,
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            status,
            note: None,
            recorded_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn month_bounds_cover_full_month() {
        let (start, end) = month_bounds("2024-01").unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        assert_eq!(days_in_range(start, end), 31);
    }

    #[test]
    fn month_bounds_handle_leap_february() {
        let (_, end) = month_bounds("2024-02").unwrap();
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let (_, end) = month_bounds("2023-02").unwrap();
        assert_eq!(end, NaiveDate::from_ymd_opt(2023, 2, 28).unwrap());
    }

    #[test]
    fn month_bounds_handle_december() {
        let (start, end) = month_bounds("2024-12").unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
    }

    #[test]
    fn month_bounds_reject_malformed_input() {
        for input in ["2024-13", "2024-00", "January", "2024-1", "24-01", "2024/01", ""] {
            assert!(
                matches!(month_bounds(input), Err(AttendanceError::Validation(_))),
                "expected '{input}' to be rejected"
            );
        }
    }

    #[test]
    fn report_percentage_matches_manual_rounding() {
        let student = sample_student("STU-1001", "10");
        let records = vec![
            sample_record(&student, 15, AttendanceStatus::Present),
            sample_record(&student, 16, AttendanceStatus::Present),
        ];
        let students = vec![StudentWithAttendance { student, records }];

        let report = build_monthly_report(&students, 31);
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].present_days, 2);
        assert_eq!(report[0].attendance_percentage, 6.45);
    }

    #[test]
    fn report_counts_every_status() {
        let student = sample_student("STU-1001", "10");
        let records = vec![
            sample_record(&student, 1, AttendanceStatus::Present),
            sample_record(&student, 2, AttendanceStatus::Absent),
            sample_record(&student, 3, AttendanceStatus::Late),
            sample_record(&student, 4, AttendanceStatus::Late),
        ];
        let students = vec![StudentWithAttendance { student, records }];

        let report = build_monthly_report(&students, 31);
        assert_eq!(report[0].present_days, 1);
        assert_eq!(report[0].absent_days, 1);
        assert_eq!(report[0].late_days, 2);
    }

    #[test]
    fn report_percentage_stays_in_bounds() {
        let student = sample_student("STU-1001", "10");
        let records = (1..=31)
            .map(|day| sample_record(&student, day, AttendanceStatus::Present))
            .collect();
        let students = vec![StudentWithAttendance { student, records }];

        let report = build_monthly_report(&students, 31);
        assert_eq!(report[0].attendance_percentage, 100.0);

        let student = sample_student("STU-1002", "10");
        let students = vec![StudentWithAttendance { student, records: Vec::new() }];
        let report = build_monthly_report(&students, 31);
        assert_eq!(report[0].attendance_percentage, 0.0);
    }

    #[test]
    fn report_guards_zero_total_days() {
        let student = sample_student("STU-1001", "10");
        let students = vec![StudentWithAttendance { student, records: Vec::new() }];

        let report = build_monthly_report(&students, 0);
        assert_eq!(report[0].attendance_percentage, 0.0);
    }

    #[test]
    fn daily_statistics_match_two_student_example() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let stats = build_daily_statistics(date, 2, 1, 1, 0, 2);

        assert_eq!(stats.total_students, 2);
        assert_eq!(stats.present, 1);
        assert_eq!(stats.absent, 1);
        assert_eq!(stats.late, 0);
        assert_eq!(stats.recorded, 2);
        assert_eq!(stats.not_recorded, 0);
        assert_eq!(stats.attendance_percentage, 50.0);
    }

    #[test]
    fn daily_statistics_guard_empty_roster() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let stats = build_daily_statistics(date, 0, 0, 0, 0, 0);

        assert_eq!(stats.attendance_percentage, 0.0);
        assert_eq!(stats.not_recorded, 0);
    }

    #[test]
    fn render_lists_every_student() {
        let student = sample_student("STU-1001", "10");
        let students = vec![StudentWithAttendance { student, records: Vec::new() }];
        let entries = build_monthly_report(&students, 31);

        let rendered = render_report("2024-01", Some("10"), &entries);
        assert!(rendered.contains("Avery Lee"));
        assert!(rendered.contains("Total students: 1"));
    }
}
