use std::collections::HashMap;
use std::str::FromStr;

use chrono::{Duration, NaiveDate, Utc};
use sqlx::error::DatabaseError;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::error::{AttendanceError, Result};
use crate::models::{
    AttendanceFilter, AttendanceListEntry, AttendanceRecord, AttendanceStatus, BulkEntry,
    RangeStatistics, Student, StudentFilter, StudentWithAttendance,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        (
            Uuid::parse_str("5b1f7a9e-83c4-4e2a-9f06-1d2c8e7b4a31")?,
            "STU-1001",
            "Avery Lee",
            "9",
            "A",
        ),
        (
            Uuid::parse_str("2e9d4c6b-0f5a-47d3-b8e1-6a3c9f2d7e45")?,
            "STU-1002",
            "Jules Moreno",
            "9",
            "A",
        ),
        (
            Uuid::parse_str("c4a8e2f6-1b9d-4073-a5c2-8d6f0e3b9a17")?,
            "STU-1003",
            "Kiara Patel",
            "9",
            "B",
        ),
        (
            Uuid::parse_str("7b7e6c4e-5a51-4f4e-9a3c-2f6d8f1f2a01")?,
            "STU-2001",
            "Mateo Alvarez",
            "10",
            "A",
        ),
        (
            Uuid::parse_str("a1b2c3d4-e5f6-4a5b-8c9d-0e1f2a3b4c5d")?,
            "STU-2002",
            "Noor Haddad",
            "10",
            "B",
        ),
        (
            Uuid::parse_str("f0e1d2c3-b4a5-4968-8776-655443322110")?,
            "STU-2003",
            "Priya Singh",
            "10",
            "B",
        ),
    ];

    for (id, student_id, name, class, section) in students {
        sqlx::query(
            r#"
            INSERT INTO school_attendance.students (id, student_id, name, class, section)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (student_id) DO UPDATE
            SET name = EXCLUDED.name, class = EXCLUDED.class, section = EXCLUDED.section
            "#,
        )
        .bind(id)
        .bind(student_id)
        .bind(name)
        .bind(class)
        .bind(section)
        .execute(pool)
        .await?;
    }

    let recorded_by = Uuid::parse_str("9f0c2b4a-6d8e-4f1a-b3c5-7e9a1d2f4b6c")?;
    let yesterday = Utc::now().date_naive() - Duration::days(1);
    let entries = vec![
        BulkEntry {
            student_id: "STU-1001".to_string(),
            status: AttendanceStatus::Present,
            note: None,
        },
        BulkEntry {
            student_id: "STU-1002".to_string(),
            status: AttendanceStatus::Late,
            note: Some("Bus delay".to_string()),
        },
        BulkEntry {
            student_id: "STU-2001".to_string(),
            status: AttendanceStatus::Absent,
            note: Some("Sick leave".to_string()),
        },
    ];
    record_bulk(pool, yesterday, &entries, recorded_by).await?;

    Ok(())
}

pub async fn resolve_student(conn: &mut PgConnection, student_id: &str) -> Result<Uuid> {
    let row = sqlx::query("SELECT id FROM school_attendance.students WHERE student_id = $1")
        .bind(student_id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok(row.get("id")),
        None => Err(AttendanceError::StudentNotFound(student_id.to_string())),
    }
}

pub async fn upsert_attendance(
    conn: &mut PgConnection,
    student_pk: Uuid,
    date: NaiveDate,
    status: AttendanceStatus,
    note: Option<&str>,
    recorded_by: Uuid,
) -> Result<AttendanceRecord> {
    let row = sqlx::query(
        r#"
        INSERT INTO school_attendance.attendances
        (id, student_id, date, status, note, recorded_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (student_id, date) DO UPDATE
        SET status = EXCLUDED.status, note = EXCLUDED.note,
            recorded_by = EXCLUDED.recorded_by, updated_at = now()
        RETURNING id, student_id, date, status, note, recorded_by, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_pk)
    .bind(date)
    .bind(status.as_str())
    .bind(note)
    .bind(recorded_by)
    .fetch_one(&mut *conn)
    .await
    .map_err(map_write_error)?;

    attendance_from_row(&row)
}

pub async fn record_bulk(
    pool: &PgPool,
    date: NaiveDate,
    entries: &[BulkEntry],
    recorded_by: Uuid,
) -> Result<Vec<AttendanceRecord>> {
    let mut tx = pool.begin().await?;
    let mut records = Vec::with_capacity(entries.len());

    for entry in entries {
        let student_pk = resolve_student(&mut tx, &entry.student_id).await?;
        let record = upsert_attendance(
            &mut tx,
            student_pk,
            date,
            entry.status,
            entry.note.as_deref(),
            recorded_by,
        )
        .await?;
        records.push(record);
    }

    tx.commit().await?;
    Ok(records)
}

pub async fn fetch_students_with_attendance(
    pool: &PgPool,
    start: NaiveDate,
    end: NaiveDate,
    class: Option<&str>,
) -> Result<Vec<StudentWithAttendance>> {
    let mut sql = String::from(
        "SELECT id, student_id, name, class, section, photo \
         FROM school_attendance.students",
    );
    if class.is_some() {
        sql.push_str(" WHERE class = $1");
    }
    sql.push_str(" ORDER BY class, section, name");

    let mut query = sqlx::query(&sql);
    if let Some(class) = class {
        query = query.bind(class);
    }
    let students: Vec<Student> = query
        .fetch_all(pool)
        .await?
        .iter()
        .map(student_from_row)
        .collect();

    let mut sql = String::from(
        "SELECT a.id, a.student_id, a.date, a.status, a.note, a.recorded_by, \
         a.created_at, a.updated_at \
         FROM school_attendance.attendances a \
         WHERE a.date BETWEEN $1 AND $2",
    );
    if class.is_some() {
        sql.push_str(
            " AND a.student_id IN (SELECT id FROM school_attendance.students WHERE class = $3)",
        );
    }

    let mut query = sqlx::query(&sql).bind(start).bind(end);
    if let Some(class) = class {
        query = query.bind(class);
    }

    let mut by_student: HashMap<Uuid, Vec<AttendanceRecord>> = HashMap::new();
    for row in query.fetch_all(pool).await? {
        let record = attendance_from_row(&row)?;
        by_student.entry(record.student_id).or_default().push(record);
    }

    Ok(students
        .into_iter()
        .map(|student| {
            let records = by_student.remove(&student.id).unwrap_or_default();
            StudentWithAttendance { student, records }
        })
        .collect())
}

pub async fn count_students(pool: &PgPool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM school_attendance.students")
        .fetch_one(pool)
        .await?;
    Ok(row.get("count"))
}

pub async fn count_by_status(
    pool: &PgPool,
    date: NaiveDate,
    status: AttendanceStatus,
) -> Result<i64> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS count FROM school_attendance.attendances \
         WHERE date = $1 AND status = $2",
    )
    .bind(date)
    .bind(status.as_str())
    .fetch_one(pool)
    .await?;
    Ok(row.get("count"))
}

pub async fn count_recorded(pool: &PgPool, date: NaiveDate) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM school_attendance.attendances WHERE date = $1")
        .bind(date)
        .fetch_one(pool)
        .await?;
    Ok(row.get("count"))
}

pub async fn count_statuses_in_range(
    pool: &PgPool,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<RangeStatistics> {
    let rows = sqlx::query(
        "SELECT status, COUNT(*) AS count FROM school_attendance.attendances \
         WHERE date BETWEEN $1 AND $2 GROUP BY status",
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    let mut stats = RangeStatistics::default();
    for row in rows {
        let status: String = row.get("status");
        let count: i64 = row.get("count");
        match AttendanceStatus::from_str(&status)? {
            AttendanceStatus::Present => stats.present = count,
            AttendanceStatus::Absent => stats.absent = count,
            AttendanceStatus::Late => stats.late = count,
        }
        stats.total += count;
    }

    Ok(stats)
}

pub async fn list_students(pool: &PgPool, filter: &StudentFilter) -> Result<Vec<Student>> {
    let mut sql = String::from(
        "SELECT id, student_id, name, class, section, photo \
         FROM school_attendance.students WHERE 1 = 1",
    );
    let mut params = 0;
    if filter.class.is_some() {
        params += 1;
        sql.push_str(&format!(" AND class = ${params}"));
    }
    if filter.section.is_some() {
        params += 1;
        sql.push_str(&format!(" AND section = ${params}"));
    }
    if filter.search.is_some() {
        params += 1;
        sql.push_str(&format!(" AND name ILIKE ${params}"));
    }
    sql.push_str(" ORDER BY class, section, name");

    let mut query = sqlx::query(&sql);
    if let Some(class) = &filter.class {
        query = query.bind(class);
    }
    if let Some(section) = &filter.section {
        query = query.bind(section);
    }
    let pattern = filter.search.as_ref().map(|s| format!("%{s}%"));
    if let Some(pattern) = &pattern {
        query = query.bind(pattern);
    }

    let rows = query.fetch_all(pool).await?;
    Ok(rows.iter().map(student_from_row).collect())
}

pub async fn list_attendance(
    pool: &PgPool,
    filter: &AttendanceFilter,
    limit: i64,
) -> Result<Vec<AttendanceListEntry>> {
    let mut sql = String::from(
        "SELECT a.id, a.student_id, a.date, a.status, a.note, a.recorded_by, \
         a.created_at, a.updated_at, \
         s.id AS roster_id, s.student_id AS roster_student_id, s.name, s.class, \
         s.section, s.photo \
         FROM school_attendance.attendances a \
         JOIN school_attendance.students s ON s.id = a.student_id \
         WHERE 1 = 1",
    );
    let mut params = 0;
    if filter.date.is_some() {
        params += 1;
        sql.push_str(&format!(" AND a.date = ${params}"));
    }
    if filter.student_id.is_some() {
        params += 1;
        sql.push_str(&format!(" AND s.student_id = ${params}"));
    }
    if filter.status.is_some() {
        params += 1;
        sql.push_str(&format!(" AND a.status = ${params}"));
    }
    params += 1;
    sql.push_str(&format!(
        " ORDER BY a.date DESC, a.created_at DESC LIMIT ${params}"
    ));

    let mut query = sqlx::query(&sql);
    if let Some(date) = filter.date {
        query = query.bind(date);
    }
    if let Some(student_id) = &filter.student_id {
        query = query.bind(student_id);
    }
    if let Some(status) = filter.status {
        query = query.bind(status.as_str());
    }
    query = query.bind(limit);

    let mut entries = Vec::new();
    for row in query.fetch_all(pool).await? {
        let record = attendance_from_row(&row)?;
        let student = Student {
            id: row.get("roster_id"),
            student_id: row.get("roster_student_id"),
            name: row.get("name"),
            class: row.get("class"),
            section: row.get("section"),
            photo: row.get("photo"),
        };
        entries.push(AttendanceListEntry { record, student });
    }

    Ok(entries)
}

pub async fn list_classes(pool: &PgPool) -> Result<Vec<String>> {
    let rows = sqlx::query("SELECT DISTINCT class FROM school_attendance.students ORDER BY class")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(|row| row.get("class")).collect())
}

fn student_from_row(row: &PgRow) -> Student {
    Student {
        id: row.get("id"),
        student_id: row.get("student_id"),
        name: row.get("name"),
        class: row.get("class"),
        section: row.get("section"),
        photo: row.get("photo"),
    }
}

fn attendance_from_row(row: &PgRow) -> Result<AttendanceRecord> {
    let status: String = row.get("status");
    Ok(AttendanceRecord {
        id: row.get("id"),
        student_id: row.get("student_id"),
        date: row.get("date"),
        status: AttendanceStatus::from_str(&status)?,
        note: row.get("note"),
        recorded_by: row.get("recorded_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn map_write_error(err: sqlx::Error) -> AttendanceError {
    match &err {
        sqlx::Error::Database(db)
            if db.is_unique_violation()
                || db.is_foreign_key_violation()
                || db.is_check_violation() =>
        {
            AttendanceError::Constraint(db.message().to_string())
        }
        _ => AttendanceError::Persistence(err),
    }
}
