use std::path::Path;

use chrono::Local;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use tokio_rusqlite::Connection;

use rollcall_core::{FeatureVector, GalleryEntry, GallerySnapshot};

use crate::codec;
use crate::StoreError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS instructors (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name  TEXT NOT NULL,
    last_name   TEXT NOT NULL,
    subject     TEXT NOT NULL,
    email       TEXT NOT NULL UNIQUE,
    created_at  TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS students (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name  TEXT NOT NULL,
    last_name   TEXT NOT NULL,
    email       TEXT NOT NULL UNIQUE,
    photo_path  TEXT,
    encoding    BLOB,
    created_at  TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS sessions (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    instructor_id INTEGER,
    subject       TEXT NOT NULL,
    session_date  DATE NOT NULL,
    start_time    TIME NOT NULL,
    end_time      TIME,
    FOREIGN KEY (instructor_id) REFERENCES instructors(id)
);

CREATE TABLE IF NOT EXISTS attendance (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id    INTEGER NOT NULL,
    student_id    INTEGER NOT NULL,
    check_in_time TIMESTAMP NOT NULL,
    status        TEXT NOT NULL DEFAULT 'present',
    FOREIGN KEY (session_id) REFERENCES sessions(id),
    FOREIGN KEY (student_id) REFERENCES students(id),
    UNIQUE(session_id, student_id)
);
";

/// An enrolled student row; the feature vector itself stays in the blob.
#[derive(Debug, Clone, Serialize)]
pub struct Student {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub photo_path: Option<String>,
    pub has_vector: bool,
    pub created_at: String,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Enrollment parameters for a new student.
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub photo_path: Option<String>,
    pub vector: Option<FeatureVector>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Instructor {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub subject: String,
    pub email: String,
    pub created_at: String,
}

/// A durable class session; attendance records hang off its id.
#[derive(Debug, Clone, Serialize)]
pub struct ClassSession {
    pub id: i64,
    pub instructor_id: Option<i64>,
    pub instructor_name: Option<String>,
    pub subject: String,
    pub session_date: String,
    pub start_time: String,
    pub end_time: Option<String>,
}

/// Outcome of a presence-mark attempt; a repeat mark is a no-op, not an error.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MarkOutcome {
    pub newly_marked: bool,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct SessionStats {
    /// All enrolled students, not scoped to the session.
    pub total: u32,
    pub present: u32,
    pub absent: u32,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceRow {
    pub student_id: i64,
    pub student_name: String,
    pub check_in_time: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StudentStats {
    pub total_sessions: u32,
    pub attended: u32,
    pub absent: u32,
    pub attendance_rate: f64,
}

/// Handle to the attendance database.
///
/// Cheap to clone; all access funnels through one background connection.
#[derive(Clone)]
pub struct AttendanceStore {
    conn: Connection,
}

impl AttendanceStore {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path.to_path_buf()).await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // --- Instructors ---

    pub async fn add_instructor(
        &self,
        first_name: &str,
        last_name: &str,
        subject: &str,
        email: &str,
    ) -> Result<i64, StoreError> {
        let (first_name, last_name, subject, email) = (
            first_name.to_owned(),
            last_name.to_owned(),
            subject.to_owned(),
            email.to_owned(),
        );

        let taken = self.email_taken("instructors", &email).await?;
        if taken {
            return Err(StoreError::DuplicateEmail(email));
        }

        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO instructors (first_name, last_name, subject, email)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![first_name, last_name, subject, email],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        tracing::info!(instructor = id, "instructor added");
        Ok(id)
    }

    pub async fn list_instructors(&self) -> Result<Vec<Instructor>, StoreError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, first_name, last_name, subject, email, created_at
                     FROM instructors ORDER BY last_name",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(Instructor {
                            id: row.get(0)?,
                            first_name: row.get(1)?,
                            last_name: row.get(2)?,
                            subject: row.get(3)?,
                            email: row.get(4)?,
                            created_at: row.get(5)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    // --- Students ---

    pub async fn add_student(&self, new: NewStudent) -> Result<i64, StoreError> {
        let taken = self.email_taken("students", &new.email).await?;
        if taken {
            return Err(StoreError::DuplicateEmail(new.email));
        }

        let blob = new.vector.as_ref().map(codec::encode_vector);
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO students (first_name, last_name, email, photo_path, encoding)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![new.first_name, new.last_name, new.email, new.photo_path, blob],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        tracing::info!(student = id, "student enrolled");
        Ok(id)
    }

    pub async fn student(&self, id: i64) -> Result<Student, StoreError> {
        self.conn
            .call(move |conn| {
                let student = conn
                    .query_row(
                        "SELECT id, first_name, last_name, email, photo_path,
                                encoding IS NOT NULL, created_at
                         FROM students WHERE id = ?1",
                        params![id],
                        student_from_row,
                    )
                    .optional()?;
                Ok(student)
            })
            .await?
            .ok_or(StoreError::StudentNotFound(id))
    }

    pub async fn student_by_email(&self, email: &str) -> Result<Option<Student>, StoreError> {
        let email = email.to_owned();
        let student = self
            .conn
            .call(move |conn| {
                let student = conn
                    .query_row(
                        "SELECT id, first_name, last_name, email, photo_path,
                                encoding IS NOT NULL, created_at
                         FROM students WHERE LOWER(email) = LOWER(?1)",
                        params![email],
                        student_from_row,
                    )
                    .optional()?;
                Ok(student)
            })
            .await?;
        Ok(student)
    }

    pub async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, first_name, last_name, email, photo_path,
                            encoding IS NOT NULL, created_at
                     FROM students ORDER BY last_name",
                )?;
                let rows = stmt
                    .query_map([], student_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    /// Remove a student and their attendance rows; returns the stored photo
    /// path so the caller can clean up the file.
    pub async fn remove_student(&self, id: i64) -> Result<Option<String>, StoreError> {
        let removed = self
            .conn
            .call(move |conn| {
                let photo: Option<Option<String>> = conn
                    .query_row(
                        "SELECT photo_path FROM students WHERE id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(photo) = photo else {
                    return Ok(None);
                };
                conn.execute("DELETE FROM attendance WHERE student_id = ?1", params![id])?;
                conn.execute("DELETE FROM students WHERE id = ?1", params![id])?;
                Ok(Some(photo))
            })
            .await?;
        match removed {
            Some(photo) => {
                tracing::info!(student = id, "student removed");
                Ok(photo)
            }
            None => Err(StoreError::StudentNotFound(id)),
        }
    }

    /// Build a gallery snapshot from every student with a stored vector.
    ///
    /// Corrupt blobs are skipped with a warning rather than failing the
    /// refresh.
    pub async fn load_gallery(&self) -> Result<GallerySnapshot, StoreError> {
        let raw = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, first_name || ' ' || last_name, encoding
                     FROM students WHERE encoding IS NOT NULL ORDER BY id",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Vec<u8>>(2)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let mut vectors = Vec::with_capacity(raw.len());
        let mut entries = Vec::with_capacity(raw.len());
        for (student_id, name, blob) in raw {
            match codec::decode_vector(&blob) {
                Ok(vector) => {
                    vectors.push(vector);
                    entries.push(GalleryEntry { student_id, name });
                }
                Err(e) => {
                    tracing::warn!(student = student_id, error = %e, "skipping corrupt feature blob");
                }
            }
        }
        Ok(GallerySnapshot::new(vectors, entries)?)
    }

    // --- Class sessions ---

    pub async fn create_session(
        &self,
        instructor_id: Option<i64>,
        subject: &str,
        session_date: Option<&str>,
    ) -> Result<i64, StoreError> {
        let subject = subject.to_owned();
        let session_date = session_date
            .map(str::to_owned)
            .unwrap_or_else(|| Local::now().format("%Y-%m-%d").to_string());
        let start_time = Local::now().format("%H:%M:%S").to_string();

        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO sessions (instructor_id, subject, session_date, start_time)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![instructor_id, subject, session_date, start_time],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        tracing::info!(session = id, "class session created");
        Ok(id)
    }

    /// Set the session's end time. Repeating the call just moves the end
    /// time forward.
    pub async fn end_session(&self, id: i64) -> Result<(), StoreError> {
        let end_time = Local::now().format("%H:%M:%S").to_string();
        let updated = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE sessions SET end_time = ?1 WHERE id = ?2",
                    params![end_time, id],
                )?;
                Ok(n)
            })
            .await?;
        if updated == 0 {
            return Err(StoreError::SessionNotFound(id));
        }
        tracing::info!(session = id, "class session ended");
        Ok(())
    }

    pub async fn session(&self, id: i64) -> Result<ClassSession, StoreError> {
        self.conn
            .call(move |conn| {
                let session = conn
                    .query_row(
                        "SELECT s.id, s.instructor_id,
                                i.first_name || ' ' || i.last_name,
                                s.subject, s.session_date, s.start_time, s.end_time
                         FROM sessions s
                         LEFT JOIN instructors i ON s.instructor_id = i.id
                         WHERE s.id = ?1",
                        params![id],
                        session_from_row,
                    )
                    .optional()?;
                Ok(session)
            })
            .await?
            .ok_or(StoreError::SessionNotFound(id))
    }

    pub async fn list_sessions(&self) -> Result<Vec<ClassSession>, StoreError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT s.id, s.instructor_id,
                            i.first_name || ' ' || i.last_name,
                            s.subject, s.session_date, s.start_time, s.end_time
                     FROM sessions s
                     LEFT JOIN instructors i ON s.instructor_id = i.id
                     ORDER BY s.session_date DESC, s.start_time DESC",
                )?;
                let rows = stmt
                    .query_map([], session_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    // --- Attendance ---

    /// Record presence for (session, student) at most once.
    ///
    /// The UNIQUE constraint makes this safe against concurrent callers; a
    /// repeat attempt reports `newly_marked = false`.
    pub async fn mark_attendance(
        &self,
        session_id: i64,
        student_id: i64,
    ) -> Result<MarkOutcome, StoreError> {
        let check_in_time = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let inserted = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "INSERT OR IGNORE INTO attendance (session_id, student_id, check_in_time)
                     VALUES (?1, ?2, ?3)",
                    params![session_id, student_id, check_in_time],
                )?;
                Ok(n)
            })
            .await?;

        let outcome = if inserted > 0 {
            MarkOutcome {
                newly_marked: true,
                message: format!("attendance recorded for student {student_id}"),
            }
        } else {
            MarkOutcome {
                newly_marked: false,
                message: format!("attendance already recorded for student {student_id}"),
            }
        };
        tracing::debug!(
            session = session_id,
            student = student_id,
            newly = outcome.newly_marked,
            "attendance mark"
        );
        Ok(outcome)
    }

    pub async fn session_stats(&self, session_id: i64) -> Result<SessionStats, StoreError> {
        let (total, present) = self
            .conn
            .call(move |conn| {
                let total: u32 =
                    conn.query_row("SELECT COUNT(*) FROM students", [], |row| row.get(0))?;
                let present: u32 = conn.query_row(
                    "SELECT COUNT(*) FROM attendance WHERE session_id = ?1",
                    params![session_id],
                    |row| row.get(0),
                )?;
                Ok((total, present))
            })
            .await?;

        Ok(SessionStats {
            total,
            present,
            absent: total.saturating_sub(present),
            percentage: if total > 0 {
                f64::from(present) / f64::from(total) * 100.0
            } else {
                0.0
            },
        })
    }

    pub async fn session_attendance(
        &self,
        session_id: i64,
    ) -> Result<Vec<AttendanceRow>, StoreError> {
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT a.student_id, s.first_name || ' ' || s.last_name,
                            a.check_in_time, a.status
                     FROM attendance a
                     JOIN students s ON a.student_id = s.id
                     WHERE a.session_id = ?1
                     ORDER BY a.check_in_time",
                )?;
                let rows = stmt
                    .query_map(params![session_id], |row| {
                        Ok(AttendanceRow {
                            student_id: row.get(0)?,
                            student_name: row.get(1)?,
                            check_in_time: row.get(2)?,
                            status: row.get(3)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    /// Render one session's attendance as CSV.
    pub async fn export_csv(&self, session_id: i64) -> Result<String, StoreError> {
        let rows = self.session_attendance(session_id).await?;
        let mut out = String::from("student,check_in_time,status\n");
        for row in rows {
            out.push_str(&format!(
                "{},{},{}\n",
                row.student_name, row.check_in_time, row.status
            ));
        }
        Ok(out)
    }

    pub async fn student_stats(&self, student_id: i64) -> Result<StudentStats, StoreError> {
        let (total_sessions, attended) = self
            .conn
            .call(move |conn| {
                let total: u32 =
                    conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
                let attended: u32 = conn.query_row(
                    "SELECT COUNT(*) FROM attendance WHERE student_id = ?1",
                    params![student_id],
                    |row| row.get(0),
                )?;
                Ok((total, attended))
            })
            .await?;

        Ok(StudentStats {
            total_sessions,
            attended,
            absent: total_sessions.saturating_sub(attended),
            attendance_rate: if total_sessions > 0 {
                f64::from(attended) / f64::from(total_sessions) * 100.0
            } else {
                0.0
            },
        })
    }

    async fn email_taken(&self, table: &'static str, email: &str) -> Result<bool, StoreError> {
        let email = email.to_owned();
        let taken = self
            .conn
            .call(move |conn| {
                let found: Option<i64> = conn
                    .query_row(
                        &format!("SELECT id FROM {table} WHERE LOWER(email) = LOWER(?1)"),
                        params![email],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(found.is_some())
            })
            .await?;
        Ok(taken)
    }
}

fn student_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        photo_path: row.get(4)?,
        has_vector: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ClassSession> {
    Ok(ClassSession {
        id: row.get(0)?,
        instructor_id: row.get(1)?,
        instructor_name: row.get(2)?,
        subject: row.get(3)?,
        session_date: row.get(4)?,
        start_time: row.get(5)?,
        end_time: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreError;

    async fn store() -> AttendanceStore {
        AttendanceStore::open_in_memory().await.unwrap()
    }

    fn new_student(first: &str, last: &str, email: &str, vector: Option<Vec<f32>>) -> NewStudent {
        NewStudent {
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: email.to_string(),
            photo_path: None,
            vector: vector.map(FeatureVector::new),
        }
    }

    #[tokio::test]
    async fn test_mark_attendance_dedup_invariant() {
        let store = store().await;
        let student = store
            .add_student(new_student("Ada", "Lovelace", "ada@example.com", None))
            .await
            .unwrap();
        let session = store.create_session(None, "algebra", None).await.unwrap();

        let first = store.mark_attendance(session, student).await.unwrap();
        assert!(first.newly_marked);

        for _ in 0..3 {
            let repeat = store.mark_attendance(session, student).await.unwrap();
            assert!(!repeat.newly_marked);
            assert_ne!(repeat.message, first.message);
        }

        let stats = store.session_stats(session).await.unwrap();
        assert_eq!(stats.present, 1);
    }

    #[tokio::test]
    async fn test_session_stats_counts_all_enrolled() {
        let store = store().await;
        let a = store
            .add_student(new_student("Ada", "Lovelace", "ada@example.com", None))
            .await
            .unwrap();
        store
            .add_student(new_student("Alan", "Turing", "alan@example.com", None))
            .await
            .unwrap();
        let session = store.create_session(None, "logic", None).await.unwrap();
        store.mark_attendance(session, a).await.unwrap();

        let stats = store.session_stats(session).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.present, 1);
        assert_eq!(stats.absent, 1);
        assert!((stats.percentage - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_session_stats_zero_enrolled() {
        let store = store().await;
        let session = store.create_session(None, "empty", None).await.unwrap();
        let stats = store.session_stats(session).await.unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.percentage, 0.0);
    }

    #[tokio::test]
    async fn test_load_gallery_skips_students_without_vector() {
        let store = store().await;
        let with = store
            .add_student(new_student(
                "Ada",
                "Lovelace",
                "ada@example.com",
                Some(vec![0.25, -1.0]),
            ))
            .await
            .unwrap();
        store
            .add_student(new_student("Alan", "Turing", "alan@example.com", None))
            .await
            .unwrap();

        let gallery = store.load_gallery().await.unwrap();
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery.entries()[0].student_id, with);
        assert_eq!(gallery.entries()[0].name, "Ada Lovelace");
        assert_eq!(gallery.vectors()[0].values, vec![0.25, -1.0]);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = store().await;
        store
            .add_student(new_student("Ada", "Lovelace", "ada@example.com", None))
            .await
            .unwrap();
        let err = store
            .add_student(new_student("Ada", "Byron", "ADA@example.com", None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail(_)));
    }

    #[tokio::test]
    async fn test_end_session_unknown_id() {
        let store = store().await;
        assert!(matches!(
            store.end_session(42).await,
            Err(StoreError::SessionNotFound(42))
        ));
    }

    #[tokio::test]
    async fn test_end_session_sets_end_time() {
        let store = store().await;
        let id = store.create_session(None, "history", None).await.unwrap();
        assert!(store.session(id).await.unwrap().end_time.is_none());
        store.end_session(id).await.unwrap();
        assert!(store.session(id).await.unwrap().end_time.is_some());
    }

    #[tokio::test]
    async fn test_remove_student_cascades_attendance() {
        let store = store().await;
        let student = store
            .add_student(NewStudent {
                photo_path: Some("photos/ada.jpg".into()),
                ..new_student("Ada", "Lovelace", "ada@example.com", None)
            })
            .await
            .unwrap();
        let session = store.create_session(None, "algebra", None).await.unwrap();
        store.mark_attendance(session, student).await.unwrap();

        let photo = store.remove_student(student).await.unwrap();
        assert_eq!(photo.as_deref(), Some("photos/ada.jpg"));
        assert_eq!(store.session_stats(session).await.unwrap().present, 0);
        assert!(matches!(
            store.remove_student(student).await,
            Err(StoreError::StudentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_export_csv_lists_marked_students() {
        let store = store().await;
        let student = store
            .add_student(new_student("Ada", "Lovelace", "ada@example.com", None))
            .await
            .unwrap();
        let session = store.create_session(None, "algebra", None).await.unwrap();
        store.mark_attendance(session, student).await.unwrap();

        let csv = store.export_csv(session).await.unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("student,check_in_time,status"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("Ada Lovelace,"));
        assert!(row.ends_with(",present"));
    }

    #[tokio::test]
    async fn test_student_stats() {
        let store = store().await;
        let student = store
            .add_student(new_student("Ada", "Lovelace", "ada@example.com", None))
            .await
            .unwrap();
        let s1 = store.create_session(None, "a", None).await.unwrap();
        store.create_session(None, "b", None).await.unwrap();
        store.mark_attendance(s1, student).await.unwrap();

        let stats = store.student_stats(student).await.unwrap();
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.attended, 1);
        assert!((stats.attendance_rate - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_instructor_roundtrip() {
        let store = store().await;
        let id = store
            .add_instructor("Grace", "Hopper", "compilers", "grace@example.com")
            .await
            .unwrap();
        let listed = store.list_instructors().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert!(matches!(
            store
                .add_instructor("G", "H", "x", "grace@example.com")
                .await,
            Err(StoreError::DuplicateEmail(_))
        ));
    }

    #[tokio::test]
    async fn test_session_records_instructor_name() {
        let store = store().await;
        let instructor = store
            .add_instructor("Grace", "Hopper", "compilers", "grace@example.com")
            .await
            .unwrap();
        let id = store
            .create_session(Some(instructor), "compilers", Some("2026-01-05"))
            .await
            .unwrap();

        let session = store.session(id).await.unwrap();
        assert_eq!(session.instructor_name.as_deref(), Some("Grace Hopper"));
        assert_eq!(session.session_date, "2026-01-05");
    }
}
