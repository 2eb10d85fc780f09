use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use crate::api::{
    AttendanceEntry, AttendanceResponse, AttendanceStats, AttendeesResponse, BulkUploadResponse,
    DashboardResponse, ImportPreviewResponse, StudentView,
};
use crate::auth::{verify_password, SessionStore};
use crate::certificate::{CertificateRenderer, TextElement};
use crate::db::CertGenDb;
use crate::error::{AppError, Result};
use crate::models::{NewStudent, NewWorkshop, Student, TemplateUpload, Workshop};
use crate::roster::{branch_display_name, dedupe_by_usn, usn_key, StudentFilter};
use crate::spreadsheet::parse_students;

/// Credentials of the single admin account.
#[derive(Debug, Clone)]
pub struct AdminAccount {
    pub email: String,
    pub password_hash: String,
    pub session_hours: i64,
}

/// Rendered PDF and the file name to download it as.
#[derive(Debug)]
pub struct CertificateFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

pub struct AdminStateManager {
    pub db: CertGenDb,
    pub renderer: Arc<CertificateRenderer>,
    pub sessions: SessionStore,
    admin: AdminAccount,
}

fn file_stem(value: &str) -> String {
    let stem: String = value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    stem.trim_matches('_').to_string()
}

async fn run_blocking<T, F>(job: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| AppError::Internal(format!("Render task failed: {}", e)))?
}

impl AdminStateManager {
    pub fn new(db: CertGenDb, renderer: Arc<CertificateRenderer>, admin: AdminAccount) -> Self {
        Self {
            db,
            renderer,
            sessions: SessionStore::new(),
            admin,
        }
    }

    pub fn authenticate_admin(&self, email: &str, password: &str, ip_address: Option<String>) -> Result<String> {
        if !email.trim().eq_ignore_ascii_case(&self.admin.email)
            || !verify_password(password, &self.admin.password_hash)?
        {
            tracing::warn!("Rejected admin login for {} from {:?}", email, ip_address);
            return Err(AppError::Unauthorized("Invalid credentials".to_string()));
        }
        Ok(self.sessions.create_session(ip_address, self.admin.session_hours))
    }

    pub fn session_hours(&self) -> i64 {
        self.admin.session_hours
    }

    pub async fn dashboard(&self) -> Result<DashboardResponse> {
        let students = self.db.fetch_students().await?;
        let workshops = self.db.fetch_workshops().await?;
        Ok(DashboardResponse {
            total_students: students.len(),
            total_workshops: workshops.len(),
            total_certificates: workshops.iter().map(|w| w.students.len()).sum(),
            current_month: Utc::now().format("%B %Y").to_string(),
        })
    }

    // --- Students ---

    pub async fn list_students(&self, filter: &StudentFilter) -> Result<Vec<StudentView>> {
        let students = self.db.fetch_students().await?;
        Ok(students
            .into_iter()
            .filter(|s| filter.matches(s))
            .map(|student| StudentView {
                branch_display: branch_display_name(&student.branch),
                student,
            })
            .collect())
    }

    pub async fn add_student(&self, student: NewStudent) -> Result<Student> {
        let student = NewStudent {
            student_name: student.student_name.trim().to_string(),
            usn: student.usn.trim().to_string(),
            gender: student.gender.trim().to_string(),
            branch: student.branch.trim().to_string(),
            year: student.year,
        };
        if student.student_name.is_empty() || student.usn.is_empty() {
            return Err(AppError::BadRequest("Student name and USN are required".to_string()));
        }
        let existing = self.db.fetch_students().await?;
        let key = usn_key(&student.usn);
        if existing.iter().any(|s| usn_key(&s.usn) == key) {
            return Err(AppError::DuplicateUsn(student.usn));
        }
        self.db.add_student(&student).await
    }

    pub async fn delete_student(&self, student_id: &str) -> Result<()> {
        self.db.delete_student(student_id).await
    }

    /// Parses an uploaded sheet and drops rows that repeat within the file or
    /// match a stored USN.
    pub async fn preview_import(&self, file_name: &str, bytes: &[u8]) -> Result<ImportPreviewResponse> {
        let parsed = parse_students(file_name, bytes)?;
        let (rows, mut skipped_usns) = dedupe_by_usn(parsed.rows);
        let known: HashSet<String> = self
            .db
            .fetch_students()
            .await?
            .iter()
            .map(|s| usn_key(&s.usn))
            .collect();

        let mut fresh = Vec::with_capacity(rows.len());
        for row in rows {
            if known.contains(&usn_key(&row.usn)) {
                skipped_usns.push(row.usn);
            } else {
                fresh.push(row);
            }
        }
        tracing::info!(
            "Parsed {}: {} new row(s), {} skipped, {} problem(s)",
            file_name,
            fresh.len(),
            skipped_usns.len(),
            parsed.problems.len()
        );
        Ok(ImportPreviewResponse {
            success: true,
            rows: fresh,
            skipped_usns,
            problems: parsed.problems,
        })
    }

    /// Adds rows one at a time; a failed row does not stop the batch.
    pub async fn bulk_upload(&self, rows: Vec<NewStudent>) -> Result<BulkUploadResponse> {
        let (rows, mut skipped_usns) = dedupe_by_usn(rows);
        let mut known: HashSet<String> = self
            .db
            .fetch_students()
            .await?
            .iter()
            .map(|s| usn_key(&s.usn))
            .collect();

        let mut result = BulkUploadResponse::default();
        for row in rows {
            let key = usn_key(&row.usn);
            if key.is_empty() || row.student_name.trim().is_empty() {
                result.failed_usns.push(row.usn);
                continue;
            }
            if known.contains(&key) {
                skipped_usns.push(row.usn);
                continue;
            }
            match self.db.add_student(&row).await {
                Ok(_) => {
                    known.insert(key);
                    result.added += 1;
                }
                Err(e) => {
                    tracing::error!("Failed to add {}: {}", row.student_name, e);
                    result.failed_usns.push(row.usn);
                }
            }
        }
        result.skipped_usns = skipped_usns;
        result.success = result.failed_usns.is_empty();
        Ok(result)
    }

    // --- Workshops ---

    pub async fn create_workshop(&self, workshop: NewWorkshop, template: TemplateUpload) -> Result<Workshop> {
        let required = [
            ("workshop name", &workshop.workshop_name),
            ("resource person", &workshop.resource_person),
            ("department", &workshop.department),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(AppError::BadRequest(format!("Missing {}", field)));
        }
        NaiveDate::parse_from_str(workshop.date.trim(), "%Y-%m-%d")
            .map_err(|_| AppError::BadRequest(format!("Invalid date '{}'", workshop.date)))?;

        let workshop = NewWorkshop {
            text_element: workshop.text_element.normalized()?,
            ..workshop
        };
        // Reject undecodable templates before they reach the bucket
        self.renderer.load_template(&template.bytes, None)?;
        self.db.add_workshop(&workshop, template).await
    }

    pub async fn update_text_element(&self, workshop_id: &str, element: TextElement) -> Result<Workshop> {
        let element = element.normalized()?;
        self.db.get_workshop(workshop_id).await?;
        self.db.update_text_element(workshop_id, &element).await
    }

    /// Replaces the attendance list. Ids are deduplicated in order and must
    /// name known students.
    pub async fn set_attendance(&self, workshop_id: &str, student_ids: Vec<String>) -> Result<Workshop> {
        self.db.get_workshop(workshop_id).await?;
        let known: HashSet<String> = self
            .db
            .fetch_students()
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();

        let mut seen = HashSet::new();
        let mut ids = Vec::with_capacity(student_ids.len());
        for id in student_ids {
            if !known.contains(&id) {
                return Err(AppError::BadRequest(format!("Unknown student {}", id)));
            }
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
        tracing::info!("Workshop {} attendance set to {} student(s)", workshop_id, ids.len());
        self.db.set_workshop_attendance(workshop_id, &ids).await
    }

    pub async fn attendance(&self, workshop_id: &str, filter: &StudentFilter) -> Result<AttendanceResponse> {
        let workshop = self.db.get_workshop(workshop_id).await?;
        let students = self.db.fetch_students().await?;
        let (entries, stats) = attendance_entries(&workshop, students, filter);
        Ok(AttendanceResponse {
            success: true,
            workshop_id: workshop.id,
            entries,
            stats,
        })
    }

    pub async fn attendees(&self, workshop_id: &str, filter: &StudentFilter) -> Result<AttendeesResponse> {
        let workshop = self.db.get_workshop(workshop_id).await?;
        let all = attendee_list(&workshop, self.db.fetch_students().await?);
        let total_attendees = all.len();
        Ok(AttendeesResponse {
            success: true,
            workshop_id: workshop.id,
            total_attendees,
            attendees: all.into_iter().filter(|s| filter.matches(s)).collect(),
        })
    }

    pub async fn delete_workshop(&self, workshop_id: &str) -> Result<()> {
        self.db.delete_workshop(workshop_id).await
    }

    // --- Certificates ---

    /// PNG preview with `name`, the placeholder text when no name is given,
    /// or the bare template when `blank` is set.
    pub async fn preview_certificate(
        &self,
        workshop_id: &str,
        name: Option<String>,
        width: Option<u32>,
        blank: bool,
    ) -> Result<Vec<u8>> {
        let workshop = self.db.get_workshop(workshop_id).await?;
        let element = workshop.text_element()?;
        let template = self.db.fetch_template(&workshop).await?;
        let name = if blank {
            String::new()
        } else {
            name.filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| element.text.clone())
        };
        let renderer = self.renderer.clone();
        run_blocking(move || renderer.render_preview_png(&template, &element, &name, width)).await
    }

    pub async fn student_certificate(&self, workshop_id: &str, student_id: &str) -> Result<CertificateFile> {
        let workshop = self.db.get_workshop(workshop_id).await?;
        let attendees = attendee_list(&workshop, self.db.fetch_students().await?);
        let student = attendees
            .into_iter()
            .find(|s| s.id == student_id)
            .ok_or_else(|| {
                AppError::BadRequest(format!("Student {} did not attend {}", student_id, workshop.workshop_name))
            })?;
        let file_name = format!(
            "{}_{}.pdf",
            file_stem(&student.usn),
            file_stem(&workshop.workshop_name)
        );
        let bytes = self.render_for(&workshop, vec![student.student_name]).await?;
        Ok(CertificateFile { file_name, bytes })
    }

    /// One page per student in the requested order, or every attendee in
    /// roster order when no ids are given.
    pub async fn workshop_certificates(&self, workshop_id: &str, student_ids: Option<Vec<String>>) -> Result<CertificateFile> {
        let workshop = self.db.get_workshop(workshop_id).await?;
        let attendees = attendee_list(&workshop, self.db.fetch_students().await?);

        let names = certificate_names(attendees, student_ids)?;

        let file_name = format!("{}_certificates.pdf", file_stem(&workshop.workshop_name));
        let bytes = self.render_for(&workshop, names).await?;
        Ok(CertificateFile { file_name, bytes })
    }

    async fn render_for(&self, workshop: &Workshop, names: Vec<String>) -> Result<Vec<u8>> {
        let element = workshop.text_element()?;
        let template = self.db.fetch_template(workshop).await?;
        let title = workshop.workshop_name.clone();
        let renderer = self.renderer.clone();
        run_blocking(move || renderer.render_pdf(&title, &template, &element, &names)).await
    }
}

/// Attending students in roster order.
fn attendee_list(workshop: &Workshop, students: Vec<Student>) -> Vec<Student> {
    let attending: HashSet<&str> = workshop.students.iter().map(String::as_str).collect();
    students
        .into_iter()
        .filter(|s| attending.contains(s.id.as_str()))
        .collect()
}

/// Names to print, one per page. Requested ids keep their order and must
/// all be attendees; no ids means every attendee in roster order.
fn certificate_names(attendees: Vec<Student>, student_ids: Option<Vec<String>>) -> Result<Vec<String>> {
    let names: Vec<String> = match student_ids {
        None => attendees.into_iter().map(|s| s.student_name).collect(),
        Some(ids) => {
            let by_id: HashMap<&str, &Student> =
                attendees.iter().map(|s| (s.id.as_str(), s)).collect();
            ids.iter()
                .map(|id| {
                    by_id
                        .get(id.as_str())
                        .map(|s| s.student_name.clone())
                        .ok_or_else(|| AppError::BadRequest(format!("Student {} did not attend", id)))
                })
                .collect::<Result<Vec<String>>>()?
        }
    };
    if names.is_empty() {
        return Err(AppError::BadRequest("No students to generate certificates for".to_string()));
    }
    Ok(names)
}

fn attendance_entries(
    workshop: &Workshop,
    students: Vec<Student>,
    filter: &StudentFilter,
) -> (Vec<AttendanceEntry>, AttendanceStats) {
    let attending: HashSet<&str> = workshop.students.iter().map(String::as_str).collect();
    let entries: Vec<AttendanceEntry> = students
        .into_iter()
        .filter(|s| filter.matches(s))
        .map(|student| AttendanceEntry {
            attended: attending.contains(student.id.as_str()),
            student,
        })
        .collect();
    let total = entries.len();
    let present = entries.iter().filter(|e| e.attended).count();
    (
        entries,
        AttendanceStats {
            present,
            absent: total - present,
            total,
        },
    )
}
