use serde::{Deserialize, Serialize};

use crate::certificate::TextElement;
use crate::models::{NewStudent, Student, Workshop};

#[derive(Debug, Serialize)]
pub struct SetGenericResponse {
    pub success: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub total_students: usize,
    pub total_workshops: usize,
    pub total_certificates: usize,
    pub current_month: String,
}

/// Student row with its department's display name.
#[derive(Debug, Serialize)]
pub struct StudentView {
    #[serde(flatten)]
    pub student: Student,
    pub branch_display: String,
}

#[derive(Debug, Serialize)]
pub struct StudentListResponse {
    pub success: bool,
    pub students: Vec<StudentView>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct CreateStudentResponse {
    pub success: bool,
    pub error_message: Option<String>,
    pub student: Option<Student>,
}

#[derive(Debug, Serialize)]
pub struct BranchListResponse {
    pub branches: Vec<String>,
}

/// Parsed spreadsheet rows waiting to be uploaded.
#[derive(Debug, Serialize)]
pub struct ImportPreviewResponse {
    pub success: bool,
    pub rows: Vec<NewStudent>,
    /// USNs dropped because they repeat inside the file or already exist.
    pub skipped_usns: Vec<String>,
    pub problems: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkUploadRequest {
    pub students: Vec<NewStudent>,
}

#[derive(Debug, Default, Serialize)]
pub struct BulkUploadResponse {
    pub success: bool,
    pub added: usize,
    pub skipped_usns: Vec<String>,
    pub failed_usns: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct WorkshopListResponse {
    pub success: bool,
    pub workshops: Vec<Workshop>,
}

#[derive(Debug, Serialize)]
pub struct WorkshopResponse {
    pub success: bool,
    pub workshop: Workshop,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTextElementRequest {
    pub text_element: TextElement,
}

#[derive(Debug, Deserialize)]
pub struct SetAttendanceRequest {
    pub student_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AttendanceEntry {
    pub student: Student,
    pub attended: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttendanceStats {
    pub present: usize,
    pub absent: usize,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct AttendanceResponse {
    pub success: bool,
    pub workshop_id: String,
    pub entries: Vec<AttendanceEntry>,
    pub stats: AttendanceStats,
}

#[derive(Debug, Serialize)]
pub struct AttendeesResponse {
    pub success: bool,
    pub workshop_id: String,
    /// Attendee count before filtering.
    pub total_attendees: usize,
    pub attendees: Vec<Student>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    pub name: Option<String>,
    pub width: Option<u32>,
    /// Template only, with no name drawn.
    #[serde(default)]
    pub blank: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateCertificatesRequest {
    /// Students to include, in page order. All attendees when absent.
    pub student_ids: Option<Vec<String>>,
}
