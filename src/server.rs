pub mod handlers {
    use actix_multipart::Multipart;
    use actix_web::{
        cookie::{Cookie, SameSite},
        delete, get, post, put,
        http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, LOCATION},
        web, HttpRequest, HttpResponse,
    };
    use futures_util::TryStreamExt;
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::api::{
        BranchListResponse, BulkUploadRequest, CreateStudentResponse, GenerateCertificatesRequest,
        LoginRequest, LoginResponse, PreviewQuery, SetAttendanceRequest, SetGenericResponse,
        StudentListResponse, UpdateTextElementRequest, WorkshopListResponse, WorkshopResponse,
    };
    use crate::auth::{AdminSession, SESSION_COOKIE};
    use crate::certificate::TextElement;
    use crate::error::AppError;
    use crate::models::{NewStudent, NewWorkshop, TemplateUpload};
    use crate::roster::{unique_branches, StudentFilter};
    use crate::spreadsheet::{roster_csv, template_csv};
    use crate::state::{AdminStateManager, CertificateFile};
    use crate::templates::{get_template_content, TemplateCache};

    type State = web::Data<Arc<AdminStateManager>>;

    const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

    /// Text fields and files of one multipart form.
    #[derive(Default)]
    struct FormParts {
        fields: HashMap<String, String>,
        files: HashMap<String, TemplateUpload>,
    }

    impl FormParts {
        fn text(&self, name: &str) -> String {
            self.fields.get(name).map(|v| v.trim().to_string()).unwrap_or_default()
        }
    }

    async fn read_form(mut payload: Multipart) -> Result<FormParts, AppError> {
        let mut form = FormParts::default();
        let mut total = 0usize;
        while let Some(mut field) = payload.try_next().await.map_err(|e| {
            tracing::error!("Error processing multipart field: {}", e);
            AppError::BadRequest("Invalid multipart data".to_string())
        })? {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field
                .content_disposition()
                .and_then(|cd| cd.get_filename())
                .map(str::to_string);
            let content_type = field
                .content_type()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string());

            let mut bytes = Vec::new();
            while let Some(chunk) = field.try_next().await.map_err(|e| {
                tracing::error!("Error reading field {}: {}", name, e);
                AppError::BadRequest(format!("Error reading field {}", name))
            })? {
                total += chunk.len();
                if total > MAX_UPLOAD_BYTES {
                    return Err(AppError::BadRequest("Upload too large".to_string()));
                }
                bytes.extend_from_slice(&chunk);
            }

            match file_name {
                Some(file_name) => {
                    form.files.insert(name, TemplateUpload { file_name, content_type, bytes });
                }
                None => {
                    let value = String::from_utf8(bytes)
                        .map_err(|_| AppError::BadRequest(format!("Field {} is not valid UTF-8", name)))?;
                    form.fields.insert(name, value);
                }
            }
        }
        Ok(form)
    }

    fn pdf_response(file: CertificateFile) -> HttpResponse {
        HttpResponse::Ok()
            .insert_header((CONTENT_TYPE, "application/pdf"))
            .insert_header((CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", file.file_name)))
            .body(file.bytes)
    }

    fn csv_response(file_name: &str, bytes: Vec<u8>) -> HttpResponse {
        HttpResponse::Ok()
            .insert_header((CONTENT_TYPE, "text/csv; charset=utf-8"))
            .insert_header((CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", file_name)))
            .body(bytes)
    }

    fn html_page(cache: &TemplateCache, name: &str) -> HttpResponse {
        match get_template_content(cache, name) {
            Ok(content) => HttpResponse::Ok()
                .insert_header((CONTENT_TYPE, "text/html; charset=utf-8"))
                .body(content),
            Err(resp) => resp,
        }
    }

    // --- Pages ---

    #[get("/style.css")]
    pub async fn serve_css(cache: web::Data<TemplateCache>) -> HttpResponse {
        match get_template_content(&cache, "style.css") {
            Ok(content) => HttpResponse::Ok().content_type("text/css").body(content),
            Err(resp) => resp,
        }
    }

    #[get("/login")]
    pub async fn login_page(cache: web::Data<TemplateCache>) -> HttpResponse {
        html_page(&cache, "login.html")
    }

    #[get("/")]
    pub async fn admin_page(
        state_manager: State,
        session: Option<AdminSession>,
        cache: web::Data<TemplateCache>,
    ) -> HttpResponse {
        let signed_in = session
            .map(|s| s.validate(&state_manager).is_ok())
            .unwrap_or(false);
        if !signed_in {
            return HttpResponse::Found().insert_header((LOCATION, "/login")).finish();
        }
        html_page(&cache, "admin.html")
    }

    // --- Session ---

    #[post("/api/admin/login")]
    pub async fn admin_login(
        state_manager: State,
        request: web::Json<LoginRequest>,
        req: HttpRequest,
    ) -> HttpResponse {
        let login_req = request.into_inner();
        let ip = req.connection_info().realip_remote_addr().map(|ip| ip.to_string());

        match state_manager.authenticate_admin(&login_req.email, &login_req.password, ip) {
            Ok(session_token) => {
                let cookie = Cookie::build(SESSION_COOKIE, session_token)
                    .path("/")
                    .secure(true)
                    .http_only(true)
                    .same_site(SameSite::Strict)
                    .max_age(time::Duration::hours(state_manager.session_hours()))
                    .finish();
                HttpResponse::Ok().cookie(cookie).json(LoginResponse {
                    success: true,
                    error_message: None,
                })
            }
            Err(AppError::Unauthorized(_)) => HttpResponse::Unauthorized().json(LoginResponse {
                success: false,
                error_message: Some("Invalid email or password".to_string()),
            }),
            Err(e) => {
                tracing::error!("Admin login failed: {:?}", e);
                HttpResponse::InternalServerError().json(LoginResponse {
                    success: false,
                    error_message: Some("Login failed".to_string()),
                })
            }
        }
    }

    #[post("/api/admin/logout")]
    pub async fn admin_logout(state_manager: State, session: AdminSession) -> HttpResponse {
        state_manager.sessions.invalidate_session(&session.session_token);
        let mut expired = Cookie::build(SESSION_COOKIE, "").path("/").finish();
        expired.make_removal();
        HttpResponse::Ok().cookie(expired).json(SetGenericResponse {
            success: true,
            error_message: None,
        })
    }

    #[get("/api/dashboard")]
    pub async fn dashboard(state_manager: State, session: AdminSession) -> Result<HttpResponse, actix_web::Error> {
        session.validate(&state_manager)?;
        Ok(HttpResponse::Ok().json(state_manager.dashboard().await?))
    }

    // --- Students ---

    #[get("/api/students")]
    pub async fn list_students(
        state_manager: State,
        session: AdminSession,
        filter: web::Query<StudentFilter>,
    ) -> Result<HttpResponse, actix_web::Error> {
        session.validate(&state_manager)?;
        let students = state_manager.list_students(&filter).await?;
        Ok(HttpResponse::Ok().json(StudentListResponse {
            success: true,
            total: students.len(),
            students,
        }))
    }

    #[get("/api/students/branches")]
    pub async fn list_branches(state_manager: State, session: AdminSession) -> Result<HttpResponse, actix_web::Error> {
        session.validate(&state_manager)?;
        let students = state_manager.db.fetch_students().await?;
        Ok(HttpResponse::Ok().json(BranchListResponse {
            branches: unique_branches(&students),
        }))
    }

    #[post("/api/students")]
    pub async fn create_student(
        state_manager: State,
        session: AdminSession,
        request: web::Json<NewStudent>,
    ) -> Result<HttpResponse, actix_web::Error> {
        session.validate(&state_manager)?;
        match state_manager.add_student(request.into_inner()).await {
            Ok(student) => Ok(HttpResponse::Created().json(CreateStudentResponse {
                success: true,
                error_message: None,
                student: Some(student),
            })),
            Err(AppError::DuplicateUsn(usn)) => Ok(HttpResponse::Conflict().json(CreateStudentResponse {
                success: false,
                error_message: Some(format!("Student with USN {} already exists.", usn)),
                student: None,
            })),
            Err(e) => Err(e.into()),
        }
    }

    #[delete("/api/students/{id}")]
    pub async fn delete_student(
        state_manager: State,
        session: AdminSession,
        path: web::Path<String>,
    ) -> Result<HttpResponse, actix_web::Error> {
        session.validate(&state_manager)?;
        state_manager.delete_student(&path.into_inner()).await?;
        Ok(HttpResponse::Ok().json(SetGenericResponse {
            success: true,
            error_message: None,
        }))
    }

    #[post("/api/students/import")]
    pub async fn import_students(
        state_manager: State,
        session: AdminSession,
        payload: Multipart,
    ) -> Result<HttpResponse, actix_web::Error> {
        session.validate(&state_manager)?;
        let form = read_form(payload).await?;
        let upload = form
            .files
            .into_values()
            .next()
            .ok_or_else(|| AppError::BadRequest("No spreadsheet uploaded".to_string()))?;
        let preview = state_manager.preview_import(&upload.file_name, &upload.bytes).await?;
        Ok(HttpResponse::Ok().json(preview))
    }

    #[post("/api/students/bulk")]
    pub async fn bulk_upload_students(
        state_manager: State,
        session: AdminSession,
        request: web::Json<BulkUploadRequest>,
    ) -> Result<HttpResponse, actix_web::Error> {
        session.validate(&state_manager)?;
        let result = state_manager.bulk_upload(request.into_inner().students).await?;
        Ok(HttpResponse::Ok().json(result))
    }

    #[get("/api/students/template.csv")]
    pub async fn students_template(state_manager: State, session: AdminSession) -> Result<HttpResponse, actix_web::Error> {
        session.validate(&state_manager)?;
        Ok(csv_response("students_template.csv", template_csv()?))
    }

    #[get("/api/students/export.csv")]
    pub async fn export_students(
        state_manager: State,
        session: AdminSession,
        filter: web::Query<StudentFilter>,
    ) -> Result<HttpResponse, actix_web::Error> {
        session.validate(&state_manager)?;
        let students = state_manager.db.fetch_students().await?;
        let selected: Vec<_> = filter.apply(&students).into_iter().cloned().collect();
        Ok(csv_response("students.csv", roster_csv(&selected)?))
    }

    // --- Workshops ---

    #[get("/api/workshops")]
    pub async fn list_workshops(state_manager: State, session: AdminSession) -> Result<HttpResponse, actix_web::Error> {
        session.validate(&state_manager)?;
        let workshops = state_manager.db.fetch_workshops().await?;
        Ok(HttpResponse::Ok().json(WorkshopListResponse {
            success: true,
            workshops,
        }))
    }

    #[post("/api/workshops")]
    pub async fn create_workshop(
        state_manager: State,
        session: AdminSession,
        payload: Multipart,
    ) -> Result<HttpResponse, actix_web::Error> {
        session.validate(&state_manager)?;
        let mut form = read_form(payload).await?;
        let template = form
            .files
            .remove("certificateTemplate")
            .ok_or_else(|| AppError::BadRequest("Missing certificate template".to_string()))?;
        let text_element: TextElement = serde_json::from_str(&form.text("textElement"))
            .map_err(|e| AppError::BadRequest(format!("Invalid text element: {}", e)))?;

        let workshop = NewWorkshop {
            workshop_name: form.text("workshopName"),
            resource_person: form.text("resourcePerson"),
            date: form.text("date"),
            department: form.text("department"),
            text_element,
        };
        let created = state_manager.create_workshop(workshop, template).await?;
        Ok(HttpResponse::Created().json(WorkshopResponse {
            success: true,
            workshop: created,
        }))
    }

    #[get("/api/workshops/{id}")]
    pub async fn get_workshop(
        state_manager: State,
        session: AdminSession,
        path: web::Path<String>,
    ) -> Result<HttpResponse, actix_web::Error> {
        session.validate(&state_manager)?;
        let workshop = state_manager.db.get_workshop(&path.into_inner()).await?;
        Ok(HttpResponse::Ok().json(WorkshopResponse {
            success: true,
            workshop,
        }))
    }

    #[delete("/api/workshops/{id}")]
    pub async fn delete_workshop(
        state_manager: State,
        session: AdminSession,
        path: web::Path<String>,
    ) -> Result<HttpResponse, actix_web::Error> {
        session.validate(&state_manager)?;
        state_manager.delete_workshop(&path.into_inner()).await?;
        Ok(HttpResponse::Ok().json(SetGenericResponse {
            success: true,
            error_message: None,
        }))
    }

    #[put("/api/workshops/{id}/text_element")]
    pub async fn update_text_element(
        state_manager: State,
        session: AdminSession,
        path: web::Path<String>,
        request: web::Json<UpdateTextElementRequest>,
    ) -> Result<HttpResponse, actix_web::Error> {
        session.validate(&state_manager)?;
        let workshop = state_manager
            .update_text_element(&path.into_inner(), request.into_inner().text_element)
            .await?;
        Ok(HttpResponse::Ok().json(WorkshopResponse {
            success: true,
            workshop,
        }))
    }

    #[get("/api/workshops/{id}/attendance")]
    pub async fn get_attendance(
        state_manager: State,
        session: AdminSession,
        path: web::Path<String>,
        filter: web::Query<StudentFilter>,
    ) -> Result<HttpResponse, actix_web::Error> {
        session.validate(&state_manager)?;
        let attendance = state_manager.attendance(&path.into_inner(), &filter).await?;
        Ok(HttpResponse::Ok().json(attendance))
    }

    #[put("/api/workshops/{id}/attendance")]
    pub async fn set_attendance(
        state_manager: State,
        session: AdminSession,
        path: web::Path<String>,
        request: web::Json<SetAttendanceRequest>,
    ) -> Result<HttpResponse, actix_web::Error> {
        session.validate(&state_manager)?;
        let workshop = state_manager
            .set_attendance(&path.into_inner(), request.into_inner().student_ids)
            .await?;
        Ok(HttpResponse::Ok().json(WorkshopResponse {
            success: true,
            workshop,
        }))
    }

    #[get("/api/workshops/{id}/attendees")]
    pub async fn get_attendees(
        state_manager: State,
        session: AdminSession,
        path: web::Path<String>,
        filter: web::Query<StudentFilter>,
    ) -> Result<HttpResponse, actix_web::Error> {
        session.validate(&state_manager)?;
        let attendees = state_manager.attendees(&path.into_inner(), &filter).await?;
        Ok(HttpResponse::Ok().json(attendees))
    }

    // --- Certificates ---

    #[get("/api/workshops/{id}/preview")]
    pub async fn preview_certificate(
        state_manager: State,
        session: AdminSession,
        path: web::Path<String>,
        query: web::Query<PreviewQuery>,
    ) -> Result<HttpResponse, actix_web::Error> {
        session.validate(&state_manager)?;
        let query = query.into_inner();
        let png = state_manager
            .preview_certificate(&path.into_inner(), query.name, query.width, query.blank)
            .await?;
        Ok(HttpResponse::Ok().content_type("image/png").body(png))
    }

    #[get("/api/workshops/{id}/certificates/{student_id}")]
    pub async fn student_certificate(
        state_manager: State,
        session: AdminSession,
        path: web::Path<(String, String)>,
    ) -> Result<HttpResponse, actix_web::Error> {
        session.validate(&state_manager)?;
        let (workshop_id, student_id) = path.into_inner();
        let file = state_manager.student_certificate(&workshop_id, &student_id).await?;
        Ok(pdf_response(file))
    }

    #[post("/api/workshops/{id}/certificates")]
    pub async fn workshop_certificates(
        state_manager: State,
        session: AdminSession,
        path: web::Path<String>,
        request: Option<web::Json<GenerateCertificatesRequest>>,
    ) -> Result<HttpResponse, actix_web::Error> {
        session.validate(&state_manager)?;
        let request = request.map(|r| r.into_inner()).unwrap_or_default();
        let file = state_manager
            .workshop_certificates(&path.into_inner(), request.student_ids)
            .await?;
        Ok(pdf_response(file))
    }

    /// Registers every route on an app or scope.
    pub fn configure(cfg: &mut web::ServiceConfig) {
        cfg.service(serve_css)
            .service(login_page)
            .service(admin_page)
            .service(admin_login)
            .service(admin_logout)
            .service(dashboard)
            // Fixed student paths before the {id} route
            .service(list_branches)
            .service(students_template)
            .service(export_students)
            .service(import_students)
            .service(bulk_upload_students)
            .service(list_students)
            .service(create_student)
            .service(delete_student)
            .service(list_workshops)
            .service(create_workshop)
            .service(get_workshop)
            .service(delete_workshop)
            .service(update_text_element)
            .service(get_attendance)
            .service(set_attendance)
            .service(get_attendees)
            .service(preview_certificate)
            .service(student_certificate)
            .service(workshop_certificates);
    }
}
