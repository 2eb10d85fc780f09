#![allow(dead_code)]

use actix_web::cookie::Cookie;
use dashmap::DashMap;
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;

use certgen::auth::{hash_password, SESSION_COOKIE};
use certgen::backend::MemoryBackend;
use certgen::certificate::CertificateRenderer;
use certgen::db::CertGenDb;
use certgen::state::{AdminAccount, AdminStateManager};
use certgen::templates::TemplateCache;

pub const ADMIN_EMAIL: &str = "admin@college.edu";
pub const ADMIN_PASSWORD: &str = "workshop-admin";
pub const BOUNDARY: &str = "certgen-test-boundary";

pub struct TestEnv {
    pub state: Arc<AdminStateManager>,
    pub backend: Arc<MemoryBackend>,
    pub templates: TemplateCache,
}

impl TestEnv {
    pub fn new() -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let db = CertGenDb::new(backend.clone(), backend.clone());
        let admin = AdminAccount {
            email: ADMIN_EMAIL.to_string(),
            password_hash: hash_password(ADMIN_PASSWORD).unwrap(),
            session_hours: 1,
        };
        let state = Arc::new(AdminStateManager::new(
            db,
            Arc::new(CertificateRenderer::new(None)),
            admin,
        ));

        let templates: TemplateCache = Arc::new(DashMap::new());
        templates.insert("admin.html".to_string(), "<!DOCTYPE html><title>admin</title>".to_string());
        templates.insert("login.html".to_string(), "<!DOCTYPE html><title>login</title>".to_string());
        templates.insert("style.css".to_string(), "body {}".to_string());

        Self { state, backend, templates }
    }

    /// A signed-in admin cookie without going through the login route.
    pub fn session_cookie(&self) -> Cookie<'static> {
        let token = self.state.sessions.create_session(None, 1);
        Cookie::new(SESSION_COOKIE, token)
    }
}

pub fn template_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([250, 245, 230, 255]));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

pub fn text_element_json() -> String {
    r##"{"text":"Student Name","x":50,"y":55,"fontSize":32,"color":"#1f2937","fontFamily":"serif"}"##
        .to_string()
}

/// Builds a multipart/form-data body. Returns the content type and the body.
pub fn multipart_body(fields: &[(&str, &str)], files: &[(&str, &str, &str, &[u8])]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes());
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    for (name, file_name, content_type, bytes) in files {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                name, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}

/// Multipart form for the create-workshop route.
pub fn workshop_form(name: &str, template: &[u8]) -> (String, Vec<u8>) {
    let element = text_element_json();
    multipart_body(
        &[
            ("workshopName", name),
            ("resourcePerson", "Dr. Sarah Johnson"),
            ("date", "2024-03-15"),
            ("department", "Computer Science"),
            ("textElement", &element),
        ],
        &[("certificateTemplate", "template.png", "image/png", template)],
    )
}
