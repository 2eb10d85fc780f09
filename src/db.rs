use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::backend::{Collection, DocumentStore, FileStore};
use crate::certificate::TextElement;
use crate::error::{AppError, Result, TraceErr};
use crate::models::{NewStudent, NewWorkshop, Student, TemplateUpload, Workshop};

fn into_fields<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(AppError::Internal(format!("Expected object, got {}", other))),
    }
}

/// Typed access to the students and workshops collections and the
/// template bucket.
#[derive(Clone)]
pub struct CertGenDb {
    documents: Arc<dyn DocumentStore>,
    files: Arc<dyn FileStore>,
}

impl CertGenDb {
    pub fn new(documents: Arc<dyn DocumentStore>, files: Arc<dyn FileStore>) -> Self {
        Self { documents, files }
    }

    pub async fn add_student(&self, student: &NewStudent) -> Result<Student> {
        let doc = self
            .documents
            .create_document(Collection::Students, into_fields(student)?)
            .await
            .trace_err("add_student")?;
        tracing::info!("Added student {} ({})", student.student_name, student.usn);
        Ok(serde_json::from_value(doc)?)
    }

    pub async fn delete_student(&self, student_id: &str) -> Result<()> {
        self.documents
            .delete_document(Collection::Students, student_id)
            .await
            .trace_err("delete_student")
    }

    pub async fn fetch_students(&self) -> Result<Vec<Student>> {
        let docs = self.documents.list_documents(Collection::Students).await?;
        docs.into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(AppError::from))
            .collect()
    }

    /// Uploads the template first, then creates the workshop document
    /// pointing at it.
    pub async fn add_workshop(&self, workshop: &NewWorkshop, template: TemplateUpload) -> Result<Workshop> {
        let stored = self
            .files
            .upload_file(&template.file_name, &template.content_type, template.bytes)
            .await
            .trace_err("upload template")?;

        let data = json!({
            "workshopName": workshop.workshop_name,
            "resourcePerson": workshop.resource_person,
            "date": workshop.date,
            "organizedDepartment": workshop.department,
            "certificateTemplate": stored.view_url,
            "textElement": serde_json::to_string(&workshop.text_element)?,
            "students": Vec::<String>::new(),
        });
        let doc = self
            .documents
            .create_document(Collection::Workshops, into_fields(&data)?)
            .await
            .trace_err("add_workshop")?;
        tracing::info!("Added workshop {}", workshop.workshop_name);
        Ok(serde_json::from_value(doc)?)
    }

    pub async fn fetch_workshops(&self) -> Result<Vec<Workshop>> {
        let docs = self.documents.list_documents(Collection::Workshops).await?;
        docs.into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(AppError::from))
            .collect()
    }

    pub async fn get_workshop(&self, workshop_id: &str) -> Result<Workshop> {
        match self.documents.get_document(Collection::Workshops, workshop_id).await? {
            Some(doc) => Ok(serde_json::from_value(doc)?),
            None => Err(AppError::NotFound(format!("Workshop {}", workshop_id))),
        }
    }

    /// Removes the workshop, then its template file. A leftover file is only
    /// logged.
    pub async fn delete_workshop(&self, workshop_id: &str) -> Result<()> {
        let workshop = self.get_workshop(workshop_id).await?;
        self.documents
            .delete_document(Collection::Workshops, workshop_id)
            .await
            .trace_err("delete_workshop")?;
        match workshop.template_file_id() {
            Some(file_id) => {
                if let Err(e) = self.files.delete_file(&file_id).await {
                    tracing::warn!(
                        "Workshop {} deleted but template {} was not: {}",
                        workshop_id, file_id, e
                    );
                }
            }
            None => tracing::warn!(
                "Workshop {} deleted; template URL {} names no file",
                workshop_id, workshop.certificate_template
            ),
        }
        Ok(())
    }

    pub async fn set_workshop_attendance(&self, workshop_id: &str, student_ids: &[String]) -> Result<Workshop> {
        let data = json!({ "students": student_ids });
        let doc = self
            .documents
            .update_document(Collection::Workshops, workshop_id, into_fields(&data)?)
            .await
            .trace_err("set_workshop_attendance")?;
        Ok(serde_json::from_value(doc)?)
    }

    pub async fn update_text_element(&self, workshop_id: &str, element: &TextElement) -> Result<Workshop> {
        let data = json!({ "textElement": serde_json::to_string(element)? });
        let doc = self
            .documents
            .update_document(Collection::Workshops, workshop_id, into_fields(&data)?)
            .await
            .trace_err("update_text_element")?;
        Ok(serde_json::from_value(doc)?)
    }

    pub async fn fetch_template(&self, workshop: &Workshop) -> Result<Vec<u8>> {
        let file_id = workshop.template_file_id().ok_or_else(|| {
            AppError::TemplateLoad(format!("Workshop {} has no stored template", workshop.id))
        })?;
        self.files
            .download_file(&file_id)
            .await
            .trace_err("fetch_template")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn db() -> (CertGenDb, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (CertGenDb::new(backend.clone(), backend.clone()), backend)
    }

    fn workshop() -> NewWorkshop {
        NewWorkshop {
            workshop_name: "Web Development Fundamentals".into(),
            resource_person: "Dr. Sarah Johnson".into(),
            date: "2024-03-15".into(),
            department: "Computer Science".into(),
            text_element: TextElement {
                text: "Student Name".into(),
                x: 50.0,
                y: 60.0,
                font_size: 36.0,
                color: "#000000".into(),
                font_family: "serif".into(),
                reference_width: None,
            },
        }
    }

    fn upload() -> TemplateUpload {
        TemplateUpload {
            file_name: "template.png".into(),
            content_type: "image/png".into(),
            bytes: vec![1, 2, 3],
        }
    }

    #[actix_rt::test]
    async fn workshop_lifecycle_cleans_up_template() {
        let (db, backend) = db();
        let created = db.add_workshop(&workshop(), upload()).await.unwrap();
        assert_eq!(backend.file_count(), 1);
        assert!(created.template_file_id().is_some());
        assert_eq!(db.fetch_template(&created).await.unwrap(), vec![1, 2, 3]);

        let updated = db
            .set_workshop_attendance(&created.id, &["s1".to_string(), "s2".to_string()])
            .await
            .unwrap();
        assert_eq!(updated.students, vec!["s1", "s2"]);

        db.delete_workshop(&created.id).await.unwrap();
        assert_eq!(backend.file_count(), 0);
        assert!(matches!(db.get_workshop(&created.id).await, Err(AppError::NotFound(_))));
    }

    #[actix_rt::test]
    async fn template_resolves_from_view_url_only() {
        let (db, backend) = db();
        let stored = backend.upload_file("cert.png", "image/png", vec![7, 8, 9]).await.unwrap();
        let data = json!({
            "workshopName": "Cloud Computing Basics",
            "resourcePerson": "Prof. Michael Chen",
            "date": "2024-04-02",
            "organizedDepartment": "Computer Science",
            "certificateTemplate": stored.view_url,
            "textElement": serde_json::to_string(&workshop().text_element).unwrap(),
            "students": [],
        });
        let doc = backend
            .create_document(Collection::Workshops, into_fields(&data).unwrap())
            .await
            .unwrap();
        let workshop: Workshop = serde_json::from_value(doc).unwrap();

        assert_eq!(db.fetch_template(&workshop).await.unwrap(), vec![7, 8, 9]);
        db.delete_workshop(&workshop.id).await.unwrap();
        assert_eq!(backend.file_count(), 0);
    }

    #[actix_rt::test]
    async fn students_round_trip_through_documents() {
        let (db, _) = db();
        let added = db
            .add_student(&NewStudent {
                student_name: "Payal Patel".into(),
                usn: "4SH24EC012".into(),
                gender: "Female".into(),
                branch: "ECE".into(),
                year: 3,
            })
            .await
            .unwrap();
        let listed = db.fetch_students().await.unwrap();
        assert_eq!(listed, vec![added.clone()]);
        db.delete_student(&added.id).await.unwrap();
        assert!(db.fetch_students().await.unwrap().is_empty());
    }
}
