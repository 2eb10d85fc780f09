use serde::{Deserialize, Deserializer, Serialize};

use crate::certificate::TextElement;

/// Student document as stored in the students collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "studentName")]
    pub student_name: String,
    #[serde(rename = "USN")]
    pub usn: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default, deserialize_with = "number_or_string")]
    pub year: u32,
}

/// Student fields before the backend has assigned an id. Also the row shape of
/// spreadsheet imports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStudent {
    #[serde(rename = "studentName")]
    pub student_name: String,
    #[serde(rename = "USN")]
    pub usn: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default, deserialize_with = "number_or_string")]
    pub year: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workshop {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "workshopName")]
    pub workshop_name: String,
    #[serde(rename = "resourcePerson")]
    pub resource_person: String,
    pub date: String,
    #[serde(rename = "organizedDepartment")]
    pub organized_department: String,
    /// Public view URL of the template image.
    #[serde(rename = "certificateTemplate")]
    pub certificate_template: String,
    /// Serialized [`TextElement`], kept as a string in the document.
    #[serde(rename = "textElement")]
    pub text_element: String,
    /// Ids of attending students.
    #[serde(default)]
    pub students: Vec<String>,
}

impl Workshop {
    pub fn text_element(&self) -> crate::error::Result<TextElement> {
        Ok(serde_json::from_str(&self.text_element)?)
    }

    /// Storage id of the template, read from its view URL.
    pub fn template_file_id(&self) -> Option<String> {
        file_id_from_url(&self.certificate_template)
    }
}

/// Pulls `{id}` out of `.../files/{id}/view?...` style storage URLs.
pub fn file_id_from_url(url: &str) -> Option<String> {
    let (_, rest) = url.rsplit_once("/files/")?;
    let id = rest.split(['/', '?', '#']).next()?;
    if id.is_empty() {
        return None;
    }
    urlencoding::decode(id).ok().map(|id| id.into_owned())
}

/// Workshop fields supplied by the create form.
#[derive(Debug, Clone)]
pub struct NewWorkshop {
    pub workshop_name: String,
    pub resource_person: String,
    pub date: String,
    pub department: String,
    pub text_element: TextElement,
}

/// Uploaded template image.
#[derive(Debug, Clone)]
pub struct TemplateUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

fn number_or_string<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
        Missing(()),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) if s.trim().is_empty() => Ok(0),
        Raw::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid year '{}'", s))),
        Raw::Missing(()) => Ok(0),
    }
}
