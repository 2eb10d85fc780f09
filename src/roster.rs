use std::collections::{BTreeSet, HashSet};

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;

use crate::models::{NewStudent, Student};

pub const ALL_BRANCHES: &str = "All Branches";

static BRANCH_DISPLAY_NAMES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("cse", "Computer Science & Engineering"),
        ("ise", "Information Science & Engineering"),
        ("ece", "Electronics & Communication Engineering"),
        ("eee", "Electrical & Electronics Engineering"),
        ("mech", "Mechanical Engineering"),
        ("civil", "Civil Engineering"),
        ("mca", "Master of Computer Applications"),
        ("mba", "Master of Business Administration"),
        ("btech", "Bachelor of Technology"),
        ("mtech", "Master of Technology"),
        ("electronics & communication", "Electronics & Communication Engineering"),
        ("computer science", "Computer Science & Engineering"),
        ("mechanical engineering", "Mechanical Engineering"),
        ("electrical engineering", "Electrical & Electronics Engineering"),
        ("information technology", "Information Technology"),
    ])
});

/// Comparison key for USNs: trimmed, lower case.
pub fn usn_key(usn: &str) -> String {
    usn.trim().to_lowercase()
}

pub fn branch_display_name(branch: &str) -> String {
    if branch.is_empty() {
        return String::new();
    }
    BRANCH_DISPLAY_NAMES
        .get(branch.to_lowercase().as_str())
        .map(|name| name.to_string())
        .unwrap_or_else(|| branch.to_string())
}

/// Distinct non-empty branches, sorted.
pub fn unique_branches(students: &[Student]) -> Vec<String> {
    students
        .iter()
        .map(|s| s.branch.as_str())
        .filter(|b| !b.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Keeps the first row for each USN, in input order. Rows with a blank USN
/// are all kept for the caller to reject.
pub fn dedupe_by_usn(rows: Vec<NewStudent>) -> (Vec<NewStudent>, Vec<String>) {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(rows.len());
    let mut duplicates = Vec::new();
    for row in rows {
        let key = usn_key(&row.usn);
        if key.is_empty() || seen.insert(key) {
            kept.push(row);
        } else {
            duplicates.push(row.usn);
        }
    }
    (kept, duplicates)
}

/// Search box plus branch dropdown.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentFilter {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub branch: String,
}

impl StudentFilter {
    pub fn matches(&self, student: &Student) -> bool {
        let branch = self.branch.trim();
        if !branch.is_empty() && branch != ALL_BRANCHES && student.branch != branch {
            return false;
        }
        let query = self.search.trim().to_lowercase();
        query.is_empty()
            || student.student_name.to_lowercase().contains(&query)
            || student.usn.to_lowercase().contains(&query)
            || student.branch.to_lowercase().contains(&query)
    }

    pub fn apply<'a>(&self, students: &'a [Student]) -> Vec<&'a Student> {
        students.iter().filter(|s| self.matches(s)).collect()
    }
}
