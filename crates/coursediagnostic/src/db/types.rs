/// Row types for importing course data into the store
use crate::diagnostic::{DiagnosticError, STUDENT_ROLE_ID};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A course row. Timestamps are unix seconds, 0 when unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourseRecord {
    pub id: i64,
    pub shortname: String,
    pub fullname: String,
    pub startdate: i64,
    pub enddate: i64,
    #[serde(default = "default_visible")]
    pub visible: i64,
    pub groupmode: i64,
    pub enablecompletion: i64,
}

impl CourseRecord {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            shortname: format!("C{}", id),
            fullname: format!("Course {}", id),
            visible: 1,
            ..Self::default()
        }
    }
}

fn default_visible() -> i64 {
    1
}

/// An enrolment instance row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrolmentRecord {
    pub id: i64,
    pub courseid: i64,
    pub enrol: String,
    pub name: Option<String>,
    pub status: i64,                   // 0 = enabled
    pub password: Option<String>,
    pub enrolperiod: i64,
    pub enrolenddate: i64,
    pub expireroleid: i64,             // 0 = unenrol after the period
    pub customint4: i64,
    pub customint5: i64,
}

impl EnrolmentRecord {
    pub fn new(id: i64, courseid: i64, enrol: &str) -> Self {
        Self {
            id,
            courseid,
            enrol: enrol.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserEnrolmentRecord {
    pub id: i64,
    pub enrolid: i64,
    pub userid: i64,
    pub roleid: i64,
    pub status: i64,                   // 1 = suspended
    pub timeend: i64,
}

impl Default for UserEnrolmentRecord {
    fn default() -> Self {
        Self {
            id: 0,
            enrolid: 0,
            userid: 0,
            roleid: STUDENT_ROLE_ID,
            status: 0,
            timeend: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupRecord {
    pub id: i64,
    pub courseid: i64,
    pub name: String,
    pub members: Vec<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleRecord {
    pub id: i64,
    pub courseid: i64,
    pub modname: String,
    pub name: String,
    pub completion: i64,
    pub duedate: i64,
}

impl ModuleRecord {
    pub fn new(id: i64, courseid: i64, modname: &str, name: &str) -> Self {
        Self {
            id,
            courseid,
            modname: modname.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRecord {
    pub courseid: i64,
    pub filename: String,
    pub filesize: i64,
    pub mimetype: Option<String>,
}

impl FileRecord {
    pub fn new(courseid: i64, filename: &str, filesize: i64, mimetype: &str) -> Self {
        Self {
            courseid,
            filename: filename.to_string(),
            filesize,
            mimetype: Some(mimetype.to_string()).filter(|m| !m.is_empty()),
        }
    }
}

/// A batch of course data, as read from an import file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourseSnapshot {
    pub courses: Vec<CourseRecord>,
    pub enrolments: Vec<EnrolmentRecord>,
    pub user_enrolments: Vec<UserEnrolmentRecord>,
    pub groups: Vec<GroupRecord>,
    pub modules: Vec<ModuleRecord>,
    pub files: Vec<FileRecord>,
}

impl CourseSnapshot {
    /// Reads a snapshot from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DiagnosticError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// A snapshot with one visible course, adjusted by `customise`.
    pub fn single_course(id: i64, customise: impl FnOnce(&mut CourseRecord)) -> Self {
        let mut course = CourseRecord::new(id);
        customise(&mut course);
        Self {
            courses: vec![course],
            ..Self::default()
        }
    }

    /// Enrols `userid` as a student through enrolment instance `enrolid`.
    pub fn add_student(
        &mut self,
        enrolid: i64,
        userid: i64,
        customise: impl FnOnce(&mut UserEnrolmentRecord),
    ) {
        let mut record = UserEnrolmentRecord {
            id: self.user_enrolments.len() as i64 + 1,
            enrolid,
            userid,
            ..UserEnrolmentRecord::default()
        };
        customise(&mut record);
        self.user_enrolments.push(record);
    }

    pub fn add_group(&mut self, id: i64, courseid: i64, name: &str, members: &[i64]) {
        self.groups.push(GroupRecord {
            id,
            courseid,
            name: name.to_string(),
            members: members.to_vec(),
        });
    }
}
