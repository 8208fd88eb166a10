/// SQLite store for course data and plugin configuration

mod types;

pub use types::{
    CourseRecord, CourseSnapshot, EnrolmentRecord, FileRecord, GroupRecord, ModuleRecord,
    UserEnrolmentRecord,
};

use crate::diagnostic::{
    Course, CourseDataSource, CourseGroup, CourseModule, DiagnosticError, EnrolmentInstance,
    FileUsage, GroupMode, MimeFilter, SettingsStore, UserEnrolment, STUDENT_ROLE_ID,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

const SCHEMA_SQL: &str = include_str!("../../../../sql/init_coursediagnostic.sql");

pub struct CourseDbManager {
    db: Mutex<Connection>,
}

impl CourseDbManager {
    /// Opens (or creates) the database at `db_path` and initializes the schema
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, DiagnosticError> {
        Self::with_connection(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self, DiagnosticError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, DiagnosticError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DiagnosticError> {
        self.db.lock().map_err(|_| DiagnosticError::Database {
            message: "database connection lock poisoned".to_string(),
        })
    }

    /// Writes every row of `snapshot`. Rows with an existing id are updated in
    /// place, so rows the snapshot does not mention are left alone. The files
    /// of each course named in `snapshot.files` are replaced as a whole.
    pub fn import_snapshot(&self, snapshot: &CourseSnapshot) -> Result<(), DiagnosticError> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;

        for c in &snapshot.courses {
            tx.execute(
                "INSERT INTO courses
                    (id, shortname, fullname, startdate, enddate, visible, groupmode, enablecompletion)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    shortname = excluded.shortname,
                    fullname = excluded.fullname,
                    startdate = excluded.startdate,
                    enddate = excluded.enddate,
                    visible = excluded.visible,
                    groupmode = excluded.groupmode,
                    enablecompletion = excluded.enablecompletion",
                params![
                    c.id,
                    c.shortname,
                    c.fullname,
                    c.startdate,
                    c.enddate,
                    c.visible,
                    c.groupmode,
                    c.enablecompletion
                ],
            )?;
        }

        for e in &snapshot.enrolments {
            tx.execute(
                "INSERT INTO enrol
                    (id, courseid, enrol, name, status, password, enrolperiod, enrolenddate,
                     expireroleid, customint4, customint5)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(id) DO UPDATE SET
                    courseid = excluded.courseid,
                    enrol = excluded.enrol,
                    name = excluded.name,
                    status = excluded.status,
                    password = excluded.password,
                    enrolperiod = excluded.enrolperiod,
                    enrolenddate = excluded.enrolenddate,
                    expireroleid = excluded.expireroleid,
                    customint4 = excluded.customint4,
                    customint5 = excluded.customint5",
                params![
                    e.id,
                    e.courseid,
                    e.enrol,
                    e.name,
                    e.status,
                    e.password,
                    e.enrolperiod,
                    e.enrolenddate,
                    e.expireroleid,
                    e.customint4,
                    e.customint5
                ],
            )?;
        }

        for ue in &snapshot.user_enrolments {
            tx.execute(
                "INSERT INTO user_enrolments (id, enrolid, userid, roleid, status, timeend)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    enrolid = excluded.enrolid,
                    userid = excluded.userid,
                    roleid = excluded.roleid,
                    status = excluded.status,
                    timeend = excluded.timeend",
                params![ue.id, ue.enrolid, ue.userid, ue.roleid, ue.status, ue.timeend],
            )?;
        }

        for g in &snapshot.groups {
            tx.execute(
                "INSERT INTO course_groups (id, courseid, name) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                    courseid = excluded.courseid,
                    name = excluded.name",
                params![g.id, g.courseid, g.name],
            )?;
            tx.execute("DELETE FROM group_members WHERE groupid = ?1", [g.id])?;
            for user_id in &g.members {
                tx.execute(
                    "INSERT INTO group_members (groupid, userid) VALUES (?1, ?2)",
                    params![g.id, user_id],
                )?;
            }
        }

        for m in &snapshot.modules {
            tx.execute(
                "INSERT INTO course_modules (id, courseid, modname, name, completion, duedate)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    courseid = excluded.courseid,
                    modname = excluded.modname,
                    name = excluded.name,
                    completion = excluded.completion,
                    duedate = excluded.duedate",
                params![m.id, m.courseid, m.modname, m.name, m.completion, m.duedate],
            )?;
        }

        let file_courses: BTreeSet<i64> = snapshot.files.iter().map(|f| f.courseid).collect();
        for course_id in &file_courses {
            tx.execute("DELETE FROM files WHERE courseid = ?1", [course_id])?;
        }
        for f in &snapshot.files {
            tx.execute(
                "INSERT INTO files (courseid, filename, filesize, mimetype) VALUES (?1, ?2, ?3, ?4)",
                params![f.courseid, f.filename, f.filesize, f.mimetype],
            )?;
        }

        tx.commit()?;

        info!(
            courses = snapshot.courses.len(),
            enrolments = snapshot.enrolments.len(),
            modules = snapshot.modules.len(),
            files = snapshot.files.len(),
            "Imported course snapshot"
        );
        Ok(())
    }

    /// Number of course rows, the site course included
    pub fn course_count(&self) -> Result<usize, DiagnosticError> {
        let db = self.conn()?;
        let count: i64 = db.query_row("SELECT COUNT(*) FROM courses", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Unix seconds to a timestamp; 0 and negative values mean unset.
fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    if secs > 0 {
        DateTime::from_timestamp(secs, 0)
    } else {
        None
    }
}

impl CourseDataSource for CourseDbManager {
    fn course(&self, course_id: i64) -> Result<Course, DiagnosticError> {
        let db = self.conn()?;
        db.query_row(
            "SELECT id, shortname, fullname, startdate, enddate, visible, groupmode, enablecompletion
             FROM courses WHERE id = ?1",
            [course_id],
            |row| {
                Ok(Course {
                    id: row.get(0)?,
                    short_name: row.get(1)?,
                    full_name: row.get(2)?,
                    start_date: timestamp(row.get(3)?).unwrap_or_default(),
                    end_date: timestamp(row.get(4)?),
                    visible: row.get::<_, i64>(5)? != 0,
                    group_mode: GroupMode::from_setting(row.get(6)?),
                    completion_enabled: row.get::<_, i64>(7)? != 0,
                })
            },
        )
        .optional()?
        .ok_or(DiagnosticError::CourseNotFound { course_id })
    }

    fn enrolment_instances(&self, course_id: i64) -> Result<Vec<EnrolmentInstance>, DiagnosticError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT id, courseid, enrol, name, status, password, enrolperiod, enrolenddate,
                    expireroleid, customint4, customint5
             FROM enrol WHERE courseid = ?1 ORDER BY id",
        )?;

        let instances = stmt
            .query_map([course_id], |row| {
                let password: Option<String> = row.get(5)?;
                Ok(EnrolmentInstance {
                    id: row.get(0)?,
                    course_id: row.get(1)?,
                    method: row.get(2)?,
                    name: row.get(3)?,
                    enabled: row.get::<_, i64>(4)? == 0,
                    has_key: password.is_some_and(|p| !p.is_empty()),
                    enrol_period_secs: row.get(6)?,
                    enrol_end_date: timestamp(row.get(7)?),
                    unenrol_on_expiry: row.get::<_, i64>(8)? == 0,
                    unenrol_on_removal: row.get::<_, i64>(9)? != 0,
                    remove_from_groups: row.get::<_, i64>(10)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(instances)
    }

    fn student_enrolments(&self, course_id: i64) -> Result<Vec<UserEnrolment>, DiagnosticError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT ue.userid, ue.status, ue.timeend
             FROM user_enrolments ue
             JOIN enrol e ON e.id = ue.enrolid
             WHERE e.courseid = ?1 AND ue.roleid = ?2
             ORDER BY ue.id",
        )?;

        let enrolments = stmt
            .query_map(params![course_id, STUDENT_ROLE_ID], |row| {
                Ok(UserEnrolment {
                    user_id: row.get(0)?,
                    suspended: row.get::<_, i64>(1)? != 0,
                    time_end: timestamp(row.get(2)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(enrolments)
    }

    fn groups(&self, course_id: i64) -> Result<Vec<CourseGroup>, DiagnosticError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT g.id, g.name, COUNT(m.id)
             FROM course_groups g
             LEFT JOIN group_members m ON m.groupid = g.id
             WHERE g.courseid = ?1
             GROUP BY g.id, g.name
             ORDER BY g.id",
        )?;

        let groups = stmt
            .query_map([course_id], |row| {
                Ok(CourseGroup {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    member_count: row.get::<_, i64>(2)? as usize,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(groups)
    }

    fn modules(&self, course_id: i64) -> Result<Vec<CourseModule>, DiagnosticError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT id, modname, name, completion, duedate
             FROM course_modules WHERE courseid = ?1 ORDER BY id",
        )?;

        let modules = stmt
            .query_map([course_id], |row| {
                Ok(CourseModule {
                    id: row.get(0)?,
                    module_type: row.get(1)?,
                    name: row.get(2)?,
                    completion_tracking: row.get::<_, i64>(3)? > 0,
                    due_date: timestamp(row.get(4)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(modules)
    }

    fn file_usage(&self, course_id: i64, filter: MimeFilter) -> Result<FileUsage, DiagnosticError> {
        let mut sql = String::from(
            "SELECT COUNT(*), COALESCE(SUM(filesize), 0)
             FROM files WHERE courseid = ? AND filename <> '.'",
        );
        let mut values = vec![Value::Integer(course_id)];

        let mime_types = filter.mime_types();
        if !mime_types.is_empty() {
            let placeholders = vec!["?"; mime_types.len()].join(", ");
            sql.push_str(&format!(" AND mimetype IN ({})", placeholders));
            values.extend(mime_types.iter().map(|m| Value::Text(m.to_string())));
        }

        let db = self.conn()?;
        let (count, total): (i64, i64) =
            db.query_row(&sql, params_from_iter(values), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;

        Ok(FileUsage {
            file_count: count.max(0) as u64,
            total_bytes: total.max(0) as u64,
        })
    }

    fn visible_course_ids(&self, offset: usize, limit: usize) -> Result<Vec<i64>, DiagnosticError> {
        let db = self.conn()?;
        let mut stmt =
            db.prepare("SELECT id FROM courses WHERE visible = 1 ORDER BY id LIMIT ?1 OFFSET ?2")?;

        let ids = stmt
            .query_map(params![limit as i64, offset as i64], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<i64>, _>>()?;

        Ok(ids)
    }
}

impl SettingsStore for CourseDbManager {
    fn get_config(&self, name: &str) -> Result<Option<String>, DiagnosticError> {
        let db = self.conn()?;
        let value: Option<String> = db
            .query_row(
                "SELECT value FROM config_plugins WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_config(&self, name: &str, value: &str) -> Result<(), DiagnosticError> {
        let db = self.conn()?;
        db.execute(
            "INSERT INTO config_plugins (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            [name, value],
        )?;
        Ok(())
    }

    fn all_config(&self) -> Result<BTreeMap<String, String>, DiagnosticError> {
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT name, value FROM config_plugins")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<BTreeMap<String, String>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_course_round_trip() {
        let db = CourseDbManager::open_in_memory().unwrap();
        db.import_snapshot(&CourseSnapshot::single_course(4, |c| {
            c.enddate = 1_717_200_000;
            c.groupmode = 2;
        }))
        .unwrap();

        let course = db.course(4).unwrap();
        assert_eq!(course.short_name, "C4");
        assert!(course.visible);
        assert_eq!(course.group_mode, GroupMode::Visible);
        assert_eq!(course.end_date.map(|d| d.timestamp()), Some(1_717_200_000));

        assert!(db.course(99).unwrap_err().is_not_found());
    }

    #[test]
    fn test_enrolment_instance_flags() {
        let mut snapshot = CourseSnapshot::single_course(2, |_| {});
        let mut keyed = EnrolmentRecord::new(10, 2, "self");
        keyed.password = Some(String::new());
        keyed.expireroleid = 5;
        keyed.customint5 = 1;
        snapshot.enrolments.push(keyed);

        let db = db_import(&snapshot);
        let instances = db.enrolment_instances(2).unwrap();
        assert_eq!(instances.len(), 1);
        assert!(instances[0].enabled);
        assert!(!instances[0].has_key);
        assert!(!instances[0].unenrol_on_expiry);
        assert!(instances[0].remove_from_groups);
        assert!(!instances[0].unenrol_on_removal);
    }

    fn db_import(snapshot: &CourseSnapshot) -> CourseDbManager {
        let db = CourseDbManager::open_in_memory().unwrap();
        db.import_snapshot(snapshot).unwrap();
        db
    }

    #[test]
    fn test_student_enrolments_only_include_students() {
        let mut snapshot = CourseSnapshot::single_course(2, |_| {});
        snapshot.enrolments.push(EnrolmentRecord::new(10, 2, "manual"));
        snapshot.add_student(10, 100, |_| {});
        snapshot.add_student(10, 101, |ue| ue.roleid = 3);
        snapshot.add_student(10, 102, |ue| ue.status = 1);
        let db = db_import(&snapshot);

        let students = db.student_enrolments(2).unwrap();
        let ids: Vec<_> = students.iter().map(|s| s.user_id).collect();
        assert_eq!(ids, vec![100, 102]);
        assert!(students[1].suspended);
    }

    #[test]
    fn test_groups_count_members() {
        let mut snapshot = CourseSnapshot::single_course(2, |_| {});
        snapshot.add_group(20, 2, "Empty", &[]);
        snapshot.add_group(21, 2, "Lab", &[100, 101]);
        let db = db_import(&snapshot);

        let groups = db.groups(2).unwrap();
        let counts: Vec<_> = groups.iter().map(|g| g.member_count).collect();
        assert_eq!(counts, vec![0, 2]);
    }

    #[test]
    fn test_file_usage_filters_by_mime_type() {
        let mut snapshot = CourseSnapshot::single_course(2, |_| {});
        snapshot.files.push(FileRecord::new(2, "a.mp4", 300, "video/mp4"));
        snapshot.files.push(FileRecord::new(2, "b.mp3", 200, "audio/mp3"));
        snapshot.files.push(FileRecord::new(2, "c.pdf", 100, "application/pdf"));
        snapshot.files.push(FileRecord::new(2, ".", 0, ""));
        snapshot.courses.push(CourseRecord::new(3));
        snapshot.files.push(FileRecord::new(3, "other.mp4", 999, "video/mp4"));
        let db = db_import(&snapshot);

        assert_eq!(
            db.file_usage(2, MimeFilter::All).unwrap(),
            FileUsage { file_count: 3, total_bytes: 600 }
        );
        assert_eq!(
            db.file_usage(2, MimeFilter::Video).unwrap(),
            FileUsage { file_count: 1, total_bytes: 300 }
        );
        assert_eq!(db.file_usage(2, MimeFilter::Audio).unwrap().total_bytes, 200);
        assert_eq!(db.file_usage(9, MimeFilter::All).unwrap(), FileUsage::default());
    }

    #[test]
    fn test_course_reimport_keeps_related_rows() {
        let mut snapshot = CourseSnapshot::single_course(2, |_| {});
        snapshot.enrolments.push(EnrolmentRecord::new(10, 2, "manual"));
        snapshot.add_student(10, 100, |_| {});
        snapshot.add_group(20, 2, "Lab", &[100]);
        snapshot.modules.push(ModuleRecord::new(30, 2, "assign", "Essay"));
        snapshot.files.push(FileRecord::new(2, "a.mp4", 300, "video/mp4"));
        let db = db_import(&snapshot);

        db.import_snapshot(&CourseSnapshot::single_course(2, |c| c.visible = 0))
            .unwrap();

        assert!(!db.course(2).unwrap().visible);
        assert_eq!(db.enrolment_instances(2).unwrap().len(), 1);
        assert_eq!(db.student_enrolments(2).unwrap().len(), 1);
        assert_eq!(db.groups(2).unwrap()[0].member_count, 1);
        assert_eq!(db.modules(2).unwrap().len(), 1);
        assert_eq!(db.file_usage(2, MimeFilter::All).unwrap().total_bytes, 300);
    }

    #[test]
    fn test_file_reimport_replaces_course_files() {
        let mut snapshot = CourseSnapshot::single_course(2, |_| {});
        snapshot.courses.push(CourseRecord::new(3));
        snapshot.files.push(FileRecord::new(2, "a.mp4", 300, "video/mp4"));
        snapshot.files.push(FileRecord::new(3, "b.mp3", 50, "audio/mp3"));
        let db = db_import(&snapshot);

        let files_only = CourseSnapshot {
            files: vec![FileRecord::new(2, "a.mp4", 300, "video/mp4")],
            ..CourseSnapshot::default()
        };
        db.import_snapshot(&files_only).unwrap();
        db.import_snapshot(&files_only).unwrap();

        assert_eq!(
            db.file_usage(2, MimeFilter::All).unwrap(),
            FileUsage { file_count: 1, total_bytes: 300 }
        );
        assert_eq!(db.file_usage(3, MimeFilter::All).unwrap().total_bytes, 50);
    }

    #[test]
    fn test_visible_course_ids_are_paged() {
        let mut snapshot = CourseSnapshot::default();
        for id in 1..=6 {
            snapshot.courses.push(CourseRecord::new(id));
        }
        snapshot.courses[3].visible = 0;
        let db = db_import(&snapshot);

        assert_eq!(db.course_count().unwrap(), 6);
        assert_eq!(db.visible_course_ids(0, 3).unwrap(), vec![1, 2, 3]);
        assert_eq!(db.visible_course_ids(3, 3).unwrap(), vec![5, 6]);
        assert!(db.visible_course_ids(10, 3).unwrap().is_empty());
    }

    #[test]
    fn test_settings_store() {
        let db = CourseDbManager::open_in_memory().unwrap();
        assert_eq!(db.get_config("timelimit").unwrap(), None);

        db.set_config("timelimit", "60").unwrap();
        db.set_config("timelimit", "120").unwrap();
        db.set_config("enablediagnostic", "1").unwrap();

        assert_eq!(db.get_config("timelimit").unwrap().as_deref(), Some("120"));
        assert_eq!(db.all_config().unwrap().len(), 2);
    }

    #[test]
    fn test_snapshot_from_json() {
        let json = r#"{
            "courses": [{ "id": 7, "shortname": "BIO101" }],
            "user_enrolments": [{ "id": 1, "enrolid": 3, "userid": 50 }]
        }"#;
        let snapshot: CourseSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.courses[0].visible, 1);
        assert_eq!(snapshot.user_enrolments[0].roleid, STUDENT_ROLE_ID);
        assert!(snapshot.files.is_empty());
    }
}
