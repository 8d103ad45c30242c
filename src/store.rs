use rusqlite::{params_from_iter, Connection};
use uuid::Uuid;

use crate::db;
use crate::roster::{NewParent, NewStudent, RosterStore};

/// Workspace-backed [`RosterStore`]. Each insert batch commits as one
/// transaction; there is no transaction across stages (a failure between
/// stages is reconciled by the next idempotent import).
pub struct SqliteRosterStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteRosterStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

impl RosterStore for SqliteRosterStore<'_> {
    fn parents_by_phone(
        &mut self,
        school_id: &str,
        phones: &[String],
    ) -> anyhow::Result<Vec<(String, String)>> {
        let sql = format!(
            "SELECT phone_number, id FROM parents
             WHERE school_id = ? AND phone_number IN ({})",
            placeholders(phones.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let params = std::iter::once(school_id.to_string()).chain(phones.iter().cloned());
        let rows = stmt
            .query_map(params_from_iter(params), |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert_parents(
        &mut self,
        school_id: &str,
        parents: &[NewParent],
    ) -> anyhow::Result<Vec<(String, String)>> {
        let tx = self.conn.unchecked_transaction()?;
        let now = db::now_rfc3339();
        let mut out = Vec::with_capacity(parents.len());
        {
            let mut ins = tx.prepare(
                "INSERT INTO parents(id, school_id, parent_name, phone_number, email, relationship, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
            )?;
            for p in parents {
                let id = Uuid::new_v4().to_string();
                ins.execute((
                    &id,
                    school_id,
                    &p.parent_name,
                    &p.phone_number,
                    p.email.as_deref(),
                    &p.relationship,
                    &now,
                ))?;
                out.push((p.phone_number.clone(), id));
            }
        }
        tx.commit()?;
        Ok(out)
    }

    fn students_by_name_grade(
        &mut self,
        school_id: &str,
        names: &[String],
        grades: &[String],
    ) -> anyhow::Result<Vec<(String, String, String)>> {
        let sql = format!(
            "SELECT student_name, grade, id FROM students
             WHERE school_id = ? AND student_name IN ({}) AND grade IN ({})",
            placeholders(names.len()),
            placeholders(grades.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let params = std::iter::once(school_id.to_string())
            .chain(names.iter().cloned())
            .chain(grades.iter().cloned());
        let rows = stmt
            .query_map(params_from_iter(params), |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert_students(
        &mut self,
        school_id: &str,
        students: &[NewStudent],
    ) -> anyhow::Result<Vec<(String, String, String)>> {
        let tx = self.conn.unchecked_transaction()?;
        let now = db::now_rfc3339();
        let mut out = Vec::with_capacity(students.len());
        {
            let mut ins = tx.prepare(
                "INSERT INTO students(id, school_id, student_name, grade, date_of_birth, created_at)
                 VALUES(?, ?, ?, ?, ?, ?)",
            )?;
            for s in students {
                let id = Uuid::new_v4().to_string();
                ins.execute((
                    &id,
                    school_id,
                    &s.student_name,
                    &s.grade,
                    s.date_of_birth.as_deref(),
                    &now,
                ))?;
                out.push((s.student_name.clone(), s.grade.clone(), id));
            }
        }
        tx.commit()?;
        Ok(out)
    }

    fn links_by_ids(
        &mut self,
        school_id: &str,
        parent_ids: &[String],
        student_ids: &[String],
    ) -> anyhow::Result<Vec<(String, String)>> {
        let sql = format!(
            "SELECT parent_id, student_id FROM parent_student
             WHERE school_id = ? AND parent_id IN ({}) AND student_id IN ({})",
            placeholders(parent_ids.len()),
            placeholders(student_ids.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let params = std::iter::once(school_id.to_string())
            .chain(parent_ids.iter().cloned())
            .chain(student_ids.iter().cloned());
        let rows = stmt
            .query_map(params_from_iter(params), |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert_links(&mut self, school_id: &str, pairs: &[(String, String)]) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let now = db::now_rfc3339();
        {
            let mut ins = tx.prepare(
                "INSERT INTO parent_student(id, school_id, parent_id, student_id, created_at)
                 VALUES(?, ?, ?, ?, ?)",
            )?;
            for (parent_id, student_id) in pairs {
                let id = Uuid::new_v4().to_string();
                ins.execute((&id, school_id, parent_id, student_id, &now))?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
