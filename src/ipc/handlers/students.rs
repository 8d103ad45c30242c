use crate::ipc::error::{err, ok};
use crate::ipc::helpers::check_permission;
use crate::ipc::types::{AppState, Request};
use crate::permissions::Permission;
use serde_json::json;

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = check_permission(req, Permission::StudentsView) {
        return resp;
    }
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let school_id = match req.params.get("schoolId").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing schoolId", None),
    };
    let grade = req.params.get("grade").and_then(|v| v.as_str());

    let (sql, binds): (&str, Vec<&str>) = match grade {
        Some(g) => (
            "SELECT id, student_name, grade, date_of_birth, created_at
             FROM students WHERE school_id = ? AND grade = ?
             ORDER BY student_name",
            vec![school_id, g],
        ),
        None => (
            "SELECT id, student_name, grade, date_of_birth, created_at
             FROM students WHERE school_id = ?
             ORDER BY grade, student_name",
            vec![school_id],
        ),
    };

    let mut stmt = match conn.prepare(sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let students = stmt.query_map(rusqlite::params_from_iter(binds), |row| {
        let id: String = row.get(0)?;
        let name: String = row.get(1)?;
        let grade: String = row.get(2)?;
        let dob: Option<String> = row.get(3)?;
        let created_at: String = row.get(4)?;
        Ok((id, name, grade, dob, created_at))
    });
    let students: Vec<_> = match students.and_then(|it| it.collect::<Result<Vec<_>, _>>()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut link_stmt = match conn.prepare(
        "SELECT p.id, p.parent_name, p.phone_number, p.relationship
         FROM parent_student ps JOIN parents p ON p.id = ps.parent_id
         WHERE ps.school_id = ? AND ps.student_id = ?
         ORDER BY p.parent_name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut out = Vec::with_capacity(students.len());
    for (id, name, grade, dob, created_at) in students {
        let parents = link_stmt
            .query_map([school_id, id.as_str()], |row| {
                let pid: String = row.get(0)?;
                let pname: String = row.get(1)?;
                let phone: String = row.get(2)?;
                let relationship: String = row.get(3)?;
                Ok(json!({
                    "id": pid,
                    "parentName": pname,
                    "phoneNumber": phone,
                    "relationship": relationship
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>());
        let parents = match parents {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        out.push(json!({
            "id": id,
            "studentName": name,
            "grade": grade,
            "dateOfBirth": dob,
            "createdAt": created_at,
            "parents": parents
        }));
    }

    ok(&req.id, json!({ "students": out }))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = check_permission(req, Permission::StudentsDelete) {
        return resp;
    }
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let school_id = match req.params.get("schoolId").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing schoolId", None),
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let deleted = tx
        .execute(
            "DELETE FROM parent_student WHERE school_id = ? AND student_id = ?",
            [school_id, student_id],
        )
        .and_then(|_| {
            tx.execute(
                "DELETE FROM students WHERE school_id = ? AND id = ?",
                [school_id, student_id],
            )
        });
    match deleted {
        Ok(0) => {
            let _ = tx.rollback();
            err(&req.id, "not_found", "student not found", None)
        }
        Ok(_) => match tx.commit() {
            Ok(()) => ok(&req.id, json!({ "deleted": true })),
            Err(e) => err(&req.id, "db_tx_failed", e.to_string(), None),
        },
        Err(e) => {
            let _ = tx.rollback();
            err(&req.id, "db_query_failed", e.to_string(), None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
