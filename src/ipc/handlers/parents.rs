use crate::ipc::error::{err, ok};
use crate::ipc::helpers::check_permission;
use crate::ipc::types::{AppState, Request};
use crate::permissions::Permission;
use serde_json::json;

fn handle_parents_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = check_permission(req, Permission::ParentsView) {
        return resp;
    }
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let school_id = match req.params.get("schoolId").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing schoolId", None),
    };

    let mut stmt = match conn.prepare(
        "SELECT id, parent_name, phone_number, email, relationship, created_at
         FROM parents WHERE school_id = ? ORDER BY parent_name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let parents = stmt.query_map([school_id], |row| {
        let id: String = row.get(0)?;
        let name: String = row.get(1)?;
        let phone: String = row.get(2)?;
        let email: Option<String> = row.get(3)?;
        let relationship: String = row.get(4)?;
        let created_at: String = row.get(5)?;
        Ok((id, name, phone, email, relationship, created_at))
    });
    let parents: Vec<_> = match parents.and_then(|it| it.collect::<Result<Vec<_>, _>>()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Attach linked students so the caller does not need a second round trip.
    let mut link_stmt = match conn.prepare(
        "SELECT s.id, s.student_name, s.grade
         FROM parent_student ps JOIN students s ON s.id = ps.student_id
         WHERE ps.school_id = ? AND ps.parent_id = ?
         ORDER BY s.student_name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut out = Vec::with_capacity(parents.len());
    for (id, name, phone, email, relationship, created_at) in parents {
        let students = link_stmt
            .query_map([school_id, id.as_str()], |row| {
                let sid: String = row.get(0)?;
                let sname: String = row.get(1)?;
                let grade: String = row.get(2)?;
                Ok(json!({ "id": sid, "studentName": sname, "grade": grade }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>());
        let students = match students {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        out.push(json!({
            "id": id,
            "parentName": name,
            "phoneNumber": phone,
            "email": email,
            "relationship": relationship,
            "createdAt": created_at,
            "students": students
        }));
    }

    ok(&req.id, json!({ "parents": out }))
}

/// Deletes a parent and its links. Students stay; they may be linked to
/// another parent or re-linked later.
fn handle_parents_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = check_permission(req, Permission::ParentsDelete) {
        return resp;
    }
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let school_id = match req.params.get("schoolId").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing schoolId", None),
    };
    let parent_id = match req.params.get("parentId").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing parentId", None),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let deleted = tx
        .execute(
            "DELETE FROM parent_student WHERE school_id = ? AND parent_id = ?",
            [school_id, parent_id],
        )
        .and_then(|_| {
            tx.execute(
                "DELETE FROM parents WHERE school_id = ? AND id = ?",
                [school_id, parent_id],
            )
        });
    match deleted {
        Ok(0) => {
            let _ = tx.rollback();
            err(&req.id, "not_found", "parent not found", None)
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
        "parents.list" => Some(handle_parents_list(state, req)),
        "parents.delete" => Some(handle_parents_delete(state, req)),
        _ => None,
    }
}
