use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::sms::{self, SmsKind};
use serde_json::json;
use uuid::Uuid;

/// Single-record registration: one parent, one student, and their link in a
/// transaction, then a welcome SMS. The SMS is best-effort; a gateway
/// failure never rolls back the registration. Bulk import deliberately does
/// not send these.
fn handle_onboarding_register(state: &mut AppState, req: &Request) -> serde_json::Value {
    let school_id = match req.params.get("schoolId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing schoolId", None),
    };

    let get = |key: &str| {
        req.params
            .get(key)
            .and_then(|v| v.as_str())
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };
    let parent_name = get("parentName");
    let phone_number = get("phoneNumber");
    let email = get("email");
    let relationship = {
        let r = get("relationship");
        if r.is_empty() {
            "Parent".to_string()
        } else {
            r
        }
    };
    let student_name = get("studentName");
    let grade = get("grade");
    let date_of_birth = get("dateOfBirth");

    if parent_name.is_empty() || phone_number.is_empty() || student_name.is_empty() || grade.is_empty()
    {
        return err(
            &req.id,
            "bad_params",
            "parentName, phoneNumber, studentName and grade are required",
            None,
        );
    }

    let parent_id = Uuid::new_v4().to_string();
    let student_id = Uuid::new_v4().to_string();
    let link_id = Uuid::new_v4().to_string();

    // Scope the connection borrow so the SMS gateway can borrow state
    // mutably afterwards.
    let insert_result = {
        let Some(conn) = state.db.as_ref() else {
            return err(&req.id, "no_workspace", "select a workspace first", None);
        };

        match db::school_exists(conn, &school_id) {
            Ok(true) => {}
            Ok(false) => return err(&req.id, "not_found", "school not found", None),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }

        let tx = match conn.unchecked_transaction() {
            Ok(t) => t,
            Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
        };
        let now = db::now_rfc3339();

        let result: Result<(), (String, rusqlite::Error)> = (|| {
            tx.execute(
                "INSERT INTO parents(id, school_id, parent_name, phone_number, email, relationship, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                (
                    &parent_id,
                    &school_id,
                    &parent_name,
                    &phone_number,
                    if email.is_empty() { None } else { Some(email.as_str()) },
                    &relationship,
                    &now,
                ),
            )
            .map_err(|e| ("parents".to_string(), e))?;
            tx.execute(
                "INSERT INTO students(id, school_id, student_name, grade, date_of_birth, created_at)
                 VALUES(?, ?, ?, ?, ?, ?)",
                (
                    &student_id,
                    &school_id,
                    &student_name,
                    &grade,
                    if date_of_birth.is_empty() { None } else { Some(date_of_birth.as_str()) },
                    &now,
                ),
            )
            .map_err(|e| ("students".to_string(), e))?;
            tx.execute(
                "INSERT INTO parent_student(id, school_id, parent_id, student_id, created_at)
                 VALUES(?, ?, ?, ?, ?)",
                (&link_id, &school_id, &parent_id, &student_id, &now),
            )
            .map_err(|e| ("parent_student".to_string(), e))?;
            Ok(())
        })();

        match result {
            Ok(()) => tx.commit().map_err(|e| ("commit".to_string(), e)),
            Err((table, e)) => {
                let _ = tx.rollback();
                Err((table, e))
            }
        }
    };

    if let Err((table, e)) = insert_result {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": table })),
        );
    }

    let welcome = sms::welcome_message(&parent_name);
    let welcome_sent = match state.sms.send(&phone_number, &welcome, SmsKind::Welcome) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("welcome SMS to {} failed: {}", phone_number, e);
            false
        }
    };

    ok(
        &req.id,
        json!({
            "parentId": parent_id,
            "studentId": student_id,
            "linkId": link_id,
            "welcomeSmsSent": welcome_sent
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "onboarding.register" => Some(handle_onboarding_register(state, req)),
        _ => None,
    }
}
