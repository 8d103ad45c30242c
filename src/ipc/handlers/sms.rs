use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::check_permission;
use crate::ipc::types::{AppState, Request};
use crate::permissions::Permission;
use crate::sms::SmsKind;
use serde_json::json;

/// Sends one message to every parent of a school, optionally narrowed to
/// parents of students in a single grade. Recipients are resolved first so
/// the query borrow ends before the gateway runs; a failed send is recorded
/// per recipient and never aborts the rest of the batch.
fn handle_sms_bulk_send(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = check_permission(req, Permission::SmsBulk) {
        return resp;
    }

    let school_id = match req.params.get("schoolId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing schoolId", None),
    };
    let message = match req.params.get("message").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.to_string(),
        _ => return err(&req.id, "bad_params", "missing message", None),
    };
    let grade = req
        .params
        .get("grade")
        .and_then(|v| v.as_str())
        .map(|v| v.to_string());

    let recipients: Vec<(String, String, String)> = {
        let Some(conn) = state.db.as_ref() else {
            return err(&req.id, "no_workspace", "select a workspace first", None);
        };

        match db::school_exists(conn, &school_id) {
            Ok(true) => {}
            Ok(false) => return err(&req.id, "not_found", "school not found", None),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }

        let result = match &grade {
            Some(g) => conn
                .prepare(
                    "SELECT DISTINCT p.id, p.parent_name, p.phone_number
                     FROM parents p
                     JOIN parent_student ps ON ps.parent_id = p.id
                     JOIN students s ON s.id = ps.student_id
                     WHERE p.school_id = ? AND s.grade = ?
                     ORDER BY p.parent_name",
                )
                .and_then(|mut stmt| {
                    stmt.query_map([school_id.as_str(), g.as_str()], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                    })
                    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                }),
            None => conn
                .prepare(
                    "SELECT id, parent_name, phone_number FROM parents
                     WHERE school_id = ? ORDER BY parent_name",
                )
                .and_then(|mut stmt| {
                    stmt.query_map([school_id.as_str()], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                    })
                    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                }),
        };
        match result {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };

    let mut results = Vec::with_capacity(recipients.len());
    let mut sent = 0usize;
    let mut failed = 0usize;
    for (parent_id, parent_name, phone) in &recipients {
        match state.sms.send(phone, &message, SmsKind::Bulk) {
            Ok(()) => {
                sent += 1;
                results.push(json!({
                    "parentId": parent_id,
                    "parentName": parent_name,
                    "phoneNumber": phone,
                    "sent": true
                }));
            }
            Err(e) => {
                failed += 1;
                log::warn!("bulk SMS to {} failed: {}", phone, e);
                results.push(json!({
                    "parentId": parent_id,
                    "parentName": parent_name,
                    "phoneNumber": phone,
                    "sent": false,
                    "error": e.to_string()
                }));
            }
        }
    }

    log::info!(
        "bulk SMS for school {}: {} recipients, {} sent, {} failed",
        school_id,
        recipients.len(),
        sent,
        failed
    );

    ok(
        &req.id,
        json!({
            "recipients": results,
            "summary": { "total": recipients.len(), "sent": sent, "failed": failed }
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sms.bulkSend" => Some(handle_sms_bulk_send(state, req)),
        _ => None,
    }
}
