use crate::db;
use crate::invite;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::check_permission;
use crate::ipc::types::{AppState, Request};
use crate::permissions::{Permission, Role};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

/// Creates a pending invite and returns its token. Delivery of the token
/// (email, link) is the front end's job; the daemon only mints and stores it.
fn handle_staff_invite(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = check_permission(req, Permission::StaffAdd) {
        return resp;
    }
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let school_id = match req.params.get("schoolId").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing schoolId", None),
    };
    let email = match req.params.get("email").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_lowercase(),
        _ => return err(&req.id, "bad_params", "missing email", None),
    };
    let role = match req.params.get("role").and_then(|v| v.as_str()) {
        None => Role::Staff,
        Some(s) => match Role::parse(s) {
            Some(r) => r,
            None => return err(&req.id, "bad_params", format!("unknown role: {}", s), None),
        },
    };

    match db::school_exists(conn, school_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "school not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let invite_id = Uuid::new_v4().to_string();
    let token = invite::generate_token();
    if let Err(e) = conn.execute(
        "INSERT INTO staff_invites(id, school_id, email, role, token, status, created_at)
         VALUES(?, ?, ?, ?, ?, 'pending', ?)",
        (
            &invite_id,
            school_id,
            &email,
            role.as_str(),
            &token,
            db::now_rfc3339(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "staff_invites" })),
        );
    }

    ok(
        &req.id,
        json!({
            "inviteId": invite_id,
            "email": email,
            "role": role.as_str(),
            "token": token
        }),
    )
}

/// Looks an invite up by token without consuming it, so a join page can show
/// school and role before the invitee commits.
fn handle_invites_validate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let token = match req.params.get("token").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing token", None),
    };
    if !invite::validate_token(token) {
        return err(&req.id, "invalid_token", "malformed invite token", None);
    }

    let row = conn
        .query_row(
            "SELECT i.id, i.school_id, sc.name, i.email, i.role, i.status
             FROM staff_invites i JOIN schools sc ON sc.id = i.school_id
             WHERE i.token = ?",
            [token],
            |row| {
                let id: String = row.get(0)?;
                let school_id: String = row.get(1)?;
                let school_name: String = row.get(2)?;
                let email: String = row.get(3)?;
                let role: String = row.get(4)?;
                let status: String = row.get(5)?;
                Ok((id, school_id, school_name, email, role, status))
            },
        )
        .optional();

    match row {
        Ok(Some((id, school_id, school_name, email, role, status))) => {
            if status != "pending" {
                return err(
                    &req.id,
                    "invalid_token",
                    "invite already used or revoked",
                    Some(json!({ "status": status })),
                );
            }
            ok(
                &req.id,
                json!({
                    "inviteId": id,
                    "schoolId": school_id,
                    "schoolName": school_name,
                    "email": email,
                    "role": role
                }),
            )
        }
        Ok(None) => err(&req.id, "invalid_token", "unknown invite token", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

/// Consumes a pending invite: inserts the staff row and marks the invite
/// accepted in one transaction.
fn handle_invites_accept(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let token = match req.params.get("token").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing token", None),
    };
    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing name", None),
    };
    if !invite::validate_token(token) {
        return err(&req.id, "invalid_token", "malformed invite token", None);
    }

    let found = conn
        .query_row(
            "SELECT id, school_id, email, role, status FROM staff_invites WHERE token = ?",
            [token],
            |row| {
                let id: String = row.get(0)?;
                let school_id: String = row.get(1)?;
                let email: String = row.get(2)?;
                let role: String = row.get(3)?;
                let status: String = row.get(4)?;
                Ok((id, school_id, email, role, status))
            },
        )
        .optional();
    let (invite_id, school_id, email, role, status) = match found {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "invalid_token", "unknown invite token", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if status != "pending" {
        return err(
            &req.id,
            "invalid_token",
            "invite already used or revoked",
            Some(json!({ "status": status })),
        );
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let staff_id = Uuid::new_v4().to_string();
    let now = db::now_rfc3339();
    let result = tx
        .execute(
            "INSERT INTO staff(id, school_id, name, email, role, created_at)
             VALUES(?, ?, ?, ?, ?, ?)",
            (&staff_id, &school_id, &name, &email, &role, &now),
        )
        .and_then(|_| {
            tx.execute(
                "UPDATE staff_invites SET status = 'accepted', accepted_at = ? WHERE id = ?",
                (&now, &invite_id),
            )
        });
    match result {
        Ok(_) => match tx.commit() {
            Ok(()) => ok(
                &req.id,
                json!({
                    "staffId": staff_id,
                    "schoolId": school_id,
                    "name": name,
                    "email": email,
                    "role": role
                }),
            ),
            Err(e) => err(&req.id, "db_tx_failed", e.to_string(), None),
        },
        Err(e) => {
            let _ = tx.rollback();
            err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "staff" })),
            )
        }
    }
}

fn handle_staff_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let school_id = match req.params.get("schoolId").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing schoolId", None),
    };

    let staff = conn
        .prepare(
            "SELECT id, name, email, role, created_at FROM staff
             WHERE school_id = ? ORDER BY name",
        )
        .and_then(|mut stmt| {
            stmt.query_map([school_id], |row| {
                let id: String = row.get(0)?;
                let name: String = row.get(1)?;
                let email: String = row.get(2)?;
                let role: String = row.get(3)?;
                let created_at: String = row.get(4)?;
                Ok(json!({
                    "id": id,
                    "name": name,
                    "email": email,
                    "role": role,
                    "createdAt": created_at
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        });
    let staff = match staff {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let pending = conn
        .prepare(
            "SELECT id, email, role, created_at FROM staff_invites
             WHERE school_id = ? AND status = 'pending' ORDER BY created_at",
        )
        .and_then(|mut stmt| {
            stmt.query_map([school_id], |row| {
                let id: String = row.get(0)?;
                let email: String = row.get(1)?;
                let role: String = row.get(2)?;
                let created_at: String = row.get(3)?;
                Ok(json!({
                    "id": id,
                    "email": email,
                    "role": role,
                    "createdAt": created_at
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        });
    match pending {
        Ok(invites) => ok(&req.id, json!({ "staff": staff, "pendingInvites": invites })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_staff_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = check_permission(req, Permission::StaffRemove) {
        return resp;
    }
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let school_id = match req.params.get("schoolId").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing schoolId", None),
    };
    let staff_id = match req.params.get("staffId").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing staffId", None),
    };

    match conn.execute(
        "DELETE FROM staff WHERE school_id = ? AND id = ?",
        [school_id, staff_id],
    ) {
        Ok(0) => err(&req.id, "not_found", "staff member not found", None),
        Ok(_) => ok(&req.id, json!({ "deleted": true })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_staff_revoke_invite(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = check_permission(req, Permission::StaffManage) {
        return resp;
    }
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let school_id = match req.params.get("schoolId").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing schoolId", None),
    };
    let invite_id = match req.params.get("inviteId").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing inviteId", None),
    };

    match conn.execute(
        "UPDATE staff_invites SET status = 'revoked'
         WHERE school_id = ? AND id = ? AND status = 'pending'",
        [school_id, invite_id],
    ) {
        Ok(0) => err(&req.id, "not_found", "pending invite not found", None),
        Ok(_) => ok(&req.id, json!({ "revoked": true })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "staff.invite" => Some(handle_staff_invite(state, req)),
        "invites.validate" => Some(handle_invites_validate(state, req)),
        "invites.accept" => Some(handle_invites_accept(state, req)),
        "staff.list" => Some(handle_staff_list(state, req)),
        "staff.remove" => Some(handle_staff_remove(state, req)),
        "staff.revokeInvite" => Some(handle_staff_revoke_invite(state, req)),
        _ => None,
    }
}
