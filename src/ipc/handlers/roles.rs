use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::permissions::{self, Permission, Role, ALL_ROLES};
use serde_json::json;

fn handle_roles_matrix(req: &Request) -> serde_json::Value {
    let roles: Vec<_> = ALL_ROLES
        .iter()
        .map(|role| {
            let perms: Vec<_> = permissions::role_permissions(*role)
                .iter()
                .map(|p| {
                    json!({
                        "permission": p.as_str(),
                        "description": p.describe()
                    })
                })
                .collect();
            json!({
                "role": role.as_str(),
                "displayName": role.display_name(),
                "description": role.describe(),
                "permissions": perms
            })
        })
        .collect();
    ok(&req.id, json!({ "roles": roles }))
}

fn handle_roles_check(req: &Request) -> serde_json::Value {
    let role = match req.params.get("role").and_then(|v| v.as_str()) {
        Some(s) => match Role::parse(s) {
            Some(r) => r,
            None => return err(&req.id, "bad_params", format!("unknown role: {}", s), None),
        },
        None => return err(&req.id, "bad_params", "missing role", None),
    };
    let permission = match req.params.get("permission").and_then(|v| v.as_str()) {
        Some(s) => match Permission::parse(s) {
            Some(p) => p,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("unknown permission: {}", s),
                    None,
                )
            }
        },
        None => return err(&req.id, "bad_params", "missing permission", None),
    };

    ok(
        &req.id,
        json!({
            "role": role.as_str(),
            "permission": permission.as_str(),
            "allowed": permissions::has_permission(role, permission)
        }),
    )
}

pub fn try_handle(_state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roles.matrix" => Some(handle_roles_matrix(req)),
        "roles.check" => Some(handle_roles_check(req)),
        _ => None,
    }
}
