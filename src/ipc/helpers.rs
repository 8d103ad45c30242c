use crate::ipc::error::err;
use crate::ipc::types::Request;
use crate::permissions::{self, Permission, Role};

/// Role the request acts as. Absent means owner: the daemon runs locally
/// for a single operator unless a front end says otherwise.
pub fn actor_role(req: &Request) -> Result<Role, serde_json::Value> {
    match req.params.get("actorRole").and_then(|v| v.as_str()) {
        None => Ok(Role::Owner),
        Some(s) => Role::parse(s)
            .ok_or_else(|| err(&req.id, "bad_params", format!("unknown role: {}", s), None)),
    }
}

/// Returns an error response when the acting role lacks `permission`.
pub fn check_permission(req: &Request, permission: Permission) -> Option<serde_json::Value> {
    match actor_role(req) {
        Err(resp) => Some(resp),
        Ok(role) => {
            if permissions::has_permission(role, permission) {
                None
            } else {
                Some(err(
                    &req.id,
                    "permission_denied",
                    format!(
                        "role '{}' lacks permission '{}'",
                        role.as_str(),
                        permission.as_str()
                    ),
                    None,
                ))
            }
        }
    }
}
