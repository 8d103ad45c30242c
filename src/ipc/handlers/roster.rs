use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::check_permission;
use crate::ipc::types::{AppState, Request};
use crate::permissions::Permission;
use crate::roster::{self, RosterImporter};
use crate::store::SqliteRosterStore;
use serde_json::json;

/// Bulk CSV import. Parse and normalize up front, then hand the whole
/// batch to the reconciliation engine; the response carries one outcome
/// per input row plus aggregate counters.
fn handle_roster_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = check_permission(req, Permission::DataImport) {
        return resp;
    }

    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let school_id = match req.params.get("schoolId").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing schoolId", None),
    };
    let csv_text = match req.params.get("csvText").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing csvText", None),
    };

    match db::school_exists(conn, school_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "school not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let rows = match roster::parse_rows(csv_text) {
        Ok(rows) => rows,
        Err(e) => return err(&req.id, "csv_parse_failed", format!("{e:#}"), None),
    };

    let mut store = SqliteRosterStore::new(conn);
    let outcome = match RosterImporter::new(&mut store).reconcile(school_id, &rows) {
        Ok(o) => o,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
    };

    log::info!(
        "roster import for school {}: {} rows, {} ok, {} failed, created {}p/{}s/{}l",
        school_id,
        outcome.summary.total,
        outcome.summary.successful,
        outcome.summary.failed,
        outcome.summary.parents_created,
        outcome.summary.students_created,
        outcome.summary.links_created
    );

    ok(
        &req.id,
        json!({
            "rows": outcome.rows,
            "summary": outcome.summary
        }),
    )
}

fn handle_roster_template(req: &Request) -> serde_json::Value {
    match roster::template_csv() {
        Ok(text) => ok(
            &req.id,
            json!({ "filename": "roster_template.csv", "csvText": text }),
        ),
        Err(e) => err(&req.id, "internal", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.import" => Some(handle_roster_import(state, req)),
        "roster.template" => Some(handle_roster_template(req)),
        _ => None,
    }
}
