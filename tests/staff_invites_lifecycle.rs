use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_rosterd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rosterd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "expected ok for {}: {}",
        method,
        value
    );
    value.get("result").cloned().expect("result payload")
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn invite_validate_accept_then_token_is_spent() {
    let workspace = temp_dir("rosterd-invites");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "school",
        "schools.create",
        json!({ "name": "Invite School" }),
    );
    let school_id = created
        .get("schoolId")
        .and_then(|v| v.as_str())
        .expect("schoolId")
        .to_string();

    let invited = request_ok(
        &mut stdin,
        &mut reader,
        "invite",
        "staff.invite",
        json!({ "schoolId": school_id, "email": "New.Teacher@School.Test" }),
    );
    // Email is normalized, role defaults to staff, token is a 64-char hex.
    assert_eq!(
        invited.get("email").and_then(|v| v.as_str()),
        Some("new.teacher@school.test")
    );
    assert_eq!(invited.get("role").and_then(|v| v.as_str()), Some("staff"));
    let token = invited
        .get("token")
        .and_then(|v| v.as_str())
        .expect("token")
        .to_string();
    assert_eq!(token.len(), 64);
    assert!(token
        .chars()
        .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));

    let validated = request_ok(
        &mut stdin,
        &mut reader,
        "validate",
        "invites.validate",
        json!({ "token": token }),
    );
    assert_eq!(
        validated.get("schoolName").and_then(|v| v.as_str()),
        Some("Invite School")
    );

    let accepted = request_ok(
        &mut stdin,
        &mut reader,
        "accept",
        "invites.accept",
        json!({ "token": token, "name": "New Teacher" }),
    );
    let staff_id = accepted
        .get("staffId")
        .and_then(|v| v.as_str())
        .expect("staffId")
        .to_string();

    // Spent token is rejected by both validate and accept.
    let revalidate = request(
        &mut stdin,
        &mut reader,
        "revalidate",
        "invites.validate",
        json!({ "token": token }),
    );
    assert_eq!(error_code(&revalidate), Some("invalid_token"));
    let reaccept = request(
        &mut stdin,
        &mut reader,
        "reaccept",
        "invites.accept",
        json!({ "token": token, "name": "Imposter" }),
    );
    assert_eq!(error_code(&reaccept), Some("invalid_token"));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "list",
        "staff.list",
        json!({ "schoolId": school_id }),
    );
    let staff = listed
        .get("staff")
        .and_then(|v| v.as_array())
        .expect("staff");
    assert_eq!(staff.len(), 1);
    assert_eq!(
        staff[0].get("name").and_then(|v| v.as_str()),
        Some("New Teacher")
    );
    assert_eq!(
        listed
            .get("pendingInvites")
            .and_then(|v| v.as_array())
            .map(|v| v.len()),
        Some(0)
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "remove",
        "staff.remove",
        json!({ "schoolId": school_id, "staffId": staff_id }),
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn revoked_and_malformed_tokens_are_rejected() {
    let workspace = temp_dir("rosterd-invite-guards");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "school",
        "schools.create",
        json!({ "name": "Revoke School" }),
    );
    let school_id = created
        .get("schoolId")
        .and_then(|v| v.as_str())
        .expect("schoolId")
        .to_string();

    // Staff cannot mint invites.
    let denied = request(
        &mut stdin,
        &mut reader,
        "denied",
        "staff.invite",
        json!({
            "schoolId": school_id,
            "email": "x@y.test",
            "actorRole": "staff"
        }),
    );
    assert_eq!(error_code(&denied), Some("permission_denied"));

    let invited = request_ok(
        &mut stdin,
        &mut reader,
        "invite",
        "staff.invite",
        json!({ "schoolId": school_id, "email": "gone@y.test" }),
    );
    let invite_id = invited
        .get("inviteId")
        .and_then(|v| v.as_str())
        .expect("inviteId")
        .to_string();
    let token = invited
        .get("token")
        .and_then(|v| v.as_str())
        .expect("token")
        .to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "revoke",
        "staff.revokeInvite",
        json!({ "schoolId": school_id, "inviteId": invite_id }),
    );
    let validated = request(
        &mut stdin,
        &mut reader,
        "validate",
        "invites.validate",
        json!({ "token": token }),
    );
    assert_eq!(error_code(&validated), Some("invalid_token"));

    // Revoking twice finds nothing pending.
    let again = request(
        &mut stdin,
        &mut reader,
        "revoke-again",
        "staff.revokeInvite",
        json!({ "schoolId": school_id, "inviteId": invite_id }),
    );
    assert_eq!(error_code(&again), Some("not_found"));

    // Malformed tokens never hit the database.
    for (i, bad) in ["short", "Z".repeat(64).as_str(), ""].iter().enumerate() {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("bad-{i}"),
            "invites.validate",
            json!({ "token": bad }),
        );
        assert_eq!(error_code(&resp), Some("invalid_token"), "token {:?}", bad);
    }

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
