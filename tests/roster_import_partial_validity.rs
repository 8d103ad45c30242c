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

fn setup_school(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &std::path::Path,
    name: &str,
) -> String {
    let _ = request_ok(
        stdin,
        reader,
        "setup-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        stdin,
        reader,
        "setup-school",
        "schools.create",
        json!({ "name": name }),
    );
    created
        .get("schoolId")
        .and_then(|v| v.as_str())
        .expect("schoolId")
        .to_string()
}

/// A row missing a required field is reported and skipped without creating
/// the parent, even though its parent columns were complete.
#[test]
fn row_with_missing_grade_creates_no_entities() {
    let workspace = temp_dir("rosterd-partial");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let school_id = setup_school(&mut stdin, &mut reader, &workspace, "Partial School");

    let csv_text = "parent_name,parent_phone_number,parent_email,parent_relationship,student_name,student_grade,student_date_of_birth\n\
                    Good Parent,+1666,,,Good Kid,P4,\n\
                    Bad Parent,+1777,,,Orphan Row,,\n";
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "import",
        "roster.import",
        json!({ "schoolId": school_id, "csvText": csv_text }),
    );

    let rows = result.get("rows").and_then(|v| v.as_array()).expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("success").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        rows[1].get("success").and_then(|v| v.as_bool()),
        Some(false)
    );
    let error = rows[1].get("error").and_then(|v| v.as_str()).expect("error");
    assert!(error.contains("Missing required fields"), "got: {}", error);

    let summary = result.get("summary").expect("summary");
    assert_eq!(summary.get("successful").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(summary.get("failed").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(
        summary.get("parentsCreated").and_then(|v| v.as_u64()),
        Some(1)
    );

    // The +1777 parent must not exist.
    let parents = request_ok(
        &mut stdin,
        &mut reader,
        "parents",
        "parents.list",
        json!({ "schoolId": school_id }),
    );
    let phones: Vec<&str> = parents
        .get("parents")
        .and_then(|v| v.as_array())
        .expect("parents")
        .iter()
        .filter_map(|p| p.get("phoneNumber").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(phones, vec!["+1666"]);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

/// Header matching is case- and whitespace-insensitive, and unlisted
/// optional columns simply default.
#[test]
fn header_variations_are_tolerated() {
    let workspace = temp_dir("rosterd-headers");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let school_id = setup_school(&mut stdin, &mut reader, &workspace, "Header School");

    let csv_text = "Parent Name,PARENT PHONE NUMBER,Student Name,student grade\n\
                    Header Parent,+1888,Header Kid,P5\n";
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "import",
        "roster.import",
        json!({ "schoolId": school_id, "csvText": csv_text }),
    );
    let rows = result.get("rows").and_then(|v| v.as_array()).expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("success").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        rows[0]
            .get("data")
            .and_then(|d| d.get("parentRelationship"))
            .and_then(|v| v.as_str()),
        Some("Parent")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

/// A structurally broken file fails the whole request before any store
/// write; a following import sees an empty school.
#[test]
fn structurally_invalid_csv_fails_whole_import() {
    let workspace = temp_dir("rosterd-badcsv");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let school_id = setup_school(&mut stdin, &mut reader, &workspace, "Bad CSV School");

    // Second record has the wrong number of fields.
    let csv_text = "parent_name,parent_phone_number,parent_email,parent_relationship,student_name,student_grade,student_date_of_birth\n\
                    Fine Parent,+1999,,,Fine Kid,P6,\n\
                    broken,row\n";
    let resp = request(
        &mut stdin,
        &mut reader,
        "import",
        "roster.import",
        json!({ "schoolId": school_id, "csvText": csv_text }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("csv_parse_failed")
    );

    let parents = request_ok(
        &mut stdin,
        &mut reader,
        "parents",
        "parents.list",
        json!({ "schoolId": school_id }),
    );
    assert_eq!(
        parents
            .get("parents")
            .and_then(|v| v.as_array())
            .map(|v| v.len()),
        Some(0)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

/// Unknown school and staff actor are rejected before parsing.
#[test]
fn import_guards_run_before_the_engine() {
    let workspace = temp_dir("rosterd-guards");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let school_id = setup_school(&mut stdin, &mut reader, &workspace, "Guard School");

    let resp = request(
        &mut stdin,
        &mut reader,
        "missing-school",
        "roster.import",
        json!({ "schoolId": "no-such-school", "csvText": "parent_name\nX\n" }),
    );
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_found")
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "staff-actor",
        "roster.import",
        json!({
            "schoolId": school_id,
            "csvText": "parent_name\nX\n",
            "actorRole": "staff"
        }),
    );
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("permission_denied")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
