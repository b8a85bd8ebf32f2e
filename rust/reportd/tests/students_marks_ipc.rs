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
    let exe = env!("CARGO_BIN_EXE_reportd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn reportd");
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
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<String> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn str_at<'a>(value: &'a serde_json::Value, key: &str) -> &'a str {
    value.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

#[test]
fn student_numbers_listing_and_status() {
    let workspace = temp_dir("reportd-students-lifecycle");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let zeb = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({ "firstName": "Zeb", "lastName": "Chirwa", "formLevel": 1, "guardianName": "Mr Chirwa" }),
    );
    let amy = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "firstName": " Amy ", "lastName": "Tembo", "formLevel": 2 }),
    );
    assert_eq!(str_at(&zeb, "studentNumber"), "0001");
    assert_eq!(str_at(&amy, "studentNumber"), "0002");
    let zeb_id = str_at(&zeb, "studentId").to_string();

    let listed = request_ok(&mut stdin, &mut reader, "4", "students.list", json!({}));
    let names: Vec<&str> = listed
        .get("students")
        .and_then(|v| v.as_array())
        .expect("students")
        .iter()
        .map(|s| str_at(s, "firstName"))
        .collect();
    assert_eq!(names, vec!["Amy", "Zeb"]);

    let form1 = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.list",
        json!({ "formLevel": 1 }),
    );
    let form1 = form1.get("students").and_then(|v| v.as_array()).expect("students");
    assert_eq!(form1.len(), 1);
    assert_eq!(str_at(&form1[0], "guardianName"), "Mr Chirwa");
    assert_eq!(form1[0].get("formLevel").and_then(|v| v.as_i64()), Some(1));

    let bad_form = request(
        &mut stdin,
        &mut reader,
        "6",
        "students.create",
        json!({ "firstName": "X", "lastName": "Y", "formLevel": 5 }),
    );
    assert_eq!(error_code(&bad_form).as_deref(), Some("bad_params"));
    let blank = request(
        &mut stdin,
        &mut reader,
        "7",
        "students.create",
        json!({ "firstName": "  ", "lastName": "Y", "formLevel": 2 }),
    );
    assert_eq!(error_code(&blank).as_deref(), Some("bad_params"));

    request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "students.setStatus",
        json!({ "studentId": zeb_id, "status": "Withdrawn" }),
    );
    let active = request_ok(&mut stdin, &mut reader, "9", "students.list", json!({}));
    assert_eq!(
        active.get("students").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(1)
    );
    let everyone = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "students.list",
        json!({ "includeWithdrawn": true }),
    );
    assert_eq!(
        everyone.get("students").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(2)
    );

    let bad_status = request(
        &mut stdin,
        &mut reader,
        "11",
        "students.setStatus",
        json!({ "studentId": zeb_id, "status": "Graduated" }),
    );
    assert_eq!(error_code(&bad_status).as_deref(), Some("bad_params"));

    request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "students.update",
        json!({ "studentId": zeb_id, "firstName": "Zebedee", "lastName": "Chirwa" }),
    );
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "students.get",
        json!({ "studentId": zeb_id }),
    );
    let student = got.get("student").expect("student");
    assert_eq!(str_at(student, "firstName"), "Zebedee");
    assert_eq!(str_at(student, "status"), "Withdrawn");
    assert!(student.get("updatedAt").map(|v| v.is_string()).unwrap_or(false));

    let missing = request(
        &mut stdin,
        &mut reader,
        "14",
        "students.get",
        json!({ "studentId": "no-such-student" }),
    );
    assert_eq!(error_code(&missing).as_deref(), Some("not_found"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn marks_are_validated_as_a_batch_and_deleted_with_the_student() {
    let workspace = temp_dir("reportd-marks-batch");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({ "firstName": "Mphatso", "lastName": "Gondwe", "formLevel": 4 }),
    );
    let student_id = str_at(&created, "studentId").to_string();
    let term = |marks: serde_json::Value| {
        json!({
            "studentId": student_id,
            "term": "Term 2",
            "academicYear": "2024-2025",
            "marks": marks,
        })
    };

    let rejected = request(
        &mut stdin,
        &mut reader,
        "3",
        "marks.save",
        term(json!({ "English": 70, "Physics": 101 })),
    );
    assert_eq!(error_code(&rejected).as_deref(), Some("bad_params"));
    let unknown = request(
        &mut stdin,
        &mut reader,
        "4",
        "marks.save",
        term(json!({ "Latin": 70 })),
    );
    assert_eq!(error_code(&unknown).as_deref(), Some("bad_params"));

    let lookup = json!({ "studentId": student_id, "term": "Term 2", "academicYear": "2024-2025" });
    let empty = request_ok(&mut stdin, &mut reader, "5", "marks.get", lookup.clone());
    assert_eq!(
        empty.get("marks").and_then(|v| v.as_object()).map(|m| m.len()),
        Some(0),
        "a rejected batch must not write any mark"
    );

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "marks.save",
        term(json!({ "English": 70, "Physics": "76", "Biology": "" })),
    );
    assert_eq!(saved.get("saved").and_then(|v| v.as_u64()), Some(2));
    request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "marks.save",
        term(json!({ "English": 74 })),
    );

    let marks = request_ok(&mut stdin, &mut reader, "8", "marks.get", lookup.clone());
    let marks = marks.get("marks").expect("marks");
    assert_eq!(marks["English"]["mark"].as_i64(), Some(74));
    assert_eq!(marks["English"]["grade"].as_str(), Some("2"));
    assert_eq!(marks["Physics"]["grade"].as_str(), Some("1"));
    assert!(marks.get("Biology").is_none());

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "students.delete",
        json!({ "studentId": student_id }),
    );
    assert_eq!(deleted.get("marksDeleted").and_then(|v| v.as_u64()), Some(2));
    let gone = request(
        &mut stdin,
        &mut reader,
        "10",
        "students.delete",
        json!({ "studentId": student_id }),
    );
    assert_eq!(error_code(&gone).as_deref(), Some("not_found"));

    drop(stdin);
    let _ = child.wait();

    let conn = rusqlite::Connection::open(workspace.join("reportd.sqlite3")).expect("open db");
    let orphans: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM student_marks WHERE student_id = ?",
            [&student_id],
            |r| r.get(0),
        )
        .expect("count marks");
    assert_eq!(orphans, 0);
    drop(conn);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn marks_get_grades_on_the_current_form_like_report_cards() {
    let workspace = temp_dir("reportd-marks-form-override");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({ "firstName": "Chisomo", "lastName": "Nyirenda", "formLevel": 1 }),
    );
    let student_id = str_at(&created, "studentId").to_string();
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "marks.save",
        json!({
            "studentId": student_id,
            "term": "Term 1",
            "academicYear": "2024-2025",
            "formLevel": 3,
            "marks": { "English": 82 },
        }),
    );

    let lookup = json!({ "studentId": student_id, "term": "Term 1", "academicYear": "2024-2025" });
    let got = request_ok(&mut stdin, &mut reader, "4", "marks.get", lookup.clone());
    assert_eq!(got["formLevel"].as_i64(), Some(1));
    let english = &got["marks"]["English"];
    assert_eq!(english["grade"].as_str(), Some("A"));
    assert_eq!(english["recordedGrade"].as_str(), Some("1"));
    assert_eq!(english["recordedFormLevel"].as_i64(), Some(3));

    let card = request_ok(&mut stdin, &mut reader, "5", "reports.studentCard", lookup);
    let line = card["report"]["subjects"]
        .as_array()
        .and_then(|a| a.iter().find(|s| s["subject"].as_str() == Some("English")))
        .expect("english line");
    assert_eq!(line["grade"], english["grade"]);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
