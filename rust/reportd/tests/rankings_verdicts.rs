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
    assert!(!line.trim().is_empty(), "empty response for {}", method);
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
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn add_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    first: &str,
    last: &str,
    marks: serde_json::Value,
) -> String {
    let created = request_ok(
        stdin,
        reader,
        &format!("create-{}", first),
        "students.create",
        json!({ "firstName": first, "lastName": last, "formLevel": 3 }),
    );
    let student_id = created
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();
    if marks.as_object().map(|m| !m.is_empty()).unwrap_or(false) {
        request_ok(
            stdin,
            reader,
            &format!("marks-{}", first),
            "marks.save",
            json!({
                "studentId": student_id,
                "term": "Term 1",
                "academicYear": "2024-2025",
                "marks": marks,
            }),
        );
    }
    student_id
}

struct Class {
    brian: String,
    alice: String,
    chikondi: String,
    esther: String,
}

fn seed_form_three(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> Class {
    let alice = add_student(
        stdin,
        reader,
        "Alice",
        "Phiri",
        json!({ "English": 80, "Mathematics": 78, "Biology": 76, "Chemistry": 75, "Physics": 72, "Geography": 70 }),
    );
    let brian = add_student(
        stdin,
        reader,
        "Brian",
        "Mwale",
        json!({ "English": 45, "Mathematics": 90, "Biology": 85, "Chemistry": 88, "Physics": 80, "Geography": 82, "History": 84 }),
    );
    let chikondi = add_student(
        stdin,
        reader,
        "Chikondi",
        "Banda",
        json!({ "English": 50, "Mathematics": 55, "Biology": 60, "Chemistry": 52, "Physics": 51, "Geography": 58, "History": 53 }),
    );
    add_student(
        stdin,
        reader,
        "Dalitso",
        "Zulu",
        json!({ "English": 60, "Mathematics": 60 }),
    );
    add_student(
        stdin,
        reader,
        "Ada",
        "Kalua",
        json!({ "English": 60, "Mathematics": 60 }),
    );
    let esther = add_student(stdin, reader, "Esther", "Nkhoma", json!({}));
    Class {
        brian,
        alice,
        chikondi,
        esther,
    }
}

fn rankings(value: &serde_json::Value) -> Vec<serde_json::Value> {
    value
        .get("rankings")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("rankings array")
}

#[test]
fn ranking_orders_by_average_then_name_and_carries_verdicts() {
    let workspace = temp_dir("reportd-rankings-verdicts");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = seed_form_three(&mut stdin, &mut reader);
    let params = json!({ "formLevel": 3, "term": "Term 1", "academicYear": "2024-2025" });

    let first = request_ok(&mut stdin, &mut reader, "r1", "rankings.compute", params.clone());
    let second = request_ok(&mut stdin, &mut reader, "r2", "rankings.compute", params.clone());
    assert_eq!(first, second, "ranking must be stable across calls");
    assert_eq!(first.get("totalStudents").and_then(|v| v.as_u64()), Some(5));

    let rows = rankings(&first);
    let names: Vec<&str> = rows
        .iter()
        .map(|r| r.get("name").and_then(|v| v.as_str()).unwrap_or(""))
        .collect();
    assert_eq!(
        names,
        vec![
            "Brian Mwale",
            "Alice Phiri",
            "Ada Kalua",
            "Dalitso Zulu",
            "Chikondi Banda"
        ]
    );
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.get("rank").and_then(|v| v.as_u64()), Some(i as u64 + 1));
    }

    let brian = &rows[0];
    assert_eq!(brian.get("verdict").and_then(|v| v.as_str()), Some("FAIL"));
    assert_eq!(
        brian.get("reason").and_then(|v| v.as_str()),
        Some("Failed English (English is mandatory for pass)")
    );
    assert_eq!(brian.get("subjectsPassed").and_then(|v| v.as_u64()), Some(6));
    assert_eq!(brian.get("average").and_then(|v| v.as_f64()), Some(79.14));
    assert_eq!(brian.get("lowestMark").and_then(|v| v.as_i64()), Some(45));

    let chikondi = &rows[4];
    assert_eq!(chikondi.get("verdict").and_then(|v| v.as_str()), Some("PASS"));
    assert_eq!(chikondi.get("subjectsPassed").and_then(|v| v.as_u64()), Some(7));
    assert_eq!(chikondi.get("englishPassed").and_then(|v| v.as_bool()), Some(true));

    let ada = &rows[2];
    assert_eq!(ada.get("verdict").and_then(|v| v.as_str()), Some("FAIL"));
    assert_eq!(
        ada.get("reason").and_then(|v| v.as_str()),
        Some("Passed only 2 subjects (minimum 6 required)")
    );

    assert!(rows
        .iter()
        .all(|r| r.get("studentId").and_then(|v| v.as_str()) != Some(class.esther.as_str())));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn positions_and_aggregate_points_follow_the_cohort() {
    let workspace = temp_dir("reportd-rankings-positions");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = seed_form_three(&mut stdin, &mut reader);
    let term = |student_id: &str| {
        json!({ "studentId": student_id, "term": "Term 1", "academicYear": "2024-2025" })
    };

    let top = request_ok(&mut stdin, &mut reader, "p1", "rankings.position", term(&class.brian));
    assert_eq!(top.get("position").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(top.get("totalStudents").and_then(|v| v.as_u64()), Some(5));

    let alice = request_ok(&mut stdin, &mut reader, "p2", "rankings.position", term(&class.alice));
    assert_eq!(alice.get("position").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(alice.get("aggregatePoints").and_then(|v| v.as_i64()), Some(8));

    let chikondi = request_ok(
        &mut stdin,
        &mut reader,
        "p3",
        "rankings.position",
        term(&class.chikondi),
    );
    assert_eq!(chikondi.get("aggregatePoints").and_then(|v| v.as_i64()), Some(32));

    let esther = request_ok(&mut stdin, &mut reader, "p4", "rankings.position", term(&class.esther));
    assert!(esther.get("position").map(|v| v.is_null()).unwrap_or(false));
    assert!(esther
        .get("aggregatePoints")
        .map(|v| v.is_null())
        .unwrap_or(false));

    let mut subject = term(&class.alice);
    subject["subject"] = json!("English");
    let english = request_ok(&mut stdin, &mut reader, "p5", "rankings.subjectPosition", subject);
    assert_eq!(english.get("position").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(english.get("total").and_then(|v| v.as_u64()), Some(5));
    assert_eq!(english.get("display").and_then(|v| v.as_str()), Some("1/5"));

    let mut missing = term(&class.alice);
    missing["subject"] = json!("History");
    let history = request_ok(&mut stdin, &mut reader, "p6", "rankings.subjectPosition", missing);
    assert_eq!(history.get("display").and_then(|v| v.as_str()), Some("0/2"));

    request_ok(
        &mut stdin,
        &mut reader,
        "p7",
        "students.setStatus",
        json!({ "studentId": class.brian, "status": "Withdrawn" }),
    );
    let after = request_ok(&mut stdin, &mut reader, "p8", "rankings.position", term(&class.alice));
    assert_eq!(after.get("position").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(after.get("totalStudents").and_then(|v| v.as_u64()), Some(4));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn department_leaders_need_two_department_marks() {
    let workspace = temp_dir("reportd-rankings-departments");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_form_three(&mut stdin, &mut reader);

    let sciences = request_ok(
        &mut stdin,
        &mut reader,
        "d1",
        "performance.byDepartment",
        json!({ "department": "Sciences", "formLevel": 3, "term": "Term 1", "academicYear": "2024-2025" }),
    );
    let leaders = sciences
        .get("topStudents")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("topStudents array");
    let names: Vec<&str> = leaders
        .iter()
        .map(|r| r.get("name").and_then(|v| v.as_str()).unwrap_or(""))
        .collect();
    // Ada and Dalitso hold a single science mark (Mathematics) each.
    assert_eq!(names, vec!["Brian Mwale", "Alice Phiri", "Chikondi Banda"]);

    let top = request_ok(
        &mut stdin,
        &mut reader,
        "d2",
        "rankings.topPerformers",
        json!({ "category": "sciences", "formLevel": 3, "term": "Term 1", "academicYear": "2024-2025" }),
    );
    assert_eq!(top.get("count").and_then(|v| v.as_u64()), Some(5));

    let bad = request(
        &mut stdin,
        &mut reader,
        "d3",
        "performance.byDepartment",
        json!({ "department": "Arts", "term": "Term 1", "academicYear": "2024-2025" }),
    );
    assert_eq!(
        bad.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_params")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
