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
    let exe = env!("CARGO_BIN_EXE_staffroomd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn staffroomd");
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
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
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

struct School {
    class_6a: String,
    teacher: String,
}

/// Monday plan: one teacher covering 6A at periods 0, 2, 4 and 5.
fn setup_school(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> School {
    let workspace = temp_dir("staffroom-attendance");
    request_ok(
        stdin,
        reader,
        "s1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        stdin,
        reader,
        "s2",
        "auth.login",
        json!({ "role": "principal", "password": "principal123" }),
    );
    let class_6a = request_ok(
        stdin,
        reader,
        "s3",
        "classes.create",
        json!({ "name": "Class 6-A", "section": "SECONDARY" }),
    )["classId"]
        .as_str()
        .expect("classId")
        .to_string();
    let teacher = request_ok(
        stdin,
        reader,
        "s4",
        "teachers.create",
        json!({ "name": "A. Verma", "subject": "Math" }),
    )["teacherId"]
        .as_str()
        .expect("teacherId")
        .to_string();
    for (i, period) in [0u64, 2, 4, 5].iter().enumerate() {
        request_ok(
            stdin,
            reader,
            &format!("b{}", i),
            "timetable.saveBase",
            json!({
                "day": "Monday",
                "classId": class_6a,
                "periodIndex": period,
                "entry": { "teacherId": teacher, "subject": "Math" }
            }),
        );
    }
    School { class_6a, teacher }
}

fn status_at(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    teacher: &str,
    period: u64,
) -> serde_json::Value {
    request_ok(
        stdin,
        reader,
        id,
        "availability.status",
        json!({
            "teacherId": teacher,
            "date": "2024-05-06",
            "periodIndex": period
        }),
    )
}

#[test]
fn absent_overrides_every_period_regardless_of_schedule() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let school = setup_school(&mut stdin, &mut reader);

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.mark",
        json!({ "date": "2024-05-06", "teacherId": school.teacher, "status": "absent" }),
    );
    for (i, period) in [0u64, 3, 4, 6].iter().enumerate() {
        let status = status_at(&mut stdin, &mut reader, &format!("q{}", i), &school.teacher, *period);
        assert_eq!(status["status"], "ABSENT", "period {}", period);
    }
}

#[test]
fn morning_leave_stops_at_lunch_and_the_schedule_decides_after() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let school = setup_school(&mut stdin, &mut reader);

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.mark",
        json!({ "date": "2024-05-06", "teacherId": school.teacher, "status": "half_day_before" }),
    );

    let before = status_at(&mut stdin, &mut reader, "2", &school.teacher, 2);
    assert_eq!(before["status"], "MORNING_LEAVE");

    // Period 5 is after lunch: the half-day mark does not apply, so the
    // scheduled class reports as busy.
    let after = status_at(&mut stdin, &mut reader, "3", &school.teacher, 5);
    assert_eq!(after["status"], "BUSY");
    assert_eq!(after["className"], "Class 6-A");

    let free_slot = status_at(&mut stdin, &mut reader, "4", &school.teacher, 6);
    assert_eq!(free_slot["status"], "FREE");
}

#[test]
fn afternoon_leave_mirrors_the_window() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let school = setup_school(&mut stdin, &mut reader);

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.mark",
        json!({ "date": "2024-05-06", "teacherId": school.teacher, "status": "half_day_after" }),
    );
    let morning = status_at(&mut stdin, &mut reader, "2", &school.teacher, 0);
    assert_eq!(morning["status"], "BUSY");
    let afternoon = status_at(&mut stdin, &mut reader, "3", &school.teacher, 4);
    assert_eq!(afternoon["status"], "AFTERNOON_LEAVE");
}

#[test]
fn marking_present_deletes_the_stored_record() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let school = setup_school(&mut stdin, &mut reader);

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.mark",
        json!({ "date": "2024-05-06", "teacherId": school.teacher, "status": "absent" }),
    );
    let day = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.day",
        json!({ "date": "2024-05-06" }),
    );
    assert_eq!(day["marks"][&school.teacher], "absent");

    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.mark",
        json!({ "date": "2024-05-06", "teacherId": school.teacher, "status": "present" }),
    );
    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.day",
        json!({ "date": "2024-05-06" }),
    );
    assert!(cleared["marks"].as_object().expect("marks").is_empty());

    let status = status_at(&mut stdin, &mut reader, "5", &school.teacher, 0);
    assert_eq!(status["status"], "BUSY");
}

#[test]
fn substitute_assignments_show_up_as_busy() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let school = setup_school(&mut stdin, &mut reader);

    let sub = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "teachers.create",
        json!({ "name": "B. Rao" }),
    )["teacherId"]
        .as_str()
        .expect("teacherId")
        .to_string();
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "overrides.save",
        json!({
            "date": "2024-05-06",
            "classId": school.class_6a,
            "periodIndex": 0,
            "override": {
                "type": "SUBSTITUTION",
                "subTeacherId": sub,
                "subSubject": "Math",
                "originalTeacherId": school.teacher
            }
        }),
    );

    let status = status_at(&mut stdin, &mut reader, "3", &sub, 0);
    assert_eq!(status["status"], "BUSY");
    assert_eq!(status["className"], "Class 6-A");
}
