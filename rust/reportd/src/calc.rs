use crate::db;
use crate::grading::{self, Department, Grade, Verdict};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Leaderboard length for `rankings.topPerformers`.
pub const TOP_PERFORMERS: usize = 10;
/// Department leaderboards need at least this many marks inside the department.
pub const DEPARTMENT_MIN_SUBJECTS: usize = 2;

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

fn query_err(e: rusqlite::Error) -> CalcError {
    CalcError::new("db_query_failed", e.to_string())
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Which marks a computation looks at. `form_level: None` spans every form.
#[derive(Debug, Clone, PartialEq)]
pub struct TermFilter {
    pub term: String,
    pub academic_year: String,
    pub form_level: Option<i64>,
    pub school_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: String,
    pub student_number: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<String>,
    pub form_level: i64,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub guardian_name: Option<String>,
    pub guardian_phone: Option<String>,
    pub guardian_email: Option<String>,
    pub status: String,
    pub school_id: Option<String>,
    pub enrolled_at: String,
    pub updated_at: Option<String>,
}

impl StudentRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

pub const STUDENT_COLUMNS: &str = "id, student_number, first_name, last_name, date_of_birth,
    grade_level, email, phone, address, guardian_name, guardian_phone, guardian_email,
    status, school_id, enrolled_at, updated_at";

pub fn student_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRecord> {
    Ok(StudentRecord {
        id: r.get(0)?,
        student_number: r.get(1)?,
        first_name: r.get(2)?,
        last_name: r.get(3)?,
        date_of_birth: r.get(4)?,
        form_level: r.get(5)?,
        email: r.get(6)?,
        phone: r.get(7)?,
        address: r.get(8)?,
        guardian_name: r.get(9)?,
        guardian_phone: r.get(10)?,
        guardian_email: r.get(11)?,
        status: r.get(12)?,
        school_id: r.get(13)?,
        enrolled_at: r.get(14)?,
        updated_at: r.get(15)?,
    })
}

pub fn load_student(conn: &Connection, student_id: &str) -> Result<Option<StudentRecord>, CalcError> {
    let sql = format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS);
    conn.query_row(&sql, [student_id], student_from_row)
        .optional()
        .map_err(query_err)
}

pub fn require_student(conn: &Connection, student_id: &str) -> Result<StudentRecord, CalcError> {
    load_student(conn, student_id)?.ok_or_else(|| {
        CalcError::new("not_found", "student not found")
            .with_details(serde_json::json!({ "studentId": student_id }))
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectMark {
    pub subject: String,
    pub mark: i64,
}

/// One student's marks for a term, in report card order.
pub fn load_student_marks(
    conn: &Connection,
    student_id: &str,
    term: &str,
    academic_year: &str,
) -> Result<Vec<SubjectMark>, CalcError> {
    let mut stmt = conn
        .prepare(
            "SELECT subject, mark FROM student_marks
             WHERE student_id = ? AND term = ? AND academic_year = ?",
        )
        .map_err(query_err)?;
    let mut marks: Vec<SubjectMark> = stmt
        .query_map((student_id, term, academic_year), |r| {
            Ok(SubjectMark {
                subject: r.get(0)?,
                mark: r.get(1)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_err)?;
    marks.sort_by_key(|m| grading::subject_order(&m.subject));
    Ok(marks)
}

fn mark_values(marks: &[SubjectMark]) -> Vec<i64> {
    marks.iter().map(|m| m.mark).collect()
}

fn english_passed(marks: &[SubjectMark]) -> bool {
    marks
        .iter()
        .find(|m| m.subject == grading::ENGLISH)
        .map(|m| grading::is_pass_mark(m.mark))
        .unwrap_or(false)
}

/// Per-student aggregate over a set of marks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkSummary {
    pub subjects_taken: usize,
    pub subjects_passed: usize,
    pub english_passed: bool,
    pub english_mark: Option<i64>,
    pub average: f64,
    pub lowest_mark: i64,
    pub highest_mark: i64,
    pub verdict: Verdict,
    pub reason: String,
}

/// `None` for an empty mark set.
pub fn summarize(marks: &[SubjectMark]) -> Option<MarkSummary> {
    let values = mark_values(marks);
    let average = grading::mean(&values)?;
    let subjects_passed = values.iter().filter(|m| grading::is_pass_mark(**m)).count();
    let english = english_passed(marks);
    Some(MarkSummary {
        subjects_taken: values.len(),
        subjects_passed,
        english_passed: english,
        english_mark: marks
            .iter()
            .find(|m| m.subject == grading::ENGLISH)
            .map(|m| m.mark),
        average,
        lowest_mark: values.iter().copied().min().unwrap_or(0),
        highest_mark: values.iter().copied().max().unwrap_or(0),
        verdict: grading::determine_verdict(subjects_passed, english),
        reason: grading::status_reason(subjects_passed, english),
    })
}

#[derive(Debug, Clone)]
pub struct CohortStudent {
    pub id: String,
    pub student_number: String,
    pub first_name: String,
    pub last_name: String,
    pub form_level: i64,
    pub marks: Vec<SubjectMark>,
}

impl CohortStudent {
    pub fn name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    fn sort_name(&self) -> String {
        self.name().to_lowercase()
    }

    pub fn mark_for(&self, subject: &str) -> Option<i64> {
        self.marks.iter().find(|m| m.subject == subject).map(|m| m.mark)
    }

    pub fn average(&self) -> f64 {
        grading::mean(&mark_values(&self.marks)).unwrap_or(0.0)
    }
}

/// Ties on the score fall back to the student's name, then student number.
fn by_name(a: &CohortStudent, b: &CohortStudent) -> Ordering {
    a.sort_name()
        .cmp(&b.sort_name())
        .then_with(|| a.student_number.cmp(&b.student_number))
}

fn by_score_then_name(a: f64, sa: &CohortStudent, b: f64, sb: &CohortStudent) -> Ordering {
    b.total_cmp(&a).then_with(|| by_name(sa, sb))
}

/// Active students with at least one mark for one term and year.
///
/// Students are held in ranking order (average descending), and each subject
/// keeps its own ordering by mark, so positions for every student of a cohort
/// come from one load.
#[derive(Debug, Clone)]
pub struct Cohort {
    pub filter: TermFilter,
    students: Vec<CohortStudent>,
    by_subject: HashMap<String, Vec<usize>>,
}

impl Cohort {
    pub fn load(conn: &Connection, filter: &TermFilter) -> Result<Self, CalcError> {
        let mut stmt = conn
            .prepare(
                "SELECT s.id, s.student_number, s.first_name, s.last_name, s.grade_level,
                        m.subject, m.mark
                 FROM students s
                 JOIN student_marks m ON m.student_id = s.id
                 WHERE s.status = 'Active'
                   AND m.term = ?1
                   AND m.academic_year = ?2
                   AND (?3 IS NULL OR s.grade_level = ?3)
                   AND (?4 IS NULL OR s.school_id = ?4)
                 ORDER BY s.id",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(
                (
                    &filter.term,
                    &filter.academic_year,
                    filter.form_level,
                    filter.school_id.as_deref(),
                ),
                |r| {
                    Ok((
                        CohortStudent {
                            id: r.get(0)?,
                            student_number: r.get(1)?,
                            first_name: r.get(2)?,
                            last_name: r.get(3)?,
                            form_level: r.get(4)?,
                            marks: Vec::new(),
                        },
                        SubjectMark {
                            subject: r.get(5)?,
                            mark: r.get(6)?,
                        },
                    ))
                },
            )
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(query_err)?;

        let mut students: Vec<CohortStudent> = Vec::new();
        for (mut student, mark) in rows {
            if let Some(last) = students.last_mut().filter(|last| last.id == student.id) {
                last.marks.push(mark);
                continue;
            }
            student.marks.push(mark);
            students.push(student);
        }
        Ok(Self::from_students(filter.clone(), students))
    }

    pub fn from_students(filter: TermFilter, students: Vec<CohortStudent>) -> Self {
        let mut students: Vec<CohortStudent> = students
            .into_iter()
            .filter(|s| !s.marks.is_empty())
            .map(|mut s| {
                s.marks.sort_by_key(|m| grading::subject_order(&m.subject));
                s
            })
            .collect();
        students.sort_by(|a, b| by_score_then_name(a.average(), a, b.average(), b));

        let mut by_subject: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, student) in students.iter().enumerate() {
            for m in &student.marks {
                by_subject.entry(m.subject.clone()).or_default().push(idx);
            }
        }
        for (subject, order) in by_subject.iter_mut() {
            order.sort_by(|a, b| {
                let (sa, sb) = (&students[*a], &students[*b]);
                sb.mark_for(subject)
                    .cmp(&sa.mark_for(subject))
                    .then_with(|| by_name(sa, sb))
            });
        }

        Self {
            filter,
            students,
            by_subject,
        }
    }

    /// Narrows an all-forms cohort to one form without another query.
    pub fn for_form(&self, form_level: i64) -> Cohort {
        let mut filter = self.filter.clone();
        filter.form_level = Some(form_level);
        let students = self
            .students
            .iter()
            .filter(|s| s.form_level == form_level)
            .cloned()
            .collect();
        Cohort::from_students(filter, students)
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    /// Students in ranking order.
    pub fn students(&self) -> &[CohortStudent] {
        &self.students
    }

    pub fn position_of(&self, student_id: &str) -> Option<usize> {
        self.students
            .iter()
            .position(|s| s.id == student_id)
            .map(|i| i + 1)
    }

    pub fn ranking(&self) -> Vec<RankingRow> {
        self.students
            .iter()
            .enumerate()
            .filter_map(|(i, s)| RankingRow::new(i + 1, s))
            .collect()
    }

    /// Students holding a mark in `subject`, best mark first.
    pub fn subject_order(&self, subject: &str) -> Vec<&CohortStudent> {
        self.by_subject
            .get(subject)
            .map(|order| order.iter().map(|i| &self.students[*i]).collect())
            .unwrap_or_default()
    }

    pub fn subject_position(&self, student_id: &str, subject: &str) -> SubjectPosition {
        let order = self.subject_order(subject);
        let total = order.len();
        let position = order
            .iter()
            .position(|s| s.id == student_id)
            .map(|i| i + 1)
            .unwrap_or(0);
        SubjectPosition {
            position,
            total,
            display: format!("{}/{}", position, total),
        }
    }

    /// Re-ranks the cohort on marks inside one department. Students with fewer
    /// than `min_subjects` department marks are left out.
    pub fn department_standings(
        &self,
        department: Department,
        min_subjects: usize,
    ) -> Vec<DepartmentStanding> {
        let mut rows: Vec<(f64, usize, &CohortStudent, Vec<i64>)> = self
            .students
            .iter()
            .filter_map(|s| {
                let marks: Vec<i64> = s
                    .marks
                    .iter()
                    .filter(|m| department.contains(&m.subject))
                    .map(|m| m.mark)
                    .collect();
                if marks.is_empty() || marks.len() < min_subjects {
                    return None;
                }
                let avg = grading::mean(&marks)?;
                let passed = marks.iter().filter(|m| grading::is_pass_mark(**m)).count();
                Some((avg, passed, s, marks))
            })
            .collect();
        rows.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| b.1.cmp(&a.1))
                .then_with(|| by_name(a.2, b.2))
        });

        rows.into_iter()
            .enumerate()
            .map(|(i, (avg, passed, s, marks))| DepartmentStanding {
                rank: i + 1,
                student_id: s.id.clone(),
                student_number: s.student_number.clone(),
                name: s.name(),
                form_level: s.form_level,
                excellence_area: department,
                average: round2(avg),
                subjects_taken: marks.len(),
                subjects_passed: passed,
                lowest_mark: marks.iter().copied().min().unwrap_or(0),
                highest_mark: marks.iter().copied().max().unwrap_or(0),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingRow {
    pub rank: usize,
    pub student_id: String,
    pub student_number: String,
    pub name: String,
    pub form_level: i64,
    pub average: f64,
    pub grade: Grade,
    pub subjects_taken: usize,
    pub subjects_passed: usize,
    pub english_passed: bool,
    pub lowest_mark: i64,
    pub highest_mark: i64,
    pub verdict: Verdict,
    pub reason: String,
}

impl RankingRow {
    fn new(rank: usize, student: &CohortStudent) -> Option<Self> {
        let summary = summarize(&student.marks)?;
        Some(Self {
            rank,
            student_id: student.id.clone(),
            student_number: student.student_number.clone(),
            name: student.name(),
            form_level: student.form_level,
            average: round2(summary.average),
            grade: grading::grade_for(summary.average.trunc() as i64, student.form_level),
            subjects_taken: summary.subjects_taken,
            subjects_passed: summary.subjects_passed,
            english_passed: summary.english_passed,
            lowest_mark: summary.lowest_mark,
            highest_mark: summary.highest_mark,
            verdict: summary.verdict,
            reason: summary.reason,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentStanding {
    pub rank: usize,
    pub student_id: String,
    pub student_number: String,
    pub name: String,
    pub form_level: i64,
    pub excellence_area: Department,
    pub average: f64,
    pub subjects_taken: usize,
    pub subjects_passed: usize,
    pub lowest_mark: i64,
    pub highest_mark: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPosition {
    /// 0 when the student has no mark in the subject.
    pub position: usize,
    pub total: usize,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub position: Option<usize>,
    pub total_students: usize,
    pub aggregate_points: Option<i64>,
}

/// Class position plus senior aggregate points for one student.
///
/// `marks` are the student's own marks for the term; they drive the
/// aggregate even when the student is not part of the cohort.
pub fn student_position(
    cohort: &Cohort,
    student_id: &str,
    form_level: i64,
    marks: &[SubjectMark],
) -> Position {
    let aggregate_points = if marks.is_empty() {
        None
    } else {
        grading::aggregate_points(&mark_values(marks), form_level)
    };
    Position {
        position: cohort.position_of(student_id),
        total_students: cohort.len(),
        aggregate_points,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Overall,
    Department(Department),
}

impl Category {
    pub fn parse(s: &str) -> Option<Self> {
        if s.trim().eq_ignore_ascii_case("overall") {
            return Some(Category::Overall);
        }
        Department::parse(s).map(Category::Department)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TopPerformers {
    Overall(Vec<RankingRow>),
    Department(Vec<DepartmentStanding>),
}

impl TopPerformers {
    pub fn len(&self) -> usize {
        match self {
            TopPerformers::Overall(rows) => rows.len(),
            TopPerformers::Department(rows) => rows.len(),
        }
    }
}

pub fn top_performers(cohort: &Cohort, category: Category) -> TopPerformers {
    match category {
        Category::Overall => {
            let mut rows = cohort.ranking();
            rows.truncate(TOP_PERFORMERS);
            TopPerformers::Overall(rows)
        }
        Category::Department(department) => {
            let mut rows = cohort.department_standings(department, 1);
            rows.truncate(TOP_PERFORMERS);
            TopPerformers::Department(rows)
        }
    }
}

/// Subject teacher names for one school scope.
#[derive(Debug, Clone, Default)]
pub struct TeacherBook {
    names: HashMap<(String, i64), String>,
}

impl TeacherBook {
    pub fn load(conn: &Connection, school_id: Option<&str>) -> Result<Self, CalcError> {
        let mut stmt = conn
            .prepare(
                "SELECT subject, form_level, teacher_name FROM subject_teachers
                 WHERE school_key = ?",
            )
            .map_err(query_err)?;
        let names = stmt
            .query_map([db::school_key(school_id)], |r| {
                Ok(((r.get::<_, String>(0)?, r.get::<_, i64>(1)?), r.get::<_, String>(2)?))
            })
            .and_then(|it| it.collect::<Result<HashMap<_, _>, _>>())
            .map_err(query_err)?;
        Ok(Self { names })
    }

    pub fn name_for(&self, subject: &str, form_level: i64) -> String {
        self.names
            .get(&(subject.to_string(), form_level))
            .filter(|n| !n.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| db::default_teacher_name(subject, form_level))
    }
}
