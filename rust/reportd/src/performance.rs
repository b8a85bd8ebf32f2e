use crate::calc::{self, Cohort, DepartmentStanding, RankingRow, TeacherBook};
use crate::grading::{self, Department, Grade, STANDARD_SUBJECTS};
use serde::Serialize;
use std::fmt::Write as _;

pub const DEFAULT_TOP_N: usize = 10;
pub const COMPREHENSIVE_TOP_N: usize = 5;

const WIDTH: usize = 90;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassLeaders {
    pub report_type: String,
    pub form_level: i64,
    pub term: String,
    pub academic_year: String,
    pub top_students: Vec<RankingRow>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectLeader {
    pub rank: usize,
    pub student_id: String,
    pub student_number: String,
    pub name: String,
    pub form_level: i64,
    pub mark: i64,
    pub grade: Grade,
    pub teacher: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectLeaders {
    pub report_type: String,
    pub subject: String,
    pub term: String,
    pub academic_year: String,
    pub top_students: Vec<SubjectLeader>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentLeaders {
    pub report_type: String,
    pub department: Department,
    pub description: String,
    pub subjects: Vec<String>,
    pub term: String,
    pub academic_year: String,
    pub top_students: Vec<DepartmentStanding>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comprehensive {
    pub report_type: String,
    pub school_name: String,
    pub term: String,
    pub academic_year: String,
    pub by_class: Vec<ClassLeaders>,
    pub by_subject: Vec<SubjectLeaders>,
    pub by_department: Vec<DepartmentLeaders>,
    pub generated_at: String,
    pub text: String,
}

fn rule(out: &mut String, ch: char) {
    out.extend(std::iter::repeat(ch).take(WIDTH));
    out.push('\n');
}

fn centered(out: &mut String, text: &str) {
    let pad = WIDTH.saturating_sub(text.chars().count()) / 2;
    let _ = writeln!(out, "{}{}", " ".repeat(pad), text);
}

fn truncated(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn header(out: &mut String, school_name: &str, title: &str, lines: &[(&str, String)]) {
    rule(out, '=');
    centered(out, school_name);
    centered(out, "BEST PERFORMING STUDENTS REPORT");
    centered(out, title);
    rule(out, '=');
    for (label, value) in lines {
        let _ = writeln!(out, "{}: {}", label, value);
    }
    let _ = writeln!(
        out,
        "REPORT GENERATED: {}",
        chrono::Local::now().format("%d/%m/%Y at %H:%M")
    );
    rule(out, '=');
}

pub fn by_class(cohort: &Cohort, form_level: i64, top_n: usize, school_name: &str) -> ClassLeaders {
    let mut top_students = cohort.ranking();
    top_students.truncate(top_n);
    let report_type = format!("Best Performing Students - Form {}", form_level);

    let mut text = String::new();
    if top_students.is_empty() {
        text.push_str("No performance data available\n");
    } else {
        header(
            &mut text,
            school_name,
            &report_type,
            &[
                ("ACADEMIC YEAR", cohort.filter.academic_year.clone()),
                ("TERM", cohort.filter.term.clone()),
            ],
        );
        let _ = writeln!(
            text,
            "{:<6} {:<12} {:<25} {:<8} {:<8} {:<7} {:<12}",
            "Rank", "Student No", "Full Name", "Average", "Subjects", "Passed", "Range"
        );
        rule(&mut text, '-');
        for row in &top_students {
            let _ = writeln!(
                text,
                "{:<6} {:<12} {:<25} {:<8} {:<8} {:<7} {:<12}",
                row.rank,
                row.student_number,
                truncated(&row.name, 24),
                format!("{:.1}%", row.average),
                row.subjects_taken,
                row.subjects_passed,
                format!("{}-{}%", row.lowest_mark, row.highest_mark),
            );
        }
        rule(&mut text, '=');
        text.push_str("Ranking: overall average, then student name.\n");
    }

    ClassLeaders {
        report_type,
        form_level,
        term: cohort.filter.term.clone(),
        academic_year: cohort.filter.academic_year.clone(),
        top_students,
        text,
    }
}

/// Best marks in one subject across the cohort (all forms when the cohort is
/// not restricted to one).
pub fn by_subject(
    cohort: &Cohort,
    subject: &str,
    top_n: usize,
    teachers: &TeacherBook,
    school_name: &str,
) -> SubjectLeaders {
    let top_students: Vec<SubjectLeader> = cohort
        .subject_order(subject)
        .into_iter()
        .take(top_n)
        .enumerate()
        .filter_map(|(i, s)| {
            let mark = s.mark_for(subject)?;
            Some(SubjectLeader {
                rank: i + 1,
                student_id: s.id.clone(),
                student_number: s.student_number.clone(),
                name: s.name(),
                form_level: s.form_level,
                mark,
                grade: grading::grade_for(mark, s.form_level),
                teacher: teachers.name_for(subject, s.form_level),
            })
        })
        .collect();
    let report_type = format!("Best Performing Students - {}", subject);

    let mut text = String::new();
    if top_students.is_empty() {
        text.push_str("No performance data available\n");
    } else {
        header(
            &mut text,
            school_name,
            &report_type,
            &[
                ("SUBJECT", subject.to_string()),
                ("ACADEMIC YEAR", cohort.filter.academic_year.clone()),
                ("TERM", cohort.filter.term.clone()),
            ],
        );
        let _ = writeln!(
            text,
            "{:<6} {:<12} {:<25} {:<6} {:<8} {:<6} {:<20}",
            "Rank", "Student No", "Full Name", "Form", "Mark", "Grade", "Teacher"
        );
        rule(&mut text, '-');
        for row in &top_students {
            let _ = writeln!(
                text,
                "{:<6} {:<12} {:<25} {:<6} {:<8} {:<6} {:<20}",
                row.rank,
                row.student_number,
                truncated(&row.name, 24),
                row.form_level,
                format!("{}%", row.mark),
                row.grade.to_string(),
                truncated(&row.teacher, 19),
            );
        }
        rule(&mut text, '=');
    }

    SubjectLeaders {
        report_type,
        subject: subject.to_string(),
        term: cohort.filter.term.clone(),
        academic_year: cohort.filter.academic_year.clone(),
        top_students,
        text,
    }
}

pub fn by_department(
    cohort: &Cohort,
    department: Department,
    top_n: usize,
    school_name: &str,
) -> DepartmentLeaders {
    let mut top_students = cohort.department_standings(department, calc::DEPARTMENT_MIN_SUBJECTS);
    top_students.truncate(top_n);
    let report_type = format!("Best Performing Students - {} Department", department.name());
    let subjects: Vec<String> = department.subjects().iter().map(|s| s.to_string()).collect();

    let mut text = String::new();
    if top_students.is_empty() {
        text.push_str("No performance data available\n");
    } else {
        header(
            &mut text,
            school_name,
            &report_type,
            &[
                ("DEPARTMENT", department.name().to_string()),
                ("SUBJECTS INCLUDED", subjects.join(", ")),
                ("ACADEMIC YEAR", cohort.filter.academic_year.clone()),
                ("TERM", cohort.filter.term.clone()),
            ],
        );
        let _ = writeln!(
            text,
            "{:<6} {:<12} {:<25} {:<6} {:<8} {:<8} {:<7}",
            "Rank", "Student No", "Full Name", "Form", "Avg", "Subjects", "Passed"
        );
        rule(&mut text, '-');
        for row in &top_students {
            let _ = writeln!(
                text,
                "{:<6} {:<12} {:<25} {:<6} {:<8} {:<8} {:<7}",
                row.rank,
                row.student_number,
                truncated(&row.name, 24),
                row.form_level,
                format!("{:.1}%", row.average),
                row.subjects_taken,
                row.subjects_passed,
            );
        }
        rule(&mut text, '=');
        let _ = writeln!(
            text,
            "Only students with at least {} {} marks are ranked.",
            calc::DEPARTMENT_MIN_SUBJECTS,
            department.name()
        );
    }

    DepartmentLeaders {
        report_type,
        department,
        description: department.description().to_string(),
        subjects,
        term: cohort.filter.term.clone(),
        academic_year: cohort.filter.academic_year.clone(),
        top_students,
        text,
    }
}

/// Top five per form, per subject and per department from one all-forms
/// cohort. Groups without qualifying students are left out.
pub fn comprehensive(cohort: &Cohort, teachers: &TeacherBook, school_name: &str) -> Comprehensive {
    let by_class: Vec<ClassLeaders> = (1..=4)
        .map(|form| by_class(&cohort.for_form(form), form, COMPREHENSIVE_TOP_N, school_name))
        .filter(|r| !r.top_students.is_empty())
        .collect();
    let by_subject: Vec<SubjectLeaders> = STANDARD_SUBJECTS
        .iter()
        .map(|s| by_subject(cohort, s, COMPREHENSIVE_TOP_N, teachers, school_name))
        .filter(|r| !r.top_students.is_empty())
        .collect();
    let by_department: Vec<DepartmentLeaders> = Department::ALL
        .iter()
        .map(|d| by_department(cohort, *d, COMPREHENSIVE_TOP_N, school_name))
        .filter(|r| !r.top_students.is_empty())
        .collect();

    let mut text = String::new();
    rule(&mut text, '=');
    centered(&mut text, school_name);
    centered(&mut text, "COMPREHENSIVE PERFORMANCE ANALYSIS");
    let _ = writeln!(
        text,
        "TERM: {}  ACADEMIC YEAR: {}",
        cohort.filter.term, cohort.filter.academic_year
    );
    rule(&mut text, '=');
    if by_class.is_empty() && by_subject.is_empty() && by_department.is_empty() {
        text.push_str("No performance data available\n");
    }
    for section in by_class.iter().map(|r| &r.text) {
        text.push('\n');
        text.push_str(section);
    }
    for section in by_subject.iter().map(|r| &r.text) {
        text.push('\n');
        text.push_str(section);
    }
    for section in by_department.iter().map(|r| &r.text) {
        text.push('\n');
        text.push_str(section);
    }

    Comprehensive {
        report_type: "Comprehensive Performance Analysis".to_string(),
        school_name: school_name.to_string(),
        term: cohort.filter.term.clone(),
        academic_year: cohort.filter.academic_year.clone(),
        by_class,
        by_subject,
        by_department,
        generated_at: chrono::Local::now().to_rfc3339(),
        text,
    }
}
