use crate::calc::{self, CalcError, Cohort, StudentRecord, SubjectMark, TeacherBook};
use crate::grading::{self, Grade, Verdict, STANDARD_SUBJECTS};
use crate::settings::SchoolSettings;
use serde::Serialize;
use std::fmt::Write as _;

const WIDTH: usize = 80;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolBlock {
    pub name: String,
    pub address_lines: Vec<String>,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentBlock {
    pub student_id: String,
    pub student_number: String,
    pub name: String,
    pub form_level: i64,
    pub term: String,
    pub academic_year: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectLine {
    pub subject: String,
    pub taken: bool,
    pub mark: Option<i64>,
    pub grade: Option<Grade>,
    pub position: Option<String>,
    pub comment: String,
    pub teacher: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Boilerplate {
    pub next_term_begins: String,
    pub pta_fund: String,
    pub sdf_fund: String,
    pub boarding_fee: String,
    pub girls_uniform: String,
    pub boys_uniform: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Junior,
    Senior,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    pub school: SchoolBlock,
    pub student: StudentBlock,
    pub subjects: Vec<SubjectLine>,
    pub position: Option<usize>,
    pub total_students: usize,
    pub tier: Tier,
    pub average_grade: Option<Grade>,
    pub aggregate_points: Option<i64>,
    pub grading_legend: String,
    pub subjects_taken: usize,
    pub subjects_passed: usize,
    pub average: f64,
    pub english_passed: bool,
    pub verdict: Verdict,
    pub reason: String,
    pub form_teacher_comment: String,
    pub head_teacher_comment: String,
    pub boilerplate: Boilerplate,
    pub generated_at: String,
}

/// Assembles one student's term report.
///
/// `marks` are the student's own marks for the term; `cohort` is the
/// student's form for the same term and supplies class and subject positions.
/// An empty mark set is `no_data`, never an empty card.
pub fn build_report_card(
    student: &StudentRecord,
    marks: &[SubjectMark],
    cohort: &Cohort,
    settings: &SchoolSettings,
    teachers: &TeacherBook,
) -> Result<ReportCard, CalcError> {
    let Some(summary) = calc::summarize(marks) else {
        return Err(CalcError::new(
            "no_data",
            "no marks recorded for this student in the requested term",
        )
        .with_details(serde_json::json!({
            "studentId": student.id,
            "term": cohort.filter.term,
            "academicYear": cohort.filter.academic_year,
        })));
    };
    let form_level = student.form_level;
    let values: Vec<i64> = marks.iter().map(|m| m.mark).collect();

    let subjects = STANDARD_SUBJECTS
        .iter()
        .map(|subject| match marks.iter().find(|m| m.subject == *subject) {
            Some(m) => {
                let grade = grading::grade_for(m.mark, form_level);
                SubjectLine {
                    subject: subject.to_string(),
                    taken: true,
                    mark: Some(m.mark),
                    grade: Some(grade),
                    position: Some(cohort.subject_position(&student.id, subject).display),
                    comment: grading::teacher_comment(grade).to_string(),
                    teacher: Some(teachers.name_for(subject, form_level)),
                }
            }
            None => SubjectLine {
                subject: subject.to_string(),
                taken: false,
                mark: None,
                grade: None,
                position: None,
                comment: "Not taken".to_string(),
                teacher: None,
            },
        })
        .collect();

    let position = calc::student_position(cohort, &student.id, form_level, marks);
    let tier = if grading::is_junior(form_level) {
        Tier::Junior
    } else {
        Tier::Senior
    };
    let average_grade = match tier {
        Tier::Junior => Some(grading::average_grade(&values, form_level, summary.verdict)),
        Tier::Senior => None,
    };

    Ok(ReportCard {
        school: SchoolBlock {
            name: settings.school_name_display().to_string(),
            address_lines: settings.address_lines(),
            phone: settings.school_phone.clone(),
            email: settings.school_email.clone(),
        },
        student: StudentBlock {
            student_id: student.id.clone(),
            student_number: student.student_number.clone(),
            name: student.full_name(),
            form_level,
            term: cohort.filter.term.clone(),
            academic_year: cohort.filter.academic_year.clone(),
        },
        subjects,
        position: position.position,
        total_students: position.total_students,
        tier,
        average_grade,
        aggregate_points: position.aggregate_points,
        grading_legend: grading::grading_legend(form_level).to_string(),
        subjects_taken: summary.subjects_taken,
        subjects_passed: summary.subjects_passed,
        average: calc::round2(summary.average),
        english_passed: summary.english_passed,
        verdict: summary.verdict,
        reason: summary.reason.clone(),
        form_teacher_comment: grading::form_teacher_comment(
            summary.verdict,
            summary.subjects_passed,
            summary.average,
        ),
        head_teacher_comment: grading::head_teacher_comment(summary.verdict).to_string(),
        boilerplate: Boilerplate {
            next_term_begins: settings.next_term_display().to_string(),
            pta_fund: settings.pta_display().to_string(),
            sdf_fund: settings.sdf_display().to_string(),
            boarding_fee: settings.boarding_display().to_string(),
            girls_uniform: settings.girls_uniform_display().to_string(),
            boys_uniform: settings.boys_uniform_display().to_string(),
        },
        generated_at: chrono::Local::now().format("%d/%m/%Y %H:%M").to_string(),
    })
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

/// Plain-text progress report, 80 columns wide.
pub fn render_text(card: &ReportCard) -> String {
    let mut out = String::new();
    rule(&mut out, '=');
    centered(&mut out, &card.school.name);
    out.push('\n');
    for line in &card.school.address_lines {
        centered(&mut out, line);
    }
    out.push('\n');
    centered(&mut out, "PROGRESS REPORT");
    rule(&mut out, '=');
    out.push('\n');

    let term_no = card.student.term.replace("Term", "");
    let _ = writeln!(out, "{:<18}{}", "Serial No:", card.student.student_number);
    let _ = writeln!(out, "{:<18}{}", "Student Name:", card.student.name);
    let _ = writeln!(out, "{:<18}{}", "Term:", term_no.trim());
    let _ = writeln!(out, "{:<18}{}", "Form:", card.student.form_level);
    let _ = writeln!(out, "{:<18}{}", "Year:", card.student.academic_year);
    let position = match card.position {
        Some(p) => format!("{}/{}", p, card.total_students),
        None => format!("-/{}", card.total_students),
    };
    let tier_line = match card.tier {
        Tier::Junior => format!(
            "Average Grade: {}",
            card.average_grade.map(|g| g.to_string()).unwrap_or_default()
        ),
        Tier::Senior => format!(
            "Aggregate Points: {}",
            card.aggregate_points
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string())
        ),
    };
    let _ = writeln!(out, "{:<18}{:<24}{}", "Position:", position, tier_line);
    out.push('\n');

    let _ = writeln!(
        out,
        "{:<20} {:>5} {:>5} {:>6} {:<14} {:<12}",
        "Subject", "Marks", "Grade", "Pos", "Comment", "Signature"
    );
    rule(&mut out, '=');
    for line in &card.subjects {
        match (line.mark, line.grade) {
            (Some(mark), Some(grade)) => {
                let _ = writeln!(
                    out,
                    "{:<20} {:>5} {:>5} {:>6} {:<14} {:<12}",
                    truncated(&line.subject, 20),
                    mark,
                    grade.to_string(),
                    line.position.as_deref().unwrap_or("--"),
                    line.comment,
                    truncated(line.teacher.as_deref().unwrap_or("--"), 12),
                );
            }
            _ => {
                let _ = writeln!(
                    out,
                    "{:<20} {:>5} {:>5} {:>6} {:<14} {:<12}",
                    truncated(&line.subject, 20),
                    "--",
                    "--",
                    "--",
                    line.comment,
                    "--",
                );
            }
        }
    }
    rule(&mut out, '=');

    if let (Tier::Senior, Some(points)) = (card.tier, card.aggregate_points) {
        let _ = writeln!(out, "\nAggregate Points (Best Six): {}", points);
    }
    let _ = writeln!(out, "\n{}", card.grading_legend);
    let _ = writeln!(
        out,
        "Subjects taken: {}  Passed: {}  Average: {:.1}%  Result: {}",
        card.subjects_taken, card.subjects_passed, card.average, card.verdict
    );
    let _ = writeln!(out, "{}", card.reason);
    out.push('\n');
    let _ = writeln!(out, "FORM TEACHER: {}", card.form_teacher_comment);
    let _ = writeln!(out, "HEAD TEACHER: {}", card.head_teacher_comment);
    out.push('\n');
    out.push_str("CLASS TEACHER SIGN: ________________________\n\n");
    rule(&mut out, '=');
    let b = &card.boilerplate;
    let _ = writeln!(out, "NEXT TERM: {}", b.next_term_begins);
    let _ = writeln!(
        out,
        "FEES - PTA: {} | SDF: {} | Boarding: {}",
        b.pta_fund, b.sdf_fund, b.boarding_fee
    );
    let _ = writeln!(out, "UNIFORM - Girls: {}", b.girls_uniform);
    let _ = writeln!(out, "Boys: {}", b.boys_uniform);
    rule(&mut out, '=');
    out.push('\n');
    centered(&mut out, &format!("Date: {}", card.generated_at));
    out
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummaryRow {
    pub student_id: String,
    pub name: String,
    pub student_number: String,
    pub verdict: Verdict,
    pub subjects_passed: usize,
    pub english_passed: bool,
    pub english_mark: Option<i64>,
    pub average: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    pub form_level: i64,
    pub term: String,
    pub academic_year: String,
    /// Active students enrolled in the form, with or without marks.
    pub total_students: usize,
    pub students_with_results: usize,
    pub passed_students: usize,
    pub failed_students: usize,
    pub pass_rate: f64,
    pub failed_english_only: usize,
    pub failed_insufficient_subjects: usize,
    pub failed_both: usize,
    pub students: Vec<ClassSummaryRow>,
    pub text: String,
}

/// Pass/fail breakdown for one form. The pass rate is taken over every
/// enrolled student, so students without marks count against it.
pub fn class_summary(cohort: &Cohort, form_level: i64, enrolled: usize) -> ClassSummary {
    let mut rows = Vec::new();
    let (mut passed, mut english_only, mut insufficient, mut both) = (0, 0, 0, 0);
    for student in cohort.students() {
        let Some(summary) = calc::summarize(&student.marks) else {
            continue;
        };
        let enough = summary.subjects_passed >= grading::MIN_SUBJECTS_PASSED;
        match (summary.verdict, enough, summary.english_passed) {
            (Verdict::Pass, _, _) => passed += 1,
            (Verdict::Fail, true, false) => english_only += 1,
            (Verdict::Fail, false, true) => insufficient += 1,
            (Verdict::Fail, _, _) => both += 1,
        }
        rows.push(ClassSummaryRow {
            student_id: student.id.clone(),
            name: student.name(),
            student_number: student.student_number.clone(),
            verdict: summary.verdict,
            subjects_passed: summary.subjects_passed,
            english_passed: summary.english_passed,
            english_mark: summary.english_mark,
            average: calc::round2(summary.average),
        });
    }
    rows.sort_by(|a, b| {
        (a.verdict == Verdict::Fail)
            .cmp(&(b.verdict == Verdict::Fail))
            .then_with(|| a.name.cmp(&b.name))
    });

    let total_students = enrolled.max(rows.len());
    let failed = rows.len() - passed;
    let pass_rate = if total_students > 0 {
        calc::round2(passed as f64 * 100.0 / total_students as f64)
    } else {
        0.0
    };

    let mut summary = ClassSummary {
        form_level,
        term: cohort.filter.term.clone(),
        academic_year: cohort.filter.academic_year.clone(),
        total_students,
        students_with_results: rows.len(),
        passed_students: passed,
        failed_students: failed,
        pass_rate,
        failed_english_only: english_only,
        failed_insufficient_subjects: insufficient,
        failed_both: both,
        students: rows,
        text: String::new(),
    };
    summary.text = render_class_summary(&summary);
    summary
}

fn render_class_summary(s: &ClassSummary) -> String {
    let mut out = String::new();
    rule(&mut out, '=');
    centered(&mut out, "CLASS PASS/FAIL SUMMARY REPORT");
    rule(&mut out, '=');
    let _ = writeln!(out, "Class: Form {}", s.form_level);
    let _ = writeln!(out, "Term: {}", s.term);
    let _ = writeln!(out, "Academic Year: {}", s.academic_year);
    let _ = writeln!(
        out,
        "Date Generated: {}",
        chrono::Local::now().format("%d/%m/%Y %H:%M")
    );
    rule(&mut out, '=');
    let _ = writeln!(out, "Total Students: {}", s.total_students);
    let _ = writeln!(out, "Students Passed: {} ({:.1}%)", s.passed_students, s.pass_rate);
    let _ = writeln!(
        out,
        "Students Failed: {} ({:.1}%)",
        s.failed_students,
        if s.total_students > 0 { 100.0 - s.pass_rate } else { 0.0 }
    );
    rule(&mut out, '=');
    let _ = writeln!(
        out,
        "Failed due to English only: {} students",
        s.failed_english_only
    );
    let _ = writeln!(
        out,
        "Failed due to insufficient subjects: {} students",
        s.failed_insufficient_subjects
    );
    let _ = writeln!(out, "Failed both criteria: {} students", s.failed_both);
    rule(&mut out, '=');
    let _ = writeln!(
        out,
        "{:<25} {:<10} {:<6} {:<8} {:<8} {:<8}",
        "Name", "Std.No", "Status", "Subjects", "English", "Average"
    );
    rule(&mut out, '-');
    for row in &s.students {
        let english = row
            .english_mark
            .map(|m| format!("{}%", m))
            .unwrap_or_else(|| "--".to_string());
        let _ = writeln!(
            out,
            "{:<25} {:<10} {:<6} {:<8} {:<8} {:.1}%",
            truncated(&row.name, 24),
            row.student_number,
            row.verdict.as_str(),
            row.subjects_passed,
            english,
            row.average
        );
    }
    rule(&mut out, '=');
    out
}
