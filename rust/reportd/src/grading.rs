use serde::{Serialize, Serializer};
use std::fmt;

/// Subject pass mark, in percent.
pub const PASS_MARK: i64 = 50;
/// Minimum number of passed subjects for an overall PASS.
pub const MIN_SUBJECTS_PASSED: usize = 6;
/// Number of best marks counted towards senior aggregate points.
pub const AGGREGATE_BEST_OF: usize = 6;
pub const ENGLISH: &str = "English";

/// The twelve standard subjects, in report card order.
pub const STANDARD_SUBJECTS: [&str; 12] = [
    "Agriculture",
    "Biology",
    "Bible Knowledge",
    "Chemistry",
    "Chichewa",
    "Computer Studies",
    "English",
    "Geography",
    "History",
    "Life Skills/SOS",
    "Mathematics",
    "Physics",
];

pub fn is_standard_subject(subject: &str) -> bool {
    STANDARD_SUBJECTS.contains(&subject)
}

pub fn subject_order(subject: &str) -> usize {
    STANDARD_SUBJECTS
        .iter()
        .position(|s| *s == subject)
        .unwrap_or(STANDARD_SUBJECTS.len())
}

pub fn is_junior(form_level: i64) -> bool {
    matches!(form_level, 1 | 2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
    /// MSCE points, 1 (best) ..= 9 (worst).
    Points(u8),
}

const JUNIOR_GRADES: [Grade; 5] = [Grade::A, Grade::B, Grade::C, Grade::D, Grade::F];

impl Grade {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "A" => Some(Grade::A),
            "B" => Some(Grade::B),
            "C" => Some(Grade::C),
            "D" => Some(Grade::D),
            "F" => Some(Grade::F),
            other => match other.parse::<u8>() {
                Ok(p) if (1..=9).contains(&p) => Some(Grade::Points(p)),
                _ => None,
            },
        }
    }

    /// Aggregate contribution; letters count as the worst band.
    pub fn points(self) -> i64 {
        match self {
            Grade::Points(p) => p as i64,
            _ => 9,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::A => f.write_str("A"),
            Grade::B => f.write_str("B"),
            Grade::C => f.write_str("C"),
            Grade::D => f.write_str("D"),
            Grade::F => f.write_str("F"),
            Grade::Points(p) => write!(f, "{}", p),
        }
    }
}

impl Serialize for Grade {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Maps a mark onto the grade scale of the given form level.
///
/// Forms 1 and 2 use letters. Every other form level uses MSCE points in
/// 5-point bands from 75 down to 40. Out-of-range marks are not rejected here:
/// anything below the lowest band lands in F or 9.
pub fn grade_for(mark: i64, form_level: i64) -> Grade {
    if is_junior(form_level) {
        return match mark {
            m if m >= 80 => Grade::A,
            m if m >= 70 => Grade::B,
            m if m >= 60 => Grade::C,
            m if m >= 50 => Grade::D,
            _ => Grade::F,
        };
    }
    let points = match mark {
        m if m >= 75 => 1,
        m if m >= 70 => 2,
        m if m >= 65 => 3,
        m if m >= 60 => 4,
        m if m >= 55 => 5,
        m if m >= 50 => 6,
        m if m >= 45 => 7,
        m if m >= 40 => 8,
        _ => 9,
    };
    Grade::Points(points)
}

pub fn validate_mark(mark: i64) -> Result<i64, String> {
    if !(0..=100).contains(&mark) {
        return Err(format!("mark must be in 0..=100 (got {})", mark));
    }
    Ok(mark)
}

pub fn is_pass_mark(mark: i64) -> bool {
    mark >= PASS_MARK
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

pub fn determine_verdict(passed_subjects: usize, english_passed: bool) -> Verdict {
    if passed_subjects >= MIN_SUBJECTS_PASSED && english_passed {
        Verdict::Pass
    } else {
        Verdict::Fail
    }
}

pub fn status_reason(passed_subjects: usize, english_passed: bool) -> String {
    let enough = passed_subjects >= MIN_SUBJECTS_PASSED;
    match (enough, english_passed) {
        (true, true) => "Passed 6 or more subjects including English".to_string(),
        (true, false) => "Failed English (English is mandatory for pass)".to_string(),
        (false, true) => format!(
            "Passed only {} subjects (minimum {} required)",
            passed_subjects, MIN_SUBJECTS_PASSED
        ),
        (false, false) => format!(
            "Passed only {} subjects and failed English",
            passed_subjects
        ),
    }
}

/// Per-subject comment printed next to a grade.
pub fn teacher_comment(grade: Grade) -> &'static str {
    match grade {
        Grade::Points(1) | Grade::Points(2) => "Distinction",
        Grade::Points(3) => "Strong Credit",
        Grade::Points(4) | Grade::Points(5) | Grade::Points(6) => "Credit",
        Grade::Points(7) => "Pass",
        Grade::Points(8) => "Mere Pass",
        Grade::Points(_) => "Fail",
        Grade::A => "Excellent",
        Grade::B => "Very Good",
        Grade::C => "Good",
        Grade::D => "Average",
        Grade::F => "Fail",
    }
}

pub fn mean(marks: &[i64]) -> Option<f64> {
    if marks.is_empty() {
        return None;
    }
    Some(marks.iter().sum::<i64>() as f64 / marks.len() as f64)
}

fn modal_grade(grades: &[Grade], candidates: &[Grade]) -> Option<Grade> {
    let counts: Vec<(Grade, usize)> = candidates
        .iter()
        .map(|c| (*c, grades.iter().filter(|g| *g == c).count()))
        .collect();
    let max = counts.iter().map(|(_, n)| *n).max()?;
    let mut top = counts.iter().filter(|(_, n)| *n == max);
    match (top.next(), top.next()) {
        (Some((g, _)), None) => Some(*g),
        _ => None,
    }
}

/// "Average Grade" shown on junior report cards.
///
/// The most frequent letter grade wins. A tie falls back to the grade of the
/// truncated mean mark. When that leaves an F on a passing report, the mode is
/// recomputed over the passing letters only (same tie fallback).
pub fn average_grade(marks: &[i64], form_level: i64, verdict: Verdict) -> Grade {
    let Some(avg) = mean(marks) else {
        return Grade::F;
    };
    let from_mean = grade_for(avg.trunc() as i64, form_level);
    let grades: Vec<Grade> = marks.iter().map(|m| grade_for(*m, form_level)).collect();

    let grade = modal_grade(&grades, &JUNIOR_GRADES).unwrap_or(from_mean);
    if grade != Grade::F || verdict != Verdict::Pass {
        return grade;
    }

    let passing: Vec<Grade> = grades.into_iter().filter(|g| *g != Grade::F).collect();
    if passing.is_empty() {
        return grade;
    }
    modal_grade(&passing, &JUNIOR_GRADES[..4]).unwrap_or(from_mean)
}

/// Sum of MSCE points over the best six marks. Only defined for senior forms;
/// fewer than six marks are summed as-is.
pub fn aggregate_points(marks: &[i64], form_level: i64) -> Option<i64> {
    if is_junior(form_level) {
        return None;
    }
    let mut best = marks.to_vec();
    best.sort_unstable_by(|a, b| b.cmp(a));
    Some(
        best.iter()
            .take(AGGREGATE_BEST_OF)
            .map(|m| grade_for(*m, form_level).points())
            .sum(),
    )
}

pub fn grading_legend(form_level: i64) -> &'static str {
    if is_junior(form_level) {
        "GRADING: A(80-100) B(70-79) C(60-69) D(50-59) F(0-49)"
    } else {
        "MSCE GRADING: 1(75-100) 2(70-74) 3(65-69) 4(60-64) 5(55-59) 6(50-54) 7(45-49) 8(40-44) 9(0-39)"
    }
}

pub fn form_teacher_comment(verdict: Verdict, passed_subjects: usize, average: f64) -> String {
    match verdict {
        Verdict::Pass => format!(
            "PASSED - Excellent performance! Passed {} subjects with {:.1}% average.",
            passed_subjects, average
        ),
        Verdict::Fail => {
            "FAILED - Needs improvement. Focus on weak subjects, especially English.".to_string()
        }
    }
}

pub fn head_teacher_comment(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Pass => "PASSED - Well done. Keep up the good work.",
        Verdict::Fail => "FAILED - Extra effort required. Seek help from teachers.",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Department {
    Sciences,
    Humanities,
    Languages,
}

impl Department {
    pub const ALL: [Department; 3] = [
        Department::Sciences,
        Department::Humanities,
        Department::Languages,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sciences" => Some(Department::Sciences),
            "humanities" => Some(Department::Humanities),
            "languages" => Some(Department::Languages),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Department::Sciences => "Sciences",
            Department::Humanities => "Humanities",
            Department::Languages => "Languages",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Department::Sciences => "Science and Mathematics Department",
            Department::Humanities => "Humanities and Social Studies Department",
            Department::Languages => "Languages Department",
        }
    }

    pub fn subjects(self) -> &'static [&'static str] {
        match self {
            Department::Sciences => &[
                "Agriculture",
                "Biology",
                "Chemistry",
                "Computer Studies",
                "Mathematics",
                "Physics",
            ],
            Department::Humanities => &["Bible Knowledge", "Geography", "History", "Life Skills/SOS"],
            Department::Languages => &["English", "Chichewa"],
        }
    }

    pub fn contains(self, subject: &str) -> bool {
        self.subjects().contains(&subject)
    }
}

impl Serialize for Department {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn senior_bands_step_by_five() {
        assert_eq!(grade_for(75, 3), Grade::Points(1));
        assert_eq!(grade_for(74, 3), Grade::Points(2));
        assert_eq!(grade_for(50, 4), Grade::Points(6));
        assert_eq!(grade_for(40, 4), Grade::Points(8));
        assert_eq!(grade_for(39, 4), Grade::Points(9));
        assert_eq!(grade_for(-5, 4), Grade::Points(9));
    }

    #[test]
    fn grade_symbols_roundtrip_through_parse() {
        for g in [Grade::A, Grade::F, Grade::Points(1), Grade::Points(9)] {
            assert_eq!(Grade::parse(&g.to_string()), Some(g));
        }
        assert_eq!(Grade::parse("10"), None);
        assert_eq!(Grade::parse("E"), None);
    }

    #[test]
    fn departments_partition_the_standard_subjects() {
        let mut seen: Vec<&str> = Department::ALL
            .iter()
            .flat_map(|d| d.subjects().iter().copied())
            .collect();
        seen.sort_unstable();
        let mut all = STANDARD_SUBJECTS.to_vec();
        all.sort_unstable();
        assert_eq!(seen, all);
    }
}
