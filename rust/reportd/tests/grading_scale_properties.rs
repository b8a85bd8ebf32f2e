#[path = "../src/grading.rs"]
mod grading;

use grading::{Grade, Verdict};

fn letter_rank(g: Grade) -> usize {
    match g {
        Grade::A => 0,
        Grade::B => 1,
        Grade::C => 2,
        Grade::D => 3,
        Grade::F => 4,
        Grade::Points(_) => panic!("junior forms grade with letters"),
    }
}

#[test]
fn higher_marks_never_get_worse_grades() {
    for form in 1..=4 {
        for mark in 1..=100 {
            let lower = grading::grade_for(mark - 1, form);
            let higher = grading::grade_for(mark, form);
            if grading::is_junior(form) {
                assert!(letter_rank(higher) <= letter_rank(lower), "form {} mark {}", form, mark);
            } else {
                assert!(higher.points() <= lower.points(), "form {} mark {}", form, mark);
            }
        }
    }
}

#[test]
fn band_edges_for_both_tiers() {
    assert_eq!(grading::grade_for(80, 1), Grade::A);
    assert_eq!(grading::grade_for(79, 2), Grade::B);
    assert_eq!(grading::grade_for(50, 1), Grade::D);
    assert_eq!(grading::grade_for(49, 2), Grade::F);
    assert_eq!(grading::grade_for(100, 3), Grade::Points(1));
    assert_eq!(grading::grade_for(45, 3), Grade::Points(7));
    assert_eq!(grading::grade_for(0, 4), Grade::Points(9));
}

#[test]
fn pass_needs_six_subjects_and_english() {
    assert_eq!(grading::determine_verdict(6, true), Verdict::Pass);
    assert_eq!(grading::determine_verdict(12, false), Verdict::Fail);
    assert_eq!(grading::determine_verdict(5, true), Verdict::Fail);
    assert_eq!(
        grading::status_reason(7, false),
        "Failed English (English is mandatory for pass)"
    );
    assert_eq!(
        grading::status_reason(3, false),
        "Passed only 3 subjects and failed English"
    );
}

#[test]
fn aggregate_uses_best_six_senior_marks_only() {
    let marks = [90, 30, 76, 71, 66, 61, 56, 51];
    // best six: 90 76 71 66 61 56 -> 1 + 1 + 2 + 3 + 4 + 5
    assert_eq!(grading::aggregate_points(&marks, 4), Some(16));
    assert_eq!(grading::aggregate_points(&[60, 60], 3), Some(8));
    assert_eq!(grading::aggregate_points(&marks, 2), None);
}

#[test]
fn departments_partition_the_standard_subjects() {
    for subject in grading::STANDARD_SUBJECTS {
        let homes = grading::Department::ALL
            .iter()
            .filter(|d| d.contains(subject))
            .count();
        assert_eq!(homes, 1, "{} belongs to exactly one department", subject);
    }
}

fn repeated(groups: &[(i64, usize)]) -> Vec<i64> {
    groups
        .iter()
        .flat_map(|(mark, n)| std::iter::repeat(*mark).take(*n))
        .collect()
}

#[test]
fn average_grade_tie_falls_back_to_the_truncated_mean() {
    // one A and one F; mean 65 -> C
    assert_eq!(grading::average_grade(&[85, 45], 1, Verdict::Fail), Grade::C);
}

#[test]
fn average_grade_on_a_pass_prefers_the_passing_mode_over_f() {
    let marks = repeated(&[(30, 7), (55, 6)]);
    assert_eq!(grading::average_grade(&marks, 2, Verdict::Pass), Grade::D);
}

#[test]
fn passing_mode_tie_uses_the_mean_even_when_it_is_f() {
    // D and C tie among passing grades; mean 43.8 -> F
    let marks = repeated(&[(30, 7), (55, 3), (65, 3)]);
    assert_eq!(grading::average_grade(&marks, 1, Verdict::Pass), Grade::F);
    assert_eq!(grading::average_grade(&marks, 1, Verdict::Fail), Grade::F);
}
