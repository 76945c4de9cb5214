use std::collections::HashMap;

use serde::Serialize;

use crate::services::domain_classifier::{
    DomainTaxonomy, FALLBACK_DOMAIN_KEY, FALLBACK_DOMAIN_NAME, FALLBACK_FRICTION,
};
use crate::types::{BloomsLevel, Question};

const HARD_DNA_THRESHOLD: f64 = 2.4;
const MODERATE_DNA_THRESHOLD: f64 = 1.7;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainReport {
    pub key: String,
    pub name: String,
    pub chapters: Vec<String>,
    pub question_count: u32,
    pub total_marks: u32,
    pub average_difficulty: f64,
    pub difficulty_dna: &'static str,
    pub dominant_blooms: BloomsLevel,
    pub friction: String,
}

#[derive(Default)]
struct DomainBucket<'a> {
    chapters: Vec<&'a str>,
    question_count: u32,
    total_marks: u32,
    difficulty_sum: u32,
    blooms: Vec<(BloomsLevel, u32)>,
}

impl<'a> DomainBucket<'a> {
    fn add(&mut self, question: &'a Question) {
        let chapter = question.topic.trim();
        if !chapter.is_empty() && !self.chapters.contains(&chapter) {
            self.chapters.push(chapter);
        }
        self.question_count = self.question_count.saturating_add(1);
        self.total_marks = self.total_marks.saturating_add(question.marks);
        self.difficulty_sum = self.difficulty_sum.saturating_add(question.difficulty.weight());

        match self.blooms.iter_mut().find(|(level, _)| *level == question.blooms) {
            Some((_, count)) => *count += 1,
            None => self.blooms.push((question.blooms, 1)),
        }
    }

    /// Most frequent level; ties go to the level seen first.
    fn dominant_blooms(&self) -> BloomsLevel {
        let mut dominant: Option<(BloomsLevel, u32)> = None;
        for &(level, count) in &self.blooms {
            if dominant.map_or(true, |(_, best)| count > best) {
                dominant = Some((level, count));
            }
        }
        dominant.map(|(level, _)| level).unwrap_or(BloomsLevel::Apply)
    }
}

pub fn difficulty_dna(average_difficulty: f64) -> &'static str {
    if average_difficulty >= HARD_DNA_THRESHOLD {
        "Hard"
    } else if average_difficulty >= MODERATE_DNA_THRESHOLD {
        "Moderate"
    } else {
        "Easy"
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Groups questions by the domain their topic classifies into. Only domains
/// holding at least one question are reported, heaviest by marks first.
pub fn summarize_domains(taxonomy: &DomainTaxonomy, questions: &[Question]) -> Vec<DomainReport> {
    let mut buckets: HashMap<&str, DomainBucket<'_>> = HashMap::new();
    for question in questions {
        let key = taxonomy.classify(&question.topic).key;
        buckets.entry(key).or_default().add(question);
    }

    let order = taxonomy
        .entries()
        .iter()
        .map(|entry| entry.key.as_str())
        .chain(std::iter::once(FALLBACK_DOMAIN_KEY));

    let mut reports: Vec<DomainReport> = order
        .filter_map(|key| {
            let bucket = buckets.remove(key)?;
            let (name, friction) = match taxonomy.entry(key) {
                Some(entry) => (entry.name.clone(), entry.friction.clone()),
                None => (FALLBACK_DOMAIN_NAME.to_string(), FALLBACK_FRICTION.to_string()),
            };
            let average = f64::from(bucket.difficulty_sum) / f64::from(bucket.question_count);

            Some(DomainReport {
                key: key.to_string(),
                name,
                chapters: bucket.chapters.iter().map(|c| c.to_string()).collect(),
                question_count: bucket.question_count,
                total_marks: bucket.total_marks,
                average_difficulty: round2(average),
                difficulty_dna: difficulty_dna(average),
                dominant_blooms: bucket.dominant_blooms(),
                friction,
            })
        })
        .collect();

    // stable: equal marks keep table order, fallback last
    reports.sort_by(|a, b| b.total_marks.cmp(&a.total_marks));
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Difficulty, Subject};

    fn question(id: &str, topic: &str, marks: u32, difficulty: Difficulty, blooms: BloomsLevel) -> Question {
        Question {
            id: id.to_string(),
            source_id: "s1".to_string(),
            text: format!("question {id}"),
            options: Vec::new(),
            correct_option_index: None,
            marks,
            difficulty,
            topic: topic.to_string(),
            blooms,
            solution_steps: Vec::new(),
            mastery_material: None,
            exam_tip: None,
            key_formulas: Vec::new(),
            has_visual_element: false,
            source: None,
        }
    }

    #[test]
    fn groups_by_domain_and_sorts_by_marks() {
        let taxonomy = DomainTaxonomy::builtin(Subject::Physics);
        let questions = vec![
            question("q1", "Current Electricity", 4, Difficulty::Hard, BloomsLevel::Apply),
            question("q2", "Electrostatics", 4, Difficulty::Hard, BloomsLevel::Apply),
            question("q3", "Current Electricity", 4, Difficulty::Moderate, BloomsLevel::Analyze),
            question("q4", "Wave Optics", 1, Difficulty::Easy, BloomsLevel::Remember),
        ];

        let reports = summarize_domains(&taxonomy, &questions);
        assert_eq!(reports.len(), 2);

        let electro = &reports[0];
        assert_eq!(electro.name, "Electrodynamics");
        assert_eq!(electro.question_count, 3);
        assert_eq!(electro.total_marks, 12);
        assert_eq!(electro.chapters, vec!["Current Electricity", "Electrostatics"]);
        assert_eq!(electro.average_difficulty, 2.67);
        assert_eq!(electro.difficulty_dna, "Hard");
        assert_eq!(electro.dominant_blooms, BloomsLevel::Apply);
        assert!(electro.friction.contains("Lorentz"));

        assert_eq!(reports[1].name, "Optics");
        assert_eq!(reports[1].difficulty_dna, "Easy");
    }

    #[test]
    fn unmatched_topics_land_in_core_foundations() {
        let taxonomy = DomainTaxonomy::builtin(Subject::Physics);
        let questions = vec![
            question("q1", "Q12", 2, Difficulty::Moderate, BloomsLevel::Understand),
            question("q2", "", 2, Difficulty::Moderate, BloomsLevel::Understand),
        ];

        let reports = summarize_domains(&taxonomy, &questions);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].name, FALLBACK_DOMAIN_NAME);
        assert_eq!(reports[0].friction, FALLBACK_FRICTION);
        assert_eq!(reports[0].chapters, vec!["Q12"]);
        assert_eq!(reports[0].difficulty_dna, "Moderate");
    }

    #[test]
    fn equal_marks_follow_table_order_with_fallback_last() {
        let taxonomy = DomainTaxonomy::builtin(Subject::Physics);
        let questions = vec![
            question("q1", "Q7", 4, Difficulty::Easy, BloomsLevel::Remember),
            question("q2", "Wave Optics", 4, Difficulty::Easy, BloomsLevel::Remember),
            question("q3", "Current Electricity", 4, Difficulty::Easy, BloomsLevel::Remember),
        ];

        let keys: Vec<String> = summarize_domains(&taxonomy, &questions)
            .into_iter()
            .map(|report| report.key)
            .collect();

        assert_eq!(keys, vec!["Electrodynamics", "Optics", FALLBACK_DOMAIN_KEY]);
    }

    #[test]
    fn large_marks_saturate() {
        let taxonomy = DomainTaxonomy::builtin(Subject::Physics);
        let questions = vec![
            question("q1", "Wave Optics", u32::MAX, Difficulty::Hard, BloomsLevel::Apply),
            question("q2", "Ray Optics", u32::MAX, Difficulty::Hard, BloomsLevel::Apply),
        ];

        let reports = summarize_domains(&taxonomy, &questions);

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].total_marks, u32::MAX);
        assert_eq!(reports[0].question_count, 2);
    }

    #[test]
    fn empty_input_reports_nothing() {
        let taxonomy = DomainTaxonomy::builtin(Subject::Math);
        assert!(summarize_domains(&taxonomy, &[]).is_empty());
    }

    #[test]
    fn dna_thresholds() {
        assert_eq!(difficulty_dna(2.4), "Hard");
        assert_eq!(difficulty_dna(2.39), "Moderate");
        assert_eq!(difficulty_dna(1.7), "Moderate");
        assert_eq!(difficulty_dna(1.69), "Easy");
    }
}
