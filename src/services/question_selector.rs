use std::collections::{BTreeMap, HashSet};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{StoreError, TopicStore};
use crate::services::exam_profile::{adaptive_profile, mock_profile, DEFAULT_MASTERY_LEVEL};
use crate::types::{
    Difficulty, DifficultyDistribution, ExamContext, Question, Subject, TestType,
};

const VISUAL_POINTS: f64 = 20.0;
const SOLUTION_STEPS_POINTS: f64 = 15.0;
const MASTERY_MATERIAL_POINTS: f64 = 10.0;
const EXAM_TIP_POINTS: f64 = 10.0;
const KEY_FORMULAS_POINTS: f64 = 5.0;
const OPTIONS_POINTS: f64 = 10.0;
const CORRECT_INDEX_POINTS: f64 = 5.0;
const BLOOMS_POINTS: f64 = 5.0;
const MAX_JITTER: f64 = 10.0;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionCriteria {
    pub user_id: String,
    pub test_type: TestType,
    pub subject: Subject,
    pub exam_context: ExamContext,
    /// Official topic ids or raw topic names.
    #[serde(default)]
    pub topics: Option<Vec<String>>,
    pub total_questions: u32,
    #[serde(default)]
    pub mastery_level: Option<f64>,
    #[serde(default)]
    pub exclude_question_ids: Vec<String>,
    #[serde(default)]
    pub difficulty_distribution: Option<DifficultyDistribution>,
    /// Also exclude every question the learner has already practiced.
    #[serde(default)]
    pub exclude_attempted: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedQuestionSet {
    pub questions: Vec<Question>,
    pub metadata: SelectionMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionMetadata {
    pub total_questions: usize,
    pub difficulty_breakdown: BTreeMap<String, u32>,
    pub topic_breakdown: BTreeMap<String, u32>,
    pub blooms_breakdown: BTreeMap<String, u32>,
    /// Mean of Easy=1, Moderate=2, Hard=3, two decimals.
    pub average_difficulty: f64,
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("invalid selection criteria: {0}")]
    InvalidCriteria(String),
    #[error("no question sources found for user")]
    NoSources,
    #[error("no questions found matching criteria")]
    EmptyPool,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-bucket question counts for one test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaTargets {
    pub easy: u32,
    pub moderate: u32,
    pub hard: u32,
}

impl QuotaTargets {
    /// Rounds each bucket independently, then settles the difference against
    /// the moderate bucket so the total is exact. If a profile sums past 100
    /// and moderate would go negative, the excess comes off hard, then easy.
    pub fn compute(total_questions: u32, profile: &DifficultyDistribution) -> Self {
        let total = i64::from(total_questions);
        let share = |pct: u32| (total as f64 * f64::from(pct) / 100.0).round() as i64;

        let mut easy = share(profile.easy);
        let mut hard = share(profile.hard);
        let mut moderate = total - easy - hard;

        if moderate < 0 {
            let mut excess = -moderate;
            moderate = 0;
            let from_hard = excess.min(hard);
            hard -= from_hard;
            excess -= from_hard;
            easy -= excess.min(easy);
        }

        Self {
            easy: easy as u32,
            moderate: moderate as u32,
            hard: hard as u32,
        }
    }

    pub fn get(&self, difficulty: Difficulty) -> u32 {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Moderate => self.moderate,
            Difficulty::Hard => self.hard,
        }
    }

    pub fn total(&self) -> u32 {
        self.easy + self.moderate + self.hard
    }
}

pub fn resolve_profile(criteria: &SelectionCriteria) -> DifficultyDistribution {
    if let Some(profile) = criteria.difficulty_distribution {
        return profile;
    }
    match criteria.test_type {
        TestType::FullMock => mock_profile(criteria.exam_context),
        TestType::TopicQuiz | TestType::SubjectTest => {
            adaptive_profile(criteria.mastery_level.unwrap_or(DEFAULT_MASTERY_LEVEL))
        }
    }
}

/// Content richness points, without jitter.
pub fn quality_score(question: &Question) -> f64 {
    let mut score = 0.0;
    if question.has_visual_element {
        score += VISUAL_POINTS;
    }
    if !question.solution_steps.is_empty() {
        score += SOLUTION_STEPS_POINTS;
    }
    if question.mastery_material.is_some() {
        score += MASTERY_MATERIAL_POINTS;
    }
    if question.exam_tip.as_deref().is_some_and(|tip| !tip.is_empty()) {
        score += EXAM_TIP_POINTS;
    }
    if !question.key_formulas.is_empty() {
        score += KEY_FORMULAS_POINTS;
    }
    if !question.options.is_empty() {
        score += OPTIONS_POINTS;
    }
    if question.correct_option_index.is_some() {
        score += CORRECT_INDEX_POINTS;
    }
    if !question.blooms.is_lowest_tier() {
        score += BLOOMS_POINTS;
    }
    score
}

/// Quota-balanced pick from an already filtered pool. Returns fewer than
/// `total_questions` only when the pool itself is smaller.
pub fn select_from_pool<R: Rng + ?Sized>(
    pool: Vec<Question>,
    total_questions: u32,
    profile: &DifficultyDistribution,
    rng: &mut R,
) -> Vec<Question> {
    let targets = QuotaTargets::compute(total_questions, profile);
    let wanted = total_questions as usize;

    let mut ranked: Vec<(f64, Question)> = pool
        .into_iter()
        .map(|question| {
            let jitter = rng.random_range(0.0..MAX_JITTER);
            (quality_score(&question) + jitter, question)
        })
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut taken = vec![false; ranked.len()];
    let mut picked = 0usize;

    for difficulty in Difficulty::ALL {
        let quota = targets.get(difficulty) as usize;
        let bucket = ranked
            .iter()
            .enumerate()
            .filter(|(_, (_, question))| question.difficulty == difficulty)
            .map(|(index, _)| index)
            .take(quota)
            .collect::<Vec<_>>();
        for index in bucket {
            taken[index] = true;
            picked += 1;
        }
    }

    if picked < wanted {
        for flag in taken.iter_mut().filter(|flag| !**flag) {
            if picked >= wanted {
                break;
            }
            *flag = true;
            picked += 1;
        }
    }

    let mut selected: Vec<Question> = ranked
        .into_iter()
        .zip(taken)
        .filter_map(|((_, question), keep)| keep.then_some(question))
        .collect();
    selected.shuffle(rng);
    selected
}

pub fn summarize_selection(questions: &[Question]) -> SelectionMetadata {
    let mut difficulty_breakdown: BTreeMap<String, u32> = Difficulty::ALL
        .iter()
        .map(|difficulty| (difficulty.as_str().to_string(), 0))
        .collect();
    let mut topic_breakdown = BTreeMap::new();
    let mut blooms_breakdown = BTreeMap::new();
    let mut weight_sum = 0u32;

    for question in questions {
        *difficulty_breakdown
            .entry(question.difficulty.as_str().to_string())
            .or_insert(0) += 1;
        *topic_breakdown.entry(question.topic.clone()).or_insert(0) += 1;
        *blooms_breakdown
            .entry(question.blooms.as_str().to_string())
            .or_insert(0) += 1;
        weight_sum += question.difficulty.weight();
    }

    let average_difficulty = if questions.is_empty() {
        0.0
    } else {
        let mean = f64::from(weight_sum) / questions.len() as f64;
        (mean * 100.0).round() / 100.0
    };

    SelectionMetadata {
        total_questions: questions.len(),
        difficulty_breakdown,
        topic_breakdown,
        blooms_breakdown,
        average_difficulty,
    }
}

fn validate(criteria: &SelectionCriteria) -> Result<(), SelectionError> {
    if criteria.user_id.trim().is_empty() {
        return Err(SelectionError::InvalidCriteria("userId is required".to_string()));
    }
    if criteria.total_questions == 0 {
        return Err(SelectionError::InvalidCriteria(
            "totalQuestions must be at least 1".to_string(),
        ));
    }
    if let Some(profile) = &criteria.difficulty_distribution {
        if Difficulty::ALL.iter().any(|d| profile.get(*d) > 100) {
            return Err(SelectionError::InvalidCriteria(
                "difficulty percentages must be between 0 and 100".to_string(),
            ));
        }
    }
    if let Some(mastery) = criteria.mastery_level {
        if !mastery.is_finite() {
            return Err(SelectionError::InvalidCriteria(
                "masteryLevel must be a number".to_string(),
            ));
        }
    }
    Ok(())
}

/// Topic entries that own at least one mapping filter by mapped question
/// ids; the rest fall back to raw topic-name equality. If the mappings
/// cannot be read, every entry is treated as a topic name.
async fn apply_topic_filter(
    store: &dyn TopicStore,
    questions: Vec<Question>,
    topics: &[String],
) -> Vec<Question> {
    let mappings = match store.mappings_for_topics(topics).await {
        Ok(mappings) => mappings,
        Err(err) => {
            tracing::warn!(error = %err, "topic mappings unavailable, filtering by topic name");
            Vec::new()
        }
    };

    let mapped_topics: HashSet<&str> = mappings.iter().map(|m| m.topic_id.as_str()).collect();
    let mapped_questions: HashSet<&str> =
        mappings.iter().map(|m| m.question_id.as_str()).collect();
    let name_topics: HashSet<&str> = topics
        .iter()
        .map(String::as_str)
        .filter(|topic| !mapped_topics.contains(topic))
        .collect();

    questions
        .into_iter()
        .filter(|question| {
            mapped_questions.contains(question.id.as_str())
                || name_topics.contains(question.topic.as_str())
        })
        .collect()
}

pub async fn select_questions_for_test<R: Rng + Send + ?Sized>(
    store: &dyn TopicStore,
    criteria: &SelectionCriteria,
    rng: &mut R,
) -> Result<SelectedQuestionSet, SelectionError> {
    validate(criteria)?;
    let profile = resolve_profile(criteria);

    let sources = store
        .question_sources(&criteria.user_id, criteria.subject, false)
        .await?;
    if sources.is_empty() {
        return Err(SelectionError::NoSources);
    }
    let source_ids: Vec<String> = sources.into_iter().map(|source| source.id).collect();

    let mut pool = store.questions_for_sources(&source_ids).await?;

    if let Some(topics) = criteria.topics.as_deref().filter(|topics| !topics.is_empty()) {
        pool = apply_topic_filter(store, pool, topics).await;
    }

    let mut excluded: HashSet<String> = criteria.exclude_question_ids.iter().cloned().collect();
    if criteria.exclude_attempted {
        match store
            .attempted_question_ids(&criteria.user_id, criteria.subject)
            .await
        {
            Ok(attempted) => excluded.extend(attempted),
            Err(err) => tracing::warn!(
                error = %err,
                user_id = %criteria.user_id,
                "attempt history unavailable, not excluding attempted questions"
            ),
        }
    }
    let mut seen = HashSet::new();
    pool.retain(|question| !excluded.contains(&question.id) && seen.insert(question.id.clone()));

    if pool.is_empty() {
        return Err(SelectionError::EmptyPool);
    }

    let pool_size = pool.len();
    let questions = select_from_pool(pool, criteria.total_questions, &profile, rng);
    let metadata = summarize_selection(&questions);

    tracing::info!(
        user_id = %criteria.user_id,
        subject = %criteria.subject,
        pool_size,
        requested = criteria.total_questions,
        selected = questions.len(),
        "questions selected for test"
    );

    Ok(SelectedQuestionSet {
        questions,
        metadata,
    })
}
