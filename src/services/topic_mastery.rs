use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

use crate::db::{StoreError, TopicStore};
use crate::types::{ActivityType, StudyStage, TopicActivity, TopicProgress};

const ACCURACY_WEIGHT: f64 = 0.65;
const QUIZ_BONUS_PER_QUIZ: f64 = 10.0;
const QUIZ_BONUS_CAP: f64 = 20.0;
const PRACTICE_BONUS_STEP: u32 = 10;
const PRACTICE_BONUS_PER_STEP: f64 = 5.0;
const PRACTICE_BONUS_CAP: f64 = 15.0;

pub const LEARNING_CEILING: u8 = 60;
pub const PRACTICING_CEILING: u8 = 85;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActivitySummary {
    pub graded: u32,
    pub correct: u32,
    pub quizzes: u32,
    pub practiced: u32,
}

impl ActivitySummary {
    pub fn from_activities(activities: &[TopicActivity]) -> Self {
        let mut summary = Self::default();
        for activity in activities {
            if let Some(is_correct) = activity.is_correct {
                summary.graded += 1;
                if is_correct {
                    summary.correct += 1;
                }
            }
            match activity.activity_type {
                ActivityType::CompletedQuiz => summary.quizzes += 1,
                ActivityType::PracticedQuestion => summary.practiced += 1,
                ActivityType::ViewedNotes | ActivityType::ReviewedFlashcard => {}
            }
        }
        summary
    }

    /// Percentage over graded activities only; 0 when nothing was graded.
    pub fn accuracy(&self) -> f64 {
        if self.graded == 0 {
            return 0.0;
        }
        100.0 * f64::from(self.correct) / f64::from(self.graded)
    }
}

/// Unrounded score. Practice only pays out per full block of ten, so the
/// bonus plateaus between blocks.
pub fn mastery_score(accuracy: f64, quiz_count: u32, practice_count: u32) -> f64 {
    let accuracy = accuracy.clamp(0.0, 100.0);
    let quiz_bonus = (f64::from(quiz_count) * QUIZ_BONUS_PER_QUIZ).min(QUIZ_BONUS_CAP);
    let practice_bonus = (f64::from(practice_count / PRACTICE_BONUS_STEP)
        * PRACTICE_BONUS_PER_STEP)
        .min(PRACTICE_BONUS_CAP);

    (accuracy * ACCURACY_WEIGHT + quiz_bonus + practice_bonus).min(100.0)
}

pub fn calculate_mastery(activities: &[TopicActivity]) -> u8 {
    let summary = ActivitySummary::from_activities(activities);
    let score = mastery_score(summary.accuracy(), summary.quizzes, summary.practiced);
    score.round().clamp(0.0, 100.0) as u8
}

/// Uses the same cut points as the adaptive difficulty bands.
pub fn study_stage_for(mastery_level: u8, has_activity: bool) -> StudyStage {
    if !has_activity {
        StudyStage::NotStarted
    } else if mastery_level < LEARNING_CEILING {
        StudyStage::Learning
    } else if mastery_level < PRACTICING_CEILING {
        StudyStage::Practicing
    } else {
        StudyStage::Mastered
    }
}

/// Folds one new activity into a progress row. `history` must already
/// contain `activity`.
pub fn apply_activity(
    progress: &TopicProgress,
    activity: &TopicActivity,
    history: &[TopicActivity],
) -> TopicProgress {
    let mut next = progress.clone();

    match (activity.activity_type, activity.is_correct) {
        (ActivityType::PracticedQuestion, Some(is_correct)) => {
            next.questions_attempted += 1;
            if is_correct {
                next.questions_correct += 1;
            }
            next.average_accuracy =
                100.0 * f64::from(next.questions_correct) / f64::from(next.questions_attempted);
            next.last_practiced = Some(activity.timestamp);
        }
        (ActivityType::CompletedQuiz, _) => {
            next.quizzes_taken += 1;
        }
        _ => {}
    }

    next.mastery_level = calculate_mastery(history);
    next.study_stage = study_stage_for(next.mastery_level, !history.is_empty());
    next.updated_at = Utc::now();
    next
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordActivityInput {
    pub user_id: String,
    pub topic_resource_id: String,
    pub activity_type: ActivityType,
    #[serde(default)]
    pub question_id: Option<String>,
    #[serde(default)]
    pub is_correct: Option<bool>,
    #[serde(default)]
    pub time_spent: Option<i64>,
}

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("invalid activity: {0}")]
    InvalidInput(String),
    #[error("topic resource not found: {0}")]
    ResourceNotFound(String),
    #[error("topic resource belongs to another user")]
    Forbidden,
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ActivityError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ActivityError::ResourceNotFound(id),
            other => ActivityError::Store(other),
        }
    }
}

pub async fn record_topic_activity(
    store: &dyn TopicStore,
    input: RecordActivityInput,
) -> Result<TopicProgress, ActivityError> {
    if input.user_id.trim().is_empty() {
        return Err(ActivityError::InvalidInput("userId is required".to_string()));
    }
    if matches!(input.time_spent, Some(seconds) if seconds < 0) {
        return Err(ActivityError::InvalidInput(
            "timeSpent must not be negative".to_string(),
        ));
    }

    let progress = store
        .progress_by_id(&input.topic_resource_id)
        .await?
        .ok_or_else(|| ActivityError::ResourceNotFound(input.topic_resource_id.clone()))?;
    if progress.user_id != input.user_id {
        return Err(ActivityError::Forbidden);
    }

    let activity = TopicActivity {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: input.user_id,
        topic_resource_id: input.topic_resource_id,
        activity_type: input.activity_type,
        question_id: input.question_id,
        is_correct: input.is_correct,
        time_spent: input.time_spent,
        timestamp: Utc::now(),
    };

    let updated = store.record_activity(&activity).await?;

    tracing::debug!(
        user_id = %activity.user_id,
        resource_id = %activity.topic_resource_id,
        activity = activity.activity_type.as_str(),
        mastery = updated.mastery_level,
        "topic activity recorded"
    );

    Ok(updated)
}
