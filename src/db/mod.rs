pub mod config;
pub mod memory;
pub mod sqlite_primary;
pub mod sqlite_schema;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{
    ChapterInsight, ExamContext, FlashcardDeck, OfficialTopic, ParseEnumError, Question,
    QuestionSource, Subject, TopicActivity, TopicProgress, TopicQuestionMapping, TopicSketch,
};

pub use memory::MemoryStore;
pub use sqlite_primary::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("sql error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid stored value: {0}")]
    Decode(#[from] ParseEnumError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Read access to scanned content and read/write access to learner progress.
///
/// Implementations must make `record_activity` atomic per progress row: the
/// activity append and the counter/mastery update commit together or not at
/// all.
#[async_trait]
pub trait TopicStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn official_topics(&self, subject: Subject) -> Result<Vec<OfficialTopic>, StoreError>;

    async fn question_sources(
        &self,
        user_id: &str,
        subject: Subject,
        include_system: bool,
    ) -> Result<Vec<QuestionSource>, StoreError>;

    async fn questions_for_sources(&self, source_ids: &[String])
        -> Result<Vec<Question>, StoreError>;

    async fn mappings_for_questions(
        &self,
        question_ids: &[String],
    ) -> Result<Vec<TopicQuestionMapping>, StoreError>;

    async fn mappings_for_topics(
        &self,
        topic_ids: &[String],
    ) -> Result<Vec<TopicQuestionMapping>, StoreError>;

    async fn chapter_insights(&self, source_ids: &[String])
        -> Result<Vec<ChapterInsight>, StoreError>;

    async fn sketches(&self, source_ids: &[String]) -> Result<Vec<TopicSketch>, StoreError>;

    async fn flashcard_decks(
        &self,
        user_id: &str,
        source_ids: &[String],
    ) -> Result<Vec<FlashcardDeck>, StoreError>;

    async fn topic_progress(
        &self,
        user_id: &str,
        subject: Subject,
        exam_context: ExamContext,
    ) -> Result<Vec<TopicProgress>, StoreError>;

    async fn progress_by_id(&self, resource_id: &str) -> Result<Option<TopicProgress>, StoreError>;

    /// Rows whose `(user_id, topic_id, exam_context)` already exists are skipped.
    async fn insert_progress(&self, rows: &[TopicProgress]) -> Result<(), StoreError>;

    /// Appends the activity and folds it into the owning progress row in one
    /// transaction. Returns the updated row.
    async fn record_activity(&self, activity: &TopicActivity) -> Result<TopicProgress, StoreError>;

    async fn attempted_question_ids(
        &self,
        user_id: &str,
        subject: Subject,
    ) -> Result<Vec<String>, StoreError>;
}

/// Bulk content as produced by the ingestion pipeline. Loaded at start-up
/// from `SEED_FILE` and used to build test fixtures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentSnapshot {
    pub topics: Vec<OfficialTopic>,
    pub sources: Vec<QuestionSource>,
    pub questions: Vec<Question>,
    pub mappings: Vec<TopicQuestionMapping>,
    pub insights: Vec<ChapterInsight>,
    pub sketches: Vec<TopicSketch>,
    pub decks: Vec<FlashcardDeck>,
}

impl ContentSnapshot {
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty() && self.sources.is_empty() && self.questions.is_empty()
    }
}
