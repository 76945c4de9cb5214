use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::db::{ContentSnapshot, StoreError, TopicStore};
use crate::services::topic_mastery::apply_activity;
use crate::types::{
    ActivityType, ChapterInsight, ExamContext, FlashcardDeck, OfficialTopic, Question,
    QuestionSource, Subject, TopicActivity, TopicProgress, TopicQuestionMapping, TopicSketch,
};

#[derive(Debug, Default)]
struct Tables {
    content: ContentSnapshot,
    progress: Vec<TopicProgress>,
    activities: Vec<TopicActivity>,
}

/// Process-local store. Guards are never held across an `.await`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: ContentSnapshot) -> Self {
        let store = Self::new();
        store.load_snapshot(snapshot);
        store
    }

    /// Appends content. A mapping for an already-mapped question replaces the
    /// previous one.
    pub fn load_snapshot(&self, snapshot: ContentSnapshot) {
        let mut tables = self.tables.write();
        let content = &mut tables.content;

        content.topics.extend(snapshot.topics);
        content.sources.extend(snapshot.sources);
        content.questions.extend(snapshot.questions);
        for mapping in snapshot.mappings {
            content
                .mappings
                .retain(|existing| existing.question_id != mapping.question_id);
            content.mappings.push(mapping);
        }
        content.insights.extend(snapshot.insights);
        content.sketches.extend(snapshot.sketches);
        content.decks.extend(snapshot.decks);
    }

    pub fn activity_count(&self, resource_id: &str) -> usize {
        self.tables
            .read()
            .activities
            .iter()
            .filter(|activity| activity.topic_resource_id == resource_id)
            .count()
    }
}

fn id_set(ids: &[String]) -> HashSet<&str> {
    ids.iter().map(String::as_str).collect()
}

#[async_trait]
impl TopicStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn official_topics(&self, subject: Subject) -> Result<Vec<OfficialTopic>, StoreError> {
        let tables = self.tables.read();
        let mut topics: Vec<OfficialTopic> = tables
            .content
            .topics
            .iter()
            .filter(|topic| topic.subject == subject)
            .cloned()
            .collect();
        topics.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(topics)
    }

    async fn question_sources(
        &self,
        user_id: &str,
        subject: Subject,
        include_system: bool,
    ) -> Result<Vec<QuestionSource>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .content
            .sources
            .iter()
            .filter(|source| source.subject == subject)
            .filter(|source| source.user_id == user_id || (include_system && source.is_system))
            .cloned()
            .collect())
    }

    async fn questions_for_sources(
        &self,
        source_ids: &[String],
    ) -> Result<Vec<Question>, StoreError> {
        let wanted = id_set(source_ids);
        let tables = self.tables.read();
        Ok(tables
            .content
            .questions
            .iter()
            .filter(|question| wanted.contains(question.source_id.as_str()))
            .cloned()
            .collect())
    }

    async fn mappings_for_questions(
        &self,
        question_ids: &[String],
    ) -> Result<Vec<TopicQuestionMapping>, StoreError> {
        let wanted = id_set(question_ids);
        let tables = self.tables.read();
        Ok(tables
            .content
            .mappings
            .iter()
            .filter(|mapping| wanted.contains(mapping.question_id.as_str()))
            .cloned()
            .collect())
    }

    async fn mappings_for_topics(
        &self,
        topic_ids: &[String],
    ) -> Result<Vec<TopicQuestionMapping>, StoreError> {
        let wanted = id_set(topic_ids);
        let tables = self.tables.read();
        Ok(tables
            .content
            .mappings
            .iter()
            .filter(|mapping| wanted.contains(mapping.topic_id.as_str()))
            .cloned()
            .collect())
    }

    async fn chapter_insights(
        &self,
        source_ids: &[String],
    ) -> Result<Vec<ChapterInsight>, StoreError> {
        let wanted = id_set(source_ids);
        let tables = self.tables.read();
        Ok(tables
            .content
            .insights
            .iter()
            .filter(|insight| wanted.contains(insight.source_id.as_str()))
            .cloned()
            .collect())
    }

    async fn sketches(&self, source_ids: &[String]) -> Result<Vec<TopicSketch>, StoreError> {
        let wanted = id_set(source_ids);
        let tables = self.tables.read();
        Ok(tables
            .content
            .sketches
            .iter()
            .filter(|sketch| wanted.contains(sketch.source_id.as_str()))
            .cloned()
            .collect())
    }

    async fn flashcard_decks(
        &self,
        user_id: &str,
        source_ids: &[String],
    ) -> Result<Vec<FlashcardDeck>, StoreError> {
        let wanted = id_set(source_ids);
        let tables = self.tables.read();
        Ok(tables
            .content
            .decks
            .iter()
            .filter(|deck| deck.user_id == user_id && wanted.contains(deck.source_id.as_str()))
            .cloned()
            .collect())
    }

    async fn topic_progress(
        &self,
        user_id: &str,
        subject: Subject,
        exam_context: ExamContext,
    ) -> Result<Vec<TopicProgress>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .progress
            .iter()
            .filter(|row| {
                row.user_id == user_id && row.subject == subject && row.exam_context == exam_context
            })
            .cloned()
            .collect())
    }

    async fn progress_by_id(&self, resource_id: &str) -> Result<Option<TopicProgress>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .progress
            .iter()
            .find(|row| row.id == resource_id)
            .cloned())
    }

    async fn insert_progress(&self, rows: &[TopicProgress]) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        for row in rows {
            let exists = tables.progress.iter().any(|existing| {
                existing.id == row.id
                    || (existing.user_id == row.user_id
                        && existing.topic_id == row.topic_id
                        && existing.exam_context == row.exam_context)
            });
            if !exists {
                tables.progress.push(row.clone());
            }
        }
        Ok(())
    }

    async fn record_activity(&self, activity: &TopicActivity) -> Result<TopicProgress, StoreError> {
        let mut tables = self.tables.write();

        let index = tables
            .progress
            .iter()
            .position(|row| row.id == activity.topic_resource_id)
            .ok_or_else(|| StoreError::NotFound(activity.topic_resource_id.clone()))?;

        tables.activities.push(activity.clone());
        let history: Vec<TopicActivity> = tables
            .activities
            .iter()
            .filter(|row| row.topic_resource_id == activity.topic_resource_id)
            .cloned()
            .collect();

        let updated = apply_activity(&tables.progress[index], activity, &history);
        tables.progress[index] = updated.clone();
        Ok(updated)
    }

    async fn attempted_question_ids(
        &self,
        user_id: &str,
        subject: Subject,
    ) -> Result<Vec<String>, StoreError> {
        let tables = self.tables.read();
        let resources: HashSet<&str> = tables
            .progress
            .iter()
            .filter(|row| row.user_id == user_id && row.subject == subject)
            .map(|row| row.id.as_str())
            .collect();

        let mut seen = HashSet::new();
        Ok(tables
            .activities
            .iter()
            .filter(|activity| {
                activity.user_id == user_id
                    && activity.activity_type == ActivityType::PracticedQuestion
                    && resources.contains(activity.topic_resource_id.as_str())
            })
            .filter_map(|activity| activity.question_id.clone())
            .filter(|id| seen.insert(id.clone()))
            .collect())
    }
}
