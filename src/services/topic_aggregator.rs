//! Builds one `TopicResource` per official topic from independently keyed
//! sources.
//!
//! Questions join through `TopicQuestionMapping` (topic id). Chapter
//! insights, sketches and flashcards join on the topic's display name; those
//! records carry no mapping, and switching them to ids would change which
//! legacy rows attach to a topic.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::db::config::DEFAULT_MAPPING_CHUNK_SIZE;
use crate::db::{StoreError, TopicStore};
use crate::types::{
    ChapterInsight, Difficulty, DifficultyDistribution, ExamContext, Flashcard, FlashcardDeck,
    OfficialTopic, Question, RawFlashcard, Subject, TopicProgress, TopicResource, TopicSketch,
    TopicSketchPage,
};

const UNCATEGORIZED_TOPIC: &str = "Uncategorized";
const GENERAL_FLASHCARD_TOPIC: &str = "General";

#[derive(Debug, Clone, Copy)]
pub struct AggregationOptions {
    /// Question ids per mapping lookup.
    pub mapping_chunk_size: usize,
}

impl Default for AggregationOptions {
    fn default() -> Self {
        Self {
            mapping_chunk_size: DEFAULT_MAPPING_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("official topics unavailable: {0}")]
    TopicsUnavailable(#[source] StoreError),
    #[error("question pool unavailable: {0}")]
    QuestionPoolUnavailable(#[source] StoreError),
    #[error("topic progress unavailable: {0}")]
    ProgressUnavailable(#[source] StoreError),
}

/// Everything fetched for one `(user, subject)` pair before merging.
#[derive(Debug, Default)]
struct LoadedContent {
    questions: Vec<Question>,
    question_topics: HashMap<String, String>,
    insights: Vec<ChapterInsight>,
    sketches: Vec<TopicSketch>,
    decks: Vec<FlashcardDeck>,
}

/// Lookup maps built once per call. Names may repeat across official
/// topics, so a name resolves to every topic carrying it.
struct TopicIndex {
    by_id: HashMap<String, usize>,
    by_name: HashMap<String, Vec<usize>>,
}

impl TopicIndex {
    fn new(topics: &[OfficialTopic]) -> Self {
        let mut by_id = HashMap::with_capacity(topics.len());
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::with_capacity(topics.len());
        for (index, topic) in topics.iter().enumerate() {
            by_id.insert(topic.id.clone(), index);
            by_name.entry(topic.name.clone()).or_default().push(index);
        }
        Self { by_id, by_name }
    }

    fn by_id(&self, topic_id: &str) -> Option<usize> {
        self.by_id.get(topic_id).copied()
    }

    fn by_name(&self, name: &str) -> &[usize] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn degrade<T: Default>(source: &'static str, result: Result<T, StoreError>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(source, error = %err, "topic source unavailable, continuing without it");
            T::default()
        }
    }
}

async fn load_content(
    store: &dyn TopicStore,
    user_id: &str,
    subject: Subject,
    options: &AggregationOptions,
) -> Result<LoadedContent, AggregationError> {
    let sources = store
        .question_sources(user_id, subject, true)
        .await
        .map_err(AggregationError::QuestionPoolUnavailable)?;
    if sources.is_empty() {
        return Ok(LoadedContent::default());
    }
    let source_ids: Vec<String> = sources.into_iter().map(|source| source.id).collect();

    let questions = store
        .questions_for_sources(&source_ids)
        .await
        .map_err(AggregationError::QuestionPoolUnavailable)?;

    let question_ids: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
    let mut question_topics = HashMap::with_capacity(question_ids.len());
    for chunk in question_ids.chunks(options.mapping_chunk_size.max(1)) {
        match store.mappings_for_questions(chunk).await {
            Ok(mappings) => {
                for mapping in mappings {
                    question_topics.insert(mapping.question_id, mapping.topic_id);
                }
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    chunk_len = chunk.len(),
                    "topic mapping chunk unavailable, questions left unmapped"
                );
            }
        }
    }

    let insights = degrade("chapter_insights", store.chapter_insights(&source_ids).await);
    let sketches = degrade("topic_sketches", store.sketches(&source_ids).await);
    let decks = degrade(
        "flashcards",
        store.flashcard_decks(user_id, &source_ids).await,
    );

    tracing::debug!(
        user_id = %user_id,
        subject = %subject,
        questions = questions.len(),
        mapped = question_topics.len(),
        "topic content loaded"
    );

    Ok(LoadedContent {
        questions,
        question_topics,
        insights,
        sketches,
        decks,
    })
}

/// Shares rounded independently. The three values may sum to 99 or 101.
pub fn difficulty_distribution(questions: &[Question]) -> DifficultyDistribution {
    let total = questions.len();
    if total == 0 {
        return DifficultyDistribution::default();
    }

    let share = |difficulty: Difficulty| {
        let count = questions
            .iter()
            .filter(|q| q.difficulty == difficulty)
            .count();
        ((count as f64 / total as f64) * 100.0).round() as u32
    };

    DifficultyDistribution::new(
        share(Difficulty::Easy),
        share(Difficulty::Moderate),
        share(Difficulty::Hard),
    )
}

pub fn sketch_pages(sketch: &TopicSketch) -> Vec<TopicSketchPage> {
    sketch
        .pages
        .iter()
        .enumerate()
        .map(|(index, page)| TopicSketchPage {
            id: format!("{}_page_{index}", sketch.id),
            title: non_empty(page.title.as_deref())
                .map(str::to_string)
                .unwrap_or_else(|| format!("Page {}", index + 1)),
            content: page.content.clone().unwrap_or_default(),
            image_url: page.image_url.clone().unwrap_or_default(),
        })
        .collect()
}

/// Decodes a cached card and returns the topic name it groups under.
pub fn decode_flashcard(card: &RawFlashcard) -> (String, Flashcard) {
    let context = non_empty(card.topic.as_deref()).or(non_empty(card.context.as_deref()));
    let group = context.unwrap_or(GENERAL_FLASHCARD_TOPIC).to_string();

    let flashcard = Flashcard {
        id: non_empty(card.id.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        term: card.term.clone().unwrap_or_default(),
        definition: non_empty(card.def.as_deref())
            .or(non_empty(card.definition.as_deref()))
            .unwrap_or_default()
            .to_string(),
        context: context.map(str::to_string),
    };

    (group, flashcard)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

fn source_documents(questions: &[Question]) -> Vec<String> {
    let mut seen = HashSet::new();
    questions
        .iter()
        .filter_map(|q| non_empty(q.source.as_deref()))
        .filter(|source| seen.insert(*source))
        .map(str::to_string)
        .collect()
}

/// Merges content into one resource per topic. `progress[i]` belongs to
/// `topics[i]`.
fn build_resources(
    topics: &[OfficialTopic],
    progress: &[TopicProgress],
    content: LoadedContent,
) -> Vec<TopicResource> {
    let index = TopicIndex::new(topics);
    let mut resources: Vec<TopicResource> = topics
        .iter()
        .zip(progress)
        .map(|(topic, row)| TopicResource::from_progress(topic, row))
        .collect();

    for question in content.questions {
        let slot = content
            .question_topics
            .get(&question.id)
            .and_then(|topic_id| index.by_id(topic_id));
        if let Some(slot) = slot {
            resources[slot].questions.push(question);
        }
    }

    for insight in content.insights {
        let name = non_empty(Some(insight.topic.as_str())).unwrap_or(UNCATEGORIZED_TOPIC);
        for &slot in index.by_name(name) {
            resources[slot].chapter_insights.push(insight.clone());
        }
    }

    for sketch in &content.sketches {
        let name = non_empty(Some(sketch.topic.as_str())).unwrap_or(UNCATEGORIZED_TOPIC);
        let slots = index.by_name(name);
        if slots.is_empty() {
            continue;
        }
        let pages = sketch_pages(sketch);
        for &slot in slots {
            resources[slot].sketch_pages.extend(pages.iter().cloned());
        }
    }

    for deck in &content.decks {
        for card in &deck.cards {
            let (group, flashcard) = decode_flashcard(card);
            for &slot in index.by_name(&group) {
                resources[slot].flashcards.push(flashcard.clone());
            }
        }
    }

    for resource in &mut resources {
        resource.total_questions = resource.questions.len();
        resource.difficulty_distribution = difficulty_distribution(&resource.questions);
        resource.source_documents = source_documents(&resource.questions);
    }

    resources
}

/// Progress rows in topic order. Missing rows are created in the zero state
/// and persisted so the returned ids can record activities. Nothing is
/// written when the stored rows could not be read.
async fn resolve_progress(
    store: &dyn TopicStore,
    user_id: &str,
    subject: Subject,
    exam_context: ExamContext,
    topics: &[OfficialTopic],
) -> Vec<TopicProgress> {
    let (stored_ok, stored) = match store.topic_progress(user_id, subject, exam_context).await {
        Ok(rows) => (true, rows),
        Err(err) => {
            tracing::warn!(
                source = "topic_progress",
                error = %err,
                "topic source unavailable, continuing without it"
            );
            (false, Vec::new())
        }
    };

    let mut existing: HashMap<String, TopicProgress> = stored
        .into_iter()
        .map(|row| (row.topic_id.clone(), row))
        .collect();

    let mut missing = Vec::new();
    let rows: Vec<TopicProgress> = topics
        .iter()
        .map(|topic| {
            existing.remove(&topic.id).unwrap_or_else(|| {
                let row = TopicProgress::not_started(user_id, &topic.id, subject, exam_context);
                missing.push(row.clone());
                row
            })
        })
        .collect();

    if !stored_ok || missing.is_empty() {
        return rows;
    }

    if let Err(err) = store.insert_progress(&missing).await {
        tracing::warn!(error = %err, rows = missing.len(), "failed to persist zero-state topic progress");
        return rows;
    }

    // A concurrent call may have inserted the same topics first; prefer the
    // stored ids.
    match store.topic_progress(user_id, subject, exam_context).await {
        Ok(fresh) => {
            let fresh: HashMap<String, TopicProgress> = fresh
                .into_iter()
                .map(|row| (row.topic_id.clone(), row))
                .collect();
            rows.into_iter()
                .map(|row| fresh.get(&row.topic_id).cloned().unwrap_or(row))
                .collect()
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to reload topic progress after insert");
            rows
        }
    }
}

pub async fn aggregate_topics(
    store: &dyn TopicStore,
    user_id: &str,
    subject: Subject,
    exam_context: ExamContext,
    options: &AggregationOptions,
) -> Result<Vec<TopicResource>, AggregationError> {
    let topics: Vec<OfficialTopic> = store
        .official_topics(subject)
        .await
        .map_err(AggregationError::TopicsUnavailable)?
        .into_iter()
        .filter(|topic| topic.is_examined_in(exam_context))
        .collect();

    if topics.is_empty() {
        tracing::debug!(subject = %subject, exam = %exam_context, "no official topics examined");
        return Ok(Vec::new());
    }

    let content = load_content(store, user_id, subject, options).await?;
    let progress = resolve_progress(store, user_id, subject, exam_context, &topics).await;
    let resources = build_resources(&topics, &progress, content);

    tracing::info!(
        user_id = %user_id,
        subject = %subject,
        exam = %exam_context,
        topics = resources.len(),
        "topics aggregated"
    );

    Ok(resources)
}

/// Aggregated view of one persisted progress row. `None` when the row does
/// not exist, belongs to another user, or its official topic is gone.
pub async fn topic_resource(
    store: &dyn TopicStore,
    user_id: &str,
    resource_id: &str,
    options: &AggregationOptions,
) -> Result<Option<TopicResource>, AggregationError> {
    let Some(progress) = store
        .progress_by_id(resource_id)
        .await
        .map_err(AggregationError::ProgressUnavailable)?
    else {
        return Ok(None);
    };
    if progress.user_id != user_id {
        return Ok(None);
    }

    let topic = store
        .official_topics(progress.subject)
        .await
        .map_err(AggregationError::TopicsUnavailable)?
        .into_iter()
        .find(|topic| topic.id == progress.topic_id);
    let Some(topic) = topic else {
        return Ok(None);
    };

    let content = load_content(store, user_id, progress.subject, options).await?;
    let topics = [topic];
    Ok(build_resources(&topics, std::slice::from_ref(&progress), content).pop())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ContentSnapshot, MemoryStore};
    use crate::types::{
        BloomsLevel, QuestionSource, SketchPageContent, StudyStage, TopicQuestionMapping,
    };

    fn topic(id: &str, name: &str, kcet_weight: f64) -> OfficialTopic {
        OfficialTopic {
            id: id.to_string(),
            name: name.to_string(),
            subject: Subject::Physics,
            exam_weightage: HashMap::from([(ExamContext::Kcet, kcet_weight)]),
        }
    }

    fn question(id: &str, topic: &str, difficulty: Difficulty, source: &str) -> Question {
        Question {
            id: id.to_string(),
            source_id: "scan-1".to_string(),
            text: format!("text {id}"),
            options: Vec::new(),
            correct_option_index: None,
            marks: 1,
            difficulty,
            topic: topic.to_string(),
            blooms: BloomsLevel::Understand,
            solution_steps: Vec::new(),
            mastery_material: None,
            exam_tip: None,
            key_formulas: Vec::new(),
            has_visual_element: false,
            source: Some(source.to_string()),
        }
    }

    fn mapping(question_id: &str, topic_id: &str) -> TopicQuestionMapping {
        TopicQuestionMapping {
            question_id: question_id.to_string(),
            topic_id: topic_id.to_string(),
            confidence: 1.0,
        }
    }

    fn snapshot() -> ContentSnapshot {
        ContentSnapshot {
            topics: vec![
                topic("t-elec", "Current Electricity", 5.0),
                topic("t-optics", "Ray Optics", 3.0),
                topic("t-neet-only", "Biomolecules", 0.0),
            ],
            sources: vec![QuestionSource {
                id: "scan-1".to_string(),
                user_id: "u1".to_string(),
                subject: Subject::Physics,
                exam_context: Some(ExamContext::Kcet),
                is_system: false,
                year: Some(2024),
            }],
            questions: vec![
                question("q1", "Current Electricity", Difficulty::Easy, "KCET 2024"),
                question("q2", "Electricity", Difficulty::Moderate, "KCET 2024"),
                question("q3", "Current Electricity", Difficulty::Hard, "KCET 2023"),
                // name matches but no mapping: must not attach
                question("q4", "Ray Optics", Difficulty::Easy, "KCET 2023"),
            ],
            mappings: vec![
                mapping("q1", "t-elec"),
                mapping("q2", "t-elec"),
                mapping("q3", "t-elec"),
            ],
            insights: vec![ChapterInsight {
                source_id: "scan-1".to_string(),
                topic: "Ray Optics".to_string(),
                total_marks: 6,
                difficulty: Difficulty::Moderate,
                description: "Lens and mirror problems".to_string(),
                key_concepts: Vec::new(),
                important_formulas: Vec::new(),
                study_resources: Vec::new(),
                visual_summary: None,
                preparation_checklist: Vec::new(),
                high_yield_topics: Vec::new(),
            }],
            sketches: vec![TopicSketch {
                id: "sk1".to_string(),
                source_id: "scan-1".to_string(),
                topic: "Current Electricity".to_string(),
                pages: vec![
                    SketchPageContent {
                        title: Some("Ohm's law".to_string()),
                        content: Some("V = IR".to_string()),
                        image_url: None,
                    },
                    SketchPageContent::default(),
                ],
            }],
            decks: vec![FlashcardDeck {
                id: "deck-1".to_string(),
                user_id: "u1".to_string(),
                source_id: "scan-1".to_string(),
                cards: vec![
                    RawFlashcard {
                        id: Some("c1".to_string()),
                        term: Some("Focal length".to_string()),
                        def: Some("Distance to focus".to_string()),
                        topic: Some("Ray Optics".to_string()),
                        ..RawFlashcard::default()
                    },
                    RawFlashcard {
                        term: Some("Resistance".to_string()),
                        definition: Some("Opposition to current".to_string()),
                        context: Some("Current Electricity".to_string()),
                        ..RawFlashcard::default()
                    },
                ],
            }],
        }
    }

    fn find<'a>(resources: &'a [TopicResource], topic_id: &str) -> &'a TopicResource {
        resources
            .iter()
            .find(|r| r.topic_id == topic_id)
            .expect("topic present")
    }

    #[tokio::test]
    async fn every_examined_topic_appears_once_without_scans() {
        let mut content = snapshot();
        content.sources.clear();
        let store = MemoryStore::from_snapshot(content);

        let resources = aggregate_topics(
            &store,
            "u1",
            Subject::Physics,
            ExamContext::Kcet,
            &AggregationOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(resources.len(), 2);
        for resource in &resources {
            assert_eq!(resource.total_questions, 0);
            assert_eq!(resource.mastery_level, 0);
            assert_eq!(resource.study_stage, StudyStage::NotStarted);
            assert_eq!(resource.difficulty_distribution, DifficultyDistribution::default());
        }
    }

    #[tokio::test]
    async fn questions_join_by_id_and_other_sources_by_name() {
        let store = MemoryStore::from_snapshot(snapshot());
        let resources = aggregate_topics(
            &store,
            "u1",
            Subject::Physics,
            ExamContext::Kcet,
            &AggregationOptions::default(),
        )
        .await
        .unwrap();

        let electricity = find(&resources, "t-elec");
        assert_eq!(electricity.total_questions, 3);
        assert_eq!(electricity.sketch_pages.len(), 2);
        assert_eq!(electricity.sketch_pages[0].id, "sk1_page_0");
        assert_eq!(electricity.sketch_pages[1].title, "Page 2");
        assert_eq!(electricity.flashcards.len(), 1);
        assert_eq!(electricity.flashcards[0].definition, "Opposition to current");
        assert_eq!(
            electricity.source_documents,
            vec!["KCET 2024".to_string(), "KCET 2023".to_string()]
        );

        let optics = find(&resources, "t-optics");
        assert_eq!(optics.total_questions, 0, "unmapped question must not attach by name");
        assert_eq!(optics.chapter_insights.len(), 1);
        assert_eq!(optics.flashcards[0].definition, "Distance to focus");
    }

    #[tokio::test]
    async fn difficulty_shares_are_rounded_independently() {
        let store = MemoryStore::from_snapshot(snapshot());
        let resources = aggregate_topics(
            &store,
            "u1",
            Subject::Physics,
            ExamContext::Kcet,
            &AggregationOptions::default(),
        )
        .await
        .unwrap();

        let dist = find(&resources, "t-elec").difficulty_distribution;
        assert_eq!(dist, DifficultyDistribution::new(33, 33, 33));
        assert!((98..=102).contains(&dist.total()));
    }

    #[tokio::test]
    async fn progress_rows_are_materialized_and_reused() {
        let store = MemoryStore::from_snapshot(snapshot());
        let options = AggregationOptions::default();

        let first = aggregate_topics(&store, "u1", Subject::Physics, ExamContext::Kcet, &options)
            .await
            .unwrap();
        let second = aggregate_topics(&store, "u1", Subject::Physics, ExamContext::Kcet, &options)
            .await
            .unwrap();

        let first_ids: Vec<&str> = first.iter().map(|r| r.id.as_str()).collect();
        let second_ids: Vec<&str> = second.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(first_ids, second_ids);

        let stored = store.progress_by_id(first_ids[0]).await.unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn stored_progress_is_preserved() {
        let store = MemoryStore::from_snapshot(snapshot());
        let mut row = TopicProgress::not_started("u1", "t-optics", Subject::Physics, ExamContext::Kcet);
        row.mastery_level = 72;
        row.study_stage = StudyStage::Practicing;
        row.questions_attempted = 14;
        store.insert_progress(std::slice::from_ref(&row)).await.unwrap();

        let resources = aggregate_topics(
            &store,
            "u1",
            Subject::Physics,
            ExamContext::Kcet,
            &AggregationOptions::default(),
        )
        .await
        .unwrap();

        let optics = find(&resources, "t-optics");
        assert_eq!(optics.id, row.id);
        assert_eq!(optics.mastery_level, 72);
        assert_eq!(optics.study_stage, StudyStage::Practicing);
        assert_eq!(optics.questions_attempted, 14);
    }

    #[tokio::test]
    async fn small_mapping_chunks_still_map_everything() {
        let store = MemoryStore::from_snapshot(snapshot());
        let resources = aggregate_topics(
            &store,
            "u1",
            Subject::Physics,
            ExamContext::Kcet,
            &AggregationOptions {
                mapping_chunk_size: 1,
            },
        )
        .await
        .unwrap();

        assert_eq!(find(&resources, "t-elec").total_questions, 3);
    }

    #[tokio::test]
    async fn single_resource_checks_ownership() {
        let store = MemoryStore::from_snapshot(snapshot());
        let options = AggregationOptions::default();
        let resources = aggregate_topics(&store, "u1", Subject::Physics, ExamContext::Kcet, &options)
            .await
            .unwrap();
        let id = find(&resources, "t-elec").id.clone();

        let own = topic_resource(&store, "u1", &id, &options).await.unwrap();
        let own = own.expect("owner sees resource");
        assert_eq!(own.topic_name, "Current Electricity");
        assert_eq!(own.total_questions, 3);

        assert!(topic_resource(&store, "u2", &id, &options).await.unwrap().is_none());
        assert!(topic_resource(&store, "u1", "missing", &options).await.unwrap().is_none());
    }

    #[test]
    fn flashcard_fields_fall_back_in_order() {
        let (group, card) = decode_flashcard(&RawFlashcard {
            def: Some(String::new()),
            definition: Some("legacy".to_string()),
            ..RawFlashcard::default()
        });
        assert_eq!(group, "General");
        assert_eq!(card.definition, "legacy");
        assert!(card.context.is_none());
        assert!(!card.id.is_empty());
        assert_eq!(card.term, "");
    }
}
