#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use exam_prep_backend::db::{ContentSnapshot, MemoryStore, StoreError, TopicStore};
use exam_prep_backend::services::domain_classifier::DomainTaxonomies;
use exam_prep_backend::state::AppState;
use exam_prep_backend::types::{
    BloomsLevel, ChapterInsight, Difficulty, ExamContext, FlashcardDeck, OfficialTopic, Question,
    QuestionSource, RawFlashcard, Subject, TopicActivity, TopicProgress, TopicQuestionMapping,
    TopicSketch,
};

pub const LEARNER: &str = "learner-1";
pub const OTHER_LEARNER: &str = "learner-2";
pub const ELECTRICITY_TOPIC: &str = "topic-current-electricity";
pub const OPTICS_TOPIC: &str = "topic-ray-optics";
pub const OWN_SOURCE: &str = "scan-own";
pub const SYSTEM_SOURCE: &str = "scan-system";

pub fn question(id: &str, source_id: &str, topic: &str, difficulty: Difficulty) -> Question {
    Question {
        id: id.to_string(),
        source_id: source_id.to_string(),
        text: format!("question {id}"),
        options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
        correct_option_index: Some(0),
        marks: 1,
        difficulty,
        topic: topic.to_string(),
        blooms: BloomsLevel::Apply,
        solution_steps: vec!["step".into()],
        mastery_material: None,
        exam_tip: None,
        key_formulas: Vec::new(),
        has_visual_element: false,
        source: Some("KCET 2023".into()),
    }
}

/// Two physics topics. The learner's own scan holds 18 electricity questions
/// (6 per difficulty); a published system scan holds 4 optics questions.
/// Study material joins by topic name.
pub fn physics_snapshot() -> ContentSnapshot {
    let mut questions = Vec::new();
    let mut mappings = Vec::new();
    for (prefix, difficulty) in [
        ("e", Difficulty::Easy),
        ("m", Difficulty::Moderate),
        ("h", Difficulty::Hard),
    ] {
        for n in 0..6 {
            let id = format!("elec-{prefix}{n}");
            questions.push(question(&id, OWN_SOURCE, "Current Electricity", difficulty));
            mappings.push(TopicQuestionMapping {
                question_id: id,
                topic_id: ELECTRICITY_TOPIC.to_string(),
                confidence: 1.0,
            });
        }
    }
    for n in 0..4 {
        let id = format!("optics-{n}");
        questions.push(question(&id, SYSTEM_SOURCE, "Ray Optics", Difficulty::Moderate));
        mappings.push(TopicQuestionMapping {
            question_id: id,
            topic_id: OPTICS_TOPIC.to_string(),
            confidence: 0.9,
        });
    }

    ContentSnapshot {
        topics: vec![
            OfficialTopic {
                id: ELECTRICITY_TOPIC.to_string(),
                name: "Current Electricity".to_string(),
                subject: Subject::Physics,
                exam_weightage: [(ExamContext::Kcet, 5.0), (ExamContext::Neet, 4.0)]
                    .into_iter()
                    .collect(),
            },
            OfficialTopic {
                id: OPTICS_TOPIC.to_string(),
                name: "Ray Optics".to_string(),
                subject: Subject::Physics,
                exam_weightage: [(ExamContext::Kcet, 3.0)].into_iter().collect(),
            },
        ],
        sources: vec![
            QuestionSource {
                id: OWN_SOURCE.to_string(),
                user_id: LEARNER.to_string(),
                subject: Subject::Physics,
                exam_context: Some(ExamContext::Kcet),
                is_system: false,
                year: Some(2023),
            },
            QuestionSource {
                id: SYSTEM_SOURCE.to_string(),
                user_id: "publisher".to_string(),
                subject: Subject::Physics,
                exam_context: Some(ExamContext::Kcet),
                is_system: true,
                year: Some(2022),
            },
        ],
        questions,
        mappings,
        insights: vec![ChapterInsight {
            source_id: OWN_SOURCE.to_string(),
            topic: "Current Electricity".to_string(),
            total_marks: 18,
            difficulty: Difficulty::Moderate,
            description: "Kirchhoff and bridges".to_string(),
            key_concepts: vec!["Ohm's law".into()],
            important_formulas: vec!["V = IR".into()],
            study_resources: Vec::new(),
            visual_summary: None,
            preparation_checklist: Vec::new(),
            high_yield_topics: Vec::new(),
        }],
        sketches: vec![TopicSketch {
            id: "sketch-1".to_string(),
            source_id: OWN_SOURCE.to_string(),
            topic: "Ray Optics".to_string(),
            pages: vec![Default::default()],
        }],
        decks: vec![FlashcardDeck {
            id: "deck-1".to_string(),
            user_id: LEARNER.to_string(),
            source_id: OWN_SOURCE.to_string(),
            cards: vec![RawFlashcard {
                id: Some("card-1".into()),
                term: Some("Resistance".into()),
                def: Some("Opposition to current".into()),
                topic: Some("Current Electricity".into()),
                ..Default::default()
            }],
        }],
    }
}

pub fn physics_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::from_snapshot(physics_snapshot()))
}

pub async fn create_test_app() -> Router {
    create_test_app_with_store(physics_store()).await
}

pub async fn create_test_app_with_store(store: Arc<dyn TopicStore>) -> Router {
    let state = AppState::new(store, Arc::new(DomainTaxonomies::builtin()))
        .with_selection_seed(Some(7));
    exam_prep_backend::create_app(state)
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_json(
    app: Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

/// Store operations `FlakyStore` can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    OfficialTopics,
    QuestionSources,
    Questions,
    Mappings,
    Insights,
    Sketches,
    Flashcards,
    TopicProgress,
    InsertProgress,
    AttemptedIds,
}

/// Wraps a `MemoryStore` and fails the configured operations.
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    failing: HashSet<Op>,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>, failing: impl IntoIterator<Item = Op>) -> Self {
        Self {
            inner,
            failing: failing.into_iter().collect(),
        }
    }

    fn check(&self, op: Op) -> Result<(), StoreError> {
        if self.failing.contains(&op) {
            return Err(StoreError::Unavailable(format!("{op:?} offline")));
        }
        Ok(())
    }
}

#[async_trait]
impl TopicStore for FlakyStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }

    async fn official_topics(&self, subject: Subject) -> Result<Vec<OfficialTopic>, StoreError> {
        self.check(Op::OfficialTopics)?;
        self.inner.official_topics(subject).await
    }

    async fn question_sources(
        &self,
        user_id: &str,
        subject: Subject,
        include_system: bool,
    ) -> Result<Vec<QuestionSource>, StoreError> {
        self.check(Op::QuestionSources)?;
        self.inner
            .question_sources(user_id, subject, include_system)
            .await
    }

    async fn questions_for_sources(
        &self,
        source_ids: &[String],
    ) -> Result<Vec<Question>, StoreError> {
        self.check(Op::Questions)?;
        self.inner.questions_for_sources(source_ids).await
    }

    async fn mappings_for_questions(
        &self,
        question_ids: &[String],
    ) -> Result<Vec<TopicQuestionMapping>, StoreError> {
        self.check(Op::Mappings)?;
        self.inner.mappings_for_questions(question_ids).await
    }

    async fn mappings_for_topics(
        &self,
        topic_ids: &[String],
    ) -> Result<Vec<TopicQuestionMapping>, StoreError> {
        self.check(Op::Mappings)?;
        self.inner.mappings_for_topics(topic_ids).await
    }

    async fn chapter_insights(
        &self,
        source_ids: &[String],
    ) -> Result<Vec<ChapterInsight>, StoreError> {
        self.check(Op::Insights)?;
        self.inner.chapter_insights(source_ids).await
    }

    async fn sketches(&self, source_ids: &[String]) -> Result<Vec<TopicSketch>, StoreError> {
        self.check(Op::Sketches)?;
        self.inner.sketches(source_ids).await
    }

    async fn flashcard_decks(
        &self,
        user_id: &str,
        source_ids: &[String],
    ) -> Result<Vec<FlashcardDeck>, StoreError> {
        self.check(Op::Flashcards)?;
        self.inner.flashcard_decks(user_id, source_ids).await
    }

    async fn topic_progress(
        &self,
        user_id: &str,
        subject: Subject,
        exam_context: ExamContext,
    ) -> Result<Vec<TopicProgress>, StoreError> {
        self.check(Op::TopicProgress)?;
        self.inner.topic_progress(user_id, subject, exam_context).await
    }

    async fn progress_by_id(&self, resource_id: &str) -> Result<Option<TopicProgress>, StoreError> {
        self.inner.progress_by_id(resource_id).await
    }

    async fn insert_progress(&self, rows: &[TopicProgress]) -> Result<(), StoreError> {
        self.check(Op::InsertProgress)?;
        self.inner.insert_progress(rows).await
    }

    async fn record_activity(&self, activity: &TopicActivity) -> Result<TopicProgress, StoreError> {
        self.inner.record_activity(activity).await
    }

    async fn attempted_question_ids(
        &self,
        user_id: &str,
        subject: Subject,
    ) -> Result<Vec<String>, StoreError> {
        self.check(Op::AttemptedIds)?;
        self.inner.attempted_question_ids(user_id, subject).await
    }
}
