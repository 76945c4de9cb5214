use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use exam_prep_backend::db::TopicStore;
use exam_prep_backend::services::question_selector::{
    select_questions_for_test, SelectedQuestionSet, SelectionCriteria, SelectionError,
};
use exam_prep_backend::services::topic_aggregator::{aggregate_topics, AggregationOptions};
use exam_prep_backend::services::topic_mastery::{record_topic_activity, RecordActivityInput};
use exam_prep_backend::types::{ActivityType, ExamContext, Subject, TestType};

mod common;

use common::{FlakyStore, Op, ELECTRICITY_TOPIC, LEARNER};

fn criteria(topics: Option<Vec<String>>, total_questions: u32) -> SelectionCriteria {
    SelectionCriteria {
        user_id: LEARNER.to_string(),
        test_type: TestType::TopicQuiz,
        subject: Subject::Physics,
        exam_context: ExamContext::Kcet,
        topics,
        total_questions,
        mastery_level: None,
        exclude_question_ids: Vec::new(),
        difficulty_distribution: None,
        exclude_attempted: false,
    }
}

async fn select(
    store: &dyn TopicStore,
    criteria: &SelectionCriteria,
) -> Result<SelectedQuestionSet, SelectionError> {
    select_questions_for_test(store, criteria, &mut StdRng::seed_from_u64(11)).await
}

#[tokio::test]
async fn mapping_failure_falls_back_to_topic_names() {
    let store = FlakyStore::new(common::physics_store(), [Op::Mappings]);
    let topics = vec![ELECTRICITY_TOPIC.to_string(), "Current Electricity".to_string()];

    let selected = select(&store, &criteria(Some(topics), 10)).await.unwrap();

    assert_eq!(selected.questions.len(), 10);
    assert!(selected.questions.iter().all(|q| q.topic == "Current Electricity"));
}

#[tokio::test]
async fn mapping_failure_with_only_topic_ids_is_an_empty_pool() {
    let store = FlakyStore::new(common::physics_store(), [Op::Mappings]);

    let err = select(&store, &criteria(Some(vec![ELECTRICITY_TOPIC.to_string()]), 10))
        .await
        .unwrap_err();

    assert!(matches!(err, SelectionError::EmptyPool), "{err:?}");
}

#[tokio::test]
async fn attempt_history_failure_excludes_nothing() {
    let inner = common::physics_store();
    aggregate_topics(
        inner.as_ref(),
        LEARNER,
        Subject::Physics,
        ExamContext::Kcet,
        &AggregationOptions::default(),
    )
    .await
    .unwrap();
    let progress = inner
        .topic_progress(LEARNER, Subject::Physics, ExamContext::Kcet)
        .await
        .unwrap()
        .into_iter()
        .find(|row| row.topic_id == ELECTRICITY_TOPIC)
        .unwrap();
    record_topic_activity(
        inner.as_ref(),
        RecordActivityInput {
            user_id: LEARNER.to_string(),
            topic_resource_id: progress.id,
            activity_type: ActivityType::PracticedQuestion,
            question_id: Some("elec-e0".to_string()),
            is_correct: Some(true),
            time_spent: Some(30),
        },
    )
    .await
    .unwrap();

    let mut request = criteria(None, 18);
    request.exclude_attempted = true;

    let healthy = select(inner.as_ref(), &request).await.unwrap();
    assert_eq!(healthy.questions.len(), 17);
    assert!(healthy.questions.iter().all(|q| q.id != "elec-e0"));

    let store = FlakyStore::new(Arc::clone(&inner), [Op::AttemptedIds]);
    let degraded = select(&store, &request).await.unwrap();
    assert_eq!(degraded.questions.len(), 18);
    assert!(degraded.questions.iter().any(|q| q.id == "elec-e0"));
}

#[tokio::test]
async fn source_failure_is_still_fatal() {
    let store = FlakyStore::new(common::physics_store(), [Op::QuestionSources]);

    let err = select(&store, &criteria(None, 10)).await.unwrap_err();

    assert!(matches!(err, SelectionError::Store(_)), "{err:?}");
}
