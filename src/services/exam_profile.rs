use serde::Serialize;

use crate::types::{DifficultyDistribution, ExamContext, TestType};

pub const DEFAULT_MASTERY_LEVEL: f64 = 50.0;

const KCET_MOCK: DifficultyDistribution = DifficultyDistribution::new(40, 45, 15);
const NEET_MOCK: DifficultyDistribution = DifficultyDistribution::new(35, 45, 20);
const JEE_MOCK: DifficultyDistribution = DifficultyDistribution::new(30, 40, 30);
const CBSE_MOCK: DifficultyDistribution = DifficultyDistribution::new(45, 40, 15);

/// Difficulty mix of the real paper for each exam.
pub fn mock_profile(exam_context: ExamContext) -> DifficultyDistribution {
    match exam_context {
        ExamContext::Kcet => KCET_MOCK,
        ExamContext::Neet => NEET_MOCK,
        ExamContext::Jee => JEE_MOCK,
        ExamContext::Cbse => CBSE_MOCK,
    }
}

/// Four coarse mastery bands; small mastery changes do not move the mix.
pub fn adaptive_profile(mastery_level: f64) -> DifficultyDistribution {
    if mastery_level < 30.0 {
        DifficultyDistribution::new(60, 30, 10)
    } else if mastery_level < 60.0 {
        DifficultyDistribution::new(35, 45, 20)
    } else if mastery_level < 85.0 {
        DifficultyDistribution::new(25, 45, 30)
    } else {
        DifficultyDistribution::new(15, 35, 50)
    }
}

pub fn recommended_question_count(test_type: TestType, exam_context: ExamContext) -> u32 {
    match test_type {
        TestType::TopicQuiz => 10,
        TestType::SubjectTest => 30,
        TestType::FullMock => match exam_context {
            ExamContext::Kcet => 60,
            // per subject: 180 over four subjects
            ExamContext::Neet => 45,
            // per subject: 90 over three subjects
            ExamContext::Jee => 30,
            ExamContext::Cbse => 40,
        },
    }
}

pub fn recommended_duration_minutes(test_type: TestType, exam_context: ExamContext) -> u32 {
    match test_type {
        TestType::TopicQuiz => 15,
        TestType::SubjectTest => 60,
        TestType::FullMock => match exam_context {
            ExamContext::Kcet => 80,
            ExamContext::Neet => 200,
            ExamContext::Jee | ExamContext::Cbse => 180,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRecommendation {
    pub test_type: TestType,
    pub exam_context: ExamContext,
    pub question_count: u32,
    pub duration_minutes: u32,
    pub difficulty_profile: DifficultyDistribution,
}

pub fn recommend_test(
    test_type: TestType,
    exam_context: ExamContext,
    mastery_level: Option<f64>,
) -> TestRecommendation {
    let difficulty_profile = match test_type {
        TestType::FullMock => mock_profile(exam_context),
        TestType::TopicQuiz | TestType::SubjectTest => {
            adaptive_profile(mastery_level.unwrap_or(DEFAULT_MASTERY_LEVEL))
        }
    };

    TestRecommendation {
        test_type,
        exam_context,
        question_count: recommended_question_count(test_type, exam_context),
        duration_minutes: recommended_duration_minutes(test_type, exam_context),
        difficulty_profile,
    }
}
