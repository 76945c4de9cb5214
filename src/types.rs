use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    Math,
    Physics,
    Chemistry,
    Biology,
}

impl Subject {
    pub const ALL: [Subject; 4] = [
        Subject::Math,
        Subject::Physics,
        Subject::Chemistry,
        Subject::Biology,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Math => "Math",
            Subject::Physics => "Physics",
            Subject::Chemistry => "Chemistry",
            Subject::Biology => "Biology",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subject {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "math" | "mathematics" | "maths" => Ok(Subject::Math),
            "physics" => Ok(Subject::Physics),
            "chemistry" => Ok(Subject::Chemistry),
            "biology" => Ok(Subject::Biology),
            _ => Err(ParseEnumError::new("subject", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExamContext {
    Kcet,
    Neet,
    Jee,
    Cbse,
}

impl ExamContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExamContext::Kcet => "KCET",
            ExamContext::Neet => "NEET",
            ExamContext::Jee => "JEE",
            ExamContext::Cbse => "CBSE",
        }
    }
}

impl fmt::Display for ExamContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExamContext {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "KCET" => Ok(ExamContext::Kcet),
            "NEET" => Ok(ExamContext::Neet),
            "JEE" => Ok(ExamContext::Jee),
            "CBSE" => Ok(ExamContext::Cbse),
            _ => Err(ParseEnumError::new("exam context", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    TopicQuiz,
    SubjectTest,
    FullMock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    #[default]
    Moderate,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Moderate, Difficulty::Hard];

    /// Easy=1, Moderate=2, Hard=3.
    pub fn weight(&self) -> u32 {
        match self {
            Difficulty::Easy => 1,
            Difficulty::Moderate => 2,
            Difficulty::Hard => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Moderate => "Moderate",
            Difficulty::Hard => "Hard",
        }
    }

    /// Lenient decoding for labels harvested from source papers; anything
    /// unrecognised is treated as `Moderate`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "easy" => Difficulty::Easy,
            "hard" | "difficult" => Difficulty::Hard,
            _ => Difficulty::Moderate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BloomsLevel {
    Remember,
    #[default]
    Understand,
    Apply,
    Analyze,
    Evaluate,
    Create,
}

impl BloomsLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            BloomsLevel::Remember => "Remember",
            BloomsLevel::Understand => "Understand",
            BloomsLevel::Apply => "Apply",
            BloomsLevel::Analyze => "Analyze",
            BloomsLevel::Evaluate => "Evaluate",
            BloomsLevel::Create => "Create",
        }
    }

    pub fn is_lowest_tier(&self) -> bool {
        matches!(self, BloomsLevel::Remember)
    }

    pub fn from_label(label: &str) -> Self {
        let lower = label.trim().to_ascii_lowercase();
        if lower.starts_with("remember") || lower.starts_with("recall") {
            BloomsLevel::Remember
        } else if lower.starts_with("appl") {
            BloomsLevel::Apply
        } else if lower.starts_with("analy") {
            BloomsLevel::Analyze
        } else if lower.starts_with("evaluat") {
            BloomsLevel::Evaluate
        } else if lower.starts_with("creat") {
            BloomsLevel::Create
        } else {
            BloomsLevel::Understand
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryMaterial {
    pub logic: String,
    pub memory_trigger: String,
    pub visual_prompt: String,
    pub common_trap: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_concept: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    /// Scan (question source) the question was ingested from.
    pub source_id: String,
    pub text: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_option_index: Option<u32>,
    #[serde(default = "default_marks")]
    pub marks: u32,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub topic: String,
    #[serde(default)]
    pub blooms: BloomsLevel,
    #[serde(default)]
    pub solution_steps: Vec<String>,
    #[serde(default)]
    pub mastery_material: Option<MasteryMaterial>,
    #[serde(default)]
    pub exam_tip: Option<String>,
    #[serde(default)]
    pub key_formulas: Vec<String>,
    #[serde(default)]
    pub has_visual_element: bool,
    /// Origin document identifier (paper name, year, ...).
    #[serde(default)]
    pub source: Option<String>,
}

fn default_marks() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSource {
    pub id: String,
    pub user_id: String,
    pub subject: Subject,
    #[serde(default)]
    pub exam_context: Option<ExamContext>,
    /// Published scans form the shared question bank.
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficialTopic {
    pub id: String,
    pub name: String,
    pub subject: Subject,
    #[serde(default)]
    pub exam_weightage: HashMap<ExamContext, f64>,
}

impl OfficialTopic {
    pub fn weight_for(&self, exam_context: ExamContext) -> f64 {
        self.exam_weightage.get(&exam_context).copied().unwrap_or(0.0)
    }

    pub fn is_examined_in(&self, exam_context: ExamContext) -> bool {
        self.weight_for(exam_context) > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicQuestionMapping {
    pub question_id: String,
    pub topic_id: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterInsight {
    #[serde(default)]
    pub source_id: String,
    pub topic: String,
    #[serde(default)]
    pub total_marks: u32,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub key_concepts: Vec<String>,
    #[serde(default)]
    pub important_formulas: Vec<String>,
    #[serde(default)]
    pub study_resources: Vec<String>,
    #[serde(default)]
    pub visual_summary: Option<String>,
    #[serde(default)]
    pub preparation_checklist: Vec<String>,
    #[serde(default)]
    pub high_yield_topics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SketchPageContent {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSketch {
    pub id: String,
    pub source_id: String,
    pub topic: String,
    #[serde(default)]
    pub pages: Vec<SketchPageContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSketchPage {
    pub id: String,
    pub title: String,
    pub content: String,
    pub image_url: String,
}

/// A card as cached by the flashcard generator. Older decks used `definition`
/// and `context` where newer ones use `def` and `topic`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFlashcard {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub term: Option<String>,
    #[serde(default)]
    pub def: Option<String>,
    #[serde(default)]
    pub definition: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardDeck {
    pub id: String,
    pub user_id: String,
    pub source_id: String,
    #[serde(default)]
    pub cards: Vec<RawFlashcard>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
    pub id: String,
    pub term: String,
    pub definition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Percentages per difficulty bucket. Used both as a requested profile for
/// test composition and as the observed share of a topic's questions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyDistribution {
    pub easy: u32,
    pub moderate: u32,
    pub hard: u32,
}

impl DifficultyDistribution {
    pub const fn new(easy: u32, moderate: u32, hard: u32) -> Self {
        Self {
            easy,
            moderate,
            hard,
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyStage {
    #[default]
    NotStarted,
    Learning,
    Practicing,
    Mastered,
}

impl StudyStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudyStage::NotStarted => "not_started",
            StudyStage::Learning => "learning",
            StudyStage::Practicing => "practicing",
            StudyStage::Mastered => "mastered",
        }
    }
}

impl FromStr for StudyStage {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(StudyStage::NotStarted),
            "learning" => Ok(StudyStage::Learning),
            "practicing" => Ok(StudyStage::Practicing),
            "mastered" => Ok(StudyStage::Mastered),
            _ => Err(ParseEnumError::new("study stage", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    ViewedNotes,
    PracticedQuestion,
    CompletedQuiz,
    ReviewedFlashcard,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::ViewedNotes => "viewed_notes",
            ActivityType::PracticedQuestion => "practiced_question",
            ActivityType::CompletedQuiz => "completed_quiz",
            ActivityType::ReviewedFlashcard => "reviewed_flashcard",
        }
    }
}

impl FromStr for ActivityType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewed_notes" => Ok(ActivityType::ViewedNotes),
            "practiced_question" => Ok(ActivityType::PracticedQuestion),
            "completed_quiz" => Ok(ActivityType::CompletedQuiz),
            "reviewed_flashcard" => Ok(ActivityType::ReviewedFlashcard),
            _ => Err(ParseEnumError::new("activity type", s)),
        }
    }
}

/// Append-only learning event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicActivity {
    pub id: String,
    pub user_id: String,
    pub topic_resource_id: String,
    pub activity_type: ActivityType,
    pub question_id: Option<String>,
    pub is_correct: Option<bool>,
    /// Seconds.
    pub time_spent: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

/// Persisted progress row of a topic resource. Only activity recording
/// mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicProgress {
    pub id: String,
    pub user_id: String,
    pub topic_id: String,
    pub subject: Subject,
    pub exam_context: ExamContext,
    pub mastery_level: u8,
    pub study_stage: StudyStage,
    pub questions_attempted: u32,
    pub questions_correct: u32,
    pub average_accuracy: f64,
    pub quizzes_taken: u32,
    pub average_quiz_score: f64,
    pub last_practiced: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TopicProgress {
    pub fn not_started(
        user_id: &str,
        topic_id: &str,
        subject: Subject,
        exam_context: ExamContext,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            topic_id: topic_id.to_string(),
            subject,
            exam_context,
            mastery_level: 0,
            study_stage: StudyStage::NotStarted,
            questions_attempted: 0,
            questions_correct: 0,
            average_accuracy: 0.0,
            quizzes_taken: 0,
            average_quiz_score: 0.0,
            last_practiced: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Per-learner, per-topic view combining freshly aggregated content with
/// persisted progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicResource {
    pub id: String,
    pub user_id: String,
    pub topic_id: String,
    pub topic_name: String,
    pub subject: Subject,
    pub exam_context: ExamContext,

    pub questions: Vec<Question>,
    pub flashcards: Vec<Flashcard>,
    pub sketch_pages: Vec<TopicSketchPage>,
    pub chapter_insights: Vec<ChapterInsight>,

    pub total_questions: usize,
    pub source_documents: Vec<String>,
    pub difficulty_distribution: DifficultyDistribution,

    pub mastery_level: u8,
    pub study_stage: StudyStage,
    pub questions_attempted: u32,
    pub questions_correct: u32,
    pub average_accuracy: f64,
    pub quizzes_taken: u32,
    pub average_quiz_score: f64,
    pub last_practiced: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TopicResource {
    pub fn from_progress(topic: &OfficialTopic, progress: &TopicProgress) -> Self {
        Self {
            id: progress.id.clone(),
            user_id: progress.user_id.clone(),
            topic_id: topic.id.clone(),
            topic_name: topic.name.clone(),
            subject: topic.subject,
            exam_context: progress.exam_context,
            questions: Vec::new(),
            flashcards: Vec::new(),
            sketch_pages: Vec::new(),
            chapter_insights: Vec::new(),
            total_questions: 0,
            source_documents: Vec::new(),
            difficulty_distribution: DifficultyDistribution::default(),
            mastery_level: progress.mastery_level,
            study_stage: progress.study_stage,
            questions_attempted: progress.questions_attempted,
            questions_correct: progress.questions_correct,
            average_accuracy: progress.average_accuracy,
            quizzes_taken: progress.quizzes_taken,
            average_quiz_score: progress.average_quiz_score,
            last_practiced: progress.last_practiced,
            created_at: progress.created_at,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
