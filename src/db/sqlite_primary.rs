use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};

use crate::db::config::SqliteConfig;
use crate::db::sqlite_schema::{split_sql_statements, SCHEMA_VERSION, SQLITE_SCHEMA_SQL};
use crate::db::{ContentSnapshot, StoreError, TopicStore};
use crate::services::topic_mastery::apply_activity;
use crate::types::{
    ActivityType, ChapterInsight, ExamContext, FlashcardDeck, OfficialTopic, Question,
    QuestionSource, RawFlashcard, SketchPageContent, StudyStage, Subject, TopicActivity,
    TopicProgress, TopicQuestionMapping, TopicSketch,
};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(url: &str, config: &SqliteConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(config.journal_mode.as_sqlx())
            .busy_timeout(config.busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        run_migrations(&pool).await?;

        tracing::info!(url = %url, "sqlite store ready");
        Ok(Self { pool })
    }

    pub async fn open_path(path: &Path, config: &SqliteConfig) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("create {}: {e}", parent.display())))?;
        }
        let url = format!("sqlite:{}?mode=rwc", path.display());
        Self::connect(&url, config).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Upserts bulk content in a single transaction.
    pub async fn import_snapshot(&self, snapshot: &ContentSnapshot) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for topic in &snapshot.topics {
            sqlx::query(
                r#"INSERT OR REPLACE INTO "official_topics" ("id", "name", "subject", "examWeightage") VALUES (?, ?, ?, ?)"#,
            )
            .bind(&topic.id)
            .bind(&topic.name)
            .bind(topic.subject.as_str())
            .bind(serde_json::to_string(&topic.exam_weightage)?)
            .execute(&mut *tx)
            .await?;
        }

        for source in &snapshot.sources {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO "question_sources" ("id", "userId", "subject", "examContext", "isSystem", "year")
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&source.id)
            .bind(&source.user_id)
            .bind(source.subject.as_str())
            .bind(source.exam_context.map(|exam| exam.as_str()))
            .bind(source.is_system)
            .bind(source.year)
            .execute(&mut *tx)
            .await?;
        }

        for question in &snapshot.questions {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO "questions" ("id", "sourceId", "topic", "difficulty", "data")
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&question.id)
            .bind(&question.source_id)
            .bind(&question.topic)
            .bind(question.difficulty.as_str())
            .bind(serde_json::to_string(question)?)
            .execute(&mut *tx)
            .await?;
        }

        for mapping in &snapshot.mappings {
            sqlx::query(
                r#"INSERT OR REPLACE INTO "topic_question_mapping" ("questionId", "topicId", "confidence") VALUES (?, ?, ?)"#,
            )
            .bind(&mapping.question_id)
            .bind(&mapping.topic_id)
            .bind(mapping.confidence)
            .execute(&mut *tx)
            .await?;
        }

        for insight in &snapshot.insights {
            sqlx::query(
                r#"INSERT INTO "chapter_insights" ("sourceId", "topic", "data") VALUES (?, ?, ?)"#,
            )
            .bind(&insight.source_id)
            .bind(&insight.topic)
            .bind(serde_json::to_string(insight)?)
            .execute(&mut *tx)
            .await?;
        }

        for sketch in &snapshot.sketches {
            sqlx::query(
                r#"INSERT OR REPLACE INTO "topic_sketches" ("id", "sourceId", "topic", "pages") VALUES (?, ?, ?, ?)"#,
            )
            .bind(&sketch.id)
            .bind(&sketch.source_id)
            .bind(&sketch.topic)
            .bind(serde_json::to_string(&sketch.pages)?)
            .execute(&mut *tx)
            .await?;
        }

        for deck in &snapshot.decks {
            sqlx::query(
                r#"INSERT OR REPLACE INTO "flashcard_decks" ("id", "userId", "sourceId", "cards") VALUES (?, ?, ?, ?)"#,
            )
            .bind(&deck.id)
            .bind(&deck.user_id)
            .bind(&deck.source_id)
            .bind(serde_json::to_string(&deck.cards)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            topics = snapshot.topics.len(),
            questions = snapshot.questions.len(),
            mappings = snapshot.mappings.len(),
            "content snapshot imported"
        );
        Ok(())
    }
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
    let version: Option<String> =
        sqlx::query_scalar(r#"SELECT "value" FROM "_db_metadata" WHERE "key" = 'schema_version'"#)
            .fetch_optional(pool)
            .await
            .unwrap_or(None);

    if version.as_deref() == Some(SCHEMA_VERSION) {
        return Ok(());
    }

    for statement in split_sql_statements(SQLITE_SCHEMA_SQL) {
        sqlx::query(&statement).execute(pool).await?;
    }

    sqlx::query(
        r#"INSERT OR REPLACE INTO "_db_metadata" ("key", "value") VALUES ('schema_version', ?)"#,
    )
    .bind(SCHEMA_VERSION)
    .execute(pool)
    .await?;

    tracing::debug!(version = SCHEMA_VERSION, "sqlite schema applied");
    Ok(())
}

fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[String]) {
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id.clone());
    }
    separated.push_unseparated(")");
}

fn get_count(row: &SqliteRow, column: &str) -> Result<u32, StoreError> {
    let raw: i64 = row.try_get(column)?;
    Ok(u32::try_from(raw.max(0)).unwrap_or(u32::MAX))
}

fn map_official_topic(row: &SqliteRow) -> Result<OfficialTopic, StoreError> {
    let subject: String = row.try_get("subject")?;
    let weightage: String = row.try_get("examWeightage")?;
    let exam_weightage: HashMap<ExamContext, f64> = serde_json::from_str(&weightage)?;
    Ok(OfficialTopic {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        subject: subject.parse()?,
        exam_weightage,
    })
}

fn map_question_source(row: &SqliteRow) -> Result<QuestionSource, StoreError> {
    let subject: String = row.try_get("subject")?;
    let exam_context: Option<String> = row.try_get("examContext")?;
    Ok(QuestionSource {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        subject: subject.parse()?,
        exam_context: exam_context.map(|raw| raw.parse()).transpose()?,
        is_system: row.try_get("isSystem")?,
        year: row.try_get("year")?,
    })
}

fn map_mapping(row: &SqliteRow) -> Result<TopicQuestionMapping, StoreError> {
    Ok(TopicQuestionMapping {
        question_id: row.try_get("questionId")?,
        topic_id: row.try_get("topicId")?,
        confidence: row.try_get("confidence")?,
    })
}

fn map_progress(row: &SqliteRow) -> Result<TopicProgress, StoreError> {
    let subject: String = row.try_get("subject")?;
    let exam_context: String = row.try_get("examContext")?;
    let study_stage: String = row.try_get("studyStage")?;
    let mastery: i64 = row.try_get("masteryLevel")?;
    Ok(TopicProgress {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        topic_id: row.try_get("topicId")?,
        subject: subject.parse()?,
        exam_context: exam_context.parse()?,
        mastery_level: mastery.clamp(0, 100) as u8,
        study_stage: study_stage.parse::<StudyStage>()?,
        questions_attempted: get_count(row, "questionsAttempted")?,
        questions_correct: get_count(row, "questionsCorrect")?,
        average_accuracy: row.try_get("averageAccuracy")?,
        quizzes_taken: get_count(row, "quizzesTaken")?,
        average_quiz_score: row.try_get("averageQuizScore")?,
        last_practiced: row.try_get::<Option<DateTime<Utc>>, _>("lastPracticed")?,
        created_at: row.try_get("createdAt")?,
        updated_at: row.try_get("updatedAt")?,
    })
}

fn map_activity(row: &SqliteRow) -> Result<TopicActivity, StoreError> {
    let activity_type: String = row.try_get("activityType")?;
    Ok(TopicActivity {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        topic_resource_id: row.try_get("topicResourceId")?,
        activity_type: activity_type.parse::<ActivityType>()?,
        question_id: row.try_get("questionId")?,
        is_correct: row.try_get("isCorrect")?,
        time_spent: row.try_get("timeSpent")?,
        timestamp: row.try_get("timestamp")?,
    })
}

async fn fetch_progress(
    conn: &mut SqliteConnection,
    resource_id: &str,
) -> Result<Option<TopicProgress>, StoreError> {
    let row = sqlx::query(r#"SELECT * FROM "topic_resources" WHERE "id" = ? LIMIT 1"#)
        .bind(resource_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(map_progress).transpose()
}

/// Runs inside `BEGIN IMMEDIATE`; the caller commits or rolls back.
async fn record_activity_locked(
    conn: &mut SqliteConnection,
    activity: &TopicActivity,
) -> Result<TopicProgress, StoreError> {
    let progress = fetch_progress(conn, &activity.topic_resource_id)
        .await?
        .ok_or_else(|| StoreError::NotFound(activity.topic_resource_id.clone()))?;

    sqlx::query(
        r#"
        INSERT INTO "topic_activities"
            ("id", "userId", "topicResourceId", "activityType", "questionId", "isCorrect", "timeSpent", "timestamp")
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&activity.id)
    .bind(&activity.user_id)
    .bind(&activity.topic_resource_id)
    .bind(activity.activity_type.as_str())
    .bind(&activity.question_id)
    .bind(activity.is_correct)
    .bind(activity.time_spent)
    .bind(activity.timestamp)
    .execute(&mut *conn)
    .await?;

    let rows = sqlx::query(
        r#"SELECT * FROM "topic_activities" WHERE "topicResourceId" = ? ORDER BY "timestamp" ASC"#,
    )
    .bind(&activity.topic_resource_id)
    .fetch_all(&mut *conn)
    .await?;
    let history = rows
        .iter()
        .map(map_activity)
        .collect::<Result<Vec<_>, _>>()?;

    let updated = apply_activity(&progress, activity, &history);

    sqlx::query(
        r#"
        UPDATE "topic_resources"
        SET "masteryLevel" = ?, "studyStage" = ?, "questionsAttempted" = ?, "questionsCorrect" = ?,
            "averageAccuracy" = ?, "quizzesTaken" = ?, "averageQuizScore" = ?, "lastPracticed" = ?,
            "updatedAt" = ?
        WHERE "id" = ?
        "#,
    )
    .bind(i64::from(updated.mastery_level))
    .bind(updated.study_stage.as_str())
    .bind(i64::from(updated.questions_attempted))
    .bind(i64::from(updated.questions_correct))
    .bind(updated.average_accuracy)
    .bind(i64::from(updated.quizzes_taken))
    .bind(updated.average_quiz_score)
    .bind(updated.last_practiced)
    .bind(updated.updated_at)
    .bind(&updated.id)
    .execute(&mut *conn)
    .await?;

    Ok(updated)
}

#[async_trait]
impl TopicStore for SqliteStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn official_topics(&self, subject: Subject) -> Result<Vec<OfficialTopic>, StoreError> {
        let rows = sqlx::query(
            r#"SELECT * FROM "official_topics" WHERE "subject" = ? ORDER BY "name" ASC"#,
        )
        .bind(subject.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_official_topic).collect()
    }

    async fn question_sources(
        &self,
        user_id: &str,
        subject: Subject,
        include_system: bool,
    ) -> Result<Vec<QuestionSource>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM "question_sources"
            WHERE "subject" = ? AND ("userId" = ? OR (? AND "isSystem" = 1))
            "#,
        )
        .bind(subject.as_str())
        .bind(user_id)
        .bind(include_system)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_question_source).collect()
    }

    async fn questions_for_sources(
        &self,
        source_ids: &[String],
    ) -> Result<Vec<Question>, StoreError> {
        if source_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(r#"SELECT "data" FROM "questions" WHERE "sourceId" IN ("#);
        push_id_list(&mut qb, source_ids);
        let rows = qb.build().fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| -> Result<Question, StoreError> {
                let data: String = row.try_get("data")?;
                Ok(serde_json::from_str(&data)?)
            })
            .collect()
    }

    async fn mappings_for_questions(
        &self,
        question_ids: &[String],
    ) -> Result<Vec<TopicQuestionMapping>, StoreError> {
        if question_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"SELECT * FROM "topic_question_mapping" WHERE "questionId" IN ("#,
        );
        push_id_list(&mut qb, question_ids);
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(map_mapping).collect()
    }

    async fn mappings_for_topics(
        &self,
        topic_ids: &[String],
    ) -> Result<Vec<TopicQuestionMapping>, StoreError> {
        if topic_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"SELECT * FROM "topic_question_mapping" WHERE "topicId" IN ("#,
        );
        push_id_list(&mut qb, topic_ids);
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(map_mapping).collect()
    }

    async fn chapter_insights(
        &self,
        source_ids: &[String],
    ) -> Result<Vec<ChapterInsight>, StoreError> {
        if source_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"SELECT "data" FROM "chapter_insights" WHERE "sourceId" IN ("#,
        );
        push_id_list(&mut qb, source_ids);
        qb.push(r#" ORDER BY "id" ASC"#);
        let rows = qb.build().fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| -> Result<ChapterInsight, StoreError> {
                let data: String = row.try_get("data")?;
                Ok(serde_json::from_str(&data)?)
            })
            .collect()
    }

    async fn sketches(&self, source_ids: &[String]) -> Result<Vec<TopicSketch>, StoreError> {
        if source_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"SELECT * FROM "topic_sketches" WHERE "sourceId" IN ("#,
        );
        push_id_list(&mut qb, source_ids);
        let rows = qb.build().fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| -> Result<TopicSketch, StoreError> {
                let pages: String = row.try_get("pages")?;
                Ok(TopicSketch {
                    id: row.try_get("id")?,
                    source_id: row.try_get("sourceId")?,
                    topic: row.try_get("topic")?,
                    pages: serde_json::from_str::<Vec<SketchPageContent>>(&pages)?,
                })
            })
            .collect()
    }

    async fn flashcard_decks(
        &self,
        user_id: &str,
        source_ids: &[String],
    ) -> Result<Vec<FlashcardDeck>, StoreError> {
        if source_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(r#"SELECT * FROM "flashcard_decks" WHERE "userId" = "#);
        qb.push_bind(user_id.to_string());
        qb.push(r#" AND "sourceId" IN ("#);
        push_id_list(&mut qb, source_ids);
        let rows = qb.build().fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| -> Result<FlashcardDeck, StoreError> {
                let cards: String = row.try_get("cards")?;
                Ok(FlashcardDeck {
                    id: row.try_get("id")?,
                    user_id: row.try_get("userId")?,
                    source_id: row.try_get("sourceId")?,
                    cards: serde_json::from_str::<Vec<RawFlashcard>>(&cards)?,
                })
            })
            .collect()
    }

    async fn topic_progress(
        &self,
        user_id: &str,
        subject: Subject,
        exam_context: ExamContext,
    ) -> Result<Vec<TopicProgress>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM "topic_resources"
            WHERE "userId" = ? AND "subject" = ? AND "examContext" = ?
            "#,
        )
        .bind(user_id)
        .bind(subject.as_str())
        .bind(exam_context.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_progress).collect()
    }

    async fn progress_by_id(&self, resource_id: &str) -> Result<Option<TopicProgress>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_progress(&mut conn, resource_id).await
    }

    async fn insert_progress(&self, rows: &[TopicProgress]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO "topic_resources"
                    ("id", "userId", "topicId", "subject", "examContext", "masteryLevel", "studyStage",
                     "questionsAttempted", "questionsCorrect", "averageAccuracy", "quizzesTaken",
                     "averageQuizScore", "lastPracticed", "createdAt", "updatedAt")
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.id)
            .bind(&row.user_id)
            .bind(&row.topic_id)
            .bind(row.subject.as_str())
            .bind(row.exam_context.as_str())
            .bind(i64::from(row.mastery_level))
            .bind(row.study_stage.as_str())
            .bind(i64::from(row.questions_attempted))
            .bind(i64::from(row.questions_correct))
            .bind(row.average_accuracy)
            .bind(i64::from(row.quizzes_taken))
            .bind(row.average_quiz_score)
            .bind(row.last_practiced)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn record_activity(&self, activity: &TopicActivity) -> Result<TopicProgress, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Write lock before the first read.
        sqlx::query(r#"UPDATE "topic_resources" SET "id" = "id" WHERE "id" = ?"#)
            .bind(&activity.topic_resource_id)
            .execute(&mut *tx)
            .await?;

        let updated = record_activity_locked(&mut *tx, activity).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn attempted_question_ids(
        &self,
        user_id: &str,
        subject: Subject,
    ) -> Result<Vec<String>, StoreError> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT a."questionId"
            FROM "topic_activities" a
            JOIN "topic_resources" r ON r."id" = a."topicResourceId"
            WHERE a."userId" = ? AND r."subject" = ?
              AND a."activityType" = 'practiced_question'
              AND a."questionId" IS NOT NULL
            "#,
        )
        .bind(user_id)
        .bind(subject.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
