//! EC quizzes: retrieval without answers, scoring, attempt accounting and
//! authoring.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use crate::db;
use crate::enrollment;
use crate::errors::{AppError, Result};
use crate::models::{Ec, EnrollmentStatus, Student};

const DEFAULT_PASSING_SCORE: i64 = 70;
const DEFAULT_TIME_LIMIT: i64 = 30;
const DEFAULT_MAX_ATTEMPTS: i64 = 3;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct QuizSettings {
    pub id: String,
    pub title: String,
    #[sqlx(rename = "passing_percentage")]
    pub passing_score: i64,
    pub time_limit: i64,
    pub max_attempts: i64,
    pub show_answers: bool,
}

impl QuizSettings {
    fn fallback(ec: &Ec) -> Self {
        Self {
            id: format!("quiz-{}", ec.id),
            title: format!("Quiz - {}", ec.title),
            passing_score: DEFAULT_PASSING_SCORE,
            time_limit: DEFAULT_TIME_LIMIT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            show_answers: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    Single,
    Multiple,
}

impl QuestionKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "single" | "choices" => Some(Self::Single),
            "multiple" | "multiple choice" => Some(Self::Multiple),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Multiple => "multiple",
        }
    }
}

/// A question together with its answer key.
#[derive(Debug, Clone)]
pub struct Question {
    pub id: String,
    pub question: String,
    pub kind: QuestionKind,
    pub options: Vec<String>,
    pub correct: BTreeSet<i64>,
}

/// What a student sees: no answer key.
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: String,
    pub question: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub options: Vec<String>,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            question: q.question.clone(),
            kind: q.kind.clone(),
            options: q.options.clone(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct QuestionRow {
    id: String,
    question: String,
    kind: String,
    options: String,
    correct_options: String,
}

/// Placeholder questions served while an EC has no quiz of its own.
fn sample_questions() -> Vec<Question> {
    vec![
        Question {
            id: "q1".to_string(),
            question: "Quelle est la définition correcte du concept principal étudié dans ce module ?"
                .to_string(),
            kind: QuestionKind::Single,
            options: vec![
                "Option A - Définition correcte".to_string(),
                "Option B - Définition incorrecte".to_string(),
                "Option C - Définition partielle".to_string(),
                "Option D - Aucune de ces réponses".to_string(),
            ],
            correct: BTreeSet::from([0]),
        },
        Question {
            id: "q2".to_string(),
            question: "Quels sont les éléments essentiels à retenir ? (plusieurs réponses possibles)"
                .to_string(),
            kind: QuestionKind::Multiple,
            options: vec![
                "Élément 1 (correct)".to_string(),
                "Élément 2 (incorrect)".to_string(),
                "Élément 3 (correct)".to_string(),
                "Élément 4 (incorrect)".to_string(),
            ],
            correct: BTreeSet::from([0, 2]),
        },
    ]
}

async fn stored_settings(pool: &SqlitePool, ec_id: &str) -> Result<Option<QuizSettings>> {
    let row = sqlx::query_as::<_, QuizSettings>(
        r#"
        SELECT id, title, passing_percentage, time_limit, max_attempts, show_answers
        FROM   quizzes WHERE ec = ?1
        "#,
    )
    .bind(ec_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

async fn stored_questions(pool: &SqlitePool, quiz_id: &str) -> Result<Vec<Question>> {
    let rows = sqlx::query_as::<_, QuestionRow>(
        r#"
        SELECT id, question, kind, options, correct_options
        FROM   quiz_questions WHERE quiz = ?1
        ORDER  BY idx ASC
        "#,
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| Question {
            id: r.id,
            question: r.question,
            kind: QuestionKind::parse(&r.kind).unwrap_or(QuestionKind::Single),
            options: serde_json::from_str(&r.options).unwrap_or_default(),
            correct: serde_json::from_str(&r.correct_options).unwrap_or_default(),
        })
        .collect())
}

/// Settings and questions of the EC's quiz, falling back to defaults.
pub async fn load_quiz(pool: &SqlitePool, ec: &Ec) -> Result<(QuizSettings, Vec<Question>)> {
    let stored = stored_settings(pool, &ec.id).await?;

    let Some(settings) = stored else {
        return Ok((QuizSettings::fallback(ec), sample_questions()));
    };

    let questions = stored_questions(pool, &settings.id).await?;
    if questions.is_empty() {
        return Ok((settings, sample_questions()));
    }
    Ok((settings, questions))
}

// ─────────────────────────────────────────────────────────
// Scoring
// ─────────────────────────────────────────────────────────

/// One option index or several.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    One(i64),
    Many(Vec<i64>),
}

impl AnswerValue {
    fn to_set(&self) -> BTreeSet<i64> {
        match self {
            Self::One(i) => BTreeSet::from([*i]),
            Self::Many(v) => v.iter().copied().collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedAnswer {
    pub question_id: String,
    pub answer: AnswerValue,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QuestionResult {
    pub question_id: String,
    pub correct: bool,
    pub correct_answer: Vec<i64>,
    pub user_answer: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Score {
    pub score: i64,
    pub total: i64,
    pub percent: i64,
    pub details: Vec<QuestionResult>,
}

/// Grade answers against the key. A question counts when the chosen
/// option set equals the correct set; order and duplicates do not matter.
/// Unanswered questions count as wrong, unknown question ids are ignored.
pub fn score_answers(questions: &[Question], answers: &[SubmittedAnswer]) -> Score {
    let details: Vec<QuestionResult> = questions
        .iter()
        .map(|q| {
            let user = answers
                .iter()
                .find(|a| a.question_id == q.id)
                .map(|a| a.answer.to_set())
                .unwrap_or_default();
            QuestionResult {
                question_id: q.id.clone(),
                correct: !user.is_empty() && user == q.correct,
                correct_answer: q.correct.iter().copied().collect(),
                user_answer: user.into_iter().collect(),
            }
        })
        .collect();

    let score = details.iter().filter(|d| d.correct).count() as i64;
    let total = (questions.len() as i64).max(1);
    let percent = (score as f64 / total as f64 * 100.0).round() as i64;
    Score {
        score,
        total,
        percent,
        details,
    }
}

// ─────────────────────────────────────────────────────────
// Student operations
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct QuizView {
    pub ec: String,
    pub quiz: Option<QuizSettings>,
    pub questions: Vec<PublicQuestion>,
    pub attempts_used: i64,
}

pub async fn get_quiz(pool: &SqlitePool, student: Option<&Student>, ec_id: &str) -> Result<QuizView> {
    let ec = db::fetch_ec(pool, ec_id).await?;
    let enrollment = match student {
        Some(s) => enrollment::find_enrollment(pool, &s.id, &ec.id).await?,
        None => None,
    };
    let Some(enrollment) = enrollment else {
        return Ok(QuizView {
            ec: ec.id,
            quiz: None,
            questions: Vec::new(),
            attempts_used: 0,
        });
    };

    let (settings, questions) = load_quiz(pool, &ec).await?;
    Ok(QuizView {
        ec: ec.id,
        quiz: Some(settings),
        questions: questions.iter().map(PublicQuestion::from).collect(),
        attempts_used: enrollment.quiz_attempts,
    })
}

#[derive(Debug, Serialize)]
pub struct QuizResult {
    pub score: i64,
    pub total: i64,
    pub percent: i64,
    pub passed: bool,
    pub can_retry: bool,
    pub attempts_remaining: i64,
    pub correct_answers: Option<Vec<QuestionResult>>,
}

pub async fn submit_quiz(
    pool: &SqlitePool,
    student: &Student,
    ec_id: &str,
    answers: &[SubmittedAnswer],
    time_spent: Option<i64>,
) -> Result<QuizResult> {
    let ec = db::fetch_ec(pool, ec_id).await?;
    let enrollment = enrollment::find_enrollment(pool, &student.id, &ec.id)
        .await?
        .ok_or_else(|| AppError::validation("Vous devez d'abord payer cet EC"))?;
    if enrollment.status == EnrollmentStatus::Validated {
        return Err(AppError::validation("Cet EC est déjà validé"));
    }

    let (settings, questions) = load_quiz(pool, &ec).await?;
    if enrollment.quiz_attempts >= settings.max_attempts {
        return Err(AppError::validation(
            "Vous avez atteint le nombre maximum de tentatives",
        ));
    }

    let graded = score_answers(&questions, answers);
    let passed = graded.percent >= settings.passing_score;
    let attempts = enrollment.quiz_attempts + 1;
    let attempts_remaining = (settings.max_attempts - attempts).max(0);
    let now = db::now();

    let mut tx = pool.begin().await?;
    // The attempt counter doubles as an optimistic lock against double submits.
    let updated = if passed {
        sqlx::query(
            r#"
            UPDATE enrollments
            SET    status = 'Validated', validation_date = ?3, quiz_score = ?4,
                   quiz_attempts = ?5, needs_review = 0, modified_at = ?3
            WHERE  id = ?1 AND quiz_attempts = ?2 AND status != 'Validated'
            "#,
        )
        .bind(&enrollment.id)
        .bind(enrollment.quiz_attempts)
        .bind(now)
        .bind(graded.percent as f64)
        .bind(attempts)
        .execute(&mut *tx)
        .await?
    } else {
        sqlx::query(
            r#"
            UPDATE enrollments
            SET    status = 'In Progress', quiz_score = MAX(quiz_score, ?4),
                   quiz_attempts = ?5, needs_review = ?6, modified_at = ?3
            WHERE  id = ?1 AND quiz_attempts = ?2 AND status != 'Validated'
            "#,
        )
        .bind(&enrollment.id)
        .bind(enrollment.quiz_attempts)
        .bind(now)
        .bind(graded.percent as f64)
        .bind(attempts)
        .bind(attempts_remaining == 0)
        .execute(&mut *tx)
        .await?
    };
    if updated.rows_affected() != 1 {
        tx.rollback().await?;
        return Err(AppError::Conflict(
            "Une autre tentative vient d'être enregistrée".to_string(),
        ));
    }

    sqlx::query(
        r#"
        INSERT INTO quiz_attempts
            (student, ec, quiz, score, total, percent, passed, time_spent, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&student.id)
    .bind(&ec.id)
    .bind(&settings.id)
    .bind(graded.score)
    .bind(graded.total)
    .bind(graded.percent)
    .bind(passed)
    .bind(time_spent)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    info!(
        "Quiz attempt {attempts} on {} by {}: {}% ({})",
        ec.id,
        student.id,
        graded.percent,
        if passed { "passed" } else { "failed" }
    );

    Ok(QuizResult {
        score: graded.score,
        total: graded.total,
        percent: graded.percent,
        passed,
        can_retry: !passed && attempts_remaining > 0,
        attempts_remaining,
        correct_answers: passed.then_some(graded.details),
    })
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AttemptRow {
    pub score: i64,
    pub total: i64,
    pub percent: i64,
    pub passed: bool,
    pub time_spent: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Serialize)]
pub struct QuizHistory {
    pub attempts: i64,
    pub best_score: f64,
    pub status: Option<EnrollmentStatus>,
    pub validated_at: Option<i64>,
    pub history: Vec<AttemptRow>,
}

pub async fn attempt_log(pool: &SqlitePool, student: &str, ec: &str) -> Result<Vec<AttemptRow>> {
    let rows = sqlx::query_as::<_, AttemptRow>(
        r#"
        SELECT score, total, percent, passed, time_spent, created_at
        FROM   quiz_attempts
        WHERE  student = ?1 AND ec = ?2
        ORDER  BY created_at DESC, id DESC
        "#,
    )
    .bind(student)
    .bind(ec)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn quiz_history(
    pool: &SqlitePool,
    student: Option<&Student>,
    ec_id: &str,
) -> Result<QuizHistory> {
    let enrollment = match student {
        Some(s) => enrollment::find_enrollment(pool, &s.id, ec_id).await?,
        None => None,
    };
    let Some(enrollment) = enrollment else {
        return Ok(QuizHistory {
            attempts: 0,
            best_score: 0.0,
            status: None,
            validated_at: None,
            history: Vec::new(),
        });
    };
    let history = attempt_log(pool, &enrollment.student, &enrollment.ec).await?;
    Ok(QuizHistory {
        attempts: enrollment.quiz_attempts,
        best_score: enrollment.quiz_score,
        status: Some(enrollment.status),
        validated_at: enrollment.validation_date,
        history,
    })
}

// ─────────────────────────────────────────────────────────
// Authoring
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionDraft {
    pub option: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionDraft {
    pub question: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub options: Vec<OptionDraft>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuizDraft {
    pub title: Option<String>,
    pub passing_percentage: Option<i64>,
    pub max_attempts: Option<i64>,
    pub time_limit: Option<i64>,
    #[serde(default)]
    pub questions: Vec<QuestionDraft>,
}

#[derive(Debug, Serialize)]
pub struct EditableQuestion {
    pub id: String,
    pub question: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub options: Vec<OptionDraft>,
}

#[derive(Debug, Serialize)]
pub struct EditableQuiz {
    #[serde(flatten)]
    pub settings: QuizSettings,
    pub questions: Vec<EditableQuestion>,
}

/// The stored quiz of an EC with its answer key, for the editor.
pub async fn quiz_for_edit(pool: &SqlitePool, ec: &Ec) -> Result<Option<EditableQuiz>> {
    let stored = stored_settings(pool, &ec.id).await?;
    let Some(settings) = stored else {
        return Ok(None);
    };
    let questions = stored_questions(pool, &settings.id).await?;
    let questions = questions
        .into_iter()
        .map(|q| EditableQuestion {
            options: q
                .options
                .iter()
                .enumerate()
                .map(|(i, option)| OptionDraft {
                    option: option.clone(),
                    is_correct: q.correct.contains(&(i as i64)),
                })
                .collect(),
            id: q.id,
            question: q.question,
            kind: q.kind,
        })
        .collect();
    Ok(Some(EditableQuiz {
        settings,
        questions,
    }))
}

fn check_question(idx: usize, draft: &QuestionDraft) -> Result<(QuestionKind, Vec<i64>)> {
    let n = idx + 1;
    if draft.question.trim().is_empty() {
        return Err(AppError::validation(format!("Question {n}: énoncé manquant")));
    }
    if draft.options.len() < 2 {
        return Err(AppError::validation(format!(
            "Question {n}: au moins deux options sont requises"
        )));
    }
    let correct: Vec<i64> = draft
        .options
        .iter()
        .enumerate()
        .filter(|(_, o)| o.is_correct)
        .map(|(i, _)| i as i64)
        .collect();
    if correct.is_empty() {
        return Err(AppError::validation(format!(
            "Question {n}: aucune bonne réponse indiquée"
        )));
    }
    let kind = match draft.kind.as_deref().map(QuestionKind::parse) {
        Some(Some(kind)) => kind,
        Some(None) => {
            return Err(AppError::validation(format!(
                "Question {n}: type de question invalide"
            )))
        }
        None if correct.len() > 1 => QuestionKind::Multiple,
        None => QuestionKind::Single,
    };
    if kind == QuestionKind::Single && correct.len() > 1 {
        return Err(AppError::validation(format!(
            "Question {n}: une question à choix unique n'a qu'une bonne réponse"
        )));
    }
    Ok((kind, correct))
}

/// Create or replace the quiz of an EC. Returns the quiz id.
pub async fn save_quiz(pool: &SqlitePool, ec: &Ec, draft: &QuizDraft) -> Result<String> {
    let passing = draft.passing_percentage.unwrap_or(DEFAULT_PASSING_SCORE);
    if !(0..=100).contains(&passing) {
        return Err(AppError::validation(
            "Le score de réussite doit être entre 0 et 100",
        ));
    }
    let max_attempts = draft.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
    if max_attempts < 1 {
        return Err(AppError::validation(
            "Le nombre de tentatives doit être au moins 1",
        ));
    }
    let time_limit = draft.time_limit.unwrap_or(0).max(0);
    let checked = draft
        .questions
        .iter()
        .enumerate()
        .map(|(i, q)| check_question(i, q))
        .collect::<Result<Vec<_>>>()?;

    let title = draft
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Quiz - {}", ec.title));

    let mut tx = pool.begin().await?;
    let quiz_id: String = sqlx::query_scalar(
        r#"
        INSERT INTO quizzes (id, ec, title, passing_percentage, max_attempts, time_limit)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT (ec) DO UPDATE SET
            title              = excluded.title,
            passing_percentage = excluded.passing_percentage,
            max_attempts       = excluded.max_attempts,
            time_limit         = excluded.time_limit
        RETURNING id
        "#,
    )
    .bind(db::new_id("QUIZ"))
    .bind(&ec.id)
    .bind(&title)
    .bind(passing)
    .bind(max_attempts)
    .bind(time_limit)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM quiz_questions WHERE quiz = ?1")
        .bind(&quiz_id)
        .execute(&mut *tx)
        .await?;

    for (idx, (draft, (kind, correct))) in draft.questions.iter().zip(checked).enumerate() {
        let options: Vec<&str> = draft.options.iter().map(|o| o.option.as_str()).collect();
        sqlx::query(
            r#"
            INSERT INTO quiz_questions (id, quiz, question, kind, options, correct_options, idx)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(db::new_id("QQ"))
        .bind(&quiz_id)
        .bind(draft.question.trim())
        .bind(kind.as_str())
        .bind(serde_json::to_string(&options)?)
        .bind(serde_json::to_string(&correct)?)
        .bind(idx as i64)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    info!(
        "Quiz {quiz_id} saved for EC {} with {} question(s)",
        ec.id,
        draft.questions.len()
    );
    Ok(quiz_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{pool, seed_catalog, seed_enrollment, seed_student};

    fn answer(id: &str, value: AnswerValue) -> SubmittedAnswer {
        SubmittedAnswer {
            question_id: id.to_string(),
            answer: value,
        }
    }

    #[test]
    fn scoring_compares_sets_not_order() {
        let questions = sample_questions();
        let graded = score_answers(
            &questions,
            &[
                answer("q1", AnswerValue::One(0)),
                answer("q2", AnswerValue::Many(vec![2, 0, 2])),
            ],
        );
        assert_eq!(graded.score, 2);
        assert_eq!(graded.percent, 100);
    }

    #[test]
    fn partial_multiple_choice_is_wrong() {
        let questions = sample_questions();
        let graded = score_answers(
            &questions,
            &[
                answer("q1", AnswerValue::One(0)),
                answer("q2", AnswerValue::Many(vec![0])),
            ],
        );
        assert_eq!(graded.score, 1);
        assert_eq!(graded.total, 2);
        assert_eq!(graded.percent, 50);
        assert!(!graded.details[1].correct);
    }

    #[test]
    fn unanswered_questions_count_against_the_total() {
        let questions = sample_questions();
        let graded = score_answers(
            &questions,
            &[
                answer("q1", AnswerValue::One(0)),
                answer("q99", AnswerValue::One(1)),
            ],
        );
        assert_eq!(graded.score, 1);
        assert_eq!(graded.total, 2);
        let empty = score_answers(&questions, &[]);
        assert_eq!(empty.percent, 0);
    }

    #[test]
    fn answers_deserialize_from_scalar_or_list() {
        let parsed: Vec<SubmittedAnswer> = serde_json::from_str(
            r#"[{"question_id":"q1","answer":0},{"question_id":"q2","answer":[0,2]}]"#,
        )
        .unwrap();
        assert!(matches!(parsed[0].answer, AnswerValue::One(0)));
        assert!(matches!(parsed[1].answer, AnswerValue::Many(_)));
    }

    #[test]
    fn question_checks() {
        let draft = QuestionDraft {
            question: "Capitale ?".into(),
            kind: Some("single".into()),
            options: vec![
                OptionDraft { option: "Antananarivo".into(), is_correct: true },
                OptionDraft { option: "Toamasina".into(), is_correct: true },
            ],
        };
        assert!(check_question(0, &draft).is_err());

        let inferred = QuestionDraft { kind: None, ..draft.clone() };
        assert_eq!(
            check_question(0, &inferred).unwrap(),
            (QuestionKind::Multiple, vec![0, 1])
        );

        let no_answer = QuestionDraft {
            options: vec![
                OptionDraft { option: "a".into(), is_correct: false },
                OptionDraft { option: "b".into(), is_correct: false },
            ],
            ..draft
        };
        assert!(check_question(0, &no_answer).is_err());
    }

    #[tokio::test]
    async fn failing_three_times_flags_for_review() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        let student = seed_student(&pool, "STU-0001", "etudiant@cntemad.mg", "CTR-TANA").await;
        seed_enrollment(&pool, "STU-0001", "DROIT101", "Paid").await;
        let wrong = [answer("q1", AnswerValue::One(3))];

        for remaining in [2, 1, 0] {
            let result = submit_quiz(&pool, &student, "DROIT101", &wrong, Some(60))
                .await
                .unwrap();
            assert!(!result.passed);
            assert_eq!(result.attempts_remaining, remaining);
            assert_eq!(result.can_retry, remaining > 0);
            assert!(result.correct_answers.is_none());
        }

        let err = submit_quiz(&pool, &student, "DROIT101", &wrong, None)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Vous avez atteint le nombre maximum de tentatives"
        );

        let enrollment = enrollment::find_enrollment(&pool, "STU-0001", "DROIT101")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::InProgress);
        assert!(enrollment.needs_review);
        assert_eq!(attempt_log(&pool, "STU-0001", "DROIT101").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn passing_validates_and_keeps_best_score() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        let student = seed_student(&pool, "STU-0001", "etudiant@cntemad.mg", "CTR-TANA").await;
        seed_enrollment(&pool, "STU-0001", "DROIT101", "Paid").await;

        let half = [
            answer("q1", AnswerValue::One(0)),
            answer("q2", AnswerValue::Many(vec![1])),
        ];
        let first = submit_quiz(&pool, &student, "DROIT101", &half, None).await.unwrap();
        assert_eq!(first.percent, 50);

        let full = [
            answer("q1", AnswerValue::One(0)),
            answer("q2", AnswerValue::Many(vec![0, 2])),
        ];
        let second = submit_quiz(&pool, &student, "DROIT101", &full, None).await.unwrap();
        assert!(second.passed);
        assert_eq!(second.correct_answers.as_ref().unwrap().len(), 2);

        let history = quiz_history(&pool, Some(&student), "DROIT101").await.unwrap();
        assert_eq!(history.attempts, 2);
        assert_eq!(history.best_score, 100.0);
        assert_eq!(history.status, Some(EnrollmentStatus::Validated));
        assert!(history.validated_at.is_some());

        let err = submit_quiz(&pool, &student, "DROIT101", &full, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Cet EC est déjà validé");
    }

    #[tokio::test]
    async fn quiz_is_hidden_until_paid() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        let student = seed_student(&pool, "STU-0001", "etudiant@cntemad.mg", "CTR-TANA").await;
        let view = get_quiz(&pool, Some(&student), "DROIT101").await.unwrap();
        assert!(view.quiz.is_none());
        assert!(view.questions.is_empty());

        seed_enrollment(&pool, "STU-0001", "DROIT101", "Paid").await;
        let view = get_quiz(&pool, Some(&student), "DROIT101").await.unwrap();
        let quiz = view.quiz.unwrap();
        assert_eq!(quiz.id, "quiz-DROIT101");
        assert_eq!(quiz.passing_score, 70);
        assert_eq!(view.questions.len(), 2);
    }

    #[tokio::test]
    async fn saved_quiz_replaces_samples() {
        let pool = pool().await;
        seed_catalog(&pool).await;
        let ec = db::fetch_ec(&pool, "DROIT101").await.unwrap();
        let draft: QuizDraft = serde_json::from_value(serde_json::json!({
            "passing_percentage": 50,
            "max_attempts": 2,
            "questions": [{
                "question": "Source principale du droit malgache ?",
                "type": "single",
                "options": [
                    {"option": "La Constitution", "is_correct": true},
                    {"option": "La coutume"}
                ]
            }]
        }))
        .unwrap();
        let first_id = save_quiz(&pool, &ec, &draft).await.unwrap();
        let second_id = save_quiz(&pool, &ec, &draft).await.unwrap();
        assert_eq!(first_id, second_id);

        let (settings, questions) = load_quiz(&pool, &ec).await.unwrap();
        assert_eq!(settings.passing_score, 50);
        assert_eq!(settings.title, "Quiz - Introduction au droit");
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].correct, BTreeSet::from([0]));

        let editable = quiz_for_edit(&pool, &ec).await.unwrap().unwrap();
        assert!(editable.questions[0].options[0].is_correct);
        assert!(!editable.questions[0].options[1].is_correct);
    }
}
