//! High-risk screening wizard.
//!
//! A fixed, versioned question list; submissions compute a heuristic
//! score and a label. This is a screening aid, not regulatory advice.
//! Assessments are append-only per system; the newest one feeds the
//! export manifest.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use annexreg_core::types::{AssessmentResult, AuditAction, HighRiskAssessment};
use annexreg_core::{CurrentUser, RegistryError, Result};

use crate::audit::{self, AuditContext};
use crate::rows::{db_err, AssessmentRow};
use crate::systems;

const ASSESSMENT_COLUMNS: &str = "id, ai_system_id, version_label, answers_json, \
     result_label, score, notes, created_by, created_at";

pub const WIZARD_VERSION: &str = "2024-12";

pub const ASSESSMENT_DISCLAIMER: &str = "This screening is a heuristic aid for prioritising \
documentation work. It is not legal advice and does not replace a formal conformity assessment.";

#[derive(Debug, Clone, Serialize)]
pub struct WizardQuestion {
    pub id: &'static str,
    pub text: &'static str,
    pub high_risk_indicator: bool,
}

/// Fixed question list; `high_risk_indicator` answers add to the score.
pub const WIZARD_QUESTIONS: [WizardQuestion; 8] = [
    WizardQuestion {
        id: "q1",
        text: "Does the system screen, filter or rank job applications or candidates?",
        high_risk_indicator: true,
    },
    WizardQuestion {
        id: "q2",
        text: "Does the system influence decisions on promotion or termination?",
        high_risk_indicator: true,
    },
    WizardQuestion {
        id: "q3",
        text: "Does the system allocate tasks or monitor employee performance or behaviour?",
        high_risk_indicator: true,
    },
    WizardQuestion {
        id: "q4",
        text: "Do the system's outputs reach decision makers without human review?",
        high_risk_indicator: true,
    },
    WizardQuestion {
        id: "q5",
        text: "Does the system process data about natural persons in the EU?",
        high_risk_indicator: true,
    },
    WizardQuestion {
        id: "q6",
        text: "Is the system limited to narrow procedural tasks (formatting, scheduling)?",
        high_risk_indicator: false,
    },
    WizardQuestion {
        id: "q7",
        text: "Does a human make the final decision in every case?",
        high_risk_indicator: false,
    },
    WizardQuestion {
        id: "q8",
        text: "Is the system purely assistive with no scoring of individuals?",
        high_risk_indicator: false,
    },
];

#[derive(Debug, Deserialize)]
pub struct AssessmentAnswer {
    pub question_id: String,
    pub answer: bool,
}

#[derive(Debug, Deserialize)]
pub struct AssessmentSubmission {
    pub answers: Vec<AssessmentAnswer>,
    #[serde(default)]
    pub version_label: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One point per affirmative answer to a high-risk-indicator question.
pub fn calculate_score(answers: &[AssessmentAnswer]) -> i32 {
    answers
        .iter()
        .filter(|a| a.answer)
        .filter(|a| {
            WIZARD_QUESTIONS
                .iter()
                .any(|q| q.id == a.question_id && q.high_risk_indicator)
        })
        .count() as i32
}

pub fn result_for_score(score: i32) -> AssessmentResult {
    match score {
        s if s >= 3 => AssessmentResult::LikelyHighRisk,
        s if s >= 1 => AssessmentResult::Unclear,
        _ => AssessmentResult::LikelyNot,
    }
}

pub async fn submit(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    submission: &AssessmentSubmission,
    current: &CurrentUser,
) -> Result<HighRiskAssessment> {
    systems::get(tx, system_id, current.org_id).await?;

    for answer in &submission.answers {
        if !WIZARD_QUESTIONS.iter().any(|q| q.id == answer.question_id) {
            return Err(RegistryError::Validation(format!(
                "unknown question id '{}'",
                answer.question_id
            )));
        }
    }

    let score = calculate_score(&submission.answers);
    let result = result_for_score(score);

    let answers_json = json!({
        "version": WIZARD_VERSION,
        "questions": submission.answers.iter().map(|a| {
            let question = WIZARD_QUESTIONS
                .iter()
                .find(|q| q.id == a.question_id)
                .expect("validated above");
            json!({
                "id": a.question_id,
                "text": question.text,
                "answer": a.answer,
                "high_risk_indicator": question.high_risk_indicator,
            })
        }).collect::<Vec<_>>(),
    });

    let row: AssessmentRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO high_risk_assessments
            (ai_system_id, version_label, answers_json, result_label, score, notes, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {ASSESSMENT_COLUMNS}
        "#
    ))
    .bind(system_id)
    .bind(&submission.version_label)
    .bind(&answers_json)
    .bind(result.to_string())
    .bind(score)
    .bind(&submission.notes)
    .bind(current.user_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err)?;
    let assessment = row.into_domain()?;

    let ctx = AuditContext::for_user(current.org_id, current.user_id);
    audit::record(
        tx,
        &ctx,
        AuditAction::AssessmentCreate,
        "high_risk_assessment",
        assessment.id,
        Some(json!({
            "system_id": system_id,
            "result": assessment.result_label,
            "score": assessment.score,
        })),
    )
    .await?;

    Ok(assessment)
}

pub async fn list(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    org_id: Uuid,
) -> Result<Vec<HighRiskAssessment>> {
    systems::get(tx, system_id, org_id).await?;
    let rows: Vec<AssessmentRow> = sqlx::query_as(&format!(
        r#"
        SELECT {ASSESSMENT_COLUMNS} FROM high_risk_assessments
        WHERE ai_system_id = $1
        ORDER BY created_at DESC, id DESC
        "#
    ))
    .bind(system_id)
    .fetch_all(&mut **tx)
    .await
    .map_err(db_err)?;
    rows.into_iter().map(AssessmentRow::into_domain).collect()
}

/// Latest assessment as the manifest object, tie-broken by
/// `(created_at DESC, id DESC)`.
pub async fn latest_for_manifest(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
) -> Result<Option<Value>> {
    let row: Option<AssessmentRow> = sqlx::query_as(&format!(
        r#"
        SELECT {ASSESSMENT_COLUMNS} FROM high_risk_assessments
        WHERE ai_system_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#
    ))
    .bind(system_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err)?;

    Ok(match row {
        Some(row) => {
            let assessment = row.into_domain()?;
            Some(json!({
                "id": assessment.id,
                "result": assessment.result_label,
                "score": assessment.score,
                "assessed_at": assessment
                    .created_at
                    .to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            }))
        }
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(id: &str, yes: bool) -> AssessmentAnswer {
        AssessmentAnswer {
            question_id: id.to_string(),
            answer: yes,
        }
    }

    #[test]
    fn only_indicator_questions_score() {
        let answers = vec![
            answer("q1", true),
            answer("q6", true), // not an indicator
            answer("q7", true), // not an indicator
        ];
        assert_eq!(calculate_score(&answers), 1);
    }

    #[test]
    fn score_thresholds_map_to_labels() {
        assert_eq!(result_for_score(0), AssessmentResult::LikelyNot);
        assert_eq!(result_for_score(1), AssessmentResult::Unclear);
        assert_eq!(result_for_score(2), AssessmentResult::Unclear);
        assert_eq!(result_for_score(3), AssessmentResult::LikelyHighRisk);
        assert_eq!(result_for_score(5), AssessmentResult::LikelyHighRisk);
    }

    #[test]
    fn negative_answers_do_not_score() {
        let answers = vec![answer("q1", false), answer("q2", false)];
        assert_eq!(calculate_score(&answers), 0);
    }
}
