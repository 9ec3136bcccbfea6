//! Evidence and generation grading.

use super::generator::format_documents;
use super::normalize_label;
use crate::ports::{Classifier, TaskKind};
use crate::state::{Evidence, Question};
use ragloop_core::{AppError, AppResult};
use std::collections::HashMap;

/// Parse a binary grade. Accepts yes/no and relevant/irrelevant.
pub fn parse_grade(label: &str) -> Option<bool> {
    match normalize_label(label).as_str() {
        "yes" | "relevant" | "true" => Some(true),
        "no" | "irrelevant" | "false" => Some(false),
        _ => None,
    }
}

async fn grade(
    classifier: &dyn Classifier,
    task: TaskKind,
    inputs: HashMap<String, String>,
) -> AppResult<bool> {
    let label = classifier.classify(task, &inputs).await?;
    parse_grade(&label).ok_or_else(|| AppError::ClassificationAmbiguous {
        task: task.to_string(),
        label,
    })
}

/// Keep the evidence items judged relevant to `question`, in their original order.
///
/// Items are graded one at a time against the question only.
pub async fn grade_documents(
    classifier: &dyn Classifier,
    question: &Question,
    evidence: &[Evidence],
) -> AppResult<Vec<Evidence>> {
    let mut relevant = Vec::with_capacity(evidence.len());

    for item in evidence {
        let inputs = HashMap::from([
            ("question".to_string(), question.to_string()),
            ("document".to_string(), item.content.clone()),
        ]);

        if grade(classifier, TaskKind::GradeDocument, inputs).await? {
            relevant.push(item.clone());
        }
    }

    tracing::debug!(
        "Graded {} evidence items, {} relevant",
        evidence.len(),
        relevant.len()
    );

    Ok(relevant)
}

/// Whether `generation` is supported by `evidence`.
pub async fn grade_groundedness(
    classifier: &dyn Classifier,
    evidence: &[Evidence],
    generation: &str,
) -> AppResult<bool> {
    let inputs = HashMap::from([
        ("documents".to_string(), format_documents(evidence)),
        ("generation".to_string(), generation.to_string()),
    ]);
    grade(classifier, TaskKind::GradeGroundedness, inputs).await
}

/// Whether `generation` resolves `question`.
pub async fn grade_usefulness(
    classifier: &dyn Classifier,
    question: &Question,
    generation: &str,
) -> AppResult<bool> {
    let inputs = HashMap::from([
        ("question".to_string(), question.to_string()),
        ("generation".to_string(), generation.to_string()),
    ]);
    grade(classifier, TaskKind::GradeUsefulness, inputs).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedClassifier;

    fn snippets(n: usize) -> Vec<Evidence> {
        (0..n)
            .map(|i| Evidence::knowledge(format!("snippet {}", i)))
            .collect()
    }

    #[test]
    fn test_parse_grade() {
        assert_eq!(parse_grade("Yes"), Some(true));
        assert_eq!(parse_grade(" no."), Some(false));
        assert_eq!(parse_grade("irrelevant"), Some(false));
        assert_eq!(parse_grade("maybe"), None);
    }

    #[tokio::test]
    async fn test_filter_is_ordered_subsequence() {
        let evidence = snippets(6);
        let classifier = ScriptedClassifier::new().script(
            TaskKind::GradeDocument,
            ["no", "yes", "yes", "no", "yes", "no"],
        );

        let kept = grade_documents(&classifier, &Question::new("q"), &evidence)
            .await
            .unwrap();

        let contents: Vec<&str> = kept.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["snippet 1", "snippet 2", "snippet 4"]);

        let graded = classifier.calls(TaskKind::GradeDocument);
        assert_eq!(graded.len(), 6);
        assert_eq!(graded[3]["document"], "snippet 3");
    }

    #[tokio::test]
    async fn test_duplicates_survive_independently() {
        let evidence = vec![Evidence::knowledge("same"), Evidence::knowledge("same")];
        let classifier = ScriptedClassifier::new().always(TaskKind::GradeDocument, "yes");

        let kept = grade_documents(&classifier, &Question::new("q"), &evidence)
            .await
            .unwrap();
        assert_eq!(kept, evidence);
    }

    #[tokio::test]
    async fn test_empty_evidence_makes_no_calls() {
        let classifier = ScriptedClassifier::new();
        let kept = grade_documents(&classifier, &Question::new("q"), &[])
            .await
            .unwrap();
        assert!(kept.is_empty());
        assert!(classifier.calls(TaskKind::GradeDocument).is_empty());
    }

    #[tokio::test]
    async fn test_ambiguous_grade() {
        let classifier = ScriptedClassifier::new().always(TaskKind::GradeGroundedness, "partly");
        let err = grade_groundedness(&classifier, &snippets(1), "answer")
            .await
            .unwrap_err();
        assert_eq!(err.kind().as_str(), "classification_ambiguous");
    }

    #[tokio::test]
    async fn test_generation_grades_send_expected_inputs() {
        let classifier = ScriptedClassifier::new()
            .always(TaskKind::GradeGroundedness, "yes")
            .always(TaskKind::GradeUsefulness, "no");

        assert!(grade_groundedness(&classifier, &snippets(2), "gen").await.unwrap());
        assert!(!grade_usefulness(&classifier, &Question::new("q"), "gen")
            .await
            .unwrap());

        let grounded = classifier.calls(TaskKind::GradeGroundedness);
        assert_eq!(grounded[0]["documents"], "snippet 0\n\n---\n\nsnippet 1");
        assert_eq!(grounded[0]["generation"], "gen");
        assert_eq!(classifier.calls(TaskKind::GradeUsefulness)[0]["question"], "q");
    }
}
