//! Retrieval evaluation: hit rate at k over a labelled question set.

use crate::rag::{Query, Retriever};
use medrag_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// A question and the file that should answer it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalCase {
    pub question: String,
    pub expected_doc_filename: String,
}

/// Outcome of one case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalCaseResult {
    pub question: String,
    pub expected_doc_filename: String,
    pub hit: bool,
    /// Distinct documents retrieved, in rank order
    pub retrieved_documents: Vec<String>,
}

/// Aggregate evaluation report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    pub k: usize,
    pub total: usize,
    pub hits: usize,
    pub hit_rate: f64,
    pub cases: Vec<EvalCaseResult>,
}

/// Load a JSON array of cases.
pub fn load_dataset(path: &Path) -> AppResult<Vec<EvalCase>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AppError::Knowledge(format!("Failed to read eval dataset {:?}: {}", path, e))
    })?;

    serde_json::from_str(&content)
        .map_err(|e| AppError::Knowledge(format!("Invalid eval dataset {:?}: {}", path, e)))
}

/// Retrieve `k` chunks per question and count how often the expected document appears.
pub async fn evaluate(retriever: &Retriever, cases: &[EvalCase], k: usize) -> AppResult<EvalReport> {
    let mut results = Vec::with_capacity(cases.len());

    for case in cases {
        let retrieved = retriever
            .retrieve(&Query::new("eval", case.question.as_str()), k)
            .await?;

        let mut seen = HashSet::new();
        let retrieved_documents: Vec<String> = retrieved
            .iter()
            .map(|r| r.chunk.source_document.clone())
            .filter(|doc| seen.insert(doc.clone()))
            .collect();

        let hit = retrieved_documents.contains(&case.expected_doc_filename);
        tracing::debug!("{} '{}'", if hit { "HIT " } else { "MISS" }, case.question);

        results.push(EvalCaseResult {
            question: case.question.clone(),
            expected_doc_filename: case.expected_doc_filename.clone(),
            hit,
            retrieved_documents,
        });
    }

    let hits = results.iter().filter(|r| r.hit).count();
    let hit_rate = if results.is_empty() {
        0.0
    } else {
        hits as f64 / results.len() as f64
    };

    tracing::info!("Evaluation complete. hit_rate@{}: {:.3}", k, hit_rate);

    Ok(EvalReport {
        k,
        total: results.len(),
        hits,
        hit_rate,
        cases: results,
    })
}
