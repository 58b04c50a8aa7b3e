//! Citation extraction from `[n]` markers in answer text.

use super::types::Citation;
use crate::types::ScoredChunk;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static MARKER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").ok());

/// Passage numbers cited in `text` that fall within `1..=passage_count`.
pub fn cited_numbers(text: &str, passage_count: usize) -> BTreeSet<usize> {
    let Some(marker) = MARKER.as_ref() else {
        return BTreeSet::new();
    };

    marker
        .captures_iter(text)
        .filter_map(|caps| caps[1].parse::<usize>().ok())
        .filter(|n| (1..=passage_count).contains(n))
        .collect()
}

/// Citations for an answer over `context`, in rank order.
///
/// Only chunks of `context` can be cited. When the answer carries no valid
/// marker, every retrieved chunk is cited.
pub fn extract_citations(answer: &str, context: &[ScoredChunk]) -> Vec<Citation> {
    let cited = cited_numbers(answer, context.len());
    let all = cited.is_empty();

    let mut seen = BTreeSet::new();
    context
        .iter()
        .enumerate()
        .filter(|(i, _)| all || cited.contains(&(i + 1)))
        .filter(|(_, scored)| seen.insert(scored.chunk.id.clone()))
        .map(|(i, scored)| Citation::from_chunk(&scored.chunk, i + 1, scored.score))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::scored;

    #[test]
    fn test_cited_numbers_ignores_out_of_range() {
        let numbers = cited_numbers("Give ACT [2]. See [1][2] and [7], not [x].", 3);
        assert_eq!(numbers.into_iter().collect::<Vec<_>>(), vec![1, 2]);
        assert!(cited_numbers("see [0]", 3).is_empty());
    }

    #[test]
    fn test_extract_selected_in_rank_order() {
        let context = vec![scored("a", 0.9), scored("b", 0.8), scored("c", 0.7)];
        let citations = extract_citations("Dose per [3], confirmed by [1].", &context);

        let ids: Vec<&str> = citations.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(citations[1].rank, 3);
    }

    #[test]
    fn test_no_markers_cites_everything() {
        let context = vec![scored("a", 0.9), scored("b", 0.8)];
        assert_eq!(extract_citations("Give ACT.", &context).len(), 2);
        assert!(extract_citations("Give ACT.", &[]).is_empty());
    }

    #[test]
    fn test_duplicate_chunks_cited_once() {
        let context = vec![scored("a", 0.9), scored("a", 0.9)];
        assert_eq!(extract_citations("[1] [2]", &context).len(), 1);
    }
}
