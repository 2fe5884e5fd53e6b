//! Section Reconstructor (C7, §4.5).
//!
//! Detects passages whose `sectionPath` marks them as one part of a
//! multi-part section, fetches the missing siblings through the same
//! tenant/ACL-scoped store call as the originating search
//! ([`VectorStore::scroll_by_ids`]), and inserts a synthetic passage per
//! section. Bounded fan-out keeps a single pathological request from
//! fetching an unbounded number of siblings.

use std::collections::{BTreeMap, HashSet};

use ragcore_config::ReconstructionConfig;
use ragcore_core::{Passage, SearchType};

use crate::access_filter::AccessFilter;
use crate::vector_store::VectorStore;
use crate::RagError;

use ragcore_config::constants::rag::RECONSTRUCTION_SCORE_PENALTY;

/// `block_X/part_i` → `(section key, part index)`. Returns `None` when the
/// section path does not follow the multi-part convention.
fn parse_section_path(section_path: &str) -> Option<(String, u32)> {
    let (block, part) = section_path.split_once('/')?;
    if !block.starts_with("block_") {
        return None;
    }
    let part_index: u32 = part.strip_prefix("part_")?.parse().ok()?;
    Some((block.to_string(), part_index))
}

struct Section {
    doc_id: String,
    block: String,
    parts: BTreeMap<u32, Passage>,
}

/// Reconstruct multi-part sections present in `passages`, bounded to
/// `config.max_sections` sections and `config.max_parts` additional sibling
/// fetches total (§4.5). Passages belonging to sections beyond the bound are
/// left untouched and the skip is reported via the returned count.
pub async fn reconstruct(
    store: &VectorStore,
    passages: &[Passage],
    filter: &AccessFilter,
    config: &ReconstructionConfig,
) -> Result<(Vec<Passage>, usize), RagError> {
    let mut sections: BTreeMap<(String, String), Section> = BTreeMap::new();
    let mut seen_ids: HashSet<String> = passages.iter().map(|p| p.id.clone()).collect();

    for passage in passages {
        let Some(section_path) = passage.payload.section_path.as_deref() else {
            continue;
        };
        let Some((block, part_index)) = parse_section_path(section_path) else {
            continue;
        };
        let key = (passage.payload.doc_id.clone(), block.clone());
        let section = sections.entry(key).or_insert_with(|| Section {
            doc_id: passage.payload.doc_id.clone(),
            block,
            parts: BTreeMap::new(),
        });
        section.parts.insert(part_index, passage.clone());
    }

    // Sections with only one known part are exactly the fragmented ones
    // worth reconstructing; a section already fully present needs no fetch.
    let mut candidate_sections: Vec<&mut Section> = sections.values_mut().filter(|s| s.parts.len() >= 1).collect();
    candidate_sections.sort_by_key(|s| (s.doc_id.clone(), s.block.clone()));

    let mut synthetic = Vec::new();
    let mut skipped = 0usize;
    let mut parts_fetched = 0usize;
    let mut sections_done = 0usize;

    for section in candidate_sections {
        if sections_done >= config.max_sections {
            skipped += 1;
            continue;
        }

        let known_max = *section.parts.keys().max().unwrap_or(&0);
        let missing_ids: Vec<String> = (0..=known_max)
            .filter(|i| !section.parts.contains_key(i))
            .map(|i| format!("{}/part_{}", section.block, i))
            .collect();

        if missing_ids.is_empty() {
            continue;
        }
        if parts_fetched + missing_ids.len() > config.max_parts {
            skipped += 1;
            continue;
        }

        let fetched = store.scroll_by_ids(&missing_ids, filter.clone()).await?;
        parts_fetched += fetched.len();
        for part in &fetched {
            if let Some(section_path) = part.payload.section_path.as_deref() {
                if let Some((_, part_index)) = parse_section_path(section_path) {
                    section.parts.insert(part_index, part.clone());
                }
            }
        }

        if section.parts.len() < 2 {
            // Siblings never materialized (deleted, or ACL-filtered away) —
            // nothing to reconstruct.
            continue;
        }

        let max_score = section.parts.values().map(|p| p.final_score).fold(f32::MIN, f32::max);
        let content = section
            .parts
            .values()
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let acl = section
            .parts
            .values()
            .next()
            .map(|p| p.payload.acl.clone())
            .unwrap_or_default();
        let payload_source = section.parts.values().next().unwrap().payload.clone();

        let synthetic_id = format!("reconstructed:{}:{}", section.doc_id, section.block);
        if seen_ids.contains(&synthetic_id) {
            continue;
        }
        seen_ids.insert(synthetic_id.clone());

        let final_score = (max_score - RECONSTRUCTION_SCORE_PENALTY).max(0.0);
        synthetic.push(Passage {
            id: synthetic_id,
            content,
            vector_score: None,
            keyword_score: None,
            fused_score: None,
            reranker_score: None,
            final_score,
            search_type: SearchType::Hybrid,
            payload: ragcore_core::PassagePayload {
                acl,
                section_path: Some(section.block.clone()),
                ..payload_source
            },
        });

        sections_done += 1;
    }

    let mut result = passages.to_vec();
    result.extend(synthetic);
    Ok((result, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_block_and_part() {
        assert_eq!(parse_section_path("block_3/part_1"), Some(("block_3".to_string(), 1)));
    }

    #[test]
    fn rejects_non_conforming_paths() {
        assert_eq!(parse_section_path("intro"), None);
        assert_eq!(parse_section_path("block_3/chunk_1"), None);
    }
}
