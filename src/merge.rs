//! Merge discovered candidates into the catalog by `code`.
//!
//! Each distinct code is admitted at most once per run and never when the catalog already has
//! it. The first occurrence of a code wins, so its title is the one kept. Admitted entries get
//! sequential ids starting at `max(existing) + 1`.

use std::collections::HashSet;

use crate::{
    catalog::{CatalogSnapshot, StandardEntry},
    classify::classify,
    discovery::DiscoveryCandidate,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted(u64),
    /// Code already in the catalog, or admitted earlier in this run.
    Duplicate,
    Irrelevant,
    /// Empty code or title.
    Malformed,
}

#[derive(Debug)]
pub struct CatalogMerger {
    known_codes: HashSet<String>,
    next_id: u64,
    current_year: i32,
    admitted: Vec<StandardEntry>,
}

impl CatalogMerger {
    pub fn new(snapshot: &CatalogSnapshot, current_year: i32) -> Self {
        CatalogMerger {
            known_codes: snapshot.codes(),
            next_id: snapshot.max_id() + 1,
            current_year,
            admitted: Vec::new(),
        }
    }

    pub fn offer(&mut self, candidate: &DiscoveryCandidate) -> Admission {
        let code = candidate.code.trim();
        let title = candidate.title.trim();
        if code.is_empty() || title.is_empty() {
            return Admission::Malformed;
        }
        if self.known_codes.contains(code) {
            return Admission::Duplicate;
        }
        let classification = classify(code, title);
        if !classification.relevant {
            tracing::debug!("skipping out-of-domain candidate {code} {title}");
            return Admission::Irrelevant;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.known_codes.insert(code.to_string());
        tracing::info!("   ✅ new standard: {code} {title} (id {id}, {})", classification.category);
        self.admitted.push(StandardEntry::discovered(
            id,
            code,
            title,
            classification.category,
            self.current_year,
        ));
        Admission::Admitted(id)
    }

    pub fn offer_all<'a, I>(&mut self, candidates: I) -> usize
    where
        I: IntoIterator<Item = &'a DiscoveryCandidate>,
    {
        candidates
            .into_iter()
            .filter(|c| matches!(self.offer(c), Admission::Admitted(_)))
            .count()
    }

    pub fn admitted(&self) -> &[StandardEntry] {
        &self.admitted
    }

    pub fn into_new_entries(self) -> Vec<StandardEntry> {
        self.admitted
    }
}

/// New catalog rows for `candidates`, in discovery order.
pub fn merge_candidates(
    snapshot: &CatalogSnapshot,
    candidates: &[DiscoveryCandidate],
    current_year: i32,
) -> Vec<StandardEntry> {
    let mut merger = CatalogMerger::new(snapshot, current_year);
    merger.offer_all(candidates);
    merger.into_new_entries()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn entry(id: u64, code: &str) -> StandardEntry {
        StandardEntry {
            id,
            code: code.to_string(),
            title: format!("{code} title"),
            full_title: String::new(),
            year: None,
            status: Default::default(),
            category: String::new(),
            slug: String::new(),
            extra: Map::new(),
        }
    }

    #[test]
    fn existing_codes_are_never_duplicated() {
        let snapshot = CatalogSnapshot::new(vec![entry(1, "GBZ 1-2010")]);
        let new = merge_candidates(
            &snapshot,
            &[
                DiscoveryCandidate::new("GBZ 1-2010", "X"),
                DiscoveryCandidate::new("GBZ 2-2011", "Y"),
            ],
            2026,
        );
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].code, "GBZ 2-2011");
        assert_eq!(new[0].id, 2);
    }

    #[test]
    fn stored_codes_with_stray_whitespace_still_dedupe() {
        let snapshot =
            CatalogSnapshot::new(vec![entry(1, "GBZ 1-2010 "), entry(2, " GBZ 49-2014")]);
        let new = merge_candidates(
            &snapshot,
            &[
                DiscoveryCandidate::new("GBZ 1-2010", "X"),
                DiscoveryCandidate::new("  GBZ 49-2014", "职业性噪声聋的诊断"),
            ],
            2026,
        );
        assert!(new.is_empty());
    }

    #[test]
    fn ids_continue_from_max_existing() {
        let snapshot = CatalogSnapshot::new(vec![entry(3, "GBZ 1-2010"), entry(7, "GBZ 2-2011")]);
        let new = merge_candidates(
            &snapshot,
            &[
                DiscoveryCandidate::new("GBZ 10-2020", "职业卫生 A"),
                DiscoveryCandidate::new("GBZ 11-2021", "职业卫生 B"),
            ],
            2026,
        );
        let ids: Vec<_> = new.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![8, 9]);
    }

    #[test]
    fn first_seen_title_wins_within_a_run() {
        let snapshot = CatalogSnapshot::new(vec![entry(1, "GBZ 1-2010")]);
        let mut merger = CatalogMerger::new(&snapshot, 2026);
        assert_eq!(
            merger.offer(&DiscoveryCandidate::new("GBZ 49-2014", "职业性噪声聋的诊断")),
            Admission::Admitted(2)
        );
        assert_eq!(
            merger.offer(&DiscoveryCandidate::new(" GBZ 49-2014 ", "另一个标题")),
            Admission::Duplicate
        );
        assert_eq!(merger.admitted().len(), 1);
        assert_eq!(merger.admitted()[0].title, "职业性噪声聋的诊断");
    }

    #[test]
    fn irrelevant_and_malformed_candidates_are_dropped() {
        let snapshot = CatalogSnapshot::new(vec![entry(1, "GBZ 1-2010")]);
        let mut merger = CatalogMerger::new(&snapshot, 2026);
        assert_eq!(
            merger.offer(&DiscoveryCandidate::new("GB 2760-2014", "食品添加剂使用标准")),
            Admission::Irrelevant
        );
        assert_eq!(
            merger.offer(&DiscoveryCandidate::new("", "职业卫生")),
            Admission::Malformed
        );
        // Rejected candidates do not consume ids.
        assert_eq!(
            merger.offer(&DiscoveryCandidate::new("AQ 123", "粉尘防爆")),
            Admission::Admitted(2)
        );
        assert_eq!(merger.admitted()[0].year, Some(2026));
    }
}
