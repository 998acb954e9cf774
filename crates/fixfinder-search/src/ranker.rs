//! Unified ranking: priority band first, relevance within the band.

use fixfinder_core::ResourceHit;
use fixfinder_config::RankingConfig;
use fixfinder_core::ResourceType;

/// Maps resource types to priority bands. Lower band numbers surface first
/// regardless of relevance score; bulletins outrank manuals outrank videos.
#[derive(Debug, Clone)]
pub struct PriorityPolicy {
    ranking: RankingConfig,
}

impl PriorityPolicy {
    pub fn new(ranking: RankingConfig) -> Self {
        Self { ranking }
    }

    pub fn priority_level(&self, resource_type: ResourceType) -> u8 {
        self.ranking.priority_level(resource_type)
    }
}

impl Default for PriorityPolicy {
    fn default() -> Self {
        Self::new(RankingConfig::default())
    }
}

/// Merge hits from every sub-index into the final result list.
///
/// Duplicates (same resource type and id) collapse to their best relevance
/// score. The sort is strictly two-level: priority band ascending, then
/// relevance descending. A band-1 hit with relevance 0.3 still precedes a
/// band-2 hit with relevance 0.9.
pub fn merge_hits(mut hits: Vec<ResourceHit>, limit: usize) -> Vec<ResourceHit> {
    hits.sort_by(|a, b| {
        a.priority_level
            .cmp(&b.priority_level)
            .then_with(|| b.relevance_score.total_cmp(&a.relevance_score))
    });

    let mut merged: Vec<ResourceHit> = Vec::with_capacity(hits.len());
    for hit in hits {
        // Sorted best-first, so the first occurrence of an id is the keeper
        if !merged
            .iter()
            .any(|m| m.resource_type == hit.resource_type && m.id == hit.id)
        {
            merged.push(hit);
        }
    }

    merged.truncate(limit);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(resource_type: ResourceType, id: &str, priority: u8, relevance: f32) -> ResourceHit {
        ResourceHit::new(resource_type, id, priority, relevance)
    }

    #[test]
    fn test_priority_band_beats_relevance() {
        let merged = merge_hits(
            vec![
                hit(ResourceType::Manual, "m1", 2, 0.9),
                hit(ResourceType::Bulletin, "b1", 1, 0.3),
            ],
            10,
        );

        assert_eq!(merged[0].id, "b1");
        assert_eq!(merged[1].id, "m1");
    }

    #[test]
    fn test_relevance_orders_within_band() {
        let merged = merge_hits(
            vec![
                hit(ResourceType::Manual, "m1", 2, 0.4),
                hit(ResourceType::Manual, "m2", 2, 0.8),
                hit(ResourceType::Manual, "m3", 2, 0.6),
            ],
            10,
        );

        let ids: Vec<&str> = merged.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["m2", "m3", "m1"]);
    }

    #[test]
    fn test_duplicate_keeps_best_score() {
        let merged = merge_hits(
            vec![
                hit(ResourceType::Manual, "m1", 2, 0.5),
                hit(ResourceType::Manual, "m1", 2, 0.7),
            ],
            10,
        );

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].relevance_score, 0.7);
    }

    #[test]
    fn test_limit_applies_after_merge() {
        let hits = (0..30)
            .map(|i| hit(ResourceType::Manual, &format!("m{}", i), 2, i as f32 / 30.0))
            .collect();
        let merged = merge_hits(hits, 5);
        assert_eq!(merged.len(), 5);
    }

    #[test]
    fn test_default_policy_order() {
        let policy = PriorityPolicy::default();
        assert!(policy.priority_level(ResourceType::Bulletin) < policy.priority_level(ResourceType::Manual));
        assert!(policy.priority_level(ResourceType::Manual) < policy.priority_level(ResourceType::Video));
        assert!(policy.priority_level(ResourceType::Video) < policy.priority_level(ResourceType::Link));
        assert!(policy.priority_level(ResourceType::Link) < policy.priority_level(ResourceType::Part));
    }
}
