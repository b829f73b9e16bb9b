//! Content Gap Synthesizer.
//!
//! Diffs the target page's coverage against the aggregated competitor
//! corpus. Topic gaps come from the set difference of topic/entity tags
//! weighted by how many competitors carry each tag; structural gaps
//! (FAQ section, schema types, structured-data validity) come from direct
//! attribute comparison; SERP-feature gaps come from the latest snapshot.
//! Identical inputs always produce identical ordering — ranked by
//! coverage × impact descending, ties broken by lexical item key.

use std::collections::BTreeMap;

use tracing::debug;

use keyscope_common::{
    canonical_url, normalize_keyword, ContentGap, GapConfig, GapKind, PageAuditSignal,
    SerpFeature, SerpSnapshot,
};

pub struct GapSynthesizer {
    cfg: GapConfig,
}

impl GapSynthesizer {
    pub fn new(cfg: GapConfig) -> Self {
        Self { cfg }
    }

    /// Compute the ordered gap list for one target page against its
    /// competitor audits, plus SERP-feature gaps when a snapshot is given.
    pub fn compute(
        &self,
        target: &PageAuditSignal,
        competitors: &[PageAuditSignal],
        snapshot: Option<&SerpSnapshot>,
    ) -> Vec<ContentGap> {
        let mut gaps = Vec::new();
        let n = competitors.len();
        if n > 0 {
            self.topic_gaps(target, competitors, &mut gaps);
            self.structural_gaps(target, competitors, &mut gaps);
        }
        if let Some(snap) = snapshot {
            self.serp_feature_gaps(target, snap, &mut gaps);
        }

        gaps.sort_by(|a, b| {
            b.rank_value()
                .partial_cmp(&a.rank_value())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.item.cmp(&b.item))
        });
        debug!(
            target = %target.url,
            competitors = n,
            gaps = gaps.len(),
            "Content gap synthesis complete"
        );
        gaps
    }

    /// Topic tags present in ≥ `min_support` competitors and absent from
    /// the target.
    fn topic_gaps(
        &self,
        target: &PageAuditSignal,
        competitors: &[PageAuditSignal],
        gaps: &mut Vec<ContentGap>,
    ) {
        let n = competitors.len() as f64;
        let target_topics: std::collections::BTreeSet<String> =
            target.topics.iter().map(|t| normalize_keyword(t)).collect();

        // BTreeMap keeps counting order deterministic.
        let mut support: BTreeMap<String, u32> = BTreeMap::new();
        for competitor in competitors {
            // A competitor counts once per topic regardless of duplicates.
            let topics: std::collections::BTreeSet<String> = competitor
                .topics
                .iter()
                .map(|t| normalize_keyword(t))
                .filter(|t| !t.is_empty())
                .collect();
            for topic in topics {
                *support.entry(topic).or_insert(0) += 1;
            }
        }

        for (topic, count) in support {
            if count >= self.cfg.min_support && !target_topics.contains(&topic) {
                gaps.push(ContentGap {
                    kind: GapKind::Topic,
                    item: topic,
                    coverage: count as f64 / n,
                    impact: self.cfg.topic_impact,
                });
            }
        }
    }

    /// Structural gaps by direct attribute comparison.
    fn structural_gaps(
        &self,
        target: &PageAuditSignal,
        competitors: &[PageAuditSignal],
        gaps: &mut Vec<ContentGap>,
    ) {
        let n = competitors.len() as f64;

        let faq_support = competitors.iter().filter(|c| c.has_faq_section()).count() as u32;
        if faq_support >= self.cfg.min_support && !target.has_faq_section() {
            gaps.push(ContentGap {
                kind: GapKind::Structural,
                item: "faq_section".to_string(),
                coverage: faq_support as f64 / n,
                impact: self.cfg.structural_impact,
            });
        }

        let mut schema_support: BTreeMap<&str, u32> = BTreeMap::new();
        for competitor in competitors {
            for ty in &competitor.schema_types {
                *schema_support.entry(ty.as_str()).or_insert(0) += 1;
            }
        }
        for (ty, count) in schema_support {
            if count >= self.cfg.min_support && !target.schema_types.contains(ty) {
                gaps.push(ContentGap {
                    kind: GapKind::Structural,
                    item: format!("schema:{ty}"),
                    coverage: count as f64 / n,
                    impact: self.cfg.structural_impact,
                });
            }
        }

        let valid_support = competitors
            .iter()
            .filter(|c| c.structured_data_valid == Some(true))
            .count() as u32;
        if valid_support >= self.cfg.min_support && target.structured_data_valid == Some(false) {
            gaps.push(ContentGap {
                kind: GapKind::Structural,
                item: "valid_structured_data".to_string(),
                coverage: valid_support as f64 / n,
                impact: self.cfg.structural_impact,
            });
        }
    }

    /// SERP features the page could contend for and does not own.
    /// Eligibility follows page structure: the featured snippet has a known
    /// owner URL; PAA eligibility needs an FAQ section or FAQPage schema;
    /// the video pack needs VideoObject schema. Other packs are context,
    /// not page-addressable, and are skipped.
    fn serp_feature_gaps(
        &self,
        target: &PageAuditSignal,
        snapshot: &SerpSnapshot,
        gaps: &mut Vec<ContentGap>,
    ) {
        let target_url = canonical_url(&target.url);
        for feature in &snapshot.features {
            let missing = match feature {
                SerpFeature::FeaturedSnippet => {
                    let owner = snapshot
                        .featured_snippet_url
                        .as_deref()
                        .and_then(canonical_url);
                    owner != target_url || owner.is_none()
                }
                SerpFeature::PeopleAlsoAsk => {
                    !target.has_faq_section() && !target.schema_types.contains("FAQPage")
                }
                SerpFeature::VideoPack => !target.schema_types.contains("VideoObject"),
                _ => {
                    debug!(feature = %feature, "SERP feature not page-addressable, skipping");
                    false
                }
            };
            if missing {
                gaps.push(ContentGap {
                    kind: GapKind::SerpFeature,
                    item: feature.to_string(),
                    coverage: 1.0,
                    impact: self.cfg.serp_feature_impact,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use keyscope_common::{HeadingEntry, KeywordKey};
    use std::collections::BTreeSet;

    fn audit(url: &str) -> PageAuditSignal {
        PageAuditSignal {
            url: url.to_string(),
            word_count: Some(1000),
            headings: vec![],
            schema_types: BTreeSet::new(),
            desktop_vitals: None,
            mobile_vitals: None,
            structured_data_valid: None,
            topics: BTreeSet::new(),
            provider: "audit".to_string(),
            collected_at: Utc::now(),
        }
    }

    fn with_topics(mut a: PageAuditSignal, topics: &[&str]) -> PageAuditSignal {
        a.topics = topics.iter().map(|t| t.to_string()).collect();
        a
    }

    fn with_faq(mut a: PageAuditSignal) -> PageAuditSignal {
        a.headings.push(HeadingEntry {
            level: 2,
            text: "Frequently Asked Questions".to_string(),
        });
        a.schema_types.insert("FAQPage".to_string());
        a
    }

    fn synth() -> GapSynthesizer {
        GapSynthesizer::new(GapConfig::default())
    }

    #[test]
    fn topic_needs_two_competitors_to_count() {
        let target = audit("https://me.com/page");
        let competitors = vec![
            with_topics(audit("https://a.com"), &["pricing", "automation"]),
            with_topics(audit("https://b.com"), &["automation"]),
            with_topics(audit("https://c.com"), &["templates"]),
        ];

        let gaps = synth().compute(&target, &competitors, None);
        let items: Vec<&str> = gaps.iter().map(|g| g.item.as_str()).collect();
        assert_eq!(items, vec!["automation"], "single-competitor topics don't qualify");
        assert!((gaps[0].coverage - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn covered_topic_is_not_a_gap() {
        let target = with_topics(audit("https://me.com/page"), &["Automation"]);
        let competitors = vec![
            with_topics(audit("https://a.com"), &["automation"]),
            with_topics(audit("https://b.com"), &["automation"]),
        ];
        assert!(synth().compute(&target, &competitors, None).is_empty());
    }

    #[test]
    fn faq_scenario_yields_exactly_two_structural_gaps_ranked_first() {
        // Two competitors both carry an FAQ section and FAQPage schema; the
        // target has neither. One partially-covered topic comes along.
        let target = audit("https://me.com/page");
        let competitors = vec![
            with_topics(with_faq(audit("https://a.com")), &["deliverability", "automation"]),
            with_topics(with_faq(audit("https://b.com")), &["deliverability"]),
            with_topics(audit("https://c.com"), &["automation"]),
        ];

        let gaps = synth().compute(&target, &competitors, None);

        let structural: Vec<&ContentGap> =
            gaps.iter().filter(|g| g.kind == GapKind::Structural).collect();
        assert_eq!(structural.len(), 2);
        assert_eq!(structural[0].item, "faq_section");
        assert_eq!(structural[1].item, "schema:FAQPage");

        // Both structural gaps outrank every topic gap with coverage < 1.0.
        let worst_structural = structural
            .iter()
            .map(|g| g.rank_value())
            .fold(f64::INFINITY, f64::min);
        for gap in gaps.iter().filter(|g| g.kind == GapKind::Topic) {
            assert!(gap.coverage < 1.0);
            assert!(worst_structural > gap.rank_value());
        }
    }

    #[test]
    fn serp_feature_gaps_respect_ownership_and_eligibility() {
        let target = audit("https://me.com/page");
        let mut features = BTreeSet::new();
        features.insert(SerpFeature::FeaturedSnippet);
        features.insert(SerpFeature::PeopleAlsoAsk);
        features.insert(SerpFeature::ImagePack);
        let snapshot = SerpSnapshot {
            id: uuid::Uuid::new_v4(),
            key: KeywordKey::new("kw", "us"),
            captured_at: Utc::now(),
            provider: "serp".to_string(),
            entries: vec![],
            features,
            featured_snippet_url: Some("https://a.com/guide".to_string()),
            paa_questions: vec![],
            related_queries: vec![],
            total_results: None,
        };

        let gaps = synth().compute(&target, &[], Some(&snapshot));
        let items: Vec<&str> = gaps.iter().map(|g| g.item.as_str()).collect();
        assert!(items.contains(&"featured_snippet"));
        assert!(items.contains(&"people_also_ask"));
        assert!(!items.contains(&"image_pack"), "packs are not page-addressable");

        // Once the target owns the snippet and carries FAQPage, neither gap remains.
        let owner = with_faq(audit("https://a.com/guide"));
        let gaps = synth().compute(&owner, &[], Some(&snapshot));
        assert!(gaps.is_empty());
    }

    #[test]
    fn ordering_is_deterministic_across_runs() {
        let target = audit("https://me.com/page");
        let competitors = vec![
            with_topics(with_faq(audit("https://a.com")), &["zebra", "alpha", "beta"]),
            with_topics(with_faq(audit("https://b.com")), &["alpha", "beta", "zebra"]),
        ];

        let first = synth().compute(&target, &competitors, None);
        let second = synth().compute(&target, &competitors, None);
        assert_eq!(first, second);

        // Equal rank values order by lexical item key.
        let topic_items: Vec<&str> = first
            .iter()
            .filter(|g| g.kind == GapKind::Topic)
            .map(|g| g.item.as_str())
            .collect();
        assert_eq!(topic_items, vec!["alpha", "beta", "zebra"]);
    }

    #[test]
    fn invalid_structured_data_is_a_gap_when_competitors_validate() {
        let mut target = audit("https://me.com/page");
        target.structured_data_valid = Some(false);
        let mut a = audit("https://a.com");
        a.structured_data_valid = Some(true);
        let mut b = audit("https://b.com");
        b.structured_data_valid = Some(true);

        let gaps = synth().compute(&target, &[a, b], None);
        assert!(gaps.iter().any(|g| g.item == "valid_structured_data"));
    }
}
