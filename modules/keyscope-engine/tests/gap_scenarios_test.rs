//! Content-gap scenario tests against the ops surface.

use std::collections::BTreeSet;

use chrono::Utc;
use keyscope_common::{EngineConfig, GapKind, HeadingEntry, PageAuditSignal};
use keyscope_engine::ops::{compute_gaps, ComputeGapsInput};

fn audit(url: &str, topics: &[&str]) -> PageAuditSignal {
    PageAuditSignal {
        url: url.to_string(),
        word_count: Some(1200),
        headings: vec![],
        schema_types: BTreeSet::new(),
        desktop_vitals: None,
        mobile_vitals: None,
        structured_data_valid: None,
        topics: topics.iter().map(|t| t.to_string()).collect(),
        provider: "audit".to_string(),
        collected_at: Utc::now(),
    }
}

fn with_faq(mut a: PageAuditSignal) -> PageAuditSignal {
    a.headings.push(HeadingEntry {
        level: 2,
        text: "FAQ".to_string(),
    });
    a.schema_types.insert("FAQPage".to_string());
    a
}

#[test]
fn faq_gaps_rank_above_partially_covered_topics() {
    // Both competitors carry an FAQ section and FAQPage schema; the target
    // has neither. One topic is covered by a single competitor only.
    let input = ComputeGapsInput {
        target: audit("https://me.com/guide", &["pricing"]),
        competitors: vec![
            with_faq(audit("https://a.com/guide", &["pricing", "automation"])),
            with_faq(audit("https://b.com/guide", &["pricing"])),
        ],
        snapshot: None,
    };

    let out = compute_gaps(&EngineConfig::default(), input).unwrap();
    assert!(!out.partial);

    let structural: Vec<_> = out
        .gaps
        .iter()
        .filter(|g| g.kind == GapKind::Structural)
        .collect();
    assert_eq!(structural.len(), 2, "exactly one FAQ gap and one schema gap");
    assert_eq!(structural[0].item, "faq_section");
    assert_eq!(structural[1].item, "schema:FAQPage");

    // "automation" has one supporter of two — below min_support, no gap.
    assert!(out.gaps.iter().all(|g| g.kind != GapKind::Topic));
    // And with full coverage, both structural gaps lead the list.
    assert_eq!(out.gaps[0].item, "faq_section");
    assert_eq!(out.gaps[1].item, "schema:FAQPage");
}

#[test]
fn gap_ordering_is_reproducible() {
    let build = || ComputeGapsInput {
        target: audit("https://me.com/guide", &[]),
        competitors: vec![
            with_faq(audit("https://a.com", &["zulu", "alpha", "mike"])),
            with_faq(audit("https://b.com", &["mike", "zulu", "alpha"])),
            audit("https://c.com", &["alpha"]),
        ],
        snapshot: None,
    };

    let cfg = EngineConfig::default();
    let first = compute_gaps(&cfg, build()).unwrap();
    let second = compute_gaps(&cfg, build()).unwrap();
    assert_eq!(first.gaps, second.gaps);

    let topics: Vec<&str> = first
        .gaps
        .iter()
        .filter(|g| g.kind == GapKind::Topic)
        .map(|g| g.item.as_str())
        .collect();
    assert_eq!(topics, vec!["alpha", "mike", "zulu"]);
}

#[test]
fn incomplete_audit_marks_output_partial() {
    let mut target = audit("https://me.com/guide", &[]);
    target.word_count = None;
    let out = compute_gaps(
        &EngineConfig::default(),
        ComputeGapsInput {
            target,
            competitors: vec![audit("https://a.com", &[]), audit("https://b.com", &[])],
            snapshot: None,
        },
    )
    .unwrap();
    assert!(out.partial);
}
