use chrono::{Duration, NaiveDate};
use forge_hooks::buffer::{HealthBuffer, RingBuffer};
use forge_hooks::freshness::{classify, Freshness};
use forge_hooks::hooks::arbitration::arbitrate;
use forge_hooks::hooks::{Decision, Permission};
use forge_hooks::pruning::prune;
use forge_hooks::quality::score;
use proptest::prelude::*;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap_or_default()
}

fn decision(permission: u8) -> Decision {
    match permission % 3 {
        0 => Decision::allow(),
        1 => Decision::ask("confirm"),
        _ => Decision::deny("no"),
    }
}

proptest! {
    /// Pruned text never exceeds the budget, keeps its header and settles
    /// after one pass.
    #[test]
    fn prune_respects_budget_and_is_idempotent(
        body in prop::collection::vec("[a-z ]{0,20}", 0..400),
        header_lines in 0usize..8,
        extra in 1usize..300,
    ) {
        let header: Vec<String> = (0..header_lines).map(|i| format!("# H{i}")).collect();
        let mut text = header.join("\n");
        for line in &body {
            text.push('\n');
            text.push_str(line);
        }
        text.push('\n');
        let max_lines = header_lines + extra;

        let once = prune(&text, max_lines, header_lines, day());
        prop_assert!(once.text.lines().count() <= max_lines);
        for (kept, original) in once.text.lines().zip(text.lines()).take(header_lines) {
            prop_assert_eq!(kept, original);
        }

        let twice = prune(&once.text, max_lines, header_lines, day());
        prop_assert!(twice.is_noop());
        prop_assert_eq!(twice.text, once.text);
    }

    /// Classification depends only on the age and moves monotonically
    /// towards stale.
    #[test]
    fn classify_is_monotonic_in_age(age in 0i64..1000) {
        let now = day();
        let rank = |f: Freshness| match f {
            Freshness::Fresh => 0,
            Freshness::Aging => 1,
            Freshness::Stale => 2,
        };
        let younger = classify(Some(now - Duration::days(age)), now);
        let older = classify(Some(now - Duration::days(age + 1)), now);
        prop_assert!(rank(younger) <= rank(older));
        prop_assert_eq!(younger, classify(Some(now - Duration::days(age)), now));

        let expected = if age <= 30 {
            Freshness::Fresh
        } else if age <= 90 {
            Freshness::Aging
        } else {
            Freshness::Stale
        };
        prop_assert_eq!(younger, expected);
    }

    /// Adding a decision never lowers the arbitrated permission.
    #[test]
    fn arbitration_is_monotonic(
        base in prop::collection::vec(any::<u8>(), 0..8),
        added in any::<u8>(),
    ) {
        let before = arbitrate(base.iter().map(|p| decision(*p)));
        let after = arbitrate(
            base.iter().map(|p| decision(*p)).chain(std::iter::once(decision(added))),
        );
        prop_assert!(after.permission >= before.permission);
        prop_assert!(after.permission >= decision(added).permission);
        if base.is_empty() {
            prop_assert_eq!(before.permission, Permission::Allow);
        }
    }

    /// Any text scores within the rubric total.
    #[test]
    fn score_is_total_and_bounded(text in "\\PC*") {
        let report = score(&text);
        prop_assert_eq!(report.max_score, 100);
        prop_assert!(report.score <= report.max_score);
    }

    /// The buffer keeps the newest entries up to its capacity.
    #[test]
    fn buffer_keeps_newest_within_capacity(
        capacity in 1usize..50,
        count in 0usize..120,
    ) {
        let buffer = RingBuffer::new(capacity);
        for i in 0..count {
            buffer.append(&format!("warning {i}"));
        }
        prop_assert_eq!(buffer.len(), count.min(capacity));

        let flushed = buffer.flush();
        let first_kept = count.saturating_sub(capacity);
        let expected: Vec<String> = (first_kept..count).map(|i| format!("warning {i}")).collect();
        let messages: Vec<String> = flushed.into_iter().map(|e| e.message).collect();
        prop_assert_eq!(messages, expected);
        prop_assert!(buffer.is_empty());
    }
}
