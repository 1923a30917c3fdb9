//! Output quality scoring
//!
//! Scores a markdown artifact against a fixed weighted rubric. Scoring is
//! pure; [`apply_trailer`] writes the report back as a trailing metadata
//! block that is replaced, never duplicated, on rescoring.

use chrono::NaiveDate;
use lazy_regex::lazy_regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// First line of the trailing quality block
pub const TRAILER_OPEN: &str = "<!-- forge-quality";
const TRAILER_CLOSE: &str = "-->";

/// Filename prefixes recognised as artifact kinds
const KIND_PREFIXES: &[&str] = &[
    "analysis",
    "audit",
    "design",
    "documentation",
    "implementation",
    "investigation",
    "plan",
    "report",
    "research",
    "review",
    "summary",
    "test",
];

/// Letter grade derived from the score ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    /// 90% and above
    A,
    /// 80% and above
    B,
    /// 70% and above
    C,
    /// 60% and above
    D,
    /// Below 60%
    F,
}

impl Grade {
    /// Grade for `score` out of `max_score`.
    #[must_use]
    pub fn from_score(score: u32, max_score: u32) -> Self {
        if max_score == 0 {
            return Self::F;
        }
        // Integer percent avoids float edge cases at the thresholds.
        let percent = score.saturating_mul(100) / max_score;
        if percent >= 90 {
            Self::A
        } else if percent >= 80 {
            Self::B
        } else if percent >= 70 {
            Self::C
        } else if percent >= 60 {
            Self::D
        } else {
            Self::F
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        };
        f.write_str(letter)
    }
}

/// Rubric category a check belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Expected sections are present
    Completeness,
    /// The reader is told what to do
    Actionability,
    /// Markdown structure and richness
    Formatting,
    /// Filename conventions
    Naming,
}

impl Category {
    const fn label(self) -> &'static str {
        match self {
            Self::Completeness => "Completeness",
            Self::Actionability => "Actionability",
            Self::Formatting => "Formatting",
            Self::Naming => "Naming",
        }
    }
}

/// Result of scoring one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Points awarded
    pub score: u32,
    /// Points available
    pub max_score: u32,
    /// Letter grade
    pub grade: Grade,
    /// One line per check that missed full marks
    pub feedback: Vec<String>,
}

struct Check {
    category: Category,
    points: u32,
    missing: &'static str,
    award: fn(&Artifact<'_>) -> u32,
}

/// Pre-computed facts the checks look at
struct Artifact<'a> {
    file_name: Option<&'a str>,
    headings: Vec<&'a str>,
    list_items: usize,
    words: usize,
    action_words: usize,
    body: &'a str,
}

impl<'a> Artifact<'a> {
    fn new(file_name: Option<&'a str>, body: &'a str) -> Self {
        static RE_LIST_ITEM: lazy_regex::Lazy<regex::Regex> =
            lazy_regex!(r"^\s*(?:[-*+]|\d+[.)])\s+\S");
        static RE_ACTION_WORD: lazy_regex::Lazy<regex::Regex> = lazy_regex!(
            r"(?i)\b(add|implement\w*|fix\w*|remov\w*|updat\w*|refactor\w*|configur\w*|migrat\w*|replac\w*|investigat\w*|review\w*|set up|document\w*|test\w*|monitor\w*|enabl\w*|disabl\w*|upgrad\w*|verif\w*)\b"
        );

        let headings = body
            .lines()
            .filter_map(|line| {
                let trimmed = line.trim_start();
                let hashes = trimmed.chars().take_while(|c| *c == '#').count();
                if (1..=6).contains(&hashes) && trimmed[hashes..].starts_with(' ') {
                    Some(trimmed[hashes..].trim())
                } else {
                    None
                }
            })
            .collect();

        Self {
            file_name,
            headings,
            list_items: body.lines().filter(|l| RE_LIST_ITEM.is_match(l)).count(),
            words: body.split_whitespace().count(),
            action_words: RE_ACTION_WORD.find_iter(body).count(),
            body,
        }
    }

    fn has_title(&self) -> bool {
        self.body
            .lines()
            .any(|line| line.starts_with("# ") && line.len() > 2)
    }

    fn heading_mentions(&self, needles: &[&str]) -> bool {
        self.headings.iter().any(|heading| {
            let heading = heading.to_lowercase();
            needles.iter().any(|needle| heading.contains(needle))
        })
    }
}

const RUBRIC: &[Check] = &[
    Check {
        category: Category::Completeness,
        points: 10,
        missing: "missing a top-level title heading (# Title)",
        award: |a| if a.has_title() { 10 } else { 0 },
    },
    Check {
        category: Category::Completeness,
        points: 10,
        missing: "missing a summary or overview section",
        award: |a| {
            if a.heading_mentions(&["summary", "overview", "tl;dr", "executive"]) {
                10
            } else {
                0
            }
        },
    },
    Check {
        category: Category::Completeness,
        points: 10,
        missing: "missing a findings or details section",
        award: |a| {
            if a.heading_mentions(&[
                "finding",
                "detail",
                "analysis",
                "result",
                "issue",
                "observation",
            ]) {
                10
            } else {
                0
            }
        },
    },
    Check {
        category: Category::Actionability,
        points: 10,
        missing: "missing a recommendations or action items section",
        award: |a| {
            if a.heading_mentions(&["recommendation", "action", "next step", "todo", "plan"]) {
                10
            } else {
                0
            }
        },
    },
    Check {
        category: Category::Actionability,
        points: 10,
        missing: "fewer than 3 list or checklist items",
        award: |a| match a.list_items {
            0 => 0,
            1 | 2 => 5,
            _ => 10,
        },
    },
    Check {
        category: Category::Actionability,
        points: 10,
        missing: "little actionable vocabulary (add, fix, implement, ...)",
        award: |a| {
            if a.words == 0 || a.action_words == 0 {
                0
            } else if a.action_words.saturating_mul(100) >= a.words {
                // At least one actionable verb per 100 words.
                10
            } else {
                5
            }
        },
    },
    Check {
        category: Category::Formatting,
        points: 10,
        missing: "fewer than 3 section headings",
        award: |a| match a.headings.len() {
            0 => 0,
            1 | 2 => 5,
            _ => 10,
        },
    },
    Check {
        category: Category::Formatting,
        points: 10,
        missing: "no code spans, tables or links",
        award: |a| {
            static RE_LINK: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"\[[^\]]+\]\([^)]+\)");
            static RE_TABLE_ROW: lazy_regex::Lazy<regex::Regex> =
                lazy_regex!(r"(?m)^\s*\|.*\|\s*$");
            let kinds = [
                a.body.contains('`'),
                RE_TABLE_ROW.is_match(a.body),
                RE_LINK.is_match(a.body),
            ]
            .iter()
            .filter(|present| **present)
            .count();
            match kinds {
                0 => 0,
                1 => 5,
                _ => 10,
            }
        },
    },
    Check {
        category: Category::Formatting,
        points: 5,
        missing: "no emphasis (**bold** or _italic_)",
        award: |a| {
            static RE_EMPHASIS: lazy_regex::Lazy<regex::Regex> =
                lazy_regex!(r"\*\*[^*\n]+\*\*|__[^_\n]+__|\b_[^_\n]+_\b");
            if RE_EMPHASIS.is_match(a.body) {
                5
            } else {
                0
            }
        },
    },
    Check {
        category: Category::Naming,
        points: 10,
        missing: "filename is not kebab-case markdown (my-report.md)",
        award: |a| {
            static RE_KEBAB_MD: lazy_regex::Lazy<regex::Regex> =
                lazy_regex!(r"^[a-z0-9]+(?:-[a-z0-9]+)*\.md$");
            match a.file_name {
                Some(name) if RE_KEBAB_MD.is_match(name) => 10,
                _ => 0,
            }
        },
    },
    Check {
        category: Category::Naming,
        points: 5,
        missing: "filename does not start with a known kind (analysis-, review-, ...)",
        award: |a| match a.file_name {
            Some(name) if KIND_PREFIXES.iter().any(|kind| name.starts_with(kind)) => 5,
            _ => 0,
        },
    },
];

/// Maximum obtainable score.
#[must_use]
pub fn max_score() -> u32 {
    RUBRIC.iter().map(|check| check.points).sum()
}

/// Score text with no filename (naming checks score zero).
#[must_use]
pub fn score(text: &str) -> QualityReport {
    score_named(None, text)
}

/// Score text, taking naming checks from `file_name` (base name only).
///
/// A previously appended trailer is ignored, so rescoring an artifact
/// yields the same report.
#[must_use]
pub fn score_named(file_name: Option<&str>, text: &str) -> QualityReport {
    let artifact = Artifact::new(file_name, strip_trailer(text));

    let mut total = 0u32;
    let mut feedback = Vec::new();
    for check in RUBRIC {
        let awarded = (check.award)(&artifact).min(check.points);
        total += awarded;
        if awarded < check.points {
            feedback.push(format!(
                "{} ({awarded}/{}): {}",
                check.category.label(),
                check.points,
                check.missing
            ));
        }
    }

    let max = max_score();
    QualityReport {
        score: total,
        max_score: max,
        grade: Grade::from_score(total, max),
        feedback,
    }
}

/// Text with any trailing quality block removed.
#[must_use]
pub fn strip_trailer(text: &str) -> &str {
    let Some(start) = text.rfind(TRAILER_OPEN) else {
        return text;
    };

    // Only a block that runs to the end of the text is ours; a marker
    // quoted mid-document is content.
    let tail = &text[start..];
    let closes_at_end = tail
        .find(TRAILER_CLOSE)
        .is_some_and(|close| tail[close + TRAILER_CLOSE.len()..].trim().is_empty());
    if !closes_at_end {
        return text;
    }

    let head = &text[..start];
    head.strip_suffix('\n').unwrap_or(head)
}

/// Render the trailing block for a report.
#[must_use]
pub fn render_trailer(report: &QualityReport, scored_on: NaiveDate) -> String {
    format!(
        "{TRAILER_OPEN}\nscore: {}/{}\ngrade: {}\nscored: {}\n{TRAILER_CLOSE}",
        report.score,
        report.max_score,
        report.grade,
        scored_on.format("%Y-%m-%d")
    )
}

/// Replace (or add) the trailing quality block.
#[must_use]
pub fn apply_trailer(text: &str, report: &QualityReport, scored_on: NaiveDate) -> String {
    let body = strip_trailer(text).trim_end_matches('\n');
    format!("{body}\n\n{}\n", render_trailer(report, scored_on))
}
