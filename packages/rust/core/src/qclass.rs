//! Question class detection (FITB, common bonds, anagram, ...).

use std::sync::LazyLock;

use deepqa_shared::{BlankSpan, FitbAnnotations, QType};
use regex::Regex;

static BLANK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_+").expect("valid regex"));

static QUOTATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:[^"\r\n\s]+\b[:;?!,.]?\s*){3,}""#).expect("valid regex")
});

/// Classify a clue. FITB annotations are returned alongside the class and are
/// empty unless the class is [`QType::Fitb`].
///
/// Priority: FITB, common bonds, anagram, before & after, quotation, factoid.
pub fn classify(raw_text: &str, category: &str) -> (QType, FitbAnnotations) {
    if let Some(fitb) = fitb_annotations(raw_text) {
        return (QType::Fitb, fitb);
    }

    let category = category.to_uppercase();
    let qtype = if category.contains("COMMON BONDS") {
        QType::CommonBonds
    } else if ["ANAGRAM", "SCRAMBLED", "JUMBLED"]
        .iter()
        .any(|k| category.contains(k))
    {
        QType::Anagram
    } else if category.contains("BEFORE & AFTER") {
        QType::BeforeAndAfter
    } else if QUOTATION_RE.is_match(raw_text) {
        QType::Quotation
    } else {
        QType::Factoid
    };
    (qtype, FitbAnnotations::default())
}

/// Locate blanks and the quoted sections around them.
///
/// Section 1 runs from the last `"` before the first blank (or the start) up
/// to the first blank. Section 2 runs from the end of the last blank through
/// the next `"` (or the end of the text).
fn fitb_annotations(raw: &str) -> Option<FitbAnnotations> {
    let blanks: Vec<BlankSpan> = BLANK_RE
        .find_iter(raw)
        .map(|m| BlankSpan {
            begin: m.start(),
            end: m.end(),
        })
        .collect();
    let first = *blanks.first()?;
    let last = *blanks.last()?;

    let section1_begin = raw[..first.begin].rfind('"').unwrap_or(0);
    let section2_end = raw[last.end..]
        .find('"')
        .map(|i| last.end + i + 1)
        .unwrap_or(raw.len());

    Some(FitbAnnotations {
        blanks,
        section1: (section1_begin, first.begin),
        section2: (last.end, section2_end),
    })
}
