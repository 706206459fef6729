//! Decision response parser.
//!
//! The reasoning service is asked for `DECISION: true|false` followed by
//! `CRITERIA: <analysis>`, but its output is free-form natural language and
//! drifts under load, model updates, and adversarial tree content. This
//! parser is the containment layer: a pure function that always produces a
//! decision, and always fails closed — an uninterpretable answer is never
//! treated as actionable.
//!
//! Priority order:
//! 1. An explicit `DECISION:` marker followed by true/false wins.
//! 2. A `CRITERIA:` marker yields the rationale; the decision defaults to
//!    false.
//! 3. Otherwise the lowercased text is scanned for exactly one of the
//!    tokens `true`/`false` without the other; anything ambiguous or
//!    absent is false.

const DECISION_MARKER: &str = "DECISION:";
const CRITERIA_MARKER: &str = "CRITERIA:";

/// A parsed `{decision, rationale}` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDecision {
    pub decision: bool,
    /// Text after the criteria marker when present, the full trimmed
    /// response otherwise.
    pub rationale: String,
}

/// Parse a raw reasoning response. Pure — no I/O, no state.
pub fn parse(raw: &str) -> ParsedDecision {
    let rationale = match split_after(raw, CRITERIA_MARKER) {
        Some(rest) => rest.trim().to_string(),
        None => raw.trim().to_string(),
    };

    if let Some(rest) = split_after(raw, DECISION_MARKER) {
        let value = rest.trim_start().to_lowercase();
        if value.starts_with("true") {
            return ParsedDecision {
                decision: true,
                rationale,
            };
        }
        if value.starts_with("false") {
            return ParsedDecision {
                decision: false,
                rationale,
            };
        }
        // Marker present but no readable value: fall through to the scans
    }

    if raw.contains(CRITERIA_MARKER) {
        // Rationale marker without a decision marker: fail closed
        return ParsedDecision {
            decision: false,
            rationale,
        };
    }

    let lower = raw.to_lowercase();
    let has_true = contains_token(&lower, "true");
    let has_false = contains_token(&lower, "false");

    ParsedDecision {
        decision: has_true && !has_false,
        rationale,
    }
}

fn split_after<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    text.find(marker).map(|idx| &text[idx + marker.len()..])
}

/// Word-level scan: "untrue" must not read as "true".
fn contains_token(lower: &str, token: &str) -> bool {
    lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| word == token)
}
