//! Heuristic classification of free-text gateway failure reasons.
//!
//! The gateway reports run failures as unstructured text, so cooldown
//! detection is substring matching plus a duration parse. A cooldown that
//! matches none of the known phrasings degrades to a hard failure; that
//! false-negative direction is an accepted limitation of the protocol.

use std::sync::OnceLock;

use regex::Regex;

use crate::bridge_config::DEFAULT_COOLDOWN_WAIT_MS;

const COOLDOWN_MARKERS: [&str; 3] = ["cooldown", "rate limit", "too many requests"];

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates supported `AgentFailureKind` values.
pub enum AgentFailureKind {
    /// Transient availability problem; retry after `wait_ms`.
    Cooldown { wait_ms: u64 },
    /// Unrecoverable run failure; the raw text becomes the failure reason.
    Hard { reason: String },
}

fn cooldown_duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(\d+)\s*(second|minute|hour)s?").expect("valid cooldown pattern")
    })
}

/// Classifies a gateway failure reason. Pure; no store or clock access.
pub fn classify_agent_failure(error_text: &str) -> AgentFailureKind {
    let lowered = error_text.to_lowercase();
    let is_cooldown = COOLDOWN_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker));
    if !is_cooldown {
        return AgentFailureKind::Hard {
            reason: error_text.to_string(),
        };
    }
    AgentFailureKind::Cooldown {
        wait_ms: parse_cooldown_wait_ms(error_text).unwrap_or(DEFAULT_COOLDOWN_WAIT_MS),
    }
}

/// Parses a `<number> <second|minute|hour>` duration out of the error text.
fn parse_cooldown_wait_ms(error_text: &str) -> Option<u64> {
    let captures = cooldown_duration_pattern().captures(error_text)?;
    let amount: u64 = captures.get(1)?.as_str().parse().ok()?;
    let unit_ms = match captures.get(2)?.as_str().to_lowercase().as_str() {
        "second" => 1_000,
        "minute" => 60_000,
        "hour" => 3_600_000,
        _ => return None,
    };
    Some(amount.saturating_mul(unit_ms))
}
