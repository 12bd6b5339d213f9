//! Plain-text transcript extraction from a captions VTT (§4.3).

use regex::Regex;
use std::sync::OnceLock;

fn cue_timing_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-->").unwrap())
}

fn numeric_cue_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+$").unwrap())
}

/// Drop the `WEBVTT` header, cue-timing lines, bare numeric cue ids and
/// blank lines, then join what's left with single spaces.
pub fn parse_vtt_to_text(vtt: &str) -> String {
    let mut words = Vec::new();

    for line in vtt.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("WEBVTT") {
            continue;
        }
        if line.starts_with("NOTE") {
            continue;
        }
        if cue_timing_re().is_match(line) {
            continue;
        }
        if numeric_cue_id_re().is_match(line) {
            continue;
        }
        words.push(line);
    }

    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_header_cues_and_timings() {
        let vtt = "WEBVTT\n\n1\n00:00:00.000 --> 00:00:02.000\nHello there\n\n2\n00:00:02.000 --> 00:00:04.000\ngeneral kenobi\n";
        assert_eq!(parse_vtt_to_text(vtt), "Hello there general kenobi");
    }

    #[test]
    fn strips_note_lines() {
        let vtt = "WEBVTT\nNOTE rewind-seek-v1 interval=30 size=96x54 grid=12x10\n\n1\n00:00:00.000 --> 00:00:01.000\nonly this\n";
        assert_eq!(parse_vtt_to_text(vtt), "only this");
    }

    #[test]
    fn empty_input_yields_empty_string() {
        assert_eq!(parse_vtt_to_text("WEBVTT\n\n"), "");
    }
}
