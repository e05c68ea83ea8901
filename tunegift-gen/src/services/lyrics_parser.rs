//! Structured lyrics parser
//!
//! Converts a section-tagged lyrics string into an ordered sequence of typed
//! sections. Pure function: no I/O, deterministic on input. An empty result
//! means "malformed, needs regeneration" and is never an error.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Recognized section kinds. Intro and outro collapse into verse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Verse,
    PreChorus,
    Chorus,
    Bridge,
}

/// One tagged section of lyrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricsSection {
    pub kind: SectionKind,
    pub text: String,
}

fn bracket_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\[\]\n]{1,40})\]").expect("valid regex"))
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Tolerates heading drift like "Verse 1:", "(Chorus)", "chorus -"
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*[\(\[]?\s*(pre[\s_-]?chorus|verse|chorus|bridge|intro|outro)\b[^\n]{0,24}$")
            .expect("valid regex")
    })
}

/// Map a raw tag label to a section kind. Order matters: "pre-chorus"
/// contains "chorus".
fn classify_tag(tag: &str) -> Option<SectionKind> {
    let tag = tag.to_ascii_lowercase();
    if tag.contains("pre-chorus") || tag.contains("pre chorus") || tag.contains("prechorus") {
        Some(SectionKind::PreChorus)
    } else if tag.contains("chorus") {
        Some(SectionKind::Chorus)
    } else if tag.contains("bridge") {
        Some(SectionKind::Bridge)
    } else if tag.contains("verse") || tag.contains("intro") || tag.contains("outro") {
        Some(SectionKind::Verse)
    } else {
        None
    }
}

/// Parse section-tagged lyrics into ordered typed sections.
///
/// Primary strategy scans bracketed tag/content pairs in document order; if
/// that finds nothing, a fallback splits on bare heading lines to tolerate
/// formatting drift from the generation provider.
pub fn parse(raw: &str) -> Vec<LyricsSection> {
    let sections = parse_bracketed(raw);
    if !sections.is_empty() {
        return sections;
    }
    parse_headings(raw)
}

fn parse_bracketed(raw: &str) -> Vec<LyricsSection> {
    let matches: Vec<_> = bracket_re().find_iter(raw).collect();
    let mut sections = Vec::new();

    for (i, m) in matches.iter().enumerate() {
        let tag = &raw[m.start() + 1..m.end() - 1];
        let Some(kind) = classify_tag(tag) else {
            continue;
        };

        // Content runs to the next tag of any kind, recognized or not
        let end = matches.get(i + 1).map(|n| n.start()).unwrap_or(raw.len());
        let text = raw[m.end()..end].trim();
        if text.is_empty() {
            continue;
        }
        sections.push(LyricsSection { kind, text: text.to_string() });
    }

    sections
}

fn parse_headings(raw: &str) -> Vec<LyricsSection> {
    let mut sections = Vec::new();
    let mut current: Option<(SectionKind, Vec<&str>)> = None;

    for line in raw.lines() {
        let heading = heading_re()
            .captures(line)
            .and_then(|caps| caps.get(1))
            .and_then(|m| classify_tag(m.as_str()));

        match heading {
            Some(kind) => {
                if let Some((prev_kind, lines)) = current.take() {
                    push_section(&mut sections, prev_kind, &lines);
                }
                current = Some((kind, Vec::new()));
            }
            None => {
                if let Some((_, lines)) = current.as_mut() {
                    lines.push(line);
                }
            }
        }
    }

    if let Some((kind, lines)) = current {
        push_section(&mut sections, kind, &lines);
    }

    sections
}

fn push_section(sections: &mut Vec<LyricsSection>, kind: SectionKind, lines: &[&str]) {
    let text = lines.join("\n").trim().to_string();
    if !text.is_empty() {
        sections.push(LyricsSection { kind, text });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_tagged_sections_in_order() {
        let raw = "[Verse 1]\nWalking down the old dirt road\n\n[Pre-Chorus]\nHere it comes\n\n[Chorus]\nSing it loud for Maria\n\n[Verse 2]\nTen more years\n\n[Bridge]\nSlow it down";
        let sections = parse(raw);

        let kinds: Vec<_> = sections.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SectionKind::Verse,
                SectionKind::PreChorus,
                SectionKind::Chorus,
                SectionKind::Verse,
                SectionKind::Bridge,
            ]
        );
        assert_eq!(sections[0].text, "Walking down the old dirt road");
        assert_eq!(sections[2].text, "Sing it loud for Maria");
    }

    #[test]
    fn test_intro_and_outro_collapse_into_verse() {
        let raw = "[Intro]\nHumming softly\n[Chorus]\nThe big hook\n[Outro]\nFading out now";
        let sections = parse(raw);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].kind, SectionKind::Verse);
        assert_eq!(sections[2].kind, SectionKind::Verse);
    }

    #[test]
    fn test_pre_chorus_not_mistaken_for_chorus() {
        let sections = parse("[Pre Chorus]\nBuilding up\n[PreChorus]\nStill building");
        assert_eq!(sections.len(), 2);
        assert!(sections.iter().all(|s| s.kind == SectionKind::PreChorus));
    }

    #[test]
    fn test_unknown_tags_skipped_but_do_not_bleed_content() {
        let raw = "[Verse]\nReal lines\n[Producer Note]\nnot lyrics\n[Chorus]\nHook";
        let sections = parse(raw);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].text, "Real lines");
        assert_eq!(sections[1].text, "Hook");
    }

    #[test]
    fn test_no_tags_returns_empty_not_error() {
        // Caller must flag this for regeneration, not synthesize a song
        assert!(parse("Just a wall of text with no structure at all.").is_empty());
        assert!(parse("").is_empty());
    }

    #[test]
    fn test_fallback_heading_style() {
        let raw = "Verse 1:\nFirst lines here\n\nChorus:\nThe hook repeats\n\nBridge:\nChange of key";
        let sections = parse(raw);
        let kinds: Vec<_> = sections.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SectionKind::Verse, SectionKind::Chorus, SectionKind::Bridge]);
        assert_eq!(sections[1].text, "The hook repeats");
    }

    #[test]
    fn test_deterministic() {
        let raw = "[Verse]\nSame in\n[Chorus]\nSame out";
        assert_eq!(parse(raw), parse(raw));
    }
}
