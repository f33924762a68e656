//! Reads the model's free-text answer into an [`AnalysisResult`].
//!
//! The server asks the model for a fixed `LABEL: value` layout, but model output
//! drifts: markdown headings, bold labels, numbered asks, `7/10` style scores.
//! The parser is line-oriented and keyword-driven so it tolerates that drift.
//!
//! Tolerance policy:
//! - Decoration (`#`, bullets, numbering, `**`, `__`, backticks) is stripped first.
//! - A line is a label when the text before `:` (or before a trailing score)
//!   names a known topic in at most six words. Anything else is content.
//! - Scores accept `72`, `72/100`, `72%`, `7/10`, `72 out of 100`. Values that do
//!   not fit 0–100 are rejected, never clamped.
//! - A bare `Score:` outside any section is the overall score.
//! - Missing values default to 0 or empty lists. Without an overall score the
//!   outcome is `Unparsed`; nothing is invented.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::model::{
    AnalysisResult, ParseOutcome, ResumeScore, ResumeSection, SectionFeedback, UnparsedReason,
};

const MAX_LABEL_WORDS: usize = 6;

/// Largest scale accepted after `/` or `out of`.
const MAX_SCALE: f64 = 100.0;

// Numbers are captured whole (sign included) and range-checked afterwards.
static RE_LEADING_SCORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(-?\d+(?:\.\d+)?)\s*(?:(?:/|out\s+of)\s*(\d+(?:\.\d+)?)|(%))?")
        .unwrap()
});

static RE_SCALED_SCORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|[^\d.])(-?\d+(?:\.\d+)?)\s*(?:(?:/|out\s+of)\s*(\d+(?:\.\d+)?)|(%))")
        .unwrap()
});

static RE_NUMBERING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}[.)]\s+").unwrap());

/// Parses a model response. Never panics.
pub fn parse_analysis(text: &str) -> ParseOutcome {
    if text.trim().is_empty() {
        return ParseOutcome::Unparsed {
            raw_text: text.to_string(),
            reason: UnparsedReason::EmptyResponse,
        };
    }

    let mut parser = Parser::default();
    for raw in text.lines() {
        if let Some(line) = CleanLine::new(raw) {
            parser.feed(&line);
        }
    }

    match parser.finish() {
        Some(result) => ParseOutcome::Parsed(result),
        None => {
            debug!("Response had no overall score; returning it unparsed");
            ParseOutcome::Unparsed {
                raw_text: text.to_string(),
                reason: UnparsedReason::MissingOverallScore,
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Scores
// ────────────────────────────────────────────────────────────────────────────

struct ScoreMatch {
    value: u8,
    /// Written with an explicit scale (`/`, `%`, `out of`).
    scaled: bool,
}

fn to_percent(value: f64, scale: Option<f64>) -> Option<u8> {
    if value < 0.0 {
        return None;
    }
    let percent = match scale {
        Some(scale) if scale <= 0.0 || scale > MAX_SCALE || value > scale => return None,
        Some(scale) => value / scale * 100.0,
        None if value > 100.0 => return None,
        None => value,
    };
    Some(percent.round() as u8)
}

fn score_from_captures(caps: &regex::Captures<'_>) -> Option<ScoreMatch> {
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let scale = caps.get(2).and_then(|m| m.as_str().parse::<f64>().ok());
    let scaled = scale.is_some() || caps.get(3).is_some();
    Some(ScoreMatch {
        value: to_percent(value, scale)?,
        scaled,
    })
}

/// A score at the very start of `text`; bare numbers count.
fn leading_score(text: &str) -> Option<ScoreMatch> {
    RE_LEADING_SCORE
        .captures(text)
        .and_then(|caps| score_from_captures(&caps))
}

/// The first score anywhere in `text` that carries an explicit scale.
fn scaled_score(text: &str) -> Option<u8> {
    RE_SCALED_SCORE
        .captures_iter(text)
        .find_map(|caps| score_from_captures(&caps))
        .map(|m| m.value)
}

fn is_bare_number(text: &str) -> bool {
    let t = text.trim_end_matches('.');
    !t.is_empty() && t.chars().all(|c| c.is_ascii_digit())
}

// ────────────────────────────────────────────────────────────────────────────
// Lines and labels
// ────────────────────────────────────────────────────────────────────────────

struct CleanLine {
    text: String,
    heading: bool,
    numbered: bool,
    bulleted: bool,
    bold: bool,
    all_caps: bool,
}

impl CleanLine {
    fn new(raw: &str) -> Option<Self> {
        let mut s = raw.trim();
        if s.is_empty() || s.starts_with("```") {
            return None;
        }

        let heading = s.starts_with('#');
        s = s.trim_start_matches('#').trim_start();

        let bold = s.starts_with("**") || s.starts_with("__");
        let unemphasized = s.replace("**", "").replace("__", "").replace('`', "");
        let mut s = unemphasized.trim();

        let mut bulleted = false;
        for marker in ["- ", "* ", "• ", "+ ", "– "] {
            if let Some(rest) = s.strip_prefix(marker) {
                s = rest.trim_start();
                bulleted = true;
                break;
            }
        }

        let numbered = RE_NUMBERING.is_match(s);
        if numbered {
            s = RE_NUMBERING.find(s).map(|m| &s[m.end()..]).unwrap_or(s);
        }

        let text = s.trim().to_string();
        if text.is_empty() {
            return None;
        }
        let all_caps = text.chars().any(|c| c.is_alphabetic())
            && !text.chars().any(|c| c.is_lowercase());

        Some(Self {
            text,
            heading,
            numbered,
            bulleted,
            bold,
            all_caps,
        })
    }

    fn listed(&self) -> bool {
        self.bulleted || self.numbered
    }

    /// Looks like a top-level heading rather than a sub-label inside a section.
    fn top_level(&self) -> bool {
        self.heading || self.all_caps || self.numbered
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelKind {
    Overall,
    KeywordMatch,
    MissingKeywords,
    MissingSkills,
    Ignored,
    Container,
    Tips,
    Suggestions,
    Section(ResumeSection),
    Score,
}

struct Label {
    kind: LabelKind,
    rest: String,
    score: Option<u8>,
}

fn words_of(label: &str) -> Vec<String> {
    label
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

fn classify(label: &str) -> Option<LabelKind> {
    let lower = label.to_lowercase();
    let words = words_of(label);
    if words.is_empty() || words.len() > MAX_LABEL_WORDS {
        return None;
    }
    let has = |stems: &[&str]| words.iter().any(|w| stems.iter().any(|s| w.starts_with(s)));

    let kind = if has(&["missing", "lacking", "gap"]) {
        if has(&["keyword"]) {
            LabelKind::MissingKeywords
        } else {
            LabelKind::MissingSkills
        }
    } else if has(&["matched", "strength", "weakness", "present", "found"]) {
        LabelKind::Ignored
    } else if lower.contains("section-by-section") || lower.contains("section by section") {
        LabelKind::Container
    } else if has(&["overall"]) {
        LabelKind::Overall
    } else if has(&["keyword"]) {
        LabelKind::KeywordMatch
    } else if words.iter().any(|w| w == "tip" || w == "tips") {
        LabelKind::Tips
    } else if has(&["suggest", "improv", "recommend"]) {
        LabelKind::Suggestions
    } else if has(&["experience", "employment"]) {
        LabelKind::Section(ResumeSection::Experience)
    } else if has(&["skill"]) {
        LabelKind::Section(ResumeSection::Skills)
    } else if has(&["educat", "academic"]) {
        LabelKind::Section(ResumeSection::Education)
    } else if has(&["project"]) {
        LabelKind::Section(ResumeSection::Projects)
    } else if has(&["score", "rating", "match"]) {
        LabelKind::Score
    } else if has(&["summary", "analysis", "assessment", "feedback"]) {
        LabelKind::Ignored
    } else {
        return None;
    };
    Some(kind)
}

fn is_decoration(c: char) -> bool {
    c.is_whitespace() || matches!(c, '*' | '_' | '-' | '–' | '(' | '=' | '|')
}

/// Trims decoration around a label or value. A `-` directly before a digit is
/// a sign and stays.
fn trim_decoration(s: &str) -> &str {
    let mut rest = s;
    while let Some(c) = rest.chars().next() {
        let after = &rest[c.len_utf8()..];
        if !is_decoration(c) || (c == '-' && after.starts_with(|d: char| d.is_ascii_digit())) {
            break;
        }
        rest = after;
    }
    rest.trim_end_matches(is_decoration)
}

/// Splits `Label (80/100): rest` into its parts. A number in the label is
/// only accepted as a score when written with a scale.
fn split_label(line: &CleanLine) -> Option<Label> {
    let text = line.text.as_str();

    if let Some(idx) = text.find(':') {
        let (head, rest) = (&text[..idx], &text[idx + 1..]);
        let (name, score) = match head.find(|c: char| c.is_ascii_digit()) {
            Some(d) => (&head[..d], scaled_score(head)),
            None => (head, None),
        };
        if let Some(kind) = classify(trim_decoration(name)) {
            return Some(Label {
                kind,
                rest: trim_decoration(rest).to_string(),
                score,
            });
        }
        return None;
    }

    if let Some(d) = text.find(|c: char| c.is_ascii_digit()) {
        let (name, rest) = (trim_decoration(&text[..d]), &text[d..]);
        if let Some(score) = leading_score(rest).filter(|m| m.scaled) {
            if let Some(kind) = classify(name) {
                return Some(Label {
                    kind,
                    rest: String::new(),
                    score: Some(score.value),
                });
            }
        }
    }

    if line.heading || line.numbered || line.bold || line.all_caps {
        return classify(trim_decoration(text)).map(|kind| Label {
            kind,
            rest: String::new(),
            score: None,
        });
    }

    None
}

// ────────────────────────────────────────────────────────────────────────────
// Parser state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Topic {
    None,
    Overall,
    Keywords,
    Section(ResumeSection),
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListTarget {
    MissingFields,
    Tips,
    SectionSuggestions(ResumeSection),
    SectionKeywords(ResumeSection),
    Ignore,
}

impl ListTarget {
    fn splits_on_commas(&self) -> bool {
        matches!(
            self,
            ListTarget::MissingFields | ListTarget::SectionKeywords(_)
        )
    }
}

#[derive(Debug, Default)]
struct SectionDraft {
    seen: bool,
    score: Option<u8>,
    suggestions: Vec<String>,
    missing_keywords: Vec<String>,
}

struct Parser {
    overall: Option<u8>,
    keywords: Option<u8>,
    sections: [SectionDraft; 4],
    missing_fields: Vec<String>,
    tips: Vec<String>,
    topic: Topic,
    list: Option<ListTarget>,
    /// The list was opened by an explicit label, so plain lines belong to it too.
    list_explicit: bool,
}

impl Default for Parser {
    fn default() -> Self {
        Self {
            overall: None,
            keywords: None,
            sections: Default::default(),
            missing_fields: Vec::new(),
            tips: Vec::new(),
            topic: Topic::None,
            list: None,
            list_explicit: false,
        }
    }
}

fn section_index(section: ResumeSection) -> usize {
    match section {
        ResumeSection::Experience => 0,
        ResumeSection::Skills => 1,
        ResumeSection::Education => 2,
        ResumeSection::Projects => 3,
    }
}

fn set_once(slot: &mut Option<u8>, value: Option<u8>) {
    if slot.is_none() {
        *slot = value;
    }
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    let item = item
        .trim()
        .trim_end_matches(|c| matches!(c, '.' | ';' | ','))
        .trim();
    let lower = item.to_lowercase();
    let placeholder = item.starts_with('<') && item.ends_with('>');
    if item.is_empty()
        || placeholder
        || matches!(lower.as_str(), "none" | "n/a" | "na" | "nothing" | "-")
        || list.iter().any(|existing| existing.to_lowercase() == lower)
    {
        return;
    }
    list.push(item.to_string());
}

impl Parser {
    fn section(&mut self, section: ResumeSection) -> &mut SectionDraft {
        &mut self.sections[section_index(section)]
    }

    fn current_section(&self) -> Option<ResumeSection> {
        match self.topic {
            Topic::Section(s) => Some(s),
            _ => None,
        }
    }

    fn close_list(&mut self) {
        self.list = None;
        self.list_explicit = false;
    }

    fn open_list(&mut self, target: ListTarget, explicit: bool, inline: &str) {
        self.list = Some(target);
        self.list_explicit = explicit;
        if !inline.is_empty() {
            self.push_items(target, inline);
        }
    }

    fn push_items(&mut self, target: ListTarget, text: &str) {
        let list = match target {
            ListTarget::MissingFields => &mut self.missing_fields,
            ListTarget::Tips => &mut self.tips,
            ListTarget::SectionSuggestions(s) => &mut self.section(s).suggestions,
            ListTarget::SectionKeywords(s) => &mut self.section(s).missing_keywords,
            ListTarget::Ignore => return,
        };
        if target.splits_on_commas() {
            for item in text.split(|c| c == ',' || c == ';') {
                push_unique(list, item);
            }
        } else {
            push_unique(list, text);
        }
    }

    fn score_from(label: &Label) -> Option<u8> {
        label.score.or_else(|| {
            leading_score(&label.rest)
                .map(|m| m.value)
                .or_else(|| scaled_score(&label.rest))
        })
    }

    fn feed(&mut self, line: &CleanLine) {
        if let Some(label) = split_label(line) {
            // `- Skills: Docker` under an explicit list is an item, not a new section.
            let in_explicit_list =
                self.list.is_some() && self.list_explicit && line.listed() && !line.heading;
            let is_item = in_explicit_list
                && matches!(label.kind, LabelKind::Section(_))
                && Self::score_from(&label).is_none();
            if !is_item {
                self.apply_label(line, &label);
                return;
            }
        }
        self.apply_content(line);
    }

    fn apply_label(&mut self, line: &CleanLine, label: &Label) {
        let score = Self::score_from(label);
        let in_section = self.current_section().filter(|_| !line.top_level());

        match label.kind {
            LabelKind::Overall => {
                self.topic = Topic::Overall;
                self.close_list();
                set_once(&mut self.overall, score);
            }
            LabelKind::KeywordMatch => {
                self.topic = Topic::Keywords;
                self.close_list();
                set_once(&mut self.keywords, score);
            }
            LabelKind::MissingKeywords => {
                let section = in_section.unwrap_or(ResumeSection::Skills);
                self.open_list(ListTarget::SectionKeywords(section), true, &label.rest);
            }
            LabelKind::MissingSkills => match in_section {
                Some(section) => {
                    self.open_list(ListTarget::SectionKeywords(section), true, &label.rest)
                }
                None => {
                    self.topic = Topic::Other;
                    self.open_list(ListTarget::MissingFields, true, &label.rest);
                }
            },
            LabelKind::Ignored => {
                if line.heading {
                    self.topic = Topic::Other;
                }
                self.open_list(ListTarget::Ignore, true, "");
            }
            LabelKind::Container => {
                self.topic = Topic::None;
                self.close_list();
            }
            LabelKind::Suggestions if in_section.is_some() => {
                if let Some(section) = in_section {
                    self.open_list(ListTarget::SectionSuggestions(section), true, &label.rest);
                }
            }
            LabelKind::Tips | LabelKind::Suggestions => {
                self.topic = Topic::Other;
                self.open_list(ListTarget::Tips, true, &label.rest);
            }
            LabelKind::Section(section) => {
                self.topic = Topic::Section(section);
                let draft = self.section(section);
                draft.seen = true;
                set_once(&mut draft.score, score);
                self.open_list(ListTarget::SectionSuggestions(section), false, "");
            }
            LabelKind::Score => match self.topic {
                Topic::Section(section) => set_once(&mut self.section(section).score, score),
                Topic::Keywords => set_once(&mut self.keywords, score),
                Topic::None | Topic::Overall | Topic::Other => set_once(&mut self.overall, score),
            },
        }
    }

    fn apply_content(&mut self, line: &CleanLine) {
        if let Some(target) = self.list {
            if line.listed() || self.list_explicit {
                self.push_items(target, &line.text);
                return;
            }
        }

        // A score on its own line under a heading that announced one.
        let slot = match self.topic {
            Topic::Overall => &mut self.overall,
            Topic::Keywords => &mut self.keywords,
            Topic::Section(section) => &mut self.sections[section_index(section)].score,
            Topic::None | Topic::Other => return,
        };
        if slot.is_some() {
            return;
        }
        let standalone = leading_score(&line.text)
            .filter(|m| m.scaled || is_bare_number(&line.text))
            .map(|m| m.value);
        *slot = standalone.or_else(|| scaled_score(&line.text));
    }

    fn finish(mut self) -> Option<AnalysisResult> {
        let overall = self.overall?;

        let score_of = |s: ResumeSection| self.sections[section_index(s)].score.unwrap_or(0);
        let score = ResumeScore {
            overall,
            keywords: self.keywords.unwrap_or(0),
            experience: score_of(ResumeSection::Experience),
            education: score_of(ResumeSection::Education),
            skills: score_of(ResumeSection::Skills),
        };

        let mut feedback = Vec::new();
        for section in ResumeSection::REQUIRED {
            feedback.push(self.build_section(section));
        }
        if self.section(ResumeSection::Projects).seen {
            feedback.push(self.build_section(ResumeSection::Projects));
        }

        Some(AnalysisResult {
            score,
            feedback,
            missing_fields: self.missing_fields,
            improvement_tips: self.tips,
        })
    }

    fn build_section(&mut self, section: ResumeSection) -> SectionFeedback {
        let draft = std::mem::take(self.section(section));
        SectionFeedback {
            section: section.label().to_string(),
            score: draft.score.unwrap_or(0),
            suggestions: draft.suggestions,
            missing_keywords: draft.missing_keywords,
        }
    }
}
