//! Data contracts shared by the parser, the session controller and callers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Score breakdown. Every field is in `0..=100`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeScore {
    pub overall: u8,
    pub keywords: u8,
    pub experience: u8,
    pub education: u8,
    pub skills: u8,
}

/// Resume sections the analysis reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResumeSection {
    Experience,
    Skills,
    Education,
    Projects,
}

impl ResumeSection {
    /// Sections that are always present in a parsed result, in display order.
    pub const REQUIRED: [ResumeSection; 3] = [
        ResumeSection::Experience,
        ResumeSection::Skills,
        ResumeSection::Education,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ResumeSection::Experience => "Experience",
            ResumeSection::Skills => "Skills",
            ResumeSection::Education => "Education",
            ResumeSection::Projects => "Projects",
        }
    }
}

impl fmt::Display for ResumeSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionFeedback {
    pub section: String,
    pub score: u8,
    pub suggestions: Vec<String>,
    pub missing_keywords: Vec<String>,
}

impl SectionFeedback {
    pub fn empty(section: ResumeSection) -> Self {
        Self {
            section: section.label().to_string(),
            score: 0,
            suggestions: Vec::new(),
            missing_keywords: Vec::new(),
        }
    }
}

/// Structured analysis. Built once by the parser, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub score: ResumeScore,
    pub feedback: Vec<SectionFeedback>,
    pub missing_fields: Vec<String>,
    pub improvement_tips: Vec<String>,
}

impl AnalysisResult {
    pub fn section(&self, section: ResumeSection) -> Option<&SectionFeedback> {
        self.feedback.iter().find(|f| f.section == section.label())
    }
}

/// Why a response could not be turned into an [`AnalysisResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnparsedReason {
    EmptyResponse,
    MissingOverallScore,
}

impl fmt::Display for UnparsedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnparsedReason::EmptyResponse => f.write_str("the response was empty"),
            UnparsedReason::MissingOverallScore => {
                f.write_str("no overall match score was found in the response")
            }
        }
    }
}

/// Parser output. `Unparsed` keeps the raw text so it can still be shown,
/// instead of presenting invented numbers as a real analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ParseOutcome {
    Parsed(AnalysisResult),
    Unparsed {
        raw_text: String,
        reason: UnparsedReason,
    },
}

impl ParseOutcome {
    pub fn is_parsed(&self) -> bool {
        matches!(self, ParseOutcome::Parsed(_))
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            ParseOutcome::Parsed(result) => Some(result),
            ParseOutcome::Unparsed { .. } => None,
        }
    }
}
