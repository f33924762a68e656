//! Builds the one analysis prompt sent per request: resume text, job
//! description, the asks and the response layout the client parses.

use crate::llm_client::prompts::RESPONSE_FORMAT_INSTRUCTION;

const ANALYSIS_PREAMBLE: &str =
    "Analyze this resume against the following job description and provide detailed feedback:";

const ANALYSIS_ASKS: &str = "\
Please provide:
1. Overall match score (0-100)
2. Keyword match analysis
3. Missing key skills or qualifications
4. Specific improvement suggestions
5. Section-by-section analysis (Experience, Skills, Education)";

/// Builds the analysis prompt. Pure: same inputs, same output.
///
/// User text is embedded as-is, so placeholder-looking strings inside a resume
/// are never substituted.
pub fn build_analysis_prompt(resume_text: &str, job_description: &str) -> String {
    format!(
        "{ANALYSIS_PREAMBLE}\n\n\
         Resume Content:\n{resume}\n\n\
         Job Description:\n{jd}\n\n\
         {ANALYSIS_ASKS}\n\n\
         {RESPONSE_FORMAT_INSTRUCTION}",
        resume = resume_text.trim(),
        jd = job_description.trim(),
    )
}
