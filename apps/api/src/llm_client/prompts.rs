// Shared prompt fragments. Feature modules assemble their own prompts
// (see analysis/prompts.rs) and reuse these pieces.

/// Liveness probe sent by `GET /test-api`.
pub const PROBE_PROMPT: &str = "Test: What is 2+2?";

/// Appended to analysis prompts so the answer is machine-readable.
/// The client-side parser understands this layout first and tolerates drift from it.
pub const RESPONSE_FORMAT_INSTRUCTION: &str = "\
Respond using EXACTLY the layout below. Keep every label verbatim, one label per line.
Scores are whole numbers from 0 to 100. Lists are comma-separated on one line unless shown as bullets.
Do NOT wrap the answer in code fences.

OVERALL SCORE: <0-100>
KEYWORD MATCH SCORE: <0-100>
MATCHED KEYWORDS: <comma-separated keywords found in the resume>
MISSING KEYWORDS: <comma-separated keywords from the job description absent from the resume>
MISSING SKILLS: <comma-separated missing skills, qualifications or resume sections>

## Experience
Score: <0-100>
Suggestions:
- <one concrete suggestion per line>
Missing Keywords: <comma-separated list>

## Skills
Score: <0-100>
Suggestions:
- <one concrete suggestion per line>
Missing Keywords: <comma-separated list>

## Education
Score: <0-100>
Suggestions:
- <one concrete suggestion per line>
Missing Keywords: <comma-separated list>

IMPROVEMENT TIPS:
- <one actionable tip per line>";
