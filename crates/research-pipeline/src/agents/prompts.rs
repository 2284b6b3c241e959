//! Prompt templates for the three agents

use crate::state::StructuredSummary;

/// Pretty JSON of the whole structured summary, `{}` when there is none
pub fn summary_json(summary: Option<&StructuredSummary>) -> String {
    summary
        .and_then(|s| serde_json::to_string_pretty(s).ok())
        .unwrap_or_else(|| "{}".to_string())
}

/// Pretty JSON of just the six summary lists
pub fn summary_text_json(summary: Option<&StructuredSummary>) -> String {
    summary
        .and_then(|s| serde_json::to_string_pretty(&s.summary_text).ok())
        .unwrap_or_else(|| "{}".to_string())
}

pub fn search_queries(question: &str, max_queries: usize) -> String {
    format!(
        r#"I need to research this question thoroughly: "{question}"

Please generate 3-{max_queries} different search queries that would help gather comprehensive information about this topic.
Each query should focus on a different aspect of the question.

Format your response as a JSON array of strings ONLY. For example:
["first search query", "second search query", "third search query"]"#
    )
}

pub fn summary(question: &str, findings: &str) -> String {
    format!(
        r#"Below are research findings about this question: "{question}"

RESEARCH FINDINGS:
{findings}

Create a structured summary of these findings with the following components:
1. Key facts and information
2. Important statistics or numerical data
3. Different perspectives or viewpoints
4. Areas of consensus
5. Areas of disagreement or uncertainty
6. Sources referenced (with URLs when available)

Format your response as a structured JSON with these keys:
{{
  "key_facts": [list of facts],
  "statistics": [list of statistics],
  "perspectives": [list of different viewpoints],
  "consensus": [areas of agreement],
  "disagreements": [areas of disagreement],
  "sources": [list of sources]
}}

Ensure your response is valid JSON without any other text before or after."#
    )
}

pub fn draft(question: &str, findings: &str, summary_json: &str, max_chars: usize) -> String {
    format!(
        r#"You are an expert answer drafter for a research system. Based on the research findings provided, create a clear, comprehensive answer to the original question.

QUESTION: {question}

RESEARCH FINDINGS:
{findings}

STRUCTURED SUMMARY:
{summary_json}

Your answer should:
1. Directly address the original question
2. Be well-structured with clear sections
3. Include facts and data from the research
4. Acknowledge any limitations or uncertainties
5. Not exceed {max_chars} characters
6. Be written in a professional tone

Format your answer in markdown with appropriate headers and emphasis."#
    )
}

pub fn components(draft: &str) -> String {
    format!(
        r#"Break the following answer into structured components.

ANSWER:
{draft}

Respond with a single JSON object and nothing else:
{{
  "main_answer": "one or two sentence direct answer",
  "key_points": ["point 1", "point 2"],
  "supporting_evidence": ["evidence 1"],
  "limitations": ["limitation 1"],
  "sources": ["https://..."]
}}

Only include full http(s) URLs in "sources"."#
    )
}

pub fn refine(draft: &str, feedback: &str, max_chars: usize) -> String {
    format!(
        r#"You are refining a research answer based on reader feedback.

CURRENT ANSWER:
{draft}

FEEDBACK:
{feedback}

Rewrite the answer so it addresses every point of the feedback while keeping all correct content.
Keep the markdown structure and do not exceed {max_chars} characters.
Provide only the refined answer with no other text."#
    )
}

pub fn evaluate(question: &str, answer: &str, summary_text_json: &str) -> String {
    format!(
        r#"You are an expert research critic evaluating the quality of a research answer.

ORIGINAL QUESTION: {question}

ANSWER TO EVALUATE:
{answer}

RESEARCH SUMMARY (FOR REFERENCE):
{summary_text_json}

Please evaluate this answer on:
1. Accuracy (1-10): How factually correct and well-supported is the answer?
2. Completeness (1-10): How thoroughly does it address all aspects of the question?
3. Clarity (1-10): How well-organized and easy to understand is the answer?
4. Overall quality (1-10): Your overall assessment considering all factors

Then identify:
- 2-4 specific strengths of the answer
- 2-4 specific weaknesses or areas for improvement
- 3-5 concrete suggestions for improving the answer

Format your response as a valid JSON object with these keys:
{{
  "accuracy_score": (number 1-10),
  "completeness_score": (number 1-10),
  "clarity_score": (number 1-10),
  "overall_score": (number 1-10),
  "strengths": ["strength1", "strength2", ...],
  "weaknesses": ["weakness1", "weakness2", ...],
  "improvement_suggestions": ["suggestion1", "suggestion2", ...]
}}

Ensure your response is valid JSON only, with no other text."#
    )
}

pub fn revise(
    question: &str,
    original: &str,
    suggestions: &[String],
    findings_excerpt: &str,
    summary_text_json: &str,
) -> String {
    let suggestions = suggestions
        .iter()
        .map(|s| format!("- {s}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an expert research editor. You need to improve this research answer based on specific feedback.

ORIGINAL QUESTION: {question}

ORIGINAL ANSWER:
{original}

IMPROVEMENT SUGGESTIONS:
{suggestions}

RESEARCH SUMMARY FOR REFERENCE:
{summary_text_json}

RESEARCH FINDINGS (EXCERPT):
{findings_excerpt}

Please revise the original answer to address all the improvement suggestions.
Make the answer more accurate, complete, and clear while maintaining its overall structure.
Use the research summary as a reference for factual information.

Provide only the revised answer with no other text or explanations."#
    )
}
