//! Prompt shaping for OCR output

/// Answer-format rules prepended to recognized text.
pub const ANSWER_RULES: &str = "Please answer the following question in English. Provide a compact \
step-by-step solution or reasoning, but for the final answer, use the format 'a = <answer>' \
(e.g., a = 5). Do not use verbose explanations, boxed math, or LaTeX for the answer. Only provide \
the answer in the specified format at the end.
After giving the answer, if possible, provide the Python code that solves the problem, formatted \
as a code block.";

/// Status labels a UI may leave in front of recognized text.
const LEADING_LABELS: &[&str] = &["OCR Result:", "Processing OCR..."];

/// Wrap recognized text in a fenced block after the answer rules.
///
/// Returns `None` when there is no text left after trimming.
pub fn build_ocr_prompt(recognized: &str) -> Option<String> {
    let text = recognized.trim();
    if text.is_empty() {
        return None;
    }
    Some(format!("{ANSWER_RULES}\n\n```\n{text}\n```"))
}

/// Strip UI status labels and surrounding whitespace.
pub fn clean_extracted_text(text: &str) -> String {
    let mut cleaned = text.trim();
    for label in LEADING_LABELS {
        if cleaned.len() >= label.len()
            && cleaned.is_char_boundary(label.len())
            && cleaned[..label.len()].eq_ignore_ascii_case(label)
        {
            cleaned = cleaned[label.len()..].trim();
        }
    }
    cleaned.to_string()
}
