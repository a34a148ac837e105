pub(crate) const SYSTEM_PROMPT: &str = "You review live meeting transcripts for regulatory compliance. \
You are given a transcript excerpt and the regulation passage it was matched to by semantic search. \
Decide whether the excerpt describes an actual or planned violation (upgrade), \
a genuine but ordinary concern (keep), or a hypothetical, quoted, training or clearly \
compliant discussion (downgrade). \
Reply with a JSON object only: {\"severity_delta\": -1 | 0 | 1, \"rationale\": \"<one sentence>\"}.";

pub(crate) fn build_user_prompt(segment_text: &str, passage_text: &str) -> String {
    format!(
        "Transcript excerpt:\n\"\"\"\n{}\n\"\"\"\n\nRegulation passage:\n\"\"\"\n{}\n\"\"\"",
        segment_text.trim(),
        passage_text.trim()
    )
}
