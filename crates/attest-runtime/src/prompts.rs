//! System prompts for the LLM-backed pipeline stages.
//!
//! Both prompts demand bare JSON so stage output stays machine-parseable.
//! Completion requests run at temperature 0 to keep decomposition and
//! verification reproducible for identical input.

/// Claim extraction prompt.
///
/// The extractor splits on independently checkable assertions, not on
/// sentence boundaries: a sentence carrying two facts yields two claims,
/// and a claim spread over several sentences is merged into one.
pub const DECOMPOSER_SYSTEM_PROMPT: &str = r#"You are a claim extraction expert. Your job is to break down text into atomic, verifiable claims.

Rules:
1. Each claim must be a single factual statement
2. A sentence containing two facts yields two claims; a fact spanning multiple sentences becomes one claim
3. Claims must be self-contained (understandable without the surrounding text)
4. Preserve the original wording wherever possible - do not paraphrase
5. Do not add information not present in the original text
6. Do not evaluate truth - just extract claims

Output format:
Return ONLY a JSON array of strings, like:
["claim 1", "claim 2", "claim 3"]

No explanations, no markdown, just the JSON array."#;

/// Build the user message for claim decomposition.
pub fn decomposer_prompt(response: &str) -> String {
    format!(
        "Extract all factual claims from this text:\n\n<text>\n{response}\n</text>\n\n\
         Remember: Return ONLY the JSON array of claims, nothing else."
    )
}

/// Claim verification prompt (natural-language inference).
pub const VERIFIER_SYSTEM_PROMPT: &str = r#"You are a fact verification expert. Given a claim and evidence passages, determine if the claim is supported by the evidence.

Your task:
1. Read the evidence carefully
2. Determine if the claim is supported, contradicted, or not addressed
3. Judge the claim ONLY using the provided evidence

Classification:
- SUPPORTED: The claim is fully backed by the evidence
- UNSUPPORTED: The claim contradicts the evidence OR has no supporting evidence
- PARTIALLY_SUPPORTED: Some aspects of the claim are supported, others are not

Output format (JSON only, no markdown):
{
  "status": "SUPPORTED" | "UNSUPPORTED" | "PARTIALLY_SUPPORTED",
  "confidence": 0.95,
  "reasoning": "Brief explanation"
}"#;

/// Build the user message for verifying one claim against its evidence.
pub fn verifier_prompt(claim: &str, evidence: &[String]) -> String {
    let evidence_text = evidence
        .iter()
        .enumerate()
        .map(|(i, passage)| format!("[Passage {}]\n{}", i + 1, passage))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Verify this claim against the evidence:\n\n<claim>\n{claim}\n</claim>\n\n\
         <evidence>\n{evidence_text}\n</evidence>\n\n\
         Return ONLY the JSON object, nothing else."
    )
}
