//! Reward scoring for model completions
//!
//! A completion earns `format_score` for containing an extractable Lean proof
//! and `proof_score` on top when that proof checks. Completions with no
//! extractable proof get `unparseable_score` and never reach the checker.

use crate::dispatcher::{Dispatcher, VerificationRequest};
use crate::error::DispatchError;
use proofserve_checker::VerificationVerdict;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

static LEAN_BLOCK: OnceLock<Option<Regex>> = OnceLock::new();

fn lean_block() -> Option<&'static Regex> {
    LEAN_BLOCK
        .get_or_init(|| Regex::new(r"```lean4?[ \t]*\r?\n?([\s\S]*?)```").ok())
        .as_ref()
}

/// Pull the tactic proof out of the first fenced Lean block
///
/// Returns the text following the theorem's `:= by` (or `:=by`), keeping the
/// `by` keyword so it can be appended directly to a statement ending in `:=`.
/// The earliest marker is used on purpose: splitting at the last one would
/// cut the proof down to its final nested `have ... := by` step.
pub fn extract_proof(completion: &str) -> Option<String> {
    let code = lean_block()?.captures(completion)?.get(1)?.as_str().trim();
    [":= by", ":=by"]
        .iter()
        .filter_map(|marker| code.find(marker).map(|at| (at, *marker)))
        .min_by_key(|(at, _)| *at)
        .map(|(at, marker)| format!(" by{}", &code[at + marker.len()..]))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub format_score: f64,
    pub proof_score: f64,
    pub unparseable_score: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            format_score: 0.5,
            proof_score: 4.0,
            unparseable_score: -1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Reward {
    pub score: f64,
    /// Extracted proof, if the completion had one
    pub proof: Option<String>,
    /// Checker verdict, if the proof was checked
    pub verdict: Option<VerificationVerdict>,
}

impl RewardConfig {
    /// Score a completion against `formal_statement` using `dispatcher`
    pub async fn score(
        &self,
        dispatcher: &Dispatcher,
        completion: &str,
        formal_statement: &str,
    ) -> Result<Reward, DispatchError> {
        let Some(proof) = extract_proof(completion) else {
            debug!("No Lean proof found in completion");
            return Ok(Reward {
                score: self.unparseable_score,
                proof: None,
                verdict: None,
            });
        };

        let verdict = dispatcher
            .submit(VerificationRequest::new(proof.clone(), formal_statement))
            .await?;
        let mut score = self.format_score;
        if verdict.success {
            score += self.proof_score;
        }
        Ok(Reward {
            score,
            proof: Some(proof),
            verdict: Some(verdict),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPLETION: &str = r"Thus d^2 = 80.

```lean4
theorem thm_26878 (d : ℝ) (h : d > 0) (h₀ : d ^ 2 / 2 = 40) : d ^ 2 = 80 := by
  have h₁ : d ^ 2 / 2 = 40 := h₀
  have h₂ : d ^ 2 = 80 := by
    linarith
  exact h₂
```";

    #[test]
    fn test_extracts_whole_tactic_block() {
        let proof = extract_proof(COMPLETION).unwrap();
        assert!(proof.starts_with(" by\n  have h₁"));
        // The nested `:= by` stays inside the extracted proof
        assert!(proof.contains("have h₂ : d ^ 2 = 80 := by"));
        assert!(proof.trim_end().ends_with("exact h₂"));
    }

    #[test]
    fn test_accepts_plain_lean_fence_and_tight_marker() {
        let completion = "```lean\ntheorem t : 2 + 2 = 4 :=by norm_num\n```";
        assert_eq!(extract_proof(completion).as_deref(), Some(" by norm_num"));
    }

    #[test]
    fn test_first_block_wins() {
        let completion = "```lean\nexample : True := by trivial\n```\n```lean\nexample : True := by simp\n```";
        assert_eq!(extract_proof(completion).as_deref(), Some(" by trivial"));
    }

    #[test]
    fn test_missing_block_or_marker() {
        assert!(extract_proof("No final answer here").is_none());
        assert!(extract_proof("```python\nx := by 1\n```").is_none());
        assert!(extract_proof("```lean\ntheorem t : True := trivial\n```").is_none());
        // Unterminated fence
        assert!(extract_proof("```lean\ntheorem t : True := by simp").is_none());
    }

    #[test]
    fn test_default_reward_config() {
        let config = RewardConfig::default();
        assert_eq!(config.format_score, 0.5);
        assert_eq!(config.proof_score, 4.0);
        assert_eq!(config.unparseable_score, -1.0);
    }
}
