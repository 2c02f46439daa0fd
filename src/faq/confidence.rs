//! Answer confidence heuristic
//!
//! Grows with the amount of retrieved context and drops slightly for long
//! questions. Not a calibrated probability.

/// Placeholder context used when there is no knowledge index.
pub const NO_KNOWLEDGE_BASE: &str = "No knowledge base available.";

/// Score used when nothing was retrieved.
pub const DEGRADED_CONFIDENCE: f64 = 0.3;

const MAX_CONFIDENCE: f64 = 0.9;
const LONG_QUESTION_WORDS: usize = 10;

/// Confidence in [0.0, 0.9] for an answer built from `context`.
///
/// `context` is the retrieved context only, without caller-supplied text.
pub fn confidence(question: &str, context: &str) -> f64 {
    if context.is_empty() || context == NO_KNOWLEDGE_BASE {
        return DEGRADED_CONFIDENCE;
    }

    let context_words = context.split_whitespace().count() as f64;
    let question_words = question.split_whitespace().count();

    let mut base = MAX_CONFIDENCE.min(0.5 + (context_words / 1000.0) * 0.4);
    if question_words > LONG_QUESTION_WORDS {
        base *= 0.9;
    }

    (base * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn test_degraded_contexts() {
        assert_eq!(confidence("When are you open?", ""), 0.3);
        assert_eq!(confidence("When are you open?", NO_KNOWLEDGE_BASE), 0.3);
    }

    #[test]
    fn test_known_values() {
        // 0.5 + 0.1 * 0.4 = 0.54
        assert_eq!(confidence("short question", &words(100)), 0.54);
        // 0.5 + 0.5 * 0.4 = 0.7
        assert_eq!(confidence("short question", &words(500)), 0.7);
        // capped
        assert_eq!(confidence("short question", &words(5000)), 0.9);
    }

    #[test]
    fn test_monotonic_in_context_length() {
        let question = words(10);
        let mut previous = 0.0;
        for n in (1..=1500).step_by(7) {
            let c = confidence(&question, &words(n));
            assert!(c >= previous, "{} words: {} < {}", n, c, previous);
            assert!((0.5..=0.9).contains(&c));
            previous = c;
        }
    }

    #[test]
    fn test_long_question_penalty() {
        let context = words(500);
        let short = confidence(&words(5), &context);
        let long = confidence(&words(15), &context);
        assert_eq!(short, 0.7);
        assert_eq!(long, 0.63);
        assert!(long < short);
    }

    #[test]
    fn test_exactly_ten_words_is_not_long() {
        let context = words(500);
        assert_eq!(confidence(&words(10), &context), 0.7);
        assert_eq!(confidence(&words(11), &context), 0.63);
    }
}
