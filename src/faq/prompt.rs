//! Prompt templates and single-pass placeholder substitution

/// Answer prompt. Placeholders: `question`, `context`, `business_info`.
pub const ANSWER_TEMPLATE: &str = "You are a helpful customer service representative. Answer this customer question based on the provided context and business information.

Customer Question: {question}

Relevant Context: {context}

Business Information: {business_info}

Guidelines:
- Provide a clear, helpful answer
- If you cannot find the answer in the context, say so politely
- Be professional and friendly
- Include relevant details but keep it concise
- If appropriate, suggest next steps or additional resources

Answer:";

/// Classification prompt. Placeholder: `question`.
pub const CLASSIFICATION_TEMPLATE: &str = "Classify this customer question into one of these categories:
- product_info: Questions about products or services
- support: Technical support or troubleshooting
- billing: Questions about pricing, payments, or billing
- general: General inquiries or other questions

Question: {question}

Respond with just the category name:";

/// Replace `{name}` placeholders in one pass.
///
/// Values are inserted verbatim and never re-scanned, so braces inside a
/// customer question cannot pull in other values. Unknown placeholders are
/// left as-is.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(
        template.len() + values.iter().map(|(_, v)| v.len()).sum::<usize>(),
    );
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let replaced = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });

        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Fill the answer template.
pub fn fill_answer_prompt(question: &str, context: &str, business_info: &str) -> String {
    render(
        ANSWER_TEMPLATE,
        &[
            ("question", question),
            ("context", context),
            ("business_info", business_info),
        ],
    )
}

/// Fill the classification template.
pub fn fill_classification_prompt(question: &str) -> String {
    render(CLASSIFICATION_TEMPLATE, &[("question", question)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_answer_prompt() {
        let prompt = fill_answer_prompt("When are you open?", "Mon-Fri 9-5", "Small shop");
        assert!(prompt.contains("Customer Question: When are you open?"));
        assert!(prompt.contains("Relevant Context: Mon-Fri 9-5"));
        assert!(prompt.contains("Business Information: Small shop"));
        assert!(!prompt.contains("{question}"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn test_values_are_not_reexpanded() {
        let prompt = fill_answer_prompt("what is {context}?", "SECRET", "info");
        assert!(prompt.contains("Customer Question: what is {context}?"));
        assert_eq!(prompt.matches("SECRET").count(), 1);
    }

    #[test]
    fn test_unknown_and_unclosed_braces_pass_through() {
        assert_eq!(render("a {x} b {y", &[("y", "1")]), "a {x} b {y");
        assert_eq!(render("{y}{y}", &[("y", "1")]), "11");
        assert_eq!(render("", &[]), "");
    }

    #[test]
    fn test_long_context_is_not_truncated() {
        let context = "word ".repeat(50_000);
        let prompt = fill_answer_prompt("q", &context, "b");
        assert!(prompt.contains(&context));
    }

    #[test]
    fn test_classification_prompt() {
        let prompt = fill_classification_prompt("How much is shipping?");
        assert!(prompt.contains("Question: How much is shipping?"));
        assert!(prompt.contains("billing"));
    }
}
