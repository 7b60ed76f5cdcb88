use crate::domain::contract::{ProviderPayload, RawResponse};

/// Removes ```json / ``` fence markers wherever they appear.
pub fn strip_code_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            let rest = trimmed.trim_start_matches('`');
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            let rest = rest.trim_end_matches('`').trim();
            if rest.is_empty() {
                continue;
            }
            out.push_str(rest);
            out.push('\n');
            continue;
        }
        let line = line.trim_end_matches("```");
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

/// First balanced `{...}` block, skipping braces inside JSON strings. An unterminated block
/// yields everything from the first `{` so the parse error points at the real problem.
pub fn extract_json(text: &str) -> Option<String> {
    let cleaned = strip_code_fences(text);
    let start = cleaned.find('{')?;
    let body = &cleaned[start..];

    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in body.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(body[..=idx].to_string());
                }
            }
            _ => {}
        }
    }
    Some(body.trim().to_string())
}

/// Never fails: anything that does not decode becomes [`RawResponse::Degraded`].
pub fn decode_payload(text: &str) -> RawResponse {
    if text.trim().is_empty() {
        return RawResponse::degraded("empty response content", text);
    }
    let Some(json_str) = extract_json(text) else {
        return RawResponse::degraded("no JSON object found in response", text);
    };
    match serde_json::from_str::<ProviderPayload>(&json_str) {
        Ok(payload) => RawResponse::Parsed(payload),
        Err(err) => RawResponse::degraded(format!("invalid JSON payload: {err}"), text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let body = "{\"a\":1}";
        let fenced = format!("```json\n{body}\n```\n");
        assert_eq!(extract_json(&fenced), Some(body.to_string()));
    }

    #[test]
    fn extract_json_handles_inline_fences() {
        assert_eq!(
            extract_json("```json {\"a\":1} ```"),
            Some("{\"a\":1}".to_string())
        );
    }

    #[test]
    fn extract_json_takes_first_balanced_block_out_of_prose() {
        let s = "Here is my analysis {\"a\":{\"b\":2}} and also {\"c\":3} thanks";
        assert_eq!(extract_json(s), Some("{\"a\":{\"b\":2}}".to_string()));
    }

    #[test]
    fn extract_json_ignores_braces_inside_strings() {
        let s = "note: {\"text\":\"a } tricky \\\" { string\",\"n\":1} tail";
        assert_eq!(
            extract_json(s),
            Some("{\"text\":\"a } tricky \\\" { string\",\"n\":1}".to_string())
        );
    }

    #[test]
    fn extract_json_returns_none_without_braces() {
        assert_eq!(extract_json("the market looks fine"), None);
    }

    #[test]
    fn decode_payload_parses_prose_wrapped_json() {
        let text = "Sure! Here you go:\n```json\n{\"marketOutlook\":\"calm\",\"managedRecommendations\":[]}\n```\nGood luck.";
        match decode_payload(text) {
            RawResponse::Parsed(payload) => assert_eq!(payload.market_outlook, "calm"),
            other => panic!("expected parsed payload, got {other:?}"),
        }
    }

    #[test]
    fn decode_payload_degrades_on_garbage() {
        assert!(decode_payload("I cannot help with that.").is_degraded());
        assert!(decode_payload("{\"marketOutlook\": \"cut off").is_degraded());
        assert!(decode_payload("   ").is_degraded());
    }
}
