//! Tolerant JSON recovery for model replies.
//!
//! Models wrap JSON in code fences, surround it with prose, and leave
//! trailing commas. Recovery is an ordered pipeline of pure text
//! transforms ending in a single parse attempt: strip fences, extract the
//! first balanced object, strip trailing commas, parse. Each step is total
//! and independently testable; none of them log.

/// Drop leading/trailing markdown code-fence markers, including an
/// optional `json` language tag on the opening fence.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut s = raw.trim();

    if let Some(rest) = s.strip_prefix("```") {
        s = match rest.get(..4) {
            Some(tag) if tag.eq_ignore_ascii_case("json") => rest[4..].trim_start(),
            _ => rest.trim_start(),
        };
    }

    if let Some(rest) = s.strip_suffix("```") {
        s = rest.trim_end();
    }

    s
}

/// Extract the first balanced `{...}` substring, honoring string literals
/// and escapes. Returns `None` when no balanced object exists.
pub fn extract_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in s.as_bytes().iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Remove commas that directly precede a closing brace or bracket,
/// leaving commas inside string literals untouched.
pub fn strip_trailing_commas(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = s[i + 1..].chars().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Run the full recovery pipeline and parse the result.
pub fn recover_json(raw: &str) -> Result<serde_json::Value, serde_json::Error> {
    let defenced = strip_code_fences(raw);
    let candidate = extract_object(defenced).unwrap_or(defenced);
    let cleaned = strip_trailing_commas(candidate);
    serde_json::from_str(&cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_fenced_json_with_trailing_commas() {
        let raw = "```json\n{\n  \"overall_score\": 72,\n  \"factors\": {\"media_boost\": 0,},\n}\n```";
        let value = recover_json(raw).expect("recoverable");
        assert_eq!(value["overall_score"], 72);
        assert_eq!(value["factors"]["media_boost"], 0);
    }

    #[test]
    fn extracts_object_surrounded_by_prose() {
        let raw = "Here is the analysis you asked for:\n{\"overall_score\": 55, \"factors\": {}}\nHope that helps!";
        let value = recover_json(raw).expect("recoverable");
        assert_eq!(value["overall_score"], 55);
    }

    #[test]
    fn plain_prose_with_no_object_fails() {
        assert!(recover_json("I cannot score this post.").is_err());
    }

    #[test]
    fn unbalanced_object_fails() {
        assert!(recover_json("{\"overall_score\": 55").is_err());
    }

    #[test]
    fn braces_and_commas_inside_strings_survive() {
        let raw = "{\"short_explanation\": \"uses {braces}, commas, and \\\"quotes\\\",\",}";
        let value = recover_json(raw).expect("recoverable");
        assert_eq!(
            value["short_explanation"],
            "uses {braces}, commas, and \"quotes\","
        );
    }

    #[test]
    fn fence_without_language_tag_is_stripped() {
        let value = recover_json("```\n{\"a\": 1}\n```").expect("recoverable");
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn extract_object_picks_first_balanced_block() {
        let s = "noise {\"a\": {\"b\": 2}} trailing {\"c\": 3}";
        assert_eq!(extract_object(s), Some("{\"a\": {\"b\": 2}}"));
    }
}
