//! Tolerant parsing of LLM verdicts.

use serde_json::Value;

use crate::error::JudgeError;
use crate::judge::Judgment;

/// Parse a model reply into a [`Judgment`].
///
/// Accepts replies wrapped in prose or Markdown fences, trailing commas and
/// single-quoted keys. The delta may be a number or a numeric string and is
/// clamped to `[-1, 1]`.
pub(crate) fn parse_judgment(content: &str) -> Result<Judgment, JudgeError> {
    let body = extract_object(content)
        .ok_or_else(|| JudgeError::InvalidVerdict(format!("no JSON object in {content:?}")))?;

    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => serde_json::from_str(&repair_json(body))
            .map_err(|_| JudgeError::InvalidVerdict(e.to_string()))?,
    };

    let delta = match value.get("severity_delta") {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Some(Value::String(s)) => s.trim().trim_start_matches('+').parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| JudgeError::InvalidVerdict("missing severity_delta".into()))?;

    let rationale = value
        .get("rationale")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    Ok(Judgment {
        severity_delta: delta.clamp(-1, 1) as i8,
        rationale,
    })
}

fn extract_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&content[start..=end])
}

/// Fix trailing commas and single quotes outside of strings.
fn repair_json(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escape_next = false;

    for (i, &ch) in chars.iter().enumerate() {
        if escape_next {
            result.push(ch);
            escape_next = false;
            continue;
        }
        if ch == '\\' && in_string {
            result.push(ch);
            escape_next = true;
            continue;
        }
        if ch == '"' {
            in_string = !in_string;
            result.push(ch);
            continue;
        }
        if !in_string && ch == '\'' {
            result.push('"');
            continue;
        }
        if !in_string && ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        result.push(ch);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let j = parse_judgment(r#"{"severity_delta": 1, "rationale": "Admits trading."}"#).unwrap();
        assert_eq!(j.severity_delta, 1);
        assert_eq!(j.rationale, "Admits trading.");
    }

    #[test]
    fn test_fenced_reply() {
        let reply = "Here you go:\n```json\n{\"severity_delta\": -1, \"rationale\": \"Hypothetical.\"}\n```";
        let j = parse_judgment(reply).unwrap();
        assert_eq!(j.severity_delta, -1);
    }

    #[test]
    fn test_repairs_and_clamps() {
        let j = parse_judgment("{'severity_delta': 3, 'rationale': 'x',}").unwrap();
        assert_eq!(j.severity_delta, 1);
        let j = parse_judgment(r#"{"severity_delta": "-2"}"#).unwrap();
        assert_eq!(j.severity_delta, -1);
        assert_eq!(j.rationale, "");
        let j = parse_judgment(r#"{"severity_delta": 0.6}"#).unwrap();
        assert_eq!(j.severity_delta, 1);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_judgment("no verdict").is_err());
        assert!(parse_judgment(r#"{"rationale": "no delta"}"#).is_err());
    }
}
