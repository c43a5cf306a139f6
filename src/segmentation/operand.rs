//! Operand matching for `custom_variable`/`user_agent` leaves (4.2): prefix
//! operators (`lower`, `wildcard`, `regex`, `gt`/`gte`/`lt`/`lte`) plus plain
//! equality, and the numeric-vs-string version comparison rules.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Equal,
    Lower,
    StartsWith,
    EndsWith,
    Contains,
    Regex,
    Gt,
    Gte,
    Lt,
    Lte,
}

struct ParsedOperand {
    operator: Operator,
    value: String,
}

static LOWER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^lower\((.*)\)$").unwrap());
static REGEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^regex\((.*)\)$").unwrap());
static GT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^gt\((.*)\)$").unwrap());
static GTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^gte\((.*)\)$").unwrap());
static LT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^lt\((.*)\)$").unwrap());
static LTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^lte\((.*)\)$").unwrap());
static WILDCARD_BOTH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^wildcard\(\*(.*)\*\)$").unwrap());
static WILDCARD_START_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^wildcard\((.*)\*\)$").unwrap());
static WILDCARD_END_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^wildcard\(\*(.*)\)$").unwrap());
static INLIST_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^inlist\(([^)]*)\)$").unwrap());

/// `Some(list_id)` iff the operand is an `inlist(...)` reference that must be
/// resolved through the gateway attribute-check service.
pub fn inlist_id(operand: &str) -> Option<String> {
    INLIST_RE.captures(operand).map(|c| c[1].to_string())
}

fn parse_operand(operand: &str) -> ParsedOperand {
    if let Some(c) = LOWER_RE.captures(operand) {
        return ParsedOperand { operator: Operator::Lower, value: c[1].to_string() };
    }
    if let Some(c) = WILDCARD_BOTH_RE.captures(operand) {
        return ParsedOperand { operator: Operator::Contains, value: c[1].to_string() };
    }
    if let Some(c) = WILDCARD_START_RE.captures(operand) {
        return ParsedOperand { operator: Operator::StartsWith, value: c[1].to_string() };
    }
    if let Some(c) = WILDCARD_END_RE.captures(operand) {
        return ParsedOperand { operator: Operator::EndsWith, value: c[1].to_string() };
    }
    if let Some(c) = REGEX_RE.captures(operand) {
        return ParsedOperand { operator: Operator::Regex, value: c[1].to_string() };
    }
    if let Some(c) = GTE_RE.captures(operand) {
        return ParsedOperand { operator: Operator::Gte, value: c[1].to_string() };
    }
    if let Some(c) = GT_RE.captures(operand) {
        return ParsedOperand { operator: Operator::Gt, value: c[1].to_string() };
    }
    if let Some(c) = LTE_RE.captures(operand) {
        return ParsedOperand { operator: Operator::Lte, value: c[1].to_string() };
    }
    if let Some(c) = LT_RE.captures(operand) {
        return ParsedOperand { operator: Operator::Lt, value: c[1].to_string() };
    }
    ParsedOperand { operator: Operator::Equal, value: operand.to_string() }
}

/// `None`/missing -> ""; booleans stringified; numeric floats that are whole
/// numbers lose their trailing `.0`; everything else via its natural Display.
pub fn normalize_tag_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 {
                    return (f as i64).to_string();
                }
            }
            n.to_string()
        }
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_numeric_dotted(s: &str) -> bool {
    !s.is_empty() && s.split('.').all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

fn compare_dotted(a: &str, b: &str, numeric: bool) -> std::cmp::Ordering {
    let a_parts: Vec<&str> = a.split('.').collect();
    let b_parts: Vec<&str> = b.split('.').collect();
    let len = a_parts.len().max(b_parts.len());
    for i in 0..len {
        let av = a_parts.get(i).copied().unwrap_or("0");
        let bv = b_parts.get(i).copied().unwrap_or("0");
        let ord = if numeric {
            let an: i64 = av.parse().unwrap_or(0);
            let bn: i64 = bv.parse().unwrap_or(0);
            an.cmp(&bn)
        } else {
            av.cmp(bv)
        };
        if ord != std::cmp::Ordering::Equal {
            return ord;
        }
    }
    std::cmp::Ordering::Equal
}

/// `gt`/`gte`/`lt`/`lte` only compare when both sides classify the same way
/// (both numeric-dotted or both non-numeric-dotted); mixed types never match.
fn compare_ordered(tag: &str, operand: &str, operator: Operator) -> bool {
    let tag_numeric = is_numeric_dotted(tag);
    let operand_numeric = is_numeric_dotted(operand);
    if tag_numeric != operand_numeric {
        return false;
    }
    let ord = compare_dotted(tag, operand, tag_numeric);
    match operator {
        Operator::Gt => ord == std::cmp::Ordering::Greater,
        Operator::Gte => ord != std::cmp::Ordering::Less,
        Operator::Lt => ord == std::cmp::Ordering::Less,
        Operator::Lte => ord != std::cmp::Ordering::Greater,
        _ => unreachable!(),
    }
}

/// Evaluates a single `tag_value operand` pair per the rules in 4.2.
pub fn evaluate_operand(tag_value: &Value, operand: &str) -> bool {
    let parsed = parse_operand(operand);
    let tag = normalize_tag_value(tag_value);

    match parsed.operator {
        Operator::Equal => tag == parsed.value,
        Operator::Lower => tag.to_lowercase() == parsed.value.to_lowercase(),
        Operator::StartsWith => tag.starts_with(&parsed.value),
        Operator::EndsWith => tag.ends_with(&parsed.value),
        Operator::Contains => tag.contains(&parsed.value),
        Operator::Regex => Regex::new(&parsed.value).map(|re| re.is_match(&tag)).unwrap_or(false),
        Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
            compare_ordered(&tag, &parsed.value, parsed.operator)
        }
    }
}

#[cfg(test)]
mod operand_tests {
    use super::*;

    #[test]
    fn equal_matches_exact_string() {
        assert!(evaluate_operand(&Value::String("US".into()), "US"));
        assert!(!evaluate_operand(&Value::String("US".into()), "FR"));
    }

    #[test]
    fn lower_is_case_insensitive() {
        assert!(evaluate_operand(&Value::String("Admin".into()), "lower(admin)"));
    }

    #[test]
    fn wildcard_variants() {
        assert!(evaluate_operand(&Value::String("hello-world".into()), "wildcard(*world)"));
        assert!(evaluate_operand(&Value::String("hello-world".into()), "wildcard(hello*)"));
        assert!(evaluate_operand(&Value::String("hello-world".into()), "wildcard(*lo-wo*)"));
    }

    #[test]
    fn regex_matches_without_anchors() {
        assert!(evaluate_operand(&Value::String("vwo-sdk".into()), "regex(^vwo-.*)"));
    }

    #[test]
    fn numeric_dotted_component_compare() {
        assert!(evaluate_operand(&Value::String("1.10".into()), "gt(1.2)"));
        assert!(!evaluate_operand(&Value::String("1.1".into()), "gt(1.2)"));
    }

    #[test]
    fn mixed_numeric_and_string_never_match_ordering() {
        assert!(!evaluate_operand(&Value::String("abc".into()), "gt(1.2)"));
    }
}
