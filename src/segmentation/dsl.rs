//! Parses the JSON segmentation tree into a tagged node enum once per
//! settings load, so evaluation never re-walks raw `serde_json::Value`s.

use serde_json::Value;

use crate::error::CoreError;

#[derive(Debug, Clone)]
pub enum SegmentNode {
    Not(Box<SegmentNode>),
    And(Vec<SegmentNode>),
    Or(Vec<SegmentNode>),
    CustomVariable(String, String),
    UserList(String),
    UserAgent(String),
    FeatureId(String, String),
    Country(Vec<(String, String)>),
    UserAgentGroup(Vec<(String, String)>),
}

const GEO_KEYS: [&str; 3] = ["country", "region", "city"];
const UA_KEYS: [&str; 4] = ["os", "browser_string", "device_type", "device"];

pub fn parse_segment(value: &Value) -> Result<SegmentNode, CoreError> {
    let obj = value
        .as_object()
        .ok_or_else(|| CoreError::Settings("segment node is not an object".into()))?;
    if obj.len() != 1 {
        return Err(CoreError::Settings("segment node must have exactly one key".into()));
    }
    let (key, inner) = obj.iter().next().unwrap();

    match key.as_str() {
        "not" => Ok(SegmentNode::Not(Box::new(parse_segment(inner)?))),
        "and" => Ok(SegmentNode::And(try_parse_grouped(inner)?)),
        "or" => Ok(SegmentNode::Or(try_parse_grouped(inner)?)),
        "custom_variable" => {
            let (k, v) = single_pair(inner)?;
            Ok(SegmentNode::CustomVariable(k, v))
        }
        "user" => Ok(SegmentNode::UserList(inner.as_str().unwrap_or_default().to_string())),
        "user_agent" => Ok(SegmentNode::UserAgent(inner.as_str().unwrap_or_default().to_string())),
        "featureId" => {
            let (k, v) = single_pair(inner)?;
            Ok(SegmentNode::FeatureId(k, v))
        }
        other => Err(CoreError::Settings(format!("unknown segment operator: {other}"))),
    }
}

fn single_pair(inner: &Value) -> Result<(String, String), CoreError> {
    let obj = inner
        .as_object()
        .ok_or_else(|| CoreError::Settings("expected single key/value operand".into()))?;
    let (k, v) = obj
        .iter()
        .next()
        .ok_or_else(|| CoreError::Settings("empty operand".into()))?;
    Ok((k.clone(), value_to_string(v)))
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `or`/`and` group sibling geo or UA keys into a single compound node
/// instead of evaluating each independently (4.2).
fn try_parse_grouped(inner: &Value) -> Result<Vec<SegmentNode>, CoreError> {
    let arr = inner
        .as_array()
        .ok_or_else(|| CoreError::Settings("and/or expects an array of children".into()))?;

    let mut geo_pairs = Vec::new();
    let mut ua_pairs = Vec::new();
    let mut rest = Vec::new();

    for child in arr {
        if let Some(obj) = child.as_object() {
            if obj.len() == 1 {
                let (k, v) = obj.iter().next().unwrap();
                if GEO_KEYS.contains(&k.as_str()) {
                    geo_pairs.push((k.clone(), value_to_string(v)));
                    continue;
                }
                if UA_KEYS.contains(&k.as_str()) {
                    ua_pairs.push((k.clone(), value_to_string(v)));
                    continue;
                }
            }
        }
        rest.push(parse_segment(child)?);
    }

    if !geo_pairs.is_empty() && rest.is_empty() && ua_pairs.is_empty() {
        return Ok(vec![SegmentNode::Country(geo_pairs)]);
    }
    if !ua_pairs.is_empty() && rest.is_empty() && geo_pairs.is_empty() {
        return Ok(vec![SegmentNode::UserAgentGroup(ua_pairs)]);
    }

    let mut all = rest;
    if !geo_pairs.is_empty() {
        all.push(SegmentNode::Country(geo_pairs));
    }
    if !ua_pairs.is_empty() {
        all.push(SegmentNode::UserAgentGroup(ua_pairs));
    }
    Ok(all)
}
