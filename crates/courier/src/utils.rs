//! Utility functions and helpers

use serde_json::Value;

/// Reserved event name whose handlers receive every trigger
pub const ALL_EVENTS: &str = "all";

/// Split a whitespace-separated list of event names
pub fn split_names(names: &str) -> impl Iterator<Item = &str> {
    names.split_whitespace()
}

/// Composite `"channel topic"` key used to index subscriptions
pub fn route_key(channel: &str, topic: &str) -> String {
    format!("{} {}", channel, topic)
}

/// Published data is never `null`; absent payloads go out as `{}`
pub fn normalize_data(data: Value) -> Value {
    match data {
        Value::Null => Value::Object(Default::default()),
        other => other,
    }
}

/// Match a topic against a subscription binding.
///
/// Words are separated by `.`; `*` in the binding matches exactly one word and
/// `#` matches zero or more words.
pub fn topic_matches(binding: &str, topic: &str) -> bool {
    if !binding.contains('*') && !binding.contains('#') {
        return binding == topic;
    }

    let binding: Vec<&str> = binding.split('.').collect();
    let topic: Vec<&str> = topic.split('.').collect();
    words_match(&binding, &topic)
}

fn words_match(binding: &[&str], topic: &[&str]) -> bool {
    // reachable[j]: the binding words seen so far can consume exactly topic[..j]
    let mut reachable = vec![false; topic.len() + 1];
    reachable[0] = true;

    for &word in binding {
        let mut next = vec![false; topic.len() + 1];
        if word == "#" {
            let mut seen = false;
            for (j, slot) in next.iter_mut().enumerate() {
                seen |= reachable[j];
                *slot = seen;
            }
        } else {
            for (j, &head) in topic.iter().enumerate() {
                if reachable[j] && (word == "*" || word == head) {
                    next[j + 1] = true;
                }
            }
        }
        reachable = next;
    }

    reachable[topic.len()]
}
