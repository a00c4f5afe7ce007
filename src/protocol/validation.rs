use crate::constants::MAX_STRING_LENGTH;

const SHARED_SUBSCRIPTION_PREFIX: &str = "$share/";

/// Validates a UTF-8 string based on MQTT protocol requirements.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901010>
///
/// **Requirements:**
/// - Length must be ≤ `MAX_STRING_LENGTH`.
/// - Must not contain the null character U+0000.
///
/// Surrogate code points cannot occur in a Rust `str`.
pub fn is_valid_utf8_string(value: &str) -> bool {
    value.len() <= MAX_STRING_LENGTH && !value.contains('\0')
}

/// Checks if a topic or topic filter has wildcards.
pub fn has_wildcards(value: &str) -> bool {
    value.contains(['+', '#'])
}

/// Checks if a topic name is valid for a PUBLISH.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901247>
pub fn is_valid_topic_name(topic: &str) -> bool {
    !topic.is_empty() && is_valid_utf8_string(topic) && !has_wildcards(topic)
}

/// Checks if a topic filter is valid.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901241>
///
/// - `#` must occupy a whole level and be the last one: `sport/tennis/#` is valid,
///   `sport/tennis/#/ranking` and `sport/tennis#` are not.
/// - `+` must occupy a whole level: `+/tennis` is valid, `sp+rt/tennis` is not.
/// - A shared subscription `$share/<group>/<filter>` needs a non-empty group without
///   wildcards and a valid, non-empty filter.
pub fn is_valid_topic_filter(filter: &str) -> bool {
    if filter.is_empty() || !is_valid_utf8_string(filter) {
        return false;
    }

    if let Some(shared) = filter.strip_prefix(SHARED_SUBSCRIPTION_PREFIX) {
        return match shared.split_once('/') {
            Some((group, filter)) => is_valid_share_name(group) && is_valid_plain_filter(filter),
            None => false,
        };
    }

    is_valid_plain_filter(filter)
}

/// Checks if a topic filter addresses a shared subscription, `$share/<group>/<filter>`.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901250>
pub fn is_shared_subscription(filter: &str) -> bool {
    filter
        .strip_prefix(SHARED_SUBSCRIPTION_PREFIX)
        .and_then(|shared| shared.split_once('/'))
        .is_some_and(|(group, filter)| is_valid_share_name(group) && !filter.is_empty())
}

fn is_valid_share_name(group: &str) -> bool {
    !group.is_empty() && !group.contains(['+', '#', '/'])
}

fn is_valid_plain_filter(filter: &str) -> bool {
    if filter.is_empty() {
        return false;
    }

    let mut levels = filter.split('/').peekable();
    while let Some(level) = levels.next() {
        let is_last = levels.peek().is_none();

        match level {
            "#" if is_last => {}
            "+" => {}
            // `#` anywhere but as the whole last level, or `+` sharing a level
            _ if has_wildcards(level) => return false,
            _ => {}
        }
    }

    true
}
