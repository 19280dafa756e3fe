//! Entity naming rule.

/// Returns true if `name` is already in lower camel case, i.e. splitting it
/// into words and re-joining them as `firstWordSecondWord` yields the same
/// string.
///
/// Words break on lower-to-upper transitions, on letter/digit boundaries and
/// before the last capital of an upper-case run followed by a lower-case
/// letter. Any character outside ASCII alphanumerics disqualifies the name.
pub fn is_camel_case(name: &str) -> bool {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return false;
    }

    let mut rebuilt = String::with_capacity(name.len());
    for (index, word) in split_words(name).iter().enumerate() {
        let lower = word.to_ascii_lowercase();
        if index == 0 {
            rebuilt.push_str(&lower);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                rebuilt.push(first.to_ascii_uppercase());
                rebuilt.push_str(chars.as_str());
            }
        }
    }

    rebuilt == name
}

fn split_words(name: &str) -> Vec<&str> {
    let bytes = name.as_bytes();
    let mut words = Vec::new();
    let mut start = 0;

    for i in 1..bytes.len() {
        let prev = bytes[i - 1];
        let curr = bytes[i];
        let next = bytes.get(i + 1).copied();

        let boundary = (prev.is_ascii_lowercase() && curr.is_ascii_uppercase())
            || (prev.is_ascii_digit() != curr.is_ascii_digit())
            || (prev.is_ascii_uppercase()
                && curr.is_ascii_uppercase()
                && next.is_some_and(|n| n.is_ascii_lowercase()));

        if boundary {
            words.push(&name[start..i]);
            start = i;
        }
    }
    words.push(&name[start..]);
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_camel_case_names() {
        assert!(is_camel_case("greeting"));
        assert!(is_camel_case("logGreeting"));
        assert!(is_camel_case("orderFulfillmentV2"));
        assert!(is_camel_case("v2"));
    }

    #[test]
    fn test_rejects_other_casings() {
        assert!(!is_camel_case(""));
        assert!(!is_camel_case("Greeting"));
        assert!(!is_camel_case("log_greeting"));
        assert!(!is_camel_case("log-greeting"));
        assert!(!is_camel_case("logGREETING"));
        assert!(!is_camel_case("log greeting"));
    }
}
