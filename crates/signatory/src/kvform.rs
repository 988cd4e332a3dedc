//! Key-value form encoding.
//!
//! Each pair becomes one `key:value\n` line. This is both the body format of
//! direct provider responses and the exact byte string an association signs.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KvFormError {
    #[error("key `{0}` contains a colon or newline")]
    InvalidKey(String),
    #[error("value for key `{0}` contains a newline")]
    InvalidValue(String),
    #[error("line {0} has no `:` separator")]
    MissingSeparator(usize),
}

/// Encode ordered pairs as key-value form.
pub fn encode<I, K, V>(pairs: I) -> Result<String, KvFormError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut out = String::new();
    for (key, value) in pairs {
        let (key, value) = (key.as_ref(), value.as_ref());
        if key.contains([':', '\n']) {
            return Err(KvFormError::InvalidKey(key.to_string()));
        }
        if value.contains('\n') {
            return Err(KvFormError::InvalidValue(key.to_string()));
        }
        out.push_str(key);
        out.push(':');
        out.push_str(value);
        out.push('\n');
    }
    Ok(out)
}

/// Decode key-value form into ordered pairs.
///
/// A trailing newline is optional. The value is everything after the first
/// colon, so values may themselves contain colons.
pub fn decode(input: &str) -> Result<Vec<(String, String)>, KvFormError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.is_empty())
        .map(|(index, line)| {
            line.split_once(':')
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or(KvFormError::MissingSeparator(index + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_in_given_order() {
        let encoded = encode([("mode", "id_res"), ("assoc_handle", "{h}")]).unwrap();
        assert_eq!(encoded, "mode:id_res\nassoc_handle:{h}\n");
    }

    #[test]
    fn empty_input_encodes_to_empty_string() {
        let pairs: [(&str, &str); 0] = [];
        assert_eq!(encode(pairs).unwrap(), "");
    }

    #[test]
    fn colon_in_key_rejected() {
        let err = encode([("a:b", "c")]).unwrap_err();
        assert_eq!(err, KvFormError::InvalidKey("a:b".into()));
    }

    #[test]
    fn newline_in_value_rejected() {
        let err = encode([("a", "b\nc")]).unwrap_err();
        assert_eq!(err, KvFormError::InvalidValue("a".into()));
    }

    #[test]
    fn value_may_contain_colons() {
        let decoded = decode("return_to:http://rp.example/cb\n").unwrap();
        assert_eq!(
            decoded,
            vec![("return_to".to_string(), "http://rp.example/cb".to_string())]
        );
    }

    #[test]
    fn decode_tolerates_missing_trailing_newline() {
        let decoded = decode("is_valid:true").unwrap();
        assert_eq!(decoded, vec![("is_valid".to_string(), "true".to_string())]);
    }

    #[test]
    fn decode_rejects_line_without_separator() {
        let err = decode("is_valid:true\ngarbage\n").unwrap_err();
        assert_eq!(err, KvFormError::MissingSeparator(2));
    }
}
