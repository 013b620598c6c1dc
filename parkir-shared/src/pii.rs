use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wraps personal data so `tracing` fields and `{:?}` never print it in full.
/// Serialization still emits the real value for API responses.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct Masked<T>(pub T);

impl<T: AsRef<str>> Masked<T> {
    fn redacted(&self) -> String {
        let raw = self.0.as_ref();
        match raw.split_once('@') {
            Some((local, domain)) => {
                let first = local.chars().next().unwrap_or('*');
                format!("{}***@{}", first, domain)
            }
            None => "********".to_string(),
        }
    }
}

impl<T: AsRef<str>> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.redacted())
    }
}

impl<T: AsRef<str>> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.redacted())
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_keeps_domain_only() {
        let email = Masked("budi@parkir.id".to_string());
        assert_eq!(format!("{}", email), "b***@parkir.id");
        assert_eq!(format!("{:?}", email), "b***@parkir.id");
        assert_eq!(serde_json::to_string(&email).unwrap(), "\"budi@parkir.id\"");
    }

    #[test]
    fn non_email_is_fully_hidden() {
        assert_eq!(Masked("secret").to_string(), "********");
    }
}
