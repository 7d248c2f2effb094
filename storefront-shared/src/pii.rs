use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wrapper for customer contact data (emails, names, street addresses).
///
/// `Debug` and `Display` always print a fixed mask so the value cannot leak
/// through `tracing` fields or `{:?}` formatting. Serialization passes the real
/// value through, because API responses and persisted rows need it.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
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
    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl From<&str> for Masked<String> {
    fn from(value: &str) -> Self {
        Masked(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_never_show_the_value() {
        let email = Masked::from("guest@example.com");
        assert_eq!(format!("{:?}", email), "********");
        assert_eq!(format!("{}", email), "********");
        assert_eq!(email.expose(), "guest@example.com");
    }

    #[test]
    fn serializes_the_real_value() {
        let email = Masked::from("guest@example.com");
        let json = serde_json::to_string(&email).unwrap();
        assert_eq!(json, "\"guest@example.com\"");

        let back: Masked<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, email);
    }
}
