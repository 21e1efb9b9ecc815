//! Location a tax is calculated for.

use serde::{Deserialize, Serialize};

/// Country plus optional refinements. `country` is a 2-letter code.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Location {
    pub country: String,
    pub state: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
}

impl Location {
    /// Human-readable form: non-empty parts joined with ", ".
    pub fn display(&self) -> String {
        [
            Some(self.country.as_str()),
            self.state.as_deref(),
            self.city.as_deref(),
            self.postal_code.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_skips_empty_parts() {
        let location = Location {
            country: "US".to_string(),
            state: Some("CA".to_string()),
            city: Some("".to_string()),
            postal_code: Some("94105".to_string()),
        };
        assert_eq!(location.display(), "US, CA, 94105");
    }

    #[test]
    fn display_country_only() {
        let location = Location {
            country: "DE".to_string(),
            ..Default::default()
        };
        assert_eq!(location.display(), "DE");
    }
}
