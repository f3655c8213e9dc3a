use serde::{Deserialize, Serialize};

/// The contact line shown in the bottom-left corner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactCard {
    pub prefix: String,
    pub handle: String,
    pub url: String,
}

impl Default for ContactCard {
    fn default() -> Self {
        Self {
            prefix: "Get yours, contact Instagram ".to_string(),
            handle: "@identicals_ff".to_string(),
            url: "https://www.instagram.com/identicals_ff/".to_string(),
        }
    }
}

impl ContactCard {
    pub fn text(&self) -> String {
        format!("{}{}", self.prefix, self.handle)
    }
}

/// 2D state drawn over the 3D frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Overlay {
    /// Show the loading indicator.
    pub loading: bool,
    pub contact: ContactCard,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_text() {
        let card = ContactCard::default();
        assert_eq!(card.text(), "Get yours, contact Instagram @identicals_ff");
        assert!(card.url.starts_with("https://www.instagram.com/"));
    }
}
