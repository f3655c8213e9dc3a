use serde::{Deserialize, Serialize};

/// What a camera drag does.
///
/// The controller consumes actions, never raw buttons, so mouse and touch
/// share the same camera logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Orbit around the target.
    Rotate,
    /// Translate camera and target together in the view plane.
    Pan,
    /// Move toward or away from the target.
    Dolly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

/// Button-to-action table. `None` leaves a button unbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MouseBindings {
    pub primary: Option<Action>,
    pub secondary: Option<Action>,
    pub middle: Option<Action>,
}

impl Default for MouseBindings {
    fn default() -> Self {
        Self {
            primary: Some(Action::Rotate),
            secondary: Some(Action::Pan),
            middle: None,
        }
    }
}

impl MouseBindings {
    pub fn action_for(&self, button: PointerButton) -> Option<Action> {
        match button {
            PointerButton::Primary => self.primary,
            PointerButton::Secondary => self.secondary,
            PointerButton::Middle => self.middle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bindings() {
        let b = MouseBindings::default();
        assert_eq!(b.action_for(PointerButton::Primary), Some(Action::Rotate));
        assert_eq!(b.action_for(PointerButton::Secondary), Some(Action::Pan));
        assert_eq!(b.action_for(PointerButton::Middle), None);
    }

    #[test]
    fn bindings_deserialize_with_defaults() {
        let b: MouseBindings = serde_json::from_str(r#"{"middle":"dolly"}"#).unwrap();
        assert_eq!(b.primary, Some(Action::Rotate));
        assert_eq!(b.middle, Some(Action::Dolly));
    }
}
