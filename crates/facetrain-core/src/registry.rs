use crate::types::Label;

/// Append-only list of display names. A label `i` names `people[i]`.
#[derive(Debug, Default, Clone)]
pub struct PersonRegistry {
    people: Vec<String>,
}

impl PersonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names(people: Vec<String>) -> Self {
        Self { people }
    }

    /// Append a person and return the label that now refers to them.
    pub fn add(&mut self, name: impl Into<String>) -> Label {
        self.people.push(name.into());
        Label::person(self.people.len() - 1)
    }

    pub fn name(&self, label: Label) -> Option<&str> {
        label
            .index()
            .and_then(|i| self.people.get(i))
            .map(String::as_str)
    }

    /// Display name, `"Unknown"` for the sentinel or a dangling index.
    pub fn display_name(&self, label: Label) -> &str {
        self.name(label).unwrap_or("Unknown")
    }

    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.people
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_assigns_sequential_labels() {
        let mut reg = PersonRegistry::new();
        assert_eq!(reg.add("alice"), Label::person(0));
        assert_eq!(reg.add("bob"), Label::person(1));
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.name(Label::person(1)), Some("bob"));
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut reg = PersonRegistry::new();
        reg.add("alice");
        assert_eq!(reg.display_name(Label::UNKNOWN), "Unknown");
        assert_eq!(reg.display_name(Label::person(7)), "Unknown");
        assert_eq!(reg.display_name(Label::person(0)), "alice");
    }
}
