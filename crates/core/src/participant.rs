//! Participant directory built from the configured roster.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// A roster member: E.164 phone number and display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub phone_number: String,
    pub name: String,
}

/// Phone number to display name mapping, in configuration order.
///
/// Built fresh from configuration on every run. Numbers are not validated as
/// E.164; the directory only associates what it was given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantDirectory {
    entries: Vec<Participant>,
}

impl ParticipantDirectory {
    /// Zip two comma-separated lists positionally.
    ///
    /// Pairing stops at the shorter list. A later duplicate number replaces
    /// the earlier name but keeps its position.
    pub fn from_lists(numbers: &str, names: &str) -> Self {
        let numbers: Vec<&str> = numbers.split(',').map(str::trim).collect();
        let names: Vec<&str> = names.split(',').map(str::trim).collect();

        if numbers.len() != names.len() {
            warn!(
                numbers = numbers.len(),
                names = names.len(),
                "Participant numbers and names differ in length; extra entries are ignored"
            );
        }

        let mut directory = Self::default();
        for (number, name) in numbers.into_iter().zip(names) {
            if number.is_empty() {
                continue;
            }
            directory.insert(number, name);
        }
        directory
    }

    /// Insert or replace the name for a number.
    pub fn insert(&mut self, phone_number: &str, name: &str) {
        match self
            .entries
            .iter_mut()
            .find(|p| p.phone_number == phone_number)
        {
            Some(existing) => existing.name = name.to_string(),
            None => self.entries.push(Participant {
                phone_number: phone_number.to_string(),
                name: name.to_string(),
            }),
        }
    }

    /// Look up the display name for a phone number.
    pub fn name_for(&self, phone_number: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|p| p.phone_number == phone_number)
            .map(|p| p.name.as_str())
    }

    /// Look up the first phone number registered under a display name.
    pub fn number_for(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.phone_number.as_str())
    }

    /// Configured phone numbers in roster order.
    pub fn phone_numbers(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|p| p.phone_number.as_str())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
