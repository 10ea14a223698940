//! Ordered, named recognizer tables.

use super::ParseError;

/// Where a new registry entry goes relative to the existing ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Before the named entry.
    Before(&'static str),
    /// After the named entry.
    After(&'static str),
    /// At the end of the table.
    End,
}

/// An ordered list of named entries.
///
/// Names are unique: adding an entry under an existing name replaces that
/// entry in place.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    entries: Vec<(&'static str, T)>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry (or replace one with the same name).
    pub fn push(&mut self, name: &'static str, value: T) {
        match self.position(name) {
            Some(i) => self.entries[i].1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn insert_before(
        &mut self,
        anchor: &'static str,
        name: &'static str,
        value: T,
    ) -> Result<(), ParseError> {
        self.insert(Placement::Before(anchor), name, value)
    }

    pub fn insert_after(
        &mut self,
        anchor: &'static str,
        name: &'static str,
        value: T,
    ) -> Result<(), ParseError> {
        self.insert(Placement::After(anchor), name, value)
    }

    /// Insert an entry at the given placement.
    pub fn insert(
        &mut self,
        placement: Placement,
        name: &'static str,
        value: T,
    ) -> Result<(), ParseError> {
        let anchor = match placement {
            Placement::End => {
                self.push(name, value);
                return Ok(());
            }
            Placement::Before(anchor) | Placement::After(anchor) => anchor,
        };
        if anchor == name || self.position(anchor).is_none() {
            return Err(ParseError::UnknownRecognizer(anchor.to_string()));
        }
        // Resolve against the table without the entry being (re)placed
        if let Some(i) = self.position(name) {
            self.entries.remove(i);
        }
        let i = self
            .position(anchor)
            .ok_or_else(|| ParseError::UnknownRecognizer(anchor.to_string()))?;
        let at = match placement {
            Placement::After(_) => i + 1,
            _ => i,
        };
        self.entries.insert(at, (name, value));
        Ok(())
    }

    /// Remove the named entry, returning whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// Named entries in order.
    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &T)> {
        self.entries.iter().map(|(n, v)| (*n, v))
    }

    /// Entry names in order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(n, _)| *n)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(n, _)| *n == name)
    }
}
