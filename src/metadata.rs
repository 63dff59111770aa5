//! Property/value metadata for indexers and file managers.

use std::fmt;

/// A metadata property.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Property {
    Title,
    Publisher,
    Artist,
    ReleaseYear,
    Description,
}

impl Property {
    pub fn name(self) -> &'static str {
        match self {
            Property::Title => "Title",
            Property::Publisher => "Publisher",
            Property::Artist => "Artist",
            Property::ReleaseYear => "Release Year",
            Property::Description => "Description",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaValue {
    String(String),
    Integer(i64),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MetaValue::String(s) => f.write_str(s),
            MetaValue::Integer(i) => write!(f, "{}", i),
        }
    }
}

/// An ordered list of metadata properties.
#[derive(Debug, Clone, Default)]
pub struct MetaData {
    entries: Vec<(Property, MetaValue)>,
}

impl MetaData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a string property. Empty strings are skipped.
    pub fn add_string<S: Into<String>>(&mut self, property: Property, value: S) {
        let value = value.into();
        if !value.is_empty() {
            self.entries.push((property, MetaValue::String(value)));
        }
    }

    pub fn add_integer(&mut self, property: Property, value: i64) {
        self.entries.push((property, MetaValue::Integer(value)));
    }

    pub fn get(&self, property: Property) -> Option<&MetaValue> {
        self.entries
            .iter()
            .find(|(p, _)| *p == property)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Property, MetaValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for MetaData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (property, value) in &self.entries {
            writeln!(f, "{}: {}", property.name(), value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_strings_are_skipped() {
        let mut meta = MetaData::new();
        meta.add_string(Property::Title, "");
        meta.add_string(Property::Artist, "Someone");
        meta.add_integer(Property::ReleaseYear, 1987);
        assert_eq!(meta.len(), 2);
        assert_eq!(meta.get(Property::Title), None);
        assert_eq!(meta.get(Property::ReleaseYear), Some(&MetaValue::Integer(1987)));
        assert_eq!(meta.to_string(), "Artist: Someone\nRelease Year: 1987\n");
    }
}
