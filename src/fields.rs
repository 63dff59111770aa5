//! Uniform field model filled in by every reader.
//!
//! A [`Fields`] value is an ordered list of typed entries grouped into named
//! tabs. Readers build it once and hand out shared references afterwards.
//!
//! [`Fields`]: struct.Fields.html

use crate::image::DecodedImage;

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

bitflags! {
    /// Presentation hints for string fields.
    pub struct StrFlags: u32 {
        /// Show in a fixed-width font (IDs, hashes, addresses).
        const MONOSPACE = 0x01;
        /// Highlight the value as a warning.
        const WARNING   = 0x02;
    }
}

/// Radix for numeric string fields.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Base {
    Dec,
    Hex,
}

/// Bits of an age rating value.
pub mod age {
    /// Minimum age.
    pub const MIN_AGE_MASK: u16 = 0x001F;
    /// The rating is present.
    pub const ACTIVE: u16 = 0x0800;
    /// Rating is pending.
    pub const PENDING: u16 = 0x1000;
    /// No age restriction.
    pub const NO_RESTRICTION: u16 = 0x2000;
    /// Online play may expose the player to unrated content.
    pub const ONLINE_PLAY: u16 = 0x4000;
    /// Prohibited in this region.
    pub const PROHIBITED: u16 = 0x8000;

    /// Rating organization for each slot of an age ratings field.
    pub const ORGANIZATIONS: [Option<&str>; 16] = [
        Some("CERO"),
        Some("ESRB"),
        None,
        Some("USK"),
        Some("PEGI"),
        Some("MEKU"),
        Some("PEGI-PT"),
        Some("BBFC"),
        Some("ACB"),
        Some("GRB"),
        Some("CGSRR"),
        None,
        None,
        None,
        None,
        None,
    ];
}

/// Value of a single field.
#[derive(Debug, Clone)]
pub enum FieldValue {
    String {
        value: String,
        flags: StrFlags,
    },
    /// Named bits; `None` names are unused bits.
    Bitfield {
        names: Vec<Option<String>>,
        per_row: usize,
        value: u32,
    },
    DateTime(SystemTime),
    /// A table with an optional icon per row.
    ListData {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
        icons: Option<Vec<Option<Arc<DecodedImage>>>>,
    },
    /// Age ratings indexed by organization, see [`age`](age/index.html).
    AgeRatings([u16; 16]),
}

/// A named field on a tab.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub tab: usize,
    pub value: FieldValue,
}

impl Field {
    /// Returns the value if this is a string field.
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            FieldValue::String { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// An ordered collection of fields grouped into tabs.
#[derive(Debug, Clone)]
pub struct Fields {
    tabs: Vec<String>,
    fields: Vec<Field>,
    tab: usize,
}

impl Default for Fields {
    fn default() -> Self {
        Self::new()
    }
}

impl Fields {
    /// Creates an empty collection with a single unnamed tab.
    pub fn new() -> Self {
        Self {
            tabs: vec![String::new()],
            fields: Vec::new(),
            tab: 0,
        }
    }

    pub fn reserve(&mut self, additional: usize) {
        self.fields.reserve(additional);
    }

    pub fn reserve_tabs(&mut self, additional: usize) {
        self.tabs.reserve(additional);
    }

    /// Renames a tab, creating intermediate tabs as needed.
    pub fn set_tab_name(&mut self, index: usize, name: &str) {
        while self.tabs.len() <= index {
            self.tabs.push(String::new());
        }
        self.tabs[index] = name.to_string();
    }

    /// Adds a new tab and makes it the current one.
    ///
    /// If the current tab is the only one and still empty, it is reused.
    pub fn add_tab(&mut self, name: &str) -> usize {
        if self.tabs.len() == 1 && self.fields.is_empty() && self.tabs[0].is_empty() {
            self.tabs[0] = name.to_string();
            return 0;
        }
        self.tabs.push(name.to_string());
        self.tab = self.tabs.len() - 1;
        self.tab
    }

    /// Selects the tab new fields are added to.
    pub fn set_tab_index(&mut self, index: usize) {
        self.set_tab_name_if_missing(index);
        self.tab = index;
    }

    fn set_tab_name_if_missing(&mut self, index: usize) {
        while self.tabs.len() <= index {
            self.tabs.push(String::new());
        }
    }

    pub fn tab_index(&self) -> usize {
        self.tab
    }

    pub fn tabs(&self) -> &[String] {
        &self.tabs
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the first field with the given name.
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the value of the first string field with the given name.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Field::as_str)
    }

    fn push(&mut self, name: &str, value: FieldValue) {
        self.fields.push(Field {
            name: name.to_string(),
            tab: self.tab,
            value,
        });
    }

    pub fn add_string<S: Into<String>>(&mut self, name: &str, value: S) {
        self.add_string_flags(name, value, StrFlags::empty());
    }

    pub fn add_string_flags<S: Into<String>>(&mut self, name: &str, value: S, flags: StrFlags) {
        self.push(
            name,
            FieldValue::String {
                value: value.into(),
                flags,
            },
        );
    }

    /// Adds a number formatted in the given base, zero-padded to `digits`.
    pub fn add_string_numeric(
        &mut self,
        name: &str,
        value: u64,
        base: Base,
        digits: usize,
        flags: StrFlags,
    ) {
        let text = match base {
            Base::Dec => format!("{:0width$}", value, width = digits),
            Base::Hex => format!("0x{:0width$X}", value, width = digits),
        };
        self.add_string_flags(name, text, flags);
    }

    pub fn add_bitfield(&mut self, name: &str, names: &[Option<&str>], per_row: usize, value: u32) {
        let names = names.iter().map(|n| n.map(str::to_string)).collect();
        self.push(
            name,
            FieldValue::Bitfield {
                names,
                per_row,
                value,
            },
        );
    }

    pub fn add_datetime(&mut self, name: &str, time: SystemTime) {
        self.push(name, FieldValue::DateTime(time));
    }

    pub fn add_list_data(&mut self, name: &str, headers: &[&str], rows: Vec<Vec<String>>) {
        self.add_list_data_icons(name, headers, rows, None);
    }

    pub fn add_list_data_icons(
        &mut self,
        name: &str,
        headers: &[&str],
        rows: Vec<Vec<String>>,
        icons: Option<Vec<Option<Arc<DecodedImage>>>>,
    ) {
        self.push(
            name,
            FieldValue::ListData {
                headers: headers.iter().map(|h| h.to_string()).collect(),
                rows,
                icons,
            },
        );
    }

    pub fn add_age_ratings(&mut self, name: &str, ratings: [u16; 16]) {
        self.push(name, FieldValue::AgeRatings(ratings));
    }

    /// Appends all tabs of `other` as new tabs.
    ///
    /// `other`'s first tab is given `first_tab_name` if it has no name.
    pub fn add_fields_from(&mut self, other: &Fields, first_tab_name: &str) {
        let base = if self.tabs.len() == 1 && self.fields.is_empty() && self.tabs[0].is_empty() {
            self.tabs.clear();
            0
        } else {
            self.tabs.len()
        };
        for (i, tab) in other.tabs.iter().enumerate() {
            let name = if i == 0 && tab.is_empty() { first_tab_name } else { tab };
            self.tabs.push(name.to_string());
        }
        for field in &other.fields {
            self.fields.push(Field {
                tab: base + field.tab,
                ..field.clone()
            });
        }
        self.tab = self.tabs.len().saturating_sub(1);
    }
}

/// Formats one age rating as `ORG=age` (with `*` for online play).
fn format_rating(org: &str, rating: u16) -> String {
    let value = if rating & age::PROHIBITED != 0 {
        "No".to_string()
    } else if rating & age::PENDING != 0 {
        "RP".to_string()
    } else if rating & age::NO_RESTRICTION != 0 {
        "All".to_string()
    } else {
        (rating & age::MIN_AGE_MASK).to_string()
    };
    let online = if rating & age::ONLINE_PLAY != 0 { "*" } else { "" };
    format!("{}={}{}", org, value, online)
}

/// Renders age ratings as a comma-separated list of active ratings.
pub fn format_age_ratings(ratings: &[u16; 16]) -> String {
    let parts: Vec<String> = ratings
        .iter()
        .zip(age::ORGANIZATIONS.iter())
        .enumerate()
        .filter(|(_, (rating, _))| **rating & age::ACTIVE != 0)
        .map(|(i, (rating, org))| match org {
            Some(org) => format_rating(org, *rating),
            None => format_rating(&i.to_string(), *rating),
        })
        .collect();
    if parts.is_empty() {
        "None".to_string()
    } else {
        parts.join(", ")
    }
}

/// Joins names with `", "`, starting a new line after every `per_line` names.
///
/// Returns `"None"` for an empty list.
pub fn join_names<S: AsRef<str>>(names: &[S], per_line: usize) -> String {
    if names.is_empty() {
        return "None".to_string();
    }
    let mut out = String::new();
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            out.push_str(if per_line > 0 && i % per_line == 0 { ",\n" } else { ", " });
        }
        out.push_str(name.as_ref());
    }
    out
}

fn write_row(f: &mut fmt::Formatter, widths: &[usize], row: &[String]) -> fmt::Result {
    f.write_str("\n")?;
    for (w, cell) in widths.iter().zip(row) {
        write!(f, "|{:width$}", cell, width = *w)?;
    }
    f.write_str("|")
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::String { value, .. } => f.write_str(value),
            FieldValue::Bitfield {
                names,
                per_row,
                value,
            } => {
                let mut col = 0;
                for (bit, name) in names.iter().enumerate() {
                    let name = match name {
                        Some(name) => name,
                        None => continue,
                    };
                    if col > 0 && *per_row > 0 && col % per_row == 0 {
                        f.write_str("\n")?;
                    } else if col > 0 {
                        f.write_str(" ")?;
                    }
                    let mark = if bit < 32 && value & (1 << bit) != 0 { 'x' } else { ' ' };
                    write!(f, "[{}] {}", mark, name)?;
                    col += 1;
                }
                Ok(())
            }
            FieldValue::DateTime(time) => match time.duration_since(UNIX_EPOCH) {
                Ok(d) => write!(f, "{} (Unix time)", d.as_secs()),
                Err(e) => write!(f, "-{} (Unix time)", e.duration().as_secs()),
            },
            FieldValue::ListData { headers, rows, .. } => {
                let columns = headers
                    .len()
                    .max(rows.iter().map(Vec::len).max().unwrap_or(0));
                let mut widths = vec![0; columns];
                for row in std::iter::once(headers).chain(rows.iter()) {
                    for (w, cell) in widths.iter_mut().zip(row) {
                        *w = (*w).max(cell.chars().count());
                    }
                }
                if !headers.is_empty() {
                    write_row(f, &widths, headers)?;
                }
                for row in rows {
                    write_row(f, &widths, row)?;
                }
                Ok(())
            }
            FieldValue::AgeRatings(ratings) => f.write_str(&format_age_ratings(ratings)),
        }
    }
}

impl fmt::Display for Fields {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, tab) in self.tabs.iter().enumerate() {
            let mut fields = self.fields.iter().filter(|field| field.tab == i).peekable();
            if fields.peek().is_none() {
                continue;
            }
            if !tab.is_empty() {
                writeln!(f, "-- {} --", tab)?;
            }
            for field in fields {
                let value = field.value.to_string();
                if value.contains('\n') {
                    writeln!(f, "{}:", field.name)?;
                    for line in value.lines().filter(|l| !l.is_empty()) {
                        writeln!(f, "  {}", line)?;
                    }
                } else {
                    writeln!(f, "{}: {}", field.name, value)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_ordered_per_tab() {
        let mut fields = Fields::new();
        fields.set_tab_name(0, "First");
        fields.add_string("A", "1");
        fields.add_tab("Second");
        fields.add_string_numeric("B", 0x1F, Base::Hex, 4, StrFlags::MONOSPACE);
        fields.add_string_numeric("C", 7, Base::Dec, 0, StrFlags::empty());

        assert_eq!(fields.tabs(), &["First".to_string(), "Second".to_string()]);
        assert_eq!(fields.get("A").unwrap().tab, 0);
        assert_eq!(fields.get("B").unwrap().tab, 1);
        assert_eq!(fields.get_str("B"), Some("0x001F"));
        assert_eq!(fields.get_str("C"), Some("7"));
    }

    #[test]
    fn joined_names_wrap() {
        assert_eq!(join_names::<&str>(&[], 4), "None");
        assert_eq!(join_names(&["A", "B"], 4), "A, B");
        assert_eq!(join_names(&["A", "B", "C", "D", "E"], 4), "A, B, C, D,\nE");
    }

    #[test]
    fn first_add_tab_reuses_empty_tab() {
        let mut fields = Fields::new();
        assert_eq!(fields.add_tab("Only"), 0);
        assert_eq!(fields.tabs().len(), 1);
    }

    #[test]
    fn bitfield_rendering() {
        let mut fields = Fields::new();
        fields.add_bitfield("Flags", &[Some("NTSC"), None, Some("Stereo")], 0, 0b100);
        let text = fields.to_string();
        assert_eq!(text, "Flags: [ ] NTSC [x] Stereo\n");
    }

    #[test]
    fn merging_appends_tabs() {
        let mut pe = Fields::new();
        pe.add_string("Machine", "i386");
        pe.add_tab("Imports");
        pe.add_string("Count", "0");

        let mut fields = Fields::new();
        fields.set_tab_name(0, "XBE");
        fields.add_string("Title", "Game");
        fields.add_fields_from(&pe, "PE");

        assert_eq!(fields.tabs().len(), 3);
        assert_eq!(fields.tabs()[1], "PE");
        assert_eq!(fields.get("Machine").unwrap().tab, 1);
        assert_eq!(fields.get("Count").unwrap().tab, 2);
    }

    #[test]
    fn age_ratings() {
        let mut ratings = [0u16; 16];
        ratings[0] = age::ACTIVE | 12;
        ratings[1] = age::ACTIVE | age::PENDING;
        ratings[4] = 7; // not active
        assert_eq!(format_age_ratings(&ratings), "CERO=12, ESRB=RP");
        assert_eq!(format_age_ratings(&[0; 16]), "None");
    }

    #[test]
    fn list_rendering() {
        let mut fields = Fields::new();
        fields.add_list_data(
            "Songs",
            &["#", "Duration"],
            vec![vec!["1".to_string(), "01:30".to_string()]],
        );
        let text = fields.to_string();
        assert!(text.starts_with("Songs:\n"));
        assert!(text.contains("  |#|Duration|\n"));
        assert!(text.contains("  |1|01:30   |\n"));
    }
}
