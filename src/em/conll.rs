//! CoNLL token records.
//!
//! One token per line, ten tab-separated fields. The engine only interprets
//! the token id, the surface form, the POS tag, the head id and the
//! dependency label; everything else is carried along for annotation.

use std::str::FromStr;

pub const CONLL_NUM_FIELDS: usize = 10;

/// One CoNLL token line. Missing trailing fields are padded with empty
/// strings; a line with more than ten fields does not parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConllRow {
    fields: [String; CONLL_NUM_FIELDS],
}

impl ConllRow {
    pub fn field(&self, i: usize) -> &str {
        &self.fields[i]
    }

    /// Token id, "1"-based; "0" is the virtual root.
    pub fn id(&self) -> &str {
        self.field(0)
    }

    /// Surface form, the input to morphological lookup.
    pub fn form(&self) -> &str {
        self.field(1)
    }

    pub fn pos(&self) -> &str {
        self.field(3)
    }

    /// Head token id; "0" marks the sentence root.
    pub fn head(&self) -> &str {
        self.field(6)
    }

    pub fn label(&self) -> &str {
        self.field(7)
    }
}

impl FromStr for ConllRow {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut row = ConllRow::default();
        let mut n_fields = 0;
        for field in line.split('\t') {
            if n_fields >= CONLL_NUM_FIELDS {
                return Err(format!("Too many fields in: {}", line));
            }
            row.fields[n_fields] = field.to_string();
            n_fields += 1;
        }
        Ok(row)
    }
}
