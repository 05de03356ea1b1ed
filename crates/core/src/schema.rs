//! Field schemas: the wire layout of one header kind.
//!
//! A schema is an ordered list of named fields, each with a configured bit
//! width. Insertion order is wire order. A width of zero removes the field from
//! the wire entirely while keeping its slot, so codecs can address fields by a
//! stable index regardless of configuration.

use std::fmt;

/// One named field of a header and its wire width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name, used in errors and logs
    pub name: &'static str,

    /// Width on the wire; 0 omits the field
    pub bit_width: usize,

    /// Whether reads must be sign-extended
    pub signed: bool,
}

impl FieldDescriptor {
    /// Whether the field appears on the wire at all.
    pub fn is_present(&self) -> bool {
        self.bit_width > 0
    }
}

/// Ordered list of fields defining a header layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSchema {
    fields: Vec<FieldDescriptor>,
}

impl FieldSchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Append an unsigned field.
    pub fn field(mut self, name: &'static str, bit_width: usize) -> Self {
        self.fields.push(FieldDescriptor {
            name,
            bit_width,
            signed: false,
        });
        self
    }

    /// Append a field whose reads are sign-extended.
    pub fn signed_field(mut self, name: &'static str, bit_width: usize) -> Self {
        self.fields.push(FieldDescriptor {
            name,
            bit_width,
            signed: true,
        });
        self
    }

    /// Descriptor at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&FieldDescriptor> {
        self.fields.get(index)
    }

    /// Configured width of the field called `name`.
    pub fn width_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.bit_width)
    }

    /// Iterate over fields in wire order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    /// Number of fields, omitted ones included.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Sum of all field widths.
    pub fn total_bits(&self) -> usize {
        self.fields.iter().map(|f| f.bit_width).sum()
    }

    /// Bytes needed to hold every field: `ceil(total_bits / 8)`.
    pub fn byte_len(&self) -> usize {
        self.total_bits().div_ceil(8)
    }
}

impl fmt::Display for FieldSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for field in self.fields.iter().filter(|d| d.is_present()) {
            if !first {
                write!(f, " | ")?;
            }
            write!(f, "{}:{}", field.name, field.bit_width)?;
            first = false;
        }
        Ok(())
    }
}
