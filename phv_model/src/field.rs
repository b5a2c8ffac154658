//! Logical fields and the global field table.

use std::collections::HashMap;
use std::fmt;

use crate::ids::FieldId;

/// Pipeline direction a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gress {
    Ingress,
    Egress,
}

/// Whether a field comes from a parsed header or is compiler/user metadata.
/// Metadata has no deparser obligation and may be overlaid more aggressively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldClass {
    Header,
    Metadata,
}

/// A named logical value with a bit width. Immutable after construction;
/// owned by [`PhvInfo`] and referred to everywhere else by [`FieldId`].
#[derive(Debug, Clone)]
pub struct Field {
    pub id: FieldId,
    pub name: String,
    /// Width in bits.
    pub size: u16,
    pub gress: Gress,
    pub class: FieldClass,
    /// Must not share a container with any other field.
    pub solitary: bool,
    /// Must be allocated as a single slice.
    pub no_split: bool,
    /// Packing may not leave unoccupied bits between this field's slices.
    pub no_holes: bool,
}

impl Field {
    pub fn is_metadata(&self) -> bool {
        self.class == FieldClass::Metadata
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>", self.name, self.size)
    }
}

/// The global field table: owns every [`Field`] for one compilation pass.
#[derive(Debug, Default)]
pub struct PhvInfo {
    fields: Vec<Field>,
    by_name: HashMap<String, FieldId>,
}

impl PhvInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a field and return its handle. Names must be unique.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        size: u16,
        gress: Gress,
        class: FieldClass,
    ) -> FieldId {
        let name = name.into();
        let id = FieldId(self.fields.len() as u32);
        assert!(
            self.by_name.insert(name.clone(), id).is_none(),
            "duplicate field name {name}"
        );
        self.fields.push(Field {
            id,
            name,
            size,
            gress,
            class,
            solitary: false,
            no_split: false,
            no_holes: false,
        });
        id
    }

    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.0 as usize]
    }

    pub fn field_mut(&mut self, id: FieldId) -> &mut Field {
        &mut self.fields[id.0 as usize]
    }

    pub fn field_named(&self, name: &str) -> Option<&Field> {
        self.by_name.get(name).map(|&id| self.field(id))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }
}
