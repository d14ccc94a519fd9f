//! Name to value reference lookup built from a model description.

use std::collections::BTreeMap;

use crate::ValueReference;
use crate::description::{Causality, ModelDescription, ModelVariable};
use crate::error::DriverError;

/// Type of a declared variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Int32,
    Clock,
}

impl VariableKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VariableKind::Int32 => "int32",
            VariableKind::Clock => "clock",
        }
    }
}

/// One declared variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableEntry {
    pub name: String,
    pub value_reference: ValueReference,
    pub kind: VariableKind,
    pub causality: Causality,
    /// Clock of an `Int32` signal.
    pub clock: Option<ValueReference>,
}

/// Immutable variable table, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableTable {
    entries: BTreeMap<String, VariableEntry>,
}

impl VariableTable {
    /// Builds the table from every variable in `description`.
    pub fn from_description(description: &ModelDescription) -> Self {
        let entries = description
            .variables
            .iter()
            .map(|variable| {
                let entry = match variable {
                    ModelVariable::Int32(s) => VariableEntry {
                        name: s.name.clone(),
                        value_reference: s.value_reference,
                        kind: VariableKind::Int32,
                        causality: s.causality,
                        clock: Some(s.clock),
                    },
                    ModelVariable::Clock(c) => VariableEntry {
                        name: c.name.clone(),
                        value_reference: c.value_reference,
                        kind: VariableKind::Clock,
                        causality: c.causality,
                        clock: None,
                    },
                };
                (entry.name.clone(), entry)
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&VariableEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &VariableEntry> {
        self.entries.values()
    }

    /// Finds the entry carrying `reference`.
    pub fn by_reference(&self, reference: ValueReference) -> Option<&VariableEntry> {
        self.entries
            .values()
            .find(|e| e.value_reference == reference)
    }

    /// Resolves every name, failing on the first unknown one.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::UnknownVariable`] naming the first name that
    /// is not declared.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<ValueReference>, DriverError> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.entries
                    .get(name)
                    .map(|e| e.value_reference)
                    .ok_or_else(|| DriverError::UnknownVariable(name.to_string()))
            })
            .collect()
    }

    /// Like [`resolve`](Self::resolve), but every name must also be of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::UnknownVariable`] for an undeclared name and
    /// [`DriverError::KindMismatch`] for a name of the other kind.
    pub fn resolve_kind<S: AsRef<str>>(
        &self,
        names: &[S],
        kind: VariableKind,
    ) -> Result<Vec<ValueReference>, DriverError> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                let entry = self
                    .entries
                    .get(name)
                    .ok_or_else(|| DriverError::UnknownVariable(name.to_string()))?;
                if entry.kind != kind {
                    return Err(DriverError::KindMismatch {
                        name: name.to_string(),
                        expected: kind,
                    });
                }
                Ok(entry.value_reference)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::{DescriptionHeader, emit};
    use crate::network::{TopologyBuilder, Transport};

    fn table() -> VariableTable {
        let mut builder = TopologyBuilder::new();
        builder
            .register_pipe("p", "sender", "receiver", Transport::default())
            .expect("register");
        let desc = emit(&builder.classify_and_allocate(), &DescriptionHeader::default());
        VariableTable::from_description(&desc)
    }

    #[test]
    fn resolves_signals_and_clocks() {
        let table = table();
        assert_eq!(
            table.resolve(&["sender", "receiver_Clock"]),
            Ok(vec![1001, 2002])
        );
        assert_eq!(table.get("sender").and_then(|e| e.clock), Some(1002));
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn unknown_name_fails() {
        assert_eq!(
            table().resolve(&["sender", "ghost"]),
            Err(DriverError::UnknownVariable("ghost".into()))
        );
    }

    #[test]
    fn kind_checked_lookup() {
        let table = table();
        assert_eq!(
            table.resolve_kind(&["sender", "receiver"], VariableKind::Int32),
            Ok(vec![1001, 2001])
        );
        assert_eq!(
            table.resolve_kind(&["sender", "receiver_Clock"], VariableKind::Int32),
            Err(DriverError::KindMismatch {
                name: "receiver_Clock".into(),
                expected: VariableKind::Int32,
            })
        );
        assert_eq!(
            table.resolve_kind(&["ghost"], VariableKind::Clock),
            Err(DriverError::UnknownVariable("ghost".into()))
        );
    }

    #[test]
    fn lookup_by_reference() {
        let table = table();
        assert_eq!(
            table.by_reference(2001).map(|e| e.name.as_str()),
            Some("receiver")
        );
    }
}
