use schemat_catalog::{Catalog, IntoPath, Node, Reference};
use schemat_types::{ItemId, Record};

use crate::error::TxResult;

/// An in-memory object: catalog data plus its identity.
///
/// A newborn item has no persisted id; once staged it receives a
/// transaction-local provisional id, which is swapped for the real id when
/// the item is inserted.
#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    pub(crate) id: Option<ItemId>,
    pub(crate) provisional: Option<u64>,
    pub(crate) data: Catalog,
    pub(crate) edited: bool,
    pub(crate) obsolete: bool,
}

impl Item {
    /// A new object that does not exist in the database yet.
    pub fn newborn(data: Catalog) -> Self {
        Self {
            id: None,
            provisional: None,
            data,
            edited: true,
            obsolete: false,
        }
    }

    /// An unedited object loaded under `id`.
    pub fn loaded(id: ItemId, data: Catalog) -> Self {
        Self {
            id: Some(id),
            provisional: None,
            data,
            edited: false,
            obsolete: false,
        }
    }

    pub fn from_record(record: &Record) -> TxResult<Self> {
        Ok(Self::loaded(record.id, Catalog::decode(&record.data)?))
    }

    pub fn id(&self) -> Option<ItemId> {
        self.id
    }

    pub fn provisional(&self) -> Option<u64> {
        self.provisional
    }

    pub fn is_newborn(&self) -> bool {
        self.id.is_none()
    }

    pub fn is_edited(&self) -> bool {
        self.edited
    }

    pub fn is_obsolete(&self) -> bool {
        self.obsolete
    }

    pub fn data(&self) -> &Catalog {
        &self.data
    }

    /// Mutable access to the data. Marks the item edited.
    pub fn data_mut(&mut self) -> &mut Catalog {
        self.edited = true;
        &mut self.data
    }

    /// How other items refer to this one: its persisted id, else its
    /// provisional id. `None` for a newborn that was never staged.
    pub fn reference(&self) -> Option<Reference> {
        match (self.id, self.provisional) {
            (Some(id), _) => Some(Reference::Persisted(id)),
            (None, Some(n)) => Some(Reference::Provisional(n)),
            (None, None) => None,
        }
    }

    pub fn get(&self, path: impl IntoPath) -> Option<&Node> {
        self.data.get(path)
    }

    pub fn set(&mut self, path: impl IntoPath, value: impl Into<Node>) -> TxResult<()> {
        self.data.set(path, value)?;
        self.edited = true;
        Ok(())
    }

    /// Remove every entry matched by `path`; returns how many went.
    pub fn delete(&mut self, path: impl IntoPath) -> usize {
        let removed = self.data.delete(path);
        if removed > 0 {
            self.edited = true;
        }
        removed
    }

    /// Append an entry at the end of the top-level catalog.
    pub fn push(&mut self, key: &str, value: impl Into<Node>) {
        self.data.push(key, value);
        self.edited = true;
    }
}
