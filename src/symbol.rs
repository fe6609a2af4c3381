//! Symbol kinds: [`SymbolName`] (an unresolved import reference),
//! [`ExportedSymbolName`] (an announced export), and [`CommonSymbol`] (an
//! unallocated common-block request).
//!
//! Local and Global symbols need nothing beyond a name and a
//! [`crate::location::Location`], so `Module` stores those directly in a
//! `name -> Location` map rather than through a dedicated type here.

/// A reference to a symbol defined in another module, as seen by a
/// [`crate::relocation::Relocation`]'s `target`/`reference`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SymbolName {
    /// A symbol defined within the same module, by name (used before
    /// [`crate::module::Module::resolve_relocations`] rewrites it to a
    /// direct [`crate::location::Location`]).
    Local(String),
    /// An external symbol imported from `library` by name, with an
    /// optional ordinal hint some formats attach to speed up dynamic
    /// binding.
    ImportedByName {
        library: String,
        name: String,
        hint: Option<u16>,
    },
    /// An external symbol imported from `library` by ordinal alone (no
    /// name is stored in the object file).
    ImportedByOrdinal { library: String, ordinal: u32 },
}

impl SymbolName {
    pub fn local(name: impl Into<String>) -> Self {
        SymbolName::Local(name.into())
    }

    pub fn imported_by_name(library: impl Into<String>, name: impl Into<String>) -> Self {
        SymbolName::ImportedByName {
            library: library.into(),
            name: name.into(),
            hint: None,
        }
    }

    pub fn imported_by_name_with_hint(
        library: impl Into<String>,
        name: impl Into<String>,
        hint: u16,
    ) -> Self {
        SymbolName::ImportedByName {
            library: library.into(),
            name: name.into(),
            hint: Some(hint),
        }
    }

    pub fn imported_by_ordinal(library: impl Into<String>, ordinal: u32) -> Self {
        SymbolName::ImportedByOrdinal {
            library: library.into(),
            ordinal,
        }
    }

    /// The library this symbol imports from, if it is an import at all.
    pub fn library(&self) -> Option<&str> {
        match self {
            SymbolName::Local(_) => None,
            SymbolName::ImportedByName { library, .. } => Some(library),
            SymbolName::ImportedByOrdinal { library, .. } => Some(library),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, SymbolName::Local(_))
    }
}

/// A symbol a [`crate::module::Module`] announces to dynamic loaders, keyed
/// either by name or by ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExportedSymbolName {
    ByName { name: String, hint: Option<u16> },
    /// Exported under `ordinal` alone; `internal_name` is kept for
    /// diagnostics and for formats (e.g. OS/2 LX) that record both.
    ByOrdinal { ordinal: u32, internal_name: String },
}

impl ExportedSymbolName {
    pub fn by_name(name: impl Into<String>) -> Self {
        ExportedSymbolName::ByName {
            name: name.into(),
            hint: None,
        }
    }

    pub fn by_name_with_hint(name: impl Into<String>, hint: u16) -> Self {
        ExportedSymbolName::ByName {
            name: name.into(),
            hint: Some(hint),
        }
    }

    pub fn by_ordinal(ordinal: u32, internal_name: impl Into<String>) -> Self {
        ExportedSymbolName::ByOrdinal {
            ordinal,
            internal_name: internal_name.into(),
        }
    }
}

/// A common-block request: a symbol declared with a size and alignment but
/// no definition, awaiting [`crate::module::Module::allocate_symbols`].
/// Multiple declarations of the same common symbol across merged modules
/// are reconciled by taking the maximum of each field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommonSymbol {
    pub size: u64,
    pub align: u64,
}

impl CommonSymbol {
    pub fn new(size: u64, align: u64) -> Self {
        CommonSymbol { size, align }
    }

    /// Merges two declarations of the same common symbol by taking the
    /// maximum size and maximum alignment of each.
    pub fn merge(self, other: CommonSymbol) -> CommonSymbol {
        CommonSymbol {
            size: self.size.max(other.size),
            align: self.align.max(other.align),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_symbol_merge_takes_max_of_each_field() {
        let a = CommonSymbol::new(4, 8);
        let b = CommonSymbol::new(16, 2);
        assert_eq!(a.merge(b), CommonSymbol::new(16, 8));
    }

    #[test]
    fn imported_by_name_library_accessor() {
        let sym = SymbolName::imported_by_name("KERNEL", "GetVersion");
        assert_eq!(sym.library(), Some("KERNEL"));
        assert!(!sym.is_local());
    }

    #[test]
    fn local_has_no_library() {
        assert_eq!(SymbolName::local("foo").library(), None);
    }
}
