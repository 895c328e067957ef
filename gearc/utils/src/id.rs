//! Interned identifiers backed by the global symbol table.
use std::cmp::Ordering;
use symbol_table::GlobalSymbol;

/// A globally interned symbol.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct GSym(GlobalSymbol);

impl GSym {
    /// Intern a string into the global symbol table.
    pub fn new(s: impl AsRef<str>) -> Self {
        GSym(GlobalSymbol::new(s.as_ref()))
    }

    /// Convert this symbol into the string in the static, global symbol table.
    pub fn as_str(&self) -> &'static str {
        self.0.as_str()
    }
}

impl std::fmt::Debug for GSym {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self.as_str(), f)
    }
}

impl std::fmt::Display for GSym {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self.as_str(), f)
    }
}

/// Represents an identifier: a register, variable, port or lowered signal.
///
/// Identifiers are cheap to copy and compare. Ordering is lexicographic on the
/// underlying string so that sorted output does not depend on interning order.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "serialize", serde(transparent))]
pub struct Id {
    pub id: GSym,
}

impl Id {
    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Self { id: GSym::new(id) }
    }

    pub fn as_str(&self) -> &'static str {
        self.id.as_str()
    }

    /// Returns a new identifier `<self><suffix>`.
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Id::new(format!("{}{}", self.as_str(), suffix))
    }
}

/* =================== Impls for Id to make them easier to use ============== */

impl Default for Id {
    fn default() -> Self {
        Id::new("")
    }
}

impl std::fmt::Debug for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.id, f)
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.id, f)
    }
}

impl PartialOrd for Id {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Id {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        self.id.as_str()
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::new(s)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::new(s)
    }
}

impl PartialEq<str> for Id {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Id {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// A trait representing something that has a name.
pub trait GetName {
    fn name(&self) -> Id;
}

#[cfg(test)]
mod tests {
    use super::Id;

    #[test]
    fn interned_ids_compare_by_string() {
        let a = Id::from("acc");
        let b = Id::new(String::from("acc"));
        assert_eq!(a, b);
        assert_eq!(a, "acc");
        assert!(Id::from("a_en") < Id::from("b"));
        assert_eq!(a.with_suffix("_en"), "acc_en");
    }
}
