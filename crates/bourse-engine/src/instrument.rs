//! The six tradable instruments.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A tradable commodity. The set is fixed for every room.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Symbol {
    Gold,
    Silver,
    Oil,
    Industrial,
    Bonds,
    Grain,
}

impl Symbol {
    /// Every instrument, in board order.
    pub const ALL: [Symbol; 6] = [
        Symbol::Gold,
        Symbol::Silver,
        Symbol::Oil,
        Symbol::Industrial,
        Symbol::Bonds,
        Symbol::Grain,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Gold => "Gold",
            Self::Silver => "Silver",
            Self::Oil => "Oil",
            Self::Industrial => "Industrial",
            Self::Bonds => "Bonds",
            Self::Grain => "Grain",
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_symbols_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for s in Symbol::ALL {
            assert!(seen.insert(s));
        }
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn test_symbol_serializes_by_name() {
        assert_eq!(serde_json::to_string(&Symbol::Industrial).unwrap(), "\"Industrial\"");
        let s: Symbol = serde_json::from_str("\"Grain\"").unwrap();
        assert_eq!(s, Symbol::Grain);
    }
}
