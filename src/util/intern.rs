use std::{collections::HashMap, fmt, num::NonZeroU32, rc::Rc};

/// A handle to an interned identifier. To retrieve its text, use
/// [`Interner::get`].
///
/// Two symbols from the same interner are equal iff their texts are equal.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(NonZeroU32);

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

/// Identifier table shared by the parser and the lowering.
#[derive(Default)]
pub struct Interner {
    map: HashMap<Rc<str>, Symbol>,
    names: Vec<Rc<str>>,
}

impl fmt::Debug for Interner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (i, name) in self.names.iter().enumerate() {
            map.entry(&(i + 1), name);
        }
        map.finish()
    }
}

impl Interner {
    pub fn with_capacity(capacity: usize) -> Self {
        Interner {
            map: HashMap::with_capacity(capacity),
            names: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Interns `name`, returning the existing symbol if it was seen before.
    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(symbol) = self.map.get(name) {
            return *symbol;
        }
        let index = u32::try_from(self.names.len()).unwrap_or(u32::MAX);
        let symbol = Symbol(NonZeroU32::MIN.saturating_add(index));
        let key: Rc<str> = name.into();
        self.names.push(Rc::clone(&key));
        self.map.insert(key, symbol);
        symbol
    }

    /// Returns the symbol of an already interned name.
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.map.get(name).copied()
    }

    /// Returns the text of the provided symbol. Panics if the symbol comes
    /// from another interner.
    pub fn get(&self, symbol: Symbol) -> &str {
        &self.names[symbol.0.get() as usize - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interner() {
        let mut i = Interner::with_capacity(3);

        let hello1 = i.intern("hello");
        let world1 = i.intern("world");
        let hello2 = i.intern("hello");

        assert_eq!(hello1, hello2);
        assert_ne!(hello1, world1);
        assert_eq!(i.get(hello1), "hello");
        assert_eq!(i.get(world1), "world");
        assert_eq!(i.len(), 2);
    }

    #[test]
    fn lookup_does_not_intern() {
        let mut i = Interner::default();
        assert_eq!(i.lookup("x"), None);
        let x = i.intern("x");
        assert_eq!(i.lookup("x"), Some(x));
        assert_eq!(i.len(), 1);
    }
}
