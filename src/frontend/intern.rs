// src/frontend/intern.rs

use rustc_hash::FxHashMap;

/// Unique identifier for interned source text: variable and field
/// names, string literal values, builtin names like `setmetatable`.
/// Two occurrences of the same text always share a Symbol; shadowed
/// bindings are told apart by scope lookup, not by symbol identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(pub u32);

/// String interner the parser populates and analysis reads
#[derive(Debug, Default)]
pub struct Interner {
    ids: FxHashMap<Box<str>, Symbol>,
    texts: Vec<Box<str>>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, text: &str) -> Symbol {
        if let Some(&sym) = self.ids.get(text) {
            return sym;
        }

        let sym = Symbol(self.texts.len() as u32);
        let text: Box<str> = text.into();
        self.texts.push(text.clone());
        self.ids.insert(text, sym);
        sym
    }

    pub fn resolve(&self, sym: Symbol) -> &str {
        &self.texts[sym.0 as usize]
    }
}
