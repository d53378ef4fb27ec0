// src/index/intern.rs

//! String pool for NEVRA components and dependency names
//!
//! Thousands of packages share the same arch, epoch and release strings.
//! The pool hands out one shared allocation per distinct value. It only
//! saves memory; `Rc<str>` equality is still by content.

use std::collections::HashSet;
use std::rc::Rc;

#[derive(Debug, Default)]
pub struct StringPool {
    strings: HashSet<Rc<str>>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> Rc<str> {
        if let Some(existing) = self.strings.get(s) {
            return Rc::clone(existing);
        }
        let shared: Rc<str> = Rc::from(s);
        self.strings.insert(Rc::clone(&shared));
        shared
    }

    pub fn intern_opt(&mut self, s: Option<&str>) -> Option<Rc<str>> {
        s.map(|s| self.intern(s))
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn clear(&mut self) {
        self.strings.clear();
    }
}
