//! Variable scopes, rules, and pools: objects the manifest loader owns and
//! edges reference.
//!
//! Values held here are fully expanded strings; `$var` interpolation is the
//! loader's job and happens before anything lands in these tables.

use crate::smallmap::SmallMap;
use std::rc::Rc;

/// One frame of variable bindings, chained to an optional parent frame.
#[derive(Debug)]
pub struct Scope {
    vars: SmallMap<String, String>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    /// A scope with no parent.
    pub fn root() -> Scope {
        Scope {
            vars: SmallMap::new(),
            parent: None,
        }
    }

    /// An empty scope chained under `parent`.
    pub fn child(parent: &Rc<Scope>) -> Scope {
        Scope {
            vars: SmallMap::new(),
            parent: Some(parent.clone()),
        }
    }

    pub fn set<K: Into<String>, V: Into<String>>(&mut self, name: K, value: V) {
        self.vars.insert(name.into(), value.into());
    }

    /// Look up a variable in this frame or any ancestor frame.
    pub fn get(&self, name: &str) -> Option<&str> {
        match self.get_local(name) {
            Some(v) => Some(v),
            None => self.parent.as_deref().and_then(|p| p.get(name)),
        }
    }

    /// Look up a variable in this frame only.
    pub fn get_local(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|v| v.as_str())
    }

    pub fn parent(&self) -> Option<&Rc<Scope>> {
        self.parent.as_ref()
    }
}

/// An immutable build rule: a name plus variable bindings (`command`,
/// `rspfile_content`, ...), shared by every edge built from it.
#[derive(Debug)]
pub struct Rule {
    pub name: String,
    pub vars: SmallMap<String, String>,
}

impl Rule {
    pub fn new<S: Into<String>>(name: S) -> Rule {
        Rule {
            name: name.into(),
            vars: SmallMap::new(),
        }
    }
}

/// A concurrency-limiting pool. Opaque to the graph; the scheduler enforces
/// the depth.
#[derive(Debug)]
pub struct Pool {
    pub name: String,
    pub depth: usize,
}

impl Pool {
    pub fn new<S: Into<String>>(name: S, depth: usize) -> Pool {
        Pool {
            name: name.into(),
            depth,
        }
    }
}
