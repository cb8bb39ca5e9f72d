use rustc_hash::{FxHashMap, FxHashSet};

use super::{digest::Digest, CseError, MalformedGraphError};

/// Symbol table of one graph nesting level.
///
/// Maps every visible value name to its digest, and every digest to its canonical
/// (first seen) name. A subgraph's scope starts as a copy of its parent's tables.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    name_digest: FxHashMap<String, Digest>,
    digest_name: FxHashMap<Digest, String>,
    /// Declared outputs of the graph this scope belongs to. Their names must be preserved.
    outputs: FxHashSet<String>,
}

impl Scope {
    pub fn new<S: Into<String>>(outputs: impl IntoIterator<Item = S>) -> Self {
        Self {
            outputs: outputs.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Binds `name` to `digest`. Returns `true` if `digest` was seen for the first time,
    /// in which case `name` becomes its canonical name.
    pub fn introduce(&mut self, name: &str, digest: Digest) -> Result<bool, CseError> {
        if self.name_digest.contains_key(name) {
            return Err(MalformedGraphError::RedefinedValue(name.to_owned()).into());
        }
        self.name_digest.insert(name.to_owned(), digest);

        if self.digest_name.contains_key(&digest) {
            return Ok(false);
        }
        self.digest_name.insert(digest, name.to_owned());
        Ok(true)
    }

    pub fn lookup(&self, name: &str) -> Result<Digest, CseError> {
        self.name_digest
            .get(name)
            .copied()
            .ok_or_else(|| MalformedGraphError::UndefinedValue(name.to_owned()).into())
    }

    pub fn canonical_name_of(&self, digest: &Digest) -> Result<&str, CseError> {
        self.digest_name
            .get(digest)
            .map(String::as_str)
            .ok_or(CseError::MissingCanonicalName(*digest))
    }

    /// Returns the canonical name of `digest`, if it has been seen.
    pub fn find_canonical_name(&self, digest: &Digest) -> Option<&str> {
        self.digest_name.get(digest).map(String::as_str)
    }

    /// Makes `name` the canonical name of `digest` without binding `name` to it.
    /// `name` must already be bound. Does nothing if `digest` has a canonical name.
    pub fn witness(&mut self, digest: Digest, name: &str) {
        self.digest_name
            .entry(digest)
            .or_insert_with(|| name.to_owned());
    }

    /// Shorthand for `canonical_name_of(lookup(name))`.
    pub fn canonical_name(&self, name: &str) -> Result<&str, CseError> {
        self.canonical_name_of(&self.lookup(name)?)
    }

    pub fn is_declared_output(&self, name: &str) -> bool {
        self.outputs.contains(name)
    }

    /// Creates the scope of a subgraph whose declared outputs are `outputs`.
    pub fn fork_for_subgraph<S: Into<String>>(&self, outputs: impl IntoIterator<Item = S>) -> Self {
        Self {
            name_digest: self.name_digest.clone(),
            digest_name: self.digest_name.clone(),
            outputs: outputs.into_iter().map(Into::into).collect(),
        }
    }
}

#[test]
fn first_writer_wins() {
    let mut scope = Scope::new(["y"]);
    let d = Digest::of_name("x");
    assert!(scope.introduce("a", d).unwrap());
    assert!(!scope.introduce("b", d).unwrap());
    assert_eq!(scope.canonical_name("b").unwrap(), "a");
    assert_eq!(scope.lookup("b").unwrap(), d);
}

#[test]
fn redefinition_is_rejected() {
    let mut scope = Scope::default();
    scope.introduce("a", Digest::of_name("a")).unwrap();
    assert!(matches!(
        scope.introduce("a", Digest::of_name("b")),
        Err(CseError::MalformedGraph(MalformedGraphError::RedefinedValue(name))) if name == "a"
    ));
}

#[test]
fn undefined_lookup_is_rejected() {
    let scope = Scope::default();
    assert!(matches!(
        scope.lookup("nope"),
        Err(CseError::MalformedGraph(MalformedGraphError::UndefinedValue(_)))
    ));
    assert!(matches!(
        scope.canonical_name_of(&Digest::of_name("nope")),
        Err(CseError::MissingCanonicalName(_))
    ));
}

#[test]
fn forks_are_independent() {
    let mut parent = Scope::new(["out"]);
    parent.introduce("x", Digest::of_name("x")).unwrap();

    let mut then_scope = parent.fork_for_subgraph(["t"]);
    let mut else_scope = parent.fork_for_subgraph(["e"]);
    assert!(then_scope.introduce("t", Digest::of_name("t")).unwrap());
    assert!(else_scope.lookup("t").is_err());
    assert!(else_scope.introduce("t", Digest::of_name("t")).unwrap());
    assert!(parent.lookup("t").is_err());

    assert_eq!(then_scope.canonical_name("x").unwrap(), "x");
    assert!(then_scope.is_declared_output("t"));
    assert!(!then_scope.is_declared_output("out"));
}
