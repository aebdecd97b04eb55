//! Lazily produced interior nodes of a field tree
//!
//! A [`FieldSet`] owns a [`Grammar`] that produces its children a few at a time. Nothing is read
//! from the stream until a lookup asks for a child that does not exist yet; the set then steps its
//! grammar until the child appears or production ends. Lookups therefore take `&mut self`, while
//! inspection of what has already been produced ([`FieldSet::iter`], [`FieldSet::find`]) does not
//! and never reads.
//!
//! Production rules shared by every grammar:
//!
//! - children are contiguous: each starts where the previous one ended
//! - a child that would end past the declared size of its parent is refused; the remainder of the
//!   parent is kept as a `raw[]` field, a warning is recorded and production stops
//! - when production ends short of the declared size, the gap is kept as a trailing `raw[]` field
//! - a child set with no declared size is produced to completion when it is added
//! - a grammar error stops production for good; the children produced so far stay readable and
//!   further pulls report [`Error::Incomplete`]
//!
//! While a set is produced, the sets enclosing it are lent to its grammar as a [`Scope`] chain so
//! that [`Builder`] lookups such as `../flags/is_large` can read what its ancestors have produced.
//! A nested set is moved out of its parent for the duration of its own production, which is what
//! lets the parent be borrowed at the same time.

use indexmap::IndexMap;
use std::{collections::HashMap, fmt};

use crate::{
    builder::Builder,
    error::{Error, Result},
    field::{Field, FieldType, Value},
    path,
    stream::{BitStream, Endian},
};

/// Read-only view of the sets enclosing the one being produced, innermost first
#[derive(Clone, Copy)]
pub(crate) struct Scope<'a> {
    pub(crate) set: &'a FieldSet,
    pub(crate) parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    /// The set `levels` steps up from the one being produced; `1` is its parent
    pub(crate) fn ancestor(&self, levels: usize) -> Option<&'a FieldSet> {
        let mut scope = self;
        for _ in 1..levels {
            scope = scope.parent?;
        }
        Some(scope.set)
    }

    /// The outermost set
    pub(crate) fn root(&self) -> &'a FieldSet {
        let mut scope = self;
        while let Some(parent) = scope.parent {
            scope = parent;
        }
        scope.set
    }
}

/// Result of one production step
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Step {
    /// More children may follow
    Continue,
    /// Production is complete
    Done,
}

/// Produces the children of a [`FieldSet`]
///
/// Each call to [`Grammar::step`] appends one or more children through the [`Builder`] and reports
/// whether more may follow. Grammars keep whatever state they need between steps in `self`.
pub trait Grammar {
    /// Name of the structure this grammar produces
    fn type_name(&self) -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Produce the next children
    fn step(&mut self, cx: &mut Builder<'_>) -> Result<Step>;
}

/// A node of the tree: a leaf [`Field`] or a nested [`FieldSet`]
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Node {
    /// Leaf value
    Field(Field),
    /// Nested structure
    Set(FieldSet),
}

impl Node {
    /// Name, unique within the parent
    pub fn name(&self) -> &str {
        match self {
            Self::Field(field) => field.name(),
            Self::Set(set) => set.name(),
        }
    }

    fn rename(&mut self, name: String) {
        match self {
            Self::Field(field) => field.rename(name),
            Self::Set(set) => set.name = name,
        }
    }

    /// Absolute bit address
    pub fn address(&self) -> u64 {
        match self {
            Self::Field(field) => field.address(),
            Self::Set(set) => set.address(),
        }
    }

    /// Size in bits, if known
    pub fn size(&self) -> Option<u64> {
        match self {
            Self::Field(field) => Some(field.size()),
            Self::Set(set) => set.size(),
        }
    }

    /// Value of a field, or the summary value a set may carry
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Field(field) => Some(field.value()),
            Self::Set(set) => set.value.as_ref(),
        }
    }

    /// Rendering for humans
    pub fn display(&self) -> Option<String> {
        match self {
            Self::Field(field) => Some(field.display()),
            Self::Set(set) => set.value.as_ref().map(ToString::to_string),
        }
    }

    /// Description, if any
    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Field(field) => field.description(),
            Self::Set(set) => set.description(),
        }
    }

    /// The leaf, if this is one
    pub fn as_field(&self) -> Option<&Field> {
        match self {
            Self::Field(field) => Some(field),
            Self::Set(_) => None,
        }
    }

    /// The nested set, if this is one
    pub fn as_set(&self) -> Option<&FieldSet> {
        match self {
            Self::Set(set) => Some(set),
            Self::Field(_) => None,
        }
    }

    /// The nested set, if this is one
    pub fn as_set_mut(&mut self) -> Option<&mut FieldSet> {
        match self {
            Self::Set(set) => Some(set),
            Self::Field(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Pending,
    Producing,
    Done,
    Failed(String),
}

/// An addressed, lazily produced group of fields
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FieldSet {
    pub(crate) name: String,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    type_name: &'static str,
    address: u64,
    #[cfg_attr(feature = "serde", serde(rename = "size"))]
    pub(crate) declared_size: Option<u64>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub(crate) current_size: u64,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub(crate) endian: Endian,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub(crate) description: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub(crate) value: Option<Value>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub(crate) warnings: Vec<String>,
    pub(crate) children: IndexMap<String, Node>,
    #[cfg_attr(feature = "serde", serde(skip))]
    counters: HashMap<String, usize>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub(crate) stream: BitStream,
    #[cfg_attr(feature = "serde", serde(skip))]
    grammar: Option<Box<dyn Grammar>>,
    #[cfg_attr(feature = "serde", serde(skip))]
    state: State,
}

impl fmt::Debug for FieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSet")
            .field("name", &self.name)
            .field("type", &self.type_name)
            .field("address", &self.address)
            .field("size", &self.declared_size)
            .field("state", &self.state)
            .field("children", &self.children.values().collect::<Vec<_>>())
            .finish()
    }
}

impl FieldSet {
    /// Create a set at absolute bit `address` whose children come from `grammar`
    pub fn new(
        stream: BitStream,
        name: impl Into<String>,
        address: u64,
        grammar: impl Grammar + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: grammar.type_name(),
            address,
            declared_size: None,
            current_size: 0,
            endian: Endian::default(),
            description: None,
            value: None,
            warnings: Vec::new(),
            children: IndexMap::new(),
            counters: HashMap::new(),
            stream,
            grammar: Some(Box::new(grammar)),
            state: State::Pending,
        }
    }

    /// Create the root of a tree, spanning the whole stream
    pub fn root(stream: BitStream, grammar: impl Grammar + 'static) -> Self {
        let size = stream.len_bits();
        Self::new(stream, "root", 0, grammar).with_size(size)
    }

    /// Declare the size of the set up front
    pub fn with_size(mut self, bits: u64) -> Self {
        self.declared_size = Some(bits);
        self
    }

    /// Byte and bit order for integer reads of this set
    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Name, unique within the parent
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the grammar that produces this set
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Absolute bit address
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Size in bits: the declared size, or the produced size once production is complete
    pub fn size(&self) -> Option<u64> {
        self.declared_size
    }

    /// Bits covered by the children produced so far
    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    /// Absolute bit address just past the set, if its size is known
    pub fn end(&self) -> Option<u64> {
        self.declared_size.map(|size| self.address.saturating_add(size))
    }

    /// Integer byte and bit order
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Description, if the grammar gave one
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Summary value, if the grammar gave one
    pub fn summary(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Input this set reads from
    pub fn stream(&self) -> &BitStream {
        &self.stream
    }

    /// Warnings recorded while producing this set
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Whether production has finished successfully
    pub fn is_complete(&self) -> bool {
        self.state == State::Done
    }

    /// Message of the error that stopped production, if any
    pub fn failure(&self) -> Option<&str> {
        match &self.state {
            State::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Number of children produced so far
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether no child has been produced yet
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Children produced so far, in address order
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.children.values()
    }

    /// Children produced so far, in address order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.children.values_mut()
    }

    /// Look up a child that has already been produced
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.children.get(name)
    }

    /// Resolve `path` among nodes that have already been produced, without reading
    pub fn find(&self, path: &str) -> Option<&Node> {
        let path = path::parse(path).ok()?;
        if path.up > 0 {
            return None;
        }
        self.find_segments(&path.segments)
    }

    pub(crate) fn find_segments(&self, segments: &[&str]) -> Option<&Node> {
        let (last, parents) = segments.split_last()?;
        let mut set = self;
        for name in parents {
            set = set.children.get(*name)?.as_set()?;
        }
        set.children.get(*last)
    }

    /// Run one production step; `Ok(false)` once nothing more can be produced
    pub(crate) fn pull(&mut self, parent: Option<&Scope<'_>>) -> Result<bool> {
        match &self.state {
            State::Done => return Ok(false),
            State::Failed(reason) => {
                return Err(Error::Incomplete {
                    path: self.name.clone(),
                    reason: reason.clone(),
                })
            }
            State::Producing => {
                return Err(Error::ForwardReference {
                    path: self.name.clone(),
                    name: "<self>".into(),
                })
            }
            State::Pending => {}
        }

        let Some(mut grammar) = self.grammar.take() else {
            self.finish()?;
            return Ok(false);
        };

        self.state = State::Producing;
        let outcome = grammar.step(&mut Builder::new(self, parent));
        match outcome {
            Ok(Step::Continue) => {
                self.grammar = Some(grammar);
                self.state = State::Pending;
                Ok(true)
            }
            Ok(Step::Done) | Err(Error::SizeExceeded { .. }) => {
                self.finish()?;
                Ok(false)
            }
            Err(err) => {
                self.state = State::Failed(err.to_string());
                Err(err)
            }
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.grammar = None;
        match self.declared_size {
            Some(size) if size > self.current_size => {
                let address = self.address + self.current_size;
                let width = size - self.current_size;
                if let Err(err) = self.stream.ensure(address, width) {
                    self.state = State::Failed(err.to_string());
                    return Err(err);
                }
                let field = Field::new(
                    self.stream.clone(),
                    "raw[]",
                    address,
                    width,
                    FieldType::Raw,
                    Value::Raw(width / 8),
                );
                self.insert(Node::Field(field), width)?;
            }
            Some(_) => {}
            None => self.declared_size = Some(self.current_size),
        }
        self.state = State::Done;
        Ok(())
    }

    /// Produce children until the size of the set is known
    pub(crate) fn resolve_size(&mut self, parent: Option<&Scope<'_>>) -> Result<u64> {
        loop {
            if let Some(size) = self.declared_size {
                return Ok(size);
            }
            if !self.pull(parent)? {
                return Ok(self.current_size);
            }
        }
    }

    /// Append `node`, covering `size` bits, under its resolved name; returns its index
    pub(crate) fn insert(&mut self, mut node: Node, size: u64) -> Result<usize> {
        let name = match path::array_base(node.name()) {
            Some(base) => {
                let counter = self.counters.entry(base.to_owned()).or_default();
                let name = format!("{base}[{counter}]");
                *counter += 1;
                name
            }
            None => node.name().to_owned(),
        };
        if self.children.contains_key(&name) {
            return Err(Error::DuplicateField {
                path: self.name.clone(),
                name,
            });
        }
        node.rename(name.clone());
        self.current_size = self.current_size.saturating_add(size);
        Ok(self.children.insert_full(name, node).0)
    }

    /// Resolve `segments`, producing what is missing along the way
    pub(crate) fn lookup(
        &mut self,
        segments: &[&str],
        parent: Option<&Scope<'_>>,
    ) -> Result<Option<&mut Node>> {
        self.produce(segments, parent)?;
        Ok(self.resolve_mut(segments))
    }

    /// Produce children until the first of `segments` exists, then continue inside it
    fn produce(&mut self, segments: &[&str], parent: Option<&Scope<'_>>) -> Result<()> {
        let Some((first, rest)) = segments.split_first() else {
            return Ok(());
        };
        while !self.children.contains_key(*first) {
            if !self.pull(parent)? {
                return Ok(());
            }
        }
        match self.children.get_index_of(*first) {
            Some(index) if !rest.is_empty() => self.produce_below(index, rest, parent),
            _ => Ok(()),
        }
    }

    /// Produce `rest` inside the child set at `index`, with this set as its parent
    ///
    /// The child is moved out while it is produced so that this set can be lent to it.
    pub(crate) fn produce_below(
        &mut self,
        index: usize,
        rest: &[&str],
        parent: Option<&Scope<'_>>,
    ) -> Result<()> {
        self.with_child(index, parent, |child, scope| child.produce(rest, Some(scope)))
    }

    fn with_child(
        &mut self,
        index: usize,
        parent: Option<&Scope<'_>>,
        produce: impl FnOnce(&mut FieldSet, &Scope<'_>) -> Result<()>,
    ) -> Result<()> {
        let placeholder = Node::Field(Field::new(
            self.stream.clone(),
            "",
            0,
            0,
            FieldType::Padding,
            Value::Raw(0),
        ));
        let Some((_, slot)) = self.children.get_index_mut(index) else {
            return Ok(());
        };
        if !matches!(slot, Node::Set(_)) {
            return Ok(());
        }
        let mut node = std::mem::replace(slot, placeholder);
        let result = match &mut node {
            Node::Set(child) => {
                let scope = Scope { set: self, parent };
                produce(child, &scope)
            }
            Node::Field(_) => Ok(()),
        };
        if let Some((_, slot)) = self.children.get_index_mut(index) {
            *slot = node;
        }
        result
    }

    /// Walk `segments` through nodes that exist
    pub(crate) fn resolve_mut(&mut self, segments: &[&str]) -> Option<&mut Node> {
        let (first, rest) = segments.split_first()?;
        let node = self.children.get_mut(*first)?;
        if rest.is_empty() {
            return Some(node);
        }
        match node {
            Node::Set(set) => set.resolve_mut(rest),
            Node::Field(_) => None,
        }
    }

    /// Produce everything
    pub fn materialize(&mut self) -> Result<()> {
        while self.pull(None)? {}
        Ok(())
    }

    /// Produce everything that can be produced, returning the error that stopped production
    ///
    /// The children produced before the error stay in the tree.
    pub fn materialize_tolerant(&mut self) -> Option<Error> {
        match self.materialize() {
            Ok(()) => None,
            Err(err) => {
                tracing::warn!(set = %self.name, "{err}");
                Some(err)
            }
        }
    }

    /// Produce this set and every nested set
    pub fn materialize_all(&mut self) -> Result<()> {
        self.materialize_within(None)
    }

    fn materialize_within(&mut self, parent: Option<&Scope<'_>>) -> Result<()> {
        while self.pull(parent)? {}
        for index in 0..self.children.len() {
            self.with_child(index, parent, |child, scope| {
                child.materialize_within(Some(scope))
            })?;
        }
        Ok(())
    }

    /// Resolve `path`, producing children as needed
    ///
    /// `Ok(None)` means the path names nothing; errors mean the data needed to answer is
    /// malformed. This set is treated as the root, so `..` cannot climb above it.
    pub fn node(&mut self, path: &str) -> Result<Option<&mut Node>> {
        let path = path::parse(path)?;
        if path.up > 0 {
            return Ok(None);
        }
        self.lookup(&path.segments, None)
    }

    /// Resolve `path`, producing children as needed
    pub fn field(&mut self, path: &str) -> Result<Option<&Node>> {
        Ok(self.node(path)?.map(|node| &*node))
    }

    /// Whether `path` names a node
    pub fn contains(&mut self, path: &str) -> Result<bool> {
        Ok(self.node(path)?.is_some())
    }

    /// Nested set at `path`
    pub fn set(&mut self, path: &str) -> Result<Option<&mut FieldSet>> {
        Ok(self.node(path)?.and_then(Node::as_set_mut))
    }

    /// Value at `path`; [`Error::FieldNotFound`] when absent
    pub fn value(&mut self, path: &str) -> Result<Value> {
        self.node(path)?
            .ok_or_else(|| Error::FieldNotFound(path.to_owned()))?
            .value()
            .cloned()
            .ok_or_else(|| Error::WrongType {
                path: path.to_owned(),
                expected: "a value",
            })
    }

    /// Integer value at `path`
    pub fn uint(&mut self, path: &str) -> Result<u64> {
        self.value(path)?.as_u64().ok_or_else(|| Error::WrongType {
            path: path.to_owned(),
            expected: "an integer",
        })
    }

    /// Flag value at `path`
    pub fn flag(&mut self, path: &str) -> Result<bool> {
        self.value(path)?.as_bool().ok_or_else(|| Error::WrongType {
            path: path.to_owned(),
            expected: "a flag",
        })
    }

    /// Text value at `path`
    pub fn text(&mut self, path: &str) -> Result<String> {
        match self.value(path)? {
            Value::Text(text) => Ok(text),
            _ => Err(Error::WrongType {
                path: path.to_owned(),
                expected: "text",
            }),
        }
    }

    /// Rendering for humans of the node at `path`
    pub fn display(&mut self, path: &str) -> Result<String> {
        self.node(path)?
            .ok_or_else(|| Error::FieldNotFound(path.to_owned()))?
            .display()
            .ok_or_else(|| Error::WrongType {
                path: path.to_owned(),
                expected: "a value",
            })
    }

    /// Elements `base[0]`, `base[1]`, ... producing at most `limit` of them
    pub fn array(&mut self, base: &str, limit: Option<usize>) -> Result<Vec<&mut Node>> {
        let wanted = limit.unwrap_or(usize::MAX);
        while self.counters.get(base).copied().unwrap_or(0) < wanted {
            if !self.pull(None)? {
                break;
            }
        }
        Ok(self
            .children
            .values_mut()
            .filter(|node| is_element(node, base))
            .take(wanted)
            .collect())
    }

    /// Elements of array `base` produced so far, without reading
    pub fn elements_mut(&mut self, base: &str) -> Vec<&mut Node> {
        self.children
            .values_mut()
            .filter(|node| is_element(node, base))
            .collect()
    }
}

fn is_element(node: &Node, base: &str) -> bool {
    path::split_index(node.name()).is_some_and(|(name, _)| name == base)
}
