//! A lazy, bit-addressed field tree for taking apart binary container formats.
//!
//! # Model
//!
//! An input is wrapped in a [`BitStream`] and described by a tree of nodes:
//!
//! | Node         | Holds                                                        |
//! |--------------|--------------------------------------------------------------|
//! | [`Field`]    | a typed leaf value: flag, integer, string, timestamp, bytes  |
//! | [`FieldSet`] | an ordered, named group of child nodes produced on demand    |
//!
//! Every node knows its absolute bit address and its size in bits. Children of a set are
//! contiguous and their names are unique within the set; a name ending in `[]` is numbered
//! automatically (`file[]` becomes `file[0]`, `file[1]`, ...).
//!
//! # Laziness
//!
//! A field set is driven by a [`Grammar`]. Nothing is read until a child is asked for, and then
//! only as much as needed to produce it. Asking whether an archive entry is a directory reads
//! that entry's header and nothing else.
//!
//! ```
//! use strata_core::{BitStream, Builder, FieldSet, Grammar, Result, Step};
//!
//! struct Pair;
//!
//! impl Grammar for Pair {
//!     fn step(&mut self, cx: &mut Builder<'_>) -> Result<Step> {
//!         cx.add_uint("first", 8)?;
//!         cx.add_uint("second", 8)?;
//!         Ok(Step::Done)
//!     }
//! }
//!
//! let mut root = FieldSet::root(BitStream::new(vec![1, 2, 3]), Pair);
//! assert_eq!(root.uint("second")?, 2);
//! // the byte nobody described is kept as raw data
//! root.materialize()?;
//! assert_eq!(root.find("raw[0]").and_then(|n| n.size()), Some(8));
//! # Ok::<(), strata_core::Error>(())
//! ```
//!
//! # Formats
//!
//! Format crates describe themselves with a [`FormatDescriptor`]; a [`FormatRegistry`] detects
//! which one applies to an input and builds its root.

pub mod builder;
pub mod error;
pub mod field;
pub mod field_set;
pub mod options;
pub mod path;
pub mod registry;
pub mod stream;

pub use builder::Builder;
pub use error::{Error, Result};
pub use field::{Charset, Field, FieldType, Render, Value};
pub use field_set::{FieldSet, Grammar, Node, Step};
pub use options::ParseOptions;
pub use registry::{FormatDescriptor, FormatRegistry, Magic};
pub use stream::{BitStream, Endian};
