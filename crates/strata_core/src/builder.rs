//! Production context handed to a [`Grammar`](crate::Grammar) step

use crate::{
    error::{Error, Result},
    field::{Charset, Field, FieldType, Render, Value},
    field_set::{FieldSet, Grammar, Node, Scope},
    path,
    stream::{BitStream, Endian},
};

/// Appends children to the field set being produced and reads back the ones already there
///
/// Reading a sibling that has not been produced yet is an [`Error::ForwardReference`]; grammars
/// can only look backwards. Nested sets are still produced on demand, so
/// `cx.flag("flags/is_large")` works while `flags` itself is lazy.
///
/// Paths may climb: `../flags/has_added_size` reads a field of the parent set and `/type` one of
/// the root. Ancestors are still being produced, so only what they have produced so far is
/// visible there.
pub struct Builder<'a> {
    set: &'a mut FieldSet,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Builder<'a> {
    pub(crate) fn new(set: &'a mut FieldSet, parent: Option<&'a Scope<'a>>) -> Self {
        Self { set, parent }
    }

    /// Nesting depth of the set being produced; the root is at depth 0
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut scope = self.parent;
        while let Some(current) = scope {
            depth += 1;
            scope = current.parent;
        }
        depth
    }

    /// Name of the set being produced
    pub fn name(&self) -> &str {
        self.set.name()
    }

    /// Input stream
    pub fn stream(&self) -> &BitStream {
        &self.set.stream
    }

    /// Integer byte and bit order of the set
    pub fn endian(&self) -> Endian {
        self.set.endian
    }

    /// Absolute bit address of the next child
    pub fn address(&self) -> u64 {
        self.set.address() + self.set.current_size
    }

    /// Bits produced so far, relative to the start of the set
    pub fn offset(&self) -> u64 {
        self.set.current_size
    }

    /// Bits left before the declared end of the set
    pub fn remaining(&self) -> Option<u64> {
        self.set
            .declared_size
            .map(|size| size.saturating_sub(self.set.current_size))
    }

    /// Whether the declared end of the set or the end of the input has been reached
    pub fn eof(&self) -> bool {
        self.remaining() == Some(0) || self.address() >= self.stream().len_bits()
    }

    /// Read `width` bits at the cursor without producing a field
    pub fn peek(&self, width: u32) -> Result<u64> {
        self.stream().read_bits(self.address(), width, self.endian())
    }

    /// Borrow `len` bytes at the cursor without producing a field
    pub fn peek_bytes(&self, len: u64) -> Result<&[u8]> {
        let width = self.byte_width("peek", len)?;
        self.stream().read_aligned(self.address(), width)
    }

    /// Width in bits of `len` bytes, refusing lengths no input can hold
    fn byte_width(&self, name: &str, len: u64) -> Result<u64> {
        len.checked_mul(8).ok_or_else(|| {
            Error::structure(
                self.set.name(),
                format!("`{name}` of {len} bytes overflows the bit address space"),
            )
        })
    }

    /// Declare the final size of the set once the grammar knows it
    pub fn set_size(&mut self, bits: u64) -> Result<()> {
        if bits < self.set.current_size {
            return Err(Error::structure(
                self.set.name(),
                format!(
                    "declared size of {bits} bits is smaller than the {} bits already read",
                    self.set.current_size
                ),
            ));
        }
        self.set.declared_size = Some(bits);
        Ok(())
    }

    /// Rename the set; a `[]` suffix is numbered when the parent adds it
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.set.name = name.into();
    }

    /// Describe the set
    pub fn describe(&mut self, description: impl Into<String>) {
        self.set.description = Some(description.into());
    }

    /// Give the set a summary value
    pub fn set_value(&mut self, value: Value) {
        self.set.value = Some(value);
    }

    /// Log a warning and keep it with the set
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(set = %self.set.name(), "{message}");
        self.set.warnings.push(message);
    }

    /// Refuse a child of `width` bits that would end past the declared size of the set
    fn reserve(&mut self, name: &str, width: u64) -> Result<()> {
        let end = self.set.current_size.saturating_add(width);
        match self.set.declared_size {
            Some(limit) if end > limit => {
                self.warn(format!(
                    "`{name}` needs {width} bits but only {} remain; keeping the rest as raw bytes",
                    limit - self.set.current_size
                ));
                Err(Error::SizeExceeded {
                    path: self.set.name().to_owned(),
                    name: name.to_owned(),
                    end,
                    size: limit,
                })
            }
            _ => Ok(()),
        }
    }

    fn append(&mut self, node: Node, size: u64) -> Result<usize> {
        self.reserve(node.name(), size)?;
        self.set.insert(node, size)
    }

    fn emit(
        &mut self,
        name: &str,
        width: u64,
        field_type: FieldType,
        value: Value,
        display: Option<String>,
    ) -> Result<()> {
        let mut field = Field::new(
            self.set.stream.clone(),
            name,
            self.address(),
            width,
            field_type,
            value,
        );
        if let Some(display) = display {
            field = field.with_display(display);
        }
        self.append(Node::Field(field), width).map(drop)
    }

    /// Produce a one-bit flag
    pub fn add_bit(&mut self, name: &str) -> Result<bool> {
        self.reserve(name, 1)?;
        let value = self.peek(1)? != 0;
        self.emit(name, 1, FieldType::Bit, Value::Bool(value), None)?;
        Ok(value)
    }

    /// Produce an unsigned bit field of `width` bits
    pub fn add_bits(&mut self, name: &str, width: u32) -> Result<u64> {
        self.reserve(name, width.into())?;
        let value = self.peek(width)?;
        self.emit(name, width.into(), FieldType::Bits, Value::UInt(value), None)?;
        Ok(value)
    }

    /// Produce an unsigned integer of `width` bits
    pub fn add_uint(&mut self, name: &str, width: u32) -> Result<u64> {
        self.add_uint_with(name, width, Render::Decimal)
    }

    /// Produce an unsigned integer rendered in hexadecimal
    pub fn add_hex(&mut self, name: &str, width: u32) -> Result<u64> {
        self.add_uint_with(name, width, Render::Hex)
    }

    /// Produce an unsigned integer with named values
    pub fn add_enum(
        &mut self,
        name: &str,
        width: u32,
        names: &'static [(u64, &'static str)],
    ) -> Result<u64> {
        self.add_uint_with(name, width, Render::Names(names))
    }

    /// Produce an unsigned integer with the given rendering
    pub fn add_uint_with(&mut self, name: &str, width: u32, render: Render) -> Result<u64> {
        self.reserve(name, width.into())?;
        let value = self.peek(width)?;
        let field_type = match render {
            Render::Names(_) => FieldType::Enum,
            _ if width % 8 != 0 => FieldType::Bits,
            _ => FieldType::Integer,
        };
        let display = render.apply(value, width);
        self.emit(name, width.into(), field_type, Value::UInt(value), display)?;
        Ok(value)
    }

    /// Produce a two's complement integer of `width` bits
    pub fn add_int(&mut self, name: &str, width: u32) -> Result<i64> {
        self.reserve(name, width.into())?;
        let value = self
            .stream()
            .read_signed(self.address(), width, self.endian())?;
        self.emit(name, width.into(), FieldType::Integer, Value::Int(value), None)?;
        Ok(value)
    }

    /// Produce a fixed-length string of `len` bytes
    pub fn add_string(&mut self, name: &str, len: u64, charset: Charset) -> Result<String> {
        let width = self.byte_width(name, len)?;
        self.reserve(name, width)?;
        let text = charset.decode(self.peek_bytes(len)?);
        self.emit(name, width, FieldType::String, Value::Text(text.clone()), None)?;
        Ok(text)
    }

    /// Produce a fixed-length string with surrounding spaces and NULs removed
    pub fn add_padded_string(&mut self, name: &str, len: u64, charset: Charset) -> Result<String> {
        let width = self.byte_width(name, len)?;
        self.reserve(name, width)?;
        let decoded = charset.decode(self.peek_bytes(len)?);
        let text = decoded.trim_matches(|c: char| c == ' ' || c == '\0').to_owned();
        self.emit(name, width, FieldType::String, Value::Text(text.clone()), None)?;
        Ok(text)
    }

    /// Produce an opaque byte range; nothing is produced for `len == 0`
    pub fn add_raw(&mut self, name: &str, len: u64) -> Result<()> {
        let width = self.byte_width(name, len)?;
        self.add_opaque(name, width, FieldType::Raw)
    }

    /// Produce bytes that carry no information; nothing is produced for `len == 0`
    pub fn add_padding(&mut self, name: &str, len: u64) -> Result<()> {
        let width = self.byte_width(name, len)?;
        self.add_opaque(name, width, FieldType::Padding)
    }

    fn add_opaque(&mut self, name: &str, width: u64, field_type: FieldType) -> Result<()> {
        if width == 0 {
            return Ok(());
        }
        self.reserve(name, width)?;
        self.stream().ensure(self.address(), width)?;
        self.emit(name, width, field_type, Value::Raw(width / 8), None)
    }

    /// Emit padding up to byte `offset`, relative to the start of the set
    pub fn seek_byte(&mut self, offset: u64, name: &str) -> Result<()> {
        let target = self.byte_width(name, offset)?;
        let current = self.set.current_size;
        if target < current {
            return Err(Error::structure(
                self.set.name(),
                format!("cannot seek back to byte {offset} from bit {current}"),
            ));
        }
        if target > current {
            self.add_opaque(name, target - current, FieldType::Padding)?;
        }
        Ok(())
    }

    /// Produce a field built by the grammar; it must start at [`Builder::address`]
    pub fn add_field(&mut self, field: Field) -> Result<()> {
        if field.address() != self.address() {
            return Err(Error::structure(
                self.set.name(),
                format!(
                    "`{}` starts at bit {} instead of {}",
                    field.name(),
                    field.address(),
                    self.address()
                ),
            ));
        }
        self.reserve(field.name(), field.size())?;
        self.stream().ensure(field.address(), field.size())?;
        let size = field.size();
        self.append(Node::Field(field), size).map(drop)
    }

    /// Create a nested set at the cursor, sharing the stream and byte order of this one
    pub fn child(&self, name: &str, grammar: impl Grammar + 'static) -> FieldSet {
        FieldSet::new(self.set.stream.clone(), name, self.address(), grammar)
            .with_endian(self.endian())
    }

    /// Add a nested set created with [`Builder::child`]
    ///
    /// Its size must be known to place the next sibling, so a set without a declared size is
    /// produced until its grammar declares one or finishes.
    pub fn add_set(&mut self, mut set: FieldSet) -> Result<&mut FieldSet> {
        if set.address() != self.address() {
            return Err(Error::structure(
                self.set.name(),
                format!(
                    "`{}` starts at bit {} instead of {}",
                    set.name(),
                    set.address(),
                    self.address()
                ),
            ));
        }
        let scope = Scope {
            set: self.set,
            parent: self.parent,
        };
        let size = set.resolve_size(Some(&scope))?;
        let index = self.append(Node::Set(set), size)?;
        let missing = Error::FieldNotFound(format!("{}[{index}]", self.set.name()));
        match self.set.children.get_index_mut(index) {
            Some((_, Node::Set(set))) => Ok(set),
            _ => Err(missing),
        }
    }

    fn sibling(&mut self, path: &str) -> Result<Option<&Node>> {
        let path = path::parse(path)?;
        if let Some(scope) = self.parent.filter(|_| !path.is_local()) {
            let ancestor = if path.absolute {
                Some(scope.root())
            } else {
                scope.ancestor(path.up)
            };
            return Ok(ancestor.and_then(|set| set.find_segments(&path.segments)));
        }
        if path.up > 0 {
            return Ok(None);
        }

        let segments = path.segments;
        let Some((first, rest)) = segments.split_first() else {
            return Ok(None);
        };
        let Some(index) = self.set.children.get_index_of(*first) else {
            return Ok(None);
        };
        if !rest.is_empty() {
            self.set.produce_below(index, rest, self.parent)?;
        }
        Ok(self.set.resolve_mut(&segments).map(|node| &*node))
    }

    /// Whether `path` names an already produced node
    pub fn contains(&mut self, path: &str) -> Result<bool> {
        Ok(self.sibling(path)?.is_some())
    }

    /// Node at `path`, which must already have been produced
    pub fn node(&mut self, path: &str) -> Result<&Node> {
        let set = self.set.name().to_owned();
        self.sibling(path)?.ok_or_else(|| Error::ForwardReference {
            path: set,
            name: path.to_owned(),
        })
    }

    /// Value at `path`
    pub fn value(&mut self, path: &str) -> Result<Value> {
        self.node(path)?
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

    /// Flag at `path`, or `false` when the node does not exist
    pub fn flag_or_false(&mut self, path: &str) -> Result<bool> {
        match self.sibling(path)? {
            Some(node) => Ok(node.value().and_then(Value::as_bool).unwrap_or(false)),
            None => Ok(false),
        }
    }
}
