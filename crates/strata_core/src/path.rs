//! Path expressions over a field tree
//!
//! Paths are `/`-separated names, such as `flags/is_large` or `file[2]/filename`. `.` is a no-op
//! and `..` steps back to the enclosing field set. A `..` that follows a name cancels it, so
//! `content/../type` names the same node as `type`; leading `..` segments climb above the set the
//! lookup starts from. A leading `/` starts from the root of the tree.
//!
//! Sets do not own a link to their parent. The sets enclosing the one being produced are handed
//! to its grammar as a chain of borrows, so only lookups made through a
//! [`Builder`](crate::Builder) can climb; a lookup on a detached set that climbs names nothing.

use crate::error::{Error, Result};

/// A parsed path: where it starts and the names walked down from there
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path<'a> {
    /// Starts from the root of the tree
    pub absolute: bool,
    /// Enclosing sets to climb before walking down
    pub up: usize,
    /// Names to walk down, `.` and cancelled `..` removed
    pub segments: Vec<&'a str>,
}

impl<'a> Path<'a> {
    /// Whether the path stays inside the set it starts from
    pub fn is_local(&self) -> bool {
        !self.absolute && self.up == 0
    }
}

/// Parse `path`
pub fn parse(path: &str) -> Result<Path<'_>> {
    let absolute = path.starts_with('/');
    let mut up = 0;
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    if absolute {
                        return Err(Error::FieldNotFound(path.to_owned()));
                    }
                    up += 1;
                }
            }
            name => segments.push(name),
        }
    }
    Ok(Path {
        absolute,
        up,
        segments,
    })
}

/// Base name and index of an array element name such as `file[3]`
pub fn split_index(name: &str) -> Option<(&str, usize)> {
    let open = name.rfind('[')?;
    let index = name.strip_suffix(']')?.get(open + 1..)?.parse().ok()?;
    Some((&name[..open], index))
}

/// Strip the `[]` suffix that asks for automatic array numbering
pub fn array_base(name: &str) -> Option<&str> {
    name.strip_suffix("[]")
}
