use smallvec::SmallVec;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Maximum nesting depth kept inline before the boundary stack spills to the heap.
pub const MAX_INLINE_DEPTH: usize = 16;

/// One step of a structural path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Object member or parameter location, rendered `.key`.
    Key(&'a str),
    /// Array element, rendered `[index]`.
    Index(usize),
}

impl fmt::Display for Segment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => write!(f, ".{key}"),
            Segment::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// Appendable structural path such as `body.items[2].name`.
///
/// Segments are pushed with [`PathBuffer::push`], which returns a guard that
/// truncates the buffer back when dropped, so siblings never observe segments
/// left behind by a previous sibling.
#[derive(Debug, Clone, Default)]
pub struct PathBuffer {
    buf: String,
    marks: SmallVec<[usize; MAX_INLINE_DEPTH]>,
}

impl PathBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a path at `root`, e.g. `body`.
    #[must_use]
    pub fn from_root(root: &str) -> Self {
        Self {
            buf: root.to_string(),
            marks: SmallVec::new(),
        }
    }

    /// Append a segment for the lifetime of the returned guard.
    pub fn push(&mut self, segment: Segment<'_>) -> PathGuard<'_> {
        self.marks.push(self.buf.len());
        match segment {
            Segment::Key(key) => {
                if !self.buf.is_empty() {
                    self.buf.push('.');
                }
                self.buf.push_str(key);
            }
            Segment::Index(index) => {
                self.buf.push('[');
                self.buf.push_str(&index.to_string());
                self.buf.push(']');
            }
        }
        PathGuard { path: self }
    }

    fn pop(&mut self) {
        if let Some(len) = self.marks.pop() {
            self.buf.truncate(len);
        }
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.buf
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The current path extended by `key`, without modifying the buffer.
    #[must_use]
    pub fn with(&self, key: &str) -> String {
        if self.buf.is_empty() {
            key.to_string()
        } else {
            let mut out = String::with_capacity(self.buf.len() + key.len() + 1);
            out.push_str(&self.buf);
            out.push('.');
            out.push_str(key);
            out
        }
    }
}

impl fmt::Display for PathBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.buf)
    }
}

/// Scope guard returned by [`PathBuffer::push`].
pub struct PathGuard<'a> {
    path: &'a mut PathBuffer,
}

impl Deref for PathGuard<'_> {
    type Target = PathBuffer;

    fn deref(&self) -> &PathBuffer {
        self.path
    }
}

impl DerefMut for PathGuard<'_> {
    fn deref_mut(&mut self) -> &mut PathBuffer {
        self.path
    }
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        self.path.pop();
    }
}
