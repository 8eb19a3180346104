//! Source inputs.
//!
//! An input names a body of source text: a string handed in by the host or
//! a memory-mapped file. The compiler collaborator consumes inputs; the core
//! uses them to render source lines in stack dumps.

use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

use crate::context::Context;
use crate::error::VmResult;
use crate::heap::{HeapObject, Kind};
use crate::string::StrData;
use crate::value::Value;

/// A source input.
pub struct InputObject {
    pub(crate) name: String,
    pub(crate) data: StrData,
}

impl<'vm> Context<'vm> {
    /// True when the value is an input.
    pub fn is_input(&self, v: Value) -> bool {
        matches!(v.heap_ref().map(|r| self.core.heap.kind(r)), Some(Kind::Input))
    }

    /// Creates an input over a source string.
    pub fn string_input_new(&mut self, name: &str, src: Value) -> VmResult<Value> {
        let bytes = match self.str_bytes(src) {
            Some(b) => b.to_vec(),
            None => return Err(self.throw_type_error("the value is not a string")),
        };

        let r = self.heap_add(HeapObject::Input(InputObject {
            name: name.to_string(),
            data: StrData::Owned(Arc::from(bytes.as_slice())),
        }));
        Ok(Value::Heap(r))
    }

    /// Creates an input by memory-mapping a source file.
    pub fn file_input_new(&mut self, path: &Path) -> VmResult<Value> {
        let file = match std::fs::File::open(path) {
            Ok(f) => f,
            Err(e) => {
                return Err(self.throw_system_error(format!(
                    "cannot open \"{}\": {e}",
                    path.display()
                )))
            }
        };

        // Safety: read-only mapping; input bytes are never mutated.
        let map = match unsafe { Mmap::map(&file) } {
            Ok(m) => m,
            Err(e) => {
                return Err(self.throw_system_error(format!(
                    "cannot map \"{}\": {e}",
                    path.display()
                )))
            }
        };

        let r = self.heap_add(HeapObject::Input(InputObject {
            name: path.to_string_lossy().into_owned(),
            data: StrData::Mapped(Arc::new(map)),
        }));
        Ok(Value::Heap(r))
    }

    /// The input's display name.
    pub fn input_name(&self, v: Value) -> Option<&str> {
        match v.heap_ref().map(|r| self.core.heap.try_get(r))?? {
            HeapObject::Input(i) => Some(i.name.as_str()),
            _ => None,
        }
    }

    /// The input's full text, when it is valid UTF-8.
    pub fn input_text(&self, v: Value) -> Option<&str> {
        match v.heap_ref().map(|r| self.core.heap.try_get(r))?? {
            HeapObject::Input(i) => std::str::from_utf8(i.data.bytes()).ok(),
            _ => None,
        }
    }

    /// One source line (1-based), for stack dumps.
    pub fn input_line(&self, v: Value, line: u32) -> Option<String> {
        if line == 0 {
            return None;
        }
        let text = self.input_text(v)?;
        text.lines().nth(line as usize - 1).map(str::to_string)
    }
}
