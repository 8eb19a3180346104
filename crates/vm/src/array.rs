//! Dense arrays.
//!
//! An array is an object specialisation: an ordered vector of values plus
//! the inherited property table. Numeric keys route through the vector:
//! out-of-range reads yield null, out-of-range writes extend with null fill,
//! and deleting an index shifts the tail left. String keys behave as on a
//! plain object.

use crate::context::Context;
use crate::error::VmResult;
use crate::heap::{GcRef, HeapObject, Kind};
use crate::object::ObjectData;
use crate::value::{self, Value};

/// Largest permitted element count.
const MAX_LENGTH: usize = u32::MAX as usize;

/// A dense array plus its property table.
pub struct ArrayObject {
    pub(crate) object: ObjectData,
    pub(crate) items: Vec<Value>,
}

impl<'vm> Context<'vm> {
    /// Creates an array of `len` null elements.
    pub fn array_new(&mut self, len: usize) -> VmResult<Value> {
        if len > MAX_LENGTH {
            return Err(self.throw_range_error(format!("array's length ({len}) is too big")));
        }

        let inf = self.core.globals.array_inf;
        let r = self.heap_add(HeapObject::Array(ArrayObject {
            object: ObjectData::new(inf),
            items: vec![Value::Null; len],
        }));
        Ok(Value::Heap(r))
    }

    /// True when the value is an array.
    pub fn is_array(&self, v: Value) -> bool {
        matches!(v.heap_ref().map(|r| self.core.heap.kind(r)), Some(Kind::Array))
    }

    // The array behind a value, or TypeError.
    fn array_ref(&mut self, a: Value) -> VmResult<GcRef> {
        match a.heap_ref() {
            Some(r) if self.core.heap.kind(r) == Kind::Array => Ok(r),
            _ => Err(self.throw_type_error("the value is not an array")),
        }
    }

    /// Element count.
    pub fn array_length(&mut self, a: Value) -> VmResult<usize> {
        let r = self.array_ref(a)?;
        match self.core.heap.get(r) {
            HeapObject::Array(arr) => Ok(arr.items.len()),
            _ => unreachable!("array kind lost its data"),
        }
    }

    /// Resizes the array, filling new elements with null.
    pub fn array_set_length(&mut self, a: Value, len: usize) -> VmResult<()> {
        if len > MAX_LENGTH {
            return Err(self.throw_range_error(format!("array's length ({len}) is too big")));
        }

        let r = self.array_ref(a)?;
        if let HeapObject::Array(arr) = self.core.heap.get_mut(r) {
            arr.items.resize(len, Value::Null);
        }
        Ok(())
    }

    /// Reads an element; out-of-range reads yield null.
    pub fn array_get_item(&mut self, a: Value, index: usize) -> VmResult<Value> {
        let r = self.array_ref(a)?;
        match self.core.heap.get(r) {
            HeapObject::Array(arr) => Ok(arr.items.get(index).copied().unwrap_or(Value::Null)),
            _ => unreachable!("array kind lost its data"),
        }
    }

    /// Writes an element, extending the array with null fill when `index`
    /// is past the end.
    pub fn array_set_item(&mut self, a: Value, index: usize, v: Value) -> VmResult<()> {
        if index >= MAX_LENGTH {
            return Err(self.throw_range_error(format!("array index ({index}) is too big")));
        }

        let r = self.array_ref(a)?;
        if let HeapObject::Array(arr) = self.core.heap.get_mut(r) {
            if index >= arr.items.len() {
                arr.items.resize(index + 1, Value::Null);
            }
            arr.items[index] = v;
        }
        Ok(())
    }

    /// Appends an element.
    pub fn array_append(&mut self, a: Value, v: Value) -> VmResult<()> {
        let len = self.array_length(a)?;
        self.array_set_item(a, len, v)
    }

    /// Inserts `values` at `pos`, shifting the tail right. `pos` past the
    /// end extends with null fill first.
    pub fn array_insert(&mut self, a: Value, pos: usize, values: &[Value]) -> VmResult<()> {
        let len = self.array_length(a)?;
        let r = self.array_ref(a)?;

        if let HeapObject::Array(arr) = self.core.heap.get_mut(r) {
            if pos > len {
                arr.items.resize(pos, Value::Null);
            }
            for (i, v) in values.iter().enumerate() {
                arr.items.insert(pos + i, *v);
            }
        }
        Ok(())
    }

    /// Removes up to `num` elements starting at `pos`, shifting the tail
    /// left.
    pub fn array_remove(&mut self, a: Value, pos: usize, num: usize) -> VmResult<()> {
        let r = self.array_ref(a)?;
        if let HeapObject::Array(arr) = self.core.heap.get_mut(r) {
            if pos < arr.items.len() {
                let end = (pos + num).min(arr.items.len());
                arr.items.drain(pos..end);
            }
        }
        Ok(())
    }

    /// Copies `[start, end)` into a new array. Negative indices count from
    /// the end.
    pub fn array_slice(&mut self, a: Value, start: isize, end: Option<isize>) -> VmResult<Value> {
        let len = self.array_length(a)? as isize;

        let clamp = |i: isize| -> usize {
            let i = if i < 0 { len + i } else { i };
            i.clamp(0, len) as usize
        };

        let s = clamp(start);
        let e = clamp(end.unwrap_or(len));
        if e <= s {
            return self.array_new(0);
        }

        let r = self.array_ref(a)?;
        let copied: Vec<Value> = match self.core.heap.get(r) {
            HeapObject::Array(arr) => arr.items[s..e].to_vec(),
            _ => unreachable!("array kind lost its data"),
        };

        let out = self.array_new(copied.len())?;
        for (i, v) in copied.into_iter().enumerate() {
            self.array_set_item(out, i, v)?;
        }
        Ok(out)
    }

    // ---- protocol --------------------------------------------------------

    // Array `get`: numeric keys through the vector, others through the
    // generic object path.
    pub(crate) fn array_get(&mut self, o: Value, key: Value) -> VmResult<Option<Value>> {
        if let Value::Number(n) = key {
            if let Some(idx) = value::as_index(n) {
                return self.array_get_item(o, idx).map(Some);
            }
        }
        self.object_get_t(o, key, o)
    }

    // Array `set`.
    pub(crate) fn array_set(&mut self, o: Value, key: Value, v: Value) -> VmResult<()> {
        if let Value::Number(n) = key {
            if let Some(idx) = value::as_index(n) {
                return self.array_set_item(o, idx, v);
            }
        }
        self.object_set_t(o, key, v, o)
    }

    // Array `del`: deleting an index shifts the tail left.
    pub(crate) fn array_del(&mut self, o: Value, key: Value) -> VmResult<()> {
        if let Value::Number(n) = key {
            if let Some(idx) = value::as_index(n) {
                return self.array_remove(o, idx, 1);
            }
        }
        self.object_del(o, key)
    }

    // Array `lookup`: numeric keys are own items.
    pub(crate) fn array_lookup(&mut self, o: Value, key: Value) -> VmResult<Value> {
        if let Value::Number(n) = key {
            if let Some(idx) = value::as_index(n) {
                return self.array_get_item(o, idx);
            }
        }
        self.object_lookup(o, key)
    }
}

// Instance allocation hook used when the Array class is called.
fn array_alloc(ctx: &mut Context, inf: Value) -> VmResult<Value> {
    let r = ctx.heap_add(HeapObject::Array(ArrayObject {
        object: ObjectData::new(inf),
        items: Vec::new(),
    }));
    Ok(Value::Heap(r))
}

fn array_is_fn(ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
    let v = args.first().copied().unwrap_or(Value::Null);
    Ok(Value::Bool(ctx.is_array(v)))
}

fn array_length_get(ctx: &mut Context, _f: Value, this: Value, _a: &[Value]) -> VmResult<Value> {
    let len = ctx.array_length(this)?;
    Ok(Value::Number(len as f64))
}

fn array_length_set(ctx: &mut Context, _f: Value, this: Value, args: &[Value]) -> VmResult<Value> {
    let len = args.first().copied().unwrap_or(Value::Null);
    let len = ctx.to_index(len)?;
    ctx.array_set_length(this, len)?;
    Ok(Value::Null)
}

fn array_push_fn(ctx: &mut Context, _f: Value, this: Value, args: &[Value]) -> VmResult<Value> {
    for v in args {
        ctx.array_append(this, *v)?;
    }
    Ok(this)
}

fn array_insert_fn(ctx: &mut Context, _f: Value, this: Value, args: &[Value]) -> VmResult<Value> {
    if args.len() < 2 {
        return Ok(Value::Null);
    }

    let len = ctx.array_length(this)? as isize;
    let mut pos = ctx.to_ssize(args[0])?;
    if pos < 0 {
        pos = (len + pos).max(0);
    }

    ctx.array_insert(this, pos as usize, &args[1..])?;
    Ok(Value::Null)
}

fn array_remove_fn(ctx: &mut Context, _f: Value, this: Value, args: &[Value]) -> VmResult<Value> {
    let len = ctx.array_length(this)? as isize;

    let mut pos = match args.first().copied() {
        None | Some(Value::Null) => 0,
        Some(v) => ctx.to_ssize(v)?,
    };
    if pos < 0 {
        pos = (len + pos).max(0);
    }

    let num = match args.get(1).copied() {
        None | Some(Value::Null) => 1,
        Some(v) => ctx.to_index(v)?,
    };

    ctx.array_remove(this, pos as usize, num)?;
    Ok(Value::Null)
}

fn array_slice_fn(ctx: &mut Context, _f: Value, this: Value, args: &[Value]) -> VmResult<Value> {
    let start = match args.first().copied() {
        None | Some(Value::Null) => 0,
        Some(v) => ctx.to_ssize(v)?,
    };
    let end = match args.get(1).copied() {
        None | Some(Value::Null) => None,
        Some(v) => Some(ctx.to_ssize(v)?),
    };
    ctx.array_slice(this, start, end)
}

/// Builds the `Array` class.
pub(crate) fn class_init(ctx: &mut Context) -> VmResult<()> {
    let global = ctx.global_object();

    let (class, inf) = ctx.named_class_new(Value::Null, "Array")?;
    ctx.class_set_alloc(class, array_alloc)?;
    ctx.object_add_const_s(global, "Array", class)?;
    ctx.core.globals.array_class = class;
    ctx.core.globals.array_inf = inf;

    ctx.object_add_n_method(class, "is", array_is_fn)?;

    ctx.object_add_n_accessor(inf, "length", Some(array_length_get), Some(array_length_set))?;
    ctx.object_add_n_method(inf, "push", array_push_fn)?;
    ctx.object_add_n_method(inf, "insert", array_insert_fn)?;
    ctx.object_add_n_method(inf, "remove", array_remove_fn)?;
    ctx.object_add_n_method(inf, "slice", array_slice_fn)?;

    Ok(())
}
