//! Enumerations and bitfields.
//!
//! An enum is an object specialisation holding a value→name item table.
//! Numeric `get` on the enum view maps a value back to its name; the
//! bitfield view decomposes a mask into the set bits' names joined by `|`,
//! rendering residual bits in hex. Each item name is also a constant
//! property carrying its numeric value, so named access goes through the
//! ordinary object path. Writes are rejected.

use indexmap::IndexMap;

use crate::context::Context;
use crate::error::VmResult;
use crate::heap::{GcRef, HeapObject, Kind};
use crate::object::{ObjectData, Property};
use crate::value::Value;

/// The two enumeration views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumKind {
    /// One name per value.
    Enum,
    /// Names are bit masks; composite values render as `a|b`.
    Bitfield,
}

/// An enumeration object.
pub struct EnumObject {
    pub(crate) object: ObjectData,
    pub(crate) kind: EnumKind,
    pub(crate) items: IndexMap<i32, GcRef>,
}

impl<'vm> Context<'vm> {
    /// True when the value is an enumeration or bitfield.
    pub fn is_enum(&self, v: Value) -> bool {
        matches!(v.heap_ref().map(|r| self.core.heap.kind(r)), Some(Kind::Enum))
    }

    /// Creates an enumeration from `(name, value)` items. The first name of
    /// a value wins the reverse mapping.
    pub fn enum_new(&mut self, kind: EnumKind, items: &[(&str, i32)]) -> VmResult<Value> {
        let r = self.heap_add(HeapObject::Enum(EnumObject {
            object: ObjectData::new(Value::Null),
            kind,
            items: IndexMap::new(),
        }));
        let e = Value::Heap(r);

        for (name, value) in items {
            let sym = self.sym(name)?;
            self.object_insert_prop(e, sym, Property::Const(Value::Number(*value as f64)))?;

            if let HeapObject::Enum(data) = self.core.heap.get_mut(r) {
                data.items.entry(*value).or_insert(sym);
            }
        }

        Ok(e)
    }

    // Render a numeric value through the enum view.
    fn enum_value_name(&mut self, e: Value, n: i32) -> VmResult<Value> {
        let r = e.heap_ref().expect("enum value is not on the heap");

        let (kind, items): (EnumKind, Vec<(i32, GcRef)>) = match self.core.heap.get(r) {
            HeapObject::Enum(data) => (
                data.kind,
                data.items.iter().map(|(v, s)| (*v, *s)).collect(),
            ),
            _ => unreachable!("enum kind lost its data"),
        };

        match kind {
            EnumKind::Enum => {
                for (value, sym) in items {
                    if value == n {
                        return Ok(Value::Heap(sym));
                    }
                }
                Ok(Value::Null)
            }
            EnumKind::Bitfield => {
                let mut parts: Vec<String> = Vec::new();
                let mut covered: i32 = 0;

                for (value, sym) in items {
                    if value != 0 && (n & value) == value {
                        parts.push(self.sym_text(sym));
                        covered |= value;
                    }
                }

                let residual = n & !covered;
                if residual != 0 {
                    parts.push(format!("{residual:#x}"));
                }

                if parts.is_empty() {
                    return self.string_from_static("0");
                }
                let text = parts.join("|");
                self.string_new(&text)
            }
        }
    }

    // Enum `get`: numeric keys map to names, everything else goes through
    // the object path.
    pub(crate) fn enum_get(&mut self, o: Value, key: Value) -> VmResult<Option<Value>> {
        if let Value::Number(_) = key {
            let n = self.to_int32(key)?;
            return self.enum_value_name(o, n).map(Some);
        }
        self.object_get_t(o, key, o)
    }

    // Enum `lookup`.
    pub(crate) fn enum_lookup(&mut self, o: Value, key: Value) -> VmResult<Value> {
        if let Value::Number(_) = key {
            let n = self.to_int32(key)?;
            return self.enum_value_name(o, n);
        }
        self.object_lookup(o, key)
    }

    // Enum `keys`: the item values in insertion order.
    pub(crate) fn enum_keys(&mut self, o: Value) -> VmResult<Value> {
        let r = o.heap_ref().expect("enum value is not on the heap");
        let values: Vec<i32> = match self.core.heap.get(r) {
            HeapObject::Enum(data) => data.items.keys().copied().collect(),
            _ => unreachable!("enum kind lost its data"),
        };

        let arr = self.array_new(0)?;
        for v in values {
            self.array_append(arr, Value::Number(v as f64))?;
        }
        Ok(arr)
    }
}

// Collect (name, value) items from the constructor's object argument.
fn collect_items(ctx: &mut Context, o: Value) -> VmResult<Vec<(String, i32)>> {
    if !ctx.is_object_like(o) {
        return Err(ctx.throw_type_error("enumeration items must be an object"));
    }

    let keys = ctx.keys(o)?;
    let len = ctx.array_length(keys)?;
    let mut items = Vec::with_capacity(len);

    for i in 0..len {
        let key = ctx.array_get_item(keys, i)?;
        let name = match ctx.str_text(key) {
            Some(t) => t.to_string(),
            None => continue,
        };
        let v = ctx.get(o, key)?;
        let n = ctx.to_int32(v)?;
        items.push((name, n));
    }

    Ok(items)
}

fn enum_create_fn(ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
    let o = args.first().copied().unwrap_or(Value::Null);
    let items = collect_items(ctx, o)?;
    let borrowed: Vec<(&str, i32)> = items.iter().map(|(n, v)| (n.as_str(), *v)).collect();
    ctx.enum_new(EnumKind::Enum, &borrowed)
}

fn bitfield_create_fn(ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
    let o = args.first().copied().unwrap_or(Value::Null);
    let items = collect_items(ctx, o)?;
    let borrowed: Vec<(&str, i32)> = items.iter().map(|(n, v)| (n.as_str(), *v)).collect();
    ctx.enum_new(EnumKind::Bitfield, &borrowed)
}

/// Publishes the `Enum` and `Bitfield` constructors.
pub(crate) fn class_init(ctx: &mut Context) -> VmResult<()> {
    let global = ctx.global_object();
    ctx.object_add_n_method(global, "Enum", enum_create_fn)?;
    ctx.object_add_n_method(global, "Bitfield", bitfield_create_fn)?;
    Ok(())
}
