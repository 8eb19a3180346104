//! Objects and the keyed property protocol.
//!
//! Every property-bearing kind embeds an [`ObjectData`]: an interface
//! reference used as the lookup fallback, an insertion-ordered property
//! table, and an optional private slot for host data. The protocol entry
//! points on [`Context`] (`get`, `set`, `del`, `keys`, `lookup`) dispatch on
//! the receiver's kind; the generic object behaviour lives here and the
//! specialised kinds (arrays, strings, scripts, enums, proxies) override the
//! pieces they differ in.

use std::any::{Any, TypeId};

use indexmap::IndexMap;

use crate::context::Context;
use crate::error::VmResult;
use crate::gc::Marker;
use crate::heap::{GcRef, HeapObject, Kind};
use crate::value::Value;

/// A property of an object.
#[derive(Clone, Copy)]
pub enum Property {
    /// Constant value; writes raise `AccessError`.
    Const(Value),
    /// Mutable value.
    Var(Value),
    /// Accessor pair; either side may be null.
    Accessor {
        /// Getter, invoked with `this` = the receiving object.
        get: Value,
        /// Setter, invoked with `this` = the receiving object.
        set: Value,
    },
}

/// Host data attached to an object's private slot.
///
/// The per-type operations token of the protocol is the concrete Rust type:
/// `scan` traces outgoing references, the drop glue is the free hook, and
/// retrieval downcasts, and a type mismatch reads as "not set".
pub trait PrivateData: Any {
    /// Reports heap references owned by the private data.
    fn scan(&self, _marker: &mut Marker) {}

    /// Downcast support.
    fn as_any(&self) -> &dyn Any;

    /// Downcast support.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// The property-bearing core embedded in every object-like kind.
pub struct ObjectData {
    /// Interface used as the property-lookup fallback, or null.
    pub(crate) inf: Value,
    /// Insertion-ordered properties keyed by interned strings.
    pub(crate) props: IndexMap<GcRef, Property>,
    /// Optional host data.
    pub(crate) private: Option<Box<dyn PrivateData>>,
}

impl ObjectData {
    /// Creates an empty object with the given interface.
    pub(crate) fn new(inf: Value) -> Self {
        Self {
            inf,
            props: IndexMap::new(),
            private: None,
        }
    }

    pub(crate) fn prop(&self, key: GcRef) -> Option<Property> {
        self.props.get(&key).copied()
    }

    pub(crate) fn scan(&self, m: &mut Marker) {
        m.value(self.inf);

        for (key, prop) in &self.props {
            m.gc_ref(*key);
            match prop {
                Property::Const(v) | Property::Var(v) => m.value(*v),
                Property::Accessor { get, set } => {
                    m.value(*get);
                    m.value(*set);
                }
            }
        }

        if let Some(private) = &self.private {
            private.scan(m);
        }
    }

    pub(crate) fn footprint(&self) -> usize {
        self.props.len() * std::mem::size_of::<(GcRef, Property)>()
    }
}

/// What an object iterator yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectIterKind {
    /// Property names.
    Key,
    /// Property values.
    Value,
    /// Two-item `[name, value]` arrays.
    KeyValue,
}

// Iterator state stored in the iterator object's private slot.
struct ObjectIter {
    kind: ObjectIterKind,
    keys: Value,
    obj: Value,
    index: usize,
}

impl PrivateData for ObjectIter {
    fn scan(&self, marker: &mut Marker) {
        marker.value(self.keys);
        marker.value(self.obj);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<'vm> Context<'vm> {
    /// Creates a new plain object with the given interface (or null).
    pub fn object_new(&mut self, inf: Value) -> VmResult<Value> {
        let r = self.heap_add(HeapObject::Object(ObjectData::new(inf)));
        Ok(Value::Heap(r))
    }

    /// Creates a new object whose interface is `class.$inf`.
    pub fn object_from_class(&mut self, class: Value) -> VmResult<Value> {
        let inf = if class.is_null() {
            Value::Null
        } else {
            let key = Value::Heap(self.core.syms.inf);
            self.get(class, key)?
        };
        self.object_new(inf)
    }

    /// Replaces the object's interface.
    pub fn object_set_inf(&mut self, o: Value, inf: Value) -> VmResult<()> {
        if !inf.is_null() && !self.is_object_like(inf) {
            return Err(self.throw_type_error("the value is neither an object nor null"));
        }

        let data = self.object_data_of(o)?;
        self.core
            .heap
            .get_mut(data)
            .object_data_mut()
            .expect("object kind lost its data")
            .inf = inf;
        Ok(())
    }

    /// Attaches host data to the object's private slot. Replacing data of a
    /// different type raises `TypeError`.
    pub fn object_set_priv<T: PrivateData>(&mut self, o: Value, data: T) -> VmResult<()> {
        let oref = self.object_data_of(o)?;

        let mismatch = self
            .core
            .heap
            .get(oref)
            .object_data()
            .and_then(|d| d.private.as_ref())
            .map(|p| p.as_any().type_id() != TypeId::of::<T>())
            .unwrap_or(false);
        if mismatch {
            return Err(self.throw_type_error("private data's type mismatch"));
        }

        self.core
            .heap
            .get_mut(oref)
            .object_data_mut()
            .expect("object kind lost its data")
            .private = Some(Box::new(data));
        Ok(())
    }

    /// Reads the object's private data; `None` when unset or of another type.
    pub fn object_priv<T: PrivateData>(&self, o: Value) -> Option<&T> {
        let r = o.heap_ref()?;
        self.core
            .heap
            .try_get(r)?
            .object_data()?
            .private
            .as_ref()?
            .as_any()
            .downcast_ref::<T>()
    }

    /// Mutable access to the object's private data.
    pub fn object_priv_mut<T: PrivateData>(&mut self, o: Value) -> Option<&mut T> {
        let r = o.heap_ref()?;
        self.core
            .heap
            .slots
            .get_mut(r.index())?
            .as_mut()?
            .object_data_mut()?
            .private
            .as_mut()?
            .as_any_mut()
            .downcast_mut::<T>()
    }

    /// Sets the object's `$scope` constant.
    pub fn object_set_scope(&mut self, o: Value, scope: Value) -> VmResult<()> {
        let key = self.core.syms.scope;
        self.object_insert_prop(o, key, Property::Const(scope))
    }

    /// Sets the object's `$name` constant.
    pub fn object_set_name(&mut self, o: Value, name: Value) -> VmResult<()> {
        let key = self.core.syms.name;
        self.object_insert_prop(o, key, Property::Const(name))
    }

    /// Sets the object's `$name` constant from a string literal.
    pub fn object_set_name_s(&mut self, o: Value, name: &str) -> VmResult<()> {
        let nv = self.string_new(name)?;
        self.object_set_name(o, nv)
    }

    /// Adds a constant property.
    pub fn object_add_const(&mut self, o: Value, key: Value, v: Value) -> VmResult<()> {
        let sym = self.to_sym(key)?;
        self.object_insert_prop(o, sym, Property::Const(v))
    }

    /// Adds a constant property with a literal name.
    pub fn object_add_const_s(&mut self, o: Value, name: &str, v: Value) -> VmResult<()> {
        let sym = self.sym(name)?;
        self.object_insert_prop(o, sym, Property::Const(v))
    }

    /// Adds a variable property.
    pub fn object_add_var(&mut self, o: Value, key: Value, v: Value) -> VmResult<()> {
        let sym = self.to_sym(key)?;
        self.object_insert_prop(o, sym, Property::Var(v))
    }

    /// Adds a variable property with a literal name.
    pub fn object_add_var_s(&mut self, o: Value, name: &str, v: Value) -> VmResult<()> {
        let sym = self.sym(name)?;
        self.object_insert_prop(o, sym, Property::Var(v))
    }

    /// Adds an accessor property.
    pub fn object_add_accessor(
        &mut self,
        o: Value,
        key: Value,
        get: Value,
        set: Value,
    ) -> VmResult<()> {
        let sym = self.to_sym(key)?;
        self.object_insert_prop(o, sym, Property::Accessor { get, set })
    }

    /// Adds a native method: a named native function stored as a constant.
    pub fn object_add_n_method(
        &mut self,
        o: Value,
        name: &str,
        func: crate::function::NativeFn,
    ) -> VmResult<()> {
        let nv = self.string_new(name)?;
        let f = self.named_native_func_new(func, o, nv)?;
        let sym = self.to_sym(nv)?;
        self.object_insert_prop(o, sym, Property::Const(f))
    }

    /// Adds a native accessor; the generated functions are named `"k:get"`
    /// and `"k:set"` for stack dumps.
    pub fn object_add_n_accessor(
        &mut self,
        o: Value,
        name: &str,
        get: Option<crate::function::NativeFn>,
        set: Option<crate::function::NativeFn>,
    ) -> VmResult<()> {
        let mut get_v = Value::Null;
        let mut set_v = Value::Null;

        if let Some(cf) = get {
            let fname = self.string_new(&format!("{name}:get"))?;
            get_v = self.named_native_func_new(cf, o, fname)?;
        }
        if let Some(cf) = set {
            let fname = self.string_new(&format!("{name}:set"))?;
            set_v = self.named_native_func_new(cf, o, fname)?;
        }

        let sym = self.sym(name)?;
        self.object_insert_prop(
            o,
            sym,
            Property::Accessor {
                get: get_v,
                set: set_v,
            },
        )
    }

    /// Installs a `$keys` enumeration override listing exactly `names`.
    pub fn object_set_keys(&mut self, o: Value, names: &[&str]) -> VmResult<()> {
        let arr = self.array_new(0)?;
        for name in names {
            let k = self.string_new(name)?;
            self.array_append(arr, k)?;
        }
        let key = Value::Heap(self.core.syms.keys);
        self.set(o, key, arr)
    }

    // Raw property insertion; replaces an existing property in place so the
    // insertion order is preserved.
    pub(crate) fn object_insert_prop(
        &mut self,
        o: Value,
        key: GcRef,
        prop: Property,
    ) -> VmResult<()> {
        let oref = self.object_data_of(o)?;
        self.core
            .heap
            .get_mut(oref)
            .object_data_mut()
            .expect("object kind lost its data")
            .props
            .insert(key, prop);
        Ok(())
    }

    // The heap slot of the receiver's object data; TypeError when the value
    // has none.
    pub(crate) fn object_data_of(&mut self, o: Value) -> VmResult<GcRef> {
        match o.heap_ref() {
            Some(r) if self.core.heap.get(r).object_data().is_some() => Ok(r),
            _ => Err(self.throw_type_error("the value is not an object")),
        }
    }

    /// True when the value carries a property table.
    pub fn is_object_like(&self, v: Value) -> bool {
        v.heap_ref()
            .and_then(|r| self.core.heap.try_get(r))
            .map(|o| o.object_data().is_some())
            .unwrap_or(false)
    }

    // ---- protocol dispatch ----------------------------------------------

    /// Reads a property; absent properties read as null.
    pub fn get(&mut self, o: Value, key: Value) -> VmResult<Value> {
        Ok(self.get_opt(o, key)?.unwrap_or(Value::Null))
    }

    /// Reads a property, distinguishing "absent" from "null".
    pub fn get_opt(&mut self, o: Value, key: Value) -> VmResult<Option<Value>> {
        match o {
            Value::Null => Err(self.throw_null_error("cannot read property of null")),
            Value::Bool(_) => {
                let inf = self.core.globals.bool_inf;
                self.object_get_t(inf, key, o)
            }
            Value::Number(_) => {
                let inf = self.core.globals.number_inf;
                self.object_get_t(inf, key, o)
            }
            Value::Heap(r) => match self.core.heap.kind(r) {
                Kind::Str | Kind::SingletonStr => self.string_get(o, key),
                Kind::Array => self.array_get(o, key),
                Kind::Script | Kind::BcScript | Kind::NativeScript => self.script_get(o, key),
                Kind::Enum => self.enum_get(o, key),
                Kind::Proxy => self.proxy_get(o, key).map(Some),
                Kind::Input => Ok(None),
                _ => self.object_get_t(o, key, o),
            },
        }
    }

    /// Reads a property, raising `ReferenceError` when absent.
    pub fn get_or_throw(&mut self, o: Value, key: Value) -> VmResult<Value> {
        match self.get_opt(o, key)? {
            Some(v) => Ok(v),
            None => {
                let name = self.key_display(key);
                Err(self.throw_reference_error(format!("\"{name}\" is not defined")))
            }
        }
    }

    /// Writes a property.
    pub fn set(&mut self, o: Value, key: Value, v: Value) -> VmResult<()> {
        match o {
            Value::Heap(r) => match self.core.heap.kind(r) {
                Kind::Str | Kind::SingletonStr => {
                    Err(self.throw_access_error("cannot set property of a string"))
                }
                Kind::Array => self.array_set(o, key, v),
                Kind::Script | Kind::BcScript | Kind::NativeScript => {
                    Err(self.throw_access_error("cannot set property of a script"))
                }
                Kind::Enum => {
                    Err(self.throw_access_error("cannot set property of an enumeration"))
                }
                Kind::Proxy => self.proxy_set(o, key, v),
                Kind::Input => Err(self.throw_access_error("cannot set property of an input")),
                _ => self.object_set_t(o, key, v, o),
            },
            _ => Err(self.throw_type_error("the value is not an object")),
        }
    }

    /// Deletes an own property; silent when it does not exist.
    pub fn del(&mut self, o: Value, key: Value) -> VmResult<()> {
        match o {
            Value::Heap(r) => match self.core.heap.kind(r) {
                Kind::Array => self.array_del(o, key),
                Kind::Script | Kind::BcScript | Kind::NativeScript => {
                    Err(self.throw_access_error("cannot delete property of a script"))
                }
                Kind::Str | Kind::SingletonStr => {
                    Err(self.throw_access_error("cannot delete property of a string"))
                }
                Kind::Proxy => self.proxy_del(o, key),
                Kind::Input => Ok(()),
                _ => self.object_del(o, key),
            },
            _ => Err(self.throw_type_error("the value is not an object")),
        }
    }

    /// Reads an own property without consulting the interface; null when
    /// absent.
    pub fn lookup(&mut self, o: Value, key: Value) -> VmResult<Value> {
        match o {
            Value::Heap(r) => match self.core.heap.kind(r) {
                Kind::Str | Kind::SingletonStr => {
                    Ok(self.string_index_get(o, key)?.unwrap_or(Value::Null))
                }
                Kind::Array => self.array_lookup(o, key),
                Kind::Script | Kind::BcScript | Kind::NativeScript => self.script_lookup(o, key),
                Kind::Enum => self.enum_lookup(o, key),
                Kind::Proxy => self.proxy_lookup(o, key),
                Kind::Input => Ok(Value::Null),
                _ => self.object_lookup(o, key),
            },
            _ => Err(self.throw_type_error("the value is not an object")),
        }
    }

    /// Enumerates the receiver's keys as an array.
    pub fn keys(&mut self, o: Value) -> VmResult<Value> {
        match o {
            Value::Heap(r) => match self.core.heap.kind(r) {
                Kind::Script | Kind::BcScript | Kind::NativeScript => self.script_keys(o),
                Kind::Enum => self.enum_keys(o),
                Kind::Proxy => self.proxy_keys(o),
                Kind::Str | Kind::SingletonStr | Kind::Input => self.array_new(0),
                _ => self.object_keys(o),
            },
            _ => Err(self.throw_type_error("the value is not an object")),
        }
    }

    // ---- generic object behaviour ---------------------------------------

    // Generic get with an explicit `this` for accessor invocation: own
    // property first, then one hop through the interface.
    pub(crate) fn object_get_t(
        &mut self,
        o: Value,
        key: Value,
        this: Value,
    ) -> VmResult<Option<Value>> {
        if !self.is_string(key) {
            return Ok(None);
        }
        let sym = self.to_sym(key)?;

        let oref = match o.heap_ref() {
            Some(r) => r,
            None => return Ok(None),
        };

        let mut prop = self
            .core
            .heap
            .get(oref)
            .object_data()
            .and_then(|d| d.prop(sym));

        if prop.is_none() {
            let inf = self
                .core
                .heap
                .get(oref)
                .object_data()
                .map(|d| d.inf)
                .unwrap_or(Value::Null);
            if let Some(iref) = inf.heap_ref() {
                prop = self
                    .core
                    .heap
                    .get(iref)
                    .object_data()
                    .and_then(|d| d.prop(sym));
            }
        }

        match prop {
            None => Ok(None),
            Some(Property::Const(v)) | Some(Property::Var(v)) => Ok(Some(v)),
            Some(Property::Accessor { get, .. }) => self.call(get, this, &[]).map(Some),
        }
    }

    // Generic set with an explicit `this`. An inherited var property is
    // written where it lives (on the interface).
    pub(crate) fn object_set_t(
        &mut self,
        o: Value,
        key: Value,
        v: Value,
        this: Value,
    ) -> VmResult<()> {
        if !self.is_string(key) {
            return Err(self.throw_type_error("object's property must be a string"));
        }
        let sym = self.to_sym(key)?;

        let oref = self.object_data_of(o)?;

        let mut holder = oref;
        let mut prop = self
            .core
            .heap
            .get(oref)
            .object_data()
            .and_then(|d| d.prop(sym));

        if prop.is_none() {
            let inf = self
                .core
                .heap
                .get(oref)
                .object_data()
                .map(|d| d.inf)
                .unwrap_or(Value::Null);
            if let Some(iref) = inf.heap_ref() {
                if let Some(p) = self
                    .core
                    .heap
                    .get(iref)
                    .object_data()
                    .and_then(|d| d.prop(sym))
                {
                    holder = iref;
                    prop = Some(p);
                }
            }
        }

        match prop {
            Some(Property::Const(_)) => Err(self.prop_access_error(sym)),
            Some(Property::Var(_)) => {
                self.core
                    .heap
                    .get_mut(holder)
                    .object_data_mut()
                    .expect("object kind lost its data")
                    .props
                    .insert(sym, Property::Var(v));
                Ok(())
            }
            Some(Property::Accessor { set, .. }) => {
                if set.is_null() {
                    Err(self.prop_access_error(sym))
                } else {
                    self.call(set, this, &[v])?;
                    Ok(())
                }
            }
            None => {
                self.core
                    .heap
                    .get_mut(oref)
                    .object_data_mut()
                    .expect("object kind lost its data")
                    .props
                    .insert(sym, Property::Var(v));
                Ok(())
            }
        }
    }

    // Own-property read; accessors run with `this` = the object.
    pub(crate) fn object_lookup(&mut self, o: Value, key: Value) -> VmResult<Value> {
        if !self.is_string(key) {
            return Ok(Value::Null);
        }
        let sym = self.to_sym(key)?;

        let prop = o
            .heap_ref()
            .and_then(|r| self.core.heap.get(r).object_data())
            .and_then(|d| d.prop(sym));

        match prop {
            None => Ok(Value::Null),
            Some(Property::Const(v)) | Some(Property::Var(v)) => Ok(v),
            Some(Property::Accessor { get, .. }) => self.call(get, o, &[]),
        }
    }

    // Own-key enumeration: a `$keys` property overrides; `#`-prefixed names
    // are hidden.
    pub(crate) fn object_keys(&mut self, o: Value) -> VmResult<Value> {
        let keys_key = Value::Heap(self.core.syms.keys);
        let custom = self.get(o, keys_key)?;
        if !custom.is_null() {
            return Ok(custom);
        }

        let syms: Vec<GcRef> = o
            .heap_ref()
            .and_then(|r| self.core.heap.get(r).object_data())
            .map(|d| d.props.keys().copied().collect())
            .unwrap_or_default();

        let arr = self.array_new(0)?;
        for sym in syms {
            let hidden = self
                .core
                .heap
                .get(sym)
                .str_object()
                .map(|s| s.data.bytes().first() == Some(&b'#'))
                .unwrap_or(false);
            if hidden {
                continue;
            }
            self.array_append(arr, Value::Heap(sym))?;
        }
        Ok(arr)
    }

    // Own-property removal; reinsertion lands at the end of the order.
    pub(crate) fn object_del(&mut self, o: Value, key: Value) -> VmResult<()> {
        if !self.is_string(key) {
            return Ok(());
        }
        let sym = self.to_sym(key)?;
        let oref = self.object_data_of(o)?;

        self.core
            .heap
            .get_mut(oref)
            .object_data_mut()
            .expect("object kind lost its data")
            .props
            .shift_remove(&sym);
        Ok(())
    }

    // Generic call: a `$call` property is invoked, otherwise the object is
    // its own result.
    pub(crate) fn object_call(
        &mut self,
        o: Value,
        this: Value,
        args: &[Value],
    ) -> VmResult<Value> {
        let call_key = Value::Heap(self.core.syms.call);
        let f = self.get(o, call_key)?;
        if f.is_null() {
            Ok(o)
        } else {
            self.call(f, this, args)
        }
    }

    // AccessError for a rejected write.
    fn prop_access_error(&mut self, sym: GcRef) -> crate::error::Fault {
        let name = self.sym_text(sym);
        self.throw_access_error(format!("property \"{name}\" cannot be set"))
    }

    // ---- iterators -------------------------------------------------------

    /// Builds an iterator over the object's keys, values, or entries.
    pub fn object_iter_new(&mut self, o: Value, kind: ObjectIterKind) -> VmResult<Value> {
        let keys = self.keys(o)?;
        if !self.is_array(keys) {
            return Err(self.throw_type_error("keys must be an array"));
        }

        let inf = self.core.globals.object_iterator_inf;
        let iter = self.object_new(inf)?;
        self.object_set_priv(
            iter,
            ObjectIter {
                kind,
                keys,
                obj: o,
                index: 0,
            },
        )?;
        Ok(iter)
    }

    /// Advances an iterator via its `next` method.
    pub fn iter_next(&mut self, it: Value) -> VmResult<()> {
        let key = self.sym_value("next")?;
        let f = self.get(it, key)?;
        self.call(f, it, &[])?;
        Ok(())
    }

    /// Reads an iterator's `end` flag.
    pub fn iter_end(&mut self, it: Value) -> VmResult<bool> {
        let key = self.sym_value("end")?;
        let v = self.get(it, key)?;
        Ok(self.to_bool(v))
    }

    /// Reads an iterator's current `value`.
    pub fn iter_value(&mut self, it: Value) -> VmResult<Value> {
        let key = self.sym_value("value")?;
        self.get(it, key)
    }

    /// Invokes an iterator's `close` method when it has one.
    pub fn iter_close(&mut self, it: Value) -> VmResult<()> {
        let key = self.sym_value("close")?;
        self.try_call_method(it, key, &[])?;
        Ok(())
    }

    /// Calls the method named by `key` when the object provides one;
    /// `Ok(None)` when it does not.
    pub fn try_call_method(
        &mut self,
        o: Value,
        key: Value,
        args: &[Value],
    ) -> VmResult<Option<Value>> {
        let f = self.get(o, key)?;
        if f.is_null() {
            Ok(None)
        } else {
            self.call(f, o, args).map(Some)
        }
    }
}

// Read back the iterator state, or raise TypeError.
fn iter_state(ctx: &mut Context, this: Value) -> VmResult<(ObjectIterKind, Value, Value, usize)> {
    match ctx.object_priv::<ObjectIter>(this) {
        Some(it) => Ok((it.kind, it.keys, it.obj, it.index)),
        None => Err(ctx.throw_type_error("the value is not an object iterator")),
    }
}

fn object_iterator_next(
    ctx: &mut Context,
    _func: Value,
    this: Value,
    _args: &[Value],
) -> VmResult<Value> {
    let (_, keys, _, index) = iter_state(ctx, this)?;
    let len = ctx.array_length(keys)?;

    if index < len {
        if let Some(it) = ctx.object_priv_mut::<ObjectIter>(this) {
            it.index += 1;
        }
    }
    Ok(Value::Null)
}

fn object_iterator_end(
    ctx: &mut Context,
    _func: Value,
    this: Value,
    _args: &[Value],
) -> VmResult<Value> {
    let (_, keys, _, index) = iter_state(ctx, this)?;
    let len = ctx.array_length(keys)?;
    Ok(Value::Bool(index >= len))
}

fn object_iterator_value(
    ctx: &mut Context,
    _func: Value,
    this: Value,
    _args: &[Value],
) -> VmResult<Value> {
    let (kind, keys, obj, index) = iter_state(ctx, this)?;
    let len = ctx.array_length(keys)?;

    if index >= len {
        return Ok(Value::Null);
    }

    let key = ctx.array_get_item(keys, index)?;
    match kind {
        ObjectIterKind::Key => Ok(key),
        ObjectIterKind::Value => ctx.get(obj, key),
        ObjectIterKind::KeyValue => {
            let pair = ctx.array_new(2)?;
            ctx.array_set_item(pair, 0, key)?;
            let v = ctx.get(obj, key)?;
            ctx.array_set_item(pair, 1, v)?;
            Ok(pair)
        }
    }
}

// Check the first argument is an object or null.
fn check_object_null(ctx: &mut Context, o: Value) -> VmResult<()> {
    if !ctx.is_object_like(o) && !o.is_null() {
        return Err(ctx.throw_type_error("the value is not an object or null"));
    }
    Ok(())
}

fn object_entries(ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
    let o = args.first().copied().unwrap_or(Value::Null);
    check_object_null(ctx, o)?;
    if o.is_null() {
        return Ok(Value::Null);
    }
    ctx.object_iter_new(o, ObjectIterKind::KeyValue)
}

fn object_keys_fn(ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
    let o = args.first().copied().unwrap_or(Value::Null);
    check_object_null(ctx, o)?;
    if o.is_null() {
        return Ok(Value::Null);
    }
    ctx.object_iter_new(o, ObjectIterKind::Key)
}

fn object_values_fn(ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
    let o = args.first().copied().unwrap_or(Value::Null);
    check_object_null(ctx, o)?;
    if o.is_null() {
        return Ok(Value::Null);
    }
    ctx.object_iter_new(o, ObjectIterKind::Value)
}

fn object_lookup_fn(ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
    let o = args.first().copied().unwrap_or(Value::Null);
    let p = args.get(1).copied().unwrap_or(Value::Null);
    check_object_null(ctx, o)?;
    if o.is_null() {
        return Ok(Value::Null);
    }
    ctx.lookup(o, p)
}

fn object_get_fn(ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
    let o = args.first().copied().unwrap_or(Value::Null);
    let p = args.get(1).copied().unwrap_or(Value::Null);
    check_object_null(ctx, o)?;
    if o.is_null() {
        return Ok(Value::Null);
    }
    ctx.get(o, p)
}

fn object_set_fn(ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
    let o = args.first().copied().unwrap_or(Value::Null);
    let p = args.get(1).copied().unwrap_or(Value::Null);
    let v = args.get(2).copied().unwrap_or(Value::Null);
    ctx.set(o, p, v)?;
    Ok(Value::Null)
}

fn object_add_const_fn(ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
    let o = args.first().copied().unwrap_or(Value::Null);
    let p = args.get(1).copied().unwrap_or(Value::Null);
    let v = args.get(2).copied().unwrap_or(Value::Null);
    let name = ctx.to_string(p)?;
    ctx.object_add_const(o, name, v)?;
    Ok(Value::Null)
}

fn object_add_var_fn(ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
    let o = args.first().copied().unwrap_or(Value::Null);
    let p = args.get(1).copied().unwrap_or(Value::Null);
    let v = args.get(2).copied().unwrap_or(Value::Null);
    let name = ctx.to_string(p)?;
    ctx.object_add_var(o, name, v)?;
    Ok(Value::Null)
}

fn object_add_accessor_fn(
    ctx: &mut Context,
    _f: Value,
    _t: Value,
    args: &[Value],
) -> VmResult<Value> {
    let o = args.first().copied().unwrap_or(Value::Null);
    let p = args.get(1).copied().unwrap_or(Value::Null);
    let get = args.get(2).copied().unwrap_or(Value::Null);
    let set = args.get(3).copied().unwrap_or(Value::Null);
    let name = ctx.to_string(p)?;
    ctx.object_add_accessor(o, name, get, set)?;
    Ok(Value::Null)
}

fn object_del_prop_fn(ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
    let o = args.first().copied().unwrap_or(Value::Null);
    let p = args.get(1).copied().unwrap_or(Value::Null);
    ctx.del(o, p)?;
    Ok(Value::Null)
}

fn object_get_name_fn(ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
    let o = args.first().copied().unwrap_or(Value::Null);
    let name = ctx.get_full_name(o)?;
    ctx.string_new(&name)
}

fn object_unref_fn(ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
    let o = args.first().copied().unwrap_or(Value::Null);
    if o.heap_ref().is_some() {
        ctx.global_unref(o);
    }
    Ok(Value::Null)
}

fn object_is_fn(ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
    let v = args.first().copied().unwrap_or(Value::Null);
    Ok(Value::Bool(ctx.is_object_like(v)))
}

fn object_set_inf_fn(ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
    let o = args.first().copied().unwrap_or(Value::Null);
    let inf = args.get(1).copied().unwrap_or(Value::Null);
    ctx.object_set_inf(o, inf)?;
    Ok(Value::Null)
}

/// Builds the `Object` namespace, the `Iterator` base class, and the object
/// iterator class.
pub(crate) fn class_init(ctx: &mut Context) -> VmResult<()> {
    let global = ctx.global_object();

    let object = ctx.object_new(Value::Null)?;
    ctx.object_set_name_s(object, "Object")?;
    ctx.object_add_const_s(global, "Object", object)?;
    ctx.core.globals.object = object;

    ctx.object_add_n_method(object, "entries", object_entries)?;
    ctx.object_add_n_method(object, "keys", object_keys_fn)?;
    ctx.object_add_n_method(object, "values", object_values_fn)?;
    ctx.object_add_n_method(object, "lookup", object_lookup_fn)?;
    ctx.object_add_n_method(object, "get", object_get_fn)?;
    ctx.object_add_n_method(object, "set", object_set_fn)?;
    ctx.object_add_n_method(object, "add_const", object_add_const_fn)?;
    ctx.object_add_n_method(object, "add_var", object_add_var_fn)?;
    ctx.object_add_n_method(object, "add_accessor", object_add_accessor_fn)?;
    ctx.object_add_n_method(object, "del_prop", object_del_prop_fn)?;
    ctx.object_add_n_method(object, "get_name", object_get_name_fn)?;
    ctx.object_add_n_method(object, "unref", object_unref_fn)?;
    ctx.object_add_n_method(object, "is", object_is_fn)?;
    ctx.object_add_n_method(object, "set_inf", object_set_inf_fn)?;

    // Iterator base class.
    let (iterator, _) = ctx.named_class_new(object, "Iterator")?;
    ctx.object_add_const_s(global, "Iterator", iterator)?;
    ctx.core.globals.iterator = iterator;

    // The object iterator class inherits it.
    let (obj_iter, obj_iter_inf) = ctx.named_class_new(object, "Iterator")?;
    ctx.class_inherit(obj_iter, iterator)?;
    ctx.core.globals.object_iterator_inf = obj_iter_inf;

    ctx.object_add_n_method(obj_iter_inf, "next", object_iterator_next)?;
    ctx.object_add_n_accessor(obj_iter_inf, "end", Some(object_iterator_end), None)?;
    ctx.object_add_n_accessor(obj_iter_inf, "value", Some(object_iterator_value), None)?;

    Ok(())
}
