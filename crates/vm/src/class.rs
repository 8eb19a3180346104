//! Class and interface construction.
//!
//! A class is an object with an optional instance-allocation hook and a
//! `$inf` constant naming its interface; the interface points back through
//! `$class` and is the property fallback of every instance. Inheritance
//! copies the parent interface's entries into the child interface (child
//! entries win) and propagates the parent's allocation hook.

use crate::context::Context;
use crate::error::VmResult;
use crate::heap::{GcRef, HeapObject, Kind};
use crate::object::{ObjectData, Property};
use crate::value::Value;

/// Instance-allocation hook of a class: builds the instance carrying the
/// given interface.
pub type AllocFn = fn(&mut Context, Value) -> VmResult<Value>;

/// A class object.
pub struct ClassObject {
    pub(crate) object: ObjectData,
    pub(crate) alloc: Option<AllocFn>,
}

// Hidden key linking an interface to the interfaces it inherited; addressable
// but never enumerated.
const INHERITS_KEY: &str = "#inherits";

impl<'vm> Context<'vm> {
    /// True when the value is a class.
    pub fn is_class(&self, v: Value) -> bool {
        matches!(v.heap_ref().map(|r| self.core.heap.kind(r)), Some(Kind::Class))
    }

    /// True when the value is an interface.
    pub fn is_interface(&self, v: Value) -> bool {
        matches!(
            v.heap_ref().map(|r| self.core.heap.kind(r)),
            Some(Kind::Interface)
        )
    }

    /// Creates an empty interface object.
    pub fn interface_new(&mut self) -> VmResult<Value> {
        let r = self.heap_add(HeapObject::Interface(ObjectData::new(Value::Null)));
        Ok(Value::Heap(r))
    }

    /// Creates a class and its companion interface, cross-linked through
    /// `$inf` and `$class`.
    pub fn class_new(&mut self) -> VmResult<(Value, Value)> {
        let r = self.heap_add(HeapObject::Class(ClassObject {
            object: ObjectData::new(Value::Null),
            alloc: None,
        }));
        let class = Value::Heap(r);

        let inf = self.interface_new()?;

        let inf_key = self.core.syms.inf;
        self.object_insert_prop(class, inf_key, Property::Const(inf))?;

        let class_key = self.core.syms.class;
        self.object_insert_prop(inf, class_key, Property::Const(class))?;

        self.object_set_scope(inf, class)?;
        let inf_name = Value::Heap(inf_key);
        self.object_set_name(inf, inf_name)?;

        Ok((class, inf))
    }

    /// Creates a class with its `$scope` and `$name` set.
    pub fn named_class_new(&mut self, scope: Value, name: &str) -> VmResult<(Value, Value)> {
        let (class, inf) = self.class_new()?;

        if !scope.is_null() {
            self.object_set_scope(class, scope)?;
        }
        self.object_set_name_s(class, name)?;

        Ok((class, inf))
    }

    /// Installs the class's instance-allocation hook.
    pub fn class_set_alloc(&mut self, class: Value, alloc: AllocFn) -> VmResult<()> {
        let r = match class.heap_ref() {
            Some(r) if self.core.heap.kind(r) == Kind::Class => r,
            _ => return Err(self.throw_type_error("the value is not a class")),
        };

        if let HeapObject::Class(c) = self.core.heap.get_mut(r) {
            c.alloc = Some(alloc);
        }
        Ok(())
    }

    // The class's allocation hook.
    fn class_alloc(&self, class: Value) -> Option<AllocFn> {
        match class.heap_ref().map(|r| self.core.heap.get(r)) {
            Some(HeapObject::Class(c)) => c.alloc,
            _ => None,
        }
    }

    /// Inherits the parent class's interface entries and allocation hook.
    /// Inheriting the same parent twice is a no-op.
    pub fn class_inherit(&mut self, child: Value, parent: Value) -> VmResult<()> {
        if !self.is_class(child) {
            return Err(self.throw_type_error("the value is not a class"));
        }

        if self.is_class(parent) {
            if let Some(palloc) = self.class_alloc(parent) {
                match self.class_alloc(child) {
                    Some(calloc) if calloc != palloc => {
                        return Err(self.throw_type_error(
                            "class contains multiple parents with private allocation functions",
                        ));
                    }
                    None => self.class_set_alloc(child, palloc)?,
                    _ => {}
                }
            }
        }

        let inf_key = Value::Heap(self.core.syms.inf);
        let inf = self.get_or_throw(child, inf_key)?;
        if !self.is_interface(inf) {
            return Err(self.throw_type_error("property \"$inf\" is not an interface"));
        }

        let pinf = self.get_or_throw(parent, inf_key)?;
        if !self.is_interface(pinf) {
            return Err(self.throw_type_error("property \"$inf\" is not an interface"));
        }

        self.interface_inherit(inf, pinf)
    }

    /// Copies the parent interface's entries into the child interface in
    /// insertion order; existing child entries win.
    pub fn interface_inherit(&mut self, inf: Value, pinf: Value) -> VmResult<()> {
        let inherits_sym = self.sym(INHERITS_KEY)?;

        let pref = self.object_data_of(pinf)?;
        let entries: Vec<(GcRef, Property)> = self
            .core
            .heap
            .get(pref)
            .object_data()
            .map(|d| d.props.iter().map(|(k, p)| (*k, *p)).collect())
            .unwrap_or_default();

        let cref = self.object_data_of(inf)?;
        for (key, prop) in entries {
            if key == inherits_sym {
                continue;
            }
            let exists = self
                .core
                .heap
                .get(cref)
                .object_data()
                .map(|d| d.prop(key).is_some())
                .unwrap_or(false);
            if exists {
                continue;
            }
            self.object_insert_prop(inf, key, prop)?;
        }

        // Track the parent interface so instance checks survive
        // copy-based inheritance.
        let list = match self
            .core
            .heap
            .get(cref)
            .object_data()
            .and_then(|d| d.prop(inherits_sym))
        {
            Some(Property::Const(v)) => v,
            _ => {
                let arr = self.array_new(0)?;
                self.object_insert_prop(inf, inherits_sym, Property::Const(arr))?;
                arr
            }
        };

        let len = self.array_length(list)?;
        for i in 0..len {
            let item = self.array_get_item(list, i)?;
            if item.identical(pinf) {
                return Ok(());
            }
        }
        self.array_append(list, pinf)
    }

    // The interface a value's property lookups fall back to.
    pub(crate) fn value_interface(&self, v: Value) -> Value {
        match v {
            Value::Bool(_) => self.core.globals.bool_inf,
            Value::Number(_) => self.core.globals.number_inf,
            Value::Heap(r) => match self.core.heap.try_get(r) {
                Some(HeapObject::Str(_)) => self.core.globals.string_inf,
                Some(HeapObject::Script(_))
                | Some(HeapObject::BcScript(_))
                | Some(HeapObject::NativeScript(_)) => self.core.globals.script_inf,
                Some(obj) => obj.object_data().map(|d| d.inf).unwrap_or(Value::Null),
                None => Value::Null,
            },
            Value::Null => Value::Null,
        }
    }

    /// True when `v` is an instance of `class`, including through
    /// inheritance.
    pub fn instance_of(&mut self, v: Value, class: Value) -> VmResult<bool> {
        let inf_key = Value::Heap(self.core.syms.inf);
        let target = self.get(class, inf_key)?;
        if target.is_null() {
            return Ok(false);
        }

        let inherits = self.sym_value(INHERITS_KEY)?;
        let mut queue = vec![self.value_interface(v)];
        let mut steps = 0usize;

        while let Some(inf) = queue.pop() {
            if inf.identical(target) {
                return Ok(true);
            }
            if !self.is_object_like(inf) {
                continue;
            }
            steps += 1;
            if steps > 256 {
                break;
            }

            let parents = self.lookup(inf, inherits)?;
            if self.is_array(parents) {
                let len = self.array_length(parents)?;
                for i in 0..len {
                    queue.push(self.array_get_item(parents, i)?);
                }
            }
        }

        Ok(false)
    }

    /// The class a value was created from, or null.
    pub fn type_of(&mut self, v: Value) -> VmResult<Value> {
        match v {
            Value::Bool(_) => Ok(self.core.globals.bool_class),
            Value::Number(_) => Ok(self.core.globals.number_class),
            Value::Heap(r) => match self.core.heap.kind(r) {
                Kind::Str | Kind::SingletonStr => Ok(self.core.globals.string_class),
                Kind::Array => Ok(self.core.globals.array_class),
                Kind::Function | Kind::NativeFunction => Ok(self.core.globals.function_class),
                _ => {
                    let inf = self.value_interface(v);
                    if self.is_object_like(inf) {
                        let class_key = Value::Heap(self.core.syms.class);
                        self.lookup(inf, class_key)
                    } else {
                        Ok(Value::Null)
                    }
                }
            },
            Value::Null => Ok(Value::Null),
        }
    }

    /// Renders an object's dotted full name by walking the `$scope` chain.
    /// Objects without a `$name` render as the empty string.
    pub fn get_full_name(&mut self, o: Value) -> VmResult<String> {
        if !self.is_object_like(o) {
            return Ok(String::new());
        }

        let name_key = Value::Heap(self.core.syms.name);
        let scope_key = Value::Heap(self.core.syms.scope);

        let name = self.get(o, name_key)?;
        let Some(text) = self.str_text(name).map(str::to_string) else {
            return Ok(String::new());
        };

        let mut parts = vec![text];
        let mut scope = self.get(o, scope_key)?;
        while self.is_object_like(scope) && parts.len() < 64 {
            let n = self.get(scope, name_key)?;
            let Some(text) = self.str_text(n).map(str::to_string) else {
                break;
            };
            parts.push(text);
            scope = self.get(scope, scope_key)?;
        }

        parts.reverse();
        Ok(parts.join("."))
    }

    // Calling a class: the primitive classes coerce, everything else
    // allocates an instance and runs `$init`.
    pub(crate) fn class_call(
        &mut self,
        class: Value,
        this: Value,
        args: &[Value],
    ) -> VmResult<Value> {
        let bool_class = self.core.globals.bool_class;
        let number_class = self.core.globals.number_class;
        let string_class = self.core.globals.string_class;
        let function_class = self.core.globals.function_class;

        if class.identical(bool_class) {
            return crate::boolean::bool_class_call(self, class, this, args);
        }
        if class.identical(number_class) {
            return crate::number::number_class_call(self, class, this, args);
        }
        if class.identical(string_class) {
            return crate::string::string_class_call(self, class, this, args);
        }
        if class.identical(function_class) {
            return crate::function::function_class_call(self, class, this, args);
        }

        let inf_key = Value::Heap(self.core.syms.inf);
        let inf = self.get_or_throw(class, inf_key)?;

        let instance = match self.class_alloc(class) {
            Some(alloc) => alloc(self, inf)?,
            None => self.object_new(inf)?,
        };

        let init_key = Value::Heap(self.core.syms.init);
        self.try_call_method(instance, init_key, args)?;

        Ok(instance)
    }
}
