//! Proxy objects.
//!
//! A proxy holds a template object and a `this` value; every protocol entry
//! translates into a call on the template's `keys`/`has`/`get`/`set`/`del`/
//! `call` members with the stored `this`.

use crate::context::Context;
use crate::error::VmResult;
use crate::heap::HeapObject;
use crate::object::ObjectData;
use crate::value::Value;

/// A protocol-forwarding proxy.
pub struct ProxyObject {
    pub(crate) object: ObjectData,
    pub(crate) template: Value,
    pub(crate) this_value: Value,
}

impl<'vm> Context<'vm> {
    /// Creates a proxy over `template` with the given `this` value.
    pub fn proxy_new(&mut self, template: Value, this_value: Value) -> VmResult<Value> {
        let r = self.heap_add(HeapObject::Proxy(ProxyObject {
            object: ObjectData::new(Value::Null),
            template,
            this_value,
        }));
        Ok(Value::Heap(r))
    }

    // The template member named `name`, or ReferenceError.
    fn proxy_member(&mut self, o: Value, name: &str) -> VmResult<(Value, Value)> {
        let (template, this_value) = match o.heap_ref().map(|r| self.core.heap.get(r)) {
            Some(HeapObject::Proxy(p)) => (p.template, p.this_value),
            _ => return Err(self.throw_type_error("the value is not a proxy")),
        };

        let key = self.sym_value(name)?;
        let f = self.get_or_throw(template, key)?;
        Ok((f, this_value))
    }

    pub(crate) fn proxy_keys(&mut self, o: Value) -> VmResult<Value> {
        let (f, this) = self.proxy_member(o, "keys")?;
        self.call(f, this, &[])
    }

    pub(crate) fn proxy_lookup(&mut self, o: Value, key: Value) -> VmResult<Value> {
        let (f, this) = self.proxy_member(o, "has")?;
        self.call(f, this, &[key])
    }

    pub(crate) fn proxy_get(&mut self, o: Value, key: Value) -> VmResult<Value> {
        let (f, this) = self.proxy_member(o, "get")?;
        self.call(f, this, &[key])
    }

    pub(crate) fn proxy_set(&mut self, o: Value, key: Value, v: Value) -> VmResult<()> {
        let (f, this) = self.proxy_member(o, "set")?;
        self.call(f, this, &[key, v])?;
        Ok(())
    }

    pub(crate) fn proxy_del(&mut self, o: Value, key: Value) -> VmResult<()> {
        let (f, this) = self.proxy_member(o, "del")?;
        self.call(f, this, &[key])?;
        Ok(())
    }

    // Calling a proxy invokes the template's `call` member with the caller's
    // `this` prepended to the arguments.
    pub(crate) fn proxy_call(&mut self, o: Value, this: Value, args: &[Value]) -> VmResult<Value> {
        let (f, _) = self.proxy_member(o, "call")?;
        let template = match o.heap_ref().map(|r| self.core.heap.get(r)) {
            Some(HeapObject::Proxy(p)) => p.template,
            _ => return Err(self.throw_type_error("the value is not a proxy")),
        };

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(this);
        argv.extend_from_slice(args);

        self.call(f, template, &argv)
    }
}

fn proxy_create_fn(ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
    let template = args.first().copied().unwrap_or(Value::Null);
    let this_value = args.get(1).copied().unwrap_or(Value::Null);
    ctx.proxy_new(template, this_value)
}

/// Publishes the `Proxy` constructor.
pub(crate) fn class_init(ctx: &mut Context) -> VmResult<()> {
    let global = ctx.global_object();
    ctx.object_add_n_method(global, "Proxy", proxy_create_fn)?;
    Ok(())
}
