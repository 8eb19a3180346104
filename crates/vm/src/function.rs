//! Callables: native functions and script-function closures.
//!
//! Both kinds share the call contract `(ctx, func, this, args) → value`.
//! A native function wraps a host callback and remembers the script it was
//! created by for stack dumps. A script function references one of its
//! byte-code script's function descriptors and pins the chain of ancestor
//! frames its upvalues live in.

use crate::context::Context;
use crate::error::VmResult;
use crate::frame::FrameRef;
use crate::heap::{GcRef, HeapObject, Kind};
use crate::object::ObjectData;
use crate::value::Value;

/// A host callback: `(ctx, func, this, args) → value`.
pub type NativeFn = fn(&mut Context, Value, Value, &[Value]) -> VmResult<Value>;

/// The byte-code interpreter hook. Invoked with the callee's frame already
/// on top of the frame chain; binds the arguments and executes the
/// function's byte code.
pub type InterpFn = fn(&mut Context, Value, Value, &[Value]) -> VmResult<Value>;

/// A native function object.
pub struct NativeFunctionObject {
    pub(crate) object: ObjectData,
    pub(crate) func: NativeFn,
    /// The script that was executing when the function was created.
    pub(crate) script: Value,
}

/// A script-function closure.
pub struct FunctionObject {
    pub(crate) object: ObjectData,
    /// The owning byte-code script.
    pub(crate) script: GcRef,
    /// Index into the script's function-descriptor array.
    pub(crate) sfunc: usize,
    /// Captured ancestor frames, innermost first.
    pub(crate) frames: Vec<FrameRef>,
}

impl<'vm> Context<'vm> {
    /// True when the value is a callable function object.
    pub fn is_function(&self, v: Value) -> bool {
        matches!(
            v.heap_ref().map(|r| self.core.heap.kind(r)),
            Some(Kind::Function) | Some(Kind::NativeFunction)
        )
    }

    /// Wraps a host callback into a callable object.
    pub fn native_func_new(&mut self, func: NativeFn) -> VmResult<Value> {
        let inf = self.core.globals.function_inf;
        let script = self.state().curr_script;

        let r = self.heap_add(HeapObject::NativeFunction(NativeFunctionObject {
            object: ObjectData::new(inf),
            func,
            script,
        }));
        Ok(Value::Heap(r))
    }

    /// Wraps a host callback with its `$scope` and `$name` set.
    pub fn named_native_func_new(
        &mut self,
        func: NativeFn,
        scope: Value,
        name: Value,
    ) -> VmResult<Value> {
        let f = self.native_func_new(func)?;

        if !scope.is_null() {
            self.object_set_scope(f, scope)?;
        }
        if !name.is_null() {
            self.object_set_name(f, name)?;
        }

        Ok(f)
    }

    /// The script a native function was created by.
    pub fn native_func_script(&self, f: Value) -> Option<Value> {
        match f.heap_ref().map(|r| self.core.heap.try_get(r))?? {
            HeapObject::NativeFunction(nf) => Some(nf.script),
            _ => None,
        }
    }

    /// Builds a closure over the script's function descriptor `sfunc`.
    ///
    /// The current frame becomes the innermost upvalue frame; the remaining
    /// upvalue frames are copied from the surrounding function, producing
    /// exactly `frame_count` entries.
    pub fn function_new(&mut self, script: GcRef, sfunc: usize) -> VmResult<Value> {
        let frame_count = match self.core.heap.get(script) {
            HeapObject::BcScript(bs) => match bs.sfuncs.get(sfunc) {
                Some(sf) => sf.frame_count,
                None => {
                    return Err(
                        self.throw_range_error(format!("no function descriptor {sfunc}"))
                    )
                }
            },
            _ => return Err(self.throw_type_error("the value is not a byte-code script")),
        };

        let mut frames = Vec::with_capacity(frame_count);
        if frame_count > 0 {
            let current = match self.state().frames {
                Some(f) => f,
                None => return Err(self.throw_system_error("no frame to capture")),
            };
            frames.push(current);

            if frame_count > 1 {
                let outer_func = self.core.frames.get(current).func;
                let outer = match outer_func.heap_ref().map(|r| self.core.heap.get(r)) {
                    Some(HeapObject::Function(f)) => f,
                    _ => {
                        return Err(self.throw_type_error(
                            "the surrounding frame does not belong to a script function",
                        ))
                    }
                };
                frames.extend_from_slice(&outer.frames[..frame_count - 1]);
            }
        }

        let inf = self.core.globals.function_inf;
        let r = self.heap_add(HeapObject::Function(FunctionObject {
            object: ObjectData::new(inf),
            script,
            sfunc,
            frames,
        }));
        Ok(Value::Heap(r))
    }

    /// Source line for an instruction pointer of a script function.
    pub fn function_lookup_line(&self, f: Value, ip: i32) -> Option<u32> {
        let fo = match f.heap_ref().map(|r| self.core.heap.try_get(r))?? {
            HeapObject::Function(fo) => fo,
            _ => return None,
        };

        match self.core.heap.try_get(fo.script)? {
            HeapObject::BcScript(bs) => {
                let sf = bs.sfuncs.get(fo.sfunc)?;
                bs.lookup_line(sf, ip)
            }
            _ => None,
        }
    }

    // ---- frames ----------------------------------------------------------

    /// Pushes a frame with `n` null slots onto the context's frame chain.
    pub fn frame_push(&mut self, func: Value, n: usize) -> VmResult<FrameRef> {
        let core = &mut *self.core;
        let state = core
            .contexts
            .get_mut(&self.ctx)
            .expect("context state missing");

        let frame = core.frames.add(state.frames, func, n, &mut core.mem);
        state.frames = Some(frame);
        Ok(frame)
    }

    /// Pops the top frame. The frame itself stays alive while reachable
    /// (closures may have captured it).
    pub fn frame_pop(&mut self) {
        let core = &mut *self.core;
        let state = core
            .contexts
            .get_mut(&self.ctx)
            .expect("context state missing");

        if let Some(top) = state.frames {
            state.frames = core.frames.get(top).caller;
        }
    }

    /// The current top frame.
    pub fn frame_top(&self) -> Option<FrameRef> {
        self.state().frames
    }

    /// Reads a slot of a frame.
    pub fn frame_slot(&self, frame: FrameRef, index: usize) -> Option<Value> {
        self.core.frames.get(frame).slots.get(index).copied()
    }

    /// Writes a slot of a frame, growing it when `index` is past the end.
    pub fn frame_slot_store(&mut self, frame: FrameRef, index: usize, v: Value) {
        let core = &mut *self.core;
        let f = core.frames.get_mut(frame);
        if index >= f.slots.len() {
            core.mem
                .allocate((index + 1 - f.slots.len()) * std::mem::size_of::<Value>());
            f.slots.resize(index + 1, Value::Null);
        }
        f.slots[index] = v;
    }

    // ---- calling ---------------------------------------------------------

    /// Calls a value. Functions invoke their body, classes construct,
    /// scripts initialise and run once, proxies forward, and plain objects
    /// consult `$call` (an object without one is its own result).
    pub fn call(&mut self, f: Value, this: Value, args: &[Value]) -> VmResult<Value> {
        match f {
            Value::Heap(r) => match self.core.heap.kind(r) {
                Kind::Function => self.call_script_function(f, this, args),
                Kind::NativeFunction => self.call_native_function(f, this, args),
                Kind::Class => self.class_call(f, this, args),
                Kind::Script | Kind::BcScript | Kind::NativeScript => {
                    self.script_call(f, this, args)
                }
                Kind::Proxy => self.proxy_call(f, this, args),
                Kind::Input => Err(self.throw_type_error("the value is not callable")),
                _ => self.object_call(f, this, args),
            },
            Value::Null => Err(self.throw_null_error("null is not callable")),
            _ => Err(self.throw_type_error("the value is not callable")),
        }
    }

    // Native call: an empty frame brackets the callback so dumps see it.
    fn call_native_function(&mut self, f: Value, this: Value, args: &[Value]) -> VmResult<Value> {
        let func = match self.core.heap.get(f.heap_ref().expect("function is not on the heap")) {
            HeapObject::NativeFunction(nf) => nf.func,
            _ => unreachable!("native function kind lost its data"),
        };

        self.frame_push(f, 0)?;
        let result = func(self, f, this, args);
        self.frame_pop();
        result
    }

    // Script call: a frame with one slot per declaration, then the
    // interpreter hook.
    fn call_script_function(&mut self, f: Value, this: Value, args: &[Value]) -> VmResult<Value> {
        let decl_count = match self.core.heap.get(f.heap_ref().expect("function is not on the heap"))
        {
            HeapObject::Function(fo) => match self.core.heap.get(fo.script) {
                HeapObject::BcScript(bs) => {
                    bs.sfuncs.get(fo.sfunc).map(|sf| sf.decls.len()).unwrap_or(0)
                }
                _ => 0,
            },
            _ => unreachable!("function kind lost its data"),
        };

        let Some(interp) = self.core.interp else {
            return Err(self.throw_system_error("no byte-code interpreter installed"));
        };

        self.frame_push(f, decl_count)?;
        let result = interp(self, f, this, args);
        self.frame_pop();
        result
    }
}

fn function_is_fn(ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
    let v = args.first().copied().unwrap_or(Value::Null);
    Ok(Value::Bool(ctx.is_function(v)))
}

fn function_inf_call(ctx: &mut Context, _f: Value, this: Value, args: &[Value]) -> VmResult<Value> {
    let call_this = args.first().copied().unwrap_or(Value::Null);
    let rest = if args.len() > 1 { &args[1..] } else { &[] };
    ctx.call(this, call_this, rest)
}

fn function_inf_to_str(ctx: &mut Context, _f: Value, this: Value, _a: &[Value]) -> VmResult<Value> {
    let mut out = String::from("Function");

    let name = ctx.get_full_name(this)?;
    if !name.is_empty() {
        out.push(' ');
        out.push_str(&name);
    }

    ctx.string_new(&out)
}

/// Builds the `Function` class.
pub(crate) fn class_init(ctx: &mut Context) -> VmResult<()> {
    let global = ctx.global_object();

    let (class, inf) = ctx.named_class_new(Value::Null, "Function")?;
    ctx.object_add_const_s(global, "Function", class)?;
    ctx.core.globals.function_class = class;
    ctx.core.globals.function_inf = inf;

    ctx.object_add_n_method(class, "is", function_is_fn)?;

    ctx.object_add_n_method(inf, "call", function_inf_call)?;
    ctx.object_add_n_method(inf, "$to_str", function_inf_to_str)?;

    Ok(())
}

/// Calling the `Function` class compiles its argument as source text and
/// returns the resulting entry function.
pub(crate) fn function_class_call(
    ctx: &mut Context,
    _class: Value,
    _this: Value,
    args: &[Value],
) -> VmResult<Value> {
    let arg = args.first().copied().unwrap_or(Value::Null);
    let src = ctx.to_string(arg)?;
    let input = ctx.string_input_new("<function>", src)?;

    let Some(compile) = ctx.core.compile else {
        return Err(ctx.throw_syntax_error("no compiler installed"));
    };

    let script = compile(ctx, input)?;
    ctx.bc_script_set_base(script)?;
    ctx.script_init(script)?;

    match script.heap_ref().map(|r| ctx.core.heap.get(r)) {
        Some(obj) => Ok(obj.script_data().map(|s| s.func).unwrap_or(Value::Null)),
        None => Ok(Value::Null),
    }
}
