//! The per-thread execution context.
//!
//! A [`Context`] is the handle a host drives the VM through. It is also the
//! big lock: [`crate::vm::Vm::lock`] acquires the VM mutex and returns the
//! guard, so holding a `Context` *is* holding the lock; nested native
//! callbacks simply receive `&mut Context`, and dropping it unlocks. Each
//! OS thread gets its own context state (value stack, frame chain, error
//! slot, current script), all of it rooted for the collector.

use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::MutexGuard;
use std::thread::ThreadId;

use crate::error::{ErrorKind, Fault, VmResult};
use crate::frame::FrameRef;
use crate::gc::GcStats;
use crate::heap::{GcRef, HeapObject, Kind};
use crate::value::{self, Value};
use crate::value_stack::{Slot, ValueStack};
use crate::vm::VmCore;

/// Per-thread mutable state.
pub(crate) struct ContextState {
    /// The evaluation stack; a GC root in full.
    pub(crate) stack: ValueStack,
    /// Top of the frame chain.
    pub(crate) frames: Option<FrameRef>,
    /// The in-flight error.
    pub(crate) error: Value,
    /// Frame chain snapshot taken when the error was thrown.
    pub(crate) error_frames: Option<FrameRef>,
    /// The currently-executing script, for relative imports.
    pub(crate) curr_script: Value,
}

impl ContextState {
    pub(crate) fn new() -> Self {
        Self {
            stack: ValueStack::new(),
            frames: None,
            error: Value::Null,
            error_frames: None,
            curr_script: Value::Null,
        }
    }
}

/// The mutator handle: the VM big lock plus this thread's context state.
pub struct Context<'vm> {
    pub(crate) core: MutexGuard<'vm, VmCore>,
    pub(crate) ctx: ThreadId,
}

impl<'vm> Context<'vm> {
    pub(crate) fn ensure_state(&mut self) {
        self.core
            .contexts
            .entry(self.ctx)
            .or_insert_with(ContextState::new);
    }

    pub(crate) fn state(&self) -> &ContextState {
        self.core
            .contexts
            .get(&self.ctx)
            .expect("context state missing")
    }

    pub(crate) fn state_mut(&mut self) -> &mut ContextState {
        self.core
            .contexts
            .get_mut(&self.ctx)
            .expect("context state missing")
    }

    pub(crate) fn heap_add(&mut self, obj: HeapObject) -> GcRef {
        let core = &mut *self.core;
        core.heap.add(obj, &mut core.mem)
    }

    // ---- value stack -----------------------------------------------------

    /// Pushes one null slot onto the value stack.
    pub fn push(&mut self) -> Slot {
        self.state_mut().stack.push()
    }

    /// Pushes `n` null slots and returns the first.
    pub fn push_n(&mut self, n: usize) -> Slot {
        self.state_mut().stack.push_n(n)
    }

    /// Pops every slot from `slot` upward.
    pub fn pop(&mut self, slot: Slot) {
        self.state_mut().stack.pop(slot);
    }

    /// Reads a stack slot.
    pub fn stack_get(&self, slot: Slot) -> Value {
        self.state().stack.get(slot)
    }

    /// Writes a stack slot.
    pub fn stack_set(&mut self, slot: Slot, v: Value) {
        self.state_mut().stack.set(slot, v);
    }

    /// Current value-stack depth.
    pub fn stack_len(&self) -> usize {
        self.state().stack.len()
    }

    // ---- VM accessors ----------------------------------------------------

    /// The global object.
    pub fn global_object(&self) -> Value {
        self.core.globals.global
    }

    /// The class object of an error kind.
    pub fn error_class(&self, kind: ErrorKind) -> Value {
        self.core.globals.errors[kind.index()]
    }

    pub(crate) fn set_error_class(&mut self, kind: ErrorKind, class: Value) {
        self.core.globals.errors[kind.index()] = class;
    }

    /// The configured installation directory.
    pub fn install_dir(&self) -> Option<&Path> {
        self.core.install_dir.as_deref()
    }

    /// Sets the installation directory.
    pub fn set_install_dir(&mut self, dir: &Path) {
        self.core.install_dir = Some(dir.to_path_buf());
    }

    /// Enables or disables the stack dump printed on every throw.
    pub fn set_dump_on_throw(&mut self, dump: bool) {
        self.core.dump_on_throw = dump;
    }

    /// Number of interned singleton strings; diagnostic.
    pub fn intern_count(&self) -> usize {
        self.core.interns.len()
    }

    /// Number of live heap objects; diagnostic.
    pub fn heap_live(&self) -> usize {
        self.core.heap.live()
    }

    /// Runs a full garbage collection.
    pub fn collect(&mut self) -> GcStats {
        self.core.collect()
    }

    // ---- global refs -----------------------------------------------------

    /// Pins a heap value so the collector keeps it alive.
    pub fn global_ref(&mut self, v: Value) {
        if let Some(r) = v.heap_ref() {
            *self.core.global_refs.entry(r).or_insert(0) += 1;
        }
    }

    /// Releases one pin; the entry disappears at zero. Extra releases are
    /// ignored.
    pub fn global_unref(&mut self, v: Value) {
        if let Some(r) = v.heap_ref() {
            if let Some(count) = self.core.global_refs.get_mut(&r) {
                *count -= 1;
                if *count == 0 {
                    self.core.global_refs.remove(&r);
                }
            }
        }
    }

    /// Current pin count of a value; diagnostic.
    pub fn global_ref_count(&self, v: Value) -> usize {
        v.heap_ref()
            .and_then(|r| self.core.global_refs.get(&r).copied())
            .unwrap_or(0)
    }

    // ---- coercions -------------------------------------------------------

    /// Boolean coercion: null, zero, NaN, and the empty string are false.
    pub fn to_bool(&self, v: Value) -> bool {
        match v {
            Value::Null => false,
            Value::Bool(b) => b,
            Value::Number(n) => n != 0.0 && !n.is_nan(),
            Value::Heap(_) => match self.str_bytes(v) {
                Some(bytes) => !bytes.is_empty(),
                None => true,
            },
        }
    }

    /// Number coercion. Strings parse with `"NaN"`/`"Infinity"` spelled
    /// out and garbage yielding NaN; other heap values are NaN.
    pub fn to_number(&mut self, v: Value) -> VmResult<f64> {
        Ok(match v {
            Value::Null => 0.0,
            Value::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => n,
            Value::Heap(_) => match self.str_text(v) {
                Some(t) => value::number_from_str(t),
                None => f64::NAN,
            },
        })
    }

    /// String coercion; heap values go through their `$to_str` method.
    pub fn to_string(&mut self, v: Value) -> VmResult<Value> {
        match v {
            Value::Null => self.string_from_static("null"),
            Value::Bool(true) => self.string_from_static("true"),
            Value::Bool(false) => self.string_from_static("false"),
            Value::Number(n) => {
                let text = value::number_to_display(n);
                self.string_new(&text)
            }
            Value::Heap(_) => {
                if self.is_string(v) {
                    return Ok(v);
                }

                let to_str = Value::Heap(self.core.syms.to_str);
                if let Some(rv) = self.try_call_method(v, to_str, &[])? {
                    if self.is_string(rv) {
                        return Ok(rv);
                    }
                    return Err(
                        self.throw_type_error("\"$to_str\" did not return a string")
                    );
                }

                let name = self.get_full_name(v)?;
                if name.is_empty() {
                    self.string_from_static("[object]")
                } else {
                    self.string_new(&format!("[object {name}]"))
                }
            }
        }
    }

    /// The canonical array/string index of a value.
    pub fn to_index(&mut self, v: Value) -> VmResult<usize> {
        let n = self.to_number(v)?;
        match value::as_index(n) {
            Some(i) => Ok(i),
            None => Err(self.throw_range_error("the value is not a valid index")),
        }
    }

    /// A signed index.
    pub fn to_ssize(&mut self, v: Value) -> VmResult<isize> {
        let n = self.to_number(v)?;
        match value::as_ssize(n) {
            Some(i) => Ok(i),
            None => Err(self.throw_range_error("the value is not a valid index")),
        }
    }

    /// A 32-bit integer; NaN and infinities collapse to zero.
    pub fn to_int32(&mut self, v: Value) -> VmResult<i32> {
        let n = self.to_number(v)?;
        if n.is_nan() || n.is_infinite() {
            return Ok(0);
        }
        Ok(n.trunc() as i32)
    }

    // A key rendered for an error message, without invoking script code.
    pub(crate) fn key_display(&self, key: Value) -> String {
        match key {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => value::number_to_display(n),
            Value::Heap(_) => self
                .str_text(key)
                .map(str::to_string)
                .unwrap_or_else(|| "[object]".to_string()),
        }
    }

    // ---- errors ----------------------------------------------------------

    /// Throws a value: stores it in the error slot, snapshots the frame
    /// chain, and optionally dumps a trace.
    pub fn throw(&mut self, e: Value) -> Fault {
        let frames = self.state().frames;
        {
            let state = self.state_mut();
            state.error = e;
            state.error_frames = frames;
        }

        if self.core.dump_on_throw {
            if let Ok(text) = self.to_string(e) {
                let text = self
                    .str_text(text)
                    .map(str::to_string)
                    .unwrap_or_default();
                if std::io::stderr().is_terminal() {
                    eprintln!("\x1b[31;1mthrow error\x1b[0m: {text}");
                } else {
                    eprintln!("throw error: {text}");
                }

                let mut err = std::io::stderr();
                self.stack_dump(&mut err);
            }

            // Rendering may have run script code; the original error wins.
            let state = self.state_mut();
            state.error = e;
            state.error_frames = frames;
        }

        Fault
    }

    /// Moves the in-flight error out of the context and clears the slot.
    /// The frame snapshot stays for later dumps.
    pub fn catch(&mut self) -> Value {
        let state = self.state_mut();
        let e = state.error;
        state.error = Value::Null;
        e
    }

    /// The in-flight error without consuming it.
    pub fn error(&self) -> Value {
        self.state().error
    }

    /// Builds and throws an error of the given kind.
    pub fn throw_error(&mut self, kind: ErrorKind, msg: impl Into<String>) -> Fault {
        let msg = msg.into();
        let class = self.core.globals.errors[kind.index()];

        let e = if class.is_null() {
            // Before the error classes exist only a bare object can carry
            // the message.
            self.build_bare_error(&msg)
        } else {
            let m = match self.string_new(&msg) {
                Ok(m) => m,
                Err(fault) => return fault,
            };
            match self.call(class, Value::Null, &[m]) {
                Ok(e) => e,
                Err(fault) => return fault,
            }
        };

        self.throw(e)
    }

    fn build_bare_error(&mut self, msg: &str) -> Value {
        let e = match self.object_new(Value::Null) {
            Ok(e) => e,
            Err(_) => return Value::Null,
        };
        if let Ok(m) = self.string_new(msg) {
            if let Ok(key) = self.sym_value("message") {
                let _ = self.set(e, key, m);
            }
        }
        e
    }

    /// Throws a generic `Error`.
    pub fn throw_generic_error(&mut self, msg: impl Into<String>) -> Fault {
        self.throw_error(ErrorKind::Generic, msg)
    }

    /// Throws a `SystemError`.
    pub fn throw_system_error(&mut self, msg: impl Into<String>) -> Fault {
        self.throw_error(ErrorKind::System, msg)
    }

    /// Throws a `NoMemoryError`.
    pub fn throw_no_mem_error(&mut self) -> Fault {
        self.throw_error(ErrorKind::NoMemory, "not enough memory")
    }

    /// Throws a `NullError`.
    pub fn throw_null_error(&mut self, msg: impl Into<String>) -> Fault {
        self.throw_error(ErrorKind::Null, msg)
    }

    /// Throws a `RangeError`.
    pub fn throw_range_error(&mut self, msg: impl Into<String>) -> Fault {
        self.throw_error(ErrorKind::Range, msg)
    }

    /// Throws an `AccessError`.
    pub fn throw_access_error(&mut self, msg: impl Into<String>) -> Fault {
        self.throw_error(ErrorKind::Access, msg)
    }

    /// Throws a `TypeError`.
    pub fn throw_type_error(&mut self, msg: impl Into<String>) -> Fault {
        self.throw_error(ErrorKind::Type, msg)
    }

    /// Throws a `SyntaxError`.
    pub fn throw_syntax_error(&mut self, msg: impl Into<String>) -> Fault {
        self.throw_error(ErrorKind::Syntax, msg)
    }

    /// Throws a `ReferenceError`.
    pub fn throw_reference_error(&mut self, msg: impl Into<String>) -> Fault {
        self.throw_error(ErrorKind::Reference, msg)
    }

    // ---- stack dump ------------------------------------------------------

    /// Writes the error-frame snapshot as a readable trace.
    pub fn stack_dump(&mut self, out: &mut dyn Write) {
        let Some(top) = self.state().error_frames else {
            return;
        };

        let _ = writeln!(out, "stack:");

        let mut frame = Some(top);
        let mut i = 0usize;
        while let Some(fr) = frame {
            let (func, ip, caller) = {
                let f = self.core.frames.get(fr);
                (f.func, f.ip, f.caller)
            };

            let _ = write!(out, "#{i}: ");

            match func.heap_ref().map(|r| self.core.heap.kind(r)) {
                Some(Kind::Function) => self.dump_script_frame(out, func, ip),
                Some(Kind::NativeFunction) => self.dump_native_frame(out, func),
                _ => {
                    let _ = writeln!(out, "[anonymous frame]");
                }
            }

            i += 1;
            frame = caller;
        }
    }

    /// The dump rendered into a string; convenient for hosts and tests.
    pub fn stack_dump_string(&mut self) -> String {
        let mut buf: Vec<u8> = Vec::new();
        self.stack_dump(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }

    // One byte-code frame of the dump.
    fn dump_script_frame(&mut self, out: &mut dyn Write, func: Value, ip: i32) {
        match self.get_full_name(func) {
            Ok(name) if !name.is_empty() => {
                let _ = write!(out, "{name}");
            }
            _ => {
                let _ = write!(out, "[noname function]");
            }
        }

        let input = match func.heap_ref().map(|r| self.core.heap.get(r)) {
            Some(HeapObject::Function(fo)) => match self.core.heap.try_get(fo.script) {
                Some(HeapObject::BcScript(bs)) => Some(bs.input),
                _ => None,
            },
            _ => None,
        };

        if let Some(input) = input {
            if let Some(name) = self.input_name(input) {
                let _ = write!(out, " \"{name}\"");
            }
        }

        let line = self.function_lookup_line(func, ip);
        match line {
            Some(line) => {
                let _ = writeln!(out, " line: {line}");
                if let Some(input) = input {
                    if let Some(text) = self.input_line(input, line) {
                        let _ = writeln!(out, "    {text}");
                    }
                }
            }
            None => {
                let _ = writeln!(out);
            }
        }
    }

    // One native frame of the dump.
    fn dump_native_frame(&mut self, out: &mut dyn Write, func: Value) {
        match self.get_full_name(func) {
            Ok(name) if !name.is_empty() => {
                let _ = write!(out, "{name}");
            }
            _ => {
                let _ = write!(out, "[native function]");
            }
        }

        let path: Option<PathBuf> = self
            .native_func_script(func)
            .and_then(|s| self.script_path(s));
        if let Some(path) = path {
            if let Some(base) = path.file_name() {
                let _ = write!(out, " \"{}\"", base.to_string_lossy());
            }
        }

        let _ = writeln!(out);
    }
}
