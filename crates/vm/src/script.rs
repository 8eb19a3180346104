//! Script modules: generic, byte-code, and native.
//!
//! A script is pinned in the VM's script table under its canonical path and
//! walks the states `uninit → load-ref → inited → called`. Initialisation
//! loads every referenced module, creates the entry function and bottom
//! frame, and binds the reference items into frame slots; the entry function
//! then runs exactly once. A failure stores the error and moves the script
//! to `error`, and every later entry re-throws the stored error. Entering a
//! module that is still in `load-ref` is a circular reference.

use std::path::{Path, PathBuf};

use bitflags::bitflags;
use indexmap::IndexMap;

use crate::context::Context;
use crate::error::VmResult;
use crate::frame::FrameRef;
use crate::gc::Marker;
use crate::heap::{GcRef, HeapObject, Kind};
use crate::value::Value;

bitflags! {
    /// Kinds of declarations in a script function's frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeclFlags: u8 {
        /// Slot bound by the module linker.
        const REF = 0b0000_0001;
        /// Slot closed automatically when the frame unwinds.
        const AUTO_CLOSE = 0b0000_0010;
    }
}

/// One declaration of a script function.
#[derive(Debug, Clone, Copy)]
pub struct Decl {
    /// Slot index in the function's frame.
    pub id: usize,
    /// Declaration kind.
    pub flags: DeclFlags,
}

/// A compiled script-function descriptor.
pub struct ScriptFunc {
    /// Declarations, keyed by interned name.
    pub decls: IndexMap<GcRef, Decl>,
    /// Number of ancestor frames closures over this function capture.
    pub frame_count: usize,
    /// Range of this function's entries in the script's location table.
    pub loc_start: usize,
    /// Length of the location-table range.
    pub loc_len: usize,
}

impl ScriptFunc {
    /// Creates an empty descriptor.
    pub fn new() -> Self {
        Self {
            decls: IndexMap::new(),
            frame_count: 0,
            loc_start: 0,
            loc_len: 0,
        }
    }

    /// Adds a declaration, returning its slot index. Adding an existing
    /// name returns the existing slot.
    pub fn add_decl(&mut self, name: GcRef, flags: DeclFlags) -> usize {
        if let Some(decl) = self.decls.get(&name) {
            return decl.id;
        }
        let id = self.decls.len();
        self.decls.insert(name, Decl { id, flags });
        id
    }
}

impl Default for ScriptFunc {
    fn default() -> Self {
        Self::new()
    }
}

/// One `ip → line` entry of a script's location table, sorted by `ip`.
#[derive(Debug, Clone, Copy)]
pub struct ScriptLoc {
    /// Byte-code offset.
    pub ip: u32,
    /// 1-based source line.
    pub line: u32,
}

/// Script lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptState {
    /// Loaded, not yet linked.
    Uninit,
    /// Linking in progress; re-entry is a circular reference.
    LoadRef,
    /// Linked, entry function not yet run.
    Inited,
    /// Entry function has run.
    Called,
    /// Initialisation or entry failed; the stored error re-throws.
    Error,
}

/// One import item of a reference: `orig` is the exported name (`"*"` for a
/// star import), `name` the local binding: a string alias, or a boolean
/// re-export flag on star imports.
pub struct RefItem {
    /// Exported name, or `"*"`.
    pub orig: Value,
    /// Local binding.
    pub name: Value,
}

/// One referenced module.
pub struct ScriptRef {
    /// The name the module was imported by.
    pub filename: Value,
    /// The resolved script, once loaded.
    pub script: Value,
    /// Import items.
    pub items: Vec<RefItem>,
}

/// State shared by every script kind.
pub struct ScriptData {
    pub(crate) state: ScriptState,
    /// Canonical path; the script-table key.
    pub(crate) path: Option<PathBuf>,
    /// Public symbols: name → bottom-frame slot.
    pub(crate) publics: IndexMap<GcRef, usize>,
    pub(crate) refs: Vec<ScriptRef>,
    /// Entry function.
    pub(crate) func: Value,
    /// Bottom frame holding the module's slots.
    pub(crate) frame: Option<FrameRef>,
    /// Stored error of a failed script.
    pub(crate) error: Value,
    /// Optional gettext-style text domain.
    pub(crate) text_domain: Value,
}

impl ScriptData {
    pub(crate) fn new() -> Self {
        Self {
            state: ScriptState::Uninit,
            path: None,
            publics: IndexMap::new(),
            refs: Vec::new(),
            func: Value::Null,
            frame: None,
            error: Value::Null,
            text_domain: Value::Null,
        }
    }

    pub(crate) fn scan(&self, m: &mut Marker) {
        for key in self.publics.keys() {
            m.gc_ref(*key);
        }

        for r in &self.refs {
            m.value(r.filename);
            m.value(r.script);
            for item in &r.items {
                m.value(item.orig);
                m.value(item.name);
            }
        }

        if let Some(frame) = self.frame {
            m.frame(frame);
        }

        m.value(self.func);
        m.value(self.error);
        m.value(self.text_domain);
    }

    pub(crate) fn footprint(&self) -> usize {
        self.publics.len() * std::mem::size_of::<(GcRef, usize)>()
            + self.refs.len() * std::mem::size_of::<ScriptRef>()
    }
}

/// A byte-code script. The pool fields are public so the compiler
/// collaborator can fill them in.
pub struct BcScript {
    pub(crate) script: ScriptData,
    /// The script this one was compiled within, for relative imports of
    /// dynamically compiled code; `None` means the script is its own base.
    pub(crate) base: Option<GcRef>,
    /// The source input.
    pub(crate) input: Value,
    /// Constant pool.
    pub consts: Vec<Value>,
    /// Pattern pool.
    pub patterns: Vec<Value>,
    /// Template pool.
    pub templates: Vec<Value>,
    /// Localised template pool.
    pub templates_local: Vec<Value>,
    /// Function descriptors; index 0 is the entry function.
    pub sfuncs: Vec<ScriptFunc>,
    /// Byte code.
    pub bytecode: Vec<u8>,
    /// `ip → line` table sorted by ip.
    pub loc_table: Vec<ScriptLoc>,
}

impl BcScript {
    /// Binary-searches a function's location range for an instruction
    /// pointer.
    pub(crate) fn lookup_line(&self, sf: &ScriptFunc, ip: i32) -> Option<u32> {
        if ip < 0 || sf.loc_len == 0 {
            return None;
        }
        let range = self.loc_table.get(sf.loc_start..sf.loc_start + sf.loc_len)?;
        let ip = ip as u32;

        let idx = match range.binary_search_by_key(&ip, |loc| loc.ip) {
            Ok(i) => i,
            Err(0) => 0,
            Err(i) => i - 1,
        };
        range.get(idx).map(|loc| loc.line)
    }
}

/// A native script backed by a registered host module.
pub struct NativeScript {
    pub(crate) script: ScriptData,
    /// Registry key of the backing module.
    pub(crate) module: String,
    /// Declared frame size: publics plus reference items.
    pub(crate) frame_size: usize,
}

/// Reference-table row of a native module descriptor. `script` starts a new
/// referenced-module group; `orig` adds an import item to the current group.
/// A `local` of `"1"`/`"0"` is the star re-export flag; any other string is
/// the local binding name; `None` defaults to `"1"`.
pub struct RefDesc<'a> {
    /// Referenced module name, set on the first item of its group.
    pub script: Option<&'a str>,
    /// Exported name, `"*"` for star imports.
    pub orig: Option<&'a str>,
    /// Local binding.
    pub local: Option<&'a str>,
}

/// Module descriptor installed by a native module's load hook.
pub struct ScriptDesc<'a> {
    /// Public names, slot-indexed in order.
    pub publics: &'a [&'a str],
    /// Reference table.
    pub refs: &'a [RefDesc<'a>],
}

impl<'vm> Context<'vm> {
    /// True when the value is a script of any kind.
    pub fn is_script(&self, v: Value) -> bool {
        matches!(
            v.heap_ref().map(|r| self.core.heap.kind(r)),
            Some(Kind::Script) | Some(Kind::BcScript) | Some(Kind::NativeScript)
        )
    }

    /// The script's lifecycle state.
    pub fn script_state(&self, v: Value) -> Option<ScriptState> {
        let r = v.heap_ref()?;
        Some(self.core.heap.try_get(r)?.script_data()?.state)
    }

    /// The script's canonical path.
    pub fn script_path(&self, v: Value) -> Option<PathBuf> {
        let r = v.heap_ref()?;
        self.core.heap.try_get(r)?.script_data()?.path.clone()
    }

    /// The currently-executing script, or null.
    pub fn current_script(&self) -> Value {
        self.state().curr_script
    }

    /// Creates a generic script pinned in the script table under `path`.
    pub fn script_new(&mut self, path: &Path) -> VmResult<Value> {
        let mut data = ScriptData::new();
        data.path = Some(path.to_path_buf());

        let r = self.heap_add(HeapObject::Script(data));
        let sv = Value::Heap(r);
        self.core.scripts.insert(path.to_path_buf(), sv);
        Ok(sv)
    }

    /// Creates a byte-code script over `input`. With `register` set and a
    /// file-backed input, the script is pinned in the script table under
    /// the input's canonical path.
    pub fn bc_script_new(&mut self, input: Value, register: bool) -> VmResult<Value> {
        let r = self.heap_add(HeapObject::BcScript(BcScript {
            script: ScriptData::new(),
            base: None,
            input,
            consts: Vec::new(),
            patterns: Vec::new(),
            templates: Vec::new(),
            templates_local: Vec::new(),
            sfuncs: vec![ScriptFunc::new()],
            bytecode: Vec::new(),
            loc_table: Vec::new(),
        }));
        let sv = Value::Heap(r);

        if register {
            if let Some(name) = self.input_name(input).map(str::to_string) {
                if let Ok(canonical) = std::fs::canonicalize(&name) {
                    if let Some(data) = self.core.heap.get_mut(r).script_data_mut() {
                        data.path = Some(canonical.clone());
                    }
                    self.core.scripts.insert(canonical, sv);
                }
            }
        }

        Ok(sv)
    }

    /// Creates a native script bound to the registered module `key`, pinned
    /// in the script table.
    pub(crate) fn native_script_new(&mut self, key: &str) -> VmResult<Value> {
        let mut data = ScriptData::new();
        let path = PathBuf::from(key);
        data.path = Some(path.clone());

        let r = self.heap_add(HeapObject::NativeScript(NativeScript {
            script: data,
            module: key.to_string(),
            frame_size: 0,
        }));
        let sv = Value::Heap(r);
        self.core.scripts.insert(path, sv);
        Ok(sv)
    }

    /// Mutable access to a byte-code script, for the compiler collaborator
    /// and tests.
    pub fn with_bc_script<R>(
        &mut self,
        sv: Value,
        f: impl FnOnce(&mut BcScript) -> R,
    ) -> VmResult<R> {
        let r = match sv.heap_ref() {
            Some(r) if self.core.heap.kind(r) == Kind::BcScript => r,
            _ => return Err(self.throw_type_error("the value is not a byte-code script")),
        };

        match self.core.heap.get_mut(r) {
            HeapObject::BcScript(bs) => Ok(f(bs)),
            _ => unreachable!("byte-code script kind lost its data"),
        }
    }

    /// Adds a public symbol. With `id` unset a fresh slot index is
    /// allocated; an existing name keeps its slot.
    pub fn script_add_public(
        &mut self,
        sv: Value,
        name: Value,
        id: Option<usize>,
    ) -> VmResult<usize> {
        let sym = self.to_sym(name)?;
        self.script_add_public_sym(sv, sym, id)
    }

    pub(crate) fn script_add_public_sym(
        &mut self,
        sv: Value,
        sym: GcRef,
        id: Option<usize>,
    ) -> VmResult<usize> {
        let r = self.script_ref(sv)?;
        let data = self
            .core
            .heap
            .get_mut(r)
            .script_data_mut()
            .expect("script kind lost its data");

        if let Some(existing) = data.publics.get(&sym) {
            return Ok(*existing);
        }
        let id = id.unwrap_or(data.publics.len());
        data.publics.insert(sym, id);
        Ok(id)
    }

    /// Appends a referenced module to the script's reference list. Used by
    /// the compiler collaborator while building a script.
    pub fn script_add_ref(
        &mut self,
        sv: Value,
        filename: Value,
        items: Vec<RefItem>,
    ) -> VmResult<()> {
        let r = self.script_ref(sv)?;
        self.core
            .heap
            .get_mut(r)
            .script_data_mut()
            .expect("script kind lost its data")
            .refs
            .push(ScriptRef {
                filename,
                script: Value::Null,
                items,
            });
        Ok(())
    }

    /// Adds a declaration to a byte-code script's entry function and
    /// returns its slot index.
    pub fn bc_script_add_decl(
        &mut self,
        sv: Value,
        name: Value,
        flags: DeclFlags,
    ) -> VmResult<usize> {
        let sym = self.to_sym(name)?;
        self.with_bc_script(sv, |bs| bs.sfuncs[0].add_decl(sym, flags))
    }

    /// Writes the current value of a public symbol into the script's
    /// bottom frame. Native module entry functions use this to publish
    /// their exports.
    pub fn script_store_public(&mut self, sv: Value, name: Value, v: Value) -> VmResult<()> {
        let sym = self.to_sym(name)?;
        let r = self.script_ref(sv)?;

        let (frame, id) = {
            let data = self
                .core
                .heap
                .get(r)
                .script_data()
                .expect("script kind lost its data");
            match (data.frame, data.publics.get(&sym).copied()) {
                (Some(frame), Some(id)) => (frame, id),
                _ => {
                    let text = self.sym_text(sym);
                    return Err(self.throw_reference_error(format!(
                        "\"{text}\" is not a public symbol of the script"
                    )));
                }
            }
        };

        self.frame_slot_store(frame, id, v);
        Ok(())
    }

    /// Stores the script's text domain.
    pub fn script_set_text_domain(&mut self, sv: Value, domain: Value) -> VmResult<()> {
        let r = self.script_ref(sv)?;
        self.core
            .heap
            .get_mut(r)
            .script_data_mut()
            .expect("script kind lost its data")
            .text_domain = domain;
        Ok(())
    }

    /// Installs a native module's descriptor: publics, references, and the
    /// frame size they imply. Called from a module's load hook.
    pub fn script_set_desc(&mut self, sv: Value, desc: &ScriptDesc<'_>) -> VmResult<()> {
        for (id, name) in desc.publics.iter().enumerate() {
            let sym = self.sym(name)?;
            self.script_add_public_sym(sv, sym, Some(id))?;
        }

        let mut refs: Vec<ScriptRef> = Vec::new();
        let mut item_total = 0usize;

        for rd in desc.refs {
            if let Some(script) = rd.script {
                let filename = self.string_new(script)?;
                refs.push(ScriptRef {
                    filename,
                    script: Value::Null,
                    items: Vec::new(),
                });
            }

            if let Some(orig) = rd.orig {
                if refs.is_empty() {
                    return Err(
                        self.throw_type_error("reference item precedes any referenced script")
                    );
                }

                let orig_v = self.string_new(orig)?;
                let name_v = match rd.local {
                    None | Some("1") => Value::Bool(true),
                    Some("0") => Value::Bool(false),
                    Some(other) => self.string_new(other)?,
                };

                refs.last_mut()
                    .expect("reference group disappeared")
                    .items
                    .push(RefItem {
                        orig: orig_v,
                        name: name_v,
                    });
                item_total += 1;
            }
        }

        let r = self.script_ref(sv)?;
        let publics_len = desc.publics.len();
        match self.core.heap.get_mut(r) {
            HeapObject::NativeScript(ns) => {
                ns.script.refs = refs;
                ns.frame_size = publics_len + item_total;
            }
            other => {
                if let Some(data) = other.script_data_mut() {
                    data.refs = refs;
                }
            }
        }
        Ok(())
    }

    /// Points a dynamically compiled script's relative imports at the
    /// script of the innermost script-function frame.
    pub fn bc_script_set_base(&mut self, sv: Value) -> VmResult<()> {
        let r = match sv.heap_ref() {
            Some(r) if self.core.heap.kind(r) == Kind::BcScript => r,
            _ => return Err(self.throw_type_error("the value is not a byte-code script")),
        };

        let mut frame = self.state().frames;
        while let Some(fr) = frame {
            let func = self.core.frames.get(fr).func;
            if let Some(HeapObject::Function(fo)) =
                func.heap_ref().map(|fr| self.core.heap.get(fr))
            {
                let base = match self.core.heap.get(fo.script) {
                    HeapObject::BcScript(bs) => bs.base.unwrap_or(fo.script),
                    _ => fo.script,
                };
                if let HeapObject::BcScript(bs) = self.core.heap.get_mut(r) {
                    bs.base = Some(base);
                }
                break;
            }
            frame = self.core.frames.get(fr).caller;
        }

        Ok(())
    }

    // The heap slot behind a script value, or TypeError.
    fn script_ref(&mut self, sv: Value) -> VmResult<GcRef> {
        match sv.heap_ref() {
            Some(r) if self.core.heap.get(r).script_data().is_some() => Ok(r),
            _ => Err(self.throw_type_error("the value is not a script")),
        }
    }

    // ---- protocol --------------------------------------------------------

    // Script `keys`: the public names.
    pub(crate) fn script_keys(&mut self, sv: Value) -> VmResult<Value> {
        let r = self.script_ref(sv)?;
        let names: Vec<GcRef> = self
            .core
            .heap
            .get(r)
            .script_data()
            .map(|d| d.publics.keys().copied().collect())
            .unwrap_or_default();

        let arr = self.array_new(0)?;
        for name in names {
            self.array_append(arr, Value::Heap(name))?;
        }
        Ok(arr)
    }

    // Script `lookup`: a public's bottom-frame slot, or null.
    pub(crate) fn script_lookup(&mut self, sv: Value, key: Value) -> VmResult<Value> {
        Ok(self.script_public_slot(sv, key)?.unwrap_or(Value::Null))
    }

    // Script `get`: publics first, then the Script interface object.
    pub(crate) fn script_get(&mut self, sv: Value, key: Value) -> VmResult<Option<Value>> {
        if !self.is_string(key) {
            return Ok(None);
        }
        if let Some(v) = self.script_public_slot(sv, key)? {
            return Ok(Some(v));
        }
        let inf = self.core.globals.script_inf;
        self.object_get_t(inf, key, sv)
    }

    // Read a public's current value.
    fn script_public_slot(&mut self, sv: Value, key: Value) -> VmResult<Option<Value>> {
        if !self.is_string(key) {
            return Ok(None);
        }
        let sym = self.to_sym(key)?;
        let r = self.script_ref(sv)?;

        let (frame, id) = {
            let data = self
                .core
                .heap
                .get(r)
                .script_data()
                .expect("script kind lost its data");
            match (data.frame, data.publics.get(&sym)) {
                (Some(frame), Some(id)) => (frame, *id),
                _ => return Ok(None),
            }
        };

        Ok(self.frame_slot(frame, id))
    }

    // ---- initialisation and linking -------------------------------------

    /// Links the script: loads its references, creates the entry function
    /// and bottom frame, and binds every reference item. Idempotent once
    /// linked; a stored error re-throws.
    pub fn script_init(&mut self, sv: Value) -> VmResult<()> {
        let r = self.script_ref(sv)?;

        match self.core.heap.get(r).script_data().expect("script kind lost its data").state {
            ScriptState::Error => {
                let e = self
                    .core
                    .heap
                    .get(r)
                    .script_data()
                    .expect("script kind lost its data")
                    .error;
                return Err(self.throw(e));
            }
            ScriptState::Uninit => {}
            _ => return Ok(()),
        }

        if let Err(fault) = self.script_init_steps(sv, r) {
            let error = self.state().error;
            let data = self
                .core
                .heap
                .get_mut(r)
                .script_data_mut()
                .expect("script kind lost its data");
            data.error = error;
            data.state = ScriptState::Error;
            return Err(fault);
        }

        Ok(())
    }

    // The fallible part of initialisation.
    fn script_init_steps(&mut self, sv: Value, r: GcRef) -> VmResult<()> {
        let kind = self.core.heap.kind(r);

        if kind == Kind::NativeScript {
            self.native_script_load(sv, r)?;
        }

        self.core
            .heap
            .get_mut(r)
            .script_data_mut()
            .expect("script kind lost its data")
            .state = ScriptState::LoadRef;

        self.load_ref_scripts(sv, r)?;

        match kind {
            Kind::Script => {
                let n = self
                    .core
                    .heap
                    .get(r)
                    .script_data()
                    .expect("script kind lost its data")
                    .publics
                    .len();
                let frame = self.detached_frame(Value::Null, n);
                self.core
                    .heap
                    .get_mut(r)
                    .script_data_mut()
                    .expect("script kind lost its data")
                    .frame = Some(frame);
            }
            Kind::BcScript => {
                let func = self.function_new(r, 0)?;
                let n = match self.core.heap.get(r) {
                    HeapObject::BcScript(bs) => bs.sfuncs[0].decls.len(),
                    _ => unreachable!("byte-code script kind lost its data"),
                };
                let frame = self.detached_frame(func, n);
                let data = self
                    .core
                    .heap
                    .get_mut(r)
                    .script_data_mut()
                    .expect("script kind lost its data");
                data.func = func;
                data.frame = Some(frame);
            }
            Kind::NativeScript => {
                let (module, n) = match self.core.heap.get(r) {
                    HeapObject::NativeScript(ns) => (ns.module.clone(), ns.frame_size),
                    _ => unreachable!("native script kind lost its data"),
                };

                let exec = self
                    .core
                    .native_modules
                    .get(&module)
                    .and_then(|m| m.exec);
                if let Some(exec) = exec {
                    let func = self.native_func_new(exec)?;
                    self.core
                        .heap
                        .get_mut(r)
                        .script_data_mut()
                        .expect("script kind lost its data")
                        .func = func;
                }

                let frame = self.detached_frame(Value::Null, n);
                self.core
                    .heap
                    .get_mut(r)
                    .script_data_mut()
                    .expect("script kind lost its data")
                    .frame = Some(frame);
            }
            _ => unreachable!("value is not a script"),
        }

        self.bind_refs(sv, r)?;

        self.core
            .heap
            .get_mut(r)
            .script_data_mut()
            .expect("script kind lost its data")
            .state = ScriptState::Inited;
        Ok(())
    }

    // A frame outside the call chain, owned by the script.
    fn detached_frame(&mut self, func: Value, n: usize) -> FrameRef {
        let core = &mut *self.core;
        core.frames.add(None, func, n, &mut core.mem)
    }

    // Run the registered native module's load hook.
    fn native_script_load(&mut self, sv: Value, r: GcRef) -> VmResult<()> {
        let module = match self.core.heap.get(r) {
            HeapObject::NativeScript(ns) => ns.module.clone(),
            _ => unreachable!("native script kind lost its data"),
        };

        let Some(load) = self.core.native_modules.get(&module).map(|m| m.load) else {
            return Err(self.throw_syntax_error(format!(
                "native module \"{module}\" is not registered"
            )));
        };

        load(self, sv)
    }

    // Recursively load every referenced script; star imports extend the
    // importer's declarations and, when re-exported, its public table.
    fn load_ref_scripts(&mut self, sv: Value, r: GcRef) -> VmResult<()> {
        let star = self.core.syms.star;
        let is_bc = self.core.heap.kind(r) == Kind::BcScript;
        let ref_count = self
            .core
            .heap
            .get(r)
            .script_data()
            .expect("script kind lost its data")
            .refs
            .len();

        for i in 0..ref_count {
            let filename = self
                .core
                .heap
                .get(r)
                .script_data()
                .expect("script kind lost its data")
                .refs[i]
                .filename;

            let loaded = self.load_script_value(sv, filename)?;
            {
                let data = self
                    .core
                    .heap
                    .get_mut(r)
                    .script_data_mut()
                    .expect("script kind lost its data");
                data.refs[i].script = loaded;
            }

            let items: Vec<(Value, Value)> = self
                .core
                .heap
                .get(r)
                .script_data()
                .expect("script kind lost its data")
                .refs[i]
                .items
                .iter()
                .map(|it| (it.orig, it.name))
                .collect();

            for (orig, name) in items {
                let is_star = self.string_equal(orig, Value::Heap(star));
                if !is_star || self.is_string(name) {
                    continue;
                }

                let exported: Vec<GcRef> = loaded
                    .heap_ref()
                    .and_then(|lr| self.core.heap.get(lr).script_data())
                    .map(|d| d.publics.keys().copied().collect())
                    .unwrap_or_default();

                let reexport = self.to_bool(name);
                for key in exported {
                    let id = if is_bc {
                        let id = self.with_bc_script(sv, |bs| {
                            bs.sfuncs[0].add_decl(key, DeclFlags::REF)
                        })?;
                        Some(id)
                    } else {
                        None
                    };

                    if reexport {
                        self.script_add_public_sym(sv, key, id)?;
                    }
                }
            }
        }

        Ok(())
    }

    // Bind every reference item into the importer's bottom frame.
    fn bind_refs(&mut self, sv: Value, r: GcRef) -> VmResult<()> {
        let star = self.core.syms.star;
        let ref_count = self
            .core
            .heap
            .get(r)
            .script_data()
            .expect("script kind lost its data")
            .refs
            .len();

        let mut flat_id = 0usize;
        for i in 0..ref_count {
            let (target, items): (Value, Vec<(Value, Value)>) = {
                let data = self
                    .core
                    .heap
                    .get(r)
                    .script_data()
                    .expect("script kind lost its data");
                (
                    data.refs[i].script,
                    data.refs[i]
                        .items
                        .iter()
                        .map(|it| (it.orig, it.name))
                        .collect(),
                )
            };

            for (orig, name) in items {
                let item_id = flat_id;
                flat_id += 1;

                let is_star = self.string_equal(orig, Value::Heap(star));
                if is_star {
                    if !self.is_string(name) {
                        self.bind_all_publics(sv, r, target)?;
                    } else {
                        // `import * as S`: the whole script object as one
                        // slot.
                        let sym = self.to_sym(name)?;
                        self.bind_ref_slot(sv, r, sym, target, Some(item_id))?;
                    }
                } else {
                    let sym = self.to_sym(orig)?;
                    let target_ref = match target.heap_ref() {
                        Some(t) => t,
                        None => continue,
                    };

                    let slot = {
                        let data = self
                            .core
                            .heap
                            .get(target_ref)
                            .script_data()
                            .expect("script kind lost its data");
                        data.publics.get(&sym).copied().zip(data.frame)
                    };
                    let Some((pub_id, target_frame)) = slot else {
                        let text = self.sym_text(sym);
                        return Err(self
                            .throw_reference_error(format!("\"{text}\" is not defined")));
                    };

                    let v = self.frame_slot(target_frame, pub_id).unwrap_or(Value::Null);
                    let local = if self.is_string(name) {
                        self.to_sym(name)?
                    } else {
                        sym
                    };
                    self.bind_ref_slot(sv, r, local, v, Some(item_id))?;
                }
            }
        }

        Ok(())
    }

    // Copy every export of `target` into same-named slots of the importer.
    fn bind_all_publics(&mut self, sv: Value, r: GcRef, target: Value) -> VmResult<()> {
        let target_ref = match target.heap_ref() {
            Some(t) => t,
            None => return Ok(()),
        };

        let exports: Vec<(GcRef, usize, FrameRef)> = {
            let data = self
                .core
                .heap
                .get(target_ref)
                .script_data()
                .expect("script kind lost its data");
            let Some(frame) = data.frame else {
                return Ok(());
            };
            data.publics
                .iter()
                .map(|(k, id)| (*k, *id, frame))
                .collect()
        };

        for (key, id, frame) in exports {
            let v = self.frame_slot(frame, id).unwrap_or(Value::Null);
            self.bind_ref_slot(sv, r, key, v, None)?;
        }
        Ok(())
    }

    // Store one binding into the importer's bottom frame, allocating its
    // slot by script kind.
    fn bind_ref_slot(
        &mut self,
        sv: Value,
        r: GcRef,
        name: GcRef,
        v: Value,
        item_id: Option<usize>,
    ) -> VmResult<()> {
        let id = match self.core.heap.kind(r) {
            Kind::Script => self.script_add_public_sym(sv, name, None)?,
            Kind::BcScript => {
                self.with_bc_script(sv, |bs| bs.sfuncs[0].add_decl(name, DeclFlags::REF))?
            }
            Kind::NativeScript => {
                let publics = self
                    .core
                    .heap
                    .get(r)
                    .script_data()
                    .expect("script kind lost its data")
                    .publics
                    .len();
                item_id.map(|i| i + publics).unwrap_or(publics)
            }
            _ => unreachable!("value is not a script"),
        };

        let frame = self
            .core
            .heap
            .get(r)
            .script_data()
            .expect("script kind lost its data")
            .frame
            .expect("script frame is not initialised");
        self.frame_slot_store(frame, id, v);
        Ok(())
    }

    // ---- running ---------------------------------------------------------

    // Script `call`: initialise, then run the entry function exactly once.
    pub(crate) fn script_call(&mut self, sv: Value, _this: Value, args: &[Value]) -> VmResult<Value> {
        let r = self.script_ref(sv)?;

        match self
            .core
            .heap
            .get(r)
            .script_data()
            .expect("script kind lost its data")
            .state
        {
            ScriptState::Error => {
                let e = self
                    .core
                    .heap
                    .get(r)
                    .script_data()
                    .expect("script kind lost its data")
                    .error;
                return Err(self.throw(e));
            }
            ScriptState::Called => return Ok(Value::Null),
            _ => {}
        }

        self.script_init(sv)?;

        let bottom = self.state().frames;

        let state_now = self
            .core
            .heap
            .get(r)
            .script_data()
            .expect("script kind lost its data")
            .state;
        if state_now == ScriptState::Inited {
            let (func, frame) = {
                let data = self
                    .core
                    .heap
                    .get(r)
                    .script_data()
                    .expect("script kind lost its data");
                (data.func, data.frame)
            };

            if !func.is_null() {
                let frame = frame.expect("script frame is not initialised");
                self.core.frames.get_mut(frame).caller = bottom;
                self.state_mut().frames = Some(frame);

                let result = if self.core.heap.kind(r) == Kind::BcScript {
                    match self.core.interp {
                        Some(interp) => interp(self, func, sv, args),
                        None => Err(self.throw_system_error("no byte-code interpreter installed")),
                    }
                } else {
                    self.call(func, sv, args)
                };

                if let Err(fault) = result {
                    self.state_mut().frames = bottom;
                    let error = self.state().error;
                    let data = self
                        .core
                        .heap
                        .get_mut(r)
                        .script_data_mut()
                        .expect("script kind lost its data");
                    data.error = error;
                    data.state = ScriptState::Error;
                    return Err(fault);
                }
            }

            self.core
                .heap
                .get_mut(r)
                .script_data_mut()
                .expect("script kind lost its data")
                .state = ScriptState::Called;
        }

        self.state_mut().frames = bottom;
        Ok(Value::Null)
    }
}

fn script_path_get(ctx: &mut Context, _f: Value, this: Value, _a: &[Value]) -> VmResult<Value> {
    match ctx.script_path(this) {
        Some(path) => {
            let text = path.to_string_lossy().into_owned();
            ctx.string_new(&text)
        }
        None => Ok(Value::Null),
    }
}

/// Builds the Script interface object consulted by script `get`.
pub(crate) fn class_init(ctx: &mut Context) -> VmResult<()> {
    let inf = ctx.object_new(Value::Null)?;
    ctx.core.globals.script_inf = inf;

    ctx.object_add_n_accessor(inf, "path", Some(script_path_get), None)?;

    Ok(())
}
