//! Script location and loading.
//!
//! A module name resolves against the importing script: `./` and `../`
//! are relative to the importer's directory, absolute paths load directly,
//! `package/file` goes through the package manager, and a bare name loads a
//! package's main script. Extensionless paths probe `.ox` then `.oxn`.
//! Canonical paths key the per-VM script cache, so loading the same file
//! twice yields the identical script object.
//!
//! The external collaborators plug in here: the compiler as a [`CompileFn`]
//! hook for `.ox` sources, the byte-code interpreter as an
//! [`crate::function::InterpFn`], and `.oxn` native modules through a
//! registry keyed by resolved path. The registry entry carries the
//! module's descriptor installer and optional entry function, standing in
//! for the `ox_load`/`ox_exec` symbols of a dynamic library.

use std::path::{Path, PathBuf};

use crate::context::Context;
use crate::error::VmResult;
use crate::function::{InterpFn, NativeFn};
use crate::heap::HeapObject;
use crate::script::ScriptState;
use crate::value::Value;

/// The compiler hook: parses and compiles a source input into a byte-code
/// script.
pub type CompileFn = fn(&mut Context, Value) -> VmResult<Value>;

/// A registered native module.
pub struct NativeModule {
    /// Installs the module descriptor (publics, references, frame size)
    /// into the freshly created native script.
    pub load: fn(&mut Context, Value) -> VmResult<()>,
    /// Optional entry function run when the module is first called.
    pub exec: Option<NativeFn>,
}

// Resolution modes of a module name.
#[derive(PartialEq, Eq, Clone, Copy)]
enum Mode {
    Rel,
    Abs,
    Package,
    PackageFile,
}

impl<'vm> Context<'vm> {
    /// Installs the compiler hook.
    pub fn set_compiler(&mut self, compile: CompileFn) {
        self.core.compile = Some(compile);
    }

    /// Installs the byte-code interpreter hook.
    pub fn set_interpreter(&mut self, interp: InterpFn) {
        self.core.interp = Some(interp);
    }

    /// Registers a native module under the path the loader will resolve it
    /// at.
    pub fn register_native_module(&mut self, path: &str, module: NativeModule) {
        self.core.native_modules.insert(path.to_string(), module);
    }

    /// Loads and runs a script by name, resolved against the currently
    /// executing script. Returns the script object.
    pub fn load_script(&mut self, name: &str) -> VmResult<Value> {
        let file = self.string_new(name)?;
        let base = self.state().curr_script;
        self.load_script_value(base, file)
    }

    /// Loads and runs the module named by `file`, resolved against `base`.
    pub(crate) fn load_script_value(&mut self, base: Value, file: Value) -> VmResult<Value> {
        let path_str = match self.str_text(file) {
            Some(t) => t.to_string(),
            None => return Err(self.throw_type_error("script name must be a string")),
        };

        let bytes = path_str.as_bytes();
        let mut mode = if path_str.starts_with("./") || path_str.starts_with("../") {
            Mode::Rel
        } else if path_str.starts_with('/') {
            Mode::Abs
        } else if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            Mode::Abs
        } else if path_str.contains('/') {
            Mode::PackageFile
        } else {
            Mode::Package
        };

        let mut base_sv = base;
        let mut td = Value::Null;
        if self.is_script(base_sv) {
            td = base_sv
                .heap_ref()
                .and_then(|r| self.core.heap.get(r).script_data())
                .map(|d| d.text_domain)
                .unwrap_or(Value::Null);

            if mode == Mode::Rel {
                // Dynamically compiled scripts resolve relative to the
                // script they were compiled within.
                if let Some(r) = base_sv.heap_ref() {
                    if let HeapObject::BcScript(bs) = self.core.heap.get(r) {
                        if let Some(b) = bs.base {
                            base_sv = Value::Heap(b);
                        }
                    }
                }
                if self.script_path(base_sv).is_none() {
                    mode = Mode::Abs;
                }
            }
        } else if mode == Mode::Rel {
            mode = Mode::Abs;
        }

        let loaded = match mode {
            Mode::Rel => {
                let bpath = self
                    .script_path(base_sv)
                    .expect("relative import without a base path");
                let dir = bpath
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                self.load_script_from_path(dir.join(&path_str), td)?
            }
            Mode::Abs => self.load_script_from_path(PathBuf::from(&path_str), td)?,
            Mode::Package => Some(self.package_script(file)?),
            Mode::PackageFile => self.load_script_from_package_file(&path_str)?,
        };

        let Some(sv) = loaded else {
            return Err(self.throw_reference_error(format!("cannot find script \"{path_str}\"")));
        };

        self.script_exec(sv)?;
        Ok(sv)
    }

    /// Runs a loaded script once as the current script. Entering a module
    /// that is still resolving its references raises
    /// `ReferenceError("circular reference")`.
    pub(crate) fn script_exec(&mut self, sv: Value) -> VmResult<()> {
        if self.script_state(sv) == Some(ScriptState::LoadRef) {
            return Err(self.throw_reference_error("circular reference"));
        }

        let old = self.state().curr_script;
        self.state_mut().curr_script = sv;
        let result = self.call(sv, Value::Null, &[]);
        self.state_mut().curr_script = old;

        result.map(|_| ())
    }

    // Probe `.ox` and `.oxn` when the path has no recognised extension.
    pub(crate) fn load_script_from_path(
        &mut self,
        path: PathBuf,
        td: Value,
    ) -> VmResult<Option<Value>> {
        let known_ext = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("ox") || e.eq_ignore_ascii_case("oxn"))
            .unwrap_or(false);

        if known_ext {
            return self.load_script_from_file(&path, td);
        }

        let mut with_ox = path.clone().into_os_string();
        with_ox.push(".ox");
        if let Some(sv) = self.load_script_from_file(Path::new(&with_ox), td)? {
            return Ok(Some(sv));
        }

        let mut with_oxn = path.into_os_string();
        with_oxn.push(".oxn");
        self.load_script_from_file(Path::new(&with_oxn), td)
    }

    // Load one file: cache hit, registered native module, or the compiler
    // hook. `Ok(None)` means "no such file" so callers can keep probing.
    fn load_script_from_file(&mut self, path: &Path, td: Value) -> VmResult<Option<Value>> {
        // A registered native module needs no backing file.
        let key_string = path.to_string_lossy().into_owned();
        if self.core.native_modules.contains_key(&key_string) {
            if let Some(existing) = self.core.scripts.get(Path::new(&key_string)).copied() {
                return Ok(Some(existing));
            }
            let sv = self.native_script_new(&key_string)?;
            if !td.is_null() {
                self.script_set_text_domain(sv, td)?;
            }
            return Ok(Some(sv));
        }

        let Ok(canonical) = std::fs::canonicalize(path) else {
            return Ok(None);
        };

        if let Some(existing) = self.core.scripts.get(&canonical).copied() {
            return Ok(Some(existing));
        }

        let is_native = canonical
            .extension()
            .map(|e| e.eq_ignore_ascii_case("oxn"))
            .unwrap_or(false);

        let sv = if is_native {
            let key = canonical.to_string_lossy().into_owned();
            if !self.core.native_modules.contains_key(&key) {
                return Err(self.throw_syntax_error(format!(
                    "native module \"{key}\" is not registered"
                )));
            }
            self.native_script_new(&key)?
        } else {
            let input = self.file_input_new(&canonical)?;
            let Some(compile) = self.core.compile else {
                return Err(self.throw_syntax_error("no compiler installed"));
            };
            let sv = compile(self, input)?;

            if self.is_script(sv) {
                if let Some(r) = sv.heap_ref() {
                    if let Some(data) = self.core.heap.get_mut(r).script_data_mut() {
                        if data.path.is_none() {
                            data.path = Some(canonical.clone());
                        }
                    }
                }
                self.core.scripts.insert(canonical, sv);
            }
            sv
        };

        if !td.is_null() {
            self.script_set_text_domain(sv, td)?;
        }
        Ok(Some(sv))
    }

    // `package/file`: resolve the file through the package's declared
    // libraries.
    fn load_script_from_package_file(&mut self, name: &str) -> VmResult<Option<Value>> {
        let (pname, lname) = match name.split_once('/') {
            Some((p, l)) => (p, l),
            None => (name, ""),
        };

        let pkg_name = self.string_new(pname)?;
        let pkg = self.package_lookup(pkg_name)?;

        let lib = self.string_new(lname)?;
        let lib_path = self.package_get_lib(pkg, lib)?;
        let lib_path = match self.str_text(lib_path) {
            Some(t) => PathBuf::from(t),
            None => return Ok(None),
        };

        self.load_script_from_path(lib_path, pkg_name)
    }
}
