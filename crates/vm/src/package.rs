//! The package manager.
//!
//! A package is a directory under one of the lookup directories containing a
//! `package.ox` JSON descriptor. The recognised fields are `script` (main
//! script), `libraries`, and `executables`; `path` and `$name` are injected
//! after parsing, and unknown fields are preserved as properties. Parsed
//! packages cache in the VM's packages object. Library and executable names
//! match case-insensitively, with trailing `.ox`/`.oxn` optional.

use std::path::{Path, PathBuf};

use crate::context::Context;
use crate::error::VmResult;
use crate::script::{RefItem, ScriptRef};
use crate::value::Value;

impl<'vm> Context<'vm> {
    /// Appends a package lookup directory.
    pub fn package_add_dir(&mut self, dir: &Path) {
        log::debug!(target: "ox_package", "add package lookup directory \"{}\"", dir.display());
        self.core.package_dirs.push(dir.to_path_buf());
    }

    /// The package lookup directories, in search order.
    pub fn package_dirs(&self) -> &[PathBuf] {
        &self.core.package_dirs
    }

    /// Finds a package by name, consulting the cache first.
    pub fn package_lookup(&mut self, name: Value) -> VmResult<Value> {
        let packages = self.core.packages;
        let cached = self.get(packages, name)?;
        if !cached.is_null() {
            return Ok(cached);
        }

        let name_text = match self.str_text(name) {
            Some(t) => t.to_string(),
            None => return Err(self.throw_type_error("package name must be a string")),
        };

        let dirs = self.core.package_dirs.clone();
        for dir in dirs {
            if let Some(pkg) = self.package_lookup_dir(&dir, name, &name_text)? {
                return Ok(pkg);
            }
        }

        Err(self.throw_reference_error(format!("cannot find package \"{name_text}\"")))
    }

    // Try one lookup directory.
    fn package_lookup_dir(
        &mut self,
        dir: &Path,
        name: Value,
        name_text: &str,
    ) -> VmResult<Option<Value>> {
        let pkg_dir = dir.join(name_text);
        if !pkg_dir.is_dir() {
            return Ok(None);
        }

        let desc_path = pkg_dir.join("package.ox");
        let text = match std::fs::read_to_string(&desc_path) {
            Ok(t) => t,
            Err(e) => {
                return Err(self.throw_system_error(format!(
                    "cannot open \"{}\": {e}",
                    desc_path.display()
                )))
            }
        };

        let json: serde_json::Value = match serde_json::from_str(&text) {
            Ok(j) => j,
            Err(e) => {
                return Err(self.throw_syntax_error(format!(
                    "cannot parse \"{}\": {e}",
                    desc_path.display()
                )))
            }
        };

        let pkg = self.json_to_value(&json)?;
        if !self.is_object_like(pkg) {
            return Err(self.throw_type_error("package information must be an object"));
        }

        let name_key = Value::Heap(self.core.syms.name);
        self.set(pkg, name_key, name)?;

        let path_text = pkg_dir.to_string_lossy().into_owned();
        let path_v = self.string_new(&path_text)?;
        let path_key = Value::Heap(self.core.syms.path);
        self.set(pkg, path_key, path_v)?;

        let packages = self.core.packages;
        self.set(packages, name, pkg)?;

        Ok(Some(pkg))
    }

    /// The package's main script, synthesised from its libraries when the
    /// descriptor does not name one.
    pub fn package_script(&mut self, name: Value) -> VmResult<Value> {
        let pkg = self.package_lookup(name)?;

        let script_key = Value::Heap(self.core.syms.script);
        let existing = self.get(pkg, script_key)?;
        if self.is_script(existing) {
            return Ok(existing);
        }

        let path_key = Value::Heap(self.core.syms.path);
        let pkg_path = self.get(pkg, path_key)?;
        let pkg_dir = match self.str_text(pkg_path) {
            Some(t) => PathBuf::from(t),
            None => return Err(self.throw_type_error("package path is not a string")),
        };

        // A string `script` field names the main script file.
        if self.is_string(existing) {
            let file = self
                .str_text(existing)
                .map(str::to_string)
                .unwrap_or_default();
            let loaded = self.load_script_from_path(pkg_dir.join(file), name)?;
            let Some(sv) = loaded else {
                return Err(self.throw_reference_error(format!(
                    "cannot find the main script of package \"{}\"",
                    self.key_display(name)
                )));
            };
            self.set(pkg, script_key, sv)?;
            return Ok(sv);
        }

        // Synthesise a script that star-imports every library.
        let dir = match std::fs::canonicalize(&pkg_dir) {
            Ok(d) => d,
            Err(_) => pkg_dir.clone(),
        };
        let sv = self.script_new(&dir)?;
        self.script_set_text_domain(sv, name)?;

        let libs_key = Value::Heap(self.core.syms.libraries);
        let libs = self.get(pkg, libs_key)?;
        if self.is_array(libs) {
            let len = self.array_length(libs)?;
            let mut refs = Vec::with_capacity(len);

            for i in 0..len {
                let lib = self.array_get_item(libs, i)?;
                let Some(lib_text) = self.str_text(lib).map(str::to_string) else {
                    continue;
                };
                let abs = pkg_dir.join(&lib_text).to_string_lossy().into_owned();
                let filename = self.string_new(&abs)?;
                let star = self.sym_value("*")?;
                refs.push(ScriptRef {
                    filename,
                    script: Value::Null,
                    items: vec![RefItem {
                        orig: star,
                        name: Value::Bool(true),
                    }],
                });
            }

            if let Some(r) = sv.heap_ref() {
                if let Some(data) = self.core.heap.get_mut(r).script_data_mut() {
                    data.refs = refs;
                }
            }
        }

        self.set(pkg, script_key, sv)?;
        Ok(sv)
    }

    /// Resolves a declared library to its path within the package.
    pub fn package_get_lib(&mut self, pkg: Value, lib: Value) -> VmResult<Value> {
        self.package_get_entry(pkg, lib, "libraries", "library")
    }

    /// Resolves a declared executable to its path within the package.
    pub fn package_get_exe(&mut self, pkg: Value, exe: Value) -> VmResult<Value> {
        self.package_get_entry(pkg, exe, "executables", "executable")
    }

    fn package_get_entry(
        &mut self,
        pkg: Value,
        wanted: Value,
        field: &str,
        what: &str,
    ) -> VmResult<Value> {
        let field_key = self.sym_value(field)?;
        let entries = self.get(pkg, field_key)?;

        let path_key = Value::Heap(self.core.syms.path);
        let pkg_path = self.get(pkg, path_key)?;
        let pkg_dir = self
            .str_text(pkg_path)
            .map(str::to_string)
            .unwrap_or_default();

        if self.is_array(entries) {
            let len = self.array_length(entries)?;
            for i in 0..len {
                let entry = self.array_get_item(entries, i)?;
                if self.script_name_equal(wanted, entry) {
                    let entry_text = self.str_text(entry).unwrap_or_default();
                    let full = format!("{pkg_dir}/{entry_text}");
                    return self.string_new(&full);
                }
            }
        }

        let wanted_text = self.key_display(wanted);
        Err(self.throw_reference_error(format!("cannot find {what} \"{wanted_text}\"")))
    }

    // Script-name comparison: case-insensitive, trailing `.ox`/`.oxn`
    // optional on either side.
    fn script_name_equal(&self, a: Value, b: Value) -> bool {
        let (Some(a), Some(b)) = (self.str_text(a), self.str_text(b)) else {
            return false;
        };

        let strip = |s: &str| -> String {
            let lower = s.to_ascii_lowercase();
            for ext in [".oxn", ".ox"] {
                if let Some(stripped) = lower.strip_suffix(ext) {
                    return stripped.to_string();
                }
            }
            lower
        };

        strip(a) == strip(b)
    }

    /// Converts parsed JSON into VM values.
    pub fn json_to_value(&mut self, json: &serde_json::Value) -> VmResult<Value> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => Ok(Value::Number(n.as_f64().unwrap_or(f64::NAN))),
            serde_json::Value::String(s) => self.string_new(s),
            serde_json::Value::Array(items) => {
                let arr = self.array_new(items.len())?;
                for (i, item) in items.iter().enumerate() {
                    let v = self.json_to_value(item)?;
                    self.array_set_item(arr, i, v)?;
                }
                Ok(arr)
            }
            serde_json::Value::Object(map) => {
                let o = self.object_new(Value::Null)?;
                for (key, item) in map {
                    let k = self.string_new(key)?;
                    let v = self.json_to_value(item)?;
                    self.set(o, k, v)?;
                }
                Ok(o)
            }
        }
    }
}
