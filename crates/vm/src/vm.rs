//! The virtual machine.
//!
//! A [`Vm`] owns everything: the heap and frame arenas, the singleton-string
//! intern table, the script table, the global-ref table, the package cache,
//! and the bootstrap objects. All of it sits behind one recursive-in-spirit
//! big lock: [`Vm::lock`] blocks until the VM is free and returns the
//! [`Context`] guard; within a locked region, operations are totally
//! ordered. Destroying the VM destroys all per-VM state; a fresh VM starts
//! empty.

use std::path::PathBuf;
use std::sync::Mutex;
use std::thread::ThreadId;

use bitflags::bitflags;
use hashbrown::HashMap;
use indexmap::IndexMap;

use crate::context::{Context, ContextState};
use crate::error::VmResult;
use crate::frame::FrameArena;
use crate::function::InterpFn;
use crate::gc::Marker;
use crate::heap::{GcRef, Heap};
use crate::loader::{CompileFn, NativeModule};
use crate::memory::MemoryCounters;
use crate::string::InternTable;
use crate::value::Value;

/// Log verbosity, ordered from chattiest to silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Everything, including traces.
    All,
    /// Debug and above.
    Debug,
    /// Informational and above.
    Info,
    /// Warnings and above.
    Warning,
    /// Errors and above.
    Error,
    /// Fatal only.
    Fatal,
    /// Nothing.
    None,
}

impl LogLevel {
    /// Parses the single-letter level spelling (`a`, `d`, `i`, `w`, `e`,
    /// `f`, `n`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().chars().next()? {
            'a' => Some(LogLevel::All),
            'd' => Some(LogLevel::Debug),
            'i' => Some(LogLevel::Info),
            'w' => Some(LogLevel::Warning),
            'e' => Some(LogLevel::Error),
            'f' => Some(LogLevel::Fatal),
            'n' => Some(LogLevel::None),
            _ => None,
        }
    }

    /// The matching `log` crate filter.
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::All => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Error | LogLevel::Fatal => log::LevelFilter::Error,
            LogLevel::None => log::LevelFilter::Off,
        }
    }
}

bitflags! {
    /// Decorations included in log output.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LogFields: u8 {
        /// The module tag.
        const TAG = 0b0000_0001;
        /// The source file.
        const FILE = 0b0000_0010;
        /// The source line.
        const LINE = 0b0000_0100;
    }
}

/// Construction options of a VM.
#[derive(Debug, Clone)]
pub struct VmOptions {
    /// Installation directory; seeds the default package lookup
    /// directories and the text-domain base.
    pub install_dir: Option<PathBuf>,
    /// Package lookup directories. Empty means "derive from the
    /// installation directory".
    pub package_dirs: Vec<PathBuf>,
    /// Character encoding assumed for script files.
    pub file_encoding: Option<String>,
    /// Print a stack trace on every throw.
    pub dump_on_throw: bool,
    /// Log verbosity.
    pub log_level: LogLevel,
    /// Log decorations.
    pub log_fields: LogFields,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            install_dir: None,
            package_dirs: Vec::new(),
            file_encoding: None,
            dump_on_throw: false,
            log_level: LogLevel::Warning,
            log_fields: LogFields::TAG,
        }
    }
}

impl VmOptions {
    /// Options seeded from the environment: `OX_PACKAGE_DIRS`
    /// (comma-separated, replaces the defaults), `OX_LOG_LEVEL`
    /// (`a,d,i,w,e,f,n`), and `OX_INSTALL_DIR`.
    pub fn from_env() -> Self {
        let mut options = Self::default();

        if let Ok(dirs) = std::env::var("OX_PACKAGE_DIRS") {
            options.package_dirs = dirs
                .split(',')
                .filter(|d| !d.is_empty())
                .map(PathBuf::from)
                .collect();
        }

        if let Ok(level) = std::env::var("OX_LOG_LEVEL") {
            if let Some(level) = LogLevel::parse(&level) {
                options.log_level = level;
            }
        }

        if let Ok(dir) = std::env::var("OX_INSTALL_DIR") {
            options.install_dir = Some(PathBuf::from(dir));
        }

        options
    }
}

/// Interned keys the runtime reads on hot paths.
pub(crate) struct Syms {
    pub(crate) inf: GcRef,
    pub(crate) class: GcRef,
    pub(crate) scope: GcRef,
    pub(crate) name: GcRef,
    pub(crate) keys: GcRef,
    pub(crate) call: GcRef,
    pub(crate) init: GcRef,
    pub(crate) to_str: GcRef,
    pub(crate) star: GcRef,
    pub(crate) script: GcRef,
    pub(crate) libraries: GcRef,
    pub(crate) path: GcRef,
}

impl Syms {
    // Sentinel references, replaced during bootstrap.
    fn placeholder() -> Self {
        let s = GcRef(u32::MAX);
        Self {
            inf: s,
            class: s,
            scope: s,
            name: s,
            keys: s,
            call: s,
            init: s,
            to_str: s,
            star: s,
            script: s,
            libraries: s,
            path: s,
        }
    }

    pub(crate) fn scan(&self, m: &mut Marker) {
        for r in [
            self.inf,
            self.class,
            self.scope,
            self.name,
            self.keys,
            self.call,
            self.init,
            self.to_str,
            self.star,
            self.script,
            self.libraries,
            self.path,
        ] {
            m.gc_ref(r);
        }
    }
}

/// The bootstrap objects: the global object, the primitive classes and
/// their interfaces, and the error-class table.
pub(crate) struct Globals {
    pub(crate) global: Value,
    pub(crate) object: Value,
    pub(crate) iterator: Value,
    pub(crate) object_iterator_inf: Value,
    pub(crate) bool_class: Value,
    pub(crate) bool_inf: Value,
    pub(crate) number_class: Value,
    pub(crate) number_inf: Value,
    pub(crate) string_class: Value,
    pub(crate) string_inf: Value,
    pub(crate) function_class: Value,
    pub(crate) function_inf: Value,
    pub(crate) array_class: Value,
    pub(crate) array_inf: Value,
    pub(crate) script_inf: Value,
    pub(crate) errors: [Value; 9],
}

impl Globals {
    fn null() -> Self {
        Self {
            global: Value::Null,
            object: Value::Null,
            iterator: Value::Null,
            object_iterator_inf: Value::Null,
            bool_class: Value::Null,
            bool_inf: Value::Null,
            number_class: Value::Null,
            number_inf: Value::Null,
            string_class: Value::Null,
            string_inf: Value::Null,
            function_class: Value::Null,
            function_inf: Value::Null,
            array_class: Value::Null,
            array_inf: Value::Null,
            script_inf: Value::Null,
            errors: [Value::Null; 9],
        }
    }

    pub(crate) fn scan(&self, m: &mut Marker) {
        for v in [
            self.global,
            self.object,
            self.iterator,
            self.object_iterator_inf,
            self.bool_class,
            self.bool_inf,
            self.number_class,
            self.number_inf,
            self.string_class,
            self.string_inf,
            self.function_class,
            self.function_inf,
            self.array_class,
            self.array_inf,
            self.script_inf,
        ] {
            m.value(v);
        }
        for v in self.errors {
            m.value(v);
        }
    }
}

/// Everything the big lock protects.
pub(crate) struct VmCore {
    pub(crate) heap: Heap,
    pub(crate) frames: FrameArena,
    pub(crate) contexts: HashMap<ThreadId, ContextState>,
    pub(crate) interns: InternTable,
    pub(crate) scripts: IndexMap<PathBuf, Value>,
    pub(crate) global_refs: HashMap<GcRef, usize>,
    pub(crate) packages: Value,
    pub(crate) package_dirs: Vec<PathBuf>,
    pub(crate) globals: Globals,
    pub(crate) syms: Syms,
    pub(crate) install_dir: Option<PathBuf>,
    pub(crate) file_encoding: Option<String>,
    pub(crate) dump_on_throw: bool,
    pub(crate) log_level: LogLevel,
    pub(crate) log_fields: LogFields,
    pub(crate) mem: MemoryCounters,
    pub(crate) compile: Option<CompileFn>,
    pub(crate) interp: Option<InterpFn>,
    pub(crate) native_modules: HashMap<String, NativeModule>,
}

impl VmCore {
    fn new(options: VmOptions) -> Self {
        Self {
            heap: Heap::new(),
            frames: FrameArena::new(),
            contexts: HashMap::new(),
            interns: InternTable::new(),
            scripts: IndexMap::new(),
            global_refs: HashMap::new(),
            packages: Value::Null,
            package_dirs: options.package_dirs,
            globals: Globals::null(),
            syms: Syms::placeholder(),
            install_dir: options.install_dir,
            file_encoding: options.file_encoding,
            dump_on_throw: options.dump_on_throw,
            log_level: options.log_level,
            log_fields: options.log_fields,
            mem: MemoryCounters::new(),
            compile: None,
            interp: None,
            native_modules: HashMap::new(),
        }
    }
}

/// An OX virtual machine.
pub struct Vm {
    core: Mutex<VmCore>,
}

impl Vm {
    /// Creates a VM configured from the environment.
    pub fn new() -> Self {
        Self::with_options(VmOptions::from_env())
    }

    /// Creates a VM with explicit options.
    pub fn with_options(options: VmOptions) -> Self {
        let vm = Vm {
            core: Mutex::new(VmCore::new(options)),
        };

        {
            let mut ctx = vm.lock();
            ctx.bootstrap().expect("VM bootstrap failed");
        }

        vm
    }

    /// Acquires the big lock and returns the mutator handle for the
    /// current thread. Blocks while another thread holds the VM; within
    /// one thread, the borrow of the returned [`Context`] is the lock
    /// depth.
    pub fn lock(&self) -> Context<'_> {
        let guard = self.core.lock().expect("Lock poisoned");
        let mut ctx = Context {
            core: guard,
            ctx: std::thread::current().id(),
        };
        ctx.ensure_state();
        ctx
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        if let Ok(core) = self.core.get_mut() {
            core.contexts.clear();
            core.global_refs.clear();
            core.scripts.clear();
            core.packages = Value::Null;
            core.sweep_all();
            core.mem.report();
        }
    }
}

impl<'vm> Context<'vm> {
    /// The configured log level.
    pub fn log_level(&self) -> LogLevel {
        self.core.log_level
    }

    /// Changes the log level.
    pub fn set_log_level(&mut self, level: LogLevel) {
        self.core.log_level = level;
    }

    /// The configured log decorations.
    pub fn log_fields(&self) -> LogFields {
        self.core.log_fields
    }

    /// Changes the log decorations.
    pub fn set_log_fields(&mut self, fields: LogFields) {
        self.core.log_fields = fields;
    }

    /// The character encoding assumed for script files.
    pub fn file_encoding(&self) -> Option<&str> {
        self.core.file_encoding.as_deref()
    }

    /// Sets the character encoding assumed for script files.
    pub fn set_file_encoding(&mut self, enc: &str) {
        self.core.file_encoding = Some(enc.to_string());
    }

    /// The base directory of message catalogues:
    /// `<install>/share/locale`.
    pub fn text_domain_dir(&self) -> Option<PathBuf> {
        self.core
            .install_dir
            .as_ref()
            .map(|d| d.join("share").join("locale"))
    }

    // Build the interned keys, the global object, and the built-in
    // classes.
    pub(crate) fn bootstrap(&mut self) -> VmResult<()> {
        self.core.syms = Syms {
            inf: self.sym("$inf")?,
            class: self.sym("$class")?,
            scope: self.sym("$scope")?,
            name: self.sym("$name")?,
            keys: self.sym("$keys")?,
            call: self.sym("$call")?,
            init: self.sym("$init")?,
            to_str: self.sym("$to_str")?,
            star: self.sym("*")?,
            script: self.sym("script")?,
            libraries: self.sym("libraries")?,
            path: self.sym("path")?,
        };

        let global = self.object_new(Value::Null)?;
        self.core.globals.global = global;
        self.object_set_name_s(global, "Global")?;

        crate::object::class_init(self)?;
        crate::function::class_init(self)?;
        crate::boolean::class_init(self)?;
        crate::number::class_init(self)?;
        crate::string::class_init(self)?;
        crate::array::class_init(self)?;
        crate::error::class_init(self)?;
        crate::proxy::class_init(self)?;
        crate::enums::class_init(self)?;
        crate::script::class_init(self)?;

        let packages = self.object_new(Value::Null)?;
        self.core.packages = packages;

        if self.core.package_dirs.is_empty() {
            if let Some(install) = self.core.install_dir.clone() {
                let target = format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS);
                self.package_add_dir(&install.join("share/ox/pkg").join(target));
                self.package_add_dir(&install.join("share/ox/pkg/all"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("a"), Some(LogLevel::All));
        assert_eq!(LogLevel::parse("d"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("w"), Some(LogLevel::Warning));
        assert_eq!(LogLevel::parse("n"), Some(LogLevel::None));
        assert_eq!(LogLevel::parse("x"), None);
        assert_eq!(LogLevel::parse(""), None);
    }

    #[test]
    fn test_vm_boots_with_builtins() {
        let vm = Vm::with_options(VmOptions::default());
        let mut ctx = vm.lock();

        let global = ctx.global_object();
        for name in [
            "Object", "Bool", "Number", "String", "Function", "Array", "Iterator", "Error",
            "TypeError", "ReferenceError",
        ] {
            let key = ctx.sym_value(name).expect("interning failed");
            let v = ctx.get(global, key).expect("global lookup failed");
            assert!(!v.is_null(), "missing global {name}");
        }
    }

    #[test]
    fn test_fresh_vm_state_is_per_vm() {
        let vm1 = Vm::with_options(VmOptions::default());
        let vm2 = Vm::with_options(VmOptions::default());

        let mut c1 = vm1.lock();
        let c2 = vm2.lock();

        let before = c2.intern_count();
        c1.sym("only-in-vm1").expect("interning failed");
        assert_eq!(c2.intern_count(), before);
    }
}
