//! Module loading scenarios: resolution, linking, star and named imports,
//! circular references, native modules, and packages.
//!
//! The compiler collaborator is simulated with a tiny directive language:
//! `import <name>` references a module, `star <name>` star-imports it,
//! `star_as <name> <local>` binds the whole module to a local name,
//! `from <name> take <orig>` is a named import, and `public <name>`
//! declares an export.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use ox_vm::{
    Context, DeclFlags, ErrorKind, NativeModule, RefItem, ScriptDesc, ScriptState, Value, Vm,
    VmOptions, VmResult,
};

static INTERP_CALLS: AtomicUsize = AtomicUsize::new(0);

// Entry functions of the fake compiler's scripts do nothing.
fn stub_interp(_ctx: &mut Context, _f: Value, _t: Value, _a: &[Value]) -> VmResult<Value> {
    Ok(Value::Null)
}

// Entry interpreter that counts how many script bodies actually ran.
fn counting_interp(_ctx: &mut Context, _f: Value, _t: Value, _a: &[Value]) -> VmResult<Value> {
    INTERP_CALLS.fetch_add(1, Ordering::SeqCst);
    Ok(Value::Null)
}

// The fake compiler: one directive per line.
fn test_compile(ctx: &mut Context, input: Value) -> VmResult<Value> {
    let sv = ctx.bc_script_new(input, false)?;
    let text = ctx.input_text(input).unwrap_or_default().to_string();

    for line in text.lines() {
        let line = line.trim();

        if let Some(name) = line.strip_prefix("import ") {
            let filename = ctx.string_new(name.trim())?;
            ctx.script_add_ref(sv, filename, vec![])?;
        } else if let Some(rest) = line.strip_prefix("star_as ") {
            let (file, local) = rest.trim().split_once(' ').expect("star_as needs a name");
            let filename = ctx.string_new(file.trim())?;
            let star = ctx.string_new("*")?;
            let local = ctx.string_new(local.trim())?;
            ctx.script_add_ref(
                sv,
                filename,
                vec![RefItem {
                    orig: star,
                    name: local,
                }],
            )?;
        } else if let Some(name) = line.strip_prefix("star ") {
            let filename = ctx.string_new(name.trim())?;
            let star = ctx.string_new("*")?;
            ctx.script_add_ref(
                sv,
                filename,
                vec![RefItem {
                    orig: star,
                    name: Value::Bool(true),
                }],
            )?;
        } else if let Some(rest) = line.strip_prefix("from ") {
            let (file, orig) = rest.split_once(" take ").expect("from needs take");
            let filename = ctx.string_new(file.trim())?;
            let orig = ctx.string_new(orig.trim())?;
            ctx.script_add_ref(
                sv,
                filename,
                vec![RefItem {
                    orig,
                    name: orig,
                }],
            )?;
        } else if let Some(name) = line.strip_prefix("public ") {
            let nv = ctx.string_new(name.trim())?;
            let id = ctx.bc_script_add_decl(sv, nv, DeclFlags::empty())?;
            ctx.script_add_public(sv, nv, Some(id))?;
        }
    }

    Ok(sv)
}

// The test native module: exports `answer` and `greet`.
fn libm_load(ctx: &mut Context, script: Value) -> VmResult<()> {
    ctx.script_set_desc(
        script,
        &ScriptDesc {
            publics: &["answer", "greet"],
            refs: &[],
        },
    )
}

fn libm_exec(ctx: &mut Context, _f: Value, this: Value, _a: &[Value]) -> VmResult<Value> {
    let answer = ctx.string_new("answer")?;
    ctx.script_store_public(this, answer, Value::Number(42.0))?;

    let greet = ctx.string_new("greet")?;
    let text = ctx.string_new("hello from libm")?;
    ctx.script_store_public(this, greet, text)?;
    Ok(Value::Null)
}

// Create the native-module file and register it under its canonical path.
fn register_libm(ctx: &mut Context, dir: &Path) -> String {
    let path = dir.join("libm.oxn");
    std::fs::write(&path, b"").expect("cannot create module file");
    let canonical = std::fs::canonicalize(&path).expect("cannot canonicalise module file");
    let key = canonical.to_string_lossy().into_owned();

    ctx.register_native_module(
        &key,
        NativeModule {
            load: libm_load,
            exec: Some(libm_exec),
        },
    );
    key
}

#[test]
fn circular_imports_raise_and_cache_the_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("a.ox"), "import ./b.ox\n").unwrap();
    std::fs::write(dir.path().join("b.ox"), "import ./a.ox\n").unwrap();

    let vm = Vm::with_options(VmOptions::default());
    let mut ctx = vm.lock();
    ctx.set_compiler(test_compile);
    ctx.set_interpreter(counting_interp);
    INTERP_CALLS.store(0, Ordering::SeqCst);

    let a_path = dir.path().join("a.ox").to_string_lossy().into_owned();

    assert!(ctx.load_script(&a_path).is_err());
    let first = ctx.catch();

    let reference = ctx.error_class(ErrorKind::Reference);
    assert!(ctx.instance_of(first, reference).unwrap());

    let message = ctx.string_new("message").unwrap();
    let msg = ctx.get(first, message).unwrap();
    assert_eq!(ctx.str_text(msg), Some("circular reference"));

    // Loading again re-raises the stored error without re-running anything.
    assert!(ctx.load_script(&a_path).is_err());
    let second = ctx.catch();
    assert!(first.identical(second), "the stored error is re-thrown");

    assert_eq!(
        INTERP_CALLS.load(Ordering::SeqCst),
        0,
        "no module body ran"
    );
}

#[test]
fn missing_named_imports_raise_not_defined() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("c.ox"), "public x\n").unwrap();
    std::fs::write(dir.path().join("d.ox"), "from ./c.ox take y\n").unwrap();

    let vm = Vm::with_options(VmOptions::default());
    let mut ctx = vm.lock();
    ctx.set_compiler(test_compile);
    ctx.set_interpreter(stub_interp);

    let d_path = dir.path().join("d.ox").to_string_lossy().into_owned();
    assert!(ctx.load_script(&d_path).is_err());

    let e = ctx.catch();
    let message = ctx.string_new("message").unwrap();
    let msg = ctx.get(e, message).unwrap();
    assert_eq!(ctx.str_text(msg), Some("\"y\" is not defined"));
}

#[test]
fn native_modules_load_once_and_publish_exports() {
    let dir = tempfile::tempdir().expect("tempdir");

    let vm = Vm::with_options(VmOptions::default());
    let mut ctx = vm.lock();
    let key = register_libm(&mut ctx, dir.path());

    let script = ctx.load_script(&key).unwrap();
    assert_eq!(ctx.script_state(script), Some(ScriptState::Called));

    let answer = ctx.string_new("answer").unwrap();
    assert_eq!(ctx.get(script, answer).unwrap(), Value::Number(42.0));

    // The same canonical path yields the identical script object, even
    // spelled differently.
    let again = ctx.load_script(&key).unwrap();
    assert!(script.identical(again));

    let spelled = dir
        .path()
        .join("sub/../libm.oxn")
        .to_string_lossy()
        .into_owned();
    std::fs::create_dir_all(dir.path().join("sub")).unwrap();
    let via_dots = ctx.load_script(&spelled).unwrap();
    assert!(script.identical(via_dots));

    // Script properties are read-only.
    assert!(ctx.set(script, answer, Value::Null).is_err());
    let e = ctx.catch();
    let access = ctx.error_class(ErrorKind::Access);
    assert!(ctx.instance_of(e, access).unwrap());

    assert!(ctx.del(script, answer).is_err());
    ctx.catch();

    // Enumeration lists the publics.
    let keys = ctx.keys(script).unwrap();
    let names: Vec<String> = (0..ctx.array_length(keys).unwrap())
        .map(|i| {
            let k = ctx.array_get_item(keys, i).unwrap();
            ctx.str_text(k).unwrap().to_string()
        })
        .collect();
    assert_eq!(names, ["answer", "greet"]);
}

#[test]
fn star_imports_copy_exports_and_reexport() {
    let dir = tempfile::tempdir().expect("tempdir");

    let vm = Vm::with_options(VmOptions::default());
    let mut ctx = vm.lock();
    ctx.set_compiler(test_compile);
    ctx.set_interpreter(stub_interp);
    let key = register_libm(&mut ctx, dir.path());

    std::fs::write(dir.path().join("e.ox"), format!("star {key}\n")).unwrap();
    let e_path = dir.path().join("e.ox").to_string_lossy().into_owned();

    let importer = ctx.load_script(&e_path).unwrap();

    // Star with `true` re-exports every name with its value.
    let answer = ctx.string_new("answer").unwrap();
    assert_eq!(ctx.get(importer, answer).unwrap(), Value::Number(42.0));

    let greet = ctx.string_new("greet").unwrap();
    let g = ctx.get(importer, greet).unwrap();
    assert_eq!(ctx.str_text(g), Some("hello from libm"));
}

#[test]
fn star_alias_binds_the_whole_script() {
    let dir = tempfile::tempdir().expect("tempdir");

    let vm = Vm::with_options(VmOptions::default());
    let mut ctx = vm.lock();
    ctx.set_compiler(test_compile);
    ctx.set_interpreter(stub_interp);
    let key = register_libm(&mut ctx, dir.path());

    std::fs::write(
        dir.path().join("f.ox"),
        format!("public m\nstar_as {key} m\n"),
    )
    .unwrap();
    let f_path = dir.path().join("f.ox").to_string_lossy().into_owned();

    let importer = ctx.load_script(&f_path).unwrap();

    let m_key = ctx.string_new("m").unwrap();
    let m = ctx.get(importer, m_key).unwrap();
    assert!(ctx.is_script(m), "the alias holds the script object");

    let answer = ctx.string_new("answer").unwrap();
    assert_eq!(ctx.get(m, answer).unwrap(), Value::Number(42.0));
}

#[test]
fn named_imports_copy_one_export() {
    let dir = tempfile::tempdir().expect("tempdir");

    let vm = Vm::with_options(VmOptions::default());
    let mut ctx = vm.lock();
    ctx.set_compiler(test_compile);
    ctx.set_interpreter(stub_interp);
    let key = register_libm(&mut ctx, dir.path());

    std::fs::write(
        dir.path().join("g.ox"),
        format!("public answer\nfrom {key} take answer\n"),
    )
    .unwrap();
    let g_path = dir.path().join("g.ox").to_string_lossy().into_owned();

    let importer = ctx.load_script(&g_path).unwrap();
    let answer = ctx.string_new("answer").unwrap();
    assert_eq!(ctx.get(importer, answer).unwrap(), Value::Number(42.0));
}

#[test]
fn packages_resolve_libraries_and_synthesise_main_scripts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pkgs = dir.path().join("pkgs");
    let pkg_dir = pkgs.join("mathpkg");
    std::fs::create_dir_all(&pkg_dir).unwrap();

    std::fs::write(
        pkg_dir.join("package.ox"),
        r#"{ "libraries": ["libm.oxn"], "vendor": "ox" }"#,
    )
    .unwrap();

    let vm = Vm::with_options(VmOptions {
        package_dirs: vec![pkgs.clone()],
        ..VmOptions::default()
    });
    let mut ctx = vm.lock();
    ctx.set_compiler(test_compile);
    ctx.set_interpreter(stub_interp);
    register_libm(&mut ctx, &pkg_dir);

    // Bare package name: the synthesised main script star-imports every
    // library.
    let pkg_script = ctx.load_script("mathpkg").unwrap();
    let answer = ctx.string_new("answer").unwrap();
    assert_eq!(ctx.get(pkg_script, answer).unwrap(), Value::Number(42.0));

    // package/file resolves through the declared libraries,
    // case-insensitively and with the extension optional.
    let via_file = ctx.load_script("mathpkg/LIBM").unwrap();
    let direct = ctx.load_script("mathpkg/libm.oxn").unwrap();
    assert!(via_file.identical(direct));
    assert_eq!(ctx.get(via_file, answer).unwrap(), Value::Number(42.0));

    // Loading the package again reuses the cached descriptor and script.
    let again = ctx.load_script("mathpkg").unwrap();
    assert!(pkg_script.identical(again));

    // Unknown fields are preserved on the package object.
    let name = ctx.string_new("mathpkg").unwrap();
    let pkg = ctx.package_lookup(name).unwrap();
    let vendor_key = ctx.string_new("vendor").unwrap();
    let vendor = ctx.get(pkg, vendor_key).unwrap();
    assert_eq!(ctx.str_text(vendor), Some("ox"));

    let missing = ctx.string_new("nosuchpkg").unwrap();
    assert!(ctx.package_lookup(missing).is_err());
    ctx.catch();
}

#[test]
fn failed_module_bodies_store_their_error() {
    fn failing_exec(ctx: &mut Context, _f: Value, _t: Value, _a: &[Value]) -> VmResult<Value> {
        Err(ctx.throw_generic_error("module body failed"))
    }
    fn empty_load(ctx: &mut Context, script: Value) -> VmResult<()> {
        ctx.script_set_desc(
            script,
            &ScriptDesc {
                publics: &[],
                refs: &[],
            },
        )
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bad.oxn");
    std::fs::write(&path, b"").unwrap();
    let key = std::fs::canonicalize(&path)
        .unwrap()
        .to_string_lossy()
        .into_owned();

    let vm = Vm::with_options(VmOptions::default());
    let mut ctx = vm.lock();
    ctx.register_native_module(
        &key,
        NativeModule {
            load: empty_load,
            exec: Some(failing_exec),
        },
    );

    assert!(ctx.load_script(&key).is_err());
    let first = ctx.catch();

    assert!(ctx.load_script(&key).is_err());
    let second = ctx.catch();
    assert!(first.identical(second), "the stored error is re-thrown");
}
