//! Runtime scenarios: values, objects, classes, accessors, errors, and the
//! collector, driven through the embedder API the way a host would.

use ox_vm::{Context, ErrorKind, ObjectIterKind, Value, Vm, VmOptions, VmResult};

fn new_vm() -> Vm {
    Vm::with_options(VmOptions::default())
}

fn text(ctx: &Context, v: Value) -> String {
    ctx.str_text(v).expect("value is not a string").to_string()
}

#[test]
fn interning_round_trip_yields_identical_references() {
    let vm = new_vm();
    let mut ctx = vm.lock();

    let a = ctx.string_new("hello").unwrap();
    let b = ctx.string_new("hello").unwrap();
    assert_ne!(a, b, "fresh strings are distinct objects");

    let sa = ctx.to_sym(a).unwrap();
    let sb = ctx.to_sym(b).unwrap();
    assert_eq!(sa, sb, "interning the same bytes yields one reference");

    let c = ctx.string_new("other").unwrap();
    let sc = ctx.to_sym(c).unwrap();
    assert_ne!(sa, sc);

    assert!(ctx.string_equal(Value::Heap(sa), Value::Heap(sb)));
}

#[test]
fn class_inheritance_child_overrides_and_interface_fallback() {
    let vm = new_vm();
    let mut ctx = vm.lock();

    let (a, a_inf) = ctx.named_class_new(Value::Null, "A").unwrap();
    ctx.object_add_var_s(a_inf, "x", Value::Number(1.0)).unwrap();

    let (b, b_inf) = ctx.named_class_new(Value::Null, "B").unwrap();
    ctx.object_add_var_s(b_inf, "x", Value::Number(2.0)).unwrap();
    ctx.class_inherit(b, a).unwrap();

    let instance = ctx.call(b, Value::Null, &[]).unwrap();
    let x_key = ctx.string_new("x").unwrap();

    let x = ctx.get(instance, x_key).unwrap();
    assert_eq!(x, Value::Number(2.0), "child interface wins");

    // Deleting from the instance leaves the interface fallback in place.
    ctx.del(instance, x_key).unwrap();
    let x = ctx.get(instance, x_key).unwrap();
    assert_eq!(x, Value::Number(2.0));

    // The instance is a B and, through inheritance, an A.
    assert!(ctx.instance_of(instance, b).unwrap());
    assert!(ctx.instance_of(instance, a).unwrap());

    // An A instance still reads the parent value.
    let a_instance = ctx.call(a, Value::Null, &[]).unwrap();
    let x = ctx.get(a_instance, x_key).unwrap();
    assert_eq!(x, Value::Number(1.0));
}

#[test]
fn inherit_twice_is_a_no_op() {
    let vm = new_vm();
    let mut ctx = vm.lock();

    let (a, a_inf) = ctx.named_class_new(Value::Null, "A").unwrap();
    ctx.object_add_const_s(a_inf, "m", Value::Number(7.0)).unwrap();
    let (b, b_inf) = ctx.named_class_new(Value::Null, "B").unwrap();

    ctx.class_inherit(b, a).unwrap();
    let keys_once = ctx.keys(b_inf).unwrap();
    let len_once = ctx.array_length(keys_once).unwrap();

    ctx.class_inherit(b, a).unwrap();
    let keys_twice = ctx.keys(b_inf).unwrap();
    assert_eq!(ctx.array_length(keys_twice).unwrap(), len_once);
}

#[test]
fn array_length_accessor_reads_and_truncates() {
    let vm = new_vm();
    let mut ctx = vm.lock();

    let arr = ctx.array_new(0).unwrap();
    ctx.array_set_length(arr, 5).unwrap();

    let len_key = ctx.string_new("length").unwrap();
    let len = ctx.get(arr, len_key).unwrap();
    assert_eq!(len, Value::Number(5.0));

    ctx.set(arr, len_key, Value::Number(3.0)).unwrap();
    assert_eq!(ctx.array_length(arr).unwrap(), 3);
}

#[test]
fn custom_accessors_invoke_with_the_receiver() {
    fn cell_get(ctx: &mut Context, _f: Value, this: Value, _a: &[Value]) -> VmResult<Value> {
        let key = ctx.string_new("#cell").unwrap();
        ctx.get(this, key)
    }
    fn cell_set(ctx: &mut Context, _f: Value, this: Value, args: &[Value]) -> VmResult<Value> {
        let v = args.first().copied().unwrap_or(Value::Null);
        let n = ctx.to_number(v)?;
        let key = ctx.string_new("#cell").unwrap();
        ctx.object_add_var(this, key, Value::Number(n * 2.0))?;
        Ok(Value::Null)
    }

    let vm = new_vm();
    let mut ctx = vm.lock();

    let o = ctx.object_new(Value::Null).unwrap();
    ctx.object_add_n_accessor(o, "cell", Some(cell_get), Some(cell_set))
        .unwrap();

    let key = ctx.string_new("cell").unwrap();
    ctx.set(o, key, Value::Number(21.0)).unwrap();
    let v = ctx.get(o, key).unwrap();
    assert_eq!(v, Value::Number(42.0));

    // The backing slot is hidden from enumeration but addressable.
    let hidden = ctx.string_new("#cell").unwrap();
    assert_eq!(ctx.get(o, hidden).unwrap(), Value::Number(42.0));
    let keys = ctx.keys(o).unwrap();
    let len = ctx.array_length(keys).unwrap();
    for i in 0..len {
        let k = ctx.array_get_item(keys, i).unwrap();
        assert_ne!(ctx.str_text(k), Some("#cell"));
    }
}

#[test]
fn const_properties_and_missing_setters_reject_writes() {
    let vm = new_vm();
    let mut ctx = vm.lock();

    let o = ctx.object_new(Value::Null).unwrap();
    ctx.object_add_const_s(o, "c", Value::Number(1.0)).unwrap();

    let key = ctx.string_new("c").unwrap();
    assert!(ctx.set(o, key, Value::Number(2.0)).is_err());
    let e = ctx.catch();
    let access = ctx.error_class(ErrorKind::Access);
    assert!(ctx.instance_of(e, access).unwrap());

    fn getter(_ctx: &mut Context, _f: Value, _t: Value, _a: &[Value]) -> VmResult<Value> {
        Ok(Value::Number(9.0))
    }
    ctx.object_add_n_accessor(o, "ro", Some(getter), None).unwrap();
    let ro = ctx.string_new("ro").unwrap();
    assert_eq!(ctx.get(o, ro).unwrap(), Value::Number(9.0));
    assert!(ctx.set(o, ro, Value::Null).is_err());
    let e = ctx.catch();
    assert!(ctx.instance_of(e, access).unwrap());
}

#[test]
fn thrown_errors_carry_class_message_and_stack() {
    fn boom(ctx: &mut Context, _f: Value, _t: Value, _a: &[Value]) -> VmResult<Value> {
        Err(ctx.throw_type_error("boom"))
    }

    let vm = new_vm();
    let mut ctx = vm.lock();

    let util = ctx.object_new(Value::Null).unwrap();
    ctx.object_set_name_s(util, "Util").unwrap();
    ctx.object_add_n_method(util, "boom", boom).unwrap();

    let key = ctx.string_new("boom").unwrap();
    let f = ctx.get(util, key).unwrap();

    let frames_before = ctx.frame_top();
    let result = ctx.call(f, Value::Null, &[]);
    assert!(result.is_err());
    assert_eq!(ctx.frame_top(), frames_before, "frame chain restored");

    let e = ctx.catch();
    let type_error = ctx.error_class(ErrorKind::Type);
    assert!(ctx.instance_of(e, type_error).unwrap());

    let class = ctx.type_of(e).unwrap();
    assert_eq!(ctx.get_full_name(class).unwrap(), "TypeError");

    let message = ctx.string_new("message").unwrap();
    let msg = ctx.get(e, message).unwrap();
    assert_eq!(text(&ctx, msg), "boom");

    // The dump walks the snapshot taken at throw time; the callee is on
    // top.
    let dump = ctx.stack_dump_string();
    assert!(dump.starts_with("stack:"), "dump: {dump}");
    assert!(dump.contains("Util.boom"), "dump: {dump}");

    // The rendered error reads "TypeError: boom".
    let rendered = ctx.to_string(e).unwrap();
    assert_eq!(text(&ctx, rendered), "TypeError: boom");
}

#[test]
fn global_refs_keep_objects_alive_across_collections() {
    let vm = new_vm();
    let mut ctx = vm.lock();

    let slot = ctx.push();
    let o = ctx.object_new(Value::Null).unwrap();
    ctx.object_add_var_s(o, "kept", Value::Number(1.0)).unwrap();
    ctx.stack_set(slot, o);

    ctx.global_ref(o);
    ctx.pop(slot);

    ctx.collect();

    let key = ctx.string_new("kept").unwrap();
    assert_eq!(ctx.get(o, key).unwrap(), Value::Number(1.0));

    let keys = ctx.keys(o).unwrap();
    assert_eq!(ctx.array_length(keys).unwrap(), 1);

    // Unpinning makes it collectable.
    let live_before = ctx.heap_live();
    ctx.global_unref(o);
    let stats = ctx.collect();
    assert!(stats.swept > 0);
    assert!(ctx.heap_live() < live_before);
}

#[test]
fn global_ref_counts_balance_and_saturate() {
    let vm = new_vm();
    let mut ctx = vm.lock();

    let o = ctx.object_new(Value::Null).unwrap();
    assert_eq!(ctx.global_ref_count(o), 0);

    ctx.global_ref(o);
    ctx.global_ref(o);
    assert_eq!(ctx.global_ref_count(o), 2);

    ctx.global_unref(o);
    ctx.global_unref(o);
    assert_eq!(ctx.global_ref_count(o), 0);

    // Extra releases are ignored.
    ctx.global_unref(o);
    assert_eq!(ctx.global_ref_count(o), 0);
}

#[test]
fn collector_is_quiescent_right_after_a_collection() {
    let vm = new_vm();
    let mut ctx = vm.lock();

    for _ in 0..16 {
        ctx.object_new(Value::Null).unwrap();
    }

    let first = ctx.collect();
    assert!(first.swept >= 16);

    let second = ctx.collect();
    assert_eq!(second.swept, 0);
    assert_eq!(second.marked, first.marked);
}

#[test]
fn value_stack_roots_survive_collection() {
    let vm = new_vm();
    let mut ctx = vm.lock();

    let slot = ctx.push_n(2);
    let a = ctx.string_new("rooted").unwrap();
    ctx.stack_set(slot, a);

    ctx.collect();

    let v = ctx.stack_get(slot);
    assert_eq!(text(&ctx, v), "rooted");
    ctx.pop(slot);
    assert_eq!(ctx.stack_len(), 0);
}

#[test]
fn array_boundaries_null_fill_and_tail_shift() {
    let vm = new_vm();
    let mut ctx = vm.lock();

    let arr = ctx.array_new(0).unwrap();

    // Read past the end: null.
    assert_eq!(ctx.array_get_item(arr, 10).unwrap(), Value::Null);
    assert_eq!(ctx.get(arr, Value::Number(10.0)).unwrap(), Value::Null);

    // Write past the end extends with null fill.
    ctx.set(arr, Value::Number(3.0), Value::Number(9.0)).unwrap();
    assert_eq!(ctx.array_length(arr).unwrap(), 4);
    assert_eq!(ctx.get(arr, Value::Number(0.0)).unwrap(), Value::Null);
    assert_eq!(ctx.get(arr, Value::Number(3.0)).unwrap(), Value::Number(9.0));

    // Deleting an index shifts the tail left.
    ctx.set(arr, Value::Number(0.0), Value::Number(1.0)).unwrap();
    ctx.del(arr, Value::Number(0.0)).unwrap();
    assert_eq!(ctx.array_length(arr).unwrap(), 3);
    assert_eq!(ctx.get(arr, Value::Number(2.0)).unwrap(), Value::Number(9.0));

    // String keys behave as on a plain object.
    let name = ctx.string_new("tag").unwrap();
    ctx.set(arr, name, Value::Bool(true)).unwrap();
    assert_eq!(ctx.get(arr, name).unwrap(), Value::Bool(true));
    assert_eq!(ctx.array_length(arr).unwrap(), 3);
}

#[test]
fn property_order_is_preserved_and_delete_readd_moves_to_end() {
    let vm = new_vm();
    let mut ctx = vm.lock();

    let o = ctx.object_new(Value::Null).unwrap();
    for name in ["first", "second", "third"] {
        let k = ctx.string_new(name).unwrap();
        ctx.set(o, k, Value::Bool(true)).unwrap();
    }

    let keys = ctx.keys(o).unwrap();
    let names: Vec<String> = (0..3)
        .map(|i| {
            let k = ctx.array_get_item(keys, i).unwrap();
            text(&ctx, k)
        })
        .collect();
    assert_eq!(names, ["first", "second", "third"]);

    let second = ctx.string_new("second").unwrap();
    ctx.del(o, second).unwrap();
    ctx.set(o, second, Value::Bool(false)).unwrap();

    let keys = ctx.keys(o).unwrap();
    let names: Vec<String> = (0..3)
        .map(|i| {
            let k = ctx.array_get_item(keys, i).unwrap();
            text(&ctx, k)
        })
        .collect();
    assert_eq!(names, ["first", "third", "second"]);
}

#[test]
fn number_coercion_edge_cases() {
    let vm = new_vm();
    let mut ctx = vm.lock();

    let nan = ctx.string_new("NaN").unwrap();
    assert!(ctx.to_number(nan).unwrap().is_nan());

    let inf = ctx.string_new("Infinity").unwrap();
    assert_eq!(ctx.to_number(inf).unwrap(), f64::INFINITY);

    let garbage = ctx.string_new("pelican").unwrap();
    assert!(ctx.to_number(garbage).unwrap().is_nan());

    let padded = ctx.string_new("  42  ").unwrap();
    assert_eq!(ctx.to_number(padded).unwrap(), 42.0);

    assert_eq!(ctx.to_number(Value::Bool(true)).unwrap(), 1.0);
    assert_eq!(ctx.to_number(Value::Null).unwrap(), 0.0);
}

#[test]
fn substr_negative_indices_and_empty_ranges() {
    let vm = new_vm();
    let mut ctx = vm.lock();

    let s = ctx.string_new("substring").unwrap();

    let tail = ctx.string_substr(s, -4, None).unwrap();
    assert_eq!(text(&ctx, tail), "ring");

    let mid = ctx.string_substr(s, 3, Some(6)).unwrap();
    assert_eq!(text(&ctx, mid), "str");

    let empty = ctx.string_substr(s, 6, Some(3)).unwrap();
    assert_eq!(text(&ctx, empty), "");

    let bytes = ctx.str_bytes(s).unwrap().to_vec();
    let round = String::from_utf8(bytes).unwrap();
    assert_eq!(round, "substring");
}

#[test]
fn string_methods_work_on_primitive_receivers() {
    let vm = new_vm();
    let mut ctx = vm.lock();

    let s = ctx.string_new("  pad  ").unwrap();
    let trim_key = ctx.string_new("trim").unwrap();
    let trimmed = ctx
        .try_call_method(s, trim_key, &[])
        .unwrap()
        .expect("strings expose trim through their interface");
    assert_eq!(text(&ctx, trimmed), "pad");

    let len_key = ctx.string_new("length").unwrap();
    let len = ctx.get(s, len_key).unwrap();
    assert_eq!(len, Value::Number(7.0));

    // Numeric keys read one-byte substrings.
    let byte = ctx.get(s, Value::Number(2.0)).unwrap();
    assert_eq!(text(&ctx, byte), "p");

    // Out-of-range byte reads are null, and writes are rejected.
    assert_eq!(ctx.get(s, Value::Number(99.0)).unwrap(), Value::Null);
    assert!(ctx.set(s, Value::Number(0.0), Value::Null).is_err());
    ctx.catch();
}

#[test]
fn replace_patterns_follow_the_dollar_rules() {
    let vm = new_vm();
    let mut ctx = vm.lock();

    let s = ctx.string_new("one two one").unwrap();
    let pat = ctx.string_new("one").unwrap();

    let rep = ctx.string_new("[$0]").unwrap();
    let out = ctx.string_replace(s, pat, rep, 0, false).unwrap();
    assert_eq!(text(&ctx, out), "[one] two [one]");

    let rep = ctx.string_new("<$1>").unwrap();
    let out = ctx.string_replace(s, pat, rep, 0, true).unwrap();
    assert_eq!(text(&ctx, out), "<> two one", "missing group renders empty");

    let rep = ctx.string_new("$$").unwrap();
    let out = ctx.string_replace(s, pat, rep, 0, true).unwrap();
    assert_eq!(text(&ctx, out), "$ two one");

    let rep = ctx.string_new("$u&").unwrap();
    let out = ctx.string_replace(s, pat, rep, 0, false).unwrap();
    assert_eq!(text(&ctx, out), "ONE two ONE");
}

#[test]
fn replace_accepts_a_callable_replacement() {
    fn shout(ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
        let m = args.first().copied().unwrap_or(Value::Null);
        let t = ctx.str_text(m).unwrap_or_default().to_uppercase();
        ctx.string_new(&t)
    }

    let vm = new_vm();
    let mut ctx = vm.lock();

    let s = ctx.string_new("a-b-a").unwrap();
    let pat = ctx.string_new("a").unwrap();
    let f = ctx.native_func_new(shout).unwrap();

    let out = ctx.string_replace(s, pat, f, 0, false).unwrap();
    assert_eq!(text(&ctx, out), "A-b-A");
}

#[test]
fn object_iterators_walk_entries_in_order() {
    let vm = new_vm();
    let mut ctx = vm.lock();

    let o = ctx.object_new(Value::Null).unwrap();
    for (name, v) in [("a", 1.0), ("b", 2.0)] {
        let k = ctx.string_new(name).unwrap();
        ctx.set(o, k, Value::Number(v)).unwrap();
    }

    let it = ctx.object_iter_new(o, ObjectIterKind::KeyValue).unwrap();
    let mut seen = Vec::new();
    while !ctx.iter_end(it).unwrap() {
        let pair = ctx.iter_value(it).unwrap();
        let k = ctx.array_get_item(pair, 0).unwrap();
        let v = ctx.array_get_item(pair, 1).unwrap();
        seen.push((text(&ctx, k), v));
        ctx.iter_next(it).unwrap();
    }
    ctx.iter_close(it).unwrap();

    assert_eq!(
        seen,
        vec![
            ("a".to_string(), Value::Number(1.0)),
            ("b".to_string(), Value::Number(2.0)),
        ]
    );
}

#[test]
fn proxies_route_the_protocol_through_their_template() {
    fn tmpl_get(ctx: &mut Context, _f: Value, this: Value, args: &[Value]) -> VmResult<Value> {
        let key = args.first().copied().unwrap_or(Value::Null);
        ctx.lookup(this, key)
    }
    fn tmpl_set(ctx: &mut Context, _f: Value, this: Value, args: &[Value]) -> VmResult<Value> {
        let key = args.first().copied().unwrap_or(Value::Null);
        let v = args.get(1).copied().unwrap_or(Value::Null);
        ctx.object_add_var(this, key, v)?;
        Ok(Value::Null)
    }
    fn tmpl_has(ctx: &mut Context, _f: Value, this: Value, args: &[Value]) -> VmResult<Value> {
        let key = args.first().copied().unwrap_or(Value::Null);
        ctx.lookup(this, key)
    }
    fn tmpl_keys(ctx: &mut Context, _f: Value, this: Value, _a: &[Value]) -> VmResult<Value> {
        ctx.keys(this)
    }
    fn tmpl_del(ctx: &mut Context, _f: Value, this: Value, args: &[Value]) -> VmResult<Value> {
        let key = args.first().copied().unwrap_or(Value::Null);
        ctx.del(this, key)?;
        Ok(Value::Null)
    }

    let vm = new_vm();
    let mut ctx = vm.lock();

    let backing = ctx.object_new(Value::Null).unwrap();
    let template = ctx.object_new(Value::Null).unwrap();
    ctx.object_add_n_method(template, "get", tmpl_get).unwrap();
    ctx.object_add_n_method(template, "set", tmpl_set).unwrap();
    ctx.object_add_n_method(template, "has", tmpl_has).unwrap();
    ctx.object_add_n_method(template, "keys", tmpl_keys).unwrap();
    ctx.object_add_n_method(template, "del", tmpl_del).unwrap();

    let proxy = ctx.proxy_new(template, backing).unwrap();

    let k = ctx.string_new("v").unwrap();
    ctx.set(proxy, k, Value::Number(5.0)).unwrap();
    assert_eq!(ctx.get(proxy, k).unwrap(), Value::Number(5.0));
    assert_eq!(ctx.lookup(proxy, k).unwrap(), Value::Number(5.0));

    let keys = ctx.keys(proxy).unwrap();
    assert_eq!(ctx.array_length(keys).unwrap(), 1);

    ctx.del(proxy, k).unwrap();
    assert_eq!(ctx.get(backing, k).unwrap(), Value::Null);
}

#[test]
fn enums_map_values_to_names_and_bitfields_decompose() {
    let vm = new_vm();
    let mut ctx = vm.lock();

    let e = ctx
        .enum_new(ox_vm::EnumKind::Enum, &[("zero", 0), ("one", 1), ("two", 2)])
        .unwrap();

    let name = ctx.get(e, Value::Number(1.0)).unwrap();
    assert_eq!(text(&ctx, name), "one");

    let one = ctx.string_new("one").unwrap();
    assert_eq!(ctx.get(e, one).unwrap(), Value::Number(1.0));

    assert_eq!(ctx.get(e, Value::Number(9.0)).unwrap(), Value::Null);

    assert!(ctx.set(e, one, Value::Number(5.0)).is_err());
    ctx.catch();

    let bits = ctx
        .enum_new(
            ox_vm::EnumKind::Bitfield,
            &[("read", 1), ("write", 2), ("exec", 4)],
        )
        .unwrap();

    let composite = ctx.get(bits, Value::Number(3.0)).unwrap();
    assert_eq!(text(&ctx, composite), "read|write");

    let with_residue = ctx.get(bits, Value::Number(9.0)).unwrap();
    assert_eq!(text(&ctx, with_residue), "read|0x8");

    let zero = ctx.get(bits, Value::Number(0.0)).unwrap();
    assert_eq!(text(&ctx, zero), "0");
}

#[test]
fn calling_primitive_classes_coerces() {
    let vm = new_vm();
    let mut ctx = vm.lock();

    let global = ctx.global_object();

    let number_key = ctx.string_new("Number").unwrap();
    let number = ctx.get(global, number_key).unwrap();
    let arg = ctx.string_new("12.5").unwrap();
    let n = ctx.call(number, Value::Null, &[arg]).unwrap();
    assert_eq!(n, Value::Number(12.5));

    let bool_key = ctx.string_new("Bool").unwrap();
    let bool_class = ctx.get(global, bool_key).unwrap();
    let b = ctx.call(bool_class, Value::Null, &[Value::Number(0.0)]).unwrap();
    assert_eq!(b, Value::Bool(false));

    let string_key = ctx.string_new("String").unwrap();
    let string_class = ctx.get(global, string_key).unwrap();
    let s = ctx
        .call(string_class, Value::Null, &[Value::Number(3.0)])
        .unwrap();
    assert_eq!(text(&ctx, s), "3");
}

#[test]
fn classes_run_init_with_the_callers_arguments() {
    fn point_init(ctx: &mut Context, _f: Value, this: Value, args: &[Value]) -> VmResult<Value> {
        let x = args.first().copied().unwrap_or(Value::Null);
        let key = ctx.string_new("x").unwrap();
        ctx.set(this, key, x)?;
        Ok(Value::Null)
    }

    let vm = new_vm();
    let mut ctx = vm.lock();

    let (point, point_inf) = ctx.named_class_new(Value::Null, "Point").unwrap();
    ctx.object_add_n_method(point_inf, "$init", point_init).unwrap();

    let p = ctx.call(point, Value::Null, &[Value::Number(4.0)]).unwrap();
    let key = ctx.string_new("x").unwrap();
    assert_eq!(ctx.get(p, key).unwrap(), Value::Number(4.0));
}

#[test]
fn function_interface_call_forwards_this_and_arguments() {
    fn pick(ctx: &mut Context, _f: Value, this: Value, args: &[Value]) -> VmResult<Value> {
        let first = args.first().copied().unwrap_or(Value::Null);
        let key = ctx.string_new("picked").unwrap();
        ctx.set(this, key, first)?;
        Ok(first)
    }

    let vm = new_vm();
    let mut ctx = vm.lock();

    let f = ctx.native_func_new(pick).unwrap();
    let target = ctx.object_new(Value::Null).unwrap();

    let call_key = ctx.string_new("call").unwrap();
    let rv = ctx
        .try_call_method(f, call_key, &[target, Value::Number(8.0)])
        .unwrap()
        .expect("functions expose call");
    assert_eq!(rv, Value::Number(8.0));

    let key = ctx.string_new("picked").unwrap();
    assert_eq!(ctx.get(target, key).unwrap(), Value::Number(8.0));
}
