//! The `Bool` class.

use crate::context::Context;
use crate::error::VmResult;
use crate::value::Value;

fn bool_is_fn(_ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
    let v = args.first().copied().unwrap_or(Value::Null);
    Ok(Value::Bool(matches!(v, Value::Bool(_))))
}

fn bool_to_str_fn(ctx: &mut Context, _f: Value, this: Value, _a: &[Value]) -> VmResult<Value> {
    match this {
        Value::Bool(true) => ctx.string_from_static("true"),
        Value::Bool(false) => ctx.string_from_static("false"),
        _ => Err(ctx.throw_type_error("the value is not a boolean")),
    }
}

/// Builds the `Bool` class.
pub(crate) fn class_init(ctx: &mut Context) -> VmResult<()> {
    let global = ctx.global_object();

    let (class, inf) = ctx.named_class_new(Value::Null, "Bool")?;
    ctx.object_add_const_s(global, "Bool", class)?;
    ctx.core.globals.bool_class = class;
    ctx.core.globals.bool_inf = inf;

    ctx.object_add_n_method(class, "is", bool_is_fn)?;
    ctx.object_add_n_method(inf, "$to_str", bool_to_str_fn)?;

    Ok(())
}

/// Calling the `Bool` class coerces the argument.
pub(crate) fn bool_class_call(
    ctx: &mut Context,
    _class: Value,
    _this: Value,
    args: &[Value],
) -> VmResult<Value> {
    let arg = args.first().copied().unwrap_or(Value::Null);
    Ok(Value::Bool(ctx.to_bool(arg)))
}
