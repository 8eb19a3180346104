//! The `Number` class.

use crate::context::Context;
use crate::error::VmResult;
use crate::value::{self, Value};

fn number_is_fn(_ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
    let v = args.first().copied().unwrap_or(Value::Null);
    Ok(Value::Bool(matches!(v, Value::Number(_))))
}

fn number_parse_fn(ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
    let arg = args.first().copied().unwrap_or(Value::Null);
    let n = ctx.to_number(arg)?;
    Ok(Value::Number(n))
}

fn number_to_str_fn(ctx: &mut Context, _f: Value, this: Value, _a: &[Value]) -> VmResult<Value> {
    match this {
        Value::Number(n) => {
            let text = value::number_to_display(n);
            ctx.string_new(&text)
        }
        _ => Err(ctx.throw_type_error("the value is not a number")),
    }
}

/// Builds the `Number` class.
pub(crate) fn class_init(ctx: &mut Context) -> VmResult<()> {
    let global = ctx.global_object();

    let (class, inf) = ctx.named_class_new(Value::Null, "Number")?;
    ctx.object_add_const_s(global, "Number", class)?;
    ctx.core.globals.number_class = class;
    ctx.core.globals.number_inf = inf;

    ctx.object_add_n_method(class, "is", number_is_fn)?;
    ctx.object_add_n_method(class, "parse", number_parse_fn)?;
    ctx.object_add_n_method(inf, "$to_str", number_to_str_fn)?;

    Ok(())
}

/// Calling the `Number` class coerces the argument.
pub(crate) fn number_class_call(
    ctx: &mut Context,
    _class: Value,
    _this: Value,
    args: &[Value],
) -> VmResult<Value> {
    let arg = args.first().copied().unwrap_or(Value::Null);
    let n = ctx.to_number(arg)?;
    Ok(Value::Number(n))
}
