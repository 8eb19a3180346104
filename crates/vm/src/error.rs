//! Error taxonomy for the OX virtual machine.
//!
//! Errors raised by the runtime are ordinary script objects whose class is
//! one of the nine kinds below. Rust code signals an in-flight error with the
//! [`Fault`] sentinel; the error value itself lives in the context error slot
//! until it is caught.

use thiserror::Error;

use crate::context::Context;
use crate::value::Value;

/// The script-visible error classes.
///
/// `Display` renders the class name exactly as scripts see it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Generic, programmer-raised error.
    #[error("Error")]
    Generic,

    /// OS or FFI failure; the message names the failing call.
    #[error("SystemError")]
    System,

    /// An allocation returned zero bytes.
    #[error("NoMemoryError")]
    NoMemory,

    /// Null reference dereference.
    #[error("NullError")]
    Null,

    /// Numeric or index value out of the permitted range.
    #[error("RangeError")]
    Range,

    /// Write to a constant, missing setter, or forbidden mutation.
    #[error("AccessError")]
    Access,

    /// Wrong value kind for the operation.
    #[error("TypeError")]
    Type,

    /// Parse, compile, or FFI-preparation failure.
    #[error("SyntaxError")]
    Syntax,

    /// Missing name, circular import, duplicate field.
    #[error("ReferenceError")]
    Reference,
}

impl ErrorKind {
    /// All kinds, in bootstrap order. `Generic` must come first so the other
    /// classes can inherit it.
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::Generic,
        ErrorKind::Null,
        ErrorKind::Type,
        ErrorKind::Range,
        ErrorKind::System,
        ErrorKind::Reference,
        ErrorKind::NoMemory,
        ErrorKind::Syntax,
        ErrorKind::Access,
    ];

    /// Stable index into the VM's error-class table.
    pub(crate) fn index(self) -> usize {
        match self {
            ErrorKind::Generic => 0,
            ErrorKind::Null => 1,
            ErrorKind::Type => 2,
            ErrorKind::Range => 3,
            ErrorKind::System => 4,
            ErrorKind::Reference => 5,
            ErrorKind::NoMemory => 6,
            ErrorKind::Syntax => 7,
            ErrorKind::Access => 8,
        }
    }
}

/// Sentinel for a raised error.
///
/// A returned `Fault` means the context error slot is populated; callers
/// either propagate it with `?` or consume the error with
/// [`Context::catch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault;

/// Result type for VM operations.
pub type VmResult<T> = std::result::Result<T, Fault>;

fn error_inf_init(
    ctx: &mut Context,
    _func: Value,
    this: Value,
    args: &[Value],
) -> VmResult<Value> {
    let arg = args.first().copied().unwrap_or(Value::Null);

    if !arg.is_null() {
        let msg = ctx.to_string(arg)?;
        let key = ctx.sym_value("message")?;
        ctx.set(this, key, msg)?;
    }

    Ok(Value::Null)
}

fn error_inf_to_str(
    ctx: &mut Context,
    _func: Value,
    this: Value,
    _args: &[Value],
) -> VmResult<Value> {
    let error_class = ctx.error_class(ErrorKind::Generic);
    if !ctx.instance_of(this, error_class)? {
        return Err(ctx.throw_type_error("the value is not an error"));
    }

    let class = ctx.type_of(this)?;
    let mut out = ctx.get_full_name(class)?;

    let key = ctx.sym_value("message")?;
    let msg = ctx.get(this, key)?;
    if !msg.is_null() {
        let msg = ctx.to_string(msg)?;
        out.push_str(": ");
        if let Some(text) = ctx.str_text(msg) {
            out.push_str(text);
        }
    }

    ctx.string_new(&out)
}

/// Build the `Error` class family and publish it on the global object.
pub(crate) fn class_init(ctx: &mut Context) -> VmResult<()> {
    let global = ctx.global_object();

    let (error, inf) = ctx.named_class_new(Value::Null, "Error")?;
    ctx.set_error_class(ErrorKind::Generic, error);
    ctx.object_add_const_s(global, "Error", error)?;

    ctx.object_add_n_method(inf, "$init", error_inf_init)?;
    ctx.object_add_n_method(inf, "$to_str", error_inf_to_str)?;

    for kind in ErrorKind::ALL {
        if kind == ErrorKind::Generic {
            continue;
        }

        let name = kind.to_string();
        let (class, _inf) = ctx.named_class_new(Value::Null, &name)?;
        ctx.class_inherit(class, error)?;
        ctx.set_error_class(kind, class);
        ctx.object_add_const_s(global, &name, class)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display_is_class_name() {
        assert_eq!(ErrorKind::Generic.to_string(), "Error");
        assert_eq!(ErrorKind::Type.to_string(), "TypeError");
        assert_eq!(ErrorKind::NoMemory.to_string(), "NoMemoryError");
        assert_eq!(ErrorKind::Reference.to_string(), "ReferenceError");
    }

    #[test]
    fn test_kind_indices_are_unique() {
        let mut seen = [false; 9];
        for kind in ErrorKind::ALL {
            let i = kind.index();
            assert!(!seen[i], "duplicate index for {kind}");
            seen[i] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }
}
