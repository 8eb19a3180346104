//! # OX Virtual Machine (ox-vm)
//!
//! The embeddable runtime core of the OX scripting language.
//!
//! A host program creates a [`Vm`], acquires its [`Context`] (the big
//! lock), and drives the runtime through it: building values, defining
//! classes and native functions, loading script modules, and calling into
//! script code. The lexer, parser, byte-code compiler, and CLI are external
//! collaborators that plug in through hooks.
//!
//! ## Features
//!
//! - **Tagged values**: null, booleans, IEEE-754 numbers, and heap objects
//! - **Object protocol**: insertion-ordered properties, interfaces,
//!   accessors, private data slots, iterators, proxies
//! - **Strings**: owned/constant/memory-mapped storage with per-VM
//!   interning
//! - **Classes**: interface-based inheritance, enums and bitfields
//! - **Modules**: a loader with relative/absolute/package resolution,
//!   cross-script linking, and circular-import detection
//! - **Errors**: typed error classes with throw/catch and stack dumps
//! - **Memory**: a tracing collector over every root the host can hold
//!
//! ## Example
//!
//! ```rust
//! use ox_vm::{Value, Vm};
//!
//! let vm = Vm::new();
//! let mut ctx = vm.lock();
//!
//! // Build an object with a property and read it back.
//! let o = ctx.object_new(Value::Null).unwrap();
//! let key = ctx.string_new("answer").unwrap();
//! ctx.set(o, key, Value::Number(42.0)).unwrap();
//!
//! let v = ctx.get(o, key).unwrap();
//! assert_eq!(v, Value::Number(42.0));
//! ```
//!
//! ## Architecture
//!
//! - [`Vm`] / [`Context`]: lifecycle and the big lock
//! - [`Value`] and the heap arena: the tagged variant and object kinds
//! - [`object`]: the keys/lookup/get/set/del/call protocol
//! - [`script`] / [`loader`] / [`package`]: module loading and linking
//! - [`gc`]: the stop-the-world mark-sweep collector
//! - [`error`]: the error taxonomy and propagation model

#![warn(rustdoc::missing_crate_level_docs)]

/// Dense arrays.
pub mod array;
/// The `Bool` class.
pub mod boolean;
/// Class and interface construction.
pub mod class;
/// The per-thread execution context and embedder API surface.
pub mod context;
/// Enumerations and bitfields.
pub mod enums;
/// Error taxonomy and propagation.
pub mod error;
/// Call frames.
pub mod frame;
/// Callables: native functions and script closures.
pub mod function;
/// The tracing collector.
pub mod gc;
/// The heap arena and object kinds.
pub mod heap;
/// Source inputs.
pub mod input;
/// Script location and loading.
pub mod loader;
/// Allocation accounting.
pub mod memory;
/// The `Number` class.
pub mod number;
/// Objects and the property protocol.
pub mod object;
/// The package manager.
pub mod package;
/// Proxy objects.
pub mod proxy;
/// Script modules and linking.
pub mod script;
/// The string subsystem.
pub mod string;
/// Condition-variable waits for platform code.
pub mod sync;
/// The tagged value variant.
pub mod value;
/// The per-context evaluation stack.
pub mod value_stack;
/// VM lifecycle and configuration.
pub mod vm;

pub use context::Context;
pub use error::{ErrorKind, Fault, VmResult};
pub use frame::FrameRef;
pub use function::{InterpFn, NativeFn};
pub use gc::{GcStats, Marker};
pub use heap::{GcRef, HeapObject, Kind};
pub use loader::{CompileFn, NativeModule};
pub use memory::MemoryCounters;
pub use object::{ObjectIterKind, PrivateData, Property};
pub use script::{
    Decl, DeclFlags, RefDesc, RefItem, ScriptDesc, ScriptFunc, ScriptLoc, ScriptRef, ScriptState,
};
pub use string::TrimMode;
pub use sync::{Monitor, WaitStatus};
pub use value::Value;
pub use value_stack::{Slot, ValueStack};
pub use vm::{LogFields, LogLevel, Vm, VmOptions};
pub use enums::EnumKind;
