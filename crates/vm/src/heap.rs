//! The VM heap: an arena of tagged objects addressed by [`GcRef`] indices.
//!
//! Every script-visible allocation lives in one arena slot. References are
//! plain indices, which is what lets the object graph contain cycles (class ↔
//! interface, closures ↔ frames) without reference counting; the collector in
//! [`crate::gc`] is a mark pass over indices followed by a sweep.

use crate::array::ArrayObject;
use crate::class::ClassObject;
use crate::enums::EnumObject;
use crate::function::{FunctionObject, NativeFunctionObject};
use crate::input::InputObject;
use crate::memory::MemoryCounters;
use crate::object::ObjectData;
use crate::proxy::ProxyObject;
use crate::script::{BcScript, NativeScript, ScriptData};
use crate::string::{StrData, StrObject};

/// An index into the VM heap.
///
/// A `GcRef` is only meaningful together with the heap that produced it, and
/// only while the referenced object is rooted; the collector recycles slots
/// of unreachable objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GcRef(pub(crate) u32);

impl GcRef {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Discriminates the heap object kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Plain object.
    Object,
    /// Interface object: the property fallback of a class's instances.
    Interface,
    /// Dense array.
    Array,
    /// Immutable string.
    Str,
    /// Interned string; identity implies content equality.
    SingletonStr,
    /// Class object.
    Class,
    /// Script-function closure.
    Function,
    /// Host callback.
    NativeFunction,
    /// Generic script module (package containers).
    Script,
    /// Compiled byte-code script module.
    BcScript,
    /// Native script module backed by a registered host module.
    NativeScript,
    /// Source input (string or file).
    Input,
    /// Enumeration or bitfield view.
    Enum,
    /// Protocol-forwarding proxy.
    Proxy,
}

/// A heap-allocated object.
pub enum HeapObject {
    /// Plain object.
    Object(ObjectData),
    /// Interface object.
    Interface(ObjectData),
    /// Dense array plus its property table.
    Array(ArrayObject),
    /// Immutable string.
    Str(StrObject),
    /// Class with an optional instance-allocation hook.
    Class(ClassObject),
    /// Script-function closure.
    Function(FunctionObject),
    /// Host callback.
    NativeFunction(NativeFunctionObject),
    /// Generic script module.
    Script(ScriptData),
    /// Byte-code script module.
    BcScript(BcScript),
    /// Native script module.
    NativeScript(NativeScript),
    /// Source input.
    Input(InputObject),
    /// Enumeration or bitfield.
    Enum(EnumObject),
    /// Proxy.
    Proxy(ProxyObject),
}

impl HeapObject {
    /// The object's kind tag.
    pub fn kind(&self) -> Kind {
        match self {
            HeapObject::Object(_) => Kind::Object,
            HeapObject::Interface(_) => Kind::Interface,
            HeapObject::Array(_) => Kind::Array,
            HeapObject::Str(s) => {
                if s.singleton {
                    Kind::SingletonStr
                } else {
                    Kind::Str
                }
            }
            HeapObject::Class(_) => Kind::Class,
            HeapObject::Function(_) => Kind::Function,
            HeapObject::NativeFunction(_) => Kind::NativeFunction,
            HeapObject::Script(_) => Kind::Script,
            HeapObject::BcScript(_) => Kind::BcScript,
            HeapObject::NativeScript(_) => Kind::NativeScript,
            HeapObject::Input(_) => Kind::Input,
            HeapObject::Enum(_) => Kind::Enum,
            HeapObject::Proxy(_) => Kind::Proxy,
        }
    }

    /// The embedded property table, for the kinds that carry one.
    pub(crate) fn object_data(&self) -> Option<&ObjectData> {
        match self {
            HeapObject::Object(d) | HeapObject::Interface(d) => Some(d),
            HeapObject::Array(a) => Some(&a.object),
            HeapObject::Class(c) => Some(&c.object),
            HeapObject::Function(f) => Some(&f.object),
            HeapObject::NativeFunction(f) => Some(&f.object),
            HeapObject::Enum(e) => Some(&e.object),
            HeapObject::Proxy(p) => Some(&p.object),
            _ => None,
        }
    }

    pub(crate) fn object_data_mut(&mut self) -> Option<&mut ObjectData> {
        match self {
            HeapObject::Object(d) | HeapObject::Interface(d) => Some(d),
            HeapObject::Array(a) => Some(&mut a.object),
            HeapObject::Class(c) => Some(&mut c.object),
            HeapObject::Function(f) => Some(&mut f.object),
            HeapObject::NativeFunction(f) => Some(&mut f.object),
            HeapObject::Enum(e) => Some(&mut e.object),
            HeapObject::Proxy(p) => Some(&mut p.object),
            _ => None,
        }
    }

    /// The embedded script data, for the script kinds.
    pub(crate) fn script_data(&self) -> Option<&ScriptData> {
        match self {
            HeapObject::Script(s) => Some(s),
            HeapObject::BcScript(s) => Some(&s.script),
            HeapObject::NativeScript(s) => Some(&s.script),
            _ => None,
        }
    }

    pub(crate) fn script_data_mut(&mut self) -> Option<&mut ScriptData> {
        match self {
            HeapObject::Script(s) => Some(s),
            HeapObject::BcScript(s) => Some(&mut s.script),
            HeapObject::NativeScript(s) => Some(&mut s.script),
            _ => None,
        }
    }

    pub(crate) fn str_object(&self) -> Option<&StrObject> {
        match self {
            HeapObject::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Estimated heap footprint charged to the memory counters.
    fn footprint(&self) -> usize {
        let base = std::mem::size_of::<HeapObject>();
        let extra = match self {
            HeapObject::Object(d) | HeapObject::Interface(d) => d.footprint(),
            HeapObject::Array(a) => {
                a.object.footprint() + a.items.len() * std::mem::size_of::<crate::value::Value>()
            }
            HeapObject::Str(s) => match &s.data {
                StrData::Owned(b) => b.len(),
                StrData::Static(_) | StrData::Mapped(_) => 0,
            },
            HeapObject::Class(c) => c.object.footprint(),
            HeapObject::Function(f) => {
                f.object.footprint() + f.frames.len() * std::mem::size_of::<u32>()
            }
            HeapObject::NativeFunction(f) => f.object.footprint(),
            HeapObject::Script(s) => s.footprint(),
            HeapObject::BcScript(s) => s.script.footprint() + s.bytecode.len(),
            HeapObject::NativeScript(s) => s.script.footprint(),
            HeapObject::Input(i) => match &i.data {
                StrData::Owned(b) => b.len(),
                StrData::Static(_) | StrData::Mapped(_) => 0,
            },
            HeapObject::Enum(e) => {
                e.object.footprint() + e.items.len() * std::mem::size_of::<(i32, GcRef)>()
            }
            HeapObject::Proxy(p) => p.object.footprint(),
        };
        base + extra
    }
}

/// The object arena.
pub(crate) struct Heap {
    pub(crate) slots: Vec<Option<HeapObject>>,
    pub(crate) footprints: Vec<usize>,
    pub(crate) marks: Vec<bool>,
    pub(crate) free: Vec<u32>,
}

impl Heap {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            footprints: Vec::new(),
            marks: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Adds an object, charging its footprint, and returns its reference.
    pub(crate) fn add(&mut self, obj: HeapObject, mem: &mut MemoryCounters) -> GcRef {
        let footprint = obj.footprint();
        mem.allocate(footprint);

        if let Some(idx) = self.free.pop() {
            let i = idx as usize;
            self.slots[i] = Some(obj);
            self.footprints[i] = footprint;
            self.marks[i] = false;
            GcRef(idx)
        } else {
            self.slots.push(Some(obj));
            self.footprints.push(footprint);
            self.marks.push(false);
            GcRef((self.slots.len() - 1) as u32)
        }
    }

    pub(crate) fn try_get(&self, r: GcRef) -> Option<&HeapObject> {
        self.slots.get(r.index()).and_then(|s| s.as_ref())
    }

    pub(crate) fn get(&self, r: GcRef) -> &HeapObject {
        self.try_get(r).expect("stale heap reference")
    }

    pub(crate) fn get_mut(&mut self, r: GcRef) -> &mut HeapObject {
        self.slots
            .get_mut(r.index())
            .and_then(|s| s.as_mut())
            .expect("stale heap reference")
    }

    pub(crate) fn kind(&self, r: GcRef) -> Kind {
        self.get(r).kind()
    }

    /// Number of live objects.
    pub(crate) fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectData;
    use crate::value::Value;

    #[test]
    fn test_add_and_reuse_slots() {
        let mut heap = Heap::new();
        let mut mem = MemoryCounters::new();

        let a = heap.add(HeapObject::Object(ObjectData::new(Value::Null)), &mut mem);
        let b = heap.add(HeapObject::Object(ObjectData::new(Value::Null)), &mut mem);
        assert_ne!(a, b);
        assert_eq!(heap.live(), 2);
        assert!(mem.allocated() > 0);

        // Simulate a sweep of `a`.
        let footprint = heap.footprints[a.index()];
        heap.slots[a.index()] = None;
        heap.free.push(a.0);
        mem.release(footprint);

        let c = heap.add(HeapObject::Object(ObjectData::new(Value::Null)), &mut mem);
        assert_eq!(c.index(), a.index());
        assert_eq!(heap.live(), 2);
    }

    #[test]
    fn test_kind_tags() {
        let mut heap = Heap::new();
        let mut mem = MemoryCounters::new();

        let o = heap.add(HeapObject::Object(ObjectData::new(Value::Null)), &mut mem);
        assert_eq!(heap.kind(o), Kind::Object);
        assert!(heap.get(o).object_data().is_some());
        assert!(heap.get(o).script_data().is_none());
    }
}
