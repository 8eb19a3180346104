//! Stop-the-world tracing collector.
//!
//! Roots: every context's value stack, frame chain, error slot, error-frame
//! snapshot and current script; the global-ref table; the packages object;
//! every script-table entry; the intern table; and the well-known bootstrap
//! objects. Collection runs only while the big lock is held, never
//! concurrently with mutator code.

use crate::frame::FrameRef;
use crate::heap::{GcRef, HeapObject};
use crate::value::Value;
use crate::vm::VmCore;

/// Collection statistics, returned so callers can assert collector
/// invariants (every reachable object marked, every swept object released
/// exactly once).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcStats {
    /// Heap objects reached from the roots.
    pub marked: usize,
    /// Heap objects released by the sweep.
    pub swept: usize,
}

/// Work list used while marking. Kind-specific scan hooks report their
/// outgoing references here.
pub struct Marker {
    values: Vec<GcRef>,
    frames: Vec<FrameRef>,
}

impl Marker {
    fn new() -> Self {
        Self {
            values: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// Marks a value; non-heap values are ignored.
    pub fn value(&mut self, v: Value) {
        if let Value::Heap(r) = v {
            self.values.push(r);
        }
    }

    /// Marks a heap reference.
    pub fn gc_ref(&mut self, r: GcRef) {
        self.values.push(r);
    }

    /// Marks a frame.
    pub(crate) fn frame(&mut self, f: FrameRef) {
        self.frames.push(f);
    }
}

// Report the outgoing references of one heap object.
fn scan_heap_object(obj: &HeapObject, m: &mut Marker) {
    match obj {
        HeapObject::Object(d) | HeapObject::Interface(d) => d.scan(m),
        HeapObject::Array(a) => {
            a.object.scan(m);
            for v in &a.items {
                m.value(*v);
            }
        }
        // Strings have no outgoing references.
        HeapObject::Str(_) | HeapObject::Input(_) => {}
        HeapObject::Class(c) => c.object.scan(m),
        HeapObject::Function(f) => {
            f.object.scan(m);
            m.gc_ref(f.script);
            for frame in &f.frames {
                m.frame(*frame);
            }
        }
        HeapObject::NativeFunction(f) => {
            f.object.scan(m);
            m.value(f.script);
        }
        HeapObject::Script(s) => s.scan(m),
        HeapObject::BcScript(s) => {
            s.script.scan(m);
            if let Some(base) = s.base {
                m.gc_ref(base);
            }
            m.value(s.input);
            for v in s
                .consts
                .iter()
                .chain(&s.patterns)
                .chain(&s.templates)
                .chain(&s.templates_local)
            {
                m.value(*v);
            }
            for sf in &s.sfuncs {
                for key in sf.decls.keys() {
                    m.gc_ref(*key);
                }
            }
        }
        HeapObject::NativeScript(s) => s.script.scan(m),
        HeapObject::Enum(e) => {
            e.object.scan(m);
            for name in e.items.values() {
                m.gc_ref(*name);
            }
        }
        HeapObject::Proxy(p) => {
            p.object.scan(m);
            m.value(p.template);
            m.value(p.this_value);
        }
    }
}

impl VmCore {
    /// Runs a full collection and returns its statistics.
    pub(crate) fn collect(&mut self) -> GcStats {
        for mark in &mut self.heap.marks {
            *mark = false;
        }
        for mark in &mut self.frames.marks {
            *mark = false;
        }

        let mut marker = Marker::new();

        for state in self.contexts.values() {
            for v in state.stack.iter() {
                marker.value(v);
            }
            if let Some(f) = state.frames {
                marker.frame(f);
            }
            marker.value(state.error);
            if let Some(f) = state.error_frames {
                marker.frame(f);
            }
            marker.value(state.curr_script);
        }

        for r in self.global_refs.keys() {
            marker.gc_ref(*r);
        }

        marker.value(self.packages);

        for script in self.scripts.values() {
            marker.value(*script);
        }

        for r in self.interns.refs() {
            marker.gc_ref(r);
        }

        self.globals.scan(&mut marker);
        self.syms.scan(&mut marker);

        let mut marked = 0usize;
        loop {
            if let Some(r) = marker.values.pop() {
                let i = r.index();
                if i >= self.heap.slots.len() || self.heap.slots[i].is_none() {
                    continue;
                }
                if self.heap.marks[i] {
                    continue;
                }
                self.heap.marks[i] = true;
                marked += 1;

                let obj = self.heap.slots[i].as_ref().expect("marked slot is empty");
                scan_heap_object(obj, &mut marker);
            } else if let Some(f) = marker.frames.pop() {
                let i = f.index();
                if i >= self.frames.slots.len() || self.frames.slots[i].is_none() {
                    continue;
                }
                if self.frames.marks[i] {
                    continue;
                }
                self.frames.marks[i] = true;

                let frame = self.frames.slots[i].as_ref().expect("marked frame is empty");
                marker.value(frame.func);
                for v in &frame.slots {
                    marker.value(*v);
                }
                if let Some(caller) = frame.caller {
                    marker.frame(caller);
                }
            } else {
                break;
            }
        }

        let swept = self.sweep();

        log::debug!(
            target: "ox_gc",
            "collect: {marked} marked, {swept} swept, {} live",
            self.heap.live()
        );

        GcStats { marked, swept }
    }

    // Release every unmarked heap object and frame.
    fn sweep(&mut self) -> usize {
        let mut swept = 0usize;

        for i in 0..self.heap.slots.len() {
            if self.heap.slots[i].is_some() && !self.heap.marks[i] {
                let obj = self.heap.slots[i].take().expect("swept slot is empty");
                self.release_heap_object(i, &obj);
                swept += 1;
            }
        }

        for i in 0..self.frames.slots.len() {
            if self.frames.slots[i].is_some() && !self.frames.marks[i] {
                let frame = self.frames.slots[i].take().expect("swept frame is empty");
                self.mem.release(
                    std::mem::size_of::<crate::frame::Frame>()
                        + frame.slots.len() * std::mem::size_of::<Value>(),
                );
                self.frames.free.push(i as u32);
            }
        }

        swept
    }

    // Release one heap slot: intern unregistration plus footprint release.
    fn release_heap_object(&mut self, index: usize, obj: &HeapObject) {
        if let HeapObject::Str(s) = obj {
            if s.singleton {
                self.interns.remove(s.data.bytes());
            }
        }

        self.mem.release(self.heap.footprints[index]);
        self.heap.free.push(index as u32);
    }

    /// Releases every object unconditionally. Runs at VM teardown.
    pub(crate) fn sweep_all(&mut self) {
        for i in 0..self.heap.slots.len() {
            if let Some(obj) = self.heap.slots[i].take() {
                self.release_heap_object(i, &obj);
            }
        }

        for i in 0..self.frames.slots.len() {
            if let Some(frame) = self.frames.slots[i].take() {
                self.mem.release(
                    std::mem::size_of::<crate::frame::Frame>()
                        + frame.slots.len() * std::mem::size_of::<Value>(),
                );
                self.frames.free.push(i as u32);
            }
        }
    }
}
