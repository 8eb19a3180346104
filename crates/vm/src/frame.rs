//! Call frames.
//!
//! Frames form a singly-linked stack per context. A frame holds one slot per
//! declaration of the called function; script closures additionally pin an
//! array of ancestor frames so captured upvalues stay alive. Frames live in
//! their own arena and are swept together with the heap; popping a frame
//! does not free it, reachability does.

use crate::memory::MemoryCounters;
use crate::value::Value;

/// An index into the frame arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRef(pub(crate) u32);

impl FrameRef {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// One call record.
pub struct Frame {
    /// The frame below this one, if any.
    pub(crate) caller: Option<FrameRef>,
    /// The callable that owns the frame.
    pub(crate) func: Value,
    /// One slot per declaration, null-initialised.
    pub(crate) slots: Vec<Value>,
    /// Instruction pointer for source-location lookup; -1 when not executing
    /// byte code.
    pub(crate) ip: i32,
}

impl Frame {
    fn footprint(n: usize) -> usize {
        std::mem::size_of::<Frame>() + n * std::mem::size_of::<Value>()
    }
}

/// The frame arena.
pub(crate) struct FrameArena {
    pub(crate) slots: Vec<Option<Frame>>,
    pub(crate) marks: Vec<bool>,
    pub(crate) free: Vec<u32>,
}

impl FrameArena {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            marks: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Allocates a frame with `n` null slots.
    pub(crate) fn add(
        &mut self,
        caller: Option<FrameRef>,
        func: Value,
        n: usize,
        mem: &mut MemoryCounters,
    ) -> FrameRef {
        mem.allocate(Frame::footprint(n));

        let frame = Frame {
            caller,
            func,
            slots: vec![Value::Null; n],
            ip: -1,
        };

        if let Some(idx) = self.free.pop() {
            let i = idx as usize;
            self.slots[i] = Some(frame);
            self.marks[i] = false;
            FrameRef(idx)
        } else {
            self.slots.push(Some(frame));
            self.marks.push(false);
            FrameRef((self.slots.len() - 1) as u32)
        }
    }

    pub(crate) fn get(&self, r: FrameRef) -> &Frame {
        self.slots
            .get(r.index())
            .and_then(|s| s.as_ref())
            .expect("stale frame reference")
    }

    pub(crate) fn get_mut(&mut self, r: FrameRef) -> &mut Frame {
        self.slots
            .get_mut(r.index())
            .and_then(|s| s.as_mut())
            .expect("stale frame reference")
    }

    pub(crate) fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_chain() {
        let mut arena = FrameArena::new();
        let mut mem = MemoryCounters::new();

        let bottom = arena.add(None, Value::Null, 2, &mut mem);
        let top = arena.add(Some(bottom), Value::Null, 0, &mut mem);

        assert_eq!(arena.get(top).caller, Some(bottom));
        assert_eq!(arena.get(bottom).caller, None);
        assert_eq!(arena.get(bottom).slots.len(), 2);
        assert_eq!(arena.get(bottom).slots[0], Value::Null);
        assert_eq!(arena.get(top).ip, -1);
        assert_eq!(arena.live(), 2);
    }
}
