//! The coroutine stack: one frame per active compiled call, holding the
//! instruction pointer and the saved slots of the call.

use {
    crate::value::{DeepCopy, Value},
    derive_more::Display,
    middle::types::Type,
};

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum RestoreError {
    #[display("slot {index} was never saved")]
    MissingSlot { index: usize },
    #[display("slot {index}: cannot restore {found} as {expected}")]
    TypeMismatch {
        index: usize,
        expected: Type,
        found: String,
    },
}

impl std::error::Error for RestoreError {}

#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Zero on a fresh call. Otherwise the end of the last statement that
    /// completed, or `1` for a suspended yield.
    pub ip: i64,
    slots: Vec<Option<Value>>,
}

impl Frame {
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn set(&mut self, index: usize, value: Value) {
        if self.slots.len() <= index {
            self.slots.resize(index + 1, None);
        }
        self.slots[index] = Some(value);
    }

    /// Reads a slot back into a variable of type `ty`.
    pub fn restore(&self, index: usize, ty: &Type) -> Result<Value, RestoreError> {
        let value = self
            .get(index)
            .ok_or(RestoreError::MissingSlot { index })?;
        if !value.has_type(ty) {
            return Err(RestoreError::TypeMismatch {
                index,
                expected: ty.clone(),
                found: value.type_name(),
            });
        }
        Ok(value.clone())
    }
}

/// Frames of the calls between the entry point and the innermost suspension
/// point. `fp` is the next frame to hand out: frames above it belong to
/// calls that have not been re-entered yet after a resumption.
#[derive(Debug, Clone, Default)]
pub struct Stack {
    frames: Vec<Frame>,
    fp: usize,
}

impl Stack {
    /// Enters a call, reusing the saved frame at `fp` if there is one.
    pub fn push(&mut self) -> usize {
        if self.fp == self.frames.len() {
            self.frames.push(Frame::default());
        }
        self.fp += 1;
        self.fp - 1
    }

    /// Leaves the innermost call for good, dropping its frame.
    pub fn pop(&mut self) {
        self.fp = self.fp.saturating_sub(1);
        self.frames.truncate(self.fp);
    }

    /// Starts over from the outermost frame, for the next resumption.
    pub fn rewind(&mut self) {
        self.fp = 0;
    }

    pub fn frame(&self, index: usize) -> &Frame {
        &self.frames[index]
    }

    pub fn frame_mut(&mut self, index: usize) -> &mut Frame {
        &mut self.frames[index]
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// A deep copy of the stack. Values sharing storage in the stack share
    /// storage in the copy, but nothing is shared with the original.
    pub fn snapshot(&self) -> Stack {
        let mut copier = DeepCopy::default();
        Stack {
            frames: self
                .frames
                .iter()
                .map(|frame| Frame {
                    ip: frame.ip,
                    slots: frame
                        .slots
                        .iter()
                        .map(|slot| slot.as_ref().map(|value| copier.copy(value)))
                        .collect(),
                })
                .collect(),
            fp: self.fp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_reuses_saved_frames() {
        let mut stack = Stack::default();
        let outer = stack.push();
        stack.frame_mut(outer).ip = 3;
        let inner = stack.push();
        stack.frame_mut(inner).ip = 1;
        assert_eq!(stack.frames().len(), 2);

        stack.rewind();
        assert_eq!(stack.push(), outer);
        assert_eq!(stack.frame(outer).ip, 3);
        assert_eq!(stack.push(), inner);
        stack.pop();
        assert_eq!(stack.frames().len(), 1);
        stack.pop();
        assert_eq!(stack.frames().len(), 0);
    }

    #[test]
    fn restore_checks_slot_types() {
        let mut frame = Frame::default();
        frame.set(1, Value::Int(7));
        assert_eq!(frame.restore(1, &Type::int()).ok().map(|v| v.to_string()), Some("7".to_owned()));
        assert_eq!(
            frame.restore(0, &Type::int()).err(),
            Some(RestoreError::MissingSlot { index: 0 })
        );
        assert_eq!(
            frame.restore(1, &Type::String).err(),
            Some(RestoreError::TypeMismatch {
                index: 1,
                expected: Type::String,
                found: "int".to_owned(),
            })
        );
    }

    #[test]
    fn snapshots_are_independent() {
        let mut stack = Stack::default();
        let index = stack.push();
        let items = Value::slice(Type::int(), vec![Value::Int(1)]);
        stack.frame_mut(index).set(0, items.clone());
        let snapshot = stack.snapshot();

        let Value::Slice { items: Some(items), .. } = items else {
            unreachable!()
        };
        items.borrow_mut().push(Value::Int(2));
        assert_eq!(stack.frame(index).get(0).map(Value::to_string), Some("[1 2]".to_owned()));
        assert_eq!(snapshot.frame(index).get(0).map(Value::to_string), Some("[1]".to_owned()));
    }
}
