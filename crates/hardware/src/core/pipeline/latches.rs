//! Pipeline stage register bundles.
//!
//! Each stage owns the latched registers holding its *input*: the program
//! state pair of the instruction in flight, the instruction word, and the
//! operand values primed by earlier stages. The fetch-decode stage's bundle
//! is the instruction address itself. Producers write only input sides; the
//! global tick advances input to output; a stalled stage re-loads its own
//! outputs to hold.
//!
//! Operand conventions, by family: `val_a` carries the left ALU operand (the
//! target's old value for mode-0/3 forms and DEP), `val_b` the right operand
//! or the memory-operand base register, `val_x` the index register or
//! decoded immediate, `val_s` the resolved segment value of a memory
//! operand.

use crate::common::reg::Latch;

/// The fetch-decode stage register: the instruction address.
#[derive(Debug, Default)]
pub struct FdBundle {
    /// IA segment.
    pub psw0: Latch,
    /// IA offset.
    pub psw1: Latch,
    /// Stall flag of the last processed cycle.
    pub stalled: bool,
}

impl FdBundle {
    /// Zeroes the bundle.
    pub fn reset(&mut self) {
        self.psw0.reset();
        self.psw1.reset();
        self.stalled = false;
    }

    /// Advances the latches.
    pub fn tick(&mut self) {
        self.psw0.tick();
        self.psw1.tick();
    }

    /// Holds the current IA for a stalled cycle.
    pub fn hold(&mut self) {
        self.psw0.load(self.psw0.get());
        self.psw1.load(self.psw1.get());
    }
}

/// Input bundle of the memory-access and execute stages.
#[derive(Debug, Default)]
pub struct StageBundle {
    /// Non-zero when the slot carries a real instruction (vs a bubble).
    pub valid: Latch,
    /// IA segment of the instruction in flight.
    pub psw0: Latch,
    /// IA offset of the instruction in flight.
    pub psw1: Latch,
    /// The instruction word.
    pub instr: Latch,
    /// Operand value A.
    pub val_a: Latch,
    /// Operand value B.
    pub val_b: Latch,
    /// Operand value X.
    pub val_x: Latch,
    /// Operand segment value S.
    pub val_s: Latch,
    /// Stall flag of the last processed cycle.
    pub stalled: bool,
}

impl StageBundle {
    /// Zeroes the bundle to a bubble.
    pub fn reset(&mut self) {
        self.valid.reset();
        self.psw0.reset();
        self.psw1.reset();
        self.instr.reset();
        self.val_a.reset();
        self.val_b.reset();
        self.val_x.reset();
        self.val_s.reset();
        self.stalled = false;
    }

    /// Advances the latches.
    pub fn tick(&mut self) {
        self.valid.tick();
        self.psw0.tick();
        self.psw1.tick();
        self.instr.tick();
        self.val_a.tick();
        self.val_b.tick();
        self.val_x.tick();
        self.val_s.tick();
    }

    /// Re-loads the outputs, holding the instruction for a stalled cycle.
    pub fn hold(&mut self) {
        self.valid.load(self.valid.get());
        self.psw0.load(self.psw0.get());
        self.psw1.load(self.psw1.get());
        self.instr.load(self.instr.get());
        self.val_a.load(self.val_a.get());
        self.val_b.load(self.val_b.get());
        self.val_x.load(self.val_x.get());
        self.val_s.load(self.val_s.get());
    }

    /// Loads a bubble into the input side.
    pub fn load_bubble(&mut self) {
        self.valid.load(0);
        self.psw0.load(0);
        self.psw1.load(0);
        self.instr.load(0);
        self.val_a.load(0);
        self.val_b.load(0);
        self.val_x.load(0);
        self.val_s.load(0);
    }

    /// True when the slot holds a real instruction this cycle.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid.get() != 0
    }
}
