//! Multi-warrior MARS execution engine.
//!
//! A [`VM`] owns the [`Core`] and the living [`Warrior`]s of one match. Each
//! cycle every living warrior runs the instruction under its head task; tasks
//! are requeued, spawned or dropped according to the [`TaskUpdate`] the
//! opcode handler returns. Warriors whose queues run dry are removed at the
//! end of the cycle.
//!
//! Handlers are plain functions over an [`ExecContext`] and the core, one per
//! opcode, selected by a `match` generated from
//! [`for_each_opcode!`](crate::for_each_opcode).
//!
//! Runtime faults are not errors. `DAT` and division by zero simply do not
//! requeue the task; a warrior with no tasks left is removed.

pub mod context;
pub mod core;
pub mod lens;
pub mod trace;
pub mod warrior;


use crate::for_each_opcode;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Modifier, Opcode};
use crate::virtual_machine::operand::Instruction;
use crate::virtual_machine::options::{Separation, VmOptions};
use crate::virtual_machine::program::Program;
use crate::virtual_machine::vm::context::ExecContext;
use crate::virtual_machine::vm::core::{Core, InstructionPointer};
use crate::virtual_machine::vm::trace::{NoTrace, StepEvent, TraceSink};
use crate::virtual_machine::vm::warrior::{TaskReport, TaskUpdate, Warrior};
use crate::{debug, info, warn};
use rand_core::{OsRng, RngCore};
use std::fmt::{self, Display};

/// Outcome kind of a finished match.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MatchStatus {
    Win,
    Tie,
}

impl Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStatus::Win => f.write_str("WIN"),
            MatchStatus::Tie => f.write_str("TIE"),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MatchResult {
    pub status: MatchStatus,
    /// Set only for [`MatchStatus::Win`].
    pub winner_id: Option<usize>,
    pub num_cycles: usize,
}

impl Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.winner_id {
            Some(id) => write!(
                f,
                "{} warrior {id} after {} cycles",
                self.status, self.num_cycles
            ),
            None => write!(f, "{} after {} cycles", self.status, self.num_cycles),
        }
    }
}

// ==================== Opcode handlers ====================

/// Writes `values` into the selected fields of the B write cell.
fn write_b_fields(ctx: &ExecContext, core: &mut Core, values: &[i64]) {
    let mut target = ctx.b.write_pointer.fetch(core);
    ctx.b_lens.set(&mut target, values);
    ctx.b.write_pointer.set(core, target);
}

fn op_dat(_ctx: &ExecContext, _core: &mut Core) -> TaskUpdate {
    TaskUpdate::halt()
}

fn op_mov(ctx: &ExecContext, core: &mut Core) -> TaskUpdate {
    if ctx.insn.modifier == Modifier::I {
        ctx.b.write_pointer.set(core, ctx.a.insn);
    } else {
        let values = ctx.a_lens.get(&ctx.a.insn);
        write_b_fields(ctx, core, &values);
    }
    TaskUpdate::continue_at(ctx.next())
}

/// `ADD`, `SUB`, `MUL`, `DIV` and `MOD`.
///
/// Computes `b op a` field by field. A zero divisor stops the loop and kills
/// the task; fields computed before it are still written.
fn op_arithmetic(ctx: &ExecContext, core: &mut Core) -> TaskUpdate {
    let Some(op) = ctx.insn.opcode.arithmetic_op() else {
        return TaskUpdate::halt();
    };

    let mut results = [0; 2];
    let mut done = 0;
    let mut failed = false;
    for (lhs, rhs) in ctx.b_lens.zip(&ctx.b.insn, &ctx.a_lens, &ctx.a.insn) {
        match op.apply(lhs, rhs) {
            Some(value) => {
                results[done] = value;
                done += 1;
            }
            None => {
                failed = true;
                break;
            }
        }
    }

    write_b_fields(ctx, core, &results[..done]);
    if failed {
        TaskUpdate::halt()
    } else {
        TaskUpdate::continue_at(ctx.next())
    }
}

fn op_jmp(ctx: &ExecContext, _core: &mut Core) -> TaskUpdate {
    TaskUpdate::continue_at(ctx.a.read_pointer)
}

fn branch_if(ctx: &ExecContext, taken: bool) -> TaskUpdate {
    if taken {
        TaskUpdate::continue_at(ctx.a.read_pointer)
    } else {
        TaskUpdate::continue_at(ctx.next())
    }
}

fn op_jmz(ctx: &ExecContext, _core: &mut Core) -> TaskUpdate {
    let values = ctx.b_lens.get(&ctx.b.insn);
    branch_if(ctx, values.iter().all(|&v| v == 0))
}

fn op_jmn(ctx: &ExecContext, _core: &mut Core) -> TaskUpdate {
    let values = ctx.b_lens.get(&ctx.b.insn);
    branch_if(ctx, values.iter().all(|&v| v != 0))
}

fn op_djn(ctx: &ExecContext, core: &mut Core) -> TaskUpdate {
    let mut snapshot = ctx.b.insn;
    let values = ctx.b_lens.update(&mut snapshot, |v| v.wrapping_sub(1));
    write_b_fields(ctx, core, &values);
    branch_if(ctx, values.iter().all(|&v| v != 0))
}

fn skip_if(ctx: &ExecContext, skip: bool) -> TaskUpdate {
    if skip {
        TaskUpdate::continue_at(ctx.skip())
    } else {
        TaskUpdate::continue_at(ctx.next())
    }
}

fn op_cmp(ctx: &ExecContext, _core: &mut Core) -> TaskUpdate {
    let equal = if ctx.insn.modifier == Modifier::I {
        ctx.a.insn == ctx.b.insn
    } else {
        ctx.a_lens
            .zip(&ctx.a.insn, &ctx.b_lens, &ctx.b.insn)
            .all(|(a, b)| a == b)
    };
    skip_if(ctx, equal)
}

fn op_slt(ctx: &ExecContext, _core: &mut Core) -> TaskUpdate {
    let less = ctx
        .a_lens
        .zip(&ctx.a.insn, &ctx.b_lens, &ctx.b.insn)
        .all(|(a, b)| a < b);
    skip_if(ctx, less)
}

fn op_spl(ctx: &ExecContext, _core: &mut Core) -> TaskUpdate {
    TaskUpdate {
        next: Some(ctx.next()),
        spawn: Some(ctx.a.write_pointer),
    }
}

macro_rules! define_dispatch {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $code:literal, $mnemonic:literal => $handler:ident, $rules:ident
        ),* $(,)?
    ) => {
        /// Runs the handler for the decoded instruction's opcode.
        fn dispatch(ctx: &ExecContext, core: &mut Core) -> TaskUpdate {
            match ctx.insn.opcode {
                $( Opcode::$name => $handler(ctx, core), )*
            }
        }
    };
}

for_each_opcode!(define_dispatch);

/// Decodes and executes the instruction at `pc`.
fn execute_at(core: &mut Core, pc: InstructionPointer) -> TaskUpdate {
    let ctx = ExecContext::decode(core, pc);
    dispatch(&ctx, core)
}

// ==================== Loading ====================

/// Uniform draw from `0..=bound`.
fn uniform<R: RngCore + ?Sized>(rng: &mut R, bound: u64) -> u64 {
    let Some(range) = bound.checked_add(1) else {
        return rng.next_u64();
    };
    let limit = u64::MAX - (u64::MAX % range);
    loop {
        let v = rng.next_u64();
        if v < limit {
            return v % range;
        }
    }
}

/// Core offsets of each warrior's first instruction.
fn placements<R: RngCore + ?Sized>(
    options: &VmOptions,
    rng: &mut R,
) -> Result<Vec<usize>, VMError> {
    let n = options.num_warriors;
    let gap = match options.separation {
        Separation::Fixed(gap) => gap,
        Separation::Random => options.minimum_separation,
    };
    let too_small = VMError::CoreTooSmall {
        core_size: options.core_size,
        warriors: n,
        separation: gap,
    };
    let needed = n.checked_mul(gap).ok_or_else(|| too_small.clone())?;
    if needed > options.core_size {
        return Err(too_small);
    }

    match options.separation {
        Separation::Fixed(gap) => Ok((0..n).map(|i| i * gap).collect()),
        Separation::Random => {
            let mut offsets = Vec::with_capacity(n);
            offsets.push(0);
            if n > 1 {
                let slack = ((options.core_size - needed) / (n - 1)) as u64;
                for _ in 1..n {
                    let prev = offsets[offsets.len() - 1];
                    offsets.push(prev + gap + uniform(rng, slack) as usize);
                }
            }
            Ok(offsets)
        }
    }
}

fn check_programs(options: &VmOptions, programs: &[Program]) -> Result<(), VMError> {
    if programs.len() != options.num_warriors {
        return Err(VMError::WarriorCountMismatch {
            expected: options.num_warriors,
            actual: programs.len(),
        });
    }
    let slot = match options.separation {
        Separation::Fixed(gap) => gap,
        Separation::Random => options.minimum_separation,
    };
    for (id, program) in programs.iter().enumerate() {
        if program.len() > options.instruction_limit {
            return Err(VMError::ProgramTooLong {
                id,
                len: program.len(),
                limit: options.instruction_limit,
            });
        }
        // A lone warrior has the whole core.
        if programs.len() > 1 && program.len() > slot {
            return Err(VMError::ProgramOverlaps {
                id,
                len: program.len(),
                separation: slot,
            });
        }
    }
    Ok(())
}

// ==================== VM ====================

/// One match between the loaded warriors.
///
/// `T` receives a [`StepEvent`] for every executed instruction.
pub struct VM<T: TraceSink = NoTrace> {
    options: VmOptions,
    core: Core,
    /// Living warriors in registration order.
    warriors: Vec<Warrior>,
    /// Where each warrior was loaded, indexed by warrior id.
    offsets: Vec<usize>,
    num_cycles: usize,
    trace: T,
}

impl VM<NoTrace> {
    /// Loads `programs` into a fresh core, drawing random placement from the
    /// operating system.
    pub fn new(options: VmOptions, programs: &[Program]) -> Result<Self, VMError> {
        Self::with_rng(options, programs, &mut OsRng)
    }

    /// Loads `programs` into a fresh core, drawing random placement from `rng`.
    ///
    /// Warriors are numbered in the order given. Fails if the options are
    /// invalid, the program count does not match `num_warriors`, a program is
    /// empty or too long, or the warriors do not fit.
    pub fn with_rng<R: RngCore + ?Sized>(
        options: VmOptions,
        programs: &[Program],
        rng: &mut R,
    ) -> Result<Self, VMError> {
        let mut core = Core::new(&options)?;
        check_programs(&options, programs)?;
        let offsets = placements(&options, rng)?;

        let mut warriors = Vec::with_capacity(programs.len());
        for (id, (program, &offset)) in programs.iter().zip(&offsets).enumerate() {
            let base = core.pointer(offset as i64);
            for (i, insn) in program.code().iter().enumerate() {
                base.add(i as i64).set(&mut core, *insn);
            }
            let entry = base.add(program.start_index() as i64);
            match program.metadata().name.as_deref() {
                Some(name) => info!("loading warrior {id} ({name}) at {offset}"),
                None => info!("loading warrior {id} at {offset}"),
            }
            warriors.push(Warrior::new(id, options.max_num_tasks, entry));
        }

        Ok(Self {
            options,
            core,
            warriors,
            offsets,
            num_cycles: 0,
            trace: NoTrace,
        })
    }
}

impl<T: TraceSink> VM<T> {
    /// Replaces the trace sink.
    pub fn with_trace<U: TraceSink>(self, trace: U) -> VM<U> {
        VM {
            options: self.options,
            core: self.core,
            warriors: self.warriors,
            offsets: self.offsets,
            num_cycles: self.num_cycles,
            trace,
        }
    }

    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    /// Living warriors in registration order.
    pub fn warriors(&self) -> &[Warrior] {
        &self.warriors
    }

    /// Load offset of each warrior, indexed by id.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn num_cycles(&self) -> usize {
        self.num_cycles
    }

    pub fn trace(&self) -> &T {
        &self.trace
    }

    pub fn into_trace(self) -> T {
        self.trace
    }

    fn contested(&self) -> bool {
        self.options.num_warriors > 1
    }

    fn is_over(&self) -> bool {
        if self.contested() {
            self.warriors.len() <= 1
        } else {
            self.warriors.is_empty()
        }
    }

    /// Runs cycles until the match is decided or `cycles_before_tie` is hit.
    ///
    /// With several warriors a sole survivor wins. A single-warrior match
    /// always ends in a tie.
    pub fn execute(&mut self) -> MatchResult {
        while self.num_cycles < self.options.cycles_before_tie && !self.is_over() {
            self.execute_cycle();
        }

        let result = match self.warriors.as_slice() {
            [winner] if self.contested() => MatchResult {
                status: MatchStatus::Win,
                winner_id: Some(winner.id()),
                num_cycles: self.num_cycles,
            },
            _ => MatchResult {
                status: MatchStatus::Tie,
                winner_id: None,
                num_cycles: self.num_cycles,
            },
        };
        info!("{result}");
        result
    }

    /// Gives every living warrior one step, then removes dead warriors.
    pub fn execute_cycle(&mut self) {
        for index in 0..self.warriors.len() {
            if let Err(err) = self.step_warrior(index) {
                warn!("cycle {}: {err}", self.num_cycles);
            }
        }

        let cycle = self.num_cycles;
        self.warriors.retain(|warrior| {
            if warrior.is_dead() {
                info!("warrior {} died at cycle {cycle}", warrior.id());
                false
            } else {
                true
            }
        });
        self.num_cycles += 1;
    }

    /// Runs the head task of the living warrior at `index`.
    ///
    /// Dead warriors stay in place until the cycle ends, so this returns
    /// [`VMError::DeadWarrior`] for a warrior that already died this cycle.
    pub fn step_warrior(&mut self, index: usize) -> Result<TaskReport, VMError> {
        let Self {
            core,
            warriors,
            num_cycles,
            trace,
            ..
        } = self;
        let warrior = warriors
            .get_mut(index)
            .ok_or(VMError::UnknownWarrior { index })?;

        let mut instruction = Instruction::empty();
        let report = warrior.execute_task(|pc| {
            instruction = pc.fetch(core);
            execute_at(core, pc)
        })?;

        let event = StepEvent {
            cycle: *num_cycles,
            warrior: warrior.id(),
            task: report.task_id,
            pc: report.pc.address(),
            instruction,
            next: report.update.next.map(|p| p.address()),
            spawn: report.update.spawn.map(|p| p.address()),
            spawn_dropped: report.spawn_dropped,
        };
        if report.spawn_dropped {
            debug!("{event}: task limit reached");
        }
        trace.record(&event);
        Ok(report)
    }

    /// Executes the instruction at `pc` outside any task and returns what the
    /// task would do next.
    pub fn execute_step(&mut self, pc: i64) -> TaskUpdate {
        let pc = self.core.pointer(pc);
        execute_at(&mut self.core, pc)
    }

    /// Overwrites the cell at `address`.
    pub fn poke(&mut self, address: i64, insn: Instruction) {
        self.core.pointer(address).set(&mut self.core, insn);
    }
}
