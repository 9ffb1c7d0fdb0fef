use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::vm::core::InstructionPointer;
use std::collections::VecDeque;

/// One thread of execution: just a saved instruction pointer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Task {
    pub id: usize,
    pub pointer: InstructionPointer,
}

/// What a task asks the scheduler to do after one instruction.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TaskUpdate {
    /// Where the task continues; `None` kills it.
    pub next: Option<InstructionPointer>,
    /// Start of a new task (`SPL`).
    pub spawn: Option<InstructionPointer>,
}

impl TaskUpdate {
    /// The task does not continue.
    pub const fn halt() -> Self {
        Self {
            next: None,
            spawn: None,
        }
    }

    pub const fn continue_at(next: InstructionPointer) -> Self {
        Self {
            next: Some(next),
            spawn: None,
        }
    }
}

/// Outcome of running a warrior's head task once.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TaskReport {
    pub task_id: usize,
    /// Address the task executed at.
    pub pc: InstructionPointer,
    pub update: TaskUpdate,
    /// A spawn was requested but the queue was full.
    pub spawn_dropped: bool,
}

/// A loaded program competing in a match, owning a FIFO of tasks.
///
/// The warrior is dead once its queue is empty. The queue never grows past
/// `max_num_tasks`.
#[derive(Clone, Debug)]
pub struct Warrior {
    id: usize,
    tasks: VecDeque<Task>,
    next_task_id: usize,
    max_num_tasks: usize,
}

impl Warrior {
    pub fn new(id: usize, max_num_tasks: usize, entry_point: InstructionPointer) -> Self {
        let mut warrior = Self {
            id,
            tasks: VecDeque::new(),
            next_task_id: 0,
            max_num_tasks,
        };
        warrior.create_task(entry_point);
        warrior
    }

    fn create_task(&mut self, pointer: InstructionPointer) {
        let task = Task {
            id: self.next_task_id,
            pointer,
        };
        self.next_task_id += 1;
        self.tasks.push_back(task);
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn num_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Pointer of the task that runs next, if any.
    pub fn next_pointer(&self) -> Option<InstructionPointer> {
        self.tasks.front().map(|task| task.pointer)
    }

    pub fn is_dead(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Pops the head task, runs `f` on its pointer and queues the results.
    ///
    /// A continuing task goes back to the tail before any spawned task. A
    /// spawn that would exceed `max_num_tasks` is dropped.
    pub fn execute_task<F>(&mut self, f: F) -> Result<TaskReport, VMError>
    where
        F: FnOnce(InstructionPointer) -> TaskUpdate,
    {
        let mut task = self
            .tasks
            .pop_front()
            .ok_or(VMError::DeadWarrior { id: self.id })?;
        let pc = task.pointer;

        let update = f(pc);
        if let Some(next) = update.next {
            task.pointer = next;
            self.tasks.push_back(task);
        }

        let mut spawn_dropped = false;
        if let Some(spawn) = update.spawn {
            if self.tasks.len() < self.max_num_tasks {
                self.create_task(spawn);
            } else {
                spawn_dropped = true;
            }
        }

        Ok(TaskReport {
            task_id: task.id,
            pc,
            update,
            spawn_dropped,
        })
    }
}
