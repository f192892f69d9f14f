use std::{collections::VecDeque, sync::Arc};

use serde::Serialize;

use crate::{
    UnitId,
    error::{StationError, StationResult},
    ticket::{Ticket, TicketHandle},
    unit::DispensingUnit,
    volume::Volume,
};

/// A registered unit together with the lock that makes its withdrawals exclusive.
#[derive(Debug)]
pub(crate) struct UnitSlot {
    pub(crate) unit: Arc<dyn DispensingUnit>,
    pub(crate) withdraw_lock: tokio::sync::Mutex<()>,
}

/// What [`ResourceQueue::enqueue`] hands back to the scheduler.
#[derive(Debug)]
pub struct Admitted {
    /// The newly admitted ticket.
    pub ticket: TicketHandle,
    /// Tickets that were pending before this one, oldest first.
    pub ahead: Vec<TicketHandle>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatus {
    pub unit: UnitId,
    pub registration: u64,
    pub real_amount: Volume,
    pub estimated_amount: Volume,
    pub estimated_wait: Volume,
    pub pending: usize,
}

/// FIFO bookkeeping and capacity estimation for one dispensing unit.
///
/// Every method must be called with the owning lane's type lock held.
#[derive(Debug)]
pub struct ResourceQueue {
    slot: Arc<UnitSlot>,
    registration: u64,
    real_amount: Volume,
    pending: VecDeque<Ticket>,
    next_sequence: u64,
    estimated_amount: Volume,
    estimated_wait: Volume,
}

impl ResourceQueue {
    pub fn new(unit: Arc<dyn DispensingUnit>, registration: u64) -> Self {
        let real_amount = unit.remaining();
        Self {
            slot: Arc::new(UnitSlot {
                unit,
                withdraw_lock: tokio::sync::Mutex::new(()),
            }),
            registration,
            real_amount,
            pending: VecDeque::new(),
            next_sequence: 0,
            estimated_amount: real_amount,
            estimated_wait: Volume::ZERO,
        }
    }

    pub fn unit(&self) -> &Arc<dyn DispensingUnit> {
        &self.slot.unit
    }

    pub(crate) fn slot(&self) -> &Arc<UnitSlot> {
        &self.slot
    }

    pub fn registration(&self) -> u64 {
        self.registration
    }

    pub fn real_amount(&self) -> Volume {
        self.real_amount
    }

    /// Remaining capacity once every pending ticket is served.
    pub fn estimated_amount(&self) -> Volume {
        self.estimated_amount
    }

    /// Total queued volume. Only meaningful for ranking queues against each other.
    pub fn estimated_wait(&self) -> Volume {
        self.estimated_wait
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            unit: self.slot.unit.id(),
            registration: self.registration,
            real_amount: self.real_amount,
            estimated_amount: self.estimated_amount,
            estimated_wait: self.estimated_wait,
            pending: self.pending.len(),
        }
    }

    /// Appends a ticket for `amount` and reserves its volume.
    pub fn enqueue(&mut self, amount: Volume) -> StationResult<Admitted> {
        if amount > self.estimated_amount {
            return Err(StationError::InconsistentState(
                "enqueued amount exceeds the estimated amount",
            ));
        }
        let sequence = self.next_sequence;
        let next_sequence = sequence
            .checked_add(1)
            .ok_or(StationError::ArithmeticOverflow)?;

        let ahead = self.pending.iter().map(Ticket::handle).collect();
        let ticket = Ticket::new(sequence, amount);
        let handle = ticket.handle();

        self.pending.push_back(ticket);
        if let Err(error) = self.reestimate() {
            self.pending.pop_back();
            return Err(error);
        }
        self.next_sequence = next_sequence;

        Ok(Admitted {
            ticket: handle,
            ahead,
        })
    }

    /// Removes the head ticket after its withdrawal and signals it.
    ///
    /// `sequence` must be the head ticket's; anything else means withdrawals ran out of order.
    pub fn dequeue_head(&mut self, sequence: u64) -> StationResult<()> {
        if self.pending.front().map(Ticket::sequence) != Some(sequence) {
            return Err(StationError::InconsistentState(
                "the completed ticket is not at the head of its queue",
            ));
        }
        let Some(ticket) = self.pending.pop_front() else {
            return Err(StationError::InconsistentState(
                "dequeue requested on an empty queue",
            ));
        };
        self.real_amount = self.slot.unit.remaining();
        let estimated = self.reestimate();
        ticket.fulfil();
        estimated
    }

    /// Drops the ticket without signalling it, so whoever waits on it sees it abandoned.
    ///
    /// Returns `false` if no pending ticket has this sequence.
    pub fn abandon(&mut self, sequence: u64) -> StationResult<bool> {
        let Some(index) = self
            .pending
            .iter()
            .position(|ticket| ticket.sequence() == sequence)
        else {
            return Ok(false);
        };

        drop(self.pending.remove(index));
        self.real_amount = self.slot.unit.remaining();
        self.reestimate()?;
        Ok(true)
    }

    fn reestimate(&mut self) -> StationResult<()> {
        let queued: Option<Volume> = self.pending.iter().map(Ticket::amount).sum();
        let queued = queued.ok_or(StationError::ArithmeticOverflow)?;

        self.estimated_amount = match self.real_amount.checked_sub(queued) {
            Some(estimated) => estimated,
            None => {
                tracing::warn!(
                    unit = %self.slot.unit.id(),
                    real_amount = %self.real_amount,
                    queued = %queued,
                    "unit holds less than its queued volume"
                );
                Volume::ZERO
            }
        };
        self.estimated_wait = queued;
        Ok(())
    }
}
