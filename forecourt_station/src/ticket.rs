use tokio::sync::watch;

use crate::volume::Volume;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketState {
    Pending,
    Fulfilled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("ticket #{sequence} was abandoned before it was fulfilled")]
pub struct TicketAbandoned {
    pub sequence: u64,
}

/// One admitted request, owned by the queue it was admitted to.
///
/// Dropping a ticket without calling [`Ticket::fulfil`] abandons it: every [`TicketHandle`]
/// waiting on it resolves with [`TicketAbandoned`].
#[derive(Debug)]
pub struct Ticket {
    sequence: u64,
    amount: Volume,
    done: watch::Sender<bool>,
}

impl Ticket {
    pub fn new(sequence: u64, amount: Volume) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            sequence,
            amount,
            done,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn amount(&self) -> Volume {
        self.amount
    }

    pub fn handle(&self) -> TicketHandle {
        TicketHandle {
            sequence: self.sequence,
            amount: self.amount,
            done: self.done.subscribe(),
        }
    }

    /// Releases the completion signal. It is set once and never reset.
    pub fn fulfil(self) {
        self.done.send_replace(true);
    }
}

/// An observer of a [`Ticket`]'s completion signal.
#[derive(Debug, Clone)]
pub struct TicketHandle {
    sequence: u64,
    amount: Volume,
    done: watch::Receiver<bool>,
}

impl TicketHandle {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn amount(&self) -> Volume {
        self.amount
    }

    pub fn state(&self) -> TicketState {
        if *self.done.borrow() {
            TicketState::Fulfilled
        } else {
            TicketState::Pending
        }
    }

    /// Waits until the ticket is fulfilled.
    pub async fn fulfilled(&mut self) -> Result<(), TicketAbandoned> {
        match self.done.wait_for(|done| *done).await {
            Ok(_) => Ok(()),
            Err(_) => Err(TicketAbandoned {
                sequence: self.sequence,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    fn litres(value: f64) -> Volume {
        Volume::from_litres(value).unwrap()
    }

    #[tokio::test]
    async fn handle_observes_fulfilment_any_number_of_times() {
        let ticket = Ticket::new(3, litres(1.0));
        let mut first = ticket.handle();
        let mut second = first.clone();
        assert_eq!(first.state(), TicketState::Pending);

        ticket.fulfil();

        assert_eq!(first.fulfilled().await, Ok(()));
        assert_eq!(first.fulfilled().await, Ok(()));
        assert_eq!(second.fulfilled().await, Ok(()));
        assert_eq!(second.state(), TicketState::Fulfilled);
    }

    #[tokio::test]
    async fn waiter_wakes_when_ticket_is_fulfilled_later() {
        let ticket = Ticket::new(0, litres(2.0));
        let mut handle = ticket.handle();
        let waiter = tokio::spawn(async move { handle.fulfilled().await });

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        ticket.fulfil();

        let result = timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn dropped_ticket_is_abandoned() {
        let ticket = Ticket::new(7, litres(1.0));
        let mut handle = ticket.handle();
        drop(ticket);

        assert_eq!(
            handle.fulfilled().await,
            Err(TicketAbandoned { sequence: 7 })
        );
        assert_eq!(handle.state(), TicketState::Pending);
    }
}
