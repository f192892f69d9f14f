use std::sync::Arc;

use parking_lot::Mutex;
use strum::IntoEnumIterator;
use tracing::Instrument;

use crate::{
    FuelType, StableMap,
    config::StationConfig,
    error::{StationError, StationResult},
    metrics::{MetricsSnapshot, StationMetrics},
    price::{PriceTable, UnitPrice},
    queue::{QueueStatus, ResourceQueue, UnitSlot},
    ticket::TicketHandle,
    unit::{DispensingUnit, SimulatedPump},
    volume::Volume,
};

#[derive(Debug, Default)]
struct LaneState {
    queues: Vec<ResourceQueue>,
    next_registration: u64,
}

/// All queues of one fuel type, behind that type's lock.
#[derive(Debug)]
struct Lane {
    fuel: FuelType,
    state: Mutex<LaneState>,
}

/// A ticket that was admitted to one of a lane's queues.
#[derive(Debug)]
struct Admission {
    queue_index: usize,
    slot: Arc<UnitSlot>,
    ticket: TicketHandle,
    predecessor: Option<TicketHandle>,
}

impl Lane {
    fn new(fuel: FuelType) -> Self {
        Self {
            fuel,
            state: Mutex::new(LaneState::default()),
        }
    }

    fn register(&self, unit: Arc<dyn DispensingUnit>) -> StationResult<bool> {
        let mut state = self.state.lock();
        let id = unit.id();
        if state.queues.iter().any(|queue| queue.unit().id() == id) {
            return Ok(false);
        }

        let registration = state.next_registration;
        state.next_registration = registration
            .checked_add(1)
            .ok_or(StationError::ArithmeticOverflow)?;
        state.queues.push(ResourceQueue::new(unit, registration));
        Ok(true)
    }

    /// Picks the queue that can serve `amount` soonest and reserves the volume there.
    fn admit(&self, amount: Volume) -> StationResult<Option<Admission>> {
        let mut state = self.state.lock();

        let selected = state
            .queues
            .iter()
            .enumerate()
            .filter(|(_, queue)| queue.estimated_amount() >= amount)
            .min_by_key(|(_, queue)| (queue.estimated_wait(), queue.registration()))
            .map(|(index, _)| index);
        let Some(queue_index) = selected else {
            return Ok(None);
        };

        let queue = state
            .queues
            .get_mut(queue_index)
            .ok_or(StationError::InconsistentState("selected queue vanished"))?;
        let admitted = queue.enqueue(amount)?;
        Ok(Some(Admission {
            queue_index,
            slot: Arc::clone(queue.slot()),
            ticket: admitted.ticket,
            predecessor: admitted.ahead.into_iter().last(),
        }))
    }

    fn complete(&self, queue_index: usize, sequence: u64) -> StationResult<()> {
        let mut state = self.state.lock();
        let queue = state
            .queues
            .get_mut(queue_index)
            .ok_or(StationError::InconsistentState("completed ticket has no queue"))?;
        queue.dequeue_head(sequence)
    }

    fn abandon(&self, queue_index: usize, sequence: u64) -> StationResult<bool> {
        let mut state = self.state.lock();
        let queue = state
            .queues
            .get_mut(queue_index)
            .ok_or(StationError::InconsistentState("abandoned ticket has no queue"))?;
        queue.abandon(sequence)
    }

    fn units(&self) -> Vec<Arc<dyn DispensingUnit>> {
        self.state
            .lock()
            .queues
            .iter()
            .map(|queue| Arc::clone(queue.unit()))
            .collect()
    }

    fn status(&self) -> Vec<QueueStatus> {
        self.state
            .lock()
            .queues
            .iter()
            .map(ResourceQueue::status)
            .collect()
    }
}

/// Removes an admitted ticket from its queue if the fulfilment never reaches the dequeue.
///
/// Successors waiting on the ticket then observe it as abandoned.
struct TurnGuard {
    lane: Arc<Lane>,
    queue_index: usize,
    sequence: u64,
    armed: bool,
}

impl TurnGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.lane.abandon(self.queue_index, self.sequence) {
            Ok(true) => tracing::warn!(
                fuel = %self.lane.fuel,
                sequence = self.sequence,
                "admitted ticket abandoned before fulfilment"
            ),
            Ok(false) => {}
            Err(error) => tracing::error!(
                ?error,
                fuel = %self.lane.fuel,
                sequence = self.sequence,
                "failed to abandon ticket"
            ),
        }
    }
}

#[derive(Debug)]
struct StationInner {
    prices: PriceTable,
    lanes: StableMap<FuelType, Arc<Lane>>,
    metrics: StationMetrics,
}

impl StationInner {
    fn lane(&self, fuel: FuelType) -> StationResult<&Arc<Lane>> {
        self.lanes
            .get(&fuel)
            .ok_or(StationError::InconsistentState("fuel type has no lane"))
    }

    /// Everything after admission: wait for the turn, withdraw, book the sale, dequeue.
    async fn fulfil(
        self: Arc<Self>,
        lane: Arc<Lane>,
        admission: Admission,
        price: UnitPrice,
    ) -> StationResult<()> {
        let Admission {
            queue_index,
            slot,
            ticket,
            predecessor,
        } = admission;
        let unit = slot.unit.id();
        let amount = ticket.amount();
        let sequence = ticket.sequence();
        let turn = TurnGuard {
            lane: Arc::clone(&lane),
            queue_index,
            sequence,
            armed: true,
        };

        if let Some(mut predecessor) = predecessor
            && let Err(abandoned) = predecessor.fulfilled().await
        {
            tracing::warn!(%unit, ?abandoned, "predecessor never completed");
            return Err(StationError::Interrupted { unit });
        }

        let withdrawing = slot.withdraw_lock.lock().await;
        let withdrawn = slot.unit.withdraw(amount).await;
        let revenue = withdrawn
            .is_ok()
            .then(|| self.metrics.record_sale(price, amount));

        if let Err(error) = lane.complete(queue_index, sequence) {
            tracing::error!(?error, %unit, sequence, "failed to dequeue fulfilled ticket");
            return Err(error);
        }
        turn.disarm();
        drop(withdrawing);

        match withdrawn {
            Ok(()) => {
                tracing::debug!(%unit, %amount, %price, ?revenue, "sale completed");
                Ok(())
            }
            Err(report) => {
                tracing::warn!(%unit, %amount, error = %report, "withdrawal failed");
                Err(StationError::Withdrawal { unit, report })
            }
        }
    }
}

/// A filling station scheduling requests over its dispensing units.
///
/// Scheduling decisions for one fuel type are serialized by that type's lock; withdrawals are
/// serialized per unit only, in the order their tickets were admitted.
#[derive(Debug)]
pub struct Station {
    inner: Arc<StationInner>,
}

impl Default for Station {
    fn default() -> Self {
        Self::new()
    }
}

impl Station {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StationInner {
                prices: PriceTable::new(),
                lanes: FuelType::iter()
                    .map(|fuel| (fuel, Arc::new(Lane::new(fuel))))
                    .collect(),
                metrics: StationMetrics::new(),
            }),
        }
    }

    /// Builds a station with one [`SimulatedPump`] per configured pump, registered in file order.
    pub fn from_config(config: &StationConfig) -> StationResult<Self> {
        config.validate()?;
        let station = Self::new();
        for (fuel, price) in &config.prices {
            station.inner.prices.set(*fuel, UnitPrice::new(*price)?);
        }
        for pump in &config.pumps {
            let capacity = Volume::from_litres(pump.capacity)?;
            let unit = SimulatedPump::with_rate(pump.fuel, capacity, config.litres_per_second);
            station.inner.lane(pump.fuel)?.register(Arc::new(unit))?;
        }
        tracing::debug!(
            pumps = config.pumps.len(),
            prices = config.prices.len(),
            "station built from configuration"
        );
        Ok(station)
    }

    async fn request_inner(
        &self,
        fuel: FuelType,
        amount: Volume,
        max_price: UnitPrice,
    ) -> StationResult<UnitPrice> {
        let price = self.inner.prices.get(fuel).inspect_err(|_| {
            tracing::debug!("rejected: no price set");
        })?;

        if price > max_price {
            self.inner.metrics.record_too_expensive();
            tracing::debug!(%price, %max_price, "rejected: too expensive");
            return Err(StationError::TooExpensive {
                fuel,
                price,
                max_price,
            });
        }

        let lane = Arc::clone(self.inner.lane(fuel)?);
        let Some(admission) = lane.admit(amount)? else {
            self.inner.metrics.record_no_capacity();
            tracing::debug!("rejected: no unit has enough capacity");
            return Err(StationError::NoCapacity {
                fuel,
                requested: amount,
            });
        };

        let unit = admission.slot.unit.id();
        tracing::trace!(
            %unit,
            sequence = admission.ticket.sequence(),
            waits = admission.predecessor.is_some(),
            "admitted"
        );

        let fulfilment = tokio::spawn(
            Arc::clone(&self.inner)
                .fulfil(lane, admission, price)
                .in_current_span(),
        );
        match fulfilment.await {
            Ok(result) => result.map(|()| price),
            Err(error) => {
                tracing::error!(?error, %unit, "fulfilment task ended abnormally");
                Err(StationError::Interrupted { unit })
            }
        }
    }
}

#[async_trait::async_trait]
impl crate::FuelStation for Station {
    fn add_unit(&self, unit: Arc<dyn DispensingUnit>) -> bool {
        let fuel = unit.fuel_type();
        let id = unit.id();
        let registered = self
            .inner
            .lane(fuel)
            .and_then(|lane| lane.register(unit));
        match registered {
            Ok(added) => {
                tracing::debug!(%fuel, unit = %id, added, "unit registration");
                added
            }
            Err(error) => {
                tracing::error!(?error, %fuel, unit = %id, "failed to register unit");
                false
            }
        }
    }

    fn units(&self) -> Vec<Arc<dyn DispensingUnit>> {
        self.inner
            .lanes
            .values()
            .flat_map(|lane| lane.units())
            .collect()
    }

    fn set_price(&self, fuel: FuelType, price: UnitPrice) {
        let previous = self.inner.prices.set(fuel, price);
        tracing::debug!(%fuel, %price, ?previous, "price set");
    }

    fn price(&self, fuel: FuelType) -> StationResult<UnitPrice> {
        self.inner.prices.get(fuel)
    }

    async fn request(
        &self,
        fuel: FuelType,
        amount: Volume,
        max_price: UnitPrice,
    ) -> StationResult<UnitPrice> {
        let span = tracing::trace_span!("fuel request", %fuel, %amount);
        self.request_inner(fuel, amount, max_price)
            .instrument(span)
            .await
    }

    fn total_revenue(&self) -> f64 {
        self.inner.metrics.revenue()
    }

    fn sales_count(&self) -> u64 {
        self.inner.metrics.sales()
    }

    fn no_capacity_cancellations(&self) -> u64 {
        self.inner.metrics.no_capacity_cancellations()
    }

    fn too_expensive_cancellations(&self) -> u64 {
        self.inner.metrics.too_expensive_cancellations()
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    fn queue_status(&self, fuel: FuelType) -> Vec<QueueStatus> {
        self.inner
            .lane(fuel)
            .map(|lane| lane.status())
            .unwrap_or_default()
    }
}
