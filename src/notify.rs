/*!
    State notifier: turns the working counter of processed domains into events for a subscriber.

    The subscriber side is a bounded [tokio::sync::mpsc] channel. Publishing never waits: if the subscriber is too slow and the channel is full, the event is dropped and counted, so the cyclic exchange is never held back by its consumer.

    ```text
    Cyclic ── evaluate(domain) ──► Decision ── deliver ──► Subscriber ═══► mpsc::Receiver<Event>
    ```
*/

use std::{
    collections::HashMap,
    sync::Arc,
    };
use tokio::sync::mpsc::{self, error::TrySendError};
use crate::{
    config::Trigger,
    domain::Domain,
    error::EthercatError,
    fieldbus::{MasterHandle, DomainIdx, WcState},
    };


/// message sent to the subscriber of a cyclic exchange
#[derive(Clone, Debug)]
pub enum Event {
    /// all registered process data of a domain were exchanged
    DomainComplete {
        domain: Arc<str>,
        /// number of the cycle, starting from 1
        cycle: u64,
        working_counter: u16,
        /// process image of the domain, empty unless [crate::CycleConfig::include_data] is set
        data: Vec<u8>,
    },
    /// the bus failed during a cycle, the rest of this cycle was skipped
    BusFailure {
        cycle: u64,
        error: EthercatError,
    },
    /// the cyclic exchange stopped after this number of cycles
    Stopped {
        cycles: u64,
    },
}

/// destination of the events of a cyclic exchange
#[derive(Clone, Debug)]
pub struct Subscriber {
    sender: mpsc::Sender<Event>,
}
impl Subscriber {
    /// create a subscriber and the receiving end of its events. The minimum capacity is 1.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self {sender}, receiver)
    }
    /// true when the receiving end has been dropped
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
impl From<mpsc::Sender<Event>> for Subscriber {
    fn from(sender: mpsc::Sender<Event>) -> Self {Self {sender}}
}


/// outcome of the evaluation of one domain
#[derive(Clone, Debug)]
pub enum Decision {
    Silent,
    Notify(Event),
}
impl Decision {
    pub fn is_notify(&self) -> bool {matches!(self, Self::Notify(_))}
}


/**
    evaluates domains after processing, and delivers the resulting events.

    Only a complete working counter is notified, zero and incomplete states are silently dropped. With [Trigger::Edge] a domain is notified once when it becomes complete, and again only after having been incomplete in between.
*/
#[derive(Debug)]
pub struct Notifier {
    subscriber: Option<Subscriber>,
    trigger: Trigger,
    include_data: bool,
    /// state of each domain at the previous cycle
    previous: HashMap<DomainIdx, WcState>,
    delivered: u64,
    dropped: u64,
    /// set while events are being dropped, to warn once per congestion
    congested: bool,
    closed: bool,
}

impl Notifier {
    pub fn new(subscriber: Option<Subscriber>, trigger: Trigger, include_data: bool) -> Self {
        Self {
            subscriber,
            trigger,
            include_data,
            previous: HashMap::new(),
            delivered: 0,
            dropped: 0,
            congested: false,
            closed: false,
        }
    }

    /// read the state of a freshly processed domain and decide whether it is to be notified
    pub fn evaluate<M: MasterHandle>(&mut self, master: &M, domain: &Domain, cycle: u64) -> Decision {
        let state = master.domain_state(domain.index());
        let previous = self.previous.insert(domain.index(), state.wc_state).unwrap_or_default();

        let notify = state.wc_state == WcState::Complete && match self.trigger {
            Trigger::Level => true,
            Trigger::Edge => previous != WcState::Complete,
        };
        if ! notify {return Decision::Silent}

        let mut data = Vec::new();
        if self.include_data {
            master.domain_data(domain.index(), &mut data);
        }
        Decision::Notify(Event::DomainComplete {
            domain: domain.shared_name().clone(),
            cycle,
            working_counter: state.working_counter,
            data,
        })
    }

    /// hand the decision over to the subscriber, returns true if an event was delivered
    pub fn deliver(&mut self, decision: Decision) -> bool {
        match decision {
            Decision::Silent => false,
            Decision::Notify(event) => self.publish(event),
        }
    }

    /// send an event to the subscriber without waiting, returns true if it was delivered
    pub fn publish(&mut self, event: Event) -> bool {
        let Some(subscriber) = &self.subscriber
            else {return false};
        match subscriber.sender.try_send(event) {
            Ok(()) => {
                self.delivered += 1;
                self.congested = false;
                true
            },
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                if ! self.congested {
                    log::warn!("subscriber is not keeping up, dropping notifications");
                    self.congested = true;
                }
                false
            },
            Err(TrySendError::Closed(_)) => {
                if ! self.closed {
                    log::info!("subscriber closed, notifications are now discarded");
                    self.closed = true;
                }
                false
            },
        }
    }

    /// number of events delivered so far
    pub fn delivered(&self) -> u64 {self.delivered}
    /// number of events lost because the subscriber channel was full
    pub fn dropped(&self) -> u64 {self.dropped}
}
