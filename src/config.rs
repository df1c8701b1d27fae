//! settings of the master context and of the cyclic exchange

use core::{
    num::NonZeroU32,
    time::Duration,
    };


/// settings of a [crate::Master]
#[derive(Clone, Debug)]
pub struct MasterConfig {
    /// index of the master to request from the fieldbus library
    pub index: u32,
    /// maximum number of domains, `None` for no limit
    pub max_domains: Option<usize>,
}
impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            index: 0,
            max_domains: None,
        }
    }
}


/**
    shape of one cycle of the exchange.

    In both modes the master receives before any domain is processed, and each domain is queued right after being processed and evaluated.
*/
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CycleMode {
    /// receive, process and queue every domain, then send. This is the continuous realtime task.
    FullCycle,
    /**
        domains are queued individually but transmitted together, with one master-wide send every `send_every` cycles.

        the send always comes after the last domain of its cycle was queued
    */
    FireAndForget {send_every: NonZeroU32},
}
impl Default for CycleMode {
    fn default() -> Self {Self::FullCycle}
}

/// reaction of the cyclic exchange to a failed receive or send
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum FailurePolicy {
    /// publish a [crate::Event::BusFailure], give up the current cycle and continue with the next one
    #[default]
    Report,
    /// publish a [crate::Event::BusFailure], then stop the exchange and return the error
    Terminate,
}

/// when a domain with a complete working counter is notified
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum Trigger {
    /// only on the cycle the domain becomes complete
    #[default]
    Edge,
    /// on every cycle the domain is complete
    Level,
}


/// settings of a [crate::Cyclic] exchange
#[derive(Clone, Debug)]
pub struct CycleConfig {
    /// cycle period, if `None` cycles follow each other without pause
    pub period: Option<Duration>,
    pub mode: CycleMode,
    pub trigger: Trigger,
    pub on_bus_failure: FailurePolicy,
    /// copy the domain's process image into its notifications
    pub include_data: bool,
    /// request realtime scheduling for the thread spawned by [crate::Cyclic::spawn]
    pub realtime: bool,
    /// name of the thread spawned by [crate::Cyclic::spawn]
    pub thread_name: String,
}
impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            period: Some(Duration::from_millis(1)),
            mode: CycleMode::FullCycle,
            trigger: Trigger::Edge,
            on_bus_failure: FailurePolicy::Report,
            include_data: false,
            realtime: false,
            thread_name: String::from("ethercat-cyclic"),
        }
    }
}
