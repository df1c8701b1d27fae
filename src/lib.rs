/*!
    Cyclic process-data exchange on top of an EtherCAT master.

    - [Master] owns a fieldbus master and the registry of its named domains
    - [Cyclic] drives the `receive → process → queue → send` cycle over them
    - [Notifier] reports every domain whose working counter is complete to a [Subscriber]

    The bus itself is driven by a [Fieldbus] implementation, [sim::SimulatedBus] being the in-process one.
*/

pub mod error;
pub mod fieldbus;
pub mod slave;
pub mod domain;
pub mod master;
pub mod notify;
pub mod cyclic;
pub mod config;
pub mod sim;

pub use crate::error::{EthercatError, EthercatResult};
pub use crate::fieldbus::{Fieldbus, MasterHandle, DomainIdx, DomainState, WcState};
pub use crate::slave::{SlaveInfo, SlaveDiscovery};
pub use crate::domain::{Domain, DomainRegistry};
pub use crate::master::Master;
pub use crate::notify::{Event, Subscriber, Notifier, Decision};
pub use crate::cyclic::{Cyclic, CyclicHandle, CycleReport};
pub use crate::config::*;
