/*!
    in-process fieldbus master, with no hardware behind it.

    Every slave answers as configured with [SimulatedBus::set_response], and every call made to the master is recorded in a journal, which allows to check the order in which the cyclic exchange drives the bus.

    ```ignore
    let bus = SimulatedBus::new().with_slave(info);
    let mut master = Master::new(bus.clone(), MasterConfig::default());
    master.request_master()?;
    let a = master.create_domain("A")?.index();
    bus.set_response(a, 2, 2);
    ```
*/

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use crate::{
    fieldbus::{Fieldbus, MasterHandle, DomainIdx, DomainState, WcState},
    slave::SlaveInfo,
    error::{EthercatError, EthercatResult},
    };


/// call received by a [SimulatedMaster], in the order they were issued
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Call {
    RequestMaster,
    CreateDomain(DomainIdx),
    ReleaseDomain(DomainIdx),
    Activate,
    Receive,
    Send,
    Process(DomainIdx),
    Queue(DomainIdx),
    State(DomainIdx),
    Release,
}

/**
    simulated fieldbus library, holding one master.

    Clones share the same simulated segment, so a test can keep a clone to steer the bus while the master is owned by the cyclic exchange.
*/
#[derive(Clone)]
pub struct SimulatedBus {
    state: Arc<Mutex<SimState>>,
}
/// the master handle given by [SimulatedBus]
pub struct SimulatedMaster {
    state: Arc<Mutex<SimState>>,
}

struct SimState {
    /// whether the master can be requested at all
    available: bool,
    reserved: bool,
    activated: bool,
    link: bool,
    releases: usize,
    slaves: Vec<SlaveInfo>,
    /// indexed by [DomainIdx], entries are never reused
    domains: Vec<SimDomain>,
    journal: Vec<Call>,
}
#[derive(Default)]
struct SimDomain {
    live: bool,
    /// working counter when all slaves of the domain answer
    expected: u16,
    /// number of slaves answering each frame
    responding: u16,
    /// working counter received and not yet processed
    latched: u16,
    state: DomainState,
    data: Vec<u8>,
}

impl Default for SimulatedBus {
    fn default() -> Self {Self::new()}
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self {state: Arc::new(Mutex::new(SimState {
            available: true,
            reserved: false,
            activated: false,
            link: true,
            releases: 0,
            slaves: Vec::new(),
            domains: Vec::new(),
            journal: Vec::new(),
        }))}
    }
    fn state(&self) -> MutexGuard<'_, SimState> {
        lock(&self.state)
    }

    /// append a slave to the segment, its position is overwritten by its place in the segment
    pub fn with_slave(self, mut info: SlaveInfo) -> Self {
        {
            let mut state = self.state();
            info.position = state.slaves.len() as u16;
            state.slaves.push(info);
        }
        self
    }
    /// make [Fieldbus::request_master] fail, as if no master was loaded
    pub fn set_available(&self, available: bool) {
        self.state().available = available;
    }
    /// cut or restore the link, [MasterHandle::receive] and [MasterHandle::send] fail while it is down
    pub fn set_link(&self, up: bool) {
        self.state().link = up;
    }
    /// set how many slaves answer a domain's frames, and how many are expected to
    pub fn set_response(&self, domain: DomainIdx, responding: u16, expected: u16) {
        if let Some(domain) = self.state().domains.get_mut(domain.0) {
            domain.responding = responding;
            domain.expected = expected;
        }
    }
    /// set the process image returned by [MasterHandle::domain_data]
    pub fn set_domain_data(&self, domain: DomainIdx, data: &[u8]) {
        if let Some(domain) = self.state().domains.get_mut(domain.0) {
            domain.data = data.to_vec();
        }
    }

    /// copy of the journal of calls
    pub fn journal(&self) -> Vec<Call> {self.state().journal.clone()}
    pub fn clear_journal(&self) {self.state().journal.clear()}
    /// number of domains allocated and not released
    pub fn live_domains(&self) -> usize {
        self.state().domains.iter().filter(|domain| domain.live).count()
    }
    pub fn is_reserved(&self) -> bool {self.state().reserved}
    pub fn is_activated(&self) -> bool {self.state().activated}
    /// number of times a master has been released
    pub fn releases(&self) -> usize {self.state().releases}
}

impl Fieldbus for SimulatedBus {
    type Master = SimulatedMaster;

    fn request_master(&self, index: u32) -> EthercatResult<SimulatedMaster> {
        let mut state = self.state();
        if index != 0 || ! state.available
            {return Err(EthercatError::Unavailable("no such master"))}
        if state.reserved
            {return Err(EthercatError::Unavailable("master already reserved"))}
        state.reserved = true;
        state.journal.push(Call::RequestMaster);
        Ok(SimulatedMaster {state: self.state.clone()})
    }
}

impl SimulatedMaster {
    fn state(&self) -> MutexGuard<'_, SimState> {
        lock(&self.state)
    }
}

impl SimState {
    fn check_link(&self) -> EthercatResult {
        if ! self.activated {Err(EthercatError::Bus("master not activated"))}
        else if ! self.link {Err(EthercatError::Bus("link down"))}
        else {Ok(())}
    }
    fn domain(&mut self, index: DomainIdx) -> Option<&mut SimDomain> {
        self.domains.get_mut(index.0).filter(|domain| domain.live)
    }
}

impl MasterHandle for SimulatedMaster {
    fn create_domain(&mut self) -> EthercatResult<DomainIdx> {
        let mut state = self.state();
        if state.activated
            {return Err(EthercatError::AllocationFailed("cannot create a domain in an activated master"))}
        let index = DomainIdx(state.domains.len());
        state.domains.push(SimDomain {
            live: true,
            expected: 1,
            .. Default::default()
        });
        state.journal.push(Call::CreateDomain(index));
        Ok(index)
    }
    fn release_domain(&mut self, index: DomainIdx) {
        let mut state = self.state();
        if let Some(domain) = state.domain(index) {
            domain.live = false;
        }
        state.journal.push(Call::ReleaseDomain(index));
    }

    fn activate(&mut self) -> EthercatResult {
        let mut state = self.state();
        if state.activated
            {return Err(EthercatError::Bus("master already activated"))}
        state.activated = true;
        state.journal.push(Call::Activate);
        Ok(())
    }
    fn receive(&mut self) -> EthercatResult {
        let mut state = self.state();
        state.journal.push(Call::Receive);
        state.check_link()?;
        for domain in state.domains.iter_mut().filter(|domain| domain.live) {
            domain.latched = domain.responding;
        }
        Ok(())
    }
    fn send(&mut self) -> EthercatResult {
        let mut state = self.state();
        state.journal.push(Call::Send);
        state.check_link()
    }

    fn domain_process(&mut self, index: DomainIdx) {
        let mut state = self.state();
        state.journal.push(Call::Process(index));
        if let Some(domain) = state.domain(index) {
            domain.state = DomainState {
                working_counter: domain.latched,
                wc_state: WcState::classify(domain.latched, domain.expected),
            };
            domain.latched = 0;
        }
    }
    fn domain_queue(&mut self, index: DomainIdx) {
        self.state().journal.push(Call::Queue(index));
    }
    fn domain_state(&self, index: DomainIdx) -> DomainState {
        let mut state = self.state();
        state.journal.push(Call::State(index));
        state.domain(index).map(|domain| domain.state).unwrap_or_default()
    }
    fn domain_data(&self, index: DomainIdx, buffer: &mut Vec<u8>) {
        buffer.clear();
        if let Some(domain) = self.state().domain(index) {
            buffer.extend_from_slice(&domain.data);
        }
    }

    fn slave_info(&self, position: u16) -> EthercatResult<SlaveInfo> {
        self.state().slaves.get(usize::from(position)).copied()
            .ok_or_else(|| EthercatError::NotFound(format!("slave {}", position)))
    }

    fn release(self) {
        let mut state = self.state();
        state.reserved = false;
        state.activated = false;
        state.releases += 1;
        for domain in state.domains.iter_mut() {
            domain.live = false;
        }
        state.journal.push(Call::Release);
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
