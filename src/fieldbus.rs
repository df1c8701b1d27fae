/*!
    This module provide the traits [Fieldbus] and [MasterHandle], the boundary between the cyclic exchange and the library actually driving the EtherCAT segment.

    The implementor is responsible of everything happening on the wire: frame assembly, working counter computation, slaves enumeration. This crate only decides *when* each operation is issued.

    | operation | effect on the bus |
    |-----------|-------------------|
    | [MasterHandle::receive] | latch the frames returned by the segment into the master |
    | [MasterHandle::domain_process] | extract a domain's inputs and working counter from the latched frames |
    | [MasterHandle::domain_queue] | stage a domain's outputs for the next frame |
    | [MasterHandle::send] | emit all staged frames |

    [crate::sim::SimulatedBus] implements both traits in-process.
*/

use core::fmt;
use crate::{
    error::EthercatResult,
    slave::SlaveInfo,
    };


/**
    entry point of a fieldbus master library

    It only hands out master handles, everything else is done through the handle.
*/
pub trait Fieldbus {
    type Master: MasterHandle;

    /**
        reserve the master of the given index for exclusive use.

        Fails with [crate::EthercatError::Unavailable] if the master does not exist or is already reserved.
    */
    fn request_master(&self, index: u32) -> EthercatResult<Self::Master>;
}

/**
    exclusive ownership of one physical or simulated EtherCAT master

    All domain handles returned by [Self::create_domain] belong to this master and become invalid once it is released.
*/
pub trait MasterHandle: Send {
    /// allocate a new process-data domain in this master
    fn create_domain(&mut self) -> EthercatResult<DomainIdx>;
    /**
        give back a domain that was never used.

        Most fieldbus masters cannot deallocate a domain once created, this is only used to roll back a failed registration and defaults to doing nothing.
    */
    fn release_domain(&mut self, _domain: DomainIdx) {}

    /// finish configuration and start exchanging process data
    fn activate(&mut self) -> EthercatResult;
    /// receive the frames pending on the bus
    fn receive(&mut self) -> EthercatResult;
    /// send the frames queued since the last send
    fn send(&mut self) -> EthercatResult;

    /// evaluate the received data of a domain, updating its working counter
    fn domain_process(&mut self, domain: DomainIdx);
    /// queue a domain's data for the next send
    fn domain_queue(&mut self, domain: DomainIdx);
    /// working counter state computed by the last [Self::domain_process]
    fn domain_state(&self, domain: DomainIdx) -> DomainState;
    /// copy the domain's process image into `buffer`, replacing its content. The default leaves it empty.
    fn domain_data(&self, _domain: DomainIdx, buffer: &mut Vec<u8>) {
        buffer.clear();
    }

    /// identification of the slave at the given ring position
    fn slave_info(&self, position: u16) -> EthercatResult<SlaveInfo>;

    /// give the master back to the library, invalidating every domain handle
    fn release(self) where Self: Sized;
}


/// opaque domain handle given by the fieldbus master
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct DomainIdx(pub usize);

impl From<usize> for DomainIdx {
    fn from(index: usize) -> Self {Self(index)}
}
impl fmt::Display for DomainIdx {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/**
    classification of a domain's working counter

    every slave taking part in a domain's frame increments the working counter, comparing it to the expected value tells how much of the process data was actually exchanged
*/
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Default)]
pub enum WcState {
    /// no registered process data were exchanged
    #[default]
    Zero,
    /// some of the registered process data were exchanged
    Incomplete,
    /// all registered process data were exchanged
    Complete,
}
impl WcState {
    pub fn classify(working_counter: u16, expected: u16) -> Self {
        if working_counter == 0         {Self::Zero}
        else if working_counter < expected  {Self::Incomplete}
        else                            {Self::Complete}
    }
}

/// state of a domain after processing
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct DomainState {
    /// value of the last working counter
    pub working_counter: u16,
    pub wc_state: WcState,
}
