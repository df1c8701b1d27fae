use core::fmt;
use crate::{
    fieldbus::MasterHandle,
    error::EthercatError,
    };


/**
    identification of a slave as reported by the fieldbus master

    There is deliberately no `Default`: a slave that could not be read is an error, never a zeroed record.
*/
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SlaveInfo {
    /// topological position in the segment
    pub position: u16,
    pub vendor_id: u32,
    pub product_code: u32,
    pub revision_number: u32,
    pub serial_number: u32,
    /// configured station alias, 0 if none
    pub alias: u16,
    /// (mA) current consumed (negative) or supplied (positive) on the E-bus
    pub current_on_ebus: i16,
}

impl fmt::Display for SlaveInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Slave{{position: {}, vendor: {:#010x}, product: {:#010x}, revision: {:#010x}, serial: {}, alias: {}, ebus: {}mA}}",
            self.position,
            self.vendor_id,
            self.product_code,
            self.revision_number,
            self.serial_number,
            self.alias,
            self.current_on_ebus,
            )
    }
}


/// iterator of the slaves present in the segment, in topological order
pub struct SlaveDiscovery<'a, M> {
    master: &'a M,
    /// next position to read, past `u16::MAX` once exhausted
    next: u32,
}
impl<'a, M: MasterHandle> SlaveDiscovery<'a, M> {
    pub(crate) fn new(master: &'a M) -> Self {
        Self {
            master,
            next: 0,
        }
    }
}
impl<M: MasterHandle> Iterator for SlaveDiscovery<'_, M> {
    type Item = SlaveInfo;

    fn next(&mut self) -> Option<SlaveInfo> {
        let position = u16::try_from(self.next).ok()?;
        match self.master.slave_info(position) {
            Ok(info) => {
                self.next += 1;
                Some(info)
            },
            Err(EthercatError::NotFound(_)) => {
                self.next = u32::from(u16::MAX) + 1;
                None
            },
            Err(error) => {
                log::warn!("slave discovery stopped at position {}: {}", position, error);
                self.next = u32::from(u16::MAX) + 1;
                None
            },
        }
    }
}
