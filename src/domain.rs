/*!
    registry of the named process-data domains of a master.

    A domain groups the process data exchanged together in one frame segment each cycle. The registry only does bookkeeping: allocation is asked to the [MasterHandle], and the registry keeps the `(name, handle)` pairs in creation order.

    Mutation needs `&mut` access to the registry, and iteration borrows it, so a cycle always sees the registry as it was when the cycle started.
*/

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    };
use crate::{
    fieldbus::{MasterHandle, DomainIdx},
    error::{EthercatError, EthercatResult},
    };


/// one registered domain
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Domain {
    name: Arc<str>,
    index: DomainIdx,
}
impl Domain {
    pub fn name(&self) -> &str {&self.name}
    /// shared name, cheap to clone into notifications
    pub fn shared_name(&self) -> &Arc<str> {&self.name}
    pub fn index(&self) -> DomainIdx {self.index}
}


/**
    ordered mapping from domain names to fieldbus domain handles

    - names are unique
    - the handle of a removed domain is never accepted again
    - a failed creation leaves neither a registry entry nor an allocated fieldbus domain
*/
#[derive(Debug, Default)]
pub struct DomainRegistry {
    /// domains in creation order
    entries: Vec<Domain>,
    /// position of each name in `entries`
    positions: HashMap<Arc<str>, usize>,
    /// handles of removed domains
    retired: HashSet<DomainIdx>,
    /// maximum number of domains, unlimited if `None`
    limit: Option<usize>,
}

impl DomainRegistry {
    pub fn new() -> Self {Self::default()}
    /// registry refusing to hold more than `limit` domains
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            .. Self::default()
        }
    }

    /**
        allocate a new domain in the given master and register it under `name`

        if the master allocates a new domain but the registry cannot store it, the domain is given back to the master before returning the error.
        A handle the registry already knows, registered or retired, is refused and left untouched in the master since it is not ours to give back.
    */
    pub fn create<M: MasterHandle>(&mut self, master: &mut M, name: &str) -> EthercatResult<&Domain> {
        if name.is_empty()
            {return Err(EthercatError::InvalidArgument("domain name must not be empty"))}
        if self.positions.contains_key(name)
            {return Err(EthercatError::DuplicateName(name.to_owned()))}

        let index = master.create_domain()?;
        self.check_fresh(index)?;
        match self.insert(name, index) {
            Ok(position) => {
                log::debug!("created domain {:?} with handle {}", name, index);
                Ok(&self.entries[position])
            },
            Err(error) => {
                master.release_domain(index);
                Err(error)
            },
        }
    }

    /// refuse a handle that belongs to a registered or removed domain
    fn check_fresh(&self, index: DomainIdx) -> EthercatResult {
        if self.retired.contains(&index)
            {return Err(EthercatError::AllocationFailed("fieldbus master returned the handle of a removed domain"))}
        if self.entries.iter().any(|domain| domain.index == index)
            {return Err(EthercatError::AllocationFailed("fieldbus master returned a handle already in use"))}
        Ok(())
    }

    /// store a freshly allocated domain, all checks are done before anything is modified
    fn insert(&mut self, name: &str, index: DomainIdx) -> EthercatResult<usize> {
        if self.limit.map_or(false, |limit| self.entries.len() >= limit)
            {return Err(EthercatError::AllocationFailed("domain registry is full"))}
        self.entries.try_reserve(1)
            .map_err(|_| EthercatError::AllocationFailed("cannot grow domain registry"))?;
        self.positions.try_reserve(1)
            .map_err(|_| EthercatError::AllocationFailed("cannot grow domain registry"))?;

        let name: Arc<str> = name.into();
        let position = self.entries.len();
        self.positions.insert(name.clone(), position);
        self.entries.push(Domain {name, index});
        Ok(position)
    }

    /**
        unregister a domain.

        The fieldbus master has no deallocation primitive, so its handle is only retired: it will never be iterated again, nor accepted for a new domain.
    */
    pub fn remove(&mut self, name: &str) -> EthercatResult<Domain> {
        let position = self.positions.remove(name)
            .ok_or_else(|| EthercatError::NotFound(format!("domain {:?}", name)))?;
        let domain = self.entries.remove(position);
        for entry in &self.entries[position ..] {
            if let Some(p) = self.positions.get_mut(&entry.name)
                {*p -= 1}
        }
        self.retired.insert(domain.index);
        log::debug!("removed domain {:?}, handle {} retired", name, domain.index);
        Ok(domain)
    }

    pub fn lookup(&self, name: &str) -> Option<&Domain> {
        self.positions.get(name).map(|&position| &self.entries[position])
    }

    /// all registered domains in creation order, each call restarts from the first one
    pub fn iter(&self) -> core::slice::Iter<'_, Domain> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {self.entries.len()}
    pub fn is_empty(&self) -> bool {self.entries.is_empty()}

    /**
        forget every domain, used when the master is released since all handles are invalidated at once.

        Retired handles are forgotten as well, a new master starts a new handle space.
    */
    pub fn clear(&mut self) {
        self.entries.clear();
        self.positions.clear();
        self.retired.clear();
    }
}

impl<'a> IntoIterator for &'a DomainRegistry {
    type Item = &'a Domain;
    type IntoIter = core::slice::Iter<'a, Domain>;

    fn into_iter(self) -> Self::IntoIter {self.iter()}
}
