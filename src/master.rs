use crate::{
    fieldbus::{Fieldbus, MasterHandle},
    domain::{Domain, DomainRegistry},
    slave::{SlaveInfo, SlaveDiscovery},
    notify::Subscriber,
    config::{MasterConfig, CycleConfig},
    cyclic::{Cyclic, CyclicHandle},
    error::{EthercatError, EthercatResult},
    };


/**
    This struct owns everything needed to run an ethercat master: the fieldbus library, the master handle once requested, the registry of its domains, and the subscriber to notify.

    It replaces any process-wide state: each instance is independent, so several can coexist (for instance one per test).

    ## Lifecycle

    - setup: [Self::request_master], [Self::create_domain], [Self::activate], [Self::configure]
    - realtime: [Self::run] moves the context into a [Cyclic] exchange, no setup operation is possible until it is given back
    - teardown: [Self::release] or drop, the master handle is released exactly once and the registry cleared with it

    ## Example

    ```ignore
    let mut master = Master::new(bus, MasterConfig::default());
    master.request_master()?;
    master.create_domain("inputs")?;
    master.create_domain("outputs")?;
    master.activate()?;

    let (subscriber, mut events) = Subscriber::channel(64);
    master.configure(subscriber)?;
    let task = master.run(CycleConfig::default())?;
    while let Some(event) = events.recv().await {
        // ...
    }
    ```
*/
pub struct Master<B: Fieldbus> {
    bus: B,
    config: MasterConfig,
    handle: Option<B::Master>,
    domains: DomainRegistry,
    subscriber: Option<Subscriber>,
    activated: bool,
}

impl<B: Fieldbus> Master<B> {
    /// build a context on the given fieldbus library, no master is requested yet
    pub fn new(bus: B, config: MasterConfig) -> Self {
        let domains = match config.max_domains {
            Some(limit) => DomainRegistry::with_limit(limit),
            None => DomainRegistry::new(),
        };
        Self {
            bus,
            config,
            handle: None,
            domains,
            subscriber: None,
            activated: false,
        }
    }

    /**
        request the master from the fieldbus library.

        Requesting again while a master is held does nothing.
    */
    pub fn request_master(&mut self) -> EthercatResult {
        if self.handle.is_some() {
            log::debug!("master {} already requested", self.config.index);
            return Ok(());
        }
        self.handle = Some(self.bus.request_master(self.config.index)?);
        log::debug!("requested master {}", self.config.index);
        Ok(())
    }
    /// true if a master is held
    pub fn is_requested(&self) -> bool {self.handle.is_some()}
    pub fn is_activated(&self) -> bool {self.activated}

    fn handle(&self) -> EthercatResult<&B::Master> {
        self.handle.as_ref().ok_or(EthercatError::Unavailable("master not requested"))
    }
    fn handle_mut(&mut self) -> EthercatResult<&mut B::Master> {
        self.handle.as_mut().ok_or(EthercatError::Unavailable("master not requested"))
    }
    /// borrow the master handle and the registry together
    pub(crate) fn parts(&mut self) -> EthercatResult<(&mut B::Master, &DomainRegistry)> {
        match self.handle.as_mut() {
            Some(handle) => Ok((handle, &self.domains)),
            None => Err(EthercatError::Unavailable("master not requested")),
        }
    }

    /// create a new domain named `name` in the master
    pub fn create_domain(&mut self, name: &str) -> EthercatResult<&Domain> {
        let handle = self.handle.as_mut()
            .ok_or(EthercatError::Unavailable("master not requested"))?;
        self.domains.create(handle, name)
    }
    /// remove the domain named `name`, it will not be exchanged anymore
    pub fn remove_domain(&mut self, name: &str) -> EthercatResult {
        self.domains.remove(name).map(|_| ())
    }
    /// registry of the domains of this master
    pub fn domains(&self) -> &DomainRegistry {&self.domains}

    /**
        identification of the slave at the given position.

        Positions beyond `u16::MAX` are rejected as invalid, positions past the last slave are not found.
    */
    pub fn get_slave(&self, index: u32) -> EthercatResult<SlaveInfo> {
        let position = u16::try_from(index)
            .map_err(|_| EthercatError::InvalidArgument("slave position out of range"))?;
        self.handle()?.slave_info(position)
    }
    /// iterate over all slaves of the segment, in topological order
    pub fn discover(&self) -> EthercatResult<SlaveDiscovery<'_, B::Master>> {
        Ok(SlaveDiscovery::new(self.handle()?))
    }

    /// start the process data exchange on the bus
    pub fn activate(&mut self) -> EthercatResult {
        let index = self.config.index;
        let handle = self.handle_mut()?;
        log::debug!("activate EtherCAT master {}", index);
        handle.activate()?;
        self.activated = true;
        Ok(())
    }

    /// queue every registered domain, then send
    pub fn queue_all_domains(&mut self) -> EthercatResult {
        let (handle, domains) = self.parts()?;
        for domain in domains {
            handle.domain_queue(domain.index());
        }
        handle.send()
    }
    /// send the frames queued so far
    pub fn send(&mut self) -> EthercatResult {
        self.handle_mut()?.send()
    }

    /**
        set the subscriber notified by the cyclic exchange, replacing any previous one.

        A subscriber whose receiving end is already dropped is rejected.
    */
    pub fn configure(&mut self, subscriber: Subscriber) -> EthercatResult {
        if subscriber.is_closed()
            {return Err(EthercatError::InvalidArgument("subscriber is closed"))}
        self.subscriber = Some(subscriber);
        Ok(())
    }
    pub(crate) fn subscriber(&self) -> Option<&Subscriber> {self.subscriber.as_ref()}

    /**
        release the master and forget all its domains.

        Calling it again, or on a context that never requested a master, does nothing.
    */
    pub fn release(&mut self) {
        self.domains.clear();
        self.activated = false;
        if let Some(handle) = self.handle.take() {
            handle.release();
            log::debug!("released master {}", self.config.index);
        }
    }
}

impl<B> Master<B>
where
    B: Fieldbus + Send + 'static,
{
    /// start the cyclic exchange on a dedicated thread
    pub fn run(self, config: CycleConfig) -> EthercatResult<CyclicHandle<B>> {
        Cyclic::new(self, config)?.spawn()
    }
}

impl<B: Fieldbus> Drop for Master<B> {
    fn drop(&mut self) {
        self.release();
    }
}
