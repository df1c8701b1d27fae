use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
        },
    time::Duration,
    };
use futures_concurrency::future::Join;
use ecyclic::{
    Master, MasterConfig, Cyclic, CycleConfig, CycleMode, FailurePolicy, Trigger,
    Subscriber, Event, EthercatError, EthercatResult, SlaveInfo,
    Fieldbus, MasterHandle, DomainIdx, DomainState,
    sim::{SimulatedBus, Call},
    };


fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn setup(bus: &SimulatedBus, names: &[&str]) -> Master<SimulatedBus> {
    let mut master = Master::new(bus.clone(), MasterConfig::default());
    master.request_master().unwrap();
    for name in names {
        master.create_domain(name).unwrap();
    }
    master.activate().unwrap();
    master
}

fn complete_domains(events: &[Event]) -> Vec<String> {
    events.iter()
        .filter_map(|event| match event {
            Event::DomainComplete {domain, ..} => Some(domain.to_string()),
            _ => None,
        })
        .collect()
}

fn drain(receiver: &mut tokio::sync::mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}


#[test]
fn distinct_names_and_duplicates() {
    init_logger();
    let bus = SimulatedBus::new();
    let mut master = setup(&bus, &[]);
    let names = ["x", "y", "z", "y", "x", "w"];
    let mut duplicates = 0;
    for name in names {
        match master.create_domain(name) {
            Ok(_) => {},
            Err(EthercatError::DuplicateName(_)) => duplicates += 1,
            Err(error) => panic!("unexpected error {}", error),
        }
    }
    assert_eq!(duplicates, 2);
    assert_eq!(master.domains().len(), 4);
}

#[test]
fn domain_creation_without_master() {
    init_logger();
    let bus = SimulatedBus::new();
    bus.set_available(false);
    let mut master = Master::new(bus, MasterConfig::default());
    assert!(matches!(master.request_master(), Err(EthercatError::Unavailable(_))));
    assert!(matches!(master.create_domain("X"), Err(EthercatError::Unavailable(_))));
}

#[test]
fn missing_slave_is_an_error() {
    init_logger();
    let slave = SlaveInfo {
        position: 0,
        vendor_id: 0x2,
        product_code: 0x07d83052,
        revision_number: 0x00100000,
        serial_number: 0,
        alias: 0,
        current_on_ebus: 90,
    };
    let bus = SimulatedBus::new()
        .with_slave(slave)
        .with_slave(slave)
        .with_slave(slave);
    let master = setup(&bus, &[]);
    assert_eq!(master.get_slave(2).unwrap().position, 2);
    assert!(matches!(master.get_slave(5), Err(EthercatError::NotFound(_))));
}

#[test]
fn one_cycle_notifies_complete_domain_only() {
    init_logger();
    let bus = SimulatedBus::new();
    let mut master = setup(&bus, &["A", "B"]);
    let a = master.domains().lookup("A").unwrap().index();
    let b = master.domains().lookup("B").unwrap().index();
    bus.set_response(a, 2, 2);
    bus.set_response(b, 1, 2);

    let (subscriber, mut receiver) = Subscriber::channel(16);
    master.configure(subscriber).unwrap();
    let mut cyclic = Cyclic::new(master, CycleConfig::default()).unwrap();
    let report = cyclic.cycle().unwrap();
    assert_eq!(report.notified, 1);

    assert_eq!(complete_domains(&drain(&mut receiver)), ["A"]);
}

#[test]
fn ordering_holds_over_many_cycles() {
    init_logger();
    let bus = SimulatedBus::new();
    let master = setup(&bus, &["A", "B", "C"]);
    let domains = master.domains().iter().map(|domain| domain.index()).collect::<Vec<_>>();
    bus.clear_journal();
    let mut cyclic = Cyclic::new(master, CycleConfig::default()).unwrap();
    for _ in 0 .. 10 {
        cyclic.cycle().unwrap();
    }

    let journal = bus.journal();
    let cycles = journal.split_inclusive(|&call| call == Call::Send).collect::<Vec<_>>();
    assert_eq!(cycles.len(), 10);
    for calls in cycles {
        assert_eq!(calls.first(), Some(&Call::Receive));
        assert_eq!(calls.last(), Some(&Call::Send));
        for &domain in &domains {
            let processed = calls.iter().position(|&call| call == Call::Process(domain)).unwrap();
            let queued = calls.iter().position(|&call| call == Call::Queue(domain)).unwrap();
            assert!(processed < queued);
            assert_eq!(calls.iter().filter(|&&call| call == Call::Process(domain)).count(), 1);
        }
    }
}

#[test]
fn level_trigger_notifies_each_cycle() {
    init_logger();
    let bus = SimulatedBus::new();
    let mut master = setup(&bus, &["A"]);
    let a = master.domains().lookup("A").unwrap().index();
    bus.set_response(a, 1, 1);
    let (subscriber, mut receiver) = Subscriber::channel(16);
    master.configure(subscriber).unwrap();

    let mut cyclic = Cyclic::new(master, CycleConfig {
        trigger: Trigger::Level,
        .. Default::default()
    }).unwrap();
    for _ in 0 .. 4 {
        cyclic.cycle().unwrap();
    }
    assert_eq!(complete_domains(&drain(&mut receiver)).len(), 4);
}

#[test]
fn removed_domain_is_not_exchanged() {
    init_logger();
    let bus = SimulatedBus::new();
    let mut master = setup(&bus, &["A", "B"]);
    let a = master.domains().lookup("A").unwrap().index();
    master.remove_domain("A").unwrap();
    assert!(matches!(master.remove_domain("A"), Err(EthercatError::NotFound(_))));
    bus.clear_journal();

    let mut cyclic = Cyclic::new(master, CycleConfig::default()).unwrap();
    cyclic.cycle().unwrap();
    assert!(! bus.journal().iter().any(|&call| call == Call::Process(a) || call == Call::Queue(a)));
}

#[tokio::test]
async fn run_stops_on_request() {
    init_logger();
    let bus = SimulatedBus::new();
    let mut master = setup(&bus, &["A"]);
    let a = master.domains().lookup("A").unwrap().index();
    bus.set_response(a, 1, 1);
    let (subscriber, mut receiver) = Subscriber::channel(64);
    master.configure(subscriber).unwrap();

    let mut cyclic = Cyclic::new(master, CycleConfig {
        period: Some(Duration::from_millis(1)),
        .. Default::default()
    }).unwrap();
    let stop = AtomicBool::new(false);

    let (cycles, ()) = (
        cyclic.run(&stop),
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stop.store(true, Ordering::Release);
        },
    ).join().await;
    let cycles = cycles.unwrap();
    assert!(cycles > 0);

    let events = drain(&mut receiver);
    // edge triggered: the domain stayed complete, one notification only
    assert_eq!(complete_domains(&events), ["A"]);
    assert!(matches!(events.last(), Some(Event::Stopped {cycles: n}) if *n == cycles));
}

#[tokio::test]
async fn bus_failure_is_reported_and_survived() {
    init_logger();
    let bus = SimulatedBus::new();
    let mut master = setup(&bus, &["A"]);
    let (subscriber, mut receiver) = Subscriber::channel(1024);
    master.configure(subscriber).unwrap();
    bus.set_link(false);

    let mut cyclic = Cyclic::new(master, CycleConfig {
        period: Some(Duration::from_millis(1)),
        on_bus_failure: FailurePolicy::Report,
        .. Default::default()
    }).unwrap();
    let stop = AtomicBool::new(false);

    let (cycles, ()) = (
        cyclic.run(&stop),
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stop.store(true, Ordering::Release);
        },
    ).join().await;
    assert!(cycles.unwrap() > 1);
    let events = drain(&mut receiver);
    assert!(matches!(events.first(), Some(Event::BusFailure {cycle: 1, error: EthercatError::Bus(_)})));
}

#[tokio::test]
async fn bus_failure_terminates_when_asked() {
    init_logger();
    let bus = SimulatedBus::new();
    let mut master = setup(&bus, &["A"]);
    let (subscriber, mut receiver) = Subscriber::channel(16);
    master.configure(subscriber).unwrap();
    bus.set_link(false);

    let mut cyclic = Cyclic::new(master, CycleConfig {
        period: None,
        on_bus_failure: FailurePolicy::Terminate,
        .. Default::default()
    }).unwrap();
    let stop = AtomicBool::new(false);
    assert!(matches!(cyclic.run(&stop).await, Err(EthercatError::Bus(_))));
    assert_eq!(cyclic.cycles(), 1);

    let events = drain(&mut receiver);
    assert!(matches!(events.as_slice(), [Event::BusFailure {..}, Event::Stopped {cycles: 1}]));
}

#[tokio::test]
async fn spawned_exchange_gives_master_back() {
    init_logger();
    let bus = SimulatedBus::new();
    let mut master = setup(&bus, &["A", "B"]);
    let b = master.domains().lookup("B").unwrap().index();
    bus.set_response(b, 3, 3);
    let (subscriber, mut receiver) = Subscriber::channel(16);
    master.configure(subscriber).unwrap();

    let task = master.run(CycleConfig {
        period: Some(Duration::from_millis(1)),
        mode: CycleMode::FullCycle,
        .. Default::default()
    }).unwrap();

    match receiver.recv().await {
        Some(Event::DomainComplete {domain, ..}) => assert_eq!(&*domain, "B"),
        other => panic!("unexpected event {:?}", other),
    }

    let mut master = task.join().unwrap();
    assert!(bus.is_reserved());
    assert_eq!(master.domains().len(), 2);
    master.create_domain("C").unwrap_err();
    master.release();
    assert_eq!(bus.releases(), 1);
}

#[test]
fn dropped_handle_releases_master() {
    init_logger();
    let bus = SimulatedBus::new();
    let master = setup(&bus, &["A"]);
    let task = master.run(CycleConfig::default()).unwrap();
    std::thread::sleep(Duration::from_millis(10));
    assert!(! task.is_finished());
    drop(task);
    assert_eq!(bus.releases(), 1);
    assert!(! bus.is_reserved());
    assert_eq!(bus.live_domains(), 0);
}

#[test]
fn terminated_exchange_releases_master() {
    init_logger();
    let bus = SimulatedBus::new();
    let master = setup(&bus, &["A"]);
    bus.set_link(false);

    let task = master.run(CycleConfig {
        period: Some(Duration::from_millis(1)),
        on_bus_failure: FailurePolicy::Terminate,
        .. Default::default()
    }).unwrap();
    assert!(matches!(task.join(), Err(EthercatError::Bus(_))));
    assert_eq!(bus.releases(), 1);
    assert!(! bus.is_reserved());
}


/// fieldbus whose master panics on the first receive
#[derive(Clone, Default)]
struct FaultyBus {
    releases: Arc<AtomicUsize>,
}
struct FaultyMaster {
    releases: Arc<AtomicUsize>,
    domains: usize,
}
impl Fieldbus for FaultyBus {
    type Master = FaultyMaster;
    fn request_master(&self, _index: u32) -> EthercatResult<FaultyMaster> {
        Ok(FaultyMaster {releases: self.releases.clone(), domains: 0})
    }
}
impl MasterHandle for FaultyMaster {
    fn create_domain(&mut self) -> EthercatResult<DomainIdx> {
        self.domains += 1;
        Ok(DomainIdx(self.domains))
    }
    fn activate(&mut self) -> EthercatResult {Ok(())}
    fn receive(&mut self) -> EthercatResult {panic!("frame buffer corrupted")}
    fn send(&mut self) -> EthercatResult {Ok(())}
    fn domain_process(&mut self, _domain: DomainIdx) {}
    fn domain_queue(&mut self, _domain: DomainIdx) {}
    fn domain_state(&self, _domain: DomainIdx) -> DomainState {DomainState::default()}
    fn slave_info(&self, position: u16) -> EthercatResult<SlaveInfo> {
        Err(EthercatError::NotFound(format!("slave {}", position)))
    }
    fn release(self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn panicked_exchange_releases_master_once() {
    init_logger();
    let bus = FaultyBus::default();
    let mut master = Master::new(bus.clone(), MasterConfig::default());
    master.request_master().unwrap();
    master.create_domain("A").unwrap();
    master.activate().unwrap();

    let task = master.run(CycleConfig::default()).unwrap();
    assert!(matches!(task.join(), Err(EthercatError::Unavailable(_))));
    assert_eq!(bus.releases.load(Ordering::SeqCst), 1);
}

#[test]
fn panicked_exchange_dropped_releases_master_once() {
    init_logger();
    let bus = FaultyBus::default();
    let mut master = Master::new(bus.clone(), MasterConfig::default());
    master.request_master().unwrap();
    master.activate().unwrap();

    let task = master.run(CycleConfig::default()).unwrap();
    drop(task);
    assert_eq!(bus.releases.load(Ordering::SeqCst), 1);
}
