use std::time::Duration;
use ecyclic::{
    Master, MasterConfig, CycleConfig, Subscriber, Event, SlaveInfo,
    sim::SimulatedBus,
    };

#[tokio::main]
async fn main() -> ecyclic::EthercatResult {
    env_logger::init();

    let coupler = SlaveInfo {
        position: 0,
        vendor_id: 0x2,
        product_code: 0x044c2c52,
        revision_number: 0x00120000,
        serial_number: 0,
        alias: 0,
        current_on_ebus: 2000,
    };
    let terminal = SlaveInfo {
        product_code: 0x07113052,
        current_on_ebus: -90,
        .. coupler
    };
    let bus = SimulatedBus::new()
        .with_slave(coupler)
        .with_slave(terminal)
        .with_slave(terminal);

    let mut master = Master::new(bus.clone(), MasterConfig::default());
    master.request_master()?;
    for slave in master.discover()? {
        println!("{}", slave);
    }
    let inputs = master.create_domain("inputs")?.index();
    let outputs = master.create_domain("outputs")?.index();
    master.activate()?;

    let (subscriber, mut events) = Subscriber::channel(64);
    master.configure(subscriber)?;

    // inputs answer from the start, outputs only once both terminals are up
    bus.set_response(inputs, 2, 2);
    bus.set_response(outputs, 1, 2);
    bus.set_domain_data(inputs, &[0x01, 0x00]);

    let task = master.run(CycleConfig {
        period: Some(Duration::from_millis(2)),
        include_data: true,
        .. Default::default()
    })?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    bus.set_response(outputs, 2, 2);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut master = task.join()?;
    while let Ok(event) = events.try_recv() {
        match event {
            Event::DomainComplete {domain, cycle, working_counter, data} =>
                println!("cycle {:>4}  {} complete  wc {}  {:02x?}", cycle, domain, working_counter, data),
            Event::BusFailure {cycle, error} =>
                println!("cycle {:>4}  bus failure {}", cycle, error),
            Event::Stopped {cycles} =>
                println!("stopped after {} cycles", cycles),
        }
    }
    master.release();
    Ok(())
}
