/*!
    Cyclic exchange of process data between the master and the segment.

    Each cycle follows the order required by the bus: inputs are latched before being consumed, and outputs are fully assembled before transmission.

    ```text
    receive ─► process A ─► evaluate A ─► queue A ─► process B ─► evaluate B ─► queue B ─► send
    ```

    A [Cyclic] can be driven cycle by cycle with [Cyclic::cycle], or left looping with [Cyclic::run] until a stop flag is raised. [Cyclic::spawn] runs the loop on its own thread, as a realtime task should.
*/

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering::*},
        },
    thread::JoinHandle,
    };
use core::time::Duration;
use crate::{
    master::Master,
    fieldbus::{Fieldbus, MasterHandle},
    notify::{Notifier, Event},
    config::{CycleConfig, CycleMode, FailurePolicy},
    error::{EthercatError, EthercatResult},
    };


/// what happened during one cycle
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CycleReport {
    /// number of this cycle, starting from 1
    pub cycle: u64,
    /// number of domains processed and queued
    pub domains: usize,
    /// number of notifications decided, delivered or not
    pub notified: usize,
    /// whether the master sent at the end of this cycle
    pub sent: bool,
}


/**
    the cyclic exchange engine.

    It owns the [Master] context for its whole lifetime, hence no other code can touch the bus or the domain registry while cycles are running.
*/
pub struct Cyclic<B: Fieldbus> {
    master: Master<B>,
    config: CycleConfig,
    notifier: Notifier,
    /// number of cycles started so far
    cycles: u64,
}

impl<B: Fieldbus> Cyclic<B> {
    /**
        prepare a cyclic exchange on a master, using the subscriber configured on it.

        The master must have been requested.
    */
    pub fn new(master: Master<B>, config: CycleConfig) -> EthercatResult<Self> {
        if ! master.is_requested()
            {return Err(EthercatError::Unavailable("master not requested"))}
        if ! master.is_activated()
            {log::warn!("starting cyclic exchange on a master not activated");}
        if master.subscriber().is_none()
            {log::warn!("starting cyclic exchange with no subscriber, notifications will be discarded");}
        let notifier = Notifier::new(
            master.subscriber().cloned(),
            config.trigger,
            config.include_data,
            );
        Ok(Self {
            master,
            config,
            notifier,
            cycles: 0,
        })
    }

    pub fn master(&self) -> &Master<B> {&self.master}
    pub fn notifier(&self) -> &Notifier {&self.notifier}
    pub fn config(&self) -> &CycleConfig {&self.config}
    /// number of cycles started so far
    pub fn cycles(&self) -> u64 {self.cycles}
    /// end the exchange and give back the master context
    pub fn into_master(self) -> Master<B> {self.master}

    /**
        run exactly one cycle.

        A failed receive aborts the cycle before any domain is processed, a failed send aborts it after all domains were queued. In both cases the error is returned and nothing is retried.
    */
    pub fn cycle(&mut self) -> EthercatResult<CycleReport> {
        self.cycles += 1;
        let cycle = self.cycles;
        let (handle, domains) = self.master.parts()?;
        let mut report = CycleReport {cycle, .. Default::default()};

        handle.receive()?;
        for domain in domains {
            handle.domain_process(domain.index());
            let decision = self.notifier.evaluate(&*handle, domain, cycle);
            if decision.is_notify()
                {report.notified += 1}
            self.notifier.deliver(decision);
            handle.domain_queue(domain.index());
            report.domains += 1;
        }

        let send = match self.config.mode {
            CycleMode::FullCycle => true,
            CycleMode::FireAndForget {send_every} => cycle % u64::from(send_every.get()) == 0,
        };
        if send {
            handle.send()?;
            report.sent = true;
        }
        log::trace!("cycle {}: {} domains, {} notified", cycle, report.domains, report.notified);
        Ok(report)
    }

    /**
        run cycles until `stop` is raised, the flag is checked once per cycle.

        Bus failures are handled according to [CycleConfig::on_bus_failure], any other error stops the loop. An [Event::Stopped] is published on exit. Returns the number of cycles run by this call.
    */
    pub async fn run(&mut self, stop: &AtomicBool) -> EthercatResult<u64> {
        let mut pacer = Pacer::new(self.config.period)?;
        let start = self.cycles;
        log::info!("cyclic exchange started with {} domains, period {:?}, {:?}",
            self.master.domains().len(),
            self.config.period,
            self.config.mode,
            );

        let result = loop {
            if stop.load(Acquire) {break Ok(())}
            if let Err(error) = pacer.tick().await {break Err(error)}

            match self.cycle() {
                Ok(_) => {},
                Err(error) if error.is_bus() => {
                    log::warn!("cycle {} failed: {}", self.cycles, error);
                    self.notifier.publish(Event::BusFailure {
                        cycle: self.cycles,
                        error: error.clone(),
                    });
                    if self.config.on_bus_failure == FailurePolicy::Terminate
                        {break Err(error)}
                },
                Err(error) => break Err(error),
            }
        };

        let cycles = self.cycles - start;
        self.notifier.publish(Event::Stopped {cycles});
        match &result {
            Ok(()) => log::info!("cyclic exchange stopped after {} cycles", cycles),
            Err(error) => log::error!("cyclic exchange aborted after {} cycles: {}", cycles, error),
        }
        result.map(|_| cycles)
    }
}

impl<B> Cyclic<B>
where
    B: Fieldbus + Send + 'static,
{
    /**
        run [Self::run] on a dedicated thread with its own single-threaded runtime, so that nothing else can delay the cycles.

        With [CycleConfig::realtime], the thread asks for the highest realtime priority. Failing to get it is logged but not fatal.
    */
    pub fn spawn(self) -> EthercatResult<CyclicHandle<B>> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let name = self.config.thread_name.clone();
        let mut cyclic = self;

        let thread = std::thread::Builder::new()
            .name(name)
            .spawn(move || {
                if cyclic.config.realtime
                    {raise_priority()}
                let result = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(EthercatError::from)
                    .and_then(|runtime| runtime.block_on(cyclic.run(&flag)));
                (cyclic, result)
            })?;

        Ok(CyclicHandle {
            stop,
            thread: Some(thread),
        })
    }
}


/**
    control over a cyclic exchange running on its own thread.

    Dropping the handle stops the exchange and waits for it, so the master is always released.
*/
pub struct CyclicHandle<B: Fieldbus> {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<(Cyclic<B>, EthercatResult<u64>)>>,
}

impl<B: Fieldbus> CyclicHandle<B> {
    /// ask the exchange to stop, it will finish within one cycle
    pub fn stop(&self) {
        self.stop.store(true, Release);
    }
    /// true once the loop has exited, by stop request or by error
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |thread| thread.is_finished())
    }
    /**
        stop the exchange, wait for its thread and give back the master.

        If the exchange ended with an error, or its thread panicked, the master has been released and the error is returned instead.
    */
    pub fn join(mut self) -> EthercatResult<Master<B>> {
        self.stop();
        let thread = self.thread.take()
            .ok_or(EthercatError::Unavailable("cyclic exchange already joined"))?;
        match thread.join() {
            Ok((cyclic, Ok(_))) => Ok(cyclic.into_master()),
            Ok((_, Err(error))) => Err(error),
            Err(_) => Err(EthercatError::Unavailable("cyclic exchange thread panicked")),
        }
    }
}

impl<B: Fieldbus> Drop for CyclicHandle<B> {
    fn drop(&mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err()
                {log::error!("cyclic exchange thread panicked");}
        }
    }
}


/// paces the cycles, with no pause when there is no period
enum Pacer {
    Free,
    #[cfg(target_os = "linux")]
    Timer(tokio_timerfd::Interval),
    #[cfg(not(target_os = "linux"))]
    Timer(tokio::time::Interval),
}
impl Pacer {
    fn new(period: Option<Duration>) -> EthercatResult<Self> {
        Ok(match period {
            None => Self::Free,
            #[cfg(target_os = "linux")]
            Some(period) => Self::Timer(tokio_timerfd::Interval::new_interval(period)?),
            #[cfg(not(target_os = "linux"))]
            Some(period) => {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                Self::Timer(interval)
            },
        })
    }
    async fn tick(&mut self) -> EthercatResult {
        match self {
            // let other tasks of the runtime see the stop flag
            Self::Free => tokio::task::yield_now().await,
            #[cfg(target_os = "linux")]
            Self::Timer(interval) => {
                use futures::stream::StreamExt;
                match interval.next().await {
                    Some(tick) => tick?,
                    None => return Err(EthercatError::Unavailable("cycle timer ended")),
                }
            },
            #[cfg(not(target_os = "linux"))]
            Self::Timer(interval) => {interval.tick().await;},
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn raise_priority() {
    if let Err(error) = thread_priority::set_thread_priority_and_policy(
            thread_priority::thread_native_id(),
            thread_priority::ThreadPriority::Max,
            thread_priority::ThreadSchedulePolicy::Realtime(thread_priority::RealtimeThreadSchedulePolicy::Fifo),
            ) {
        log::warn!("cannot get realtime thread priority: {:?}", error);
    }
    if let Err(error) = ioprio::set_priority(
            ioprio::Target::Process(ioprio::Pid::this()),
            ioprio::Priority::new(ioprio::Class::Realtime(ioprio::RtPriorityLevel::highest())),
            ) {
        log::warn!("cannot get realtime io priority: {:?}", error);
    }
}
#[cfg(not(target_os = "linux"))]
fn raise_priority() {
    log::warn!("realtime priority is only supported on linux");
}
