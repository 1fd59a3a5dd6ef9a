use crate::credentials::CredentialResolver;
use crate::enumerator::Subnet;
use crate::logging::{log_failure, log_skipped, log_success};
use crate::net::inspect::LogInspector;
use crate::net::ping::Prober;
use crate::net::port::{scan_port, PortScanner};
use crate::services::PortSpec;
use crate::types::{HostResult, IntrusionStatus, OpenPort, ProbeOutcome, ScanEvent};

use futures::future::join_all;
use log::{debug, info};
use std::future::Future;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};

pub const DEFAULT_CONCURRENCY: usize = 64;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_SSH_PORT: u16 = 22;

/// When the authentication log of a live host is inspected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogCheckPolicy {
    /// As soon as the host answers, alongside the port scans.
    #[default]
    Always,
    /// Only once the SSH port has been seen open.
    WhenSshOpen,
}

impl FromStr for LogCheckPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "always" => Ok(LogCheckPolicy::Always),
            "when-ssh-open" => Ok(LogCheckPolicy::WhenSshOpen),
            other => Err(crate::Error::ArgumentError(format!(
                "unknown log check policy: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanParams {
    pub ports: Arc<PortSpec>,
    pub probe_timeout: Duration,
    pub concurrency: usize,
    pub ssh_port: u16,
    pub log_check: LogCheckPolicy,
}

impl ScanParams {
    pub fn new(ports: PortSpec) -> Self {
        Self {
            ports: Arc::new(ports),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
            ssh_port: DEFAULT_SSH_PORT,
            log_check: LogCheckPolicy::default(),
        }
    }
}

impl Default for ScanParams {
    fn default() -> Self {
        Self::new(PortSpec::default())
    }
}

/// Stops a running sweep. Tasks waiting on the network give up immediately.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        // sender gone, nobody can cancel any more
        std::future::pending::<()>().await;
    }
}

/// The pluggable pieces of a sweep.
pub struct Capabilities {
    pub prober: Arc<dyn Prober>,
    pub scanner: Arc<dyn PortScanner>,
    pub inspector: Arc<dyn LogInspector>,
    pub credentials: Arc<dyn CredentialResolver>,
}

struct SweepContext {
    params: ScanParams,
    caps: Capabilities,
    limiter: Semaphore,
    events: Option<mpsc::UnboundedSender<ScanEvent>>,
    shutdown: watch::Receiver<bool>,
}

impl SweepContext {
    fn emit(&self, event: ScanEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    /// Runs `fut` while holding one in-flight permit. `None` when the sweep is
    /// cancelled first.
    async fn limited<F: Future>(&self, fut: F) -> Option<F::Output> {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = cancelled(&mut shutdown) => None,
            output = async {
                let _permit = self.limiter.acquire().await.ok()?;
                Some(fut.await)
            } => output,
        }
    }

    async fn scan_host(self: Arc<Self>, ip: Ipv4Addr) -> HostResult {
        let probe = self
            .limited(self.caps.prober.probe(ip, self.params.probe_timeout))
            .await
            .unwrap_or(ProbeOutcome::Cancelled);

        if !probe.is_alive() {
            debug!("{} not alive: {}", ip, probe);
            return HostResult::dead(ip, probe);
        }

        log_success("probed live host", ip);
        self.emit(ScanEvent::HostUp(ip));

        let port_tasks: Vec<_> = self
            .params
            .ports
            .ports()
            .map(|port| {
                let ctx = Arc::clone(&self);
                tokio::spawn(async move { ctx.scan_one(ip, port).await })
            })
            .collect();

        let log_task = match self.params.log_check {
            LogCheckPolicy::Always => {
                let ctx = Arc::clone(&self);
                Some(tokio::spawn(async move { ctx.check_logs(ip).await }))
            }
            LogCheckPolicy::WhenSshOpen => None,
        };

        let mut open_ports = Vec::new();
        for joined in join_all(port_tasks).await {
            match joined {
                Ok(Some(open)) => open_ports.push(open),
                Ok(None) => {}
                Err(e) => log_failure("join port scan on", ip, &e),
            }
        }

        let intrusion = match log_task {
            Some(task) => task.await.unwrap_or_else(IntrusionStatus::failed),
            None if open_ports.iter().any(|p| p.port == self.params.ssh_port) => {
                self.check_logs(ip).await
            }
            None => {
                let reason = format!("ssh port {} not open", self.params.ssh_port);
                log_skipped("log check", ip, &reason);
                IntrusionStatus::CheckFailed(reason)
            }
        };

        HostResult::alive(ip, open_ports, Some(intrusion))
    }

    async fn scan_one(&self, ip: Ipv4Addr, port: u16) -> Option<OpenPort> {
        let scanned = self
            .limited(scan_port(
                self.caps.scanner.as_ref(),
                &self.params.ports,
                ip,
                port,
                self.params.probe_timeout,
            ))
            .await?;

        match scanned {
            Ok(Some(open)) => {
                self.emit(ScanEvent::PortOpen(ip, open.clone()));
                Some(open)
            }
            Ok(None) => None,
            Err(e) => {
                log_failure("scan port", format!("{}:{}", ip, port), &e);
                None
            }
        }
    }

    async fn check_logs(&self, ip: Ipv4Addr) -> IntrusionStatus {
        let status = match self.caps.credentials.resolve(ip).await {
            Ok(credentials) => self
                .limited(self.caps.inspector.inspect(ip, &credentials))
                .await
                .unwrap_or_else(|| IntrusionStatus::failed("cancelled")),
            Err(e) => IntrusionStatus::failed(format!("no credentials: {}", e)),
        };

        if let IntrusionStatus::CheckFailed(reason) = &status {
            log_failure("inspect auth log on", ip, reason);
        }
        self.emit(ScanEvent::IntrusionChecked(ip, status.clone()));
        status
    }
}

/// Drives a full sweep of one subnet.
pub struct Orchestrator {
    subnet: Subnet,
    ctx: Arc<SweepContext>,
    shutdown: ShutdownHandle,
}

impl Orchestrator {
    pub fn new(subnet: Subnet, params: ScanParams, caps: Capabilities) -> Self {
        Self::with_events(subnet, params, caps, None)
    }

    /// Like `new`, also streaming every finding to `events` as it happens.
    pub fn with_events(
        subnet: Subnet,
        params: ScanParams,
        caps: Capabilities,
        events: Option<mpsc::UnboundedSender<ScanEvent>>,
    ) -> Self {
        info!("Initializing Orchestrator for {}", subnet);
        let (sender, receiver) = watch::channel(false);
        let limiter = Semaphore::new(params.concurrency.max(1));
        Self {
            subnet,
            ctx: Arc::new(SweepContext {
                params,
                caps,
                limiter,
                events,
                shutdown: receiver,
            }),
            shutdown: ShutdownHandle(Arc::new(sender)),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Probes every address of the subnet and returns one result per
    /// address, sorted. Returns only after every spawned task has finished.
    pub async fn sweep(&self) -> Vec<HostResult> {
        info!(
            "Starting sweep of {} ({} ports, {} in flight)",
            self.subnet,
            self.ctx.params.ports.len(),
            self.ctx.params.concurrency
        );

        let addresses: Vec<Ipv4Addr> = self.subnet.iter_hosts().collect();
        let host_tasks: Vec<_> = addresses
            .iter()
            .map(|&ip| {
                let ctx = Arc::clone(&self.ctx);
                tokio::spawn(ctx.scan_host(ip))
            })
            .collect();

        let mut results: Vec<HostResult> = join_all(host_tasks)
            .await
            .into_iter()
            .zip(addresses)
            .map(|(joined, ip)| {
                joined.unwrap_or_else(|e| {
                    log_failure("scan host", ip, &e);
                    HostResult::dead(ip, ProbeOutcome::Failed(e.to_string()))
                })
            })
            .collect();
        results.sort_by_key(|r| r.address);

        let alive = results.iter().filter(|r| r.alive).count();
        let open: usize = results.iter().map(|r| r.open_ports.len()).sum();
        let suspicious = results
            .iter()
            .filter(|r| r.intrusion == Some(IntrusionStatus::Suspicious))
            .count();
        log_success(
            "swept",
            format!(
                "{}: {} hosts up, {} open ports, {} suspicious",
                self.subnet, alive, open, suspicious
            ),
        );

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{Credentials, StaticCredentials};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    /// Tracks how many fake operations run at once.
    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Gauge {
        async fn hold(&self, delay: Duration) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct FakeProber {
        alive: HashSet<u8>,
        delay: Duration,
        gauge: Arc<Gauge>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Prober for FakeProber {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn probe(&self, addr: Ipv4Addr, _timeout: Duration) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gauge.hold(self.delay).await;
            if self.alive.contains(&addr.octets()[3]) {
                ProbeOutcome::Alive
            } else {
                ProbeOutcome::Timeout
            }
        }
    }

    struct FakeScanner {
        open: HashSet<(u8, u16)>,
        delay: Duration,
        gauge: Arc<Gauge>,
        scanned: Mutex<Vec<(Ipv4Addr, u16)>>,
    }

    #[async_trait]
    impl PortScanner for FakeScanner {
        async fn scan(&self, addr: Ipv4Addr, port: u16, _timeout: Duration) -> crate::Result<bool> {
            self.scanned.lock().unwrap().push((addr, port));
            self.gauge.hold(self.delay).await;
            Ok(self.open.contains(&(addr.octets()[3], port)))
        }
    }

    struct FakeInspector {
        failing: HashSet<u8>,
        suspicious: HashSet<u8>,
        inspected: Mutex<Vec<Ipv4Addr>>,
    }

    #[async_trait]
    impl LogInspector for FakeInspector {
        async fn inspect(&self, addr: Ipv4Addr, _credentials: &Credentials) -> IntrusionStatus {
            self.inspected.lock().unwrap().push(addr);
            let octet = addr.octets()[3];
            if self.failing.contains(&octet) {
                IntrusionStatus::failed("Authentication error: rejected")
            } else if self.suspicious.contains(&octet) {
                IntrusionStatus::Suspicious
            } else {
                IntrusionStatus::Clean
            }
        }
    }

    struct Harness {
        prober: Arc<FakeProber>,
        scanner: Arc<FakeScanner>,
        inspector: Arc<FakeInspector>,
        gauge: Arc<Gauge>,
    }

    impl Harness {
        fn new(alive: &[u8], open: &[(u8, u16)]) -> Self {
            let gauge = Arc::new(Gauge::default());
            Self {
                prober: Arc::new(FakeProber {
                    alive: alive.iter().copied().collect(),
                    delay: Duration::ZERO,
                    gauge: gauge.clone(),
                    calls: AtomicUsize::new(0),
                }),
                scanner: Arc::new(FakeScanner {
                    open: open.iter().copied().collect(),
                    delay: Duration::ZERO,
                    gauge: gauge.clone(),
                    scanned: Mutex::new(Vec::new()),
                }),
                inspector: Arc::new(FakeInspector {
                    failing: HashSet::new(),
                    suspicious: HashSet::new(),
                    inspected: Mutex::new(Vec::new()),
                }),
                gauge,
            }
        }

        fn caps(&self) -> Capabilities {
            Capabilities {
                prober: self.prober.clone(),
                scanner: self.scanner.clone(),
                inspector: self.inspector.clone(),
                credentials: Arc::new(StaticCredentials::new(Credentials::new("root", "password"))),
            }
        }
    }

    fn ssh_and_http() -> ScanParams {
        ScanParams::new(
            [(22, "SSH".to_string()), (80, "HTTP".to_string())]
                .into_iter()
                .collect(),
        )
    }

    fn result_for(results: &[HostResult], octet: u8) -> &HostResult {
        results
            .iter()
            .find(|r| r.address == Ipv4Addr::new(10, 0, 0, octet))
            .unwrap()
    }

    #[tokio::test]
    async fn live_host_with_one_open_port_and_clean_log() {
        let harness = Harness::new(&[5], &[(5, 22)]);
        let orchestrator = Orchestrator::new(Subnet::new(10, 0, 0), ssh_and_http(), harness.caps());

        let results = orchestrator.sweep().await;

        assert_eq!(results.len(), 254);
        assert_eq!(
            result_for(&results, 5),
            &HostResult {
                address: Ipv4Addr::new(10, 0, 0, 5),
                alive: true,
                probe: ProbeOutcome::Alive,
                open_ports: vec![OpenPort { port: 22, service: "SSH".into() }],
                intrusion: Some(IntrusionStatus::Clean),
            }
        );
    }

    #[tokio::test]
    async fn dead_host_gets_no_port_or_log_tasks() {
        let harness = Harness::new(&[5], &[(5, 22)]);
        let orchestrator = Orchestrator::new(Subnet::new(10, 0, 0), ssh_and_http(), harness.caps());

        let results = orchestrator.sweep().await;

        let dead = Ipv4Addr::new(10, 0, 0, 9);
        assert_eq!(
            result_for(&results, 9),
            &HostResult::dead(dead, ProbeOutcome::Timeout)
        );
        assert_eq!(harness.prober.calls.load(Ordering::SeqCst), 254);
        let scanned = harness.scanner.scanned.lock().unwrap();
        assert!(scanned.iter().all(|(ip, _)| *ip != dead));
        assert_eq!(scanned.len(), 2);
        assert_eq!(*harness.inspector.inspected.lock().unwrap(), vec![Ipv4Addr::new(10, 0, 0, 5)]);
    }

    #[tokio::test]
    async fn failed_session_does_not_stop_other_hosts() {
        let mut harness = Harness::new(&[5, 6, 7], &[(5, 22), (6, 22), (7, 80)]);
        harness.inspector = Arc::new(FakeInspector {
            failing: [5].into_iter().collect(),
            suspicious: [7].into_iter().collect(),
            inspected: Mutex::new(Vec::new()),
        });
        let orchestrator = Orchestrator::new(Subnet::new(10, 0, 0), ssh_and_http(), harness.caps());

        let results = orchestrator.sweep().await;

        let failed = result_for(&results, 5).intrusion.as_ref().unwrap().to_string();
        assert!(failed.starts_with("check-failed:"));
        assert_eq!(result_for(&results, 6).intrusion, Some(IntrusionStatus::Clean));
        assert_eq!(result_for(&results, 7).intrusion, Some(IntrusionStatus::Suspicious));
        assert_eq!(
            result_for(&results, 7).open_ports,
            vec![OpenPort { port: 80, service: "HTTP".into() }]
        );
    }

    #[tokio::test]
    async fn ports_of_one_host_are_scanned_in_parallel() {
        let mut harness = Harness::new(&[5], &[]);
        let delay = Duration::from_millis(200);
        harness.scanner = Arc::new(FakeScanner {
            open: HashSet::new(),
            delay,
            gauge: harness.gauge.clone(),
            scanned: Mutex::new(Vec::new()),
        });
        let params = ScanParams {
            concurrency: 16,
            ..ScanParams::default()
        };
        let port_count = params.ports.len() as u32;
        let orchestrator = Orchestrator::new(Subnet::new(10, 0, 0), params, harness.caps());

        let started = Instant::now();
        orchestrator.sweep().await;
        let elapsed = started.elapsed();

        assert_eq!(port_count, 7);
        assert!(elapsed < delay * port_count / 2, "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn in_flight_operations_respect_the_limit() {
        let alive: Vec<u8> = (1..=254).collect();
        let mut harness = Harness::new(&alive, &[]);
        let delay = Duration::from_millis(5);
        harness.prober = Arc::new(FakeProber {
            alive: alive.iter().copied().collect(),
            delay,
            gauge: harness.gauge.clone(),
            calls: AtomicUsize::new(0),
        });
        harness.scanner = Arc::new(FakeScanner {
            open: HashSet::new(),
            delay,
            gauge: harness.gauge.clone(),
            scanned: Mutex::new(Vec::new()),
        });
        let params = ScanParams {
            concurrency: 3,
            ..ssh_and_http()
        };
        let orchestrator = Orchestrator::new(Subnet::new(10, 0, 0), params, harness.caps());

        let results = orchestrator.sweep().await;

        assert!(results.iter().all(|r| r.alive));
        assert_eq!(harness.scanner.scanned.lock().unwrap().len(), 254 * 2);
        assert!(harness.gauge.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn shutdown_cancels_pending_probes() {
        let mut harness = Harness::new(&[5], &[]);
        harness.prober = Arc::new(FakeProber {
            alive: [5].into_iter().collect(),
            delay: Duration::from_secs(30),
            gauge: harness.gauge.clone(),
            calls: AtomicUsize::new(0),
        });
        let orchestrator = Orchestrator::new(Subnet::new(10, 0, 0), ssh_and_http(), harness.caps());
        let shutdown = orchestrator.shutdown_handle();

        let started = Instant::now();
        let (results, _) = tokio::join!(orchestrator.sweep(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown.trigger();
        });

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(results.len(), 254);
        assert!(results.iter().all(|r| r.probe == ProbeOutcome::Cancelled));
        assert!(harness.scanner.scanned.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn gated_log_check_skips_hosts_without_ssh() {
        let harness = Harness::new(&[5, 6], &[(5, 22), (6, 80)]);
        let params = ScanParams {
            log_check: LogCheckPolicy::WhenSshOpen,
            ..ssh_and_http()
        };
        let orchestrator = Orchestrator::new(Subnet::new(10, 0, 0), params, harness.caps());

        let results = orchestrator.sweep().await;

        assert_eq!(result_for(&results, 5).intrusion, Some(IntrusionStatus::Clean));
        assert_eq!(
            result_for(&results, 6).intrusion,
            Some(IntrusionStatus::CheckFailed("ssh port 22 not open".into()))
        );
        assert_eq!(*harness.inspector.inspected.lock().unwrap(), vec![Ipv4Addr::new(10, 0, 0, 5)]);
    }

    #[tokio::test]
    async fn findings_are_streamed_as_events() {
        let harness = Harness::new(&[5], &[(5, 22)]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator =
            Orchestrator::with_events(Subnet::new(10, 0, 0), ssh_and_http(), harness.caps(), Some(tx));

        orchestrator.sweep().await;
        drop(orchestrator);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        let ip = Ipv4Addr::new(10, 0, 0, 5);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], ScanEvent::HostUp(ip));
        assert!(events.contains(&ScanEvent::PortOpen(ip, OpenPort { port: 22, service: "SSH".into() })));
        assert!(events.contains(&ScanEvent::IntrusionChecked(ip, IntrusionStatus::Clean)));
    }

    #[test]
    fn log_check_policy_parses() {
        assert_eq!("always".parse::<LogCheckPolicy>().unwrap(), LogCheckPolicy::Always);
        assert_eq!(
            "when-ssh-open".parse::<LogCheckPolicy>().unwrap(),
            LogCheckPolicy::WhenSshOpen
        );
        assert!("sometimes".parse::<LogCheckPolicy>().is_err());
    }
}
