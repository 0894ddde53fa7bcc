use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use converteai_core::limits::{Blocklist, Decision, FixedWindow};

use super::ServeOptions;
use crate::prelude::Error;
use crate::store::{FileStore, StoreError};

/// How long an address stays blocked after tripping the strict limiter.
pub const BLOCK_DURATION: Duration = Duration::from_secs(30 * 60);

/// The per-IP fixed-window limiters in front of the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limiter {
    /// Every `/api` route; window and budget come from the configuration.
    General,
    /// Failed uploads only.
    Upload,
    Download,
    /// Requests that look like probing or automation.
    Strict,
}

impl Limiter {
    pub fn message(&self) -> &'static str {
        match self {
            Limiter::General => "Muitas tentativas de acesso. Tente novamente em alguns minutos.",
            Limiter::Upload => {
                "Limite de uploads excedido. Aguarde 5 minutos antes de tentar novamente."
            }
            Limiter::Download => {
                "Limite de downloads excedido. Aguarde um momento antes de tentar novamente."
            }
            Limiter::Strict => "Acesso temporariamente restrito devido a atividade suspeita.",
        }
    }
}

#[derive(Debug)]
struct Guards {
    general: FixedWindow<IpAddr>,
    upload: FixedWindow<IpAddr>,
    download: FixedWindow<IpAddr>,
    strict: FixedWindow<IpAddr>,
    blocked: Blocklist<IpAddr>,
}

impl Guards {
    fn new(options: &ServeOptions) -> Self {
        Self {
            general: FixedWindow::new(options.rate_limit_window(), options.rate_limit_max),
            upload: FixedWindow::new(Duration::from_secs(5 * 60), 10),
            download: FixedWindow::new(Duration::from_secs(60), 30),
            strict: FixedWindow::new(Duration::from_secs(60), 3),
            blocked: Blocklist::default(),
        }
    }

    fn window(&mut self, limiter: Limiter) -> &mut FixedWindow<IpAddr> {
        match limiter {
            Limiter::General => &mut self.general,
            Limiter::Upload => &mut self.upload,
            Limiter::Download => &mut self.download,
            Limiter::Strict => &mut self.strict,
        }
    }
}

/// Conversion counters reported by `/api/stats`.
#[derive(Debug, Default)]
pub struct Stats {
    conversions: AtomicU64,
    failures: AtomicU64,
    downloads: AtomicU64,
    processing_ms: AtomicU64,
}

impl Stats {
    pub fn record_conversion(&self, elapsed: Duration) {
        self.conversions.fetch_add(1, Ordering::Relaxed);
        self.processing_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_download(&self) {
        self.downloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn conversions(&self) -> u64 {
        self.conversions.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn downloads(&self) -> u64 {
        self.downloads.load(Ordering::Relaxed)
    }

    /// Mean processing time of successful conversions.
    pub fn average_processing_ms(&self) -> Option<u64> {
        let count = self.conversions();
        (count > 0).then(|| self.processing_ms.load(Ordering::Relaxed) / count)
    }
}

fn retry_secs(d: Duration) -> u64 {
    d.as_secs().saturating_add(u64::from(d.subsec_nanos() > 0))
}

/// Shared state for the HTTP server.
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<ServeOptions>,
    pub store: FileStore,
    pub stats: Arc<Stats>,
    pub started: Instant,
    guards: Arc<Mutex<Guards>>,
}

impl ApiState {
    pub fn new(config: ServeOptions) -> Result<Self, StoreError> {
        let store = FileStore::open(&config.upload_dir)?;
        Ok(Self {
            guards: Arc::new(Mutex::new(Guards::new(&config))),
            config: Arc::new(config),
            store,
            stats: Arc::new(Stats::default()),
            started: Instant::now(),
        })
    }

    fn guards(&self) -> MutexGuard<'_, Guards> {
        self.guards.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count a request against `limiter`.
    pub fn hit(&self, limiter: Limiter, ip: IpAddr) -> Result<(), Error> {
        let decision = self.guards().window(limiter).hit(&ip, Instant::now());
        Self::verdict(limiter, ip, decision)
    }

    /// Check `limiter` without counting the request.
    pub fn peek(&self, limiter: Limiter, ip: IpAddr) -> Result<(), Error> {
        let decision = self.guards().window(limiter).peek(&ip, Instant::now());
        Self::verdict(limiter, ip, decision)
    }

    pub fn record(&self, limiter: Limiter, ip: IpAddr) {
        self.guards().window(limiter).record(&ip, Instant::now());
    }

    fn verdict(limiter: Limiter, ip: IpAddr, decision: Decision) -> Result<(), Error> {
        match decision {
            Decision::Allowed { .. } => Ok(()),
            Decision::Limited { retry_after } => {
                log::warn!(target: "security", "Rate limit exceeded ({limiter:?}) for {ip}");
                Err(Error::RateLimited {
                    limiter,
                    retry_after: retry_secs(retry_after),
                })
            }
        }
    }

    pub fn block(&self, ip: IpAddr) {
        self.guards().blocked.block(ip, Instant::now(), BLOCK_DURATION);
        log::warn!(
            target: "security",
            "IP {ip} blocked for {} minutes",
            BLOCK_DURATION.as_secs() / 60
        );
    }

    /// Fails while `ip` is blocked.
    pub fn check_blocked(&self, ip: IpAddr) -> Result<(), Error> {
        match self.guards().blocked.blocked_for(&ip, Instant::now()) {
            Some(remaining) => Err(Error::Blocked {
                retry_after: retry_secs(remaining),
            }),
            None => Ok(()),
        }
    }

    /// Drop expired limiter windows and blocks.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut guards = self.guards();
        let mut evicted = guards.blocked.evict_expired(now);
        for limiter in [
            Limiter::General,
            Limiter::Upload,
            Limiter::Download,
            Limiter::Strict,
        ] {
            evicted += guards.window(limiter).evict_expired(now);
        }
        evicted
    }

    pub fn is_development(&self) -> bool {
        self.config.environment == "development"
    }
}
