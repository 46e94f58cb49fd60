use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Bar timeframe a clock ticks at. Strategies never see anything finer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum Timeframe {
    #[display("1m")]
    M1,
    #[display("5m")]
    M5,
    #[display("15m")]
    M15,
    #[display("30m")]
    M30,
    #[display("1h")]
    H1,
    #[display("4h")]
    H4,
    #[display("1d")]
    D1,
}

impl Timeframe {
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "1m" => Some(Self::M1),
            "5m" => Some(Self::M5),
            "15m" => Some(Self::M15),
            "30m" => Some(Self::M30),
            "1h" => Some(Self::H1),
            "4h" => Some(Self::H4),
            "1d" => Some(Self::D1),
            _ => None,
        }
    }

    pub fn duration(self) -> Duration {
        let secs = match self {
            Self::M1 => 60,
            Self::M5 => 300,
            Self::M15 => 900,
            Self::M30 => 1800,
            Self::H1 => 3600,
            Self::H4 => 14_400,
            Self::D1 => 86_400,
        };
        Duration::seconds(secs)
    }
}

/// The event a clock emits at each bar boundary. `ts` is the bar's start
/// time, not the time the tick was actually emitted; `is_backtest` exists
/// for logging and metrics only and strategies must not branch on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub run_id: Uuid,
    pub ts: DateTime<Utc>,
    pub timeframe: Timeframe,
    pub bar_index: u32,
    pub is_backtest: bool,
}

pub type TickCallback = Arc<dyn Fn(Tick) + Send + Sync>;

/// Handle to a running clock loop: cancel it and/or wait for it to drain.
#[derive(Debug)]
pub struct ClockHandle {
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
    join: JoinHandle<()>,
}

impl ClockHandle {
    /// Request cancellation; the loop observes this at the next tick
    /// boundary and exits. Does not itself wait for the loop to finish.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    /// Wait for the loop to exit, whether by completion or by [`Self::stop`].
    pub async fn wait(self) {
        let _ = self.join.await;
    }
}

fn dispatch(callbacks: &[TickCallback], tick: Tick) {
    for cb in callbacks {
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| cb(tick.clone())));
        if let Err(panic) = result {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::error!(reason, "clock tick callback panicked; continuing dispatch");
        }
    }
}

/// Start time of the bar containing `from`, aligned to UTC midnight.
fn bar_start(from: DateTime<Utc>, timeframe: Timeframe) -> DateTime<Utc> {
    if timeframe == Timeframe::D1 {
        return Utc
            .with_ymd_and_hms(from.year(), from.month(), from.day(), 0, 0, 0)
            .single()
            .unwrap_or(from);
    }
    let midnight = from
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc();
    let secs_since_midnight = (from - midnight).num_seconds();
    let step = timeframe.duration().num_seconds();
    let bar_start_secs = (secs_since_midnight / step) * step;
    midnight + Duration::seconds(bar_start_secs)
}

fn next_bar_start(from: DateTime<Utc>, timeframe: Timeframe) -> DateTime<Utc> {
    bar_start(from, timeframe) + timeframe.duration()
}

/// Wall-clock-aligned clock used for live trading. Emits a [`Tick`] at each
/// bar boundary, sleeping in two phases to stay within ~50ms of the
/// intended time without busy-looping for the whole interval.
#[derive(Debug)]
pub struct RealtimeClock {
    timeframe: Timeframe,
}

impl RealtimeClock {
    const PRECISION_BUFFER: StdDuration = StdDuration::from_millis(100);
    const FINE_SLEEP: StdDuration = StdDuration::from_millis(10);

    pub fn new(timeframe: Timeframe) -> Self {
        Self { timeframe }
    }

    async fn sleep_until(target: DateTime<Utc>, stop_flag: &AtomicBool, wake: &Notify) {
        loop {
            if stop_flag.load(Ordering::SeqCst) {
                return;
            }
            let remaining = target - Utc::now();
            let remaining = match remaining.to_std() {
                Ok(d) => d,
                Err(_) => return,
            };
            if remaining <= StdDuration::from_millis(10) {
                return;
            }
            let sleep_for = if remaining > StdDuration::from_secs(1) {
                remaining - Self::PRECISION_BUFFER
            } else {
                Self::FINE_SLEEP
            };
            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = wake.notified() => {}
            }
        }
    }

    pub fn start(&self, run_id: Uuid, callbacks: Vec<TickCallback>) -> ClockHandle {
        let timeframe = self.timeframe;
        let stop_flag = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let (sf, wk) = (stop_flag.clone(), wake.clone());

        let join = tokio::spawn(async move {
            let mut bar_index = 0u32;
            while !sf.load(Ordering::SeqCst) {
                let next_bar = next_bar_start(Utc::now(), timeframe);
                Self::sleep_until(next_bar, &sf, &wk).await;
                if sf.load(Ordering::SeqCst) {
                    break;
                }
                bar_index += 1;
                dispatch(
                    &callbacks,
                    Tick {
                        run_id,
                        ts: next_bar,
                        timeframe,
                        bar_index,
                        is_backtest: false,
                    },
                );
            }
        });

        ClockHandle {
            stop_flag,
            wake,
            join,
        }
    }
}

/// Fast-forward clock used for backtesting: no real sleeping, ticks fire
/// back-to-back until `end` is reached. Callers that need the strategy
/// chain to fully drain before the next tick can enable backpressure and
/// call [`BacktestClockHandle::acknowledge`] once it has.
#[derive(Debug)]
pub struct BacktestClock {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    timeframe: Timeframe,
}

#[derive(Debug)]
pub struct BacktestClockHandle {
    inner: ClockHandle,
    ack: Arc<Notify>,
    progress: Arc<parking_lot::Mutex<f64>>,
}

impl BacktestClockHandle {
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub async fn wait(self) {
        self.inner.wait().await;
    }

    /// Release a tick being held under backpressure.
    pub fn acknowledge(&self) {
        self.ack.notify_one();
    }

    /// Fraction of the simulated window elapsed, in `[0.0, 1.0]`.
    pub fn progress(&self) -> f64 {
        *self.progress.lock()
    }
}

impl BacktestClock {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, timeframe: Timeframe) -> Self {
        Self { start, end, timeframe }
    }

    pub fn start(&self, run_id: Uuid, callbacks: Vec<TickCallback>, backpressure: bool) -> BacktestClockHandle {
        let timeframe = self.timeframe;
        let (start, end) = (self.start, self.end);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let ack = Arc::new(Notify::new());
        let progress = Arc::new(parking_lot::Mutex::new(0.0));
        let (sf, wk, ak, pr) = (stop_flag.clone(), wake.clone(), ack.clone(), progress.clone());

        let join = tokio::spawn(async move {
            let step = timeframe.duration();
            let mut simulated_time = start;
            let mut bar_index = 0u32;
            let total_secs = (end - start).num_seconds().max(1) as f64;

            while !sf.load(Ordering::SeqCst) && simulated_time <= end {
                bar_index += 1;
                dispatch(
                    &callbacks,
                    Tick {
                        run_id,
                        ts: simulated_time,
                        timeframe,
                        bar_index,
                        is_backtest: true,
                    },
                );

                if backpressure {
                    tokio::select! {
                        _ = ak.notified() => {}
                        _ = wk.notified() => { break; }
                    }
                }

                simulated_time += step;
                *pr.lock() = ((simulated_time - start).num_seconds() as f64 / total_secs).clamp(0.0, 1.0);
                tokio::task::yield_now().await;
            }
        });

        BacktestClockHandle {
            inner: ClockHandle { stop_flag, wake, join },
            ack,
            progress,
        }
    }
}
