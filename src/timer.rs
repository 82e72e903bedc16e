//! Background timer that drives periodic sweeps.
//!
//! A dedicated thread owns a single-threaded tokio runtime whose event loop
//! waits on one re-armable sleep. When it fires the loop takes the timer lock,
//! runs the sweep and arms itself again, so sweeps never overlap no matter how
//! long one takes. `stop()` takes the same lock, which makes it wait for an
//! in-flight sweep and guarantees that none starts afterwards.
//!
//! 驱动周期性清扫的后台定时器。
//! 专用线程运行单线程 tokio 运行时；定时器触发后在定时器锁内执行清扫并重新装填。

use crate::error::QueueError;
use antidote::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tracing::{debug, trace, warn};

/// Work performed every time the timer fires.
pub(crate) trait Sweep: Send + Sync + 'static {
    fn sweep(&self);
}

enum Command {
    /// (Re)arm the timer for the given generation.
    Arm(u64),
    Cancel,
    Shutdown,
}

/// Re-arm state, guarded by the timer lock.
///
/// `generation` changes on every `start()`, so a firing that belongs to an
/// older arming is ignored.
#[derive(Debug, Default)]
struct TimerState {
    armed: bool,
    generation: u64,
}

/// Owner of the timer thread.
///
/// 定时器线程的持有者。
pub(crate) struct TimerDriver {
    state: Arc<Mutex<TimerState>>,
    commands: mpsc::UnboundedSender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl TimerDriver {
    /// Spawn the timer thread. The timer starts disarmed.
    pub(crate) fn spawn(
        sweeper: Arc<dyn Sweep>,
        interval: Duration,
        thread_name: String,
    ) -> Result<Self, QueueError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(QueueError::Runtime)?;

        let state = Arc::new(Mutex::new(TimerState::default()));
        let (commands, receiver) = mpsc::unbounded_channel();

        let loop_state = state.clone();
        let thread = thread::Builder::new()
            .name(thread_name)
            .spawn(move || run(runtime, receiver, loop_state, sweeper, interval))
            .map_err(QueueError::Spawn)?;

        Ok(Self {
            state,
            commands,
            thread: Some(thread),
        })
    }

    /// Arm the timer; an already armed timer restarts its interval.
    pub(crate) fn start(&self) {
        let mut state = self.state.lock();
        state.armed = true;
        state.generation = state.generation.wrapping_add(1);
        // The loop only goes away in Drop, after which nobody can call start()
        let _ = self.commands.send(Command::Arm(state.generation));
    }

    /// Disarm the timer, waiting for an in-flight sweep to finish.
    ///
    /// Idempotent. Must not be called from the timer thread itself.
    ///
    /// 解除定时器，等待正在进行的清扫完成。幂等；不能在定时器线程内调用。
    pub(crate) fn stop(&self) {
        let mut state = self.state.lock();
        if state.armed {
            state.armed = false;
            let _ = self.commands.send(Command::Cancel);
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.state.lock().armed
    }

    /// Run `f` inside the timer lock, excluding concurrent sweeps.
    pub(crate) fn exclusive<F: FnOnce() -> R, R>(&self, f: F) -> R {
        let _state = self.state.lock();
        f()
    }
}

impl Drop for TimerDriver {
    fn drop(&mut self) {
        self.stop();
        let _ = self.commands.send(Command::Shutdown);

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("aqueue: timer thread panicked");
            }
        }
    }
}

fn run(
    runtime: Runtime,
    mut commands: mpsc::UnboundedReceiver<Command>,
    state: Arc<Mutex<TimerState>>,
    sweeper: Arc<dyn Sweep>,
    interval: Duration,
) {
    runtime.block_on(async move {
        let timer = sleep(interval);
        tokio::pin!(timer);
        let mut pending: Option<u64> = None;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Arm(generation)) => {
                        timer.as_mut().reset(Instant::now() + interval);
                        pending = Some(generation);
                    }
                    Some(Command::Cancel) => {
                        trace!("aqueue: timer cancelled");
                        pending = None;
                    }
                    Some(Command::Shutdown) | None => break,
                },
                () = &mut timer, if pending.is_some() => {
                    let Some(generation) = pending.take() else { continue };

                    let rearm = {
                        let state = state.lock();
                        if state.armed && state.generation == generation {
                            sweeper.sweep();
                            true
                        } else {
                            false
                        }
                    };

                    if rearm {
                        timer.as_mut().reset(Instant::now() + interval);
                        pending = Some(generation);
                    } else {
                        trace!(generation, "aqueue: stale timer firing ignored");
                    }
                }
            }
        }

        debug!("aqueue: timer loop finished");
    });
}
