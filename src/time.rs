use std::time::Duration;

/// A point on the queue's tick counter.
///
/// The counter is bounded and runs for the whole life of the process, so it is
/// expected to wrap. Never compare two `TimePoint`s with `<`; use [`time_subtract`].
///
/// 队列 tick 计数器上的一个时间点。
/// 计数器有界且会回绕，比较请使用 [`time_subtract`]。
pub type TimePoint = u32;

/// How long an admitted object is kept alive, in seconds.
/// 对象被延长的生命周期（秒）。
pub const OBJ_LIFETIME_SECS: u64 = 10;

/// Interval between two sweeps, in seconds.
/// 两次清扫之间的间隔（秒）。
pub const TICK_DURATION_SECS: u64 = 2;

/// Interval between two sweeps.
pub const TICK_DURATION: Duration = Duration::from_secs(TICK_DURATION_SECS);

/// Object lifetime expressed in sweeps.
/// 以清扫次数表示的对象生命周期。
pub const LIFETIME_IN_TICKS: TimePoint = (OBJ_LIFETIME_SECS / TICK_DURATION_SECS) as TimePoint;

/// The counter advances by this much on every sweep.
pub const ONE_TICK: TimePoint = 1;

/// Modular addition on the tick counter.
///
/// Returns `a + b` reduced modulo `TimePoint::MAX + 1`.
///
/// 计数器上的模加法。
#[inline]
pub const fn time_add(a: TimePoint, b: TimePoint) -> TimePoint {
    a.wrapping_add(b)
}

/// Forward distance from `subtrahend` to `minuend`.
///
/// When `minuend < subtrahend` the distance wraps past `TimePoint::MAX`, so
/// `time_subtract(time_add(a, b), b) == a` holds for every `a` and `b`.
///
/// 从 `subtrahend` 到 `minuend` 的正向距离（模运算）。
#[inline]
pub const fn time_subtract(minuend: TimePoint, subtrahend: TimePoint) -> TimePoint {
    minuend.wrapping_sub(subtrahend)
}
