//! Multi-level feedback queue scheduling: the advanced, nice-driven policy.
//!
//! All three recomputations run on fixed-point math so results never depend
//! on a floating-point unit being present. Priorities are explicitly clamped
//! into `[PRI_MIN, PRI_MAX]` after recomputation, since a huge `recent_cpu` or
//! very negative `nice` could otherwise push the formula outside the legal
//! priority range.

use crate::fixed_point::{self, Fp};
use crate::thread::{Tcb, PRI_MAX, PRI_MIN};

/// Bump the running thread's `recent_cpu` by one tick's worth of CPU time.
/// Called once per timer tick for whichever thread is currently running.
pub fn tick_recent_cpu(running: &mut Tcb) {
    running.recent_cpu = fixed_point::add_int(running.recent_cpu, 1);
}

/// Recompute one thread's priority from its `recent_cpu` and `nice`.
///
/// `priority = PRI_MAX - (recent_cpu / 4) - (nice * 2)`, clamped to the legal
/// range. Called for every thread once every four ticks.
pub fn recompute_priority(tcb: &mut Tcb) {
    let term = fixed_point::div_int(tcb.recent_cpu, 4);
    let pri_max = fixed_point::from_int(PRI_MAX as i32);
    let nice_term = fixed_point::from_int(tcb.nice * 2);
    let raw = fixed_point::sub(fixed_point::sub(pri_max, term), nice_term);
    let rounded = fixed_point::to_int_round(raw);
    let clamped = rounded.clamp(PRI_MIN as i32, PRI_MAX as i32);
    tcb.base_priority = clamped as u8;
    tcb.effective_priority = clamped as u8;

    #[cfg(feature = "trace")]
    crate::pl011_println!("[mlfqs] {:?} recomputed priority {}", tcb.id, clamped);
}

/// Recompute system-wide `load_avg` from the count of ready-or-running
/// threads. `load_avg = (59/60) * load_avg + (1/60) * ready_threads`. Called
/// once every `TIMER_FREQUENCY_HZ` ticks.
pub fn recompute_load_avg(load_avg: Fp, ready_threads: u32) -> Fp {
    let fifty_nine_sixtieths = fixed_point::div(fixed_point::from_int(59), fixed_point::from_int(60));
    let one_sixtieth = fixed_point::div(fixed_point::from_int(1), fixed_point::from_int(60));
    let decayed = fixed_point::mul(fifty_nine_sixtieths, load_avg);
    let contribution = fixed_point::mul_int(one_sixtieth, ready_threads as i32);
    let updated = fixed_point::add(decayed, contribution);

    #[cfg(feature = "trace")]
    crate::pl011_println!(
        "[mlfqs] load_avg {} -> {} ({} ready)",
        fixed_point::to_int_round(load_avg),
        fixed_point::to_int_round(updated),
        ready_threads
    );

    updated
}

/// Recompute one thread's `recent_cpu` from the current `load_avg`.
///
/// `recent_cpu = (2*load_avg)/(2*load_avg+1) * recent_cpu + nice`. Called for
/// every thread once every `TIMER_FREQUENCY_HZ` ticks, right after
/// [`recompute_load_avg`].
pub fn recompute_recent_cpu(tcb: &mut Tcb, load_avg: Fp) {
    let two_load_avg = fixed_point::mul_int(load_avg, 2);
    let denom = fixed_point::add_int(two_load_avg, 1);
    let coefficient = fixed_point::div(two_load_avg, denom);
    let scaled = fixed_point::mul(coefficient, tcb.recent_cpu);
    tcb.recent_cpu = fixed_point::add_int(scaled, tcb.nice);
}

#[cfg(all(test, feature = "std-shim"))]
mod tests {
    use super::*;
    use crate::mem::{StackPool, StackSizeClass};
    use crate::thread::ThreadId;

    fn make_tcb(nice: i32, recent_cpu: i32) -> Tcb {
        let pool = StackPool::new();
        let stack = pool.allocate(StackSizeClass::Small).unwrap();
        let mut tcb = Tcb::new(ThreadId::from_index(1), None, 31, stack, |_| {}, 0);
        tcb.nice = nice;
        tcb.recent_cpu = fixed_point::from_int(recent_cpu);
        tcb
    }

    #[test]
    fn higher_nice_lowers_priority() {
        let mut low_nice = make_tcb(0, 0);
        let mut high_nice = make_tcb(10, 0);
        recompute_priority(&mut low_nice);
        recompute_priority(&mut high_nice);
        assert!(high_nice.base_priority < low_nice.base_priority);
    }

    #[test]
    fn priority_clamps_at_bounds() {
        let mut starved = make_tcb(20, 1000);
        recompute_priority(&mut starved);
        assert_eq!(starved.base_priority, PRI_MIN);

        let mut favored = make_tcb(-20, 0);
        recompute_priority(&mut favored);
        assert_eq!(favored.base_priority, PRI_MAX);
    }

    #[test]
    fn load_avg_tracks_ready_count() {
        let mut load_avg = 0;
        for _ in 0..1000 {
            load_avg = recompute_load_avg(load_avg, 1);
        }
        // should converge close to 1.0
        assert_eq!(fixed_point::to_int_round(load_avg), 1);
    }

    #[test]
    fn recent_cpu_decays_toward_zero_when_idle() {
        let mut tcb = make_tcb(0, 100);
        let load_avg = 0; // no load at all
        for _ in 0..100 {
            recompute_recent_cpu(&mut tcb, load_avg);
        }
        assert_eq!(fixed_point::to_int_round(tcb.recent_cpu), 0);
    }
}
