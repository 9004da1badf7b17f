//! Userland timer behavior: arm, rearm, interrupt, read, delete.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread::sleep;
use std::time::Duration;

use chime::time::{wall_now, ClockId, TimeSpec};
use chime::timer::{
    timer_create, timer_delete, timer_getoverrun, timer_gettime, timer_settime, Notify, TimerSpec,
};
use chime::Error;

/// Timer ids are slot indices and slots are reused after delete, so these
/// tests run one at a time to keep a freed slot from being reclaimed by a
/// neighbour mid-test.
static SERIAL: Mutex<()> = Mutex::new(());

fn init_logs() -> MutexGuard<'static, ()> {
    let _ = env_logger::builder().is_test(true).try_init();
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn ms(ms: i64) -> TimeSpec {
    TimeSpec::new(ms / 1000, (ms % 1000) * 1_000_000)
}

/// Notification target: the payload is a pointer to a static counter.
fn count_fire(value: usize) {
    let counter = unsafe { &*(value as *const AtomicUsize) };
    counter.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn relative_one_shot_fires_once() {
    let _serial = init_logs();
    static FIRES: AtomicUsize = AtomicUsize::new(0);

    let id = timer_create(
        ClockId::Monotonic,
        Notify::Thread {
            function: count_fire,
            value: &FIRES as *const _ as usize,
        },
    )
    .expect("timer_create");

    timer_settime(id, false, &TimerSpec::one_shot(ms(300)), None).expect("timer_settime");
    sleep(Duration::from_millis(800));

    assert_eq!(FIRES.load(Ordering::SeqCst), 1, "one-shot fired more than once");
    timer_delete(id).expect("timer_delete");
}

#[test]
fn periodic_timer_rearms_from_interval() {
    let _serial = init_logs();
    static FIRES: AtomicUsize = AtomicUsize::new(0);

    let id = timer_create(
        ClockId::Monotonic,
        Notify::Thread {
            function: count_fire,
            value: &FIRES as *const _ as usize,
        },
    )
    .expect("timer_create");

    let periodic = TimerSpec {
        value: ms(200),
        interval: ms(200),
    };
    timer_settime(id, false, &periodic, None).expect("timer_settime");
    sleep(Duration::from_millis(1100));

    let fires = FIRES.load(Ordering::SeqCst);
    assert!(
        (3..=7).contains(&fires),
        "periodic timer fired {fires} times in 1.1s at 200ms"
    );

    let cur = timer_gettime(id).expect("timer_gettime");
    assert_eq!(cur.interval, ms(200));

    timer_delete(id).expect("timer_delete");
}

#[test]
fn absolute_deadline_fires() {
    let _serial = init_logs();
    static FIRES: AtomicUsize = AtomicUsize::new(0);

    let id = timer_create(
        ClockId::Realtime,
        Notify::Thread {
            function: count_fire,
            value: &FIRES as *const _ as usize,
        },
    )
    .expect("timer_create");

    let mut deadline = wall_now();
    deadline.add(&ms(500));
    timer_settime(id, true, &TimerSpec::one_shot(deadline), None).expect("timer_settime");
    sleep(Duration::from_millis(1000));

    assert_eq!(FIRES.load(Ordering::SeqCst), 1);
    timer_delete(id).expect("timer_delete");
}

#[test]
fn settime_zero_disarms() {
    let _serial = init_logs();
    static FIRES: AtomicUsize = AtomicUsize::new(0);

    let id = timer_create(
        ClockId::Monotonic,
        Notify::Thread {
            function: count_fire,
            value: &FIRES as *const _ as usize,
        },
    )
    .expect("timer_create");

    timer_settime(id, false, &TimerSpec::one_shot(ms(400)), None).expect("arm");
    timer_settime(id, false, &TimerSpec::DISARM, None).expect("disarm");
    sleep(Duration::from_millis(700));

    assert_eq!(FIRES.load(Ordering::SeqCst), 0, "disarmed timer fired");
    assert!(matches!(timer_gettime(id), Err(Error::InvalidArgument)));

    timer_delete(id).expect("timer_delete");
}

#[test]
fn rearm_replaces_pending_deadline() {
    let _serial = init_logs();
    static FIRES: AtomicUsize = AtomicUsize::new(0);

    let id = timer_create(
        ClockId::Monotonic,
        Notify::Thread {
            function: count_fire,
            value: &FIRES as *const _ as usize,
        },
    )
    .expect("timer_create");

    timer_settime(id, false, &TimerSpec::one_shot(ms(5000)), None).expect("first arm");

    let mut old = TimerSpec::DISARM;
    timer_settime(id, false, &TimerSpec::one_shot(ms(200)), Some(&mut old)).expect("rearm");
    assert_eq!(old.value, ms(5000), "old value not reported on rearm");

    sleep(Duration::from_millis(900));
    assert_eq!(
        FIRES.load(Ordering::SeqCst),
        1,
        "rearmed timer did not fire on the new deadline"
    );

    timer_delete(id).expect("timer_delete");
}

#[test]
fn gettime_reports_remaining_time() {
    let _serial = init_logs();

    let id = timer_create(ClockId::Monotonic, Notify::None).expect("timer_create");
    timer_settime(id, false, &TimerSpec::one_shot(ms(2000)), None).expect("arm");

    sleep(Duration::from_millis(300));
    let cur = timer_gettime(id).expect("timer_gettime");
    assert!(
        cur.value > ms(1200) && cur.value < ms(1900),
        "remaining {:?} out of range after 300ms of a 2s arm",
        cur.value
    );
    assert!(cur.interval.is_zero());

    timer_delete(id).expect("timer_delete");
}

#[test]
fn silent_timer_disarms_after_expiry() {
    let _serial = init_logs();

    let id = timer_create(ClockId::Monotonic, Notify::None).expect("timer_create");
    timer_settime(id, false, &TimerSpec::one_shot(ms(200)), None).expect("arm");
    sleep(Duration::from_millis(600));

    // One-shot expiry clears the armed state even with no notification.
    assert!(matches!(timer_gettime(id), Err(Error::InvalidArgument)));
    assert_eq!(timer_getoverrun(id).expect("getoverrun"), 0);

    timer_delete(id).expect("timer_delete");
}

#[test]
fn overruns_count_fires_during_slow_notifications() {
    let _serial = init_logs();
    static FIRES: AtomicUsize = AtomicUsize::new(0);

    fn slow_fire(value: usize) {
        let counter = unsafe { &*(value as *const AtomicUsize) };
        counter.fetch_add(1, Ordering::SeqCst);
        sleep(Duration::from_millis(350));
    }

    let id = timer_create(
        ClockId::Monotonic,
        Notify::Thread {
            function: slow_fire,
            value: &FIRES as *const _ as usize,
        },
    )
    .expect("timer_create");

    let periodic = TimerSpec {
        value: ms(100),
        interval: ms(100),
    };
    timer_settime(id, false, &periodic, None).expect("timer_settime");
    sleep(Duration::from_millis(600));

    // Every fire after the first lands while an earlier notification is
    // still sleeping.
    let overruns = timer_getoverrun(id).expect("getoverrun");
    assert!(overruns >= 1, "no overrun recorded, fires={}", FIRES.load(Ordering::SeqCst));

    timer_delete(id).expect("timer_delete");
}

#[test]
fn stale_ids_are_rejected() {
    let _serial = init_logs();

    let id = timer_create(ClockId::Monotonic, Notify::None).expect("timer_create");
    timer_delete(id).expect("timer_delete");

    assert!(matches!(
        timer_settime(id, false, &TimerSpec::one_shot(ms(100)), None),
        Err(Error::InvalidArgument)
    ));
    assert!(matches!(timer_gettime(id), Err(Error::InvalidArgument)));
    assert!(matches!(timer_delete(id), Err(Error::InvalidArgument)));
}
