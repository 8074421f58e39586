//! 定时器调度集成测试
//! Timer scheduling integration tests

pub mod common;

use common::harness::{init_tracing, simulated_timer};
use kestrel_timer::{
    ClockMode, Error, ExpiredEvent, FireContext, SenderCallback, TaskRegistration, Timer,
    start_timer_loop,
};
use rand::Rng;
use rand::seq::SliceRandom;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use tokio::sync::mpsc;
use tokio::time::{Duration, sleep};

/// 在模拟时间下驱动分发循环105ms，10ms周期任务应触发10次
#[tokio::test(start_paused = true)]
async fn test_repeating_task_under_dispatch_loop() {
    init_tracing();
    let timer = Timer::init(16, true).unwrap();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);

    timer
        .add_after(
            10,
            10,
            true,
            move |sink: &mut Arc<Mutex<Vec<u64>>>, ctx: &FireContext| {
                sink.lock().unwrap().push(ctx.now);
            },
            sink,
        )
        .unwrap();

    let handle = start_timer_loop(timer.clone());
    sleep(Duration::from_millis(105)).await;
    handle.shutdown().await.unwrap();

    let observed = observed.lock().unwrap().clone();
    assert!(
        (9..=11).contains(&observed.len()),
        "expected about 10 firings, got {:?}",
        observed
    );
    assert!(observed.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(observed.iter().all(|now| *now >= 10));
}

/// 分发循环休眠时，更早到期的新任务会唤醒它
#[tokio::test(start_paused = true)]
async fn test_loop_wakes_for_earlier_admission() {
    init_tracing();
    let timer = Timer::init(16, true).unwrap();
    let fired = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&fired);
    timer
        .run_after(
            10_000,
            0,
            false,
            |count: &mut Arc<AtomicUsize>, _ctx| {
                count.fetch_add(1, Ordering::SeqCst);
            },
            counter,
        )
        .unwrap();

    let handle = start_timer_loop(timer.clone());
    sleep(Duration::from_millis(5)).await;

    let counter = Arc::clone(&fired);
    timer
        .run_after(
            20,
            0,
            false,
            |count: &mut Arc<AtomicUsize>, _ctx| {
                count.fetch_add(1, Ordering::SeqCst);
            },
            counter,
        )
        .unwrap();

    sleep(Duration::from_millis(30)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(timer.len(), 1);

    handle.shutdown().await.unwrap();
}

/// 空定时器上的循环一直休眠，直到收到关闭信号
#[tokio::test(start_paused = true)]
async fn test_loop_idles_until_shutdown() {
    init_tracing();
    let timer = Timer::init(4, true).unwrap();
    let handle = start_timer_loop(timer.clone());

    sleep(Duration::from_secs(3600)).await;
    assert!(!handle.is_finished());
    handle.shutdown().await.unwrap();
}

/// exit 会停止其他克隆上运行的循环
#[tokio::test(start_paused = true)]
async fn test_exit_stops_dispatch_loop() {
    init_tracing();
    let timer = Timer::init(4, true).unwrap();
    timer
        .run(50, true, |_: &mut (), _ctx| {}, ())
        .unwrap();

    let handle = start_timer_loop(timer.clone());
    let other = timer.clone();
    sleep(Duration::from_millis(10)).await;

    assert_eq!(timer.exit(), 1);
    sleep(Duration::from_millis(1)).await;
    assert!(handle.is_finished());
    handle.shutdown().await.unwrap();

    assert_eq!(
        other.run(5, false, |_: &mut (), _ctx| {}, ()).unwrap_err(),
        Error::Shutdown
    );
}

/// 粗粒度模式：分发循环自己推进滴答计数器，不需要单独的滴答任务
#[tokio::test(start_paused = true)]
async fn test_coarse_loop_advances_ticks_itself() {
    init_tracing();
    let timer = Timer::init(32, false).unwrap();
    assert_eq!(timer.mode(), ClockMode::Coarse);

    let fired = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&fired);
    timer
        .run_after(
            3,
            0,
            false,
            |sink: &mut Arc<Mutex<Vec<u64>>>, ctx: &FireContext| {
                sink.lock().unwrap().push(ctx.now);
            },
            sink,
        )
        .unwrap();
    assert_eq!(timer.timeout_duration(), Some(Duration::from_millis(30)));

    let handle = start_timer_loop(timer.clone());
    sleep(Duration::from_millis(25)).await;
    assert!(fired.lock().unwrap().is_empty(), "fired before tick 3");

    sleep(Duration::from_millis(25)).await;
    assert_eq!(*fired.lock().unwrap(), vec![3]);
    assert!(timer.now().unwrap() >= 3);
    assert!(timer.is_empty());

    handle.shutdown().await.unwrap();
}

/// 粗粒度模式下的重复任务经由时间轮重新调度
#[tokio::test(start_paused = true)]
async fn test_coarse_loop_repeats_through_wheel() {
    init_tracing();
    let timer = Timer::init(8, false).unwrap();
    let fired = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&fired);
    timer
        .run(
            5,
            true,
            |sink: &mut Arc<Mutex<Vec<u64>>>, ctx: &FireContext| {
                sink.lock().unwrap().push(ctx.now);
            },
            sink,
        )
        .unwrap();

    let handle = start_timer_loop(timer.clone());
    sleep(Duration::from_millis(155)).await;
    handle.shutdown().await.unwrap();

    assert_eq!(*fired.lock().unwrap(), vec![5, 10, 15]);
    assert_eq!(timer.stats().wheel.map(|w| w.total_timers), Some(1));
}

/// 通过通道投递到期事件
#[tokio::test(start_paused = true)]
async fn test_sender_callback_delivers_events() {
    init_tracing();
    let timer = Timer::init(8, true).unwrap();
    let (tx, mut rx) = mpsc::channel::<ExpiredEvent<&'static str>>(8);

    let handle = timer
        .schedule(TaskRegistration::after(40).callback(SenderCallback::new(tx.clone(), "idle")))
        .unwrap();
    timer
        .schedule_detached(TaskRegistration::after(20).callback(SenderCallback::new(tx, "keepalive")))
        .unwrap();

    let loop_handle = start_timer_loop(timer.clone());

    let first = rx.recv().await.unwrap();
    assert_eq!((first.data, first.handle, first.expiry), ("keepalive", None, 20));

    let second = rx.recv().await.unwrap();
    assert_eq!((second.data, second.handle, second.expiry), ("idle", Some(handle), 40));
    assert!(second.now >= 40);

    loop_handle.shutdown().await.unwrap();
}

/// 随机顺序提交和取消，触发顺序始终按 (到期时间, 提交顺序)
#[test]
fn test_randomized_admission_order() {
    let (timer, clock) = simulated_timer(256);
    let mut rng = rand::rng();

    let fired = Arc::new(Mutex::new(Vec::new()));
    let mut expected = Vec::new();
    let mut handles = Vec::new();

    for id in 0..200usize {
        let expiry = rng.random_range(1..50u64);
        let sink = Arc::clone(&fired);
        let handle = timer
            .add_at(
                expiry,
                0,
                false,
                move |id: &mut usize, _ctx| sink.lock().unwrap().push(*id),
                id,
            )
            .unwrap();
        handles.push((expiry, id, handle));
    }

    handles.shuffle(&mut rng);
    let (cancelled, kept) = handles.split_at(50);
    for (_, _, handle) in cancelled {
        assert!(timer.del(*handle));
    }
    expected.extend(kept.iter().map(|(expiry, id, _)| (*expiry, *id)));
    expected.sort();

    // 分多次推进时间，每次都不能提前触发
    for now in (0..=50).step_by(7) {
        clock.set(now);
        timer.spak().unwrap();
        let count = fired.lock().unwrap().len();
        let due = expected.iter().filter(|(expiry, _)| *expiry <= now).count();
        assert_eq!(count, due, "fired count at now={}", now);
    }

    let fired: Vec<usize> = fired.lock().unwrap().clone();
    let expected: Vec<usize> = expected.into_iter().map(|(_, id)| id).collect();
    assert_eq!(fired, expected);
    assert!(timer.is_empty());
    assert_eq!(timer.stats().cancelled, 50);
}

/// 定时器可以在线程之间共享，并发提交不会丢失任务
#[test]
fn test_concurrent_admission_from_threads() {
    let (timer, clock) = simulated_timer(400);
    let fired = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..4u64)
        .map(|worker| {
            let timer = timer.clone();
            let fired = Arc::clone(&fired);
            std::thread::spawn(move || {
                for i in 0..100u64 {
                    let fired = Arc::clone(&fired);
                    timer
                        .run_at(
                            worker * 100 + i,
                            0,
                            false,
                            move |_: &mut (), _ctx| {
                                fired.fetch_add(1, Ordering::SeqCst);
                            },
                            (),
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(timer.len(), 400);
    clock.set(1_000);
    assert!(timer.spak().unwrap());
    assert_eq!(fired.load(Ordering::SeqCst), 400);
    assert!(timer.is_empty());
}
