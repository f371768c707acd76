use parking_lot::Mutex;
use pregen_adapter::{Dimension, LaunchError, TargetOps, TargetProcess};
use pregen_driver::{
    ChunkPos, Driver, DriverError, DriverSettings, DriverState, ProgressObserver, ProgressReport,
    Region,
};
use pregen_test_utils::FakeServer;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Recorder(Mutex<Vec<ProgressReport>>);

impl ProgressObserver for Recorder {
    fn on_progress(&self, report: &ProgressReport) {
        self.0.lock().push(report.clone());
    }
}

fn fast() -> DriverSettings {
    DriverSettings {
        startup_timeout: Duration::from_secs(5),
        ready_poll_interval: Duration::from_millis(1),
        ready_attempts: 50,
        max_generation_rate: 0.0,
        send_stop: false,
    }
}

fn ready_driver(server: &FakeServer) -> Driver {
    let adapter = server.prepare().unwrap();
    let driver = Driver::for_adapter(&adapter).with_settings(fast());
    driver.start(&["nogui".to_string()]).unwrap();
    driver.wait_until_ready().unwrap();
    driver
}

fn row_major(region: Region) -> Vec<(Dimension, i32, i32)> {
    let (min, max) = (region.min(), region.max());
    (min.x..=max.x)
        .flat_map(|x| (min.z..=max.z).map(move |z| (Dimension::Overworld, x, z)))
        .collect()
}

#[test]
fn generates_region_row_major_with_progress_per_chunk() {
    let server = FakeServer::builder().ready_after(2).build();
    let adapter = server.prepare().unwrap();
    let recorder = Arc::new(Recorder::default());
    let driver = Driver::for_adapter(&adapter)
        .with_settings(fast())
        .with_observer(recorder.clone());

    driver.start(&["nogui".to_string()]).unwrap();
    assert_eq!(driver.state(), DriverState::WaitingReady);
    driver.wait_until_ready().unwrap();
    assert_eq!(server.ready_reads(), 3);

    let region = Region::new(0, 0, 9, 9);
    assert!(driver.generate(Dimension::Overworld, region, None).unwrap());

    assert_eq!(server.chunks(), row_major(region));
    let reports = recorder.0.lock();
    assert_eq!(reports.len(), 100);
    assert_eq!(reports.last().unwrap().done, 100);
    assert_eq!(driver.last_completed(), Some((Dimension::Overworld, ChunkPos::new(9, 9))));
    assert_eq!(server.launch_args(), vec![vec!["nogui".to_string()]]);
}

#[test]
fn resume_on_last_column_continues_on_next_row() {
    let server = FakeServer::new();
    let driver = ready_driver(&server);

    let region = Region::new(0, 0, 9, 9);
    assert!(driver
        .generate(Dimension::Overworld, region, Some(ChunkPos::new(3, 9)))
        .unwrap());

    let chunks = server.chunks();
    assert_eq!(chunks.len(), 60);
    assert_eq!(chunks[0], (Dimension::Overworld, 4, 0));
    assert_eq!(chunks, row_major(region)[40..].to_vec());
}

#[test]
fn target_death_ends_loop_without_error() {
    let server = FakeServer::builder().kill_after(5).build();
    let driver = ready_driver(&server);

    let finished = driver
        .generate(Dimension::Nether, Region::new(0, 0, 9, 9), None)
        .unwrap();

    assert!(!finished);
    assert_eq!(server.chunks().len(), 5);
    assert_eq!(driver.last_completed(), Some((Dimension::Nether, ChunkPos::new(0, 4))));
    assert!(!driver.is_running());
    assert_eq!(driver.state(), DriverState::Generating);
}

#[test]
fn dimensions_generate_in_sequence() {
    let server = FakeServer::new();
    let driver = ready_driver(&server);
    let region = Region::new(-1, -1, 0, 0);

    for dimension in [Dimension::End, Dimension::Overworld] {
        assert!(driver.generate(dimension, region, None).unwrap());
    }
    let dimensions: Vec<_> = server.chunks().into_iter().map(|(d, _, _)| d).collect();
    assert_eq!(
        dimensions,
        [[Dimension::End; 4], [Dimension::Overworld; 4]].concat()
    );
}

#[test]
fn missing_level_fails_while_target_alive() {
    let server = FakeServer::builder().missing_level(Dimension::End).build();
    let driver = ready_driver(&server);

    let err = driver
        .generate(Dimension::End, Region::new(0, 0, 1, 1), None)
        .unwrap_err();
    assert!(matches!(err, DriverError::Compatibility(ref e) if e.is_target_unavailable()), "{err}");
    assert_eq!(driver.state(), DriverState::Failed);
    assert_eq!(driver.last_completed(), None);
}

#[test]
fn never_ready_is_not_ready_error() {
    let server = FakeServer::builder().ready_after(usize::MAX).build();
    let adapter = server.prepare().unwrap();
    let driver = Driver::for_adapter(&adapter).with_settings(DriverSettings {
        ready_attempts: 3,
        ..fast()
    });
    driver.start(&[]).unwrap();

    let err = driver.wait_until_ready().unwrap_err();
    assert!(matches!(err, DriverError::NotReady { attempts: 3 }));
    assert_eq!(server.ready_reads(), 3);
    assert_eq!(driver.state(), DriverState::Failed);
}

#[test]
fn entry_point_without_server_thread_is_target_exited() {
    let server = FakeServer::builder().exit_on_launch().build();
    let adapter = server.prepare().unwrap();
    let driver = Driver::for_adapter(&adapter).with_settings(fast());

    let err = driver.start(&[]).unwrap_err();
    assert!(matches!(err, DriverError::TargetExited));
    assert_eq!(driver.state(), DriverState::Failed);
    driver.stop().unwrap();
    assert_eq!(driver.state(), DriverState::Stopped);
}

struct Hanging;

impl TargetProcess for Hanging {
    fn launch(&self, _: &[String]) -> Result<(), LaunchError> {
        std::thread::sleep(Duration::from_secs(2));
        Ok(())
    }

    fn is_alive(&self) -> bool {
        false
    }

    fn wait_for_exit(&self, _: Duration) -> bool {
        true
    }
}

impl TargetOps for Hanging {
    fn is_ready(&self) -> pregen_adapter::Result<bool> {
        Ok(false)
    }

    fn generate_chunk(&self, _: Dimension, _: i32, _: i32) -> pregen_adapter::Result<()> {
        Ok(())
    }
}

#[test]
fn slow_entry_point_is_startup_timeout() {
    let target = Arc::new(Hanging);
    let driver = Driver::new(target.clone(), target).with_settings(DriverSettings {
        startup_timeout: Duration::from_millis(50),
        ..fast()
    });

    let started = Instant::now();
    let err = driver.start(&[]).unwrap_err();
    assert!(matches!(err, DriverError::StartupTimeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(driver.state(), DriverState::Failed);
}

#[test]
fn shutdown_interrupts_ready_wait() {
    let server = FakeServer::builder().ready_after(usize::MAX).build();
    let adapter = server.prepare().unwrap();
    let driver = Arc::new(Driver::for_adapter(&adapter).with_settings(DriverSettings {
        ready_poll_interval: Duration::from_secs(30),
        ..fast()
    }));
    driver.start(&[]).unwrap();

    let trigger = {
        let driver = Arc::clone(&driver);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            driver.schedule_shutdown();
        })
    };
    let started = Instant::now();
    let err = driver.wait_until_ready().unwrap_err();
    trigger.join().unwrap();

    assert!(err.is_interrupted(), "{err}");
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(driver.state(), DriverState::WaitingReady);
}

#[test]
fn stop_sends_command_and_waits_for_exit() {
    let server = FakeServer::new();
    let adapter = server.prepare().unwrap();
    let console = server.console();
    let driver = Driver::for_adapter(&adapter)
        .with_console(console.clone())
        .with_settings(DriverSettings {
            send_stop: true,
            ..fast()
        });
    driver.start(&[]).unwrap();
    driver.wait_until_ready().unwrap();
    assert!(driver.is_running());

    driver.stop().unwrap();
    assert_eq!(console.lines(), vec!["stop".to_string()]);
    assert!(!driver.is_running());
    assert_eq!(driver.state(), DriverState::Stopped);

    let err = driver
        .generate(Dimension::Overworld, Region::new(0, 0, 0, 0), None)
        .unwrap_err();
    assert!(matches!(err, DriverError::IllegalTransition { from: DriverState::Stopped, .. }));
}

#[test]
fn paced_generation_respects_rate() {
    let server = FakeServer::new();
    let adapter = server.prepare().unwrap();
    let driver = Driver::for_adapter(&adapter).with_settings(DriverSettings {
        max_generation_rate: 100.0,
        ..fast()
    });
    driver.start(&[]).unwrap();
    driver.wait_until_ready().unwrap();

    let started = Instant::now();
    assert!(driver
        .generate(Dimension::Overworld, Region::new(0, 0, 0, 5), None)
        .unwrap());
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(server.chunks().len(), 6);
}
