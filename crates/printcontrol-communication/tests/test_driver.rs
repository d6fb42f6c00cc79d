//! Printer driver tests against the virtual controller

use printcontrol_communication::{
    Axes, PrinterDriver, SerialChannel, VirtualController, VirtualControllerConfig, VirtualPort,
};
use printcontrol_core::{ConnectionConfig, ConnectionState, DriverEvent, JobStatus};
use std::io::Write;
use std::time::Duration;
use tokio::sync::broadcast;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Receive events until one matches, failing the test on timeout
async fn wait_for<F>(rx: &mut broadcast::Receiver<DriverEvent>, mut matches: F) -> DriverEvent
where
    F: FnMut(&DriverEvent) -> bool,
{
    let result = tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match rx.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await;
    result.expect("timed out waiting for driver event")
}

fn manual_ack() -> VirtualControllerConfig {
    VirtualControllerConfig {
        auto_ack: false,
        greeting: Vec::new(),
    }
}

async fn connected_driver(
    config: VirtualControllerConfig,
) -> (PrinterDriver, broadcast::Receiver<DriverEvent>, VirtualController) {
    let driver = PrinterDriver::new().unwrap();
    let mut rx = driver.subscribe();
    let (host, device) = VirtualPort::pair();
    let controller = VirtualController::spawn_with(device, config).unwrap();

    driver
        .attach(SerialChannel::from_link("virtual", host.reader, host.writer))
        .unwrap();
    wait_for(&mut rx, |e| matches!(e, DriverEvent::Connected(_))).await;
    assert_eq!(driver.connection_state(), ConnectionState::Connected);
    (driver, rx, controller)
}

#[tokio::test]
async fn test_job_streams_numbered_frames_and_skips_comments() {
    let (driver, mut rx, controller) = connected_driver(VirtualControllerConfig::default()).await;

    driver.load_text("G1 Z1\n; comment only\nG1 X5 E2").unwrap();
    let loaded = wait_for(&mut rx, |e| matches!(e, DriverEvent::DocumentLoaded { .. })).await;
    assert_eq!(
        loaded,
        DriverEvent::DocumentLoaded {
            lines: 3,
            height: 1.0,
            filament: 2.0,
            layers: 1,
        }
    );

    driver.run().unwrap();
    wait_for(&mut rx, |e| matches!(e, DriverEvent::JobEnded)).await;
    assert_eq!(driver.job_status(), JobStatus::Ended);

    let received = controller.received();
    assert_eq!(received.len(), 2);
    assert!(received[0].text.starts_with("N1 G1 Z1*"));
    assert!(received[1].text.starts_with("N2 G1 X5 E2*"));
    assert!(received.iter().all(|line| line.framed && line.checksum_ok));

    drop(driver);
    controller.join();
}

#[tokio::test]
async fn test_echo_text_reaches_subscribers() {
    let driver = PrinterDriver::new().unwrap();
    let mut rx = driver.subscribe();
    let (host, device) = VirtualPort::pair();
    let controller = VirtualController::spawn(device).unwrap();

    driver
        .attach(SerialChannel::from_link("virtual", host.reader, host.writer))
        .unwrap();
    let echo = wait_for(&mut rx, |e| matches!(e, DriverEvent::Echo(_))).await;
    assert_eq!(echo, DriverEvent::Echo("virtual printer ready".to_string()));

    controller.send_line("echo:busy: processing").unwrap();
    let echo = wait_for(&mut rx, |e| matches!(e, DriverEvent::Echo(_))).await;
    assert_eq!(echo, DriverEvent::Echo("busy: processing".to_string()));
}

#[tokio::test]
async fn test_pause_holds_after_in_flight_frame() {
    let (driver, mut rx, controller) = connected_driver(manual_ack()).await;

    driver.load_text("G28\nG1 X1\nG1 X2").unwrap();
    wait_for(&mut rx, |e| matches!(e, DriverEvent::DocumentLoaded { .. })).await;
    driver.run().unwrap();

    assert!(controller.wait_for_lines(1, EVENT_TIMEOUT));
    driver.pause().unwrap();
    controller.acknowledge().unwrap();
    wait_for(&mut rx, |e| *e == DriverEvent::JobStateChanged(JobStatus::Paused)).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(controller.received().len(), 1);

    driver.resume().unwrap();
    for count in 2..=3 {
        assert!(controller.wait_for_lines(count, EVENT_TIMEOUT));
        controller.acknowledge().unwrap();
    }
    wait_for(&mut rx, |e| matches!(e, DriverEvent::JobEnded)).await;

    let text = controller.received_text();
    assert!(text[1].starts_with("N2 G1 X1*"));
    assert!(text[2].starts_with("N3 G1 X2*"));
}

#[tokio::test]
async fn test_restart_begins_again_at_first_frame() {
    let (driver, mut rx, controller) = connected_driver(VirtualControllerConfig::default()).await;

    driver.load_text("G28\nG1 X1").unwrap();
    driver.run().unwrap();
    wait_for(&mut rx, |e| matches!(e, DriverEvent::JobEnded)).await;

    driver.restart().unwrap();
    wait_for(&mut rx, |e| *e == DriverEvent::JobStateChanged(JobStatus::Running)).await;
    wait_for(&mut rx, |e| matches!(e, DriverEvent::JobEnded)).await;

    let text = controller.received_text();
    assert_eq!(text.len(), 4);
    assert!(text[2].starts_with("N1 G28*"));
    assert!(text[3].starts_with("N2 G1 X1*"));
}

#[tokio::test]
async fn test_disconnect_releases_job_waiting_for_ack() {
    let (driver, mut rx, controller) = connected_driver(manual_ack()).await;

    driver.load_text("G28\nG1 X1").unwrap();
    driver.run().unwrap();
    assert!(controller.wait_for_lines(1, EVENT_TIMEOUT));

    driver.disconnect().unwrap();
    wait_for(&mut rx, |e| matches!(e, DriverEvent::JobFailed(_))).await;
    wait_for(&mut rx, |e| matches!(e, DriverEvent::Disconnected)).await;

    assert_eq!(driver.connection_state(), ConnectionState::Disconnected);
    assert_eq!(driver.job_status(), JobStatus::Ended);
    assert_eq!(controller.received().len(), 1);
}

#[tokio::test]
async fn test_manual_commands_are_sent_unnumbered() {
    let (driver, _rx, controller) = connected_driver(VirtualControllerConfig::default()).await;

    driver.home(Axes::X | Axes::Z).unwrap();
    driver.extrude(2.5).unwrap();
    driver.set_bed_temperature(60.0).unwrap();
    driver.exec("M105 ; report temperatures").unwrap();

    assert!(controller.wait_for_lines(5, EVENT_TIMEOUT));
    assert_eq!(
        controller.received_text(),
        vec!["G28 X Z", "M83", "G1 E2.5", "M140 S60", "M105"]
    );
    assert!(controller.received().iter().all(|line| !line.framed));
}

#[tokio::test]
async fn test_load_refused_while_job_active() {
    let (driver, mut rx, controller) = connected_driver(manual_ack()).await;

    driver.load_text("G28\nG1 X1").unwrap();
    driver.run().unwrap();
    assert!(controller.wait_for_lines(1, EVENT_TIMEOUT));

    driver.pause().unwrap();
    controller.acknowledge().unwrap();
    wait_for(&mut rx, |e| *e == DriverEvent::JobStateChanged(JobStatus::Paused)).await;

    driver.load_text("G1 X9").unwrap();
    wait_for(&mut rx, |e| matches!(e, DriverEvent::LoadFailed(_))).await;
    assert_eq!(driver.job_status(), JobStatus::Paused);
}

#[tokio::test]
async fn test_load_file_reports_metrics() {
    let (driver, mut rx, _controller) =
        connected_driver(VirtualControllerConfig::default()).await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "G1 Z0.2 E1").unwrap();
    writeln!(file, "G1 X10 E3").unwrap();
    writeln!(file, "G1 Z0.4 E2 ; next layer").unwrap();

    driver.load_file(file.path()).unwrap();
    let loaded = wait_for(&mut rx, |e| matches!(e, DriverEvent::DocumentLoaded { .. })).await;
    assert_eq!(
        loaded,
        DriverEvent::DocumentLoaded {
            lines: 3,
            height: 0.4,
            filament: 6.0,
            layers: 2,
        }
    );

    driver.load_file("/nonexistent/printcontrol/file.gcode").unwrap();
    wait_for(&mut rx, |e| matches!(e, DriverEvent::LoadFailed(_))).await;
}

#[tokio::test]
async fn test_connect_failure_leaves_state_disconnected() {
    let driver = PrinterDriver::new().unwrap();
    let mut rx = driver.subscribe();

    driver
        .connect(ConnectionConfig::new("/dev/printcontrol-missing-port"))
        .unwrap();
    wait_for(&mut rx, |e| matches!(e, DriverEvent::ConnectFailed(_))).await;
    assert_eq!(driver.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_failed_connect_keeps_current_session() {
    let (driver, mut rx, controller) = connected_driver(VirtualControllerConfig::default()).await;

    driver
        .connect(ConnectionConfig::new("/dev/printcontrol-missing-port"))
        .unwrap();
    wait_for(&mut rx, |e| matches!(e, DriverEvent::ConnectFailed(_))).await;
    assert_eq!(driver.connection_state(), ConnectionState::Connected);

    driver.exec("M105").unwrap();
    wait_for(&mut rx, |e| matches!(e, DriverEvent::CommandSent(_))).await;
    assert_eq!(controller.received_text(), vec!["M105"]);
}

#[tokio::test]
async fn test_lost_link_marks_driver_disconnected() {
    let driver = PrinterDriver::new().unwrap();
    let mut rx = driver.subscribe();
    let (host, device) = VirtualPort::pair();

    driver
        .attach(SerialChannel::from_link("virtual", host.reader, host.writer))
        .unwrap();
    wait_for(&mut rx, |e| matches!(e, DriverEvent::Connected(_))).await;

    drop(device);
    wait_for(&mut rx, |e| matches!(e, DriverEvent::ReaderStopped(_))).await;
    wait_for(&mut rx, |e| *e == DriverEvent::Disconnected).await;
    assert_eq!(driver.connection_state(), ConnectionState::Disconnected);

    driver.exec("M105").unwrap();
    wait_for(&mut rx, |e| matches!(e, DriverEvent::WriteFailed(_))).await;
}

#[tokio::test]
async fn test_requests_without_connection_report_failures() {
    let driver = PrinterDriver::new().unwrap();
    let mut rx = driver.subscribe();

    driver.load_text("G28").unwrap();
    driver.run().unwrap();
    wait_for(&mut rx, |e| matches!(e, DriverEvent::JobFailed(_))).await;
    assert_eq!(driver.job_status(), JobStatus::Off);

    driver.home(Axes::empty()).unwrap();
    wait_for(&mut rx, |e| matches!(e, DriverEvent::WriteFailed(_))).await;
}
