use std::time::Duration;

use stepscope_core::config::MeasurementConfig;
use stepscope_core::protocol::StopRule;
use stepscope_host::acquire::{LineAcquirer, NeverCancel, RunEnd};
use stepscope_host::config::HostConfig;
use stepscope_host::link::{DeviceSource, soft_reset};
use stepscope_host::overlay::{AcquisitionRun, RcModel};
use stepscope_host::session::Session;
use stepscope_host::sim::{SimSettings, SimulatedDevice, Waveform};
use stepscope_host::transcript::CSV_HEADER;

fn acquire_from(settings: SimSettings) -> AcquisitionRun {
    let stop = StopRule::for_config(&settings.measurement).expect("stop rule");
    let mut device = SimulatedDevice::new(settings);
    soft_reset(&mut device).expect("reset");

    let mut acquirer = LineAcquirer::new(device, stop, Duration::from_secs(1));
    let acquisition = acquirer.acquire(&mut NeverCancel).expect("acquire");
    AcquisitionRun::new(RcModel::default(), &acquisition)
}

#[test]
fn ramp_run_yields_one_hundred_rising_points() {
    let run = acquire_from(SimSettings::new(
        MeasurementConfig::default(),
        Waveform::Ramp,
    ));

    assert_eq!(run.end, RunEnd::Sentinel);
    assert_eq!(run.points.len(), 100);
    assert_eq!(run.discarded, 1, "boot banner is skipped");
    let times: Vec<u32> = run.points.iter().map(|point| point.time_ms).collect();
    assert_eq!(times, (0..100).map(|i| i * 10).collect::<Vec<u32>>());
    assert!(
        run.points
            .windows(2)
            .all(|pair| pair[1].measured_v > pair[0].measured_v)
    );
    assert!(run.points[0].measured_v.abs() < 1e-9);
    assert!((run.points[99].measured_v - 3.299_2).abs() < 1e-3);
}

#[test]
fn rc_run_tracks_the_model() {
    let model = RcModel::default();
    let run = acquire_from(SimSettings::new(
        MeasurementConfig::default(),
        Waveform::RcCharge(model),
    ));

    assert_eq!(run.points.len(), 100);
    let summary = run.summary();
    // Quantization is the only error source: one code is about 0.8 mV.
    assert!(summary.rms_deviation.is_some_and(|rms| rms < 1e-3));
    let final_voltage = summary.final_voltage.expect("final voltage");
    assert!((final_voltage - model.voltage_at(990.0)).abs() < 1e-3);
}

#[test]
fn longer_window_stops_at_derived_sentinel() {
    let run = acquire_from(SimSettings::new(
        MeasurementConfig::new(100, 2),
        Waveform::Ramp,
    ));
    assert_eq!(run.points.len(), 200);
    assert_eq!(run.points.last().map(|point| point.time_ms), Some(1_990));
}

#[test]
fn session_runs_clears_and_writes_transcript() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("runs").join("step.csv");
    let config = HostConfig::default();
    let source = DeviceSource::Simulated(SimSettings::new(
        config.acquisition.measurement(),
        Waveform::RcCharge(config.model),
    ));
    let mut session = Session::new(&config, source, Some(path.clone()));

    let lines = session.handle_command("run", &mut NeverCancel).expect("run");
    assert!(lines[0].starts_with("OK run 1: 100 samples over 990 ms"), "{lines:?}");
    assert_eq!(session.current_run().map(|run| run.points.len()), Some(100));

    let csv = std::fs::read_to_string(&path).expect("transcript");
    let mut rows = csv.lines().skip_while(|line| line.starts_with('#'));
    assert_eq!(rows.next(), Some(CSV_HEADER));
    assert_eq!(rows.count(), 100);

    let lines = session.handle_command("clear", &mut NeverCancel).expect("clear");
    assert_eq!(lines, vec!["OK cleared 100 samples".to_string()]);
    assert!(session.current_run().is_none());
}

#[test]
fn cancelled_session_run_keeps_partial_data_without_transcript() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("step.csv");
    let config = HostConfig::default();
    let source = DeviceSource::Simulated(SimSettings::new(
        config.acquisition.measurement(),
        Waveform::Ramp,
    ));
    let mut session = Session::new(&config, source, Some(path.clone()));

    let mut polls = 0;
    let mut cancel = || {
        polls += 1;
        polls > 40
    };
    let lines = session.handle_command("run", &mut cancel).expect("run");
    assert!(lines.iter().any(|line| line.contains("cancelled")), "{lines:?}");

    let kept = session.current_run().expect("partial run kept");
    assert_eq!(kept.end, RunEnd::Cancelled);
    assert!(kept.points.len() < 100);
    assert!(!path.exists());
}

#[test]
fn unknown_commands_and_help_are_answered() {
    let config = HostConfig::default();
    let source = DeviceSource::Simulated(SimSettings::new(
        config.acquisition.measurement(),
        Waveform::Ramp,
    ));
    let mut session = Session::new(&config, source, None);

    let lines = session.handle_command("plot", &mut NeverCancel).expect("reply");
    assert!(lines[0].starts_with("ERR unknown command"));

    let lines = session.handle_command("help run", &mut NeverCancel).expect("reply");
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("run"));

    let lines = session.handle_command("status", &mut NeverCancel).expect("reply");
    assert!(lines.iter().any(|line| line == "no run on display"));
}
