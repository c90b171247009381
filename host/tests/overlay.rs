use stepscope_core::protocol::Record;
use stepscope_host::overlay::{RcModel, overlay};

fn close(actual: f64, expected: f64, tolerance: f64) -> bool {
    (actual - expected).abs() <= tolerance
}

#[test]
fn model_starts_at_zero() {
    assert!(close(RcModel::default().voltage_at(0.0), 0.0, 1e-12));
}

#[test]
fn model_reaches_one_time_constant_at_330_ms() {
    let model = RcModel::default();
    let expected = 3.3 * (1.0 - (-1.0f64).exp());
    assert!(close(model.voltage_at(330.0), expected, 1e-9));
    assert!(close(model.voltage_at(330.0), 2.086, 1e-3));
}

#[test]
fn model_is_about_3_3_mv_a_thousandth_of_tau_in() {
    let model = RcModel::default();
    assert!(close(model.voltage_at(0.33), 0.003_30, 1e-5));
}

#[test]
fn model_tends_to_supply_voltage() {
    let model = RcModel::default();
    assert!(close(model.voltage_at(1.0e6), 3.3, 1e-9));
    let mut previous = 0.0;
    for t in (0..5_000).step_by(10) {
        let volts = model.voltage_at(f64::from(t));
        assert!(volts >= previous);
        assert!(volts < 3.3);
        previous = volts;
    }
}

#[test]
fn overlay_is_computed_per_timestamp() {
    let model = RcModel {
        resistance_ohms: 1_000.0,
        capacitance_farads: 1.0e-3,
        v_max: 5.0,
    };
    let records = [
        Record {
            time_ms: 0,
            voltage: 0.1,
        },
        Record {
            time_ms: 1_000,
            voltage: 3.0,
        },
    ];

    let points = overlay(&model, &records);
    assert_eq!(points.len(), 2);
    assert_eq!(points[1].time_ms, 1_000);
    assert!(close(points[1].measured_v, 3.0, 0.0));
    assert!(close(points[0].model_v, 0.0, 1e-12));
    assert!(close(points[1].model_v, 5.0 * (1.0 - (-1.0f64).exp()), 1e-9));
}
