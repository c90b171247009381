//! CSV run transcript handed to external plotting tools.

use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::overlay::AcquisitionRun;

pub const CSV_HEADER: &str = "time_ms,measured_v,model_v";

/// Writes one run as CSV, header first.
pub fn write_run<W>(writer: &mut W, run: &AcquisitionRun) -> io::Result<()>
where
    W: Write,
{
    writeln!(
        writer,
        "# R={} ohm, C={} F, V_max={} V",
        run.model.resistance_ohms, run.model.capacitance_farads, run.model.v_max
    )?;
    writeln!(writer, "{CSV_HEADER}")?;
    for point in &run.points {
        writeln!(
            writer,
            "{},{},{}",
            point.time_ms, point.measured_v, point.model_v
        )?;
    }
    writer.flush()
}

/// Replaces `path` with the transcript of `run`.
pub fn save_run(path: &Path, run: &AcquisitionRun) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    let mut writer = BufWriter::new(file);
    write_run(&mut writer, run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::RunEnd;
    use crate::overlay::{OverlayPoint, RcModel};

    #[test]
    fn rows_follow_header() {
        let run = AcquisitionRun {
            model: RcModel::default(),
            points: vec![
                OverlayPoint {
                    time_ms: 0,
                    measured_v: 0.0,
                    model_v: 0.0,
                },
                OverlayPoint {
                    time_ms: 10,
                    measured_v: 0.5,
                    model_v: 0.25,
                },
            ],
            end: RunEnd::Sentinel,
            discarded: 0,
        };

        let mut out = Vec::new();
        write_run(&mut out, &run).expect("write");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("# R=100000"));
        assert_eq!(lines[1], CSV_HEADER);
        assert_eq!(lines[2], "0,0,0");
        assert_eq!(lines[3], "10,0.5,0.25");
        assert_eq!(lines.len(), 4);
    }
}
