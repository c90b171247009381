//! Device transport: the serial port or the in-process simulator.

use std::io::{self, Read, Write};
use std::time::Duration;

use log::info;
use stepscope_core::config::SOFT_RESET;
use thiserror::Error;

use crate::config::LinkConfig;
use crate::sim::{SimSettings, SimulatedDevice};

/// Byte stream to a device.
pub trait DevicePort: Read + Write + Send {}

impl<T> DevicePort for T where T: Read + Write + Send + ?Sized {}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        source: serialport::Error,
    },
    #[error("failed to restart device: {0}")]
    Reset(#[from] io::Error),
}

/// Where runs are acquired from.
#[derive(Clone, Debug)]
pub enum DeviceSource {
    Serial(LinkConfig),
    Simulated(SimSettings),
}

impl DeviceSource {
    /// Opens the transport. Failure here is fatal to the run.
    pub fn connect(&self) -> Result<Box<dyn DevicePort>, LinkError> {
        match self {
            DeviceSource::Serial(config) => {
                let port = serialport::new(config.port.as_str(), config.baud_rate)
                    .timeout(Duration::from_millis(config.read_timeout_ms))
                    .open()
                    .map_err(|source| LinkError::Open {
                        port: config.port.clone(),
                        source,
                    })?;
                info!("link: opened {} at {} baud", config.port, config.baud_rate);
                Ok(Box::new(port))
            }
            DeviceSource::Simulated(settings) => {
                info!("link: using simulated device");
                Ok(Box::new(SimulatedDevice::new(settings.clone())))
            }
        }
    }

    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            DeviceSource::Serial(config) => format!("{} @ {} baud", config.port, config.baud_rate),
            DeviceSource::Simulated(_) => "simulated device".to_string(),
        }
    }
}

/// Sends the soft-reset byte so the device restarts its program and begins a
/// fresh run.
pub fn soft_reset<W>(device: &mut W) -> io::Result<()>
where
    W: Write + ?Sized,
{
    device.write_all(&[SOFT_RESET])?;
    device.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_reset_writes_single_control_byte() {
        let mut written = Vec::new();
        soft_reset(&mut written).expect("write");
        assert_eq!(written, vec![0x04]);
    }

    #[test]
    fn missing_port_fails_before_acquisition() {
        let source = DeviceSource::Serial(LinkConfig {
            port: "/dev/stepscope-does-not-exist".to_string(),
            ..LinkConfig::default()
        });
        assert!(matches!(source.connect(), Err(LinkError::Open { .. })));
    }
}
