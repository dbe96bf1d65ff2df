//! `PulseSource`: abstracts the GPIO/sysfs hardware driver (spec §4.2).
//!
//! The contract is a single blocking `read_sample` call returning the
//! current line level or a hardware fault. Concrete implementations are
//! platform-gated; the core sampler never branches on platform.

use crate::error::Error;

/// One raw GPIO sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// Abstracts a single-bit GPIO line driven by an external AM demodulator.
///
/// Implementors must not block longer than one sampling interval; a
/// persistent fault surfaces as `Err` and becomes `bad_io` upstream
/// (spec §7 item 4) rather than tearing down the process.
pub trait PulseSource {
    fn read_sample(&mut self) -> Result<Level, Error>;
}

/// A deterministic test/dev driver that replays a fixed sequence of
/// samples, then repeats the last one. Used by `nplpi-readpin --simulate`
/// and by the test suite; always compiled regardless of platform.
pub struct NullPulseSource {
    samples: Vec<Level>,
    pos: usize,
}

impl NullPulseSource {
    pub fn new(samples: Vec<Level>) -> Self {
        Self { samples, pos: 0 }
    }
}

impl PulseSource for NullPulseSource {
    fn read_sample(&mut self) -> Result<Level, Error> {
        if self.samples.is_empty() {
            return Ok(Level::Low);
        }
        let v = self.samples[self.pos.min(self.samples.len() - 1)];
        if self.pos < self.samples.len() - 1 {
            self.pos += 1;
        }
        Ok(v)
    }
}

/// Open the concrete `PulseSource` for this platform (spec §6, §4.2a). The
/// core sampler never branches on platform; only this constructor does.
#[cfg(target_os = "linux")]
pub fn open(cfg: &crate::types::HardwareConfig) -> Result<Box<dyn PulseSource>, Error> {
    Ok(Box::new(linux::SysfsGpio::open(cfg)?))
}

#[cfg(target_os = "freebsd")]
pub fn open(cfg: &crate::types::HardwareConfig) -> Result<Box<dyn PulseSource>, Error> {
    Ok(Box::new(freebsd::IoctlGpio::open(cfg)?))
}

#[cfg(not(any(target_os = "linux", target_os = "freebsd")))]
pub fn open(_cfg: &crate::types::HardwareConfig) -> Result<Box<dyn PulseSource>, Error> {
    Err(Error::Gpio(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "no PulseSource backend for this platform",
    )))
}

#[cfg(target_os = "linux")]
pub mod linux {
    //! Linux sysfs GPIO driver: `/sys/class/gpio/export`, `direction`,
    //! `value`, per spec §6.

    use super::{Level, PulseSource};
    use crate::error::Error;
    use crate::types::HardwareConfig;
    use std::fs::{self, File, OpenOptions};
    use std::io::{self, Read, Seek, SeekFrom};

    pub struct SysfsGpio {
        value_file: File,
        active_high: bool,
    }

    impl SysfsGpio {
        pub fn open(cfg: &HardwareConfig) -> Result<Self, Error> {
            let pin = cfg.pin_id;
            // Exporting an already-exported pin returns EBUSY; tolerate it.
            if let Err(e) = fs::write("/sys/class/gpio/export", pin.to_string()) {
                if e.raw_os_error() != Some(libc::EBUSY) {
                    return Err(Error::Gpio(e));
                }
            }
            let dir_path = format!("/sys/class/gpio/gpio{pin}/direction");
            fs::write(&dir_path, "in").map_err(Error::Gpio)?;
            let value_path = format!("/sys/class/gpio/gpio{pin}/value");
            let value_file = OpenOptions::new()
                .read(true)
                .open(&value_path)
                .map_err(Error::Gpio)?;
            Ok(Self {
                value_file,
                active_high: cfg.active_high,
            })
        }

        fn read_raw(&mut self) -> io::Result<bool> {
            self.value_file.seek(SeekFrom::Start(0))?;
            let mut buf = [0u8; 1];
            self.value_file.read_exact(&mut buf)?;
            Ok(buf[0] == b'1')
        }
    }

    impl PulseSource for SysfsGpio {
        fn read_sample(&mut self) -> Result<Level, Error> {
            let raw = self.read_raw().map_err(Error::Gpio)?;
            let high = if self.active_high { raw } else { !raw };
            Ok(if high { Level::High } else { Level::Low })
        }
    }
}

#[cfg(target_os = "freebsd")]
pub mod freebsd {
    //! FreeBSD `/dev/gpioc<iodev>` ioctl GPIO driver, per spec §6.

    use super::{Level, PulseSource};
    use crate::error::Error;
    use crate::types::HardwareConfig;
    use nix::{ioctl_readwrite, ioctl_write_ptr};
    use std::fs::{File, OpenOptions};
    use std::os::unix::io::AsRawFd;

    #[repr(C)]
    struct GpioConfig {
        pin: u32,
        flags: u32,
        name: [u8; 64],
    }

    #[repr(C)]
    struct GpioReq {
        pin: u32,
        value: u32,
    }

    const GPIO_PIN_INPUT: u32 = 0x0001;

    ioctl_write_ptr!(gpio_setconfig, b'G', 11, GpioConfig);
    ioctl_readwrite!(gpio_get, b'G', 11, GpioReq);

    pub struct IoctlGpio {
        dev: File,
        pin: u32,
        active_high: bool,
    }

    impl IoctlGpio {
        pub fn open(cfg: &HardwareConfig) -> Result<Self, Error> {
            let iodev = cfg.iodev.unwrap_or(0);
            let path = format!("/dev/gpioc{iodev}");
            let dev = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
                .map_err(Error::Gpio)?;
            let mut gcfg = GpioConfig {
                pin: cfg.pin_id,
                flags: GPIO_PIN_INPUT,
                name: [0u8; 64],
            };
            unsafe { gpio_setconfig(dev.as_raw_fd(), &mut gcfg) }.map_err(|e| {
                Error::Gpio(std::io::Error::from_raw_os_error(e as i32))
            })?;
            Ok(Self {
                dev,
                pin: cfg.pin_id,
                active_high: cfg.active_high,
            })
        }
    }

    impl PulseSource for IoctlGpio {
        fn read_sample(&mut self) -> Result<Level, Error> {
            let mut req = GpioReq {
                pin: self.pin,
                value: 0,
            };
            unsafe { gpio_get(self.dev.as_raw_fd(), &mut req) }.map_err(|e| {
                Error::Gpio(std::io::Error::from_raw_os_error(e as i32))
            })?;
            let raw = req.value != 0;
            let high = if self.active_high { raw } else { !raw };
            Ok(if high { Level::High } else { Level::Low })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_source_replays_then_holds() {
        let mut src = NullPulseSource::new(vec![Level::High, Level::Low]);
        assert_eq!(src.read_sample().unwrap(), Level::High);
        assert_eq!(src.read_sample().unwrap(), Level::Low);
        assert_eq!(src.read_sample().unwrap(), Level::Low);
    }

    #[test]
    fn null_source_empty_defaults_low() {
        let mut src = NullPulseSource::new(vec![]);
        assert_eq!(src.read_sample().unwrap(), Level::Low);
    }
}
